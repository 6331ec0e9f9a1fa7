//! mg-migrate CLI - imports data into a destination Memgraph database from
//! the given source database.

use std::process::ExitCode;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mg_migrate::drivers::{MemgraphClient, MemgraphSource, MysqlClient, PostgresClient};
use mg_migrate::{
    migrate_graph_database, migrate_sql_database, validate, Config, DestinationConfig,
    GraphDestination, MigrateError, SourceConfig, SourceKind, SqlReader,
};

#[derive(Parser)]
#[command(name = "mg-migrate")]
#[command(about = "A tool that imports data to the destination Memgraph from the given source database.")]
#[command(version)]
struct Cli {
    /// The kind of the given server. Supported options are 'memgraph',
    /// 'postgresql' and 'mysql'
    #[arg(long, default_value = "memgraph")]
    source_kind: String,

    /// Server address of the source database. It can be a DNS resolvable
    /// hostname
    #[arg(long, default_value = "127.0.0.1")]
    source_host: String,

    /// Server port of the source database. If set to 0, the default port
    /// for the given source kind will be used
    #[arg(long, default_value_t = 0)]
    source_port: u16,

    /// Username for the source database
    #[arg(long, default_value = "")]
    source_username: String,

    /// Password for the source database
    #[arg(long, default_value = "")]
    source_password: String,

    /// Use SSL when connecting to the source database (graph sources only)
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    source_use_ssl: bool,

    /// Database name. Required for PostgreSQL and MySQL sources
    #[arg(long, default_value = "")]
    source_database: String,

    /// Server address of the destination database
    #[arg(long, default_value = "127.0.0.1")]
    destination_host: String,

    /// Server port of the destination database
    #[arg(long, default_value_t = 7687)]
    destination_port: u16,

    /// Username for the destination database
    #[arg(long, default_value = "")]
    destination_username: String,

    /// Password for the destination database
    #[arg(long, default_value = "")]
    destination_password: String,

    /// Use SSL when connecting to the destination database
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    destination_use_ssl: bool,
}

impl Cli {
    fn into_config(self) -> Result<Config, MigrateError> {
        let kind: SourceKind = self.source_kind.parse()?;
        Ok(Config {
            source: SourceConfig {
                kind,
                host: self.source_host,
                port: self.source_port,
                username: self.source_username,
                password: self.source_password,
                use_ssl: self.source_use_ssl,
                database: self.source_database,
            },
            destination: DestinationConfig {
                host: self.destination_host,
                port: self.destination_port,
                username: self.destination_username,
                password: self.destination_password,
                use_ssl: self.destination_use_ssl,
            },
        })
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Cli::parse().into_config()?;
    validate(&config)?;

    let destination_client = MemgraphClient::connect(&config.destination).await?;
    let mut destination = GraphDestination::new(destination_client);

    match config.source.kind {
        SourceKind::Memgraph => {
            let mut source = MemgraphSource::connect(&config.source).await?;
            migrate_graph_database(&mut source, &mut destination).await?;
        }
        SourceKind::Postgresql => {
            let client = PostgresClient::connect(&config.source).await?;
            let mut source = SqlReader::postgres(client);
            migrate_sql_database(&mut source, &mut destination).await?;
        }
        SourceKind::Mysql => {
            let client = MysqlClient::connect(&config.source).await?;
            let database = config.source.database.clone();
            let mut source = SqlReader::mysql(client, database);
            migrate_sql_database(&mut source, &mut destination).await?;
        }
    }

    info!("migration finished successfully");
    Ok(())
}
