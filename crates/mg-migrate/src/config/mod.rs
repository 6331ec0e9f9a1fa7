//! Migration configuration.

mod validation;

pub use validation::validate;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MigrateError;

/// Kind of the source database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// A graph database of the destination's kind (Bolt protocol).
    Memgraph,
    Postgresql,
    Mysql,
}

impl SourceKind {
    /// Default server port for this kind.
    pub fn default_port(self) -> u16 {
        match self {
            SourceKind::Memgraph => 7687,
            SourceKind::Postgresql => 5432,
            SourceKind::Mysql => 3306,
        }
    }

    /// Whether this kind is a SQL source (requires `--source-database`).
    pub fn is_sql(self) -> bool {
        matches!(self, SourceKind::Postgresql | SourceKind::Mysql)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::Memgraph => "memgraph",
            SourceKind::Postgresql => "postgresql",
            SourceKind::Mysql => "mysql",
        };
        f.write_str(name)
    }
}

impl FromStr for SourceKind {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memgraph" => Ok(SourceKind::Memgraph),
            "postgresql" => Ok(SourceKind::Postgresql),
            "mysql" => Ok(SourceKind::Mysql),
            other => Err(MigrateError::Config(format!(
                "unknown source kind '{}'; supported kinds are 'memgraph', 'postgresql' and 'mysql'",
                other
            ))),
        }
    }
}

/// Source database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub kind: SourceKind,

    pub host: String,

    /// Server port; `0` selects the default port for `kind`.
    pub port: u16,

    pub username: String,

    #[serde(skip_serializing, default)]
    pub password: String,

    /// Only meaningful for a graph source.
    pub use_ssl: bool,

    /// Database name; required for SQL sources.
    pub database: String,
}

impl SourceConfig {
    /// The port to connect to, with `0` resolved to the kind's default.
    pub fn resolved_port(&self) -> u16 {
        if self.port == 0 {
            self.kind.default_port()
        } else {
            self.port
        }
    }
}

/// Destination database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    pub use_ssl: bool,
}

/// Root configuration for a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    pub destination: DestinationConfig,
}
