//! # mg-migrate
//!
//! One-shot migration of an entire dataset into a destination Memgraph
//! database, from a relational source (PostgreSQL or MySQL) or from
//! another Memgraph database.
//!
//! A relational source is reflected into a [`SchemaInfo`], its tables are
//! classified into node tables and relationship tables, and rows are
//! streamed into the destination as nodes and edges with referential
//! structure, indexes and constraints preserved:
//!
//! - a table with exactly two outgoing foreign keys whose primary key no
//!   other table references becomes an edge type;
//! - every other table becomes a node label, with its foreign keys turned
//!   into `<child>_to_<parent>` edges;
//! - existence and uniqueness constraints are re-created on the
//!   destination.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mg_migrate::drivers::{MemgraphClient, PostgresClient};
//! use mg_migrate::{migrate_sql_database, GraphDestination, SqlReader};
//!
//! # async fn run(source_config: mg_migrate::SourceConfig,
//! #              destination_config: mg_migrate::DestinationConfig)
//! #              -> mg_migrate::Result<()> {
//! let client = PostgresClient::connect(&source_config).await?;
//! let mut source = SqlReader::postgres(client);
//! let mut destination =
//!     GraphDestination::new(MemgraphClient::connect(&destination_config).await?);
//! migrate_sql_database(&mut source, &mut destination).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod destination;
pub mod drivers;
pub mod error;
pub mod migrate;
pub mod source;

// Re-exports for convenient access
pub use crate::config::{validate, Config, DestinationConfig, SourceConfig, SourceKind};
pub use crate::core::{GraphClient, PropertyMap, Row, SchemaInfo, SqlClient, Table, Value};
pub use crate::destination::GraphDestination;
pub use crate::error::{MigrateError, Result};
pub use crate::migrate::graph::{migrate_graph_database, GraphSource};
pub use crate::migrate::migrate_sql_database;
pub use crate::source::{SqlReader, SqlSource};
