//! Concrete database clients.
//!
//! Thin adapters that provide the [`crate::core::SqlClient`] and
//! [`crate::core::GraphClient`] capabilities over real drivers. Everything
//! above this module is driver-agnostic.

pub mod memgraph;
pub mod mysql;
pub mod postgres;

pub use memgraph::{MemgraphClient, MemgraphSource};
pub use mysql::MysqlClient;
pub use postgres::PostgresClient;
