//! Core types shared across the migration engine.

pub mod client;
pub mod schema;
pub mod value;

pub use client::{GraphClient, SqlClient};
pub use schema::{
    column_index, table_index, ExistenceConstraint, ForeignKey, SchemaInfo, Table,
    UniqueConstraint,
};
pub use value::{PropertyMap, Row, Value};
