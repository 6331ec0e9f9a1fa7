//! Client capabilities the migration is programmed against.
//!
//! Concrete drivers live in [`crate::drivers`]; everything else in this
//! crate only sees these traits, which keeps the reflector, the emission
//! layer and the planner testable with recording fakes.

use async_trait::async_trait;

use super::value::{PropertyMap, Row};
use crate::error::Result;

/// A connection to a SQL source database.
///
/// At most one query may be active at a time: `execute` begins a query and
/// `fetch_one` drains it row by row until it returns `None`, after which the
/// cursor is released and a new `execute` is allowed. Calling `execute`
/// while a stream is open fails with a `BusyCursor` error.
#[async_trait]
pub trait SqlClient: Send {
    /// Begin a query.
    async fn execute(&mut self, statement: &str) -> Result<()>;

    /// Return the next row, or `None` once the stream is finished.
    async fn fetch_one(&mut self) -> Result<Option<Row>>;

    /// Escape a string for embedding inside a single-quoted SQL literal.
    /// The returned text does not include the surrounding quotes.
    fn escape_literal(&self, text: &str) -> String;

    /// Quote an identifier (schema, table or column name) for this dialect.
    fn escape_identifier(&self, name: &str) -> String;
}

/// A connection to the destination graph database.
///
/// Statements are parameterized; value leaves are always bound through
/// `params`, never rendered inline. The cursor discipline is the same as
/// for [`SqlClient`].
#[async_trait]
pub trait GraphClient: Send {
    /// Execute a parameterized statement.
    async fn execute(&mut self, statement: &str, params: PropertyMap) -> Result<()>;

    /// Return the next result row, or `None` once the stream is finished.
    async fn fetch_one(&mut self) -> Result<Option<Row>>;
}
