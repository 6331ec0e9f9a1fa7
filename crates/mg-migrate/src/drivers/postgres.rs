//! PostgreSQL source client.
//!
//! Implements [`SqlClient`] over `tokio-postgres`. Cell values convert per
//! column type: booleans, the signed integer widths, the float widths and
//! numerics, the character types, and one- or multi-dimensional arrays of
//! any of those; everything else falls back to the driver's string
//! rendering of the value.

use std::pin::Pin;

use async_trait::async_trait;
use fallible_iterator::FallibleIterator;
use futures::StreamExt;
use postgres_protocol::types as pg_wire;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tokio_postgres::types::{FromSql, Kind, Type};
use tokio_postgres::{NoTls, RowStream};
use tracing::{info, warn};

use crate::config::SourceConfig;
use crate::core::{Row, SqlClient, Value};
use crate::error::{MigrateError, Result};

type BoxError = Box<dyn std::error::Error + Sync + Send>;

/// PostgreSQL implementation of [`SqlClient`].
pub struct PostgresClient {
    client: tokio_postgres::Client,
    rows: Option<Pin<Box<RowStream>>>,
}

impl PostgresClient {
    /// Connect to the source described by `config`.
    pub async fn connect(config: &SourceConfig) -> Result<Self> {
        let port = config.resolved_port();
        let mut pg_config = tokio_postgres::Config::new();
        pg_config
            .host(&config.host)
            .port(port)
            .dbname(&config.database);
        if !config.username.is_empty() {
            pg_config.user(&config.username);
        }
        if !config.password.is_empty() {
            pg_config.password(&config.password);
        }

        let (client, connection) = pg_config
            .connect(NoTls)
            .await
            .map_err(|e| MigrateError::connect(format!("source {}:{}", config.host, port), e))?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!("PostgreSQL connection error: {}", e);
            }
        });

        info!(
            "connected to PostgreSQL source {}:{}/{}",
            config.host, port, config.database
        );
        Ok(Self { client, rows: None })
    }
}

#[async_trait]
impl SqlClient for PostgresClient {
    async fn execute(&mut self, statement: &str) -> Result<()> {
        if self.rows.is_some() {
            return Err(MigrateError::BusyCursor(
                "execute called while a result stream is open".into(),
            ));
        }
        let stream = self
            .client
            .query_raw(statement, std::iter::empty::<i32>())
            .await
            .map_err(|e| MigrateError::sql_exec(e, format!("executing '{}'", statement)))?;
        self.rows = Some(Box::pin(stream));
        Ok(())
    }

    async fn fetch_one(&mut self) -> Result<Option<Row>> {
        let Some(stream) = self.rows.as_mut() else {
            return Ok(None);
        };
        match stream.next().await {
            Some(Ok(row)) => {
                let mut values = Vec::with_capacity(row.len());
                for i in 0..row.len() {
                    let cell: CellValue = row
                        .try_get(i)
                        .map_err(|e| MigrateError::SqlFetch(e.to_string()))?;
                    values.push(cell.0);
                }
                Ok(Some(values))
            }
            Some(Err(e)) => {
                self.rows = None;
                Err(MigrateError::SqlFetch(e.to_string()))
            }
            None => {
                self.rows = None;
                Ok(None)
            }
        }
    }

    fn escape_literal(&self, text: &str) -> String {
        text.replace('\'', "''")
    }

    fn escape_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

/// `FromSql` adapter that converts any cell into a [`Value`].
struct CellValue(Value);

impl<'a> FromSql<'a> for CellValue {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        convert_cell(ty, raw).map(CellValue)
    }

    fn from_sql_null(_ty: &Type) -> std::result::Result<Self, BoxError> {
        Ok(CellValue(Value::Null))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

fn convert_cell(ty: &Type, raw: &[u8]) -> std::result::Result<Value, BoxError> {
    // Domains (information_schema reports most strings as the
    // `sql_identifier` domain) convert as their underlying type; arrays
    // convert element-wise.
    match ty.kind() {
        Kind::Domain(inner) => return convert_cell(inner, raw),
        Kind::Array(element) => return convert_array(element, raw),
        _ => {}
    }

    let value = if *ty == Type::BOOL {
        Value::Bool(bool::from_sql(ty, raw)?)
    } else if *ty == Type::INT2 {
        Value::Int(i16::from_sql(ty, raw)? as i64)
    } else if *ty == Type::INT4 {
        Value::Int(i32::from_sql(ty, raw)? as i64)
    } else if *ty == Type::INT8 {
        Value::Int(i64::from_sql(ty, raw)?)
    } else if *ty == Type::FLOAT4 {
        Value::Float(f32::from_sql(ty, raw)? as f64)
    } else if *ty == Type::FLOAT8 {
        Value::Float(f64::from_sql(ty, raw)?)
    } else if *ty == Type::NUMERIC {
        let decimal = Decimal::from_sql(ty, raw)?;
        Value::Float(
            decimal
                .to_f64()
                .ok_or_else(|| format!("numeric value {} out of range", decimal))?,
        )
    } else if *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR || *ty == Type::NAME
    {
        Value::String(String::from_sql(ty, raw)?)
    } else if *ty == Type::UUID {
        Value::String(uuid::Uuid::from_sql(ty, raw)?.to_string())
    } else if *ty == Type::TIMESTAMP {
        Value::String(chrono::NaiveDateTime::from_sql(ty, raw)?.to_string())
    } else if *ty == Type::TIMESTAMPTZ {
        Value::String(chrono::DateTime::<chrono::Utc>::from_sql(ty, raw)?.to_string())
    } else if *ty == Type::DATE {
        Value::String(chrono::NaiveDate::from_sql(ty, raw)?.to_string())
    } else if *ty == Type::TIME {
        Value::String(chrono::NaiveTime::from_sql(ty, raw)?.to_string())
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        Value::String(serde_json::Value::from_sql(ty, raw)?.to_string())
    } else {
        // Most remaining values are readable in their text form.
        Value::String(String::from_utf8_lossy(raw).into_owned())
    };
    Ok(value)
}

/// Parse an array cell. The wire format carries the dimensions and a flat,
/// row-major element sequence; multidimensional arrays re-nest recursively.
fn convert_array(element: &Type, raw: &[u8]) -> std::result::Result<Value, BoxError> {
    let array = pg_wire::array_from_sql(raw)?;
    let dimensions: Vec<i32> = array.dimensions().map(|d| Ok(d.len)).collect()?;
    let values: Vec<Value> = array
        .values()
        .map(|cell| match cell {
            Some(bytes) => convert_cell(element, bytes),
            None => Ok(Value::Null),
        })
        .collect()?;
    Ok(nest_array(values, &dimensions))
}

/// Re-nest a flat, row-major element list according to the array
/// dimensions.
fn nest_array(values: Vec<Value>, dimensions: &[i32]) -> Value {
    if dimensions.len() <= 1 {
        return Value::List(values);
    }
    let inner_len: usize = dimensions[1..].iter().map(|d| *d as usize).product();
    if inner_len == 0 {
        return Value::List(Vec::new());
    }
    Value::List(
        values
            .chunks(inner_len)
            .map(|chunk| nest_array(chunk.to_vec(), &dimensions[1..]))
            .collect(),
    )
}
