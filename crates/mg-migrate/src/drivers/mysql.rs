//! MySQL source client.
//!
//! Implements [`SqlClient`] over a SQLx MySQL pool. Rows are streamed
//! through a bounded channel from a background task; the receiver side is
//! the cursor, so at most one query is active at a time.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow, MySqlSslMode};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::SourceConfig;
use crate::core::{Row, SqlClient, Value};
use crate::error::{MigrateError, Result};

/// Connection acquire timeout.
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Bound of the row channel between the reader task and the cursor.
const ROW_CHANNEL_CAPACITY: usize = 256;

/// MySQL implementation of [`SqlClient`].
pub struct MysqlClient {
    pool: MySqlPool,
    rows: Option<mpsc::Receiver<Result<Row>>>,
}

impl MysqlClient {
    /// Connect to the source described by `config`.
    pub async fn connect(config: &SourceConfig) -> Result<Self> {
        let port = config.resolved_port();
        let mut options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(port)
            .database(&config.database)
            .ssl_mode(MySqlSslMode::Preferred);
        if !config.username.is_empty() {
            options = options.username(&config.username);
        }
        if !config.password.is_empty() {
            options = options.password(&config.password);
        }

        // The migration is strictly sequential, one connection suffices.
        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(CONNECTION_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| MigrateError::connect(format!("source {}:{}", config.host, port), e))?;

        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| MigrateError::connect(format!("source {}:{}", config.host, port), e))?;

        info!(
            "connected to MySQL source {}:{}/{}",
            config.host, port, config.database
        );
        Ok(Self { pool, rows: None })
    }
}

#[async_trait]
impl SqlClient for MysqlClient {
    async fn execute(&mut self, statement: &str) -> Result<()> {
        if self.rows.is_some() {
            return Err(MigrateError::BusyCursor(
                "execute called while a result stream is open".into(),
            ));
        }
        let (tx, rx) = mpsc::channel(ROW_CHANNEL_CAPACITY);
        let pool = self.pool.clone();
        let statement = statement.to_string();
        tokio::spawn(async move {
            let mut stream = sqlx::query(&statement).fetch(&pool);
            while let Some(item) = stream.next().await {
                let converted = match item {
                    Ok(row) => convert_row(&row),
                    Err(sqlx::Error::Database(e)) => {
                        Err(MigrateError::sql_exec(e, format!("executing '{}'", statement)))
                    }
                    Err(e) => Err(MigrateError::SqlFetch(e.to_string())),
                };
                let failed = converted.is_err();
                if tx.send(converted).await.is_err() || failed {
                    break;
                }
            }
        });
        self.rows = Some(rx);
        Ok(())
    }

    async fn fetch_one(&mut self) -> Result<Option<Row>> {
        let Some(rows) = self.rows.as_mut() else {
            return Ok(None);
        };
        match rows.recv().await {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => {
                self.rows = None;
                Err(e)
            }
            None => {
                self.rows = None;
                Ok(None)
            }
        }
    }

    fn escape_literal(&self, text: &str) -> String {
        text.replace('\\', "\\\\").replace('\'', "''")
    }

    fn escape_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }
}

/// Convert a MySQL row into values, dispatching on the declared column
/// type.
fn convert_row(row: &MySqlRow) -> Result<Row> {
    let mut values = Vec::with_capacity(row.columns().len());
    for (i, column) in row.columns().iter().enumerate() {
        values.push(convert_cell(row, i, column.type_info().name())?);
    }
    Ok(values)
}

fn convert_cell(row: &MySqlRow, index: usize, type_name: &str) -> Result<Value> {
    let raw = row
        .try_get_raw(index)
        .map_err(|e| MigrateError::SqlFetch(e.to_string()))?;
    if raw.is_null() {
        return Ok(Value::Null);
    }

    let fetch = |e: sqlx::Error| MigrateError::SqlFetch(e.to_string());
    let value = match type_name {
        "BOOLEAN" => Value::Bool(row.try_get(index).map_err(fetch)?),
        "TINYINT" => Value::Int(row.try_get::<i8, _>(index).map_err(fetch)? as i64),
        "SMALLINT" => Value::Int(row.try_get::<i16, _>(index).map_err(fetch)? as i64),
        "MEDIUMINT" | "INT" => Value::Int(row.try_get::<i32, _>(index).map_err(fetch)? as i64),
        "BIGINT" => Value::Int(row.try_get::<i64, _>(index).map_err(fetch)?),
        "TINYINT UNSIGNED" => Value::Int(row.try_get::<u8, _>(index).map_err(fetch)? as i64),
        "SMALLINT UNSIGNED" => Value::Int(row.try_get::<u16, _>(index).map_err(fetch)? as i64),
        "MEDIUMINT UNSIGNED" | "INT UNSIGNED" => {
            Value::Int(row.try_get::<u32, _>(index).map_err(fetch)? as i64)
        }
        "BIGINT UNSIGNED" => {
            let unsigned = row.try_get::<u64, _>(index).map_err(fetch)?;
            if unsigned > i64::MAX as u64 {
                warn!("converting unsigned integer {} to signed integer", unsigned);
            }
            Value::Int(unsigned as i64)
        }
        "FLOAT" => Value::Float(row.try_get::<f32, _>(index).map_err(fetch)? as f64),
        "DOUBLE" => Value::Float(row.try_get::<f64, _>(index).map_err(fetch)?),
        "DECIMAL" => {
            let decimal = row.try_get::<Decimal, _>(index).map_err(fetch)?;
            Value::Float(decimal.to_f64().ok_or_else(|| {
                MigrateError::SqlFetch(format!("numeric value {} out of range", decimal))
            })?)
        }
        "CHAR" | "VARCHAR" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" => {
            Value::String(row.try_get(index).map_err(fetch)?)
        }
        "DATE" => Value::String(
            row.try_get::<chrono::NaiveDate, _>(index)
                .map_err(fetch)?
                .to_string(),
        ),
        "DATETIME" => Value::String(
            row.try_get::<chrono::NaiveDateTime, _>(index)
                .map_err(fetch)?
                .to_string(),
        ),
        "TIMESTAMP" => Value::String(
            row.try_get::<chrono::DateTime<chrono::Utc>, _>(index)
                .map_err(fetch)?
                .to_string(),
        ),
        "TIME" => Value::String(
            row.try_get::<chrono::NaiveTime, _>(index)
                .map_err(fetch)?
                .to_string(),
        ),
        "YEAR" => Value::Int(row.try_get::<u16, _>(index).map_err(fetch)? as i64),
        // Everything else is read in its string form, falling back to a
        // lossy rendering for binary payloads.
        _ => match row.try_get::<String, _>(index) {
            Ok(text) => Value::String(text),
            Err(_) => {
                let bytes = row.try_get::<Vec<u8>, _>(index).map_err(fetch)?;
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            }
        },
    };
    Ok(value)
}
