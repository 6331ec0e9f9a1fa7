//! Schema reflection against a SQL source.
//!
//! One reflector implementation serves both dialects: [`SqlReader`] issues
//! metadata queries against the source's information schema and assembles a
//! [`SchemaInfo`]. The per-dialect differences (system-schema blacklist,
//! default schema, metadata SQL text) live in [`SqlDialect`]; the grouping
//! and index resolution are shared.

use async_trait::async_trait;
use tracing::debug;

use crate::core::schema::{column_index, table_index};
use crate::core::{ForeignKey, Row, SchemaInfo, SqlClient, Table, Value};
use crate::error::{MigrateError, Result};

/// SQL dialect of the source database.
#[derive(Debug, Clone)]
pub enum SqlDialect {
    Postgres,
    /// MySQL's default schema is the connection's database.
    Mysql { database: String },
}

impl SqlDialect {
    /// The schema whose tables get bare canonical names.
    pub fn default_schema(&self) -> &str {
        match self {
            SqlDialect::Postgres => "public",
            SqlDialect::Mysql { database } => database,
        }
    }

    /// SQL list literal of schemas that are never migrated.
    fn schema_blacklist(&self) -> &'static str {
        match self {
            SqlDialect::Postgres => "('information_schema', 'pg_catalog')",
            SqlDialect::Mysql { .. } => {
                "('information_schema', 'sys', 'mysql', 'performance_schema')"
            }
        }
    }
}

/// Row stream contract the planner consumes.
///
/// `start_scan` begins reading a table; `next_row` drains it one row at a
/// time until it returns `None`. At most one scan is active at a time,
/// mirroring the underlying client's cursor discipline.
#[async_trait]
pub trait SqlSource: Send {
    /// Reflect the source schema. Called once, before any scan.
    async fn schema_info(&mut self) -> Result<SchemaInfo>;

    /// Begin streaming rows of `table` in canonical column order.
    async fn start_scan(&mut self, table: &Table) -> Result<()>;

    /// Next row of the active scan, or `None` when the table is drained.
    async fn next_row(&mut self) -> Result<Option<Row>>;
}

/// Schema reflector and row reader over a [`SqlClient`].
pub struct SqlReader<C> {
    client: C,
    dialect: SqlDialect,
    /// Column count of the active scan, used to validate row width.
    scan_width: Option<usize>,
}

impl<C: SqlClient> SqlReader<C> {
    /// Create a reader for a PostgreSQL source.
    pub fn postgres(client: C) -> Self {
        Self {
            client,
            dialect: SqlDialect::Postgres,
            scan_width: None,
        }
    }

    /// Create a reader for a MySQL source connected to `database`.
    pub fn mysql(client: C, database: impl Into<String>) -> Self {
        Self {
            client,
            dialect: SqlDialect::Mysql {
                database: database.into(),
            },
            scan_width: None,
        }
    }

    /// Enumerate base tables, excluding system schemas.
    async fn list_tables(&mut self) -> Result<Vec<(String, String)>> {
        let statement = format!(
            "SELECT table_schema, table_name \
             FROM information_schema.tables \
             WHERE table_type = 'BASE TABLE' AND table_schema NOT IN {};",
            self.dialect.schema_blacklist()
        );
        self.client.execute(&statement).await?;

        let mut tables = Vec::new();
        while let Some(row) = self.client.fetch_one().await? {
            let [schema, name] = expect_strings::<2>(&row, "listing tables")?;
            debug!("found table '{}' in schema '{}'", name, schema);
            tables.push((schema, name));
        }
        Ok(tables)
    }

    /// List columns of a table in declared ordinal position.
    async fn list_columns(&mut self, schema: &str, name: &str) -> Result<Vec<String>> {
        let statement = format!(
            "SELECT column_name FROM information_schema.columns \
             WHERE table_schema = '{}' AND table_name = '{}' \
             ORDER BY ordinal_position;",
            self.client.escape_literal(schema),
            self.client.escape_literal(name)
        );
        self.client.execute(&statement).await?;

        let mut columns = Vec::new();
        while let Some(row) = self.client.fetch_one().await? {
            let [column] = expect_strings::<1>(&row, "listing columns")?;
            columns.push(column);
        }
        Ok(columns)
    }

    /// List primary-key column names of a table, in key order.
    async fn list_primary_key(&mut self, schema: &str, name: &str) -> Result<Vec<String>> {
        let statement = match &self.dialect {
            SqlDialect::Postgres => format!(
                "SELECT kcu.column_name \
                 FROM information_schema.table_constraints AS tc \
                 JOIN information_schema.key_column_usage AS kcu \
                   USING (constraint_schema, constraint_name) \
                 WHERE tc.constraint_type = 'PRIMARY KEY' \
                   AND tc.table_schema = '{}' AND tc.table_name = '{}' \
                 ORDER BY kcu.ordinal_position;",
                self.client.escape_literal(schema),
                self.client.escape_literal(name)
            ),
            SqlDialect::Mysql { .. } => format!(
                "SELECT column_name FROM information_schema.key_column_usage \
                 WHERE table_schema = '{}' AND table_name = '{}' \
                   AND constraint_name = 'PRIMARY' \
                 ORDER BY ordinal_position;",
                self.client.escape_literal(schema),
                self.client.escape_literal(name)
            ),
        };
        self.client.execute(&statement).await?;

        let mut primary_key = Vec::new();
        while let Some(row) = self.client.fetch_one().await? {
            let [column] = expect_strings::<1>(&row, "listing the primary key")?;
            primary_key.push(column);
        }
        Ok(primary_key)
    }

    /// List every foreign key, grouping contiguous rows that share a
    /// constraint name. Rows arrive ordered by `(constraint_name,
    /// ordinal_position)` so multi-column keys group correctly.
    async fn list_foreign_keys(&mut self, tables: &[Table]) -> Result<Vec<ForeignKey>> {
        let blacklist = self.dialect.schema_blacklist();
        let statement = match &self.dialect {
            SqlDialect::Postgres => format!(
                "SELECT \
                   constraints.constraint_name, \
                   child.table_schema, child.table_name, child.column_name, \
                   parent.table_schema, parent.table_name, parent.column_name \
                 FROM information_schema.referential_constraints AS constraints \
                 JOIN information_schema.key_column_usage AS child \
                   USING (constraint_schema, constraint_name) \
                 JOIN information_schema.key_column_usage AS parent \
                   ON parent.ordinal_position = child.position_in_unique_constraint \
                  AND parent.constraint_name = constraints.unique_constraint_name \
                 WHERE constraints.constraint_schema NOT IN {bl} \
                   AND child.table_schema NOT IN {bl} \
                   AND parent.table_schema NOT IN {bl} \
                 ORDER BY constraints.constraint_name, child.ordinal_position;",
                bl = blacklist
            ),
            SqlDialect::Mysql { .. } => format!(
                "SELECT \
                   kcu.constraint_name, \
                   kcu.table_schema, kcu.table_name, kcu.column_name, \
                   kcu.referenced_table_schema, kcu.referenced_table_name, \
                   kcu.referenced_column_name \
                 FROM information_schema.key_column_usage AS kcu \
                 WHERE kcu.referenced_table_name IS NOT NULL \
                   AND kcu.table_schema NOT IN {bl} \
                   AND kcu.referenced_table_schema NOT IN {bl} \
                 ORDER BY kcu.constraint_name, kcu.ordinal_position;",
                bl = blacklist
            ),
        };
        self.client.execute(&statement).await?;

        let mut foreign_keys: Vec<ForeignKey> = Vec::new();
        let mut prev_name: Option<String> = None;
        while let Some(row) = self.client.fetch_one().await? {
            let [name, child_schema, child_name, child_column, parent_schema, parent_name, parent_column] =
                expect_strings::<7>(&row, "listing foreign keys")?;

            let child_table = table_index(tables, &child_schema, &child_name)?;
            let child_column = column_index(&tables[child_table].columns, &child_column)?;
            let parent_table = table_index(tables, &parent_schema, &parent_name)?;
            let parent_column = column_index(&tables[parent_table].columns, &parent_column)?;

            if prev_name.as_deref() != Some(&name) {
                debug!("found foreign key '{}'", name);
                foreign_keys.push(ForeignKey {
                    child_table,
                    parent_table,
                    child_columns: Vec::new(),
                    parent_columns: Vec::new(),
                });
                prev_name = Some(name);
            }
            let current = foreign_keys
                .last_mut()
                .expect("a foreign key was just pushed");
            current.child_columns.push(child_column);
            current.parent_columns.push(parent_column);
        }
        Ok(foreign_keys)
    }

    /// Every non-nullable column outside the system schemas yields an
    /// existence constraint.
    async fn list_existence_constraints(
        &mut self,
        tables: &[Table],
    ) -> Result<Vec<(usize, usize)>> {
        let statement = format!(
            "SELECT table_schema, table_name, column_name \
             FROM information_schema.columns \
             WHERE is_nullable = 'NO' AND table_schema NOT IN {};",
            self.dialect.schema_blacklist()
        );
        self.client.execute(&statement).await?;

        let mut constraints = Vec::new();
        while let Some(row) = self.client.fetch_one().await? {
            let [schema, name, column] =
                expect_strings::<3>(&row, "listing existence constraints")?;
            let table = table_index(tables, &schema, &name)?;
            let column = column_index(&tables[table].columns, &column)?;
            constraints.push((table, column));
        }
        Ok(constraints)
    }

    /// List `UNIQUE` and `PRIMARY KEY` constraints, grouped by
    /// `(constraint name, table)`. The table is part of the grouping key
    /// because MySQL names every primary-key constraint `PRIMARY`.
    async fn list_unique_constraints(
        &mut self,
        tables: &[Table],
    ) -> Result<Vec<(usize, Vec<usize>)>> {
        let blacklist = self.dialect.schema_blacklist();
        let statement = match &self.dialect {
            SqlDialect::Postgres => format!(
                "SELECT tc.constraint_name, tc.table_schema, tc.table_name, ccu.column_name \
                 FROM information_schema.table_constraints AS tc \
                 JOIN information_schema.constraint_column_usage AS ccu \
                   USING (constraint_name, table_schema) \
                 WHERE tc.constraint_type IN ('UNIQUE', 'PRIMARY KEY') \
                   AND tc.table_schema NOT IN {bl} \
                 ORDER BY tc.constraint_name;",
                bl = blacklist
            ),
            SqlDialect::Mysql { .. } => format!(
                "SELECT tc.constraint_name, tc.table_schema, tc.table_name, kcu.column_name \
                 FROM information_schema.table_constraints AS tc \
                 JOIN information_schema.key_column_usage AS kcu \
                   USING (constraint_name, table_schema, table_name) \
                 WHERE tc.constraint_type IN ('UNIQUE', 'PRIMARY KEY') \
                   AND tc.table_schema NOT IN {bl} \
                 ORDER BY tc.constraint_name, kcu.ordinal_position;",
                bl = blacklist
            ),
        };
        self.client.execute(&statement).await?;

        let mut constraints: Vec<(usize, Vec<usize>)> = Vec::new();
        let mut prev_key: Option<(String, usize)> = None;
        while let Some(row) = self.client.fetch_one().await? {
            let [name, schema, table_name, column] =
                expect_strings::<4>(&row, "listing unique constraints")?;
            let table = table_index(tables, &schema, &table_name)?;
            let column = column_index(&tables[table].columns, &column)?;

            let key = (name, table);
            if prev_key.as_ref() != Some(&key) {
                constraints.push((table, Vec::new()));
                prev_key = Some(key);
            }
            let current = constraints
                .last_mut()
                .expect("a unique constraint was just pushed");
            current.1.push(column);
        }
        Ok(constraints)
    }
}

#[async_trait]
impl<C: SqlClient> SqlSource for SqlReader<C> {
    async fn schema_info(&mut self) -> Result<SchemaInfo> {
        let table_names = self.list_tables().await?;

        let mut tables = Vec::with_capacity(table_names.len());
        for (schema, name) in table_names {
            let columns = self.list_columns(&schema, &name).await?;
            let key_columns = self.list_primary_key(&schema, &name).await?;
            let mut primary_key = Vec::with_capacity(key_columns.len());
            for column_name in &key_columns {
                primary_key.push(column_index(&columns, column_name).map_err(|_| {
                    MigrateError::Schema(format!(
                        "couldn't find primary key field '{}' in table '{}'",
                        column_name, name
                    ))
                })?);
            }
            tables.push(Table {
                schema,
                name,
                columns,
                primary_key,
                foreign_keys: Vec::new(),
                primary_key_referenced: false,
            });
        }

        let foreign_keys = self.list_foreign_keys(&tables).await?;
        for (i, foreign_key) in foreign_keys.iter().enumerate() {
            tables[foreign_key.child_table].foreign_keys.push(i);
            tables[foreign_key.parent_table].primary_key_referenced = true;
        }

        let existence = self.list_existence_constraints(&tables).await?;
        let unique = self.list_unique_constraints(&tables).await?;

        Ok(SchemaInfo {
            default_schema: self.dialect.default_schema().to_string(),
            tables,
            foreign_keys,
            unique_constraints: unique
                .into_iter()
                .map(|(table, columns)| crate::core::UniqueConstraint { table, columns })
                .collect(),
            existence_constraints: existence
                .into_iter()
                .map(|(table, column)| crate::core::ExistenceConstraint { table, column })
                .collect(),
        })
    }

    async fn start_scan(&mut self, table: &Table) -> Result<()> {
        debug!("reading table '{}' in schema '{}'", table.name, table.schema);
        let columns = table
            .columns
            .iter()
            .map(|c| self.client.escape_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        let statement = format!(
            "SELECT {} FROM {}.{};",
            columns,
            self.client.escape_identifier(&table.schema),
            self.client.escape_identifier(&table.name)
        );
        self.client.execute(&statement).await?;
        self.scan_width = Some(table.columns.len());
        Ok(())
    }

    async fn next_row(&mut self) -> Result<Option<Row>> {
        let width = self.scan_width.ok_or_else(|| {
            MigrateError::BusyCursor("next_row called without an active scan".into())
        })?;
        match self.client.fetch_one().await? {
            Some(row) => {
                if row.len() != width {
                    return Err(MigrateError::UnexpectedResult(format!(
                        "row width {} doesn't match the table's {} columns",
                        row.len(),
                        width
                    )));
                }
                Ok(Some(row))
            }
            None => {
                self.scan_width = None;
                Ok(None)
            }
        }
    }
}

/// Destructure a metadata row into `N` strings, failing with context when
/// the shape is off.
fn expect_strings<const N: usize>(row: &Row, context: &str) -> Result<[String; N]> {
    if row.len() != N {
        return Err(MigrateError::UnexpectedResult(format!(
            "received unexpected result while {} (expected {} columns, got {})",
            context,
            N,
            row.len()
        )));
    }
    let mut out = Vec::with_capacity(N);
    for value in row {
        match value {
            Value::String(s) => out.push(s.clone()),
            other => {
                return Err(MigrateError::UnexpectedResult(format!(
                    "received unexpected result while {} (expected a string, got {:?})",
                    context, other
                )))
            }
        }
    }
    Ok(out.try_into().expect("length was checked above"))
}
