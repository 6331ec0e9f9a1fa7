//! Reflected picture of the source relational schema.
//!
//! A [`SchemaInfo`] is built once by the reflector at the start of a
//! migration and is read-only afterwards. All cross-references between
//! tables, columns and foreign keys are stored as indexes into the owning
//! vectors; they are assigned during reflection and never reassigned.

use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};

/// Table metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    /// Schema the table lives in.
    pub schema: String,

    /// Table name.
    pub name: String,

    /// Column names in declared ordinal position. Row streams produce
    /// values in exactly this order.
    pub columns: Vec<String>,

    /// Primary-key columns as ordered indexes into `columns`. Empty when
    /// the table has no primary key.
    pub primary_key: Vec<usize>,

    /// Indexes into [`SchemaInfo::foreign_keys`] for the foreign keys that
    /// originate at this table.
    pub foreign_keys: Vec<usize>,

    /// Set when some foreign key references this table.
    pub primary_key_referenced: bool,
}

impl Table {
    /// Check if the table has a primary key.
    pub fn has_primary_key(&self) -> bool {
        !self.primary_key.is_empty()
    }

    /// Name used for node labels and edge types: the bare table name when
    /// the table lives in the dialect's default schema, `schema_name`
    /// otherwise.
    pub fn canonical_name(&self, default_schema: &str) -> String {
        if self.schema == default_schema {
            self.name.clone()
        } else {
            format!("{}_{}", self.schema, self.name)
        }
    }
}

/// A directed reference from a child table to a parent table.
///
/// `child_columns` and `parent_columns` have equal length; element `i`
/// pairs the child column with the parent column of the referenced unique
/// key. All four fields are indexes (into [`SchemaInfo::tables`] and the
/// respective tables' column lists).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKey {
    pub child_table: usize,
    pub parent_table: usize,
    pub child_columns: Vec<usize>,
    pub parent_columns: Vec<usize>,
}

/// A unique (or primary key) constraint: the owning table and the
/// constrained columns, both as indexes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniqueConstraint {
    pub table: usize,
    pub columns: Vec<usize>,
}

/// A non-null column: the owning table and the column, both as indexes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExistenceConstraint {
    pub table: usize,
    pub column: usize,
}

/// The reflected source schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaInfo {
    /// The dialect's default schema (`public` for PostgreSQL, the
    /// connection's database for MySQL). Drives canonical naming.
    pub default_schema: String,

    pub tables: Vec<Table>,
    pub foreign_keys: Vec<ForeignKey>,
    pub unique_constraints: Vec<UniqueConstraint>,
    pub existence_constraints: Vec<ExistenceConstraint>,
}

impl SchemaInfo {
    /// Resolve a `(schema, name)` pair to an index into `tables`.
    ///
    /// Failing to resolve means the source reported a constraint against a
    /// table we never enumerated; that would leave a dangling reference, so
    /// reflection fails fast.
    pub fn table_index(&self, table_schema: &str, table_name: &str) -> Result<usize> {
        table_index(&self.tables, table_schema, table_name)
    }
}

/// Resolve a `(schema, name)` pair to an index into a table list.
///
/// Used during reflection, before the `SchemaInfo` is assembled.
pub fn table_index(tables: &[Table], table_schema: &str, table_name: &str) -> Result<usize> {
    tables
        .iter()
        .position(|t| t.schema == table_schema && t.name == table_name)
        .ok_or_else(|| {
            MigrateError::Schema(format!(
                "couldn't find table '{}' in schema '{}'",
                table_name, table_schema
            ))
        })
}

/// Resolve a column name to its index within a table's column list.
pub fn column_index(columns: &[String], column_name: &str) -> Result<usize> {
    columns
        .iter()
        .position(|c| c == column_name)
        .ok_or_else(|| MigrateError::Schema(format!("couldn't find column '{}'", column_name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_table(schema: &str, name: &str, columns: &[&str]) -> Table {
        Table {
            schema: schema.to_string(),
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            primary_key: vec![],
            foreign_keys: vec![],
            primary_key_referenced: false,
        }
    }

    fn make_schema(tables: Vec<Table>) -> SchemaInfo {
        SchemaInfo {
            default_schema: "public".to_string(),
            tables,
            foreign_keys: vec![],
            unique_constraints: vec![],
            existence_constraints: vec![],
        }
    }

    #[test]
    fn test_table_index_resolves() {
        let schema = make_schema(vec![
            make_table("public", "actors", &["actor_id"]),
            make_table("audit", "actors", &["id"]),
        ]);
        assert_eq!(schema.table_index("public", "actors").unwrap(), 0);
        assert_eq!(schema.table_index("audit", "actors").unwrap(), 1);
    }

    #[test]
    fn test_table_index_missing_is_schema_error() {
        let schema = make_schema(vec![make_table("public", "actors", &[])]);
        let err = schema.table_index("public", "movies").unwrap_err();
        assert!(matches!(err, MigrateError::Schema(_)));
    }

    #[test]
    fn test_column_index() {
        let columns = vec!["a".to_string(), "b".to_string()];
        assert_eq!(column_index(&columns, "b").unwrap(), 1);
        assert!(column_index(&columns, "c").is_err());
    }

    #[test]
    fn test_canonical_name() {
        let table = make_table("public", "actors", &[]);
        assert_eq!(table.canonical_name("public"), "actors");

        let table = make_table("audit", "events", &[]);
        assert_eq!(table.canonical_name("public"), "audit_events");
    }

    #[test]
    fn test_has_primary_key() {
        let mut table = make_table("public", "actors", &["actor_id"]);
        assert!(!table.has_primary_key());
        table.primary_key.push(0);
        assert!(table.has_primary_key());
    }
}
