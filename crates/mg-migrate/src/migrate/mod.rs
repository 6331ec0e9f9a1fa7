//! Migration planner/runner.
//!
//! Consumes a reflected [`SchemaInfo`] and a source row stream, classifies
//! tables into node tables and relationship tables, and drives the graph
//! emission layer in three passes: nodes plus staging indexes, edges, then
//! cleanup and constraint migration. Execution is strictly sequential;
//! every statement's result stream is drained before the next one starts.

pub mod graph;

use tracing::info;

use crate::core::{ForeignKey, GraphClient, PropertyMap, Row, SchemaInfo, Table, Value};
use crate::destination::GraphDestination;
use crate::error::{MigrateError, Result};
use crate::source::SqlSource;

/// A relationship table has exactly two outgoing foreign keys and a
/// primary key that no other foreign key references. Tables that other
/// tables depend on must stay nodes to remain matchable, even when they
/// look like join tables.
fn is_relationship_table(table: &Table) -> bool {
    table.foreign_keys.len() == 2 && !table.primary_key_referenced
}

/// Project a subset of row columns into a property map keyed by column
/// name, preserving the order of `positions`.
fn extract_properties(table: &Table, row: &Row, positions: &[usize]) -> PropertyMap {
    let mut properties = PropertyMap::with_capacity(positions.len());
    for &pos in positions {
        properties.insert(table.columns[pos].clone(), row[pos].clone());
    }
    properties
}

/// FK-to-property projection: map the row's child-column values to a
/// property map keyed by the corresponding parent-table column names.
/// The result matches the parent row the foreign key points at.
fn foreign_key_matcher(schema: &SchemaInfo, foreign_key: &ForeignKey, row: &Row) -> PropertyMap {
    let parent_table = &schema.tables[foreign_key.parent_table];
    let mut properties = PropertyMap::with_capacity(foreign_key.child_columns.len());
    for (child_pos, parent_pos) in foreign_key
        .child_columns
        .iter()
        .zip(&foreign_key.parent_columns)
    {
        properties.insert(
            parent_table.columns[*parent_pos].clone(),
            row[*child_pos].clone(),
        );
    }
    properties
}

/// A foreign key is well-defined on a row when none of its components are
/// null. Rows with null components produce no edge.
fn is_well_defined(properties: &PropertyMap) -> bool {
    !properties.values().any(Value::is_null)
}

/// Migrate a SQL database into the destination graph.
pub async fn migrate_sql_database<S, C>(
    source: &mut S,
    destination: &mut GraphDestination<C>,
) -> Result<()>
where
    S: SqlSource,
    C: GraphClient,
{
    let schema = source.schema_info().await?;
    let default_schema = schema.default_schema.clone();

    // Pass 1: rows of node tables become nodes; each drained table gets a
    // staging index so the edge pass can match endpoints quickly.
    info!("migrating rows");
    for table in &schema.tables {
        if is_relationship_table(table) {
            continue;
        }
        let label = table.canonical_name(&default_schema);
        source.start_scan(table).await?;
        while let Some(row) = source.next_row().await? {
            let mut properties = PropertyMap::with_capacity(row.len());
            for (column, value) in table.columns.iter().zip(row) {
                properties.insert(column.clone(), value);
            }
            destination.create_node(&[label.clone()], &properties).await?;
        }
        if let Some(&key_pos) = table.primary_key.first() {
            // The destination's index facility is single-column, so a
            // composite key is indexed on its first column only.
            destination
                .create_label_property_index(&label, &table.columns[key_pos])
                .await?;
        } else {
            destination.create_label_index(&label).await?;
        }
    }

    // Pass 2: foreign keys become edges.
    info!("migrating edges");
    for table in &schema.tables {
        if table.foreign_keys.is_empty() {
            continue;
        }
        if is_relationship_table(table) {
            let fk1 = &schema.foreign_keys[table.foreign_keys[0]];
            let fk2 = &schema.foreign_keys[table.foreign_keys[1]];
            let label1 = schema.tables[fk1.parent_table].canonical_name(&default_schema);
            let label2 = schema.tables[fk2.parent_table].canonical_name(&default_schema);
            let edge_type = table.canonical_name(&default_schema);

            source.start_scan(table).await?;
            while let Some(row) = source.next_row().await? {
                let id1 = foreign_key_matcher(&schema, fk1, &row);
                let id2 = foreign_key_matcher(&schema, fk2, &row);
                if !is_well_defined(&id1) || !is_well_defined(&id2) {
                    info!(
                        "skipping a row of table '{}' with a null foreign key component",
                        table.name
                    );
                    continue;
                }
                // Edge properties are the columns not covered by either
                // foreign key.
                let mut properties = PropertyMap::new();
                for (i, value) in row.iter().enumerate() {
                    if !fk1.child_columns.contains(&i) && !fk2.child_columns.contains(&i) {
                        properties.insert(table.columns[i].clone(), value.clone());
                    }
                }
                let created = destination
                    .create_relationship(&label1, &id1, &label2, &id2, &edge_type, &properties, false)
                    .await?;
                if created != 1 {
                    return Err(MigrateError::UnexpectedResult(format!(
                        "unexpected number of relationships created ({})",
                        created
                    )));
                }
            }
        } else {
            let label1 = table.canonical_name(&default_schema);
            source.start_scan(table).await?;
            while let Some(row) = source.next_row().await? {
                // Match the node by its primary key, or by every column
                // when the table has no unique identity.
                let id1 = if table.has_primary_key() {
                    extract_properties(table, &row, &table.primary_key)
                } else {
                    let all: Vec<usize> = (0..table.columns.len()).collect();
                    extract_properties(table, &row, &all)
                };
                for &fk_pos in &table.foreign_keys {
                    let foreign_key = &schema.foreign_keys[fk_pos];
                    let id2 = foreign_key_matcher(&schema, foreign_key, &row);
                    if !is_well_defined(&id2) {
                        info!(
                            "skipping a foreign key of table '{}' with a null component",
                            table.name
                        );
                        continue;
                    }
                    let label2 =
                        schema.tables[foreign_key.parent_table].canonical_name(&default_schema);
                    let edge_type = format!("{}_to_{}", label1, label2);
                    // Without a primary key the same identity can recur, so
                    // duplicates must collapse instead of asserting a
                    // unique creation.
                    let use_merge = !table.has_primary_key();
                    let created = destination
                        .create_relationship(
                            &label1,
                            &id1,
                            &label2,
                            &id2,
                            &edge_type,
                            &PropertyMap::new(),
                            use_merge,
                        )
                        .await?;
                    if !use_merge && created != 1 {
                        return Err(MigrateError::UnexpectedResult(format!(
                            "unexpected number of relationships created ({})",
                            created
                        )));
                    }
                }
            }
        }
    }

    // Pass 3: drop the staging indexes created in pass 1, then migrate
    // constraints of node tables.
    for table in &schema.tables {
        if is_relationship_table(table) {
            continue;
        }
        let label = table.canonical_name(&default_schema);
        if let Some(&key_pos) = table.primary_key.first() {
            destination
                .drop_label_property_index(&label, &table.columns[key_pos])
                .await?;
        } else {
            destination.drop_label_index(&label).await?;
        }
    }

    info!("migrating existence constraints");
    for constraint in &schema.existence_constraints {
        let table = &schema.tables[constraint.table];
        if is_relationship_table(table) {
            continue;
        }
        destination
            .create_existence_constraint(
                &table.canonical_name(&default_schema),
                &table.columns[constraint.column],
            )
            .await?;
    }

    info!("migrating unique constraints");
    for constraint in &schema.unique_constraints {
        let table = &schema.tables[constraint.table];
        if is_relationship_table(table) {
            continue;
        }
        let properties: Vec<String> = constraint
            .columns
            .iter()
            .map(|&pos| table.columns[pos].clone())
            .collect();
        destination
            .create_unique_constraint(&table.canonical_name(&default_schema), &properties)
            .await?;
    }

    Ok(())
}
