//! Graph-emission primitives.
//!
//! Composes parameterized statements in the destination's query language
//! and enforces each statement's documented result shape. Identifiers
//! (labels, edge types, property keys) are backtick-escaped; value leaves
//! are always bound as `$param0`, `$param1`, … in statement order.

use tracing::debug;

use crate::core::{GraphClient, PropertyMap, Value};
use crate::error::{MigrateError, Result};

/// Escape a label, edge type or property name. Embedded backticks are
/// doubled.
pub fn escape_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    out.push('`');
    for c in name.chars() {
        if c == '`' {
            out.push_str("``");
        } else {
            out.push(c);
        }
    }
    out.push('`');
    out
}

/// Assigns `$paramN` names to bound values in statement order.
#[derive(Default)]
struct ParamsBuilder {
    params: PropertyMap,
}

impl ParamsBuilder {
    /// Bind `value` under a fresh name and return the `$`-prefixed
    /// placeholder.
    fn bind(&mut self, value: Value) -> String {
        let key = format!("param{}", self.params.len());
        let placeholder = format!("${}", key);
        self.params.insert(key, value);
        placeholder
    }

    fn finish(self) -> PropertyMap {
        self.params
    }
}

/// Render a property map as `{key: $paramN, …}`, binding every value.
fn write_properties(out: &mut String, params: &mut ParamsBuilder, properties: &PropertyMap) {
    out.push('{');
    let mut first = true;
    for (key, value) in properties {
        if !first {
            out.push_str(", ");
        }
        first = false;
        out.push_str(&escape_name(key));
        out.push_str(": ");
        out.push_str(&params.bind(value.clone()));
    }
    out.push('}');
}

/// Render an endpoint match predicate: `node.key = $paramN AND …`, in the
/// id map's insertion order.
fn write_id_matcher(out: &mut String, params: &mut ParamsBuilder, node: &str, id: &PropertyMap) {
    let mut first = true;
    for (key, value) in id {
        if !first {
            out.push_str(" AND ");
        }
        first = false;
        out.push_str(node);
        out.push('.');
        out.push_str(&escape_name(key));
        out.push_str(" = ");
        out.push_str(&params.bind(value.clone()));
    }
}

/// Writes to the destination graph database.
pub struct GraphDestination<C> {
    client: C,
}

impl<C: GraphClient> GraphDestination<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// Consume the destination and hand back the underlying client.
    pub fn into_inner(self) -> C {
        self.client
    }

    /// Execute a statement that must return no rows.
    async fn run(&mut self, statement: String, params: PropertyMap, context: &str) -> Result<()> {
        debug!("executing: {}", statement);
        self.client.execute(&statement, params).await?;
        if self.client.fetch_one().await?.is_some() {
            return Err(MigrateError::UnexpectedResult(format!(
                "unexpected data received while {}",
                context
            )));
        }
        Ok(())
    }

    /// Create a node with the given labels and properties.
    pub async fn create_node(&mut self, labels: &[String], properties: &PropertyMap) -> Result<()> {
        let mut params = ParamsBuilder::default();
        let mut statement = String::from("CREATE (u");
        for label in labels {
            statement.push(':');
            statement.push_str(&escape_name(label));
        }
        statement.push(' ');
        write_properties(&mut statement, &mut params, properties);
        statement.push_str(");");

        self.run(statement, params.finish(), "creating a node").await
    }

    /// Create (or merge) a relationship between nodes matched by label and
    /// id-property set. Returns the number of relationships the statement
    /// reported as touched.
    ///
    /// `use_merge` is for sources without a unique row identity, where the
    /// same endpoint pair may be visited more than once and duplicates must
    /// collapse.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_relationship(
        &mut self,
        label1: &str,
        id1: &PropertyMap,
        label2: &str,
        id2: &PropertyMap,
        edge_type: &str,
        properties: &PropertyMap,
        use_merge: bool,
    ) -> Result<i64> {
        let mut params = ParamsBuilder::default();
        let mut statement = String::from("MATCH ");
        statement.push_str("(u:");
        statement.push_str(&escape_name(label1));
        statement.push_str("), (v:");
        statement.push_str(&escape_name(label2));
        statement.push_str(") WHERE ");
        write_id_matcher(&mut statement, &mut params, "u", id1);
        statement.push_str(" AND ");
        write_id_matcher(&mut statement, &mut params, "v", id2);
        statement.push_str(if use_merge { " MERGE " } else { " CREATE " });
        statement.push_str("(u)-[:");
        statement.push_str(&escape_name(edge_type));
        if !properties.is_empty() {
            statement.push(' ');
            write_properties(&mut statement, &mut params, properties);
        }
        statement.push_str("]->(v) RETURN COUNT(u);");

        debug!("executing: {}", statement);
        self.client.execute(&statement, params.finish()).await?;

        // Exactly one row with a single integer is expected back.
        let row = self.client.fetch_one().await?.ok_or_else(|| {
            MigrateError::UnexpectedResult("couldn't create a relationship".into())
        })?;
        if self.client.fetch_one().await?.is_some() {
            return Err(MigrateError::UnexpectedResult(
                "unexpected data received while creating a relationship".into(),
            ));
        }
        match row.as_slice() {
            [Value::Int(count)] => Ok(*count),
            _ => Err(MigrateError::UnexpectedResult(
                "unexpected data received while creating a relationship".into(),
            )),
        }
    }

    pub async fn create_label_index(&mut self, label: &str) -> Result<()> {
        let statement = format!("CREATE INDEX ON :{};", escape_name(label));
        self.run(statement, PropertyMap::new(), "creating a label index")
            .await
    }

    pub async fn create_label_property_index(&mut self, label: &str, property: &str) -> Result<()> {
        let statement = format!(
            "CREATE INDEX ON :{}({});",
            escape_name(label),
            escape_name(property)
        );
        self.run(statement, PropertyMap::new(), "creating a label-property index")
            .await
    }

    pub async fn drop_label_index(&mut self, label: &str) -> Result<()> {
        let statement = format!("DROP INDEX ON :{};", escape_name(label));
        self.run(statement, PropertyMap::new(), "dropping a label index")
            .await
    }

    pub async fn drop_label_property_index(&mut self, label: &str, property: &str) -> Result<()> {
        let statement = format!(
            "DROP INDEX ON :{}({});",
            escape_name(label),
            escape_name(property)
        );
        self.run(statement, PropertyMap::new(), "dropping a label-property index")
            .await
    }

    pub async fn create_existence_constraint(&mut self, label: &str, property: &str) -> Result<()> {
        let statement = format!(
            "CREATE CONSTRAINT ON (u:{}) ASSERT EXISTS (u.{});",
            escape_name(label),
            escape_name(property)
        );
        self.run(statement, PropertyMap::new(), "creating an existence constraint")
            .await
    }

    /// Create a uniqueness constraint; `properties` are rendered in the
    /// order given.
    pub async fn create_unique_constraint(
        &mut self,
        label: &str,
        properties: &[String],
    ) -> Result<()> {
        let rendered = properties
            .iter()
            .map(|p| format!("u.{}", escape_name(p)))
            .collect::<Vec<_>>()
            .join(", ");
        let statement = format!(
            "CREATE CONSTRAINT ON (u:{}) ASSERT {} IS UNIQUE;",
            escape_name(label),
            rendered
        );
        self.run(statement, PropertyMap::new(), "creating a unique constraint")
            .await
    }

    /// Remove a label from every node.
    pub async fn remove_label_from_nodes(&mut self, label: &str) -> Result<()> {
        let statement = format!("MATCH (u) REMOVE u:{};", escape_name(label));
        self.run(statement, PropertyMap::new(), "removing a label from nodes")
            .await
    }

    /// Remove a property from every node.
    pub async fn remove_property_from_nodes(&mut self, property: &str) -> Result<()> {
        let statement = format!("MATCH (u) REMOVE u.{};", escape_name(property));
        self.run(statement, PropertyMap::new(), "removing a property from nodes")
            .await
    }
}

#[cfg(test)]
mod tests;
