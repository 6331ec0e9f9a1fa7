//! Graph-to-graph migration.
//!
//! Vertices are copied first, each tagged with an internal label and an
//! internal id property so that edges can later match their endpoints by
//! source id. The tags and the staging index that serves them are removed
//! once the run completes; a failed run leaves them in place, where a
//! restarted migration can reuse them.

use async_trait::async_trait;
use tracing::info;

use crate::core::{GraphClient, PropertyMap, Value};
use crate::destination::GraphDestination;
use crate::error::{MigrateError, Result};

/// Label temporarily attached to every migrated vertex.
pub const INTERNAL_NODE_LABEL: &str = "__mg_vertex__";

/// Property temporarily holding the source vertex id.
pub const INTERNAL_PROPERTY_ID: &str = "__mg_id__";

/// A vertex read from the source graph.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceNode {
    pub id: i64,
    pub labels: Vec<String>,
    pub properties: PropertyMap,
}

/// A relationship read from the source graph, with the source ids of its
/// endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRelationship {
    pub start_id: i64,
    pub end_id: i64,
    pub edge_type: String,
    pub properties: PropertyMap,
}

/// Indexes present on the source graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexInfo {
    pub label: Vec<String>,
    pub label_property: Vec<(String, String)>,
}

/// Constraints present on the source graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstraintInfo {
    pub existence: Vec<(String, String)>,
    pub unique: Vec<(String, Vec<String>)>,
}

/// A readable source graph database.
///
/// Vertex and relationship streams follow the same start/next cursor
/// discipline as SQL table scans.
#[async_trait]
pub trait GraphSource: Send {
    async fn start_nodes(&mut self) -> Result<()>;
    async fn next_node(&mut self) -> Result<Option<SourceNode>>;

    async fn start_relationships(&mut self) -> Result<()>;
    async fn next_relationship(&mut self) -> Result<Option<SourceRelationship>>;

    async fn index_info(&mut self) -> Result<IndexInfo>;
    async fn constraint_info(&mut self) -> Result<ConstraintInfo>;
}

/// Migrate a source graph database into the destination graph.
pub async fn migrate_graph_database<S, C>(
    source: &mut S,
    destination: &mut GraphDestination<C>,
) -> Result<()>
where
    S: GraphSource,
    C: GraphClient,
{
    // The staging index is created lazily right before the first vertex;
    // an empty source creates (and later drops) nothing.
    let mut staging_index_created = false;

    info!("migrating vertices");
    source.start_nodes().await?;
    while let Some(node) = source.next_node().await? {
        if !staging_index_created {
            destination
                .create_label_property_index(INTERNAL_NODE_LABEL, INTERNAL_PROPERTY_ID)
                .await?;
            staging_index_created = true;
        }
        let mut labels = Vec::with_capacity(node.labels.len() + 1);
        labels.push(INTERNAL_NODE_LABEL.to_string());
        labels.extend(node.labels);

        let mut properties = PropertyMap::with_capacity(node.properties.len() + 1);
        properties.insert(INTERNAL_PROPERTY_ID.to_string(), Value::Int(node.id));
        properties.extend(node.properties);

        destination.create_node(&labels, &properties).await?;
    }

    info!("migrating relationships");
    source.start_relationships().await?;
    while let Some(relationship) = source.next_relationship().await? {
        let mut id1 = PropertyMap::new();
        id1.insert(INTERNAL_PROPERTY_ID.to_string(), Value::Int(relationship.start_id));
        let mut id2 = PropertyMap::new();
        id2.insert(INTERNAL_PROPERTY_ID.to_string(), Value::Int(relationship.end_id));

        let created = destination
            .create_relationship(
                INTERNAL_NODE_LABEL,
                &id1,
                INTERNAL_NODE_LABEL,
                &id2,
                &relationship.edge_type,
                &relationship.properties,
                false,
            )
            .await?;
        if created != 1 {
            return Err(MigrateError::UnexpectedResult(format!(
                "unexpected number of relationships created ({})",
                created
            )));
        }
    }

    info!("migrating indexes");
    let indexes = source.index_info().await?;
    for label in &indexes.label {
        destination.create_label_index(label).await?;
    }
    for (label, property) in &indexes.label_property {
        destination.create_label_property_index(label, property).await?;
    }

    info!("migrating constraints");
    let constraints = source.constraint_info().await?;
    for (label, property) in &constraints.existence {
        destination.create_existence_constraint(label, property).await?;
    }
    for (label, properties) in &constraints.unique {
        destination.create_unique_constraint(label, properties).await?;
    }

    // Cleanup runs only when everything above succeeded; on failure the
    // internal markers stay behind for a restart.
    if staging_index_created {
        destination
            .drop_label_property_index(INTERNAL_NODE_LABEL, INTERNAL_PROPERTY_ID)
            .await?;
    }
    destination.remove_label_from_nodes(INTERNAL_NODE_LABEL).await?;
    destination.remove_property_from_nodes(INTERNAL_PROPERTY_ID).await?;

    Ok(())
}
