//! Memgraph clients over the Bolt protocol.
//!
//! [`MemgraphClient`] implements the destination-side [`GraphClient`];
//! [`MemgraphSource`] implements [`GraphSource`] for graph-to-graph
//! migration. Both speak Bolt through `neo4rs`.


use async_trait::async_trait;
use futures::TryStream;
use neo4rs::{
    query, BoltList, BoltMap, BoltNull, BoltString, BoltType, ConfigBuilder,
    Graph, Node, Relation,
};
use tracing::info;

use crate::config::{DestinationConfig, SourceConfig};
use crate::core::{GraphClient, PropertyMap, Row, Value};
use crate::error::{MigrateError, Result};
use crate::migrate::graph::{
    ConstraintInfo, GraphSource, IndexInfo, SourceNode, SourceRelationship,
};

/// Type-erased cursor over a [`neo4rs::DetachedRowStream::into_stream`]
/// result, needed because the concrete stream type is not nameable outside
/// the `neo4rs` crate.
#[async_trait]
trait RowCursor: Send {
    async fn next_row(&mut self) -> neo4rs::Result<Option<neo4rs::Row>>;
}

#[async_trait]
impl<T> RowCursor for std::pin::Pin<Box<T>>
where
    T: futures::TryStream<Ok = neo4rs::Row, Error = neo4rs::Error> + Send + ?Sized,
{
    async fn next_row(&mut self) -> neo4rs::Result<Option<neo4rs::Row>> {
        futures::future::poll_fn(|cx| self.as_mut().try_poll_next(cx).map(Option::transpose))
            .await
    }
}

type BoltRowStream = Box<dyn RowCursor>;

/// Open a Bolt connection.
async fn connect_graph(
    host: &str,
    port: u16,
    username: &str,
    password: &str,
    use_ssl: bool,
    target: &str,
) -> Result<Graph> {
    let scheme = if use_ssl { "bolt+s" } else { "bolt" };
    let uri = format!("{}://{}:{}", scheme, host, port);
    let config = ConfigBuilder::default()
        .uri(&uri)
        .user(username)
        .password(password)
        .build()
        .map_err(|e| MigrateError::connect(format!("{} {}", target, uri), e))?;
    let graph = Graph::connect(config)
        .await
        .map_err(|e| MigrateError::connect(format!("{} {}", target, uri), e))?;
    info!("connected to {} {}", target, uri);
    Ok(graph)
}

/// Convert a [`Value`] into its Bolt representation.
fn to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(v) => (*v).into(),
        Value::Int(v) => (*v).into(),
        Value::Float(v) => (*v).into(),
        Value::String(v) => v.clone().into(),
        Value::List(items) => {
            BoltType::List(BoltList {
                value: items.iter().map(to_bolt).collect(),
            })
        }
        Value::Map(map) => BoltType::Map(BoltMap {
            value: map
                .iter()
                .map(|(k, v)| (BoltString::from(k.as_str()), to_bolt(v)))
                .collect(),
        }),
    }
}

/// Convert a deserialized JSON value back into a [`Value`]. Integral
/// numbers stay integers.
fn from_json(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(v) => Value::Bool(v),
        serde_json::Value::Number(n) => {
            if let Some(v) = n.as_i64() {
                Value::Int(v)
            } else {
                Value::Float(n.as_f64().unwrap_or_default())
            }
        }
        serde_json::Value::String(v) => Value::String(v),
        serde_json::Value::Array(items) => Value::List(items.into_iter().map(from_json).collect()),
        serde_json::Value::Object(map) => Value::Map(
            map.into_iter()
                .map(|(k, v)| (k, from_json(v)))
                .collect(),
        ),
    }
}

/// Destination-side Bolt client.
pub struct MemgraphClient {
    graph: Graph,
    rows: Option<BoltRowStream>,
}

impl MemgraphClient {
    /// Connect to the destination described by `config`.
    pub async fn connect(config: &DestinationConfig) -> Result<Self> {
        let graph = connect_graph(
            &config.host,
            config.port,
            &config.username,
            &config.password,
            config.use_ssl,
            "destination",
        )
        .await?;
        Ok(Self { graph, rows: None })
    }
}

#[async_trait]
impl GraphClient for MemgraphClient {
    async fn execute(&mut self, statement: &str, params: PropertyMap) -> Result<()> {
        if self.rows.is_some() {
            return Err(MigrateError::BusyCursor(
                "execute called while a result stream is open".into(),
            ));
        }
        let mut q = query(statement);
        for (key, value) in &params {
            q = q.param(key, to_bolt(value));
        }
        let stream = self
            .graph
            .execute(q)
            .await
            .map_err(|e| MigrateError::graph_exec(e, format!("executing '{}'", statement)))?;
        self.rows = Some(Box::new(Box::pin(stream.into_stream())));
        Ok(())
    }

    async fn fetch_one(&mut self) -> Result<Option<Row>> {
        let Some(stream) = self.rows.as_mut() else {
            return Ok(None);
        };
        match stream.next_row().await {
            Ok(Some(row)) => {
                let fields: serde_json::Map<String, serde_json::Value> = row
                    .to()
                    .map_err(|e| MigrateError::GraphFetch(e.to_string()))?;
                Ok(Some(fields.into_iter().map(|(_, v)| from_json(v)).collect()))
            }
            Ok(None) => {
                self.rows = None;
                Ok(None)
            }
            Err(e) => {
                self.rows = None;
                Err(MigrateError::GraphFetch(e.to_string()))
            }
        }
    }
}

/// Source-side Bolt client for graph-to-graph migration.
pub struct MemgraphSource {
    graph: Graph,
    rows: Option<BoltRowStream>,
}

impl MemgraphSource {
    /// Connect to the source described by `config`.
    pub async fn connect(config: &SourceConfig) -> Result<Self> {
        let graph = connect_graph(
            &config.host,
            config.resolved_port(),
            &config.username,
            &config.password,
            config.use_ssl,
            "source",
        )
        .await?;
        Ok(Self { graph, rows: None })
    }

    async fn start(&mut self, statement: &str) -> Result<()> {
        if self.rows.is_some() {
            return Err(MigrateError::BusyCursor(
                "execute called while a result stream is open".into(),
            ));
        }
        let stream = self
            .graph
            .execute(query(statement))
            .await
            .map_err(|e| MigrateError::graph_exec(e, format!("executing '{}'", statement)))?;
        self.rows = Some(Box::new(Box::pin(stream.into_stream())));
        Ok(())
    }

    async fn next(&mut self) -> Result<Option<neo4rs::Row>> {
        let Some(stream) = self.rows.as_mut() else {
            return Ok(None);
        };
        match stream.next_row().await {
            Ok(Some(row)) => Ok(Some(row)),
            Ok(None) => {
                self.rows = None;
                Ok(None)
            }
            Err(e) => {
                self.rows = None;
                Err(MigrateError::GraphFetch(e.to_string()))
            }
        }
    }
}

/// Read the properties of a node or relationship entity.
fn entity_properties<'a>(
    keys: impl IntoIterator<Item = &'a str>,
    get: impl Fn(&str) -> Result<serde_json::Value>,
) -> Result<PropertyMap> {
    let mut properties = PropertyMap::new();
    for key in keys {
        properties.insert(key.to_string(), from_json(get(key)?));
    }
    Ok(properties)
}

#[async_trait]
impl GraphSource for MemgraphSource {
    async fn start_nodes(&mut self) -> Result<()> {
        self.start("MATCH (u) RETURN u;").await
    }

    async fn next_node(&mut self) -> Result<Option<SourceNode>> {
        let Some(row) = self.next().await? else {
            return Ok(None);
        };
        let node: Node = row
            .get("u")
            .map_err(|e| MigrateError::GraphFetch(format!("reading a vertex: {}", e)))?;
        let properties = entity_properties(node.keys(), |key| {
            node.get::<serde_json::Value>(key)
                .map_err(|e| MigrateError::GraphFetch(format!("reading a vertex property: {}", e)))
        })?;
        Ok(Some(SourceNode {
            id: node.id(),
            labels: node.labels().into_iter().map(str::to_string).collect(),
            properties,
        }))
    }

    async fn start_relationships(&mut self) -> Result<()> {
        self.start("MATCH (u)-[e]->(v) RETURN e;").await
    }

    async fn next_relationship(&mut self) -> Result<Option<SourceRelationship>> {
        let Some(row) = self.next().await? else {
            return Ok(None);
        };
        let relation: Relation = row
            .get("e")
            .map_err(|e| MigrateError::GraphFetch(format!("reading an edge: {}", e)))?;
        let properties = entity_properties(relation.keys(), |key| {
            relation
                .get::<serde_json::Value>(key)
                .map_err(|e| MigrateError::GraphFetch(format!("reading an edge property: {}", e)))
        })?;
        Ok(Some(SourceRelationship {
            start_id: relation.start_node_id(),
            end_id: relation.end_node_id(),
            edge_type: relation.typ().to_string(),
            properties,
        }))
    }

    async fn index_info(&mut self) -> Result<IndexInfo> {
        self.start("SHOW INDEX INFO;").await?;
        let mut info = IndexInfo::default();
        while let Some(row) = self.next().await? {
            let kind: String = row
                .get("index type")
                .map_err(|e| MigrateError::GraphFetch(format!("reading index info: {}", e)))?;
            let label: String = row
                .get("label")
                .map_err(|e| MigrateError::GraphFetch(format!("reading index info: {}", e)))?;
            match kind.as_str() {
                "label" => info.label.push(label),
                "label+property" => {
                    let property: String = row.get("property").map_err(|e| {
                        MigrateError::GraphFetch(format!("reading index info: {}", e))
                    })?;
                    info.label_property.push((label, property));
                }
                other => {
                    return Err(MigrateError::UnexpectedResult(format!(
                        "received unsupported index type '{}'",
                        other
                    )))
                }
            }
        }
        Ok(info)
    }

    async fn constraint_info(&mut self) -> Result<ConstraintInfo> {
        self.start("SHOW CONSTRAINT INFO;").await?;
        let mut info = ConstraintInfo::default();
        while let Some(row) = self.next().await? {
            let kind: String = row
                .get("constraint type")
                .map_err(|e| MigrateError::GraphFetch(format!("reading constraint info: {}", e)))?;
            let label: String = row
                .get("label")
                .map_err(|e| MigrateError::GraphFetch(format!("reading constraint info: {}", e)))?;
            let properties: serde_json::Value = row
                .get("properties")
                .map_err(|e| MigrateError::GraphFetch(format!("reading constraint info: {}", e)))?;
            match (kind.as_str(), properties) {
                ("existence", serde_json::Value::String(property)) => {
                    info.existence.push((label, property));
                }
                ("unique", serde_json::Value::Array(items)) => {
                    let mut names = Vec::with_capacity(items.len());
                    for item in items {
                        match item {
                            serde_json::Value::String(name) => names.push(name),
                            other => {
                                return Err(MigrateError::UnexpectedResult(format!(
                                    "received unexpected unique constraint property {:?}",
                                    other
                                )))
                            }
                        }
                    }
                    info.unique.push((label, names));
                }
                ("unique", serde_json::Value::String(property)) => {
                    info.unique.push((label, vec![property]));
                }
                (other, _) => {
                    return Err(MigrateError::UnexpectedResult(format!(
                        "received unsupported constraint type '{}'",
                        other
                    )))
                }
            }
        }
        Ok(info)
    }
}
