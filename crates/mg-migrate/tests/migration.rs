//! End-to-end planner scenarios against recording fakes.
//!
//! The fake graph client records every `(statement, params)` pair, so each
//! scenario asserts the exact statement stream a source schema produces.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;

use mg_migrate::core::{ExistenceConstraint, ForeignKey, UniqueConstraint};
use mg_migrate::migrate::graph::{
    migrate_graph_database, ConstraintInfo, GraphSource, IndexInfo, SourceNode,
    SourceRelationship,
};
use mg_migrate::{
    migrate_sql_database, GraphClient, GraphDestination, MigrateError, PropertyMap, Result, Row,
    SchemaInfo, SqlSource, Table, Value,
};

/// Fake SQL source with a canned schema and canned rows per table.
struct FakeSqlSource {
    schema: SchemaInfo,
    rows: HashMap<String, Vec<Row>>,
    scan: Option<VecDeque<Row>>,
}

impl FakeSqlSource {
    fn new(schema: SchemaInfo, rows: &[(&str, Vec<Row>)]) -> Self {
        Self {
            schema,
            rows: rows
                .iter()
                .map(|(name, rows)| (name.to_string(), rows.clone()))
                .collect(),
            scan: None,
        }
    }
}

#[async_trait]
impl SqlSource for FakeSqlSource {
    async fn schema_info(&mut self) -> Result<SchemaInfo> {
        Ok(self.schema.clone())
    }

    async fn start_scan(&mut self, table: &Table) -> Result<()> {
        let rows = self.rows.get(&table.name).cloned().unwrap_or_default();
        self.scan = Some(rows.into());
        Ok(())
    }

    async fn next_row(&mut self) -> Result<Option<Row>> {
        Ok(self.scan.as_mut().and_then(VecDeque::pop_front))
    }
}

/// Fake graph client recording executed statements. Relationship-creating
/// statements are answered with a scripted count row (default 1).
struct FakeGraphClient {
    executed: Vec<(String, PropertyMap)>,
    pending: VecDeque<Row>,
    counts: VecDeque<i64>,
}

impl FakeGraphClient {
    fn new() -> Self {
        Self {
            executed: Vec::new(),
            pending: VecDeque::new(),
            counts: VecDeque::new(),
        }
    }

    fn with_counts(counts: Vec<i64>) -> Self {
        Self {
            counts: counts.into(),
            ..Self::new()
        }
    }
}

#[async_trait]
impl GraphClient for FakeGraphClient {
    async fn execute(&mut self, statement: &str, params: PropertyMap) -> Result<()> {
        self.executed.push((statement.to_string(), params));
        if statement.ends_with("RETURN COUNT(u);") {
            let count = self.counts.pop_front().unwrap_or(1);
            self.pending.push_back(vec![Value::Int(count)]);
        }
        Ok(())
    }

    async fn fetch_one(&mut self) -> Result<Option<Row>> {
        Ok(self.pending.pop_front())
    }
}

fn table(name: &str, columns: &[&str], primary_key: &[usize]) -> Table {
    Table {
        schema: "public".to_string(),
        name: name.to_string(),
        columns: columns.iter().map(|c| c.to_string()).collect(),
        primary_key: primary_key.to_vec(),
        foreign_keys: vec![],
        primary_key_referenced: false,
    }
}

fn props(entries: &[(&str, Value)]) -> PropertyMap {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn s(text: &str) -> Value {
    Value::String(text.to_string())
}

/// actors / movies / movie_roles: the classic join-table shape.
fn movie_schema(roles_primary_key: &[usize]) -> SchemaInfo {
    let mut actors = table("actors", &["actor_id", "name"], &[0]);
    actors.primary_key_referenced = true;
    let mut movies = table("movies", &["movie_id", "title"], &[0]);
    movies.primary_key_referenced = true;
    let mut roles = table(
        "movie_roles",
        &["actor_id", "movie_id", "characters"],
        roles_primary_key,
    );
    roles.foreign_keys = vec![0, 1];

    SchemaInfo {
        default_schema: "public".to_string(),
        tables: vec![actors, movies, roles],
        foreign_keys: vec![
            ForeignKey {
                child_table: 2,
                parent_table: 0,
                child_columns: vec![0],
                parent_columns: vec![0],
            },
            ForeignKey {
                child_table: 2,
                parent_table: 1,
                child_columns: vec![1],
                parent_columns: vec![0],
            },
        ],
        unique_constraints: vec![],
        existence_constraints: vec![],
    }
}

#[tokio::test]
async fn join_table_becomes_an_edge() {
    let mut source = FakeSqlSource::new(
        movie_schema(&[]),
        &[
            ("actors", vec![vec![s("a1"), s("Bale")]]),
            ("movies", vec![vec![s("m1"), s("Batman Begins")]]),
            ("movie_roles", vec![vec![s("a1"), s("m1"), s("Bruce, Batman")]]),
        ],
    );
    let mut destination = GraphDestination::new(FakeGraphClient::new());

    migrate_sql_database(&mut source, &mut destination).await.unwrap();

    let executed = destination.into_inner().executed;
    let expected: Vec<(String, PropertyMap)> = vec![
        (
            "CREATE (u:`actors` {`actor_id`: $param0, `name`: $param1});".to_string(),
            props(&[("param0", s("a1")), ("param1", s("Bale"))]),
        ),
        ("CREATE INDEX ON :`actors`(`actor_id`);".to_string(), props(&[])),
        (
            "CREATE (u:`movies` {`movie_id`: $param0, `title`: $param1});".to_string(),
            props(&[("param0", s("m1")), ("param1", s("Batman Begins"))]),
        ),
        ("CREATE INDEX ON :`movies`(`movie_id`);".to_string(), props(&[])),
        (
            "MATCH (u:`actors`), (v:`movies`) \
             WHERE u.`actor_id` = $param0 AND v.`movie_id` = $param1 \
             CREATE (u)-[:`movie_roles` {`characters`: $param2}]->(v) RETURN COUNT(u);"
                .to_string(),
            props(&[
                ("param0", s("a1")),
                ("param1", s("m1")),
                ("param2", s("Bruce, Batman")),
            ]),
        ),
        ("DROP INDEX ON :`actors`(`actor_id`);".to_string(), props(&[])),
        ("DROP INDEX ON :`movies`(`movie_id`);".to_string(), props(&[])),
    ];
    assert_eq!(executed, expected);
}

#[tokio::test]
async fn parent_child_foreign_key_becomes_a_to_edge() {
    let mut tvseries = table("tvseries", &["series_id"], &[0]);
    tvseries.primary_key_referenced = true;
    let mut tvepisodes = table(
        "tvepisodes",
        &["series_id", "episode_id", "title", "season_number"],
        &[1],
    );
    tvepisodes.foreign_keys = vec![0];
    let schema = SchemaInfo {
        default_schema: "public".to_string(),
        tables: vec![tvseries, tvepisodes],
        foreign_keys: vec![ForeignKey {
            child_table: 1,
            parent_table: 0,
            child_columns: vec![0],
            parent_columns: vec![0],
        }],
        unique_constraints: vec![],
        existence_constraints: vec![],
    };

    let mut source = FakeSqlSource::new(
        schema,
        &[
            ("tvseries", vec![vec![Value::Int(1)]]),
            (
                "tvepisodes",
                vec![vec![Value::Int(1), Value::Int(10), s("Pilot"), Value::Int(1)]],
            ),
        ],
    );
    let mut destination = GraphDestination::new(FakeGraphClient::new());

    migrate_sql_database(&mut source, &mut destination).await.unwrap();

    let executed = destination.into_inner().executed;
    let edge = executed
        .iter()
        .find(|(statement, _)| statement.starts_with("MATCH "))
        .expect("an edge statement was emitted");
    assert_eq!(
        edge.0,
        "MATCH (u:`tvepisodes`), (v:`tvseries`) \
         WHERE u.`episode_id` = $param0 AND v.`series_id` = $param1 \
         CREATE (u)-[:`tvepisodes_to_tvseries`]->(v) RETURN COUNT(u);"
    );
    assert_eq!(
        edge.1,
        props(&[("param0", Value::Int(10)), ("param1", Value::Int(1))])
    );
}

#[tokio::test]
async fn rich_intermediate_table_stays_a_node() {
    // role_awards has two foreign keys, but award_reviewers references its
    // primary key, so it must remain a node and produce `_to_` edges.
    let mut actors = table("actors", &["actor_id"], &[0]);
    actors.primary_key_referenced = true;
    let mut movies = table("movies", &["movie_id"], &[0]);
    movies.primary_key_referenced = true;
    let mut awards = table("role_awards", &["actor_id", "movie_id"], &[0, 1]);
    awards.foreign_keys = vec![0, 1];
    awards.primary_key_referenced = true;
    let mut reviewers = table("award_reviewers", &["actor_id"], &[]);
    reviewers.foreign_keys = vec![2];

    let schema = SchemaInfo {
        default_schema: "public".to_string(),
        tables: vec![actors, movies, awards, reviewers],
        foreign_keys: vec![
            ForeignKey {
                child_table: 2,
                parent_table: 0,
                child_columns: vec![0],
                parent_columns: vec![0],
            },
            ForeignKey {
                child_table: 2,
                parent_table: 1,
                child_columns: vec![1],
                parent_columns: vec![0],
            },
            ForeignKey {
                child_table: 3,
                parent_table: 2,
                child_columns: vec![0],
                parent_columns: vec![0],
            },
        ],
        unique_constraints: vec![],
        existence_constraints: vec![],
    };

    let mut source = FakeSqlSource::new(
        schema,
        &[
            ("actors", vec![vec![s("a1")]]),
            ("movies", vec![vec![s("m1")]]),
            ("role_awards", vec![vec![s("a1"), s("m1")]]),
            ("award_reviewers", vec![]),
        ],
    );
    let mut destination = GraphDestination::new(FakeGraphClient::new());

    migrate_sql_database(&mut source, &mut destination).await.unwrap();

    let statements: Vec<String> = destination
        .into_inner()
        .executed
        .into_iter()
        .map(|(statement, _)| statement)
        .collect();

    // role_awards rows were created as nodes, not edges.
    assert!(statements
        .iter()
        .any(|statement| statement.starts_with("CREATE (u:`role_awards` ")));
    // Its two foreign keys produced `_to_` edges.
    assert!(statements
        .iter()
        .any(|statement| statement.contains("[:`role_awards_to_actors`]")));
    assert!(statements
        .iter()
        .any(|statement| statement.contains("[:`role_awards_to_movies`]")));
    // No plain `role_awards` edge type was emitted.
    assert!(!statements
        .iter()
        .any(|statement| statement.contains("[:`role_awards`]")));
}

#[tokio::test]
async fn null_foreign_key_component_skips_the_row() {
    let mut source = FakeSqlSource::new(
        movie_schema(&[]),
        &[
            ("actors", vec![vec![s("a1"), s("Bale")]]),
            ("movies", vec![vec![s("m1"), s("Batman Begins")]]),
            (
                "movie_roles",
                vec![
                    vec![Value::Null, s("m1"), s("nobody")],
                    vec![s("a1"), s("m1"), s("Bruce, Batman")],
                ],
            ),
        ],
    );
    let mut destination = GraphDestination::new(FakeGraphClient::new());

    migrate_sql_database(&mut source, &mut destination).await.unwrap();

    let edges: Vec<String> = destination
        .into_inner()
        .executed
        .into_iter()
        .map(|(statement, _)| statement)
        .filter(|statement| statement.starts_with("MATCH "))
        .collect();
    // Only the well-defined row produced an edge.
    assert_eq!(edges.len(), 1);
    assert!(edges[0].contains("$param2"));
}

#[tokio::test]
async fn table_without_primary_key_merges_edges() {
    let mut tvseries = table("tvseries", &["series_id"], &[0]);
    tvseries.primary_key_referenced = true;
    let mut log = table("view_log", &["series_id", "viewer"], &[]);
    log.foreign_keys = vec![0];
    let schema = SchemaInfo {
        default_schema: "public".to_string(),
        tables: vec![tvseries, log],
        foreign_keys: vec![ForeignKey {
            child_table: 1,
            parent_table: 0,
            child_columns: vec![0],
            parent_columns: vec![0],
        }],
        unique_constraints: vec![],
        existence_constraints: vec![],
    };

    let duplicate = vec![Value::Int(1), s("alice")];
    let mut source = FakeSqlSource::new(
        schema,
        &[
            ("tvseries", vec![vec![Value::Int(1)]]),
            ("view_log", vec![duplicate.clone(), duplicate]),
        ],
    );
    // MERGE of an existing edge reports 1 either way; the planner must not
    // assert on the count.
    let mut destination = GraphDestination::new(FakeGraphClient::with_counts(vec![1, 1]));

    migrate_sql_database(&mut source, &mut destination).await.unwrap();

    let executed = destination.into_inner().executed;
    // The no-PK table gets a label staging index rather than a
    // label-property one.
    assert!(executed
        .iter()
        .any(|(statement, _)| statement == "CREATE INDEX ON :`view_log`;"));
    let edges: Vec<&(String, PropertyMap)> = executed
        .iter()
        .filter(|(statement, _)| statement.starts_with("MATCH "))
        .collect();
    assert_eq!(edges.len(), 2);
    for (statement, params) in edges {
        // The node's own identity uses every column.
        assert_eq!(
            statement,
            "MATCH (u:`view_log`), (v:`tvseries`) \
             WHERE u.`series_id` = $param0 AND u.`viewer` = $param1 \
             AND v.`series_id` = $param2 \
             MERGE (u)-[:`view_log_to_tvseries`]->(v) RETURN COUNT(u);"
        );
        assert_eq!(
            params,
            &props(&[
                ("param0", Value::Int(1)),
                ("param1", s("alice")),
                ("param2", Value::Int(1)),
            ])
        );
    }
}

#[tokio::test]
async fn unexpected_relationship_count_aborts() {
    let mut source = FakeSqlSource::new(
        movie_schema(&[0, 1]),
        &[
            ("actors", vec![vec![s("a1"), s("Bale")]]),
            ("movies", vec![vec![s("m1"), s("Batman Begins")]]),
            ("movie_roles", vec![vec![s("a1"), s("m1"), s("Bruce")]]),
        ],
    );
    // The endpoint match finds nothing: zero relationships created.
    let mut destination = GraphDestination::new(FakeGraphClient::with_counts(vec![0]));

    let err = migrate_sql_database(&mut source, &mut destination)
        .await
        .unwrap_err();
    assert!(matches!(err, MigrateError::UnexpectedResult(_)));
}

#[tokio::test]
async fn constraints_of_relationship_tables_are_skipped() {
    let mut schema = movie_schema(&[]);
    schema.existence_constraints = vec![
        ExistenceConstraint { table: 0, column: 1 },
        ExistenceConstraint { table: 2, column: 2 },
    ];
    schema.unique_constraints = vec![
        UniqueConstraint { table: 0, columns: vec![0] },
        UniqueConstraint { table: 2, columns: vec![0, 1] },
    ];

    let mut source = FakeSqlSource::new(
        schema,
        &[("actors", vec![]), ("movies", vec![]), ("movie_roles", vec![])],
    );
    let mut destination = GraphDestination::new(FakeGraphClient::new());

    migrate_sql_database(&mut source, &mut destination).await.unwrap();

    let statements: Vec<String> = destination
        .into_inner()
        .executed
        .into_iter()
        .map(|(statement, _)| statement)
        .collect();
    assert!(statements
        .iter()
        .any(|s| s == "CREATE CONSTRAINT ON (u:`actors`) ASSERT EXISTS (u.`name`);"));
    assert!(statements
        .iter()
        .any(|s| s == "CREATE CONSTRAINT ON (u:`actors`) ASSERT u.`actor_id` IS UNIQUE;"));
    // Nothing was emitted for the relationship table.
    assert!(!statements.iter().any(|s| s.contains(":`movie_roles`)")));
}

#[tokio::test]
async fn non_default_schema_gets_prefixed_names() {
    let mut parent = table("events", &["event_id"], &[0]);
    parent.schema = "audit".to_string();
    parent.primary_key_referenced = true;
    let mut child = table("entries", &["event_id", "note"], &[]);
    child.schema = "audit".to_string();
    child.foreign_keys = vec![0];
    let schema = SchemaInfo {
        default_schema: "public".to_string(),
        tables: vec![parent, child],
        foreign_keys: vec![ForeignKey {
            child_table: 1,
            parent_table: 0,
            child_columns: vec![0],
            parent_columns: vec![0],
        }],
        unique_constraints: vec![],
        existence_constraints: vec![],
    };

    let mut source = FakeSqlSource::new(
        schema,
        &[
            ("events", vec![vec![Value::Int(1)]]),
            ("entries", vec![vec![Value::Int(1), s("created")]]),
        ],
    );
    let mut destination = GraphDestination::new(FakeGraphClient::new());

    migrate_sql_database(&mut source, &mut destination).await.unwrap();

    let statements: Vec<String> = destination
        .into_inner()
        .executed
        .into_iter()
        .map(|(statement, _)| statement)
        .collect();
    assert!(statements
        .iter()
        .any(|s| s.starts_with("CREATE (u:`audit_events` ")));
    assert!(statements
        .iter()
        .any(|s| s.contains("[:`audit_entries_to_audit_events`]")));
}

// ---------------------------------------------------------------------------
// Graph-to-graph scenarios
// ---------------------------------------------------------------------------

/// Fake graph source with canned vertices, relationships, indexes and
/// constraints.
struct FakeGraphSource {
    nodes: VecDeque<SourceNode>,
    relationships: VecDeque<SourceRelationship>,
    indexes: IndexInfo,
    constraints: ConstraintInfo,
}

#[async_trait]
impl GraphSource for FakeGraphSource {
    async fn start_nodes(&mut self) -> Result<()> {
        Ok(())
    }

    async fn next_node(&mut self) -> Result<Option<SourceNode>> {
        Ok(self.nodes.pop_front())
    }

    async fn start_relationships(&mut self) -> Result<()> {
        Ok(())
    }

    async fn next_relationship(&mut self) -> Result<Option<SourceRelationship>> {
        Ok(self.relationships.pop_front())
    }

    async fn index_info(&mut self) -> Result<IndexInfo> {
        Ok(self.indexes.clone())
    }

    async fn constraint_info(&mut self) -> Result<ConstraintInfo> {
        Ok(self.constraints.clone())
    }
}

#[tokio::test]
async fn graph_round_trip_leaves_no_internal_traces() {
    let mut source = FakeGraphSource {
        nodes: vec![
            SourceNode {
                id: 1,
                labels: vec!["Person".to_string()],
                properties: props(&[("id", Value::Int(1))]),
            },
            SourceNode {
                id: 2,
                labels: vec!["Person".to_string()],
                properties: props(&[("id", Value::Int(2))]),
            },
        ]
        .into(),
        relationships: vec![SourceRelationship {
            start_id: 1,
            end_id: 2,
            edge_type: "KNOWS".to_string(),
            properties: props(&[("since", Value::Int(2020))]),
        }]
        .into(),
        indexes: IndexInfo {
            label: vec!["Person".to_string()],
            label_property: vec![("Person".to_string(), "id".to_string())],
        },
        constraints: ConstraintInfo {
            existence: vec![("Person".to_string(), "id".to_string())],
            unique: vec![("Person".to_string(), vec!["id".to_string()])],
        },
    };
    let mut destination = GraphDestination::new(FakeGraphClient::new());

    migrate_graph_database(&mut source, &mut destination).await.unwrap();

    let executed = destination.into_inner().executed;
    let expected: Vec<(String, PropertyMap)> = vec![
        (
            "CREATE INDEX ON :`__mg_vertex__`(`__mg_id__`);".to_string(),
            props(&[]),
        ),
        (
            "CREATE (u:`__mg_vertex__`:`Person` {`__mg_id__`: $param0, `id`: $param1});"
                .to_string(),
            props(&[("param0", Value::Int(1)), ("param1", Value::Int(1))]),
        ),
        (
            "CREATE (u:`__mg_vertex__`:`Person` {`__mg_id__`: $param0, `id`: $param1});"
                .to_string(),
            props(&[("param0", Value::Int(2)), ("param1", Value::Int(2))]),
        ),
        (
            "MATCH (u:`__mg_vertex__`), (v:`__mg_vertex__`) \
             WHERE u.`__mg_id__` = $param0 AND v.`__mg_id__` = $param1 \
             CREATE (u)-[:`KNOWS` {`since`: $param2}]->(v) RETURN COUNT(u);"
                .to_string(),
            props(&[
                ("param0", Value::Int(1)),
                ("param1", Value::Int(2)),
                ("param2", Value::Int(2020)),
            ]),
        ),
        ("CREATE INDEX ON :`Person`;".to_string(), props(&[])),
        ("CREATE INDEX ON :`Person`(`id`);".to_string(), props(&[])),
        (
            "CREATE CONSTRAINT ON (u:`Person`) ASSERT EXISTS (u.`id`);".to_string(),
            props(&[]),
        ),
        (
            "CREATE CONSTRAINT ON (u:`Person`) ASSERT u.`id` IS UNIQUE;".to_string(),
            props(&[]),
        ),
        (
            "DROP INDEX ON :`__mg_vertex__`(`__mg_id__`);".to_string(),
            props(&[]),
        ),
        ("MATCH (u) REMOVE u:`__mg_vertex__`;".to_string(), props(&[])),
        ("MATCH (u) REMOVE u.`__mg_id__`;".to_string(), props(&[])),
    ];
    assert_eq!(executed, expected);
}

#[tokio::test]
async fn empty_graph_source_creates_no_staging_index() {
    let mut source = FakeGraphSource {
        nodes: VecDeque::new(),
        relationships: VecDeque::new(),
        indexes: IndexInfo::default(),
        constraints: ConstraintInfo::default(),
    };
    let mut destination = GraphDestination::new(FakeGraphClient::new());

    migrate_graph_database(&mut source, &mut destination).await.unwrap();

    let statements: Vec<String> = destination
        .into_inner()
        .executed
        .into_iter()
        .map(|(statement, _)| statement)
        .collect();
    assert_eq!(
        statements,
        vec![
            "MATCH (u) REMOVE u:`__mg_vertex__`;".to_string(),
            "MATCH (u) REMOVE u.`__mg_id__`;".to_string(),
        ]
    );
}
