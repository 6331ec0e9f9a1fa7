use std::collections::VecDeque;

use async_trait::async_trait;

use super::*;
use crate::core::Row;

/// Fake graph client that records every executed statement with its bound
/// parameters. Statements that ask for `COUNT(u)` get a scripted count row
/// back; everything else returns no rows.
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

fn props(entries: &[(&str, Value)]) -> PropertyMap {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[test]
fn test_escape_name() {
    assert_eq!(escape_name("actors"), "`actors`");
    assert_eq!(escape_name("weird`name"), "`weird``name`");
}

#[tokio::test]
async fn test_create_node_statements() {
    let mut dest = GraphDestination::new(FakeGraphClient::new());

    dest.create_node(&[], &PropertyMap::new()).await.unwrap();
    dest.create_node(&["label1".to_string()], &PropertyMap::new())
        .await
        .unwrap();
    dest.create_node(
        &["label1".to_string(), "label2".to_string()],
        &props(&[("prop1", Value::from("value1")), ("prop2", Value::Float(3.14))]),
    )
    .await
    .unwrap();

    let executed = &dest.client.executed;
    assert_eq!(executed[0].0, "CREATE (u {});");
    assert!(executed[0].1.is_empty());
    assert_eq!(executed[1].0, "CREATE (u:`label1` {});");
    assert_eq!(
        executed[2].0,
        "CREATE (u:`label1`:`label2` {`prop1`: $param0, `prop2`: $param1});"
    );
    assert_eq!(
        executed[2].1,
        props(&[
            ("param0", Value::from("value1")),
            ("param1", Value::Float(3.14)),
        ])
    );
}

#[tokio::test]
async fn test_create_relationship_statement_and_param_order() {
    let mut dest = GraphDestination::new(FakeGraphClient::new());

    let count = dest
        .create_relationship(
            "actors",
            &props(&[("actor_id", Value::from("a1"))]),
            "movies",
            &props(&[("movie_id", Value::from("m1"))]),
            "movie_roles",
            &props(&[("characters", Value::from("Bruce, Batman"))]),
            false,
        )
        .await
        .unwrap();
    assert_eq!(count, 1);

    let (statement, params) = &dest.client.executed[0];
    assert_eq!(
        statement,
        "MATCH (u:`actors`), (v:`movies`) \
         WHERE u.`actor_id` = $param0 AND v.`movie_id` = $param1 \
         CREATE (u)-[:`movie_roles` {`characters`: $param2}]->(v) RETURN COUNT(u);"
    );
    assert_eq!(
        params,
        &props(&[
            ("param0", Value::from("a1")),
            ("param1", Value::from("m1")),
            ("param2", Value::from("Bruce, Batman")),
        ])
    );
}

#[tokio::test]
async fn test_create_relationship_merge_without_properties() {
    let mut dest = GraphDestination::new(FakeGraphClient::new());

    dest.create_relationship(
        "tvepisodes",
        &props(&[("episode_id", Value::Int(5))]),
        "tvseries",
        &props(&[("series_id", Value::Int(2))]),
        "tvepisodes_to_tvseries",
        &PropertyMap::new(),
        true,
    )
    .await
    .unwrap();

    let (statement, _) = &dest.client.executed[0];
    assert_eq!(
        statement,
        "MATCH (u:`tvepisodes`), (v:`tvseries`) \
         WHERE u.`episode_id` = $param0 AND v.`series_id` = $param1 \
         MERGE (u)-[:`tvepisodes_to_tvseries`]->(v) RETURN COUNT(u);"
    );
}

#[tokio::test]
async fn test_multi_column_id_matcher_joined_with_and() {
    let mut dest = GraphDestination::new(FakeGraphClient::new());

    dest.create_relationship(
        "order_items",
        &props(&[("region", Value::from("eu")), ("number", Value::Int(7))]),
        "orders",
        &props(&[("region", Value::from("eu")), ("number", Value::Int(7))]),
        "order_items_to_orders",
        &PropertyMap::new(),
        false,
    )
    .await
    .unwrap();

    let (statement, _) = &dest.client.executed[0];
    assert_eq!(
        statement,
        "MATCH (u:`order_items`), (v:`orders`) \
         WHERE u.`region` = $param0 AND u.`number` = $param1 \
         AND v.`region` = $param2 AND v.`number` = $param3 \
         CREATE (u)-[:`order_items_to_orders`]->(v) RETURN COUNT(u);"
    );
}

#[tokio::test]
async fn test_index_and_constraint_statements() {
    let mut dest = GraphDestination::new(FakeGraphClient::new());

    dest.create_label_index("actors").await.unwrap();
    dest.create_label_property_index("actors", "actor_id").await.unwrap();
    dest.drop_label_index("actors").await.unwrap();
    dest.drop_label_property_index("actors", "actor_id").await.unwrap();
    dest.create_existence_constraint("actors", "name").await.unwrap();
    dest.create_unique_constraint("actors", &["actor_id".to_string(), "name".to_string()])
        .await
        .unwrap();
    dest.remove_label_from_nodes("__mg_vertex__").await.unwrap();
    dest.remove_property_from_nodes("__mg_id__").await.unwrap();

    let statements: Vec<&str> = dest.client.executed.iter().map(|(s, _)| s.as_str()).collect();
    assert_eq!(
        statements,
        vec![
            "CREATE INDEX ON :`actors`;",
            "CREATE INDEX ON :`actors`(`actor_id`);",
            "DROP INDEX ON :`actors`;",
            "DROP INDEX ON :`actors`(`actor_id`);",
            "CREATE CONSTRAINT ON (u:`actors`) ASSERT EXISTS (u.`name`);",
            "CREATE CONSTRAINT ON (u:`actors`) ASSERT u.`actor_id`, u.`name` IS UNIQUE;",
            "MATCH (u) REMOVE u:`__mg_vertex__`;",
            "MATCH (u) REMOVE u.`__mg_id__`;",
        ]
    );
}

#[tokio::test]
async fn test_unexpected_row_is_an_error() {
    let mut client = FakeGraphClient::new();
    client.pending.push_back(vec![Value::Int(1)]);
    let mut dest = GraphDestination::new(client);

    let err = dest
        .create_node(&["actors".to_string()], &PropertyMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, MigrateError::UnexpectedResult(_)));
}

#[tokio::test]
async fn test_relationship_count_is_propagated() {
    let mut dest = GraphDestination::new(FakeGraphClient::with_counts(vec![0]));

    let count = dest
        .create_relationship(
            "a",
            &props(&[("id", Value::Int(1))]),
            "b",
            &props(&[("id", Value::Int(2))]),
            "t",
            &PropertyMap::new(),
            false,
        )
        .await
        .unwrap();
    assert_eq!(count, 0);
}
