mod common;

use std::sync::{Arc, Mutex};

use chnative::protocol::{Query, TransportError};
use chnative::{BlockBuilder, Client, DataType, QueryEvent, QueryOptions, QueryStage, Row, Value};

use common::{MockServer, Session, header};

/// Answers with one row describing how the query arrived.
fn describe(query: &Query, session: &mut Session) -> Result<(), TransportError> {
    let threads = query
        .settings
        .get("max_threads")
        .map(ToString::to_string)
        .unwrap_or_default();
    session.send_block(header(&[
        ("id", DataType::String),
        ("max_threads", DataType::String),
        ("stage", DataType::String),
    ]))?;
    session.send_block(
        BlockBuilder::new()
            .column("id", DataType::String, vec![query.query_id.clone()])
            .column("max_threads", DataType::String, vec![threads])
            .column("stage", DataType::String, vec![format!("{:?}", query.stage)])
            .build()
            .unwrap(),
    )?;
    session.end()
}

/// Records the query id and row count of every insert into `events`.
fn server(inserts: Arc<Mutex<Vec<(String, usize)>>>) -> MockServer {
    MockServer::start(move |query, session| match query.sql.as_str() {
        "SELECT describe()" => describe(query, session),
        "INSERT INTO events VALUES" => {
            session.send_block(header(&[("id", DataType::UInt32)]))?;
            let block = session.recv_block()?;
            assert!(session.recv_block()?.is_empty());
            inserts.lock().unwrap().push((query.query_id.clone(), block.rows()));
            session.end()
        }
        other => panic!("unexpected query {other:?}"),
    })
}

fn options() -> QueryOptions {
    QueryOptions::new()
        .with_query_id("report-7")
        .with_setting("max_threads", 8i64)
        .with_stage(QueryStage::WithMergeableState)
}

#[test]
fn query_one_carries_options() {
    let server = server(Arc::default());
    let client = Client::connect(server.config()).unwrap();

    let row: Option<(String, String, String)> = client
        .query_one_with_options("SELECT describe()", &options())
        .unwrap();
    assert_eq!(
        row,
        Some((
            "report-7".to_string(),
            "8".to_string(),
            "WithMergeableState".to_string()
        ))
    );

    let (id, threads, stage): (String, String, String) = client.query_one("SELECT describe()").unwrap().unwrap();
    assert_ne!(id, "report-7");
    assert_eq!(threads, "");
    assert_eq!(stage, "Complete");
}

#[test]
fn query_rows_carries_options() {
    let server = server(Arc::default());
    let client = Client::connect(server.config()).unwrap();

    let rows: Vec<Row> = client
        .query_rows_with_options("SELECT describe()", &options())
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get::<String, _>("id").unwrap(), "report-7");
    assert_eq!(rows[0].get::<String, _>("max_threads").unwrap(), "8");
}

#[test]
fn query_events_carries_options() {
    let server = server(Arc::default());
    let client = Client::connect(server.config()).unwrap();

    let events: Vec<QueryEvent> = client
        .query_events_with_options("SELECT describe()", &options())
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    let Some(QueryEvent::Data(block)) = events.last() else {
        panic!("expected a data block last, got {events:?}");
    };
    assert_eq!(block.column("stage").unwrap().values, vec![Value::from("WithMergeableState")]);
}

#[test]
fn insert_into_names_the_table() {
    let inserts = Arc::new(Mutex::new(Vec::new()));
    let server = server(Arc::clone(&inserts));
    let client = Client::connect(server.config()).unwrap();

    let block = BlockBuilder::new()
        .column("id", DataType::UInt32, vec![1u32, 2, 3])
        .build()
        .unwrap();
    client.insert_into("events", &block).unwrap();
    client
        .insert_into_with_options("events", &block, &QueryOptions::new().with_query_id("load-1"))
        .unwrap();

    let inserts = inserts.lock().unwrap();
    assert_eq!(inserts.len(), 2);
    assert_eq!(inserts[0].1, 3);
    assert_eq!(inserts[1], ("load-1".to_string(), 3));
}
