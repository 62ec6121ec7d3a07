mod common;

use std::sync::{Arc, Mutex};

use chnative::protocol::Response;
use chnative::{Block, BlockBuilder, Client, DataType, Error, ServerException, Value};

use common::{MockServer, header, select_one};

const INSERT: &str = "INSERT INTO events VALUES";

fn sample() -> Block {
    header(&[("id", DataType::UInt32), ("name", DataType::String)])
}

/// Accepts inserts into `events` and keeps every block it receives.
fn server(received: Arc<Mutex<Vec<Block>>>) -> MockServer {
    MockServer::start(move |query, session| match query.sql.as_str() {
        INSERT => {
            session.send_block(sample())?;
            let block = session.recv_block()?;
            if !block.is_empty() {
                received.lock().unwrap().push(block);
                let terminator = session.recv_block()?;
                assert!(terminator.is_empty());
            }
            session.end()
        }
        "INSERT INTO missing VALUES" => session.send(Response::Exception(ServerException::new(
            60,
            "DB::Exception",
            "Table default.missing does not exist",
        ))),
        "SELECT 1" => select_one(session),
        other => panic!("unexpected query {other:?}"),
    })
}

#[test]
fn insert_sends_the_normalized_block() {
    let received = Arc::new(Mutex::new(Vec::new()));
    let server = server(Arc::clone(&received));
    let client = Client::connect(server.config()).unwrap();

    // reversed column order is matched by name
    let block = BlockBuilder::new()
        .column("name", DataType::String, vec!["a", "b"])
        .column("id", DataType::UInt32, vec![1u32, 2])
        .build()
        .unwrap();
    client.insert(INSERT, &block).unwrap();

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    let names: Vec<&str> = received[0].columns().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["id", "name"]);
    assert_eq!(received[0].columns()[0].values, vec![Value::UInt32(1), Value::UInt32(2)]);
    assert_eq!(received[0].rows(), 2);
}

#[test]
fn mismatched_block_aborts_cleanly() {
    let received = Arc::new(Mutex::new(Vec::new()));
    let server = server(Arc::clone(&received));
    let client = Client::connect(server.config()).unwrap();

    let block = BlockBuilder::new()
        .column("id", DataType::UInt32, vec![1u32])
        .column("title", DataType::String, vec!["a"])
        .build()
        .unwrap();
    let err = client.insert(INSERT, &block).unwrap_err();
    assert!(matches!(err, Error::Mismatch(_)), "{err}");
    assert!(err.is_malformed());
    assert!(!err.requires_reset());
    assert!(received.lock().unwrap().is_empty());

    let one: Option<(u8,)> = client.query_one("SELECT 1").unwrap();
    assert_eq!(one, Some((1,)));
    assert_eq!(server.connections(), 1);
}

#[test]
fn column_count_mismatch_is_reported() {
    let server = server(Arc::new(Mutex::new(Vec::new())));
    let client = Client::connect(server.config()).unwrap();

    let block = BlockBuilder::new()
        .column("id", DataType::UInt32, vec![1u32])
        .build()
        .unwrap();
    let err = client.insert(INSERT, &block).unwrap_err();
    assert!(err.to_string().contains("column count mismatch"), "{err}");
    assert!(client.ping().unwrap());
}

#[test]
fn exception_before_sample_is_raised() {
    let server = server(Arc::new(Mutex::new(Vec::new())));
    let client = Client::connect(server.config()).unwrap();

    let block = BlockBuilder::new()
        .column("id", DataType::UInt32, vec![1u32])
        .build()
        .unwrap();
    let err = client.insert("INSERT INTO missing VALUES", &block).unwrap_err();
    assert_eq!(err.server_exception().map(|e| e.code), Some(60));

    assert!(client.ping().unwrap());
    assert_eq!(server.connections(), 1);
}

#[test]
fn compressed_insert() {
    let received = Arc::new(Mutex::new(Vec::new()));
    let server = server(Arc::clone(&received));
    let client = Client::connect(server.config().with_compression(true)).unwrap();

    let ids: Vec<u32> = (0..50_000).collect();
    let names: Vec<String> = ids.iter().map(|i| format!("event-{i}")).collect();
    let block = BlockBuilder::new()
        .column("id", DataType::UInt32, ids)
        .column("name", DataType::String, names)
        .build()
        .unwrap();
    client.insert(INSERT, &block).unwrap();

    let received = received.lock().unwrap();
    assert_eq!(received[0].rows(), 50_000);
    assert_eq!(received[0].columns()[1].values[49_999], Value::from("event-49999"));
}
