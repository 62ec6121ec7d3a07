mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use chnative::protocol::{DataPacket, Request, Response};
use chnative::{Client, DataType, ProfileInfo, Progress, QueryEvent, Row, ServerException, Value};

use common::{MockServer, header, numbers, select_one};

const BLOCKS: u64 = 20;
const BLOCK_ROWS: u64 = 100;
const WIDE_ROWS: u64 = 200_000;

fn server(cancelled: Arc<AtomicBool>) -> MockServer {
    MockServer::start(move |query, session| match query.sql.as_str() {
        "SELECT n FROM numbers" => {
            session.send_block(header(&[("n", DataType::UInt64)]))?;
            for i in 0..BLOCKS {
                session.send_block(numbers(i * BLOCK_ROWS, BLOCK_ROWS))?;
            }
            match session.recv()? {
                Request::Cancel => cancelled.store(true, Ordering::SeqCst),
                other => panic!("expected Cancel, got {}", other.kind()),
            }
            session.end()
        }
        "SELECT n FROM wide" => {
            session.send_block(header(&[("n", DataType::UInt64)]))?;
            session.send_block(numbers(0, WIDE_ROWS))?;
            session.end()
        }
        "SELECT sum(n) FROM numbers WITH TOTALS" => {
            let progress = Progress {
                rows: 3,
                bytes: 24,
                total_rows: 3,
            };
            session.send(Response::Progress(progress))?;
            session.send_block(header(&[("n", DataType::UInt64)]))?;
            session.send_block(numbers(0, 3))?;
            session.send(Response::Totals(DataPacket::new(numbers(3, 1))))?;
            session.send(Response::Extremes(DataPacket::new(numbers(0, 2))))?;
            session.send(Response::ProfileInfo(ProfileInfo {
                rows: 3,
                blocks: 1,
                bytes: 24,
                applied_limit: false,
                rows_before_limit: 0,
                calculated_rows_before_limit: false,
            }))?;
            session.end()
        }
        "SELECT count() FROM slow" => {
            session.send_block(header(&[("count()", DataType::UInt64)]))?;
            match session.recv()? {
                Request::Cancel => cancelled.store(true, Ordering::SeqCst),
                other => panic!("expected Cancel, got {}", other.kind()),
            }
            session.send(Response::Exception(ServerException::new(
                394,
                "DB::Exception",
                "Query was cancelled",
            )))
        }
        "SELECT throwIf(1)" => {
            session.send_block(header(&[("throwIf(1)", DataType::UInt8)]))?;
            session.send(Response::Exception(ServerException::new(
                395,
                "DB::Exception",
                "Value passed to 'throwIf' function is non-zero",
            )))
        }
        "SELECT 1" => select_one(session),
        other => panic!("unexpected query {other:?}"),
    })
}

#[test]
fn abandoned_stream_is_drained() {
    let cancelled = Arc::new(AtomicBool::new(false));
    let server = server(Arc::clone(&cancelled));
    let client = Client::connect(server.config()).unwrap();

    let rows = client.query_rows("SELECT n FROM numbers").unwrap();
    let first: Vec<u64> = rows.take(5).map(|row| row.unwrap().get(0usize).unwrap()).collect();
    assert_eq!(first, vec![0, 1, 2, 3, 4]);

    assert!(cancelled.load(Ordering::SeqCst));
    let one: Option<(u8,)> = client.query_one("SELECT 1").unwrap();
    assert_eq!(one, Some((1,)));
    assert_eq!(server.connections(), 1);
}

#[test]
fn blocks_arrive_in_order() {
    let server = server(Arc::new(AtomicBool::new(false)));
    let client = Client::connect(server.config()).unwrap();

    let mut result = client.query("SELECT n FROM wide").unwrap();
    let header = result.next().unwrap().unwrap();
    assert_eq!(header.rows(), 0);
    assert_eq!(header.columns()[0].data_type, DataType::UInt64);

    let data = result.next().unwrap().unwrap();
    assert_eq!(data.rows(), WIDE_ROWS as usize);
    assert!(result.next().is_none());
    assert!(result.is_finished());
}

#[test]
fn compressed_result_spanning_frames() {
    let server = server(Arc::new(AtomicBool::new(false)));
    let client = Client::connect(server.config().with_compression(true)).unwrap();

    let blocks: Vec<_> = client
        .query("SELECT n FROM wide")
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    let total: usize = blocks.iter().map(|b| b.rows()).sum();
    assert_eq!(total, WIDE_ROWS as usize);
    let last = blocks.last().unwrap();
    assert_eq!(
        last.columns()[0].values.last(),
        Some(&Value::UInt64(WIDE_ROWS - 1))
    );

    assert!(client.ping().unwrap());
}

#[test]
fn events_surface_side_channels_in_order() {
    let server = server(Arc::new(AtomicBool::new(false)));
    let client = Client::connect(server.config()).unwrap();

    let events: Vec<QueryEvent> = client
        .query_events("SELECT sum(n) FROM numbers WITH TOTALS")
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    let kinds: Vec<&str> = events
        .iter()
        .map(|event| match event {
            QueryEvent::Data(_) => "data",
            QueryEvent::Progress(_) => "progress",
            QueryEvent::Totals(_) => "totals",
            QueryEvent::Extremes(_) => "extremes",
            QueryEvent::ProfileInfo(_) => "profile",
        })
        .collect();
    assert_eq!(kinds, ["progress", "data", "data", "totals", "extremes", "profile"]);

    match &events[3] {
        QueryEvent::Totals(block) => assert_eq!(block.columns()[0].values, vec![Value::UInt64(3)]),
        other => panic!("expected totals, got {other:?}"),
    }
}

#[test]
fn rows_by_name() {
    let server = server(Arc::new(AtomicBool::new(false)));
    let client = Client::connect(server.config()).unwrap();

    let rows: Vec<Row> = client
        .query_rows("SELECT sum(n) FROM numbers WITH TOTALS")
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    let values: Vec<u64> = rows.iter().map(|row| row.get("N").unwrap()).collect();
    assert_eq!(values, vec![0, 1, 2]);
    assert_eq!(rows[0].columns(), ["n"]);
}

#[test]
fn drain_runs_the_query_to_completion() {
    let server = server(Arc::new(AtomicBool::new(false)));
    let client = Client::connect(server.config()).unwrap();

    client.query("SELECT n FROM wide").unwrap().drain().unwrap();

    let err = client.query("SELECT throwIf(1)").unwrap().drain().unwrap_err();
    assert_eq!(err.server_exception().map(|e| e.code), Some(395));
    assert!(client.ping().unwrap());
    assert_eq!(server.connections(), 1);
}

#[test]
fn cancel_handle_stops_a_waiting_query() {
    let cancelled = Arc::new(AtomicBool::new(false));
    let server = server(Arc::clone(&cancelled));
    let client = Client::connect(server.config()).unwrap();

    let mut result = client.query("SELECT count() FROM slow").unwrap();
    let header = result.next().unwrap().unwrap();
    assert_eq!(header.rows(), 0);

    let mut handle = result.cancel_handle().unwrap();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        handle.cancel().unwrap();
    });
    let err = result.next().unwrap().unwrap_err();
    canceller.join().unwrap();

    assert_eq!(err.server_exception().map(|e| e.code), Some(394));
    assert!(cancelled.load(Ordering::SeqCst));
    assert!(result.is_finished());
    assert!(result.cancel_handle().is_err());

    drop(result);
    assert!(client.ping().unwrap());
    assert_eq!(server.connections(), 1);
}
