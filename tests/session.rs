mod common;

use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use chnative::protocol::{Progress, Response, TransportError};
use chnative::{Client, Error, ServerException};

use common::{MockServer, REJECTED_USER, select_one};

fn server() -> MockServer {
    MockServer::start(|query, session| match query.sql.as_str() {
        "SELECT 1" => select_one(session),
        "CREATE TABLE t (x UInt8) ENGINE = Memory" => {
            session.send(Response::Progress(Progress {
                rows: 0,
                bytes: 0,
                total_rows: 0,
            }))?;
            session.end()
        }
        "SELECT broken" => session.send(Response::Exception(
            ServerException::new(62, "DB::Exception", "Syntax error").with_nested(ServerException::new(
                0,
                "DB::Exception",
                "while parsing",
            )),
        )),
        "SELECT sleep(2)" => {
            thread::sleep(Duration::from_secs(2));
            session.end()
        }
        // dropping the session closes the socket mid-exchange
        "SELECT crash" => Err(TransportError::Closed),
        other => panic!("unexpected query {other:?}"),
    })
}

fn dead_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[test]
fn handshake_and_ping() {
    let server = server();
    let client = Client::connect(server.config()).unwrap();

    let context = client.server_context();
    assert_eq!(context.name, "ClickHouse");
    assert_eq!(context.timezone, "Europe/Amsterdam");
    assert_eq!(context.display_name, "mock");

    assert!(client.ping().unwrap());
    assert!(client.ping().unwrap());
    assert_eq!(server.connections(), 1);
}

#[test]
fn execute_runs_to_end_of_stream() {
    let server = server();
    let client = Client::connect(server.config()).unwrap();
    client.execute("CREATE TABLE t (x UInt8) ENGINE = Memory").unwrap();
    client.execute("CREATE TABLE t (x UInt8) ENGINE = Memory").unwrap();
    assert_eq!(server.connections(), 1);
}

#[test]
fn server_exception_keeps_the_connection() {
    let server = server();
    let client = Client::connect(server.config()).unwrap();

    let err = client.execute("SELECT broken").unwrap_err();
    let exception = err.server_exception().unwrap();
    assert_eq!(exception.code, 62);
    assert_eq!(exception.message, "Syntax error");
    assert_eq!(exception.chain().count(), 2);
    assert!(!err.requires_reset());

    let one: Option<(u8,)> = client.query_one("SELECT 1").unwrap();
    assert_eq!(one, Some((1,)));
    assert_eq!(server.connections(), 1);
}

#[test]
fn query_timeout_closes_and_reconnects() {
    let server = server();
    let config = server.config().with_query_timeout(Duration::from_millis(300));
    let client = Client::connect(config).unwrap();

    let err = client.execute("SELECT sleep(2)").unwrap_err();
    assert!(err.is_timeout(), "{err}");
    assert!(err.requires_reset());

    let one: Option<(u8,)> = client.query_one("SELECT 1").unwrap();
    assert_eq!(one, Some((1,)));
    assert_eq!(server.connections(), 2);
}

#[test]
fn dropped_connection_is_replaced() {
    let server = server();
    let client = Client::connect(server.config()).unwrap();

    let err = client.execute("SELECT crash").unwrap_err();
    assert!(matches!(err, Error::Closed(_) | Error::Io(_)), "{err}");

    assert!(client.ping().unwrap());
    assert_eq!(server.connections(), 2);
}

#[test]
fn fails_over_past_a_dead_host() {
    let server = server();
    let config = server
        .config()
        .with_connect_timeout(Duration::from_secs(3));
    let config = chnative::Config {
        hosts: vec![chnative::Host::new("127.0.0.1", dead_port()), config.hosts[0].clone()],
        ..config
    };

    let client = Client::connect(config).unwrap();
    assert!(client.ping().unwrap());
    assert_eq!(server.connections(), 1);
}

#[test]
fn no_reachable_host_fails_after_the_budget() {
    let config = chnative::Config::with_host("127.0.0.1", dead_port()).with_connect_timeout(Duration::from_millis(10));
    let err = Client::connect(config).err().unwrap();
    assert!(matches!(err, Error::Io(_)), "{err}");
}

#[test]
fn rejected_handshake_is_a_server_exception() {
    let server = server();
    let config = server.config().with_credentials(REJECTED_USER, "secret");
    let err = Client::connect(config).err().unwrap();
    assert_eq!(err.server_exception().map(|e| e.code), Some(516));
    assert_eq!(server.connections(), 1);
}

#[test]
fn callers_are_serialized() {
    let server = server();
    let client = Client::connect(server.config()).unwrap();

    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..5 {
                    let one: Option<(u8,)> = client.query_one("SELECT 1").unwrap();
                    assert_eq!(one, Some((1,)));
                    assert!(client.ping().unwrap());
                }
            });
        }
    });
    assert_eq!(server.connections(), 1);
}

#[test]
fn exhausted_result_releases_the_client() {
    let server = server();
    let client = Client::connect(server.config()).unwrap();

    let mut result = client.query("SELECT 1").unwrap();
    let blocks: Vec<_> = result.by_ref().collect::<Result<_, _>>().unwrap();
    assert_eq!(blocks.len(), 2);
    assert!(result.is_finished());

    let (tx, rx) = mpsc::channel();
    let shared = &client;
    thread::scope(|scope| {
        scope.spawn(move || tx.send(shared.ping().unwrap()).unwrap());
        assert_eq!(rx.recv_timeout(Duration::from_secs(3)), Ok(true));
    });

    // the same thread can go on while the result is still in scope
    assert!(client.ping().unwrap());
    drop(result);
    assert_eq!(server.connections(), 1);
}

#[test]
fn failed_reset_retries_on_next_use() {
    let server = server();
    let config = server.config().with_connect_timeout(Duration::from_millis(200));
    let client = Client::connect(config).unwrap();

    server.stop();
    let err = client.execute("SELECT crash").unwrap_err();
    assert!(err.requires_reset(), "{err}");

    // nothing is listening, so the retry fails too and reports why
    let err = client.ping().unwrap_err();
    assert!(matches!(err, Error::Io(_) | Error::Timeout(_)), "{err}");

    server.restart();
    assert!(client.ping().unwrap());
    assert_eq!(server.connections(), 2);
}
