//! Scripted server speaking the server side of the native protocol.
#![allow(dead_code)]

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info};

use chnative::protocol::{DataPacket, ProtocolTransport, Query, Request, Response, TransportError};
use chnative::{Block, BlockBuilder, Config, DataType, ServerContext, ServerException};

/// User name the server refuses during the handshake.
pub const REJECTED_USER: &str = "intruder";

pub type Handler = dyn Fn(&Query, &mut Session) -> Result<(), TransportError> + Send + Sync;

/// The server side of one client connection.
pub struct Session {
    transport: ProtocolTransport<TcpStream>,
}

impl Session {
    pub fn send(&mut self, response: Response) -> Result<(), TransportError> {
        self.transport.write_response(&response)
    }

    pub fn recv(&mut self) -> Result<Request, TransportError> {
        self.transport.read_request()
    }

    pub fn send_block(&mut self, block: Block) -> Result<(), TransportError> {
        self.send(Response::Data(DataPacket::new(block)))
    }

    pub fn end(&mut self) -> Result<(), TransportError> {
        self.send(Response::EndOfStream)
    }

    /// Reads the next client Data packet.
    pub fn recv_block(&mut self) -> Result<Block, TransportError> {
        match self.recv()? {
            Request::Data(packet) => Ok(packet.block),
            other => panic!("expected Data from client, got {}", other.kind()),
        }
    }
}

pub struct MockServer {
    addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    handler: Arc<Handler>,
    stopping: Arc<AtomicBool>,
    acceptor: Mutex<Option<JoinHandle<()>>>,
}

impl MockServer {
    /// Listens on a loopback port and serves every connection on its own thread. Queries
    /// go to `handler`; pings and the handshake are answered here.
    pub fn start<F>(handler: F) -> Self
    where
        F: Fn(&Query, &mut Session) -> Result<(), TransportError> + Send + Sync + 'static,
    {
        let _ = env_logger::builder().is_test(true).try_init();

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let server = Self {
            addr: listener.local_addr().unwrap(),
            connections: Arc::new(AtomicUsize::new(0)),
            handler: Arc::new(handler),
            stopping: Arc::new(AtomicBool::new(false)),
            acceptor: Mutex::new(None),
        };
        server.accept(listener);
        server
    }

    fn accept(&self, listener: TcpListener) {
        let addr = self.addr;
        let counter = Arc::clone(&self.connections);
        let handler = Arc::clone(&self.handler);
        let stopping = Arc::clone(&self.stopping);
        let acceptor = thread::spawn(move || {
            info!("mock server listening at {addr}");
            for stream in listener.incoming() {
                if stopping.load(Ordering::SeqCst) {
                    break;
                }
                let Ok(stream) = stream else { continue };
                counter.fetch_add(1, Ordering::SeqCst);
                let handler = Arc::clone(&handler);
                thread::spawn(move || {
                    if let Err(e) = handle_connection(stream, handler.as_ref()) {
                        debug!("mock connection ended: {e}");
                    }
                });
            }
            info!("mock server at {addr} stopped listening");
        });
        *self.acceptor.lock().unwrap() = Some(acceptor);
    }

    /// Closes the listening socket. Connections already accepted keep running.
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        // wake the accept loop so it sees the flag
        let _ = TcpStream::connect(self.addr);
        if let Some(acceptor) = self.acceptor.lock().unwrap().take() {
            acceptor.join().unwrap();
        }
    }

    /// Listens again on the same port after [`MockServer::stop`].
    pub fn restart(&self) {
        self.stopping.store(false, Ordering::SeqCst);
        self.accept(TcpListener::bind(self.addr).unwrap());
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Connections accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> Config {
        Config::with_host("127.0.0.1", self.port())
            .with_connect_timeout(Duration::from_secs(2))
            .with_query_timeout(Duration::from_secs(5))
    }
}

pub fn server_context() -> ServerContext {
    ServerContext {
        name: "ClickHouse".to_string(),
        major: 23,
        minor: 8,
        revision: chnative::protocol::CLIENT_REVISION,
        timezone: "Europe/Amsterdam".to_string(),
        display_name: "mock".to_string(),
    }
}

fn handle_connection(stream: TcpStream, handler: &Handler) -> Result<(), TransportError> {
    let mut session = Session {
        transport: ProtocolTransport::new(stream),
    };

    match session.recv()? {
        Request::Hello(hello) if hello.user == REJECTED_USER => {
            session.send(Response::Exception(ServerException::new(
                516,
                "DB::Exception",
                format!("{}: Authentication failed", hello.user),
            )))?;
            return Ok(());
        }
        Request::Hello(_) => session.send(Response::Hello(server_context()))?,
        other => panic!("expected Hello, got {}", other.kind()),
    }

    loop {
        match session.recv()? {
            Request::Ping => session.send(Response::Pong)?,
            Request::Query(query) => {
                session.transport.set_compression(query.compression);
                handler(&query, &mut session)?;
            }
            // late cancel or terminator after the exchange already ended
            Request::Cancel | Request::Data(_) => {}
            Request::Hello(_) => panic!("second Hello on one connection"),
        }
    }
}

/// Empty block naming the result columns.
pub fn header(columns: &[(&str, DataType)]) -> Block {
    let mut builder = BlockBuilder::new();
    for (name, data_type) in columns {
        builder.push_column(*name, data_type.clone(), Vec::<u64>::new());
    }
    builder.build().unwrap()
}

/// Single `UInt64` column `n` counting up from `start`.
pub fn numbers(start: u64, rows: u64) -> Block {
    BlockBuilder::new()
        .column("n", DataType::UInt64, (start..start + rows).collect())
        .build()
        .unwrap()
}

/// Answers `SELECT 1` the way the server does: a header, one row, end of stream.
pub fn select_one(session: &mut Session) -> Result<(), TransportError> {
    session.send_block(header(&[("x", DataType::UInt8)]))?;
    session.send_block(BlockBuilder::new().column("x", DataType::UInt8, vec![1u8]).build().unwrap())?;
    session.end()
}
