//! One native-protocol session to one server.
//!
//! A [`Connection`] owns the byte channel, a reader thread that decodes server packets
//! ([`pump`]) and the write side of the protocol. It runs one exchange at a time and tracks
//! where that exchange is in [`ConnectionState`].
mod channel;
mod pump;
mod tls;

use std::fmt;
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};
use uuid::Uuid;

use crate::binary::BinaryError;
use crate::block::Block;
use crate::config::{Config, Host, QueryOptions};
use crate::error::{Error, Result};
use crate::protocol::{
    CLIENT_NAME_PREFIX, ClientContext, DataPacket, Hello, ProtocolTransport, Query, Request, Response,
    ServerContext, ServerException, Settings,
};

use channel::Channel;
use pump::{Pump, Received};

/// How long an insert keeps listening after the server reported an exception, in case the
/// sample block was already on its way.
const INSERT_EXCEPTION_GRACE: Duration = Duration::from_secs(1);

/// Bound on draining an insert that was aborted because the block did not fit.
const INSERT_ABORT_DRAIN: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Handshaking,
    Idle,
    QueryInFlight,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Handshaking => "handshaking",
            ConnectionState::Idle => "idle",
            ConnectionState::QueryInFlight => "query in flight",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

pub struct Connection {
    host: Host,
    state: ConnectionState,
    writer: ProtocolTransport<Channel>,
    pump: Pump,
    server: ServerContext,
    client: ClientContext,
    settings: Settings,
    compression: bool,
    query_timeout: Duration,
}

impl Connection {
    /// Connects to `host` and completes the handshake, all within `timeout`.
    ///
    /// A server exception during the handshake is returned as [`Error::Server`]. The channel
    /// is closed on every failure.
    pub fn open(host: &Host, config: &Config, timeout: Duration) -> Result<Self> {
        let started = Instant::now();
        debug!("connecting to {host}");
        let channel = Channel::open(host, config, timeout)?;
        let bound = if config.query_timeout.is_zero() {
            None
        } else {
            Some(config.query_timeout)
        };
        channel.set_write_timeout(bound)?;

        let pump = Pump::spawn(channel.try_clone()?, config.compression)?;
        let mut connection = Self {
            host: host.clone(),
            state: ConnectionState::Connecting,
            writer: ProtocolTransport::new(channel).with_compression(config.compression),
            pump,
            server: ServerContext::default(),
            client: ClientContext::new(format!("{CLIENT_NAME_PREFIX} {}", config.client_name)),
            settings: config.settings.clone(),
            compression: config.compression,
            query_timeout: config.query_timeout,
        };

        let remaining = if timeout.is_zero() {
            Duration::ZERO
        } else {
            timeout.saturating_sub(started.elapsed()).max(Duration::from_millis(1))
        };
        match connection.handshake(config, remaining) {
            Ok(()) => Ok(connection),
            Err(e) => {
                connection.close();
                Err(e)
            }
        }
    }

    fn handshake(&mut self, config: &Config, timeout: Duration) -> Result<()> {
        self.state = ConnectionState::Handshaking;
        self.send(&Request::Hello(Hello::new(
            &config.client_name,
            &config.database,
            &config.user,
            &config.password,
        )))?;

        let response = match self.poll(timeout)? {
            Some(response) => response,
            None => {
                return Err(Error::Timeout(format!(
                    "no handshake from {} within {timeout:?}",
                    self.host
                )));
            }
        };
        match response {
            Response::Hello(server) => {
                info!(
                    "connected to {} ({} {}.{} rev {}, timezone {})",
                    self.host, server.name, server.major, server.minor, server.revision, server.timezone
                );
                self.server = server;
                self.state = ConnectionState::Idle;
                Ok(())
            }
            Response::Exception(e) => Err(e.into()),
            other => Err(Error::Binary(BinaryError::malformed(format!(
                "unexpected {} packet during handshake",
                other.kind()
            )))),
        }
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    /// What the server announced in its Hello.
    pub fn server_context(&self) -> &ServerContext {
        &self.server
    }

    /// Writes one packet. A write failure closes the connection.
    pub fn send(&mut self, request: &Request) -> Result<()> {
        self.ensure_not_closed()?;
        debug!("-> {} to {}", request.kind(), self.host);
        if let Err(e) = self.writer.write_request(request) {
            self.close();
            return Err(e.into());
        }
        Ok(())
    }

    /// Waits for the next packet within the query timeout.
    ///
    /// Running out of time closes the connection and fails with [`Error::Timeout`]. So does
    /// any failure to decode, since the stream cannot be resynchronized.
    pub fn recv(&mut self) -> Result<Response> {
        let timeout = self.query_timeout;
        match self.poll(timeout)? {
            Some(response) => Ok(response),
            None => {
                self.close();
                Err(Error::Timeout(format!(
                    "no response from {} within {timeout:?}",
                    self.host
                )))
            }
        }
    }

    /// Waits up to `timeout` for the next packet. Unlike [`Connection::recv`], running out
    /// of time returns `None` and leaves the connection open. [`Duration::ZERO`] waits
    /// forever.
    pub fn poll(&mut self, timeout: Duration) -> Result<Option<Response>> {
        self.ensure_not_closed()?;
        let bound = if timeout.is_zero() { None } else { Some(timeout) };
        let response = match self.pump.recv(bound) {
            Ok(Received::Response(response)) => response,
            Ok(Received::TimedOut) => return Ok(None),
            Err(e) => {
                self.close();
                return Err(e);
            }
        };
        debug!("<- {} from {}", response.kind(), self.host);
        if response.is_terminal() && self.state == ConnectionState::QueryInFlight {
            self.state = ConnectionState::Idle;
        }
        Ok(Some(response))
    }

    /// Submits `sql`. The caller then reads responses until end of stream or an exception.
    pub fn send_query(&mut self, sql: &str, options: &QueryOptions) -> Result<()> {
        if self.state != ConnectionState::Idle {
            return Err(Error::Closed(format!(
                "cannot start a query on a connection that is {}",
                self.state
            )));
        }
        let query = Query {
            query_id: options
                .query_id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            client: self.client.clone(),
            settings: self.settings.merged(&options.settings),
            stage: options.stage,
            compression: self.compression,
            sql: sql.to_string(),
        };
        trace!("query {}: {}", query.query_id, query.sql);
        self.send(&Request::Query(query))?;
        self.state = ConnectionState::QueryInFlight;
        Ok(())
    }

    /// Runs a statement and discards whatever it returns.
    pub fn execute(&mut self, sql: &str, options: &QueryOptions) -> Result<()> {
        self.send_query(sql, options)?;
        loop {
            match self.recv()? {
                Response::EndOfStream => return Ok(()),
                Response::Exception(e) => return Err(e.into()),
                other => trace!("execute skipping {}", other.kind()),
            }
        }
    }

    /// Inserts `block` with an `INSERT ... VALUES` statement.
    ///
    /// The block is reshaped to the sample the server sends back. If it does not fit, the
    /// insert is aborted with an empty block and [`Error::Mismatch`] is returned; the
    /// connection stays usable.
    pub fn insert(&mut self, sql: &str, block: &Block, options: &QueryOptions) -> Result<()> {
        self.send_query(sql, options)?;

        let sample = match self.await_sample()? {
            Ok(sample) => sample,
            Err(exception) => return Err(exception.into()),
        };

        let normalized = match block.normalize_for_insert(&sample) {
            Ok(normalized) => normalized,
            Err(e) => {
                let reason = match e {
                    BinaryError::Malformed(reason) | BinaryError::Unsupported(reason) => reason,
                    other => other.to_string(),
                };
                debug!("aborting insert into {}: {reason}", self.host);
                self.send(&Request::Data(DataPacket::external_tables()))?;
                if !self.drain(INSERT_ABORT_DRAIN) {
                    warn!("failed to drain aborted insert on {}, closing", self.host);
                    self.close();
                }
                return Err(Error::Mismatch(reason));
            }
        };

        self.send(&Request::Data(DataPacket::new(normalized)))?;
        self.send(&Request::Data(DataPacket::external_tables()))?;
        loop {
            match self.recv()? {
                Response::EndOfStream => return Ok(()),
                Response::Exception(e) => return Err(e.into()),
                other => trace!("insert skipping {}", other.kind()),
            }
        }
    }

    /// Waits for the insert sample. An exception is held back for a short grace period in
    /// case the sample is already in flight, so the stream is left clean either way.
    fn await_sample(&mut self) -> Result<std::result::Result<Block, ServerException>> {
        let mut remembered: Option<ServerException> = None;
        loop {
            let next = match &remembered {
                None => Some(self.recv()?),
                Some(_) => self.poll(INSERT_EXCEPTION_GRACE)?,
            };
            match (next, remembered.take()) {
                (Some(Response::Data(packet)), None) => return Ok(Ok(packet.block)),
                (Some(Response::Data(_)), Some(exception)) => {
                    self.send(&Request::Data(DataPacket::external_tables()))?;
                    if !self.drain(INSERT_ABORT_DRAIN) {
                        self.close();
                    }
                    return Ok(Err(exception));
                }
                (Some(Response::Exception(e)), None) => remembered = Some(e),
                (Some(Response::Exception(_)), Some(first)) => remembered = Some(first),
                (Some(Response::EndOfStream), Some(exception)) | (None, Some(exception)) => {
                    return Ok(Err(exception));
                }
                (Some(Response::EndOfStream), None) | (None, None) => {
                    return Err(Error::Binary(BinaryError::malformed(
                        "insert ended before the server sent a sample block",
                    )));
                }
                (Some(other), held) => {
                    trace!("insert skipping {} while waiting for sample", other.kind());
                    remembered = held;
                }
            }
        }
    }

    /// Sends a ping. `Ok(false)` means the connection went away.
    pub fn ping(&mut self) -> Result<bool> {
        self.send(&Request::Ping)?;
        loop {
            match self.recv() {
                Ok(Response::Pong) => return Ok(true),
                Ok(Response::Exception(e)) => return Err(e.into()),
                Ok(other) => trace!("ping skipping {}", other.kind()),
                Err(Error::Closed(reason)) => {
                    debug!("ping on {}: {reason}", self.host);
                    return Ok(false);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Asks the server to stop the running query. Responses keep arriving until an
    /// exception or end of stream; use [`Connection::drain`] to consume them.
    pub fn cancel(&mut self) -> Result<()> {
        self.send(&Request::Cancel)
    }

    /// A handle that can cancel the running query from another thread, while this
    /// connection is busy reading.
    pub fn cancel_handle(&self) -> Result<CancelHandle> {
        Ok(CancelHandle {
            writer: ProtocolTransport::new(self.writer.get_ref().try_clone()?),
        })
    }

    /// Discards responses until the current exchange ends. Returns false if that did not
    /// happen within `bound`, in which case the connection must be discarded.
    pub fn drain(&mut self, bound: Duration) -> bool {
        let deadline = Instant::now() + bound;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            match self.poll(remaining) {
                Ok(Some(response)) if response.is_terminal() => {
                    self.state = ConnectionState::Idle;
                    return true;
                }
                Ok(Some(response)) => trace!("drained {}", response.kind()),
                Ok(None) => return false,
                Err(e) => {
                    debug!("drain on {} failed: {e}", self.host);
                    return false;
                }
            }
        }
    }

    /// Closes the channel and stops the reader thread. Idempotent.
    pub fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        debug!("closing connection to {}", self.host);
        self.state = ConnectionState::Closed;
        self.pump.shutdown();
    }

    fn ensure_not_closed(&self) -> Result<()> {
        if self.state == ConnectionState::Closed {
            return Err(Error::Closed(format!("connection to {} is closed", self.host)));
        }
        Ok(())
    }
}

/// Sends Cancel on a connection owned by someone else.
///
/// Only the query that is running when [`CancelHandle::cancel`] is called is affected. A
/// cancel that arrives after the query ended is ignored by the server.
pub struct CancelHandle {
    writer: ProtocolTransport<Channel>,
}

impl CancelHandle {
    pub fn cancel(&mut self) -> Result<()> {
        trace!("cancel requested from another thread");
        Ok(self.writer.write_request(&Request::Cancel)?)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}
