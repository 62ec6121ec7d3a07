use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use parking_lot::Mutex;
use rustls::{ClientConnection, StreamOwned};
use socket2::{Domain, Protocol, Socket, Type};

use crate::config::{Config, Host};
use crate::error::{Error, Result};

use super::tls;

/// Read timeout on TLS sockets. The reader holds the TLS lock only this long at a time, so
/// writers can interleave.
const TLS_POLL_INTERVAL: Duration = Duration::from_millis(20);

type TlsStream = StreamOwned<ClientConnection, TcpStream>;

enum Inner {
    Plain(TcpStream),
    Tls(Arc<Mutex<TlsStream>>),
}

/// A byte stream to one server, plain or TLS.
///
/// Handles made with [`Channel::try_clone`] share the connection, so one thread can read
/// while another writes. [`Channel::shutdown`] unblocks every handle.
pub struct Channel {
    socket: TcpStream,
    inner: Inner,
}

impl Channel {
    /// Resolves `host`, connects within `timeout` and, when configured, completes the TLS
    /// handshake within the same bound.
    pub fn open(host: &Host, config: &Config, timeout: Duration) -> Result<Self> {
        let addrs: Vec<SocketAddr> = (host.host.as_str(), host.port).to_socket_addrs()?.collect();
        let mut last_error = None;
        let mut stream = None;
        for addr in addrs {
            match connect_socket(addr, config, timeout) {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => {
                    debug!("connect to {addr} failed: {e}");
                    last_error = Some(e);
                }
            }
        }
        let socket = match (stream, last_error) {
            (Some(s), _) => s,
            (None, Some(e)) => return Err(e.into()),
            (None, None) => return Err(Error::Config(format!("{host} resolved to no addresses"))),
        };
        socket.set_nodelay(true)?;
        let handle = socket.try_clone()?;

        let Some(tls_config) = &config.tls else {
            return Ok(Self {
                socket: handle,
                inner: Inner::Plain(socket),
            });
        };

        let mut conn = ClientConnection::new(tls::client_config(tls_config)?, tls::server_name(&host.host)?)?;
        let mut socket = socket;
        socket.set_read_timeout(Some(timeout.max(TLS_POLL_INTERVAL)))?;
        socket.set_write_timeout(Some(timeout.max(TLS_POLL_INTERVAL)))?;
        while conn.is_handshaking() {
            conn.complete_io(&mut socket).map_err(|e| match e.kind() {
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
                    Error::Timeout(format!("tls handshake with {host} timed out"))
                }
                _ => Error::Tls(format!("tls handshake with {host} failed: {e}")),
            })?;
        }
        socket.set_read_timeout(Some(TLS_POLL_INTERVAL))?;
        debug!("tls established with {host}");

        Ok(Self {
            socket: handle,
            inner: Inner::Tls(Arc::new(Mutex::new(StreamOwned::new(conn, socket)))),
        })
    }

    pub fn try_clone(&self) -> io::Result<Self> {
        let inner = match &self.inner {
            Inner::Plain(stream) => Inner::Plain(stream.try_clone()?),
            Inner::Tls(stream) => Inner::Tls(Arc::clone(stream)),
        };
        Ok(Self {
            socket: self.socket.try_clone()?,
            inner,
        })
    }

    pub fn is_tls(&self) -> bool {
        matches!(self.inner, Inner::Tls(_))
    }

    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.socket.set_write_timeout(timeout)
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.socket.peer_addr()
    }

    /// Closes both directions. Blocked reads return end of stream. Idempotent.
    pub fn shutdown(&self) {
        if let Err(e) = self.socket.shutdown(Shutdown::Both) {
            if e.kind() != io::ErrorKind::NotConnected {
                debug!("socket shutdown: {e}");
            }
        }
    }
}

impl Read for Channel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.inner {
            Inner::Plain(stream) => stream.read(buf),
            Inner::Tls(stream) => stream.lock().read(buf),
        }
    }
}

impl Write for Channel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.inner {
            Inner::Plain(stream) => stream.write(buf),
            Inner::Tls(stream) => stream.lock().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.inner {
            Inner::Plain(stream) => stream.flush(),
            Inner::Tls(stream) => stream.lock().flush(),
        }
    }
}

fn connect_socket(addr: SocketAddr, config: &Config, timeout: Duration) -> io::Result<TcpStream> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    if let Err(e) = socket.set_keepalive(config.tcp_keepalive) {
        warn!("failed to set SO_KEEPALIVE on {addr}: {e}");
    }
    if let Some(size) = config.send_buffer_size {
        if let Err(e) = socket.set_send_buffer_size(size) {
            warn!("failed to set SO_SNDBUF={size} on {addr}: {e}");
        }
    }
    if let Some(size) = config.recv_buffer_size {
        if let Err(e) = socket.set_recv_buffer_size(size) {
            warn!("failed to set SO_RCVBUF={size} on {addr}: {e}");
        }
    }
    if timeout.is_zero() {
        socket.connect(&addr.into())?;
    } else {
        socket.connect_timeout(&addr.into(), timeout)?;
    }
    Ok(socket.into())
}
