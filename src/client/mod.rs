//! Session manager over a single connection.
//!
//! A [`Client`] keeps one live [`Connection`] and serializes callers through a FIFO gate.
//! A failure that leaves the session in an unknown state replaces the connection, failing
//! over across the configured hosts. The old connection is closed only once a new one is
//! live.
mod gate;
mod host;
mod result;
mod row;

use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use parking_lot::{Mutex, MutexGuard};

use crate::block::Block;
use crate::config::{Config, QueryOptions};
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::protocol::ServerContext;

use gate::Gate;
use host::HostSelector;
use result::QueryStream;

pub use result::{QueryEvent, QueryEvents, QueryResult, Rows};
pub use row::{ColumnIndex, FromRow, FromValue, Row};

/// Lower bound on the time spent failing over.
const MIN_FAILOVER_BUDGET: Duration = Duration::from_secs(1);
/// Lower bound on one connect attempt.
const MIN_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(100);
/// Pause between passes over the host list.
const ROUND_BACKOFF: Duration = Duration::from_millis(200);

pub struct Client {
    config: Config,
    selector: HostSelector,
    gate: Gate,
    connection: Mutex<Connection>,
}

impl Client {
    /// Connects to the first reachable host.
    pub fn connect(config: Config) -> Result<Self> {
        let selector = HostSelector::new(config.resolved_hosts(), config.host_selection);
        let connection = establish(&config, &selector)?;
        Ok(Self {
            config,
            selector,
            gate: Gate::new(),
            connection: Mutex::new(connection),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// What the current server announced. Waits for any running operation.
    pub fn server_context(&self) -> ServerContext {
        let _pass = self.gate.enter();
        self.connection.lock().server_context().clone()
    }

    /// Runs `sql` and streams the result blocks.
    ///
    /// The client is busy until the result is exhausted or dropped.
    pub fn query(&self, sql: &str) -> Result<QueryResult<'_>> {
        self.query_with_options(sql, &QueryOptions::default())
    }

    pub fn query_with_options(&self, sql: &str, options: &QueryOptions) -> Result<QueryResult<'_>> {
        self.start(sql, options).map(QueryResult::new)
    }

    /// Runs `sql` and streams data blocks together with progress, totals, extremes and
    /// profile packets.
    pub fn query_events(&self, sql: &str) -> Result<QueryEvents<'_>> {
        self.query_events_with_options(sql, &QueryOptions::default())
    }

    pub fn query_events_with_options(&self, sql: &str, options: &QueryOptions) -> Result<QueryEvents<'_>> {
        self.start(sql, options).map(QueryEvents::new)
    }

    /// Runs `sql` and streams the result row by row.
    pub fn query_rows(&self, sql: &str) -> Result<Rows<'_>> {
        self.query_rows_with_options(sql, &QueryOptions::default())
    }

    pub fn query_rows_with_options(&self, sql: &str, options: &QueryOptions) -> Result<Rows<'_>> {
        self.query_with_options(sql, options).map(QueryResult::rows)
    }

    /// First row of the result, if any. The rest of the query is cancelled.
    pub fn query_one<T: FromRow>(&self, sql: &str) -> Result<Option<T>> {
        self.query_one_with_options(sql, &QueryOptions::default())
    }

    pub fn query_one_with_options<T: FromRow>(&self, sql: &str, options: &QueryOptions) -> Result<Option<T>> {
        let mut rows = self.query_rows_with_options(sql, options)?;
        match rows.next() {
            Some(row) => T::from_row(row?).map(Some),
            None => Ok(None),
        }
    }

    /// Runs a statement that returns no rows.
    pub fn execute(&self, sql: &str) -> Result<()> {
        self.execute_with_options(sql, &QueryOptions::default())
    }

    pub fn execute_with_options(&self, sql: &str, options: &QueryOptions) -> Result<()> {
        self.run(|connection| connection.execute(sql, options))
    }

    /// Inserts `block` with `sql`, an `INSERT INTO ... VALUES` statement.
    ///
    /// Columns are matched to the table by position, or by name when the names are in a
    /// different order. A block that does not fit fails with [`Error::Mismatch`].
    pub fn insert(&self, sql: &str, block: &Block) -> Result<()> {
        self.insert_with_options(sql, block, &QueryOptions::default())
    }

    pub fn insert_with_options(&self, sql: &str, block: &Block, options: &QueryOptions) -> Result<()> {
        self.run(|connection| connection.insert(sql, block, options))
    }

    /// Inserts `block` into `table`. The name is used as given, so quote it if needed.
    pub fn insert_into(&self, table: &str, block: &Block) -> Result<()> {
        self.insert_into_with_options(table, block, &QueryOptions::default())
    }

    pub fn insert_into_with_options(&self, table: &str, block: &Block, options: &QueryOptions) -> Result<()> {
        self.insert_with_options(&insert_statement(table), block, options)
    }

    /// Whether the server answers. `Ok(false)` means the connection was lost; it is
    /// re-established before the next operation.
    pub fn ping(&self) -> Result<bool> {
        self.run(|connection| connection.ping())
    }

    /// Closes the connection. The next operation reconnects.
    pub fn close(&self) {
        let _pass = self.gate.enter();
        self.connection.lock().close();
    }

    fn run<T>(&self, op: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let _pass = self.gate.enter();
        let mut connection = self.connection.lock();
        self.ensure_open(&mut connection)?;
        let result = op(&mut connection);
        match &result {
            Err(e) => self.recover(&mut connection, e),
            Ok(_) if connection.is_closed() => debug!("{} went away, reconnecting lazily", connection.host()),
            Ok(_) => {}
        }
        result
    }

    fn start(&self, sql: &str, options: &QueryOptions) -> Result<QueryStream<'_>> {
        let pass = self.gate.enter();
        let mut connection = self.connection.lock();
        self.ensure_open(&mut connection)?;
        if let Err(e) = connection.send_query(sql, options) {
            self.recover(&mut connection, &e);
            return Err(e);
        }
        Ok(QueryStream::new(self, connection, pass))
    }

    fn ensure_open(&self, connection: &mut MutexGuard<'_, Connection>) -> Result<()> {
        if connection.is_closed() {
            debug!("connection to {} is closed, reconnecting", connection.host());
            let replacement = establish(&self.config, &self.selector)?;
            let mut old = std::mem::replace(&mut **connection, replacement);
            old.close();
        }
        Ok(())
    }

    /// Replaces the connection after `err` unless the exchange ended cleanly. On failure the
    /// old connection stays in place and the next operation tries again.
    pub(crate) fn recover(&self, connection: &mut Connection, err: &Error) {
        if !err.requires_reset() && !connection.is_closed() {
            return;
        }
        warn!("resetting connection to {} after: {err}", connection.host());
        match establish(&self.config, &self.selector) {
            Ok(replacement) => {
                let mut old = std::mem::replace(connection, replacement);
                old.close();
            }
            Err(e) => warn!("reconnect failed, will retry on next use: {e}"),
        }
    }
}

fn insert_statement(table: &str) -> String {
    format!("INSERT INTO {table} VALUES")
}

/// Opens a connection to one of the configured hosts.
///
/// Hosts are tried in selector order, repeatedly, until one accepts or the connect timeout
/// (at least one second) runs out. Each attempt gets an equal share of the remaining time.
/// A server that answers the handshake with an exception is not retried.
fn establish(config: &Config, selector: &HostSelector) -> Result<Connection> {
    let deadline = Instant::now() + config.connect_timeout.max(MIN_FAILOVER_BUDGET);
    let mut last_error = None;

    'rounds: loop {
        let hosts = selector.order();
        for (i, host) in hosts.iter().enumerate() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break 'rounds;
            }
            let share = u32::try_from(hosts.len() - i).unwrap_or(u32::MAX);
            let attempt = (remaining / share).max(MIN_ATTEMPT_TIMEOUT);
            match Connection::open(host, config, attempt) {
                Ok(connection) => {
                    info!("session established with {host}");
                    return Ok(connection);
                }
                Err(e @ Error::Server(_)) => {
                    warn!("{host} refused the session: {e}");
                    return Err(e);
                }
                Err(e) => {
                    warn!("connect to {host} failed: {e}");
                    last_error = Some(e);
                }
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        thread::sleep(ROUND_BACKOFF.min(remaining));
    }

    Err(last_error.unwrap_or_else(|| {
        Error::Timeout(format!(
            "no host reachable within {:?}",
            config.connect_timeout.max(MIN_FAILOVER_BUDGET)
        ))
    }))
}
