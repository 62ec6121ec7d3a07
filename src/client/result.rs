//! Streaming views over a running query.
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace, warn};
use parking_lot::MutexGuard;

use crate::block::Block;
use crate::connection::{CancelHandle, Connection};
use crate::error::{Error, Result};
use crate::protocol::{ProfileInfo, Progress, Response};
use crate::value::Value;

use super::Client;
use super::gate::GatePass;
use super::row::Row;

/// Bound on draining a result that was dropped before the end of the stream.
const ABANDON_DRAIN: Duration = Duration::from_secs(1);

/// Exclusive use of the client's connection for the length of one query.
///
/// Both the connection lock and the gate pass are released as soon as the stream ends, even
/// while the result is still in scope. The lock goes first, so the next caller finds the
/// connection drained.
pub(crate) struct QueryStream<'c> {
    client: &'c Client,
    connection: Option<MutexGuard<'c, Connection>>,
    pass: Option<GatePass<'c>>,
}

impl<'c> QueryStream<'c> {
    pub(crate) fn new(client: &'c Client, connection: MutexGuard<'c, Connection>, pass: GatePass<'c>) -> Self {
        Self {
            client,
            connection: Some(connection),
            pass: Some(pass),
        }
    }

    fn is_done(&self) -> bool {
        self.connection.is_none()
    }

    fn cancel_handle(&self) -> Result<CancelHandle> {
        match &self.connection {
            Some(connection) => connection.cancel_handle(),
            None => Err(Error::Closed("query already finished".to_string())),
        }
    }

    fn release(&mut self) {
        self.connection = None;
        drop(self.pass.take());
    }

    /// The next packet before end of stream. An exception ends the stream as an error.
    fn next_response(&mut self) -> Option<Result<Response>> {
        let connection = self.connection.as_mut()?;
        let last = match connection.recv() {
            Ok(Response::EndOfStream) => None,
            Ok(Response::Exception(e)) => Some(Err(e.into())),
            Ok(response) => return Some(Ok(response)),
            Err(e) => {
                self.client.recover(connection, &e);
                Some(Err(e))
            }
        };
        self.release();
        last
    }
}

impl Drop for QueryStream<'_> {
    fn drop(&mut self) {
        let Some(mut connection) = self.connection.take() else {
            return;
        };
        debug!("query abandoned on {}, cancelling", connection.host());
        let drained = connection.cancel().is_ok() && connection.drain(ABANDON_DRAIN);
        if !drained {
            warn!("failed to drain abandoned query on {}, closing connection", connection.host());
            connection.close();
        }
        drop(connection);
        drop(self.pass.take());
    }
}

/// Blocks of a running query, in the order the server sends them.
///
/// The first block is usually an empty header describing the result columns. Dropping the
/// result before it is exhausted cancels the query.
pub struct QueryResult<'c> {
    stream: QueryStream<'c>,
}

impl<'c> QueryResult<'c> {
    pub(crate) fn new(stream: QueryStream<'c>) -> Self {
        Self { stream }
    }

    /// Whether the server has finished the query.
    pub fn is_finished(&self) -> bool {
        self.stream.is_done()
    }

    /// A handle that cancels this query from another thread, for example a signal handler.
    /// The result then ends with the server's answer to the cancel.
    pub fn cancel_handle(&self) -> Result<CancelHandle> {
        self.stream.cancel_handle()
    }

    /// Reads the rest of the stream, discarding it. Unlike dropping the result, this lets
    /// the query run to completion and reports its exception, if any.
    pub fn drain(mut self) -> Result<()> {
        for block in &mut self {
            block?;
        }
        Ok(())
    }

    /// Row view over the remaining blocks.
    pub fn rows(self) -> Rows<'c> {
        Rows {
            result: self,
            pending: VecDeque::new(),
        }
    }
}

impl Iterator for QueryResult<'_> {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.stream.next_response()? {
                Ok(Response::Data(packet)) => return Some(Ok(packet.block)),
                Ok(other) => trace!("query result skipping {}", other.kind()),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Something the server reported while running a query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryEvent {
    Data(Block),
    Progress(Progress),
    Totals(Block),
    Extremes(Block),
    ProfileInfo(ProfileInfo),
}

/// Every data block and side channel packet of a running query, in arrival order.
pub struct QueryEvents<'c> {
    stream: QueryStream<'c>,
}

impl<'c> QueryEvents<'c> {
    pub(crate) fn new(stream: QueryStream<'c>) -> Self {
        Self { stream }
    }
}

impl Iterator for QueryEvents<'_> {
    type Item = Result<QueryEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let event = match self.stream.next_response()? {
                Ok(Response::Data(packet)) => QueryEvent::Data(packet.block),
                Ok(Response::Progress(progress)) => QueryEvent::Progress(progress),
                Ok(Response::Totals(packet)) => QueryEvent::Totals(packet.block),
                Ok(Response::Extremes(packet)) => QueryEvent::Extremes(packet.block),
                Ok(Response::ProfileInfo(info)) => QueryEvent::ProfileInfo(info),
                Ok(other) => {
                    trace!("query events skipping {}", other.kind());
                    continue;
                }
                Err(e) => return Some(Err(e)),
            };
            return Some(Ok(event));
        }
    }
}

/// Rows of a running query, one block at a time.
pub struct Rows<'c> {
    result: QueryResult<'c>,
    pending: VecDeque<Row>,
}

impl Rows<'_> {
    fn buffer(&mut self, block: Block) {
        let rows = block.rows();
        let columns = block.into_columns();
        let names = Arc::new(columns.iter().map(|c| c.name.clone()).collect::<Vec<_>>());
        let mut cells: Vec<_> = columns.into_iter().map(|c| c.values.into_iter()).collect();
        for _ in 0..rows {
            let values = cells.iter_mut().map(|c| c.next().unwrap_or(Value::Null)).collect();
            self.pending.push_back(Row::new(Arc::clone(&names), values));
        }
    }
}

impl Iterator for Rows<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.pending.pop_front() {
                return Some(Ok(row));
            }
            match self.result.next()? {
                Ok(block) => self.buffer(block),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
