use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::thread;
use std::time::Duration;

use log::{debug, trace};

use crate::error::{Error, Result};
use crate::protocol::{ProtocolTransport, Response};

use super::channel::Channel;

/// Decoded packets buffered between the reader thread and the connection.
const QUEUE_DEPTH: usize = 16;

/// Outcome of waiting on the pump.
#[derive(Debug)]
pub enum Received {
    Response(Response),
    /// The wait elapsed. Nothing was lost; the next packet is still on its way.
    TimedOut,
}

/// Reader thread that decodes server packets and hands them over in arrival order.
///
/// Packets are delivered through a bounded queue, so the thread stops reading from the
/// socket when the consumer falls behind. The first decode or I/O failure is delivered as
/// an error and ends the thread.
pub struct Pump {
    receiver: Option<Receiver<Result<Response>>>,
    stop: Arc<AtomicBool>,
    channel: Channel,
    worker: Option<thread::JoinHandle<()>>,
}

impl Pump {
    pub fn spawn(channel: Channel, compression: bool) -> Result<Self> {
        let (sender, receiver) = mpsc::sync_channel(QUEUE_DEPTH);
        let stop = Arc::new(AtomicBool::new(false));
        let transport = ProtocolTransport::new(channel.try_clone()?).with_compression(compression);
        let name = match channel.peer_addr() {
            Ok(addr) => format!("chnative-pump-{addr}"),
            Err(_) => "chnative-pump".to_string(),
        };

        let flag = Arc::clone(&stop);
        let worker = thread::Builder::new()
            .name(name)
            .spawn(move || run(transport, sender, flag))?;

        Ok(Self {
            receiver: Some(receiver),
            stop,
            channel,
            worker: Some(worker),
        })
    }

    /// Waits for the next packet. `None` waits without bound.
    pub fn recv(&self, timeout: Option<Duration>) -> Result<Received> {
        let receiver = self
            .receiver
            .as_ref()
            .ok_or_else(|| Error::Closed("response pump stopped".to_string()))?;
        let next = match timeout {
            Some(timeout) => match receiver.recv_timeout(timeout) {
                Ok(next) => next,
                Err(RecvTimeoutError::Timeout) => return Ok(Received::TimedOut),
                Err(RecvTimeoutError::Disconnected) => return Err(disconnected()),
            },
            None => receiver.recv().map_err(|_| disconnected())?,
        };
        next.map(Received::Response)
    }

    /// Stops the reader thread and closes the socket.
    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.channel.shutdown();
        // Unblocks a reader stuck on a full queue.
        drop(self.receiver.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                debug!("response pump panicked");
            }
        }
    }
}

impl Drop for Pump {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn disconnected() -> Error {
    Error::Closed("connection closed while waiting for a response".to_string())
}

fn run(mut transport: ProtocolTransport<Channel>, sender: SyncSender<Result<Response>>, stop: Arc<AtomicBool>) {
    debug!("response pump started");
    loop {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        let next = match transport.read_response() {
            Ok(response) => {
                trace!("pump decoded {}", response.kind());
                if let Response::Hello(context) = &response {
                    transport.set_server_context(context.clone());
                }
                Ok(response)
            }
            Err(e) if e.is_would_block() => continue,
            Err(e) => Err(Error::from(e)),
        };
        let failed = next.is_err();
        if sender.send(next).is_err() || failed {
            break;
        }
    }
    debug!("response pump stopped");
}
