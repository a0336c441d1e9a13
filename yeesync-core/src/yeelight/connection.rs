//! Control connection to a single bulb.
//!
//! The TCP stream is framed with [`YeelightCodec`] and split into a
//! writer task fed by an `mpsc` channel and a reader task that routes
//! replies back to their callers through `oneshot` channels keyed by
//! request id. Anything the reader cannot route becomes a
//! [`DeviceFault`].

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, trace, warn};

use crate::device::{DeviceFault, FaultSink};
use crate::error::DeviceError;
use crate::yeelight::codec::YeelightCodec;
use crate::yeelight::message::{Message, Method, Request};

type ReplySender = oneshot::Sender<Result<Vec<Value>, DeviceError>>;
type PendingMap = Arc<Mutex<HashMap<u64, ReplySender>>>;

// ── FaultRelay ───────────────────────────────────────────────────

/// Forwards out-of-band errors to whichever sink is registered.
#[derive(Clone)]
pub(crate) struct FaultRelay {
    address: String,
    sink: Arc<OnceLock<FaultSink>>,
}

impl FaultRelay {
    pub(crate) fn new(address: String, sink: Arc<OnceLock<FaultSink>>) -> Self {
        Self { address, sink }
    }

    pub(crate) fn push(&self, message: impl Into<String>) {
        let fault = DeviceFault {
            address: self.address.clone(),
            message: message.into(),
        };
        match self.sink.get() {
            Some(sink) => {
                let _ = sink.send(fault);
            }
            None => warn!("unobserved device fault: {fault}"),
        }
    }
}

// ── ControlConnection ────────────────────────────────────────────

pub(crate) struct ControlConnection {
    tx: mpsc::Sender<Request>,
    pending: PendingMap,
    next_id: AtomicU64,
    local_addr: SocketAddr,
    timeout: Duration,
    reader: JoinHandle<()>,
}

impl ControlConnection {
    /// Connect to the bulb and start the reader/writer tasks.
    pub(crate) async fn open(
        addr: SocketAddr,
        timeout: Duration,
        faults: FaultRelay,
    ) -> Result<Self, DeviceError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| DeviceError::Timeout(timeout))??;
        stream.set_nodelay(true)?;
        let local_addr = stream.local_addr()?;

        let (mut net_writer, mut net_reader) = Framed::new(stream, YeelightCodec::default()).split();
        let (tx, mut rx) = mpsc::channel::<Request>(64);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        // Writer task: caller -> network
        let writer_faults = faults.clone();
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                trace!("→ {} #{}", request.method, request.id);
                if let Err(e) = net_writer.send(request).await {
                    writer_faults.push(format!("write failed: {e}"));
                    break;
                }
            }
        });

        // Reader task: network -> pending callers
        let reader_pending = Arc::clone(&pending);
        let reader = tokio::spawn(async move {
            while let Some(frame) = net_reader.next().await {
                let line = match frame {
                    Ok(line) => line,
                    Err(e) => {
                        faults.push(format!("framing error: {e}"));
                        // Framed yields nothing further after a decode error.
                        break;
                    }
                };
                let message = match line.and_then(Message::try_from) {
                    Ok(message) => message,
                    Err(e) => {
                        faults.push(format!("undecodable message: {e}"));
                        continue;
                    }
                };
                match message {
                    Message::Reply { id, result } => {
                        let waiter = reader_pending.lock().await.remove(&id);
                        match (waiter, result) {
                            (Some(waiter), result) => {
                                let _ = waiter.send(result);
                            }
                            (None, Err(e)) => faults.push(format!("unsolicited error reply #{id}: {e}")),
                            (None, Ok(_)) => trace!("late reply #{id} ignored"),
                        }
                    }
                    Message::Notification { method, params } => {
                        debug!("notification received: {method} {params}");
                    }
                }
            }
            faults.push("connection closed by device");
            // Dropping the senders wakes every waiter with `ChannelClosed`.
            reader_pending.lock().await.clear();
        });

        Ok(Self {
            tx,
            pending,
            next_id: AtomicU64::new(1),
            local_addr,
            timeout,
            reader,
        })
    }

    /// The local interface address used to reach the bulb.
    pub(crate) fn local_ip(&self) -> IpAddr {
        self.local_addr.ip()
    }

    /// Send a request and wait for its reply.
    pub(crate) async fn call(
        &self,
        method: Method,
        params: Vec<Value>,
    ) -> Result<Vec<Value>, DeviceError> {
        if self.reader.is_finished() {
            return Err(DeviceError::ChannelClosed);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.lock().await.insert(id, reply_tx);

        if let Err(e) = self.tx.send(Request::new(id, method, params)).await {
            self.pending.lock().await.remove(&id);
            return Err(e.into());
        }

        match tokio::time::timeout(self.timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(DeviceError::ChannelClosed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(DeviceError::Timeout(self.timeout))
            }
        }
    }
}

impl Drop for ControlConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
