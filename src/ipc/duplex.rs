//! Duplex transport over a send queue and a receive queue.
//!
//! Lifecycle: `Init -> Connecting -> Ready -> Closing -> Closed`. The
//! handshake starts as soon as the transport is opened. A handshake failure
//! goes straight to `Closing`; so does a fatal read or an explicit close.
//! `Closing` always ends in `Closed`, whatever teardown reports.
//!
//! One put and one get may be in flight at a time; each path has its own
//! gate. Shutdown waits for an in-flight put and an in-flight get before
//! tearing down.

use super::connection::{ConnectionManager, QueueDirection};
use super::{wire, DuplexTransport, MessageEnvelope, ReadOutcome, TransportConfig, TransportState};
use crate::error::TransportError;
use crate::mqi::{ConnectionHandle, QueueHandle, QueueManagerClient};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{debug, error, trace, warn};

/// How a transport ended up closed
#[derive(Debug, Clone, Default)]
pub struct CloseReport {
    /// Error that forced the shutdown, if it was not an explicit close
    pub cause: Option<TransportError>,
    /// Failures from the teardown steps, in issue order
    pub teardown: Vec<TransportError>,
}

impl CloseReport {
    /// The error to surface for this shutdown; the original cause wins over
    /// teardown failures
    pub fn reason(&self) -> Option<&TransportError> {
        self.cause.as_ref().or_else(|| self.teardown.first())
    }

    pub fn is_clean(&self) -> bool {
        self.cause.is_none() && self.teardown.is_empty()
    }
}

struct Shared {
    config: TransportConfig,
    client: Arc<dyn QueueManagerClient>,
    handles: AsyncMutex<ConnectionManager>,
    state: watch::Sender<TransportState>,
    cause: Mutex<Option<TransportError>>,
    report: Mutex<Option<CloseReport>>,
    write_gate: AsyncMutex<()>,
    read_gate: AsyncMutex<()>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        if *self.state.borrow() == TransportState::Closed {
            return;
        }
        debug!("Dropping open transport for {}, releasing handles", self.config.send);
        // Last reference is gone without a close; release whatever is still
        // held if there is a runtime to do it on.
        let mut handles = std::mem::replace(
            self.handles.get_mut(),
            ConnectionManager::new(self.client.clone()),
        );
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                handles.teardown().await;
            });
        }
    }
}

/// Duplex transport bound to one queue manager connection
///
/// Cloning is cheap and every clone drives the same transport, so one task
/// can read while another writes.
#[derive(Clone)]
pub struct DuplexQueueTransport {
    shared: Arc<Shared>,
}

impl DuplexQueueTransport {
    /// Create the transport and start its handshake in the background.
    ///
    /// Must be called from within a tokio runtime. Use [`ready`] to wait for
    /// the outcome of the handshake, or just start writing: writes and reads
    /// wait for it too.
    ///
    /// [`ready`]: DuplexQueueTransport::ready
    pub fn open(client: Arc<dyn QueueManagerClient>, config: TransportConfig) -> Self {
        let (state, _) = watch::channel(TransportState::Init);
        let transport = Self {
            shared: Arc::new(Shared {
                handles: AsyncMutex::new(ConnectionManager::new(client.clone())),
                client,
                config,
                state,
                cause: Mutex::new(None),
                report: Mutex::new(None),
                write_gate: AsyncMutex::new(()),
                read_gate: AsyncMutex::new(()),
            }),
        };

        let handshake = transport.clone();
        tokio::spawn(async move { handshake.handshake().await });
        transport
    }

    pub fn config(&self) -> &TransportConfig {
        &self.shared.config
    }

    pub fn remote_address(&self) -> &str {
        &self.shared.config.connection.host
    }

    pub fn remote_port(&self) -> u16 {
        self.shared.config.connection.port
    }

    pub fn state(&self) -> TransportState {
        *self.shared.state.borrow()
    }

    /// Wait for the handshake. Fails with [`TransportError::Closed`] carrying
    /// the cause if the transport never became ready or has since shut.
    pub async fn ready(&self) -> Result<(), TransportError> {
        let mut state = self.shared.state.subscribe();
        let reached = state
            .wait_for(|s| !matches!(s, TransportState::Init | TransportState::Connecting))
            .await
            .map(|s| *s)
            .unwrap_or(TransportState::Closed);
        match reached {
            TransportState::Ready => Ok(()),
            _ => Err(self.closed_error()),
        }
    }

    /// Wait until the transport is closed and report how it got there
    pub async fn closed(&self) -> CloseReport {
        let mut state = self.shared.state.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = state.wait_for(|s| *s == TransportState::Closed).await;
        self.shared.report.lock().clone().unwrap_or_default()
    }

    /// Put one message on the send queue.
    ///
    /// Completion means the queue manager accepted the message, not that
    /// anyone received it. A failed put is reported to the caller and leaves
    /// the transport open.
    pub async fn write(&self, envelope: MessageEnvelope) -> Result<(), TransportError> {
        self.ready().await?;
        let _gate = self.shared.write_gate.lock().await;
        let (conn, queue) = self.usable_handle(QueueDirection::Out).await?;

        let config = &self.shared.config;
        let (descriptor, options) = wire::put_descriptor(&envelope, &config.receive);
        match self
            .shared
            .client
            .put(conn, queue, descriptor, &options, envelope.payload.as_bytes())
            .await
        {
            Ok(stamped) => {
                if config.connection.debug {
                    trace!(
                        method = "ibmmq.put",
                        mtid = %envelope.meta.mtid,
                        msg_id = %hex::encode(stamped.msg_id),
                        correl_id = %hex::encode(stamped.correl_id),
                        "put {} bytes to {}",
                        envelope.payload.len(),
                        config.send
                    );
                }
                Ok(())
            }
            Err(source) => {
                warn!("Put to {} failed: {}", config.send, source);
                Err(TransportError::Put {
                    queue: config.send.clone(),
                    source,
                })
            }
        }
    }

    /// Poll the receive queue once without waiting.
    ///
    /// An empty queue is [`ReadOutcome::Empty`] and leaves the transport
    /// ready. Any other failure is fatal: the transport shuts down and the
    /// error is returned. If a shutdown was already under way the result is
    /// [`TransportError::Closed`] instead.
    pub async fn read(&self) -> Result<ReadOutcome, TransportError> {
        self.ready().await?;
        let gate = self.shared.read_gate.lock().await;
        let (conn, queue) = self.usable_handle(QueueDirection::In).await?;

        let config = &self.shared.config;
        match self.shared.client.get(conn, queue, &wire::get_options()).await {
            Ok(message) => {
                let envelope = wire::envelope_from(message);
                if config.connection.debug {
                    trace!(
                        method = "ibmmq.get",
                        mtid = %envelope.meta.mtid,
                        trace = %envelope.meta.trace,
                        "got {} bytes from {}",
                        envelope.payload.len(),
                        config.receive
                    );
                }
                Ok(ReadOutcome::Message(envelope))
            }
            Err(source) if source.is_no_message() => Ok(ReadOutcome::Empty),
            Err(source) => {
                let err = TransportError::Get {
                    queue: config.receive.clone(),
                    source,
                };
                // Shutdown waits on the read gate.
                drop(gate);
                if !self.shutdown(Some(err.clone())).await {
                    return Err(self.closed_error());
                }
                error!("Read from {} failed, transport closed: {}", config.receive, err);
                Err(err)
            }
        }
    }

    /// Close the transport.
    ///
    /// Returns the first teardown failure, if any; the transport is closed
    /// either way. Closing a transport that is already closing or closed
    /// waits for it to finish and succeeds.
    pub async fn close(&self) -> Result<(), TransportError> {
        if !self.shutdown(None).await {
            self.closed().await;
            return Ok(());
        }
        let report = self.shared.report.lock().clone().unwrap_or_default();
        match report.teardown.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn handshake(&self) {
        if !self.transition(&[TransportState::Init], TransportState::Connecting) {
            return;
        }
        let established = {
            let mut handles = self.shared.handles.lock().await;
            // A close that got the handles first has already torn down.
            if self.state() != TransportState::Connecting {
                return;
            }
            handles.establish(&self.shared.config).await
        };
        match established {
            Ok(()) => {
                if !self.transition(&[TransportState::Connecting], TransportState::Ready) {
                    debug!("Handshake finished after close was requested");
                }
            }
            Err(err) => {
                error!("Transport handshake failed: {}", err);
                self.shutdown(Some(err)).await;
            }
        }
    }

    /// Move to `Closing`, tear down, and end in `Closed`. Returns false when
    /// another caller already owns the shutdown.
    async fn shutdown(&self, cause: Option<TransportError>) -> bool {
        {
            // Record the cause under the same lock readers take, so anyone who
            // sees `Closing` also sees why.
            let mut slot = self.shared.cause.lock();
            let live = [
                TransportState::Init,
                TransportState::Connecting,
                TransportState::Ready,
            ];
            if !self.transition(&live, TransportState::Closing) {
                return false;
            }
            *slot = cause.clone();
        }

        let teardown = {
            let _writes = self.shared.write_gate.lock().await;
            let _reads = self.shared.read_gate.lock().await;
            let mut handles = self.shared.handles.lock().await;
            handles.teardown().await
        };

        *self.shared.report.lock() = Some(CloseReport { cause, teardown });
        self.transition(&[TransportState::Closing], TransportState::Closed);
        true
    }

    fn transition(&self, from: &[TransportState], to: TransportState) -> bool {
        self.shared.state.send_if_modified(|state| {
            if from.contains(state) {
                debug!("Transport {:?} -> {:?}", state, to);
                *state = to;
                true
            } else {
                false
            }
        })
    }

    fn closed_error(&self) -> TransportError {
        let cause = self.shared.cause.lock().clone();
        TransportError::closed(cause)
    }

    async fn usable_handle(
        &self,
        direction: QueueDirection,
    ) -> Result<(ConnectionHandle, QueueHandle), TransportError> {
        if self.state() != TransportState::Ready {
            return Err(self.closed_error());
        }
        let handles = self.shared.handles.lock().await;
        match (handles.connection(), handles.queue(direction)) {
            (Some(conn), Some(queue)) => Ok((conn, queue)),
            _ => Err(self.closed_error()),
        }
    }
}

#[async_trait]
impl DuplexTransport for DuplexQueueTransport {
    async fn ready(&self) -> Result<(), TransportError> {
        DuplexQueueTransport::ready(self).await
    }

    async fn write(&self, envelope: MessageEnvelope) -> Result<(), TransportError> {
        DuplexQueueTransport::write(self, envelope).await
    }

    async fn read(&self) -> Result<ReadOutcome, TransportError> {
        DuplexQueueTransport::read(self).await
    }

    async fn close(&self) -> Result<(), TransportError> {
        DuplexQueueTransport::close(self).await
    }

    fn state(&self) -> TransportState {
        DuplexQueueTransport::state(self)
    }

    fn name(&self) -> &'static str {
        "MQ Duplex Queue"
    }
}
