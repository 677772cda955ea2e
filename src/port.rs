//! Port adapter: codec plus transport.
//!
//! This is the surface the outer framework talks to. Sending runs a payload
//! through the codec and writes it; receiving reads one envelope and decodes
//! it. [`MqPort::spawn_reader`] turns the pull-based transport into a stream
//! that only polls the queue while the consumer has room for more.

use crate::codec::{MqCodec, PortMeta, WireEnvelope};
use crate::error::TransportError;
use crate::ipc::{DuplexQueueTransport, DuplexTransport, MessageEnvelope, Payload, ReadOutcome, TransportConfig};
use crate::mqi::QueueManagerClient;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A decoded inbound message
pub type Received = (Payload, PortMeta);

/// Port configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfig {
    /// Name of the owning endpoint, used for the dispatch label
    pub id: String,
    /// Trace prefix stamped on outgoing requests
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Pause after an empty poll in the reader pump
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    pub connection: TransportConfig,
}

fn default_prefix() -> String {
    crate::defaults::TRACE_PREFIX.to_string()
}

fn default_poll_interval_ms() -> u64 {
    crate::defaults::POLL_INTERVAL.as_millis() as u64
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            id: crate::defaults::PORT_ID.to_string(),
            prefix: default_prefix(),
            poll_interval_ms: default_poll_interval_ms(),
            connection: TransportConfig::default(),
        }
    }
}

impl PortConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Codec and transport bound together
#[derive(Clone)]
pub struct MqPort {
    codec: Arc<MqCodec>,
    transport: Arc<dyn DuplexTransport>,
    poll_interval: Duration,
}

impl MqPort {
    /// Open a queue transport for `config` and wrap it. Must be called from
    /// within a tokio runtime.
    pub fn open(client: Arc<dyn QueueManagerClient>, config: PortConfig) -> Self {
        let transport = DuplexQueueTransport::open(client, config.connection.clone());
        Self::with_transport(&config, Arc::new(transport))
    }

    /// Wrap an existing transport
    pub fn with_transport(config: &PortConfig, transport: Arc<dyn DuplexTransport>) -> Self {
        Self {
            codec: Arc::new(MqCodec::new(config.prefix.clone(), config.id.clone())),
            transport,
            poll_interval: config.poll_interval(),
        }
    }

    pub fn codec(&self) -> &MqCodec {
        &self.codec
    }

    pub fn transport(&self) -> &Arc<dyn DuplexTransport> {
        &self.transport
    }

    pub async fn ready(&self) -> Result<(), TransportError> {
        self.transport.ready().await
    }

    /// Encode and write one message. For a request without a trace, the
    /// generated trace is left in `meta`.
    pub async fn send(
        &self,
        payload: impl Into<Payload>,
        meta: &mut PortMeta,
    ) -> Result<(), TransportError> {
        let frame = self.codec.encode(payload.into(), meta);
        self.transport.write(MessageEnvelope::from(frame)).await
    }

    /// Read and decode one message; `None` when the queue is empty
    pub async fn receive(&self) -> Result<Option<Received>, TransportError> {
        match self.transport.read().await? {
            ReadOutcome::Message(envelope) => {
                let id = envelope.meta.id.clone();
                let mut meta = PortMeta::new(envelope.meta.mtid);
                let payload = self.codec.decode(WireEnvelope::from(envelope), &mut meta);
                meta.id = id;
                Ok(Some((payload, meta)))
            }
            ReadOutcome::Empty => Ok(None),
        }
    }

    /// Start a background reader delivering into a channel of `capacity`.
    ///
    /// A get is only issued once a slot in the channel is reserved, so a slow
    /// consumer stops the polling instead of piling messages up in memory.
    /// After an empty poll the reader sleeps for the poll interval. It stops
    /// after delivering a fatal error or when the receiver is dropped.
    pub fn spawn_reader(&self, capacity: usize) -> mpsc::Receiver<Result<Received, TransportError>> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let port = self.clone();

        tokio::spawn(async move {
            loop {
                let permit = match tx.reserve().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        debug!("Reader stopped: consumer dropped");
                        break;
                    }
                };
                match port.receive().await {
                    Ok(Some(received)) => permit.send(Ok(received)),
                    Ok(None) => {
                        drop(permit);
                        tokio::time::sleep(port.poll_interval).await;
                    }
                    Err(e) => {
                        warn!("Reader stopped: {}", e);
                        permit.send(Err(e));
                        break;
                    }
                }
            }
        });

        rx
    }

    pub async fn close(&self) -> Result<(), TransportError> {
        self.transport.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::{ConnectionConfig, Mtid, TransportState};
    use crate::mqi::{mqc, MemoryQueueManager, MessageDescriptor, Verb};

    fn port_config() -> PortConfig {
        PortConfig {
            id: "billing".to_string(),
            connection: TransportConfig {
                connection: ConnectionConfig {
                    manager: "QM1".to_string(),
                    ..Default::default()
                },
                send: "Q.OUT".to_string(),
                receive: "Q.IN".to_string(),
            },
            poll_interval_ms: 5,
            ..Default::default()
        }
    }

    fn manager() -> Arc<MemoryQueueManager> {
        Arc::new(MemoryQueueManager::with_queues("QM1", &["Q.OUT", "Q.IN"]))
    }

    #[test]
    fn test_port_config_defaults_from_json() {
        let config: PortConfig = serde_json::from_str(
            r#"{"id": "mq", "connection": {"host": "h", "port": 1, "channel": "C",
                "manager": "M", "send": "S", "receive": "R"}}"#,
        )
        .unwrap();
        assert_eq!(config.prefix, "ut");
        assert_eq!(config.poll_interval(), crate::defaults::POLL_INTERVAL);
    }

    #[tokio::test]
    async fn test_send_request_stamps_trace_and_reply_to() {
        let qm = manager();
        let port = MqPort::open(qm.clone(), port_config());

        let mut meta = PortMeta::new(Mtid::Request);
        port.send("ping", &mut meta).await.unwrap();

        let queued = qm.browse("Q.OUT");
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].descriptor.msg_type, mqc::MQMT_REQUEST);
        assert_eq!(queued[0].descriptor.reply_to_q, "Q.IN");
        assert_eq!(queued[0].descriptor.correl_id, *meta.trace.as_bytes());
        assert_eq!(queued[0].payload, b"ping");
    }

    #[tokio::test]
    async fn test_receive_labels_message() {
        let qm = manager();
        let port = MqPort::open(qm.clone(), port_config());
        port.ready().await.unwrap();
        assert!(port.receive().await.unwrap().is_none());

        qm.enqueue(
            "Q.IN",
            MessageDescriptor {
                msg_type: mqc::MQMT_DATAGRAM,
                format: mqc::MQFMT_STRING.to_string(),
                ..Default::default()
            },
            b"hello",
        );
        let (payload, meta) = port.receive().await.unwrap().unwrap();

        assert_eq!(payload, Payload::from("hello"));
        assert_eq!(meta.mtid, Mtid::Notification);
        assert_eq!(meta.method.as_deref(), Some("billingIn.message"));
        assert_eq!(meta.id.map(|id| id.len()), Some(48));
    }

    #[tokio::test]
    async fn test_reader_delivers_and_survives_empty_polls() {
        let qm = manager();
        let port = MqPort::open(qm.clone(), port_config());
        let mut reader = port.spawn_reader(4);

        tokio::time::sleep(Duration::from_millis(20)).await;
        qm.enqueue("Q.IN", MessageDescriptor::default(), b"late");

        let (payload, _) = tokio::time::timeout(Duration::from_secs(2), reader.recv())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(payload, Payload::Bytes(b"late".to_vec()));
        assert_eq!(port.transport().state(), TransportState::Ready);
    }

    #[tokio::test]
    async fn test_reader_reports_fatal_error_and_stops() {
        let qm = manager();
        let port = MqPort::open(qm.clone(), port_config());
        port.ready().await.unwrap();
        qm.fail_next(Verb::Get, mqc::MQRC_CONNECTION_BROKEN);
        let mut reader = port.spawn_reader(1);

        let first = tokio::time::timeout(Duration::from_secs(2), reader.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(first, Err(TransportError::Get { .. })));
        assert!(reader.recv().await.is_none());
    }
}
