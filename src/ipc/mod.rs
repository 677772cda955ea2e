use crate::error::TransportError;
use crate::mqi::mqc;
use crate::trace::TraceId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod connection;
pub mod duplex;
pub mod wire;

pub use connection::{ConnectionManager, QueueDirection};
pub use duplex::{CloseReport, DuplexQueueTransport};

/// Interaction kind of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mtid {
    /// Fire-and-forget message (no response expected)
    Notification,
    /// Request message (expecting response)
    Request,
    /// Response message (reply to request)
    Response,
    /// Inbound message whose type could not be classified
    Error,
}

impl Mtid {
    /// Wire message type for this kind. `Error` is a decode-only
    /// classification and has no code of its own.
    pub fn msg_type(self) -> Option<i32> {
        match self {
            Mtid::Notification => Some(mqc::MQMT_DATAGRAM),
            Mtid::Request => Some(mqc::MQMT_REQUEST),
            Mtid::Response => Some(mqc::MQMT_REPLY),
            Mtid::Error => None,
        }
    }

    /// Total inverse of [`Mtid::msg_type`]; unknown codes become `Error`.
    pub fn from_msg_type(code: i32) -> Self {
        match code {
            mqc::MQMT_DATAGRAM => Mtid::Notification,
            mqc::MQMT_REQUEST => Mtid::Request,
            mqc::MQMT_REPLY => Mtid::Response,
            _ => Mtid::Error,
        }
    }

    /// Classify an inbound message. A nonzero correlation id always means
    /// `Response`, whatever type the sender declared.
    pub fn classify(msg_type: i32, correl_id: &TraceId) -> Self {
        if correl_id.is_zero() {
            Mtid::from_msg_type(msg_type)
        } else {
            Mtid::Response
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mtid::Notification => "notification",
            Mtid::Request => "request",
            Mtid::Response => "response",
            Mtid::Error => "error",
        }
    }
}

impl fmt::Display for Mtid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mtid {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "notification" => Ok(Mtid::Notification),
            "request" => Ok(Mtid::Request),
            "response" => Ok(Mtid::Response),
            "error" => Ok(Mtid::Error),
            other => Err(format!("unknown interaction kind: {}", other)),
        }
    }
}

/// Message body, either character data or raw bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Text(String),
    Bytes(Vec<u8>),
}

impl Payload {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text(text) => text.as_bytes(),
            Payload::Bytes(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Payload::Text(_))
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

/// Interaction metadata carried next to a payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeMeta {
    /// Hex message id, present on inbound messages only
    pub id: Option<String>,
    /// Correlation id; zero when the message belongs to no interaction
    pub trace: TraceId,
    pub mtid: Mtid,
}

/// Unit of exchange between the transport and the layer above it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEnvelope {
    pub payload: Payload,
    pub meta: EnvelopeMeta,
}

impl MessageEnvelope {
    pub fn new(payload: impl Into<Payload>, mtid: Mtid, trace: TraceId) -> Self {
        Self {
            payload: payload.into(),
            meta: EnvelopeMeta {
                id: None,
                trace,
                mtid,
            },
        }
    }

    pub fn notification(payload: impl Into<Payload>) -> Self {
        Self::new(payload, Mtid::Notification, TraceId::ZERO)
    }

    pub fn request(payload: impl Into<Payload>, trace: TraceId) -> Self {
        Self::new(payload, Mtid::Request, trace)
    }

    pub fn response(payload: impl Into<Payload>, trace: TraceId) -> Self {
        Self::new(payload, Mtid::Response, trace)
    }
}

/// Result of one read poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Message(MessageEnvelope),
    /// Nothing on the queue right now
    Empty,
}

/// Lifecycle of a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Init,
    Connecting,
    Ready,
    Closing,
    Closed,
}

/// Where and how to reach the queue manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub channel: String,
    pub manager: String,
    /// Frame-level tracing of every put and get
    #[serde(default)]
    pub debug: bool,
}

impl ConnectionConfig {
    /// Client connection name in `host(port)` form
    pub fn connection_name(&self) -> String {
        format!("{}({})", self.host, self.port)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: crate::defaults::MQ_PORT,
            channel: crate::defaults::CHANNEL.to_string(),
            manager: crate::defaults::MANAGER.to_string(),
            debug: false,
        }
    }
}

/// Transport configuration: the connection plus the two queue names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(flatten)]
    pub connection: ConnectionConfig,
    /// Outbound queue, opened for output
    pub send: String,
    /// Inbound queue, opened for exclusive input; also the reply-to queue
    pub receive: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            send: crate::defaults::SEND_QUEUE.to_string(),
            receive: crate::defaults::RECEIVE_QUEUE.to_string(),
        }
    }
}

/// Duplex message transport interface
///
/// `read` separates "nothing to read yet" ([`ReadOutcome::Empty`]) from
/// failure, so callers can poll without tearing the transport down.
#[async_trait]
pub trait DuplexTransport: Send + Sync {
    /// Wait until the transport is usable, or report why it never will be
    async fn ready(&self) -> Result<(), TransportError>;

    /// Send one message
    async fn write(&self, envelope: MessageEnvelope) -> Result<(), TransportError>;

    /// Poll for one message without blocking
    async fn read(&self) -> Result<ReadOutcome, TransportError>;

    /// Close the transport; closing twice is a no-op
    async fn close(&self) -> Result<(), TransportError>;

    /// Current lifecycle state
    fn state(&self) -> TransportState;

    /// Get transport name for identification
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_table_is_bidirectional() {
        for mtid in [Mtid::Notification, Mtid::Request, Mtid::Response] {
            let code = mtid.msg_type().unwrap();
            assert_eq!(Mtid::from_msg_type(code), mtid);
        }
        assert_eq!(Mtid::Error.msg_type(), None);
    }

    #[test]
    fn test_unknown_type_code_is_error() {
        assert_eq!(Mtid::from_msg_type(mqc::MQMT_REPORT), Mtid::Error);
        assert_eq!(Mtid::from_msg_type(0), Mtid::Error);
        assert_eq!(Mtid::classify(12345, &TraceId::ZERO), Mtid::Error);
    }

    #[test]
    fn test_nonzero_correlation_wins() {
        let trace = TraceId::generate("ut");
        assert_eq!(Mtid::classify(mqc::MQMT_DATAGRAM, &trace), Mtid::Response);
        assert_eq!(Mtid::classify(mqc::MQMT_REQUEST, &trace), Mtid::Response);
        assert_eq!(Mtid::classify(12345, &trace), Mtid::Response);
        assert_eq!(
            Mtid::classify(mqc::MQMT_REQUEST, &TraceId::ZERO),
            Mtid::Request
        );
    }

    #[test]
    fn test_mtid_string_forms() {
        assert_eq!(Mtid::Notification.to_string(), "notification");
        assert_eq!("response".parse::<Mtid>().unwrap(), Mtid::Response);
        assert!("frame".parse::<Mtid>().is_err());
        assert_eq!(serde_json::to_string(&Mtid::Request).unwrap(), "\"request\"");
    }

    #[test]
    fn test_payload_forms() {
        let text = Payload::from("ping");
        assert!(text.is_text());
        assert_eq!(text.as_bytes(), b"ping");

        let bytes = Payload::from(vec![0u8, 159, 146, 150]);
        assert!(!bytes.is_text());
        assert_eq!(bytes.len(), 4);
    }

    #[test]
    fn test_transport_config_default() {
        let config = TransportConfig::default();

        assert_eq!(config.connection.host, "127.0.0.1");
        assert_eq!(config.connection.port, 1414);
        assert_eq!(config.connection.connection_name(), "127.0.0.1(1414)");
        assert_eq!(config.send, crate::defaults::SEND_QUEUE);
        assert_eq!(config.receive, crate::defaults::RECEIVE_QUEUE);
        assert!(!config.connection.debug);
    }

    #[test]
    fn test_transport_config_from_json() {
        let config: TransportConfig = serde_json::from_str(
            r#"{"host": "mq.local", "port": 1415, "channel": "APP.SVRCONN",
                "manager": "QM2", "send": "Q.OUT", "receive": "Q.IN"}"#,
        )
        .unwrap();

        assert_eq!(config.connection.connection_name(), "mq.local(1415)");
        assert_eq!(config.connection.manager, "QM2");
        assert_eq!(config.send, "Q.OUT");
        assert!(!config.connection.debug);
    }
}
