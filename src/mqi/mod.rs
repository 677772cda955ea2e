//! Narrow interface onto a queue-manager client library.
//!
//! The transport never talks to a broker directly. Everything it needs is the
//! six MQI verbs below, expressed as the [`QueueManagerClient`] trait with
//! MQI-shaped descriptor structs. A binding to a native client library only
//! has to implement this trait; [`MemoryQueueManager`] is an in-process
//! implementation used by tests and the loopback binary.

use async_trait::async_trait;
use std::fmt;

pub mod memory;
pub mod mqc;

pub use memory::{Call, MemoryQueueManager};

/// A 24 byte message or correlation identifier
pub type Id24 = [u8; mqc::MQ_MSG_ID_LENGTH];

/// Handle for an established session with a queue manager (`HCONN`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionHandle(u64);

impl ConnectionHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Handle for an open queue object (`HOBJ`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueHandle(u64);

impl QueueHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// MQI verbs, used to label errors and to inject failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Connect,
    Open,
    Put,
    Get,
    Close,
    Disconnect,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Connect => "MQCONNX",
            Verb::Open => "MQOPEN",
            Verb::Put => "MQPUT",
            Verb::Get => "MQGET",
            Verb::Close => "MQCLOSE",
            Verb::Disconnect => "MQDISC",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by the queue manager for a single verb
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqError {
    pub verb: Verb,
    pub comp_code: i32,
    pub reason: i32,
}

impl fmt::Display for MqError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: CC={} RC={} [{}]",
            self.verb,
            self.comp_code,
            self.reason,
            mqc::reason_name(self.reason)
        )
    }
}

impl std::error::Error for MqError {}

impl MqError {
    /// A failed completion with the given reason code
    pub fn failed(verb: Verb, reason: i32) -> Self {
        Self {
            verb,
            comp_code: mqc::MQCC_FAILED,
            reason,
        }
    }

    /// True when a get found the queue empty
    pub fn is_no_message(&self) -> bool {
        self.reason == mqc::MQRC_NO_MSG_AVAILABLE
    }
}

/// Connect options (`MQCNO` plus the client channel definition `MQCD`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub options: i32,
    /// `host(port)`
    pub connection_name: String,
    pub channel_name: String,
    pub appl_name: String,
    /// Ask the client library for verbose diagnostics
    pub debug: bool,
}

/// Object descriptor (`MQOD`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDescriptor {
    pub object_name: String,
    pub object_type: i32,
}

impl ObjectDescriptor {
    pub fn queue(name: impl Into<String>) -> Self {
        Self {
            object_name: name.into(),
            object_type: mqc::MQOT_Q,
        }
    }
}

/// The subset of the message descriptor (`MQMD`) the transport uses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDescriptor {
    pub msg_type: i32,
    pub format: String,
    pub msg_id: Id24,
    pub correl_id: Id24,
    pub reply_to_q: String,
}

impl Default for MessageDescriptor {
    fn default() -> Self {
        Self {
            msg_type: mqc::MQMT_DATAGRAM,
            format: mqc::MQFMT_NONE.to_string(),
            msg_id: [0; mqc::MQ_MSG_ID_LENGTH],
            correl_id: [0; mqc::MQ_CORREL_ID_LENGTH],
            reply_to_q: String::new(),
        }
    }
}

impl MessageDescriptor {
    /// True when the format names a character string payload
    pub fn is_string_format(&self) -> bool {
        self.format.trim_end() == mqc::MQFMT_STRING.trim_end()
    }
}

/// Put message options (`MQPMO`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PutOptions {
    pub options: i32,
}

/// Get message options (`MQGMO`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetOptions {
    pub options: i32,
    pub match_options: i32,
    pub wait_interval: i32,
}

impl GetOptions {
    pub fn has(&self, option: i32) -> bool {
        self.options & option == option
    }
}

/// A message as stored on, or retrieved from, a queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqMessage {
    pub descriptor: MessageDescriptor,
    pub payload: Vec<u8>,
}

/// Asynchronous MQI capability the transport is written against
///
/// Every call runs to completion once issued; there is no cancellation.
#[async_trait]
pub trait QueueManagerClient: Send + Sync {
    /// Connect to the named queue manager (`MQCONNX`)
    async fn connect(
        &self,
        manager: &str,
        options: &ConnectOptions,
    ) -> Result<ConnectionHandle, MqError>;

    /// Open an object (`MQOPEN`)
    async fn open(
        &self,
        conn: ConnectionHandle,
        descriptor: &ObjectDescriptor,
        options: i32,
    ) -> Result<QueueHandle, MqError>;

    /// Put a message (`MQPUT`), returning the descriptor as stamped by the
    /// queue manager (generated message and correlation identifiers)
    async fn put(
        &self,
        conn: ConnectionHandle,
        queue: QueueHandle,
        descriptor: MessageDescriptor,
        options: &PutOptions,
        payload: &[u8],
    ) -> Result<MessageDescriptor, MqError>;

    /// Get a message (`MQGET`)
    async fn get(
        &self,
        conn: ConnectionHandle,
        queue: QueueHandle,
        options: &GetOptions,
    ) -> Result<MqMessage, MqError>;

    /// Close an object handle (`MQCLOSE`)
    async fn close(
        &self,
        conn: ConnectionHandle,
        queue: QueueHandle,
        options: i32,
    ) -> Result<(), MqError>;

    /// Disconnect (`MQDISC`)
    async fn disconnect(&self, conn: ConnectionHandle) -> Result<(), MqError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mq_error_display() {
        let err = MqError::failed(Verb::Get, mqc::MQRC_NO_MSG_AVAILABLE);
        assert_eq!(err.to_string(), "MQGET: CC=2 RC=2033 [MQRC_NO_MSG_AVAILABLE]");
        assert!(err.is_no_message());
        assert!(!MqError::failed(Verb::Get, mqc::MQRC_CONNECTION_BROKEN).is_no_message());
    }

    #[test]
    fn test_descriptor_defaults() {
        let md = MessageDescriptor::default();
        assert_eq!(md.msg_type, mqc::MQMT_DATAGRAM);
        assert_eq!(md.format.len(), 8);
        assert!(!md.is_string_format());
        assert_eq!(md.correl_id, [0u8; 24]);
    }

    #[test]
    fn test_string_format_ignores_padding() {
        let md = MessageDescriptor {
            format: "MQSTR".to_string(),
            ..Default::default()
        };
        assert!(md.is_string_format());
    }
}
