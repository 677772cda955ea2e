//! Transport error taxonomy.

use crate::ipc::QueueDirection;
use crate::mqi::MqError;

/// Everything the duplex transport can fail with.
///
/// `Connection` and `QueueOpen` only ever arise during the handshake and are
/// fatal. `Put` is scoped to the write that raised it. `Get` closes the
/// transport. `Teardown` is reported after the fact and never prevents the
/// transport from reaching its closed state. `Closed` is returned for any
/// operation attempted once the transport is shut.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("failed to connect to queue manager {manager} via {connection_name}: {source}")]
    Connection {
        manager: String,
        connection_name: String,
        source: MqError,
    },

    #[error("failed to open queue {queue} for {direction}: {source}")]
    QueueOpen {
        queue: String,
        direction: QueueDirection,
        source: MqError,
    },

    #[error("put to queue {queue} failed: {source}")]
    Put { queue: String, source: MqError },

    #[error("get from queue {queue} failed: {source}")]
    Get { queue: String, source: MqError },

    #[error("teardown failed: {0}")]
    Teardown(#[source] MqError),

    #[error("transport is closed{}", closed_suffix(.reason))]
    Closed { reason: Option<Box<TransportError>> },
}

fn closed_suffix(reason: &Option<Box<TransportError>>) -> String {
    match reason {
        Some(reason) => format!(": {}", reason),
        None => String::new(),
    }
}

impl TransportError {
    pub fn closed(reason: Option<TransportError>) -> Self {
        TransportError::Closed {
            reason: reason.map(Box::new),
        }
    }

    /// The queue manager reason code behind this error, if there is one
    pub fn reason_code(&self) -> Option<i32> {
        match self {
            TransportError::Connection { source, .. }
            | TransportError::QueueOpen { source, .. }
            | TransportError::Put { source, .. }
            | TransportError::Get { source, .. }
            | TransportError::Teardown(source) => Some(source.reason),
            TransportError::Closed { reason } => reason.as_ref().and_then(|r| r.reason_code()),
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, TransportError::Closed { .. })
    }
}
