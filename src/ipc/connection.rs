//! Queue-manager session and queue handle ownership.

use super::{ConnectionConfig, TransportConfig};
use crate::error::TransportError;
use crate::mqi::{
    mqc, ConnectOptions, ConnectionHandle, ObjectDescriptor, QueueHandle, QueueManagerClient,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Direction a queue is opened for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueDirection {
    In,
    Out,
}

impl QueueDirection {
    pub fn open_options(self) -> i32 {
        match self {
            QueueDirection::In => mqc::MQOO_INPUT_EXCLUSIVE,
            QueueDirection::Out => mqc::MQOO_OUTPUT,
        }
    }
}

impl fmt::Display for QueueDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueDirection::In => write!(f, "input"),
            QueueDirection::Out => write!(f, "output"),
        }
    }
}

/// Connect options for a client binding described by `config`
pub fn connect_options(config: &ConnectionConfig) -> ConnectOptions {
    ConnectOptions {
        options: mqc::MQCNO_CLIENT_BINDING,
        connection_name: config.connection_name(),
        channel_name: config.channel.clone(),
        appl_name: crate::defaults::APPL_NAME.to_string(),
        debug: config.debug,
    }
}

/// Connect to the queue manager. No retry; a failure ends this attempt.
pub async fn connect(
    client: &dyn QueueManagerClient,
    config: &ConnectionConfig,
) -> Result<ConnectionHandle, TransportError> {
    let options = connect_options(config);
    debug!(
        "Connecting to queue manager {} at {} on channel {}",
        config.manager, options.connection_name, options.channel_name
    );
    client
        .connect(&config.manager, &options)
        .await
        .map_err(|source| TransportError::Connection {
            manager: config.manager.clone(),
            connection_name: options.connection_name.clone(),
            source,
        })
}

/// Open a named queue on an established connection
pub async fn open_queue(
    client: &dyn QueueManagerClient,
    conn: ConnectionHandle,
    name: &str,
    direction: QueueDirection,
) -> Result<QueueHandle, TransportError> {
    debug!("Opening queue {} for {}", name, direction);
    client
        .open(conn, &ObjectDescriptor::queue(name), direction.open_options())
        .await
        .map_err(|source| TransportError::QueueOpen {
            queue: name.to_string(),
            direction,
            source,
        })
}

/// Owns the connection and the two queue handles of one transport
///
/// Handles are stored as they are acquired, so a handshake that fails half
/// way still leaves everything it did acquire available for teardown. Each
/// handle is taken out of its slot before it is closed, which makes every
/// release happen at most once.
pub struct ConnectionManager {
    client: Arc<dyn QueueManagerClient>,
    connection: Option<ConnectionHandle>,
    send: Option<QueueHandle>,
    receive: Option<QueueHandle>,
}

impl ConnectionManager {
    pub fn new(client: Arc<dyn QueueManagerClient>) -> Self {
        Self {
            client,
            connection: None,
            send: None,
            receive: None,
        }
    }

    /// Connect, open the send queue, open the receive queue; strictly in
    /// that order, stopping at the first failure.
    pub async fn establish(&mut self, config: &TransportConfig) -> Result<(), TransportError> {
        let conn = connect(self.client.as_ref(), &config.connection).await?;
        self.connection = Some(conn);

        let send = open_queue(self.client.as_ref(), conn, &config.send, QueueDirection::Out).await?;
        self.send = Some(send);

        let receive =
            open_queue(self.client.as_ref(), conn, &config.receive, QueueDirection::In).await?;
        self.receive = Some(receive);

        debug!(
            "Connected to {} with send queue {} and receive queue {}",
            config.connection.manager, config.send, config.receive
        );
        Ok(())
    }

    pub fn connection(&self) -> Option<ConnectionHandle> {
        self.connection
    }

    /// Handle for the queue opened in `direction`
    pub fn queue(&self, direction: QueueDirection) -> Option<QueueHandle> {
        match direction {
            QueueDirection::Out => self.send,
            QueueDirection::In => self.receive,
        }
    }

    pub fn is_established(&self) -> bool {
        self.connection.is_some() && self.send.is_some() && self.receive.is_some()
    }

    /// Close one queue handle. A handle that is already gone is treated as
    /// closed.
    pub async fn close_queue(&mut self, direction: QueueDirection) -> Result<(), TransportError> {
        let handle = match direction {
            QueueDirection::Out => self.send.take(),
            QueueDirection::In => self.receive.take(),
        };
        close_handle(self.client.as_ref(), self.connection, handle).await
    }

    /// Drop the connection. Without one this is a no-op.
    pub async fn disconnect(&mut self) -> Result<(), TransportError> {
        match self.connection.take() {
            Some(conn) => self
                .client
                .disconnect(conn)
                .await
                .map_err(TransportError::Teardown),
            None => Ok(()),
        }
    }

    /// Release everything: both queue handles concurrently, then the
    /// connection. Every step runs even if an earlier one fails; the errors
    /// come back in the order the steps were issued.
    pub async fn teardown(&mut self) -> Vec<TransportError> {
        let client = self.client.clone();
        let conn = self.connection;
        let send = self.send.take();
        let receive = self.receive.take();

        let (send_result, receive_result) = tokio::join!(
            close_handle(client.as_ref(), conn, send),
            close_handle(client.as_ref(), conn, receive),
        );

        let mut errors = Vec::new();
        for result in [send_result, receive_result, self.disconnect().await] {
            if let Err(e) = result {
                warn!("Teardown step failed: {}", e);
                errors.push(e);
            }
        }
        errors
    }
}

async fn close_handle(
    client: &dyn QueueManagerClient,
    conn: Option<ConnectionHandle>,
    handle: Option<QueueHandle>,
) -> Result<(), TransportError> {
    match (conn, handle) {
        (Some(conn), Some(handle)) => client
            .close(conn, handle, mqc::MQCO_NONE)
            .await
            .map_err(TransportError::Teardown),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqi::{Call, MemoryQueueManager, Verb};

    fn config() -> TransportConfig {
        TransportConfig {
            connection: ConnectionConfig {
                manager: "QM1".to_string(),
                ..Default::default()
            },
            send: "Q.OUT".to_string(),
            receive: "Q.IN".to_string(),
        }
    }

    #[tokio::test]
    async fn test_establish_order() {
        let qm = Arc::new(MemoryQueueManager::with_queues("QM1", &["Q.OUT", "Q.IN"]));
        let mut manager = ConnectionManager::new(qm.clone());

        manager.establish(&config()).await.unwrap();

        assert!(manager.is_established());
        assert_eq!(
            qm.calls(),
            vec![
                Call::Connect {
                    manager: "QM1".to_string()
                },
                Call::Open {
                    queue: "Q.OUT".to_string(),
                    options: mqc::MQOO_OUTPUT
                },
                Call::Open {
                    queue: "Q.IN".to_string(),
                    options: mqc::MQOO_INPUT_EXCLUSIVE
                },
            ]
        );
        let cno = qm.last_connect().unwrap();
        assert_eq!(cno.connection_name, "127.0.0.1(1414)");
        assert_eq!(cno.options & mqc::MQCNO_CLIENT_BINDING, mqc::MQCNO_CLIENT_BINDING);
        assert_eq!(cno.appl_name, crate::defaults::APPL_NAME);
    }

    #[tokio::test]
    async fn test_failed_open_keeps_acquired_handles() {
        let qm = Arc::new(MemoryQueueManager::with_queues("QM1", &["Q.OUT"]));
        let mut manager = ConnectionManager::new(qm.clone());

        let err = manager.establish(&config()).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::QueueOpen { ref queue, direction: QueueDirection::In, .. } if queue == "Q.IN"
        ));
        assert!(manager.connection().is_some());
        assert!(manager.queue(QueueDirection::Out).is_some());
        assert!(manager.queue(QueueDirection::In).is_none());

        assert!(manager.teardown().await.is_empty());
        assert_eq!(qm.connection_count(), 0);
        assert_eq!(qm.open_handle_count(), 0);
    }

    #[tokio::test]
    async fn test_connect_failure_carries_reason() {
        let qm = Arc::new(MemoryQueueManager::with_queues("QM1", &["Q.OUT", "Q.IN"]));
        qm.fail_next(Verb::Connect, mqc::MQRC_HOST_NOT_AVAILABLE);
        let mut manager = ConnectionManager::new(qm.clone());

        let err = manager.establish(&config()).await.unwrap_err();
        assert!(matches!(err, TransportError::Connection { .. }));
        assert_eq!(err.reason_code(), Some(mqc::MQRC_HOST_NOT_AVAILABLE));
        assert!(manager.connection().is_none());
    }

    #[tokio::test]
    async fn test_close_queue_twice_is_noop() {
        let qm = Arc::new(MemoryQueueManager::with_queues("QM1", &["Q.OUT", "Q.IN"]));
        let mut manager = ConnectionManager::new(qm.clone());
        manager.establish(&config()).await.unwrap();

        manager.close_queue(QueueDirection::Out).await.unwrap();
        manager.close_queue(QueueDirection::Out).await.unwrap();

        let closes = qm
            .calls()
            .into_iter()
            .filter(|call| matches!(call, Call::Close { .. }))
            .count();
        assert_eq!(closes, 1);
    }

    #[tokio::test]
    async fn test_teardown_runs_every_step() {
        let qm = Arc::new(MemoryQueueManager::with_queues("QM1", &["Q.OUT", "Q.IN"]));
        let mut manager = ConnectionManager::new(qm.clone());
        manager.establish(&config()).await.unwrap();
        qm.fail_next(Verb::Close, mqc::MQRC_CONNECTION_BROKEN);

        let errors = manager.teardown().await;

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].reason_code(), Some(mqc::MQRC_CONNECTION_BROKEN));
        let tail: Vec<Call> = qm.calls().into_iter().skip(3).collect();
        assert_eq!(tail.len(), 3);
        assert!(matches!(tail[0], Call::Close { .. }));
        assert!(matches!(tail[1], Call::Close { .. }));
        assert_eq!(tail[2], Call::Disconnect);
        assert_eq!(qm.connection_count(), 0);

        // Nothing left to release
        assert!(manager.teardown().await.is_empty());
        assert_eq!(qm.calls().len(), 6);
    }
}
