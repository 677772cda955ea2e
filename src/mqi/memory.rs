//! In-process queue manager.
//!
//! Implements [`QueueManagerClient`] over a set of pre-defined local queues so
//! the transport can be driven end to end without a broker. It honours the
//! parts of MQI the transport depends on (identifier generation on put,
//! exclusive input, handle validation, empty-queue reason code) and adds two
//! test hooks: one-shot failure injection per verb and a log of every call.

use super::{
    mqc, ConnectOptions, ConnectionHandle, GetOptions, Id24, MessageDescriptor, MqError,
    MqMessage, ObjectDescriptor, PutOptions, QueueHandle, QueueManagerClient, Verb,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, trace};
use uuid::Uuid;

/// One recorded call against the manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect { manager: String },
    Open { queue: String, options: i32 },
    Put { queue: String, options: i32 },
    Get { queue: String },
    Close { queue: String },
    Disconnect,
}

#[derive(Default)]
struct LocalQueue {
    messages: VecDeque<MqMessage>,
    exclusive_reader: Option<u64>,
    readers: usize,
}

struct OpenObject {
    conn: u64,
    queue: String,
    options: i32,
}

#[derive(Default)]
struct ManagerState {
    queues: HashMap<String, LocalQueue>,
    connections: HashSet<u64>,
    objects: HashMap<u64, OpenObject>,
    next_handle: u64,
    id_sequence: u32,
    failures: HashMap<Verb, i32>,
    calls: Vec<Call>,
    last_connect: Option<ConnectOptions>,
}

impl ManagerState {
    fn next_handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    /// Unique, never-zero identifier in the shape queue managers use
    fn fresh_id(&mut self) -> Id24 {
        self.id_sequence = self.id_sequence.wrapping_add(1);
        let mut id = [0u8; mqc::MQ_MSG_ID_LENGTH];
        id[..4].copy_from_slice(b"AMQ ");
        id[4..8].copy_from_slice(&self.id_sequence.to_be_bytes());
        id[8..].copy_from_slice(Uuid::new_v4().as_bytes());
        id
    }

    fn take_failure(&mut self, verb: Verb) -> Result<(), MqError> {
        match self.failures.remove(&verb) {
            Some(reason) => Err(MqError::failed(verb, reason)),
            None => Ok(()),
        }
    }

    fn check_connection(&self, verb: Verb, conn: ConnectionHandle) -> Result<(), MqError> {
        if self.connections.contains(&conn.raw()) {
            Ok(())
        } else {
            Err(MqError::failed(verb, mqc::MQRC_HCONN_ERROR))
        }
    }

    fn object(
        &self,
        verb: Verb,
        conn: ConnectionHandle,
        queue: QueueHandle,
    ) -> Result<&OpenObject, MqError> {
        self.check_connection(verb, conn)?;
        match self.objects.get(&queue.raw()) {
            Some(object) if object.conn == conn.raw() => Ok(object),
            _ => Err(MqError::failed(verb, mqc::MQRC_HOBJ_ERROR)),
        }
    }

    fn release(&mut self, handle: u64) {
        if let Some(object) = self.objects.remove(&handle) {
            if let Some(local) = self.queues.get_mut(&object.queue) {
                if object.options & mqc::MQOO_INPUT_ANY != 0 {
                    local.readers = local.readers.saturating_sub(1);
                }
                if local.exclusive_reader == Some(handle) {
                    local.exclusive_reader = None;
                }
            }
        }
    }

    fn queue_name(&self, queue: QueueHandle) -> String {
        self.objects
            .get(&queue.raw())
            .map(|object| object.queue.clone())
            .unwrap_or_default()
    }
}

/// Queue manager living entirely in process memory
pub struct MemoryQueueManager {
    name: String,
    state: Mutex<ManagerState>,
}

impl MemoryQueueManager {
    /// Create a manager with no queues defined
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(ManagerState::default()),
        }
    }

    /// Create a manager with the given local queues defined
    pub fn with_queues(name: impl Into<String>, queues: &[&str]) -> Self {
        let manager = Self::new(name);
        for queue in queues {
            manager.define_queue(queue);
        }
        manager
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Define a local queue; defining an existing queue is a no-op
    pub fn define_queue(&self, queue: &str) {
        self.state
            .lock()
            .queues
            .entry(queue.to_string())
            .or_default();
    }

    /// Make the next call of `verb` fail with `reason`
    pub fn fail_next(&self, verb: Verb, reason: i32) {
        self.state.lock().failures.insert(verb, reason);
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    /// Options of the most recent successful connect
    pub fn last_connect(&self) -> Option<ConnectOptions> {
        self.state.lock().last_connect.clone()
    }

    /// Number of messages waiting on a queue
    pub fn depth(&self, queue: &str) -> usize {
        self.state
            .lock()
            .queues
            .get(queue)
            .map(|local| local.messages.len())
            .unwrap_or(0)
    }

    /// Snapshot of the messages waiting on a queue, oldest first
    pub fn browse(&self, queue: &str) -> Vec<MqMessage> {
        self.state
            .lock()
            .queues
            .get(queue)
            .map(|local| local.messages.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Place a message on a queue as a remote application would.
    ///
    /// The descriptor is stored as given; a zero message id is replaced with a
    /// generated one.
    pub fn enqueue(&self, queue: &str, mut descriptor: MessageDescriptor, payload: &[u8]) -> bool {
        let mut state = self.state.lock();
        if descriptor.msg_id == [0u8; mqc::MQ_MSG_ID_LENGTH] {
            descriptor.msg_id = state.fresh_id();
        }
        match state.queues.get_mut(queue) {
            Some(local) => {
                local.messages.push_back(MqMessage {
                    descriptor,
                    payload: payload.to_vec(),
                });
                true
            }
            None => false,
        }
    }

    pub fn connection_count(&self) -> usize {
        self.state.lock().connections.len()
    }

    pub fn open_handle_count(&self) -> usize {
        self.state.lock().objects.len()
    }
}

#[async_trait]
impl QueueManagerClient for MemoryQueueManager {
    async fn connect(
        &self,
        manager: &str,
        options: &ConnectOptions,
    ) -> Result<ConnectionHandle, MqError> {
        let mut state = self.state.lock();
        state.calls.push(Call::Connect {
            manager: manager.to_string(),
        });
        state.take_failure(Verb::Connect)?;
        if manager != self.name {
            return Err(MqError::failed(Verb::Connect, mqc::MQRC_Q_MGR_NAME_ERROR));
        }
        let handle = state.next_handle();
        state.connections.insert(handle);
        state.last_connect = Some(options.clone());
        debug!(
            "{} accepted connection {} from {} on channel {}",
            self.name, handle, options.connection_name, options.channel_name
        );
        Ok(ConnectionHandle::new(handle))
    }

    async fn open(
        &self,
        conn: ConnectionHandle,
        descriptor: &ObjectDescriptor,
        options: i32,
    ) -> Result<QueueHandle, MqError> {
        let mut state = self.state.lock();
        state.calls.push(Call::Open {
            queue: descriptor.object_name.clone(),
            options,
        });
        state.take_failure(Verb::Open)?;
        state.check_connection(Verb::Open, conn)?;
        if descriptor.object_type != mqc::MQOT_Q {
            return Err(MqError::failed(Verb::Open, mqc::MQRC_OPTIONS_ERROR));
        }

        let handle = state.next_handle();
        let local = state
            .queues
            .get_mut(&descriptor.object_name)
            .ok_or_else(|| MqError::failed(Verb::Open, mqc::MQRC_UNKNOWN_OBJECT_NAME))?;
        if options & mqc::MQOO_INPUT_ANY != 0 {
            let wants_exclusive = options & mqc::MQOO_INPUT_EXCLUSIVE != 0;
            if local.exclusive_reader.is_some() || (wants_exclusive && local.readers > 0) {
                return Err(MqError::failed(Verb::Open, mqc::MQRC_OBJECT_IN_USE));
            }
            local.readers += 1;
            if wants_exclusive {
                local.exclusive_reader = Some(handle);
            }
        }
        state.objects.insert(
            handle,
            OpenObject {
                conn: conn.raw(),
                queue: descriptor.object_name.clone(),
                options,
            },
        );
        Ok(QueueHandle::new(handle))
    }

    async fn put(
        &self,
        conn: ConnectionHandle,
        queue: QueueHandle,
        mut descriptor: MessageDescriptor,
        options: &PutOptions,
        payload: &[u8],
    ) -> Result<MessageDescriptor, MqError> {
        let mut state = self.state.lock();
        let name = state.queue_name(queue);
        state.calls.push(Call::Put {
            queue: name,
            options: options.options,
        });
        state.take_failure(Verb::Put)?;
        let object = state.object(Verb::Put, conn, queue)?;
        if object.options & mqc::MQOO_OUTPUT == 0 {
            return Err(MqError::failed(Verb::Put, mqc::MQRC_NOT_OPEN_FOR_OUTPUT));
        }
        let target = object.queue.clone();

        if options.options & mqc::MQPMO_NEW_MSG_ID != 0
            || descriptor.msg_id == [0u8; mqc::MQ_MSG_ID_LENGTH]
        {
            descriptor.msg_id = state.fresh_id();
        }
        if options.options & mqc::MQPMO_NEW_CORREL_ID != 0 {
            descriptor.correl_id = state.fresh_id();
        }
        trace!(
            "put {} bytes to {} (type {}, msg id {})",
            payload.len(),
            target,
            descriptor.msg_type,
            hex::encode(descriptor.msg_id)
        );

        let local = state
            .queues
            .get_mut(&target)
            .ok_or_else(|| MqError::failed(Verb::Put, mqc::MQRC_UNKNOWN_OBJECT_NAME))?;
        local.messages.push_back(MqMessage {
            descriptor: descriptor.clone(),
            payload: payload.to_vec(),
        });
        Ok(descriptor)
    }

    async fn get(
        &self,
        conn: ConnectionHandle,
        queue: QueueHandle,
        options: &GetOptions,
    ) -> Result<MqMessage, MqError> {
        let mut state = self.state.lock();
        let name = state.queue_name(queue);
        state.calls.push(Call::Get { queue: name });
        state.take_failure(Verb::Get)?;
        let object = state.object(Verb::Get, conn, queue)?;
        if object.options & mqc::MQOO_INPUT_ANY == 0 {
            return Err(MqError::failed(Verb::Get, mqc::MQRC_NOT_OPEN_FOR_INPUT));
        }
        if options.match_options != mqc::MQMO_NONE {
            return Err(MqError::failed(Verb::Get, mqc::MQRC_OPTIONS_ERROR));
        }
        // No waiting here: without a message this is always the empty-queue
        // outcome, whatever the wait interval says.
        let source = object.queue.clone();
        let local = state
            .queues
            .get_mut(&source)
            .ok_or_else(|| MqError::failed(Verb::Get, mqc::MQRC_UNKNOWN_OBJECT_NAME))?;
        local
            .messages
            .pop_front()
            .ok_or_else(|| MqError::failed(Verb::Get, mqc::MQRC_NO_MSG_AVAILABLE))
    }

    async fn close(
        &self,
        conn: ConnectionHandle,
        queue: QueueHandle,
        _options: i32,
    ) -> Result<(), MqError> {
        let mut state = self.state.lock();
        let name = state.queue_name(queue);
        state.calls.push(Call::Close { queue: name });
        state.take_failure(Verb::Close)?;
        state.object(Verb::Close, conn, queue)?;
        state.release(queue.raw());
        Ok(())
    }

    async fn disconnect(&self, conn: ConnectionHandle) -> Result<(), MqError> {
        let mut state = self.state.lock();
        state.calls.push(Call::Disconnect);
        state.take_failure(Verb::Disconnect)?;
        state.check_connection(Verb::Disconnect, conn)?;
        state.connections.remove(&conn.raw());
        // Disconnecting implicitly closes anything the connection left open.
        let orphaned: Vec<u64> = state
            .objects
            .iter()
            .filter(|(_, object)| object.conn == conn.raw())
            .map(|(handle, _)| *handle)
            .collect();
        for handle in orphaned {
            state.release(handle);
        }
        debug!("{} closed connection {}", self.name, conn.raw());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect_options() -> ConnectOptions {
        ConnectOptions {
            options: mqc::MQCNO_CLIENT_BINDING,
            connection_name: "localhost(1414)".to_string(),
            channel_name: "DEV.APP.SVRCONN".to_string(),
            appl_name: "test".to_string(),
            debug: false,
        }
    }

    fn get_options() -> GetOptions {
        GetOptions {
            options: mqc::MQGMO_NO_SYNCPOINT | mqc::MQGMO_NO_WAIT,
            match_options: mqc::MQMO_NONE,
            wait_interval: mqc::MQWI_UNLIMITED,
        }
    }

    #[tokio::test]
    async fn test_put_generates_identifiers() {
        let qm = MemoryQueueManager::with_queues("QM1", &["Q.A"]);
        let conn = qm.connect("QM1", &connect_options()).await.unwrap();
        let out = qm
            .open(conn, &ObjectDescriptor::queue("Q.A"), mqc::MQOO_OUTPUT)
            .await
            .unwrap();

        let options = PutOptions {
            options: mqc::MQPMO_NO_SYNCPOINT | mqc::MQPMO_NEW_MSG_ID | mqc::MQPMO_NEW_CORREL_ID,
        };
        let first = qm
            .put(conn, out, MessageDescriptor::default(), &options, b"one")
            .await
            .unwrap();
        let second = qm
            .put(conn, out, MessageDescriptor::default(), &options, b"two")
            .await
            .unwrap();

        assert_ne!(first.msg_id, [0u8; 24]);
        assert_ne!(first.correl_id, [0u8; 24]);
        assert_ne!(first.msg_id, second.msg_id);
        assert_ne!(first.correl_id, second.correl_id);
        assert_eq!(qm.depth("Q.A"), 2);
    }

    #[tokio::test]
    async fn test_get_on_empty_queue_reports_no_message() {
        let qm = MemoryQueueManager::with_queues("QM1", &["Q.A"]);
        let conn = qm.connect("QM1", &connect_options()).await.unwrap();
        let input = qm
            .open(conn, &ObjectDescriptor::queue("Q.A"), mqc::MQOO_INPUT_EXCLUSIVE)
            .await
            .unwrap();

        let err = qm.get(conn, input, &get_options()).await.unwrap_err();
        assert!(err.is_no_message());
    }

    #[tokio::test]
    async fn test_exclusive_input_rejects_second_reader() {
        let qm = MemoryQueueManager::with_queues("QM1", &["Q.A"]);
        let conn = qm.connect("QM1", &connect_options()).await.unwrap();
        let first = qm
            .open(conn, &ObjectDescriptor::queue("Q.A"), mqc::MQOO_INPUT_EXCLUSIVE)
            .await
            .unwrap();
        let err = qm
            .open(conn, &ObjectDescriptor::queue("Q.A"), mqc::MQOO_INPUT_AS_Q_DEF)
            .await
            .unwrap_err();
        assert_eq!(err.reason, mqc::MQRC_OBJECT_IN_USE);

        qm.close(conn, first, mqc::MQCO_NONE).await.unwrap();
        qm.open(conn, &ObjectDescriptor::queue("Q.A"), mqc::MQOO_INPUT_EXCLUSIVE)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unknown_queue_and_manager() {
        let qm = MemoryQueueManager::with_queues("QM1", &["Q.A"]);
        let err = qm.connect("QM2", &connect_options()).await.unwrap_err();
        assert_eq!(err.reason, mqc::MQRC_Q_MGR_NAME_ERROR);

        let conn = qm.connect("QM1", &connect_options()).await.unwrap();
        let err = qm
            .open(conn, &ObjectDescriptor::queue("Q.MISSING"), mqc::MQOO_OUTPUT)
            .await
            .unwrap_err();
        assert_eq!(err.reason, mqc::MQRC_UNKNOWN_OBJECT_NAME);
    }

    #[tokio::test]
    async fn test_injected_failure_is_one_shot() {
        let qm = MemoryQueueManager::with_queues("QM1", &["Q.A"]);
        qm.fail_next(Verb::Connect, mqc::MQRC_HOST_NOT_AVAILABLE);

        let err = qm.connect("QM1", &connect_options()).await.unwrap_err();
        assert_eq!(err.verb, Verb::Connect);
        assert_eq!(err.reason, mqc::MQRC_HOST_NOT_AVAILABLE);
        assert!(qm.connect("QM1", &connect_options()).await.is_ok());
        assert_eq!(qm.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_disconnect_releases_open_handles() {
        let qm = MemoryQueueManager::with_queues("QM1", &["Q.A", "Q.B"]);
        let conn = qm.connect("QM1", &connect_options()).await.unwrap();
        qm.open(conn, &ObjectDescriptor::queue("Q.A"), mqc::MQOO_OUTPUT)
            .await
            .unwrap();
        qm.open(conn, &ObjectDescriptor::queue("Q.B"), mqc::MQOO_INPUT_EXCLUSIVE)
            .await
            .unwrap();
        assert_eq!(qm.open_handle_count(), 2);

        qm.disconnect(conn).await.unwrap();
        assert_eq!(qm.open_handle_count(), 0);
        assert_eq!(qm.connection_count(), 0);

        let err = qm.disconnect(conn).await.unwrap_err();
        assert_eq!(err.reason, mqc::MQRC_HCONN_ERROR);
    }
}
