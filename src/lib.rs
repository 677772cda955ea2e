//! # mq-duplex
//!
//! A duplex message transport over a pair of managed message queues: one
//! queue for outbound traffic, one for inbound. Three interaction patterns
//! share the pair:
//!
//! - **Notifications**: fire-and-forget datagrams
//! - **Requests**: messages carrying a trace and naming the inbound queue as
//!   their reply-to queue
//! - **Responses**: messages whose correlation id carries the trace of the
//!   request they answer
//!
//! ## Architecture Overview
//!
//! - `trace`: 24 byte trace identifiers (prefix + UUID v7)
//! - `mqi`: the narrow queue-manager interface the transport is written
//!   against, plus an in-memory queue manager
//! - `ipc`: envelope types, connection management and the duplex transport
//!   state machine
//! - `codec`: wire frames exchanged with the port layer
//! - `port`: codec and transport bound together, with a demand-driven reader
//! - `cli` / `logging`: configuration and log formatting for the binary
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use mq_duplex::codec::PortMeta;
//! use mq_duplex::ipc::Mtid;
//! use mq_duplex::mqi::MemoryQueueManager;
//! use mq_duplex::port::{MqPort, PortConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PortConfig::default();
//!     let manager = Arc::new(MemoryQueueManager::with_queues(
//!         config.connection.connection.manager.clone(),
//!         &[config.connection.send.as_str(), config.connection.receive.as_str()],
//!     ));
//!
//!     let port = MqPort::open(manager, config);
//!     let mut meta = PortMeta::new(Mtid::Request);
//!     port.send("ping", &mut meta).await?;
//!     println!("sent request with trace {}", meta.trace);
//!
//!     port.close().await?;
//!     Ok(())
//! }
//! ```

/// Command-line interface and configuration loading
pub mod cli;

/// Envelope codec used by the port layer
pub mod codec;

pub mod error;

/// Transport abstractions and the queue-backed duplex transport
///
/// Contains the `DuplexTransport` trait, the envelope and interaction types,
/// connection/handle management, and the descriptor translation rules.
pub mod ipc;

pub mod logging;

/// Queue-manager client interface and the in-memory queue manager
pub mod mqi;

pub mod port;

pub mod trace;

pub use codec::{MqCodec, PortMeta, WireEnvelope};
pub use error::TransportError;
pub use ipc::{
    DuplexQueueTransport, DuplexTransport, MessageEnvelope, Mtid, Payload, ReadOutcome,
    TransportConfig, TransportState,
};
pub use mqi::{MemoryQueueManager, QueueManagerClient};
pub use port::{MqPort, PortConfig};
pub use trace::TraceId;

/// The current version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    /// Application name presented to the queue manager on connect
    pub const APPL_NAME: &str = "mq-duplex";

    /// Default listener port of a queue manager
    pub const MQ_PORT: u16 = 1414;

    pub const CHANNEL: &str = "DEV.APP.SVRCONN";

    pub const MANAGER: &str = "QM1";

    pub const SEND_QUEUE: &str = "DEV.QUEUE.1";

    pub const RECEIVE_QUEUE: &str = "DEV.QUEUE.2";

    /// Trace prefix stamped on requests
    pub const TRACE_PREFIX: &str = "ut";

    /// Endpoint identity used in dispatch labels
    pub const PORT_ID: &str = "mq";

    /// Pause between polls of an empty queue
    pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

    /// Messages the reader may buffer ahead of the consumer
    pub const READER_CAPACITY: usize = 16;
}
