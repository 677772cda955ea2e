use crate::port::PortConfig;
use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};

/// mq-duplex - drive request/reply traffic through a duplex queue transport
///
/// Runs against an in-process queue manager with an echo responder on the
/// far side of the send queue, so the whole exchange can be observed without
/// a broker.
#[derive(Parser, Debug, Default, Clone)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// JSON file with a full port configuration; flags below override it
    #[clap(short = 'c', long, help_heading = "Configuration")]
    pub config: Option<PathBuf>,

    /// Queue manager host
    #[clap(long, help_heading = "Connection")]
    pub host: Option<String>,

    /// Queue manager listener port
    #[clap(long, help_heading = "Connection")]
    pub port: Option<u16>,

    /// Server-connection channel name
    #[clap(long, help_heading = "Connection")]
    pub channel: Option<String>,

    /// Queue manager name
    #[clap(short = 'm', long, help_heading = "Connection")]
    pub manager: Option<String>,

    /// Outbound queue
    #[clap(long, help_heading = "Queues")]
    pub send: Option<String>,

    /// Inbound queue, also used as reply-to queue
    #[clap(long, help_heading = "Queues")]
    pub receive: Option<String>,

    /// Trace prefix for generated requests (up to 8 bytes)
    #[clap(long)]
    pub prefix: Option<String>,

    /// Endpoint identity used in dispatch labels
    #[clap(long)]
    pub id: Option<String>,

    /// Pause between polls of an empty inbound queue, in milliseconds
    #[clap(long)]
    pub poll_interval_ms: Option<u64>,

    /// Number of requests to send
    #[clap(short = 'r', long, default_value_t = 10)]
    pub requests: usize,

    /// Number of notifications to send
    #[clap(short = 'n', long, default_value_t = 0)]
    pub notifications: usize,

    /// Seconds to wait for outstanding replies
    #[clap(long, default_value_t = 5)]
    pub reply_timeout_secs: u64,

    /// Frame-level logging of every put and get
    #[clap(short = 'd', long, default_value_t = false)]
    pub debug: bool,
}

impl Args {
    /// Resolve the port configuration: the config file if given, otherwise
    /// defaults, with explicit flags applied on top.
    pub fn port_config(&self) -> Result<PortConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => PortConfig::default(),
        };

        let connection = &mut config.connection.connection;
        if let Some(host) = &self.host {
            connection.host = host.clone();
        }
        if let Some(port) = self.port {
            connection.port = port;
        }
        if let Some(channel) = &self.channel {
            connection.channel = channel.clone();
        }
        if let Some(manager) = &self.manager {
            connection.manager = manager.clone();
        }
        if self.debug {
            connection.debug = true;
        }
        if let Some(send) = &self.send {
            config.connection.send = send.clone();
        }
        if let Some(receive) = &self.receive {
            config.connection.receive = receive.clone();
        }
        if let Some(prefix) = &self.prefix {
            config.prefix = prefix.clone();
        }
        if let Some(id) = &self.id {
            config.id = id.clone();
        }
        if let Some(interval) = self.poll_interval_ms {
            config.poll_interval_ms = interval;
        }

        validate(&config)?;
        Ok(config)
    }
}

/// Read a JSON port configuration
pub fn load_config(path: &Path) -> Result<PortConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Invalid config file {}", path.display()))
}

fn validate(config: &PortConfig) -> Result<()> {
    let queues = &config.connection;
    if queues.send.is_empty() || queues.receive.is_empty() {
        anyhow::bail!("Both send and receive queue names are required");
    }
    if queues.send == queues.receive {
        anyhow::bail!(
            "Send and receive queues must differ (both are {})",
            queues.send
        );
    }
    if queues.connection.manager.is_empty() {
        anyhow::bail!("Queue manager name is required");
    }
    Ok(())
}
