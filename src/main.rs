//! # mq-duplex - Main Entry Point
//!
//! Drives a request/reply exchange through the duplex queue transport.
//!
//! ## Overview
//!
//! 1. **Initialize logging**: colorized tracing output, `RUST_LOG` aware
//! 2. **Resolve configuration**: JSON config file and/or flags
//! 3. **Start the far side**: an echo responder that serves requests from the
//!    send queue and replies to their reply-to queue, the way a classic
//!    request/reply server application does
//! 4. **Run the exchange**: notifications and requests go out through the
//!    port; replies are matched back to their requests by trace
//! 5. **Report**: a summary of what was sent, matched and left over
//!
//! Both sides talk to an in-process queue manager, so no broker is needed.

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use mq_duplex::cli::Args;
use mq_duplex::codec::PortMeta;
use mq_duplex::ipc::connection::{connect, open_queue};
use mq_duplex::ipc::{Mtid, QueueDirection, TransportConfig};
use mq_duplex::mqi::{mqc, MemoryQueueManager, MessageDescriptor, PutOptions, QueueManagerClient};
use mq_duplex::port::MqPort;
use mq_duplex::trace::TraceId;
use mq_duplex::{defaults, logging, VERSION};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Outcome of one exchange run
#[derive(Debug, Default)]
struct ExchangeSummary {
    notifications_sent: usize,
    requests_sent: usize,
    replies_matched: usize,
    unmatched_messages: usize,
    outstanding: usize,
    total_reply_latency: Duration,
    elapsed: Duration,
}

impl ExchangeSummary {
    fn average_latency(&self) -> Option<Duration> {
        if self.replies_matched == 0 {
            None
        } else {
            Some(self.total_reply_latency / self.replies_matched as u32)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.debug);

    info!("Starting mq-duplex {}", VERSION);
    let config = args.port_config()?;
    info!("Configuration: {:?}", config);

    let queues = &config.connection;
    let manager = Arc::new(MemoryQueueManager::with_queues(
        queues.connection.manager.clone(),
        &[queues.send.as_str(), queues.receive.as_str()],
    ));

    let (stop_tx, stop_rx) = watch::channel(false);
    let responder = tokio::spawn(run_echo_responder(
        manager.clone(),
        queues.clone(),
        config.poll_interval(),
        stop_rx,
    ));

    let port = MqPort::open(manager.clone(), config.clone());
    port.ready()
        .await
        .context("Transport did not become ready")?;

    let summary = run_exchange(&port, &args).await;

    if let Err(e) = port.close().await {
        warn!("Transport closed with errors: {}", e);
    }
    let _ = stop_tx.send(true);
    match responder.await {
        Ok(Ok(served)) => debug!("Responder served {} requests", served),
        Ok(Err(e)) => error!("Responder failed: {:#}", e),
        Err(e) => error!("Responder task join error: {}", e),
    }

    let summary = summary?;
    print_summary(&summary);
    if summary.outstanding > 0 {
        anyhow::bail!("{} requests never got a reply", summary.outstanding);
    }
    Ok(())
}

/// Send the configured traffic and collect replies until every request is
/// answered or the reply timeout passes.
async fn run_exchange(port: &MqPort, args: &Args) -> Result<ExchangeSummary> {
    let started = Instant::now();
    let mut summary = ExchangeSummary::default();
    let mut reader = port.spawn_reader(defaults::READER_CAPACITY);

    for i in 0..args.notifications {
        let mut meta = PortMeta::new(Mtid::Notification);
        port.send(format!("notification {}", i), &mut meta).await?;
        summary.notifications_sent += 1;
    }

    let mut pending: HashMap<TraceId, Instant> = HashMap::new();
    for i in 0..args.requests {
        let mut meta = PortMeta::new(Mtid::Request);
        port.send(format!("ping {}", i), &mut meta).await?;
        debug!("Sent request {} with trace {}", i, meta.trace);
        pending.insert(meta.trace, Instant::now());
        summary.requests_sent += 1;
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(args.reply_timeout_secs);
    while !pending.is_empty() {
        let received = match tokio::time::timeout_at(deadline, reader.recv()).await {
            Ok(Some(received)) => received?,
            Ok(None) => break,
            Err(_) => {
                warn!("Timed out with {} requests outstanding", pending.len());
                break;
            }
        };
        let (payload, meta) = received;
        match (meta.mtid, pending.remove(&meta.trace)) {
            (Mtid::Response, Some(sent_at)) => {
                summary.replies_matched += 1;
                summary.total_reply_latency += sent_at.elapsed();
                debug!("Reply for {} ({} bytes)", meta.trace, payload.len());
            }
            _ => {
                summary.unmatched_messages += 1;
                warn!("Unmatched {} message with trace {}", meta.mtid, meta.trace);
            }
        }
    }

    summary.outstanding = pending.len();
    summary.elapsed = started.elapsed();
    Ok(summary)
}

/// Serve requests arriving on the transport's send queue: reply to each on
/// its reply-to queue with the request's correlation id. Returns the number
/// of requests served.
async fn run_echo_responder(
    client: Arc<dyn QueueManagerClient>,
    queues: TransportConfig,
    poll_interval: Duration,
    mut stop: watch::Receiver<bool>,
) -> Result<usize> {
    let client = client.as_ref();
    let conn = connect(client, &queues.connection).await?;
    let requests = open_queue(client, conn, &queues.send, QueueDirection::In).await?;
    let mut reply_queues = HashMap::new();
    let mut served = 0;

    let get_options = mq_duplex::ipc::wire::get_options();
    loop {
        if *stop.borrow() {
            break;
        }
        let message = match client.get(conn, requests, &get_options).await {
            Ok(message) => message,
            Err(e) if e.is_no_message() => {
                tokio::select! {
                    _ = tokio::time::sleep(poll_interval) => {}
                    _ = stop.changed() => {}
                }
                continue;
            }
            Err(e) => return Err(e).context("Responder get failed"),
        };

        let request = &message.descriptor;
        if request.msg_type != mqc::MQMT_REQUEST || request.reply_to_q.trim().is_empty() {
            debug!("Responder ignoring message of type {}", request.msg_type);
            continue;
        }

        let reply_to = request.reply_to_q.trim().to_string();
        let reply_queue = match reply_queues.get(&reply_to) {
            Some(handle) => *handle,
            None => {
                let handle = open_queue(client, conn, &reply_to, QueueDirection::Out).await?;
                reply_queues.insert(reply_to.clone(), handle);
                handle
            }
        };

        let reply = MessageDescriptor {
            msg_type: mqc::MQMT_REPLY,
            format: request.format.clone(),
            correl_id: request.correl_id,
            ..Default::default()
        };
        let options = PutOptions {
            options: mqc::MQPMO_NO_SYNCPOINT | mqc::MQPMO_NEW_MSG_ID,
        };
        client
            .put(conn, reply_queue, reply, &options, &message.payload)
            .await
            .with_context(|| format!("Responder put to {} failed", reply_to))?;
        served += 1;
    }

    for handle in reply_queues.into_values().chain(std::iter::once(requests)) {
        if let Err(e) = client.close(conn, handle, mqc::MQCO_NONE).await {
            warn!("Responder close failed: {}", e);
        }
    }
    client.disconnect(conn).await?;
    Ok(served)
}

fn print_summary(summary: &ExchangeSummary) {
    println!("{}", "Exchange summary".bold());
    println!("  notifications sent : {}", summary.notifications_sent);
    println!("  requests sent      : {}", summary.requests_sent);
    let matched = format!("{}", summary.replies_matched);
    if summary.replies_matched == summary.requests_sent {
        println!("  replies matched    : {}", matched.green());
    } else {
        println!("  replies matched    : {}", matched.red());
    }
    if summary.unmatched_messages > 0 {
        println!(
            "  unmatched messages : {}",
            summary.unmatched_messages.to_string().yellow()
        );
    }
    if let Some(latency) = summary.average_latency() {
        println!("  average reply time : {:?}", latency);
    }
    println!("  elapsed            : {:?}", summary.elapsed);
}
