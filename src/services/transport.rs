//! Message transport
//!
//! Inbound chat messages arrive as JSON payloads on a named queue and
//! replies are published as JSON to another. The consumer hands every
//! payload to a [`MessageHandler`] on its own task and, on shutdown, stops
//! taking new payloads and waits for the in-flight ones.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisResult};
use tokio::sync::{watch, Notify};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::TransportConfig;
use crate::models::OutboundMessage;
use crate::utils::errors::{BillyError, Result};

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Receives raw inbound payloads
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle_payload(&self, payload: Vec<u8>);
}

#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Publish a reply to a destination queue
    async fn publish(&self, message: &OutboundMessage, destination: &str) -> Result<()>;

    /// Consume `source` until `shutdown` flips to true, then drain in-flight handlers
    async fn consume(
        &self,
        source: &str,
        handler: Arc<dyn MessageHandler>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<()>;
}

async fn dispatch<S>(
    source: &str,
    payloads: S,
    handler: Arc<dyn MessageHandler>,
    mut shutdown: watch::Receiver<bool>,
) where
    S: Stream<Item = Vec<u8>> + Send,
{
    futures::pin_mut!(payloads);
    let mut in_flight = JoinSet::new();

    info!(queue = source, "Consuming messages");
    loop {
        let stopping = *shutdown.borrow_and_update();
        if stopping {
            break;
        }

        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(e) = joined {
                    error!(queue = source, error = %e, "Message handler task failed");
                }
            }
            payload = payloads.next() => match payload {
                Some(payload) => {
                    let handler = Arc::clone(&handler);
                    in_flight.spawn(async move { handler.handle_payload(payload).await });
                }
                None => break,
            },
        }
    }

    info!(queue = source, in_flight = in_flight.len(), "Stopped consuming, waiting for in-flight messages");
    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            error!(queue = source, error = %e, "Message handler task failed");
        }
    }
}

/// Redis list queues: `RPUSH` to publish, `BLPOP` to consume
#[derive(Clone)]
pub struct RedisQueueTransport {
    client: Client,
    conn: ConnectionManager,
    prefix: String,
    poll_timeout: Duration,
}

impl RedisQueueTransport {
    pub async fn connect(client: Client, prefix: &str, config: &TransportConfig) -> Result<Self> {
        let conn = ConnectionManager::new(client.clone()).await?;
        Ok(Self {
            client,
            conn,
            prefix: prefix.to_string(),
            poll_timeout: config.poll_timeout(),
        })
    }

    fn queue_key(&self, queue: &str) -> String {
        format!("{}{}", self.prefix, queue)
    }

    /// Blocking pops need a connection of their own
    fn receive(&self, queue: &str) -> impl Stream<Item = Vec<u8>> + Send + 'static {
        let client = self.client.clone();
        let key = self.queue_key(queue);
        let timeout = self.poll_timeout.as_secs().max(1);

        async_stream::stream! {
            let mut conn = None;
            loop {
                if conn.is_none() {
                    match client.get_async_connection().await {
                        Ok(c) => conn = Some(c),
                        Err(e) => {
                            error!(queue = %key, error = %e, "Failed to open consumer connection");
                            tokio::time::sleep(RECONNECT_DELAY).await;
                            continue;
                        }
                    }
                }
                let Some(active) = conn.as_mut() else { continue };

                let popped: RedisResult<Option<(String, Vec<u8>)>> = redis::cmd("BLPOP")
                    .arg(&key)
                    .arg(timeout)
                    .query_async(active)
                    .await;

                match popped {
                    Ok(Some((_, payload))) => yield payload,
                    Ok(None) => {}
                    Err(e) => {
                        warn!(queue = %key, error = %e, "Queue pop failed, reconnecting");
                        conn = None;
                        tokio::time::sleep(RECONNECT_DELAY).await;
                    }
                }
            }
        }
    }
}

#[async_trait]
impl MessageTransport for RedisQueueTransport {
    async fn publish(&self, message: &OutboundMessage, destination: &str) -> Result<()> {
        let payload = serde_json::to_string(message)?;
        let mut conn = self.conn.clone();
        let key = self.queue_key(destination);

        let _: u64 = conn.rpush(&key, payload).await?;

        debug!(queue = %key, transaction_id = %message.transaction_id, "Message published");
        Ok(())
    }

    async fn consume(
        &self,
        source: &str,
        handler: Arc<dyn MessageHandler>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        dispatch(source, self.receive(source), handler, shutdown).await;
        Ok(())
    }
}

/// In-process queues recording everything published
#[derive(Debug, Default)]
pub struct MemoryTransport {
    published: Mutex<Vec<(String, OutboundMessage)>>,
    queues: Mutex<HashMap<String, VecDeque<Vec<u8>>>>,
    pushed: Notify,
    failing: AtomicBool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a raw inbound payload
    pub fn push(&self, queue: &str, payload: Vec<u8>) {
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(queue.to_string())
            .or_default()
            .push_back(payload);
        self.pushed.notify_waiters();
    }

    /// Make every subsequent publish fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Everything published so far, in order
    pub fn published(&self) -> Vec<(String, OutboundMessage)> {
        self.published.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Message bodies published to `recipient`, in order
    pub fn bodies_for(&self, recipient: &str) -> Vec<String> {
        self.published()
            .into_iter()
            .filter(|(_, m)| m.recipient_number == recipient)
            .map(|(_, m)| m.message_body)
            .collect()
    }

    fn pop(&self, queue: &str) -> Option<Vec<u8>> {
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(queue)
            .and_then(VecDeque::pop_front)
    }

    fn receive<'a>(&'a self, queue: &'a str) -> impl Stream<Item = Vec<u8>> + Send + 'a {
        async_stream::stream! {
            loop {
                let pushed = self.pushed.notified();
                match self.pop(queue) {
                    Some(payload) => yield payload,
                    None => pushed.await,
                }
            }
        }
    }
}

#[async_trait]
impl MessageTransport for MemoryTransport {
    async fn publish(&self, message: &OutboundMessage, destination: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BillyError::Transport(format!(
                "Publishing to {} is unavailable",
                destination
            )));
        }
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((destination.to_string(), message.clone()));
        Ok(())
    }

    async fn consume(
        &self,
        source: &str,
        handler: Arc<dyn MessageHandler>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        dispatch(source, self.receive(source), handler, shutdown).await;
        Ok(())
    }
}
