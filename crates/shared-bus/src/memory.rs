//! # In-Memory Broker
//!
//! A process-local topic exchange with the same observable behavior as the
//! AMQP broker for the operations the bus uses:
//!
//! - exchange and queue declarations are idempotent for identical
//!   properties and fail with a precondition error otherwise
//! - a message is copied once into every queue with at least one matching
//!   binding; unroutable messages are dropped
//! - queues hold nothing from before they were bound
//! - exclusive queues disappear with the channel that declared them
//!
//! It also implements [`Dialer`] with a scriptable number of failing dials,
//! which is how the resilience loop is exercised in tests.

use crate::broker::{
    AckMode, Acknowledger, BrokerChannel, BrokerConnection, Delivery, DeliveryStream, Dialer,
    ExchangeSpec, QueueSpec,
};
use crate::error::BusError;
use crate::topic::matches;
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;
use uuid::Uuid;

type Message = (String, Vec<u8>);

struct Binding {
    queue: String,
    pattern: String,
}

struct ExchangeEntry {
    spec: ExchangeSpec,
    bindings: Vec<Binding>,
}

struct QueueEntry {
    spec: QueueSpec,
    owner: u64,
    sender: mpsc::UnboundedSender<Message>,
    receiver: Option<mpsc::UnboundedReceiver<Message>>,
}

#[derive(Default)]
struct Topology {
    exchanges: HashMap<String, ExchangeEntry>,
    queues: HashMap<String, QueueEntry>,
}

impl Topology {
    fn remove_queue(&mut self, name: &str) {
        self.queues.remove(name);
        for exchange in self.exchanges.values_mut() {
            exchange.bindings.retain(|b| b.queue != name);
        }
    }

    /// Exclusive queues whose consumer has gone away are deleted, as the
    /// broker does when the owning connection dies.
    fn reap_abandoned_queues(&mut self) {
        let abandoned: Vec<String> = self
            .queues
            .iter()
            .filter(|(_, q)| q.spec.exclusive && q.receiver.is_none() && q.sender.is_closed())
            .map(|(name, _)| name.clone())
            .collect();
        for name in abandoned {
            debug!(queue = %name, "Reaping abandoned exclusive queue");
            self.remove_queue(&name);
        }
    }
}

struct BrokerState {
    topology: Mutex<Topology>,
    open: AtomicBool,
    next_channel: AtomicU64,
    dial_attempts: AtomicU32,
    failing_dials: AtomicU32,
    acked: AtomicU64,
    rejected: AtomicU64,
}

/// In-memory topic-exchange broker. Cloning shares the same broker.
#[derive(Clone)]
pub struct InMemoryBroker {
    state: Arc<BrokerState>,
}

impl InMemoryBroker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(BrokerState {
                topology: Mutex::new(Topology::default()),
                open: AtomicBool::new(true),
                next_channel: AtomicU64::new(1),
                dial_attempts: AtomicU32::new(0),
                failing_dials: AtomicU32::new(0),
                acked: AtomicU64::new(0),
                rejected: AtomicU64::new(0),
            }),
        }
    }

    /// Make the next `count` dials fail.
    pub fn fail_next_dials(&self, count: u32) {
        self.state.failing_dials.store(count, Ordering::SeqCst);
    }

    /// Total dials attempted against this broker.
    #[must_use]
    pub fn dial_attempts(&self) -> u32 {
        self.state.dial_attempts.load(Ordering::SeqCst)
    }

    /// Simulate a broker outage: every connection closes, every queue is
    /// dropped (ending its consumer stream) and non-durable exchanges vanish.
    pub fn shutdown(&self) {
        self.state.open.store(false, Ordering::SeqCst);
        let mut topology = self.state.topology.lock();
        topology.queues.clear();
        topology.exchanges.retain(|_, e| e.spec.durable);
        for exchange in topology.exchanges.values_mut() {
            exchange.bindings.clear();
        }
    }

    #[must_use]
    pub fn exchange_count(&self) -> usize {
        self.state.topology.lock().exchanges.len()
    }

    #[must_use]
    pub fn queue_count(&self) -> usize {
        self.state.topology.lock().queues.len()
    }

    /// Number of bindings on an exchange, zero if it does not exist.
    #[must_use]
    pub fn binding_count(&self, exchange: &str) -> usize {
        self.state
            .topology
            .lock()
            .exchanges
            .get(exchange)
            .map_or(0, |e| e.bindings.len())
    }

    #[must_use]
    pub fn acked(&self) -> u64 {
        self.state.acked.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn rejected(&self) -> u64 {
        self.state.rejected.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerConnection for InMemoryBroker {
    async fn open_channel(&self) -> Result<Box<dyn BrokerChannel>, BusError> {
        if !self.is_open() {
            return Err(BusError::ConnectionClosed);
        }
        let id = self.state.next_channel.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryChannel {
            state: Arc::clone(&self.state),
            id,
            closed: AtomicBool::new(false),
            prefetch: AtomicU16::new(0),
        }))
    }

    fn is_open(&self) -> bool {
        self.state.open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Dialer for InMemoryBroker {
    async fn dial(&self) -> Result<Arc<dyn BrokerConnection>, BusError> {
        let attempt = self.state.dial_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let failing = self.state.failing_dials.load(Ordering::SeqCst);
        if failing > 0 {
            self.state.failing_dials.store(failing - 1, Ordering::SeqCst);
            return Err(BusError::Dial(format!(
                "connection refused (attempt {})",
                attempt
            )));
        }
        // A successful dial after `shutdown` models the broker coming back
        self.state.open.store(true, Ordering::SeqCst);
        Ok(Arc::new(self.clone()))
    }

    fn target(&self) -> String {
        "memory://local".to_string()
    }
}

struct MemoryChannel {
    state: Arc<BrokerState>,
    id: u64,
    closed: AtomicBool,
    /// Unsettled deliveries allowed per manual-ack consumer, 0 for no cap
    prefetch: AtomicU16,
}

impl MemoryChannel {
    fn ensure_usable(&self) -> Result<(), BusError> {
        if !self.state.open.load(Ordering::SeqCst) {
            return Err(BusError::ConnectionClosed);
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::Channel(format!("channel {} is closed", self.id)));
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerChannel for MemoryChannel {
    async fn declare_exchange(&self, spec: &ExchangeSpec) -> Result<(), BusError> {
        self.ensure_usable()?;
        let mut topology = self.state.topology.lock();
        match topology.exchanges.get(&spec.name) {
            Some(existing) if existing.spec != *spec => Err(BusError::PreconditionFailed(format!(
                "exchange '{}' already declared with different properties",
                spec.name
            ))),
            Some(_) => Ok(()),
            None => {
                topology.exchanges.insert(
                    spec.name.clone(),
                    ExchangeEntry {
                        spec: spec.clone(),
                        bindings: Vec::new(),
                    },
                );
                debug!(exchange = %spec.name, "Exchange declared");
                Ok(())
            }
        }
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
    ) -> Result<(), BusError> {
        self.ensure_usable()?;
        let mut topology = self.state.topology.lock();
        topology.reap_abandoned_queues();

        let entry = topology
            .exchanges
            .get(exchange)
            .ok_or_else(|| BusError::ExchangeNotFound(exchange.to_string()))?;

        let mut targets: Vec<&str> = entry
            .bindings
            .iter()
            .filter(|b| matches(&b.pattern, routing_key))
            .map(|b| b.queue.as_str())
            .collect();
        targets.sort_unstable();
        targets.dedup();

        for queue in targets {
            if let Some(q) = topology.queues.get(queue) {
                // A closed receiver just means nobody is listening any more
                let _ = q.sender.send((routing_key.to_string(), body.to_vec()));
            }
        }
        Ok(())
    }

    async fn declare_queue(&self, spec: &QueueSpec) -> Result<String, BusError> {
        self.ensure_usable()?;
        let mut topology = self.state.topology.lock();

        let name = if spec.name.is_empty() {
            format!("amq.gen-{}", Uuid::new_v4().simple())
        } else {
            spec.name.clone()
        };

        if let Some(existing) = topology.queues.get(&name) {
            if existing.spec.exclusive && existing.owner != self.id {
                return Err(BusError::PreconditionFailed(format!(
                    "queue '{}' is exclusive to another channel",
                    name
                )));
            }
            return Ok(name);
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        topology.queues.insert(
            name.clone(),
            QueueEntry {
                spec: spec.clone(),
                owner: self.id,
                sender,
                receiver: Some(receiver),
            },
        );
        Ok(name)
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        pattern: &str,
    ) -> Result<(), BusError> {
        self.ensure_usable()?;
        let mut topology = self.state.topology.lock();
        if !topology.queues.contains_key(queue) {
            return Err(BusError::QueueNotFound(queue.to_string()));
        }
        let entry = topology
            .exchanges
            .get_mut(exchange)
            .ok_or_else(|| BusError::ExchangeNotFound(exchange.to_string()))?;

        let exists = entry
            .bindings
            .iter()
            .any(|b| b.queue == queue && b.pattern == pattern);
        if !exists {
            entry.bindings.push(Binding {
                queue: queue.to_string(),
                pattern: pattern.to_string(),
            });
        }
        Ok(())
    }

    async fn set_prefetch(&self, count: u16) -> Result<(), BusError> {
        self.ensure_usable()?;
        self.prefetch.store(count, Ordering::SeqCst);
        Ok(())
    }

    async fn consume(&self, queue: &str, mode: AckMode) -> Result<DeliveryStream, BusError> {
        self.ensure_usable()?;
        let receiver = {
            let mut topology = self.state.topology.lock();
            let entry = topology
                .queues
                .get_mut(queue)
                .ok_or_else(|| BusError::QueueNotFound(queue.to_string()))?;
            entry.receiver.take().ok_or_else(|| {
                BusError::Consume(format!("queue '{}' already has a consumer", queue))
            })?
        };

        let limit = match (mode, self.prefetch.load(Ordering::SeqCst)) {
            (AckMode::AfterHandler, count) if count > 0 => {
                Some(Arc::new(Semaphore::new(usize::from(count))))
            }
            _ => None,
        };
        let state = Arc::clone(&self.state);
        let stream = UnboundedReceiverStream::new(receiver).then(move |(routing_key, body)| {
            let state = Arc::clone(&state);
            let limit = limit.clone();
            async move {
                let delivery = Delivery::new(routing_key, body);
                if mode == AckMode::Auto {
                    return Ok(delivery);
                }
                let permit = match limit {
                    Some(limit) => Some(
                        limit
                            .acquire_owned()
                            .await
                            .map_err(|e| BusError::Consume(e.to_string()))?,
                    ),
                    None => None,
                };
                Ok(delivery.with_acker(Box::new(MemoryAcker {
                    state,
                    _permit: permit,
                })))
            }
        });
        Ok(Box::pin(stream))
    }

    async fn close(&self) -> Result<(), BusError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut topology = self.state.topology.lock();
        let owned: Vec<String> = topology
            .queues
            .iter()
            .filter(|(_, q)| q.spec.exclusive && q.owner == self.id)
            .map(|(name, _)| name.clone())
            .collect();
        for name in owned {
            topology.remove_queue(&name);
        }
        Ok(())
    }
}

struct MemoryAcker {
    state: Arc<BrokerState>,
    /// Released when the acker is dropped after settling
    _permit: Option<OwnedSemaphorePermit>,
}

#[async_trait]
impl Acknowledger for MemoryAcker {
    async fn ack(&self) -> Result<(), BusError> {
        self.state.acked.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn reject(&self) -> Result<(), BusError> {
        self.state.rejected.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
