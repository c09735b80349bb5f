//! In-process event bus with one bounded queue per consumer.
//!
//! Each registered consumer gets its own queue and dispatch task, so a slow
//! consumer only delays itself. The dispatch task drains the whole backlog,
//! runs it through the [`CoalescePolicy`], and hands the batch to the
//! consumer in enqueue order.
//!
//! When a queue is full, an incoming event is merged into the newest queued
//! event of the same kind if its kind is mergeable; otherwise the oldest
//! queued event is dropped.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use homelink_domain::event::{Event, EventKind};

use crate::coalesce::CoalescePolicy;
use crate::ports::event_bus::EventPublisher;
use crate::ports::extension::{EventConsumer, EventProducer};

/// Queue capacity used when none is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConsumerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProducerId(u64);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct QueueState {
    events: VecDeque<Event>,
    closed: bool,
}

struct ConsumerQueue {
    consumer: String,
    capacity: usize,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl ConsumerQueue {
    fn new(consumer: String, capacity: usize) -> Self {
        Self {
            consumer,
            capacity: capacity.max(1),
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
        }
    }

    fn push(&self, event: Event, policy: &CoalescePolicy) {
        let mut state = lock(&self.state);
        if state.closed {
            return;
        }
        if state.events.len() >= self.capacity {
            let kind = event.kind();
            let leftover = match state.events.iter_mut().rev().find(|e| e.kind() == kind) {
                Some(queued) if policy.is_mergeable(kind) => policy.absorb(queued, event),
                _ => Some(event),
            };
            let Some(event) = leftover else {
                return;
            };
            if let Some(dropped) = state.events.pop_front() {
                tracing::warn!(consumer = %self.consumer, %dropped, "queue full, dropped oldest event");
            }
            state.events.push_back(event);
        } else {
            state.events.push_back(event);
        }
        drop(state);
        self.notify.notify_one();
    }

    /// Wait for the next backlog. `None` once closed and empty.
    async fn drain(&self) -> Option<Vec<Event>> {
        loop {
            {
                let mut state = lock(&self.state);
                if !state.events.is_empty() {
                    return Some(state.events.drain(..).collect());
                }
                if state.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    fn close(&self) {
        lock(&self.state).closed = true;
        self.notify.notify_one();
    }
}

struct Registration {
    id: ConsumerId,
    kinds: Vec<EventKind>,
    queue: Arc<ConsumerQueue>,
    task: JoinHandle<()>,
}

struct BusInner {
    capacity: usize,
    policy: CoalescePolicy,
    next_id: AtomicU64,
    consumers: Mutex<Vec<Registration>>,
    producers: Mutex<Vec<(ProducerId, Arc<dyn EventProducer>)>>,
}

/// Process-wide publish/subscribe bus. Cheap to clone.
#[derive(Clone)]
pub struct InProcessEventBus {
    inner: Arc<BusInner>,
}

impl Default for InProcessEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl InProcessEventBus {
    /// Create a bus whose consumer queues hold at most `capacity` events,
    /// coalescing with the default policy.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::with_policy(capacity, CoalescePolicy::default())
    }

    #[must_use]
    pub fn with_policy(capacity: usize, policy: CoalescePolicy) -> Self {
        Self {
            inner: Arc::new(BusInner {
                capacity,
                policy,
                next_id: AtomicU64::new(0),
                consumers: Mutex::new(Vec::new()),
                producers: Mutex::new(Vec::new()),
            }),
        }
    }

    fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a consumer and spawn its dispatch task.
    ///
    /// The consumer receives events enqueued from now on whose kind is in
    /// its subscriptions. Must be called from within a tokio runtime.
    pub fn add_consumer(&self, consumer: Arc<dyn EventConsumer>) -> ConsumerId {
        let id = ConsumerId(self.next_id());
        let queue = Arc::new(ConsumerQueue::new(
            consumer.name().to_string(),
            self.inner.capacity,
        ));
        let kinds = consumer.subscriptions().to_vec();
        tracing::info!(consumer = %consumer.name(), ?kinds, "consumer registered");

        let task = tokio::spawn(dispatch(
            consumer,
            Arc::clone(&queue),
            self.inner.policy.clone(),
        ));
        lock(&self.inner.consumers).push(Registration {
            id,
            kinds,
            queue,
            task,
        });
        id
    }

    /// Unregister a consumer, letting it finish its backlog first.
    ///
    /// Returns `false` when the id is unknown.
    pub async fn remove_consumer(&self, id: ConsumerId) -> bool {
        let registration = {
            let mut consumers = lock(&self.inner.consumers);
            let Some(pos) = consumers.iter().position(|r| r.id == id) else {
                return false;
            };
            consumers.remove(pos)
        };
        stop_consumer(registration).await;
        true
    }

    /// Register a producer and start it.
    pub fn add_producer(&self, producer: Arc<dyn EventProducer>) -> ProducerId {
        let id = ProducerId(self.next_id());
        tracing::info!(producer = %producer.name(), "producer registered");
        producer.start();
        lock(&self.inner.producers).push((id, producer));
        id
    }

    /// Stop and unregister a producer. Returns `false` when the id is unknown.
    pub async fn remove_producer(&self, id: ProducerId) -> bool {
        let producer = {
            let mut producers = lock(&self.inner.producers);
            let Some(pos) = producers.iter().position(|(pid, _)| *pid == id) else {
                return false;
            };
            producers.remove(pos).1
        };
        producer.stop().await;
        true
    }

    /// Stop every producer, then drain and stop every consumer.
    pub async fn shutdown(&self) {
        let producers = std::mem::take(&mut *lock(&self.inner.producers));
        for (_, producer) in producers {
            producer.stop().await;
        }
        let consumers = std::mem::take(&mut *lock(&self.inner.consumers));
        for registration in consumers {
            stop_consumer(registration).await;
        }
        tracing::info!("event bus shut down");
    }

    #[must_use]
    pub fn consumer_count(&self) -> usize {
        lock(&self.inner.consumers).len()
    }
}

impl EventPublisher for InProcessEventBus {
    fn enqueue(&self, event: Event) {
        let kind = event.kind();
        let consumers = lock(&self.inner.consumers);
        let mut delivered = 0_usize;
        for registration in consumers.iter().filter(|r| r.kinds.contains(&kind)) {
            registration
                .queue
                .push(event.clone(), &self.inner.policy);
            delivered += 1;
        }
        tracing::trace!(%kind, delivered, "event enqueued");
    }
}

async fn stop_consumer(registration: Registration) {
    let consumer = registration.queue.consumer.clone();
    registration.queue.close();
    if let Err(err) = registration.task.await {
        tracing::error!(%consumer, %err, "consumer task failed");
    }
    tracing::info!(%consumer, "consumer stopped");
}

async fn dispatch(
    consumer: Arc<dyn EventConsumer>,
    queue: Arc<ConsumerQueue>,
    policy: CoalescePolicy,
) {
    while let Some(backlog) = queue.drain().await {
        let batch = policy.coalesce(backlog);
        tracing::trace!(consumer = %consumer.name(), events = batch.len(), "dispatching batch");
        consumer.consume(batch).await;
    }
}
