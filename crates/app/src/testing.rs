//! In-memory fakes shared by the unit tests of this crate.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::DuplexStream;

use homelink_domain::device::PoolConfig;
use homelink_domain::error::HubError;
use homelink_domain::event::Event;

use crate::connection_pool::ConnectionPool;
use crate::ports::event_bus::EventPublisher;
use crate::ports::transport::{Dialer, Transport};

/// Dials in-memory pipes and keeps the device ends for the test.
#[derive(Default)]
pub struct FakeDialer {
    pub dials: AtomicUsize,
    pub refuse: AtomicBool,
    pub peers: Mutex<Vec<DuplexStream>>,
}

impl FakeDialer {
    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    /// Take the device end of the most recent connection.
    pub fn take_peer(&self) -> Option<DuplexStream> {
        self.peers.lock().unwrap().pop()
    }
}

#[async_trait]
impl Dialer for FakeDialer {
    async fn dial(&self) -> Result<Box<dyn Transport>, HubError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(std::io::Error::from(std::io::ErrorKind::ConnectionRefused).into());
        }
        self.dials.fetch_add(1, Ordering::SeqCst);
        let (hub, device) = tokio::io::duplex(1024);
        self.peers.lock().unwrap().push(device);
        Ok(Box::new(hub))
    }
}

pub fn pool(size: usize) -> (ConnectionPool, Arc<FakeDialer>) {
    let dialer = Arc::new(FakeDialer::default());
    let config = PoolConfig {
        name: "test".to_string(),
        size,
    };
    let pool = ConnectionPool::new(config, Arc::clone(&dialer) as Arc<dyn Dialer>).unwrap();
    (pool, dialer)
}

/// Publisher that keeps every enqueued event.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<Event>>,
}

impl RecordingPublisher {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

impl EventPublisher for RecordingPublisher {
    fn enqueue(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

/// Poll `condition` until it holds, panicking after five (virtual) seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
