//! Capture Ring & Listener Fanout (component C7).
//!
//! Grounded on the teacher's `recording/store.rs`: a small, fully-tested
//! public surface guarded by `parking_lot`. The ring itself is one
//! `parking_lot::Mutex<VecDeque<_>>`; listeners live behind a second,
//! separate `parking_lot::RwLock`, matching the two-lock design the
//! concurrency model calls for. Fanout to each listener is a bounded
//! `tokio::sync::mpsc` channel; a full queue increments that listener's drop
//! counter instead of blocking the capture path.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

const LISTENER_QUEUE_DEPTH: usize = 16;

#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub id: Uuid,
    pub host: String,
    pub is_https: bool,
    pub method: String,
    pub path: String,
    pub request_headers: Vec<(String, String)>,
    pub request_body: Option<Vec<u8>>,
    pub response_status: Option<u16>,
    pub response_headers: Vec<(String, String)>,
    pub response_body: Option<Vec<u8>>,
    pub duration: std::time::Duration,
    pub error: Option<String>,
    pub captured_at: DateTime<Utc>,
}

/// Lifetime and point-in-time counters over a `CaptureRing`.
#[derive(Debug, Clone, Copy)]
pub struct CaptureStats {
    pub total_count: u64,
    pub current_len: usize,
    pub capacity: usize,
}

struct Listener {
    id: Uuid,
    sender: mpsc::Sender<Arc<CapturedRequest>>,
    dropped: Arc<AtomicU64>,
}

pub struct CaptureRing {
    capacity: usize,
    ring: Mutex<VecDeque<Arc<CapturedRequest>>>,
    listeners: RwLock<Vec<Listener>>,
    total_count: AtomicU64,
}

pub struct ListenerHandle {
    pub id: Uuid,
    pub receiver: mpsc::Receiver<Arc<CapturedRequest>>,
    dropped: Arc<AtomicU64>,
}

impl ListenerHandle {
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl CaptureRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            ring: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
            listeners: RwLock::new(Vec::new()),
            total_count: AtomicU64::new(0),
        }
    }

    /// Append a capture to the ring (evicting the oldest entry if full), and
    /// fan it out to every live listener without blocking on a slow one.
    pub fn push(&self, captured: CapturedRequest) {
        crate::metrics::record_capture(&captured.host);
        self.total_count.fetch_add(1, Ordering::Relaxed);
        let captured = Arc::new(captured);
        {
            let mut ring = self.ring.lock();
            if ring.len() == self.capacity {
                ring.pop_front();
            }
            ring.push_back(Arc::clone(&captured));
        }

        let listeners = self.listeners.read();
        for listener in listeners.iter() {
            if listener.sender.try_send(Arc::clone(&captured)).is_err() {
                listener.dropped.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_fanout_drop(&listener.id.to_string());
            }
        }
    }

    /// Most-recent-first snapshot of everything currently in the ring.
    pub fn snapshot(&self) -> Vec<Arc<CapturedRequest>> {
        self.ring.lock().iter().rev().cloned().collect()
    }

    /// Lifetime total pushed (monotonic, never shrinks on eviction) alongside
    /// the ring's current occupancy and capacity.
    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            total_count: self.total_count.load(Ordering::Relaxed),
            current_len: self.len(),
            capacity: self.capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.ring.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.ring.lock().clear();
    }

    /// Register a new fanout listener with a bounded queue.
    pub fn subscribe(&self) -> ListenerHandle {
        let (sender, receiver) = mpsc::channel(LISTENER_QUEUE_DEPTH);
        let dropped = Arc::new(AtomicU64::new(0));
        let id = Uuid::new_v4();
        self.listeners.write().push(Listener {
            id,
            sender,
            dropped: Arc::clone(&dropped),
        });
        ListenerHandle { id, receiver, dropped }
    }

    pub fn unsubscribe(&self, id: Uuid) {
        self.listeners.write().retain(|l| l.id != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(host: &str) -> CapturedRequest {
        CapturedRequest {
            id: Uuid::new_v4(),
            host: host.to_string(),
            is_https: true,
            method: "GET".to_string(),
            path: "/".to_string(),
            request_headers: vec![],
            request_body: None,
            response_status: Some(200),
            response_headers: vec![],
            response_body: None,
            duration: std::time::Duration::from_millis(5),
            error: None,
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn ring_evicts_oldest_when_full() {
        let ring = CaptureRing::new(2);
        ring.push(sample("a.com"));
        ring.push(sample("b.com"));
        ring.push(sample("c.com"));
        let snapshot = ring.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].host, "c.com");
        assert_eq!(snapshot[1].host, "b.com");
    }

    #[test]
    fn stats_total_count_survives_eviction() {
        let ring = CaptureRing::new(2);
        ring.push(sample("a.com"));
        ring.push(sample("b.com"));
        ring.push(sample("c.com"));
        let stats = ring.stats();
        assert_eq!(stats.total_count, 3);
        assert_eq!(stats.current_len, 2);
        assert_eq!(stats.capacity, 2);
    }

    #[tokio::test]
    async fn listener_receives_pushed_captures() {
        let ring = CaptureRing::new(8);
        let mut handle = ring.subscribe();
        ring.push(sample("example.com"));
        let received = handle.receiver.recv().await.unwrap();
        assert_eq!(received.host, "example.com");
    }

    #[test]
    fn full_listener_queue_increments_drop_counter_without_blocking() {
        let ring = CaptureRing::new(64);
        let handle = ring.subscribe();
        for i in 0..(LISTENER_QUEUE_DEPTH + 5) {
            ring.push(sample(&format!("host{i}.example.com")));
        }
        assert!(handle.dropped_count() > 0);
    }

    #[test]
    fn unsubscribe_stops_fanout() {
        let ring = CaptureRing::new(8);
        let handle = ring.subscribe();
        ring.unsubscribe(handle.id);
        ring.push(sample("gone.example.com"));
        // No listeners left, push must not panic or block.
        assert_eq!(ring.len(), 1);
    }
}
