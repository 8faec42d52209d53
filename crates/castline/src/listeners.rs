//! Listener registry - live fan-out of ingested chunks.
//!
//! Each listener is a bounded `mpsc` queue drained by its websocket task.
//! Broadcasting makes exactly one non-blocking `try_send` per listener; a
//! full or closed queue disconnects that listener. Transport disconnects
//! (the [`Listener`] being dropped) and failed sends both go through
//! [`remove_locked`], so a listener is removed exactly once.
//!
//! The registry has its own lock, separate from the session actor, so a
//! listener joining or leaving never waits on buffer work or a flush.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info};
use uuid::Uuid;

/// Frames queued per listener when no explicit depth is given.
pub const DEFAULT_QUEUE_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Sending half of a listener, owned by the registry.
#[derive(Debug)]
pub struct ListenerHandle {
    id: ListenerId,
    tx: mpsc::Sender<Bytes>,
    connected_at: Instant,
}

impl ListenerHandle {
    pub fn new(id: ListenerId, tx: mpsc::Sender<Bytes>) -> Self {
        Self {
            id,
            tx,
            connected_at: Instant::now(),
        }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Transport closed or the listener unsubscribed.
    Closed,
    /// Queue full - the listener fell too far behind.
    Lagged,
    /// Receiving half already gone when a send was attempted.
    SendFailed,
}

#[derive(Debug)]
pub struct ListenerRegistry {
    listeners: Mutex<HashMap<ListenerId, ListenerHandle>>,
    queue_depth: usize,
}

impl ListenerRegistry {
    pub fn new(queue_depth: usize) -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
            queue_depth: queue_depth.max(1),
        }
    }

    pub fn new_shared(queue_depth: usize) -> Arc<Self> {
        Arc::new(Self::new(queue_depth))
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ListenerId, ListenerHandle>> {
        // A panic mid-broadcast leaves the map itself consistent
        self.listeners.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a listener. Returns `false` if one with the same id is already present.
    pub fn subscribe(&self, handle: ListenerHandle) -> bool {
        let mut listeners = self.lock();
        if listeners.contains_key(&handle.id) {
            return false;
        }
        let id = handle.id;
        listeners.insert(id, handle);
        info!(listener = %id, total = listeners.len(), "listener connected");
        true
    }

    /// Remove a listener. Safe to call for ids that are already gone.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        remove_locked(&mut self.lock(), id, DisconnectReason::Closed)
    }

    /// Create a queue, register it, and return the receiving side.
    pub fn connect(self: &Arc<Self>) -> Listener {
        let (tx, rx) = mpsc::channel(self.queue_depth);
        let id = ListenerId::new();
        self.subscribe(ListenerHandle::new(id, tx));
        Listener {
            id,
            rx,
            registry: Arc::clone(self),
        }
    }

    /// Offer `chunk` to every listener once. Returns how many accepted it.
    pub fn broadcast(&self, chunk: &Bytes) -> usize {
        let mut listeners = self.lock();
        let mut delivered = 0;
        let mut dropped = Vec::new();

        for (id, handle) in listeners.iter() {
            match handle.tx.try_send(chunk.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => dropped.push((*id, DisconnectReason::Lagged)),
                Err(TrySendError::Closed(_)) => dropped.push((*id, DisconnectReason::SendFailed)),
            }
        }

        for (id, reason) in dropped {
            remove_locked(&mut listeners, id, reason);
        }

        delivered
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_DEPTH)
    }
}

/// The single removal path: dropping the handle closes the listener's queue.
fn remove_locked(
    listeners: &mut HashMap<ListenerId, ListenerHandle>,
    id: ListenerId,
    reason: DisconnectReason,
) -> bool {
    match listeners.remove(&id) {
        Some(handle) => {
            info!(
                listener = %id,
                ?reason,
                connected_ms = handle.connected_at.elapsed().as_millis() as u64,
                remaining = listeners.len(),
                "listener disconnected"
            );
            true
        }
        None => {
            debug!(listener = %id, ?reason, "listener already removed");
            false
        }
    }
}

/// Receiving half of a listener. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Listener {
    id: ListenerId,
    rx: mpsc::Receiver<Bytes>,
    registry: Arc<ListenerRegistry>,
}

impl Listener {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Next chunk, or `None` once the registry has dropped this listener.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.registry.unsubscribe(self.id);
    }
}
