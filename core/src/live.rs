//! Fan-out of full snapshots to live subscribers.
//!
//! Each subscriber gets its own unbounded FIFO channel, so snapshots arrive in
//! the order they were published. A [`Subscription`] unregisters itself when
//! cancelled or dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::models::{Snapshot, UserId};

struct Subscriber {
    user: UserId,
    tx: mpsc::UnboundedSender<Snapshot>,
}

#[derive(Default)]
struct HubState {
    next_id: u64,
    subscribers: HashMap<u64, Subscriber>,
}

#[derive(Clone, Default)]
pub struct SubscriptionHub {
    state: Arc<Mutex<HubState>>,
}

impl SubscriptionHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    #[must_use]
    pub fn register(&self, user: &UserId) -> Subscription {
        self.register_inner(user, None)
    }

    /// Register a subscriber whose first snapshot is `initial`. Existing
    /// subscribers of the same user are not sent anything.
    #[must_use]
    pub fn register_with_snapshot(&self, user: &UserId, initial: Snapshot) -> Subscription {
        self.register_inner(user, Some(initial))
    }

    fn register_inner(&self, user: &UserId, initial: Option<Snapshot>) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(initial) = initial {
            // The receiver is still held here, so the send cannot fail.
            let _ = tx.send(initial);
        }
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.subscribers.insert(
            id,
            Subscriber {
                user: user.clone(),
                tx,
            },
        );
        debug!(subscription = id, path = %user.expenses_path(), "subscriber registered");
        Subscription {
            id,
            user: user.clone(),
            rx,
            hub: Arc::downgrade(&self.state),
            active: true,
        }
    }

    /// Send `snapshot` to every live subscriber of `user`. Returns how many
    /// subscribers received it.
    pub fn publish(&self, user: &UserId, snapshot: &Snapshot) -> usize {
        let mut state = self.lock();
        let mut delivered = 0;
        let mut closed = Vec::new();
        for (id, subscriber) in &state.subscribers {
            if subscriber.user != *user {
                continue;
            }
            if subscriber.tx.send(snapshot.clone()).is_ok() {
                delivered += 1;
            } else {
                closed.push(*id);
            }
        }
        for id in closed {
            warn!(subscription = id, "dropping subscriber whose receiver is gone");
            state.subscribers.remove(&id);
        }
        delivered
    }

    /// Distinct users with at least one live subscriber.
    #[must_use]
    pub fn subscribed_users(&self) -> Vec<UserId> {
        let state = self.lock();
        let mut users: Vec<UserId> = Vec::new();
        for subscriber in state.subscribers.values() {
            if !users.contains(&subscriber.user) {
                users.push(subscriber.user.clone());
            }
        }
        users
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().subscribers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle to a live subscription.
///
/// Yields full snapshots from [`Subscription::next`] until cancelled.
/// Cancelling is idempotent, and dropping the handle cancels it.
pub struct Subscription {
    id: u64,
    user: UserId,
    rx: mpsc::UnboundedReceiver<Snapshot>,
    hub: Weak<Mutex<HubState>>,
    active: bool,
}

impl Subscription {
    #[must_use]
    pub fn user(&self) -> &UserId {
        &self.user
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Wait for the next snapshot. `None` once cancelled or once the store
    /// behind the hub has gone away.
    pub async fn next(&mut self) -> Option<Snapshot> {
        if !self.active {
            return None;
        }
        let snapshot = self.rx.recv().await;
        if snapshot.is_none() {
            self.active = false;
        }
        snapshot
    }

    pub fn cancel(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        self.rx.close();
        if let Some(state) = self.hub.upgrade() {
            let mut state = state
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            state.subscribers.remove(&self.id);
        }
        debug!(subscription = self.id, path = %self.user.expenses_path(), "subscriber released");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("user", &self.user)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}
