use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use huddle_types::events::ChangeEvent;

use crate::subscription::Subscription;

const FEED_CAPACITY: usize = 1024;

/// Equality filter a subscription applies to the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    /// Every event about this room.
    Room(Uuid),
    /// Feedback about this profile, in any room.
    RatedProfile(Uuid),
}

impl Filter {
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        match self {
            Self::Room(room_id) => event.room_id() == *room_id,
            Self::RatedProfile(profile_id) => event.rated_profile_id() == Some(*profile_id),
        }
    }
}

/// Publishes change events to every open subscription.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Change feed. Every subscription holds a receiver and filters locally.
    feed_tx: broadcast::Sender<Arc<ChangeEvent>>,

    /// Open subscriptions: subscription id -> filters.
    /// A std mutex because subscriptions release from `Drop`.
    subscriptions: Mutex<HashMap<Uuid, Vec<Filter>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (feed_tx, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            inner: Arc::new(DispatcherInner {
                feed_tx,
                subscriptions: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: ChangeEvent) {
        let receivers = self.inner.feed_tx.send(Arc::new(event)).unwrap_or(0);
        debug!("Change event delivered to {} receivers", receivers);
    }

    /// Open a subscription. It stays registered until released or dropped.
    pub fn subscribe(&self, filters: Vec<Filter>) -> Subscription {
        let id = Uuid::new_v4();
        let rx = self.inner.feed_tx.subscribe();

        match self.inner.subscriptions.lock() {
            Ok(mut subs) => {
                subs.insert(id, filters.clone());
            }
            Err(e) => warn!("Subscription registry poisoned: {}", e),
        }
        debug!("Subscription {} opened with {:?}", id, filters);

        Subscription::new(id, filters, rx, self.clone())
    }

    pub(crate) fn release(&self, id: Uuid) {
        match self.inner.subscriptions.lock() {
            Ok(mut subs) => {
                if subs.remove(&id).is_some() {
                    debug!("Subscription {} released", id);
                }
            }
            Err(e) => warn!("Subscription registry poisoned: {}", e),
        }
    }

    pub fn open_subscriptions(&self) -> usize {
        self.inner.subscriptions.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Number of open subscriptions watching a room.
    pub fn watchers(&self, room_id: Uuid) -> usize {
        self.inner
            .subscriptions
            .lock()
            .map(|subs| {
                subs.values()
                    .filter(|filters| filters.contains(&Filter::Room(room_id)))
                    .count()
            })
            .unwrap_or(0)
    }
}
