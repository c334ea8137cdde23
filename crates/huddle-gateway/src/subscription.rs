use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::warn;
use uuid::Uuid;

use huddle_types::events::ChangeEvent;

use crate::dispatcher::{Dispatcher, Filter};

/// A filtered handle on the change feed.
///
/// Acquired with [`Dispatcher::subscribe`] and released with
/// [`Subscription::release`] or by dropping it. Releasing drops the feed
/// receiver, so events already queued for it are discarded and never seen.
pub struct Subscription {
    id: Uuid,
    filters: Vec<Filter>,
    rx: Option<broadcast::Receiver<Arc<ChangeEvent>>>,
    dispatcher: Dispatcher,
}

impl Subscription {
    pub(crate) fn new(
        id: Uuid,
        filters: Vec<Filter>,
        rx: broadcast::Receiver<Arc<ChangeEvent>>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            id,
            filters,
            rx: Some(rx),
            dispatcher,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn is_open(&self) -> bool {
        self.rx.is_some()
    }

    fn wants(&self, event: &ChangeEvent) -> bool {
        self.filters.iter().any(|f| f.matches(event))
    }

    /// Wait for the next matching event. Returns `None` once released or
    /// once the feed is gone.
    pub async fn recv(&mut self) -> Option<Arc<ChangeEvent>> {
        loop {
            let result = match self.rx.as_mut() {
                Some(rx) => rx.recv().await,
                None => return None,
            };
            match result {
                Ok(event) if self.wants(&event) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(n)) => {
                    warn!("Subscription {} lagged by {} events", self.id, n);
                    continue;
                }
                Err(RecvError::Closed) => {
                    self.release();
                    return None;
                }
            }
        }
    }

    /// Next matching event if one is already queued.
    pub fn try_recv(&mut self) -> Option<Arc<ChangeEvent>> {
        loop {
            let result = self.rx.as_mut()?.try_recv();
            match result {
                Ok(event) if self.wants(&event) => return Some(event),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(n)) => {
                    warn!("Subscription {} lagged by {} events", self.id, n);
                    continue;
                }
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Closed) => {
                    self.release();
                    return None;
                }
            }
        }
    }

    /// Stop receiving. Idempotent.
    pub fn release(&mut self) {
        if self.rx.take().is_some() {
            self.dispatcher.release(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}
