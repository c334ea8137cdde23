//! Per-viewer live view over the change feed.
//!
//! A [`LiveView`] owns one subscription and the viewer's copy of a room
//! (roster and feedback). Incoming events are reconciled against that copy:
//! room snapshots only apply when they are newer than what the viewer has,
//! and feedback is deduplicated by id, so replayed or reordered deliveries
//! cannot regress the view.

use std::collections::HashSet;

use tracing::{debug, info};
use uuid::Uuid;

use huddle_types::events::ChangeEvent;
use huddle_types::models::{Feedback, Room};

use crate::dispatcher::{Dispatcher, Filter};
use crate::subscription::Subscription;

/// What the viewer should be told after applying an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    RoomChanged(Room),
    FeedbackAdded(Feedback),
    Notify(String),
    ProfileRefresh(i64),
    SessionClosed(Uuid),
}

#[derive(Debug, Clone)]
pub struct RoomView {
    pub room: Room,
    /// Newest first.
    pub feedback: Vec<Feedback>,
}

pub struct LiveView {
    viewer_id: Uuid,
    /// Raise `Notify`/`ProfileRefresh` for ratings of the viewer.
    notify_viewer: bool,
    room: Option<RoomView>,
    /// Feedback already in the room's list.
    seen_feedback: HashSet<Uuid>,
    /// Ratings the viewer has already been told about.
    notified: HashSet<Uuid>,
    subscription: Subscription,
}

impl LiveView {
    /// A view with no room, only listening for feedback about the viewer.
    pub fn personal(dispatcher: &Dispatcher, viewer_id: Uuid) -> Self {
        Self::new(dispatcher, viewer_id, vec![Filter::RatedProfile(viewer_id)], true)
    }

    /// Start watching a room. The subscription opens before the room is
    /// loaded, so changes made while the caller loads it are queued and
    /// reconciled once [`LiveView::load`] supplies the snapshot.
    pub fn watch(dispatcher: &Dispatcher, viewer_id: Uuid, room_id: Uuid) -> Self {
        Self::new(
            dispatcher,
            viewer_id,
            vec![Filter::Room(room_id), Filter::RatedProfile(viewer_id)],
            true,
        )
    }

    /// Watch a room without raising the viewer's own rating notices. Pair it
    /// with a [`LiveView::personal`] view that outlives it.
    pub fn room_only(dispatcher: &Dispatcher, viewer_id: Uuid, room_id: Uuid) -> Self {
        Self::new(dispatcher, viewer_id, vec![Filter::Room(room_id)], false)
    }

    fn new(dispatcher: &Dispatcher, viewer_id: Uuid, filters: Vec<Filter>, notify_viewer: bool) -> Self {
        Self {
            viewer_id,
            notify_viewer,
            room: None,
            seen_feedback: HashSet::new(),
            notified: HashSet::new(),
            subscription: dispatcher.subscribe(filters),
        }
    }

    /// Install the loaded snapshot of the watched room. Ratings of the
    /// viewer in the snapshot can still notify when their event arrives.
    pub fn load(&mut self, room: Room, feedback: Vec<Feedback>) {
        info!("{} watching room {} at version {}", self.viewer_id, room.id, room.version);
        self.seen_feedback.extend(feedback.iter().map(|f| f.id));
        self.room = Some(RoomView { room, feedback });
    }

    pub fn room(&self) -> Option<&RoomView> {
        self.room.as_ref()
    }

    pub fn room_id(&self) -> Option<Uuid> {
        self.room.as_ref().map(|v| v.room.id)
    }

    pub fn is_open(&self) -> bool {
        self.subscription.is_open()
    }

    /// Release the subscription. Nothing is applied afterwards.
    pub fn close(&mut self) {
        self.subscription.release();
    }

    /// Wait for the next event and apply it. Returns `None` once closed.
    pub async fn next(&mut self) -> Option<Vec<Signal>> {
        let event = self.subscription.recv().await?;
        Some(self.apply(&event))
    }

    /// Apply every event already queued, without waiting.
    pub fn drain(&mut self) -> Vec<Signal> {
        let mut signals = Vec::new();
        while let Some(event) = self.subscription.try_recv() {
            signals.extend(self.apply(&event));
        }
        signals
    }

    /// Reconcile one event into the view.
    pub fn apply(&mut self, event: &ChangeEvent) -> Vec<Signal> {
        if !self.is_open() {
            return Vec::new();
        }

        match event {
            ChangeEvent::RoomUpdated { room } => self.apply_room(room),
            ChangeEvent::FeedbackCreated { feedback, points } => self.apply_feedback(feedback, *points),
        }
    }

    fn apply_room(&mut self, incoming: &Room) -> Vec<Signal> {
        let Some(view) = self.room.as_mut() else {
            return Vec::new();
        };
        if view.room.id != incoming.id {
            return Vec::new();
        }
        if incoming.version <= view.room.version {
            debug!(
                "Ignoring stale snapshot of room {} (v{} <= v{})",
                incoming.id, incoming.version, view.room.version
            );
            return Vec::new();
        }

        view.room = incoming.clone();
        let mut signals = vec![Signal::RoomChanged(incoming.clone())];

        if incoming.status.is_terminal() {
            info!("Room {} completed; closing view for {}", incoming.id, self.viewer_id);
            signals.push(Signal::SessionClosed(incoming.id));
            self.subscription.release();
        }
        signals
    }

    fn apply_feedback(&mut self, feedback: &Feedback, points: i64) -> Vec<Signal> {
        let mut signals = Vec::new();
        if let Some(view) = self.room.as_mut() {
            if view.room.id == feedback.room_id && self.seen_feedback.insert(feedback.id) {
                view.feedback.insert(0, feedback.clone());
                signals.push(Signal::FeedbackAdded(feedback.clone()));
            }
        }

        if self.notify_viewer && feedback.student_id == self.viewer_id && self.notified.insert(feedback.id) {
            signals.push(Signal::Notify(notification_text(feedback)));
            signals.push(Signal::ProfileRefresh(points));
        }
        signals
    }
}

/// The comment if there is one, otherwise a generic line about the rating.
pub fn notification_text(feedback: &Feedback) -> String {
    match feedback.comment.as_deref().map(str::trim) {
        Some(comment) if !comment.is_empty() => comment.to_string(),
        _ => format!("You received a {}-star rating", feedback.rating),
    }
}
