//! # Interaction Events and the User-Event Bus
//!
//! Two kinds of events flow through the engine:
//!
//! - [`InteractionEvent`]: the durable record the taste profile and the
//!   preference store learn from (like, listen, download, playlist-add).
//! - [`UserEvent`]: the transient notification fanned out to subscribers and
//!   algorithm plugins (plays, skips, likes, dislikes, queue changes).
//!
//! [`EventBus`] subscriptions return a [`Subscription`] handle; dropping the
//! handle keeps the callback registered, calling [`Subscription::unsubscribe`]
//! removes it. A failing callback is logged and never stops delivery to the
//! remaining subscribers.

use crate::track::{Embedding, TrackId};
use chrono::{Datelike, Local, TimeZone, Timelike};
use log::{trace, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Listens at or above this fraction of the track duration count as completed.
pub const COMPLETION_THRESHOLD: f64 = 0.8;

/// Listens below this fraction count as skips for training purposes.
pub const SKIP_THRESHOLD: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InteractionKind {
    Like,
    Listen,
    Download,
    PlaylistAdd,
}

/// When an interaction happened, in the listener's local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionContext {
    /// 0–23.
    pub hour: u8,
    /// 0 = Sunday … 6 = Saturday.
    pub day_of_week: u8,
}

impl InteractionContext {
    #[must_use]
    pub fn new(hour: u8, day_of_week: u8) -> Self {
        Self {
            hour: hour % 24,
            day_of_week: day_of_week % 7,
        }
    }

    /// Local hour/weekday for a unix timestamp in milliseconds.
    #[must_use]
    pub fn from_timestamp_ms(timestamp_ms: i64) -> Option<Self> {
        let local = Local.timestamp_millis_opt(timestamp_ms).single()?;
        Some(Self::new(
            local.hour() as u8,
            local.weekday().num_days_from_sunday() as u8,
        ))
    }

    #[must_use]
    pub fn now() -> Self {
        let local = Local::now();
        Self::new(local.hour() as u8, local.weekday().num_days_from_sunday() as u8)
    }

    #[must_use]
    pub fn is_weekend(&self) -> bool {
        self.day_of_week == 0 || self.day_of_week == 6
    }
}

/// One learning signal. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub track_id: TrackId,
    /// Embedding of the track at the time of the interaction.
    #[serde(default)]
    pub embedding: Embedding,
    pub kind: InteractionKind,
    pub timestamp_ms: i64,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub played_ms: Option<u64>,
    #[serde(default)]
    pub completed: Option<bool>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub artists: Vec<String>,
    #[serde(default)]
    pub context: Option<InteractionContext>,
}

impl InteractionEvent {
    #[must_use]
    pub fn new(track_id: impl Into<TrackId>, kind: InteractionKind, embedding: Embedding, timestamp_ms: i64) -> Self {
        Self {
            track_id: track_id.into(),
            embedding,
            kind,
            timestamp_ms,
            duration_ms: None,
            played_ms: None,
            completed: None,
            genres: Vec::new(),
            artists: Vec::new(),
            context: None,
        }
    }

    #[must_use]
    pub fn with_playback(mut self, played_ms: u64, duration_ms: u64) -> Self {
        self.played_ms = Some(played_ms);
        self.duration_ms = Some(duration_ms);
        self
    }

    #[must_use]
    pub fn with_completed(mut self, completed: bool) -> Self {
        self.completed = Some(completed);
        self
    }

    #[must_use]
    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artists.push(artist.into());
        self
    }

    #[must_use]
    pub fn with_genre(mut self, genre: impl Into<String>) -> Self {
        self.genres.push(genre.into());
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: InteractionContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Fraction of the track that was played, when both figures are known.
    #[must_use]
    pub fn play_ratio(&self) -> Option<f64> {
        match (self.played_ms, self.duration_ms) {
            (Some(played), Some(duration)) if duration > 0 => Some(played as f64 / duration as f64),
            _ => None,
        }
    }

    /// An explicit `completed` flag wins; otherwise ≥80% of the duration played.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed
            .unwrap_or_else(|| self.play_ratio().is_some_and(|r| r >= COMPLETION_THRESHOLD))
    }

    /// A listen abandoned early enough to count as a negative signal.
    #[must_use]
    pub fn is_skip(&self) -> bool {
        self.kind == InteractionKind::Listen
            && self.completed != Some(true)
            && self.play_ratio().is_some_and(|r| r < SKIP_THRESHOLD)
    }

    /// Strong positive signals used as training positives.
    #[must_use]
    pub fn is_positive(&self) -> bool {
        match self.kind {
            InteractionKind::Like | InteractionKind::Download | InteractionKind::PlaylistAdd => true,
            InteractionKind::Listen => self.is_completed(),
        }
    }
}

/// Discriminant of [`UserEvent`], used for filtered subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UserEventKind {
    Play,
    Skip,
    Complete,
    Like,
    Dislike,
    QueueAdd,
    Interaction,
}

/// Notification fanned out to subscribers and plugins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UserEvent {
    Play { track_id: TrackId, timestamp_ms: i64 },
    Skip { track_id: TrackId, played_ms: u64, timestamp_ms: i64 },
    Complete { track_id: TrackId, timestamp_ms: i64 },
    Like { track_id: TrackId, timestamp_ms: i64 },
    Dislike { track_id: TrackId, timestamp_ms: i64 },
    QueueAdd { track_id: TrackId, timestamp_ms: i64 },
    Interaction(InteractionEvent),
}

impl UserEvent {
    #[must_use]
    pub fn kind(&self) -> UserEventKind {
        match self {
            Self::Play { .. } => UserEventKind::Play,
            Self::Skip { .. } => UserEventKind::Skip,
            Self::Complete { .. } => UserEventKind::Complete,
            Self::Like { .. } => UserEventKind::Like,
            Self::Dislike { .. } => UserEventKind::Dislike,
            Self::QueueAdd { .. } => UserEventKind::QueueAdd,
            Self::Interaction(_) => UserEventKind::Interaction,
        }
    }

    #[must_use]
    pub fn track_id(&self) -> &TrackId {
        match self {
            Self::Play { track_id, .. }
            | Self::Skip { track_id, .. }
            | Self::Complete { track_id, .. }
            | Self::Like { track_id, .. }
            | Self::Dislike { track_id, .. }
            | Self::QueueAdd { track_id, .. } => track_id,
            Self::Interaction(event) => &event.track_id,
        }
    }
}

/// Subscriber callback. Errors are logged and isolated.
pub type EventCallback = Arc<dyn Fn(&UserEvent) -> anyhow::Result<()> + Send + Sync>;

struct Listener {
    id: u64,
    filter: Option<UserEventKind>,
    callback: EventCallback,
}

type ListenerList = Mutex<Vec<Listener>>;

/// Lock a listener list, recovering it if a previous holder panicked.
///
/// Listener entries are only pushed or removed under the lock, so a
/// poisoned list is still consistent.
pub(crate) fn lock_listeners<T>(list: &Mutex<T>) -> MutexGuard<'_, T> {
    list.lock().unwrap_or_else(|poisoned| {
        warn!("Recovering poisoned listener list");
        PoisonError::into_inner(poisoned)
    })
}

/// Handle returned by every subscription.
#[must_use = "keep the handle to be able to unsubscribe"]
pub struct Subscription {
    detach: Box<dyn FnOnce() -> bool + Send + Sync>,
}

impl Subscription {
    pub(crate) fn new(detach: impl FnOnce() -> bool + Send + Sync + 'static) -> Self {
        Self {
            detach: Box::new(detach),
        }
    }

    /// Handle for a listener list of `(id, _)` entries; removal is by id.
    pub(crate) fn for_list<T: Send + 'static>(list: &Arc<Mutex<Vec<T>>>, id: u64, id_of: fn(&T) -> u64) -> Self {
        let weak = Arc::downgrade(list);
        Self::new(move || {
            let Some(list) = weak.upgrade() else {
                return false;
            };
            let mut guard = lock_listeners(&*list);
            let before = guard.len();
            guard.retain(|entry| id_of(entry) != id);
            guard.len() != before
        })
    }

    /// Remove the callback. Returns false if the owner is gone or it was already removed.
    pub fn unsubscribe(self) -> bool {
        (self.detach)()
    }
}

/// Fan-out of [`UserEvent`]s to subscribed callbacks.
#[derive(Default)]
pub struct EventBus {
    listeners: Arc<ListenerList>,
    next_id: AtomicU64,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribe(&self, filter: Option<UserEventKind>, callback: EventCallback) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock_listeners(&*self.listeners).push(Listener { id, filter, callback });
        Subscription::for_list(&self.listeners, id, |l: &Listener| l.id)
    }

    /// Receive every user event.
    pub fn on_user_event<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&UserEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(None, Arc::new(callback))
    }

    /// Receive only events of `kind`.
    pub fn on<F>(&self, kind: UserEventKind, callback: F) -> Subscription
    where
        F: Fn(&UserEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(Some(kind), Arc::new(callback))
    }

    /// Deliver `event`. Returns how many callbacks failed.
    pub fn emit(&self, event: &UserEvent) -> usize {
        // Snapshot so callbacks may subscribe/unsubscribe without deadlocking.
        let targets: Vec<EventCallback> = lock_listeners(&*self.listeners)
            .iter()
            .filter(|l| l.filter.map_or(true, |k| k == event.kind()))
            .map(|l| Arc::clone(&l.callback))
            .collect();

        trace!("Emitting {:?} to {} listeners", event.kind(), targets.len());
        let mut failures = 0;
        for callback in &targets {
            if let Err(e) = callback(event) {
                warn!("Event listener failed on {:?}: {e:#}", event.kind());
                failures += 1;
            }
        }
        failures
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        lock_listeners(&*self.listeners).len()
    }
}
