//! # Smart Queue Manager
//!
//! Owns the play queue, the session history and the set of artists heard this
//! session, and decides when and how the queue is topped up.
//!
//! ## Replenishment
//!
//! 1. [`SmartQueueManager::get_candidates`] asks the bound candidate sources,
//!    in caller order, for tracks not already queued, played this session or
//!    explicitly excluded.
//! 2. The active algorithm ranks them (outside this module).
//! 3. [`SmartQueueManager::submit_ranking`] walks the ranking with a
//!    per-artist cap and appends what survives.
//!
//! ## States
//!
//! `Idle` (empty) → `Playing` → `Replenishing` (remaining ≤ threshold) →
//! `Playing`. Manual mode never replenishes automatically, but
//! [`SmartQueueManager::needs_replenishment`] still reports a short queue.

use crate::error::EngineError;
use crate::storage::{load_json, save_json_logged, KeyValueStore};
use crate::track::{RadioSeed, ScoredTrack, Track, TrackId};
use anyhow::Result;
use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

pub const QUEUE_CONFIG_KEY: &str = "cadence.queue.config";

/// The file configuration the stored queue config was saved against.
pub const QUEUE_CONFIG_BASE_KEY: &str = "cadence.queue.config.base";

/// Session history keeps at most this many tracks.
pub const MAX_SESSION_HISTORY: usize = 200;

/// Upper bound on what a single source is asked for.
pub const MAX_CANDIDATES_PER_SOURCE: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueMode {
    #[default]
    Auto,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub mode: QueueMode,
    /// Replenish once this many tracks (or fewer) remain.
    pub replenish_threshold: usize,
    pub replenish_count: usize,
    pub max_same_artist: usize,
    pub allow_explicit: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            mode: QueueMode::Auto,
            replenish_threshold: 3,
            replenish_count: 10,
            max_same_artist: 2,
            allow_explicit: true,
        }
    }
}

/// Named origin of prospective next tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateSource {
    Library,
    Liked,
    Similar,
    Discovery,
    Trending,
    Radio,
}

impl CandidateSource {
    pub const ALL: [Self; 6] = [
        Self::Library,
        Self::Liked,
        Self::Similar,
        Self::Discovery,
        Self::Trending,
        Self::Radio,
    ];

    /// Sources used while the taste profile is still too thin to personalize.
    pub const EXPLORATION: [Self; 3] = [Self::Discovery, Self::Trending, Self::Library];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Library => "library",
            Self::Liked => "liked",
            Self::Similar => "similar",
            Self::Discovery => "discovery",
            Self::Trending => "trending",
            Self::Radio => "radio",
        }
    }
}

impl fmt::Display for CandidateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a source is asked for.
#[derive(Debug, Clone, Copy)]
pub struct SourceRequest<'a> {
    pub limit: usize,
    pub seed: Option<&'a RadioSeed>,
    /// Reference track for `similar`.
    pub seed_track: Option<&'a Track>,
    /// Ids the manager will discard anyway; providers may use it to skip work.
    pub exclude: &'a HashSet<TrackId>,
}

/// Supplies candidate tracks for one [`CandidateSource`].
///
/// Calls may block. A provider that times out must return an error, which
/// yields zero candidates for that source only.
pub trait CandidateProvider: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the source cannot be queried.
    fn fetch(&self, request: &SourceRequest<'_>) -> Result<Vec<Track>>;
}

impl<F> CandidateProvider for F
where
    F: Fn(&SourceRequest<'_>) -> Result<Vec<Track>> + Send + Sync,
{
    fn fetch(&self, request: &SourceRequest<'_>) -> Result<Vec<Track>> {
        self(request)
    }
}

/// Wrap a closure as a shared provider.
pub fn provider_fn<F>(f: F) -> Arc<dyn CandidateProvider>
where
    F: Fn(&SourceRequest<'_>) -> Result<Vec<Track>> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Parameters of one candidate request.
#[derive(Debug, Clone, Default)]
pub struct CandidateContext {
    pub sources: Vec<CandidateSource>,
    pub count: usize,
    pub exclude: HashSet<TrackId>,
    pub seed: Option<RadioSeed>,
    pub seed_track: Option<Track>,
}

impl CandidateContext {
    #[must_use]
    pub fn new(sources: impl IntoIterator<Item = CandidateSource>, count: usize) -> Self {
        Self {
            sources: sources.into_iter().collect(),
            count,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_seed(mut self, seed: RadioSeed) -> Self {
        self.seed = Some(seed);
        self
    }

    #[must_use]
    pub fn with_seed_track(mut self, track: Track) -> Self {
        self.seed_track = Some(track);
        self
    }

    #[must_use]
    pub fn excluding(mut self, ids: impl IntoIterator<Item = TrackId>) -> Self {
        self.exclude.extend(ids);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePosition {
    /// Play right after the current track.
    Next,
    Last,
    /// Zero-based; past the end appends.
    Index(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueState {
    Idle,
    Playing,
    Replenishing,
}

pub struct SmartQueueManager {
    config: QueueConfig,
    queue: VecDeque<Track>,
    history: VecDeque<Track>,
    session_artists: HashSet<String>,
    providers: HashMap<CandidateSource, Arc<dyn CandidateProvider>>,
    replenishing: bool,
}

impl Default for SmartQueueManager {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

impl SmartQueueManager {
    #[must_use]
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            queue: VecDeque::new(),
            history: VecDeque::new(),
            session_artists: HashSet::new(),
            providers: HashMap::new(),
            replenishing: false,
        }
    }

    /// Bind `provider` to `source`, replacing any previous binding.
    pub fn bind_source(&mut self, source: CandidateSource, provider: Arc<dyn CandidateProvider>) {
        if self.providers.insert(source, provider).is_some() {
            debug!("Rebound candidate source `{source}`");
        }
    }

    pub fn unbind_source(&mut self, source: CandidateSource) -> bool {
        self.providers.remove(&source).is_some()
    }

    #[must_use]
    pub fn is_bound(&self, source: CandidateSource) -> bool {
        self.providers.contains_key(&source)
    }

    #[must_use]
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: QueueConfig) {
        self.config = config;
    }

    /// Load the persisted configuration, merged over defaults.
    ///
    /// A missing or corrupt entry leaves the defaults in place.
    pub fn load_config(&mut self, store: &dyn KeyValueStore) -> &QueueConfig {
        self.config = load_json(store, QUEUE_CONFIG_KEY).unwrap_or_default();
        &self.config
    }

    /// Best effort; failures are logged.
    pub fn save_config(&self, store: &dyn KeyValueStore) -> bool {
        save_json_logged(store, QUEUE_CONFIG_KEY, &self.config)
    }

    /// Restore a stored configuration only if it was saved against `base`.
    ///
    /// Once the configuration file changes, its values replace whatever the
    /// store holds. Returns true if the stored configuration was applied.
    pub fn restore_config(&mut self, store: &dyn KeyValueStore, base: &QueueConfig) -> bool {
        let saved_base: Option<QueueConfig> = load_json(store, QUEUE_CONFIG_BASE_KEY);
        if saved_base.as_ref() != Some(base) {
            if saved_base.is_some() {
                info!("Queue settings changed in the config file; stored queue config discarded");
            }
            self.config = base.clone();
            return false;
        }
        match load_json(store, QUEUE_CONFIG_KEY) {
            Some(saved) => {
                self.config = saved;
                true
            }
            None => {
                self.config = base.clone();
                false
            }
        }
    }

    /// Save the configuration together with the file `base` it derives from.
    pub fn save_config_with_base(&self, store: &dyn KeyValueStore, base: &QueueConfig) -> bool {
        let saved = self.save_config(store);
        save_json_logged(store, QUEUE_CONFIG_BASE_KEY, base) && saved
    }

    /// Insert `track`, first removing any existing occurrence.
    pub fn add_to_queue(&mut self, track: Track, position: QueuePosition) {
        self.remove_from_queue(&track.id);
        trace!("Queueing {} at {position:?}", track.id);
        match position {
            QueuePosition::Next => self.queue.push_front(track),
            QueuePosition::Last => self.queue.push_back(track),
            QueuePosition::Index(i) if i >= self.queue.len() => self.queue.push_back(track),
            QueuePosition::Index(i) => self.queue.insert(i, track),
        }
    }

    pub fn remove_from_queue(&mut self, id: &TrackId) -> bool {
        let before = self.queue.len();
        self.queue.retain(|t| &t.id != id);
        self.queue.len() != before
    }

    pub fn clear_queue(&mut self) {
        self.queue.clear();
    }

    #[must_use]
    pub fn peek_next(&self) -> Option<&Track> {
        self.queue.front()
    }

    /// Take the head of the queue and record it as played.
    pub fn pop_next(&mut self) -> Option<Track> {
        let track = self.queue.pop_front()?;
        self.push_history(track.clone());
        Some(track)
    }

    /// Record a track that was played outside the queue.
    pub fn record_played(&mut self, track: Track) {
        self.remove_from_queue(&track.id);
        self.push_history(track);
    }

    fn push_history(&mut self, track: Track) {
        self.session_artists.insert(track.artist_id.clone());
        self.history.push_back(track);
        while self.history.len() > MAX_SESSION_HISTORY {
            self.history.pop_front();
        }
    }

    /// Forget the queue, history and session artists. Bindings and config stay.
    pub fn reset_session(&mut self) {
        self.queue.clear();
        self.history.clear();
        self.session_artists.clear();
        self.replenishing = false;
        info!("Queue session reset");
    }

    pub fn current_queue(&self) -> impl ExactSizeIterator<Item = &Track> {
        self.queue.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Oldest first.
    pub fn session_history(&self) -> impl ExactSizeIterator<Item = &Track> {
        self.history.iter()
    }

    #[must_use]
    pub fn session_artists(&self) -> &HashSet<String> {
        &self.session_artists
    }

    #[must_use]
    pub fn is_in_queue(&self, id: &TrackId) -> bool {
        self.queue.iter().any(|t| &t.id == id)
    }

    #[must_use]
    pub fn was_played_in_session(&self, id: &TrackId) -> bool {
        self.history.iter().any(|t| &t.id == id)
    }

    #[must_use]
    pub fn state(&self) -> QueueState {
        if self.replenishing {
            QueueState::Replenishing
        } else if self.queue.is_empty() {
            QueueState::Idle
        } else {
            QueueState::Playing
        }
    }

    pub(crate) fn set_replenishing(&mut self, replenishing: bool) {
        self.replenishing = replenishing;
    }

    /// Whether the queue is at or below the threshold, regardless of mode.
    #[must_use]
    pub fn needs_replenishment(&self) -> bool {
        self.queue.len() <= self.config.replenish_threshold
    }

    #[must_use]
    pub fn should_auto_replenish(&self) -> bool {
        self.config.mode == QueueMode::Auto && self.needs_replenishment()
    }

    fn exclusion_set(&self, extra: &HashSet<TrackId>) -> HashSet<TrackId> {
        let mut seen = extra.clone();
        seen.extend(self.queue.iter().map(|t| t.id.clone()));
        seen.extend(self.history.iter().map(|t| t.id.clone()));
        seen
    }

    fn fetch_from(&self, source: CandidateSource, request: &SourceRequest<'_>) -> Vec<Track> {
        let Some(provider) = self.providers.get(&source) else {
            warn!("Candidate source `{source}` has no provider bound");
            return Vec::new();
        };
        if source == CandidateSource::Radio && request.seed.is_none() {
            warn!("Candidate source `radio` needs a seed; skipping");
            return Vec::new();
        }

        match provider.fetch(request) {
            Ok(tracks) => tracks,
            Err(e) => {
                let err = EngineError::ProviderUnavailable {
                    source_name: source.to_string(),
                    reason: format!("{e:#}"),
                };
                warn!("{err}");
                Vec::new()
            }
        }
    }

    /// Unseen candidates from the requested sources, at most `ctx.count`.
    ///
    /// Never returns an id that is queued, in the session history, in
    /// `ctx.exclude` or already returned by an earlier source.
    #[must_use]
    pub fn get_candidates(&self, ctx: &CandidateContext) -> Vec<Track> {
        let mut seen = self.exclusion_set(&ctx.exclude);
        let mut candidates = Vec::with_capacity(ctx.count);
        if ctx.count == 0 {
            return candidates;
        }

        for &source in &ctx.sources {
            let request = SourceRequest {
                limit: ctx.count.min(MAX_CANDIDATES_PER_SOURCE),
                seed: ctx.seed.as_ref(),
                seed_track: ctx.seed_track.as_ref(),
                exclude: &seen,
            };
            let fetched = self.fetch_from(source, &request);
            let offered = fetched.len();

            let mut kept = 0;
            for track in fetched {
                if !self.config.allow_explicit && track.explicit {
                    continue;
                }
                if seen.insert(track.id.clone()) {
                    candidates.push(track);
                    kept += 1;
                }
            }
            debug!("Source `{source}` offered {offered} tracks, {kept} unseen");

            if candidates.len() >= ctx.count {
                break;
            }
        }

        candidates.truncate(ctx.count);
        candidates
    }

    /// Append ranked tracks, best first, with at most `max_same_artist` per
    /// artist in this batch. Tracks already queued or played this session are
    /// skipped whatever the ranking says. Returns what was enqueued.
    pub fn submit_ranking(&mut self, ranked: &[ScoredTrack]) -> Vec<Track> {
        let mut per_artist: HashMap<&str, usize> = HashMap::new();
        let mut accepted_ids: HashSet<&TrackId> = HashSet::new();
        let mut accepted = Vec::new();

        for scored in ranked {
            let track = &scored.track;
            if self.was_played_in_session(&track.id) {
                trace!("Ranking returned already played {}", track.id);
                continue;
            }
            if self.is_in_queue(&track.id) || !accepted_ids.insert(&track.id) {
                continue;
            }
            let count = per_artist.entry(track.artist_id.as_str()).or_insert(0);
            if *count >= self.config.max_same_artist {
                trace!("Diversity cap skipped {}", track.id);
                continue;
            }
            *count += 1;
            accepted.push(track.clone());
        }

        self.queue.extend(accepted.iter().cloned());
        debug!("Enqueued {} of {} ranked tracks", accepted.len(), ranked.len());
        accepted
    }
}
