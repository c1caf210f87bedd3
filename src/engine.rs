//! # Engine
//!
//! Owns every component and exposes the request surface the player talks to.
//! There is no global instance: build one with [`EngineBuilder`] at the
//! composition root and pass it around.
//!
//! ## Personalization Gate
//!
//! While the taste profile has fewer interactions than the configured
//! minimum, the engine behaves as for a new listener: replenishment draws
//! from `discovery`, `trending` and `library`, and algorithms score against an
//! exploration vector instead of the contextual taste blend.
//!
//! ## Failure Policy
//!
//! Only a missing or unknown algorithm is a hard error. Provider and
//! persistence failures are logged and degrade to empty results or
//! in-memory state.

use crate::algorithm::{Algorithm, Capability, ScoringCandidate, ScoringContext, TasteAlgorithm};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::events::{EventBus, InteractionContext, InteractionEvent, InteractionKind, Subscription, UserEvent};
use crate::features::{FeatureAggregator, FeatureProvider};
use crate::preferences::{DislikeRecord, PreferenceStore};
use crate::queue::{CandidateContext, CandidateProvider, CandidateSource, QueuePosition, SmartQueueManager};
use crate::registry::{AlgorithmRegistry, BulkReport};
use crate::scoring::{ScoreCache, ScoreEntry};
use crate::storage::{KeyValueStore, MemoryStore};
use crate::taste::TasteProfileEngine;
use crate::track::{sort_by_score_desc, RadioSeed, ScoredTrack, Track, TrackId};
use crate::training::{self, TrainingCoordinator, TrainingOutcome, TrainingScheduler, TrainingStatus};
use crate::vector;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;

/// Source of "now" in epoch milliseconds.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Candidate sources consulted, in order, once the profile is valid.
pub const PERSONALIZED_SOURCES: [CandidateSource; 5] = [
    CandidateSource::Similar,
    CandidateSource::Liked,
    CandidateSource::Library,
    CandidateSource::Discovery,
    CandidateSource::Trending,
];

fn system_clock() -> Clock {
    Arc::new(|| chrono::Utc::now().timestamp_millis())
}

pub struct EngineBuilder {
    config: EngineConfig,
    store: Option<Arc<dyn KeyValueStore>>,
    clock: Option<Clock>,
    seed: Option<u64>,
    builtin: bool,
    algorithms: Vec<Box<dyn Algorithm>>,
    feature_providers: Vec<Arc<dyn FeatureProvider>>,
    sources: Vec<(CandidateSource, Arc<dyn CandidateProvider>)>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            store: None,
            clock: None,
            seed: None,
            builtin: true,
            algorithms: Vec::new(),
            feature_providers: Vec::new(),
            sources: Vec::new(),
        }
    }

    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Persistence backend; an in-memory store when unset.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Seed for exploration noise, for reproducible runs.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Skip registering [`TasteAlgorithm`].
    #[must_use]
    pub fn without_builtin_algorithm(mut self) -> Self {
        self.builtin = false;
        self
    }

    #[must_use]
    pub fn algorithm(mut self, algorithm: Box<dyn Algorithm>) -> Self {
        self.algorithms.push(algorithm);
        self
    }

    #[must_use]
    pub fn feature_provider(mut self, provider: Arc<dyn FeatureProvider>) -> Self {
        self.feature_providers.push(provider);
        self
    }

    #[must_use]
    pub fn source(mut self, source: CandidateSource, provider: Arc<dyn CandidateProvider>) -> Self {
        self.sources.push((source, provider));
        self
    }

    /// Assemble the engine, restoring persisted state from the store.
    #[must_use]
    pub fn build(self) -> Engine {
        let config = self.config;
        let store: Arc<dyn KeyValueStore> = self.store.unwrap_or_else(|| Arc::new(MemoryStore::new()));

        let preferences = PreferenceStore::load(store.as_ref(), config.taste.max_interactions, config.max_listen_records);
        let mut taste = TasteProfileEngine::new(config.taste.clone());
        for event in preferences.interactions() {
            taste.add_interaction(event.clone());
        }

        let mut queue = SmartQueueManager::new(config.queue.clone());
        if queue.restore_config(store.as_ref(), &config.queue) {
            debug!("Restored queue config from the store");
        }
        for (source, provider) in self.sources {
            queue.bind_source(source, provider);
        }

        let mut features = FeatureAggregator::new(config.feature_cache_capacity);
        for provider in self.feature_providers {
            features.register_provider(provider);
        }

        let mut training = TrainingCoordinator::new(TrainingScheduler::new(
            config.training.interval_ms,
            config.training.min_new_samples,
        ));
        training.load(store.as_ref());

        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut engine = Engine {
            scores: ScoreCache::new(config.score_cache_capacity),
            config,
            store,
            clock: self.clock.unwrap_or_else(system_clock),
            rng,
            preferences,
            taste,
            queue,
            features,
            registry: AlgorithmRegistry::new(),
            events: EventBus::new(),
            training,
            disposed: false,
        };

        let mut algorithms = self.algorithms;
        if self.builtin {
            algorithms.insert(0, Box::new(TasteAlgorithm::new()));
        }
        for algorithm in algorithms {
            if let Err(e) = engine.register_algorithm(algorithm) {
                warn!("{e}");
            }
        }

        if let Some(id) = engine.config.default_algorithm.clone() {
            if engine.registry.contains(&id) {
                if let Err(e) = engine.registry.set_active(&id) {
                    warn!("{e}");
                }
            } else {
                warn!("Default algorithm `{id}` is not registered");
            }
        }

        info!(
            "Engine ready: {} algorithms, {} interactions, active `{}`",
            engine.registry.len(),
            engine.preferences.interaction_count(),
            engine.registry.active_id().unwrap_or("none")
        );
        engine
    }
}

/// Recommendation and queue engine.
pub struct Engine {
    config: EngineConfig,
    store: Arc<dyn KeyValueStore>,
    clock: Clock,
    rng: StdRng,
    preferences: PreferenceStore,
    taste: TasteProfileEngine,
    queue: SmartQueueManager,
    features: FeatureAggregator,
    registry: AlgorithmRegistry,
    scores: ScoreCache,
    events: EventBus,
    training: TrainingCoordinator,
    disposed: bool,
}

impl Engine {
    #[must_use]
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    #[must_use]
    pub fn now_ms(&self) -> i64 {
        (self.clock)()
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    #[must_use]
    pub fn preferences(&self) -> &PreferenceStore {
        &self.preferences
    }

    #[must_use]
    pub fn taste(&self) -> &TasteProfileEngine {
        &self.taste
    }

    pub fn taste_mut(&mut self) -> &mut TasteProfileEngine {
        &mut self.taste
    }

    #[must_use]
    pub fn queue(&self) -> &SmartQueueManager {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut SmartQueueManager {
        &mut self.queue
    }

    pub fn features_mut(&mut self) -> &mut FeatureAggregator {
        &mut self.features
    }

    #[must_use]
    pub fn registry(&self) -> &AlgorithmRegistry {
        &self.registry
    }

    #[must_use]
    pub fn scores(&self) -> &ScoreCache {
        &self.scores
    }

    #[must_use]
    pub fn training(&self) -> &TrainingCoordinator {
        &self.training
    }

    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Subscribe to every user event.
    pub fn on_user_event<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&UserEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.events.on_user_event(callback)
    }

    /// Subscribe to new-training-data notifications.
    pub fn on_new_training_data<F>(&self, callback: F) -> Subscription
    where
        F: Fn(usize) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.training.on_new_data(callback)
    }

    fn emit(&mut self, event: &UserEvent) {
        self.events.emit(event);
        self.registry.dispatch_user_event(event);
    }

    // ---------------------------------------------------------------------
    // Interactions
    // ---------------------------------------------------------------------

    /// Record one learning signal, filling in the embedding and context when missing.
    pub fn record_interaction(&mut self, mut event: InteractionEvent) {
        if event.embedding.is_empty() {
            if let Some(embedding) = self.features.get_embedding(&event.track_id) {
                event.embedding = embedding;
            }
        }
        if event.context.is_none() {
            event.context = InteractionContext::from_timestamp_ms(event.timestamp_ms);
        }

        let new_samples = usize::from(event.is_positive() || event.is_skip());
        self.preferences.record_interaction(&event);
        self.taste.add_interaction(event.clone());
        self.training.notify_new_data(new_samples);
        self.emit(&UserEvent::Interaction(event));
    }

    fn event_for(&self, track: &Track, kind: InteractionKind) -> InteractionEvent {
        let mut event = InteractionEvent::new(track.id.clone(), kind, Vec::new(), self.now_ms()).with_artist(&track.artist_id);
        if let Some(genre) = &track.genre {
            event = event.with_genre(genre);
        }
        event
    }

    /// A playback that ended after `played_ms` of `duration_ms`.
    pub fn record_listen(&mut self, track: &Track, played_ms: u64, duration_ms: u64) {
        let event = self.event_for(track, InteractionKind::Listen).with_playback(played_ms, duration_ms);
        let timestamp_ms = event.timestamp_ms;
        let follow_up = if event.is_completed() {
            UserEvent::Complete {
                track_id: track.id.clone(),
                timestamp_ms,
            }
        } else {
            UserEvent::Skip {
                track_id: track.id.clone(),
                played_ms,
                timestamp_ms,
            }
        };
        self.record_interaction(event);
        self.emit(&follow_up);
    }

    pub fn like(&mut self, track: &Track) {
        let event = self.event_for(track, InteractionKind::Like);
        let timestamp_ms = event.timestamp_ms;
        self.record_interaction(event);
        self.emit(&UserEvent::Like {
            track_id: track.id.clone(),
            timestamp_ms,
        });
    }

    /// Mark `track` as disliked and drop it from the queue.
    pub fn dislike(&mut self, track: &Track) {
        let timestamp_ms = self.now_ms();
        let embedding = self.features.get_embedding(&track.id).unwrap_or_default();
        self.preferences.dislike(DislikeRecord {
            track_id: track.id.clone(),
            embedding,
            artist: Some(track.artist_id.clone()),
            timestamp_ms,
        });
        self.queue.remove_from_queue(&track.id);
        self.training.notify_new_data(1);
        self.emit(&UserEvent::Dislike {
            track_id: track.id.clone(),
            timestamp_ms,
        });
    }

    // ---------------------------------------------------------------------
    // Scoring
    // ---------------------------------------------------------------------

    fn active_id(&self) -> Result<String> {
        self.registry
            .active_id()
            .map(str::to_string)
            .ok_or(EngineError::NoActiveAlgorithm)
    }

    /// Query vector for this moment: the contextual taste blend, or an
    /// exploration vector while the profile is not valid.
    #[must_use = "the context is only useful for scoring"]
    pub fn scoring_context(&mut self) -> ScoringContext {
        let now_ms = self.now_ms();
        let interaction = InteractionContext::from_timestamp_ms(now_ms).unwrap_or_else(InteractionContext::now);
        let valid = self.taste.get_profile_at(now_ms).is_some();
        let query = if valid {
            self.taste.contextual_vector(interaction)
        } else {
            self.taste.exploration_vector(&mut self.rng)
        };

        let mut ctx = ScoringContext::new(interaction, now_ms).with_query_vector(query, valid);
        ctx.session_artists = self.queue.session_artists().clone();
        ctx
    }

    fn candidate(&mut self, track: Track) -> ScoringCandidate {
        let embedding = self.features.get_embedding(&track.id);
        let stats = self.preferences.stats_for(&track.id);
        let disliked = self.preferences.is_disliked(&track.id);
        ScoringCandidate::new(track)
            .with_embedding(embedding)
            .with_stats(stats)
            .with_disliked(disliked)
    }

    fn candidates_for(&mut self, tracks: Vec<Track>) -> Vec<ScoringCandidate> {
        let ids: Vec<TrackId> = tracks.iter().map(|t| t.id.clone()).collect();
        self.features.prefetch(&ids);
        tracks.into_iter().map(|t| self.candidate(t)).collect()
    }

    /// Score one track with the active algorithm and cache the result.
    ///
    /// # Errors
    ///
    /// [`EngineError::NoActiveAlgorithm`] when nothing is active, or
    /// [`EngineError::Plugin`] if the algorithm fails.
    pub fn score_track(&mut self, track: &Track) -> Result<f64> {
        let id = self.active_id()?;
        let ctx = self.scoring_context();
        let candidate = self.candidate(track.clone());
        let plugin = self.registry.active_mut().ok_or(EngineError::NoActiveAlgorithm)?;
        let score = plugin
            .score_track(&candidate, &ctx)
            .map_err(|e| EngineError::plugin(&id, &e))?;
        self.scores.submit_score(&id, &track.id, score, ctx.now_ms);
        Ok(score)
    }

    /// Score many tracks, in input order, using batch scoring when the
    /// active algorithm supports it.
    ///
    /// # Errors
    ///
    /// As [`Self::score_track`].
    pub fn score_tracks(&mut self, tracks: &[Track]) -> Result<Vec<ScoredTrack>> {
        let id = self.active_id()?;
        let ctx = self.scoring_context();
        let candidates = self.candidates_for(tracks.to_vec());
        let batch = self.registry.active_supports(Capability::ScoreBatch);
        let plugin = self.registry.active_mut().ok_or(EngineError::NoActiveAlgorithm)?;

        let scores = if batch {
            let scores = plugin
                .score_batch(&candidates, &ctx)
                .map_err(|e| EngineError::plugin(&id, &e))?;
            if scores.len() != candidates.len() {
                return Err(EngineError::Plugin {
                    id,
                    reason: format!("returned {} scores for {} tracks", scores.len(), candidates.len()),
                });
            }
            scores
        } else {
            candidates
                .iter()
                .map(|c| plugin.score_track(c, &ctx))
                .collect::<anyhow::Result<Vec<f64>>>()
                .map_err(|e| EngineError::plugin(&id, &e))?
        };

        let scored: Vec<ScoredTrack> = candidates
            .into_iter()
            .zip(scores)
            .map(|(c, score)| ScoredTrack::new(c.track, score))
            .collect();
        self.cache_scores(&id, &scored, ctx.now_ms);
        Ok(scored)
    }

    /// Rank `tracks` best first with the active algorithm.
    ///
    /// # Errors
    ///
    /// As [`Self::score_track`].
    pub fn rank(&mut self, tracks: Vec<Track>) -> Result<Vec<ScoredTrack>> {
        let id = self.active_id()?;
        let ctx = self.scoring_context();
        self.rank_with(&id, tracks, &ctx)
    }

    fn rank_with(&mut self, id: &str, tracks: Vec<Track>, ctx: &ScoringContext) -> Result<Vec<ScoredTrack>> {
        if tracks.is_empty() {
            return Ok(Vec::new());
        }
        let candidates = self.candidates_for(tracks);
        let plugin = self.registry.active_mut().ok_or(EngineError::NoActiveAlgorithm)?;
        let ranked = plugin
            .rank_candidates(&candidates, ctx)
            .map_err(|e| EngineError::plugin(id, &e))?;
        self.cache_scores(id, &ranked, ctx.now_ms);
        Ok(ranked)
    }

    fn cache_scores(&mut self, id: &str, scored: &[ScoredTrack], now_ms: i64) {
        let batch: Vec<(TrackId, f64)> = scored.iter().map(|s| (s.track.id.clone(), s.score)).collect();
        self.scores.submit_batch_scores(id, &batch, now_ms);
    }

    /// The active algorithm's cached score for `track`.
    pub fn final_score(&mut self, track: &TrackId) -> Option<f64> {
        let active = self.registry.active_id().map(str::to_string);
        self.scores.get_final_score(track, active.as_deref())
    }

    /// Cached scores from the other registered algorithms.
    #[must_use]
    pub fn other_scores(&self, track: &TrackId) -> Vec<(String, ScoreEntry)> {
        self.scores.get_other_algorithm_scores(track, self.registry.active_id())
    }

    // ---------------------------------------------------------------------
    // Queue
    // ---------------------------------------------------------------------

    #[must_use]
    pub fn candidates(&self, ctx: &CandidateContext) -> Vec<Track> {
        self.queue.get_candidates(ctx)
    }

    pub fn add_to_queue(&mut self, track: Track, position: QueuePosition) {
        let track_id = track.id.clone();
        self.queue.add_to_queue(track, position);
        let timestamp_ms = self.now_ms();
        self.emit(&UserEvent::QueueAdd { track_id, timestamp_ms });
    }

    /// Sources for the next replenishment, depending on the personalization gate.
    #[must_use]
    pub fn replenish_sources(&self) -> Vec<CandidateSource> {
        if self.taste.is_profile_valid() {
            PERSONALIZED_SOURCES.to_vec()
        } else {
            CandidateSource::EXPLORATION.to_vec()
        }
    }

    /// Fetch, rank and enqueue new tracks. Returns what was added.
    ///
    /// # Errors
    ///
    /// [`EngineError::NoActiveAlgorithm`] or a ranking failure. Empty or
    /// failing sources are not errors; the queue simply stays short.
    pub fn replenish(&mut self) -> Result<Vec<Track>> {
        let id = self.active_id()?;
        self.queue.set_replenishing(true);
        let outcome = self.replenish_with(&id);
        self.queue.set_replenishing(false);
        outcome
    }

    fn replenish_with(&mut self, id: &str) -> Result<Vec<Track>> {
        let mut request = CandidateContext::new(self.replenish_sources(), self.queue.config().replenish_count);
        let reference = self
            .queue
            .session_history()
            .last()
            .or_else(|| self.queue.current_queue().last())
            .cloned();
        if let Some(track) = reference {
            request = request.with_seed_track(track);
        }
        request = request.excluding(self.preferences.disliked().map(|d| d.track_id.clone()));

        let candidates = self.queue.get_candidates(&request);
        if candidates.is_empty() {
            info!("Replenishment found no new candidates");
            return Ok(Vec::new());
        }

        let ctx = self.scoring_context();
        let ranked = self.rank_with(id, candidates, &ctx)?;
        let added = self.queue.submit_ranking(&ranked);
        info!("Replenished queue with {} tracks via `{id}`", added.len());

        for track in &added {
            self.emit(&UserEvent::QueueAdd {
                track_id: track.id.clone(),
                timestamp_ms: ctx.now_ms,
            });
        }
        Ok(added)
    }

    /// Advance the queue. In auto mode a short queue is replenished; failures are logged.
    pub fn pop_next(&mut self) -> Option<Track> {
        let track = self.queue.pop_next();
        if let Some(track) = &track {
            let timestamp_ms = self.now_ms();
            self.emit(&UserEvent::Play {
                track_id: track.id.clone(),
                timestamp_ms,
            });
        }
        if self.queue.should_auto_replenish() {
            if let Err(e) = self.replenish() {
                warn!("Auto-replenish failed: {e}");
            }
        }
        track
    }

    // ---------------------------------------------------------------------
    // Discovery
    // ---------------------------------------------------------------------

    /// Radio station for `seed`: the algorithm's own generator when it has
    /// one, otherwise the `radio` source ranked by the active algorithm.
    ///
    /// # Errors
    ///
    /// [`EngineError::NoActiveAlgorithm`] or an algorithm failure.
    pub fn generate_radio(&mut self, seed: &RadioSeed, limit: usize) -> Result<Vec<ScoredTrack>> {
        let id = self.active_id()?;
        let ctx = self.scoring_context();

        if self.registry.active_supports(Capability::GenerateRadio) {
            let plugin = self.registry.active_mut().ok_or(EngineError::NoActiveAlgorithm)?;
            let mut station = plugin
                .generate_radio(seed, &ctx, limit)
                .map_err(|e| EngineError::plugin(&id, &e))?;
            station.truncate(limit);
            self.cache_scores(&id, &station, ctx.now_ms);
            return Ok(station);
        }

        debug!("`{id}` has no radio generator; ranking the radio source");
        let request = CandidateContext::new([CandidateSource::Radio], limit).with_seed(seed.clone());
        let candidates = self.queue.get_candidates(&request);
        let mut station = self.rank_with(&id, candidates, &ctx)?;
        station.truncate(limit);
        Ok(station)
    }

    /// Tracks similar to `track`.
    ///
    /// Falls back to ranking the `similar` source, and when that is empty, to
    /// library tracks ordered by embedding similarity.
    ///
    /// # Errors
    ///
    /// [`EngineError::NoActiveAlgorithm`] or an algorithm failure.
    pub fn find_similar(&mut self, track: &Track, limit: usize) -> Result<Vec<ScoredTrack>> {
        let id = self.active_id()?;
        let ctx = self.scoring_context();

        if self.registry.active_supports(Capability::FindSimilar) {
            let plugin = self.registry.active_mut().ok_or(EngineError::NoActiveAlgorithm)?;
            let mut similar = plugin
                .find_similar(track, &ctx, limit)
                .map_err(|e| EngineError::plugin(&id, &e))?;
            similar.truncate(limit);
            self.cache_scores(&id, &similar, ctx.now_ms);
            return Ok(similar);
        }

        let request = CandidateContext::new([CandidateSource::Similar], limit)
            .with_seed_track(track.clone())
            .excluding([track.id.clone()]);
        let candidates = self.queue.get_candidates(&request);
        if !candidates.is_empty() {
            let mut similar = self.rank_with(&id, candidates, &ctx)?;
            similar.truncate(limit);
            return Ok(similar);
        }

        let Some(reference) = self.features.get_embedding(&track.id) else {
            debug!("No similar source and no embedding for {}", track.id);
            return Ok(Vec::new());
        };
        let request = CandidateContext::new([CandidateSource::Library], limit.saturating_mul(4).max(limit))
            .excluding([track.id.clone()]);
        let library = self.queue.get_candidates(&request);
        let candidates = self.candidates_for(library);

        let mut similar: Vec<ScoredTrack> = candidates
            .into_iter()
            .filter_map(|c| {
                let embedding = c.embedding?;
                let cos = f64::from(vector::cosine_similarity(&reference, &embedding));
                Some(ScoredTrack::new(c.track, (cos + 1.0) * 50.0))
            })
            .collect();
        sort_by_score_desc(&mut similar);
        similar.truncate(limit);
        Ok(similar)
    }

    // ---------------------------------------------------------------------
    // Training
    // ---------------------------------------------------------------------

    /// Train the active algorithm on the current dataset.
    ///
    /// # Errors
    ///
    /// [`EngineError::NoActiveAlgorithm`], [`EngineError::Unsupported`] if the
    /// algorithm cannot train, [`EngineError::TrainingInProgress`], or
    /// [`EngineError::Plugin`] if training fails.
    pub fn train_now(&mut self) -> Result<TrainingOutcome> {
        let id = self.active_id()?;
        if !self.registry.active_supports(Capability::Train) {
            return Err(EngineError::Unsupported {
                id,
                capability: Capability::Train,
            });
        }

        self.training.scheduler.begin()?;
        let dataset = training::full_dataset(&self.preferences, &self.config.training.dataset);
        let outcome = match self.registry.active_mut() {
            Some(plugin) => plugin.train(&dataset).map_err(|e| EngineError::plugin(&id, &e)),
            None => Err(EngineError::NoActiveAlgorithm),
        };
        let now_ms = self.now_ms();
        self.training.scheduler.finish(now_ms);

        let outcome = outcome?;
        self.training
            .mark_training_complete(&id, &outcome.version, outcome.samples_used, now_ms, self.store.as_ref());
        info!("Trained `{id}` to {} on {} samples", outcome.version, outcome.samples_used);
        Ok(outcome)
    }

    /// Periodic entry point: trains when auto-training is on and a run is due.
    pub fn tick(&mut self) -> Option<TrainingOutcome> {
        if !self.config.training.auto_train || !self.registry.active_supports(Capability::Train) {
            return None;
        }
        if !self
            .training
            .scheduler
            .is_due(self.now_ms(), self.training.pending_samples())
        {
            return None;
        }
        match self.train_now() {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!("Scheduled training failed: {e}");
                None
            }
        }
    }

    /// The active algorithm's own status, or one derived from the scheduler.
    #[must_use]
    pub fn training_status(&self) -> TrainingStatus {
        let from_plugin = self
            .registry
            .active_id()
            .and_then(|id| self.registry.get(id))
            .filter(|plugin| plugin.manifest().supports(Capability::TrainingStatus))
            .and_then(|plugin| plugin.training_status().ok());

        from_plugin.unwrap_or_else(|| TrainingStatus {
            is_training: self.training.scheduler.is_training(),
            progress: None,
            model_version: self.training.last_training_info().map(|info| info.version.clone()),
            message: None,
        })
    }

    // ---------------------------------------------------------------------
    // Registry
    // ---------------------------------------------------------------------

    /// Register and initialize `algorithm`, wiring its feature providers.
    ///
    /// # Errors
    ///
    /// [`EngineError::Plugin`] if initialization fails; the plugin stays
    /// registered in the failed state.
    pub fn register_algorithm(&mut self, algorithm: Box<dyn Algorithm>) -> Result<()> {
        let id = algorithm.manifest().id.clone();
        if let Some(previous) = self.registry.get(&id) {
            for provider in previous.feature_providers() {
                self.features.unregister_provider(provider.id());
            }
            self.scores.purge_algorithm(&id);
        }

        let providers = algorithm.feature_providers();
        self.registry.register(algorithm);
        for provider in providers {
            self.features.register_provider(provider);
        }
        self.registry.initialize(&id, &self.store)
    }

    /// # Errors
    ///
    /// [`EngineError::AlgorithmNotFound`] for unknown ids.
    pub fn unregister_algorithm(&mut self, id: &str) -> Result<()> {
        let plugin = self.registry.unregister(id)?;
        for provider in plugin.feature_providers() {
            self.features.unregister_provider(provider.id());
        }
        self.scores.purge_algorithm(id);
        Ok(())
    }

    /// # Errors
    ///
    /// [`EngineError::AlgorithmNotFound`] for unknown ids.
    pub fn set_active_algorithm(&mut self, id: &str) -> Result<()> {
        self.registry.set_active(id)
    }

    pub fn clear_active_algorithm(&mut self) {
        self.registry.clear_active();
    }

    // ---------------------------------------------------------------------
    // Persistence and lifecycle
    // ---------------------------------------------------------------------

    /// Serialized interaction log.
    ///
    /// # Errors
    ///
    /// [`EngineError::Persistence`] if serialization fails.
    pub fn export_profile(&self) -> Result<String> {
        self.taste
            .export()
            .map_err(|e| EngineError::Persistence(format!("{e:#}")))
    }

    /// Replace the interaction history with an export. Preference counters
    /// are rebuilt from the imported log. Dislikes are not part of the log
    /// and carry over unchanged.
    ///
    /// # Errors
    ///
    /// [`EngineError::Persistence`] for malformed input; nothing changes.
    pub fn import_profile(&mut self, json: &str) -> Result<usize> {
        let count = self
            .taste
            .import(json)
            .map_err(|e| EngineError::Persistence(format!("{e:#}")))?;
        let disliked: Vec<DislikeRecord> = self.preferences.disliked().cloned().collect();
        self.preferences.clear();
        for event in self.taste.interactions() {
            self.preferences.record_interaction(event);
        }
        for record in disliked {
            self.preferences.dislike(record);
        }
        debug!("Rebuilt preferences from {count} imported interactions");
        Ok(count)
    }

    /// Forget every interaction, like and dislike.
    pub fn clear_profile(&mut self) {
        self.taste.clear();
        self.preferences.clear();
        info!("Cleared taste profile and preferences");
    }

    /// Persist preferences and queue config. Best effort.
    pub fn save(&self) -> bool {
        let prefs = self.preferences.save(self.store.as_ref());
        let queue = self.queue.save_config_with_base(self.store.as_ref(), &self.config.queue);
        prefs && queue
    }

    /// Dispose plugins, persist state and end the session. Idempotent.
    pub fn dispose(&mut self) -> BulkReport {
        if self.disposed {
            return BulkReport::default();
        }
        let report = self.registry.dispose_all();
        if !self.save() {
            warn!("Some engine state could not be saved");
        }
        self.queue.reset_session();
        self.disposed = true;
        info!("Engine disposed");
        report
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}
