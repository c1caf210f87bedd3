//! Algorithm plugin contract and the built-in taste algorithm.
//!
//! A plugin must score a single track and rank a candidate list. Everything
//! else is optional and advertised through [`Capability`] flags in its
//! [`AlgorithmManifest`]; callers check the flag before dispatching and fall
//! back to the required methods otherwise.

use crate::error::EngineError;
use crate::events::{InteractionContext, UserEvent};
use crate::features::FeatureProvider;
use crate::preferences::TrackStats;
use crate::storage::{AlgorithmStorage, KeyValueStore, ModelArtifacts};
use crate::track::{sort_by_score_desc, Embedding, RadioSeed, ScoredTrack, Track};
use crate::training::{TrainingDataset, TrainingOutcome, TrainingSample, TrainingStatus};
use crate::vector;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Optional behaviour a plugin may advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    ScoreBatch,
    Train,
    GenerateRadio,
    FindSimilar,
    UserEvents,
    TrainingStatus,
}

impl Capability {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ScoreBatch => "score-batch",
            Self::Train => "train",
            Self::GenerateRadio => "generate-radio",
            Self::FindSimilar => "find-similar",
            Self::UserEvents => "user-events",
            Self::TrainingStatus => "training-status",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorithmManifest {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
}

impl AlgorithmManifest {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            description: String::new(),
            capabilities: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_capability(mut self, capability: Capability) -> Self {
        if !self.capabilities.contains(&capability) {
            self.capabilities.push(capability);
        }
        self
    }

    #[must_use]
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Per-request state shared by every candidate being scored.
#[derive(Debug, Clone)]
pub struct ScoringContext {
    /// Contextual taste blend, or an exploration vector while the profile is invalid.
    pub query_vector: Option<Embedding>,
    pub profile_valid: bool,
    pub interaction: InteractionContext,
    pub session_artists: HashSet<String>,
    pub now_ms: i64,
}

impl ScoringContext {
    #[must_use]
    pub fn new(interaction: InteractionContext, now_ms: i64) -> Self {
        Self {
            query_vector: None,
            profile_valid: false,
            interaction,
            session_artists: HashSet::new(),
            now_ms,
        }
    }

    #[must_use]
    pub fn with_query_vector(mut self, query: Option<Embedding>, profile_valid: bool) -> Self {
        self.query_vector = query;
        self.profile_valid = profile_valid;
        self
    }
}

/// A track plus everything the engine knows about it.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringCandidate {
    pub track: Track,
    pub embedding: Option<Embedding>,
    pub stats: TrackStats,
    pub disliked: bool,
}

impl ScoringCandidate {
    #[must_use]
    pub fn new(track: Track) -> Self {
        Self {
            track,
            embedding: None,
            stats: TrackStats::default(),
            disliked: false,
        }
    }

    #[must_use]
    pub fn with_embedding(mut self, embedding: Option<Embedding>) -> Self {
        self.embedding = embedding.filter(|e| !e.is_empty());
        self
    }

    #[must_use]
    pub fn with_stats(mut self, stats: TrackStats) -> Self {
        self.stats = stats;
        self
    }

    #[must_use]
    pub fn with_disliked(mut self, disliked: bool) -> Self {
        self.disliked = disliked;
        self
    }
}

/// Handles a plugin receives when it is initialized.
#[derive(Clone)]
pub struct AlgorithmContext {
    pub storage: AlgorithmStorage,
    pub artifacts: ModelArtifacts,
}

impl AlgorithmContext {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, algorithm_id: &str) -> Self {
        Self {
            storage: AlgorithmStorage::new(Arc::clone(&store), algorithm_id),
            artifacts: ModelArtifacts::new(store, algorithm_id),
        }
    }
}

fn unsupported(manifest: &AlgorithmManifest, capability: Capability) -> anyhow::Error {
    EngineError::Unsupported {
        id: manifest.id.clone(),
        capability,
    }
    .into()
}

/// Pluggable scoring and ranking strategy.
///
/// Scores are on a 0–100 scale; higher is better.
pub trait Algorithm: Send {
    fn manifest(&self) -> &AlgorithmManifest;

    /// # Errors
    ///
    /// Returns an error if the plugin cannot restore its state.
    fn initialize(&mut self, _ctx: AlgorithmContext) -> Result<()> {
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the plugin cannot release its resources.
    fn dispose(&mut self) -> Result<()> {
        Ok(())
    }

    /// Providers registered with the feature aggregator while the plugin is registered.
    fn feature_providers(&self) -> Vec<Arc<dyn FeatureProvider>> {
        Vec::new()
    }

    /// # Errors
    ///
    /// Returns an error if the plugin fails to score.
    fn score_track(&mut self, candidate: &ScoringCandidate, ctx: &ScoringContext) -> Result<f64>;

    /// Order `candidates` best first.
    ///
    /// # Errors
    ///
    /// Returns an error if the plugin fails to rank.
    fn rank_candidates(&mut self, candidates: &[ScoringCandidate], ctx: &ScoringContext) -> Result<Vec<ScoredTrack>>;

    /// Requires [`Capability::ScoreBatch`].
    ///
    /// # Errors
    ///
    /// Returns an error if unsupported or if scoring fails.
    fn score_batch(&mut self, _candidates: &[ScoringCandidate], _ctx: &ScoringContext) -> Result<Vec<f64>> {
        Err(unsupported(self.manifest(), Capability::ScoreBatch))
    }

    /// Requires [`Capability::Train`].
    ///
    /// # Errors
    ///
    /// Returns an error if unsupported or if training fails.
    fn train(&mut self, _data: &TrainingDataset) -> Result<TrainingOutcome> {
        Err(unsupported(self.manifest(), Capability::Train))
    }

    /// Requires [`Capability::GenerateRadio`].
    ///
    /// # Errors
    ///
    /// Returns an error if unsupported or if generation fails.
    fn generate_radio(&mut self, _seed: &RadioSeed, _ctx: &ScoringContext, _limit: usize) -> Result<Vec<ScoredTrack>> {
        Err(unsupported(self.manifest(), Capability::GenerateRadio))
    }

    /// Requires [`Capability::FindSimilar`].
    ///
    /// # Errors
    ///
    /// Returns an error if unsupported or if the lookup fails.
    fn find_similar(&mut self, _track: &Track, _ctx: &ScoringContext, _limit: usize) -> Result<Vec<ScoredTrack>> {
        Err(unsupported(self.manifest(), Capability::FindSimilar))
    }

    /// Requires [`Capability::UserEvents`].
    ///
    /// # Errors
    ///
    /// Returns an error if unsupported or if the plugin rejects the event.
    fn on_user_event(&mut self, _event: &UserEvent) -> Result<()> {
        Err(unsupported(self.manifest(), Capability::UserEvents))
    }

    /// Requires [`Capability::TrainingStatus`].
    ///
    /// # Errors
    ///
    /// Returns an error if unsupported.
    fn training_status(&self) -> Result<TrainingStatus> {
        Err(unsupported(self.manifest(), Capability::TrainingStatus))
    }
}

/// Play-history weighting for [`TasteAlgorithm`].
///
/// Young tracks (fewer than `touch_threshold` plays) use phase weights that
/// favour listens early on and punish skips once the listener has had time to
/// form an opinion. Established tracks are log-dampened so a long history does
/// not dominate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffinityWeights {
    /// (listen weight, skip weight) below `small_threshold` touches.
    pub early: (u8, u8),
    /// Up to and including `big_threshold` touches.
    pub learning: (u8, u8),
    pub stable: (u8, u8),
    pub small_threshold: u32,
    pub big_threshold: u32,
    pub touch_threshold: u32,
    pub dampening_base: f64,
    /// Loved tracks close this share of the gap to full affinity.
    pub love_multiplier: f64,
    /// Raw score that maps to ~76% affinity.
    pub saturation: f64,
}

impl Default for AffinityWeights {
    fn default() -> Self {
        Self {
            early: (4, 1),
            learning: (2, 2),
            stable: (1, 4),
            small_threshold: 5,
            big_threshold: 15,
            touch_threshold: 30,
            dampening_base: 1.2,
            love_multiplier: 2.0,
            saturation: 10.0,
        }
    }
}

impl AffinityWeights {
    const fn phase(&self, touches: u32) -> (u8, u8) {
        match touches {
            t if t < self.small_threshold => self.early,
            t if t <= self.big_threshold => self.learning,
            _ => self.stable,
        }
    }

    /// Signed history score; zero for an unplayed track.
    #[must_use]
    pub fn raw_score(&self, stats: &TrackStats) -> f64 {
        let listens = f64::from(stats.listens);
        let skips = f64::from(stats.skips);
        if stats.touches < self.touch_threshold {
            let (listen_w, skip_w) = self.phase(stats.touches);
            f64::from(listen_w) * listens - f64::from(skip_w) * skips
        } else {
            f64::from(stats.touches + 1).log(self.dampening_base) * (listens - skips)
        }
    }

    /// History affinity in `[0, 1]`; 0.5 means no opinion.
    #[must_use]
    pub fn affinity(&self, stats: &TrackStats) -> f64 {
        let raw = self.raw_score(stats);
        let base = 0.5 + 0.5 * (raw / self.saturation.max(f64::EPSILON)).tanh();
        if stats.loved && self.love_multiplier > 1.0 {
            1.0 - (1.0 - base) / self.love_multiplier
        } else {
            base
        }
    }
}

pub const TASTE_ALGORITHM_ID: &str = "taste-similarity";

const EVENTS_SEEN_KEY: &str = "events_seen";
const MODEL_KEY: &str = "preference-direction";

/// Built-in plugin: contextual taste similarity blended with play history.
///
/// ```text
/// score = 100 × (taste_weight × similarity + (1 − taste_weight) × affinity)
/// ```
///
/// `similarity` is the cosine against the query vector mapped to `[0, 1]`
/// (0.5 when either side is missing). Once trained, a learned preference
/// direction contributes `model_weight` of the similarity term. Disliked tracks
/// always score 0.
pub struct TasteAlgorithm {
    manifest: AlgorithmManifest,
    pub weights: AffinityWeights,
    pub taste_weight: f64,
    pub model_weight: f64,
    model: Option<Embedding>,
    model_version: u32,
    events_seen: u64,
    ctx: Option<AlgorithmContext>,
}

impl Default for TasteAlgorithm {
    fn default() -> Self {
        Self::new()
    }
}

impl TasteAlgorithm {
    #[must_use]
    pub fn new() -> Self {
        let manifest = AlgorithmManifest::new(TASTE_ALGORITHM_ID, "Taste similarity", env!("CARGO_PKG_VERSION"))
            .with_description("Contextual taste-vector similarity blended with play-history affinity")
            .with_capability(Capability::ScoreBatch)
            .with_capability(Capability::Train)
            .with_capability(Capability::UserEvents)
            .with_capability(Capability::TrainingStatus);
        Self {
            manifest,
            weights: AffinityWeights::default(),
            taste_weight: 0.7,
            model_weight: 0.2,
            model: None,
            model_version: 0,
            events_seen: 0,
            ctx: None,
        }
    }

    #[must_use]
    pub fn events_seen(&self) -> u64 {
        self.events_seen
    }

    #[must_use]
    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    fn similarity(&self, candidate: &ScoringCandidate, ctx: &ScoringContext) -> f64 {
        let Some(embedding) = candidate.embedding.as_deref() else {
            return 0.5;
        };
        let to_unit = |cos: f32| (f64::from(cos) + 1.0) / 2.0;

        let taste = ctx
            .query_vector
            .as_deref()
            .map_or(0.5, |query| to_unit(vector::cosine_similarity(query, embedding)));

        match self.model.as_deref() {
            Some(direction) if direction.len() == embedding.len() => {
                let learned = to_unit(vector::cosine_similarity(direction, embedding));
                (1.0 - self.model_weight) * taste + self.model_weight * learned
            }
            _ => taste,
        }
    }

    fn score(&self, candidate: &ScoringCandidate, ctx: &ScoringContext) -> f64 {
        if candidate.disliked {
            return 0.0;
        }
        let similarity = self.similarity(candidate, ctx);
        let affinity = self.weights.affinity(&candidate.stats);
        let blended = self.taste_weight * similarity + (1.0 - self.taste_weight) * affinity;
        (blended * 100.0).clamp(0.0, 100.0)
    }

    fn persist_model(&self) {
        let (Some(ctx), Some(model)) = (&self.ctx, &self.model) else {
            return;
        };
        let bytes: Vec<u8> = model.iter().flat_map(|x| x.to_le_bytes()).collect();
        if let Err(e) = ctx.artifacts.save(MODEL_KEY, &bytes) {
            warn!("Failed to persist taste model: {e:#}");
        }
        if let Err(e) = ctx.storage.set("model_version", &self.model_version) {
            warn!("Failed to persist taste model version: {e:#}");
        }
    }
}

fn centroid(samples: &[TrainingSample]) -> Option<Embedding> {
    let dim = samples.iter().map(|s| s.embedding.len()).find(|&len| len > 0)?;
    let mut sum = vec![0.0_f32; dim];
    let mut total = 0.0_f32;
    for sample in samples.iter().filter(|s| s.embedding.len() == dim) {
        vector::add_scaled(&mut sum, &sample.embedding, sample.weight);
        total += sample.weight;
    }
    (total > 0.0).then(|| sum.iter().map(|x| x / total).collect())
}

fn decode_model(bytes: &[u8]) -> Result<Embedding> {
    if bytes.len() % 4 != 0 {
        anyhow::bail!("model blob has {} bytes, not a multiple of 4", bytes.len());
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

impl Algorithm for TasteAlgorithm {
    fn manifest(&self) -> &AlgorithmManifest {
        &self.manifest
    }

    fn initialize(&mut self, ctx: AlgorithmContext) -> Result<()> {
        self.events_seen = ctx.storage.get(EVENTS_SEEN_KEY).unwrap_or(0);
        self.model_version = ctx.storage.get("model_version").unwrap_or(0);
        if let Some(bytes) = ctx.artifacts.load(MODEL_KEY).context("Failed to load taste model")? {
            self.model = Some(decode_model(&bytes)?);
            debug!("Restored taste model v{}", self.model_version);
        }
        self.ctx = Some(ctx);
        Ok(())
    }

    fn dispose(&mut self) -> Result<()> {
        if let Some(ctx) = &self.ctx {
            ctx.storage
                .set(EVENTS_SEEN_KEY, &self.events_seen)
                .context("Failed to persist event count")?;
        }
        self.ctx = None;
        Ok(())
    }

    fn score_track(&mut self, candidate: &ScoringCandidate, ctx: &ScoringContext) -> Result<f64> {
        Ok(self.score(candidate, ctx))
    }

    fn rank_candidates(&mut self, candidates: &[ScoringCandidate], ctx: &ScoringContext) -> Result<Vec<ScoredTrack>> {
        let mut ranked: Vec<ScoredTrack> = candidates
            .iter()
            .map(|c| ScoredTrack::new(c.track.clone(), self.score(c, ctx)))
            .collect();
        sort_by_score_desc(&mut ranked);
        Ok(ranked)
    }

    fn score_batch(&mut self, candidates: &[ScoringCandidate], ctx: &ScoringContext) -> Result<Vec<f64>> {
        Ok(candidates.iter().map(|c| self.score(c, ctx)).collect())
    }

    /// Learns a preference direction: weighted positive centroid minus
    /// weighted negative centroid, unit-normalized.
    fn train(&mut self, data: &TrainingDataset) -> Result<TrainingOutcome> {
        let positive = centroid(&data.positives).context("No positive samples with embeddings")?;
        let direction = match centroid(&data.negatives) {
            Some(negative) if negative.len() == positive.len() => {
                positive.iter().zip(&negative).map(|(p, n)| p - n).collect()
            }
            _ => positive,
        };
        let direction = vector::normalized(&direction).context("Positive and negative samples cancel out")?;

        self.model = Some(direction);
        self.model_version += 1;
        self.persist_model();
        info!("Trained taste model v{} on {} samples", self.model_version, data.len());

        Ok(TrainingOutcome {
            version: format!("v{}", self.model_version),
            samples_used: data.len(),
            loss: None,
        })
    }

    fn on_user_event(&mut self, _event: &UserEvent) -> Result<()> {
        self.events_seen += 1;
        Ok(())
    }

    fn training_status(&self) -> Result<TrainingStatus> {
        Ok(TrainingStatus {
            is_training: false,
            progress: None,
            model_version: (self.model_version > 0).then(|| format!("v{}", self.model_version)),
            message: Some(format!("{} user events observed", self.events_seen)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::training::SampleSource;

    fn candidate(id: &str, embedding: Vec<f32>) -> ScoringCandidate {
        ScoringCandidate::new(Track::new(id, "artist")).with_embedding(Some(embedding))
    }

    fn context(query: Vec<f32>) -> ScoringContext {
        ScoringContext::new(InteractionContext::new(12, 3), 0).with_query_vector(Some(query), true)
    }

    fn sample(id: &str, embedding: Vec<f32>, source: SampleSource) -> TrainingSample {
        TrainingSample {
            track_id: id.into(),
            embedding,
            label: if source.is_positive() { 1.0 } else { 0.0 },
            weight: source.weight(),
            source,
            timestamp_ms: 0,
        }
    }

    #[test]
    fn test_affinity_phases() {
        let weights = AffinityWeights::default();
        let empty = TrackStats::default();
        assert!((weights.affinity(&empty) - 0.5).abs() < 1e-9, "Unplayed track is neutral");

        let liked = TrackStats { touches: 10, listens: 8, skips: 2, ..TrackStats::default() };
        let skipped = TrackStats { touches: 10, listens: 1, skips: 9, ..TrackStats::default() };
        assert!(weights.affinity(&liked) > 0.5);
        assert!(weights.affinity(&skipped) < 0.5);

        let established = TrackStats { touches: 1000, listens: 0, skips: 1000, ..TrackStats::default() };
        let affinity = weights.affinity(&established);
        assert!(affinity.is_finite() && affinity >= 0.0, "Affinity stays bounded");
    }

    #[test]
    fn test_loved_never_lowers_affinity() {
        let weights = AffinityWeights::default();
        for stats in [
            TrackStats::default(),
            TrackStats { touches: 3, listens: 0, skips: 3, ..TrackStats::default() },
            TrackStats { touches: 40, listens: 30, skips: 10, ..TrackStats::default() },
        ] {
            let loved = TrackStats { loved: true, ..stats };
            assert!(weights.affinity(&loved) >= weights.affinity(&stats));
        }
    }

    #[test]
    fn test_score_prefers_similar_tracks_and_zeroes_dislikes() {
        let mut algo = TasteAlgorithm::new();
        let ctx = context(vec![1.0, 0.0]);
        let close = algo.score_track(&candidate("close", vec![1.0, 0.1]), &ctx).expect("Score");
        let far = algo.score_track(&candidate("far", vec![-1.0, 0.0]), &ctx).expect("Score");
        assert!(close > far);
        assert!((0.0..=100.0).contains(&close));

        let disliked = candidate("close", vec![1.0, 0.1]).with_disliked(true);
        assert_eq!(algo.score_track(&disliked, &ctx).expect("Score"), 0.0);
    }

    #[test]
    fn test_rank_and_batch_agree() {
        let mut algo = TasteAlgorithm::new();
        let ctx = context(vec![0.0, 1.0]);
        let candidates = vec![
            candidate("a", vec![1.0, 0.0]),
            candidate("b", vec![0.0, 1.0]),
            candidate("c", vec![0.5, 0.5]),
        ];
        let ranked = algo.rank_candidates(&candidates, &ctx).expect("Rank");
        let ids: Vec<&str> = ranked.iter().map(|s| s.track.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);

        let batch = algo.score_batch(&candidates, &ctx).expect("Batch");
        assert_eq!(batch.len(), 3);
        assert!((batch[1] - ranked[0].score).abs() < 1e-9);
    }

    #[test]
    fn test_unsupported_capability_is_reported() {
        struct Minimal(AlgorithmManifest);
        impl Algorithm for Minimal {
            fn manifest(&self) -> &AlgorithmManifest {
                &self.0
            }
            fn score_track(&mut self, _: &ScoringCandidate, _: &ScoringContext) -> Result<f64> {
                Ok(1.0)
            }
            fn rank_candidates(&mut self, _: &[ScoringCandidate], _: &ScoringContext) -> Result<Vec<ScoredTrack>> {
                Ok(Vec::new())
            }
        }

        let mut minimal = Minimal(AlgorithmManifest::new("min", "Minimal", "1"));
        let err = minimal.train(&TrainingDataset::default()).expect_err("Train is unsupported");
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::Unsupported { capability: Capability::Train, .. })
        ));
        assert!(!minimal.manifest().supports(Capability::Train));
    }

    #[test]
    fn test_training_persists_and_restores_model() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut algo = TasteAlgorithm::new();
        algo.initialize(AlgorithmContext::new(Arc::clone(&store), TASTE_ALGORITHM_ID))
            .expect("Initialize");

        let data = TrainingDataset {
            positives: vec![sample("p", vec![1.0, 0.0], SampleSource::Like)],
            negatives: vec![sample("n", vec![0.0, 1.0], SampleSource::Dislike)],
        };
        let outcome = algo.train(&data).expect("Train");
        assert_eq!(outcome.version, "v1");
        assert_eq!(outcome.samples_used, 2);

        let mut restored = TasteAlgorithm::new();
        restored
            .initialize(AlgorithmContext::new(store, TASTE_ALGORITHM_ID))
            .expect("Initialize");
        assert!(restored.has_model());
        let status = restored.training_status().expect("Status");
        assert_eq!(status.model_version.as_deref(), Some("v1"));
    }

    #[test]
    fn test_train_without_embeddings_fails() {
        let mut algo = TasteAlgorithm::new();
        let data = TrainingDataset {
            positives: vec![sample("p", vec![], SampleSource::Like)],
            negatives: Vec::new(),
        };
        assert!(algo.train(&data).is_err());
        assert!(!algo.has_model());
    }

    #[test]
    fn test_event_count_survives_dispose() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut algo = TasteAlgorithm::new();
        algo.initialize(AlgorithmContext::new(Arc::clone(&store), TASTE_ALGORITHM_ID))
            .expect("Initialize");
        let event = UserEvent::Like {
            track_id: "t".into(),
            timestamp_ms: 0,
        };
        algo.on_user_event(&event).expect("Event");
        algo.on_user_event(&event).expect("Event");
        algo.dispose().expect("Dispose");

        let mut restored = TasteAlgorithm::new();
        restored
            .initialize(AlgorithmContext::new(store, TASTE_ALGORITHM_ID))
            .expect("Initialize");
        assert_eq!(restored.events_seen(), 2);
    }
}
