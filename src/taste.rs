//! # Taste Profile Engine
//!
//! Turns the interaction log into a unit-length **taste vector** plus six
//! **contextual vectors** (four time-of-day slots, weekday and weekend).
//!
//! ## Weighting
//!
//! ```text
//! weight(e) = base(kind)                       like 3.0 > download 2.5 > playlist-add 2.0 > listen 1.0
//!           × completed_multiplier if listen   1.5 when ≥80% played (or flagged completed)
//!           × 0.5 ^ (days_since / half_life)   half-life 30 days, future timestamps count as now
//!           × recency_gain
//! ```
//!
//! The taste vector is `unit(Σ weight·embedding / Σ weight)`. Contextual
//! buckets accumulate the same weights, but only for events that carry an
//! hour/weekday context; a bucket that received no weight is absent rather
//! than zero.
//!
//! ## Validity
//!
//! Personalization is gated on a minimum number of interactions (default 5).
//! Below it, [`TasteProfileEngine::get_profile`] returns `None`, similarity is
//! the neutral 0.5, and callers route to exploration instead.
//!
//! ## Memoization
//!
//! The profile is fully recomputed on the first request after any change to
//! the interaction log and then served from cache. There is no incremental
//! update.

use crate::events::{InteractionContext, InteractionEvent, InteractionKind};
use crate::track::Embedding;
use crate::vector;
use anyhow::{Context, Result};
use log::{debug, info, trace};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

const MS_PER_DAY: f64 = 86_400_000.0;

/// Neutral similarity reported while the profile is not valid.
pub const NEUTRAL_SIMILARITY: f32 = 0.5;

const EXPORT_VERSION: u32 = 1;

/// Tunable parameters of the taste model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TasteConfig {
    /// Fixed embedding dimension; inferred from the first embedding when unset.
    pub dimension: Option<usize>,
    pub min_interactions: usize,
    pub max_interactions: usize,
    pub like_weight: f32,
    pub download_weight: f32,
    pub playlist_add_weight: f32,
    pub listen_weight: f32,
    pub completed_multiplier: f32,
    pub half_life_days: f64,
    pub recency_gain: f32,
    /// Share of the taste vector in the exploration vector; the rest is noise.
    pub exploration_taste_ratio: f32,
    /// Default share of the mood vector in a mood blend.
    pub mood_ratio: f32,
}

impl Default for TasteConfig {
    fn default() -> Self {
        Self {
            dimension: None,
            min_interactions: 5,
            max_interactions: 1_000,
            like_weight: 3.0,
            download_weight: 2.5,
            playlist_add_weight: 2.0,
            listen_weight: 1.0,
            completed_multiplier: 1.5,
            half_life_days: 30.0,
            recency_gain: 1.0,
            exploration_taste_ratio: 0.3,
            mood_ratio: 0.6,
        }
    }
}

/// Time-of-day slot used by the contextual vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeSlot {
    /// 05:00–11:59
    Morning,
    /// 12:00–16:59
    Afternoon,
    /// 17:00–20:59
    Evening,
    /// 21:00–04:59
    Night,
}

impl TimeSlot {
    #[must_use]
    pub fn from_hour(hour: u8) -> Self {
        match hour {
            5..=11 => Self::Morning,
            12..=16 => Self::Afternoon,
            17..=20 => Self::Evening,
            _ => Self::Night,
        }
    }
}

/// Contextual sub-vectors; each is unit length or absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextualVectors {
    pub morning: Option<Embedding>,
    pub afternoon: Option<Embedding>,
    pub evening: Option<Embedding>,
    pub night: Option<Embedding>,
    pub weekday: Option<Embedding>,
    pub weekend: Option<Embedding>,
}

impl ContextualVectors {
    #[must_use]
    pub fn slot(&self, slot: TimeSlot) -> Option<&Embedding> {
        match slot {
            TimeSlot::Morning => self.morning.as_ref(),
            TimeSlot::Afternoon => self.afternoon.as_ref(),
            TimeSlot::Evening => self.evening.as_ref(),
            TimeSlot::Night => self.night.as_ref(),
        }
    }

    #[must_use]
    pub fn day(&self, weekend: bool) -> Option<&Embedding> {
        if weekend {
            self.weekend.as_ref()
        } else {
            self.weekday.as_ref()
        }
    }

    #[must_use]
    pub fn present_count(&self) -> usize {
        [&self.morning, &self.afternoon, &self.evening, &self.night, &self.weekday, &self.weekend]
            .iter()
            .filter(|v| v.is_some())
            .count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileStats {
    pub interaction_count: usize,
    /// Interactions whose embedding contributed to the vector.
    pub embedded_count: usize,
    pub total_weight: f64,
    pub likes: usize,
    pub listens: usize,
    pub downloads: usize,
    pub playlist_adds: usize,
    pub dimension: usize,
    pub oldest_ms: Option<i64>,
    pub newest_ms: Option<i64>,
    pub generated_at_ms: i64,
}

/// A generated taste profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TasteProfile {
    /// Unit-length aggregate taste.
    pub vector: Embedding,
    pub contextual: ContextualVectors,
    pub stats: ProfileStats,
    /// Weighted genre counts, strongest first.
    pub genres: Vec<(String, f64)>,
    /// Weighted artist counts, strongest first.
    pub artists: Vec<(String, f64)>,
}

#[derive(Serialize, Deserialize)]
struct ProfileExport {
    version: u32,
    interactions: Vec<InteractionEvent>,
}

#[derive(Default)]
struct Bucket {
    sum: Vec<f32>,
    weight: f32,
}

impl Bucket {
    fn new(dim: usize) -> Self {
        Self {
            sum: vec![0.0; dim],
            weight: 0.0,
        }
    }

    fn add(&mut self, embedding: &[f32], weight: f32) {
        vector::add_scaled(&mut self.sum, embedding, weight);
        self.weight += weight;
    }

    fn finish(self) -> Option<Embedding> {
        if self.weight <= 0.0 {
            return None;
        }
        vector::normalized(&self.sum)
    }
}

fn ranked(weights: HashMap<String, f64>) -> Vec<(String, f64)> {
    let mut ranked: Vec<(String, f64)> = weights.into_iter().filter(|(_, w)| *w > 0.0).collect();
    ranked.sort_by(|(a_name, a), (b_name, b)| {
        b.partial_cmp(a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a_name.cmp(b_name))
    });
    ranked
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Builds and caches the taste profile from interaction events.
#[derive(Debug, Clone)]
pub struct TasteProfileEngine {
    config: TasteConfig,
    interactions: VecDeque<InteractionEvent>,
    cached: Option<Arc<TasteProfile>>,
    dirty: bool,
}

impl Default for TasteProfileEngine {
    fn default() -> Self {
        Self::new(TasteConfig::default())
    }
}

impl TasteProfileEngine {
    #[must_use]
    pub fn new(config: TasteConfig) -> Self {
        Self {
            config,
            interactions: VecDeque::new(),
            cached: None,
            dirty: true,
        }
    }

    #[must_use]
    pub fn config(&self) -> &TasteConfig {
        &self.config
    }

    /// Append an interaction, trimming the oldest past capacity, and invalidate the profile.
    pub fn add_interaction(&mut self, event: InteractionEvent) {
        trace!("Taste interaction {:?} on {}", event.kind, event.track_id);
        self.interactions.push_back(event);
        while self.interactions.len() > self.config.max_interactions.max(1) {
            self.interactions.pop_front();
        }
        self.dirty = true;
    }

    #[must_use]
    pub fn interaction_count(&self) -> usize {
        self.interactions.len()
    }

    /// Whether there is enough history to personalize.
    #[must_use]
    pub fn is_profile_valid(&self) -> bool {
        self.interactions.len() >= self.config.min_interactions
    }

    /// Weight of one interaction at `now_ms`.
    #[must_use]
    pub fn interaction_weight(&self, event: &InteractionEvent, now_ms: i64) -> f32 {
        let config = &self.config;
        let base = match event.kind {
            InteractionKind::Like => config.like_weight,
            InteractionKind::Download => config.download_weight,
            InteractionKind::PlaylistAdd => config.playlist_add_weight,
            InteractionKind::Listen if event.is_completed() => config.listen_weight * config.completed_multiplier,
            InteractionKind::Listen => config.listen_weight,
        };

        let days = ((now_ms - event.timestamp_ms).max(0) as f64) / MS_PER_DAY;
        let decay = if config.half_life_days > 0.0 {
            0.5_f64.powf(days / config.half_life_days)
        } else {
            1.0
        };

        base * decay as f32 * config.recency_gain
    }

    fn dimension(&self) -> Option<usize> {
        self.config.dimension.or_else(|| {
            self.interactions
                .iter()
                .map(|e| e.embedding.len())
                .find(|&len| len > 0)
        })
    }

    /// Current profile, regenerated only if the interaction log changed.
    pub fn generate_profile(&mut self) -> Option<Arc<TasteProfile>> {
        self.generate_profile_at(now_ms())
    }

    /// As [`Self::generate_profile`], with recency measured against `now_ms`.
    pub fn generate_profile_at(&mut self, now_ms: i64) -> Option<Arc<TasteProfile>> {
        if !self.dirty {
            return self.cached.clone();
        }
        self.cached = self.compute(now_ms).map(Arc::new);
        self.dirty = false;
        self.cached.clone()
    }

    fn compute(&self, now_ms: i64) -> Option<TasteProfile> {
        let dim = self.dimension()?;
        let mut main = Bucket::new(dim);
        let mut slots: HashMap<TimeSlot, Bucket> = HashMap::new();
        let mut weekday = Bucket::new(dim);
        let mut weekend = Bucket::new(dim);
        let mut genres: HashMap<String, f64> = HashMap::new();
        let mut artists: HashMap<String, f64> = HashMap::new();
        let mut stats = ProfileStats {
            interaction_count: self.interactions.len(),
            dimension: dim,
            generated_at_ms: now_ms,
            ..ProfileStats::default()
        };

        for event in &self.interactions {
            match event.kind {
                InteractionKind::Like => stats.likes += 1,
                InteractionKind::Listen => stats.listens += 1,
                InteractionKind::Download => stats.downloads += 1,
                InteractionKind::PlaylistAdd => stats.playlist_adds += 1,
            }
            stats.oldest_ms = Some(stats.oldest_ms.map_or(event.timestamp_ms, |t| t.min(event.timestamp_ms)));
            stats.newest_ms = Some(stats.newest_ms.map_or(event.timestamp_ms, |t| t.max(event.timestamp_ms)));

            let weight = self.interaction_weight(event, now_ms);
            if weight <= 0.0 {
                continue;
            }
            for genre in &event.genres {
                *genres.entry(genre.clone()).or_insert(0.0) += f64::from(weight);
            }
            for artist in &event.artists {
                *artists.entry(artist.clone()).or_insert(0.0) += f64::from(weight);
            }

            if event.embedding.len() != dim {
                if !event.embedding.is_empty() {
                    debug!(
                        "Skipping {}: embedding has {} dimensions, profile uses {dim}",
                        event.track_id,
                        event.embedding.len()
                    );
                }
                continue;
            }

            main.add(&event.embedding, weight);
            stats.embedded_count += 1;

            if let Some(ctx) = event.context {
                slots
                    .entry(TimeSlot::from_hour(ctx.hour))
                    .or_insert_with(|| Bucket::new(dim))
                    .add(&event.embedding, weight);
                if ctx.is_weekend() {
                    weekend.add(&event.embedding, weight);
                } else {
                    weekday.add(&event.embedding, weight);
                }
            }
        }

        if main.weight <= 0.0 {
            debug!("No weighted embeddings; taste profile undefined");
            return None;
        }
        stats.total_weight = f64::from(main.weight);

        let total = main.weight;
        let mean: Vec<f32> = main.sum.iter().map(|x| x / total).collect();
        let vector = vector::normalized(&mean)?;

        let mut slot_vector = |slot: TimeSlot| slots.remove(&slot).and_then(Bucket::finish);
        let contextual = ContextualVectors {
            morning: slot_vector(TimeSlot::Morning),
            afternoon: slot_vector(TimeSlot::Afternoon),
            evening: slot_vector(TimeSlot::Evening),
            night: slot_vector(TimeSlot::Night),
            weekday: weekday.finish(),
            weekend: weekend.finish(),
        };

        info!(
            "Generated taste profile from {} interactions ({} contextual vectors)",
            stats.embedded_count,
            contextual.present_count()
        );

        Some(TasteProfile {
            vector,
            contextual,
            stats,
            genres: ranked(genres),
            artists: ranked(artists),
        })
    }

    /// The profile, or `None` while there are fewer interactions than the minimum.
    pub fn get_profile(&mut self) -> Option<Arc<TasteProfile>> {
        if !self.is_profile_valid() {
            return None;
        }
        self.generate_profile()
    }

    /// [`Self::get_profile`] with recency measured against `now_ms`.
    pub fn get_profile_at(&mut self, now_ms: i64) -> Option<Arc<TasteProfile>> {
        if !self.is_profile_valid() {
            return None;
        }
        self.generate_profile_at(now_ms)
    }

    /// Taste vector blended with the contextual vectors matching `ctx`:
    /// main 0.5, time slot 0.3, weekday/weekend 0.2, renormalized over the
    /// components that exist.
    pub fn contextual_vector(&mut self, ctx: InteractionContext) -> Option<Embedding> {
        let profile = self.get_profile()?;
        let mut components: Vec<(&[f32], f32)> = vec![(&profile.vector, 0.5)];
        if let Some(slot) = profile.contextual.slot(TimeSlot::from_hour(ctx.hour)) {
            components.push((slot, 0.3));
        }
        if let Some(day) = profile.contextual.day(ctx.is_weekend()) {
            components.push((day, 0.2));
        }
        vector::blend(&components)
    }

    /// Cosine similarity between the taste vector and `embedding`.
    pub fn similarity(&mut self, embedding: &[f32]) -> f32 {
        match self.get_profile() {
            Some(profile) => vector::cosine_similarity(&profile.vector, embedding),
            None => NEUTRAL_SIMILARITY,
        }
    }

    /// Cosine similarity against the contextual blend for `ctx`.
    pub fn contextual_similarity(&mut self, embedding: &[f32], ctx: InteractionContext) -> f32 {
        match self.contextual_vector(ctx) {
            Some(blended) => vector::cosine_similarity(&blended, embedding),
            None => NEUTRAL_SIMILARITY,
        }
    }

    /// Similarity of many candidates at once, optionally against a context blend.
    pub fn score_candidates(&mut self, embeddings: &[Embedding], ctx: Option<InteractionContext>) -> Vec<f32> {
        let query = match ctx {
            Some(ctx) => self.contextual_vector(ctx),
            None => self.get_profile().map(|p| p.vector.clone()),
        };
        match query {
            Some(query) => vector::batch_cosine(&query, embeddings),
            None => vec![NEUTRAL_SIMILARITY; embeddings.len()],
        }
    }

    /// Strongest `n` genres by weighted count.
    pub fn top_genres(&mut self, n: usize) -> Vec<(String, f64)> {
        self.generate_profile()
            .map(|p| p.genres.iter().take(n).cloned().collect())
            .unwrap_or_default()
    }

    /// Strongest `n` artists by weighted count.
    pub fn top_artists(&mut self, n: usize) -> Vec<(String, f64)> {
        self.generate_profile()
            .map(|p| p.artists.iter().take(n).cloned().collect())
            .unwrap_or_default()
    }

    /// Deliberately decorrelated direction for discovery:
    /// `unit(r·taste + (1−r)·unit(noise))` with `r = exploration_taste_ratio`.
    /// Pure noise while the profile is invalid; `None` if no dimension is known.
    pub fn exploration_vector<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<Embedding> {
        let dim = self.dimension()?;
        let noise: Vec<f32> = (0..dim).map(|_| rng.gen_range(-1.0_f32..=1.0)).collect();
        let noise = vector::normalized(&noise)?;

        let ratio = self.config.exploration_taste_ratio.clamp(0.0, 1.0);
        match self.get_profile() {
            Some(profile) => vector::blend(&[(&profile.vector, ratio), (&noise, 1.0 - ratio)]),
            None => Some(noise),
        }
    }

    /// Mix an external mood vector with taste; `mood_ratio` defaults to the
    /// configured share (0.6). Falls back to the pure mood while invalid.
    pub fn mood_blend(&mut self, mood: &[f32], mood_ratio: Option<f32>) -> Option<Embedding> {
        let ratio = mood_ratio.unwrap_or(self.config.mood_ratio).clamp(0.0, 1.0);
        match self.get_profile() {
            Some(profile) if profile.vector.len() == mood.len() => {
                vector::blend(&[(mood, ratio), (&profile.vector, 1.0 - ratio)])
            }
            _ => vector::normalized(mood),
        }
    }

    /// Serialize the raw interaction log; importing it rebuilds the same profile.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn export(&self) -> Result<String> {
        let export = ProfileExport {
            version: EXPORT_VERSION,
            interactions: self.interactions.iter().cloned().collect(),
        };
        serde_json::to_string(&export).context("Failed to serialize taste profile")
    }

    /// Replace the interaction log with an exported one. On error nothing changes.
    ///
    /// # Errors
    ///
    /// Returns an error if `json` is not a valid export.
    pub fn import(&mut self, json: &str) -> Result<usize> {
        let export: ProfileExport = serde_json::from_str(json).context("Invalid taste profile export")?;
        if export.version > EXPORT_VERSION {
            anyhow::bail!("Unsupported taste profile export version {}", export.version);
        }

        self.interactions = export.interactions.into();
        while self.interactions.len() > self.config.max_interactions.max(1) {
            self.interactions.pop_front();
        }
        self.dirty = true;
        info!("Imported {} interactions into taste profile", self.interactions.len());
        Ok(self.interactions.len())
    }

    /// Buffered interactions, oldest first.
    pub fn interactions(&self) -> impl ExactSizeIterator<Item = &InteractionEvent> {
        self.interactions.iter()
    }

    pub fn clear(&mut self) {
        self.interactions.clear();
        self.cached = None;
        self.dirty = true;
    }
}
