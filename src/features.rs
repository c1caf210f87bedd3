//! # Feature Aggregator
//!
//! Resolves per-track feature data (audio descriptors, embeddings, lyrics,
//! emotion) from pluggable [`FeatureProvider`]s and caches the merged result.
//!
//! ## Resolution
//!
//! Providers are consulted from highest to lowest [`FeatureProvider::priority`].
//! The first provider that supplies a field wins it; later providers only fill
//! the fields still missing. Resolution stops early once every field is
//! present. A provider error is logged and treated as "nothing supplied".
//!
//! ## Caching
//!
//! Merged features are kept in a bounded LRU keyed by [`TrackId`]. Entries are
//! only dropped by capacity eviction, [`FeatureAggregator::invalidate_cache`],
//! or when the provider set changes.

use crate::cache::LruCache;
use crate::track::{Embedding, TrackId};
use anyhow::Result;
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Default number of tracks kept in the feature cache.
pub const DEFAULT_FEATURE_CACHE_CAPACITY: usize = 2_000;

/// Low-level audio descriptors.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AudioFeatures {
    pub tempo_bpm: Option<f32>,
    pub energy: f32,
    pub danceability: f32,
    pub valence: f32,
    pub acousticness: f32,
    pub loudness_db: f32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EmotionFeatures {
    /// Negative (0.0) to positive (1.0).
    pub valence: f32,
    /// Calm (0.0) to intense (1.0).
    pub arousal: f32,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Lyrics {
    pub text: String,
    pub language: Option<String>,
    pub synced: bool,
}

/// Everything known about one track. Providers return partially filled values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackFeatures {
    pub audio: Option<AudioFeatures>,
    pub embedding: Option<Embedding>,
    pub lyrics: Option<Lyrics>,
    pub emotion: Option<EmotionFeatures>,
}

impl TrackFeatures {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.audio.is_none() && self.embedding.is_none() && self.lyrics.is_none() && self.emotion.is_none()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.audio.is_some() && self.embedding.is_some() && self.lyrics.is_some() && self.emotion.is_some()
    }

    /// Fill fields still missing in `self` from `other`.
    pub fn merge_missing(&mut self, other: TrackFeatures) {
        if self.audio.is_none() {
            self.audio = other.audio;
        }
        if self.embedding.is_none() {
            self.embedding = other.embedding.filter(|e| !e.is_empty());
        }
        if self.lyrics.is_none() {
            self.lyrics = other.lyrics;
        }
        if self.emotion.is_none() {
            self.emotion = other.emotion;
        }
    }
}

/// A source of per-track feature data.
pub trait FeatureProvider: Send + Sync {
    /// Stable identifier; registering a second provider with the same id replaces the first.
    fn id(&self) -> &str;

    /// Higher priorities are consulted first.
    fn priority(&self) -> i32 {
        0
    }

    /// Return whatever this provider knows about `track`.
    ///
    /// # Errors
    ///
    /// Any error is logged by the aggregator and treated as an empty result.
    fn provide(&self, track: &TrackId) -> Result<TrackFeatures>;
}

/// Merges and caches features from the registered providers.
pub struct FeatureAggregator {
    providers: Vec<Arc<dyn FeatureProvider>>,
    cache: LruCache<TrackId, TrackFeatures>,
}

impl Default for FeatureAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_FEATURE_CACHE_CAPACITY)
    }
}

impl FeatureAggregator {
    #[must_use]
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            providers: Vec::new(),
            cache: LruCache::new(cache_capacity),
        }
    }

    /// Register `provider`, replacing any provider with the same id.
    pub fn register_provider(&mut self, provider: Arc<dyn FeatureProvider>) {
        let id = provider.id().to_string();
        if let Some(pos) = self.providers.iter().position(|p| p.id() == id) {
            warn!("Feature provider `{id}` already registered, replacing it");
            self.providers.remove(pos);
        }
        self.providers.push(provider);
        // Stable sort keeps registration order among equal priorities.
        self.providers.sort_by_key(|p| std::cmp::Reverse(p.priority()));
        // Cached merges may now be incomplete relative to the new provider set.
        self.cache.clear();
        info!("Registered feature provider `{id}` ({} total)", self.providers.len());
    }

    /// Remove the provider with `id`. Returns whether one was removed.
    pub fn unregister_provider(&mut self, id: &str) -> bool {
        let before = self.providers.len();
        self.providers.retain(|p| p.id() != id);
        let removed = self.providers.len() != before;
        if removed {
            self.cache.clear();
            info!("Unregistered feature provider `{id}`");
        }
        removed
    }

    #[must_use]
    pub fn provider_ids(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.id().to_string()).collect()
    }

    fn resolve(providers: &[Arc<dyn FeatureProvider>], track: &TrackId) -> TrackFeatures {
        let mut merged = TrackFeatures::default();
        for provider in providers {
            match provider.provide(track) {
                Ok(features) => merged.merge_missing(features),
                Err(e) => warn!("Feature provider `{}` failed for {track}: {e:#}", provider.id()),
            }
            if merged.is_complete() {
                break;
            }
        }
        merged
    }

    /// All known features for `track`, resolving and caching on a miss.
    pub fn get(&mut self, track: &TrackId) -> TrackFeatures {
        if let Some(cached) = self.cache.get(track) {
            return cached.clone();
        }

        let features = Self::resolve(&self.providers, track);
        if features.is_empty() {
            debug!("No provider knows anything about {track}");
        } else {
            self.cache.insert(track.clone(), features.clone());
        }
        features
    }

    /// Features for several tracks, in input order.
    pub fn get_batch(&mut self, tracks: &[TrackId]) -> Vec<(TrackId, TrackFeatures)> {
        self.prefetch(tracks);
        tracks
            .iter()
            .map(|id| (id.clone(), self.get(id)))
            .collect()
    }

    pub fn get_audio(&mut self, track: &TrackId) -> Option<AudioFeatures> {
        self.get(track).audio
    }

    pub fn get_emotion(&mut self, track: &TrackId) -> Option<EmotionFeatures> {
        self.get(track).emotion
    }

    pub fn get_lyrics(&mut self, track: &TrackId) -> Option<Lyrics> {
        self.get(track).lyrics
    }

    pub fn get_embedding(&mut self, track: &TrackId) -> Option<Embedding> {
        self.get(track).embedding
    }

    /// Drop the cached entry for `track` so the next lookup re-resolves it.
    pub fn invalidate_cache(&mut self, track: &TrackId) -> bool {
        self.cache.remove(track).is_some()
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    #[must_use]
    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    /// Resolve every uncached id in parallel and cache the non-empty results.
    /// Returns how many tracks were newly cached.
    pub fn prefetch(&mut self, tracks: &[TrackId]) -> usize {
        let mut seen = HashSet::new();
        let pending: Vec<&TrackId> = tracks
            .iter()
            .filter(|id| !self.cache.contains(id) && seen.insert(*id))
            .collect();

        if pending.is_empty() || self.providers.is_empty() {
            return 0;
        }

        let providers = &self.providers;
        let resolved: Vec<(TrackId, TrackFeatures)> = pending
            .par_iter()
            .map(|id| ((*id).clone(), Self::resolve(providers, id)))
            .filter(|(_, features)| !features.is_empty())
            .collect();

        let count = resolved.len();
        for (id, features) in resolved {
            self.cache.insert(id, features);
        }
        debug!("Prefetched features for {count}/{} tracks", pending.len());
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EmbeddingProvider {
        calls: AtomicUsize,
    }

    impl FeatureProvider for EmbeddingProvider {
        fn id(&self) -> &str {
            "embeddings"
        }

        fn priority(&self) -> i32 {
            10
        }

        fn provide(&self, track: &TrackId) -> Result<TrackFeatures> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if track.as_str() == "unknown" {
                return Ok(TrackFeatures::default());
            }
            Ok(TrackFeatures {
                embedding: Some(vec![1.0, 0.0]),
                ..TrackFeatures::default()
            })
        }
    }

    struct LyricsProvider;

    impl FeatureProvider for LyricsProvider {
        fn id(&self) -> &str {
            "lyrics"
        }

        fn provide(&self, _track: &TrackId) -> Result<TrackFeatures> {
            Ok(TrackFeatures {
                lyrics: Some(Lyrics {
                    text: "la la".to_string(),
                    ..Lyrics::default()
                }),
                // Lower priority: must not override the embedding above.
                embedding: Some(vec![0.0, 1.0]),
                ..TrackFeatures::default()
            })
        }
    }

    struct BrokenProvider;

    impl FeatureProvider for BrokenProvider {
        fn id(&self) -> &str {
            "broken"
        }

        fn priority(&self) -> i32 {
            100
        }

        fn provide(&self, _track: &TrackId) -> Result<TrackFeatures> {
            anyhow::bail!("service down")
        }
    }

    fn aggregator() -> (FeatureAggregator, Arc<EmbeddingProvider>) {
        let embeddings = Arc::new(EmbeddingProvider { calls: AtomicUsize::new(0) });
        let mut agg = FeatureAggregator::new(16);
        agg.register_provider(Arc::new(BrokenProvider));
        agg.register_provider(Arc::new(LyricsProvider));
        agg.register_provider(embeddings.clone());
        (agg, embeddings)
    }

    #[test]
    fn test_priority_merge_and_error_isolation() {
        let (mut agg, _) = aggregator();
        let features = agg.get(&TrackId::from("t1"));

        assert_eq!(features.embedding, Some(vec![1.0, 0.0]), "Higher priority provider wins");
        assert_eq!(features.lyrics.map(|l| l.text), Some("la la".to_string()));
        assert_eq!(agg.provider_ids(), vec!["broken", "embeddings", "lyrics"]);
    }

    #[test]
    fn test_cache_hit_and_invalidation() {
        let (mut agg, embeddings) = aggregator();
        let id = TrackId::from("t1");

        agg.get_embedding(&id);
        agg.get_lyrics(&id);
        assert_eq!(embeddings.calls.load(Ordering::SeqCst), 1, "Second lookup is cached");

        assert!(agg.invalidate_cache(&id));
        agg.get(&id);
        assert_eq!(embeddings.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_empty_results_are_not_cached() {
        let mut agg = FeatureAggregator::new(16);
        agg.register_provider(Arc::new(EmbeddingProvider { calls: AtomicUsize::new(0) }));
        assert!(agg.get(&TrackId::from("unknown")).is_empty());
        assert_eq!(agg.cached_count(), 0);
    }

    #[test]
    fn test_prefetch_and_batch() {
        let (mut agg, embeddings) = aggregator();
        let ids: Vec<TrackId> = ["a", "b", "a", "c"].iter().map(|s| TrackId::from(*s)).collect();

        assert_eq!(agg.prefetch(&ids), 3, "Duplicates are resolved once");
        let batch = agg.get_batch(&ids);
        assert_eq!(batch.len(), 4);
        assert_eq!(embeddings.calls.load(Ordering::SeqCst), 3, "Batch served from cache");
    }

    #[test]
    fn test_unregister_clears_cache() {
        let (mut agg, _) = aggregator();
        agg.get(&TrackId::from("t1"));
        assert!(agg.unregister_provider("lyrics"));
        assert_eq!(agg.cached_count(), 0);
        assert!(!agg.unregister_provider("lyrics"));
        assert!(agg.get_lyrics(&TrackId::from("t1")).is_none());
    }
}
