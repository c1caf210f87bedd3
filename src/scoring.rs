//! Score cache keyed by `(algorithm id, track id)`.
//!
//! Every algorithm's scores are kept side by side so the UI can compare them,
//! but the *final* score of a track is always the active algorithm's entry.
//! The cache is a bounded LRU; unregistering an algorithm purges its entries.

use crate::cache::LruCache;
use crate::track::TrackId;
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;

pub const DEFAULT_SCORE_CACHE_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreEntry {
    pub score: f64,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoreStats {
    pub entries: usize,
    pub per_algorithm: BTreeMap<String, usize>,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub capacity: usize,
}

type ScoreKey = (String, TrackId);

pub struct ScoreCache {
    entries: LruCache<ScoreKey, ScoreEntry>,
    hits: u64,
    misses: u64,
}

impl Default for ScoreCache {
    fn default() -> Self {
        Self::new(DEFAULT_SCORE_CACHE_CAPACITY)
    }
}

impl ScoreCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    pub fn submit_score(&mut self, algorithm_id: &str, track: &TrackId, score: f64, now_ms: i64) {
        let key = (algorithm_id.to_string(), track.clone());
        if let Some(((evicted_algo, evicted_track), _)) = self.entries.insert(key, ScoreEntry { score, timestamp_ms: now_ms }) {
            debug!("Score cache full; evicted {evicted_algo}/{evicted_track}");
        }
    }

    pub fn submit_batch_scores(&mut self, algorithm_id: &str, scores: &[(TrackId, f64)], now_ms: i64) {
        for (track, score) in scores {
            self.submit_score(algorithm_id, track, *score, now_ms);
        }
    }

    /// The active algorithm's score for `track`, if it has one.
    pub fn get_final_score(&mut self, track: &TrackId, active: Option<&str>) -> Option<f64> {
        let Some(active) = active else {
            self.misses += 1;
            return None;
        };
        let key = (active.to_string(), track.clone());
        match self.entries.get(&key) {
            Some(entry) => {
                self.hits += 1;
                Some(entry.score)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Entries for `track` from every algorithm except the active one, by algorithm id.
    #[must_use]
    pub fn get_other_algorithm_scores(&self, track: &TrackId, active: Option<&str>) -> Vec<(String, ScoreEntry)> {
        let mut others: Vec<(String, ScoreEntry)> = self
            .entries
            .iter()
            .filter(|((algo, id), _)| id == track && Some(algo.as_str()) != active)
            .map(|((algo, _), entry)| (algo.clone(), *entry))
            .collect();
        others.sort_by(|(a, _), (b, _)| a.cmp(b));
        others
    }

    /// Drop every entry written by `algorithm_id`.
    pub fn purge_algorithm(&mut self, algorithm_id: &str) -> usize {
        let removed = self.entries.retain(|(algo, _), _| algo != algorithm_id);
        if removed > 0 {
            debug!("Purged {removed} cached scores for `{algorithm_id}`");
        }
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn get_stats(&self) -> ScoreStats {
        let mut per_algorithm = BTreeMap::new();
        for ((algo, _), _) in self.entries.iter() {
            *per_algorithm.entry(algo.clone()).or_insert(0) += 1;
        }
        ScoreStats {
            entries: self.entries.len(),
            per_algorithm,
            hits: self.hits,
            misses: self.misses,
            evictions: self.entries.evictions(),
            capacity: self.entries.capacity(),
        }
    }
}
