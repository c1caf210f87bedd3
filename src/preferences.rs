//! # Event Recorder / Preference Store
//!
//! Persists what the listener did and keeps the cheap counters derived from
//! it:
//!
//! - **Interaction log**: every [`InteractionEvent`], bounded, oldest trimmed.
//! - **Listen history**: one [`ListenRecord`] per listen interaction, bounded.
//! - **Track stats**: touches / listens / skips / loved per track.
//!   Every listen is a touch; a listen that reached 80% of the track is a
//!   listen, one that stopped earlier is a skip.
//! - **Affinity counters**: per artist and per genre, bumped by positive
//!   interactions and lowered (never below zero) by dislikes.
//! - **Likes and dislikes**: mutually exclusive per track.
//!
//! The whole store is saved as one JSON document under
//! [`PREFERENCES_KEY`]. Persistence is best effort: read or write failures are
//! logged and the in-memory state stays authoritative.

use crate::events::{InteractionEvent, InteractionKind};
use crate::storage::{self, KeyValueStore};
use crate::track::{Embedding, TrackId};
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

pub const PREFERENCES_KEY: &str = "cadence.preferences";

pub const DEFAULT_MAX_INTERACTIONS: usize = 1_000;
pub const DEFAULT_MAX_LISTENS: usize = 2_000;

/// Listening statistics for one track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrackStats {
    /// How often the track started playing.
    pub touches: u32,
    /// Plays that reached the completion threshold.
    pub listens: u32,
    /// Plays abandoned before the completion threshold.
    pub skips: u32,
    pub loved: bool,
    pub last_played_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenRecord {
    pub track_id: TrackId,
    pub artist: Option<String>,
    pub genre: Option<String>,
    pub played_ms: Option<u64>,
    pub duration_ms: Option<u64>,
    pub completed: bool,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DislikeRecord {
    pub track_id: TrackId,
    #[serde(default)]
    pub embedding: Embedding,
    #[serde(default)]
    pub artist: Option<String>,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct PreferenceState {
    interactions: VecDeque<InteractionEvent>,
    listens: VecDeque<ListenRecord>,
    stats: HashMap<TrackId, TrackStats>,
    artist_affinity: HashMap<String, f64>,
    genre_affinity: HashMap<String, f64>,
    liked: BTreeSet<TrackId>,
    disliked: BTreeMap<TrackId, DislikeRecord>,
}

/// Interaction history, counters and likes/dislikes for one listener.
#[derive(Debug, Clone)]
pub struct PreferenceStore {
    state: PreferenceState,
    max_interactions: usize,
    max_listens: usize,
}

impl Default for PreferenceStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_INTERACTIONS, DEFAULT_MAX_LISTENS)
    }
}

fn top_n(counts: &HashMap<String, f64>, n: usize) -> Vec<(String, f64)> {
    let mut ranked: Vec<(String, f64)> = counts
        .iter()
        .filter(|(_, &count)| count > 0.0)
        .map(|(name, &count)| (name.clone(), count))
        .collect();
    ranked.sort_by(|(a_name, a), (b_name, b)| {
        b.partial_cmp(a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a_name.cmp(b_name))
    });
    ranked.truncate(n);
    ranked
}

fn bump(counts: &mut HashMap<String, f64>, key: &str, delta: f64) {
    let entry = counts.entry(key.to_string()).or_insert(0.0);
    *entry = (*entry + delta).max(0.0);
}

impl PreferenceStore {
    #[must_use]
    pub fn new(max_interactions: usize, max_listens: usize) -> Self {
        Self {
            state: PreferenceState::default(),
            max_interactions: max_interactions.max(1),
            max_listens: max_listens.max(1),
        }
    }

    /// Restore from `store`, falling back to an empty store if the entry is
    /// missing or corrupt.
    pub fn load(store: &dyn KeyValueStore, max_interactions: usize, max_listens: usize) -> Self {
        let mut prefs = Self::new(max_interactions, max_listens);
        if let Some(state) = storage::load_json::<PreferenceState>(store, PREFERENCES_KEY) {
            prefs.state = state;
            prefs.trim();
            info!(
                "Loaded preferences: {} interactions, {} liked, {} disliked",
                prefs.state.interactions.len(),
                prefs.state.liked.len(),
                prefs.state.disliked.len()
            );
        }
        prefs
    }

    /// Best-effort save. Returns whether the write succeeded.
    pub fn save(&self, store: &dyn KeyValueStore) -> bool {
        storage::save_json_logged(store, PREFERENCES_KEY, &self.state)
    }

    fn trim(&mut self) {
        while self.state.interactions.len() > self.max_interactions {
            self.state.interactions.pop_front();
        }
        while self.state.listens.len() > self.max_listens {
            self.state.listens.pop_front();
        }
    }

    /// Record one interaction and update every derived counter.
    pub fn record_interaction(&mut self, event: &InteractionEvent) {
        let stats = self.state.stats.entry(event.track_id.clone()).or_default();

        match event.kind {
            InteractionKind::Listen => {
                stats.touches += 1;
                stats.last_played_ms = Some(event.timestamp_ms);
                let completed = event.is_completed();
                if completed {
                    stats.listens += 1;
                } else if event.completed.is_some() || event.play_ratio().is_some() {
                    stats.skips += 1;
                }
                self.state.listens.push_back(ListenRecord {
                    track_id: event.track_id.clone(),
                    artist: event.artists.first().cloned(),
                    genre: event.genres.first().cloned(),
                    played_ms: event.played_ms,
                    duration_ms: event.duration_ms,
                    completed,
                    timestamp_ms: event.timestamp_ms,
                });
            }
            InteractionKind::Like => {
                stats.loved = true;
                self.state.liked.insert(event.track_id.clone());
                self.state.disliked.remove(&event.track_id);
            }
            InteractionKind::Download | InteractionKind::PlaylistAdd => {}
        }

        if event.is_positive() {
            for artist in &event.artists {
                bump(&mut self.state.artist_affinity, artist, 1.0);
            }
            for genre in &event.genres {
                bump(&mut self.state.genre_affinity, genre, 1.0);
            }
        }

        trace!("Recorded {:?} for {}", event.kind, event.track_id);
        self.state.interactions.push_back(event.clone());
        self.trim();
    }

    /// Remove a like. Returns whether the track was liked.
    pub fn unlike(&mut self, track: &TrackId) -> bool {
        if let Some(stats) = self.state.stats.get_mut(track) {
            stats.loved = false;
        }
        self.state.liked.remove(track)
    }

    /// Mark `track` as disliked; clears any like and lowers the artist's affinity.
    pub fn dislike(&mut self, record: DislikeRecord) {
        self.unlike(&record.track_id);
        if let Some(artist) = &record.artist {
            bump(&mut self.state.artist_affinity, artist, -1.0);
        }
        debug!("Disliked {}", record.track_id);
        self.state.disliked.insert(record.track_id.clone(), record);
    }

    pub fn undislike(&mut self, track: &TrackId) -> bool {
        self.state.disliked.remove(track).is_some()
    }

    #[must_use]
    pub fn is_disliked(&self, track: &TrackId) -> bool {
        self.state.disliked.contains_key(track)
    }

    #[must_use]
    pub fn is_liked(&self, track: &TrackId) -> bool {
        self.state.liked.contains(track)
    }

    pub fn liked_ids(&self) -> impl Iterator<Item = &TrackId> {
        self.state.liked.iter()
    }

    pub fn disliked(&self) -> impl Iterator<Item = &DislikeRecord> {
        self.state.disliked.values()
    }

    /// Stats for `track`; zeroed if it was never seen.
    #[must_use]
    pub fn stats_for(&self, track: &TrackId) -> TrackStats {
        self.state.stats.get(track).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn top_artists(&self, n: usize) -> Vec<(String, f64)> {
        top_n(&self.state.artist_affinity, n)
    }

    #[must_use]
    pub fn top_genres(&self, n: usize) -> Vec<(String, f64)> {
        top_n(&self.state.genre_affinity, n)
    }

    #[must_use]
    pub fn artist_affinity(&self, artist: &str) -> f64 {
        self.state.artist_affinity.get(artist).copied().unwrap_or(0.0)
    }

    /// Interaction log, oldest first.
    pub fn interactions(&self) -> impl DoubleEndedIterator<Item = &InteractionEvent> {
        self.state.interactions.iter()
    }

    /// Listen history, oldest first.
    pub fn listens(&self) -> impl DoubleEndedIterator<Item = &ListenRecord> {
        self.state.listens.iter()
    }

    #[must_use]
    pub fn interaction_count(&self) -> usize {
        self.state.interactions.len()
    }

    pub fn clear(&mut self) {
        self.state = PreferenceState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn listen(id: &str, played: u64, duration: u64) -> InteractionEvent {
        InteractionEvent::new(id, InteractionKind::Listen, vec![1.0, 0.0], 1_000)
            .with_playback(played, duration)
            .with_artist("artist-a")
            .with_genre("jazz")
    }

    #[test]
    fn test_listen_updates_touches_listens_and_skips() {
        let mut prefs = PreferenceStore::default();
        prefs.record_interaction(&listen("t1", 90, 100));
        prefs.record_interaction(&listen("t1", 20, 100));
        prefs.record_interaction(&InteractionEvent::new("t1", InteractionKind::Listen, vec![], 5));

        let stats = prefs.stats_for(&TrackId::from("t1"));
        assert_eq!(stats.touches, 3);
        assert_eq!(stats.listens, 1);
        assert_eq!(stats.skips, 1, "Unknown progress counts as a touch only");
        assert_eq!(prefs.listens().count(), 3);
    }

    #[test]
    fn test_affinity_only_from_positive_signals() {
        let mut prefs = PreferenceStore::default();
        prefs.record_interaction(&listen("t1", 90, 100));
        prefs.record_interaction(&listen("t2", 10, 100));

        assert_eq!(prefs.top_artists(5), vec![("artist-a".to_string(), 1.0)]);
        assert_eq!(prefs.top_genres(5), vec![("jazz".to_string(), 1.0)]);
    }

    #[test]
    fn test_like_and_dislike_are_exclusive() {
        let mut prefs = PreferenceStore::default();
        let id = TrackId::from("t1");
        prefs.record_interaction(
            &InteractionEvent::new("t1", InteractionKind::Like, vec![1.0], 0).with_artist("artist-a"),
        );
        assert!(prefs.is_liked(&id));
        assert!(prefs.stats_for(&id).loved);

        prefs.dislike(DislikeRecord {
            track_id: id.clone(),
            embedding: vec![1.0],
            artist: Some("artist-a".to_string()),
            timestamp_ms: 1,
        });
        assert!(prefs.is_disliked(&id));
        assert!(!prefs.is_liked(&id));
        assert!(!prefs.stats_for(&id).loved);
        assert_eq!(prefs.artist_affinity("artist-a"), 0.0, "Affinity floors at zero");

        prefs.dislike(DislikeRecord {
            track_id: id.clone(),
            embedding: vec![],
            artist: Some("artist-a".to_string()),
            timestamp_ms: 2,
        });
        assert_eq!(prefs.artist_affinity("artist-a"), 0.0);
    }

    #[test]
    fn test_interaction_log_is_bounded() {
        let mut prefs = PreferenceStore::new(3, 2);
        for i in 0..5 {
            prefs.record_interaction(&listen(&format!("t{i}"), 90, 100));
        }
        let ids: Vec<&str> = prefs.interactions().map(|e| e.track_id.as_str()).collect();
        assert_eq!(ids, vec!["t2", "t3", "t4"], "Most recent interactions are retained");
        assert_eq!(prefs.listens().count(), 2);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let store = MemoryStore::new();
        let mut prefs = PreferenceStore::default();
        prefs.record_interaction(&listen("t1", 90, 100));
        prefs.dislike(DislikeRecord {
            track_id: TrackId::from("t9"),
            embedding: vec![],
            artist: None,
            timestamp_ms: 0,
        });
        assert!(prefs.save(&store));

        let restored = PreferenceStore::load(&store, 10, 10);
        assert_eq!(restored.interaction_count(), 1);
        assert!(restored.is_disliked(&TrackId::from("t9")));
        assert_eq!(restored.stats_for(&TrackId::from("t1")).listens, 1);
    }

    #[test]
    fn test_corrupt_snapshot_falls_back_to_empty() {
        let store = MemoryStore::new();
        store.set_item(PREFERENCES_KEY, "][").unwrap();
        let prefs = PreferenceStore::load(&store, 10, 10);
        assert_eq!(prefs.interaction_count(), 0);
    }
}
