//! # Integration Tests for Cadence
//!
//! End-to-end tests through the public API: the binary's CLI, the engine
//! wired to SQLite persistence, algorithm plugins and the queue's candidate
//! sources.

use anyhow::Result;
use cadence::algorithm::{Algorithm, AlgorithmManifest, Capability, ScoringCandidate, ScoringContext};
use cadence::config::EngineConfig;
use cadence::db::SqliteStore;
use cadence::engine::Engine;
use cadence::error::EngineError;
use cadence::events::{InteractionEvent, InteractionKind};
use cadence::features::{FeatureProvider, TrackFeatures};
use cadence::queue::{provider_fn, CandidateContext, CandidateProvider, CandidateSource, QueueConfig, SmartQueueManager};
use cadence::track::{RadioSeed, ScoredTrack, Track, TrackId};
use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

const NOW: i64 = 1_700_000_000_000;
const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Embeddings keyed on the first letter of the track id: `r` rock, `j` jazz, anything else ambient.
struct LetterEmbeddings;

impl FeatureProvider for LetterEmbeddings {
    fn id(&self) -> &str {
        "letter-embeddings"
    }

    fn provide(&self, track: &TrackId) -> Result<TrackFeatures> {
        let embedding = match track.as_str().chars().next() {
            Some('r') => vec![1.0, 0.0, 0.0],
            Some('j') => vec![0.0, 1.0, 0.0],
            _ => vec![0.0, 0.0, 1.0],
        };
        Ok(TrackFeatures {
            embedding: Some(embedding),
            ..TrackFeatures::default()
        })
    }
}

/// Plugin returning fixed scores per track id.
struct FixedScores {
    manifest: AlgorithmManifest,
    scores: Vec<(&'static str, f64)>,
}

impl FixedScores {
    fn new(id: &str, scores: Vec<(&'static str, f64)>) -> Self {
        Self {
            manifest: AlgorithmManifest::new(id, "Fixed", "1.0").with_capability(Capability::ScoreBatch),
            scores,
        }
    }

    fn lookup(&self, id: &TrackId) -> f64 {
        self.scores
            .iter()
            .find(|(t, _)| *t == id.as_str())
            .map_or(0.0, |(_, s)| *s)
    }
}

impl Algorithm for FixedScores {
    fn manifest(&self) -> &AlgorithmManifest {
        &self.manifest
    }

    fn score_track(&mut self, candidate: &ScoringCandidate, _ctx: &ScoringContext) -> Result<f64> {
        Ok(self.lookup(&candidate.track.id))
    }

    fn rank_candidates(&mut self, candidates: &[ScoringCandidate], _ctx: &ScoringContext) -> Result<Vec<ScoredTrack>> {
        let mut ranked: Vec<ScoredTrack> = candidates
            .iter()
            .map(|c| ScoredTrack::new(c.track.clone(), self.lookup(&c.track.id)))
            .collect();
        cadence::track::sort_by_score_desc(&mut ranked);
        Ok(ranked)
    }

    fn score_batch(&mut self, candidates: &[ScoringCandidate], _ctx: &ScoringContext) -> Result<Vec<f64>> {
        Ok(candidates.iter().map(|c| self.lookup(&c.track.id)).collect())
    }
}

fn track(id: &str, artist: &str) -> Track {
    Track::new(id, artist)
}

fn fixed_tracks(tracks: Vec<Track>) -> Arc<dyn CandidateProvider> {
    provider_fn(move |_| Ok(tracks.clone()))
}

fn create_test_store() -> Result<(TempDir, PathBuf)> {
    let temp_dir = TempDir::new()?;
    let store_path = temp_dir.path().join("cadence_test.db");
    Ok((temp_dir, store_path))
}

#[cfg(test)]
mod cli_tests {
    use super::*;

    fn cadence(temp_dir: &TempDir, args: &[&str]) -> std::process::Output {
        Command::new(env!("CARGO_BIN_EXE_cadence"))
            .arg("--store")
            .arg(temp_dir.path().join("cli.db"))
            .arg("--config")
            .arg(temp_dir.path().join("config.json"))
            .args(args)
            .output()
            .expect("Failed to run cadence binary")
    }

    #[test]
    fn test_cli_help_displays_correctly() {
        let output = Command::new(env!("CARGO_BIN_EXE_cadence"))
            .arg("--help")
            .output()
            .expect("Failed to run help command");

        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("cadence"));
        assert!(stdout.contains("profile"));
        assert!(stdout.contains("config"));
        assert!(stdout.contains("simulate"));
        assert!(stdout.contains("completion"));
    }

    #[test]
    fn test_cli_version_flag() {
        let output = Command::new(env!("CARGO_BIN_EXE_cadence"))
            .arg("--version")
            .output()
            .expect("Failed to run version command");

        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("cadence"));
        assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_completion_generation() {
        let output = Command::new(env!("CARGO_BIN_EXE_cadence"))
            .args(["completion", "bash"])
            .output()
            .expect("Failed to run completion command");

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("_cadence"));
        assert!(stdout.contains("complete"));
    }

    #[test]
    fn test_config_set_then_show() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let set = cadence(&temp_dir, &["config", "set", "queue.max_same_artist", "1"]);
        assert!(set.status.success(), "stderr: {}", String::from_utf8_lossy(&set.stderr));

        let show = cadence(&temp_dir, &["config", "show", "queue.max_same_artist"]);
        assert_eq!(String::from_utf8_lossy(&show.stdout).trim(), "1");

        let bad = cadence(&temp_dir, &["config", "set", "queue.nope", "1"]);
        assert!(!bad.status.success(), "Unknown keys are rejected");
        Ok(())
    }

    #[test]
    fn test_simulate_reports_plays() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let output = cadence(&temp_dir, &["simulate", "--interactions", "20", "--plays", "8", "--seed", "5"]);
        assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("Plays:              8"));
        assert!(stdout.contains("Profile valid:      true"));
        assert!(!temp_dir.path().join("cli.db").exists(), "Scratch store unless --persist");
        Ok(())
    }

    #[test]
    fn test_profile_show_on_empty_store() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let output = cadence(&temp_dir, &["profile", "show", "--json"]);
        assert!(output.status.success());
        let summary: serde_json::Value = serde_json::from_slice(&output.stdout)?;
        assert_eq!(summary["interactions"], 0);
        assert_eq!(summary["valid"], false);
        Ok(())
    }
}

#[cfg(test)]
mod score_cache_tests {
    use super::*;

    #[test]
    fn test_final_score_follows_registered_algorithm() {
        let mut engine = Engine::builder().clock(Arc::new(|| NOW)).build();
        engine
            .register_algorithm(Box::new(FixedScores::new("X", vec![("t1", 80.0), ("t2", 40.0)])))
            .expect("Initialize X");
        engine.set_active_algorithm("X").expect("X is registered");

        let scored = engine.score_tracks(&[track("t1", "a"), track("t2", "b")]).expect("Batch scores");
        assert_eq!(scored.iter().map(|s| s.score).collect::<Vec<_>>(), vec![80.0, 40.0]);
        assert_eq!(engine.final_score(&TrackId::from("t1")), Some(80.0));

        engine.unregister_algorithm("X").expect("Registered");
        assert_eq!(engine.final_score(&TrackId::from("t1")), None);
        assert!(matches!(engine.score_track(&track("t1", "a")), Err(EngineError::NoActiveAlgorithm)));
    }

    #[test]
    fn test_other_algorithm_scores_are_kept_side_by_side() {
        let mut engine = Engine::builder()
            .clock(Arc::new(|| NOW))
            .algorithm(Box::new(FixedScores::new("X", vec![("t1", 10.0)])))
            .feature_provider(Arc::new(LetterEmbeddings))
            .build();

        let t1 = track("t1", "a");
        engine.score_track(&t1).expect("Built-in algorithm scores");
        engine.set_active_algorithm("X").expect("X is registered");
        assert_eq!(engine.score_track(&t1).expect("X scores"), 10.0);

        let others = engine.other_scores(&t1.id);
        assert_eq!(others.len(), 1);
        assert_eq!(others[0].0, cadence::algorithm::TASTE_ALGORITHM_ID);
    }
}

#[cfg(test)]
mod taste_integration_tests {
    use super::*;
    use cadence::taste::{TasteConfig, TasteProfileEngine};
    use cadence::vector::cosine_similarity;

    #[test]
    fn test_recent_like_outweighs_old_listen() {
        let e_a = vec![1.0, 0.2, 0.0];
        let e_b = vec![0.0, 0.2, 1.0];
        let mut taste = TasteProfileEngine::new(TasteConfig {
            min_interactions: 1,
            ..TasteConfig::default()
        });
        taste.add_interaction(InteractionEvent::new("A", InteractionKind::Like, e_a.clone(), NOW));
        taste.add_interaction(
            InteractionEvent::new("B", InteractionKind::Listen, e_b.clone(), NOW - 40 * DAY_MS).with_completed(true),
        );

        let profile = taste.get_profile_at(NOW).expect("Profile with min_interactions 1");
        let to_a = cosine_similarity(&profile.vector, &e_a);
        let to_b = cosine_similarity(&profile.vector, &e_b);
        assert!(to_a > to_b, "Like should dominate ({to_a} vs {to_b})");
    }

    #[test]
    fn test_export_import_through_engine() -> Result<()> {
        let mut source = Engine::builder()
            .clock(Arc::new(|| NOW))
            .feature_provider(Arc::new(LetterEmbeddings))
            .build();
        for i in 0..6 {
            source.like(&track(&format!("r{i}"), "rocker"));
        }
        let json = source.export_profile()?;

        let mut target = Engine::builder().clock(Arc::new(|| NOW)).build();
        assert_eq!(target.import_profile(&json)?, 6);
        assert!(target.taste().is_profile_valid());
        assert!(target.preferences().is_liked(&TrackId::from("r3")));

        assert!(matches!(target.import_profile("not json"), Err(EngineError::Persistence(_))));
        assert_eq!(target.taste().interaction_count(), 6, "Failed import changes nothing");
        Ok(())
    }
}

#[cfg(test)]
mod queue_integration_tests {
    use super::*;

    #[test]
    fn test_diversity_cap_of_one() {
        let mut queue = SmartQueueManager::new(QueueConfig {
            max_same_artist: 1,
            ..QueueConfig::default()
        });
        let ranked = vec![
            ScoredTrack::new(track("t1", "artist1"), 90.0),
            ScoredTrack::new(track("t2", "artist1"), 80.0),
            ScoredTrack::new(track("t3", "artist2"), 70.0),
        ];
        let added = queue.submit_ranking(&ranked);
        let ids: Vec<&str> = added.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t3"]);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_later_sources_are_not_queried_once_satisfied() {
        let similar_calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&similar_calls);

        let mut queue = SmartQueueManager::default();
        queue.bind_source(
            CandidateSource::Library,
            fixed_tracks((0..5).map(|i| track(&format!("l{i}"), "a")).collect()),
        );
        queue.bind_source(
            CandidateSource::Similar,
            provider_fn(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(vec![track("s1", "b")])
            }),
        );

        let ctx = CandidateContext::new([CandidateSource::Library, CandidateSource::Similar], 5);
        let candidates = queue.get_candidates(&ctx);
        assert_eq!(candidates.len(), 5);
        assert_eq!(similar_calls.load(Ordering::SeqCst), 0, "Similar never invoked");
    }

    #[test]
    fn test_unreplenishable_queue_stays_short() {
        let mut engine = Engine::builder().clock(Arc::new(|| NOW)).build();
        let added = engine.replenish().expect("Empty sources are not an error");
        assert!(added.is_empty());
        assert!(engine.queue().needs_replenishment());
    }
}

#[cfg(test)]
mod engine_integration_tests {
    use super::*;

    fn engine_with_store(store: Arc<SqliteStore>, config: EngineConfig) -> Engine {
        Engine::builder()
            .config(config)
            .store(store)
            .clock(Arc::new(|| NOW))
            .seed(9)
            .feature_provider(Arc::new(LetterEmbeddings))
            .build()
    }

    #[test]
    fn test_state_survives_restart() -> Result<()> {
        let (_temp_dir, store_path) = create_test_store()?;

        {
            let store = Arc::new(SqliteStore::open(&store_path)?);
            let mut engine = engine_with_store(store, EngineConfig::default());
            for i in 0..5 {
                engine.like(&track(&format!("r{i}"), "rocker"));
            }
            engine.dislike(&track("j1", "jazzer"));
            engine.train_now().expect("Taste algorithm trains");
            assert!(engine.dispose().is_clean());
        }

        let store = Arc::new(SqliteStore::open(&store_path)?);
        let mut engine = engine_with_store(store, EngineConfig::default());
        assert_eq!(engine.preferences().interaction_count(), 5);
        assert!(engine.taste().is_profile_valid(), "Taste rebuilt from persisted interactions");
        assert!(engine.preferences().is_disliked(&TrackId::from("j1")));
        assert_eq!(engine.training_status().model_version.as_deref(), Some("v1"));
        assert_eq!(engine.training().last_training_info().map(|i| i.sample_count), Some(6));

        let ranked = engine.rank(vec![track("j9", "jazzer"), track("r9", "rocker")])?;
        assert_eq!(ranked[0].track.id.as_str(), "r9");
        Ok(())
    }

    #[test]
    fn test_tick_trains_when_enough_new_data() {
        let mut config = EngineConfig::default();
        config.training.min_new_samples = 3;
        let mut engine = Engine::builder()
            .config(config)
            .clock(Arc::new(|| NOW))
            .feature_provider(Arc::new(LetterEmbeddings))
            .build();

        engine.like(&track("r1", "a"));
        assert!(engine.tick().is_none(), "Not enough samples yet");
        engine.like(&track("r2", "a"));
        engine.like(&track("r3", "a"));

        let outcome = engine.tick().expect("Training is due");
        assert_eq!(outcome.version, "v1");
        assert!(engine.tick().is_none(), "Interval has not elapsed");
    }

    #[test]
    fn test_train_requires_capability() {
        let mut engine = Engine::builder()
            .without_builtin_algorithm()
            .algorithm(Box::new(FixedScores::new("X", Vec::new())))
            .build();
        engine.set_active_algorithm("X").expect("Registered");
        assert!(matches!(
            engine.train_now(),
            Err(EngineError::Unsupported { capability: Capability::Train, .. })
        ));
    }

    #[test]
    fn test_radio_falls_back_to_ranked_radio_source() {
        let radio = provider_fn(|req| {
            let genre = req.seed.map(|s| s.id.clone()).unwrap_or_default();
            Ok((0..8).map(|i| track(&format!("r{i}"), &format!("{genre}-{i}"))).collect())
        });
        let mut engine = Engine::builder()
            .clock(Arc::new(|| NOW))
            .feature_provider(Arc::new(LetterEmbeddings))
            .source(CandidateSource::Radio, radio)
            .build();

        let station = engine.generate_radio(&RadioSeed::genre("rock"), 5).expect("Radio");
        assert_eq!(station.len(), 5);
        assert!(station.iter().all(|s| s.track.artist_id.starts_with("rock-")));
        assert!(station.windows(2).all(|w| w[0].score >= w[1].score), "Best first");
    }

    #[test]
    fn test_new_listener_queue_draws_from_exploration_sources() {
        let library_calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&library_calls);
        let liked_calls = Arc::new(AtomicUsize::new(0));
        let liked_counter = Arc::clone(&liked_calls);

        let mut engine = Engine::builder()
            .clock(Arc::new(|| NOW))
            .seed(4)
            .feature_provider(Arc::new(LetterEmbeddings))
            .source(
                CandidateSource::Library,
                provider_fn(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok((0..12).map(|i| track(&format!("x{i}"), &format!("a{}", i % 6))).collect())
                }),
            )
            .source(
                CandidateSource::Liked,
                provider_fn(move |_| {
                    liked_counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Vec::new())
                }),
            )
            .build();

        let added = engine.replenish().expect("Replenish");
        assert_eq!(added.len(), 10);
        assert_eq!(library_calls.load(Ordering::SeqCst), 1);
        assert_eq!(liked_calls.load(Ordering::SeqCst), 0, "Liked is not an exploration source");
    }
}

#[cfg(test)]
mod configuration_tests {
    use super::*;
    use cadence::config::{get_config_path, get_data_dir, get_store_path, RuntimeConfig};

    #[test]
    fn test_store_path_generation() -> Result<()> {
        let store_path = get_store_path()?;
        assert!(store_path.to_string_lossy().ends_with("cadence.db"));
        assert_eq!(store_path.parent(), Some(get_data_dir()?.as_path()));
        Ok(())
    }

    #[test]
    fn test_runtime_config_creation() -> Result<()> {
        let runtime = RuntimeConfig::new()?;
        assert_eq!(runtime.config_path, get_config_path()?);
        assert_eq!(runtime.store_path, get_store_path()?);
        Ok(())
    }

    #[test]
    fn test_config_file_drives_engine() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, r#"{"taste": {"min_interactions": 2}, "default_algorithm": null}"#)?;

        let config = EngineConfig::load(&path)?;
        let mut engine = Engine::builder().config(config).clock(Arc::new(|| NOW)).build();
        assert_eq!(engine.registry().active_id(), None, "No default algorithm");

        for i in 0..2 {
            engine.record_interaction(InteractionEvent::new(
                format!("t{i}"),
                InteractionKind::Like,
                vec![1.0, 0.0],
                NOW,
            ));
        }
        assert!(engine.taste().is_profile_valid());
        Ok(())
    }
}
