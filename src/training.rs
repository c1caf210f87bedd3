//! # Training Data and Scheduling
//!
//! The engine never trains anything itself; it hands datasets to the active
//! algorithm plugin. This module turns the preference store into labelled
//! samples, notifies subscribers when new data arrives, remembers the last
//! completed run and decides when the next periodic run is due.
//!
//! ## Samples
//!
//! | Source            | Label | Weight |
//! |-------------------|-------|--------|
//! | like              | 1.0   | 3.0    |
//! | download          | 1.0   | 2.5    |
//! | playlist add      | 1.0   | 2.0    |
//! | completed listen  | 1.0   | 1.5    |
//! | dislike           | 0.0   | 2.0    |
//! | skip (<30% played)| 0.0   | 1.0    |
//!
//! Samples are returned most recent first.

use crate::error::{EngineError, Result};
use crate::events::{lock_listeners, InteractionEvent, InteractionKind, Subscription};
use crate::preferences::PreferenceStore;
use crate::storage::{self, KeyValueStore};
use crate::track::{Embedding, TrackId};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub const TRAINING_INFO_KEY: &str = "cadence.training.last";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SampleSource {
    Like,
    Download,
    PlaylistAdd,
    CompletedListen,
    Dislike,
    Skip,
}

impl SampleSource {
    #[must_use]
    pub fn weight(self) -> f32 {
        match self {
            Self::Like => 3.0,
            Self::Download => 2.5,
            Self::PlaylistAdd | Self::Dislike => 2.0,
            Self::CompletedListen => 1.5,
            Self::Skip => 1.0,
        }
    }

    #[must_use]
    pub fn is_positive(self) -> bool {
        !matches!(self, Self::Dislike | Self::Skip)
    }
}

/// One labelled example handed to a plugin's `train`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    pub track_id: TrackId,
    pub embedding: Embedding,
    /// 1.0 for positives, 0.0 for negatives.
    pub label: f32,
    pub weight: f32,
    pub source: SampleSource,
    pub timestamp_ms: i64,
}

impl TrainingSample {
    fn new(track_id: TrackId, embedding: Embedding, source: SampleSource, timestamp_ms: i64) -> Self {
        Self {
            track_id,
            embedding,
            label: if source.is_positive() { 1.0 } else { 0.0 },
            weight: source.weight(),
            source,
            timestamp_ms,
        }
    }
}

fn positive_source(event: &InteractionEvent) -> Option<SampleSource> {
    match event.kind {
        InteractionKind::Like => Some(SampleSource::Like),
        InteractionKind::Download => Some(SampleSource::Download),
        InteractionKind::PlaylistAdd => Some(SampleSource::PlaylistAdd),
        InteractionKind::Listen if event.is_completed() => Some(SampleSource::CompletedListen),
        InteractionKind::Listen => None,
    }
}

/// Positive samples, most recent first, at most `limit`.
#[must_use]
pub fn positive_samples(prefs: &PreferenceStore, limit: usize) -> Vec<TrainingSample> {
    prefs
        .interactions()
        .rev()
        .filter_map(|event| {
            positive_source(event).map(|source| {
                TrainingSample::new(event.track_id.clone(), event.embedding.clone(), source, event.timestamp_ms)
            })
        })
        .take(limit)
        .collect()
}

/// Negative samples (dislikes and early skips), most recent first, at most `limit`.
#[must_use]
pub fn negative_samples(prefs: &PreferenceStore, limit: usize) -> Vec<TrainingSample> {
    let mut negatives: Vec<TrainingSample> = prefs
        .disliked()
        .map(|d| TrainingSample::new(d.track_id.clone(), d.embedding.clone(), SampleSource::Dislike, d.timestamp_ms))
        .chain(
            prefs
                .interactions()
                .filter(|event| event.is_skip())
                .map(|event| {
                    TrainingSample::new(event.track_id.clone(), event.embedding.clone(), SampleSource::Skip, event.timestamp_ms)
                }),
        )
        .collect();
    negatives.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms));
    negatives.truncate(limit);
    negatives
}

/// Options for [`full_dataset`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetOptions {
    pub include_negatives: bool,
    /// Only samples at or after this timestamp.
    pub since_ms: Option<i64>,
    /// Cap applied to each class separately.
    pub limit: Option<usize>,
    /// Truncate the larger class to the size of the smaller one.
    pub balance: bool,
}

impl Default for DatasetOptions {
    fn default() -> Self {
        Self {
            include_negatives: true,
            since_ms: None,
            limit: None,
            balance: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingDataset {
    pub positives: Vec<TrainingSample>,
    pub negatives: Vec<TrainingSample>,
}

impl TrainingDataset {
    #[must_use]
    pub fn len(&self) -> usize {
        self.positives.len() + self.negatives.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn samples(&self) -> impl Iterator<Item = &TrainingSample> {
        self.positives.iter().chain(&self.negatives)
    }
}

#[must_use]
pub fn full_dataset(prefs: &PreferenceStore, options: &DatasetOptions) -> TrainingDataset {
    let limit = options.limit.unwrap_or(usize::MAX);
    let recent = |s: &TrainingSample| options.since_ms.map_or(true, |since| s.timestamp_ms >= since);

    let mut positives: Vec<TrainingSample> = positive_samples(prefs, usize::MAX)
        .into_iter()
        .filter(|s| recent(s))
        .take(limit)
        .collect();

    let mut negatives: Vec<TrainingSample> = if options.include_negatives {
        negative_samples(prefs, usize::MAX)
            .into_iter()
            .filter(|s| recent(s))
            .take(limit)
            .collect()
    } else {
        Vec::new()
    };

    if options.balance && options.include_negatives {
        let n = positives.len().min(negatives.len());
        positives.truncate(n);
        negatives.truncate(n);
    }

    TrainingDataset { positives, negatives }
}

/// Summary of the data currently available for training.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureStats {
    pub positive_count: usize,
    pub negative_count: usize,
    pub unique_tracks: usize,
    /// Dimension of the first non-empty embedding, if any.
    pub embedding_dim: Option<usize>,
    /// Samples missing an embedding.
    pub missing_embeddings: usize,
    pub per_source: BTreeMap<SampleSource, usize>,
    /// Mean played/duration ratio over listens with known progress.
    pub mean_completion: Option<f64>,
}

#[must_use]
pub fn feature_stats(prefs: &PreferenceStore) -> FeatureStats {
    let dataset = full_dataset(prefs, &DatasetOptions::default());
    let mut stats = FeatureStats {
        positive_count: dataset.positives.len(),
        negative_count: dataset.negatives.len(),
        ..FeatureStats::default()
    };

    let mut tracks = HashSet::new();
    for sample in dataset.samples() {
        tracks.insert(&sample.track_id);
        *stats.per_source.entry(sample.source).or_insert(0) += 1;
        if sample.embedding.is_empty() {
            stats.missing_embeddings += 1;
        } else if stats.embedding_dim.is_none() {
            stats.embedding_dim = Some(sample.embedding.len());
        }
    }
    stats.unique_tracks = tracks.len();

    let ratios: Vec<f64> = prefs.interactions().filter_map(InteractionEvent::play_ratio).collect();
    if !ratios.is_empty() {
        stats.mean_completion = Some(ratios.iter().map(|r| r.min(1.0)).sum::<f64>() / ratios.len() as f64);
    }
    stats
}

/// Record of the last completed training run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingInfo {
    pub algorithm_id: String,
    pub version: String,
    pub completed_at_ms: i64,
    pub sample_count: usize,
}

/// What a plugin reports after `train`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingOutcome {
    pub version: String,
    pub samples_used: usize,
    pub loss: Option<f64>,
}

/// Live status a plugin may expose while or after training.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingStatus {
    pub is_training: bool,
    pub progress: Option<f32>,
    pub model_version: Option<String>,
    pub message: Option<String>,
}

/// Decides when the periodic training run is due and prevents overlapping runs.
#[derive(Debug, Clone)]
pub struct TrainingScheduler {
    pub interval_ms: i64,
    pub min_new_samples: usize,
    last_run_ms: Option<i64>,
    is_training: bool,
}

impl TrainingScheduler {
    #[must_use]
    pub fn new(interval_ms: i64, min_new_samples: usize) -> Self {
        Self {
            interval_ms,
            min_new_samples,
            last_run_ms: None,
            is_training: false,
        }
    }

    #[must_use]
    pub fn is_training(&self) -> bool {
        self.is_training
    }

    #[must_use]
    pub fn last_run_ms(&self) -> Option<i64> {
        self.last_run_ms
    }

    #[must_use]
    pub fn is_due(&self, now_ms: i64, pending_samples: usize) -> bool {
        !self.is_training
            && pending_samples >= self.min_new_samples.max(1)
            && self.last_run_ms.map_or(true, |last| now_ms - last >= self.interval_ms)
    }

    /// Enter the training state.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::TrainingInProgress`] if a run is already active.
    pub fn begin(&mut self) -> Result<()> {
        if self.is_training {
            return Err(EngineError::TrainingInProgress);
        }
        self.is_training = true;
        Ok(())
    }

    /// Leave the training state. The run counts toward the interval whether it succeeded or not.
    pub fn finish(&mut self, now_ms: i64) {
        self.is_training = false;
        self.last_run_ms = Some(now_ms);
    }
}

pub type NewDataCallback = Arc<dyn Fn(usize) -> anyhow::Result<()> + Send + Sync>;

type NewDataListeners = Arc<Mutex<Vec<(u64, NewDataCallback)>>>;

/// Tracks new-data notifications and the last completed run.
pub struct TrainingCoordinator {
    listeners: NewDataListeners,
    next_id: AtomicU64,
    pending_samples: usize,
    last_info: Option<TrainingInfo>,
    pub scheduler: TrainingScheduler,
}

impl TrainingCoordinator {
    #[must_use]
    pub fn new(scheduler: TrainingScheduler) -> Self {
        Self {
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(0),
            pending_samples: 0,
            last_info: None,
            scheduler,
        }
    }

    /// Restore the last training record from `store`.
    pub fn load(&mut self, store: &dyn KeyValueStore) {
        self.last_info = storage::load_json(store, TRAINING_INFO_KEY);
        if let Some(info) = &self.last_info {
            info!("Last training: `{}` version {} ({} samples)", info.algorithm_id, info.version, info.sample_count);
            self.scheduler.last_run_ms = Some(info.completed_at_ms);
        }
    }

    /// Called with the number of new samples whenever training data arrives.
    pub fn on_new_data<F>(&self, callback: F) -> Subscription
    where
        F: Fn(usize) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock_listeners(&*self.listeners).push((id, Arc::new(callback)));
        Subscription::for_list(&self.listeners, id, |(id, _): &(u64, NewDataCallback)| *id)
    }

    /// Count `count` new samples and notify subscribers.
    pub fn notify_new_data(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        self.pending_samples += count;
        let callbacks: Vec<NewDataCallback> = lock_listeners(&*self.listeners)
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            if let Err(e) = callback(count) {
                warn!("New-data listener failed: {e:#}");
            }
        }
    }

    /// Samples recorded since the last completed run.
    #[must_use]
    pub fn pending_samples(&self) -> usize {
        self.pending_samples
    }

    /// Record a finished run and persist it (best effort).
    pub fn mark_training_complete(
        &mut self,
        algorithm_id: &str,
        version: &str,
        sample_count: usize,
        now_ms: i64,
        store: &dyn KeyValueStore,
    ) {
        let info = TrainingInfo {
            algorithm_id: algorithm_id.to_string(),
            version: version.to_string(),
            completed_at_ms: now_ms,
            sample_count,
        };
        storage::save_json_logged(store, TRAINING_INFO_KEY, &info);
        debug!("Training complete: `{algorithm_id}` version {version}");
        self.pending_samples = 0;
        self.last_info = Some(info);
    }

    #[must_use]
    pub fn last_training_info(&self) -> Option<&TrainingInfo> {
        self.last_info.as_ref()
    }
}
