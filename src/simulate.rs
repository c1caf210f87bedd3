//! # Offline Simulation
//!
//! A clustered synthetic catalog and a driver that runs listening sessions
//! through an [`Engine`]. Used by `cadence simulate` and the benchmarks to
//! exercise the full path (interactions, taste profile, candidate sources,
//! ranking, queue diversity) without a real music library.
//!
//! ## Catalog Shape
//!
//! Tracks are spread over `clusters` genres named `genre-{n}`. Each genre has a
//! random unit centroid and its tracks sit close to it, so cosine similarity
//! separates genres cleanly. Every genre has several artists, which keeps the
//! per-artist diversity cap meaningful.

use crate::engine::{Engine, EngineBuilder};
use crate::events::{InteractionEvent, InteractionKind};
use crate::features::{FeatureProvider, TrackFeatures};
use crate::queue::{provider_fn, CandidateSource, SourceRequest};
use crate::track::{Embedding, SeedKind, Track, TrackId};
use crate::vector;
use anyhow::Result;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub const DEFAULT_DIMENSION: usize = 16;
pub const DEFAULT_CLUSTERS: usize = 5;
const ARTISTS_PER_CLUSTER: usize = 6;
const TRACK_DURATION_MS: u64 = 200_000;
const HOUR_MS: i64 = 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SimulationOptions {
    pub interactions: usize,
    pub plays: usize,
    /// Share of warm-up interactions spent on the favourite genre, in percent.
    pub focus_percent: u8,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            interactions: 30,
            plays: 20,
            focus_percent: 80,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SimulationReport {
    pub interactions_recorded: usize,
    pub profile_valid: bool,
    pub plays: usize,
    /// Played tracks from the favourite genre.
    pub on_taste_plays: usize,
    pub distinct_artists: usize,
    pub queue_remaining: usize,
}

impl SimulationReport {
    #[must_use]
    pub fn on_taste_ratio(&self) -> f64 {
        if self.plays == 0 {
            0.0
        } else {
            self.on_taste_plays as f64 / self.plays as f64
        }
    }
}

struct CatalogData {
    tracks: Vec<Track>,
    embeddings: HashMap<TrackId, Embedding>,
    /// Cluster index per track, aligned with `tracks`.
    clusters: Vec<usize>,
    /// Fixed permutations standing in for the discovery and trending feeds.
    discovery_order: Vec<usize>,
    trending_order: Vec<usize>,
}

/// Synthetic, deterministic-per-seed music catalog.
#[derive(Clone)]
pub struct SyntheticCatalog {
    data: Arc<CatalogData>,
    favourite: usize,
}

impl SyntheticCatalog {
    #[must_use]
    pub fn generate(size: usize, clusters: usize, dimension: usize, seed: u64) -> Self {
        let clusters = clusters.max(1);
        let dimension = dimension.max(2);
        let mut rng = StdRng::seed_from_u64(seed);

        let centroids: Vec<Embedding> = (0..clusters).map(|_| random_unit(&mut rng, dimension)).collect();
        let mut tracks = Vec::with_capacity(size);
        let mut embeddings = HashMap::with_capacity(size);
        let mut cluster_of = Vec::with_capacity(size);

        for i in 0..size {
            let cluster = i % clusters;
            let artist = (i / clusters) % ARTISTS_PER_CLUSTER;
            let track = Track::new(format!("t{i:04}"), format!("artist-{cluster}-{artist}"))
                .with_title(format!("Track {i}"))
                .with_genre(format!("genre-{cluster}"))
                .with_duration_ms(TRACK_DURATION_MS)
                .with_explicit(i % 17 == 0);

            let noise = random_unit(&mut rng, dimension);
            let mut embedding = centroids[cluster].clone();
            vector::add_scaled(&mut embedding, &noise, 0.25);
            let embedding = vector::normalized(&embedding).unwrap_or_else(|| centroids[cluster].clone());

            embeddings.insert(track.id.clone(), embedding);
            cluster_of.push(cluster);
            tracks.push(track);
        }

        let mut discovery_order: Vec<usize> = (0..size).collect();
        discovery_order.shuffle(&mut rng);
        let mut trending_order: Vec<usize> = (0..size).collect();
        trending_order.shuffle(&mut rng);

        debug!("Generated synthetic catalog: {size} tracks in {clusters} genres");
        Self {
            data: Arc::new(CatalogData {
                tracks,
                embeddings,
                clusters: cluster_of,
                discovery_order,
                trending_order,
            }),
            favourite: 0,
        }
    }

    #[must_use]
    pub fn tracks(&self) -> &[Track] {
        &self.data.tracks
    }

    #[must_use]
    pub fn favourite_genre(&self) -> String {
        format!("genre-{}", self.favourite)
    }

    #[must_use]
    pub fn embedding(&self, id: &TrackId) -> Option<&Embedding> {
        self.data.embeddings.get(id)
    }

    #[must_use]
    pub fn is_favourite(&self, track: &Track) -> bool {
        track.genre.as_deref() == Some(self.favourite_genre().as_str())
    }

    /// Feature provider answering with the catalog's embeddings.
    #[must_use]
    pub fn feature_provider(&self) -> Arc<dyn FeatureProvider> {
        Arc::new(CatalogFeatures {
            data: Arc::clone(&self.data),
        })
    }

    /// Register the catalog's feature provider and bind every candidate source.
    #[must_use]
    pub fn attach(&self, builder: EngineBuilder) -> EngineBuilder {
        let mut builder = builder.feature_provider(self.feature_provider());
        for source in CandidateSource::ALL {
            let catalog = self.clone();
            builder = builder.source(source, provider_fn(move |req| catalog.fetch(source, req)));
        }
        builder
    }

    fn fetch(&self, source: CandidateSource, req: &SourceRequest<'_>) -> Result<Vec<Track>> {
        let data = &self.data;
        let indices: Box<dyn Iterator<Item = usize> + '_> = match source {
            CandidateSource::Library => Box::new(0..data.tracks.len()),
            CandidateSource::Liked => {
                let favourite = self.favourite;
                Box::new((0..data.tracks.len()).filter(move |&i| data.clusters[i] == favourite))
            }
            CandidateSource::Discovery => Box::new(data.discovery_order.iter().copied()),
            CandidateSource::Trending => Box::new(data.trending_order.iter().copied()),
            CandidateSource::Similar => {
                let Some(reference) = req.seed_track.and_then(|t| data.embeddings.get(&t.id)) else {
                    return Ok(Vec::new());
                };
                let mut ranked: Vec<(usize, f32)> = (0..data.tracks.len())
                    .filter_map(|i| {
                        let emb = data.embeddings.get(&data.tracks[i].id)?;
                        Some((i, vector::cosine_similarity(reference, emb)))
                    })
                    .collect();
                ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
                Box::new(ranked.into_iter().map(|(i, _)| i))
            }
            CandidateSource::Radio => {
                let Some(seed) = req.seed else {
                    return Ok(Vec::new());
                };
                let seed = seed.clone();
                Box::new((0..data.tracks.len()).filter(move |&i| {
                    let track = &data.tracks[i];
                    match seed.kind {
                        SeedKind::Genre => track.genre.as_deref() == Some(seed.id.as_str()),
                        SeedKind::Artist => track.artist_id == seed.id,
                        SeedKind::Track => data
                            .tracks
                            .iter()
                            .position(|t| t.id.as_str() == seed.id)
                            .is_some_and(|s| data.clusters[s] == data.clusters[i]),
                    }
                }))
            }
        };

        Ok(indices
            .map(|i| &data.tracks[i])
            .filter(|t| !req.exclude.contains(&t.id))
            .take(req.limit)
            .cloned()
            .collect())
    }
}

struct CatalogFeatures {
    data: Arc<CatalogData>,
}

impl FeatureProvider for CatalogFeatures {
    fn id(&self) -> &str {
        "synthetic-catalog"
    }

    fn provide(&self, track: &TrackId) -> Result<TrackFeatures> {
        Ok(TrackFeatures {
            embedding: self.data.embeddings.get(track).cloned(),
            ..TrackFeatures::default()
        })
    }
}

fn random_unit<R: Rng + ?Sized>(rng: &mut R, dimension: usize) -> Embedding {
    loop {
        let v: Embedding = (0..dimension).map(|_| rng.gen_range(-1.0..1.0)).collect();
        if let Some(unit) = vector::normalized(&v) {
            return unit;
        }
    }
}

/// Feed warm-up interactions, then play through the queue.
///
/// Warm-up interactions favour the catalog's favourite genre (likes and
/// completed listens); the rest are skips. During playback favourite-genre
/// tracks are listened to completion and everything else is skipped early.
pub fn run(engine: &mut Engine, catalog: &SyntheticCatalog, options: &SimulationOptions, seed: u64) -> SimulationReport {
    let mut rng = StdRng::seed_from_u64(seed ^ 0x5eed);
    let now = engine.now_ms();
    let favourites: Vec<&Track> = catalog.tracks().iter().filter(|t| catalog.is_favourite(t)).collect();
    let others: Vec<&Track> = catalog.tracks().iter().filter(|t| !catalog.is_favourite(t)).collect();

    let mut report = SimulationReport::default();
    for i in 0..options.interactions {
        let age = (options.interactions - i) as i64 * HOUR_MS;
        let on_taste = rng.gen_range(0..100) < u32::from(options.focus_percent);
        let pool = if on_taste && !favourites.is_empty() { &favourites } else { &others };
        let Some(track) = pool.choose(&mut rng) else {
            continue;
        };

        let event = if on_taste {
            let kind = if rng.gen_bool(0.3) {
                InteractionKind::Like
            } else {
                InteractionKind::Listen
            };
            InteractionEvent::new(track.id.clone(), kind, Vec::new(), now - age)
                .with_playback(TRACK_DURATION_MS, TRACK_DURATION_MS)
        } else {
            InteractionEvent::new(track.id.clone(), InteractionKind::Listen, Vec::new(), now - age)
                .with_playback(TRACK_DURATION_MS / 10, TRACK_DURATION_MS)
        };
        let mut event = event.with_artist(&track.artist_id);
        if let Some(genre) = &track.genre {
            event = event.with_genre(genre);
        }
        engine.record_interaction(event);
        report.interactions_recorded += 1;
    }
    report.profile_valid = engine.taste().is_profile_valid();
    info!(
        "Warm-up done: {} interactions, profile {}",
        report.interactions_recorded,
        if report.profile_valid { "valid" } else { "not yet valid" }
    );

    if engine.queue().is_empty() {
        if let Err(e) = engine.replenish() {
            warn!("Initial replenish failed: {e}");
        }
    }

    let mut artists = HashSet::new();
    for _ in 0..options.plays {
        let Some(track) = engine.pop_next() else {
            break;
        };
        report.plays += 1;
        artists.insert(track.artist_id.clone());
        if catalog.is_favourite(&track) {
            report.on_taste_plays += 1;
            engine.record_listen(&track, TRACK_DURATION_MS, TRACK_DURATION_MS);
        } else {
            engine.record_listen(&track, TRACK_DURATION_MS / 10, TRACK_DURATION_MS);
        }
    }
    report.distinct_artists = artists.len();
    report.queue_remaining = engine.queue().len();
    report
}
