//! # Cadence Performance Benchmarks
//!
//! Benchmarks for the hot paths of the engine.
//!
//! ## Benchmark Categories
//!
//! - **Taste Profile**: Profile generation and batch similarity
//! - **Algorithm Scoring**: Built-in algorithm ranking at several sizes
//! - **Queue**: Candidate gathering and diversity-capped submission
//! - **Engine**: Full replenish cycle on a synthetic catalog
//! - **Storage**: SQLite key-value writes and reads
//!
//! ## Running Benchmarks
//!
//! ```bash
//! # Run all benchmarks
//! cargo bench
//!
//! # Run specific benchmark group
//! cargo bench taste
//! cargo bench queue
//! ```

use cadence::algorithm::{Algorithm, ScoringCandidate, ScoringContext, TasteAlgorithm};
use cadence::db::SqliteStore;
use cadence::engine::Engine;
use cadence::events::{InteractionContext, InteractionEvent, InteractionKind};
use cadence::queue::{CandidateContext, CandidateSource, SmartQueueManager};
use cadence::simulate::{self, SimulationOptions, SyntheticCatalog, DEFAULT_CLUSTERS, DEFAULT_DIMENSION};
use cadence::storage::KeyValueStore;
use cadence::taste::{TasteConfig, TasteProfileEngine};
use cadence::track::{Embedding, ScoredTrack};
use cadence::vector;
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use std::hint::black_box;
use std::sync::Arc;
use tempfile::TempDir;

const NOW: i64 = 1_700_000_000_000;
const HOUR_MS: i64 = 60 * 60 * 1000;

fn catalog(size: usize) -> SyntheticCatalog {
    SyntheticCatalog::generate(size, DEFAULT_CLUSTERS, DEFAULT_DIMENSION, 42)
}

fn embeddings(catalog: &SyntheticCatalog) -> Vec<Embedding> {
    catalog
        .tracks()
        .iter()
        .filter_map(|t| catalog.embedding(&t.id).cloned())
        .collect()
}

fn taste_engine(catalog: &SyntheticCatalog, interactions: usize) -> TasteProfileEngine {
    let mut taste = TasteProfileEngine::new(TasteConfig::default());
    for (i, track) in catalog.tracks().iter().take(interactions).enumerate() {
        let kind = if i % 3 == 0 { InteractionKind::Like } else { InteractionKind::Listen };
        let embedding = catalog.embedding(&track.id).cloned().unwrap_or_default();
        taste.add_interaction(
            InteractionEvent::new(track.id.clone(), kind, embedding, NOW - i as i64 * HOUR_MS)
                .with_completed(true)
                .with_genre(track.genre.clone().unwrap_or_default()),
        );
    }
    taste
}

/// Benchmark taste profile generation and similarity
fn benchmark_taste_profile(c: &mut Criterion) {
    let mut group = c.benchmark_group("taste");
    let catalog = catalog(1000);

    for size in [50, 200, 1000].iter() {
        let taste = taste_engine(&catalog, *size);
        group.bench_with_input(BenchmarkId::new("generate_profile", size), &taste, |b, taste| {
            b.iter_batched(
                || taste.clone(),
                |mut taste| black_box(taste.generate_profile_at(NOW)),
                BatchSize::SmallInput,
            )
        });
    }

    let mut taste = taste_engine(&catalog, 200);
    let all = embeddings(&catalog);
    let ctx = InteractionContext::new(20, 5);
    group.bench_function("score_1000_candidates", |b| {
        b.iter(|| taste.score_candidates(black_box(&all), Some(ctx)))
    });

    let query = all[0].clone();
    group.bench_function("batch_cosine_1000", |b| {
        b.iter(|| vector::batch_cosine(black_box(&query), black_box(&all)))
    });

    group.finish();
}

/// Benchmark built-in algorithm ranking
fn benchmark_algorithm_scoring(c: &mut Criterion) {
    let mut group = c.benchmark_group("algorithm_scoring");
    let catalog = catalog(1000);
    let query = catalog.embedding(&catalog.tracks()[0].id).cloned();
    let ctx = ScoringContext::new(InteractionContext::new(9, 2), NOW).with_query_vector(query, true);

    for size in [10, 100, 1000].iter() {
        let candidates: Vec<ScoringCandidate> = catalog
            .tracks()
            .iter()
            .take(*size)
            .map(|t| ScoringCandidate::new(t.clone()).with_embedding(catalog.embedding(&t.id).cloned()))
            .collect();

        group.bench_with_input(BenchmarkId::new("rank_candidates", size), &candidates, |b, candidates| {
            let mut algorithm = TasteAlgorithm::new();
            b.iter(|| algorithm.rank_candidates(black_box(candidates), black_box(&ctx)))
        });
    }

    group.finish();
}

/// Benchmark candidate gathering and queue submission
fn benchmark_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue");
    let catalog = catalog(500);
    let engine = catalog.attach(Engine::builder().clock(Arc::new(|| NOW))).build();

    let ctx = CandidateContext::new(CandidateSource::EXPLORATION, 10);
    group.bench_function("get_candidates", |b| b.iter(|| engine.candidates(black_box(&ctx))));

    let ranked: Vec<ScoredTrack> = catalog
        .tracks()
        .iter()
        .take(100)
        .enumerate()
        .map(|(i, t)| ScoredTrack::new(t.clone(), 100.0 - i as f64))
        .collect();
    group.bench_function("submit_ranking_100", |b| {
        b.iter_batched(
            SmartQueueManager::default,
            |mut queue| black_box(queue.submit_ranking(&ranked)),
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

/// Benchmark a full simulated session
fn benchmark_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine");
    group.sample_size(20);
    let catalog = catalog(500);
    let options = SimulationOptions {
        interactions: 50,
        plays: 30,
        ..SimulationOptions::default()
    };

    group.bench_function("simulated_session", |b| {
        b.iter_batched(
            || catalog.attach(Engine::builder().clock(Arc::new(|| NOW)).seed(1)).build(),
            |mut engine| black_box(simulate::run(&mut engine, &catalog, &options, 1)),
            BatchSize::LargeInput,
        )
    });

    group.finish();
}

/// Benchmark SQLite store operations
fn benchmark_storage(c: &mut Criterion) {
    let mut group = c.benchmark_group("storage");
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let store = SqliteStore::open(&temp_dir.path().join("bench.db")).expect("Failed to open store");
    let payload = "x".repeat(4096);

    group.bench_function("set_4k", |b| {
        b.iter(|| store.set_item(black_box("bench.key"), black_box(&payload)))
    });
    group.bench_function("get_4k", |b| b.iter(|| store.get_item(black_box("bench.key"))));

    group.finish();
}

// Group all benchmarks
criterion_group!(
    benches,
    benchmark_taste_profile,
    benchmark_algorithm_scoring,
    benchmark_queue,
    benchmark_engine,
    benchmark_storage
);

criterion_main!(benches);
