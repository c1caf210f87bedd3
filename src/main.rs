//! # Cadence
//!
//! Operator CLI for the Cadence recommendation engine. The binary is the
//! composition root: it resolves the data directory, opens the SQLite store,
//! loads `config.json` and builds an [`Engine`] for the requested command.
//!
//! ## Usage
//!
//! ```bash
//! # Inspect the learned taste
//! cadence profile show --top 10
//!
//! # Tune the queue
//! cadence config set queue.max_same_artist 1
//!
//! # Try the engine on a synthetic catalog
//! cadence simulate --interactions 40 --plays 20 --seed 7
//! ```
//!
//! ## Logging
//!
//! Controlled via `RUST_LOG`, e.g. `RUST_LOG=cadence=debug cadence simulate`.

use anyhow::{Context, Result};
use cadence::cli::{self, ConfigAction, ProfileAction};
use cadence::completion;
use cadence::config::{EngineConfig, RuntimeConfig};
use cadence::db::SqliteStore;
use cadence::engine::Engine;
use cadence::simulate::{self, SimulationOptions, SyntheticCatalog, DEFAULT_CLUSTERS, DEFAULT_DIMENSION};
use cadence::storage::{KeyValueStore, MemoryStore};
use clap::{CommandFactory, Parser};
use log::{debug, info};
use serde::Serialize;
use std::fs;
use std::sync::Arc;

/// Resolve store and config locations, letting CLI flags override the data directory.
fn runtime_config(args: &cli::Args) -> Result<RuntimeConfig> {
    let defaults = match (&args.store, &args.config) {
        (Some(store), Some(config)) => return Ok(RuntimeConfig::with_paths(store.clone(), config.clone())),
        _ => RuntimeConfig::new()?,
    };
    Ok(RuntimeConfig::with_paths(
        args.store.clone().unwrap_or(defaults.store_path),
        args.config.clone().unwrap_or(defaults.config_path),
    ))
}

fn open_engine(runtime: &RuntimeConfig) -> Result<Engine> {
    let config = EngineConfig::load_or_default(&runtime.config_path);
    let store = SqliteStore::open(&runtime.store_path)?;
    debug!("Using store {}", runtime.store_path.display());
    Ok(Engine::builder().config(config).store(Arc::new(store)).build())
}

#[derive(Serialize)]
struct ProfileSummary {
    interactions: usize,
    valid: bool,
    min_interactions: usize,
    dimension: Option<usize>,
    contextual_buckets: usize,
    top_genres: Vec<(String, f64)>,
    top_artists: Vec<(String, f64)>,
    liked: usize,
    disliked: usize,
}

fn show_profile(engine: &mut Engine, top: usize, json: bool) -> Result<()> {
    let profile = engine.taste_mut().get_profile();
    let summary = ProfileSummary {
        interactions: engine.taste().interaction_count(),
        valid: profile.is_some(),
        min_interactions: engine.config().taste.min_interactions,
        dimension: profile.as_ref().map(|p| p.stats.dimension),
        contextual_buckets: profile.as_ref().map_or(0, |p| p.contextual.present_count()),
        top_genres: engine.taste_mut().top_genres(top),
        top_artists: engine.taste_mut().top_artists(top),
        liked: engine.preferences().liked_ids().count(),
        disliked: engine.preferences().disliked().count(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Interactions: {} (need {} for a profile)", summary.interactions, summary.min_interactions);
    if !summary.valid {
        println!("Profile: not enough history yet; recommendations explore");
        return Ok(());
    }
    if let Some(dimension) = summary.dimension {
        println!("Profile: {dimension}-dimensional, {} contextual buckets", summary.contextual_buckets);
    }
    println!("Liked: {}  Disliked: {}", summary.liked, summary.disliked);
    println!("Top genres:");
    for (genre, weight) in &summary.top_genres {
        println!("  {genre:<24} {weight:>8.2}");
    }
    println!("Top artists:");
    for (artist, weight) in &summary.top_artists {
        println!("  {artist:<24} {weight:>8.2}");
    }
    Ok(())
}

fn run_simulation(
    runtime: &RuntimeConfig,
    options: SimulationOptions,
    tracks: usize,
    seed: Option<u64>,
    persist: bool,
) -> Result<()> {
    let seed = seed.unwrap_or_else(rand::random);
    let config = EngineConfig::load_or_default(&runtime.config_path);
    let store: Arc<dyn KeyValueStore> = if persist {
        Arc::new(SqliteStore::open(&runtime.store_path)?)
    } else {
        Arc::new(MemoryStore::new())
    };

    let catalog = SyntheticCatalog::generate(tracks, DEFAULT_CLUSTERS, DEFAULT_DIMENSION, seed);
    let mut engine = catalog
        .attach(Engine::builder().config(config).store(store).seed(seed))
        .build();

    info!("Simulating with seed {seed}");
    let report = simulate::run(&mut engine, &catalog, &options, seed);

    println!("Seed:               {seed}");
    println!("Favourite genre:    {}", catalog.favourite_genre());
    println!("Interactions:       {}", report.interactions_recorded);
    println!("Profile valid:      {}", report.profile_valid);
    println!("Plays:              {}", report.plays);
    println!("On-taste plays:     {} ({:.0}%)", report.on_taste_plays, report.on_taste_ratio() * 100.0);
    println!("Distinct artists:   {}", report.distinct_artists);
    println!("Queue remaining:    {}", report.queue_remaining);

    let dispose = engine.dispose();
    for (id, reason) in &dispose.failed {
        eprintln!("Algorithm `{id}` failed to dispose: {reason}");
    }
    Ok(())
}

/// Main entry point for the Cadence CLI.
///
/// Initializes logging, parses arguments and routes each command to the
/// library. Errors propagate as `anyhow::Error` with context.
fn main() -> Result<()> {
    env_logger::init();

    let args = cli::Args::parse();

    match &args.command {
        cli::Command::Completion { shell } => {
            let mut cmd = cli::Args::command();
            completion::generate_completions(completion::shell_to_completion_shell(shell), &mut cmd);
            return Ok(());
        }
        cli::Command::CompleteConfigKeys => return completion::print_config_key_completions(),
        _ => {}
    }

    let runtime = runtime_config(&args)?;

    match args.command {
        cli::Command::Profile { action } => {
            let mut engine = open_engine(&runtime)?;
            match action {
                ProfileAction::Show { top, json } => show_profile(&mut engine, top, json)?,
                ProfileAction::Export { output } => {
                    let json = engine.export_profile()?;
                    match output {
                        Some(path) => {
                            fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
                            println!("Exported profile to {}", path.display());
                        }
                        None => println!("{json}"),
                    }
                }
                ProfileAction::Import { input } => {
                    let json = fs::read_to_string(&input)
                        .with_context(|| format!("Failed to read {}", input.display()))?;
                    let count = engine.import_profile(&json)?;
                    println!("Imported {count} interactions");
                }
                ProfileAction::Clear => {
                    engine.clear_profile();
                    println!("Profile cleared");
                }
            }
            engine.dispose();
        }
        cli::Command::Config { action } => match action {
            ConfigAction::Show { key: None } => {
                let config = EngineConfig::load(&runtime.config_path)?;
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
            ConfigAction::Show { key: Some(key) } => {
                let config = EngineConfig::load(&runtime.config_path)?;
                let value = config
                    .get_value(&key)
                    .with_context(|| format!("Unknown config key `{key}`"))?;
                println!("{value}");
            }
            ConfigAction::Set { key, value } => {
                let mut config = EngineConfig::load(&runtime.config_path)?;
                config.set_value(&key, &value)?;
                config.save(&runtime.config_path)?;
                info!("Set {key} in {}", runtime.config_path.display());
                println!("{key} = {}", config.get_value(&key).unwrap_or_default());
            }
            ConfigAction::Path => {
                println!("config: {}", runtime.config_path.display());
                println!("store:  {}", runtime.store_path.display());
            }
        },
        cli::Command::Simulate {
            interactions,
            plays,
            tracks,
            seed,
            persist,
        } => {
            let options = SimulationOptions {
                interactions,
                plays,
                ..SimulationOptions::default()
            };
            run_simulation(&runtime, options, tracks, seed, persist)?;
        }
        cli::Command::Train => {
            let mut engine = open_engine(&runtime)?;
            let outcome = engine.train_now()?;
            println!("Trained {} on {} samples", outcome.version, outcome.samples_used);
            if let Some(loss) = outcome.loss {
                println!("Loss: {loss:.4}");
            }
            engine.dispose();
        }
        cli::Command::Algorithms => {
            let engine = open_engine(&runtime)?;
            let active = engine.registry().active_id();
            for manifest in engine.registry().manifests() {
                let marker = if active == Some(manifest.id.as_str()) { "*" } else { " " };
                let capabilities: Vec<&str> = manifest.capabilities.iter().map(|c| c.as_str()).collect();
                println!("{marker} {} {} - {}", manifest.id, manifest.version, manifest.name);
                if !manifest.description.is_empty() {
                    println!("    {}", manifest.description);
                }
                println!("    capabilities: {}", capabilities.join(", "));
            }
        }
        cli::Command::Completion { .. } | cli::Command::CompleteConfigKeys => {}
    }

    Ok(())
}
