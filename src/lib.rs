//! Recommendation and playback-queue engine for music players.
//!
//! Cadence learns a listener's taste from interactions, keeps an auto-play
//! queue topped up with diverse, well-ranked tracks and lets ranking
//! strategies be swapped at runtime as plugins.
//!
//! Core modules:
//! - [`taste`] - Taste profile from weighted, recency-decayed interactions
//! - [`queue`] - Smart queue with candidate sources and artist diversity
//! - [`algorithm`] - Plugin contract and the built-in taste algorithm
//! - [`registry`] - Plugin lifecycle and the active selection
//! - [`scoring`] - Per-algorithm score cache
//! - [`engine`] - Composition of all of the above
//!
//! ### Supporting Modules
//!
//! - [`events`] - Interaction events and the user-event bus
//! - [`preferences`] - Persisted likes, dislikes and play counters
//! - [`features`] - Feature providers and the cached aggregator
//! - [`training`] - Training datasets and scheduling
//! - [`storage`] / [`db`] - Key-value persistence, SQLite backed
//! - [`config`] - Data directory and engine configuration
//! - [`simulate`] - Synthetic catalog for offline runs
//! - [`cli`] / [`completion`] - Command-line interface
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use cadence::engine::Engine;
//! use cadence::queue::{provider_fn, CandidateSource, QueuePosition};
//! use cadence::track::Track;
//!
//! let library = vec![Track::new("t1", "artist-a"), Track::new("t2", "artist-b")];
//! let mut engine = Engine::builder()
//!     .source(CandidateSource::Library, provider_fn(move |_| Ok(library.clone())))
//!     .build();
//!
//! engine.add_to_queue(Track::new("t0", "artist-c"), QueuePosition::Last);
//! if let Some(track) = engine.pop_next() {
//!     engine.record_listen(&track, 180_000, 200_000);
//! }
//! let added = engine.replenish()?;
//! println!("Queued {} tracks", added.len());
//! engine.dispose();
//! # Ok::<(), cadence::error::EngineError>(())
//! ```
//!
//! ## Personalization
//!
//! Each interaction is weighted by kind (like 3.0, download 2.5, playlist add
//! 2.0, listen 1.0, completed plays x1.5) and decayed with a 30 day half-life.
//! Below 5 interactions there is no profile: similarity is neutral (0.5) and
//! the queue explores discovery, trending and library sources instead.
//!
//! ## Error Handling
//!
//! Engine operations return [`error::EngineError`]. Only a missing active
//! algorithm, an unknown algorithm id or a failing plugin are errors;
//! unavailable candidate sources and persistence failures are logged and
//! degrade gracefully. Collaborator traits use `anyhow::Result`.

pub mod algorithm;
pub mod cache;
pub mod cli;
pub mod completion;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod events;
pub mod features;
pub mod preferences;
pub mod queue;
pub mod registry;
pub mod scoring;
pub mod simulate;
pub mod storage;
pub mod taste;
pub mod track;
pub mod training;
pub mod vector;
