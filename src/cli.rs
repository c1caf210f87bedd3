//! # Command-Line Interface Module
//!
//! Clap derive definitions for the `cadence` binary. The binary is a thin
//! operator tool around the library: it inspects the persisted taste profile,
//! edits the configuration, runs offline simulations against a synthetic
//! catalog and triggers training.
//!
//! ## Commands
//!
//! - `profile`: Show, export, import or clear the taste profile
//! - `config`: Show or change engine settings
//! - `simulate`: Drive the engine with synthetic listening sessions
//! - `train`: Train the active algorithm on the stored history
//! - `algorithms`: List the registered algorithms
//! - `completion`: Generate shell completions
//!
//! ## Examples
//!
//! ```bash
//! cadence profile show
//! cadence config set queue.max_same_artist 1
//! cadence simulate --interactions 40 --plays 15 --seed 7
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

/// Main application arguments structure.
#[derive(Parser, Debug)]
#[command(name = "cadence")]
#[command(about = "Cadence: taste profiles, smart queues and pluggable ranking for music players")]
#[command(version)]
pub struct Args {
    /// SQLite store holding preferences, queue settings and model artifacts
    ///
    /// Defaults to `cadence.db` in the platform data directory.
    #[arg(long, global = true, env = "CADENCE_STORE", value_hint = clap::ValueHint::FilePath)]
    pub store: Option<PathBuf>,

    /// Engine configuration file (JSON)
    ///
    /// Defaults to `config.json` in the platform data directory. A missing
    /// file means all defaults.
    #[arg(long, global = true, env = "CADENCE_CONFIG", value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Inspect or manage the taste profile
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },

    /// Show or change engine settings
    ///
    /// Keys are dotted paths into the configuration, for example
    /// `taste.half_life_days` or `queue.mode`.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run synthetic listening sessions through the engine
    ///
    /// Builds a clustered catalog, feeds the requested number of interactions
    /// biased towards one cluster, then plays through the smart queue and
    /// reports how often the queue stayed on taste.
    Simulate {
        /// Interactions recorded before playback starts
        #[arg(long, default_value = "30")]
        interactions: usize,

        /// Tracks popped from the queue
        #[arg(long, default_value = "20")]
        plays: usize,

        /// Catalog size
        #[arg(long, default_value = "200")]
        tracks: usize,

        /// Seed for the catalog and exploration noise
        #[arg(long)]
        seed: Option<u64>,

        /// Write the simulated history into the store instead of a scratch store
        #[arg(long)]
        persist: bool,
    },

    /// Train the active algorithm on the stored listening history
    Train,

    /// List registered algorithms and their capabilities
    Algorithms,

    /// Generate shell completions
    ///
    /// Usage: cadence completion bash > ~/.local/share/bash-completion/completions/cadence
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },

    /// List configuration keys for completion (hidden command)
    #[command(hide = true)]
    CompleteConfigKeys,
}

#[derive(Subcommand, Debug)]
pub enum ProfileAction {
    /// Summarize the current taste profile
    Show {
        /// Number of top genres and artists to list
        #[arg(long, default_value = "5")]
        top: usize,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write the interaction log as JSON
    Export {
        /// Output file; stdout when omitted
        #[arg(value_hint = clap::ValueHint::FilePath)]
        output: Option<PathBuf>,
    },

    /// Replace the interaction log from an export
    Import {
        #[arg(value_hint = clap::ValueHint::FilePath)]
        input: PathBuf,
    },

    /// Forget all interactions
    Clear,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration, or a single key
    Show { key: Option<String> },

    /// Set a key and save the configuration file
    Set { key: String, value: String },

    /// Print the configuration and store paths
    Path,
}
