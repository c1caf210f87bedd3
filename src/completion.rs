//! # Shell Completion Module
//!
//! Completion scripts via `clap_complete`, plus the dynamic list of dotted
//! configuration keys used to complete `cadence config show|set`.
//!
//! ## Usage
//!
//! ```bash
//! # Generate bash completions
//! cadence completion bash > ~/.local/share/bash-completion/completions/cadence
//!
//! # Generate zsh completions
//! cadence completion zsh > ~/.config/zsh/completions/_cadence
//! ```

use crate::config::EngineConfig;
use anyhow::{Context, Result};
use clap::Command;
use clap_complete::{generate, Generator, Shell as CompletionShell};
use serde_json::Value;
use std::io::{self, Write};

/// Generate shell completions for the given shell on stdout
pub fn generate_completions<G: Generator>(gen: G, cmd: &mut Command) {
    write_completions(gen, cmd, &mut io::stdout());
}

/// Generate shell completions into any writer
pub fn write_completions<G: Generator>(gen: G, cmd: &mut Command, out: &mut dyn Write) {
    let name = cmd.get_name().to_string();
    generate(gen, cmd, name, out);
}

/// Convert our Shell enum to clap_complete's Shell enum
#[must_use]
pub fn shell_to_completion_shell(shell: &crate::cli::Shell) -> CompletionShell {
    match shell {
        crate::cli::Shell::Bash => CompletionShell::Bash,
        crate::cli::Shell::Zsh => CompletionShell::Zsh,
        crate::cli::Shell::Fish => CompletionShell::Fish,
        crate::cli::Shell::PowerShell => CompletionShell::PowerShell,
        crate::cli::Shell::Elvish => CompletionShell::Elvish,
    }
}

/// Every settable dotted key in [`EngineConfig`], sorted.
///
/// # Errors
///
/// Returns an error if the default configuration cannot be serialized.
pub fn config_keys() -> Result<Vec<String>> {
    let tree = serde_json::to_value(EngineConfig::default()).context("Failed to serialize default config")?;
    let mut keys = Vec::new();
    collect_keys(&tree, "", &mut keys);
    keys.sort();
    Ok(keys)
}

fn collect_keys(node: &Value, prefix: &str, keys: &mut Vec<String>) {
    match node {
        Value::Object(map) => {
            for (name, child) in map {
                let key = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{prefix}.{name}")
                };
                collect_keys(child, &key, keys);
            }
        }
        _ => keys.push(prefix.to_string()),
    }
}

/// Print configuration keys, one per line, for shell completion scripts.
///
/// # Errors
///
/// Returns an error if the keys cannot be computed.
pub fn print_config_key_completions() -> Result<()> {
    for key in config_keys()? {
        println!("{key}");
    }
    Ok(())
}
