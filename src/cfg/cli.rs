// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::path::PathBuf;

use anyhow::{Context, Result, ensure};

/// Environment override for the config location, checked before argv.
pub const CONFIG_ENV: &str = "DNS_FRONTEND_CONFIG";

/// Picks the config file location: `DNS_FRONTEND_CONFIG` wins, then the
/// first command-line argument, then `default`.
pub fn config_path_from_args(default: &str) -> Result<PathBuf> {
    let chosen = std::env::var(CONFIG_ENV)
        .ok()
        .or_else(|| std::env::args().nth(1))
        .unwrap_or_else(|| default.to_string());
    resolve_config_path(&chosen)
}

/// Resolves a config location against the working directory. The file
/// must already exist; a missing config is a startup error, not
/// something to create on the fly.
pub fn resolve_config_path(location: &str) -> Result<PathBuf> {
    let candidate = PathBuf::from(location);
    let full = if candidate.is_absolute() {
        candidate
    } else {
        std::env::current_dir()
            .context("working directory is unavailable")?
            .join(candidate)
    };

    ensure!(full.is_file(), "config file {full:?} does not exist");
    full.canonicalize()
        .with_context(|| format!("cannot resolve config path {full:?}"))
}
