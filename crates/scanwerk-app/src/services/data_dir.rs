// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// XDG data and config directory resolution.

use std::path::PathBuf;

use scanwerk_core::error::Result;

const APP_DIR: &str = "scanwerk";

/// Return the application data directory, creating it if needed.
pub fn data_dir() -> Result<PathBuf> {
    let dir = resolve_base(
        std::env::var("XDG_DATA_HOME").ok(),
        std::env::var("HOME").ok(),
        &[".local", "share"],
    )
    .join(APP_DIR);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Return a subdirectory inside the data dir (e.g. "scans", "projects").
pub fn data_subdir(name: &str) -> Result<PathBuf> {
    let dir = data_dir()?.join(name);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Default location of the JSON configuration file. Not created.
pub fn config_path() -> PathBuf {
    resolve_base(
        std::env::var("XDG_CONFIG_HOME").ok(),
        std::env::var("HOME").ok(),
        &[".config"],
    )
    .join(APP_DIR)
    .join("config.json")
}

/// XDG variable if set and non-empty, else `$HOME/<fallback>`, else `/tmp`.
fn resolve_base(xdg: Option<String>, home: Option<String>, fallback: &[&str]) -> PathBuf {
    if let Some(xdg) = xdg.filter(|v| !v.is_empty()) {
        return PathBuf::from(xdg);
    }
    if let Some(home) = home.filter(|v| !v.is_empty()) {
        return fallback.iter().fold(PathBuf::from(home), |path, part| path.join(part));
    }
    // Last resort
    PathBuf::from("/tmp")
}
