// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Session configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};
use crate::types::{LoopMode, OutputMode};

/// Persistent scan session settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Directory that receives image containers.
    pub output_dir: PathBuf,
    /// File name stem; the page counter is appended.
    pub filename_stem: String,
    /// Zero-padded width of the page counter.
    pub counter_width: usize,
    /// Counter value of the first page.
    pub first_counter: u32,
    pub extension: String,
    pub loop_mode: LoopMode,
    pub output_mode: OutputMode,
    /// Always expand 1-bit scans to one byte per pixel, even when the
    /// output mode does not need it.
    pub expand_lineart: bool,
    /// Produce lineart by thresholding an 8-bit gray scan.
    pub lineart_from_gray: bool,
    /// Write only the high byte of mapped 16-bit samples.
    pub reduce_to_8bit: bool,
    /// Size of the buffer handed to the device read call.
    pub read_buffer_len: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            filename_stem: "scan".into(),
            counter_width: 3,
            first_counter: 1,
            extension: "pnm".into(),
            loop_mode: LoopMode::Single,
            output_mode: OutputMode::Save,
            expand_lineart: false,
            lineart_from_gray: false,
            reduce_to_8bit: false,
            read_buffer_len: 32 * 1024,
        }
    }
}

impl ScanConfig {
    /// Path of the container for the given page counter.
    pub fn container_path(&self, counter: u32) -> PathBuf {
        let name = format!(
            "{}-{:0width$}.{}",
            self.filename_stem,
            counter,
            self.extension,
            width = self.counter_width
        );
        self.output_dir.join(name)
    }

    /// Load a configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Persist the configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }

    /// Reject settings the session controller cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.read_buffer_len == 0 {
            return Err(ScanError::Config("read_buffer_len must be non-zero".into()));
        }
        if self.filename_stem.is_empty() {
            return Err(ScanError::Config("filename_stem must not be empty".into()));
        }
        if let LoopMode::Adf { max_pages: 0 } = self.loop_mode {
            return Err(ScanError::Config("ADF max_pages must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_paths_are_numbered() {
        let config = ScanConfig {
            output_dir: PathBuf::from("/tmp/out"),
            filename_stem: "page".into(),
            counter_width: 4,
            ..Default::default()
        };
        assert_eq!(
            config.container_path(7),
            PathBuf::from("/tmp/out/page-0007.pnm")
        );
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: ScanConfig =
            serde_json::from_str(r#"{ "filename_stem": "doc", "reduce_to_8bit": true }"#)
                .unwrap();
        assert_eq!(config.filename_stem, "doc");
        assert!(config.reduce_to_8bit);
        assert_eq!(config.loop_mode, LoopMode::Single);
    }

    #[test]
    fn zero_adf_pages_rejected() {
        let config = ScanConfig {
            loop_mode: LoopMode::Adf { max_pages: 0 },
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ScanError::Config(_))));
    }
}
