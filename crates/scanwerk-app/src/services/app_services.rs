// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central service layer — resolves the data directory, loads configuration
// and enhancement parameters, and builds the post-processor for a run.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use scanwerk_core::error::Result;
use scanwerk_core::{AcquisitionParameters, ScanConfig};

use super::data_dir;
use super::postprocess::FilePostProcessor;

/// Everything a command needs before it talks to a device.
#[derive(Debug, Clone)]
pub struct AppServices {
    data_dir: PathBuf,
    config: ScanConfig,
    params: AcquisitionParameters,
}

impl AppServices {
    /// Initialise services. Call once per command.
    ///
    /// An explicit config file must load; the default one may be missing or
    /// broken, in which case built-in defaults with scans under the data
    /// directory are used.
    pub fn init(config_path: Option<&Path>, params_path: Option<&Path>) -> Result<Self> {
        let dir = data_dir::data_dir()?;
        info!(path = %dir.display(), "initialising app services");

        let config = match config_path {
            Some(path) => ScanConfig::load(path)?,
            None => match load_config(&data_dir::config_path()) {
                Some(config) => config,
                None => ScanConfig {
                    output_dir: data_dir::data_subdir("scans")?,
                    ..Default::default()
                },
            },
        };
        let params = match params_path {
            Some(path) => load_params(path)?,
            None => AcquisitionParameters::default(),
        };

        Ok(Self {
            data_dir: dir,
            config,
            params,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ScanConfig {
        &mut self.config
    }

    pub fn params(&self) -> &AcquisitionParameters {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut AcquisitionParameters {
        &mut self.params
    }

    /// Post-processor writing project lists under the data directory.
    pub fn post_processor(&self) -> Result<FilePostProcessor> {
        Ok(FilePostProcessor::new(data_dir::data_subdir("projects")?))
    }

    /// Persist the current configuration as the default one.
    pub fn save_config(&self) -> Result<PathBuf> {
        let path = data_dir::config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.config.save(&path)?;
        info!(path = %path.display(), "configuration saved");
        Ok(path)
    }
}

fn load_config(path: &Path) -> Option<ScanConfig> {
    if !path.exists() {
        return None;
    }
    match ScanConfig::load(path) {
        Ok(config) => Some(config),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unreadable configuration");
            None
        }
    }
}

/// Load enhancement parameters from a JSON file.
pub fn load_params(path: &Path) -> Result<AcquisitionParameters> {
    let data = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}
