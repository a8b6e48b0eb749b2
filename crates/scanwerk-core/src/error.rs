// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Scanwerk.

use thiserror::Error;

use crate::types::FrameFormat;

/// Top-level error type for all Scanwerk operations.
#[derive(Debug, Error)]
pub enum ScanError {
    // -- Acquisition errors --
    #[error("unsupported frame: {format} at {depth}-bit depth")]
    UnsupportedFrame { format: FrameFormat, depth: u8 },

    #[error("device error: {0}")]
    Device(String),

    #[error("image container I/O failed: {0}")]
    ContainerIo(#[from] std::io::Error),

    /// User-requested abort. A terminal outcome, not a failure.
    #[error("scan cancelled")]
    Cancelled,

    // -- Session misuse --
    #[error("invalid session state: {0}")]
    InvalidState(String),

    // -- Configuration / persistence --
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // -- Post-processing --
    #[error("image conversion failed: {0}")]
    ImageError(String),
}

impl ScanError {
    /// Whether this error is the cancellation outcome rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ScanError>;
