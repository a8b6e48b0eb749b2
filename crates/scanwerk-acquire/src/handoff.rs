// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Post-processing handoff — where a finalized container goes next.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use scanwerk_core::error::Result;
use scanwerk_core::{AcquisitionParameters, FrameDescriptor, OutputMode, ProjectKind, SessionId};

use crate::container::ImageHeader;

/// A finalized container and what produced it.
#[derive(Debug, Clone)]
pub struct ScanProduct {
    pub path: PathBuf,
    pub session: SessionId,
    pub page_counter: u32,
    /// Parameters of the last pass.
    pub frame: FrameDescriptor,
    pub header: ImageHeader,
    pub params: AcquisitionParameters,
    pub completed_at: DateTime<Utc>,
}

/// Collaborators that take a finished container.
pub trait PostProcessor {
    fn view(&mut self, product: &ScanProduct) -> Result<()>;

    fn save(&mut self, product: &ScanProduct) -> Result<()>;

    fn rotate(&mut self, product: &ScanProduct, quarter_turns: u8) -> Result<()>;

    /// Pack a byte-per-pixel lineart container back to one bit per pixel.
    fn repack_lineart(&mut self, product: &ScanProduct) -> Result<()>;

    fn register_project(&mut self, kind: ProjectKind, product: &ScanProduct) -> Result<()>;
}

/// Route a finished container to the collaborator for `mode`.
#[instrument(skip(processor, product), fields(path = %product.path.display()))]
pub fn hand_off<P: PostProcessor + ?Sized>(
    mode: OutputMode,
    processor: &mut P,
    product: &ScanProduct,
) -> Result<()> {
    info!("handing off finished scan");
    match mode {
        OutputMode::Viewer => processor.view(product),
        OutputMode::Save => processor.save(product),
        OutputMode::Rotate { quarter_turns } => processor.rotate(product, quarter_turns % 4),
        OutputMode::LineartRepack => processor.repack_lineart(product),
        OutputMode::Project(kind) => processor.register_project(kind, product),
    }
}

/// Post-processor that records what it was asked to do.
#[derive(Debug, Default)]
pub struct RecordingProcessor {
    pub calls: Vec<(String, PathBuf)>,
}

impl RecordingProcessor {
    fn record(&mut self, what: impl Into<String>, product: &ScanProduct) -> Result<()> {
        self.calls.push((what.into(), product.path.clone()));
        Ok(())
    }
}

impl PostProcessor for RecordingProcessor {
    fn view(&mut self, product: &ScanProduct) -> Result<()> {
        self.record("view", product)
    }

    fn save(&mut self, product: &ScanProduct) -> Result<()> {
        self.record("save", product)
    }

    fn rotate(&mut self, product: &ScanProduct, quarter_turns: u8) -> Result<()> {
        self.record(format!("rotate {quarter_turns}"), product)
    }

    fn repack_lineart(&mut self, product: &ScanProduct) -> Result<()> {
        self.record("repack", product)
    }

    fn register_project(&mut self, kind: ProjectKind, product: &ScanProduct) -> Result<()> {
        self.record(format!("project {kind:?}"), product)
    }
}
