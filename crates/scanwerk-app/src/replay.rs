// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raw scanner dumps — turn a file of raw device bytes into replayable pages.

use clap::ValueEnum;
use tracing::{debug, warn};

use scanwerk_acquire::ReplayPass;
use scanwerk_core::error::{Result, ScanError};
use scanwerk_core::{FrameDescriptor, FrameFormat};
use scanwerk_enhance::HistogramCounts;

/// How the bytes of a dump are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DumpLayout {
    Gray,
    Rgb,
    Rgba,
    /// Each page is a red, a green and a blue pass, one after the other.
    ThreePass,
}

/// Shape of the frames recorded in a dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpSpec {
    pub layout: DumpLayout,
    pub depth: u8,
    pub width: u32,
    /// Lines per page. Without it the whole dump is one page of unknown
    /// length.
    pub lines: Option<u32>,
}

impl DumpSpec {
    fn pass_formats(&self) -> &'static [FrameFormat] {
        match self.layout {
            DumpLayout::Gray => &[FrameFormat::Gray],
            DumpLayout::Rgb => &[FrameFormat::Rgb],
            DumpLayout::Rgba => &[FrameFormat::Rgba],
            DumpLayout::ThreePass => &[FrameFormat::Red, FrameFormat::Green, FrameFormat::Blue],
        }
    }

    fn frame(&self, format: FrameFormat, is_last_frame: bool) -> FrameDescriptor {
        let bits = self.width as u64 * format.samples_per_pixel() as u64 * self.depth as u64;
        FrameDescriptor {
            format,
            bit_depth: self.depth,
            pixels_per_line: self.width,
            lines: self.lines,
            bytes_per_line: bits.div_ceil(8) as u32,
            is_last_frame,
        }
    }

    /// Split dump bytes into pages of passes.
    ///
    /// A trailing partial page is kept for single-pass layouts and dropped
    /// for three-pass dumps, where it would lack channels.
    pub fn pages(&self, data: &[u8]) -> Result<Vec<Vec<ReplayPass>>> {
        let formats = self.pass_formats();
        let pass_bytes = match self.frame(formats[0], true).expected_bytes() {
            Some(bytes) => bytes as usize,
            None => data.len() / formats.len(),
        };
        if pass_bytes == 0 {
            return Err(ScanError::Config(format!(
                "dump of {} bytes holds no complete pass",
                data.len()
            )));
        }

        let page_bytes = pass_bytes * formats.len();
        let mut pages = Vec::new();
        for page in data.chunks(page_bytes) {
            if formats.len() > 1 && page.len() < page_bytes {
                warn!(bytes = page.len(), "dropping incomplete three-pass page");
                break;
            }
            let passes = page
                .chunks(pass_bytes)
                .zip(formats)
                .enumerate()
                .map(|(i, (bytes, &format))| ReplayPass {
                    frame: self.frame(format, i + 1 == formats.len()),
                    data: bytes.to_vec(),
                })
                .collect();
            pages.push(passes);
        }
        debug!(pages = pages.len(), pass_bytes, "dump split into pages");
        Ok(pages)
    }

    /// Histogram of the first page, for auto enhancement. Only 8-bit gray
    /// and RGB dumps qualify.
    pub fn histogram(&self, data: &[u8]) -> Option<HistogramCounts> {
        if self.depth != 8 {
            return None;
        }
        let page_len = match self.frame(self.pass_formats()[0], true).expected_bytes() {
            Some(bytes) => (bytes as usize).min(data.len()),
            None => data.len(),
        };
        let sample = &data[..page_len];
        let mut counts = HistogramCounts::new();
        match self.layout {
            DumpLayout::Gray => counts.accumulate_gray(sample),
            DumpLayout::Rgb => counts.accumulate_rgb(sample),
            DumpLayout::Rgba | DumpLayout::ThreePass => return None,
        }
        Some(counts)
    }
}
