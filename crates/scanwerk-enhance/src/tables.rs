// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-session table sets — the lookup tables one acquisition session needs
// for the frame format and depth the device reported.

use tracing::{debug, instrument};

use scanwerk_core::{AcquisitionParameters, Channel, FrameDescriptor, FrameFormat};

use crate::curve::{CurveInput, LookupTable, build_curve, build_threshold_curve};

/// Lookup tables for every channel a session writes.
///
/// Color frames get red, green and blue tables even for a single-channel
/// pass, because the tables are built once on the first pass and reused by
/// the passes that follow.
#[derive(Debug, Clone, Default)]
pub struct EnhancementTables {
    gray: Option<LookupTable>,
    red: Option<LookupTable>,
    green: Option<LookupTable>,
    blue: Option<LookupTable>,
}

impl EnhancementTables {
    /// Tables for a frame at its native depth (`2^depth` entries).
    ///
    /// 1-bit frames get no tables. With `lineart_from_gray` an 8-bit gray
    /// frame gets a threshold table instead of a gamma curve.
    #[instrument(level = "debug", skip(params))]
    pub fn for_frame(
        params: &AcquisitionParameters,
        frame: &FrameDescriptor,
        lineart_from_gray: bool,
    ) -> Self {
        if frame.bit_depth != 8 && frame.bit_depth != 16 {
            debug!(depth = frame.bit_depth, "no lookup tables for this depth");
            return Self::default();
        }
        let size = 1usize << frame.bit_depth;
        let maxout = (size - 1) as u16;

        match frame.format {
            FrameFormat::Gray if lineart_from_gray && frame.bit_depth == 8 => Self {
                gray: Some(build_threshold_curve(params.threshold, size)),
                ..Default::default()
            },
            FrameFormat::Gray => Self {
                gray: Some(channel_curve(params, Channel::Gray, size, maxout)),
                ..Default::default()
            },
            _ => Self {
                gray: None,
                red: Some(channel_curve(params, Channel::Red, size, maxout)),
                green: Some(channel_curve(params, Channel::Green, size, maxout)),
                blue: Some(channel_curve(params, Channel::Blue, size, maxout)),
            },
        }
    }

    /// All four tables at a caller-chosen size, for preview rendering.
    pub fn preview(params: &AcquisitionParameters, size: usize, maxout: u16) -> Self {
        Self {
            gray: Some(channel_curve(params, Channel::Gray, size, maxout)),
            red: Some(channel_curve(params, Channel::Red, size, maxout)),
            green: Some(channel_curve(params, Channel::Green, size, maxout)),
            blue: Some(channel_curve(params, Channel::Blue, size, maxout)),
        }
    }

    pub fn table(&self, channel: Channel) -> Option<&LookupTable> {
        match channel {
            Channel::Gray => self.gray.as_ref(),
            Channel::Red => self.red.as_ref(),
            Channel::Green => self.green.as_ref(),
            Channel::Blue => self.blue.as_ref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.gray.is_none() && self.red.is_none() && self.green.is_none() && self.blue.is_none()
    }
}

fn channel_curve(
    params: &AcquisitionParameters,
    channel: Channel,
    size: usize,
    maxout: u16,
) -> LookupTable {
    build_curve(&CurveInput::for_channel(params, channel), size, maxout)
}
