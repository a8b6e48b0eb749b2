// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Gamma curves — medium calibration, brightness/contrast and gamma folded
// into one lookup table per channel.

use scanwerk_core::{AcquisitionParameters, Channel, ChannelAdjust, ContrastRange, MediumChannel};

/// Smallest gamma the engine accepts; lower values are clamped.
const MIN_GAMMA: f64 = 0.01;

/// Smallest highlight - shadow span, in percent.
const MIN_MEDIUM_SPAN: f64 = 0.1;

/// Largest table the engine builds (16-bit samples).
pub const MAX_TABLE_SIZE: usize = 1 << 16;

/// Precomputed output value for every input level of one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupTable {
    entries: Vec<u16>,
    maxout: u16,
}

impl LookupTable {
    /// Identity table of `size` entries scaled to `[0, maxout]`.
    pub fn identity(size: usize, maxout: u16) -> Self {
        build_curve(&CurveInput::default(), size, maxout)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn maxout(&self) -> u16 {
        self.maxout
    }

    pub fn as_slice(&self) -> &[u16] {
        &self.entries
    }

    /// Map an 8-bit sample. Only meaningful on tables with `maxout <= 255`.
    #[inline]
    pub fn map8(&self, sample: u8) -> u8 {
        self.entries[sample as usize] as u8
    }

    /// Map a 16-bit sample through a `2^16` entry table.
    #[inline]
    pub fn map16(&self, sample: u16) -> u16 {
        self.entries[sample as usize]
    }
}

/// Everything one channel's curve depends on.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CurveInput {
    pub adjust: ChannelAdjust,
    pub medium: MediumChannel,
    pub negative: bool,
    pub contrast_range: ContrastRange,
}

impl CurveInput {
    /// Curve input for one channel of a parameter set.
    pub fn for_channel(params: &AcquisitionParameters, channel: Channel) -> Self {
        Self {
            adjust: params.effective(channel),
            medium: params.medium.channel(channel),
            negative: params.is_negative(),
            contrast_range: params.contrast_range,
        }
    }
}

/// Build the lookup table for one channel.
///
/// Each input level goes through the medium remap (shadow/highlight, then
/// medium gamma), the user remap (contrast slope around the mid level,
/// brightness offset) and finally the user gamma scaled to `[0, maxout]`.
/// A negative curve mirrors the input level and inverts the output, so
/// `negative[i] == maxout - positive[size - 1 - i]`.
pub fn build_curve(input: &CurveInput, size: usize, maxout: u16) -> LookupTable {
    let size = size.clamp(2, MAX_TABLE_SIZE);
    let maxin = (size - 1) as f64;
    let midin = (size / 2) as f64;

    let adjust = input.adjust;
    let contrast = input.contrast_range.clamp(adjust.contrast).max(-100.0);
    let slope = 1.0 + contrast / 100.0;
    let offset = (1.0 + adjust.brightness / 100.0) * midin;
    let gamma_inv = 1.0 / adjust.gamma.max(MIN_GAMMA);

    let shadow = input.medium.shadow.clamp(0.0, 100.0 - MIN_MEDIUM_SPAN);
    let highlight = input.medium.highlight.max(shadow + MIN_MEDIUM_SPAN);
    let medium_slope = 100.0 / (highlight - shadow);
    let medium_offset = shadow * maxin / 100.0;
    let medium_gamma_inv = 1.0 / input.medium.gamma.max(MIN_GAMMA);

    let maxout_f = maxout as f64;
    let map_level = |level: f64| -> u16 {
        let mut val = ((level - medium_offset) * medium_slope).clamp(0.0, maxin);
        val = maxin * (val / maxin).powf(medium_gamma_inv);
        val = ((val - midin) * slope + offset).clamp(0.0, maxin);
        let out = (0.5 + maxout_f * (val / maxin).powf(gamma_inv)).floor();
        out.clamp(0.0, maxout_f) as u16
    };

    let entries = (0..size)
        .map(|i| {
            if input.negative {
                maxout - map_level(maxin - i as f64)
            } else {
                map_level(i as f64)
            }
        })
        .collect();

    LookupTable { entries, maxout }
}

/// Two-level table for lineart: `0` below `threshold` percent of the input
/// range, `size - 1` from there on.
pub fn build_threshold_curve(threshold: f64, size: usize) -> LookupTable {
    let size = size.clamp(2, MAX_TABLE_SIZE);
    let maxout = (size - 1) as u16;
    let step = threshold.clamp(0.0, 100.0) / 100.0 * (size - 1) as f64;

    let entries = (0..size)
        .map(|i| if (i as f64) < step { 0 } else { maxout })
        .collect();

    LookupTable { entries, maxout }
}
