// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Automatic enhancement — black, gray and white point estimation from a raw
// histogram, and conversion of those points into gamma / brightness /
// contrast settings.

use serde::{Deserialize, Serialize};
use tracing::debug;

use scanwerk_core::{AcquisitionParameters, ChannelAdjust, ContrastRange};

/// Number of histogram levels.
pub const HIST_LEVELS: usize = 256;

/// Noise floor divisor: one count per this many samples is ignored.
const NOISE_DIVISOR: u64 = 5000;

/// Weight factor of the log-weighted gray point.
const LOG_WEIGHT: f64 = 10.0;

/// Histogram levels per percent.
const LEVELS_PER_PERCENT: f64 = 2.55;

/// Four parallel 256-level histograms gathered from a representative sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistogramCounts {
    /// Intensity of every sample (gray value, or mean of r/g/b).
    pub total: [u64; HIST_LEVELS],
    pub red: [u64; HIST_LEVELS],
    pub green: [u64; HIST_LEVELS],
    pub blue: [u64; HIST_LEVELS],
}

impl Default for HistogramCounts {
    fn default() -> Self {
        Self::new()
    }
}

impl HistogramCounts {
    pub fn new() -> Self {
        Self {
            total: [0; HIST_LEVELS],
            red: [0; HIST_LEVELS],
            green: [0; HIST_LEVELS],
            blue: [0; HIST_LEVELS],
        }
    }

    /// Count 8-bit gray samples.
    pub fn accumulate_gray(&mut self, samples: &[u8]) {
        for &s in samples {
            self.total[s as usize] += 1;
        }
    }

    /// Count interleaved 8-bit RGB samples. A trailing partial pixel is ignored.
    pub fn accumulate_rgb(&mut self, samples: &[u8]) {
        for px in samples.chunks_exact(3) {
            let (r, g, b) = (px[0], px[1], px[2]);
            self.red[r as usize] += 1;
            self.green[g as usize] += 1;
            self.blue[b as usize] += 1;
            let intensity = (r as u16 + g as u16 + b as u16) / 3;
            self.total[intensity as usize] += 1;
        }
    }

    /// Number of samples in the intensity histogram.
    pub fn sample_count(&self) -> u64 {
        self.total.iter().sum()
    }

    fn is_empty(&self) -> bool {
        [&self.total, &self.red, &self.green, &self.blue]
            .iter()
            .all(|h| h.iter().all(|&c| c == 0))
    }
}

/// Black, gray and white points in percent of full scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnhancementPoints {
    pub black: f64,
    pub gray: f64,
    pub white: f64,
}

impl Default for EnhancementPoints {
    fn default() -> Self {
        Self {
            black: 0.0,
            gray: 50.0,
            white: 100.0,
        }
    }
}

impl EnhancementPoints {
    /// Gamma / brightness / contrast that map black to 0 %, white to 100 %
    /// and gray to 50 %.
    ///
    /// A span narrower than one percent yields the identity adjustment.
    pub fn to_adjust(&self, range: &ContrastRange) -> ChannelAdjust {
        let span = self.white - self.black;
        if span < 1.0 {
            return ChannelAdjust::default();
        }

        let contrast = range.clamp((100.0 / span - 1.0) * 100.0);
        let slope = 1.0 + contrast / 100.0;
        let offset = 100.0 - (self.white - 50.0) * slope;
        let brightness = (offset / 50.0 - 1.0) * 100.0;

        let ratio = ((self.gray - self.black) / span).clamp(0.01, 0.99);
        let gamma = (ratio.ln() / 0.5f64.ln()).clamp(0.1, 10.0);

        ChannelAdjust {
            gamma,
            brightness,
            contrast,
        }
    }
}

/// Estimated points for the combined histogram and each color channel.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AutoEnhancement {
    /// From all four histograms together; drives the master (gray) values.
    pub master: EnhancementPoints,
    pub red: EnhancementPoints,
    pub green: EnhancementPoints,
    pub blue: EnhancementPoints,
}

impl AutoEnhancement {
    /// Write the estimated adjustments into a parameter set.
    ///
    /// The master values always change. With `per_channel`, the color
    /// offsets are set so that each channel's combined adjustment matches
    /// its own points.
    pub fn apply_to(&self, params: &mut AcquisitionParameters, per_channel: bool) {
        let range = params.contrast_range;
        let master = self.master.to_adjust(&range);
        params.gray = master;

        let offset = |points: &EnhancementPoints| {
            if !per_channel {
                return ChannelAdjust::default();
            }
            let own = points.to_adjust(&range);
            ChannelAdjust {
                gamma: own.gamma / master.gamma,
                brightness: own.brightness - master.brightness,
                contrast: own.contrast - master.contrast,
            }
        };
        params.red = offset(&self.red);
        params.green = offset(&self.green);
        params.blue = offset(&self.blue);
    }
}

/// Estimate black, gray and white points from a histogram.
///
/// The noise floor is `1 + total / 5000` samples. Black is the first level
/// from the bottom where the accumulated count (averaged over the
/// contributing histograms) reaches the floor; white is the same from the
/// top. Gray is where the accumulated `10 * ln(1 + count)` weight between
/// black and white reaches half its total. An empty histogram yields
/// 0 / 50 / 100.
pub fn estimate_auto_enhancement(counts: &HistogramCounts) -> AutoEnhancement {
    if counts.is_empty() {
        return AutoEnhancement::default();
    }

    let limit = 1 + counts.sample_count() / NOISE_DIVISOR;

    let estimate = AutoEnhancement {
        master: estimate_points(
            &[&counts.total, &counts.red, &counts.green, &counts.blue],
            limit,
        ),
        red: estimate_points(&[&counts.red], limit),
        green: estimate_points(&[&counts.green], limit),
        blue: estimate_points(&[&counts.blue], limit),
    };
    debug!(
        limit,
        black = estimate.master.black,
        gray = estimate.master.gray,
        white = estimate.master.white,
        "auto enhancement estimated"
    );
    estimate
}

fn estimate_points(histograms: &[&[u64; HIST_LEVELS]], limit: u64) -> EnhancementPoints {
    let level_count = |level: usize| -> u64 { histograms.iter().map(|h| h[level]).sum() };
    if (0..HIST_LEVELS).all(|level| level_count(level) == 0) {
        return EnhancementPoints::default();
    }

    let divisor = histograms.len() as f64;
    let limit = limit as f64;

    let mut black = 0;
    let mut running = 0u64;
    for level in 0..HIST_LEVELS {
        black = level;
        running += level_count(level);
        if running as f64 / divisor >= limit {
            break;
        }
    }

    let mut white = HIST_LEVELS - 1;
    running = 0;
    for level in (black..HIST_LEVELS).rev() {
        white = level;
        running += level_count(level);
        if running as f64 / divisor >= limit {
            break;
        }
    }

    let weight = |level: usize| LOG_WEIGHT * (1.0 + level_count(level) as f64).ln();
    let total_weight: f64 = (black..=white).map(weight).sum();
    let gray = if total_weight > 0.0 {
        let half = total_weight / 2.0;
        let mut accumulated = 0.0;
        let mut gray = white;
        for level in black..=white {
            accumulated += weight(level);
            if accumulated >= half {
                gray = level;
                break;
            }
        }
        gray as f64
    } else {
        (black + white) as f64 / 2.0
    };

    EnhancementPoints {
        black: black as f64 / LEVELS_PER_PERCENT,
        gray: gray / LEVELS_PER_PERCENT,
        white: white as f64 / LEVELS_PER_PERCENT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tolerance: f64) -> bool {
        (a - b).abs() <= tolerance
    }

    #[test]
    fn empty_histogram_falls_back() {
        let estimate = estimate_auto_enhancement(&HistogramCounts::new());
        assert_eq!(estimate.master, EnhancementPoints::default());
        assert_eq!(estimate.master.gray, 50.0);
    }

    #[test]
    fn flat_histogram_collapses_to_one_level() {
        let mut counts = HistogramCounts::new();
        for h in [
            &mut counts.total,
            &mut counts.red,
            &mut counts.green,
            &mut counts.blue,
        ] {
            h[128] = 10_000;
        }

        let estimate = estimate_auto_enhancement(&counts);
        let expected = 128.0 / 2.55;
        let tolerance = 1.0 / 2.55;
        let master = estimate.master;
        assert!(close(master.black, expected, tolerance), "{master:?}");
        assert!(close(master.gray, expected, tolerance), "{master:?}");
        assert!(close(master.white, expected, tolerance), "{master:?}");
        assert!(close(estimate.red.gray, expected, tolerance));
    }

    #[test]
    fn noise_below_floor_is_ignored() {
        let mut counts = HistogramCounts::new();
        // 49_910 samples spread over 40..=200 -> limit = 10.
        for level in 40..=200 {
            counts.total[level] = 310;
        }
        // A couple of stray samples at the extremes stay under the floor.
        counts.total[2] = 3;
        counts.total[250] = 3;

        let estimate = estimate_auto_enhancement(&counts);
        let master = estimate.master;
        // Four histograms contribute, three of them empty: 313 / 4 >= 10 at
        // the first populated level.
        assert!(close(master.black, 40.0 / 2.55, 1e-9), "{master:?}");
        assert!(close(master.white, 200.0 / 2.55, 1e-9), "{master:?}");
        assert!(master.gray > master.black && master.gray < master.white);
        // Color channels were never sampled.
        assert_eq!(estimate.red, EnhancementPoints::default());
    }

    #[test]
    fn gray_point_follows_log_weight() {
        let mut counts = HistogramCounts::new();
        counts.total[50] = 20_000;
        counts.total[100] = 20;
        counts.total[200] = 20_000;

        let master = estimate_auto_enhancement(&counts).master;
        // ln weights: 99.0 at 50 and 200, 30.4 at 100. Half of the total
        // is reached inside the level-100 bucket, not at the arithmetic mean.
        assert!(close(master.gray, 100.0 / 2.55, 1e-9), "{master:?}");
    }

    #[test]
    fn points_to_adjust_identity() {
        let adjust = EnhancementPoints::default().to_adjust(&ContrastRange::default());
        assert!(close(adjust.gamma, 1.0, 1e-9));
        assert!(close(adjust.brightness, 0.0, 1e-9));
        assert!(close(adjust.contrast, 0.0, 1e-9));
    }

    #[test]
    fn points_to_adjust_stretches_span() {
        let points = EnhancementPoints {
            black: 25.0,
            gray: 50.0,
            white: 75.0,
        };
        let adjust = points.to_adjust(&ContrastRange::default());
        assert!(close(adjust.contrast, 100.0, 1e-9));
        assert!(close(adjust.brightness, 0.0, 1e-9));
        assert!(close(adjust.gamma, 1.0, 1e-9));
    }

    #[test]
    fn degenerate_span_is_identity() {
        let points = EnhancementPoints {
            black: 50.0,
            gray: 50.0,
            white: 50.2,
        };
        assert_eq!(
            points.to_adjust(&ContrastRange::default()),
            ChannelAdjust::default()
        );
    }

    #[test]
    fn apply_sets_channel_offsets() {
        let estimate = AutoEnhancement {
            master: EnhancementPoints::default(),
            red: EnhancementPoints {
                black: 10.0,
                gray: 50.0,
                white: 90.0,
            },
            ..Default::default()
        };
        let mut params = AcquisitionParameters::default();
        estimate.apply_to(&mut params, true);

        let red = params.effective(scanwerk_core::Channel::Red);
        let expected = estimate.red.to_adjust(&params.contrast_range);
        assert!(close(red.contrast, expected.contrast, 1e-9));
        assert!(close(red.brightness, expected.brightness, 1e-9));
        assert_eq!(params.green, ChannelAdjust::default());
    }

    #[test]
    fn rgb_accumulation_feeds_all_histograms() {
        let mut counts = HistogramCounts::new();
        counts.accumulate_rgb(&[30, 60, 90, 0, 0, 3, 7]);
        assert_eq!(counts.red[30], 1);
        assert_eq!(counts.green[60], 1);
        assert_eq!(counts.blue[3], 1);
        assert_eq!(counts.total[60], 1);
        assert_eq!(counts.total[1], 1);
        assert_eq!(counts.sample_count(), 2);
    }
}
