// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// scanwerk-enhance — Curve engine for the Scanwerk acquisition pipeline.
//
// Turns gamma / brightness / contrast / medium calibration parameters into
// per-channel lookup tables, builds threshold tables for lineart, and
// estimates black, gray and white points from a raw histogram. Nothing in
// this crate fails: out-of-range inputs are clamped.

pub mod auto;
pub mod curve;
pub mod tables;

pub use auto::{AutoEnhancement, EnhancementPoints, HistogramCounts, estimate_auto_enhancement};
pub use curve::{CurveInput, LookupTable, build_curve, build_threshold_curve};
pub use tables::EnhancementTables;
