// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Subcommand implementations.

use clap::ValueEnum;
use serde::Serialize;
use tracing::{debug, info, warn};

use scanwerk_acquire::{ReplayDevice, SessionController, SessionEvent, drive, drive_batch, read_header};
use scanwerk_core::error::{Result, ScanError};
use scanwerk_core::{AcquisitionParameters, Channel, LoopMode, OutputMode, ProjectKind, ScanConfig};
use scanwerk_enhance::{
    AutoEnhancement, EnhancementTables, HistogramCounts, LookupTable, build_threshold_curve,
    estimate_auto_enhancement,
};
use scanwerk_enhance::curve::MAX_TABLE_SIZE;

use crate::replay::DumpSpec;
use crate::services::app_services::{AppServices, load_params};
use crate::{AutoArgs, CurveArgs, InfoArgs, ScanArgs};

/// Where a finished page goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Viewer,
    Save,
    Rotate,
    Repack,
    Fax,
    Multipage,
    Email,
}

impl ModeArg {
    fn output_mode(self, quarter_turns: u8) -> OutputMode {
        match self {
            Self::Viewer => OutputMode::Viewer,
            Self::Save => OutputMode::Save,
            Self::Rotate => OutputMode::Rotate { quarter_turns },
            Self::Repack => OutputMode::LineartRepack,
            Self::Fax => OutputMode::Project(ProjectKind::Fax),
            Self::Multipage => OutputMode::Project(ProjectKind::Multipage),
            Self::Email => OutputMode::Project(ProjectKind::Email),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ChannelArg {
    Gray,
    Red,
    Green,
    Blue,
}

impl From<ChannelArg> for Channel {
    fn from(arg: ChannelArg) -> Self {
        match arg {
            ChannelArg::Gray => Channel::Gray,
            ChannelArg::Red => Channel::Red,
            ChannelArg::Green => Channel::Green,
            ChannelArg::Blue => Channel::Blue,
        }
    }
}

// ---------------------------------------------------------------------------
// scan
// ---------------------------------------------------------------------------

/// Replay a raw dump through the session controller.
pub async fn scan(args: &ScanArgs) -> Result<()> {
    let mut services = AppServices::init(args.config.as_deref(), args.params.as_deref())?;
    apply_scan_overrides(args, services.config_mut());
    debug!(data_dir = %services.data_dir().display(), "services ready");
    if let Some(threshold) = args.threshold {
        services.params_mut().threshold = threshold;
    }
    if args.negative {
        services.params_mut().negative = true;
    }

    let dump = DumpSpec {
        layout: args.layout,
        depth: args.depth,
        width: args.width,
        lines: args.lines,
    };
    let data = std::fs::read(&args.input)?;
    info!(path = %args.input.display(), bytes = data.len(), "loaded scanner dump");

    if args.auto {
        match dump.histogram(&data) {
            Some(counts) => {
                let auto = estimate_auto_enhancement(&counts);
                auto.apply_to(services.params_mut(), args.per_channel);
                info!(
                    black = auto.master.black,
                    gray = auto.master.gray,
                    white = auto.master.white,
                    "auto enhancement applied"
                );
            }
            None => warn!("auto enhancement needs an 8-bit gray or RGB dump, skipped"),
        }
    }

    if args.save_config {
        let path = services.save_config()?;
        println!("configuration saved to {}", path.display());
    }

    let pages = dump.pages(&data)?;
    let page_count = pages.len();
    let mut device = ReplayDevice::new(pages).with_chunk_plan(vec![args.chunk]);

    let config = services.config().clone();
    let params = services.params().clone();
    let mut controller = SessionController::new(config, params.clone(), services.post_processor()?)?;

    let handle = controller.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling scan");
            handle.cancel();
        }
    });

    if controller.config().loop_mode == LoopMode::Batch {
        let written = drive_batch(&mut controller, &mut device, vec![params; page_count]).await?;
        for path in &written {
            println!("{}", path.display());
        }
        println!("{} page(s) scanned", written.len());
        return Ok(());
    }

    report(drive(&mut controller, &mut device).await?)
}

/// Print the outcome of a scan. A cancelled scan comes back as
/// `ScanError::Cancelled` so the caller can exit without reporting a failure.
fn report(event: SessionEvent) -> Result<()> {
    match event {
        SessionEvent::Completed { pages, last_path } => {
            if let Some(path) = last_path {
                println!("{}", path.display());
            }
            println!("{pages} page(s) scanned");
            Ok(())
        }
        SessionEvent::NoMoreDocuments => {
            println!("no documents in the feeder");
            Ok(())
        }
        SessionEvent::Cancelled => Err(ScanError::Cancelled),
        other => Err(ScanError::InvalidState(format!("scan stopped on {other:?}"))),
    }
}

fn apply_scan_overrides(args: &ScanArgs, config: &mut ScanConfig) {
    if let Some(dir) = &args.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(stem) = &args.stem {
        config.filename_stem = stem.clone();
    }
    if let Some(mode) = args.mode {
        config.output_mode = mode.output_mode(args.quarter_turns);
    }
    if let Some(max_pages) = args.adf {
        config.loop_mode = LoopMode::Adf { max_pages };
    } else if args.batch {
        config.loop_mode = LoopMode::Batch;
    }
    config.expand_lineart |= args.expand_lineart;
    config.lineart_from_gray |= args.lineart_from_gray;
    config.reduce_to_8bit |= args.reduce_16;
}

// ---------------------------------------------------------------------------
// curve
// ---------------------------------------------------------------------------

/// Print one lookup table, sixteen entries per line.
pub fn curve(args: &CurveArgs) -> Result<()> {
    if !(2..=MAX_TABLE_SIZE).contains(&args.size) {
        return Err(ScanError::Config(format!(
            "curve size must be between 2 and {MAX_TABLE_SIZE}"
        )));
    }
    let mut params = match &args.params {
        Some(path) => load_params(path)?,
        None => AcquisitionParameters::default(),
    };
    params.negative |= args.negative;

    let table = match args.threshold {
        Some(threshold) => build_threshold_curve(threshold, args.size),
        None => {
            let tables = EnhancementTables::preview(&params, args.size, args.maxout);
            match tables.table(args.channel.into()) {
                Some(table) => table.clone(),
                None => LookupTable::identity(args.size, args.maxout),
            }
        }
    };
    print!("{}", format_table(&table));
    Ok(())
}

fn format_table(table: &LookupTable) -> String {
    table
        .as_slice()
        .chunks(16)
        .map(|row| {
            let line: Vec<String> = row.iter().map(u16::to_string).collect();
            line.join(" ") + "\n"
        })
        .collect()
}

// ---------------------------------------------------------------------------
// auto
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct AutoReport<'a> {
    estimate: &'a AutoEnhancement,
    params: &'a AcquisitionParameters,
}

/// Estimate auto enhancement from an existing image and print the result.
pub fn auto(args: &AutoArgs) -> Result<()> {
    let image = image::open(&args.input).map_err(|e| ScanError::ImageError(e.to_string()))?;
    let rgb = image.to_rgb8();
    let mut counts = HistogramCounts::new();
    counts.accumulate_rgb(rgb.as_raw());

    let estimate = estimate_auto_enhancement(&counts);
    let mut params = match &args.params {
        Some(path) => load_params(path)?,
        None => AcquisitionParameters::default(),
    };
    estimate.apply_to(&mut params, args.per_channel);

    let report = AutoReport {
        estimate: &estimate,
        params: &params,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// info
// ---------------------------------------------------------------------------

pub fn info(args: &InfoArgs) -> Result<()> {
    for path in &args.input {
        let header = read_header(path)?;
        if args.input.len() > 1 {
            println!("{}:", path.display());
        }
        println!("{}", serde_json::to_string_pretty(&header)?);
    }
    Ok(())
}
