// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanwerk — scanner acquisition pipeline
//
// Entry point. Initialises logging, parses the command line and dispatches
// to the subcommands.

mod commands;
mod replay;
mod services;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

use scanwerk_core::human_errors::humanize_error;

use commands::{ChannelArg, ModeArg};
use replay::DumpLayout;

#[derive(Parser)]
#[command(name = "scanwerk")]
#[command(author, version, about = "Scanner acquisition pipeline")]
#[command(long_about = "
Replays raw scanner data through the acquisition pipeline: enhancement
curves, frame assembly and the page container format.

Examples:
  scanwerk scan dump.raw -w 2480 --lines 3508              # 8-bit gray page
  scanwerk scan dump.raw -l three-pass -w 640 --lines 480 -m viewer
  scanwerk scan feeder.raw -w 1700 --lines 2200 --adf 10 --auto
  scanwerk curve --channel red --params params.json
  scanwerk auto photo.png
  scanwerk info scan-001.pnm
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire pages from a raw scanner dump
    #[command(visible_alias = "s")]
    Scan(ScanArgs),

    /// Print an enhancement lookup table
    Curve(CurveArgs),

    /// Estimate auto enhancement from an image
    Auto(AutoArgs),

    /// Show the header of a scan container
    #[command(visible_alias = "i")]
    Info(InfoArgs),
}

#[derive(Args)]
struct ScanArgs {
    /// Raw device data, pages back to back
    input: PathBuf,

    /// Sample layout of the dump
    #[arg(short, long, value_enum, default_value = "gray")]
    layout: DumpLayout,

    /// Bits per sample (1, 8 or 16)
    #[arg(short, long, default_value_t = 8)]
    depth: u8,

    /// Pixels per line
    #[arg(short, long)]
    width: u32,

    /// Lines per page (whole dump is one page when omitted)
    #[arg(long)]
    lines: Option<u32>,

    /// Output directory for containers
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Filename stem for containers
    #[arg(long)]
    stem: Option<String>,

    /// Post-processing for finished pages
    #[arg(short, long, value_enum)]
    mode: Option<ModeArg>,

    /// Quarter turns clockwise for rotate mode
    #[arg(long, default_value_t = 1)]
    quarter_turns: u8,

    /// Feed pages from the document feeder, at most this many
    #[arg(long, value_name = "MAX_PAGES", conflicts_with = "batch")]
    adf: Option<u32>,

    /// Scan one page per batch entry
    #[arg(long)]
    batch: bool,

    /// Store lineart as one byte per pixel
    #[arg(long)]
    expand_lineart: bool,

    /// Threshold 8-bit gray into lineart
    #[arg(long)]
    lineart_from_gray: bool,

    /// Reduce 16-bit samples to 8 bits
    #[arg(long = "reduce-16")]
    reduce_16: bool,

    /// Lineart threshold in percent
    #[arg(long)]
    threshold: Option<f64>,

    /// Invert the image
    #[arg(long)]
    negative: bool,

    /// Estimate enhancement from the first page before scanning
    #[arg(long)]
    auto: bool,

    /// Apply auto enhancement per color channel
    #[arg(long, requires = "auto")]
    per_channel: bool,

    /// Bytes the replayed device returns per read
    #[arg(long, default_value_t = 4096)]
    chunk: usize,

    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enhancement parameters (JSON)
    #[arg(short, long)]
    params: Option<PathBuf>,

    /// Store the effective configuration as the default
    #[arg(long)]
    save_config: bool,
}

#[derive(Args)]
struct CurveArgs {
    /// Channel to print
    #[arg(long, value_enum, default_value = "gray")]
    channel: ChannelArg,

    /// Enhancement parameters (JSON)
    #[arg(short, long)]
    params: Option<PathBuf>,

    /// Number of table entries
    #[arg(long, default_value_t = 256)]
    size: usize,

    /// Largest output value
    #[arg(long, default_value_t = 255)]
    maxout: u16,

    /// Print a lineart threshold table instead
    #[arg(long)]
    threshold: Option<f64>,

    /// Invert the curve
    #[arg(long)]
    negative: bool,
}

#[derive(Args)]
struct AutoArgs {
    /// Image to analyse
    input: PathBuf,

    /// Parameters to adjust (JSON)
    #[arg(short, long)]
    params: Option<PathBuf>,

    /// Adjust each color channel on its own
    #[arg(long)]
    per_channel: bool,
}

#[derive(Args)]
struct InfoArgs {
    /// Scan containers
    #[arg(required = true)]
    input: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match &cli.command {
        Commands::Scan(args) => commands::scan(args).await,
        Commands::Curve(args) => commands::curve(args),
        Commands::Auto(args) => commands::auto(args),
        Commands::Info(args) => commands::info(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if err.is_cancelled() => {
            println!("scan cancelled");
            ExitCode::SUCCESS
        }
        Err(err) => match humanize_error(&err) {
            Some(human) => {
                eprintln!("error: {}", human.message);
                eprintln!("  {}", human.suggestion);
                if let Some(detail) = human.detail {
                    eprintln!("  ({detail})");
                }
                ExitCode::FAILURE
            }
            None => ExitCode::SUCCESS,
        },
    }
}
