// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the frame assembler: a full letter-size line
// batch through the interleaved and three-pass paths.

use std::io::Cursor;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use scanwerk_acquire::container::{ByteOrder, EnhancementMetadata};
use scanwerk_acquire::{AcquisitionSession, AssemblyOptions, FrameAssembler, ImageContainer, ImageHeader};
use scanwerk_core::{AcquisitionParameters, FrameDescriptor, FrameFormat, Resolution};
use scanwerk_enhance::EnhancementTables;

const WIDTH: u32 = 2550;
const LINES: u32 = 64;
const CHUNK: usize = 32 * 1024;

fn frame(format: FrameFormat, bit_depth: u8) -> FrameDescriptor {
    FrameDescriptor {
        format,
        bit_depth,
        pixels_per_line: WIDTH,
        lines: Some(LINES),
        bytes_per_line: WIDTH * format.samples_per_pixel() as u32 * bit_depth as u32 / 8,
        is_last_frame: true,
    }
}

fn container(depth: u8) -> ImageContainer<Cursor<Vec<u8>>> {
    let mut container = ImageContainer::new(Cursor::new(Vec::new()));
    let header = ImageHeader {
        width: WIDTH,
        height: LINES,
        depth,
        channels: 3,
        resolution: Resolution::default(),
        enhancement: EnhancementMetadata::from(&AcquisitionParameters::default()),
        reduce_to_lineart: false,
        color_profile: None,
        byte_order: ByteOrder::Big,
    };
    if let Err(e) = container.write_header(&header) {
        panic!("benchmark header: {e}");
    }
    container
}

fn assemble(frame: &FrameDescriptor, tables: &EnhancementTables, raw: &[u8]) {
    let mut assembler = match FrameAssembler::new(frame, &AssemblyOptions::default()) {
        Ok(assembler) => assembler,
        Err(e) => panic!("benchmark frame: {e}"),
    };
    let mut container = container(frame.bit_depth);
    let mut session = AcquisitionSession::new(1);
    for chunk in raw.chunks(CHUNK) {
        if let Err(e) = assembler.process_chunk(chunk, tables, &mut session, &mut container) {
            panic!("benchmark chunk: {e}");
        }
    }
    black_box(session.bytes_written);
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_interleaved(c: &mut Criterion) {
    let params = AcquisitionParameters::default();
    for depth in [8u8, 16] {
        let frame = frame(FrameFormat::Rgb, depth);
        let tables = EnhancementTables::for_frame(&params, &frame, false);
        let raw: Vec<u8> = (0..frame.bytes_per_line * LINES).map(|i| (i % 253) as u8).collect();
        c.bench_function(&format!("interleaved rgb ({depth}-bit)"), |b| {
            b.iter(|| assemble(&frame, &tables, black_box(&raw)));
        });
    }
}

fn bench_three_pass(c: &mut Criterion) {
    let params = AcquisitionParameters::default();
    let frame = frame(FrameFormat::Green, 8);
    let tables = EnhancementTables::for_frame(&params, &frame, false);
    let raw: Vec<u8> = (0..frame.bytes_per_line * LINES).map(|i| (i % 251) as u8).collect();
    c.bench_function("three-pass green slot (8-bit)", |b| {
        b.iter(|| assemble(&frame, &tables, black_box(&raw)));
    });
}

criterion_group!(benches, bench_interleaved, bench_three_pass);
criterion_main!(benches);
