// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Frame assembler — turns raw device chunks into corrected container bytes.
//
// The layout of a pass (depth, interleaving, separate channel slot) is
// classified once when the pass starts; every chunk then goes through the
// one code path for that layout. Chunks can end anywhere: in the middle of
// a 16-bit sample, an RGB triple or a lineart row. Whatever must survive
// the boundary lives in `AcquisitionSession`.

use std::io::{Read, Seek, Write};

use tracing::debug;

use scanwerk_core::error::{Result, ScanError};
use scanwerk_core::{Channel, FrameDescriptor, FrameFormat};
use scanwerk_enhance::{EnhancementTables, LookupTable};

use crate::container::ImageContainer;
use crate::session::AcquisitionSession;

/// How 1-bit frames are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineartMode {
    /// Keep the packed bits as delivered.
    Packed,
    /// One byte per pixel: set bits become `0x00`, clear bits `0xFF`.
    Expand,
}

/// Storage choices the controller derives from its configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblyOptions {
    pub lineart: LineartMode,
    /// Store 16-bit frames as the high byte of each corrected sample.
    pub reduce_to_8bit: bool,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            lineart: LineartMode::Packed,
            reduce_to_8bit: false,
        }
    }
}

/// Sample layout of one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleLayout {
    LineartPacked,
    LineartExpand { pixels_per_line: u32 },
    Gray8,
    Gray16 { reduce: bool },
    /// RGB, or RGB plus an auxiliary fourth sample that is never corrected.
    Interleaved8 { channels: usize },
    Interleaved16 { channels: usize, reduce: bool },
    /// One color channel of a three-pass scan.
    Separate8 { slot: usize },
    Separate16 { slot: usize, reduce: bool },
}

impl SampleLayout {
    /// Classify a frame, or reject the format/depth combination.
    pub fn classify(frame: &FrameDescriptor, options: &AssemblyOptions) -> Result<Self> {
        let reduce = options.reduce_to_8bit;
        let layout = match (frame.format, frame.bit_depth) {
            (FrameFormat::Gray, 1) => match options.lineart {
                LineartMode::Packed => Self::LineartPacked,
                LineartMode::Expand if frame.pixels_per_line > 0 => Self::LineartExpand {
                    pixels_per_line: frame.pixels_per_line,
                },
                LineartMode::Expand => return Err(unsupported(frame)),
            },
            (FrameFormat::Gray, 8) => Self::Gray8,
            (FrameFormat::Gray, 16) => Self::Gray16 { reduce },
            (FrameFormat::Rgb | FrameFormat::Rgba, 8) => Self::Interleaved8 {
                channels: frame.format.samples_per_pixel(),
            },
            (FrameFormat::Rgb | FrameFormat::Rgba, 16) => Self::Interleaved16 {
                channels: frame.format.samples_per_pixel(),
                reduce,
            },
            (FrameFormat::Red | FrameFormat::Green | FrameFormat::Blue, depth @ (8 | 16)) => {
                let slot = frame
                    .format
                    .separate_channel_slot()
                    .ok_or_else(|| unsupported(frame))?;
                if depth == 8 {
                    Self::Separate8 { slot }
                } else {
                    Self::Separate16 { slot, reduce }
                }
            }
            _ => return Err(unsupported(frame)),
        };
        Ok(layout)
    }

    /// Bits per sample as stored in the container.
    pub fn stored_depth(&self) -> u8 {
        match *self {
            Self::LineartPacked => 1,
            Self::LineartExpand { .. } | Self::Gray8 | Self::Interleaved8 { .. } | Self::Separate8 { .. } => 8,
            Self::Gray16 { reduce }
            | Self::Interleaved16 { reduce, .. }
            | Self::Separate16 { reduce, .. } => {
                if reduce { 8 } else { 16 }
            }
        }
    }

    /// Whether the container holds lineart expanded to a byte per pixel.
    pub fn is_expanded_lineart(&self) -> bool {
        matches!(self, Self::LineartExpand { .. })
    }
}

fn unsupported(frame: &FrameDescriptor) -> ScanError {
    ScanError::UnsupportedFrame {
        format: frame.format,
        depth: frame.bit_depth,
    }
}

/// Chunk processor for one pass.
#[derive(Debug)]
pub struct FrameAssembler {
    layout: SampleLayout,
    scratch: Vec<u8>,
}

impl FrameAssembler {
    pub fn new(frame: &FrameDescriptor, options: &AssemblyOptions) -> Result<Self> {
        let layout = SampleLayout::classify(frame, options)?;
        debug!(?layout, format = %frame.format, depth = frame.bit_depth, "pass layout");
        Ok(Self {
            layout,
            scratch: Vec::new(),
        })
    }

    pub fn layout(&self) -> SampleLayout {
        self.layout
    }

    /// Correct one raw chunk and write it to the container.
    ///
    /// Returns the number of corrected bytes produced. A chunk that ends in
    /// the middle of a 16-bit sample produces nothing for that byte; it is
    /// carried into the next call.
    pub fn process_chunk<S: Read + Write + Seek>(
        &mut self,
        raw: &[u8],
        tables: &EnhancementTables,
        session: &mut AcquisitionSession,
        container: &mut ImageContainer<S>,
    ) -> Result<usize> {
        session.bytes_read += raw.len() as u64;
        session.pass_bytes += raw.len() as u64;
        self.scratch.clear();
        let out = &mut self.scratch;

        let written = match self.layout {
            SampleLayout::LineartPacked => {
                container.append(raw)?;
                session.samples_in_pass += raw.len() as u64 * 8;
                raw.len()
            }
            SampleLayout::LineartExpand { pixels_per_line } => {
                expand_lineart(raw, pixels_per_line, &mut session.lineart_column, out);
                container.append(out)?;
                session.samples_in_pass += out.len() as u64;
                out.len()
            }
            SampleLayout::Gray8 => {
                let gray = [tables.table(Channel::Gray)];
                map_samples8(raw, &gray, 1, &mut session.color_position, out);
                container.append(out)?;
                session.samples_in_pass += out.len() as u64;
                out.len()
            }
            SampleLayout::Gray16 { reduce } => {
                let gray = [tables.table(Channel::Gray)];
                let samples = map_samples16(
                    raw,
                    &gray,
                    1,
                    &mut session.color_position,
                    &mut session.carry,
                    reduce,
                    out,
                );
                container.append(out)?;
                session.samples_in_pass += samples;
                out.len()
            }
            SampleLayout::Interleaved8 { channels } => {
                let color = color_tables(tables);
                map_samples8(raw, &color, channels, &mut session.color_position, out);
                container.append(out)?;
                session.samples_in_pass += out.len() as u64;
                out.len()
            }
            SampleLayout::Interleaved16 { channels, reduce } => {
                let color = color_tables(tables);
                let samples = map_samples16(
                    raw,
                    &color,
                    channels,
                    &mut session.color_position,
                    &mut session.carry,
                    reduce,
                    out,
                );
                container.append(out)?;
                session.samples_in_pass += samples;
                out.len()
            }
            SampleLayout::Separate8 { slot } => {
                let table = [tables.table(Channel::COLOR[slot])];
                let mut position = 0;
                map_samples8(raw, &table, 1, &mut position, out);
                container.write_channel_samples(session.samples_in_pass, slot, 3, 1, out)?;
                session.samples_in_pass += out.len() as u64;
                out.len()
            }
            SampleLayout::Separate16 { slot, reduce } => {
                let table = [tables.table(Channel::COLOR[slot])];
                let mut position = 0;
                let samples = map_samples16(
                    raw,
                    &table,
                    1,
                    &mut position,
                    &mut session.carry,
                    reduce,
                    out,
                );
                let sample_len = if reduce { 1 } else { 2 };
                container.write_channel_samples(
                    session.samples_in_pass,
                    slot,
                    3,
                    sample_len,
                    out,
                )?;
                session.samples_in_pass += samples;
                out.len()
            }
        };

        session.bytes_written += written as u64;
        Ok(written)
    }
}

fn color_tables(tables: &EnhancementTables) -> [Option<&LookupTable>; 3] {
    Channel::COLOR.map(|channel| tables.table(channel))
}

/// Unpack MSB-first bits, one byte per pixel. Bits past `pixels_per_line`
/// in a row's last byte are row padding and are dropped.
fn expand_lineart(raw: &[u8], pixels_per_line: u32, column: &mut u32, out: &mut Vec<u8>) {
    for &byte in raw {
        for bit in (0..8).rev() {
            let set = (byte >> bit) & 1 == 1;
            out.push(if set { 0x00 } else { 0xFF });
            *column += 1;
            if *column >= pixels_per_line {
                *column = 0;
                break;
            }
        }
    }
}

/// Map 8-bit samples, rotating through `channels` slots. Slots without a
/// table pass through unchanged.
fn map_samples8(
    raw: &[u8],
    tables: &[Option<&LookupTable>],
    channels: usize,
    position: &mut usize,
    out: &mut Vec<u8>,
) {
    out.reserve(raw.len());
    for &sample in raw {
        let mapped = match tables.get(*position).copied().flatten() {
            Some(table) => table.map8(sample),
            None => sample,
        };
        out.push(mapped);
        *position = (*position + 1) % channels;
    }
}

/// Map native-endian 16-bit device samples and store them big-endian, as
/// PNM expects. A trailing odd byte goes to `carry` and is joined with the
/// first byte of the next chunk. Returns the number of samples produced.
fn map_samples16(
    raw: &[u8],
    tables: &[Option<&LookupTable>],
    channels: usize,
    position: &mut usize,
    carry: &mut Option<u8>,
    reduce: bool,
    out: &mut Vec<u8>,
) -> u64 {
    let mut samples = 0u64;
    let mut emit = |sample: u16| {
        let mapped = match tables.get(*position).copied().flatten() {
            Some(table) => table.map16(sample),
            None => sample,
        };
        if reduce {
            out.push((mapped >> 8) as u8);
        } else {
            out.extend_from_slice(&mapped.to_be_bytes());
        }
        *position = (*position + 1) % channels;
        samples += 1;
    };

    let mut rest = raw;
    if let Some(first) = carry.take() {
        match rest.split_first() {
            Some((&second, tail)) => {
                emit(u16::from_ne_bytes([first, second]));
                rest = tail;
            }
            None => {
                *carry = Some(first);
                return 0;
            }
        }
    }

    let pairs = rest.chunks_exact(2);
    let remainder = pairs.remainder();
    for pair in pairs {
        emit(u16::from_ne_bytes([pair[0], pair[1]]));
    }
    if let [last] = remainder {
        *carry = Some(*last);
    }
    samples
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use scanwerk_core::{AcquisitionParameters, ChannelAdjust, Resolution};

    use crate::container::{ByteOrder, EnhancementMetadata, ImageHeader};

    type MemoryContainer = ImageContainer<Cursor<Vec<u8>>>;

    fn frame(format: FrameFormat, bit_depth: u8, pixels_per_line: u32) -> FrameDescriptor {
        let bits = pixels_per_line * format.samples_per_pixel() as u32 * bit_depth as u32;
        FrameDescriptor {
            format,
            bit_depth,
            pixels_per_line,
            lines: Some(2),
            bytes_per_line: bits.div_ceil(8),
            is_last_frame: true,
        }
    }

    fn params() -> AcquisitionParameters {
        AcquisitionParameters {
            gray: ChannelAdjust {
                gamma: 1.7,
                brightness: 8.0,
                contrast: 15.0,
            },
            red: ChannelAdjust {
                gamma: 0.8,
                brightness: -10.0,
                contrast: 0.0,
            },
            blue: ChannelAdjust {
                gamma: 1.3,
                brightness: 5.0,
                contrast: 30.0,
            },
            ..Default::default()
        }
    }

    fn container(width: u32, depth: u8, channels: u8) -> MemoryContainer {
        let mut container = ImageContainer::new(Cursor::new(Vec::new()));
        container
            .write_header(&ImageHeader {
                width,
                height: 2,
                depth,
                channels,
                resolution: Resolution::default(),
                enhancement: EnhancementMetadata::from(&params()),
                reduce_to_lineart: false,
                color_profile: None,
                byte_order: ByteOrder::Big,
            })
            .unwrap();
        container
    }

    /// Feed `raw` in chunks of the given sizes and return the pixel region.
    fn assemble(
        frame: &FrameDescriptor,
        options: AssemblyOptions,
        tables: &EnhancementTables,
        raw: &[u8],
        chunks: &[usize],
    ) -> Vec<u8> {
        let mut assembler = FrameAssembler::new(frame, &options).unwrap();
        let depth = assembler.layout().stored_depth();
        let channels = frame.format.image_channels() as u8;
        let mut container = container(frame.pixels_per_line, depth, channels);
        let mut session = AcquisitionSession::new(1);
        let mut offset = 0;
        for &len in chunks {
            let chunk = &raw[offset..offset + len];
            assembler
                .process_chunk(chunk, tables, &mut session, &mut container)
                .unwrap();
            offset += len;
        }
        assert_eq!(offset, raw.len(), "chunk plan must cover the input");
        container.read_pixels().unwrap()
    }

    fn samples16(values: &[u16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_ne_bytes()).collect()
    }

    #[test]
    fn gray8_split_five_three() {
        let frame = frame(FrameFormat::Gray, 8, 4);
        let tables = EnhancementTables::for_frame(&params(), &frame, false);
        let raw: Vec<u8> = (10..18).collect();
        let pixels = assemble(&frame, AssemblyOptions::default(), &tables, &raw, &[5, 3]);

        let gray = tables.table(Channel::Gray).unwrap();
        let expected: Vec<u8> = raw.iter().map(|&s| gray.map8(s)).collect();
        assert_eq!(pixels, expected);
    }

    #[test]
    fn identity_gray_chunks_pass_through_unchanged() {
        let frame = frame(FrameFormat::Gray, 8, 4);
        let tables = EnhancementTables::for_frame(&AcquisitionParameters::default(), &frame, false);
        let raw: Vec<u8> = (1..=8).map(|i| i * 10).collect();
        let pixels = assemble(&frame, AssemblyOptions::default(), &tables, &raw, &[5, 3]);
        assert_eq!(pixels, vec![10, 20, 30, 40, 50, 60, 70, 80]);
    }

    #[test]
    fn sixteen_bit_output_is_independent_of_chunk_boundaries() {
        let frame = frame(FrameFormat::Gray, 16, 3);
        let tables = EnhancementTables::for_frame(&params(), &frame, false);
        let raw = samples16(&[0x0102, 0x8000, 0xfffe, 0x1234, 0x0, 0x7777]);
        let whole = assemble(&frame, AssemblyOptions::default(), &tables, &raw, &[raw.len()]);

        for split in 1..raw.len() {
            let pixels = assemble(
                &frame,
                AssemblyOptions::default(),
                &tables,
                &raw,
                &[split, raw.len() - split],
            );
            assert_eq!(pixels, whole, "split at {split}");
        }
        let bytewise = vec![1; raw.len()];
        assert_eq!(
            assemble(&frame, AssemblyOptions::default(), &tables, &raw, &bytewise),
            whole
        );

        let gray = tables.table(Channel::Gray).unwrap();
        assert_eq!(&whole[0..2], &gray.map16(0x0102).to_be_bytes());
    }

    #[test]
    fn sixteen_bit_reduction_keeps_high_byte() {
        let frame = frame(FrameFormat::Gray, 16, 2);
        let tables = EnhancementTables::for_frame(&params(), &frame, false);
        let raw = samples16(&[0x4000, 0xc123, 0x0011, 0xffff]);
        let options = AssemblyOptions {
            reduce_to_8bit: true,
            ..Default::default()
        };
        let pixels = assemble(&frame, options, &tables, &raw, &[3, 3, 2]);

        let gray = tables.table(Channel::Gray).unwrap();
        let expected: Vec<u8> = [0x4000u16, 0xc123, 0x0011, 0xffff]
            .iter()
            .map(|&s| (gray.map16(s) >> 8) as u8)
            .collect();
        assert_eq!(pixels, expected);
    }

    #[test]
    fn interleaved_rgb_keeps_color_position_across_chunks() {
        let frame = frame(FrameFormat::Rgb, 8, 3);
        let tables = EnhancementTables::for_frame(&params(), &frame, false);
        let raw: Vec<u8> = vec![10, 100, 200, 20, 110, 210, 30, 120, 220];
        let pixels = assemble(&frame, AssemblyOptions::default(), &tables, &raw, &[2, 4, 1, 2]);

        let expected: Vec<u8> = raw
            .iter()
            .enumerate()
            .map(|(i, &s)| tables.table(Channel::COLOR[i % 3]).unwrap().map8(s))
            .collect();
        assert_eq!(pixels, expected);
    }

    #[test]
    fn three_pass_matches_interleaved() {
        let width = 5;
        let red: Vec<u8> = vec![1, 50, 100, 150, 250];
        let green: Vec<u8> = vec![9, 60, 110, 160, 240];
        let blue: Vec<u8> = vec![17, 70, 120, 170, 230];

        let rgb_frame = frame(FrameFormat::Rgb, 8, width);
        let tables = EnhancementTables::for_frame(&params(), &rgb_frame, false);
        let interleaved: Vec<u8> = (0..width as usize)
            .flat_map(|i| [red[i], green[i], blue[i]])
            .collect();
        let expected = assemble(
            &rgb_frame,
            AssemblyOptions::default(),
            &tables,
            &interleaved,
            &[7, 8],
        );

        // Green first, then blue, then red, each in odd-sized chunks.
        let mut container = container(width, 8, 3);
        for (format, data) in [
            (FrameFormat::Green, &green),
            (FrameFormat::Blue, &blue),
            (FrameFormat::Red, &red),
        ] {
            let pass = frame(format, 8, width);
            let mut assembler = FrameAssembler::new(&pass, &AssemblyOptions::default()).unwrap();
            let mut session = AcquisitionSession::new(1);
            for chunk in data.chunks(2) {
                assembler
                    .process_chunk(chunk, &tables, &mut session, &mut container)
                    .unwrap();
            }
        }
        assert_eq!(container.read_pixels().unwrap(), expected);
    }

    #[test]
    fn three_pass_sixteen_bit_with_carry() {
        let width = 2;
        let rgb_frame = frame(FrameFormat::Rgb, 16, width);
        let tables = EnhancementTables::for_frame(&params(), &rgb_frame, false);
        let channels: [Vec<u16>; 3] = [vec![0x1000, 0xf000], vec![0x2000, 0xe000], vec![0x3000, 0xd000]];

        let interleaved: Vec<u16> = (0..2).flat_map(|i| channels.iter().map(move |c| c[i])).collect();
        let expected = assemble(
            &rgb_frame,
            AssemblyOptions::default(),
            &tables,
            &samples16(&interleaved),
            &[12],
        );

        let mut container = container(width, 16, 3);
        for (format, values) in [FrameFormat::Red, FrameFormat::Green, FrameFormat::Blue]
            .into_iter()
            .zip(&channels)
        {
            let pass = frame(format, 16, width);
            let mut assembler = FrameAssembler::new(&pass, &AssemblyOptions::default()).unwrap();
            let mut session = AcquisitionSession::new(1);
            let raw = samples16(values);
            for chunk in raw.chunks(3) {
                assembler
                    .process_chunk(chunk, &tables, &mut session, &mut container)
                    .unwrap();
            }
        }
        assert_eq!(container.read_pixels().unwrap(), expected);
    }

    #[test]
    fn rgba_fourth_sample_passes_through() {
        let frame = frame(FrameFormat::Rgba, 8, 2);
        let tables = EnhancementTables::for_frame(&params(), &frame, false);
        let raw: Vec<u8> = vec![10, 20, 30, 7, 40, 50, 60, 201];
        let pixels = assemble(&frame, AssemblyOptions::default(), &tables, &raw, &[3, 5]);

        assert_eq!(pixels[3], 7);
        assert_eq!(pixels[7], 201);
        assert_eq!(pixels[0], tables.table(Channel::Red).unwrap().map8(10));
        assert_eq!(pixels[6], tables.table(Channel::Blue).unwrap().map8(60));
    }

    #[test]
    fn lineart_expansion_drops_row_padding() {
        // 10 pixels per line, 2 bytes per row, 6 padding bits.
        let frame = frame(FrameFormat::Gray, 1, 10);
        let options = AssemblyOptions {
            lineart: LineartMode::Expand,
            ..Default::default()
        };
        let raw = [0b1010_0000, 0b0100_0000, 0b0000_0001, 0b1111_1111];
        let pixels = assemble(&frame, options, &EnhancementTables::default(), &raw, &[1, 2, 1]);

        let (b, w) = (0x00, 0xFF);
        let expected = vec![
            b, w, b, w, w, w, w, w, w, b, // row 1
            w, w, w, w, w, w, w, b, b, b, // row 2
        ];
        assert_eq!(pixels, expected);
    }

    #[test]
    fn packed_lineart_is_stored_verbatim() {
        let frame = frame(FrameFormat::Gray, 1, 16);
        let raw = [0xA5, 0x5A, 0xFF, 0x00];
        let pixels = assemble(
            &frame,
            AssemblyOptions::default(),
            &EnhancementTables::default(),
            &raw,
            &[1, 3],
        );
        assert_eq!(pixels, raw);
    }

    #[test]
    fn unsupported_combinations_are_rejected() {
        let options = AssemblyOptions::default();
        for (format, depth) in [
            (FrameFormat::Rgb, 1),
            (FrameFormat::Red, 1),
            (FrameFormat::Gray, 4),
            (FrameFormat::Rgb, 12),
        ] {
            let result = SampleLayout::classify(&frame(format, depth, 8), &options);
            assert!(
                matches!(result, Err(ScanError::UnsupportedFrame { .. })),
                "{format} at {depth} bits"
            );
        }
    }

    #[test]
    fn stored_depth_follows_options() {
        let options = AssemblyOptions {
            lineart: LineartMode::Expand,
            reduce_to_8bit: true,
        };
        let layout = |format, depth| {
            SampleLayout::classify(&frame(format, depth, 8), &options)
                .unwrap()
                .stored_depth()
        };
        assert_eq!(layout(FrameFormat::Gray, 1), 8);
        assert_eq!(layout(FrameFormat::Rgb, 16), 8);
        assert_eq!(
            SampleLayout::classify(&frame(FrameFormat::Blue, 16, 8), &AssemblyOptions::default())
                .unwrap()
                .stored_depth(),
            16
        );
    }

    #[test]
    fn session_counters_track_raw_and_written_bytes() {
        let frame = frame(FrameFormat::Gray, 16, 4);
        let tables = EnhancementTables::for_frame(&params(), &frame, false);
        let mut assembler = FrameAssembler::new(&frame, &AssemblyOptions::default()).unwrap();
        let mut container = container(4, 16, 1);
        let mut session = AcquisitionSession::new(1);

        let written = assembler
            .process_chunk(&[1, 2, 3], &tables, &mut session, &mut container)
            .unwrap();
        assert_eq!(written, 2);
        assert_eq!(session.carry, Some(3));

        let written = assembler
            .process_chunk(&[4], &tables, &mut session, &mut container)
            .unwrap();
        assert_eq!(written, 2);
        assert_eq!(session.carry, None);
        assert_eq!(session.bytes_read, 4);
        assert_eq!(session.pass_bytes, 4);
        assert_eq!(session.bytes_written, 4);
        assert_eq!(session.samples_in_pass, 2);
    }
}
