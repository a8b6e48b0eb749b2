// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// File-based post-processors: PNG conversion, rotation, lineart repacking and
// project lists. Decodes scan containers into `image` buffers.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use image::{DynamicImage, GrayImage, ImageBuffer, ImageFormat, Luma, Rgb, RgbImage, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use scanwerk_acquire::container::ByteOrder;
use scanwerk_acquire::{ImageContainer, ImageHeader, PostProcessor, ScanProduct, read_image};
use scanwerk_core::error::{Result, ScanError};
use scanwerk_core::{ProjectKind, SessionId};

/// Decode a container's pixel region into an image.
pub fn container_to_image(header: &ImageHeader, pixels: &[u8]) -> Result<DynamicImage> {
    let (w, h) = (header.width, header.height);
    let needed = header.bytes_per_line() as usize * h as usize;
    if pixels.len() < needed {
        return Err(ScanError::ImageError(format!(
            "container holds {} pixel bytes, {w}x{h} needs {needed}",
            pixels.len()
        )));
    }
    let pixels = &pixels[..needed];
    let too_small = || ScanError::ImageError(format!("pixel buffer does not fit {w}x{h}"));

    let image = match (header.channels, header.depth) {
        (1, 1) => DynamicImage::ImageLuma8(unpack_lineart(pixels, w, h).ok_or_else(too_small)?),
        (1, 8) => DynamicImage::ImageLuma8(
            GrayImage::from_raw(w, h, pixels.to_vec()).ok_or_else(too_small)?,
        ),
        (1, 16) => DynamicImage::ImageLuma16(
            ImageBuffer::<Luma<u16>, _>::from_raw(w, h, samples16(pixels, header.byte_order))
                .ok_or_else(too_small)?,
        ),
        (3, 8) => DynamicImage::ImageRgb8(
            RgbImage::from_raw(w, h, pixels.to_vec()).ok_or_else(too_small)?,
        ),
        (3, 16) => DynamicImage::ImageRgb16(
            ImageBuffer::<Rgb<u16>, _>::from_raw(w, h, samples16(pixels, header.byte_order))
                .ok_or_else(too_small)?,
        ),
        (4, 8) => DynamicImage::ImageRgba8(
            RgbaImage::from_raw(w, h, pixels.to_vec()).ok_or_else(too_small)?,
        ),
        (4, 16) => DynamicImage::ImageRgba16(
            ImageBuffer::<Rgba<u16>, _>::from_raw(w, h, samples16(pixels, header.byte_order))
                .ok_or_else(too_small)?,
        ),
        (channels, depth) => {
            return Err(ScanError::ImageError(format!(
                "cannot convert {channels}-channel {depth}-bit container"
            )));
        }
    };
    Ok(image)
}

fn samples16(bytes: &[u8], order: ByteOrder) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|pair| match order {
            ByteOrder::Big => u16::from_be_bytes([pair[0], pair[1]]),
            ByteOrder::Little => u16::from_le_bytes([pair[0], pair[1]]),
        })
        .collect()
}

/// Packed rows, set bit = black.
fn unpack_lineart(packed: &[u8], width: u32, height: u32) -> Option<GrayImage> {
    let row_bytes = width.div_ceil(8) as usize;
    let mut gray = Vec::with_capacity(width as usize * height as usize);
    for row in packed.chunks(row_bytes).take(height as usize) {
        for x in 0..width as usize {
            let byte = *row.get(x / 8)?;
            let set = (byte >> (7 - x % 8)) & 1 == 1;
            gray.push(if set { 0 } else { 255 });
        }
    }
    GrayImage::from_raw(width, height, gray)
}

/// Byte-per-pixel rows packed back to one bit per pixel; dark pixels set.
pub fn pack_lineart(pixels: &[u8], width: u32) -> Vec<u8> {
    let width = width.max(1) as usize;
    let row_bytes = width.div_ceil(8);
    let mut packed = Vec::with_capacity(pixels.len() / width * row_bytes);
    for row in pixels.chunks(width) {
        let mut bytes = vec![0u8; row_bytes];
        for (x, &value) in row.iter().enumerate() {
            if value < 128 {
                bytes[x / 8] |= 0x80 >> (x % 8);
            }
        }
        packed.extend_from_slice(&bytes);
    }
    packed
}

/// One entry of a fax / multipage / email project list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectEntry {
    pub path: PathBuf,
    pub session: SessionId,
    pub page_counter: u32,
    pub added_at: DateTime<Utc>,
}

/// Post-processor writing next to the container and into project lists.
#[derive(Debug)]
pub struct FilePostProcessor {
    projects_dir: PathBuf,
    /// Containers handed to the viewer during this run.
    pub viewed: Vec<PathBuf>,
}

impl FilePostProcessor {
    pub fn new(projects_dir: impl Into<PathBuf>) -> Self {
        Self {
            projects_dir: projects_dir.into(),
            viewed: Vec::new(),
        }
    }

    pub fn project_list_path(&self, kind: ProjectKind) -> PathBuf {
        let name = match kind {
            ProjectKind::Fax => "fax",
            ProjectKind::Multipage => "multipage",
            ProjectKind::Email => "email",
        };
        self.projects_dir.join(format!("{name}.json"))
    }

    /// Entries registered so far for a project kind.
    pub fn project_entries(&self, kind: ProjectKind) -> Result<Vec<ProjectEntry>> {
        let path = self.project_list_path(kind);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&data)?)
    }

    fn load(product: &ScanProduct) -> Result<DynamicImage> {
        let (header, pixels) = read_image(&product.path)?;
        container_to_image(&header, &pixels)
    }
}

fn save_png(image: &DynamicImage, path: &Path) -> Result<()> {
    image
        .save_with_format(path, ImageFormat::Png)
        .map_err(|err| ScanError::ImageError(format!("failed to write {}: {err}", path.display())))
}

impl PostProcessor for FilePostProcessor {
    fn view(&mut self, product: &ScanProduct) -> Result<()> {
        let image = Self::load(product)?;
        info!(
            path = %product.path.display(),
            width = image.width(),
            height = image.height(),
            "scan ready for viewing"
        );
        self.viewed.push(product.path.clone());
        Ok(())
    }

    #[instrument(skip_all, fields(path = %product.path.display()))]
    fn save(&mut self, product: &ScanProduct) -> Result<()> {
        let image = Self::load(product)?;
        let png = product.path.with_extension("png");
        save_png(&image, &png)?;
        info!(output = %png.display(), "scan saved as PNG");
        Ok(())
    }

    #[instrument(skip_all, fields(path = %product.path.display(), quarter_turns))]
    fn rotate(&mut self, product: &ScanProduct, quarter_turns: u8) -> Result<()> {
        let image = Self::load(product)?;
        let rotated = match quarter_turns % 4 {
            1 => image.rotate90(),
            2 => image.rotate180(),
            3 => image.rotate270(),
            _ => image,
        };
        let png = product.path.with_extension("png");
        save_png(&rotated, &png)?;
        info!(output = %png.display(), "rotated scan saved");
        Ok(())
    }

    #[instrument(skip_all, fields(path = %product.path.display()))]
    fn repack_lineart(&mut self, product: &ScanProduct) -> Result<()> {
        let (header, pixels) = read_image(&product.path)?;
        if !header.reduce_to_lineart || header.depth != 8 || header.channels != 1 {
            warn!("container is not byte-per-pixel lineart, left as is");
            return Ok(());
        }

        let packed = pack_lineart(&pixels, header.width);
        let repacked = ImageHeader {
            depth: 1,
            reduce_to_lineart: false,
            ..header
        };
        let mut container = ImageContainer::create(&product.path)?;
        container.write_header(&repacked)?;
        container.append(&packed)?;
        container.finish()?;
        info!(bytes = packed.len(), "lineart repacked to one bit per pixel");
        Ok(())
    }

    fn register_project(&mut self, kind: ProjectKind, product: &ScanProduct) -> Result<()> {
        let mut entries = self.project_entries(kind)?;
        entries.push(ProjectEntry {
            path: product.path.clone(),
            session: product.session,
            page_counter: product.page_counter,
            added_at: product.completed_at,
        });
        std::fs::create_dir_all(&self.projects_dir)?;
        let list = self.project_list_path(kind);
        std::fs::write(&list, serde_json::to_string_pretty(&entries)?)?;
        info!(list = %list.display(), pages = entries.len(), "page added to project");
        Ok(())
    }
}
