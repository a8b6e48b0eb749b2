// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Scanwerk acquisition engine.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for one acquisition session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// -- Frames -------------------------------------------------------------------

/// Channel layout of one acquisition pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    Gray,
    /// Interleaved red/green/blue samples.
    Rgb,
    /// Red channel of a three-pass scan.
    Red,
    /// Green channel of a three-pass scan.
    Green,
    /// Blue channel of a three-pass scan.
    Blue,
    /// Interleaved color plus an uncorrected auxiliary (e.g. infrared) channel.
    Rgba,
}

impl FrameFormat {
    /// Samples per pixel as delivered by the device in this pass.
    pub fn samples_per_pixel(&self) -> usize {
        match self {
            Self::Gray | Self::Red | Self::Green | Self::Blue => 1,
            Self::Rgb => 3,
            Self::Rgba => 4,
        }
    }

    /// Channels per pixel in the assembled image.
    pub fn image_channels(&self) -> usize {
        match self {
            Self::Gray => 1,
            Self::Rgb | Self::Red | Self::Green | Self::Blue => 3,
            Self::Rgba => 4,
        }
    }

    /// Slot of a single-channel pass inside the assembled RGB pixel.
    pub fn separate_channel_slot(&self) -> Option<usize> {
        match self {
            Self::Red => Some(0),
            Self::Green => Some(1),
            Self::Blue => Some(2),
            _ => None,
        }
    }
}

impl std::fmt::Display for FrameFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Gray => "gray",
            Self::Rgb => "rgb",
            Self::Red => "red",
            Self::Green => "green",
            Self::Blue => "blue",
            Self::Rgba => "rgba",
        };
        f.write_str(name)
    }
}

/// Per-pass parameters reported by the device once a pass has started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDescriptor {
    pub format: FrameFormat,
    /// 1, 8 or 16.
    pub bit_depth: u8,
    pub pixels_per_line: u32,
    /// `None` when the device cannot tell the height in advance
    /// (handheld and variable-feed scanners).
    pub lines: Option<u32>,
    pub bytes_per_line: u32,
    /// False while more single-channel passes are pending.
    pub is_last_frame: bool,
}

impl FrameDescriptor {
    /// Total bytes the device announced for this pass, if the height is known.
    pub fn expected_bytes(&self) -> Option<u64> {
        self.lines
            .map(|lines| lines as u64 * self.bytes_per_line as u64)
    }
}

/// Color channel a lookup table or adjustment applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    Gray,
    Red,
    Green,
    Blue,
}

impl Channel {
    pub const COLOR: [Channel; 3] = [Channel::Red, Channel::Green, Channel::Blue];
}

// -- Enhancement parameters ---------------------------------------------------

/// Gamma / brightness / contrast for one channel.
///
/// On the gray channel these are the master values; on red/green/blue they
/// are offsets combined with the master (see
/// [`AcquisitionParameters::effective`]).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelAdjust {
    pub gamma: f64,
    /// Percent, 0 = unchanged.
    pub brightness: f64,
    /// Percent, 0 = unchanged, -100 = flat.
    pub contrast: f64,
}

impl Default for ChannelAdjust {
    fn default() -> Self {
        Self {
            gamma: 1.0,
            brightness: 0.0,
            contrast: 0.0,
        }
    }
}

/// Shadow / highlight / gamma calibration of one channel of a scan medium.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MediumChannel {
    /// Percent of full scale mapped to black.
    pub shadow: f64,
    /// Percent of full scale mapped to white. Must exceed `shadow`.
    pub highlight: f64,
    pub gamma: f64,
}

impl Default for MediumChannel {
    fn default() -> Self {
        Self {
            shadow: 0.0,
            highlight: 100.0,
            gamma: 1.0,
        }
    }
}

/// Calibration record for a scan medium (slide, negative stock, paper).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MediumCalibration {
    pub gray: MediumChannel,
    pub red: MediumChannel,
    pub green: MediumChannel,
    pub blue: MediumChannel,
    /// Medium is a photographic negative.
    pub negative: bool,
}

impl MediumCalibration {
    pub fn channel(&self, channel: Channel) -> MediumChannel {
        match channel {
            Channel::Gray => self.gray,
            Channel::Red => self.red,
            Channel::Green => self.green,
            Channel::Blue => self.blue,
        }
    }
}

/// Backend-defined contrast limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContrastRange {
    pub min: f64,
    pub max: f64,
}

impl ContrastRange {
    pub fn clamp(&self, contrast: f64) -> f64 {
        contrast.max(self.min).min(self.max)
    }
}

impl Default for ContrastRange {
    fn default() -> Self {
        Self {
            min: -100.0,
            max: 100.0,
        }
    }
}

/// Horizontal and vertical scan resolution in dots per inch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub x: f64,
    pub y: f64,
}

impl Default for Resolution {
    fn default() -> Self {
        Self { x: 300.0, y: 300.0 }
    }
}

/// Photographic adjustment parameters for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionParameters {
    /// Master values, applied to every channel.
    pub gray: ChannelAdjust,
    pub red: ChannelAdjust,
    pub green: ChannelAdjust,
    pub blue: ChannelAdjust,
    pub medium: MediumCalibration,
    /// Invert the rendering.
    pub negative: bool,
    /// Lineart threshold in percent.
    pub threshold: f64,
    pub contrast_range: ContrastRange,
    pub resolution: Resolution,
    /// Name of the color profile the image was scanned with, if any.
    pub color_profile: Option<String>,
}

impl Default for AcquisitionParameters {
    fn default() -> Self {
        Self {
            gray: ChannelAdjust::default(),
            red: ChannelAdjust::default(),
            green: ChannelAdjust::default(),
            blue: ChannelAdjust::default(),
            medium: MediumCalibration::default(),
            negative: false,
            threshold: 50.0,
            contrast_range: ContrastRange::default(),
            resolution: Resolution::default(),
            color_profile: None,
        }
    }
}

impl AcquisitionParameters {
    /// Adjustment actually used for a channel's curve.
    ///
    /// Color channels multiply the master gamma and add the master
    /// brightness and contrast. Contrast is clamped to the backend range.
    pub fn effective(&self, channel: Channel) -> ChannelAdjust {
        let master = self.gray;
        let combined = match channel {
            Channel::Gray => master,
            Channel::Red | Channel::Green | Channel::Blue => {
                let offset = match channel {
                    Channel::Red => self.red,
                    Channel::Green => self.green,
                    _ => self.blue,
                };
                ChannelAdjust {
                    gamma: master.gamma * offset.gamma,
                    brightness: master.brightness + offset.brightness,
                    contrast: master.contrast + offset.contrast,
                }
            }
        };
        ChannelAdjust {
            contrast: self.contrast_range.clamp(combined.contrast),
            ..combined
        }
    }

    /// Whether curves are built as negatives: exactly one of the user flag
    /// and the medium flag is set.
    pub fn is_negative(&self) -> bool {
        self.negative != self.medium.negative
    }
}

// -- Session modes ------------------------------------------------------------

/// Project list a finished page is registered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectKind {
    Fax,
    Multipage,
    Email,
}

/// Post-processing collaborator that receives a finished container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputMode {
    /// Show the image in the viewer.
    Viewer,
    /// Convert and save to the requested file format.
    Save,
    /// Rotate by a number of quarter turns clockwise.
    Rotate { quarter_turns: u8 },
    /// Pack a byte-per-pixel lineart image back to one bit per pixel.
    LineartRepack,
    /// Register with a fax / multipage / email project.
    Project(ProjectKind),
}

impl OutputMode {
    /// Whether downstream processing needs one byte per pixel even for
    /// 1-bit scans.
    pub fn needs_byte_per_pixel(&self) -> bool {
        !matches!(self, Self::Save)
    }
}

/// How pages repeat within one scan request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopMode {
    /// One page, then idle.
    Single,
    /// Keep feeding pages from the document feeder up to `max_pages`.
    Adf { max_pages: u32 },
    /// Return to an external batch driver after each page.
    Batch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_channels_combine_with_master() {
        let params = AcquisitionParameters {
            gray: ChannelAdjust {
                gamma: 2.0,
                brightness: 10.0,
                contrast: 20.0,
            },
            red: ChannelAdjust {
                gamma: 0.5,
                brightness: -5.0,
                contrast: 95.0,
            },
            ..Default::default()
        };

        let red = params.effective(Channel::Red);
        assert!((red.gamma - 1.0).abs() < 1e-9);
        assert!((red.brightness - 5.0).abs() < 1e-9);
        // 20 + 95 exceeds the default range and is clamped.
        assert!((red.contrast - 100.0).abs() < 1e-9);

        let gray = params.effective(Channel::Gray);
        assert_eq!(gray, params.gray);
    }

    #[test]
    fn negative_flags_cancel_out() {
        let mut params = AcquisitionParameters::default();
        assert!(!params.is_negative());
        params.negative = true;
        assert!(params.is_negative());
        params.medium.negative = true;
        assert!(!params.is_negative());
    }

    #[test]
    fn frame_layouts() {
        assert_eq!(FrameFormat::Rgba.samples_per_pixel(), 4);
        assert_eq!(FrameFormat::Green.samples_per_pixel(), 1);
        assert_eq!(FrameFormat::Green.image_channels(), 3);
        assert_eq!(FrameFormat::Blue.separate_channel_slot(), Some(2));
        assert_eq!(FrameFormat::Rgb.separate_channel_slot(), None);
    }

    #[test]
    fn only_save_keeps_packed_lineart() {
        assert!(!OutputMode::Save.needs_byte_per_pixel());
        assert!(OutputMode::Viewer.needs_byte_per_pixel());
        assert!(OutputMode::Project(ProjectKind::Fax).needs_byte_per_pixel());
    }
}
