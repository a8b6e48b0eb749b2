// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image container — a fixed-length PNM/PAM header followed by the pixel
// region.
//
// The header is padded to `HEADER_LEN` bytes so it can be rewritten in place
// once the real line count is known. Enhancement metadata travels on a
// `# scanwerk <json>` comment line that PNM readers skip.
//
// Three-pass scans write one channel slot per pass into pixel groups that
// earlier passes already filled. The container owns the read-modify-write:
// it flushes pending writes before reading sibling bytes back, patches the
// slot, and writes the whole group again. Callers never handle offsets.

use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use scanwerk_core::error::{Result, ScanError};
use scanwerk_core::{AcquisitionParameters, Channel, ChannelAdjust, Resolution};

/// Length of every container header in bytes.
pub const HEADER_LEN: u64 = 1024;

/// Marker of the metadata comment line.
const METADATA_TAG: &str = "# scanwerk ";

/// Byte order of 16-bit samples in the pixel region. Scanwerk writes `Big`,
/// the PNM convention; readers honour whatever a header records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ByteOrder {
    Big,
    Little,
}

/// Adjustments that were baked into the pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancementMetadata {
    pub gray: ChannelAdjust,
    pub red: ChannelAdjust,
    pub green: ChannelAdjust,
    pub blue: ChannelAdjust,
    pub threshold: f64,
    pub negative: bool,
}

impl From<&AcquisitionParameters> for EnhancementMetadata {
    fn from(params: &AcquisitionParameters) -> Self {
        Self {
            gray: params.effective(Channel::Gray),
            red: params.effective(Channel::Red),
            green: params.effective(Channel::Green),
            blue: params.effective(Channel::Blue),
            threshold: params.threshold,
            negative: params.is_negative(),
        }
    }
}

/// Everything the container header records about the image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageHeader {
    pub width: u32,
    pub height: u32,
    /// Bits per stored sample: 1, 8 or 16.
    pub depth: u8,
    /// 1 (gray), 3 (RGB) or 4 (RGB plus auxiliary).
    pub channels: u8,
    pub resolution: Resolution,
    pub enhancement: EnhancementMetadata,
    /// The byte-per-pixel image stands for lineart and should be packed back
    /// to one bit per pixel when saved.
    pub reduce_to_lineart: bool,
    pub color_profile: Option<String>,
    pub byte_order: ByteOrder,
}

impl ImageHeader {
    /// Bytes one line of stored pixels occupies.
    pub fn bytes_per_line(&self) -> u64 {
        let bits = self.width as u64 * self.channels as u64 * self.depth as u64;
        bits.div_ceil(8)
    }

    fn maxval(&self) -> u32 {
        if self.depth == 16 { 65535 } else { 255 }
    }

    /// Encode to exactly `HEADER_LEN` bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let (w, h) = (self.width, self.height);
        let (magic, dims) = match (self.channels, self.depth) {
            (1, 1) => ("P4", format!("{w} {h}\n")),
            (1, 8 | 16) => ("P5", format!("{w} {h}\n{}\n", self.maxval())),
            (3, 8 | 16) => ("P6", format!("{w} {h}\n{}\n", self.maxval())),
            (4, 8 | 16) => (
                "P7",
                format!(
                    "WIDTH {w}\nHEIGHT {h}\nDEPTH 4\nMAXVAL {}\nTUPLTYPE RGB_ALPHA\nENDHDR\n",
                    self.maxval()
                ),
            ),
            (channels, depth) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("no container layout for {channels} channels at {depth} bits"),
                )
                .into());
            }
        };

        let metadata = serde_json::to_string(self)?;
        let head = format!("{magic}\n{METADATA_TAG}{metadata}\n");
        // The padding line is '#' + spaces + '\n'.
        let fixed = head.len() + dims.len() + 2;
        if fixed as u64 > HEADER_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("header needs {fixed} bytes, only {HEADER_LEN} reserved"),
            )
            .into());
        }
        let padding = " ".repeat(HEADER_LEN as usize - fixed);

        let mut out = String::with_capacity(HEADER_LEN as usize);
        out.push_str(&head);
        out.push('#');
        out.push_str(&padding);
        out.push('\n');
        out.push_str(&dims);
        Ok(out.into_bytes())
    }

    /// Decode the metadata line of an encoded header.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let end = bytes.len().min(HEADER_LEN as usize);
        let text = String::from_utf8_lossy(&bytes[..end]);
        let json = text
            .lines()
            .find_map(|line| line.strip_prefix(METADATA_TAG))
            .ok_or_else(|| {
                ScanError::ContainerIo(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "container header has no metadata line",
                ))
            })?;
        Ok(serde_json::from_str(json)?)
    }
}

/// Read the header of a container file.
pub fn read_header(path: impl AsRef<Path>) -> Result<ImageHeader> {
    let mut file = File::open(path.as_ref())?;
    let mut bytes = vec![0u8; HEADER_LEN as usize];
    file.read_exact(&mut bytes)?;
    ImageHeader::decode(&bytes)
}

/// Read the header and pixel region of a container file.
pub fn read_image(path: impl AsRef<Path>) -> Result<(ImageHeader, Vec<u8>)> {
    let bytes = std::fs::read(path.as_ref())?;
    let header = ImageHeader::decode(&bytes)?;
    let pixels = bytes
        .get(HEADER_LEN as usize..)
        .map(<[u8]>::to_vec)
        .unwrap_or_default();
    Ok((header, pixels))
}

/// Output sink for one scanned image.
pub struct ImageContainer<S: Write> {
    io: BufWriter<S>,
    header: Option<ImageHeader>,
    /// Logical stream position, tracked to skip redundant seeks.
    position: u64,
    /// Pixel bytes written by sequential appends.
    appended: u64,
}

impl ImageContainer<File> {
    /// Create (or truncate) a container file.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;
        debug!("image container created");
        Ok(Self::new(file))
    }
}

impl<S: Read + Write + Seek> ImageContainer<S> {
    /// Wrap an empty, readable and writable backing store.
    pub fn new(inner: S) -> Self {
        Self {
            io: BufWriter::new(inner),
            header: None,
            position: 0,
            appended: 0,
        }
    }

    pub fn header(&self) -> Option<&ImageHeader> {
        self.header.as_ref()
    }

    /// Write the header. Allowed once, before any pixel byte.
    pub fn write_header(&mut self, header: &ImageHeader) -> Result<()> {
        if self.header.is_some() {
            return Err(ScanError::InvalidState(
                "container header already written".into(),
            ));
        }
        self.put_header(header)
    }

    /// Replace the header in place, e.g. with the delivered line count.
    pub fn rewrite_header(&mut self, header: &ImageHeader) -> Result<()> {
        if self.header.is_none() {
            return Err(ScanError::InvalidState(
                "container header not written yet".into(),
            ));
        }
        self.put_header(header)
    }

    fn put_header(&mut self, header: &ImageHeader) -> Result<()> {
        let bytes = header.encode()?;
        self.seek_to(0)?;
        self.io.write_all(&bytes)?;
        self.position = HEADER_LEN;
        self.header = Some(header.clone());
        Ok(())
    }

    fn require_header(&self) -> Result<()> {
        match self.header {
            Some(_) => Ok(()),
            None => Err(ScanError::InvalidState(
                "pixel data written before the container header".into(),
            )),
        }
    }

    /// Append bytes to the pixel region in delivery order.
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        self.require_header()?;
        self.seek_to(HEADER_LEN + self.appended)?;
        self.io.write_all(bytes)?;
        self.position += bytes.len() as u64;
        self.appended += bytes.len() as u64;
        Ok(())
    }

    /// Set one channel byte of a 3-channel, 8-bit pixel.
    pub fn write_channel_byte(
        &mut self,
        pixel_index: u64,
        channel_index: usize,
        value: u8,
    ) -> Result<()> {
        self.write_channel_samples(pixel_index, channel_index, 3, 1, &[value])
    }

    /// Set one channel slot in consecutive pixels starting at `first_pixel`.
    ///
    /// `samples` holds `sample_len` bytes per pixel. Sibling slots keep the
    /// bytes already in the container; slots never written read as zero.
    pub fn write_channel_samples(
        &mut self,
        first_pixel: u64,
        channel_index: usize,
        channels: usize,
        sample_len: usize,
        samples: &[u8],
    ) -> Result<()> {
        self.require_header()?;
        if channel_index >= channels || sample_len == 0 || samples.len() % sample_len != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "bad channel write: slot {channel_index} of {channels}, {} bytes of {sample_len}-byte samples",
                    samples.len()
                ),
            )
            .into());
        }
        let count = samples.len() / sample_len;
        if count == 0 {
            return Ok(());
        }

        let group = channels * sample_len;
        let start = HEADER_LEN + first_pixel * group as u64;
        let mut groups = vec![0u8; count * group];
        self.read_back(start, &mut groups)?;

        for (i, sample) in samples.chunks_exact(sample_len).enumerate() {
            let at = i * group + channel_index * sample_len;
            groups[at..at + sample_len].copy_from_slice(sample);
        }

        self.seek_to(start)?;
        self.io.write_all(&groups)?;
        self.position = start + groups.len() as u64;
        Ok(())
    }

    /// Fill `buf` from `start`, leaving bytes past the end of the data as
    /// they are. Pending writes are flushed first so the read sees them.
    fn read_back(&mut self, start: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.io.flush()?;
        let inner = self.io.get_mut();
        inner.seek(SeekFrom::Start(start))?;
        let mut filled = 0;
        while filled < buf.len() {
            match inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        self.position = start + filled as u64;
        Ok(filled)
    }

    fn seek_to(&mut self, position: u64) -> io::Result<()> {
        if self.position != position {
            self.io.seek(SeekFrom::Start(position))?;
            self.position = position;
        }
        Ok(())
    }

    /// Everything after the header.
    pub fn read_pixels(&mut self) -> Result<Vec<u8>> {
        self.io.flush()?;
        let inner = self.io.get_mut();
        inner.seek(SeekFrom::Start(HEADER_LEN))?;
        let mut pixels = Vec::new();
        inner.read_to_end(&mut pixels)?;
        self.position = HEADER_LEN + pixels.len() as u64;
        Ok(pixels)
    }

    /// Flush and hand back the backing store.
    pub fn finish(mut self) -> Result<S> {
        self.io.flush()?;
        self.io
            .into_inner()
            .map_err(|e| ScanError::ContainerIo(e.into_error()))
    }
}
