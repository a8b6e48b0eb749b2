// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Session controller — the acquisition state machine.
//
//   Idle → Started → Reading ⟲ → PassComplete → (Started | Finalizing) → Idle
//                      ↘ Cancelling → Idle
//
// The controller owns the one active session, its lookup tables and its
// container. It is driven from outside: `start_scan` once, then
// `on_chunk_available` whenever the device may have data. Every call does a
// bounded amount of work and returns a `SessionEvent`, so the caller's loop
// stays responsive. Cancellation is a flag checked at the top of each
// callback; partial containers are deleted on cancel and on error.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tokio::sync::Notify;
use tracing::{debug, error, info, instrument, warn};

use scanwerk_core::error::{Result, ScanError};
use scanwerk_core::{AcquisitionParameters, FrameDescriptor, LoopMode, ScanConfig};
use scanwerk_enhance::EnhancementTables;

use crate::assembler::{AssemblyOptions, FrameAssembler, LineartMode, SampleLayout};
use crate::container::{ByteOrder, EnhancementMetadata, ImageContainer, ImageHeader};
use crate::device::{DeviceStatus, ScanDevice};
use crate::handoff::{PostProcessor, ScanProduct, hand_off};
use crate::session::AcquisitionSession;

/// Shared cancellation flag. Setting it is idempotent and safe from any
/// thread; the controller acts on it at its next callback, and a driver
/// parked on a device signal is woken through [`CancelHandle::cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            self.wake.notified().await;
        }
    }

    fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Started,
    Reading,
    PassComplete,
    Finalizing,
    Cancelling,
}

/// What one controller call did.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// No session is running.
    Idle,
    /// The device had no data yet. The pass is still alive.
    Waiting,
    Data { read: usize, written: usize },
    PassStarted { pass: u32, frame: FrameDescriptor },
    /// A page was finalized and the feeder delivered the next one.
    PageFinished { path: PathBuf },
    /// The session finalized and the controller is idle again.
    Completed {
        pages: u32,
        last_path: Option<PathBuf>,
    },
    /// The feeder was empty before any page of this run.
    NoMoreDocuments,
    Cancelled,
}

impl SessionEvent {
    /// Whether the controller is idle after this event.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Idle | Self::Completed { .. } | Self::NoMoreDocuments | Self::Cancelled
        )
    }
}

/// The page currently being written.
struct ActivePage {
    path: PathBuf,
    container: ImageContainer<File>,
    frame: FrameDescriptor,
    assembler: FrameAssembler,
}

/// Acquisition state machine for one device at a time.
pub struct SessionController<P> {
    config: ScanConfig,
    params: AcquisitionParameters,
    processor: P,
    state: SessionState,
    cancel: CancelHandle,
    session: Option<AcquisitionSession>,
    page: Option<ActivePage>,
    tables: EnhancementTables,
    buf: Vec<u8>,
    next_counter: u32,
    pages_in_run: u32,
    last_path: Option<PathBuf>,
}

impl<P: PostProcessor> SessionController<P> {
    pub fn new(config: ScanConfig, params: AcquisitionParameters, processor: P) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            buf: vec![0; config.read_buffer_len],
            next_counter: config.first_counter,
            config,
            params,
            processor,
            state: SessionState::Idle,
            cancel: CancelHandle::default(),
            session: None,
            page: None,
            tables: EnhancementTables::default(),
            pages_in_run: 0,
            last_path: None,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn params(&self) -> &AcquisitionParameters {
        &self.params
    }

    /// Replace the enhancement parameters. Only allowed between sessions.
    pub fn set_parameters(&mut self, params: AcquisitionParameters) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(ScanError::InvalidState(format!(
                "parameters changed while {:?}",
                self.state
            )));
        }
        self.params = params;
        Ok(())
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    pub fn session(&self) -> Option<&AcquisitionSession> {
        self.session.as_ref()
    }

    /// Counter the next container will be named with.
    pub fn next_counter(&self) -> u32 {
        self.next_counter
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Ask the running session to stop. A no-op while idle.
    pub fn request_cancel(&self) {
        if self.state != SessionState::Idle {
            info!("cancel requested");
            self.cancel.cancel();
        }
    }

    fn options(&self) -> AssemblyOptions {
        let expand = self.config.expand_lineart || self.config.output_mode.needs_byte_per_pixel();
        AssemblyOptions {
            lineart: if expand {
                LineartMode::Expand
            } else {
                LineartMode::Packed
            },
            reduce_to_8bit: self.config.reduce_to_8bit,
        }
    }

    /// Start a session and its first pass.
    #[instrument(skip_all)]
    pub fn start_scan<D: ScanDevice + ?Sized>(&mut self, device: &mut D) -> Result<SessionEvent> {
        if self.state != SessionState::Idle {
            return Err(ScanError::InvalidState(format!(
                "scan requested while {:?}",
                self.state
            )));
        }
        self.cancel.reset();
        self.pages_in_run = 0;
        self.last_path = None;
        let session = AcquisitionSession::new(self.next_counter);
        info!(session = %session.id, "scan session started");
        self.session = Some(session);
        self.begin_page(device)
    }

    /// Handle one "device may have data" notification.
    pub fn on_chunk_available<D: ScanDevice + ?Sized>(
        &mut self,
        device: &mut D,
    ) -> Result<SessionEvent> {
        match self.state {
            SessionState::Idle => return Ok(SessionEvent::Idle),
            SessionState::Started | SessionState::Reading => {}
            state => {
                return Err(ScanError::InvalidState(format!(
                    "chunk callback while {state:?}"
                )));
            }
        }
        if self.cancel.is_cancelled() {
            return Ok(self.abort(device));
        }

        let read = device.read(&mut self.buf);
        match read.status {
            DeviceStatus::Good if read.len == 0 => Ok(SessionEvent::Waiting),
            DeviceStatus::Good => {
                let len = read.len.min(self.buf.len());
                match self.process(len) {
                    Ok(written) => {
                        self.state = SessionState::Reading;
                        Ok(SessionEvent::Data { read: len, written })
                    }
                    Err(e) => self.fail(device, e),
                }
            }
            DeviceStatus::EndOfPass => self.complete_pass(device),
            DeviceStatus::Cancelled => Ok(self.abort(device)),
            DeviceStatus::NoDocuments => {
                self.fail(device, ScanError::Device("document feeder emptied mid-page".into()))
            }
            DeviceStatus::Error(message) => self.fail(device, ScanError::Device(message)),
        }
    }

    fn process(&mut self, len: usize) -> Result<usize> {
        let (Some(page), Some(session)) = (self.page.as_mut(), self.session.as_mut()) else {
            return Err(ScanError::InvalidState("chunk without an active page".into()));
        };
        page.assembler
            .process_chunk(&self.buf[..len], &self.tables, session, &mut page.container)
    }

    /// Ask the device for the next page and open its container.
    fn begin_page<D: ScanDevice + ?Sized>(&mut self, device: &mut D) -> Result<SessionEvent> {
        match device.start() {
            DeviceStatus::Good => match self.open_page(device) {
                Ok(event) => Ok(event),
                Err(e) => self.fail(device, e),
            },
            DeviceStatus::NoDocuments if self.pages_in_run > 0 => {
                info!(pages = self.pages_in_run, "document feeder empty");
                Ok(self.complete_run())
            }
            DeviceStatus::NoDocuments if self.config.loop_mode != LoopMode::Single => {
                info!("no documents to scan");
                self.end_session();
                Ok(SessionEvent::NoMoreDocuments)
            }
            DeviceStatus::NoDocuments => {
                self.fail(device, ScanError::Device("document feeder is empty".into()))
            }
            DeviceStatus::Cancelled => Ok(self.abort(device)),
            DeviceStatus::EndOfPass => self.fail(
                device,
                ScanError::Device("device ended a pass it had not started".into()),
            ),
            DeviceStatus::Error(message) => self.fail(device, ScanError::Device(message)),
        }
    }

    fn open_page<D: ScanDevice + ?Sized>(&mut self, device: &mut D) -> Result<SessionEvent> {
        if self.session.is_none() {
            return Err(ScanError::InvalidState("page opened outside a session".into()));
        }
        let frame = device.parameters()?;
        let assembler = FrameAssembler::new(&frame, &self.options())?;
        let header = page_header(
            &frame,
            assembler.layout(),
            &self.params,
            self.config.lineart_from_gray,
        );
        self.tables =
            EnhancementTables::for_frame(&self.params, &frame, self.config.lineart_from_gray);

        let counter = self.next_counter;
        let path = self.config.container_path(counter);
        let container = match open_container(&path, &header) {
            Ok(container) => container,
            Err(e) => {
                remove_container(&path);
                return Err(e);
            }
        };

        if let Some(session) = self.session.as_mut() {
            session.begin_page(counter);
        }
        info!(
            path = %path.display(),
            format = %frame.format,
            depth = frame.bit_depth,
            width = frame.pixels_per_line,
            "page started"
        );
        self.page = Some(ActivePage {
            path,
            container,
            frame,
            assembler,
        });
        self.state = SessionState::Started;
        Ok(SessionEvent::PassStarted { pass: 0, frame })
    }

    fn complete_pass<D: ScanDevice + ?Sized>(&mut self, device: &mut D) -> Result<SessionEvent> {
        self.state = SessionState::PassComplete;
        let Some(frame) = self.page.as_ref().map(|page| page.frame) else {
            return self.fail(device, ScanError::InvalidState("pass ended without a page".into()));
        };
        if let Some(session) = &self.session {
            debug!(
                pass = session.pass_index,
                bytes = session.pass_bytes,
                "pass complete"
            );
        }

        if !frame.is_last_frame {
            return match self.next_pass(device) {
                Ok(event) => Ok(event),
                Err(e) => self.fail(device, e),
            };
        }

        let product = match self.finalize() {
            Ok(product) => product,
            Err(e) => return self.fail(device, e),
        };
        self.pages_in_run += 1;
        self.next_counter += 1;
        self.last_path = Some(product.path.clone());

        if let Err(e) = hand_off(self.config.output_mode, &mut self.processor, &product) {
            warn!(error = %e, path = %product.path.display(), "post-processing failed, scan kept");
            self.end_session();
            return Err(e);
        }

        match self.config.loop_mode {
            LoopMode::Adf { max_pages } if self.pages_in_run < max_pages => {
                match self.begin_page(device)? {
                    SessionEvent::PassStarted { .. } => {
                        Ok(SessionEvent::PageFinished { path: product.path })
                    }
                    other => Ok(other),
                }
            }
            _ => Ok(self.complete_run()),
        }
    }

    fn next_pass<D: ScanDevice + ?Sized>(&mut self, device: &mut D) -> Result<SessionEvent> {
        match device.start() {
            DeviceStatus::Good => {}
            DeviceStatus::Cancelled => return Ok(self.abort(device)),
            DeviceStatus::Error(message) => return Err(ScanError::Device(message)),
            other => {
                return Err(ScanError::Device(format!(
                    "device could not start the next pass: {other:?}"
                )));
            }
        }

        let frame = device.parameters()?;
        let assembler = FrameAssembler::new(&frame, &self.options())?;
        let (Some(page), Some(session)) = (self.page.as_mut(), self.session.as_mut()) else {
            return Err(ScanError::InvalidState("pass started without a page".into()));
        };
        if let Some(header) = page.container.header() {
            if header.width != frame.pixels_per_line
                || header.depth != assembler.layout().stored_depth()
            {
                return Err(ScanError::Device(format!(
                    "pass {} does not match the first pass ({} px at {} bits)",
                    session.pass_index + 1,
                    frame.pixels_per_line,
                    frame.bit_depth
                )));
            }
        }

        session.begin_pass();
        page.frame = frame;
        page.assembler = assembler;
        self.state = SessionState::Started;
        info!(pass = session.pass_index, format = %frame.format, "next pass started");
        Ok(SessionEvent::PassStarted {
            pass: session.pass_index,
            frame,
        })
    }

    /// Correct the header and close the container.
    fn finalize(&mut self) -> Result<ScanProduct> {
        self.state = SessionState::Finalizing;
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| ScanError::InvalidState("finalize without a session".into()))?;
        let page = self
            .page
            .take()
            .ok_or_else(|| ScanError::InvalidState("finalize without a page".into()))?;
        let ActivePage {
            path,
            container,
            frame,
            ..
        } = page;

        let header = match close_container(container, &frame, session.pass_bytes) {
            Ok(header) => header,
            Err(e) => {
                remove_container(&path);
                return Err(e);
            }
        };
        self.tables = EnhancementTables::default();

        info!(
            path = %path.display(),
            lines = header.height,
            bytes = session.bytes_written,
            "container finalized"
        );
        Ok(ScanProduct {
            path,
            session: session.id,
            page_counter: session.page_counter,
            frame,
            header,
            params: self.params.clone(),
            completed_at: Utc::now(),
        })
    }

    fn complete_run(&mut self) -> SessionEvent {
        let pages = self.pages_in_run;
        let last_path = self.last_path.take();
        self.end_session();
        SessionEvent::Completed { pages, last_path }
    }

    fn abort<D: ScanDevice + ?Sized>(&mut self, device: &mut D) -> SessionEvent {
        self.state = SessionState::Cancelling;
        device.cancel();
        self.discard_page();
        self.end_session();
        info!("scan cancelled");
        SessionEvent::Cancelled
    }

    fn fail<D: ScanDevice + ?Sized, T>(&mut self, device: &mut D, error: ScanError) -> Result<T> {
        error!(error = %error, "scan failed");
        if !matches!(error, ScanError::Device(_)) {
            device.cancel();
        }
        self.discard_page();
        self.end_session();
        Err(error)
    }

    fn discard_page(&mut self) {
        if let Some(ActivePage {
            path, container, ..
        }) = self.page.take()
        {
            drop(container);
            remove_container(&path);
        }
    }

    fn end_session(&mut self) {
        self.page = None;
        self.session = None;
        self.tables = EnhancementTables::default();
        self.cancel.reset();
        self.state = SessionState::Idle;
    }
}

/// Header for a new page, before the line count is known for certain.
fn page_header(
    frame: &FrameDescriptor,
    layout: SampleLayout,
    params: &AcquisitionParameters,
    lineart_from_gray: bool,
) -> ImageHeader {
    ImageHeader {
        width: frame.pixels_per_line,
        height: frame.lines.unwrap_or(0),
        depth: layout.stored_depth(),
        channels: frame.format.image_channels() as u8,
        resolution: params.resolution,
        enhancement: EnhancementMetadata::from(params),
        reduce_to_lineart: layout.is_expanded_lineart()
            || (lineart_from_gray && layout == SampleLayout::Gray8),
        color_profile: params.color_profile.clone(),
        byte_order: ByteOrder::Big,
    }
}

fn open_container(path: &Path, header: &ImageHeader) -> Result<ImageContainer<File>> {
    let mut container = ImageContainer::create(path)?;
    container.write_header(header)?;
    Ok(container)
}

/// Rewrite the line count the device actually delivered and flush.
fn close_container(
    mut container: ImageContainer<File>,
    frame: &FrameDescriptor,
    pass_bytes: u64,
) -> Result<ImageHeader> {
    let mut header = container
        .header()
        .cloned()
        .ok_or_else(|| ScanError::InvalidState("container has no header".into()))?;
    let delivered = match frame.bytes_per_line {
        0 => frame.lines.unwrap_or(0),
        bpl => u32::try_from(pass_bytes / bpl as u64).unwrap_or(u32::MAX),
    };
    if header.height != delivered {
        if let Some(expected_bytes) = frame.expected_bytes() {
            warn!(
                expected = header.height,
                delivered,
                expected_bytes,
                pass_bytes,
                "device delivered a different line count"
            );
        }
        header.height = delivered;
        container.rewrite_header(&header)?;
    }
    container.finish()?;
    Ok(header)
}

fn remove_container(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "partial container removed"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "could not remove partial container"),
    }
}
