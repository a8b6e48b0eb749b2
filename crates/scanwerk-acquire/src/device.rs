// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Device boundary — the calls the controller makes on a scanner backend,
// plus `ReplayDevice`, which plays recorded frames back in chunks.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::Notify;
use tracing::debug;

use scanwerk_core::FrameDescriptor;
use scanwerk_core::error::{Result, ScanError};

/// Status a device reports for `start` and `read`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceStatus {
    Good,
    /// The current pass has delivered all of its data.
    EndOfPass,
    /// The document feeder is empty.
    NoDocuments,
    /// The device aborted on its own or after `cancel`.
    Cancelled,
    Error(String),
}

/// Outcome of one `read` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRead {
    pub status: DeviceStatus,
    /// Bytes placed in the buffer. Zero with `Good` means "no data yet".
    pub len: usize,
}

impl DeviceRead {
    pub fn data(len: usize) -> Self {
        Self {
            status: DeviceStatus::Good,
            len,
        }
    }

    pub fn status(status: DeviceStatus) -> Self {
        Self { status, len: 0 }
    }
}

/// A scanner backend.
pub trait ScanDevice {
    /// Begin the next pass; after a page's last pass, the next page.
    fn start(&mut self) -> DeviceStatus;

    /// Frame parameters of the pass that was just started.
    fn parameters(&self) -> Result<FrameDescriptor>;

    /// Read up to `buf.len()` bytes of the current pass.
    fn read(&mut self, buf: &mut [u8]) -> DeviceRead;

    /// Abort the current pass. Later reads report `Cancelled`.
    fn cancel(&mut self);

    /// Signal raised when a non-blocking device has data. Devices without
    /// one are polled.
    fn ready_signal(&self) -> Option<Arc<Notify>> {
        None
    }

    fn is_nonblocking(&self) -> bool {
        self.ready_signal().is_some()
    }
}

/// One recorded pass.
#[derive(Debug, Clone)]
pub struct ReplayPass {
    pub frame: FrameDescriptor,
    pub data: Vec<u8>,
}

/// Plays recorded pages back as a scanner would deliver them.
///
/// Chunk sizes cycle through `chunk_plan`; `stall_every` inserts an empty
/// read before every n-th chunk, and `fail_at` reports an error once that
/// many bytes of a pass were delivered (on every page, or on one page only).
#[derive(Debug)]
pub struct ReplayDevice {
    pages: VecDeque<VecDeque<ReplayPass>>,
    current_page: VecDeque<ReplayPass>,
    pass: Option<ReplayPass>,
    offset: usize,
    chunk_plan: Vec<usize>,
    plan_index: usize,
    stall_every: Option<usize>,
    stalled: bool,
    reads: usize,
    fail_at: Option<(usize, String)>,
    fail_page: Option<usize>,
    pages_started: usize,
    cancelled: bool,
}

impl ReplayDevice {
    pub fn new(pages: Vec<Vec<ReplayPass>>) -> Self {
        Self {
            pages: pages.into_iter().map(VecDeque::from).collect(),
            current_page: VecDeque::new(),
            pass: None,
            offset: 0,
            chunk_plan: vec![usize::MAX],
            plan_index: 0,
            stall_every: None,
            stalled: false,
            reads: 0,
            fail_at: None,
            fail_page: None,
            pages_started: 0,
            cancelled: false,
        }
    }

    /// Single page, single pass.
    pub fn single(frame: FrameDescriptor, data: Vec<u8>) -> Self {
        Self::new(vec![vec![ReplayPass { frame, data }]])
    }

    pub fn with_chunk_plan(mut self, plan: Vec<usize>) -> Self {
        let plan: Vec<usize> = plan.into_iter().filter(|&n| n > 0).collect();
        if !plan.is_empty() {
            self.chunk_plan = plan;
        }
        self
    }

    pub fn with_stall_every(mut self, reads: usize) -> Self {
        self.stall_every = (reads > 0).then_some(reads);
        self
    }

    pub fn with_failure_at(mut self, offset: usize, message: impl Into<String>) -> Self {
        self.fail_at = Some((offset, message.into()));
        self.fail_page = None;
        self
    }

    /// Like `with_failure_at`, but only on the page with this zero-based index.
    pub fn with_failure_on_page(
        mut self,
        page: usize,
        offset: usize,
        message: impl Into<String>,
    ) -> Self {
        self.fail_at = Some((offset, message.into()));
        self.fail_page = Some(page);
        self
    }

    fn failure_armed(&self) -> Option<&(usize, String)> {
        let on_this_page = self
            .fail_page
            .is_none_or(|page| self.pages_started == page + 1);
        self.fail_at.as_ref().filter(|_| on_this_page)
    }

    /// Pages not yet started.
    pub fn pages_remaining(&self) -> usize {
        self.pages.len()
    }

    fn next_chunk_len(&mut self) -> usize {
        let len = self.chunk_plan[self.plan_index % self.chunk_plan.len()];
        self.plan_index += 1;
        len
    }
}

impl ScanDevice for ReplayDevice {
    fn start(&mut self) -> DeviceStatus {
        self.cancelled = false;
        if self.current_page.is_empty() {
            match self.pages.pop_front() {
                Some(page) => {
                    self.current_page = page;
                    self.pages_started += 1;
                }
                None => return DeviceStatus::NoDocuments,
            }
        }
        match self.current_page.pop_front() {
            Some(pass) => {
                debug!(format = %pass.frame.format, bytes = pass.data.len(), "replay pass started");
                self.pass = Some(pass);
                self.offset = 0;
                DeviceStatus::Good
            }
            None => DeviceStatus::NoDocuments,
        }
    }

    fn parameters(&self) -> Result<FrameDescriptor> {
        self.pass
            .as_ref()
            .map(|pass| pass.frame)
            .ok_or_else(|| ScanError::Device("no pass started".into()))
    }

    fn read(&mut self, buf: &mut [u8]) -> DeviceRead {
        if self.cancelled {
            return DeviceRead::status(DeviceStatus::Cancelled);
        }
        let Some(pass) = self.pass.as_ref() else {
            return DeviceRead::status(DeviceStatus::Error("read before start".into()));
        };
        if let Some((at, message)) = self.failure_armed() {
            if self.offset >= *at {
                return DeviceRead::status(DeviceStatus::Error(message.clone()));
            }
        }

        let remaining = pass.data.len() - self.offset;
        if remaining == 0 {
            return DeviceRead::status(DeviceStatus::EndOfPass);
        }

        self.reads += 1;
        if let Some(every) = self.stall_every {
            if self.reads % every == 0 && !self.stalled {
                self.stalled = true;
                return DeviceRead::data(0);
            }
        }
        self.stalled = false;

        let mut len = self.next_chunk_len().min(buf.len()).min(remaining);
        if let Some((at, _)) = self.failure_armed() {
            len = len.min(at.saturating_sub(self.offset).max(1));
        }
        let Some(pass) = self.pass.as_ref() else {
            return DeviceRead::status(DeviceStatus::Error("read before start".into()));
        };
        buf[..len].copy_from_slice(&pass.data[self.offset..self.offset + len]);
        self.offset += len;
        DeviceRead::data(len)
    }

    fn cancel(&mut self) {
        self.cancelled = true;
    }
}
