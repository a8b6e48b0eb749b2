// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Async drivers that feed the session controller from a tokio task.
//
// The controller itself is synchronous. These loops call it once per
// iteration and give the runtime a turn in between, so cancel requests and
// other tasks keep running during a long scan. A cancel also ends a wait on
// the device's ready signal.

use std::path::PathBuf;

use tracing::{debug, info, instrument};

use scanwerk_core::AcquisitionParameters;
use scanwerk_core::error::Result;

use crate::controller::{SessionController, SessionEvent, SessionState};
use crate::device::ScanDevice;
use crate::handoff::PostProcessor;

/// Run one scan request until the controller is idle again.
///
/// Starts a session if none is running. Returns the terminal event:
/// `Completed`, `NoMoreDocuments` or `Cancelled`.
pub async fn drive<D, P>(controller: &mut SessionController<P>, device: &mut D) -> Result<SessionEvent>
where
    D: ScanDevice + ?Sized,
    P: PostProcessor,
{
    let mut event = if controller.state() == SessionState::Idle {
        controller.start_scan(device)?
    } else {
        SessionEvent::Waiting
    };
    let ready = device.ready_signal();
    let cancel = controller.cancel_handle();

    while !event.is_terminal() {
        match (&event, &ready) {
            (SessionEvent::Waiting, Some(signal)) => {
                tokio::select! {
                    _ = signal.notified() => {}
                    _ = cancel.cancelled() => debug!("cancel woke the driver"),
                }
            }
            _ => tokio::task::yield_now().await,
        }
        event = controller.on_chunk_available(device)?;
        match &event {
            SessionEvent::PassStarted { pass, frame } => {
                debug!(pass, format = %frame.format, "pass started");
            }
            SessionEvent::PageFinished { path } => {
                info!(path = %path.display(), "page finished, feeding next");
            }
            _ => {}
        }
    }
    Ok(event)
}

/// Scan one page per parameter set, stopping early when the feeder runs
/// dry or the user cancels. Returns the containers that were written.
#[instrument(skip_all, fields(entries = batch.len()))]
pub async fn drive_batch<D, P>(
    controller: &mut SessionController<P>,
    device: &mut D,
    batch: Vec<AcquisitionParameters>,
) -> Result<Vec<PathBuf>>
where
    D: ScanDevice + ?Sized,
    P: PostProcessor,
{
    let mut written = Vec::new();
    for (index, params) in batch.into_iter().enumerate() {
        controller.set_parameters(params)?;
        match drive(controller, device).await? {
            SessionEvent::Completed { last_path, .. } => written.extend(last_path),
            SessionEvent::NoMoreDocuments => {
                info!(index, "document feeder empty, batch stopped");
                break;
            }
            SessionEvent::Cancelled => {
                info!(index, "batch cancelled");
                break;
            }
            _ => {}
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::Notify;

    use super::*;
    use crate::device::{DeviceRead, DeviceStatus, ReplayDevice, ReplayPass};
    use crate::handoff::RecordingProcessor;
    use scanwerk_core::error::ScanError;
    use scanwerk_core::{ChannelAdjust, FrameDescriptor, FrameFormat, LoopMode, ScanConfig};

    fn gray_page(width: u32, lines: u32) -> Vec<ReplayPass> {
        vec![ReplayPass {
            frame: FrameDescriptor {
                format: FrameFormat::Gray,
                bit_depth: 8,
                pixels_per_line: width,
                lines: Some(lines),
                bytes_per_line: width,
                is_last_frame: true,
            },
            data: vec![128; (width * lines) as usize],
        }]
    }

    fn controller(dir: &tempfile::TempDir, loop_mode: LoopMode) -> SessionController<RecordingProcessor> {
        let config = ScanConfig {
            output_dir: dir.path().to_path_buf(),
            loop_mode,
            ..Default::default()
        };
        SessionController::new(config, AcquisitionParameters::default(), RecordingProcessor::default())
            .unwrap()
    }

    /// Announces every empty read through a ready signal.
    struct SignallingDevice {
        inner: ReplayDevice,
        ready: Arc<Notify>,
        signalled: usize,
    }

    impl ScanDevice for SignallingDevice {
        fn start(&mut self) -> DeviceStatus {
            self.inner.start()
        }

        fn parameters(&self) -> Result<FrameDescriptor> {
            self.inner.parameters()
        }

        fn read(&mut self, buf: &mut [u8]) -> DeviceRead {
            let read = self.inner.read(buf);
            if read.status == DeviceStatus::Good && read.len == 0 {
                self.signalled += 1;
                self.ready.notify_one();
            }
            read
        }

        fn cancel(&mut self) {
            self.inner.cancel();
        }

        fn ready_signal(&self) -> Option<Arc<Notify>> {
            Some(self.ready.clone())
        }
    }

    /// Delivers one chunk, then has no data until it is cancelled.
    struct StalledDevice {
        inner: ReplayDevice,
        ready: Arc<Notify>,
        delivered: bool,
        cancelled: bool,
    }

    impl ScanDevice for StalledDevice {
        fn start(&mut self) -> DeviceStatus {
            self.inner.start()
        }

        fn parameters(&self) -> Result<FrameDescriptor> {
            self.inner.parameters()
        }

        fn read(&mut self, buf: &mut [u8]) -> DeviceRead {
            if self.delivered && !self.cancelled {
                return DeviceRead::data(0);
            }
            self.delivered = true;
            self.inner.read(buf)
        }

        fn cancel(&mut self) {
            self.cancelled = true;
            self.inner.cancel();
        }

        fn ready_signal(&self) -> Option<Arc<Notify>> {
            Some(self.ready.clone())
        }
    }

    #[tokio::test]
    async fn drives_a_page_to_completion() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller(&dir, LoopMode::Single);
        let mut device = ReplayDevice::new(vec![gray_page(8, 8)]).with_chunk_plan(vec![5, 3]);

        let event = drive(&mut controller, &mut device).await.unwrap();
        assert_eq!(
            event,
            SessionEvent::Completed {
                pages: 1,
                last_path: Some(dir.path().join("scan-001.pnm"))
            }
        );
    }

    #[tokio::test]
    async fn waits_on_the_ready_signal() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller(&dir, LoopMode::Single);
        let mut device = SignallingDevice {
            inner: ReplayDevice::new(vec![gray_page(4, 2)])
                .with_chunk_plan(vec![2])
                .with_stall_every(2),
            ready: Arc::new(Notify::new()),
            signalled: 0,
        };

        let event = drive(&mut controller, &mut device).await.unwrap();
        assert!(matches!(event, SessionEvent::Completed { pages: 1, .. }));
        assert!(device.signalled > 0);
    }

    #[tokio::test]
    async fn cancel_from_another_task() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller(&dir, LoopMode::Single);
        let mut device = ReplayDevice::new(vec![gray_page(64, 64)]).with_chunk_plan(vec![16]);
        let handle = controller.cancel_handle();
        tokio::spawn(async move { handle.cancel() });

        let event = drive(&mut controller, &mut device).await.unwrap();
        assert_eq!(event, SessionEvent::Cancelled);
        assert!(!dir.path().join("scan-001.pnm").exists());
        assert!(controller.processor().calls.is_empty());
    }

    #[tokio::test]
    async fn cancel_wakes_a_driver_waiting_for_data() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller(&dir, LoopMode::Single);
        let mut device = StalledDevice {
            inner: ReplayDevice::new(vec![gray_page(8, 8)]).with_chunk_plan(vec![8]),
            ready: Arc::new(Notify::new()),
            delivered: false,
            cancelled: false,
        };
        let handle = controller.cancel_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.cancel();
        });

        let run = drive(&mut controller, &mut device);
        let event = tokio::time::timeout(Duration::from_secs(2), run)
            .await
            .expect("driver kept waiting after cancel")
            .unwrap();
        assert_eq!(event, SessionEvent::Cancelled);
        assert!(device.cancelled);
        assert!(!dir.path().join("scan-001.pnm").exists());
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn batch_stops_on_device_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller(&dir, LoopMode::Batch);
        let pages = vec![gray_page(2, 2), gray_page(2, 2), gray_page(2, 2)];
        let mut device = ReplayDevice::new(pages).with_failure_on_page(1, 0, "lamp failure");
        let batch = vec![AcquisitionParameters::default(); 3];

        let result = drive_batch(&mut controller, &mut device, batch).await;
        assert!(matches!(result, Err(ScanError::Device(ref m)) if m == "lamp failure"));
        assert!(dir.path().join("scan-001.pnm").exists());
        assert!(!dir.path().join("scan-002.pnm").exists());
        assert_eq!(controller.processor().calls.len(), 1);
        assert_eq!(device.pages_remaining(), 1);
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn batch_scans_one_page_per_entry() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller(&dir, LoopMode::Batch);
        let mut device = ReplayDevice::new(vec![gray_page(2, 2), gray_page(2, 2)]);
        let brighter = AcquisitionParameters {
            gray: ChannelAdjust {
                brightness: 30.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let batch = vec![AcquisitionParameters::default(), brighter.clone(), brighter];

        let written = drive_batch(&mut controller, &mut device, batch).await.unwrap();
        assert_eq!(
            written,
            vec![dir.path().join("scan-001.pnm"), dir.path().join("scan-002.pnm")]
        );
        assert_eq!(controller.params().gray.brightness, 30.0);
    }
}
