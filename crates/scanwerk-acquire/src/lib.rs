// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanwerk Acquire — streaming frame assembly and the acquisition session
// controller.
//
// A scan arrives from the device as raw chunks of arbitrary size. The
// assembler corrects each chunk through the session's lookup tables and
// writes it to an image container; the controller sequences passes, pages
// and cancellation, and hands finished containers to post-processing.

pub mod assembler;
pub mod container;
pub mod controller;
pub mod device;
pub mod driver;
pub mod handoff;
pub mod session;

pub use assembler::{AssemblyOptions, FrameAssembler, LineartMode, SampleLayout};
pub use container::{HEADER_LEN, ImageContainer, ImageHeader, read_header, read_image};
pub use controller::{CancelHandle, SessionController, SessionEvent, SessionState};
pub use device::{DeviceRead, DeviceStatus, ReplayDevice, ReplayPass, ScanDevice};
pub use driver::{drive, drive_batch};
pub use handoff::{PostProcessor, RecordingProcessor, ScanProduct, hand_off};
pub use session::AcquisitionSession;
