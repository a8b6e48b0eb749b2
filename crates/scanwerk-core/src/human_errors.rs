// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for the scan dialog.
//
// Every technical error is mapped to plain English with a clear suggestion.
// The device's own message is always kept next to the summary so the user
// can quote it. A cancelled scan is not an error and maps to nothing.

use crate::error::ScanError;

/// Severity of an error from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Scanning again is likely to work.
    Transient,
    /// User must do something (load paper, unlock the scanner, free disk space).
    ActionRequired,
    /// Retrying will not help with these settings.
    Permanent,
}

/// A human-readable error with plain English message and actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Plain English summary (shown as a heading).
    pub message: String,
    /// What the user should try (shown as body text).
    pub suggestion: String,
    /// Underlying message reported by the device or the OS.
    pub detail: Option<String>,
    /// Severity level (drives icon/colour in UI).
    pub severity: Severity,
}

/// Convert a `ScanError` into a `HumanError`.
///
/// Returns `None` for [`ScanError::Cancelled`], which the UI does not report.
pub fn humanize_error(err: &ScanError) -> Option<HumanError> {
    let human = match err {
        ScanError::Cancelled => return None,

        ScanError::UnsupportedFrame { format, depth } => HumanError {
            message: "The scanner sent image data we can't read.".into(),
            suggestion: "Try a different scan mode or bit depth (for example 8-bit color).".into(),
            detail: Some(format!("{format} frame at {depth} bits")),
            severity: Severity::Permanent,
        },

        ScanError::Device(detail) => humanize_device_error(detail),

        ScanError::ContainerIo(io_err) => match io_err.kind() {
            std::io::ErrorKind::PermissionDenied => HumanError {
                message: "The scan couldn't be saved in that folder.".into(),
                suggestion: "Choose a folder you are allowed to write to, then scan again.".into(),
                detail: Some(io_err.to_string()),
                severity: Severity::ActionRequired,
            },
            std::io::ErrorKind::NotFound => HumanError {
                message: "The output folder doesn't exist.".into(),
                suggestion: "Create the folder or pick another one in the settings.".into(),
                detail: Some(io_err.to_string()),
                severity: Severity::ActionRequired,
            },
            _ => HumanError {
                message: "There was a problem writing the scanned image.".into(),
                suggestion: "Your disk may be full. Free some space and scan again.".into(),
                detail: Some(io_err.to_string()),
                severity: Severity::Transient,
            },
        },

        ScanError::InvalidState(detail) => HumanError {
            message: "A scan is already running.".into(),
            suggestion: "Wait for the current scan to finish or cancel it first.".into(),
            detail: Some(detail.clone()),
            severity: Severity::Transient,
        },

        ScanError::Config(detail) => HumanError {
            message: "The scan settings are not valid.".into(),
            suggestion: "Check the settings and try again.".into(),
            detail: Some(detail.clone()),
            severity: Severity::ActionRequired,
        },

        ScanError::Serialization(e) => HumanError {
            message: "The settings file couldn't be read.".into(),
            suggestion: "The file may be damaged. Delete it to go back to the default settings.".into(),
            detail: Some(e.to_string()),
            severity: Severity::ActionRequired,
        },

        ScanError::ImageError(detail) => HumanError {
            message: "The scanned image couldn't be converted.".into(),
            suggestion: "The raw scan was kept. Try saving in a different file format.".into(),
            detail: Some(detail.clone()),
            severity: Severity::Permanent,
        },
    };
    Some(human)
}

/// Parse device status messages into human-readable messages.
fn humanize_device_error(detail: &str) -> HumanError {
    let lower = detail.to_ascii_lowercase();

    let (message, suggestion, severity) = if lower.contains("jammed") || lower.contains("jam") {
        (
            "Paper is stuck in the document feeder.",
            "Open the feeder, remove the paper, and scan again.",
            Severity::ActionRequired,
        )
    } else if lower.contains("cover open") || lower.contains("cover-open") {
        (
            "The scanner lid is open.",
            "Close the lid and scan again.",
            Severity::ActionRequired,
        )
    } else if lower.contains("locked") {
        (
            "The scanner is locked.",
            "Release the transport lock on the scanner, then scan again.",
            Severity::ActionRequired,
        )
    } else if lower.contains("busy") {
        (
            "The scanner is busy.",
            "Wait a moment and try again.",
            Severity::Transient,
        )
    } else if lower.contains("i/o") || lower.contains("io error") {
        (
            "We lost contact with the scanner.",
            "Check the cable or network connection, then scan again.",
            Severity::Transient,
        )
    } else {
        (
            "The scanner reported a problem.",
            "Try again. If this keeps happening, switch the scanner off and on.",
            Severity::Transient,
        )
    };

    HumanError {
        message: message.into(),
        suggestion: suggestion.into(),
        detail: Some(detail.to_string()),
        severity,
    }
}
