// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-scan mutable state: counters, the 16-bit carry byte and the positions
// that must survive chunk boundaries.

use scanwerk_core::SessionId;

/// State of one acquisition, from the scan request until it finalizes.
#[derive(Debug, Clone)]
pub struct AcquisitionSession {
    pub id: SessionId,
    /// Counter used to name the current page's container.
    pub page_counter: u32,
    /// Zero-based pass within the current page.
    pub pass_index: u32,
    /// Raw bytes delivered across all passes of the current page.
    pub bytes_read: u64,
    /// Raw bytes delivered in the current pass.
    pub pass_bytes: u64,
    /// Bytes written to the container for the current page.
    pub bytes_written: u64,
    /// First byte of a 16-bit sample split across chunks.
    pub carry: Option<u8>,
    /// Next channel slot of an interleaved frame.
    pub color_position: usize,
    /// Pixel column within the current lineart row.
    pub lineart_column: u32,
    /// Samples of the current pass already written.
    pub samples_in_pass: u64,
}

impl AcquisitionSession {
    pub fn new(page_counter: u32) -> Self {
        Self {
            id: SessionId::new(),
            page_counter,
            pass_index: 0,
            bytes_read: 0,
            pass_bytes: 0,
            bytes_written: 0,
            carry: None,
            color_position: 0,
            lineart_column: 0,
            samples_in_pass: 0,
        }
    }

    /// Reset the per-pass positions for the next pass of the same page.
    pub fn begin_pass(&mut self) {
        self.pass_index += 1;
        self.reset_pass();
    }

    /// Start a fresh page under a new counter.
    pub fn begin_page(&mut self, page_counter: u32) {
        self.page_counter = page_counter;
        self.pass_index = 0;
        self.bytes_read = 0;
        self.bytes_written = 0;
        self.reset_pass();
    }

    fn reset_pass(&mut self) {
        self.pass_bytes = 0;
        self.carry = None;
        self.color_position = 0;
        self.lineart_column = 0;
        self.samples_in_pass = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_pass_clears_positions_but_keeps_totals() {
        let mut session = AcquisitionSession::new(4);
        session.bytes_read = 300;
        session.pass_bytes = 300;
        session.carry = Some(0x7f);
        session.color_position = 2;
        session.samples_in_pass = 150;

        session.begin_pass();

        assert_eq!(session.pass_index, 1);
        assert_eq!(session.bytes_read, 300);
        assert_eq!(session.pass_bytes, 0);
        assert_eq!(session.carry, None);
        assert_eq!(session.color_position, 0);
        assert_eq!(session.samples_in_pass, 0);
    }

    #[test]
    fn next_page_resets_everything_but_the_id() {
        let mut session = AcquisitionSession::new(1);
        let id = session.id;
        session.begin_pass();
        session.bytes_read = 10;
        session.begin_page(2);
        assert_eq!(session.id, id);
        assert_eq!(session.page_counter, 2);
        assert_eq!(session.pass_index, 0);
        assert_eq!(session.bytes_read, 0);
    }
}
