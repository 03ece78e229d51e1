// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use crate::inetstack::protocols::tcp::{
    segment::option_kind,
    SeqNumber,
};

//==============================================================================
// Structures
//==============================================================================

/// Options recognized in an inbound header.
///
/// Parsing is lenient: a malformed length stops the scan but keeps whatever was recognized before it, and the segment
/// itself is still processed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReceivedOptions {
    /// Raw value of the last well-formed MSS option.
    pub mss: Option<u16>,
    /// Sender timestamp (TSval) of the last well-formed timestamp option.
    pub timestamp: Option<u32>,
}

//==============================================================================
// Associated Functions
//==============================================================================

impl ReceivedOptions {
    /// Scans a raw options area.
    pub fn parse(raw: &[u8]) -> Self {
        let mut options: ReceivedOptions = ReceivedOptions::default();
        let mut c: usize = 0;
        while c < raw.len() {
            match raw[c] {
                option_kind::END_OF_OPTIONS => {
                    trace!("parse(): end of options");
                    break;
                },
                option_kind::NO_OPERATION => c += 1,
                option_kind::MAXIMUM_SEGMENT_SIZE => {
                    if raw.get(c + 1) != Some(&4) || c + 4 > raw.len() {
                        debug!("parse(): bad MSS option length");
                        break;
                    }
                    options.mss = Some(u16::from_be_bytes([raw[c + 2], raw[c + 3]]));
                    c += 4;
                },
                option_kind::TIMESTAMP => {
                    if raw.get(c + 1) != Some(&10) || c + 10 > raw.len() {
                        debug!("parse(): bad timestamp option length");
                        break;
                    }
                    options.timestamp = Some(u32::from_be_bytes([raw[c + 2], raw[c + 3], raw[c + 4], raw[c + 5]]));
                    c += 10;
                },
                kind => match raw.get(c + 1) {
                    // Every other kind carries a length octet we can skip by.
                    Some(&len) if len != 0 => {
                        trace!("parse(): skipping option kind={:?} len={:?}", kind, len);
                        c += len as usize;
                    },
                    _ => {
                        debug!("parse(): bad length for option kind={:?}", kind);
                        break;
                    },
                },
            }
        }
        options
    }

    /// MSS to adopt for sending, clamped to `max_mss`. A zero MSS is invalid and ignored.
    pub fn effective_mss(&self, max_mss: usize) -> Option<usize> {
        match self.mss {
            Some(0) | None => None,
            Some(mss) => Some((mss as usize).min(max_mss)),
        }
    }

    /// Timestamp to remember as TS.Recent. Accepted on a SYN, or when the last acknowledgment we sent lies within
    /// `[seq, seq + tcplen]`.
    pub fn timestamp_to_latch(&self, syn: bool, seq: SeqNumber, tcplen: u32, ts_lastacksent: SeqNumber) -> Option<u32> {
        let tsval: u32 = self.timestamp?;
        if syn || ts_lastacksent.between(seq, seq + tcplen) {
            Some(tsval)
        } else {
            None
        }
    }
}

//==============================================================================
// Unit Tests
//==============================================================================
