// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use crate::{
    inetstack::protocols::tcp::SeqNumber,
    runtime::memory::BufferChain,
};
use ::std::collections::VecDeque;

//==============================================================================
// Structures
//==============================================================================

/// A segment waiting on the send side, either to go out for the first time or to be acknowledged.
#[derive(Debug, Clone)]
pub struct QueuedSegment {
    pub seq: SeqNumber,
    pub syn: bool,
    pub fin: bool,
    pub data: BufferChain,
}

/// Result of purging acknowledged segments.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Purged {
    pub segments: usize,
    /// SYN and FIN flags among the purged segments. They occupy sequence space but carry no application bytes.
    pub control_flags: u32,
}

/// Unsent and unacknowledged segments of one connection. Both lists stay sorted by starting sequence number.
#[derive(Debug, Default)]
pub struct RetransmitQueues {
    unsent: VecDeque<QueuedSegment>,
    unacked: VecDeque<QueuedSegment>,
}

//==============================================================================
// Associated Functions
//==============================================================================

impl QueuedSegment {
    pub fn data(seq: SeqNumber, data: BufferChain) -> Self {
        Self {
            seq,
            syn: false,
            fin: false,
            data,
        }
    }

    pub fn control(seq: SeqNumber, syn: bool, fin: bool) -> Self {
        Self {
            seq,
            syn,
            fin,
            data: BufferChain::new(),
        }
    }

    /// Payload bytes.
    pub fn len(&self) -> u32 {
        self.data.len() as u32
    }

    /// Sequence space occupied, SYN and FIN included.
    pub fn tcplen(&self) -> u32 {
        self.len() + self.syn as u32 + self.fin as u32
    }

    pub fn end(&self) -> SeqNumber {
        self.seq + self.tcplen()
    }
}

impl RetransmitQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Segments held on both lists.
    pub fn len(&self) -> usize {
        self.unsent.len() + self.unacked.len()
    }

    pub fn unsent_front(&self) -> Option<&QueuedSegment> {
        self.unsent.front()
    }

    pub fn unsent_back_mut(&mut self) -> Option<&mut QueuedSegment> {
        self.unsent.back_mut()
    }

    pub fn unacked_front(&self) -> Option<&QueuedSegment> {
        self.unacked.front()
    }

    pub fn has_unsent(&self) -> bool {
        !self.unsent.is_empty()
    }

    pub fn has_unacked(&self) -> bool {
        !self.unacked.is_empty()
    }

    pub fn iter_unacked(&self) -> impl Iterator<Item = &QueuedSegment> {
        self.unacked.iter()
    }

    pub fn iter_unsent(&self) -> impl Iterator<Item = &QueuedSegment> {
        self.unsent.iter()
    }

    /// Appends freshly queued data. New data always starts at the end of the stream.
    pub fn push_unsent(&mut self, segment: QueuedSegment) {
        debug_assert!(self.unsent.back().map_or(true, |last| last.seq < segment.seq));
        self.unsent.push_back(segment);
    }

    pub fn pop_unsent(&mut self) -> Option<QueuedSegment> {
        self.unsent.pop_front()
    }

    /// Inserts a transmitted segment into the unacked list at its sorted position.
    pub fn push_unacked_sorted(&mut self, segment: QueuedSegment) {
        match self.unacked.back() {
            Some(last) if segment.seq < last.seq => {
                let index: usize = self
                    .unacked
                    .iter()
                    .position(|s| segment.seq < s.seq)
                    .unwrap_or(self.unacked.len());
                self.unacked.insert(index, segment);
            },
            _ => self.unacked.push_back(segment),
        }
    }

    /// Removes unacked segments that lie entirely at or below `ack`.
    pub fn purge_unacked(&mut self, ack: SeqNumber) -> Purged {
        let mut purged: Purged = Purged::default();
        while let Some(front) = self.unacked.front() {
            if front.end() > ack {
                break;
            }
            if let Some(segment) = self.unacked.pop_front() {
                trace!("purge_unacked(): removing [{}, {})", segment.seq, segment.end());
                purged.segments += 1;
                purged.control_flags += segment.syn as u32 + segment.fin as u32;
            }
        }
        purged
    }

    /// Removes unsent segments already covered by `ack`. Segments land here after a retransmission timeout moved them
    /// back, so they may in fact have been sent.
    pub fn purge_unsent(&mut self, ack: SeqNumber, snd_nxt: SeqNumber) -> Purged {
        let mut purged: Purged = Purged::default();
        while let Some(front) = self.unsent.front() {
            if !ack.between(front.end(), snd_nxt) {
                break;
            }
            if let Some(segment) = self.unsent.pop_front() {
                trace!("purge_unsent(): removing [{}, {})", segment.seq, segment.end());
                purged.segments += 1;
                purged.control_flags += segment.syn as u32 + segment.fin as u32;
            }
        }
        purged
    }

    /// Moves every unacked segment back in front of the unsent ones (go-back-N).
    pub fn requeue_unacked(&mut self) {
        while let Some(segment) = self.unacked.pop_back() {
            self.unsent.push_front(segment);
        }
    }

    /// Moves the oldest unacked segment to the head of the unsent list so that it goes out again. Returns false if
    /// nothing is unacked.
    pub fn requeue_oldest_unacked(&mut self) -> bool {
        match self.unacked.pop_front() {
            Some(segment) => {
                let index: usize = self
                    .unsent
                    .iter()
                    .position(|s| segment.seq < s.seq)
                    .unwrap_or(self.unsent.len());
                self.unsent.insert(index, segment);
                true
            },
            None => false,
        }
    }

    /// Removes the SYN segment at the head of the unacked list once the handshake acknowledged it.
    pub fn pop_acked_syn(&mut self) -> Option<QueuedSegment> {
        match self.unacked.front() {
            Some(front) if front.syn => self.unacked.pop_front(),
            _ => None,
        }
    }

    pub fn clear(&mut self) {
        self.unsent.clear();
        self.unacked.clear();
    }
}

//==============================================================================
// Unit Tests
//==============================================================================
