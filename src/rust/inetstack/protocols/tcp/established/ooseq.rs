// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use crate::{
    inetstack::protocols::tcp::SeqNumber,
    runtime::{
        fail::Fail,
        memory::BufferChain,
    },
};
use ::std::collections::VecDeque;

//==============================================================================
// Structures
//==============================================================================

/// A segment received ahead of `rcv_nxt`.
#[derive(Debug)]
pub struct OoseqEntry {
    pub seq: SeqNumber,
    pub fin: bool,
    pub data: BufferChain,
}

/// Out-of-order cache.
///
/// Entries are kept in ascending order of their starting sequence number. After every insertion no two entries share
/// a start and no payloads overlap. A FIN flag is never lost while the entry that carried it (or the entry that
/// swallowed it) is still cached.
#[derive(Debug, Default)]
pub struct OutOfOrderQueue {
    entries: VecDeque<OoseqEntry>,
}

//==============================================================================
// Associated Functions
//==============================================================================

impl OoseqEntry {
    pub fn new(seq: SeqNumber, fin: bool, data: BufferChain) -> Self {
        Self { seq, fin, data }
    }

    /// Payload bytes.
    pub fn len(&self) -> u32 {
        self.data.len() as u32
    }

    /// Sequence space occupied, FIN included.
    pub fn tcplen(&self) -> u32 {
        self.len() + self.fin as u32
    }

    /// First sequence number after the payload.
    pub fn end(&self) -> SeqNumber {
        self.seq + self.len()
    }

    /// Cuts the payload at `edge`. A FIN sits after the payload, so it goes too.
    fn truncate_at(&mut self, edge: SeqNumber) -> Result<(), Fail> {
        let keep: usize = edge.distance_from(self.seq) as usize;
        if keep < self.data.len() {
            trace!("truncate_at(): [{}, {}) -> [{}, {})", self.seq, self.end(), self.seq, edge);
            self.data.truncate(keep)?;
            self.fin = false;
        }
        Ok(())
    }
}

impl OutOfOrderQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Payload bytes over all entries.
    #[cfg(test)]
    pub fn bytes(&self) -> usize {
        self.entries.iter().map(|e| e.data.len()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OoseqEntry> {
        self.entries.iter()
    }

    pub fn front_seq(&self) -> Option<SeqNumber> {
        self.entries.front().map(|e| e.seq)
    }

    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            debug!("clear(): dropping {} out-of-order entries", self.entries.len());
        }
        self.entries.clear();
    }

    /// Caches a segment that starts after `rcv_nxt`.
    pub fn insert(&mut self, entry: OoseqEntry) -> Result<(), Fail> {
        if self.entries.is_empty() {
            trace!("insert(): [{}, {}) into empty cache", entry.seq, entry.end());
            self.entries.push_back(entry);
            return Ok(());
        }

        let seq: SeqNumber = entry.seq;
        for index in 0..self.entries.len() {
            let next_seq: SeqNumber = self.entries[index].seq;

            if seq == next_seq {
                // Same start: the longer one stays.
                if entry.len() > self.entries[index].len() {
                    trace!("insert(): [{}, {}) replaces a shorter entry", seq, entry.end());
                    self.entries.insert(index, entry);
                    return self.merge_following(index);
                }
                trace!("insert(): [{}, {}) already cached", seq, entry.end());
                return Ok(());
            }

            if index == 0 {
                if seq < next_seq {
                    trace!("insert(): [{}, {}) at head", seq, entry.end());
                    self.entries.push_front(entry);
                    return self.merge_following(0);
                }
            } else {
                let prev_seq: SeqNumber = self.entries[index - 1].seq;
                if seq.between(prev_seq + 1, next_seq - 1) {
                    trace!("insert(): [{}, {}) between {} and {}", seq, entry.end(), prev_seq, next_seq);
                    let prev: &mut OoseqEntry = &mut self.entries[index - 1];
                    if prev.end() > seq {
                        prev.truncate_at(seq)?;
                    }
                    self.entries.insert(index, entry);
                    return self.merge_following(index);
                }
            }

            if index + 1 == self.entries.len() && seq > next_seq {
                let tail: &mut OoseqEntry = &mut self.entries[index];
                if tail.fin {
                    trace!("insert(): [{}, {}) lies past a cached FIN", seq, entry.end());
                    return Ok(());
                }
                if tail.end() > seq {
                    tail.truncate_at(seq)?;
                }
                trace!("insert(): [{}, {}) at tail", seq, entry.end());
                self.entries.push_back(entry);
                return Ok(());
            }
        }

        debug!("insert(): no position for [{}, {}), dropping", seq, entry.end());
        Ok(())
    }

    /// Enforces optional caps on cached bytes and entries. Scanning from the head, the first entry at which the byte
    /// cap, then the entry cap, is exceeded is dropped together with everything after it. Returns the number of
    /// dropped entries.
    pub fn enforce_caps(&mut self, max_bytes: Option<usize>, max_entries: Option<usize>) -> usize {
        let mut bytes: usize = 0;
        let mut cut: Option<usize> = None;
        for (index, entry) in self.entries.iter().enumerate() {
            bytes += entry.data.len();
            if max_bytes.map_or(false, |max| bytes > max) {
                debug!("enforce_caps(): byte cap exceeded at entry {}", index);
                cut = Some(index);
                break;
            }
            if max_entries.map_or(false, |max| index + 1 > max) {
                debug!("enforce_caps(): entry cap exceeded at entry {}", index);
                cut = Some(index);
                break;
            }
        }
        match cut {
            Some(index) => {
                let dropped: usize = self.entries.len() - index;
                self.entries.truncate(index);
                dropped
            },
            None => 0,
        }
    }

    /// Drops every entry whose payload ends at or before `end`. Returns true if one of them carried a FIN.
    pub fn remove_covered(&mut self, end: SeqNumber) -> bool {
        let mut fin: bool = false;
        while let Some(front) = self.entries.front() {
            if end < front.end() {
                break;
            }
            if let Some(entry) = self.entries.pop_front() {
                trace!("remove_covered(): [{}, {}) now in order", entry.seq, entry.end());
                fin |= entry.fin;
            }
        }
        fin
    }

    /// Takes the head entry if it starts exactly at `rcv_nxt`.
    pub fn pop_at(&mut self, rcv_nxt: SeqNumber) -> Option<OoseqEntry> {
        match self.entries.front() {
            Some(front) if front.seq == rcv_nxt => self.entries.pop_front(),
            _ => None,
        }
    }

    /// Resolves overlaps between a freshly placed entry at `index` and the ones after it.
    fn merge_following(&mut self, index: usize) -> Result<(), Fail> {
        if self.entries[index].fin {
            // Nothing can follow a FIN.
            self.entries.truncate(index + 1);
            return Ok(());
        }

        let end: SeqNumber = self.entries[index].end();
        while let Some(next) = self.entries.get(index + 1) {
            if end < next.end() {
                break;
            }
            if let Some(covered) = self.entries.remove(index + 1) {
                trace!("merge_following(): [{}, {}) covered", covered.seq, covered.end());
                if covered.fin {
                    self.entries[index].fin = true;
                }
            }
        }

        if let Some(next_seq) = self.entries.get(index + 1).map(|next| next.seq) {
            if end > next_seq {
                self.entries[index].truncate_at(next_seq)?;
            }
        }
        Ok(())
    }
}

//==============================================================================
// Unit Tests
//==============================================================================
