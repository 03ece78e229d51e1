// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use ::std::cell::Cell;

//==============================================================================
// Traits
//==============================================================================

/// Instrumentation hooks. Every hook is fire-and-forget and defaults to doing nothing.
pub trait TcpStats {
    fn segment_received(&self) {}
    fn segment_sent(&self) {}
    fn segment_dropped(&self) {}
    fn length_error(&self) {}
    fn checksum_error(&self) {}
    fn protocol_error(&self) {}
    fn memory_error(&self) {}
    fn retransmitted(&self) {}
    fn reset_sent(&self) {}
    fn passive_open(&self) {}
    fn active_open(&self) {}
}

//==============================================================================
// Structures
//==============================================================================

/// Discards every event.
#[derive(Debug, Default)]
pub struct NoStats;

/// Counts every event.
#[derive(Debug, Default)]
pub struct TcpCounters {
    received: Cell<u64>,
    sent: Cell<u64>,
    dropped: Cell<u64>,
    length_errors: Cell<u64>,
    checksum_errors: Cell<u64>,
    protocol_errors: Cell<u64>,
    memory_errors: Cell<u64>,
    retransmissions: Cell<u64>,
    resets: Cell<u64>,
    passive_opens: Cell<u64>,
    active_opens: Cell<u64>,
}

//==============================================================================
// Associated Functions
//==============================================================================

impl TcpCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> u64 {
        self.received.get()
    }

    pub fn sent(&self) -> u64 {
        self.sent.get()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.get()
    }

    pub fn length_errors(&self) -> u64 {
        self.length_errors.get()
    }

    pub fn checksum_errors(&self) -> u64 {
        self.checksum_errors.get()
    }

    pub fn protocol_errors(&self) -> u64 {
        self.protocol_errors.get()
    }

    pub fn memory_errors(&self) -> u64 {
        self.memory_errors.get()
    }

    pub fn retransmissions(&self) -> u64 {
        self.retransmissions.get()
    }

    pub fn resets(&self) -> u64 {
        self.resets.get()
    }

    pub fn passive_opens(&self) -> u64 {
        self.passive_opens.get()
    }

    pub fn active_opens(&self) -> u64 {
        self.active_opens.get()
    }

    fn bump(counter: &Cell<u64>) {
        counter.set(counter.get().wrapping_add(1));
    }
}

//==============================================================================
// Trait Implementations
//==============================================================================

impl TcpStats for NoStats {}

impl TcpStats for TcpCounters {
    fn segment_received(&self) {
        Self::bump(&self.received);
    }

    fn segment_sent(&self) {
        Self::bump(&self.sent);
    }

    fn segment_dropped(&self) {
        Self::bump(&self.dropped);
    }

    fn length_error(&self) {
        Self::bump(&self.length_errors);
    }

    fn checksum_error(&self) {
        Self::bump(&self.checksum_errors);
    }

    fn protocol_error(&self) {
        Self::bump(&self.protocol_errors);
    }

    fn memory_error(&self) {
        Self::bump(&self.memory_errors);
    }

    fn retransmitted(&self) {
        Self::bump(&self.retransmissions);
    }

    fn reset_sent(&self) {
        Self::bump(&self.resets);
    }

    fn passive_open(&self) {
        Self::bump(&self.passive_opens);
    }

    fn active_open(&self) {
        Self::bump(&self.active_opens);
    }
}
