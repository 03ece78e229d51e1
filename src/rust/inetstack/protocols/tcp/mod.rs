// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

mod callbacks;
mod established;
mod isn_generator;
mod listener;
mod options;
mod peer;
pub mod segment;
mod sequence_number;
mod stats;
mod timewait;

#[cfg(test)]
mod tests;

pub use self::{
    callbacks::{
        ConnectionId,
        Delivery,
        TcpHandler,
        TcpListenHandler,
    },
    established::{
        congestion_control,
        ControlBlock,
        State,
    },
    peer::TcpPeer,
    segment::{
        MAX_TCP_HEADER_SIZE,
        MIN_TCP_HEADER_SIZE,
    },
    sequence_number::SeqNumber,
    stats::{
        NoStats,
        TcpCounters,
        TcpStats,
    },
};
