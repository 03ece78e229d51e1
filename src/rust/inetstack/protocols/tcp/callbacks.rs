// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use crate::runtime::{
    fail::Fail,
    memory::BufferChain,
};
use ::std::{
    fmt,
    net::SocketAddrV4,
};

//==============================================================================
// Structures
//==============================================================================

/// Identity of a connection: its local and remote endpoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId {
    pub local: SocketAddrV4,
    pub remote: SocketAddrV4,
}

/// Answer of the application to delivered data.
#[derive(Debug)]
pub enum Delivery {
    /// The bytes were taken.
    Accepted,
    /// The bytes were not taken and are handed back. They are offered again later.
    Refused(BufferChain),
}

//==============================================================================
// Traits
//==============================================================================

/// Per-connection application events.
///
/// Handlers run while the engine is in the middle of processing, so they report back through return values rather
/// than by calling into the engine.
pub trait TcpHandler {
    /// The three-way handshake completed.
    fn connected(&mut self) {}

    /// In-order bytes arrived.
    fn received(&mut self, data: BufferChain) -> Delivery;

    /// `len` bytes of previously sent data were acknowledged.
    fn sent(&mut self, _len: usize) {}

    /// The peer finished sending (FIN). Fires once.
    fn closed(&mut self) {}

    /// The connection is gone. Fires once and nothing follows it.
    fn error(&mut self, _cause: Fail) {}
}

/// Per-listener application events.
pub trait TcpListenHandler {
    /// A SYN arrived for a new connection. Returning an error drops the SYN so that the peer retries later.
    fn accept(&mut self, id: ConnectionId) -> Result<Box<dyn TcpHandler>, Fail>;
}

//==============================================================================
// Associated Functions
//==============================================================================

impl ConnectionId {
    pub fn new(local: SocketAddrV4, remote: SocketAddrV4) -> Self {
        Self { local, remote }
    }
}

//==============================================================================
// Trait Implementations
//==============================================================================

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <-> {}", self.local, self.remote)
    }
}
