// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Exports
//======================================================================================================================

pub mod config;
pub mod consts;

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    inetstack::protocols::ip::IpProtocol,
    runtime::memory::BufferChain,
};
use ::std::net::Ipv4Addr;

//======================================================================================================================
// Traits
//======================================================================================================================

/// Packet Buffer
pub trait PacketBuf {
    /// Returns the header size of the target [PacketBuf].
    fn header_size(&self) -> usize;
    /// Writes the header of the target [PacketBuf] into a slice.
    fn write_header(&self, buf: &mut [u8]);
    /// Returns the body size of the target [PacketBuf].
    fn body_size(&self) -> usize;
    /// Consumes and returns the body of the target [PacketBuf].
    fn take_body(&self) -> Option<BufferChain>;
}

/// Network Runtime
///
/// The IP layer below the transport engine. Fragmentation, routing and link-layer framing happen behind this
/// interface.
pub trait NetworkRuntime {
    /// Transmits a single transport-layer [PacketBuf] from `src` to `dst`.
    fn transmit(&mut self, src: Ipv4Addr, dst: Ipv4Addr, protocol: IpProtocol, ttl: u8, pkt: Box<dyn PacketBuf>);
}
