// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use crate::inetstack::protocols::tcp::SeqNumber;
#[allow(unused_imports)]
use ::std::{
    net::SocketAddrV4,
    num::Wrapping,
};

/// Initial Sequence Number Generator
///
/// Hashes the connection 4-tuple with a secret nonce and adds a per-call counter so that reused 4-tuples never
/// start at the same point. Unit tests always start at zero.
pub struct IsnGenerator {
    #[allow(dead_code)]
    nonce: u32,
    #[allow(dead_code)]
    counter: Wrapping<u16>,
}

impl IsnGenerator {
    pub fn new(nonce: u32) -> Self {
        Self {
            nonce,
            counter: Wrapping(0),
        }
    }

    #[cfg(test)]
    pub fn generate(&mut self, _local: &SocketAddrV4, _remote: &SocketAddrV4) -> SeqNumber {
        SeqNumber::from(0)
    }

    #[cfg(not(test))]
    pub fn generate(&mut self, local: &SocketAddrV4, remote: &SocketAddrV4) -> SeqNumber {
        let crc: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_CKSUM);
        let mut digest: crc::Digest<u32> = crc.digest();
        digest.update(&remote.ip().octets());
        digest.update(&remote.port().to_be_bytes());
        digest.update(&local.ip().octets());
        digest.update(&local.port().to_be_bytes());
        digest.update(&self.nonce.to_be_bytes());
        let isn: SeqNumber = SeqNumber::from(digest.finalize().wrapping_add(self.counter.0 as u32));
        self.counter += Wrapping(1);
        isn
    }
}
