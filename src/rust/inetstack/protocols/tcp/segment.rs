// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use crate::{
    inetstack::protocols::{
        ip::IpProtocol,
        tcp::SeqNumber,
    },
    runtime::{
        fail::Fail,
        memory::BufferChain,
        network::PacketBuf,
    },
};
use ::arrayvec::ArrayVec;
use ::libc::{
    EBADMSG,
    EINVAL,
};
use ::std::net::Ipv4Addr;

pub const MIN_TCP_HEADER_SIZE: usize = 20;
pub const MAX_TCP_HEADER_SIZE: usize = 60;
pub const MAX_TCP_OPTIONS_SIZE: usize = MAX_TCP_HEADER_SIZE - MIN_TCP_HEADER_SIZE;

/// Option kinds understood by the engine.
pub mod option_kind {
    pub const END_OF_OPTIONS: u8 = 0;
    pub const NO_OPERATION: u8 = 1;
    pub const MAXIMUM_SEGMENT_SIZE: u8 = 2;
    pub const TIMESTAMP: u8 = 8;
}

//==============================================================================
// Outgoing Options
//==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpOptions2 {
    NoOperation,
    MaximumSegmentSize(u16),
    Timestamp { sender_timestamp: u32, echo_timestamp: u32 },
}

impl TcpOptions2 {
    fn compute_size(&self) -> usize {
        match self {
            TcpOptions2::NoOperation => 1,
            TcpOptions2::MaximumSegmentSize(..) => 4,
            TcpOptions2::Timestamp { .. } => 10,
        }
    }

    fn serialize(&self, buf: &mut [u8]) -> usize {
        match self {
            TcpOptions2::NoOperation => {
                buf[0] = option_kind::NO_OPERATION;
                1
            },
            TcpOptions2::MaximumSegmentSize(mss) => {
                buf[0] = option_kind::MAXIMUM_SEGMENT_SIZE;
                buf[1] = 4;
                buf[2..4].copy_from_slice(&mss.to_be_bytes());
                4
            },
            TcpOptions2::Timestamp {
                sender_timestamp,
                echo_timestamp,
            } => {
                buf[0] = option_kind::TIMESTAMP;
                buf[1] = 10;
                buf[2..6].copy_from_slice(&sender_timestamp.to_be_bytes());
                buf[6..10].copy_from_slice(&echo_timestamp.to_be_bytes());
                10
            },
        }
    }
}

//==============================================================================
// TCP Header
//==============================================================================

#[derive(Debug, Clone)]
pub struct TcpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq_num: SeqNumber,
    pub ack_num: SeqNumber,

    // Octet 13: [ CWR ] [ ECE ] [ URG ] [ ACK ] [ PSH ] [ RST ] [ SYN ] [ FIN ]
    pub cwr: bool,
    pub ece: bool,
    pub urg: bool,
    pub ack: bool,
    pub psh: bool,
    pub rst: bool,
    pub syn: bool,
    pub fin: bool,

    pub window_size: u16,
    pub urgent_pointer: u16,

    // Raw options area. Inbound headers keep exactly what the peer sent so that the option parser can apply its own
    // recovery rules; outbound headers are filled through `push_option`.
    options: ArrayVec<u8, MAX_TCP_OPTIONS_SIZE>,
}

impl TcpHeader {
    pub fn new(src_port: u16, dst_port: u16) -> Self {
        Self {
            src_port,
            dst_port,
            seq_num: SeqNumber::from(0),
            ack_num: SeqNumber::from(0),
            cwr: false,
            ece: false,
            urg: false,
            ack: false,
            psh: false,
            rst: false,
            syn: false,
            fin: false,
            window_size: 0,
            urgent_pointer: 0,
            options: ArrayVec::new(),
        }
    }

    /// Parses a TCP header from the front of `buf` and returns it together with the payload. The checksum is not
    /// verified here; see [verify_checksum].
    pub fn parse(mut buf: BufferChain) -> Result<(Self, BufferChain), Fail> {
        if buf.len() < MIN_TCP_HEADER_SIZE {
            return Err(Fail::new(EBADMSG, "TCP segment too small"));
        }

        // The header may straddle buffer links, so gather it first.
        let mut hdr_buf: [u8; MAX_TCP_HEADER_SIZE] = [0; MAX_TCP_HEADER_SIZE];
        let mut copied: usize = 0;
        for chunk in buf.chunks() {
            let n: usize = chunk.len().min(MAX_TCP_HEADER_SIZE - copied);
            hdr_buf[copied..(copied + n)].copy_from_slice(&chunk[..n]);
            copied += n;
            if copied == MAX_TCP_HEADER_SIZE {
                break;
            }
        }

        let data_offset: usize = (hdr_buf[12] >> 4) as usize * 4;
        if data_offset < MIN_TCP_HEADER_SIZE {
            return Err(Fail::new(EBADMSG, "TCP data offset too small"));
        }
        if buf.len() < data_offset {
            return Err(Fail::new(EBADMSG, "TCP segment smaller than data offset"));
        }

        let mut options: ArrayVec<u8, MAX_TCP_OPTIONS_SIZE> = ArrayVec::new();
        options
            .try_extend_from_slice(&hdr_buf[MIN_TCP_HEADER_SIZE..data_offset])
            .map_err(|_| Fail::new(EBADMSG, "TCP options area too large"))?;

        let flags: u8 = hdr_buf[13];
        let header: TcpHeader = Self {
            src_port: u16::from_be_bytes([hdr_buf[0], hdr_buf[1]]),
            dst_port: u16::from_be_bytes([hdr_buf[2], hdr_buf[3]]),
            seq_num: SeqNumber::from(u32::from_be_bytes([hdr_buf[4], hdr_buf[5], hdr_buf[6], hdr_buf[7]])),
            ack_num: SeqNumber::from(u32::from_be_bytes([hdr_buf[8], hdr_buf[9], hdr_buf[10], hdr_buf[11]])),
            cwr: (flags & (1 << 7)) != 0,
            ece: (flags & (1 << 6)) != 0,
            urg: (flags & (1 << 5)) != 0,
            ack: (flags & (1 << 4)) != 0,
            psh: (flags & (1 << 3)) != 0,
            rst: (flags & (1 << 2)) != 0,
            syn: (flags & (1 << 1)) != 0,
            fin: (flags & (1 << 0)) != 0,
            window_size: u16::from_be_bytes([hdr_buf[14], hdr_buf[15]]),
            urgent_pointer: u16::from_be_bytes([hdr_buf[18], hdr_buf[19]]),
            options,
        };

        buf.adjust(data_offset)?;
        Ok((header, buf))
    }

    /// Writes the header into `buf`, which must be exactly [TcpHeader::compute_size] bytes long.
    pub fn serialize(
        &self,
        buf: &mut [u8],
        src_addr: Ipv4Addr,
        dst_addr: Ipv4Addr,
        data: Option<&BufferChain>,
        tx_checksum_offload: bool,
    ) {
        buf[0..2].copy_from_slice(&self.src_port.to_be_bytes());
        buf[2..4].copy_from_slice(&self.dst_port.to_be_bytes());
        buf[4..8].copy_from_slice(&u32::from(self.seq_num).to_be_bytes());
        buf[8..12].copy_from_slice(&u32::from(self.ack_num).to_be_bytes());
        buf[12] = ((self.compute_size() / 4) as u8) << 4;
        buf[13] = (self.cwr as u8) << 7
            | (self.ece as u8) << 6
            | (self.urg as u8) << 5
            | (self.ack as u8) << 4
            | (self.psh as u8) << 3
            | (self.rst as u8) << 2
            | (self.syn as u8) << 1
            | (self.fin as u8);
        buf[14..16].copy_from_slice(&self.window_size.to_be_bytes());
        buf[16] = 0;
        buf[17] = 0;
        buf[18..20].copy_from_slice(&self.urgent_pointer.to_be_bytes());

        let options_end: usize = MIN_TCP_HEADER_SIZE + self.options.len();
        buf[MIN_TCP_HEADER_SIZE..options_end].copy_from_slice(&self.options);
        // Padding doubles as the end-of-options marker.
        for byte in &mut buf[options_end..] {
            *byte = option_kind::END_OF_OPTIONS;
        }

        if !tx_checksum_offload {
            let data_len: usize = data.map_or(0, |d| d.len());
            let mut checksum: Checksum = Checksum::pseudo_header(src_addr, dst_addr, buf.len() + data_len);
            checksum.add(buf);
            if let Some(data) = data {
                for chunk in data.chunks() {
                    checksum.add(chunk);
                }
            }
            buf[16..18].copy_from_slice(&checksum.finish().to_be_bytes());
        }
    }

    /// Size on the wire, rounded up to a 32-bit boundary.
    pub fn compute_size(&self) -> usize {
        (MIN_TCP_HEADER_SIZE + self.options.len() + 3) & !0x3
    }

    /// Raw options area.
    pub fn options(&self) -> &[u8] {
        &self.options
    }

    pub fn push_option(&mut self, option: TcpOptions2) -> Result<(), Fail> {
        let mut tmp: [u8; MAX_TCP_OPTIONS_SIZE] = [0; MAX_TCP_OPTIONS_SIZE];
        let len: usize = option.serialize(&mut tmp);
        debug_assert_eq!(len, option.compute_size());
        self.options
            .try_extend_from_slice(&tmp[..len])
            .map_err(|_| Fail::new(EINVAL, "TCP options area full"))
    }
}

//==============================================================================
// Segments
//==============================================================================

/// Inbound segment: a parsed header and the payload that followed it.
#[derive(Debug, Clone)]
pub struct TcpSegment {
    pub hdr: TcpHeader,
    pub data: BufferChain,
}

impl TcpSegment {
    /// Sequence space occupied by the segment: payload plus one for each of SYN and FIN.
    pub fn tcplen(&self) -> u32 {
        self.data.len() as u32 + self.hdr.syn as u32 + self.hdr.fin as u32
    }
}

/// Outbound segment handed to the IP layer.
pub struct TcpPacket {
    pub src_addr: Ipv4Addr,
    pub dst_addr: Ipv4Addr,
    pub tcp_hdr: TcpHeader,
    pub data: Option<BufferChain>,
    pub tx_checksum_offload: bool,
}

impl PacketBuf for TcpPacket {
    fn header_size(&self) -> usize {
        self.tcp_hdr.compute_size()
    }

    fn write_header(&self, buf: &mut [u8]) {
        let size: usize = self.tcp_hdr.compute_size();
        self.tcp_hdr.serialize(
            &mut buf[..size],
            self.src_addr,
            self.dst_addr,
            self.data.as_ref(),
            self.tx_checksum_offload,
        );
    }

    fn body_size(&self) -> usize {
        self.data.as_ref().map_or(0, |d| d.len())
    }

    fn take_body(&self) -> Option<BufferChain> {
        self.data.clone()
    }
}

//==============================================================================
// Checksum
//==============================================================================

/// Returns true if the one's complement sum over the pseudo-header and `segment` (header and payload, checksum
/// field included) verifies.
pub fn verify_checksum(src_addr: Ipv4Addr, dst_addr: Ipv4Addr, segment: &BufferChain) -> bool {
    let mut checksum: Checksum = Checksum::pseudo_header(src_addr, dst_addr, segment.len());
    for chunk in segment.chunks() {
        checksum.add(chunk);
    }
    checksum.finish() == 0
}

/// Internet checksum accumulator that can be fed a byte stream in pieces of any length.
struct Checksum {
    state: u64,
    // Leading byte of a 16-bit word split across two pieces.
    pending: Option<u8>,
}

impl Checksum {
    fn pseudo_header(src_addr: Ipv4Addr, dst_addr: Ipv4Addr, tcp_len: usize) -> Self {
        let mut checksum: Checksum = Checksum {
            state: 0,
            pending: None,
        };
        checksum.add(&src_addr.octets());
        checksum.add(&dst_addr.octets());
        checksum.add(&[0, IpProtocol::TCP as u8]);
        checksum.add(&(tcp_len as u16).to_be_bytes());
        checksum
    }

    fn add(&mut self, mut bytes: &[u8]) {
        if let Some(hi) = self.pending.take() {
            match bytes.split_first() {
                Some((lo, rest)) => {
                    self.state += u16::from_be_bytes([hi, *lo]) as u64;
                    bytes = rest;
                },
                None => {
                    self.pending = Some(hi);
                    return;
                },
            }
        }
        let mut words = bytes.chunks_exact(2);
        for word in &mut words {
            self.state += u16::from_be_bytes([word[0], word[1]]) as u64;
        }
        if let Some(&b) = words.remainder().first() {
            self.pending = Some(b);
        }
    }

    fn finish(mut self) -> u16 {
        if let Some(hi) = self.pending.take() {
            self.state += u16::from_be_bytes([hi, 0]) as u64;
        }
        while self.state > 0xffff {
            self.state = (self.state & 0xffff) + (self.state >> 16);
        }
        !(self.state as u16)
    }
}

//==============================================================================
// Unit Tests
//==============================================================================

#[cfg(test)]
mod tests {
    use super::{
        verify_checksum,
        TcpHeader,
        TcpOptions2,
        TcpPacket,
    };
    use crate::{
        inetstack::protocols::tcp::SeqNumber,
        runtime::{
            memory::{
                BufferChain,
                DataBuffer,
            },
            network::PacketBuf,
        },
    };
    use ::anyhow::Result;
    use ::std::net::Ipv4Addr;

    const SRC: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);
    const DST: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 2);

    fn wire(packet: &TcpPacket) -> BufferChain {
        let mut header: Vec<u8> = vec![0; packet.header_size()];
        packet.write_header(&mut header);
        let mut chain: BufferChain = BufferChain::from(DataBuffer::from(header));
        if let Some(body) = packet.take_body() {
            chain.cat(body);
        }
        chain
    }

    #[test]
    fn header_with_options() -> Result<()> {
        let mut hdr: TcpHeader = TcpHeader::new(80, 4000);
        hdr.seq_num = SeqNumber::from(7);
        hdr.ack_num = SeqNumber::from(9);
        hdr.syn = true;
        hdr.ack = true;
        hdr.window_size = 1024;
        hdr.push_option(TcpOptions2::MaximumSegmentSize(1460))?;
        hdr.push_option(TcpOptions2::NoOperation)?;
        crate::ensure_eq!(hdr.compute_size(), 28);

        // Payload split over two links with an odd first link.
        let mut data: BufferChain = BufferChain::from(&[1u8, 2, 3][..]);
        data.push(DataBuffer::from_slice(&[4, 5, 6, 7, 8]));
        let packet: TcpPacket = TcpPacket {
            src_addr: SRC,
            dst_addr: DST,
            tcp_hdr: hdr,
            data: Some(data),
            tx_checksum_offload: false,
        };
        let bytes: BufferChain = wire(&packet);
        crate::ensure_eq!(verify_checksum(SRC, DST, &bytes), true);
        crate::ensure_eq!(verify_checksum(DST, DST, &bytes), false);

        let (parsed, payload): (TcpHeader, BufferChain) = TcpHeader::parse(bytes)?;
        crate::ensure_eq!(parsed.src_port, 80);
        crate::ensure_eq!(parsed.dst_port, 4000);
        crate::ensure_eq!(parsed.seq_num, SeqNumber::from(7));
        crate::ensure_eq!(parsed.syn && parsed.ack && !parsed.fin, true);
        crate::ensure_eq!(parsed.options(), &[2, 4, 0x05, 0xb4, 1, 0, 0, 0][..]);
        crate::ensure_eq!(payload.to_vec(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
        Ok(())
    }

    #[test]
    fn parse_rejects_truncated() -> Result<()> {
        crate::ensure_eq!(TcpHeader::parse(BufferChain::from(&[0u8; 12][..])).is_err(), true);

        // Data offset claims 24 bytes but only 20 are present.
        let mut bytes: [u8; 20] = [0; 20];
        bytes[12] = 6 << 4;
        crate::ensure_eq!(TcpHeader::parse(BufferChain::from(&bytes[..])).is_err(), true);

        // Data offset below the minimum.
        bytes[12] = 4 << 4;
        crate::ensure_eq!(TcpHeader::parse(BufferChain::from(&bytes[..])).is_err(), true);
        Ok(())
    }
}
