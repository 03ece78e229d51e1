// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

mod closing;
mod setup;

use crate::{
    inetstack::protocols::{
        ip::IpProtocol,
        tcp::{
            segment::{
                verify_checksum,
                TcpHeader,
                TcpOptions2,
            },
            ConnectionId,
            ControlBlock,
            Delivery,
            SeqNumber,
            State,
            TcpCounters,
            TcpHandler,
            TcpListenHandler,
            TcpPeer,
            TcpStats,
        },
    },
    runtime::{
        fail::Fail,
        logging,
        memory::BufferChain,
        network::{
            config::TcpConfig,
            NetworkRuntime,
            PacketBuf,
        },
    },
};
use ::anyhow::{
    anyhow,
    Result,
};
use ::libc::ECONNREFUSED;
use ::std::{
    cell::RefCell,
    collections::VecDeque,
    net::{
        Ipv4Addr,
        SocketAddrV4,
    },
    rc::Rc,
};

//=============================================================================
// Constants
//=============================================================================

pub const LOCAL_IPV4: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);
pub const REMOTE_IPV4: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 2);
pub const LOCAL_PORT: u16 = 80;
pub const REMOTE_PORT: u16 = 49152;

/// Window the remote side advertises unless a test says otherwise.
pub const PEER_WINDOW: u16 = 8192;

pub fn local() -> SocketAddrV4 {
    SocketAddrV4::new(LOCAL_IPV4, LOCAL_PORT)
}

pub fn remote() -> SocketAddrV4 {
    SocketAddrV4::new(REMOTE_IPV4, REMOTE_PORT)
}

pub fn conn_id() -> ConnectionId {
    ConnectionId::new(local(), remote())
}

/// Deterministic payload of `len` bytes.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

//=============================================================================
// Network Runtime
//=============================================================================

/// Segment captured on its way to the IP layer.
#[derive(Debug)]
pub struct Frame {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub protocol: IpProtocol,
    pub ttl: u8,
    pub hdr: TcpHeader,
    pub data: Vec<u8>,
    pub checksum_ok: bool,
}

impl Frame {
    pub fn seq(&self) -> u32 {
        u32::from(self.hdr.seq_num)
    }

    pub fn ack(&self) -> u32 {
        u32::from(self.hdr.ack_num)
    }
}

/// Records every transmitted segment.
#[derive(Default)]
pub struct TestRuntime {
    pub frames: VecDeque<Frame>,
}

impl NetworkRuntime for TestRuntime {
    fn transmit(&mut self, src: Ipv4Addr, dst: Ipv4Addr, protocol: IpProtocol, ttl: u8, pkt: Box<dyn PacketBuf>) {
        let mut header: Vec<u8> = vec![0; pkt.header_size()];
        pkt.write_header(&mut header);
        let mut wire: BufferChain = BufferChain::from(&header[..]);
        if let Some(body) = pkt.take_body() {
            wire.cat(body);
        }
        let checksum_ok: bool = verify_checksum(src, dst, &wire);
        let (hdr, data): (TcpHeader, BufferChain) = TcpHeader::parse(wire).expect("outbound segment should parse");
        self.frames.push_back(Frame {
            src,
            dst,
            protocol,
            ttl,
            hdr,
            data: data.to_vec(),
            checksum_ok,
        });
    }
}

//=============================================================================
// Application Handlers
//=============================================================================

/// Application events seen by every connection of a test.
#[derive(Debug, Default)]
pub struct Events {
    pub accepted: Vec<ConnectionId>,
    pub connected: usize,
    pub received: Vec<u8>,
    pub receive_calls: usize,
    pub sent: usize,
    pub closed: usize,
    pub errors: Vec<i32>,
    /// Hand delivered data back instead of taking it.
    pub refuse_data: bool,
    /// Fail every accept.
    pub refuse_accept: bool,
}

pub type SharedEvents = Rc<RefCell<Events>>;

pub struct RecordingHandler {
    events: SharedEvents,
}

impl TcpHandler for RecordingHandler {
    fn connected(&mut self) {
        self.events.borrow_mut().connected += 1;
    }

    fn received(&mut self, data: BufferChain) -> Delivery {
        let mut events = self.events.borrow_mut();
        if events.refuse_data {
            return Delivery::Refused(data);
        }
        events.received.extend(data.to_vec());
        events.receive_calls += 1;
        Delivery::Accepted
    }

    fn sent(&mut self, len: usize) {
        self.events.borrow_mut().sent += len;
    }

    fn closed(&mut self) {
        self.events.borrow_mut().closed += 1;
    }

    fn error(&mut self, cause: Fail) {
        self.events.borrow_mut().errors.push(cause.errno);
    }
}

pub struct RecordingListener {
    events: SharedEvents,
}

impl TcpListenHandler for RecordingListener {
    fn accept(&mut self, id: ConnectionId) -> Result<Box<dyn TcpHandler>, Fail> {
        let mut events = self.events.borrow_mut();
        if events.refuse_accept {
            return Err(Fail::new(ECONNREFUSED, "not accepting"));
        }
        events.accepted.push(id);
        Ok(Box::new(RecordingHandler {
            events: self.events.clone(),
        }))
    }
}

//=============================================================================
// Segment Builder
//=============================================================================

/// Builds an inbound segment from the remote endpoint, checksum included.
pub struct SegmentBuilder {
    hdr: TcpHeader,
    data: Vec<u8>,
    src: SocketAddrV4,
    dst: SocketAddrV4,
}

pub fn segment(seq: u32) -> SegmentBuilder {
    let mut hdr: TcpHeader = TcpHeader::new(REMOTE_PORT, LOCAL_PORT);
    hdr.seq_num = SeqNumber::from(seq);
    hdr.window_size = PEER_WINDOW;
    SegmentBuilder {
        hdr,
        data: Vec::new(),
        src: remote(),
        dst: local(),
    }
}

impl SegmentBuilder {
    pub fn ack(mut self, ack: u32) -> Self {
        self.hdr.ack = true;
        self.hdr.ack_num = SeqNumber::from(ack);
        self
    }

    pub fn syn(mut self) -> Self {
        self.hdr.syn = true;
        self
    }

    pub fn fin(mut self) -> Self {
        self.hdr.fin = true;
        self
    }

    pub fn rst(mut self) -> Self {
        self.hdr.rst = true;
        self
    }

    pub fn window(mut self, window: u16) -> Self {
        self.hdr.window_size = window;
        self
    }

    pub fn data(mut self, data: &[u8]) -> Self {
        self.data = data.to_vec();
        self
    }

    pub fn mss(mut self, mss: u16) -> Self {
        self.hdr
            .push_option(TcpOptions2::MaximumSegmentSize(mss))
            .expect("MSS option should fit");
        self
    }

    pub fn timestamp(mut self, tsval: u32, tsecr: u32) -> Self {
        self.hdr
            .push_option(TcpOptions2::Timestamp {
                sender_timestamp: tsval,
                echo_timestamp: tsecr,
            })
            .expect("timestamp option should fit");
        self
    }

    pub fn src(mut self, src: SocketAddrV4) -> Self {
        self.hdr.src_port = src.port();
        self.src = src;
        self
    }

    pub fn dst(mut self, dst: SocketAddrV4) -> Self {
        self.hdr.dst_port = dst.port();
        self.dst = dst;
        self
    }

    pub fn build(&self) -> BufferChain {
        let data: BufferChain = BufferChain::from(&self.data[..]);
        let mut header: Vec<u8> = vec![0; self.hdr.compute_size()];
        self.hdr
            .serialize(&mut header, *self.src.ip(), *self.dst.ip(), Some(&data), false);
        let mut wire: BufferChain = BufferChain::from(&header[..]);
        wire.cat(data);
        wire
    }
}

//=============================================================================
// Test Fixture
//=============================================================================

/// A peer on the local address with one shared event log for all its connections.
pub struct Test {
    pub peer: TcpPeer<TestRuntime>,
    pub events: SharedEvents,
    pub counters: Rc<TcpCounters>,
}

impl Default for Test {
    fn default() -> Self {
        Self::with_config(TcpConfig::default())
    }
}

impl Test {
    pub fn with_config(config: TcpConfig) -> Self {
        logging::initialize();
        let counters: Rc<TcpCounters> = Rc::new(TcpCounters::new());
        let stats: Rc<dyn TcpStats> = counters.clone();
        Self {
            peer: TcpPeer::with_stats(TestRuntime::default(), config, [0; 32], stats),
            events: Rc::new(RefCell::new(Events::default())),
            counters,
        }
    }

    pub fn handler(&self) -> Box<dyn TcpHandler> {
        Box::new(RecordingHandler {
            events: self.events.clone(),
        })
    }

    pub fn listen_handler(&self) -> Box<dyn TcpListenHandler> {
        Box::new(RecordingListener {
            events: self.events.clone(),
        })
    }

    pub fn listen_on(&mut self, addr: SocketAddrV4) -> Result<()> {
        let listener: Box<dyn TcpListenHandler> = self.listen_handler();
        self.peer.listen(addr, listener)?;
        Ok(())
    }

    pub fn listen(&mut self) -> Result<()> {
        self.listen_on(local())
    }

    pub fn deliver(&mut self, seg: SegmentBuilder) -> Result<()> {
        let wire: BufferChain = seg.build();
        self.peer.receive(*seg.src.ip(), *seg.dst.ip(), wire)?;
        Ok(())
    }

    pub fn next_frame(&mut self) -> Result<Frame> {
        self.peer
            .rt_mut()
            .frames
            .pop_front()
            .ok_or_else(|| anyhow!("no segment was sent"))
    }

    pub fn frame_count(&self) -> usize {
        self.peer.rt().frames.len()
    }

    pub fn clear_frames(&mut self) {
        self.peer.rt_mut().frames.clear();
    }

    pub fn tick(&mut self, n: usize) {
        for _ in 0..n {
            self.peer.tick();
        }
    }

    pub fn cb(&self) -> Result<&ControlBlock> {
        self.peer
            .control_block(conn_id())
            .ok_or_else(|| anyhow!("connection does not exist"))
    }

    pub fn state(&self) -> Option<State> {
        self.peer.state(conn_id())
    }

    /// Runs the passive three-way handshake with a client whose initial sequence number is `client_isn`. Our own
    /// initial sequence number is zero.
    pub fn accept(&mut self, client_isn: u32) -> Result<ConnectionId> {
        if self.peer.listener_addrs().is_empty() {
            self.listen()?;
        }
        self.deliver(segment(client_isn).syn().mss(536))?;
        let synack: Frame = self.next_frame()?;
        crate::ensure_eq!(synack.hdr.syn, true);
        crate::ensure_eq!(synack.hdr.ack, true);
        crate::ensure_eq!(synack.seq(), 0);
        crate::ensure_eq!(synack.ack(), client_isn.wrapping_add(1));

        self.deliver(segment(client_isn.wrapping_add(1)).ack(1))?;
        crate::ensure_eq!(self.state(), Some(State::Established));
        crate::ensure_eq!(self.frame_count(), 0);
        Ok(conn_id())
    }

    /// Runs the active three-way handshake against a server whose initial sequence number is `server_isn`.
    pub fn connect(&mut self, server_isn: u32) -> Result<ConnectionId> {
        let handler: Box<dyn TcpHandler> = self.handler();
        let id: ConnectionId = self.peer.connect(local(), remote(), handler)?;
        let syn: Frame = self.next_frame()?;
        crate::ensure_eq!(syn.hdr.syn, true);
        crate::ensure_eq!(syn.hdr.ack, false);
        crate::ensure_eq!(syn.seq(), 0);

        self.deliver(segment(server_isn).syn().ack(1).mss(536))?;
        let ack: Frame = self.next_frame()?;
        crate::ensure_eq!(ack.hdr.ack, true);
        crate::ensure_eq!(ack.seq(), 1);
        crate::ensure_eq!(ack.ack(), server_isn.wrapping_add(1));
        crate::ensure_eq!(self.state(), Some(State::Established));
        Ok(id)
    }
}
