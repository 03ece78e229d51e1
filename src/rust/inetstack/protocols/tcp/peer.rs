// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use super::{
    callbacks::{
        ConnectionId,
        TcpHandler,
        TcpListenHandler,
    },
    established::{
        congestion_control::{
            CongestionControl,
            CongestionControlConstructor,
            Reno,
        },
        ControlBlock,
        Disposition,
        State,
    },
    isn_generator::IsnGenerator,
    listener::{
        ListenOutcome,
        ListeningSocket,
    },
    segment::{
        verify_checksum,
        TcpHeader,
        TcpPacket,
        TcpSegment,
    },
    stats::{
        NoStats,
        TcpStats,
    },
    timewait::TimeWaitBlock,
    SeqNumber,
};
use crate::{
    inetstack::protocols::ip::IpProtocol,
    runtime::{
        fail::Fail,
        memory::BufferChain,
        network::{
            config::TcpConfig,
            NetworkRuntime,
        },
    },
};
use ::libc::{
    EADDRINUSE,
    EBADMSG,
    EEXIST,
    EINVAL,
    ENOBUFS,
    ENOTCONN,
};
use ::rand::{
    prelude::SmallRng,
    Rng,
    SeedableRng,
};
use ::std::{
    collections::VecDeque,
    net::{
        Ipv4Addr,
        SocketAddrV4,
    },
    rc::Rc,
};

//==============================================================================
// Structures
//==============================================================================

/// Everything a connection needs from its surroundings while it processes an event.
pub struct TcpContext<'a> {
    pub rt: &'a mut dyn NetworkRuntime,
    pub stats: &'a dyn TcpStats,
    pub config: &'a TcpConfig,
    /// Current value of the tick counter.
    pub ticks: u32,
}

/// TCP Peer
///
/// Owns every connection of the engine: the active table, the time-wait table and the listeners. Inbound segments
/// enter through [TcpPeer::receive], time through [TcpPeer::tick] and application requests through the remaining
/// methods. Each table is kept in most-recently-used order.
pub struct TcpPeer<N: NetworkRuntime> {
    rt: N,
    stats: Rc<dyn TcpStats>,
    config: TcpConfig,
    ticks: u32,
    isn_generator: IsnGenerator,
    cc_constructor: CongestionControlConstructor,
    active: VecDeque<ControlBlock>,
    time_wait: VecDeque<TimeWaitBlock>,
    listeners: VecDeque<ListeningSocket>,
}

//==============================================================================
// Traits
//==============================================================================

/// A kind of table entry inbound segments are routed to.
pub trait Role {
    type Outcome;

    /// True if a segment from `remote` to `local` belongs to this entry.
    fn matches(&self, local: &SocketAddrV4, remote: &SocketAddrV4) -> bool;

    fn input(&mut self, ctx: &mut TcpContext, local: SocketAddrV4, remote: SocketAddrV4, seg: TcpSegment)
        -> Self::Outcome;
}

//==============================================================================
// Associated Functions
//==============================================================================

impl<'a> TcpContext<'a> {
    /// Hands one segment to the IP layer.
    pub fn transmit(&mut self, local: SocketAddrV4, remote: SocketAddrV4, hdr: TcpHeader, data: Option<BufferChain>) {
        let packet: TcpPacket = TcpPacket {
            src_addr: *local.ip(),
            dst_addr: *remote.ip(),
            tcp_hdr: hdr,
            data,
            tx_checksum_offload: self.config.get_tx_checksum_offload(),
        };
        self.stats.segment_sent();
        self.rt.transmit(
            *local.ip(),
            *remote.ip(),
            IpProtocol::TCP,
            self.config.get_ttl(),
            Box::new(packet),
        );
    }

    /// Sends a RST|ACK that belongs to no connection.
    pub fn send_rst(&mut self, local: SocketAddrV4, remote: SocketAddrV4, seq: SeqNumber, ack: SeqNumber) {
        let mut header: TcpHeader = TcpHeader::new(local.port(), remote.port());
        header.seq_num = seq;
        header.ack_num = ack;
        header.rst = true;
        header.ack = true;
        header.window_size = self.config.get_receive_window_size().min(u16::MAX as u32) as u16;
        trace!("send_rst(): {} -> {} seq={} ack={}", local, remote, seq, ack);
        self.stats.reset_sent();
        self.transmit(local, remote, header, None);
    }
}

impl<N: NetworkRuntime> TcpPeer<N> {
    /// Creates a peer that counts nothing.
    pub fn new(rt: N, config: TcpConfig, rng_seed: [u8; 32]) -> Self {
        Self::with_stats(rt, config, rng_seed, Rc::new(NoStats))
    }

    pub fn with_stats(rt: N, config: TcpConfig, rng_seed: [u8; 32], stats: Rc<dyn TcpStats>) -> Self {
        let mut rng: SmallRng = SmallRng::from_seed(rng_seed);
        let nonce: u32 = rng.gen();
        Self {
            rt,
            stats,
            config,
            ticks: 0,
            isn_generator: IsnGenerator::new(nonce),
            cc_constructor: <Reno as CongestionControl>::new,
            active: VecDeque::new(),
            time_wait: VecDeque::new(),
            listeners: VecDeque::new(),
        }
    }

    /// Processes one inbound TCP segment. `buf` holds the TCP header and payload; the IP layer already stripped its
    /// own header.
    pub fn receive(&mut self, src: Ipv4Addr, dst: Ipv4Addr, buf: BufferChain) -> Result<(), Fail> {
        self.stats.segment_received();

        if dst.is_broadcast() || dst.is_multicast() {
            trace!("receive(): dropping segment to {}", dst);
            self.stats.segment_dropped();
            return Ok(());
        }

        if !self.config.get_rx_checksum_offload() && !verify_checksum(src, dst, &buf) {
            self.stats.checksum_error();
            self.stats.segment_dropped();
            return Err(Fail::new(EBADMSG, "TCP checksum mismatch"));
        }

        let (hdr, data): (TcpHeader, BufferChain) = match TcpHeader::parse(buf) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.stats.length_error();
                self.stats.segment_dropped();
                return Err(e);
            },
        };

        let local: SocketAddrV4 = SocketAddrV4::new(dst, hdr.dst_port);
        let remote: SocketAddrV4 = SocketAddrV4::new(src, hdr.src_port);
        trace!(
            "receive(): {} -> {} seq={} ack={} len={}",
            remote,
            local,
            hdr.seq_num,
            hdr.ack_num,
            data.len()
        );
        self.demux(local, remote, TcpSegment { hdr, data });
        Ok(())
    }

    fn demux(&mut self, local: SocketAddrV4, remote: SocketAddrV4, seg: TcpSegment) {
        let TcpPeer {
            rt,
            stats,
            config,
            ticks,
            isn_generator,
            cc_constructor,
            active,
            time_wait,
            listeners,
        } = self;
        let mut ctx: TcpContext = TcpContext {
            rt,
            stats: &**stats,
            config,
            ticks: *ticks,
        };

        if let Some(index) = active.iter().position(|cb| cb.matches(&local, &remote)) {
            if let Some(mut cb) = active.remove(index) {
                let disposition: Disposition = Role::input(&mut cb, &mut ctx, local, remote, seg);
                settle(active, time_wait, listeners, cb, disposition, ctx.ticks);
            }
            return;
        }

        if let Some(tw) = time_wait.iter_mut().find(|tw| tw.matches(&local, &remote)) {
            tw.input(&mut ctx, local, remote, seg);
            return;
        }

        // A listener bound to the exact address wins over a wildcard one.
        let index: Option<usize> = listeners
            .iter()
            .position(|l| l.matches_exactly(&local))
            .or_else(|| listeners.iter().position(|l| l.matches(&local, &remote)));
        if let Some(index) = index {
            if let Some(listener) = listeners.remove(index) {
                listeners.push_front(listener);
            }
            let listener: &mut ListeningSocket = match listeners.front_mut() {
                Some(listener) => listener,
                None => return,
            };
            if let ListenOutcome::Syn(seg) = listener.input(&mut ctx, local, remote, seg) {
                if active.len() >= config.get_max_connections() {
                    debug!("demux(): connection table full, dropping SYN from {}", remote);
                    stats.memory_error();
                    stats.segment_dropped();
                    return;
                }
                let id: ConnectionId = ConnectionId::new(local, remote);
                let handler: Box<dyn TcpHandler> = match listener.accept(id) {
                    Ok(handler) => handler,
                    Err(e) => {
                        debug!("demux(): {} refused by application ({:?})", id, e);
                        return;
                    },
                };
                let iss: SeqNumber = isn_generator.generate(&local, &remote);
                let mut cb: ControlBlock = ControlBlock::passive_open(
                    &ctx,
                    local,
                    remote,
                    iss,
                    handler,
                    *cc_constructor,
                    listener.get_local(),
                    &seg.hdr,
                );
                info!("demux(): {} SYN received", id);
                ctx.stats.passive_open();
                cb.output(&mut ctx);
                active.push_front(cb);
            }
            return;
        }

        if seg.hdr.rst {
            return;
        }
        debug!("demux(): no connection for {} -> {}, sending RST", remote, local);
        stats.protocol_error();
        stats.segment_dropped();
        ctx.send_rst(local, remote, seg.hdr.ack_num, seg.hdr.seq_num + seg.tcplen());
    }

    /// Opens a connection to `remote` and sends the SYN.
    pub fn connect(
        &mut self,
        local: SocketAddrV4,
        remote: SocketAddrV4,
        handler: Box<dyn TcpHandler>,
    ) -> Result<ConnectionId, Fail> {
        let id: ConnectionId = ConnectionId::new(local, remote);
        if self.state(id).is_some() {
            return Err(Fail::new(EEXIST, "connection already exists"));
        }
        if self.active.len() >= self.config.get_max_connections() {
            self.stats.memory_error();
            return Err(Fail::new(ENOBUFS, "connection table full"));
        }

        let iss: SeqNumber = self.isn_generator.generate(&local, &remote);
        let mut cb: ControlBlock = ControlBlock::active_open(
            local,
            remote,
            iss,
            handler,
            self.cc_constructor,
            &self.config,
            self.ticks,
        );
        info!("connect(): {} iss={}", id, iss);
        self.stats.active_open();
        let mut ctx: TcpContext = TcpContext {
            rt: &mut self.rt,
            stats: &*self.stats,
            config: &self.config,
            ticks: self.ticks,
        };
        cb.output(&mut ctx);
        self.active.push_front(cb);
        Ok(id)
    }

    /// Accepts connections on `local`. An unspecified address accepts on every local address.
    pub fn listen(&mut self, local: SocketAddrV4, handler: Box<dyn TcpListenHandler>) -> Result<(), Fail> {
        if self.listeners.iter().any(|l| l.matches_exactly(&local)) {
            return Err(Fail::new(EADDRINUSE, "address already in use"));
        }
        info!("listen(): {}", local);
        self.listeners.push_front(ListeningSocket::new(local, handler));
        Ok(())
    }

    /// Stops accepting connections on `local`. Connections it already opened are unaffected.
    pub fn unlisten(&mut self, local: SocketAddrV4) -> Result<(), Fail> {
        match self.listeners.iter().position(|l| l.matches_exactly(&local)) {
            Some(index) => {
                self.listeners.remove(index);
                info!("unlisten(): {}", local);
                Ok(())
            },
            None => Err(Fail::new(EINVAL, "not listening on address")),
        }
    }

    /// Queues data for transmission.
    pub fn send(&mut self, id: ConnectionId, buf: &[u8]) -> Result<(), Fail> {
        self.with_connection(id, |cb, ctx| {
            let result: Result<(), Fail> = cb.send(ctx, buf);
            (Disposition::Keep, result)
        })
    }

    /// Closes the connection from our side. The peer is told with a FIN, or with a RST if received data is still
    /// unread.
    pub fn close(&mut self, id: ConnectionId) -> Result<(), Fail> {
        self.with_connection(id, |cb, ctx| (cb.close(ctx), Ok(())))
    }

    /// Drops the connection without telling the peer.
    pub fn abort(&mut self, id: ConnectionId) -> Result<(), Fail> {
        if let Some(index) = self.time_wait.iter().position(|tw| tw.get_id() == id) {
            self.time_wait.remove(index);
            return Ok(());
        }
        self.with_connection(id, |cb, _| (cb.abort(), Ok(())))
    }

    /// The application consumed `len` received bytes.
    pub fn recved(&mut self, id: ConnectionId, len: usize) -> Result<(), Fail> {
        let len: u32 = len.min(u32::MAX as usize) as u32;
        self.with_connection(id, |cb, ctx| {
            cb.recved(ctx, len);
            (Disposition::Keep, Ok(()))
        })
    }

    /// Offers previously refused data to the application again.
    pub fn retry_refused(&mut self, id: ConnectionId) -> Result<(), Fail> {
        self.with_connection(id, |cb, ctx| {
            cb.retry_refused(ctx.config);
            (Disposition::Keep, Ok(()))
        })
    }

    /// Advances time by one tick and runs the timers of every connection.
    pub fn tick(&mut self) {
        self.ticks = self.ticks.wrapping_add(1);

        let TcpPeer {
            rt,
            stats,
            config,
            ticks,
            active,
            time_wait,
            listeners,
            ..
        } = self;
        let mut ctx: TcpContext = TcpContext {
            rt,
            stats: &**stats,
            config,
            ticks: *ticks,
        };

        let mut remaining: VecDeque<ControlBlock> = VecDeque::with_capacity(active.len());
        while let Some(mut cb) = active.pop_front() {
            match cb.tick(&mut ctx) {
                Disposition::Keep => remaining.push_back(cb),
                disposition => {
                    if let Some(addr) = cb.take_listener(true) {
                        release_backlog(listeners, addr);
                    }
                    if disposition == Disposition::TimeWait {
                        time_wait.push_back(time_wait_block(&cb, ctx.ticks));
                    }
                },
            }
        }
        *active = remaining;

        let limit: u32 = config.time_wait_ticks();
        let now: u32 = ctx.ticks;
        time_wait.retain(|tw| {
            let expired: bool = tw.expired(now, limit);
            if expired {
                debug!("tick(): {} left TIME_WAIT", tw.get_id());
            }
            !expired
        });
    }

    /// Connection state, or `None` if the connection does not exist.
    pub fn state(&self, id: ConnectionId) -> Option<State> {
        if let Some(cb) = self.control_block(id) {
            return Some(cb.get_state());
        }
        self.time_wait
            .iter()
            .find(|tw| tw.get_id() == id)
            .map(|_| State::TimeWait)
    }

    pub fn control_block(&self, id: ConnectionId) -> Option<&ControlBlock> {
        self.active.iter().find(|cb| cb.get_id() == id)
    }

    /// Active connections, most recently used first.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.active.iter().map(|cb| cb.get_id()).collect()
    }

    /// Listener addresses, most recently used first.
    pub fn listener_addrs(&self) -> Vec<SocketAddrV4> {
        self.listeners.iter().map(|l| l.get_local()).collect()
    }

    /// Connections opened by the listener on `local` that have not completed their handshake.
    pub fn pending_connections(&self, local: SocketAddrV4) -> Option<usize> {
        self.listeners
            .iter()
            .find(|l| l.matches_exactly(&local))
            .map(|l| l.get_pending())
    }

    pub fn time_wait_count(&self) -> usize {
        self.time_wait.len()
    }

    pub fn get_ticks(&self) -> u32 {
        self.ticks
    }

    pub fn get_config(&self) -> &TcpConfig {
        &self.config
    }

    pub fn rt(&self) -> &N {
        &self.rt
    }

    pub fn rt_mut(&mut self) -> &mut N {
        &mut self.rt
    }

    // Runs `f` on an active connection and files the block according to the returned disposition.
    fn with_connection<F>(&mut self, id: ConnectionId, f: F) -> Result<(), Fail>
    where
        F: FnOnce(&mut ControlBlock, &mut TcpContext) -> (Disposition, Result<(), Fail>),
    {
        let index: usize = match self.active.iter().position(|cb| cb.get_id() == id) {
            Some(index) => index,
            None => return Err(Fail::new(ENOTCONN, "connection does not exist")),
        };
        let TcpPeer {
            rt,
            stats,
            config,
            ticks,
            active,
            time_wait,
            listeners,
            ..
        } = self;
        let mut cb: ControlBlock = match active.remove(index) {
            Some(cb) => cb,
            None => return Err(Fail::new(ENOTCONN, "connection does not exist")),
        };
        let mut ctx: TcpContext = TcpContext {
            rt,
            stats: &**stats,
            config,
            ticks: *ticks,
        };
        let (disposition, result): (Disposition, Result<(), Fail>) = f(&mut cb, &mut ctx);
        settle(active, time_wait, listeners, cb, disposition, ctx.ticks);
        result
    }
}

//==============================================================================
// Standalone Functions
//==============================================================================

/// Files a control block back into the tables after an event.
fn settle(
    active: &mut VecDeque<ControlBlock>,
    time_wait: &mut VecDeque<TimeWaitBlock>,
    listeners: &mut VecDeque<ListeningSocket>,
    mut cb: ControlBlock,
    disposition: Disposition,
    ticks: u32,
) {
    if let Some(addr) = cb.take_listener(disposition != Disposition::Keep) {
        release_backlog(listeners, addr);
    }
    match disposition {
        Disposition::Keep => active.push_front(cb),
        Disposition::TimeWait => {
            debug!("settle(): {} entering TIME_WAIT", cb.get_id());
            time_wait.push_front(time_wait_block(&cb, ticks));
        },
        Disposition::Remove => debug!("settle(): {} removed", cb.get_id()),
    }
}

fn release_backlog(listeners: &mut VecDeque<ListeningSocket>, addr: SocketAddrV4) {
    if let Some(listener) = listeners.iter_mut().find(|l| l.matches_exactly(&addr)) {
        listener.release();
    }
}

fn time_wait_block(cb: &ControlBlock, ticks: u32) -> TimeWaitBlock {
    TimeWaitBlock::new(
        cb.get_local(),
        cb.get_remote(),
        cb.get_rcv_nxt(),
        cb.get_rcv_wnd(),
        cb.get_snd_nxt(),
        ticks,
    )
}

//==============================================================================
// Trait Implementations
//==============================================================================

impl Role for ControlBlock {
    type Outcome = Disposition;

    fn matches(&self, local: &SocketAddrV4, remote: &SocketAddrV4) -> bool {
        self.get_local() == *local && self.get_remote() == *remote
    }

    fn input(
        &mut self,
        ctx: &mut TcpContext,
        _local: SocketAddrV4,
        _remote: SocketAddrV4,
        seg: TcpSegment,
    ) -> Disposition {
        ControlBlock::input(self, ctx, seg)
    }
}
