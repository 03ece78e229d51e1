// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use super::{
    congestion_control::{
        CongestionControl,
        CongestionControlConstructor,
    },
    ooseq::OutOfOrderQueue,
    queue::{
        QueuedSegment,
        RetransmitQueues,
    },
    rto::RtoCalculator,
};
use crate::{
    inetstack::protocols::tcp::{
        options::ReceivedOptions,
        peer::TcpContext,
        segment::{
            TcpHeader,
            TcpOptions2,
        },
        ConnectionId,
        SeqNumber,
        TcpHandler,
    },
    runtime::{
        memory::BufferChain,
        network::{
            config::TcpConfig,
            consts::FALLBACK_MSS,
        },
    },
};
use ::std::{
    fmt,
    net::SocketAddrV4,
};

//==============================================================================
// Structures
//==============================================================================

/// Connection states a control block can be in. LISTEN belongs to listening sockets and CLOSED is the absence of a
/// control block.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    SynSent,
    SynRcvd,
    Established,
    FinWait1,
    FinWait2,
    CloseWait,
    Closing,
    LastAck,
    TimeWait,
}

/// What the owner of a control block does with it after an event.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Disposition {
    /// Stays on the active table.
    Keep,
    /// Moves to the time-wait table.
    TimeWait,
    /// Is gone. Any application callback has already fired.
    Remove,
}

/// Effects of processing one inbound segment, collected for the post-processing step.
#[derive(Debug, Default)]
pub(super) struct Effects {
    /// An acceptable RST arrived.
    pub reset: bool,
    /// Our FIN was acknowledged in LAST_ACK.
    pub closed: bool,
    /// The peer's FIN was consumed in order.
    pub got_fin: bool,
    /// In-order payload to hand to the application.
    pub data: BufferChain,
    /// Newly acknowledged application bytes.
    pub acked: u32,
}

/// Transmission Control Block
///
/// Everything we know about one connection. Inbound processing lives in `state_machine` and `receiver`, output in
/// `sender` and periodic work in `timers`.
///
/// ```text
///  Send Sequence Space:
///
///        lastack            snd_nxt             snd_lbb
///           v                  v                   v
///  ... -----|------------------|-------------------|------------------ ...
///     acked | sent, unacked    | queued, not sent  | free
///
///  Receive Sequence Space:
///
///        rcv_nxt                         rcv_nxt + rcv_wnd
///           v                                   v
///  ... -----|-----------------------------------|-------------------- ...
///  received | acceptable (out-of-order cached)  | beyond window
/// ```
pub struct ControlBlock {
    pub(super) local: SocketAddrV4,
    pub(super) remote: SocketAddrV4,
    pub(super) state: State,
    pub(super) handler: Box<dyn TcpHandler>,

    // Listener whose backlog this block occupies while it sits in SYN_RCVD.
    pub(super) listener: Option<SocketAddrV4>,

    // Acknowledge on the next tick, or right away.
    pub(super) ack_delay: bool,
    pub(super) ack_now: bool,

    // The application closed its receive side.
    pub(super) rxclosed: bool,

    // Timestamp option negotiated on the handshake.
    pub(super) timestamps: bool,
    pub(super) ts_recent: u32,
    pub(super) ts_lastacksent: SeqNumber,

    //
    // Receive side.
    //
    pub(super) rcv_nxt: SeqNumber,
    pub(super) rcv_wnd: u32,
    pub(super) rcv_ann_wnd: u32,
    pub(super) rcv_ann_right_edge: SeqNumber,
    pub(super) ooseq: OutOfOrderQueue,

    // In-order data the application refused, and whether a FIN followed it.
    pub(super) refused: Option<BufferChain>,
    pub(super) refused_fin: bool,

    //
    // Send side.
    //
    pub(super) snd_nxt: SeqNumber,
    pub(super) lastack: SeqNumber,
    pub(super) snd_lbb: SeqNumber,
    pub(super) snd_wnd: u32,
    pub(super) snd_wnd_max: u32,
    pub(super) snd_wl1: SeqNumber,
    pub(super) snd_wl2: SeqNumber,
    pub(super) snd_buf: u32,
    pub(super) queues: RetransmitQueues,
    pub(super) mss: usize,
    pub(super) cc: Box<dyn CongestionControl>,

    //
    // Timers, in ticks.
    //
    pub(super) rto: RtoCalculator,
    // Retransmission timer. Negative when stopped.
    pub(super) rtime: i32,
    pub(super) nrtx: u8,
    pub(super) persist_cnt: u8,
    // Index into the persist backoff table plus one. Zero when the persist timer is off.
    pub(super) persist_backoff: u8,
    // Tick of the last activity.
    pub(super) tmr: u32,
}

//==============================================================================
// Associated Functions
//==============================================================================

impl ControlBlock {
    fn new(
        local: SocketAddrV4,
        remote: SocketAddrV4,
        state: State,
        iss: SeqNumber,
        handler: Box<dyn TcpHandler>,
        cc_constructor: CongestionControlConstructor,
        config: &TcpConfig,
        ticks: u32,
    ) -> Self {
        let mss: usize = config.get_advertised_mss().min(FALLBACK_MSS);
        let rcv_wnd: u32 = config.get_receive_window_size();
        Self {
            local,
            remote,
            state,
            handler,
            listener: None,
            ack_delay: false,
            ack_now: false,
            rxclosed: false,
            timestamps: false,
            ts_recent: 0,
            ts_lastacksent: SeqNumber::from(0),
            rcv_nxt: SeqNumber::from(0),
            rcv_wnd,
            rcv_ann_wnd: rcv_wnd,
            rcv_ann_right_edge: SeqNumber::from(0),
            ooseq: OutOfOrderQueue::new(),
            refused: None,
            refused_fin: false,
            snd_nxt: iss,
            lastack: iss,
            snd_lbb: iss,
            snd_wnd: 0,
            snd_wnd_max: 0,
            snd_wl1: SeqNumber::from(0),
            snd_wl2: iss,
            snd_buf: config.get_send_buffer_size(),
            queues: RetransmitQueues::new(),
            mss,
            cc: cc_constructor(10 * mss as u32),
            rto: RtoCalculator::new(config.to_ticks(config.get_initial_rto())),
            rtime: -1,
            nrtx: 0,
            persist_cnt: 0,
            persist_backoff: 0,
            tmr: ticks,
        }
    }

    /// Creates a connection in SYN_SENT with its SYN queued.
    pub fn active_open(
        local: SocketAddrV4,
        remote: SocketAddrV4,
        iss: SeqNumber,
        handler: Box<dyn TcpHandler>,
        cc_constructor: CongestionControlConstructor,
        config: &TcpConfig,
        ticks: u32,
    ) -> Self {
        let mut cb: ControlBlock = Self::new(local, remote, State::SynSent, iss, handler, cc_constructor, config, ticks);
        cb.timestamps = config.get_timestamps();
        cb.queue_control(true, false);
        cb
    }

    /// Creates a connection in SYN_RCVD for a SYN that reached a listener, with its SYN|ACK queued.
    pub fn passive_open(
        ctx: &TcpContext,
        local: SocketAddrV4,
        remote: SocketAddrV4,
        iss: SeqNumber,
        handler: Box<dyn TcpHandler>,
        cc_constructor: CongestionControlConstructor,
        listener: SocketAddrV4,
        syn: &TcpHeader,
    ) -> Self {
        let mut cb: ControlBlock =
            Self::new(local, remote, State::SynRcvd, iss, handler, cc_constructor, ctx.config, ctx.ticks);
        cb.listener = Some(listener);
        cb.rcv_nxt = syn.seq_num + 1;
        cb.rcv_ann_right_edge = cb.rcv_nxt;
        cb.snd_wnd = syn.window_size as u32;
        cb.snd_wnd_max = cb.snd_wnd;
        cb.cc.set_ssthresh(cb.snd_wnd);
        // Forces the first window update.
        cb.snd_wl1 = syn.seq_num - 1;
        cb.parse_options(ctx, syn, syn.seq_num, 1);
        cb.queue_control(true, false);
        cb
    }

    pub fn get_id(&self) -> ConnectionId {
        ConnectionId::new(self.local, self.remote)
    }

    pub fn get_local(&self) -> SocketAddrV4 {
        self.local
    }

    pub fn get_remote(&self) -> SocketAddrV4 {
        self.remote
    }

    pub fn get_state(&self) -> State {
        self.state
    }

    pub fn get_rcv_nxt(&self) -> SeqNumber {
        self.rcv_nxt
    }

    pub fn get_rcv_wnd(&self) -> u32 {
        self.rcv_wnd
    }

    pub fn get_snd_nxt(&self) -> SeqNumber {
        self.snd_nxt
    }

    pub fn get_lastack(&self) -> SeqNumber {
        self.lastack
    }

    pub fn get_snd_wnd(&self) -> u32 {
        self.snd_wnd
    }

    pub fn get_snd_buf(&self) -> u32 {
        self.snd_buf
    }

    pub fn get_mss(&self) -> usize {
        self.mss
    }

    pub fn get_cwnd(&self) -> u32 {
        self.cc.get_cwnd()
    }

    pub fn get_ssthresh(&self) -> u32 {
        self.cc.get_ssthresh()
    }

    pub fn get_dupacks(&self) -> u32 {
        self.cc.get_duplicate_ack_count()
    }

    pub fn in_fast_recovery(&self) -> bool {
        self.cc.in_fast_recovery()
    }

    pub fn get_rto(&self) -> u32 {
        self.rto.rto()
    }

    pub fn get_nrtx(&self) -> u8 {
        self.nrtx
    }

    pub fn is_persisting(&self) -> bool {
        self.persist_backoff > 0
    }

    pub fn get_ts_recent(&self) -> u32 {
        self.ts_recent
    }

    pub fn timestamps_enabled(&self) -> bool {
        self.timestamps
    }

    /// Cached out-of-order ranges as `(start, payload end, fin)`. A cached FIN sits at the payload end.
    pub fn ooseq_ranges(&self) -> Vec<(SeqNumber, SeqNumber, bool)> {
        self.ooseq.iter().map(|e| (e.seq, e.end(), e.fin)).collect()
    }

    /// Segments on the unacked list as `(start, end)`.
    pub fn unacked_ranges(&self) -> Vec<(SeqNumber, SeqNumber)> {
        self.queues.iter_unacked().map(|s| (s.seq, s.end())).collect()
    }

    /// Segments on the unsent list as `(start, end)`.
    pub fn unsent_ranges(&self) -> Vec<(SeqNumber, SeqNumber)> {
        self.queues.iter_unsent().map(|s| (s.seq, s.end())).collect()
    }

    pub fn has_refused_data(&self) -> bool {
        self.refused.is_some()
    }

    /// Queues a SYN and/or FIN. Both take one sequence number and one byte of send buffer.
    pub(super) fn queue_control(&mut self, syn: bool, fin: bool) {
        self.queues.push_unsent(QueuedSegment::control(self.snd_lbb, syn, fin));
        self.snd_lbb += 1;
        self.snd_buf = self.snd_buf.saturating_sub(1);
    }

    /// Applies the options of an inbound header.
    pub(super) fn parse_options(&mut self, ctx: &TcpContext, hdr: &TcpHeader, seq: SeqNumber, tcplen: u32) {
        let options: ReceivedOptions = ReceivedOptions::parse(hdr.options());
        if hdr.syn {
            if let Some(mss) = options.effective_mss(ctx.config.get_advertised_mss()) {
                trace!("parse_options(): mss {} -> {}", self.mss, mss);
                self.mss = mss;
            }
        }
        if ctx.config.get_timestamps() {
            // Negotiated only if the peer's SYN carries the option too.
            if hdr.syn {
                self.timestamps = options.timestamp.is_some();
            }
            if let Some(tsval) = options.timestamp_to_latch(hdr.syn, seq, tcplen, self.ts_lastacksent) {
                self.ts_recent = tsval;
            }
        }
    }

    /// Recomputes the window we announce. Returns how far the announced right edge may move, or zero if the window
    /// has not opened by at least `min(window / 2, mss)`.
    pub(super) fn update_rcv_ann_wnd(&mut self, config: &TcpConfig) -> u32 {
        let new_right_edge: SeqNumber = self.rcv_nxt + self.rcv_wnd;
        let threshold: u32 = (config.get_receive_window_size() / 2).min(self.mss as u32);
        if new_right_edge >= self.rcv_ann_right_edge + threshold {
            self.rcv_ann_wnd = self.rcv_wnd;
            new_right_edge.distance_from(self.rcv_ann_right_edge)
        } else {
            if self.rcv_nxt > self.rcv_ann_right_edge {
                // The peer sent past what we announced but within the real window.
                self.rcv_ann_wnd = 0;
            } else {
                // Keep the announced right edge where it is.
                self.rcv_ann_wnd = self.rcv_ann_right_edge.distance_from(self.rcv_nxt);
            }
            0
        }
    }

    /// Requests an acknowledgment. Every second request turns into an immediate one.
    pub(super) fn ack(&mut self, config: &TcpConfig) {
        if self.ack_delay || !config.get_delayed_ack() {
            self.ack_delay = false;
            self.ack_now = true;
        } else {
            self.ack_delay = true;
        }
    }

    /// Builds a header for a segment starting at `seq` and records what it announces.
    pub(super) fn header(&mut self, ctx: &TcpContext, seq: SeqNumber) -> TcpHeader {
        let mut header: TcpHeader = TcpHeader::new(self.local.port(), self.remote.port());
        header.seq_num = seq;

        // Once synchronized we always acknowledge.
        if self.state != State::SynSent {
            header.ack = true;
            header.ack_num = self.rcv_nxt;
        }
        header.window_size = self.rcv_ann_wnd.min(u16::MAX as u32) as u16;
        self.rcv_ann_right_edge = self.rcv_nxt + self.rcv_ann_wnd;

        if self.timestamps {
            let option: TcpOptions2 = TcpOptions2::Timestamp {
                sender_timestamp: ctx.ticks,
                echo_timestamp: self.ts_recent,
            };
            if let Err(e) = header.push_option(option) {
                warn!("header(): cannot add timestamp ({:?})", e);
            }
            self.ts_lastacksent = self.rcv_nxt;
        }
        header
    }

    /// Sends a bare acknowledgment for `rcv_nxt`.
    pub(super) fn send_empty_ack(&mut self, ctx: &mut TcpContext) {
        let header: TcpHeader = self.header(ctx, self.snd_nxt);
        trace!("send_empty_ack(): {} ack={}", self.get_id(), self.rcv_nxt);
        ctx.transmit(self.local, self.remote, header, None);
        self.ack_delay = false;
        self.ack_now = false;
    }

    /// Sends a RST for the current synchronized state.
    pub(super) fn send_rst(&mut self, ctx: &mut TcpContext) {
        ctx.send_rst(self.local, self.remote, self.snd_nxt, self.rcv_nxt);
    }

    /// Releases every queued buffer.
    pub(super) fn purge(&mut self) {
        self.queues.clear();
        self.ooseq.clear();
        self.refused = None;
        self.rtime = -1;
        self.rto.cancel_sample();
    }
}

//==============================================================================
// Trait Implementations
//==============================================================================

impl fmt::Debug for ControlBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlBlock")
            .field("local", &self.local)
            .field("remote", &self.remote)
            .field("state", &self.state)
            .field("rcv_nxt", &self.rcv_nxt)
            .field("rcv_wnd", &self.rcv_wnd)
            .field("snd_nxt", &self.snd_nxt)
            .field("lastack", &self.lastack)
            .field("snd_wnd", &self.snd_wnd)
            .field("cc", &self.cc)
            .finish()
    }
}
