// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use super::ctrlblk::{
    ControlBlock,
    Disposition,
    Effects,
    State,
};
use crate::{
    inetstack::protocols::tcp::{
        peer::TcpContext,
        segment::TcpSegment,
        Delivery,
        SeqNumber,
    },
    runtime::{
        fail::Fail,
        memory::BufferChain,
        network::config::TcpConfig,
    },
};
use ::libc::{
    ECONNABORTED,
    ECONNRESET,
    ENOTCONN,
};
use ::std::net::SocketAddrV4;

//==============================================================================
// Associated Functions
//==============================================================================

impl ControlBlock {
    /// Processes one inbound segment and runs the resulting application callbacks.
    pub fn input(&mut self, ctx: &mut TcpContext, mut seg: TcpSegment) -> Disposition {
        let tcplen: u32 = seg.tcplen();

        if self.refused.is_some() {
            self.retry_refused(ctx.config);
            if self.refused.is_some() && tcplen > 0 {
                debug!("input(): {} still holds refused data, dropping segment", self.get_id());
                ctx.stats.segment_dropped();
                return Disposition::Keep;
            }
        }

        let mut fx: Effects = Effects::default();
        if let Err(e) = self.process(ctx, &mut seg, &mut fx) {
            warn!("input(): {} failed to process segment ({:?})", self.get_id(), e);
            ctx.stats.segment_dropped();
            return Disposition::Keep;
        }

        if fx.reset {
            info!("input(): {} reset by peer", self.get_id());
            self.purge();
            self.handler.error(Fail::new(ECONNRESET, "connection reset by peer"));
            return Disposition::Remove;
        }
        if fx.closed {
            info!("input(): {} closed", self.get_id());
            self.purge();
            if !self.rxclosed {
                // Only the send side was shut down. Tell the application the connection is gone.
                self.handler.error(Fail::new(ENOTCONN, "connection closed"));
            }
            return Disposition::Remove;
        }

        if fx.acked > 0 {
            self.handler.sent(fx.acked as usize);
        }

        if !fx.data.is_empty() {
            if self.rxclosed {
                // Not everything the peer sent will be read.
                debug!("input(): {} data after close, aborting", self.get_id());
                self.send_rst(ctx);
                self.purge();
                self.handler.error(Fail::new(ECONNABORTED, "data received after close"));
                return Disposition::Remove;
            }
            self.deliver(fx.data);
        }

        if fx.got_fin {
            if self.refused.is_some() {
                self.refused_fin = true;
            } else {
                self.deliver_fin(ctx.config);
            }
        }

        self.output(ctx);

        if self.state == State::TimeWait {
            self.purge();
            Disposition::TimeWait
        } else {
            Disposition::Keep
        }
    }

    /// Offers refused data to the application again.
    pub fn retry_refused(&mut self, config: &TcpConfig) {
        if let Some(data) = self.refused.take() {
            trace!("retry_refused(): {} offering {} bytes", self.get_id(), data.len());
            self.deliver(data);
            if self.refused.is_none() && self.refused_fin {
                self.refused_fin = false;
                self.deliver_fin(config);
            }
        }
    }

    /// Closes the connection from our side.
    pub fn close(&mut self, ctx: &mut TcpContext) -> Disposition {
        if self.state == State::SynSent {
            debug!("close(): {} dropping unanswered SYN", self.get_id());
            self.purge();
            return Disposition::Remove;
        }

        self.rxclosed = true;

        if matches!(self.state, State::Established | State::CloseWait)
            && (self.refused.is_some() || self.rcv_wnd != ctx.config.get_receive_window_size())
        {
            // Unread data: reset instead of closing gracefully.
            debug!("close(): {} has unread data, sending RST", self.get_id());
            self.send_rst(ctx);
            self.purge();
            return Disposition::Remove;
        }

        match self.state {
            State::SynRcvd | State::Established => {
                self.queue_fin();
                self.state = State::FinWait1;
            },
            State::CloseWait => {
                self.queue_fin();
                self.state = State::LastAck;
            },
            state => {
                trace!("close(): {} already closing ({:?})", self.get_id(), state);
                return Disposition::Keep;
            },
        }
        debug!("close(): {} -> {:?}", self.get_id(), self.state);
        self.output(ctx);
        Disposition::Keep
    }

    /// Tears the connection down without telling the peer.
    pub fn abort(&mut self) -> Disposition {
        info!("abort(): {}", self.get_id());
        self.purge();
        self.handler.error(Fail::new(ECONNABORTED, "connection aborted"));
        Disposition::Remove
    }

    /// The application consumed `len` bytes. Reopens the window and announces it once it grew enough.
    pub fn recved(&mut self, ctx: &mut TcpContext, len: u32) {
        let max: u32 = ctx.config.get_receive_window_size();
        self.rcv_wnd = self.rcv_wnd.saturating_add(len).min(max);
        let inflation: u32 = self.update_rcv_ann_wnd(ctx.config);
        if inflation >= max / 4 {
            trace!("recved(): {} window update (+{})", self.get_id(), inflation);
            self.ack_now = true;
            self.output(ctx);
        }
    }

    /// Returns the listener this block counts against if it no longer needs a backlog slot. With `gone` set the block
    /// is being dropped and always returns it.
    pub fn take_listener(&mut self, gone: bool) -> Option<SocketAddrV4> {
        if gone || self.state != State::SynRcvd {
            self.listener.take()
        } else {
            None
        }
    }

    fn deliver(&mut self, data: BufferChain) {
        match self.handler.received(data) {
            Delivery::Accepted => {},
            Delivery::Refused(data) => {
                debug!("deliver(): {} application refused {} bytes", self.get_id(), data.len());
                self.refused = Some(data);
            },
        }
    }

    fn deliver_fin(&mut self, config: &TcpConfig) {
        // The application never calls recved() for the FIN.
        if self.rcv_wnd != config.get_receive_window_size() {
            self.rcv_wnd += 1;
        }
        self.handler.closed();
    }

    fn process(&mut self, ctx: &mut TcpContext, seg: &mut TcpSegment, fx: &mut Effects) -> Result<(), Fail> {
        let seq: SeqNumber = seg.hdr.seq_num;
        let ack: SeqNumber = seg.hdr.ack_num;
        let tcplen: u32 = seg.tcplen();

        if seg.hdr.rst {
            let acceptable: bool = match self.state {
                State::SynSent => ack == self.snd_nxt,
                _ => seq.between(self.rcv_nxt, self.rcv_nxt + self.rcv_wnd),
            };
            if acceptable {
                fx.reset = true;
                self.ack_delay = false;
            } else {
                debug!("process(): {} unacceptable RST seq={} rcv_nxt={}", self.get_id(), seq, self.rcv_nxt);
            }
            return Ok(());
        }

        if seg.hdr.syn && !matches!(self.state, State::SynSent | State::SynRcvd) {
            // The peer may have restarted. Our ACK tells it where we are.
            debug!("process(): {} unexpected SYN in {:?}", self.get_id(), self.state);
            self.ack_now = true;
            return Ok(());
        }

        if !self.rxclosed {
            self.tmr = ctx.ticks;
        }

        self.parse_options(ctx, &seg.hdr, seq, tcplen);

        match self.state {
            State::SynSent => {
                let expected: Option<SeqNumber> = self.queues.unacked_front().map(|s| s.seq + 1);
                if seg.hdr.ack && seg.hdr.syn && Some(ack) == expected {
                    let mss: u32 = self.mss as u32;
                    self.snd_buf += 1;
                    self.rcv_nxt = seq + 1;
                    self.rcv_ann_right_edge = self.rcv_nxt;
                    self.lastack = ack;
                    // Forces the window update.
                    self.snd_wl1 = seq - 1;
                    self.snd_wl2 = ack;
                    self.update_send_window(seq, ack, seg.hdr.window_size as u32);
                    self.state = State::Established;
                    self.cc.set_ssthresh(10 * mss);
                    self.cc.on_established(mss);

                    self.queues.pop_acked_syn();
                    if self.queues.has_unacked() {
                        self.rtime = 0;
                        self.nrtx = 0;
                    } else {
                        self.rtime = -1;
                    }
                    if let Some(rtt) = self.rto.on_ack(ctx.ticks, ack) {
                        trace!("process(): handshake rtt={} ticks", rtt);
                    }

                    info!("process(): {} established", self.get_id());
                    self.handler.connected();
                    self.ack_now = true;
                } else if seg.hdr.ack {
                    // Half-open connection on the other side.
                    debug!("process(): {} bad ACK in SYN_SENT, sending RST", self.get_id());
                    ctx.send_rst(self.local, self.remote, ack, seq + tcplen);
                }
            },
            State::SynRcvd => {
                if seg.hdr.ack {
                    if ack.between(self.lastack + 1, self.snd_nxt) {
                        self.receive(ctx, seg, fx)?;
                        self.state = State::Established;
                        self.cc.on_established(self.mss as u32);
                        info!("process(): {} established", self.get_id());
                        self.handler.connected();
                        if fx.got_fin {
                            self.ack_now = true;
                            self.state = State::CloseWait;
                        }
                    } else {
                        debug!("process(): {} bad ACK in SYN_RCVD, sending RST", self.get_id());
                        ctx.send_rst(self.local, self.remote, ack, seq + tcplen);
                    }
                } else if seg.hdr.syn && seq == self.rcv_nxt - 1 {
                    debug!("process(): {} duplicate SYN, resending SYN|ACK", self.get_id());
                    if self.queues.requeue_oldest_unacked() {
                        self.nrtx = self.nrtx.saturating_add(1);
                    }
                }
            },
            State::Established | State::CloseWait => {
                self.receive(ctx, seg, fx)?;
                if fx.got_fin {
                    self.ack_now = true;
                    self.state = State::CloseWait;
                }
            },
            State::FinWait1 => {
                self.receive(ctx, seg, fx)?;
                let fin_acked: bool = self.fin_acked(seg.hdr.ack, ack);
                if fx.got_fin {
                    self.ack_now = true;
                    self.state = if fin_acked { State::TimeWait } else { State::Closing };
                } else if fin_acked {
                    self.state = State::FinWait2;
                }
            },
            State::FinWait2 => {
                self.receive(ctx, seg, fx)?;
                if fx.got_fin {
                    self.ack_now = true;
                    self.state = State::TimeWait;
                }
            },
            State::Closing => {
                self.receive(ctx, seg, fx)?;
                if self.fin_acked(seg.hdr.ack, ack) {
                    self.state = State::TimeWait;
                }
            },
            State::LastAck => {
                self.receive(ctx, seg, fx)?;
                if self.fin_acked(seg.hdr.ack, ack) {
                    fx.closed = true;
                }
            },
            State::TimeWait => {},
        }

        if self.state != State::SynSent {
            trace!("process(): {} now {:?}", self.get_id(), self.state);
        }
        Ok(())
    }

    // Our FIN went out and `ack` covers it.
    fn fin_acked(&self, has_ack: bool, ack: SeqNumber) -> bool {
        has_ack && ack == self.snd_nxt && !self.queues.has_unsent()
    }
}
