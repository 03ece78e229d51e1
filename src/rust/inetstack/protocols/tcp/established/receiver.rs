// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use super::{
    ctrlblk::{
        ControlBlock,
        Effects,
        State,
    },
    ooseq::OoseqEntry,
    queue::Purged,
};
use crate::{
    inetstack::protocols::tcp::{
        peer::TcpContext,
        segment::TcpSegment,
        SeqNumber,
    },
    runtime::fail::Fail,
};
use ::std::mem;

//==============================================================================
// Associated Functions
//==============================================================================

// Segment reception: acknowledgment processing followed by data processing.
impl ControlBlock {
    pub(super) fn receive(&mut self, ctx: &mut TcpContext, seg: &mut TcpSegment, fx: &mut Effects) -> Result<(), Fail> {
        if seg.hdr.ack {
            self.process_ack(ctx, seg, fx);
        }

        let accepts_data: bool = matches!(
            self.state,
            State::SynRcvd | State::Established | State::FinWait1 | State::FinWait2
        );
        if seg.tcplen() > 0 && accepts_data {
            self.process_data(ctx, seg, fx)?;
        } else if !seg.hdr.seq_num.between(self.rcv_nxt, self.rcv_nxt + self.rcv_wnd - 1) {
            // Empty segments and segments past our FIN land here. Answer anything out of the window.
            self.ack_now = true;
        }
        Ok(())
    }

    fn process_ack(&mut self, ctx: &mut TcpContext, seg: &TcpSegment, fx: &mut Effects) {
        let seq: SeqNumber = seg.hdr.seq_num;
        let ack: SeqNumber = seg.hdr.ack_num;
        let wnd: u32 = seg.hdr.window_size as u32;
        let mss: u32 = self.mss as u32;

        let right_wnd_edge: SeqNumber = self.snd_wl2 + self.snd_wnd;
        self.update_send_window(seq, ack, wnd);

        if ack <= self.lastack {
            // A duplicate acknowledges nothing, carries nothing, leaves the window alone, arrives while data is
            // outstanding and repeats the last acknowledgment exactly.
            let is_duplicate: bool = seg.tcplen() == 0
                && self.snd_wl2 + self.snd_wnd == right_wnd_edge
                && self.rtime >= 0
                && self.lastack == ack;
            if is_duplicate {
                let retransmit: bool = self
                    .cc
                    .on_duplicate_ack(mss, self.snd_wnd, self.queues.has_unacked());
                trace!("process_ack(): duplicate ack={} count={}", ack, self.cc.get_duplicate_ack_count());
                if retransmit {
                    self.fast_retransmit();
                }
            } else {
                self.cc.on_other_ack();
            }
        } else if ack.between(self.lastack + 1, self.snd_nxt) {
            let advanced: u32 = ack.distance_from(self.lastack);
            if !matches!(self.state, State::SynSent | State::SynRcvd) {
                self.cc.on_ack_received(mss);
            }
            self.nrtx = 0;
            self.rto.reset();
            self.snd_buf = self.snd_buf.saturating_add(advanced);
            self.lastack = ack;

            let purged: Purged = self.queues.purge_unacked(ack);
            fx.acked = advanced.saturating_sub(purged.control_flags);
            trace!(
                "process_ack(): ack={} advanced={} purged={} cwnd={}",
                ack,
                advanced,
                purged.segments,
                self.cc.get_cwnd()
            );

            self.rtime = if self.queues.has_unacked() { 0 } else { -1 };
        } else {
            trace!("process_ack(): ack={} for data never sent", ack);
        }

        // A retransmission timeout moves sent segments back to the unsent list.
        let purged: Purged = self.queues.purge_unsent(ack, self.snd_nxt);
        fx.acked = fx.acked.saturating_sub(purged.control_flags);

        if let Some(rtt) = self.rto.on_ack(ctx.ticks, ack) {
            trace!("process_ack(): rtt={} ticks rto={} ticks", rtt, self.rto.rto());
        }
    }

    /// Records the peer's window unless an older segment would overwrite a newer one, and starts or stops the persist
    /// timer as the window closes or reopens.
    pub(super) fn update_send_window(&mut self, seq: SeqNumber, ack: SeqNumber, wnd: u32) {
        let newer: bool = self.snd_wl1 < seq
            || (self.snd_wl1 == seq && self.snd_wl2 < ack)
            || (self.snd_wl1 == seq && self.snd_wl2 == ack && wnd > self.snd_wnd);
        if !newer {
            return;
        }
        self.snd_wnd = wnd;
        self.snd_wnd_max = self.snd_wnd_max.max(wnd);
        self.snd_wl1 = seq;
        self.snd_wl2 = ack;
        if wnd == 0 {
            self.start_persist();
        } else if self.persist_backoff > 0 {
            debug!("update_send_window(): {} window reopened ({} bytes)", self.get_id(), wnd);
            self.persist_backoff = 0;
        }
    }

    pub(super) fn start_persist(&mut self) {
        if self.persist_backoff == 0 {
            debug!("start_persist(): {} zero window, starting persist timer", self.get_id());
            self.persist_cnt = 0;
            self.persist_backoff = 1;
        }
    }

    fn process_data(&mut self, ctx: &mut TcpContext, seg: &mut TcpSegment, fx: &mut Effects) -> Result<(), Fail> {
        let mut seq: SeqNumber = seg.hdr.seq_num;
        let mut tcplen: u32 = seg.tcplen();

        // Left edge.
        if self.rcv_nxt.between(seq + 1, seq + tcplen - 1) {
            let mut off: u32 = self.rcv_nxt.distance_from(seq);
            if seg.hdr.syn {
                seg.hdr.syn = false;
                off -= 1;
            }
            trace!("process_data(): trimming {} bytes off the front of {}", off, seq);
            seg.data.adjust(off as usize)?;
            seq = self.rcv_nxt;
            seg.hdr.seq_num = seq;
            tcplen = seg.tcplen();
        } else if seq < self.rcv_nxt {
            debug!("process_data(): duplicate seq={} len={}", seq, tcplen);
            self.ack_now = true;
        }

        if !seq.between(self.rcv_nxt, self.rcv_nxt + self.rcv_wnd - 1) {
            trace!("process_data(): seq={} outside [{}, +{})", seq, self.rcv_nxt, self.rcv_wnd);
            self.send_empty_ack(ctx);
            return Ok(());
        }

        // Right edge.
        let room: u32 = self.rcv_wnd - seq.distance_from(self.rcv_nxt);
        if tcplen > room {
            debug!("process_data(): peer overran window by {} at seq={}", tcplen - room, seq);
            seg.hdr.fin = false;
            let keep: u32 = room - seg.hdr.syn as u32;
            seg.data.truncate(keep as usize)?;
        }

        if seq == self.rcv_nxt {
            self.receive_in_order(ctx, seg, fx)
        } else {
            self.receive_out_of_order(ctx, seg)
        }
    }

    fn receive_in_order(&mut self, ctx: &mut TcpContext, seg: &mut TcpSegment, fx: &mut Effects) -> Result<(), Fail> {
        let seq: SeqNumber = seg.hdr.seq_num;
        let mut tcplen: u32 = seg.tcplen();
        let filled_gap: bool = !self.ooseq.is_empty();

        if seg.hdr.fin {
            // Everything cached lies below the FIN and is now known.
            self.ooseq.clear();
        } else if filled_gap {
            if self.ooseq.remove_covered(seq + tcplen) && !seg.hdr.syn {
                seg.hdr.fin = true;
                tcplen = seg.tcplen();
            }
            if let Some(next) = self.ooseq.front_seq() {
                if seq + tcplen > next {
                    let keep: u32 = next.distance_from(seq) - seg.hdr.syn as u32;
                    seg.data.truncate(keep as usize)?;
                    seg.hdr.fin = false;
                    tcplen = seg.tcplen();
                }
            }
        }

        self.rcv_nxt = seq + tcplen;
        self.rcv_wnd = self.rcv_wnd.saturating_sub(tcplen);
        self.update_rcv_ann_wnd(ctx.config);

        if !seg.data.is_empty() {
            fx.data.cat(mem::take(&mut seg.data));
        }
        if seg.hdr.fin {
            debug!("receive_in_order(): {} received FIN", self.get_id());
            fx.got_fin = true;
        }

        while let Some(entry) = self.ooseq.pop_at(self.rcv_nxt) {
            let len: u32 = entry.tcplen();
            trace!("receive_in_order(): [{}, {}) now in order", entry.seq, entry.end());
            self.rcv_nxt += len;
            self.rcv_wnd = self.rcv_wnd.saturating_sub(len);
            self.update_rcv_ann_wnd(ctx.config);
            if entry.fin {
                debug!("receive_in_order(): {} dequeued FIN", self.get_id());
                fx.got_fin = true;
                if self.state == State::Established {
                    self.state = State::CloseWait;
                }
            }
            if !entry.data.is_empty() {
                fx.data.cat(entry.data);
            }
        }

        if filled_gap {
            self.ack_now = true;
        } else {
            self.ack(ctx.config);
        }
        Ok(())
    }

    fn receive_out_of_order(&mut self, ctx: &mut TcpContext, seg: &mut TcpSegment) -> Result<(), Fail> {
        // Lets the sender count duplicates.
        self.send_empty_ack(ctx);

        let mut seq: SeqNumber = seg.hdr.seq_num;
        if seg.hdr.syn {
            seq += 1;
        }
        let entry: OoseqEntry = OoseqEntry::new(seq, seg.hdr.fin, mem::take(&mut seg.data));
        trace!("receive_out_of_order(): caching [{}, {}) fin={}", entry.seq, entry.end(), entry.fin);
        self.ooseq.insert(entry)?;

        let dropped: usize = self
            .ooseq
            .enforce_caps(ctx.config.get_ooseq_max_bytes(), ctx.config.get_ooseq_max_entries());
        if dropped > 0 {
            debug!("receive_out_of_order(): dropped {} cached entries over the cap", dropped);
        }
        Ok(())
    }
}
