// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use super::{
    ctrlblk::{
        ControlBlock,
        State,
    },
    queue::QueuedSegment,
};
use crate::{
    inetstack::protocols::tcp::{
        peer::TcpContext,
        segment::{
            TcpHeader,
            TcpOptions2,
        },
        SeqNumber,
    },
    runtime::{
        fail::Fail,
        memory::BufferChain,
    },
};
use ::libc::{
    EINVAL,
    ENOMEM,
    ENOTCONN,
};

impl ControlBlock {
    /// Sends as much of the unsent list as the send and congestion windows allow. An acknowledgment that cannot ride on
    /// a data segment goes out on its own.
    pub fn output(&mut self, ctx: &mut TcpContext) {
        let wnd: u32 = self.snd_wnd.min(self.cc.get_cwnd());
        let lastack: SeqNumber = self.lastack;
        let fits = |segment: &QueuedSegment| segment.seq.distance_from(lastack).wrapping_add(segment.len()) <= wnd;

        // Nothing in flight means no acknowledgment will reopen the window.
        if self.snd_wnd == 0 && !self.queues.has_unacked() && self.queues.unsent_front().is_some() {
            self.start_persist();
        }

        if self.ack_now && !self.queues.unsent_front().map_or(false, fits) {
            self.send_empty_ack(ctx);
            return;
        }

        let mut sent: usize = 0;
        while self.queues.unsent_front().map_or(false, fits) {
            let segment: QueuedSegment = match self.queues.pop_unsent() {
                Some(segment) => segment,
                None => break,
            };
            self.transmit_segment(ctx, &segment);
            if self.snd_nxt < segment.end() {
                self.snd_nxt = segment.end();
            }
            self.queues.push_unacked_sorted(segment);
            sent += 1;
        }

        if sent > 0 {
            trace!("output(): {} sent {} segments, snd_nxt={}", self.get_id(), sent, self.snd_nxt);
            self.ack_delay = false;
            self.ack_now = false;
        }
    }

    fn transmit_segment(&mut self, ctx: &mut TcpContext, segment: &QueuedSegment) {
        let mut header: TcpHeader = self.header(ctx, segment.seq);
        header.syn = segment.syn;
        header.fin = segment.fin;
        header.psh = !segment.data.is_empty();
        if segment.syn {
            let mss: u16 = ctx.config.get_advertised_mss().min(u16::MAX as usize) as u16;
            if let Err(e) = header.push_option(TcpOptions2::MaximumSegmentSize(mss)) {
                warn!("transmit_segment(): cannot add MSS option ({:?})", e);
            }
        }

        if self.rtime < 0 {
            self.rtime = 0;
        }
        if segment.seq >= self.snd_nxt {
            self.rto.start_sample(ctx.ticks, segment.seq);
        } else {
            // Never time a retransmission.
            ctx.stats.retransmitted();
        }

        let data: Option<BufferChain> = if segment.data.is_empty() {
            None
        } else {
            Some(segment.data.clone())
        };
        ctx.transmit(self.local, self.remote, header, data);
    }

    /// Puts the oldest unacknowledged segment back at the head of the unsent list. The next `output` resends it.
    pub(super) fn fast_retransmit(&mut self) {
        if self.queues.requeue_oldest_unacked() {
            debug!(
                "fast_retransmit(): {} resending from {} (ssthresh={})",
                self.get_id(),
                self.lastack,
                self.cc.get_ssthresh()
            );
            self.nrtx = self.nrtx.saturating_add(1);
            self.rto.cancel_sample();
        }
    }

    /// Retransmission timeout. Everything unacknowledged goes out again.
    pub(super) fn retransmit_timeout(&mut self, ctx: &mut TcpContext, backoff: u8) {
        if self.state != State::SynSent {
            self.rto.back_off(backoff);
        }
        self.rtime = 0;
        self.cc.on_rto(self.mss as u32, self.snd_wnd);
        self.queues.requeue_unacked();
        self.nrtx = self.nrtx.saturating_add(1);
        self.rto.cancel_sample();
        debug!(
            "retransmit_timeout(): {} nrtx={} rto={} cwnd={} ssthresh={}",
            self.get_id(),
            self.nrtx,
            self.rto.rto(),
            self.cc.get_cwnd(),
            self.cc.get_ssthresh()
        );
        self.output(ctx);
    }

    /// Probes a zero window with one byte of the oldest outstanding data, or with a bare FIN.
    pub(super) fn zero_window_probe(&mut self, ctx: &mut TcpContext) {
        let (seq, fin, probe): (SeqNumber, bool, Option<BufferChain>) =
            match self.queues.unacked_front().or_else(|| self.queues.unsent_front()) {
                Some(segment) if segment.data.is_empty() && segment.fin => (segment.seq, true, None),
                Some(segment) if !segment.data.is_empty() => {
                    let mut byte: BufferChain = segment.data.clone();
                    if let Err(e) = byte.truncate(1) {
                        warn!("zero_window_probe(): {:?}", e);
                        return;
                    }
                    (segment.seq, false, Some(byte))
                },
                _ => return,
            };

        let mut header: TcpHeader = self.header(ctx, seq);
        header.fin = fin;
        trace!("zero_window_probe(): {} seq={} backoff={}", self.get_id(), seq, self.persist_backoff);
        ctx.transmit(self.local, self.remote, header, probe);
    }

    /// Queues application data and sends what the windows allow.
    pub fn send(&mut self, ctx: &mut TcpContext, buf: &[u8]) -> Result<(), Fail> {
        match self.state {
            State::Established | State::CloseWait => {},
            State::SynSent | State::SynRcvd => return Err(Fail::new(ENOTCONN, "connection not established")),
            _ => return Err(Fail::new(EINVAL, "connection is closing")),
        }
        if buf.is_empty() {
            return Ok(());
        }
        if buf.len() > self.snd_buf as usize {
            return Err(Fail::new(ENOMEM, "send buffer full"));
        }

        // Segments no larger than half the largest window the peer offered.
        let half_window: usize = (self.snd_wnd_max / 2) as usize;
        let seg_size: usize = if half_window == 0 {
            self.mss
        } else {
            self.mss.min(half_window)
        };
        let nsegs: usize = (buf.len() + seg_size - 1) / seg_size;
        if self.queues.len() + nsegs > ctx.config.get_send_queue_length() {
            return Err(Fail::new(ENOMEM, "send queue full"));
        }

        for chunk in buf.chunks(seg_size) {
            self.queues
                .push_unsent(QueuedSegment::data(self.snd_lbb, BufferChain::from(chunk)));
            self.snd_lbb += chunk.len() as u32;
        }
        self.snd_buf -= buf.len() as u32;
        trace!("send(): {} queued {} bytes in {} segments", self.get_id(), buf.len(), nsegs);

        self.output(ctx);
        Ok(())
    }

    /// Queues our FIN, folding it into the last unsent data segment when possible.
    pub(super) fn queue_fin(&mut self) {
        if let Some(last) = self.queues.unsent_back_mut() {
            if !last.syn && !last.fin {
                last.fin = true;
                self.snd_lbb += 1;
                return;
            }
        }
        self.queue_control(false, true);
    }
}
