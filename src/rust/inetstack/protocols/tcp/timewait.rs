// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use super::{
    peer::{
        Role,
        TcpContext,
    },
    segment::{
        TcpHeader,
        TcpSegment,
    },
    ConnectionId,
    SeqNumber,
};
use ::std::net::SocketAddrV4;

/// What remains of a connection in TIME_WAIT: enough to answer retransmitted FINs and to reject new SYNs inside the
/// old window. No buffers and no handler.
#[derive(Debug, Clone)]
pub struct TimeWaitBlock {
    local: SocketAddrV4,
    remote: SocketAddrV4,
    rcv_nxt: SeqNumber,
    rcv_wnd: u32,
    snd_nxt: SeqNumber,
    // Tick of the last FIN.
    tmr: u32,
}

impl TimeWaitBlock {
    pub fn new(
        local: SocketAddrV4,
        remote: SocketAddrV4,
        rcv_nxt: SeqNumber,
        rcv_wnd: u32,
        snd_nxt: SeqNumber,
        ticks: u32,
    ) -> Self {
        Self {
            local,
            remote,
            rcv_nxt,
            rcv_wnd,
            snd_nxt,
            tmr: ticks,
        }
    }

    pub fn get_id(&self) -> ConnectionId {
        ConnectionId::new(self.local, self.remote)
    }

    /// True once the entry sat idle for longer than `limit` ticks.
    pub fn expired(&self, ticks: u32, limit: u32) -> bool {
        ticks.wrapping_sub(self.tmr) > limit
    }
}

impl Role for TimeWaitBlock {
    type Outcome = ();

    fn matches(&self, local: &SocketAddrV4, remote: &SocketAddrV4) -> bool {
        self.local == *local && self.remote == *remote
    }

    fn input(&mut self, ctx: &mut TcpContext, _local: SocketAddrV4, _remote: SocketAddrV4, seg: TcpSegment) {
        let seq: SeqNumber = seg.hdr.seq_num;
        let tcplen: u32 = seg.tcplen();

        if seg.hdr.rst {
            return;
        }

        if seg.hdr.syn {
            if seq.between(self.rcv_nxt, self.rcv_nxt + self.rcv_wnd) {
                debug!("input(): {} SYN inside old window, sending RST", self.get_id());
                ctx.send_rst(self.local, self.remote, seg.hdr.ack_num, seq + tcplen);
                return;
            }
        } else if seg.hdr.fin {
            // The peer missed our ACK. Restart the wait.
            self.tmr = ctx.ticks;
        }

        if tcplen > 0 {
            let mut header: TcpHeader = TcpHeader::new(self.local.port(), self.remote.port());
            header.seq_num = self.snd_nxt;
            header.ack = true;
            header.ack_num = self.rcv_nxt;
            header.window_size = self.rcv_wnd.min(u16::MAX as u32) as u16;
            trace!("input(): {} re-acknowledging {}", self.get_id(), self.rcv_nxt);
            ctx.transmit(self.local, self.remote, header, None);
        }
    }
}
