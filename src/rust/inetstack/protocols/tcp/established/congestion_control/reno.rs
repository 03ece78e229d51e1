// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use super::{
    CongestionControl,
    FastRetransmitRecovery,
    SlowStartCongestionAvoidance,
    MAX_WINDOW,
};
use ::std::fmt::Debug;

// Number of duplicate ACKs that triggers a fast retransmission.
const DUP_ACK_THRESHOLD: u8 = 3;

// Classic slow start and congestion avoidance (RFC 5681) with fast retransmit.
//
// The congestion window starts at a sentinel of one byte. Establishment turns it into two segments if it is still at
// the sentinel and one segment otherwise. Entering fast recovery halves the threshold but leaves the window alone;
// only duplicates after the trigger inflate it.
#[derive(Debug)]
pub struct Reno {
    cwnd: u32,
    ssthresh: u32,
    dupacks: u8,
    in_recovery: bool,
}

impl Reno {
    fn halve(&mut self, mss: u32, snd_wnd: u32) {
        self.ssthresh = (self.cwnd.min(snd_wnd) / 2).max(2 * mss);
    }
}

impl CongestionControl for Reno {
    fn new(ssthresh: u32) -> Box<dyn CongestionControl> {
        Box::new(Self {
            cwnd: 1,
            ssthresh,
            dupacks: 0,
            in_recovery: false,
        })
    }
}

impl SlowStartCongestionAvoidance for Reno {
    fn get_cwnd(&self) -> u32 {
        self.cwnd
    }

    fn get_ssthresh(&self) -> u32 {
        self.ssthresh
    }

    fn set_ssthresh(&mut self, ssthresh: u32) {
        self.ssthresh = ssthresh;
    }

    fn on_established(&mut self, mss: u32) {
        self.cwnd = if self.cwnd == 1 { 2 * mss } else { mss };
    }

    fn on_ack_received(&mut self, mss: u32) {
        if self.in_recovery {
            self.in_recovery = false;
            self.cwnd = self.ssthresh;
        }
        self.dupacks = 0;

        if self.cwnd < self.ssthresh {
            // Slow start.
            self.cwnd = (self.cwnd + mss).min(MAX_WINDOW).max(self.cwnd);
            trace!("on_ack_received(): slow start cwnd={:?}", self.cwnd);
        } else {
            // Congestion avoidance.
            let increment: u32 = mss * mss / self.cwnd.max(1);
            self.cwnd = (self.cwnd + increment).min(MAX_WINDOW).max(self.cwnd);
            trace!("on_ack_received(): congestion avoidance cwnd={:?}", self.cwnd);
        }
    }

    fn on_rto(&mut self, mss: u32, snd_wnd: u32) {
        self.halve(mss, snd_wnd);
        self.cwnd = mss;
        self.dupacks = 0;
        self.in_recovery = false;
    }
}

impl FastRetransmitRecovery for Reno {
    fn get_duplicate_ack_count(&self) -> u32 {
        self.dupacks as u32
    }

    fn in_fast_recovery(&self) -> bool {
        self.in_recovery
    }

    fn on_duplicate_ack(&mut self, mss: u32, snd_wnd: u32, have_unacked: bool) -> bool {
        self.dupacks = self.dupacks.saturating_add(1);
        if self.dupacks > DUP_ACK_THRESHOLD {
            self.cwnd = (self.cwnd + mss).min(MAX_WINDOW).max(self.cwnd);
            trace!("on_duplicate_ack(): inflated cwnd={:?}", self.cwnd);
            false
        } else if self.dupacks == DUP_ACK_THRESHOLD && have_unacked && !self.in_recovery {
            self.halve(mss, snd_wnd);
            self.in_recovery = true;
            debug!("on_duplicate_ack(): fast retransmit ssthresh={:?}", self.ssthresh);
            true
        } else {
            false
        }
    }

    fn on_other_ack(&mut self) {
        self.dupacks = 0;
    }
}
