// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

mod reno;

use ::std::fmt::Debug;

pub use self::reno::Reno;

/// Largest window expressible without window scaling.
pub const MAX_WINDOW: u32 = u16::MAX as u32;

pub trait SlowStartCongestionAvoidance {
    fn get_cwnd(&self) -> u32;

    fn get_ssthresh(&self) -> u32;

    // Called when the segment size becomes known after the handshake.
    fn set_ssthresh(&mut self, ssthresh: u32);

    // Called once the three-way handshake completes.
    fn on_established(&mut self, _mss: u32) {}

    // Called when an ACK acknowledges new data.
    fn on_ack_received(&mut self, _mss: u32) {}

    // Called immediately before retransmit after RTO.
    fn on_rto(&mut self, _mss: u32, _snd_wnd: u32) {}
}

pub trait FastRetransmitRecovery
where
    Self: SlowStartCongestionAvoidance,
{
    fn get_duplicate_ack_count(&self) -> u32 {
        0
    }

    fn in_fast_recovery(&self) -> bool {
        false
    }

    // Called for each duplicate ACK. Returns true when the oldest unacknowledged segment must be resent now.
    fn on_duplicate_ack(&mut self, _mss: u32, _snd_wnd: u32, _have_unacked: bool) -> bool {
        false
    }

    // Called for an ACK that neither advances nor qualifies as a duplicate.
    fn on_other_ack(&mut self) {}
}

pub trait CongestionControl: SlowStartCongestionAvoidance + FastRetransmitRecovery + Debug {
    fn new(ssthresh: u32) -> Box<dyn CongestionControl>
    where
        Self: Sized;
}

pub type CongestionControlConstructor = fn(u32) -> Box<dyn CongestionControl>;
