// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use crate::inetstack::protocols::tcp::SeqNumber;

// TCP Retransmission Timeout (RTO) Calculator.
//
// Jacobson's estimator in fixed point, counted in protocol ticks. `sa` holds eight times the smoothed round-trip time
// and `sv` four times its mean deviation, so the timeout is `(sa >> 3) + sv`. At most one segment is timed at once,
// and never one that has been retransmitted.

#[derive(Debug)]
pub struct RtoCalculator {
    // Scaled smoothed round-trip time.
    sa: i32,

    // Scaled round-trip time deviation.
    sv: i32,

    // Retransmission timeout, in ticks.
    rto: i32,

    // Tick at which the timed segment was sent, and its sequence number.
    sample: Option<(u32, SeqNumber)>,
}

impl RtoCalculator {
    /// Initializes the calculator with no samples and a timeout of `initial_rto` ticks.
    pub fn new(initial_rto: u32) -> Self {
        let initial: i32 = initial_rto.min(i16::MAX as u32) as i32;
        Self {
            sa: 0,
            sv: initial,
            rto: initial,
            sample: None,
        }
    }

    /// Starts timing the segment at `seq` unless a measurement is already running.
    pub fn start_sample(&mut self, now: u32, seq: SeqNumber) {
        if self.sample.is_none() {
            self.sample = Some((now, seq));
        }
    }

    /// Abandons the running measurement (Karn's rule).
    pub fn cancel_sample(&mut self) {
        self.sample = None;
    }

    #[cfg(test)]
    pub fn is_sampling(&self) -> bool {
        self.sample.is_some()
    }

    /// Completes the running measurement if `ack` covers the timed segment. Returns the measured round-trip time.
    pub fn on_ack(&mut self, now: u32, ack: SeqNumber) -> Option<i32> {
        match self.sample {
            Some((sent_at, seq)) if seq < ack => {
                let rtt: i32 = now.wrapping_sub(sent_at).min(i16::MAX as u32) as i32;
                self.add_sample(rtt);
                self.sample = None;
                Some(rtt)
            },
            _ => None,
        }
    }

    /// Folds a round-trip measurement, in ticks, into the estimator.
    pub fn add_sample(&mut self, rtt: i32) {
        let mut m: i32 = rtt - (self.sa >> 3);
        self.sa += m;
        if m < 0 {
            m = -m;
        }
        m -= self.sv >> 2;
        self.sv += m;
        self.rto = (self.sa >> 3) + self.sv;
        trace!("add_sample(): rtt={:?} sa={:?} sv={:?} rto={:?}", rtt, self.sa, self.sv, self.rto);
    }

    /// Drops any back-off, returning to the estimate.
    pub fn reset(&mut self) {
        self.rto = (self.sa >> 3) + self.sv;
    }

    /// Sets the timeout to the estimate shifted left by `shift`.
    pub fn back_off(&mut self, shift: u8) {
        self.rto = ((self.sa >> 3) + self.sv).saturating_mul(1 << shift);
    }

    /// Current timeout, in ticks. Never below one.
    pub fn rto(&self) -> u32 {
        self.rto.max(1) as u32
    }

    #[cfg(test)]
    pub fn sa(&self) -> i32 {
        self.sa
    }

    #[cfg(test)]
    pub fn sv(&self) -> i32 {
        self.sv
    }
}

#[cfg(test)]
mod tests {
    use super::RtoCalculator;
    use crate::inetstack::protocols::tcp::SeqNumber;
    use ::anyhow::Result;

    #[test]
    fn jacobson_updates() -> Result<()> {
        let mut rto: RtoCalculator = RtoCalculator::new(6);
        crate::ensure_eq!(rto.rto(), 6);

        rto.add_sample(2);
        crate::ensure_eq!(rto.sa(), 2);
        crate::ensure_eq!(rto.sv(), 7);
        crate::ensure_eq!(rto.rto(), 7);

        rto.add_sample(2);
        // m = 2 - 0 = 2; sa = 4; m = 2 - (7 >> 2) = 1; sv = 8.
        crate::ensure_eq!(rto.sa(), 4);
        crate::ensure_eq!(rto.sv(), 8);
        crate::ensure_eq!(rto.rto(), 8);

        rto.back_off(2);
        crate::ensure_eq!(rto.rto(), 32);
        rto.reset();
        crate::ensure_eq!(rto.rto(), 8);
        Ok(())
    }

    #[test]
    fn sample_needs_covering_ack() -> Result<()> {
        let mut rto: RtoCalculator = RtoCalculator::new(6);
        rto.start_sample(10, SeqNumber::from(100));
        rto.start_sample(11, SeqNumber::from(200));
        crate::ensure_eq!(rto.on_ack(13, SeqNumber::from(100)), None);
        crate::ensure_eq!(rto.on_ack(13, SeqNumber::from(101)), Some(3));
        crate::ensure_eq!(rto.is_sampling(), false);

        rto.start_sample(20, SeqNumber::from(300));
        rto.cancel_sample();
        crate::ensure_eq!(rto.on_ack(25, SeqNumber::from(400)), None);
        Ok(())
    }
}
