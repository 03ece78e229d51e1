// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use super::ctrlblk::{
    ControlBlock,
    Disposition,
    State,
};
use crate::{
    inetstack::protocols::tcp::peer::TcpContext,
    runtime::{
        fail::Fail,
        network::consts::{
            TCP_BACKOFF,
            TCP_PERSIST_BACKOFF,
        },
    },
};
use ::libc::ETIMEDOUT;

//==============================================================================
// Constants
//==============================================================================

/// Out-of-order data older than this many retransmission timeouts is dropped.
const OOSEQ_TIMEOUT_RTOS: u32 = 6;

//==============================================================================
// Associated Functions
//==============================================================================

impl ControlBlock {
    /// Runs one tick of the periodic timer: delayed acknowledgments, retransmission, persist probes and the idle
    /// timeouts of the closing states.
    pub fn tick(&mut self, ctx: &mut TcpContext) -> Disposition {
        if self.refused.is_some() {
            self.retry_refused(ctx.config);
        }
        if self.ack_delay {
            trace!("tick(): {} flushing delayed ACK", self.get_id());
            self.send_empty_ack(ctx);
        }

        let mut expired: Option<&'static str> = None;

        if self.state == State::SynSent && self.nrtx as u32 >= ctx.config.get_syn_retransmissions() {
            expired = Some("SYN retransmissions exhausted");
        } else if self.nrtx as u32 >= ctx.config.get_max_retransmissions() {
            expired = Some("retransmissions exhausted");
        } else if self.persist_backoff > 0 {
            self.persist_cnt = self.persist_cnt.saturating_add(1);
            let interval: u8 = TCP_PERSIST_BACKOFF[(self.persist_backoff - 1) as usize];
            if self.persist_cnt >= interval {
                self.persist_cnt = 0;
                if (self.persist_backoff as usize) < TCP_PERSIST_BACKOFF.len() {
                    self.persist_backoff += 1;
                }
                self.zero_window_probe(ctx);
            }
        } else {
            if self.rtime >= 0 {
                self.rtime += 1;
            }
            if self.queues.has_unacked() && self.rtime >= self.rto.rto() as i32 {
                let index: usize = (self.nrtx as usize).min(TCP_BACKOFF.len() - 1);
                self.retransmit_timeout(ctx, TCP_BACKOFF[index]);
            }
        }

        let idle: u32 = ctx.ticks.wrapping_sub(self.tmr);
        match self.state {
            State::FinWait2 if self.rxclosed && idle > ctx.config.to_ticks(ctx.config.get_fin_wait_timeout()) => {
                expired = Some("FIN_WAIT_2 timed out");
            },
            State::SynRcvd if idle > ctx.config.to_ticks(ctx.config.get_syn_rcvd_timeout()) => {
                expired = Some("SYN_RCVD timed out");
            },
            State::LastAck if idle > ctx.config.time_wait_ticks() => {
                expired = Some("LAST_ACK timed out");
            },
            _ => {},
        }

        if !self.ooseq.is_empty() && idle >= OOSEQ_TIMEOUT_RTOS.saturating_mul(self.rto.rto()) {
            debug!("tick(): {} dropping {} stale out-of-order entries", self.get_id(), self.ooseq.len());
            self.ooseq.clear();
        }

        match expired {
            Some(cause) => {
                info!("tick(): {} {}", self.get_id(), cause);
                self.purge();
                self.handler.error(Fail::new(ETIMEDOUT, cause));
                Disposition::Remove
            },
            None => Disposition::Keep,
        }
    }
}
