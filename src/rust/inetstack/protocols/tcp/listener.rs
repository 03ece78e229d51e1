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
    peer::{
        Role,
        TcpContext,
    },
    segment::TcpSegment,
};
use crate::runtime::fail::Fail;
use ::std::{
    fmt,
    net::SocketAddrV4,
};

//==============================================================================
// Structures
//==============================================================================

/// What a listener wants done with a segment.
pub enum ListenOutcome {
    /// Nothing more to do.
    Done,
    /// A SYN with room in the backlog. The caller opens the connection.
    Syn(TcpSegment),
}

/// A local endpoint in LISTEN. The address may be unspecified to accept on every local address.
pub struct ListeningSocket {
    local: SocketAddrV4,
    handler: Box<dyn TcpListenHandler>,
    // Connections opened by this listener still in SYN_RCVD.
    pending: usize,
}

//==============================================================================
// Associated Functions
//==============================================================================

impl ListeningSocket {
    pub fn new(local: SocketAddrV4, handler: Box<dyn TcpListenHandler>) -> Self {
        Self {
            local,
            handler,
            pending: 0,
        }
    }

    pub fn get_local(&self) -> SocketAddrV4 {
        self.local
    }

    pub fn get_pending(&self) -> usize {
        self.pending
    }

    /// True if the listener is bound to exactly this address rather than to the wildcard.
    pub fn matches_exactly(&self, local: &SocketAddrV4) -> bool {
        self.local == *local
    }

    /// Asks the application for a handler and takes a backlog slot.
    pub fn accept(&mut self, id: ConnectionId) -> Result<Box<dyn TcpHandler>, Fail> {
        let handler: Box<dyn TcpHandler> = self.handler.accept(id)?;
        self.pending += 1;
        Ok(handler)
    }

    /// Gives back a backlog slot.
    pub fn release(&mut self) {
        self.pending = self.pending.saturating_sub(1);
    }
}

//==============================================================================
// Trait Implementations
//==============================================================================

impl Role for ListeningSocket {
    type Outcome = ListenOutcome;

    fn matches(&self, local: &SocketAddrV4, _remote: &SocketAddrV4) -> bool {
        self.local.port() == local.port() && (self.local.ip().is_unspecified() || self.local.ip() == local.ip())
    }

    fn input(
        &mut self,
        ctx: &mut TcpContext,
        local: SocketAddrV4,
        remote: SocketAddrV4,
        seg: TcpSegment,
    ) -> ListenOutcome {
        if seg.hdr.rst {
            return ListenOutcome::Done;
        }
        if seg.hdr.ack {
            // Nothing is synchronized yet.
            debug!("input(): ACK to listener {} from {}, sending RST", self.local, remote);
            ctx.send_rst(local, remote, seg.hdr.ack_num, seg.hdr.seq_num + seg.tcplen());
            return ListenOutcome::Done;
        }
        if !seg.hdr.syn {
            return ListenOutcome::Done;
        }
        if self.pending >= ctx.config.get_listen_backlog() {
            debug!("input(): backlog of {} full ({} pending)", self.local, self.pending);
            ctx.stats.segment_dropped();
            return ListenOutcome::Done;
        }
        ListenOutcome::Syn(seg)
    }
}

impl fmt::Debug for ListeningSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListeningSocket")
            .field("local", &self.local)
            .field("pending", &self.pending)
            .finish()
    }
}
