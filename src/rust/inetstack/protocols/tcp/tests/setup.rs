// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use super::{
    conn_id,
    local,
    remote,
    segment,
    Frame,
    Test,
    LOCAL_IPV4,
    REMOTE_IPV4,
    REMOTE_PORT,
};
use crate::{
    inetstack::protocols::{
        ip::IpProtocol,
        tcp::{
            options::ReceivedOptions,
            State,
        },
    },
    runtime::{
        memory::BufferChain,
        network::config::TcpConfig,
    },
};
use ::anyhow::Result;
use ::libc::{
    EBADMSG,
    ECONNRESET,
    ENOBUFS,
};
use ::std::net::{
    Ipv4Addr,
    SocketAddrV4,
};

//=============================================================================

/// Tests the passive three-way handshake.
#[test]
fn test_passive_open() -> Result<()> {
    let mut test: Test = Test::default();
    test.listen()?;

    test.deliver(segment(99).syn().mss(1460))?;
    crate::ensure_eq!(test.state(), Some(State::SynRcvd));
    crate::ensure_eq!(test.peer.pending_connections(local()), Some(1));

    let synack: Frame = test.next_frame()?;
    crate::ensure_eq!(synack.hdr.syn, true);
    crate::ensure_eq!(synack.hdr.ack, true);
    crate::ensure_eq!(synack.seq(), 0);
    crate::ensure_eq!(synack.ack(), 100);
    crate::ensure_eq!(synack.hdr.window_size, 2144);
    crate::ensure_eq!(synack.src, LOCAL_IPV4);
    crate::ensure_eq!(synack.dst, REMOTE_IPV4);
    crate::ensure_eq!(synack.protocol, IpProtocol::TCP);
    crate::ensure_eq!(synack.ttl, 255);
    crate::ensure_eq!(synack.checksum_ok, true);
    crate::ensure_eq!(ReceivedOptions::parse(synack.hdr.options()).mss, Some(536));

    test.deliver(segment(100).ack(1))?;
    crate::ensure_eq!(test.state(), Some(State::Established));
    crate::ensure_eq!(test.peer.pending_connections(local()), Some(0));
    crate::ensure_eq!(test.events.borrow().accepted, vec![conn_id()]);
    crate::ensure_eq!(test.events.borrow().connected, 1);
    crate::ensure_eq!(test.events.borrow().sent, 0);
    crate::ensure_eq!(test.counters.passive_opens(), 1);

    let cb = test.cb()?;
    crate::ensure_eq!(u32::from(cb.get_rcv_nxt()), 100);
    crate::ensure_eq!(u32::from(cb.get_lastack()), 1);
    crate::ensure_eq!(cb.get_mss(), 536);
    crate::ensure_eq!(cb.get_snd_wnd(), 8192);
    crate::ensure_eq!(cb.get_cwnd(), 2 * 536);
    crate::ensure_eq!(test.frame_count(), 0);
    Ok(())
}

/// Tests the active three-way handshake.
#[test]
fn test_active_open() -> Result<()> {
    let mut test: Test = Test::default();
    test.connect(5000)?;

    crate::ensure_eq!(test.events.borrow().connected, 1);
    crate::ensure_eq!(test.counters.active_opens(), 1);
    let cb = test.cb()?;
    crate::ensure_eq!(u32::from(cb.get_rcv_nxt()), 5001);
    crate::ensure_eq!(u32::from(cb.get_snd_nxt()), 1);
    crate::ensure_eq!(cb.get_snd_buf(), 2144);
    crate::ensure_eq!(cb.get_ssthresh(), 10 * 536);
    crate::ensure_eq!(cb.get_cwnd(), 2 * 536);
    Ok(())
}

/// A peer MSS smaller than ours wins; a larger one is clamped.
#[test]
fn test_mss_negotiation() -> Result<()> {
    let mut test: Test = Test::default();
    test.listen()?;
    test.deliver(segment(99).syn().mss(200))?;
    crate::ensure_eq!(test.cb()?.get_mss(), 200);
    Ok(())
}

/// Tests that a SYN|ACK acknowledging the wrong sequence number is answered with a RST.
#[test]
fn test_syn_ack_with_bad_ack() -> Result<()> {
    let mut test: Test = Test::default();
    let handler = test.handler();
    test.peer.connect(local(), remote(), handler)?;
    test.next_frame()?;

    test.deliver(segment(5000).syn().ack(7))?;
    let rst: Frame = test.next_frame()?;
    crate::ensure_eq!(rst.hdr.rst, true);
    crate::ensure_eq!(rst.seq(), 7);
    crate::ensure_eq!(rst.ack(), 5001);
    crate::ensure_eq!(test.state(), Some(State::SynSent));
    crate::ensure_eq!(test.counters.resets(), 1);
    crate::ensure_eq!(test.frame_count(), 0);
    Ok(())
}

/// In SYN_SENT a RST is only acceptable if it acknowledges our SYN.
#[test]
fn test_rst_in_syn_sent() -> Result<()> {
    let mut test: Test = Test::default();
    let handler = test.handler();
    test.peer.connect(local(), remote(), handler)?;
    test.next_frame()?;

    test.deliver(segment(0).rst().ack(5))?;
    crate::ensure_eq!(test.state(), Some(State::SynSent));
    crate::ensure_eq!(test.events.borrow().errors.is_empty(), true);

    test.deliver(segment(0).rst().ack(1))?;
    crate::ensure_eq!(test.state(), None);
    crate::ensure_eq!(test.events.borrow().errors, vec![ECONNRESET]);
    Ok(())
}

/// Tests that an ACK outside what we sent while in SYN_RCVD draws a RST and leaves the connection alone.
#[test]
fn test_syn_rcvd_bad_ack() -> Result<()> {
    let mut test: Test = Test::default();
    test.listen()?;
    test.deliver(segment(99).syn())?;
    test.next_frame()?;

    test.deliver(segment(100).ack(50))?;
    let rst: Frame = test.next_frame()?;
    crate::ensure_eq!(rst.hdr.rst, true);
    crate::ensure_eq!(rst.seq(), 50);
    crate::ensure_eq!(rst.ack(), 100);
    crate::ensure_eq!(test.state(), Some(State::SynRcvd));
    crate::ensure_eq!(test.events.borrow().connected, 0);
    Ok(())
}

/// A retransmitted SYN makes us send the SYN|ACK again.
#[test]
fn test_duplicate_syn_in_syn_rcvd() -> Result<()> {
    let mut test: Test = Test::default();
    test.listen()?;
    test.deliver(segment(99).syn())?;
    test.next_frame()?;

    test.deliver(segment(99).syn())?;
    let synack: Frame = test.next_frame()?;
    crate::ensure_eq!(synack.hdr.syn, true);
    crate::ensure_eq!(synack.hdr.ack, true);
    crate::ensure_eq!(synack.seq(), 0);
    crate::ensure_eq!(synack.ack(), 100);
    crate::ensure_eq!(test.counters.retransmissions(), 1);
    crate::ensure_eq!(test.peer.connection_ids().len(), 1);
    Ok(())
}

/// Tests that SYNs beyond the backlog are dropped without a reply.
#[test]
fn test_listen_backlog() -> Result<()> {
    let mut test: Test = Test::with_config(TcpConfig::default().set_listen_backlog(1)?);
    test.listen()?;
    test.deliver(segment(99).syn())?;
    test.next_frame()?;

    let other: SocketAddrV4 = SocketAddrV4::new(REMOTE_IPV4, REMOTE_PORT + 1);
    test.deliver(segment(500).syn().src(other))?;
    crate::ensure_eq!(test.frame_count(), 0);
    crate::ensure_eq!(test.peer.connection_ids().len(), 1);
    crate::ensure_eq!(test.counters.dropped(), 1);

    // Completing the first handshake frees the slot.
    test.deliver(segment(100).ack(1))?;
    test.deliver(segment(500).syn().src(other))?;
    crate::ensure_eq!(test.peer.connection_ids().len(), 2);
    crate::ensure_eq!(test.next_frame()?.hdr.syn, true);
    Ok(())
}

/// Tests that the application can turn a SYN down.
#[test]
fn test_accept_refused() -> Result<()> {
    let mut test: Test = Test::default();
    test.listen()?;
    test.events.borrow_mut().refuse_accept = true;
    test.deliver(segment(99).syn())?;
    crate::ensure_eq!(test.frame_count(), 0);
    crate::ensure_eq!(test.state(), None);
    crate::ensure_eq!(test.peer.pending_connections(local()), Some(0));
    Ok(())
}

/// Tests the limit on active connections, for both open paths.
#[test]
fn test_connection_table_full() -> Result<()> {
    let mut test: Test = Test::with_config(TcpConfig::default().set_max_connections(1)?);
    test.listen()?;
    test.deliver(segment(99).syn())?;
    test.next_frame()?;

    let other: SocketAddrV4 = SocketAddrV4::new(REMOTE_IPV4, REMOTE_PORT + 1);
    test.deliver(segment(500).syn().src(other))?;
    crate::ensure_eq!(test.frame_count(), 0);
    crate::ensure_eq!(test.counters.memory_errors(), 1);

    let handler = test.handler();
    match test.peer.connect(local(), other, handler) {
        Err(e) => crate::ensure_eq!(e.errno, ENOBUFS),
        Ok(_) => anyhow::bail!("connect should fail on a full table"),
    }
    Ok(())
}

/// Tests the RST answering a segment nobody wants.
#[test]
fn test_unmatched_segment() -> Result<()> {
    let mut test: Test = Test::default();
    test.deliver(segment(300).ack(77).data(&[0; 10]))?;
    let rst: Frame = test.next_frame()?;
    crate::ensure_eq!(rst.hdr.rst, true);
    crate::ensure_eq!(rst.hdr.ack, true);
    crate::ensure_eq!(rst.seq(), 77);
    crate::ensure_eq!(rst.ack(), 310);
    crate::ensure_eq!(test.counters.protocol_errors(), 1);

    // Never answer a RST with a RST.
    test.deliver(segment(300).rst())?;
    crate::ensure_eq!(test.frame_count(), 0);
    Ok(())
}

/// Tests that corrupted segments are dropped and counted.
#[test]
fn test_bad_checksum() -> Result<()> {
    let mut test: Test = Test::default();
    test.listen()?;
    let mut wire: Vec<u8> = segment(99).syn().build().to_vec();
    wire[4] ^= 0xff;
    match test.peer.receive(REMOTE_IPV4, LOCAL_IPV4, BufferChain::from(&wire[..])) {
        Err(e) => crate::ensure_eq!(e.errno, EBADMSG),
        Ok(()) => anyhow::bail!("corrupted segment should be rejected"),
    }
    crate::ensure_eq!(test.counters.checksum_errors(), 1);
    crate::ensure_eq!(test.state(), None);
    crate::ensure_eq!(test.frame_count(), 0);
    Ok(())
}

/// Tests that a truncated header is a length error once checksums are offloaded.
#[test]
fn test_truncated_header() -> Result<()> {
    let mut test: Test = Test::with_config(TcpConfig::default().set_checksum_offload(true, false));
    let wire: Vec<u8> = segment(99).syn().build().to_vec();
    crate::ensure_eq!(
        test.peer
            .receive(REMOTE_IPV4, LOCAL_IPV4, BufferChain::from(&wire[..10]))
            .is_err(),
        true
    );
    crate::ensure_eq!(test.counters.length_errors(), 1);
    crate::ensure_eq!(test.counters.dropped(), 1);
    Ok(())
}

/// Tests that segments sent to broadcast or multicast addresses are ignored.
#[test]
fn test_broadcast_dropped() -> Result<()> {
    let mut test: Test = Test::default();
    test.listen_on(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 80))?;
    let wire: BufferChain = segment(99).syn().build();
    test.peer.receive(REMOTE_IPV4, Ipv4Addr::BROADCAST, wire)?;
    crate::ensure_eq!(test.frame_count(), 0);
    crate::ensure_eq!(test.peer.connection_ids().is_empty(), true);
    Ok(())
}
