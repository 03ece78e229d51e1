// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use super::{
    local,
    payload,
    remote,
    segment,
    Frame,
    Test,
};
use crate::inetstack::protocols::tcp::{
    SeqNumber,
    State,
};
use ::anyhow::Result;
use ::libc::{
    ECONNABORTED,
    ECONNRESET,
    EINVAL,
    ENOTCONN,
};

//=============================================================================

/// Tests that a FIN arriving ahead of data is held back until the data arrives.
#[test]
fn test_fin_after_missing_data() -> Result<()> {
    let mut test: Test = Test::default();
    test.accept(39)?;

    test.deliver(segment(50).ack(1).fin())?;
    crate::ensure_eq!(test.next_frame()?.ack(), 40);
    crate::ensure_eq!(test.events.borrow().closed, 0);
    // A bare FIN has no payload: its entry ends where it starts.
    crate::ensure_eq!(
        test.cb()?.ooseq_ranges(),
        vec![(SeqNumber::from(50), SeqNumber::from(50), true)]
    );

    test.deliver(segment(40).ack(1).data(&payload(10)))?;
    crate::ensure_eq!(test.events.borrow().received, payload(10));
    crate::ensure_eq!(test.events.borrow().closed, 1);
    crate::ensure_eq!(test.state(), Some(State::CloseWait));
    crate::ensure_eq!(test.next_frame()?.ack(), 51);
    Ok(())
}

/// Tests a close started by the peer.
#[test]
fn test_passive_close() -> Result<()> {
    let mut test: Test = Test::default();
    let id = test.accept(99)?;

    test.deliver(segment(100).ack(1).fin())?;
    crate::ensure_eq!(test.state(), Some(State::CloseWait));
    crate::ensure_eq!(test.events.borrow().closed, 1);
    crate::ensure_eq!(test.next_frame()?.ack(), 101);
    // The FIN takes no room in the window once handed over.
    crate::ensure_eq!(test.cb()?.get_rcv_wnd(), 2144);

    test.peer.close(id)?;
    crate::ensure_eq!(test.state(), Some(State::LastAck));
    let fin: Frame = test.next_frame()?;
    crate::ensure_eq!(fin.hdr.fin, true);
    crate::ensure_eq!(fin.seq(), 1);
    crate::ensure_eq!(fin.ack(), 101);

    test.deliver(segment(101).ack(2))?;
    crate::ensure_eq!(test.state(), None);
    crate::ensure_eq!(test.events.borrow().errors.is_empty(), true);
    crate::ensure_eq!(test.frame_count(), 0);
    Ok(())
}

/// Tests a close started by us, through FIN_WAIT_1, FIN_WAIT_2 and TIME_WAIT.
#[test]
fn test_active_close() -> Result<()> {
    let mut test: Test = Test::default();
    let id = test.accept(99)?;

    test.peer.close(id)?;
    crate::ensure_eq!(test.state(), Some(State::FinWait1));
    let fin: Frame = test.next_frame()?;
    crate::ensure_eq!(fin.hdr.fin, true);
    crate::ensure_eq!(fin.seq(), 1);

    test.deliver(segment(100).ack(2))?;
    crate::ensure_eq!(test.state(), Some(State::FinWait2));
    crate::ensure_eq!(test.frame_count(), 0);

    test.deliver(segment(100).ack(2).fin())?;
    crate::ensure_eq!(test.state(), Some(State::TimeWait));
    crate::ensure_eq!(test.events.borrow().closed, 1);
    let ack: Frame = test.next_frame()?;
    crate::ensure_eq!(ack.seq(), 2);
    crate::ensure_eq!(ack.ack(), 101);
    crate::ensure_eq!(test.peer.connection_ids().is_empty(), true);
    crate::ensure_eq!(test.peer.time_wait_count(), 1);

    // A retransmitted FIN is acknowledged again from TIME_WAIT.
    test.deliver(segment(100).ack(2).fin())?;
    let ack: Frame = test.next_frame()?;
    crate::ensure_eq!(ack.hdr.ack, true);
    crate::ensure_eq!(ack.seq(), 2);
    crate::ensure_eq!(ack.ack(), 101);

    // A new SYN inside the old window is turned away.
    test.deliver(segment(200).syn())?;
    let rst: Frame = test.next_frame()?;
    crate::ensure_eq!(rst.hdr.rst, true);
    crate::ensure_eq!(rst.ack(), 201);
    crate::ensure_eq!(test.state(), Some(State::TimeWait));
    Ok(())
}

/// A FIN that also acknowledges ours skips FIN_WAIT_2.
#[test]
fn test_fin_ack_in_fin_wait_1() -> Result<()> {
    let mut test: Test = Test::default();
    let id = test.accept(99)?;
    test.peer.close(id)?;
    test.next_frame()?;

    test.deliver(segment(100).ack(2).fin())?;
    crate::ensure_eq!(test.state(), Some(State::TimeWait));
    crate::ensure_eq!(test.next_frame()?.ack(), 101);
    Ok(())
}

/// Tests both sides closing at once.
#[test]
fn test_simultaneous_close() -> Result<()> {
    let mut test: Test = Test::default();
    let id = test.accept(99)?;
    test.peer.close(id)?;
    test.next_frame()?;

    test.deliver(segment(100).ack(1).fin())?;
    crate::ensure_eq!(test.state(), Some(State::Closing));
    crate::ensure_eq!(test.next_frame()?.ack(), 101);

    test.deliver(segment(101).ack(2))?;
    crate::ensure_eq!(test.state(), Some(State::TimeWait));
    crate::ensure_eq!(test.frame_count(), 0);
    Ok(())
}

/// Closing with unread data resets the connection.
#[test]
fn test_close_with_unread_data() -> Result<()> {
    let mut test: Test = Test::default();
    let id = test.accept(99)?;
    test.deliver(segment(100).ack(1).data(&payload(8)))?;

    test.peer.close(id)?;
    let rst: Frame = test.next_frame()?;
    crate::ensure_eq!(rst.hdr.rst, true);
    crate::ensure_eq!(rst.seq(), 1);
    crate::ensure_eq!(rst.ack(), 108);
    crate::ensure_eq!(test.state(), None);
    crate::ensure_eq!(test.counters.resets(), 1);
    Ok(())
}

/// Once the application consumed everything, close sends a FIN.
#[test]
fn test_close_after_recved() -> Result<()> {
    let mut test: Test = Test::default();
    let id = test.accept(99)?;
    test.deliver(segment(100).ack(1).data(&payload(8)))?;
    test.peer.recved(id, 8)?;

    test.peer.close(id)?;
    let fin: Frame = test.next_frame()?;
    crate::ensure_eq!(fin.hdr.fin, true);
    crate::ensure_eq!(fin.ack(), 108);
    crate::ensure_eq!(test.frame_count(), 0);
    crate::ensure_eq!(test.state(), Some(State::FinWait1));
    Ok(())
}

/// A FIN queued behind unsent data rides on the last data segment.
#[test]
fn test_fin_merged_into_data() -> Result<()> {
    let mut test: Test = Test::default();
    let id = test.accept(99)?;
    test.peer.send(id, &payload(2000))?;
    test.clear_frames();

    test.peer.close(id)?;
    crate::ensure_eq!(test.frame_count(), 0);
    crate::ensure_eq!(
        test.cb()?.unsent_ranges().last().copied(),
        Some((SeqNumber::from(1609), SeqNumber::from(2002)))
    );
    Ok(())
}

/// Data arriving after the application closed aborts the connection.
#[test]
fn test_data_after_close() -> Result<()> {
    let mut test: Test = Test::default();
    let id = test.accept(99)?;
    test.peer.close(id)?;
    test.next_frame()?;

    test.deliver(segment(100).ack(2).data(&payload(8)))?;
    let rst: Frame = test.next_frame()?;
    crate::ensure_eq!(rst.hdr.rst, true);
    crate::ensure_eq!(rst.seq(), 2);
    crate::ensure_eq!(rst.ack(), 108);
    crate::ensure_eq!(test.state(), None);
    crate::ensure_eq!(test.events.borrow().errors, vec![ECONNABORTED]);
    crate::ensure_eq!(test.events.borrow().received.is_empty(), true);
    Ok(())
}

/// Only a RST inside the receive window resets the connection.
#[test]
fn test_reset_by_peer() -> Result<()> {
    let mut test: Test = Test::default();
    test.accept(99)?;

    test.deliver(segment(100 + 5000).rst())?;
    crate::ensure_eq!(test.state(), Some(State::Established));
    crate::ensure_eq!(test.frame_count(), 0);

    test.deliver(segment(150).rst())?;
    crate::ensure_eq!(test.state(), None);
    crate::ensure_eq!(test.events.borrow().errors, vec![ECONNRESET]);
    crate::ensure_eq!(test.frame_count(), 0);
    Ok(())
}

/// Tests abort on active and TIME_WAIT connections.
#[test]
fn test_abort() -> Result<()> {
    let mut test: Test = Test::default();
    let id = test.accept(99)?;

    test.peer.abort(id)?;
    crate::ensure_eq!(test.state(), None);
    crate::ensure_eq!(test.events.borrow().errors, vec![ECONNABORTED]);
    crate::ensure_eq!(test.frame_count(), 0);
    match test.peer.abort(id) {
        Err(e) => crate::ensure_eq!(e.errno, ENOTCONN),
        Ok(()) => anyhow::bail!("abort of a missing connection should fail"),
    }

    let id = test.accept(499)?;
    test.peer.close(id)?;
    test.deliver(segment(500).ack(2).fin())?;
    crate::ensure_eq!(test.state(), Some(State::TimeWait));
    test.peer.abort(id)?;
    crate::ensure_eq!(test.state(), None);
    crate::ensure_eq!(test.peer.time_wait_count(), 0);
    Ok(())
}

/// Closing before the SYN is answered drops the connection quietly.
#[test]
fn test_close_in_syn_sent() -> Result<()> {
    let mut test: Test = Test::default();
    let handler = test.handler();
    let id = test.peer.connect(local(), remote(), handler)?;
    test.clear_frames();

    test.peer.close(id)?;
    crate::ensure_eq!(test.state(), None);
    crate::ensure_eq!(test.frame_count(), 0);
    crate::ensure_eq!(test.events.borrow().errors.is_empty(), true);
    Ok(())
}

/// Once closing, further closes do nothing and sends fail.
#[test]
fn test_close_twice() -> Result<()> {
    let mut test: Test = Test::default();
    let id = test.accept(99)?;
    test.peer.close(id)?;
    test.next_frame()?;

    test.peer.close(id)?;
    crate::ensure_eq!(test.frame_count(), 0);
    crate::ensure_eq!(test.state(), Some(State::FinWait1));
    match test.peer.send(id, &payload(10)) {
        Err(e) => crate::ensure_eq!(e.errno, EINVAL),
        Ok(()) => anyhow::bail!("send after close should fail"),
    }
    Ok(())
}
