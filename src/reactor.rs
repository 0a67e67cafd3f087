//! Single-task I/O reactor (spec.md §4.6): one iteration composes a select
//! set from every open connection's interest flags, services whichever
//! connections came back ready (error, then readable, then writable), and
//! drains one submission-queue entry.
//!
//! Readable is serviced before writable so a reply a readable pass stages
//! (PUBACK/PUBREC/PUBCOMP via `state_machine::stage_reply`) goes out in the
//! same iteration instead of waiting for the next `select`.
//!
//! `no_std` applications drive this directly via
//! [`crate::client::Client::reactor_step`] from their own task loop; the
//! `std` feature additionally offers [`crate::client::Client::run_background`]
//! to spin a dedicated thread doing the same thing (spec.md §5's "single
//! dedicated worker task", realised as a real OS thread when one is
//! available).

use crate::connection::{Connection, ConnHandle};
use crate::error::Error;
use crate::limits::{MAX_CONNECTIONS, PACKET_ID_WORDS};
use crate::message::MsgSlab;
use crate::packet_id::PacketIdAllocator;
use crate::queue::Request;
use crate::state_machine;
use crate::transport::{Handle, SelectOutcome, Transport};
use heapless::{Deque, Vec};

/// How long a [`Transport::select`] call may block when there is nothing
/// else to do; bounds how promptly a newly-submitted request is noticed by
/// a cooperative `no_std` caller that isn't using `select_abort`.
pub const SELECT_TIMEOUT_MS: u32 = 100;

/// Drain at most one submission-queue entry and service every open
/// connection once. Returns `Ok(())` on a normal iteration; a connection
/// that hits a fatal transport error, a completed DISCONNECT, or an
/// app-requested close is torn down internally and does not abort the
/// iteration for its siblings. A protocol-level anomaly (decoded inside
/// [`state_machine::service_readable`]) is not fatal and leaves the
/// connection open.
pub fn step<T: Transport, A: Copy>(
    transport: &mut T,
    connections: &mut [Option<Connection<A>>; MAX_CONNECTIONS],
    conn_list: &mut Vec<ConnHandle, MAX_CONNECTIONS>,
    slab: &mut MsgSlab,
    pkt_ids: &PacketIdAllocator<PACKET_ID_WORDS>,
    submit_queue: &mut Deque<Request, { crate::limits::SUBMIT_QUEUE_CAP }>,
    now_ms: u32,
) -> Result<(), Error> {
    drain_submission_queue(connections, conn_list, slab, submit_queue);

    let mut read_set: Vec<Handle, MAX_CONNECTIONS> = Vec::new();
    let mut write_set: Vec<Handle, MAX_CONNECTIONS> = Vec::new();
    let mut err_set: Vec<Handle, MAX_CONNECTIONS> = Vec::new();
    for &ch in conn_list.iter() {
        if let Some(conn) = connections[ch.0 as usize].as_ref() {
            if let Some(handle) = conn.handle {
                if conn.interest.read {
                    let _ = read_set.push(handle);
                }
                if conn.interest.write {
                    let _ = write_set.push(handle);
                }
                let _ = err_set.push(handle);
            }
        }
    }

    let ready = if read_set.is_empty() && write_set.is_empty() && err_set.is_empty() {
        None
    } else {
        match transport.select(&read_set, &write_set, &err_set, SELECT_TIMEOUT_MS) {
            Ok(SelectOutcome::Ready(set)) => Some(set),
            Ok(SelectOutcome::Timeout) => None,
            Err(_) => None,
        }
    };

    let mut closed = Vec::<ConnHandle, MAX_CONNECTIONS>::new();
    for &ch in conn_list.iter() {
        let Some(conn) = connections[ch.0 as usize].as_mut() else { continue };
        let Some(handle) = conn.handle else { continue };

        if conn.close_requested {
            state_machine::teardown(transport, ch, conn, slab, pkt_ids, Error::ConnClosed);
            let _ = closed.push(ch);
            continue;
        }

        let readiness = ready.as_ref().map(|r| r.is_ready(handle)).unwrap_or_default();
        if readiness.error {
            // Only a genuine transport failure tears the connection down;
            // the app-facing error callback reports it uniformly as a
            // socket failure (spec.md §8 scenario 5), and in-flight
            // messages complete with `ConnClosed` regardless, inside
            // `teardown` itself.
            state_machine::teardown(transport, ch, conn, slab, pkt_ids, Error::SockFail);
            let _ = closed.push(ch);
            continue;
        }

        if readiness.read && state_machine::service_readable(transport, ch, conn, slab, pkt_ids).is_err() {
            state_machine::teardown(transport, ch, conn, slab, pkt_ids, Error::SockFail);
            let _ = closed.push(ch);
            continue;
        }

        // Re-check `interest.write` rather than the stale `readiness.write`
        // computed before this iteration's read: a reply the read pass just
        // staged (PUBACK/PUBREC/PUBCOMP) sets it fresh, and a non-blocking
        // write attempt is always safe to make regardless of what the
        // select set reported.
        if conn.interest.write {
            match state_machine::service_writable(transport, ch, conn, slab, pkt_ids, now_ms) {
                Ok(true) => {
                    // DISCONNECT completed and tore the connection down
                    // (spec.md §4.5): it has already left the reactor's
                    // socket bookkeeping, just drop it from `conn_list`.
                    let _ = closed.push(ch);
                }
                Ok(false) => {}
                Err(_) => {
                    state_machine::teardown(transport, ch, conn, slab, pkt_ids, Error::SockFail);
                    let _ = closed.push(ch);
                }
            }
        }
    }

    for ch in closed {
        conn_list.retain(|&c| c != ch);
    }

    Ok(())
}

fn drain_submission_queue<A: Copy>(
    connections: &mut [Option<Connection<A>>; MAX_CONNECTIONS],
    conn_list: &mut Vec<ConnHandle, MAX_CONNECTIONS>,
    slab: &MsgSlab,
    submit_queue: &mut Deque<Request, { crate::limits::SUBMIT_QUEUE_CAP }>,
) {
    let Some(request) = submit_queue.pop_front() else { return };
    match request {
        Request::Msg { conn, msg } => {
            let is_connect = slab.get(msg).map(|m| m.kind == crate::message::MsgKind::Connect).unwrap_or(false);
            if let Some(connection) = connections[conn.0 as usize].as_mut() {
                if is_connect && !conn_list.contains(&conn) {
                    let _ = conn_list.push(conn);
                }
                let _ = connection.tx_queue.push_back(msg);
                connection.interest.write = true;
            }
        }
        Request::Close { conn } => {
            if let Some(connection) = connections[conn.0 as usize].as_mut() {
                if connection.handle.is_some() {
                    connection.close_requested = true;
                }
            }
        }
    }
}
