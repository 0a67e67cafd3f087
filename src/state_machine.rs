//! The protocol state machine (spec.md §4.5): drives each in-flight message
//! through transmit and acknowledgement phases, and decodes inbound bytes
//! into completions and publish-received callbacks.
//!
//! These are free functions over borrowed [`Connection`]/[`MsgSlab`] state
//! rather than methods, the way the teacher's `network::protocol` modules
//! separate "what the wire does" from "what owns the socket" — [`reactor`](crate::reactor)
//! calls into this module once per connection per I/O readiness event.

use crate::codec::ack::{self, header_byte};
use crate::codec::{publish, subscribe, connect, PacketType, QoS};
use crate::connection::{msg_kind_from_packet_type, Connection, ConnHandle, ParseTarget};
use crate::error::Error;
use crate::limits::{MAX_PACKET_LEN, PACKET_ID_WORDS, RX_PREFIX_LEN};
use crate::message::{Message, MsgHandle, MsgKind, MsgSlab, State};
use crate::packet_id::PacketIdAllocator;
use crate::transport::{Handle, Transport, TransportError};

/// Advance one connection's outbound side by one non-blocking write.
///
/// Services, in priority order: a pending inbound-publish reply staged in
/// `conn.recv_msg`, then the head of the transmit queue. Only one of the two
/// is ever in flight at a time, so both share `conn.tx_progress`.
///
/// Returns `Ok(true)` if a DISCONNECT just completed: per spec.md §4.5 a
/// completed DISCONNECT also tears the connection down (socket closed, every
/// message still queued behind it failed with `ConnClosed`), so the caller
/// must drop `conn_handle` from its connection list and must not service it
/// any further this iteration.
pub fn service_writable<T: Transport, A: Copy>(
    transport: &mut T,
    conn_handle: ConnHandle,
    conn: &mut Connection<A>,
    slab: &mut MsgSlab,
    pkt_ids: &PacketIdAllocator<PACKET_ID_WORDS>,
    now_ms: u32,
) -> Result<bool, Error> {
    let handle = conn.handle.ok_or(Error::NullPtr)?;

    if conn.recv_msg.state == State::MustTx {
        let done = write_bytes(transport, handle, &conn.recv_msg.buf, &mut conn.tx_progress, &mut conn.stats)?;
        if done {
            conn.recv_msg = Message::new();
            conn.recv_msg.kind = MsgKind::Publish;
            conn.recv_msg.state = State::WaitRx;
            conn.last_tx_activity_ms = now_ms;
        }
        update_write_interest(conn, slab);
        return Ok(false);
    }

    let Some(&head) = conn.tx_queue.front() else {
        conn.interest.write = false;
        return Ok(false);
    };
    let Some(msg) = slab.get_mut(head) else {
        conn.tx_queue.pop_front();
        return Ok(false);
    };
    if msg.state != State::MustTx {
        return Ok(false);
    }
    let done = write_bytes(transport, handle, &msg.buf, &mut conn.tx_progress, &mut conn.stats)?;
    if !done {
        return Ok(false);
    }
    conn.last_tx_activity_ms = now_ms;
    let is_disconnect = msg.kind == MsgKind::Disconnect;

    match msg.kind {
        MsgKind::Publish if msg.qos == QoS::AtMostOnce => msg.state = State::Cmpl,
        MsgKind::Pingreq | MsgKind::Disconnect => msg.state = State::Cmpl,
        _ => msg.state = State::WaitRx,
    }

    if msg.state == State::Cmpl {
        conn.tx_queue.pop_front();
        complete(conn_handle, conn, slab, pkt_ids, head, Error::None);
        if is_disconnect {
            teardown(transport, conn_handle, conn, slab, pkt_ids, Error::ConnClosed);
            return Ok(true);
        }
    }
    update_write_interest(conn, slab);
    Ok(false)
}

fn update_write_interest<A: Copy>(conn: &mut Connection<A>, slab: &MsgSlab) {
    let reply_pending = conn.recv_msg.state == State::MustTx;
    let queue_pending = conn
        .tx_queue
        .front()
        .and_then(|h| slab.get(*h))
        .map(|m| m.state == State::MustTx)
        .unwrap_or(false);
    conn.interest.write = reply_pending || queue_pending;
}

/// Write as much of `bytes[*progress..]` as the transport accepts without
/// blocking. Returns `Ok(true)` once everything has been written.
fn write_bytes<T: Transport>(
    transport: &mut T,
    handle: Handle,
    bytes: &[u8],
    progress: &mut usize,
    stats: &mut crate::connection::ConnectionStats,
) -> Result<bool, Error> {
    while *progress < bytes.len() {
        match transport.send(handle, &bytes[*progress..]) {
            Ok(0) => break,
            Ok(n) => {
                *progress += n;
                stats.tx_bytes = stats.tx_bytes.saturating_add(n as u32);
            }
            Err(TransportError::WouldBlock) => break,
            Err(TransportError::Fatal) => return Err(Error::Fatal),
        }
    }
    let done = *progress >= bytes.len();
    if done {
        stats.tx_packets = stats.tx_packets.saturating_add(1);
        *progress = 0;
    }
    Ok(done)
}

/// Advance one connection's inbound side, consuming as many complete
/// packets as are already buffered by the transport without blocking.
pub fn service_readable<T: Transport, A: Copy>(
    transport: &mut T,
    conn_handle: ConnHandle,
    conn: &mut Connection<A>,
    slab: &mut MsgSlab,
    pkt_ids: &PacketIdAllocator<PACKET_ID_WORDS>,
) -> Result<(), Error> {
    let handle = conn.handle.ok_or(Error::NullPtr)?;

    loop {
        if conn.parse.first_byte.is_none() {
            let mut byte = [0u8; 1];
            match transport.recv(handle, &mut byte) {
                Ok(0) => return Ok(()),
                Err(TransportError::WouldBlock) => return Ok(()),
                Err(TransportError::Fatal) => return Err(Error::Fatal),
                Ok(_) => {
                    conn.stats.rx_bytes = conn.stats.rx_bytes.saturating_add(1);
                    // An unrecognised leading nibble is a protocol anomaly, not a
                    // transport failure (spec.md §4.5, §7): drop the byte and
                    // keep reading rather than tearing the connection down.
                    if let Some(pt) = PacketType::from_nibble(byte[0] >> 4) {
                        conn.parse.first_byte = Some(byte[0]);
                        conn.parse.kind = Some(msg_kind_from_packet_type(pt));
                    }
                }
            }
            continue;
        }

        if conn.parse.remaining_len.is_none() {
            let mut byte = [0u8; 1];
            match transport.recv(handle, &mut byte) {
                Ok(0) => return Ok(()),
                Err(TransportError::WouldBlock) => return Ok(()),
                Err(TransportError::Fatal) => return Err(Error::Fatal),
                Ok(_) => {
                    conn.stats.rx_bytes = conn.stats.rx_bytes.saturating_add(1);
                    if let Some(len) = conn.parse.remaining_len_decoder.push(byte[0])? {
                        conn.parse.remaining_len = Some(len);
                        let kind = conn.parse.kind.expect("set alongside first_byte");
                        let target = if kind == MsgKind::Publish { ParseTarget::RecvMsg } else { ParseTarget::TxQueueHead };
                        conn.parse.target = Some(target);
                        match target {
                            ParseTarget::RecvMsg => {
                                if len > MAX_PACKET_LEN - RX_PREFIX_LEN {
                                    return Err(Error::BufOverflow);
                                }
                                conn.recv_msg.buf.clear();
                                conn.recv_msg
                                    .buf
                                    .resize(RX_PREFIX_LEN + len, 0)
                                    .map_err(|_| Error::BufOverflow)?;
                            }
                            ParseTarget::TxQueueHead => {
                                conn.parse.ack_body.clear();
                                conn.parse.ack_body.resize(len, 0).map_err(|_| Error::BufOverflow)?;
                            }
                        }
                    }
                }
            }
            continue;
        }

        let remaining_len = conn.parse.remaining_len.expect("checked above");
        if conn.parse.bytes_received < remaining_len {
            let n = {
                let dest: &mut [u8] = match conn.parse.target.expect("set with remaining_len") {
                    ParseTarget::RecvMsg => &mut conn.recv_msg.buf[RX_PREFIX_LEN + conn.parse.bytes_received..],
                    ParseTarget::TxQueueHead => &mut conn.parse.ack_body[conn.parse.bytes_received..],
                };
                match transport.recv(handle, dest) {
                    Ok(0) => return Ok(()),
                    Err(TransportError::WouldBlock) => return Ok(()),
                    Err(TransportError::Fatal) => return Err(Error::Fatal),
                    Ok(n) => n,
                }
            };
            conn.parse.bytes_received += n;
            conn.stats.rx_bytes = conn.stats.rx_bytes.saturating_add(n as u32);
            if conn.parse.bytes_received < remaining_len {
                continue;
            }
        }

        conn.stats.rx_packets = conn.stats.rx_packets.saturating_add(1);
        let kind = conn.parse.kind.expect("set above");
        let flags = conn.parse.first_byte.expect("set above") & 0x0F;
        // A frame that matches neither the receive-message nor the
        // transmit-queue head (an unexpected packet type, or an ack whose
        // logical op/packet id doesn't match the queue head) is a
        // protocol-level anomaly: reset the parse state and keep going
        // rather than tearing the connection down (spec.md §4.5, §7). Only
        // a genuine transport failure propagates out of this function.
        match handle_complete_packet(conn_handle, conn, slab, pkt_ids, kind, flags) {
            Ok(()) | Err(Error::UnexpectedMsg) => {}
            Err(e) => return Err(e),
        }
        conn.parse.reset();
        update_write_interest(conn, slab);
    }
}

fn handle_complete_packet<A: Copy>(
    conn_handle: ConnHandle,
    conn: &mut Connection<A>,
    slab: &mut MsgSlab,
    pkt_ids: &PacketIdAllocator<PACKET_ID_WORDS>,
    kind: MsgKind,
    flags: u8,
) -> Result<(), Error> {
    match kind {
        MsgKind::Connack => {
            let ack = connect::decode_connack(&conn.parse.ack_body)?;
            conn.session_present = ack.session_present;
            let err = if ack.return_code == 0 { Error::None } else { Error::ConnackFail };
            complete_front(conn_handle, conn, slab, pkt_ids, MsgKind::Connect, None, err)
        }
        MsgKind::Puback | MsgKind::Pubcomp => {
            let id = ack::decode_packet_id(&conn.parse.ack_body)?;
            complete_front(conn_handle, conn, slab, pkt_ids, MsgKind::Publish, Some(id), Error::None)
        }
        MsgKind::Pubrec => {
            let id = ack::decode_packet_id(&conn.parse.ack_body)?;
            respond_pubrel(conn, slab, id)
        }
        MsgKind::Pubrel => {
            let id = ack::decode_packet_id(&conn.parse.ack_body)?;
            if conn.pending_qos2_id != Some(id) {
                return Err(Error::UnexpectedMsg);
            }
            conn.pending_qos2_id = None;
            // Deliver only now (spec.md §8 property 6: never before PUBREL).
            let topic_len = conn.pending_qos2_topic_len;
            let topic = core::str::from_utf8(&conn.pending_qos2_body[..topic_len]).map_err(|_| Error::InvalidArg)?;
            let payload = &conn.pending_qos2_body[topic_len..];
            if let Some(cb) = conn.callbacks.publish_rx {
                cb(conn_handle, topic, payload, conn.user_arg, Error::None);
            }
            conn.pending_qos2_body.clear();
            stage_reply(conn, header_byte::PUBCOMP, id)
        }
        MsgKind::Suback => {
            let ack = subscribe::decode_suback(&conn.parse.ack_body)?;
            let err = grant_error(ack.return_codes, conn, slab);
            complete_front(conn_handle, conn, slab, pkt_ids, MsgKind::Subscribe, Some(ack.packet_id), err)
        }
        MsgKind::Unsuback => {
            let id = subscribe::decode_unsuback(&conn.parse.ack_body)?;
            complete_front(conn_handle, conn, slab, pkt_ids, MsgKind::Unsubscribe, Some(id), Error::None)
        }
        MsgKind::Pingresp => complete_front(conn_handle, conn, slab, pkt_ids, MsgKind::Pingreq, None, Error::None),
        MsgKind::Publish => handle_inbound_publish(conn_handle, conn, flags),
        _ => Err(Error::UnexpectedMsg),
    }
}

fn grant_error<A: Copy>(return_codes: &[u8], conn: &Connection<A>, slab: &MsgSlab) -> Error {
    let requested: u8 = conn
        .tx_queue
        .front()
        .and_then(|h| slab.get(*h))
        .map(|m| m.qos as u8)
        .unwrap_or(0);
    for &code in return_codes {
        if code == 0x80 || code < requested {
            return Error::QosNotGranted;
        }
    }
    Error::None
}

/// Complete the message at the head of the transmit queue, verifying it is
/// the logical operation (and, where present, the packet id) we expected.
fn complete_front<A: Copy>(
    conn_handle: ConnHandle,
    conn: &mut Connection<A>,
    slab: &mut MsgSlab,
    pkt_ids: &PacketIdAllocator<PACKET_ID_WORDS>,
    expected_op: MsgKind,
    expected_id: Option<u16>,
    err: Error,
) -> Result<(), Error> {
    let Some(&head) = conn.tx_queue.front() else {
        return Err(Error::UnexpectedMsg);
    };
    let matches = {
        let Some(msg) = slab.get(head) else {
            return Err(Error::UnexpectedMsg);
        };
        msg.logical_op() == expected_op && (expected_id.is_none() || msg.packet_id == expected_id)
    };
    if !matches {
        return Err(Error::UnexpectedMsg);
    }
    conn.tx_queue.pop_front();
    complete(conn_handle, conn, slab, pkt_ids, head, err);
    Ok(())
}

fn respond_pubrel<A: Copy>(conn: &mut Connection<A>, slab: &mut MsgSlab, id: u16) -> Result<(), Error> {
    let Some(&head) = conn.tx_queue.front() else {
        return Err(Error::UnexpectedMsg);
    };
    let Some(msg) = slab.get_mut(head) else {
        return Err(Error::UnexpectedMsg);
    };
    if msg.logical_op() != MsgKind::Publish || msg.packet_id != Some(id) {
        return Err(Error::UnexpectedMsg);
    }
    msg.kind = MsgKind::Pubrel;
    msg.buf.clear();
    msg.buf.resize(4, 0).map_err(|_| Error::BufOverflow)?;
    let n = ack::encode_packet_id_only(&mut msg.buf, header_byte::PUBREL, id)?;
    msg.xfer_len = n;
    msg.state = State::MustTx;
    conn.interest.write = true;
    Ok(())
}

/// Stage a fixed-shape ack reply (PUBACK/PUBREC/PUBCOMP) into the
/// connection's reserved reply prefix, ready for the next writable event.
fn stage_reply<A: Copy>(conn: &mut Connection<A>, type_and_flags: u8, id: u16) -> Result<(), Error> {
    conn.recv_msg.buf.clear();
    conn.recv_msg.buf.resize(4, 0).map_err(|_| Error::BufOverflow)?;
    let n = ack::encode_packet_id_only(&mut conn.recv_msg.buf, type_and_flags, id)?;
    conn.recv_msg.xfer_len = n;
    conn.recv_msg.state = State::MustTx;
    conn.interest.write = true;
    Ok(())
}

fn handle_inbound_publish<A: Copy>(conn_handle: ConnHandle, conn: &mut Connection<A>, flags: u8) -> Result<(), Error> {
    // Copied out rather than borrowed: the QoS >= 1 branches below need to
    // stage a reply back into `recv_msg.buf`, which would otherwise conflict
    // with a live borrow of the inbound body.
    let body: heapless::Vec<u8, MAX_PACKET_LEN> =
        heapless::Vec::from_slice(&conn.recv_msg.buf[RX_PREFIX_LEN..]).expect("bounded by recv_msg capacity");
    let header = publish::decode_header(flags, &body)?;
    let topic = core::str::from_utf8(&body[header.topic_offset..header.topic_offset + header.topic_len])
        .map_err(|_| Error::InvalidArg)?;
    let payload = &body[header.payload_offset..];

    match header.qos {
        QoS::AtMostOnce => {
            if let Some(cb) = conn.callbacks.publish_rx {
                cb(conn_handle, topic, payload, conn.user_arg, Error::None);
            }
            conn.recv_msg = Message::new();
            conn.recv_msg.kind = MsgKind::Publish;
            conn.recv_msg.state = State::WaitRx;
            Ok(())
        }
        QoS::AtLeastOnce => {
            if let Some(cb) = conn.callbacks.publish_rx {
                cb(conn_handle, topic, payload, conn.user_arg, Error::None);
            }
            let id = header.packet_id.ok_or(Error::InvalidArg)?;
            stage_reply(conn, header_byte::PUBACK, id)
        }
        QoS::ExactlyOnce => {
            // Held until PUBREL arrives (spec.md §8 property 6): delivery
            // must never precede it. `topic` then `payload` are restored by
            // concatenation, since both borrow the same contiguous `body`.
            let id = header.packet_id.ok_or(Error::InvalidArg)?;
            conn.pending_qos2_id = Some(id);
            conn.pending_qos2_topic_len = topic.len();
            conn.pending_qos2_body.clear();
            conn.pending_qos2_body.extend_from_slice(topic.as_bytes()).map_err(|_| Error::BufOverflow)?;
            conn.pending_qos2_body.extend_from_slice(payload).map_err(|_| Error::BufOverflow)?;
            stage_reply(conn, header_byte::PUBREC, id)
        }
    }
}

/// Fire completion callbacks for `handle` and free its slot and packet id.
fn complete<A: Copy>(
    conn_handle: ConnHandle,
    conn: &mut Connection<A>,
    slab: &mut MsgSlab,
    pkt_ids: &PacketIdAllocator<PACKET_ID_WORDS>,
    handle: MsgHandle,
    err: Error,
) {
    let Some(msg) = slab.get_mut(handle) else { return };
    msg.state = State::Cmpl;
    msg.last_error = err;
    let op = msg.logical_op();
    if let Some(id) = msg.packet_id.take() {
        pkt_ids.release(id);
    }
    if let Some(cb) = conn.callbacks.generic {
        cb(conn_handle, handle, conn.user_arg, err);
    }
    if let Some(cb) = conn.callbacks.op_specific(op) {
        cb(conn_handle, handle, conn.user_arg, err);
    }
    slab.remove(handle);
}

/// Tear a connection down after a fatal transport error or an explicit
/// close request: every message still in the transmit queue completes with
/// [`Error::ConnClosed`] regardless of what triggered the teardown (spec.md
/// §8 property 8), the socket is closed, the connection-level error
/// callback fires with `conn_err` (the caller's own characterisation of why
/// the connection died — `SockFail` for a transport failure, `ConnClosed`
/// for an application-requested close), and the connection's transient
/// state resets (spec.md §9 "err_remove_conn_close_sock").
pub fn teardown<T: Transport, A: Copy>(
    transport: &mut T,
    conn_handle: ConnHandle,
    conn: &mut Connection<A>,
    slab: &mut MsgSlab,
    pkt_ids: &PacketIdAllocator<PACKET_ID_WORDS>,
    conn_err: Error,
) {
    if let Some(handle) = conn.handle {
        transport.close(handle);
    }
    while let Some(head) = conn.tx_queue.pop_front() {
        complete(conn_handle, conn, slab, pkt_ids, head, Error::ConnClosed);
    }
    if let Some(cb) = conn.callbacks.error {
        cb(conn_handle, conn.user_arg, conn_err);
    }
    conn.reset_session();
}
