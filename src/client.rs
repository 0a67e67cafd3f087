//! The application-facing entry point (spec.md §6): connection lifecycle,
//! the six request functions, and the reactor drivers.
//!
//! Everything the reactor touches (transport, connections, message slab,
//! submission queue) lives behind one [`critical_section::Mutex`], the way
//! [`crate::packet_id::PacketIdAllocator`] guards its bitmap — a single
//! fine-grained lock, not one per table (spec.md §5). Request functions take
//! the lock just long enough to encode a packet, insert it into the slab,
//! and push a [`Request`]; [`Client::reactor_step`] takes it for one full
//! iteration.

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::{Deque, Vec};

use crate::codec::{ack::header_byte, connect, publish, subscribe, QoS};
use crate::connection::{Connection, ConnHandle, Param, Will};
use crate::error::Error;
use crate::limits::{MAX_CONNECTIONS, MAX_PACKET_LEN, PACKET_ID_WORDS, SUBMIT_QUEUE_CAP};
use crate::message::{Message, MsgHandle, MsgKind, MsgSlab, State};
use crate::packet_id::PacketIdAllocator;
use crate::queue::Request;
use crate::reactor;
use crate::transport::Transport;

struct Inner<T: Transport, A: Copy> {
    transport: T,
    connections: [Option<Connection<A>>; MAX_CONNECTIONS],
    conn_list: Vec<ConnHandle, MAX_CONNECTIONS>,
    slab: MsgSlab,
    submit_queue: Deque<Request, SUBMIT_QUEUE_CAP>,
}

/// The MQTT client: one transport, up to [`MAX_CONNECTIONS`] broker
/// sessions, and the reactor state that drives them.
///
/// `A` is an opaque, `Copy` application context value handed back to every
/// callback unchanged (spec.md §4.7), the way the teacher's connection
/// callbacks carry a user-supplied argument.
pub struct Client<T: Transport, A: Copy + Default> {
    inner: Mutex<RefCell<Inner<T, A>>>,
    pkt_ids: PacketIdAllocator<PACKET_ID_WORDS>,
}

impl<T: Transport, A: Copy + Default> Client<T, A> {
    /// Construct the client around a concrete transport (spec.md §6 `init`).
    ///
    /// Unlike the original client's global singleton initialised once at
    /// boot, this is an ordinary constructor: nothing stops an application
    /// from holding more than one `Client` if it has more than one transport.
    pub fn new(transport: T) -> Self {
        Client {
            inner: Mutex::new(RefCell::new(Inner {
                transport,
                connections: [const { None }; MAX_CONNECTIONS],
                conn_list: Vec::new(),
                slab: MsgSlab::new(),
                submit_queue: Deque::new(),
            })),
            pkt_ids: PacketIdAllocator::new(crate::limits::MAX_IN_FLIGHT as u16),
        }
    }

    /// Allocate a fresh, unconfigured connection slot.
    pub fn conn_alloc(&self) -> Result<ConnHandle, Error> {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            for (i, slot) in inner.connections.iter_mut().enumerate() {
                if slot.is_none() {
                    *slot = Some(Connection::new());
                    return Ok(ConnHandle(i as u8));
                }
            }
            Err(Error::Alloc)
        })
    }

    /// Reset a connection slot to its pristine, unconfigured state. Fails if
    /// the connection is still open; call [`Client::conn_close`] first.
    pub fn conn_clear(&self, conn: ConnHandle) -> Result<(), Error> {
        self.with_conn(conn, |c| {
            if c.is_open() {
                return Err(Error::InvalidArg);
            }
            c.clear();
            Ok(())
        })
    }

    /// Set one configuration parameter on a connection (spec.md §6).
    pub fn conn_set_param(&self, conn: ConnHandle, param: Param) -> Result<(), Error> {
        self.with_conn(conn, |c| c.set_param(param))
    }

    /// Register the callback slots a connection dispatches completions and
    /// inbound publishes through (spec.md §4.7).
    pub fn conn_set_callbacks(&self, conn: ConnHandle, callbacks: crate::callback::Callbacks<A>) -> Result<(), Error> {
        self.with_conn(conn, |c| {
            c.set_callbacks(callbacks);
            Ok(())
        })
    }

    /// Diagnostic counters for a connection (`SPEC_FULL.md` §E.2).
    pub fn conn_stats(&self, conn: ConnHandle) -> Result<crate::connection::ConnectionStats, Error> {
        self.with_conn(conn, |c| Ok(c.stats()))
    }

    /// Low-level escape hatch onto the underlying transport, mainly useful
    /// for driving a simulated loopback transport from test code (feeding it
    /// scripted inbound bytes, inspecting what was sent, injecting a fatal
    /// error).
    pub fn with_transport<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            f(&mut inner.transport)
        })
    }

    fn with_conn<R>(&self, conn: ConnHandle, f: impl FnOnce(&mut Connection<A>) -> Result<R, Error>) -> Result<R, Error> {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            let slot = inner.connections.get_mut(conn.0 as usize).ok_or(Error::InvalidArg)?;
            let c = slot.as_mut().ok_or(Error::InvalidArg)?;
            f(c)
        })
    }

    /// Open the underlying socket for a configured connection (spec.md §6
    /// `conn_open`), synchronously: DNS/TCP/TLS handshake happen inline,
    /// bounded by the connection's `open_timeout_ms`. This is distinct from
    /// [`Client::connect`], which queues the CONNECT packet over an already
    /// open socket.
    pub fn conn_open(&self, conn: ConnHandle) -> Result<(), Error> {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            let inner = &mut *inner;
            let c = inner
                .connections
                .get_mut(conn.0 as usize)
                .and_then(|s| s.as_mut())
                .ok_or(Error::InvalidArg)?;
            if c.is_open() {
                return Err(Error::InvalidArg);
            }
            let handle = inner
                .transport
                .open(&c.host, c.port, c.tls.as_ref(), c.open_timeout_ms)
                .map_err(|_| Error::SockFail)?;
            inner
                .transport
                .configure(handle, true, Some(c.inactivity_timeout_s))
                .map_err(|_| Error::SockFail)?;
            c.handle = Some(handle);
            c.interest.read = true;
            Ok(())
        })
    }

    /// Request a connection be torn down (spec.md §6 `conn_close`).
    ///
    /// Enqueues a [`Request::Close`] and then polls until the reactor has
    /// processed it — driving the reactor itself (`now_ms` is passed through
    /// to each iteration unchanged, since the wait itself does not need to
    /// measure elapsed time), or, under the `std` feature, sleeping while
    /// [`Client::run_background`]'s thread drives it instead. A connection
    /// that was never opened completes immediately.
    pub fn conn_close(&self, conn: ConnHandle, now_ms: u32) -> Result<(), Error> {
        let already_closed = critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            let c = inner
                .connections
                .get_mut(conn.0 as usize)
                .and_then(|s| s.as_mut())
                .ok_or(Error::InvalidArg)?;
            Ok::<bool, Error>(!c.is_open())
        })?;
        if already_closed {
            return Ok(());
        }

        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            inner.submit_queue.push_back(Request::Close { conn }).map_err(|_| Error::Alloc)
        })?;

        loop {
            let still_open = self.step_locked(now_ms);
            if !still_open.contains(&conn) {
                return Ok(());
            }
            #[cfg(feature = "std")]
            crate::os::StdDelay::delay_ms(1);
        }
    }

    /// Drive exactly one reactor iteration under the lock, returning the
    /// connection list afterwards so callers can check membership.
    fn step_locked(&self, now_ms: u32) -> Vec<ConnHandle, MAX_CONNECTIONS> {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            let inner = &mut *inner;
            let _ = reactor::step(
                &mut inner.transport,
                &mut inner.connections,
                &mut inner.conn_list,
                &mut inner.slab,
                &self.pkt_ids,
                &mut inner.submit_queue,
                now_ms,
            );
            inner.conn_list.clone()
        })
    }

    /// Run one reactor iteration. `no_std` applications call this from their
    /// own task loop with their own millisecond clock (spec.md §5); it is
    /// also what [`Client::conn_close`]'s wait loop and
    /// [`Client::run_background`]'s thread call internally.
    pub fn reactor_step(&self, now_ms: u32) {
        let _ = self.step_locked(now_ms);
    }

    /// Queue a CONNECT packet over an already-open connection (spec.md §6).
    pub fn connect(&self, conn: ConnHandle) -> Result<MsgHandle, Error> {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            let inner = &mut *inner;
            let c = inner
                .connections
                .get(conn.0 as usize)
                .and_then(|s| s.as_ref())
                .ok_or(Error::InvalidArg)?;
            if !c.is_open() {
                return Err(Error::InvalidArg);
            }

            let will_fields = c.will.as_ref().map(|w| connect::Will {
                topic: w.topic.as_str(),
                payload: w.payload.as_slice(),
                qos: w.qos,
                retain: w.retain,
            });
            let fields = connect::ConnectFields {
                client_id: &c.client_id,
                clean_session: c.clean_session,
                keep_alive_s: c.keep_alive_s,
                will: will_fields,
                username: c.username.as_deref(),
                password: c.password.as_deref(),
            };

            let mut msg = Message::new();
            msg.kind = MsgKind::Connect;
            msg.qos = QoS::AtMostOnce;
            msg.buf.resize(MAX_PACKET_LEN, 0).map_err(|_| Error::Alloc)?;
            let n = connect::encode(&mut msg.buf, &fields)?;
            msg.buf.truncate(n);
            msg.xfer_len = n;
            msg.state = State::MustTx;

            enqueue(inner, conn, msg)
        })
    }

    /// Queue a PUBLISH packet (spec.md §6). For QoS >= 1, allocates a packet
    /// identifier from the shared table.
    pub fn publish(&self, conn: ConnHandle, topic: &str, payload: &[u8], qos: QoS, retain: bool) -> Result<MsgHandle, Error> {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            let inner = &mut *inner;
            let c = inner
                .connections
                .get(conn.0 as usize)
                .and_then(|s| s.as_ref())
                .ok_or(Error::InvalidArg)?;
            if !c.is_open() {
                return Err(Error::InvalidArg);
            }

            let packet_id = if matches!(qos, QoS::AtLeastOnce | QoS::ExactlyOnce) {
                let id = self.pkt_ids.acquire();
                if id == crate::packet_id::INVALID {
                    return Err(Error::Alloc);
                }
                Some(id)
            } else {
                None
            };

            let fields = publish::PublishFields {
                topic,
                packet_id,
                payload,
                qos,
                retain,
                dup: false,
            };

            let mut msg = Message::new();
            msg.kind = MsgKind::Publish;
            msg.qos = qos;
            msg.packet_id = packet_id;
            msg.buf.resize(MAX_PACKET_LEN, 0).map_err(|_| Error::Alloc)?;
            let n = match publish::encode(&mut msg.buf, &fields) {
                Ok(n) => n,
                Err(e) => {
                    if let Some(id) = packet_id {
                        self.pkt_ids.release(id);
                    }
                    return Err(e);
                }
            };
            msg.buf.truncate(n);
            msg.xfer_len = n;
            msg.state = State::MustTx;

            enqueue(inner, conn, msg)
        })
    }

    /// Queue a SUBSCRIBE packet for a single topic filter (spec.md §6).
    pub fn subscribe(&self, conn: ConnHandle, topic: &str, qos: QoS) -> Result<MsgHandle, Error> {
        self.subscribe_mult(conn, &[subscribe::Filter { topic, qos }])
    }

    /// Queue a SUBSCRIBE packet carrying more than one topic filter.
    pub fn subscribe_mult(&self, conn: ConnHandle, filters: &[subscribe::Filter]) -> Result<MsgHandle, Error> {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            let inner = &mut *inner;
            let c = inner
                .connections
                .get(conn.0 as usize)
                .and_then(|s| s.as_ref())
                .ok_or(Error::InvalidArg)?;
            if !c.is_open() {
                return Err(Error::InvalidArg);
            }
            let Some(requested_qos) = filters.first().map(|f| f.qos) else {
                return Err(Error::InvalidArg);
            };

            let id = self.pkt_ids.acquire();
            if id == crate::packet_id::INVALID {
                return Err(Error::Alloc);
            }

            let mut msg = Message::new();
            msg.kind = MsgKind::Subscribe;
            msg.qos = requested_qos;
            msg.packet_id = Some(id);
            msg.buf.resize(MAX_PACKET_LEN, 0).map_err(|_| Error::Alloc)?;
            let n = match subscribe::encode_subscribe(&mut msg.buf, id, filters) {
                Ok(n) => n,
                Err(e) => {
                    self.pkt_ids.release(id);
                    return Err(e);
                }
            };
            msg.buf.truncate(n);
            msg.xfer_len = n;
            msg.state = State::MustTx;

            enqueue(inner, conn, msg)
        })
    }

    /// Queue an UNSUBSCRIBE packet for a single topic filter.
    pub fn unsubscribe(&self, conn: ConnHandle, topic: &str) -> Result<MsgHandle, Error> {
        self.unsubscribe_mult(conn, &[topic])
    }

    /// Queue an UNSUBSCRIBE packet carrying more than one topic filter.
    pub fn unsubscribe_mult(&self, conn: ConnHandle, topics: &[&str]) -> Result<MsgHandle, Error> {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            let inner = &mut *inner;
            let c = inner
                .connections
                .get(conn.0 as usize)
                .and_then(|s| s.as_ref())
                .ok_or(Error::InvalidArg)?;
            if !c.is_open() {
                return Err(Error::InvalidArg);
            }

            let id = self.pkt_ids.acquire();
            if id == crate::packet_id::INVALID {
                return Err(Error::Alloc);
            }

            let mut msg = Message::new();
            msg.kind = MsgKind::Unsubscribe;
            msg.packet_id = Some(id);
            msg.buf.resize(MAX_PACKET_LEN, 0).map_err(|_| Error::Alloc)?;
            let n = match subscribe::encode_unsubscribe(&mut msg.buf, id, topics) {
                Ok(n) => n,
                Err(e) => {
                    self.pkt_ids.release(id);
                    return Err(e);
                }
            };
            msg.buf.truncate(n);
            msg.xfer_len = n;
            msg.state = State::MustTx;

            enqueue(inner, conn, msg)
        })
    }

    /// Queue a PINGREQ (spec.md §6). Never sent automatically — callers are
    /// responsible for their own keep-alive schedule, e.g. by consulting
    /// [`Connection::ms_until_ping_due`](crate::connection::Connection::ms_until_ping_due).
    pub fn ping(&self, conn: ConnHandle) -> Result<MsgHandle, Error> {
        self.queue_header_only(conn, MsgKind::Pingreq, header_byte::PINGREQ)
    }

    /// Queue a DISCONNECT (spec.md §6, §4.5). Once written, its completion
    /// callback fires and the connection is torn down in the same step as
    /// any other teardown: the socket is closed, every message still behind
    /// it in the transmit queue fails with [`Error::ConnClosed`], and the
    /// connection is dropped from the reactor's connection list — there is
    /// no separate [`Client::conn_close`] call to make afterwards.
    pub fn disconnect(&self, conn: ConnHandle) -> Result<MsgHandle, Error> {
        self.queue_header_only(conn, MsgKind::Disconnect, header_byte::DISCONNECT)
    }

    fn queue_header_only(&self, conn: ConnHandle, kind: MsgKind, type_and_flags: u8) -> Result<MsgHandle, Error> {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            let inner = &mut *inner;
            let c = inner
                .connections
                .get(conn.0 as usize)
                .and_then(|s| s.as_ref())
                .ok_or(Error::InvalidArg)?;
            if !c.is_open() {
                return Err(Error::InvalidArg);
            }

            let mut msg = Message::new();
            msg.kind = kind;
            msg.buf.resize(2, 0).map_err(|_| Error::Alloc)?;
            let n = crate::codec::ack::encode_header_only(&mut msg.buf, type_and_flags)?;
            msg.buf.truncate(n);
            msg.xfer_len = n;
            msg.state = State::MustTx;

            enqueue(inner, conn, msg)
        })
    }
}

/// Build a last-will spec owned by the connection, from borrowed fields
/// (spec.md §6 `Param::Will`).
pub fn will(topic: &str, payload: &[u8], qos: QoS, retain: bool) -> Result<Will, Error> {
    Ok(Will {
        topic: heapless::String::try_from(topic).map_err(|_| Error::InvalidArg)?,
        payload: heapless::Vec::from_slice(payload).map_err(|_| Error::InvalidArg)?,
        qos,
        retain,
    })
}

fn enqueue<T: Transport, A: Copy>(inner: &mut Inner<T, A>, conn: ConnHandle, msg: Message) -> Result<MsgHandle, Error> {
    let handle = inner.slab.insert(msg)?;
    inner
        .submit_queue
        .push_back(Request::Msg { conn, msg: handle })
        .map_err(|_| {
            inner.slab.remove(handle);
            Error::Alloc
        })?;
    Ok(handle)
}

#[cfg(feature = "std")]
impl<T: Transport + Send + 'static, A: Copy + Default + Send + 'static> Client<T, A> {
    /// Spawn a background thread that drives [`Client::reactor_step`] in a
    /// loop, timestamping each iteration from `std::time::Instant` (spec.md
    /// §5's "single dedicated worker task", realised as a real OS thread).
    /// Requires `Client` behind an `Arc` since the thread outlives this call.
    pub fn run_background(self: std::sync::Arc<Self>, idle_delay_ms: u32) -> std::thread::JoinHandle<()> {
        let start = std::time::Instant::now();
        std::thread::spawn(move || loop {
            let now_ms = start.elapsed().as_millis() as u32;
            self.reactor_step(now_ms);
            crate::os::StdDelay::delay_ms(idle_delay_ms);
        })
    }
}
