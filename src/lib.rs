//! An embedded MQTT 3.1.1 client for resource-constrained devices.
//!
//! The client is built around a single-task I/O reactor (spec.md §4.6): an
//! application thread calls a request function (`connect`, `publish`,
//! `subscribe`, ...), which validates its arguments, encodes the packet,
//! and hands it to a bounded submission queue; a reactor, driven either
//! cooperatively via [`client::Client::reactor_step`] or on a background
//! thread via [`client::Client::run_background`] (`std` feature only),
//! drains that queue and services every open connection's non-blocking
//! transport readiness. Completions and inbound publishes are delivered
//! through plain function-pointer callbacks (spec.md §4.7), since this
//! crate has no executor to hand futures to.
//!
//! This crate never opens a socket itself: an application supplies a
//! concrete [`transport::Transport`] implementation (raw TCP, TLS, a
//! simulated loopback for tests).
//!
//! ## Optional Features
//!
//! - `std`: enables [`client::Client::run_background`] and
//!   [`os::StdDelay`] (default: disabled, `no_std`).
//! - `defmt`: implements [`defmt::Format`] for [`error::Error`] and the
//!   `heapless` collections this crate uses.

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![warn(missing_debug_implementations)]
#![doc(html_root_url = "https://docs.rs/mqtt-embedded")]

/// Common error type shared by every fallible operation in this crate.
pub mod error;

/// MQTT 3.1.1 wire codec: fixed header, remaining-length varint, and the
/// per-packet-type encoders/decoders.
pub mod codec;

/// Packet-identifier allocator shared by every connection.
pub mod packet_id;

/// The unit of work the protocol state machine drives: an in-flight
/// message plus its fixed-capacity slab.
pub mod message;

/// Fixed capacities sizing every table in this crate.
pub mod limits;

/// The abstract non-blocking transport contract the reactor is written
/// against.
pub mod transport;

/// Callback dispatcher: function-pointer slots a connection carries for
/// completions and inbound publishes.
pub mod callback;

/// One TCP/TLS session to one broker.
pub mod connection;

/// The application-facing submission queue.
pub mod queue;

/// The protocol state machine driving transmit/acknowledgement phases.
pub mod state_machine;

/// The single-task I/O reactor.
pub mod reactor;

/// OS / scheduling facade (millisecond delay).
pub mod os;

/// The application-facing entry point: connection lifecycle, the request
/// functions, and the reactor drivers.
pub mod client;

pub use client::Client;
pub use connection::{ConnHandle, Param, Will};
pub use codec::QoS;
pub use error::Error;
pub use message::MsgHandle;
