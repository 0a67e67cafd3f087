//! Transport facade: the abstract non-blocking socket contract the reactor
//! drives (spec.md §4.4). No concrete TCP/TLS/DNS implementation ships here
//! — that is an explicit non-goal (spec.md §1) — only the trait the reactor
//! programs against and the small value types it exchanges.

use crate::error::Error;
use crate::limits::MAX_CONNECTIONS;
use heapless::Vec;

/// An opaque handle to an open transport connection.
///
/// Handles are small `Copy` indices assigned by the [`Transport`]
/// implementation; this crate never interprets their value, only compares
/// and stores them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handle(pub u32);

/// Opaque TLS configuration. The core treats this as a blob to hand to the
/// transport's `open`; it never inspects it (spec.md §1, §3).
#[derive(Debug, Clone, Copy)]
pub struct TlsConfig {
    /// Implementation-defined configuration token (e.g. an index into an
    /// application-owned table of certificate bundles).
    pub opaque_token: u32,
}

/// Why a transport operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// The operation would have blocked; try again later. `recv`'s
    /// `WouldBlock` means "no data queued", distinguishable from a genuine
    /// failure by virtue of being a distinct variant.
    WouldBlock,
    /// Unrecoverable: the connection must be torn down.
    Fatal,
}

/// The three interest/ready flags a connection can have outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interest {
    pub read: bool,
    pub write: bool,
    pub error: bool,
}

impl Interest {
    pub const NONE: Interest = Interest { read: false, write: false, error: false };

    pub fn any(&self) -> bool {
        self.read || self.write || self.error
    }
}

/// The set of handles a [`Transport::select`] call found ready, bucketed by
/// which interest fired. Bounded by [`MAX_CONNECTIONS`] since the reactor
/// never watches more handles than it has connections.
#[derive(Default)]
pub struct ReadySet {
    pub readable: Vec<Handle, MAX_CONNECTIONS>,
    pub writable: Vec<Handle, MAX_CONNECTIONS>,
    pub errored: Vec<Handle, MAX_CONNECTIONS>,
}

impl ReadySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self, handle: Handle) -> Interest {
        Interest {
            read: self.readable.contains(&handle),
            write: self.writable.contains(&handle),
            error: self.errored.contains(&handle),
        }
    }
}

/// Outcome of a [`Transport::select`] call.
pub enum SelectOutcome {
    Ready(ReadySet),
    Timeout,
}

/// The abstract non-blocking transport contract the reactor is written
/// against. An application wires up a concrete implementation (raw TCP,
/// TLS, a simulated loopback for tests) and hands it to
/// [`crate::client::Client::new`].
pub trait Transport {
    /// Open a connection to `host:port`, performing DNS resolution, the TCP
    /// handshake, and an optional TLS handshake synchronously, bounded by
    /// `timeout_ms`.
    fn open(&mut self, host: &str, port: u16, tls: Option<&TlsConfig>, timeout_ms: u32) -> Result<Handle, Error>;

    /// Configure non-blocking mode (always on), `TCP_NODELAY`, and the
    /// keep-alive idle timer.
    fn configure(&mut self, handle: Handle, nodelay: bool, keepalive_idle_s: Option<u32>) -> Result<(), Error>;

    /// Close and release a handle. Never fails from the caller's perspective;
    /// the transport is responsible for reclaiming its own resources.
    fn close(&mut self, handle: Handle);

    /// Non-blocking send. Returns the number of bytes accepted, which may be
    /// less than `buf.len()`.
    fn send(&mut self, handle: Handle, buf: &[u8]) -> Result<usize, TransportError>;

    /// Non-blocking receive. `WouldBlock` means no data is queued right now,
    /// distinct from a fatal error.
    fn recv(&mut self, handle: Handle, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Block for up to `timeout_ms` waiting for any of `read`/`write`/`err`
    /// handles to become ready.
    fn select(
        &mut self,
        read: &[Handle],
        write: &[Handle],
        err: &[Handle],
        timeout_ms: u32,
    ) -> Result<SelectOutcome, TransportError>;

    /// Wake a blocked `select` call so a newly-interesting handle is
    /// considered without waiting out the timeout.
    fn select_abort(&mut self, handle: Handle);
}
