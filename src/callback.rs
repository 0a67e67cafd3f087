//! Callback dispatcher (spec.md §4.7, §9 "Callback dispatch").
//!
//! A [`Connection`](crate::connection::Connection) carries one function
//! pointer per completion event plus a catch-all, the way the design note
//! models: "an interface object carrying one method per event plus a
//! catch-all". Completion hands a message to [`dispatch_completion`], which
//! selects the typed callback by the message's logical operation, frees its
//! packet id, detaches it from the connection's transmit queue, then invokes
//! first the generic callback (if registered) and then the operation-specific
//! one.

use crate::connection::ConnHandle;
use crate::error::Error;
use crate::message::MsgHandle;

/// Completion callback signature: `(conn, msg, user_arg, err)`.
pub type CompletionFn<A> = fn(ConnHandle, MsgHandle, A, Error);

/// Publish-received callback signature: `(conn, topic, payload, user_arg, err)`.
///
/// `topic` is not null-terminated; its `len()` is authoritative. The slices
/// borrow the client's receive buffer and must not be retained past return.
pub type PublishRxFn<A> = fn(ConnHandle, &str, &[u8], A, Error);

/// Connection-level error callback signature: `(conn, user_arg, err)`.
pub type ErrorFn<A> = fn(ConnHandle, A, Error);

/// The callback slots carried by one [`Connection`](crate::connection::Connection).
///
/// All ten are optional; an application registers only the ones it needs.
#[derive(Clone, Copy)]
pub struct Callbacks<A: Copy> {
    pub generic: Option<CompletionFn<A>>,
    pub connect: Option<CompletionFn<A>>,
    pub publish: Option<CompletionFn<A>>,
    pub subscribe: Option<CompletionFn<A>>,
    pub unsubscribe: Option<CompletionFn<A>>,
    pub ping: Option<CompletionFn<A>>,
    pub disconnect: Option<CompletionFn<A>>,
    pub publish_rx: Option<PublishRxFn<A>>,
    pub error: Option<ErrorFn<A>>,
}

impl<A: Copy> Callbacks<A> {
    pub const fn none() -> Self {
        Callbacks {
            generic: None,
            connect: None,
            publish: None,
            subscribe: None,
            unsubscribe: None,
            ping: None,
            disconnect: None,
            publish_rx: None,
            error: None,
        }
    }

    /// Select the operation-specific slot for a message's logical operation.
    pub fn op_specific(&self, op: crate::message::MsgKind) -> Option<CompletionFn<A>> {
        use crate::message::MsgKind::*;
        match op {
            Connect => self.connect,
            Publish => self.publish,
            Subscribe => self.subscribe,
            Unsubscribe => self.unsubscribe,
            Pingreq => self.ping,
            Disconnect => self.disconnect,
            _ => None,
        }
    }
}

impl<A: Copy> Default for Callbacks<A> {
    fn default() -> Self {
        Self::none()
    }
}
