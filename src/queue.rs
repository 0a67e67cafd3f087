//! Submission queue (spec.md §4.3): the FIFO application threads deposit
//! requests into, drained one entry per reactor iteration.

use crate::connection::ConnHandle;
use crate::message::MsgHandle;

/// One entry in the submission queue.
///
/// A regular message carries everything the reactor needs to interpret it
/// (it was already fully encoded and given `state = MustTx` by the request
/// function that created it) without consulting the producer again. The
/// synthetic `Close` variant asks the reactor to tear a connection down
/// regardless of anything still in flight (spec.md §4.3); unlike the
/// original client's `ReqClose`, which hands the reactor a caller-allocated
/// binary semaphore to post on completion, `Client::conn_close` here blocks
/// by polling the connection list rather than via a borrowed semaphore
/// trait object — see `SPEC_FULL.md` §D for why.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Msg { conn: ConnHandle, msg: MsgHandle },
    Close { conn: ConnHandle },
}

impl Request {
    pub fn conn(&self) -> ConnHandle {
        match self {
            Request::Msg { conn, .. } => *conn,
            Request::Close { conn, .. } => *conn,
        }
    }
}
