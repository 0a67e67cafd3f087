//! Message: the unit of work the protocol state machine drives through its
//! transmit/acknowledgement phases (spec §3, §4.5).

use crate::codec::QoS;
use crate::error::Error;
use crate::limits::{MAX_IN_FLIGHT, MAX_PACKET_LEN};
use heapless::Vec;

/// Index of a [`Message`] inside [`crate::client::Client`]'s message table.
///
/// Connections and messages are allocated in stable, index-addressed slabs
/// rather than linked by raw pointers — this is the arena-plus-indices
/// translation of the design note in spec.md §9 ("Manual pointer graphs").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MsgHandle(pub(crate) u16);

/// Every MQTT 3.1.1 control packet type this client sends or receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgKind {
    Connect,
    Connack,
    Publish,
    Puback,
    Pubrec,
    Pubrel,
    Pubcomp,
    Subscribe,
    Suback,
    Unsubscribe,
    Unsuback,
    Pingreq,
    Pingresp,
    Disconnect,
}

/// A message's position in its transmit/acknowledgement lifecycle.
///
/// See spec.md §4.5 for the full transition table per packet type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Uninitialised or cleared.
    None,
    /// Bytes pending transmission.
    MustTx,
    /// All bytes written; the next transition depends on type/QoS.
    WaitTxCmpl,
    /// Awaiting a specific inbound packet type.
    WaitRx,
    /// Terminal: the completion callback has fired and the message is
    /// detached from its connection's transmit queue.
    Cmpl,
}

/// One in-flight MQTT operation, or the per-connection receive-message slot.
///
/// `buf` is the message's own fixed-capacity staging buffer: it holds the
/// encoded packet while transmitting, and — for the receive-message — is
/// reused in place to build the matching PUBACK/PUBREC reply without a copy
/// (see [`crate::connection::RX_PREFIX_LEN`]).
pub struct Message {
    pub kind: MsgKind,
    pub state: State,
    pub qos: QoS,
    pub packet_id: Option<u16>,
    pub buf: Vec<u8, MAX_PACKET_LEN>,
    /// For an outbound message: total encoded bytes to transmit. For an
    /// inbound wait: expected byte count of the awaited reply's body.
    pub xfer_len: usize,
    pub last_error: Error,
}

impl Message {
    pub const fn new() -> Self {
        Message {
            kind: MsgKind::Publish,
            state: State::None,
            qos: QoS::AtMostOnce,
            packet_id: None,
            buf: Vec::new(),
            xfer_len: 0,
            last_error: Error::None,
        }
    }

    /// Reset a message to its pristine state, for reuse from a slab slot.
    pub fn clear(&mut self) {
        self.kind = MsgKind::Publish;
        self.state = State::None;
        self.qos = QoS::AtMostOnce;
        self.packet_id = None;
        self.buf.clear();
        self.xfer_len = 0;
        self.last_error = Error::None;
    }

    /// The "logical operation" used to pick a completion callback (spec §4.7):
    /// CONNACK collapses to connect-completion, PUBACK/PUBCOMP to
    /// publish-completion, and so on.
    pub fn logical_op(&self) -> MsgKind {
        match self.kind {
            MsgKind::Connack => MsgKind::Connect,
            MsgKind::Puback | MsgKind::Pubrec | MsgKind::Pubrel | MsgKind::Pubcomp => MsgKind::Publish,
            MsgKind::Suback => MsgKind::Subscribe,
            MsgKind::Unsuback => MsgKind::Unsubscribe,
            MsgKind::Pingresp => MsgKind::Pingreq,
            other => other,
        }
    }
}

impl Default for Message {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-capacity slab of [`Message`]s, index-addressed by [`MsgHandle`].
///
/// Replaces the intrusive linked list of caller-owned message structs the
/// original client walks (spec.md §9 "Manual pointer graphs"): a request
/// function builds a `Message` on the stack, [`MsgSlab::insert`] moves it in
/// and hands back a stable handle, and the reactor frees the slot once the
/// message reaches [`State::Cmpl`] and its completion callback has fired.
pub struct MsgSlab {
    slots: [Option<Message>; MAX_IN_FLIGHT],
}

impl MsgSlab {
    pub const fn new() -> Self {
        MsgSlab { slots: [const { None }; MAX_IN_FLIGHT] }
    }

    pub fn insert(&mut self, msg: Message) -> Result<MsgHandle, Error> {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(msg);
                return Ok(MsgHandle(i as u16));
            }
        }
        Err(Error::Alloc)
    }

    pub fn get(&self, handle: MsgHandle) -> Option<&Message> {
        self.slots.get(handle.0 as usize).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, handle: MsgHandle) -> Option<&mut Message> {
        self.slots.get_mut(handle.0 as usize).and_then(|s| s.as_mut())
    }

    pub fn remove(&mut self, handle: MsgHandle) -> Option<Message> {
        self.slots.get_mut(handle.0 as usize).and_then(|s| s.take())
    }
}

impl Default for MsgSlab {
    fn default() -> Self {
        Self::new()
    }
}
