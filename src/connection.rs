//! One TCP/TLS session to one broker (spec.md §3).

use crate::callback::Callbacks;
use crate::codec::{PacketType, QoS, RemainingLengthDecoder};
use crate::error::Error;
use crate::limits::{
    CONN_TX_QUEUE_CAP, MAX_ACK_BODY_LEN, MAX_CLIENT_ID_LEN, MAX_CREDENTIAL_LEN, MAX_HOST_LEN, MAX_PACKET_LEN,
    MAX_WILL_LEN, RX_PREFIX_LEN,
};
use crate::message::{Message, MsgHandle, MsgKind, State};
use crate::transport::{Handle, Interest, TlsConfig};
use heapless::{Deque, String, Vec};

/// Index of a [`Connection`] inside [`crate::client::Client`]'s connection table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnHandle(pub(crate) u8);

/// A last-will specification, owned so it outlives the triggering `connect` call.
#[derive(Clone)]
pub struct Will {
    pub topic: String<MAX_WILL_LEN>,
    pub payload: Vec<u8, MAX_WILL_LEN>,
    pub qos: QoS,
    pub retain: bool,
}

/// Recognised parameters for [`Connection::set_param`] (spec.md §6).
pub enum Param<'a> {
    Host(&'a str),
    Port(u16),
    InactivityTimeoutS(u32),
    ClientId(&'a str),
    Username(&'a str),
    Password(&'a [u8]),
    KeepAliveS(u16),
    Will(Will),
    Tls(TlsConfig),
    OpenTimeoutMs(u32),
}

/// Which message the in-progress inbound parse is being directed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseTarget {
    /// The connection's dedicated receive-message slot (an inbound PUBLISH).
    RecvMsg,
    /// The head of the transmit queue (an ack for our own outbound request).
    TxQueueHead,
}

/// An in-progress inbound packet header: the receive side of the connection's
/// "next-message parse state" (spec.md §3).
#[derive(Default)]
pub struct ParseState {
    pub first_byte: Option<u8>,
    pub kind: Option<MsgKind>,
    pub remaining_len_decoder: RemainingLengthDecoder,
    pub remaining_len: Option<usize>,
    pub packet_id_bytes: Vec<u8, 2>,
    pub packet_id: Option<u16>,
    pub bytes_received: usize,
    pub target: Option<ParseTarget>,
    /// Staging buffer for a non-PUBLISH inbound body (the `TxQueueHead`
    /// target); PUBLISH bodies are staged directly in the connection's
    /// `recv_msg.buf` instead (spec.md §9 "Shared-buffer offset trick").
    pub ack_body: Vec<u8, MAX_ACK_BODY_LEN>,
}

impl ParseState {
    pub fn reset(&mut self) {
        self.first_byte = None;
        self.kind = None;
        self.remaining_len_decoder = RemainingLengthDecoder::new();
        self.remaining_len = None;
        self.packet_id_bytes.clear();
        self.packet_id = None;
        self.bytes_received = 0;
        self.target = None;
        self.ack_body.clear();
    }
}

/// Diagnostic counters updated by the reactor as it services a connection
/// (spec.md original-source supplement, `SPEC_FULL.md` §E.2).
#[derive(Debug, Default, Clone, Copy)]
pub struct ConnectionStats {
    pub tx_packets: u32,
    pub rx_packets: u32,
    pub tx_bytes: u32,
    pub rx_bytes: u32,
}

/// One TCP/TLS session to one broker.
pub struct Connection<A: Copy> {
    pub(crate) handle: Option<Handle>,
    pub(crate) interest: Interest,
    pub(crate) host: String<MAX_HOST_LEN>,
    pub(crate) port: u16,
    pub(crate) inactivity_timeout_s: u32,
    pub(crate) client_id: String<MAX_CLIENT_ID_LEN>,
    pub(crate) username: Option<String<MAX_CREDENTIAL_LEN>>,
    pub(crate) password: Option<Vec<u8, MAX_CREDENTIAL_LEN>>,
    pub(crate) keep_alive_s: u16,
    pub(crate) will: Option<Will>,
    pub(crate) tls: Option<TlsConfig>,
    pub(crate) callbacks: Callbacks<A>,
    pub(crate) user_arg: A,
    pub(crate) open_timeout_ms: u32,
    pub(crate) recv_msg: Message,
    pub(crate) tx_queue: Deque<MsgHandle, CONN_TX_QUEUE_CAP>,
    pub(crate) tx_progress: usize,
    pub(crate) parse: ParseState,
    pub(crate) stats: ConnectionStats,
    pub(crate) last_tx_activity_ms: u32,
    pub(crate) clean_session: bool,
    pub(crate) session_present: bool,
    /// Packet id of the inbound QoS 2 PUBLISH most recently PUBRECed, used to
    /// validate the broker's matching PUBREL (spec.md §4.5 inbound QoS 2).
    pub(crate) pending_qos2_id: Option<u16>,
    /// Topic + payload bytes of that same PUBLISH, held until PUBREL arrives
    /// so the publish-received callback fires exactly once, after PUBREL
    /// (spec.md §8 property 6) rather than at initial PUBLISH receipt.
    pub(crate) pending_qos2_body: Vec<u8, MAX_PACKET_LEN>,
    /// Byte offset within `pending_qos2_body` where the topic name ends and
    /// the payload begins.
    pub(crate) pending_qos2_topic_len: usize,
    /// Set by the submission queue's `ReqClose` handling; the reactor tears
    /// the connection down on its next iteration regardless of any pending
    /// in-flight transmit/receive (spec.md §4.3).
    pub(crate) close_requested: bool,
}

impl<A: Copy + Default> Connection<A> {
    pub fn new() -> Self {
        let mut recv_msg = Message::new();
        recv_msg.kind = MsgKind::Publish;
        recv_msg.state = State::WaitRx;
        Connection {
            handle: None,
            interest: Interest::NONE,
            host: String::new(),
            port: 1883,
            inactivity_timeout_s: 0,
            client_id: String::new(),
            username: None,
            password: None,
            keep_alive_s: 60,
            will: None,
            tls: None,
            callbacks: Callbacks::none(),
            user_arg: A::default(),
            open_timeout_ms: 5_000,
            recv_msg,
            tx_queue: Deque::new(),
            tx_progress: 0,
            parse: ParseState::default(),
            stats: ConnectionStats::default(),
            last_tx_activity_ms: 0,
            clean_session: true,
            session_present: false,
            pending_qos2_id: None,
            pending_qos2_body: Vec::new(),
            pending_qos2_topic_len: 0,
            close_requested: false,
        }
    }

    /// Reset a connection to its pristine, unconfigured state.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Reset the transient, open-connection state after a close or fatal
    /// error, while preserving the caller's configured parameters
    /// (host/port/credentials/callbacks/will) so the application can
    /// `conn_open` the same [`ConnHandle`] again without reconfiguring it.
    pub fn reset_session(&mut self) {
        self.handle = None;
        self.interest = Interest::NONE;
        self.recv_msg = Message::new();
        self.recv_msg.kind = MsgKind::Publish;
        self.recv_msg.state = State::WaitRx;
        self.tx_queue.clear();
        self.tx_progress = 0;
        self.parse.reset();
        self.last_tx_activity_ms = 0;
        self.session_present = false;
        self.pending_qos2_id = None;
        self.pending_qos2_body.clear();
        self.pending_qos2_topic_len = 0;
        self.close_requested = false;
    }

    pub fn set_param(&mut self, param: Param) -> Result<(), Error> {
        match param {
            Param::Host(h) => self.host = String::try_from(h).map_err(|_| Error::InvalidArg)?,
            Param::Port(p) => self.port = p,
            Param::InactivityTimeoutS(t) => self.inactivity_timeout_s = t,
            Param::ClientId(id) => {
                if id.len() > MAX_CLIENT_ID_LEN {
                    return Err(Error::InvalidArg);
                }
                self.client_id = String::try_from(id).map_err(|_| Error::InvalidArg)?;
            }
            Param::Username(u) => {
                self.username = Some(String::try_from(u).map_err(|_| Error::InvalidArg)?);
            }
            Param::Password(p) => {
                self.password = Some(Vec::from_slice(p).map_err(|_| Error::InvalidArg)?);
            }
            Param::KeepAliveS(k) => self.keep_alive_s = k,
            Param::Will(w) => self.will = Some(w),
            Param::Tls(t) => self.tls = Some(t),
            Param::OpenTimeoutMs(ms) => self.open_timeout_ms = ms,
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Register the callback slots this connection dispatches completions
    /// and inbound publishes through (spec.md §4.7).
    pub fn set_callbacks(&mut self, callbacks: Callbacks<A>) {
        self.callbacks = callbacks;
    }

    /// Milliseconds until a keep-alive PINGREQ should be sent, given `now_ms`
    /// and the timestamp of the connection's last transmit activity. Returns
    /// `None` if keep-alive is disabled (`keep_alive_s == 0`). This is a
    /// scheduling hint only: spec.md requires PINGREQ to be transmitted on
    /// explicit application request, never automatically (`SPEC_FULL.md` §E.1).
    pub fn ms_until_ping_due(&self, now_ms: u32) -> Option<u32> {
        if self.keep_alive_s == 0 {
            return None;
        }
        let interval_ms = (self.keep_alive_s as u32).saturating_mul(1000);
        let elapsed = now_ms.wrapping_sub(self.last_tx_activity_ms);
        Some(interval_ms.saturating_sub(elapsed))
    }

    pub fn stats(&self) -> ConnectionStats {
        self.stats
    }
}

impl<A: Copy + Default> Default for Connection<A> {
    fn default() -> Self {
        Self::new()
    }
}

/// Buffer capacity a receive-message must have: the 4-byte reply prefix plus
/// the largest packet the application expects to receive (spec.md §9).
pub const fn required_recv_capacity(max_expected_packet_len: usize) -> usize {
    RX_PREFIX_LEN + max_expected_packet_len
}

const _: () = assert!(MAX_PACKET_LEN > RX_PREFIX_LEN);

/// Map a fixed-header type nibble (ignoring flags) back to a [`MsgKind`],
/// used when attributing inbound bytes to a parse target (spec.md §4.5).
pub fn msg_kind_from_packet_type(pt: PacketType) -> MsgKind {
    match pt {
        PacketType::Connect => MsgKind::Connect,
        PacketType::Connack => MsgKind::Connack,
        PacketType::Publish => MsgKind::Publish,
        PacketType::Puback => MsgKind::Puback,
        PacketType::Pubrec => MsgKind::Pubrec,
        PacketType::Pubrel => MsgKind::Pubrel,
        PacketType::Pubcomp => MsgKind::Pubcomp,
        PacketType::Subscribe => MsgKind::Subscribe,
        PacketType::Suback => MsgKind::Suback,
        PacketType::Unsubscribe => MsgKind::Unsubscribe,
        PacketType::Unsuback => MsgKind::Unsuback,
        PacketType::Pingreq => MsgKind::Pingreq,
        PacketType::Pingresp => MsgKind::Pingresp,
        PacketType::Disconnect => MsgKind::Disconnect,
    }
}
