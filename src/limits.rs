//! Fixed capacities sizing every table in this crate.
//!
//! The client is meant for resource-constrained devices: rather than thread
//! const generics through every struct, capacities are tuned here, the way
//! the original C client tuned `#define`s. Raise these if your application
//! needs more concurrent connections or in-flight messages than the
//! defaults allow; `PACKET_ID_WORDS` must stay `ceil(MAX_IN_FLIGHT / 32)`.

/// Maximum number of simultaneous broker connections.
pub const MAX_CONNECTIONS: usize = 4;

/// Maximum number of concurrently in-flight messages (sizes the packet-id
/// bitmap and, transitively, the message slab).
pub const MAX_IN_FLIGHT: usize = 16;

/// `ceil(MAX_IN_FLIGHT / 32)`, the packet-id bitmap's word count.
pub const PACKET_ID_WORDS: usize = (MAX_IN_FLIGHT + 31) / 32;

/// Maximum encoded size of one packet (fixed header + variable header +
/// payload), including the 4-byte publish-receive prefix (spec §4.5/§9).
pub const MAX_PACKET_LEN: usize = 512;

/// Reserved at the front of the receive-message buffer so a PUBACK/PUBREC
/// reply can be re-encoded in place without growing the buffer (spec §4.5,
/// §9 "Shared-buffer offset trick").
pub const RX_PREFIX_LEN: usize = 4;

/// Depth of the application-facing submission queue (spec §4.3).
pub const SUBMIT_QUEUE_CAP: usize = MAX_IN_FLIGHT + MAX_CONNECTIONS;

/// Depth of a single connection's transmit queue: bounded by the number of
/// in-flight messages, since every queued message holds a packet-id slot
/// (QoS 0 publishes excepted, which still occupy a transmit-queue slot).
pub const CONN_TX_QUEUE_CAP: usize = MAX_IN_FLIGHT;

/// Maximum client-identifier length (MQTT 3.1.1 §3.1.3.1).
pub const MAX_CLIENT_ID_LEN: usize = 23;

/// Maximum broker hostname length this client will store.
pub const MAX_HOST_LEN: usize = 128;

/// Maximum stored username/password length.
pub const MAX_CREDENTIAL_LEN: usize = 128;

/// Maximum stored will topic/payload length.
pub const MAX_WILL_LEN: usize = 128;

/// Maximum body size of a non-PUBLISH inbound packet (CONNACK, PUBACK,
/// PUBREC, PUBCOMP, SUBACK, UNSUBACK, PINGRESP). Bounds the number of filters
/// a single SUBSCRIBE/UNSUBSCRIBE call may carry, since SUBACK's body is two
/// bytes plus one return code per filter.
pub const MAX_ACK_BODY_LEN: usize = 64;
