//! Common error type for the MQTT client.

/// Every fallible operation in this crate returns one of these kinds.
///
/// The set mirrors the failure surface of the underlying protocol engine:
/// synchronous argument/buffer validation, transport-level failures, and
/// protocol-level anomalies that are reported through a completion callback
/// rather than a return value.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// No error; used as the "success" value handed to callbacks.
    None,
    /// An operation was attempted before [`crate::client::Client::init`].
    NotInit,
    /// A required pointer/handle/slot was missing.
    NullPtr,
    /// An argument was out of range or otherwise invalid.
    InvalidArg,
    /// The caller-supplied buffer was too small for the encoded packet.
    InvalidBufSize,
    /// A decode or copy would have written past the end of a buffer.
    BufOverflow,
    /// A fixed-capacity table (connections, in-flight messages) is full.
    Alloc,
    /// The scheduling/synchronisation facade reported a failure.
    OsFail,
    /// The transport reported a failure opening or configuring a socket.
    SockFail,
    /// A transmit operation failed.
    Tx,
    /// A receive operation failed.
    Rx,
    /// A receive was attempted but no data was queued (not a failure).
    RxBufEmpty,
    /// An operation did not complete within its allotted time.
    Timeout,
    /// The transport reported an unrecoverable failure; the connection is closed.
    Fatal,
    /// CONNACK carried a non-zero return code.
    ConnackFail,
    /// An inbound packet did not match any expectation on the connection.
    UnexpectedMsg,
    /// SUBACK granted a lower QoS than requested for at least one filter.
    QosNotGranted,
    /// The connection was closed while the message was still in flight.
    ConnClosed,
    /// A generic, otherwise-unclassified failure.
    Fail,
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::None => defmt::write!(f, "None"),
            Error::NotInit => defmt::write!(f, "NotInit"),
            Error::NullPtr => defmt::write!(f, "NullPtr"),
            Error::InvalidArg => defmt::write!(f, "InvalidArg"),
            Error::InvalidBufSize => defmt::write!(f, "InvalidBufSize"),
            Error::BufOverflow => defmt::write!(f, "BufOverflow"),
            Error::Alloc => defmt::write!(f, "Alloc"),
            Error::OsFail => defmt::write!(f, "OsFail"),
            Error::SockFail => defmt::write!(f, "SockFail"),
            Error::Tx => defmt::write!(f, "Tx"),
            Error::Rx => defmt::write!(f, "Rx"),
            Error::RxBufEmpty => defmt::write!(f, "RxBufEmpty"),
            Error::Timeout => defmt::write!(f, "Timeout"),
            Error::Fatal => defmt::write!(f, "Fatal"),
            Error::ConnackFail => defmt::write!(f, "ConnackFail"),
            Error::UnexpectedMsg => defmt::write!(f, "UnexpectedMsg"),
            Error::QosNotGranted => defmt::write!(f, "QosNotGranted"),
            Error::ConnClosed => defmt::write!(f, "ConnClosed"),
            Error::Fail => defmt::write!(f, "Fail"),
        }
    }
}
