//! CONNECT / CONNACK encode and decode (MQTT 3.1.1 §3.1, §3.2).

use super::{Reader, Writer};
use crate::error::Error;

const PROTOCOL_NAME: &str = "MQTT";
const PROTOCOL_LEVEL: u8 = 4;

/// Maximum client-id length in bytes, per MQTT 3.1.1 §3.1.3.1.
pub const MAX_CLIENT_ID_LEN: usize = 23;

/// A last-will specification attached to a CONNECT packet.
#[derive(Debug, Clone, Copy)]
pub struct Will<'a> {
    pub topic: &'a str,
    pub payload: &'a [u8],
    pub qos: super::QoS,
    pub retain: bool,
}

/// Everything needed to encode a CONNECT packet.
#[derive(Debug, Clone, Copy)]
pub struct ConnectFields<'a> {
    pub client_id: &'a str,
    pub clean_session: bool,
    pub keep_alive_s: u16,
    pub will: Option<Will<'a>>,
    pub username: Option<&'a str>,
    pub password: Option<&'a [u8]>,
}

/// Encode a CONNECT packet into `buf`. Returns the number of bytes written.
pub fn encode(buf: &mut [u8], fields: &ConnectFields) -> Result<usize, Error> {
    if fields.client_id.len() > MAX_CLIENT_ID_LEN {
        return Err(Error::InvalidArg);
    }
    if fields.will.is_none() && fields.username.is_none() && fields.password.is_some() {
        // password without username is not expressible on the wire; caller error.
        return Err(Error::InvalidArg);
    }

    // Variable header + payload are computed twice: once to size the
    // remaining-length field, once to actually place bytes. Encode into a
    // scratch cursor starting right after where the fixed header will land
    // (it's at most 5 bytes), then shift down once the true length is known.
    let mut flags = 0u8;
    if fields.username.is_some() {
        flags |= 0x80;
    }
    if fields.password.is_some() {
        flags |= 0x40;
    }
    if let Some(will) = &fields.will {
        if will.retain {
            flags |= 0x20;
        }
        flags |= (will.qos as u8) << 3;
        flags |= 0x04;
    }
    if fields.clean_session {
        flags |= 0x02;
    }

    // Encode variable header + payload at a fixed offset (5 bytes, the
    // maximum fixed header size), then splice the real fixed header in front.
    const MAX_FIXED_HEADER: usize = 5;
    if buf.len() < MAX_FIXED_HEADER {
        return Err(Error::InvalidBufSize);
    }
    let mut body = Writer::new(&mut buf[MAX_FIXED_HEADER..]);
    body.put_str(PROTOCOL_NAME)?;
    body.put_u8(PROTOCOL_LEVEL)?;
    body.put_u8(flags)?;
    body.put_u16(fields.keep_alive_s)?;
    body.put_str(fields.client_id)?;
    if let Some(will) = &fields.will {
        body.put_str(will.topic)?;
        body.put_u16(will.payload.len() as u16)?;
        body.put_bytes(will.payload)?;
    }
    if let Some(username) = fields.username {
        body.put_str(username)?;
    }
    if let Some(password) = fields.password {
        body.put_u16(password.len() as u16)?;
        body.put_bytes(password)?;
    }
    let body_len = body.len();

    let mut header_scratch = [0u8; MAX_FIXED_HEADER];
    let mut hw = Writer::new(&mut header_scratch);
    hw.put_fixed_header(0x10, body_len)?;
    let header_len = hw.len();

    let total = header_len + body_len;
    if buf.len() < total {
        return Err(Error::InvalidBufSize);
    }
    buf.copy_within(MAX_FIXED_HEADER..MAX_FIXED_HEADER + body_len, header_len);
    buf[..header_len].copy_from_slice(&header_scratch[..header_len]);
    Ok(total)
}

/// Decoded CONNACK contents (MQTT 3.1.1 §3.2.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAck {
    pub session_present: bool,
    pub return_code: u8,
}

/// Decode a two-byte CONNACK variable header (the fixed header has already
/// been stripped off by the caller).
pub fn decode_connack(body: &[u8]) -> Result<ConnAck, Error> {
    let mut r = Reader::new(body);
    let ack_flags = r.get_u8()?;
    let return_code = r.get_u8()?;
    Ok(ConnAck {
        session_present: ack_flags & 0x01 != 0,
        return_code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::QoS;

    #[test]
    fn encode_minimal_connect() {
        let mut buf = [0u8; 64];
        let fields = ConnectFields {
            client_id: "c1",
            clean_session: true,
            keep_alive_s: 60,
            will: None,
            username: None,
            password: None,
        };
        let n = encode(&mut buf, &fields).unwrap();
        let expected_remaining = 10 + 2 + 2; // variable header + 2-byte-prefixed client id
        assert_eq!(buf[0], 0x10);
        assert_eq!(buf[1], expected_remaining as u8);
        assert_eq!(&buf[2..6], b"\x00\x04MQTT");
        assert_eq!(buf[6], 4);
        assert_eq!(buf[7], 0x02);
        assert_eq!(&buf[8..10], &60u16.to_be_bytes());
        assert_eq!(&buf[10..12], &2u16.to_be_bytes());
        assert_eq!(&buf[12..14], b"c1");
        assert_eq!(n, 14);
    }

    #[test]
    fn encode_with_will_and_credentials() {
        let mut buf = [0u8; 128];
        let fields = ConnectFields {
            client_id: "c2",
            clean_session: false,
            keep_alive_s: 30,
            will: Some(Will {
                topic: "lwt",
                payload: b"bye",
                qos: QoS::AtLeastOnce,
                retain: true,
            }),
            username: Some("u"),
            password: Some(b"p"),
        };
        let n = encode(&mut buf, &fields).unwrap();
        assert_eq!(buf[0], 0x10);
        // connect flags: user(0x80)|pass(0x40)|will_retain(0x20)|will_qos=1<<3(0x08)|will(0x04)
        assert_eq!(buf[9], 0x80 | 0x40 | 0x20 | 0x08 | 0x04);
        assert!(n > 14);
    }

    #[test]
    fn rejects_oversized_client_id() {
        let mut buf = [0u8; 64];
        let fields = ConnectFields {
            client_id: "12345678901234567890123456",
            clean_session: true,
            keep_alive_s: 60,
            will: None,
            username: None,
            password: None,
        };
        assert_eq!(encode(&mut buf, &fields), Err(Error::InvalidArg));
    }

    #[test]
    fn decode_connack_accepted() {
        let ack = decode_connack(&[0x00, 0x00]).unwrap();
        assert_eq!(ack.return_code, 0);
        assert!(!ack.session_present);
    }

    #[test]
    fn decode_connack_session_present() {
        let ack = decode_connack(&[0x01, 0x00]).unwrap();
        assert!(ack.session_present);
    }
}
