//! PUBLISH encode and decode (MQTT 3.1.1 §3.3).

use super::{validate_topic_name, QoS, Reader, Writer};
use crate::error::Error;

/// Fields needed to encode a PUBLISH packet.
#[derive(Debug, Clone, Copy)]
pub struct PublishFields<'a> {
    pub topic: &'a str,
    pub packet_id: Option<u16>,
    pub payload: &'a [u8],
    pub qos: QoS,
    pub retain: bool,
    pub dup: bool,
}

/// Encode a PUBLISH packet into `buf`, returning the number of bytes written.
pub fn encode(buf: &mut [u8], fields: &PublishFields) -> Result<usize, Error> {
    validate_topic_name(fields.topic)?;
    if matches!(fields.qos, QoS::AtLeastOnce | QoS::ExactlyOnce) != fields.packet_id.is_some() {
        return Err(Error::InvalidArg);
    }

    const MAX_FIXED_HEADER: usize = 5;
    if buf.len() < MAX_FIXED_HEADER {
        return Err(Error::InvalidBufSize);
    }
    let mut body = Writer::new(&mut buf[MAX_FIXED_HEADER..]);
    body.put_str(fields.topic)?;
    if let Some(id) = fields.packet_id {
        body.put_u16(id)?;
    }
    body.put_bytes(fields.payload)?;
    let body_len = body.len();

    let mut flags = 0x30u8;
    if fields.dup {
        flags |= 0x08;
    }
    flags |= (fields.qos as u8) << 1;
    if fields.retain {
        flags |= 0x01;
    }

    let mut header_scratch = [0u8; MAX_FIXED_HEADER];
    let mut hw = Writer::new(&mut header_scratch);
    hw.put_fixed_header(flags, body_len)?;
    let header_len = hw.len();

    let total = header_len + body_len;
    if buf.len() < total {
        return Err(Error::InvalidBufSize);
    }
    buf.copy_within(MAX_FIXED_HEADER..MAX_FIXED_HEADER + body_len, header_len);
    buf[..header_len].copy_from_slice(&header_scratch[..header_len]);
    Ok(total)
}

/// Decoded PUBLISH variable header: offsets into the original body slice so
/// callers can avoid copying the (potentially large) payload.
#[derive(Debug, Clone, Copy)]
pub struct PublishHeader {
    pub qos: QoS,
    pub dup: bool,
    pub retain: bool,
    pub packet_id: Option<u16>,
    /// Byte offset of the topic name within the body passed to [`decode_header`].
    pub topic_offset: usize,
    pub topic_len: usize,
    /// Byte offset of the payload within the body passed to [`decode_header`].
    pub payload_offset: usize,
}

/// Decode a PUBLISH fixed-header flags byte plus its variable header (topic
/// name and, for QoS >= 1, packet identifier). `body` is the buffer
/// immediately following the remaining-length field.
pub fn decode_header(flags: u8, body: &[u8]) -> Result<PublishHeader, Error> {
    let qos = QoS::from_bits(flags >> 1)?;
    let dup = flags & 0x08 != 0;
    let retain = flags & 0x01 != 0;

    let mut r = Reader::new(body);
    let topic = r.get_str()?;
    let topic_offset = 2; // length prefix
    let topic_len = topic.len();

    let packet_id = if matches!(qos, QoS::AtLeastOnce | QoS::ExactlyOnce) {
        Some(r.get_u16()?)
    } else {
        None
    };

    let payload_offset = topic_offset + topic_len + if packet_id.is_some() { 2 } else { 0 };

    Ok(PublishHeader {
        qos,
        dup,
        retain,
        packet_id,
        topic_offset,
        topic_len,
        payload_offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_1_qos0_publish_wire_bytes() {
        let mut buf = [0u8; 32];
        let fields = PublishFields {
            topic: "a/b",
            packet_id: None,
            payload: b"hello",
            qos: QoS::AtMostOnce,
            retain: false,
            dup: false,
        };
        let n = encode(&mut buf, &fields).unwrap();
        // Remaining length is the 10 body bytes that follow (2-byte topic
        // length prefix + 3-byte topic + 5-byte payload), i.e. 0x0A.
        assert_eq!(
            &buf[..n],
            &[0x30, 0x0A, 0x00, 0x03, 0x61, 0x2F, 0x62, 0x68, 0x65, 0x6C, 0x6C, 0x6F]
        );
    }

    #[test]
    fn scenario_2_qos1_publish_wire_bytes() {
        let mut buf = [0u8; 32];
        let fields = PublishFields {
            topic: "x",
            packet_id: Some(1),
            payload: b"y",
            qos: QoS::AtLeastOnce,
            retain: false,
            dup: false,
        };
        let n = encode(&mut buf, &fields).unwrap();
        assert_eq!(&buf[..n], &[0x32, 0x06, 0x00, 0x01, 0x78, 0x00, 0x01, 0x79]);
    }

    #[test]
    fn rejects_wildcard_topic() {
        let mut buf = [0u8; 32];
        let fields = PublishFields {
            topic: "a/#",
            packet_id: None,
            payload: b"x",
            qos: QoS::AtMostOnce,
            retain: false,
            dup: false,
        };
        assert_eq!(encode(&mut buf, &fields), Err(Error::InvalidArg));
    }

    #[test]
    fn rejects_missing_packet_id_for_qos1() {
        let mut buf = [0u8; 32];
        let fields = PublishFields {
            topic: "a",
            packet_id: None,
            payload: b"x",
            qos: QoS::AtLeastOnce,
            retain: false,
            dup: false,
        };
        assert_eq!(encode(&mut buf, &fields), Err(Error::InvalidArg));
    }

    #[test]
    fn decode_round_trip_qos2() {
        let mut buf = [0u8; 64];
        let fields = PublishFields {
            topic: "t",
            packet_id: Some(7),
            payload: b"Z",
            qos: QoS::ExactlyOnce,
            retain: false,
            dup: false,
        };
        let n = encode(&mut buf, &fields).unwrap();
        // fixed header is 2 bytes here (type+flags, remaining length)
        let body = &buf[2..n];
        let header = decode_header(buf[0], body).unwrap();
        assert_eq!(header.qos, QoS::ExactlyOnce);
        assert_eq!(header.packet_id, Some(7));
        let payload = &body[header.payload_offset..];
        assert_eq!(payload, b"Z");
    }
}
