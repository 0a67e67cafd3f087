//! SUBSCRIBE / SUBACK / UNSUBSCRIBE / UNSUBACK encode and decode
//! (MQTT 3.1.1 §3.8–§3.11).

use super::{validate_topic_filter, QoS, Reader, Writer};
use crate::error::Error;

/// One (topic filter, requested QoS) pair in a SUBSCRIBE payload.
#[derive(Debug, Clone, Copy)]
pub struct Filter<'a> {
    pub topic: &'a str,
    pub qos: QoS,
}

/// Encode a SUBSCRIBE packet. Fixed header flags are the reserved `0010`
/// pattern mandated by §3.8.1.
pub fn encode_subscribe(buf: &mut [u8], packet_id: u16, filters: &[Filter]) -> Result<usize, Error> {
    if filters.is_empty() {
        return Err(Error::InvalidArg);
    }
    for f in filters {
        validate_topic_filter(f.topic)?;
    }

    const MAX_FIXED_HEADER: usize = 5;
    if buf.len() < MAX_FIXED_HEADER {
        return Err(Error::InvalidBufSize);
    }
    let mut body = Writer::new(&mut buf[MAX_FIXED_HEADER..]);
    body.put_u16(packet_id)?;
    for f in filters {
        body.put_str(f.topic)?;
        body.put_u8(f.qos as u8)?;
    }
    let body_len = body.len();

    let mut header_scratch = [0u8; MAX_FIXED_HEADER];
    let mut hw = Writer::new(&mut header_scratch);
    hw.put_fixed_header(0x82, body_len)?;
    let header_len = hw.len();

    let total = header_len + body_len;
    if buf.len() < total {
        return Err(Error::InvalidBufSize);
    }
    buf.copy_within(MAX_FIXED_HEADER..MAX_FIXED_HEADER + body_len, header_len);
    buf[..header_len].copy_from_slice(&header_scratch[..header_len]);
    Ok(total)
}

/// Encode an UNSUBSCRIBE packet. Fixed header flags are the reserved `0010`
/// pattern mandated by §3.10.1.
pub fn encode_unsubscribe(buf: &mut [u8], packet_id: u16, topics: &[&str]) -> Result<usize, Error> {
    if topics.is_empty() {
        return Err(Error::InvalidArg);
    }
    for t in topics {
        validate_topic_filter(t)?;
    }

    const MAX_FIXED_HEADER: usize = 5;
    if buf.len() < MAX_FIXED_HEADER {
        return Err(Error::InvalidBufSize);
    }
    let mut body = Writer::new(&mut buf[MAX_FIXED_HEADER..]);
    body.put_u16(packet_id)?;
    for t in topics {
        body.put_str(t)?;
    }
    let body_len = body.len();

    let mut header_scratch = [0u8; MAX_FIXED_HEADER];
    let mut hw = Writer::new(&mut header_scratch);
    hw.put_fixed_header(0xA2, body_len)?;
    let header_len = hw.len();

    let total = header_len + body_len;
    if buf.len() < total {
        return Err(Error::InvalidBufSize);
    }
    buf.copy_within(MAX_FIXED_HEADER..MAX_FIXED_HEADER + body_len, header_len);
    buf[..header_len].copy_from_slice(&header_scratch[..header_len]);
    Ok(total)
}

/// Decoded SUBACK: packet id plus the per-filter return codes (MQTT 3.1.1
/// §3.9.3). A return code of `0x80` means failure; otherwise it is the
/// granted QoS.
pub struct SubAck<'a> {
    pub packet_id: u16,
    pub return_codes: &'a [u8],
}

pub fn decode_suback(body: &[u8]) -> Result<SubAck, Error> {
    let mut r = Reader::new(body);
    let packet_id = r.get_u16()?;
    Ok(SubAck {
        packet_id,
        return_codes: r.get_rest(),
    })
}

/// Decoded UNSUBACK: just the packet id.
pub fn decode_unsuback(body: &[u8]) -> Result<u16, Error> {
    let mut r = Reader::new(body);
    r.get_u16()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_3_subscribe_downgrade_suback() {
        let ack = decode_suback(&[0x00, 0x02, 0x01]).unwrap();
        assert_eq!(ack.packet_id, 2);
        assert_eq!(ack.return_codes, &[0x01]);
    }

    #[test]
    fn subscribe_flags_are_reserved_pattern() {
        let mut buf = [0u8; 32];
        let filters = [Filter { topic: "t/#", qos: QoS::ExactlyOnce }];
        encode_subscribe(&mut buf, 2, &filters).unwrap();
        assert_eq!(buf[0], 0x82);
    }

    #[test]
    fn unsubscribe_flags_are_reserved_pattern() {
        let mut buf = [0u8; 32];
        encode_unsubscribe(&mut buf, 3, &["a/b"]).unwrap();
        assert_eq!(buf[0], 0xA2);
    }

    #[test]
    fn subscribe_rejects_malformed_filter() {
        let mut buf = [0u8; 32];
        let filters = [Filter { topic: "a/#/b", qos: QoS::AtMostOnce }];
        assert_eq!(encode_subscribe(&mut buf, 1, &filters), Err(Error::InvalidArg));
    }
}
