use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mqtt_embedded::codec::{ack::header_byte, connect, publish, subscribe, QoS};

fn bench_encode_connect(c: &mut Criterion) {
    let fields = connect::ConnectFields {
        client_id: "bench-client",
        clean_session: true,
        keep_alive_s: 60,
        will: None,
        username: Some("user"),
        password: Some(b"pass"),
    };
    let mut buf = [0u8; 128];
    c.bench_function("encode_connect", |b| {
        b.iter(|| connect::encode(black_box(&mut buf), black_box(&fields)).unwrap())
    });
}

fn bench_encode_publish_qos0(c: &mut Criterion) {
    let fields = publish::PublishFields {
        topic: "sensors/temperature",
        packet_id: None,
        payload: &[0u8; 64],
        qos: QoS::AtMostOnce,
        retain: false,
        dup: false,
    };
    let mut buf = [0u8; 128];
    c.bench_function("encode_publish_qos0", |b| {
        b.iter(|| publish::encode(black_box(&mut buf), black_box(&fields)).unwrap())
    });
}

fn bench_decode_publish_header(c: &mut Criterion) {
    let fields = publish::PublishFields {
        topic: "sensors/temperature",
        packet_id: Some(7),
        payload: &[0u8; 64],
        qos: QoS::AtLeastOnce,
        retain: false,
        dup: false,
    };
    let mut buf = [0u8; 128];
    let n = publish::encode(&mut buf, &fields).unwrap();
    let flags = buf[0] & 0x0F;
    // skip the 2-byte fixed header this packet happens to encode to.
    let body = &buf[2..n];
    c.bench_function("decode_publish_header", |b| {
        b.iter(|| publish::decode_header(black_box(flags), black_box(body)).unwrap())
    });
}

fn bench_encode_subscribe(c: &mut Criterion) {
    let filters = [
        subscribe::Filter { topic: "a/b/#", qos: QoS::AtMostOnce },
        subscribe::Filter { topic: "c/+/d", qos: QoS::ExactlyOnce },
    ];
    let mut buf = [0u8; 128];
    c.bench_function("encode_subscribe", |b| {
        b.iter(|| subscribe::encode_subscribe(black_box(&mut buf), black_box(1), black_box(&filters)).unwrap())
    });
}

fn bench_encode_puback(c: &mut Criterion) {
    let mut buf = [0u8; 8];
    c.bench_function("encode_puback", |b| {
        b.iter(|| mqtt_embedded::codec::ack::encode_packet_id_only(black_box(&mut buf), header_byte::PUBACK, black_box(42)).unwrap())
    });
}

criterion_group!(
    benches,
    bench_encode_connect,
    bench_encode_publish_qos0,
    bench_decode_publish_header,
    bench_encode_subscribe,
    bench_encode_puback,
);
criterion_main!(benches);
