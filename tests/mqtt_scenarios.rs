//! End-to-end scenarios against the in-memory [`common::MockTransport`],
//! one per spec.md §8 "end-to-end scenarios with concrete values".

mod common;

use std::sync::Mutex;

use common::MockTransport;
use mqtt_embedded::callback::Callbacks;
use mqtt_embedded::connection::Param;
use mqtt_embedded::error::Error;
use mqtt_embedded::transport::Handle;
use mqtt_embedded::{Client, ConnHandle, MsgHandle, QoS};

#[derive(Debug, Clone, Copy)]
struct Event {
    err: Error,
}

/// Open, queue CONNECT, write it, and hand back a matching CONNACK. Shared
/// setup every scenario below starts from.
fn connect_and_ack(client: &Client<MockTransport, ()>, conn: ConnHandle) {
    client.conn_open(conn).unwrap();
    client.connect(conn).unwrap();
    client.reactor_step(0);
    client.with_transport(|t| t.push_inbound(Handle(0), &[0x20, 0x02, 0x00, 0x00]));
    client.reactor_step(0);
}

fn new_client_with(conn_client_id: &str) -> (Client<MockTransport, ()>, ConnHandle) {
    let client = Client::new(MockTransport::new());
    let conn = client.conn_alloc().unwrap();
    client.conn_set_param(conn, Param::ClientId(conn_client_id)).unwrap();
    client.conn_set_param(conn, Param::Host("broker.example")).unwrap();
    (client, conn)
}

// --- Scenario 1: QoS 0 publish -------------------------------------------

static SCENARIO1_PUBLISH: Mutex<Vec<Event>> = Mutex::new(Vec::new());

fn on_publish_1(_conn: ConnHandle, _msg: MsgHandle, _arg: (), err: Error) {
    SCENARIO1_PUBLISH.lock().unwrap().push(Event { err });
}

#[test]
fn scenario_1_qos0_publish() {
    let (client, conn) = new_client_with("c1");
    client
        .conn_set_callbacks(conn, Callbacks { publish: Some(on_publish_1), ..Callbacks::none() })
        .unwrap();

    connect_and_ack(&client, conn);

    client.publish(conn, "a/b", b"hello", QoS::AtMostOnce, false).unwrap();
    client.reactor_step(0);

    let sent = client.with_transport(|t| t.sent_bytes(Handle(0)).to_vec());
    assert_eq!(
        &sent[sent.len() - 12..],
        &[0x30, 0x0A, 0x00, 0x03, 0x61, 0x2F, 0x62, 0x68, 0x65, 0x6C, 0x6C, 0x6F]
    );

    let events = SCENARIO1_PUBLISH.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].err, Error::None);
}

// --- Scenario 2: QoS 1 publish with PUBACK -------------------------------

static SCENARIO2_PUBLISH: Mutex<Vec<Event>> = Mutex::new(Vec::new());

fn on_publish_2(_conn: ConnHandle, _msg: MsgHandle, _arg: (), err: Error) {
    SCENARIO2_PUBLISH.lock().unwrap().push(Event { err });
}

#[test]
fn scenario_2_qos1_publish_with_puback() {
    let (client, conn) = new_client_with("c1");
    client
        .conn_set_callbacks(conn, Callbacks { publish: Some(on_publish_2), ..Callbacks::none() })
        .unwrap();

    connect_and_ack(&client, conn);

    client.publish(conn, "x", b"y", QoS::AtLeastOnce, false).unwrap();
    client.reactor_step(0);

    let sent = client.with_transport(|t| t.sent_bytes(Handle(0)).to_vec());
    assert_eq!(&sent[sent.len() - 8..], &[0x32, 0x06, 0x00, 0x01, 0x78, 0x00, 0x01, 0x79]);

    client.with_transport(|t| t.push_inbound(Handle(0), &[0x40, 0x02, 0x00, 0x01]));
    client.reactor_step(0);

    let events = SCENARIO2_PUBLISH.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].err, Error::None);
}

// --- Scenario 3: SUBSCRIBE with downgrade --------------------------------

static SCENARIO3_SUBSCRIBE: Mutex<Vec<Event>> = Mutex::new(Vec::new());

fn on_subscribe_3(_conn: ConnHandle, _msg: MsgHandle, _arg: (), err: Error) {
    SCENARIO3_SUBSCRIBE.lock().unwrap().push(Event { err });
}

#[test]
fn scenario_3_subscribe_downgrade() {
    let (client, conn) = new_client_with("c1");
    client
        .conn_set_callbacks(conn, Callbacks { subscribe: Some(on_subscribe_3), ..Callbacks::none() })
        .unwrap();

    connect_and_ack(&client, conn);

    client.subscribe(conn, "t/#", QoS::ExactlyOnce).unwrap();
    client.reactor_step(0);

    // Granted QoS 1 for packet id 1 (the first id this test's allocator hands out).
    client.with_transport(|t| t.push_inbound(Handle(0), &[0x90, 0x03, 0x00, 0x01, 0x01]));
    client.reactor_step(0);

    let events = SCENARIO3_SUBSCRIBE.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].err, Error::QosNotGranted);
}

// --- Scenario 4: QoS 2 inbound --------------------------------------------

static SCENARIO4_RX: Mutex<Vec<(String, Vec<u8>)>> = Mutex::new(Vec::new());

fn on_publish_rx_4(_conn: ConnHandle, topic: &str, payload: &[u8], _arg: (), _err: Error) {
    SCENARIO4_RX.lock().unwrap().push((topic.to_string(), payload.to_vec()));
}

#[test]
fn scenario_4_qos2_inbound() {
    let (client, conn) = new_client_with("c1");
    client
        .conn_set_callbacks(conn, Callbacks { publish_rx: Some(on_publish_rx_4), ..Callbacks::none() })
        .unwrap();

    connect_and_ack(&client, conn);

    // PUBLISH QoS 2, topic "t", packet id 7, payload "Z".
    client.with_transport(|t| t.push_inbound(Handle(0), &[0x34, 0x08, 0x00, 0x01, 0x74, 0x00, 0x07, 0x5A]));
    client.reactor_step(0);

    // Never delivered before PUBREL (spec.md §8 property 6).
    assert!(SCENARIO4_RX.lock().unwrap().is_empty());
    let sent = client.with_transport(|t| t.sent_bytes(Handle(0)).to_vec());
    assert_eq!(&sent[sent.len() - 4..], &[0x50, 0x02, 0x00, 0x07]); // PUBREC

    client.with_transport(|t| t.push_inbound(Handle(0), &[0x62, 0x02, 0x00, 0x07]));
    client.reactor_step(0);

    let rx = SCENARIO4_RX.lock().unwrap();
    assert_eq!(rx.len(), 1);
    assert_eq!(rx[0], ("t".to_string(), b"Z".to_vec()));
    drop(rx);

    let sent = client.with_transport(|t| t.sent_bytes(Handle(0)).to_vec());
    assert_eq!(&sent[sent.len() - 4..], &[0x70, 0x02, 0x00, 0x07]); // PUBCOMP
}

// --- Scenario 5: fatal transport mid-SUBSCRIBE-write ----------------------

static SCENARIO5_SUBSCRIBE: Mutex<Vec<Event>> = Mutex::new(Vec::new());
static SCENARIO5_ERROR: Mutex<Vec<Error>> = Mutex::new(Vec::new());

fn on_subscribe_5(_conn: ConnHandle, _msg: MsgHandle, _arg: (), err: Error) {
    SCENARIO5_SUBSCRIBE.lock().unwrap().push(Event { err });
}

fn on_error_5(_conn: ConnHandle, _arg: (), err: Error) {
    SCENARIO5_ERROR.lock().unwrap().push(err);
}

#[test]
fn scenario_5_fatal_transport_mid_subscribe() {
    let (client, conn) = new_client_with("c1");
    client
        .conn_set_callbacks(
            conn,
            Callbacks { subscribe: Some(on_subscribe_5), error: Some(on_error_5), ..Callbacks::none() },
        )
        .unwrap();

    connect_and_ack(&client, conn); // send call #1: CONNECT

    client.with_transport(|t| t.fail_send_on_call(Handle(0), 2));
    client.subscribe(conn, "t/#", QoS::AtLeastOnce).unwrap();
    client.reactor_step(0); // send call #2: SUBSCRIBE -> Fatal

    {
        let events = SCENARIO5_SUBSCRIBE.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].err, Error::ConnClosed);
    }
    {
        let errs = SCENARIO5_ERROR.lock().unwrap();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0], Error::SockFail);
    }

    assert_eq!(client.publish(conn, "x", b"y", QoS::AtMostOnce, false), Err(Error::InvalidArg));
}

// --- Scenario 6: application close with queued messages -------------------

static SCENARIO6_PUBLISH: Mutex<Vec<Event>> = Mutex::new(Vec::new());

fn on_publish_6(_conn: ConnHandle, _msg: MsgHandle, _arg: (), err: Error) {
    SCENARIO6_PUBLISH.lock().unwrap().push(Event { err });
}

#[test]
fn scenario_6_close_with_queued_messages() {
    let (client, conn) = new_client_with("c1");
    client
        .conn_set_callbacks(conn, Callbacks { publish: Some(on_publish_6), ..Callbacks::none() })
        .unwrap();

    connect_and_ack(&client, conn);

    client.publish(conn, "a", b"1", QoS::AtLeastOnce, false).unwrap();
    client.publish(conn, "b", b"2", QoS::AtLeastOnce, false).unwrap();
    // Drain both off the submission queue (one per reactor_step); the first
    // writes and moves to WaitRx, the second stays queued behind it, never
    // acked by the (in this test, absent) broker.
    client.reactor_step(0);
    client.reactor_step(0);

    client.conn_close(conn, 0).unwrap();

    let events = SCENARIO6_PUBLISH.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].err, Error::ConnClosed);
    assert_eq!(events[1].err, Error::ConnClosed);
}
