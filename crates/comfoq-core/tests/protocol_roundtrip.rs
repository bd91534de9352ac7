//! Integration tests for the comfoq-core frame codec.
//!
//! These walk through a realistic gateway conversation using only the public
//! API: frames produced by one side are streamed into a [`FrameDecoder`] on
//! the other, in awkward chunk sizes, and decoded values are checked against
//! the sensor and command tables.

use comfoq_core::{
    decode_message, encode_message,
    domain::{naming::sensor_identifier, sensors},
    protocol::{
        messages::{
            CnRmiRequest, CnRpdoNotification, CnRpdoRequest, Operation, RegisterAppRequest,
            StartSessionRequest, VersionConfirm,
        },
        FrameDecoder, ReferenceCounter,
    },
    Body, Command, Message, OperationType, ResultCode, SensorValue, COMMAND_GROUP,
};
use uuid::Uuid;

fn app() -> Uuid {
    Uuid::parse_str("20200428000000000000000009080408").unwrap()
}

fn gateway() -> Uuid {
    Uuid::parse_str("00000000001710138001144fd71e2c3f").unwrap()
}

fn reply_to(request: &Message, result: ResultCode, body: Body) -> Message {
    Message {
        src: request.dst,
        dst: request.src,
        operation: Operation::reply(request.reference(), result),
        body,
    }
}

#[test]
fn test_handshake_requests_survive_chunked_stream() {
    // Arrange
    let refs = ReferenceCounter::new();
    let requests = vec![
        Message::request(
            app(),
            gateway(),
            refs.next(),
            Body::RegisterAppRequest(RegisterAppRequest {
                uuid: app().as_bytes().to_vec(),
                pin: 1234,
                devicename: "comfoq".to_string(),
            }),
        ),
        Message::request(
            app(),
            gateway(),
            refs.next(),
            Body::StartSessionRequest(StartSessionRequest {
                takeover: Some(true),
            }),
        ),
        Message::request(app(), gateway(), refs.next(), Body::VersionRequest),
    ];
    let mut stream = Vec::new();
    for msg in &requests {
        stream.extend(encode_message(msg).expect("encode must succeed"));
    }

    // Act: feed in 7-byte chunks
    let mut decoder = FrameDecoder::new();
    let mut decoded = Vec::new();
    for chunk in stream.chunks(7) {
        decoder.push(chunk);
        while let Some(msg) = decoder.next_message().expect("stream is well-formed") {
            decoded.push(msg);
        }
    }

    // Assert
    assert_eq!(decoded, requests);
    assert_eq!(decoder.buffered(), 0);
    let references: Vec<_> = decoded.iter().map(Message::reference).collect();
    assert_eq!(references, vec![Some(1), Some(2), Some(3)]);
}

#[test]
fn test_rejected_registration_reply_keeps_reference_and_result() {
    let request = Message::request(
        app(),
        gateway(),
        41,
        Body::RegisterAppRequest(RegisterAppRequest {
            uuid: app().as_bytes().to_vec(),
            pin: 9999,
            devicename: "comfoq".to_string(),
        }),
    );
    let reply = reply_to(&request, ResultCode::NotAllowed, Body::RegisterAppConfirm);

    let (decoded, consumed) = decode_message(&encode_message(&reply).unwrap()).unwrap();

    assert_eq!(consumed, encode_message(&reply).unwrap().len());
    assert_eq!(decoded.kind(), OperationType::RegisterAppConfirm);
    assert_eq!(decoded.reference(), Some(41));
    assert_eq!(decoded.result(), ResultCode::NotAllowed);
    assert_eq!(decoded.dst, app());
}

#[test]
fn test_sensor_notification_decodes_to_named_value() {
    // Arrange
    let notification = Message {
        src: gateway(),
        dst: app(),
        operation: Operation::unreferenced(),
        body: Body::CnRpdoNotification(CnRpdoNotification {
            pdid: 274,
            data: 215i16.to_le_bytes().to_vec(),
            zone: Some(1),
        }),
    };

    // Act
    let (decoded, _) = decode_message(&encode_message(&notification).unwrap()).unwrap();

    // Assert
    let Body::CnRpdoNotification(n) = decoded.body else {
        panic!("expected an RPDO notification, got {:?}", decoded.body);
    };
    let id = n.pdid as u16;
    assert_eq!(sensor_identifier(&sensors::label(id)), "temperatureExtract");
    assert_eq!(sensors::decode_value(id, &n.data), SensorValue::Number(21.5));
    assert_eq!(sensors::unit(id), "°C");
}

#[test]
fn test_subscription_request_carries_sensor_type() {
    let request = Message::request(
        app(),
        gateway(),
        5,
        Body::CnRpdoRequest(CnRpdoRequest {
            pdid: 121,
            zone: Some(1),
            r#type: Some(sensors::wire_type(121)),
            timeout: None,
        }),
    );
    let (decoded, _) = decode_message(&encode_message(&request).unwrap()).unwrap();
    assert_eq!(decoded, request);
    if let Body::CnRpdoRequest(r) = decoded.body {
        assert_eq!(r.r#type, Some(2));
    }
}

#[test]
fn test_command_request_carries_payload_bytes() {
    let cmd: Command = "fanBoost10m".parse().unwrap();
    let request = Message::request(
        app(),
        gateway(),
        6,
        Body::CnRmiRequest(CnRmiRequest {
            node_id: COMMAND_GROUP,
            message: cmd.payload().to_vec(),
        }),
    );

    let (decoded, _) = decode_message(&encode_message(&request).unwrap()).unwrap();

    let Body::CnRmiRequest(rmi) = decoded.body else {
        panic!("expected an RMI request");
    };
    assert_eq!(rmi.node_id, 1);
    assert_eq!(
        rmi.message,
        vec![0x84, 0x15, 0x01, 0x06, 0, 0, 0, 0, 0x58, 0x02, 0, 0, 0x03]
    );
}

#[test]
fn test_version_confirm_fields() {
    let reply = Message {
        src: gateway(),
        dst: app(),
        operation: Operation::reply(Some(3), ResultCode::Ok),
        body: Body::VersionConfirm(VersionConfirm {
            gateway_version: 1_049_344,
            serial_number: "DEM0116371301".to_string(),
            comfo_net_version: 4_026_535_936,
        }),
    };
    let (decoded, _) = decode_message(&encode_message(&reply).unwrap()).unwrap();
    assert_eq!(decoded, reply);
}

#[test]
fn test_garbage_between_frames_is_skipped_when_framed() {
    // A well-framed but undecodable frame between two good ones.
    let good = encode_message(&Message::request(app(), gateway(), 1, Body::KeepAlive)).unwrap();
    let mut bad = Vec::new();
    bad.extend_from_slice(&36u32.to_be_bytes());
    bad.extend_from_slice(&[0u8; 32]);
    bad.extend_from_slice(&[0x00, 0x02, 0x08, 0x7f]); // type 127

    let mut decoder = FrameDecoder::new();
    decoder.push(&good);
    decoder.push(&bad);
    decoder.push(&good);

    assert!(decoder.next_message().unwrap().is_some());
    assert!(decoder.next_message().is_err());
    assert!(decoder.next_message().unwrap().is_some());
    assert!(decoder.next_message().unwrap().is_none());
}
