//! Session tests over real localhost sockets.
//!
//! A small fake gateway listens on an ephemeral TCP port (and, for the
//! discovery test, an ephemeral UDP port) and answers with frames built by
//! the same codec the client uses.

use std::sync::Arc;
use std::time::Duration;

use comfoq_client::infrastructure::network::TcpConnector;
use comfoq_client::{Client, ClientConfig, ClientEvent, SessionState};
use comfoq_core::protocol::discovery::{encode_search_response, is_search_request};
use comfoq_core::protocol::{
    encode_message, Body, CnRmiResponse, CnRpdoNotification, FrameDecoder, GatewayAnnouncement,
    Message, Operation, OperationType, ResultCode, StartSessionConfirm, VersionConfirm,
};
use comfoq_core::{SensorValue, COMMAND_GROUP};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;

const PIN: u32 = 1234;
const WAIT: Duration = Duration::from_secs(5);

fn gateway_uuid() -> Uuid {
    Uuid::from_u128(0x0000_0000_0017_1013_8001_144f_d71e_2c3f)
}

fn reply(to: &Message, result: ResultCode, body: Body) -> Message {
    Message {
        src: gateway_uuid(),
        dst: to.src,
        operation: Operation::reply(to.reference(), result),
        body,
    }
}

/// Serves one connection; every received message kind is forwarded on
/// `seen`.  Each subscription is answered with a notification carrying `7`.
async fn serve_one(listener: TcpListener, seen: mpsc::UnboundedSender<OperationType>) {
    let (mut sock, _) = listener.accept().await.unwrap();
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; 1024];

    loop {
        let n = match sock.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        decoder.push(&buf[..n]);
        while let Ok(Some(msg)) = decoder.next_message() {
            let _ = seen.send(msg.kind());
            let mut out = Vec::new();
            match &msg.body {
                Body::RegisterAppRequest(r) => {
                    let result = if r.pin == PIN {
                        ResultCode::Ok
                    } else {
                        ResultCode::NotAllowed
                    };
                    out.push(reply(&msg, result, Body::RegisterAppConfirm));
                }
                Body::StartSessionRequest(_) => out.push(reply(
                    &msg,
                    ResultCode::Ok,
                    Body::StartSessionConfirm(StartSessionConfirm::default()),
                )),
                Body::CnRpdoRequest(r) => {
                    out.push(reply(&msg, ResultCode::Ok, Body::CnRpdoConfirm));
                    out.push(Message {
                        src: gateway_uuid(),
                        dst: msg.src,
                        operation: Operation::unreferenced(),
                        body: Body::CnRpdoNotification(CnRpdoNotification {
                            pdid: r.pdid,
                            data: vec![7],
                            zone: Some(1),
                        }),
                    });
                }
                Body::VersionRequest => out.push(reply(
                    &msg,
                    ResultCode::Ok,
                    Body::VersionConfirm(VersionConfirm {
                        gateway_version: 1,
                        serial_number: "TCP0001".to_string(),
                        comfo_net_version: 2,
                    }),
                )),
                Body::CnRmiRequest(_) => out.push(reply(
                    &msg,
                    ResultCode::Ok,
                    Body::CnRmiResponse(CnRmiResponse {
                        result: Some(0),
                        message: None,
                    }),
                )),
                Body::CloseSessionRequest => {
                    out.push(reply(&msg, ResultCode::Ok, Body::CloseSessionConfirm))
                }
                _ => {}
            }
            for m in out {
                sock.write_all(&encode_message(&m).unwrap()).await.unwrap();
            }
        }
    }
}

async fn next_matching(
    events: &mut mpsc::UnboundedReceiver<ClientEvent>,
    pred: impl Fn(&ClientEvent) -> bool,
) -> ClientEvent {
    timeout(WAIT, async {
        loop {
            let event = events.recv().await.expect("event stream ended");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event did not arrive in time")
}

#[tokio::test]
async fn test_full_session_over_tcp() {
    // Arrange
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (seen_tx, mut seen) = mpsc::unbounded_channel();
    let server = tokio::spawn(serve_one(listener, seen_tx));

    let mut cfg = ClientConfig::new(PIN);
    cfg.identity.host = Some("127.0.0.1".to_string());
    cfg.identity.device_uuid = Some(gateway_uuid());
    cfg.identity.port = port;
    cfg.sensors = vec![117];
    cfg.timing.debounce = Duration::ZERO;
    let (handle, mut events) = Client::spawn(cfg, Arc::new(TcpConnector));

    // Act
    timeout(WAIT, handle.connect()).await.unwrap().unwrap();
    let update = next_matching(&mut events, |e| matches!(e, ClientEvent::SensorUpdate(_))).await;
    let ack = timeout(WAIT, handle.send_command(COMMAND_GROUP, "fanModeHigh")).await.unwrap();
    timeout(WAIT, handle.shutdown()).await.unwrap();

    // Assert
    let ClientEvent::SensorUpdate(update) = update else {
        unreachable!();
    };
    assert_eq!(update.sensor_id, 117);
    assert_eq!(update.value, SensorValue::Number(7.0));
    assert_eq!(ack, Ok(()));
    assert_eq!(handle.state(), SessionState::Idle);

    timeout(WAIT, server).await.unwrap().unwrap();
    let mut kinds = Vec::new();
    while let Ok(kind) = seen.try_recv() {
        kinds.push(kind);
    }
    assert_eq!(
        kinds,
        vec![
            OperationType::RegisterAppRequest,
            OperationType::StartSessionRequest,
            OperationType::CnRpdoRequest,
            OperationType::VersionRequest,
            OperationType::CnRmiRequest,
            OperationType::CloseSessionRequest,
        ]
    );
}

#[tokio::test]
async fn test_discovery_then_connect() {
    // Arrange: UDP responder that announces no address, so the client
    // falls back to the datagram's source.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (seen_tx, _seen) = mpsc::unbounded_channel();
    tokio::spawn(serve_one(listener, seen_tx));

    let udp = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let probe_addr = udp.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = [0u8; 64];
        let (len, src) = udp.recv_from(&mut buf).await.unwrap();
        assert!(is_search_request(&buf[..len]));
        let announcement = encode_search_response(&GatewayAnnouncement {
            address: String::new(),
            uuid: gateway_uuid(),
            version: 1,
        });
        udp.send_to(&announcement, src).await.unwrap();
    });

    let mut cfg = ClientConfig::new(PIN);
    cfg.identity.broadcast = probe_addr;
    cfg.identity.port = port;
    cfg.sensors = vec![118];
    let (handle, mut events) = Client::spawn(cfg, Arc::new(TcpConnector));

    // Act
    timeout(WAIT, handle.connect()).await.unwrap().unwrap();

    // Assert
    assert_eq!(handle.state(), SessionState::Active);
    let version =
        next_matching(&mut events, |e| matches!(e, ClientEvent::VersionInfo(_))).await;
    assert!(matches!(version, ClientEvent::VersionInfo(v) if v.serial_number == "TCP0001"));
    handle.shutdown().await;
}
