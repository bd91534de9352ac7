//! In-memory gateway for exercising the session without a network.
//!
//! # Why a mock gateway?
//!
//! The real gateway:
//!
//! - Needs a ComfoAir Q unit on the LAN.
//! - Allows only one app session at a time, so tests would fight over it.
//! - Cannot be told to misbehave (drop the link, reject a PIN) on demand.
//!
//! [`MockGateway`] implements [`DeviceConnector`] and plays the gateway side
//! of the protocol in memory.  Frames still go through the real codec in
//! both directions, and everything the client sends is recorded so tests
//! can assert on it.
//!
//! # Usage in tests
//!
//! ```ignore
//! let gateway = MockGateway::new(1234);
//! let (handle, mut events) = Client::spawn(config, Arc::new(gateway.clone()));
//! handle.connect().await.unwrap();
//!
//! gateway.notify(117, &[42]);
//! assert_eq!(gateway.count(OperationType::CnRpdoRequest), 1);
//! ```

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use comfoq_core::protocol::{
    decode_message, encode_message, Body, CnRmiResponse, CnRpdoNotification, CnTimeConfirm,
    FrameDecoder, Message, Operation, OperationType, ResultCode, StartSessionConfirm,
    VersionConfirm,
};
use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::application::link::{DeviceConnector, DeviceDescriptor, DeviceLink, LinkError, LinkEvent};

/// Serial number the mock reports.
pub const MOCK_SERIAL: &str = "DEM0123456789";

/// Host name the mock reports from discovery.
pub const MOCK_HOST: &str = "mock-gateway";

/// App that takes the session away from the client.
const FOREIGN_APP: Uuid = Uuid::from_u128(0xdead_beef);

#[derive(Debug)]
struct GatewayState {
    pin: u32,
    uuid: Uuid,
    gateway_version: u32,
    comfonet_version: u32,
    registered_apps: HashSet<Uuid>,
    session_holder: Option<Uuid>,
    received: Vec<Message>,
    connect_count: u32,
    discover_count: u32,
    silent: bool,
    refuse_connections: bool,
    command_result: ResultCode,
    lose_session_on_start: bool,
    generation: u64,
    active_link: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

/// A scriptable stand-in for a ComfoConnect gateway.
#[derive(Debug, Clone)]
pub struct MockGateway {
    state: Arc<Mutex<GatewayState>>,
}

impl MockGateway {
    /// Creates a gateway that accepts `pin`.
    pub fn new(pin: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(GatewayState {
                pin,
                uuid: Uuid::from_u128(0x0000_0000_0017_1013_8001_144f_d71e_2c3f),
                gateway_version: 1_049_344,
                comfonet_version: 4_026_535_936,
                registered_apps: HashSet::new(),
                session_holder: None,
                received: Vec::new(),
                connect_count: 0,
                discover_count: 0,
                silent: false,
                refuse_connections: false,
                command_result: ResultCode::Ok,
                lose_session_on_start: false,
                generation: 0,
                active_link: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GatewayState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn uuid(&self) -> Uuid {
        self.lock().uuid
    }

    /// Stops answering requests (notifications pushed by tests still flow).
    pub fn set_silent(&self, silent: bool) {
        self.lock().silent = silent;
    }

    /// Makes every subsequent connect attempt fail.
    pub fn set_refuse_connections(&self, refuse: bool) {
        self.lock().refuse_connections = refuse;
    }

    /// Result returned for RMI commands.
    pub fn set_command_result(&self, result: ResultCode) {
        self.lock().command_result = result;
    }

    /// Confirms every StartSession but hands the session to another app
    /// straight away, so the requests that follow get `OTHER_SESSION`.
    pub fn set_lose_session_on_start(&self, lose: bool) {
        self.lock().lose_session_on_start = lose;
    }

    /// Every message the client has sent, oldest first.
    pub fn received(&self) -> Vec<Message> {
        self.lock().received.clone()
    }

    pub fn received_kinds(&self) -> Vec<OperationType> {
        self.lock().received.iter().map(Message::kind).collect()
    }

    /// Number of received messages of `kind`.
    pub fn count(&self, kind: OperationType) -> usize {
        self.lock().received.iter().filter(|m| m.kind() == kind).count()
    }

    pub fn connect_count(&self) -> u32 {
        self.lock().connect_count
    }

    pub fn discover_count(&self) -> u32 {
        self.lock().discover_count
    }

    /// Pushes a sensor notification to the connected client.  Returns
    /// `false` if no link is open.
    pub fn notify(&self, pdid: u32, data: &[u8]) -> bool {
        let mut state = self.lock();
        let msg = Message {
            src: state.uuid,
            dst: state.session_holder.unwrap_or_default(),
            operation: Operation::unreferenced(),
            body: Body::CnRpdoNotification(CnRpdoNotification {
                pdid,
                data: data.to_vec(),
                zone: Some(1),
            }),
        };
        state.push(&msg)
    }

    /// Simulates another app taking over: the session moves to a foreign
    /// UUID and the connected client is told to close.
    pub fn steal_session(&self) -> bool {
        let mut state = self.lock();
        let victim = state.session_holder.unwrap_or_default();
        state.session_holder = Some(FOREIGN_APP);
        let msg = Message {
            src: state.uuid,
            dst: victim,
            operation: Operation::unreferenced(),
            body: Body::CloseSessionRequest,
        };
        state.push(&msg)
    }

    /// Moves the session to another app without telling the client.  Its
    /// next request is answered with `OTHER_SESSION`.
    pub fn hand_over_session(&self) {
        self.lock().session_holder = Some(FOREIGN_APP);
    }

    /// Drops the current link as if the TCP connection broke.
    pub fn drop_connection(&self) {
        let mut state = self.lock();
        state.active_link = None;
        state.session_holder = None;
    }
}

impl GatewayState {
    fn push(&mut self, msg: &Message) -> bool {
        let Some(tx) = &self.active_link else {
            return false;
        };
        match encode_message(msg) {
            Ok(frame) => tx.send(frame).is_ok(),
            Err(_) => false,
        }
    }

    fn reply(&self, to: &Message, result: ResultCode, body: Body) -> Message {
        Message {
            src: self.uuid,
            dst: to.src,
            operation: Operation::reply(to.reference(), result),
            body,
        }
    }

    /// What the gateway answers to `msg`, if anything.
    fn respond(&mut self, msg: &Message) -> Option<Message> {
        if self.silent {
            return None;
        }
        let app = msg.src;
        let holds_session = self.session_holder == Some(app);

        let reply = match &msg.body {
            Body::RegisterAppRequest(r) => {
                if r.pin == self.pin {
                    self.registered_apps.insert(app);
                    self.reply(msg, ResultCode::Ok, Body::RegisterAppConfirm)
                } else {
                    self.reply(msg, ResultCode::NotAllowed, Body::RegisterAppConfirm)
                }
            }
            Body::StartSessionRequest(r) => {
                let confirm = Body::StartSessionConfirm(StartSessionConfirm {
                    devicename: Some("ComfoAir Q".to_string()),
                    resumed: Some(false),
                });
                if !self.registered_apps.contains(&app) {
                    self.reply(msg, ResultCode::NotAllowed, confirm)
                } else if self.session_holder.is_some()
                    && !holds_session
                    && !r.takeover.unwrap_or(false)
                {
                    self.reply(msg, ResultCode::OtherSession, confirm)
                } else {
                    self.session_holder = if self.lose_session_on_start {
                        Some(FOREIGN_APP)
                    } else {
                        Some(app)
                    };
                    self.reply(msg, ResultCode::Ok, confirm)
                }
            }
            Body::KeepAlive => return None,
            _ if !holds_session => {
                let body = confirm_for(msg.kind())?;
                self.reply(msg, ResultCode::OtherSession, body)
            }
            Body::CloseSessionRequest => {
                self.session_holder = None;
                self.reply(msg, ResultCode::Ok, Body::CloseSessionConfirm)
            }
            Body::VersionRequest => {
                let body = Body::VersionConfirm(VersionConfirm {
                    gateway_version: self.gateway_version,
                    serial_number: MOCK_SERIAL.to_string(),
                    comfo_net_version: self.comfonet_version,
                });
                self.reply(msg, ResultCode::Ok, body)
            }
            Body::CnRpdoRequest(_) => self.reply(msg, ResultCode::Ok, Body::CnRpdoConfirm),
            Body::CnRmiRequest(_) => {
                let result = self.command_result;
                let body = Body::CnRmiResponse(CnRmiResponse {
                    result: None,
                    message: None,
                });
                self.reply(msg, result, body)
            }
            Body::CnTimeRequest(_) => {
                self.reply(msg, ResultCode::Ok, Body::CnTimeConfirm(CnTimeConfirm { current_time: 0 }))
            }
            _ => return None,
        };
        Some(reply)
    }
}

fn confirm_for(kind: OperationType) -> Option<Body> {
    Some(match kind {
        OperationType::CloseSessionRequest => Body::CloseSessionConfirm,
        OperationType::CnRpdoRequest => Body::CnRpdoConfirm,
        OperationType::CnRmiRequest => Body::CnRmiResponse(CnRmiResponse {
            result: None,
            message: None,
        }),
        OperationType::VersionRequest => Body::VersionConfirm(VersionConfirm {
            gateway_version: 0,
            serial_number: String::new(),
            comfo_net_version: 0,
        }),
        _ => return None,
    })
}

#[async_trait]
impl DeviceConnector for MockGateway {
    async fn discover(
        &self,
        _broadcast: SocketAddr,
        _timeout: Duration,
    ) -> Result<DeviceDescriptor, LinkError> {
        let mut state = self.lock();
        state.discover_count += 1;
        Ok(DeviceDescriptor {
            host: MOCK_HOST.to_string(),
            uuid: state.uuid,
            version: Some(state.gateway_version),
        })
    }

    async fn connect(
        &self,
        host: &str,
        port: u16,
        _timeout: Duration,
    ) -> Result<Box<dyn DeviceLink>, LinkError> {
        let mut state = self.lock();
        state.connect_count += 1;
        if state.refuse_connections {
            return Err(LinkError::ConnectFailed {
                addr: format!("{host}:{port}"),
                reason: "connection refused".to_string(),
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.generation += 1;
        state.active_link = Some(tx);
        debug!(generation = state.generation, "mock gateway accepted connection");
        Ok(Box::new(MockLink {
            gateway: self.clone(),
            generation: state.generation,
            inbound: rx,
            decoder: FrameDecoder::new(),
            closed: false,
        }))
    }
}

/// Client side of a [`MockGateway`] connection.
#[derive(Debug)]
pub struct MockLink {
    gateway: MockGateway,
    generation: u64,
    inbound: mpsc::UnboundedReceiver<Vec<u8>>,
    decoder: FrameDecoder,
    closed: bool,
}

#[async_trait]
impl DeviceLink for MockLink {
    async fn send(&mut self, frame: Vec<u8>) -> Result<(), LinkError> {
        if self.closed {
            return Err(LinkError::Closed);
        }
        let mut state = self.gateway.lock();
        if state.generation != self.generation || state.active_link.is_none() {
            return Err(LinkError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock connection dropped",
            )));
        }

        let msg = match decode_message(&frame) {
            Ok((msg, _)) => msg,
            Err(e) => {
                return Err(LinkError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    e.to_string(),
                )))
            }
        };
        trace!(kind = ?msg.kind(), reference = ?msg.reference(), "mock gateway received");
        state.received.push(msg.clone());
        if let Some(reply) = state.respond(&msg) {
            state.push(&reply);
        }
        Ok(())
    }

    async fn next_event(&mut self) -> LinkEvent {
        loop {
            if self.closed {
                return LinkEvent::Closed;
            }
            match self.decoder.next_message() {
                Ok(Some(msg)) => return LinkEvent::Message(msg),
                Ok(None) => {}
                Err(e) if e.is_fatal() => {
                    self.closed = true;
                    return LinkEvent::Corrupt(e);
                }
                Err(e) => return LinkEvent::Skipped(e),
            }
            match self.inbound.recv().await {
                Some(frame) => self.decoder.push(&frame),
                None => {
                    self.closed = true;
                    return LinkEvent::Closed;
                }
            }
        }
    }

    async fn close(&mut self) {
        self.closed = true;
        self.inbound.close();
        let mut state = self.gateway.lock();
        if state.generation == self.generation {
            state.active_link = None;
        }
    }
}
