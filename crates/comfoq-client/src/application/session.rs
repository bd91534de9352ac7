//! Gateway session state machine.
//!
//! A single actor task owns the link, the pending-request table, the
//! subscription registry and the timers.  [`ClientHandle`] talks to it over
//! a channel, so no state is shared behind locks.
//!
//! # Lifecycle (for beginners)
//!
//! ```text
//! Idle ──connect──▶ Discovering ──▶ Registering ──▶ Starting ──▶ Active
//!   ▲                    │               │              │          │
//!   └──── failure ───────┴───────────────┴──────────────┘          │
//!                                                  link lost ──────┤
//!                                       Reconnecting ◀─────────────┘
//!                                 other app took over ──▶ Error
//!                                         shutdown ──▶ Closing ──▶ Idle
//! ```
//!
//! Every request carries a fresh reference number.  A request that gets no
//! reply within `request_timeout` is re-sent under a new reference, up to
//! `request_retries` times.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use comfoq_core::protocol::{
    encode_message, Body, CnRpdoRequest, Message, Operation, OperationType, ReferenceCounter,
    RegisterAppRequest, ResultCode, StartSessionRequest, GATEWAY_PORT,
};
use comfoq_core::domain::sensors;
use comfoq_core::SensorId;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::application::commands::{CommandDispatcher, PreparedCommand};
use crate::application::error::SessionError;
use crate::application::events::{ClientEvent, DisconnectReason, VersionInfo};
use crate::application::link::{DeviceConnector, DeviceDescriptor, DeviceLink, LinkError, LinkEvent};
use crate::application::pending::{PendingRequest, PendingRequests, ReplySender};
use crate::application::subscriptions::SubscriptionManager;

/// App UUID used when none is configured.
pub const DEFAULT_APP_UUID: Uuid = Uuid::from_u128(0x2020_0428_0000_0000_0000_0000_0908_0408);

// ── Configuration ─────────────────────────────────────────────────────────────

/// Who we are and which gateway we talk to.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceIdentity {
    /// UUID this app registers under.
    pub app_uuid: Uuid,
    /// Device name shown in the gateway's app list.
    pub app_name: String,
    /// Gateway UUID; discovered when absent.
    pub device_uuid: Option<Uuid>,
    /// Gateway address; discovered when absent.
    pub host: Option<String>,
    pub port: u16,
    /// Where discovery probes are sent.
    pub broadcast: SocketAddr,
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self {
            app_uuid: DEFAULT_APP_UUID,
            app_name: "comfoq".to_string(),
            device_uuid: None,
            host: None,
            port: GATEWAY_PORT,
            broadcast: SocketAddr::from(([255, 255, 255, 255], GATEWAY_PORT)),
        }
    }
}

/// Timeouts, retry budgets and intervals.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionTiming {
    pub request_timeout: Duration,
    /// Re-sends after the first attempt.
    pub request_retries: u32,
    pub keepalive_interval: Duration,
    pub reconnect_interval: Duration,
    pub max_reconnect_attempts: u32,
    pub discovery_timeout: Duration,
    pub connect_timeout: Duration,
    /// Sensor update coalescing window; zero disables it.
    pub debounce: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            request_retries: 2,
            keepalive_interval: Duration::from_secs(30),
            reconnect_interval: Duration::from_secs(5),
            max_reconnect_attempts: 5,
            discovery_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            debounce: Duration::from_millis(2000),
        }
    }
}

/// Everything the client needs to run.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub identity: DeviceIdentity,
    pub pin: u32,
    /// Sensors subscribed on every (re)connect.
    pub sensors: Vec<SensorId>,
    pub timing: SessionTiming,
}

impl ClientConfig {
    pub fn new(pin: u32) -> Self {
        Self {
            identity: DeviceIdentity::default(),
            pin,
            sensors: Vec::new(),
            timing: SessionTiming::default(),
        }
    }
}

// ── State ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Discovering,
    Registering,
    Starting,
    Active,
    Closing,
    Reconnecting,
    /// Stopped after an authentication failure or a session takeover.
    Error,
}

/// Locally minted id of one active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionToken(pub Uuid);

/// Snapshot published on every state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: SessionState,
    /// Present exactly while `state` is `Active`.
    pub token: Option<SessionToken>,
}

// ── Handle ────────────────────────────────────────────────────────────────────

type Reply = oneshot::Sender<Result<(), SessionError>>;

#[derive(Debug)]
enum Request {
    Connect(Reply),
    RegisterSensor(SensorId, Reply),
    SendCommand(PreparedCommand, Reply),
    RequestVersion(Reply),
    Shutdown(oneshot::Sender<()>),
}

/// Cheap, cloneable front-end to a running client.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    requests: mpsc::Sender<Request>,
    status: watch::Receiver<SessionStatus>,
}

impl ClientHandle {
    /// Discovers (if needed), connects, registers and starts a session.
    ///
    /// Returns immediately if a session is already active.
    pub async fn connect(&self) -> Result<(), SessionError> {
        self.call(Request::Connect).await
    }

    /// Subscribes to a sensor.  Registering the same id twice sends nothing
    /// the second time.  Without an active session the id is recorded and
    /// subscribed on the next connect.
    pub async fn register_sensor(&self, id: SensorId) -> Result<(), SessionError> {
        self.call(|tx| Request::RegisterSensor(id, tx)).await
    }

    /// Sends a named command to node `group`.
    ///
    /// Unknown names fail with [`SessionError::UnknownCommand`] before any
    /// traffic.
    pub async fn send_command(&self, group: u32, name: &str) -> Result<(), SessionError> {
        let prepared = CommandDispatcher.prepare(group, name)?;
        self.call(|tx| Request::SendCommand(prepared, tx)).await
    }

    /// Asks the gateway for its version; the answer arrives as a
    /// [`ClientEvent::VersionInfo`].
    pub async fn request_version(&self) -> Result<(), SessionError> {
        self.call(Request::RequestVersion).await
    }

    /// Closes the session and stops the client.  Every later call returns
    /// [`SessionError::Closed`].
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.requests.send(Request::Shutdown(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    pub fn state(&self) -> SessionState {
        self.status.borrow().state
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Watches state changes.
    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    async fn call(&self, make: impl FnOnce(Reply) -> Request) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(make(tx))
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)?
    }
}

/// Entry point: spawns the session actor.
pub struct Client;

impl Client {
    /// Spawns the actor on the current Tokio runtime.  Nothing is sent until
    /// [`ClientHandle::connect`] is called.
    pub fn spawn(
        config: ClientConfig,
        connector: Arc<dyn DeviceConnector>,
    ) -> (ClientHandle, mpsc::UnboundedReceiver<ClientEvent>) {
        let (req_tx, req_rx) = mpsc::channel(32);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SessionStatus {
            state: SessionState::Idle,
            token: None,
        });

        let mut subscriptions = SubscriptionManager::new(config.timing.debounce);
        for id in &config.sensors {
            subscriptions.register(*id);
        }

        let actor = SessionActor {
            config,
            connector,
            requests: req_rx,
            deferred: VecDeque::new(),
            events: event_tx,
            status: status_tx,
            link: None,
            device: None,
            refs: ReferenceCounter::new(),
            pending: PendingRequests::new(),
            subscriptions,
            dispatcher: CommandDispatcher,
            next_keepalive: None,
            connected: false,
        };
        tokio::spawn(actor.run());

        (
            ClientHandle {
                requests: req_tx,
                status: status_rx,
            },
            event_rx,
        )
    }
}

// ── Actor ─────────────────────────────────────────────────────────────────────

enum Wake {
    Request(Option<Request>),
    Link(LinkEvent),
    Timer,
}

#[derive(PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

struct SessionActor {
    config: ClientConfig,
    connector: Arc<dyn DeviceConnector>,
    requests: mpsc::Receiver<Request>,
    /// Requests that arrived while the actor was busy.
    deferred: VecDeque<Request>,
    events: mpsc::UnboundedSender<ClientEvent>,
    status: watch::Sender<SessionStatus>,
    link: Option<Box<dyn DeviceLink>>,
    device: Option<DeviceDescriptor>,
    refs: ReferenceCounter,
    pending: PendingRequests,
    subscriptions: SubscriptionManager,
    dispatcher: CommandDispatcher,
    next_keepalive: Option<Instant>,
    /// Whether `ConnectionStateChanged(true)` is the last one emitted.
    connected: bool,
}

async fn next_link_event(link: Option<&mut Box<dyn DeviceLink>>) -> LinkEvent {
    match link {
        Some(link) => link.next_event().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn link_error(err: LinkError) -> SessionError {
    match err {
        LinkError::DiscoveryTimeout(d) => SessionError::DiscoveryTimeout(d),
        other => SessionError::Connection(other.to_string()),
    }
}

fn disconnect_reason(err: &SessionError) -> DisconnectReason {
    match err {
        SessionError::Authentication => DisconnectReason::AuthenticationFailed,
        SessionError::SessionStolen => DisconnectReason::SessionStolen,
        other => DisconnectReason::ConnectionFailed(other.to_string()),
    }
}

fn check_result(kind: OperationType, reply: &Message) -> Result<(), SessionError> {
    match reply.result() {
        ResultCode::Ok => Ok(()),
        result => Err(SessionError::Rejected { kind, result }),
    }
}

impl SessionActor {
    async fn run(mut self) {
        loop {
            let wake = match self.deferred.pop_front() {
                Some(req) => Wake::Request(Some(req)),
                None => {
                    let wake_at = self.next_wake();
                    tokio::select! {
                        req = self.requests.recv() => Wake::Request(req),
                        ev = next_link_event(self.link.as_mut()) => Wake::Link(ev),
                        _ = sleep_until_opt(wake_at) => Wake::Timer,
                    }
                }
            };

            match wake {
                Wake::Request(Some(req)) => {
                    if self.handle_request(req).await == Flow::Exit {
                        break;
                    }
                }
                Wake::Request(None) => {
                    debug!("all client handles dropped");
                    self.shutdown().await;
                    break;
                }
                Wake::Link(event) => self.handle_link_event(event).await,
                Wake::Timer => self.on_timer().await,
            }
        }
        debug!("session actor stopped");
    }

    fn next_wake(&self) -> Option<Instant> {
        let keepalive = if self.state() == SessionState::Active {
            self.next_keepalive
        } else {
            None
        };
        [
            self.subscriptions.next_expiry(),
            self.pending.next_deadline(),
            keepalive,
        ]
        .into_iter()
        .flatten()
        .min()
    }

    // ── State and events ──────────────────────────────────────────────────────

    fn state(&self) -> SessionState {
        self.status.borrow().state
    }

    fn set_state(&self, state: SessionState) {
        let token = match state {
            SessionState::Active => Some(SessionToken(Uuid::new_v4())),
            _ => None,
        };
        debug!(?state, "session state changed");
        self.status.send_replace(SessionStatus { state, token });
    }

    fn emit(&self, event: ClientEvent) {
        // A consumer that stopped listening is not an error.
        let _ = self.events.send(event);
    }

    fn mark_connected(&mut self) {
        if !self.connected {
            self.connected = true;
            self.emit(ClientEvent::ConnectionStateChanged(true));
        }
    }

    fn mark_disconnected(&mut self) {
        if self.connected {
            self.connected = false;
            self.emit(ClientEvent::ConnectionStateChanged(false));
        }
    }

    // ── Requests from handles ─────────────────────────────────────────────────

    async fn handle_request(&mut self, req: Request) -> Flow {
        match req {
            Request::Connect(reply) => {
                let outcome = if self.state() == SessionState::Active {
                    Ok(())
                } else {
                    self.connect_session().await
                };
                let _ = reply.send(outcome);
            }
            Request::RegisterSensor(id, reply) => {
                if !self.subscriptions.register(id) {
                    debug!(sensor = id, "sensor already registered");
                    let _ = reply.send(Ok(()));
                } else if self.state() == SessionState::Active {
                    self.start_request(subscribe_body(id), reply).await;
                } else {
                    debug!(sensor = id, "sensor recorded for next session");
                    let _ = reply.send(Ok(()));
                }
            }
            Request::SendCommand(prepared, reply) => {
                if self.state() != SessionState::Active {
                    let _ = reply.send(Err(SessionError::NotActive));
                } else {
                    info!(command = %prepared.command, "sending command");
                    self.start_request(prepared.body, reply).await;
                }
            }
            Request::RequestVersion(reply) => {
                if self.state() != SessionState::Active {
                    let _ = reply.send(Err(SessionError::NotActive));
                } else {
                    self.start_request(Body::VersionRequest, reply).await;
                }
            }
            Request::Shutdown(done) => {
                self.shutdown().await;
                let _ = done.send(());
                return Flow::Exit;
            }
        }
        Flow::Continue
    }

    /// Sends a request and parks it in the pending table; the main loop
    /// resolves it on reply or timeout.
    async fn start_request(&mut self, body: Body, reply: ReplySender) {
        let reference = self.refs.next();
        let kind = body.kind();
        if let Err(e) = self.send_request(reference, body.clone()).await {
            let _ = reply.send(Err(e.clone()));
            self.reconnect(e).await;
            return;
        }
        self.pending.insert(PendingRequest {
            reference,
            kind,
            body,
            attempts_left: self.config.timing.request_retries,
            deadline: Instant::now() + self.config.timing.request_timeout,
            reply: Some(reply),
        });
    }

    // ── Inbound traffic ───────────────────────────────────────────────────────

    async fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Message(msg) => {
                if let Err(e) = self.route(msg) {
                    self.enter_error(e).await;
                }
            }
            LinkEvent::Skipped(e) => warn!("dropped undecodable frame: {e}"),
            LinkEvent::Corrupt(e) => {
                warn!("gateway stream corrupt: {e}");
                self.reconnect(SessionError::ProtocolDecode(e)).await;
            }
            LinkEvent::Closed => {
                warn!("gateway closed the connection");
                self.reconnect(SessionError::Connection("connection closed by gateway".into()))
                    .await;
            }
        }
    }

    /// Dispatches one inbound message.  Returns `Err(SessionStolen)` when the
    /// gateway reports that another app owns the session.
    fn route(&mut self, msg: Message) -> Result<(), SessionError> {
        if msg.result() == ResultCode::OtherSession
            || msg.kind() == OperationType::CloseSessionRequest
        {
            warn!(kind = ?msg.kind(), "gateway session taken over by another app");
            return Err(SessionError::SessionStolen);
        }

        let kind = msg.kind();
        match &msg.body {
            Body::CnRpdoNotification(n) => match SensorId::try_from(n.pdid) {
                Ok(id) => {
                    if let Some(update) =
                        self.subscriptions.on_notification(id, &n.data, Instant::now())
                    {
                        self.emit(ClientEvent::SensorUpdate(update));
                    }
                }
                Err(_) => debug!(pdid = n.pdid, "notification for out-of-range pdid dropped"),
            },
            Body::CnNodeNotification(n) => {
                debug!(node = n.node_id, product = ?n.product_id, mode = ?n.mode, "node notification")
            }
            Body::CnAlarmNotification(a) => {
                warn!(node = ?a.node_id, error = ?a.error_id, "alarm reported by unit")
            }
            Body::GatewayNotification(_) => debug!("gateway notification"),
            Body::KeepAlive => trace!("keepalive from gateway"),
            _ if kind.is_response() => {
                match msg.reference().and_then(|r| self.pending.complete(r)) {
                    Some(request) => self.finish(request, &msg),
                    None => warn!(?kind, reference = ?msg.reference(), "unmatched response discarded"),
                }
            }
            _ => debug!(?kind, "unexpected message ignored"),
        }
        Ok(())
    }

    fn finish(&mut self, request: PendingRequest, reply: &Message) {
        let outcome = match (&request.body, &reply.body) {
            (Body::CnRmiRequest(_), _) => self.dispatcher.interpret_ack(reply),
            (Body::VersionRequest, Body::VersionConfirm(v)) => {
                let outcome = check_result(request.kind, reply);
                if outcome.is_ok() {
                    self.emit_version(v);
                }
                outcome
            }
            (Body::CnRpdoRequest(r), _) => {
                let outcome = check_result(request.kind, reply);
                if outcome.is_err() {
                    self.drop_subscription(r.pdid);
                }
                outcome
            }
            _ => check_result(request.kind, reply),
        };
        if let Err(e) = &outcome {
            warn!("{e}");
        }
        request.resolve(outcome);
    }

    fn emit_version(&self, v: &comfoq_core::protocol::VersionConfirm) {
        info!(
            serial = %v.serial_number,
            gateway = v.gateway_version,
            comfonet = v.comfo_net_version,
            "gateway version"
        );
        self.emit(ClientEvent::VersionInfo(VersionInfo {
            comfonet_version: v.comfo_net_version,
            serial_number: v.serial_number.clone(),
            gateway_version: v.gateway_version,
        }));
    }

    fn drop_subscription(&mut self, pdid: u32) {
        if let Ok(id) = SensorId::try_from(pdid) {
            self.subscriptions.unregister(id);
        }
    }

    // ── Timers ────────────────────────────────────────────────────────────────

    async fn on_timer(&mut self) {
        let now = Instant::now();

        for update in self.subscriptions.expire(now) {
            self.emit(ClientEvent::SensorUpdate(update));
        }

        let mut expired = self.pending.expired(now).into_iter();
        while let Some(mut request) = expired.next() {
            let failure = if request.attempts_left == 0 {
                warn!(kind = ?request.kind, "request timed out");
                if let Body::CnRpdoRequest(r) = &request.body {
                    self.drop_subscription(r.pdid);
                }
                let err = SessionError::RequestTimeout { kind: request.kind };
                request.resolve(Err(err.clone()));
                Some(err)
            } else {
                let reference = self.refs.next();
                debug!(kind = ?request.kind, reference, "retrying request");
                match self.send_request(reference, request.body.clone()).await {
                    Ok(()) => {
                        request.reference = reference;
                        request.attempts_left -= 1;
                        request.deadline = now + self.config.timing.request_timeout;
                        self.pending.insert(request);
                        None
                    }
                    Err(e) => {
                        request.resolve(Err(e.clone()));
                        Some(e)
                    }
                }
            };

            if let Some(cause) = failure {
                for rest in expired.by_ref() {
                    rest.resolve(Err(cause.clone()));
                }
                self.reconnect(cause).await;
                return;
            }
        }

        if self.state() == SessionState::Active
            && self.next_keepalive.is_some_and(|at| at <= now)
        {
            self.next_keepalive = Some(now + self.config.timing.keepalive_interval);
            if let Err(e) = self.send_keepalive().await {
                self.reconnect(e).await;
            }
        }
    }

    // ── Outbound traffic ──────────────────────────────────────────────────────

    fn gateway_uuid(&self) -> Uuid {
        self.device.as_ref().map(|d| d.uuid).unwrap_or_default()
    }

    async fn send(&mut self, msg: Message) -> Result<(), SessionError> {
        let frame = encode_message(&msg).map_err(SessionError::ProtocolDecode)?;
        let link = self.link.as_mut().ok_or(SessionError::NotActive)?;
        trace!(kind = ?msg.kind(), reference = ?msg.reference(), "sending");
        link.send(frame).await.map_err(link_error)
    }

    async fn send_request(&mut self, reference: u32, body: Body) -> Result<(), SessionError> {
        let msg = Message::request(
            self.config.identity.app_uuid,
            self.gateway_uuid(),
            reference,
            body,
        );
        self.send(msg).await
    }

    async fn send_keepalive(&mut self) -> Result<(), SessionError> {
        let msg = Message {
            src: self.config.identity.app_uuid,
            dst: self.gateway_uuid(),
            operation: Operation::unreferenced(),
            body: Body::KeepAlive,
        };
        self.send(msg).await
    }

    /// Sends `body` and waits for its reply, re-sending under a fresh
    /// reference on timeout.  Used during the handshake, where steps are
    /// strictly sequential.
    async fn call(&mut self, body: Body) -> Result<Message, SessionError> {
        let kind = body.kind();
        let attempts = self.config.timing.request_retries + 1;
        for attempt in 1..=attempts {
            let reference = self.refs.next();
            self.send_request(reference, body.clone()).await?;
            let deadline = Instant::now() + self.config.timing.request_timeout;
            if let Some(reply) = self.await_reply(reference, deadline).await? {
                return Ok(reply);
            }
            debug!(?kind, attempt, "no reply before timeout");
        }
        Err(SessionError::RequestTimeout { kind })
    }

    /// Waits for the response carrying `reference`.  Other traffic is routed
    /// as usual and handle requests are deferred, except shutdown, which
    /// cancels the wait.  A matched reply with `OTHER_SESSION` is a takeover.
    async fn await_reply(
        &mut self,
        reference: u32,
        deadline: Instant,
    ) -> Result<Option<Message>, SessionError> {
        loop {
            let expiry = self.subscriptions.next_expiry();
            let wake = tokio::select! {
                ev = next_link_event(self.link.as_mut()) => Wake::Link(ev),
                req = self.requests.recv() => Wake::Request(req),
                _ = sleep_until_opt(expiry) => Wake::Timer,
                _ = sleep_until(deadline) => return Ok(None),
            };

            match wake {
                Wake::Link(LinkEvent::Message(msg))
                    if msg.reference() == Some(reference) && msg.kind().is_response() =>
                {
                    if msg.result() == ResultCode::OtherSession {
                        warn!(kind = ?msg.kind(), "gateway session taken over by another app");
                        return Err(SessionError::SessionStolen);
                    }
                    return Ok(Some(msg));
                }
                Wake::Link(LinkEvent::Message(msg)) => self.route(msg)?,
                Wake::Link(LinkEvent::Skipped(e)) => warn!("dropped undecodable frame: {e}"),
                Wake::Link(LinkEvent::Corrupt(e)) => return Err(SessionError::ProtocolDecode(e)),
                Wake::Link(LinkEvent::Closed) => {
                    return Err(SessionError::Connection(
                        "connection closed by gateway".into(),
                    ))
                }
                Wake::Request(req) => {
                    if !self.defer(req) {
                        return Err(SessionError::Cancelled);
                    }
                }
                Wake::Timer => {
                    for update in self.subscriptions.expire(Instant::now()) {
                        self.emit(ClientEvent::SensorUpdate(update));
                    }
                }
            }
        }
    }

    /// Sleeps for `duration` while deferring handle requests.  Returns
    /// `false` if shutdown was requested in the meantime.
    async fn pause(&mut self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            let req = tokio::select! {
                _ = sleep_until(deadline) => return true,
                req = self.requests.recv() => req,
            };
            if !self.defer(req) {
                return false;
            }
        }
    }

    /// Queues a request that arrived mid-operation.  Returns `false` when it
    /// asks the actor to stop.
    fn defer(&mut self, req: Option<Request>) -> bool {
        match req {
            Some(Request::Shutdown(done)) => {
                self.deferred.push_front(Request::Shutdown(done));
                false
            }
            Some(other) => {
                self.deferred.push_back(other);
                true
            }
            None => false,
        }
    }

    // ── Handshake ─────────────────────────────────────────────────────────────

    /// Runs the handshake for an explicit connect and settles the state on
    /// failure.
    async fn connect_session(&mut self) -> Result<(), SessionError> {
        match self.establish().await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("connect failed: {e}");
                self.teardown(&e).await;
                let state = match e {
                    SessionError::Authentication | SessionError::SessionStolen => {
                        SessionState::Error
                    }
                    _ => SessionState::Idle,
                };
                self.set_state(state);
                self.emit(ClientEvent::Disconnected(disconnect_reason(&e)));
                Err(e)
            }
        }
    }

    async fn resolve_device(&mut self) -> Result<DeviceDescriptor, SessionError> {
        let identity = &self.config.identity;
        if let (Some(host), Some(uuid)) = (&identity.host, identity.device_uuid) {
            return Ok(DeviceDescriptor {
                host: host.clone(),
                uuid,
                version: None,
            });
        }
        if let Some(device) = &self.device {
            return Ok(device.clone());
        }

        self.set_state(SessionState::Discovering);
        let broadcast = self.config.identity.broadcast;
        info!("discovering gateway via {broadcast}");
        let found = self
            .connector
            .discover(broadcast, self.config.timing.discovery_timeout)
            .await
            .map_err(link_error)?;
        info!(host = %found.host, uuid = %found.uuid, "gateway discovered");

        let identity = &self.config.identity;
        Ok(DeviceDescriptor {
            host: identity.host.clone().unwrap_or(found.host),
            uuid: identity.device_uuid.unwrap_or(found.uuid),
            version: found.version,
        })
    }

    async fn establish(&mut self) -> Result<(), SessionError> {
        let device = self.resolve_device().await?;
        self.device = Some(device.clone());

        self.set_state(SessionState::Registering);
        let port = self.config.identity.port;
        info!("connecting to gateway at {}:{port}", device.host);
        let link = self
            .connector
            .connect(&device.host, port, self.config.timing.connect_timeout)
            .await
            .map_err(link_error)?;
        self.link = Some(link);

        let register = Body::RegisterAppRequest(RegisterAppRequest {
            uuid: self.config.identity.app_uuid.as_bytes().to_vec(),
            pin: self.config.pin,
            devicename: self.config.identity.app_name.clone(),
        });
        let reply = self.call(register).await?;
        match reply.result() {
            ResultCode::Ok => {}
            ResultCode::NotAllowed => return Err(SessionError::Authentication),
            other => return Err(SessionError::Registration(other)),
        }

        self.set_state(SessionState::Starting);
        let start = Body::StartSessionRequest(StartSessionRequest {
            takeover: Some(true),
        });
        let reply = self.call(start).await?;
        match reply.result() {
            ResultCode::Ok => {}
            ResultCode::NotAllowed => return Err(SessionError::Authentication),
            ResultCode::OtherSession => return Err(SessionError::SessionStolen),
            result => {
                return Err(SessionError::Rejected {
                    kind: OperationType::StartSessionRequest,
                    result,
                })
            }
        }

        self.set_state(SessionState::Active);
        info!("gateway session active");
        self.mark_connected();

        for id in self.subscriptions.registered() {
            match self.call(subscribe_body(id)).await {
                Ok(reply) if reply.result() == ResultCode::Ok => debug!(sensor = id, "subscribed"),
                Ok(reply) => warn!(sensor = id, result = ?reply.result(), "subscription rejected"),
                Err(SessionError::RequestTimeout { .. }) => {
                    warn!(sensor = id, "subscription timed out")
                }
                Err(e) => return Err(e),
            }
        }

        match self.call(Body::VersionRequest).await {
            Ok(reply) => match (&reply.body, reply.result()) {
                (Body::VersionConfirm(v), ResultCode::Ok) => self.emit_version(v),
                (_, result) => warn!(?result, "version request rejected"),
            },
            Err(SessionError::RequestTimeout { .. }) => warn!("version request timed out"),
            Err(e) => return Err(e),
        }

        self.next_keepalive = Some(Instant::now() + self.config.timing.keepalive_interval);
        Ok(())
    }

    // ── Teardown ──────────────────────────────────────────────────────────────

    /// Closes the link and fails everything in flight with `cause`.
    async fn teardown(&mut self, cause: &SessionError) {
        if let Some(mut link) = self.link.take() {
            link.close().await;
        }
        for request in self.pending.drain() {
            request.resolve(Err(cause.clone()));
        }
        self.subscriptions.clear_pending();
        self.next_keepalive = None;
        self.mark_disconnected();
    }

    /// Stops for good after a takeover or authentication failure.  No
    /// reconnect is attempted.
    async fn enter_error(&mut self, cause: SessionError) {
        self.teardown(&cause).await;
        self.set_state(SessionState::Error);
        self.emit(ClientEvent::Disconnected(disconnect_reason(&cause)));
    }

    /// Handles a lost link while active: retries the full handshake up to
    /// `max_reconnect_attempts` times.
    async fn reconnect(&mut self, cause: SessionError) {
        if matches!(
            cause,
            SessionError::SessionStolen | SessionError::Authentication
        ) {
            self.enter_error(cause).await;
            return;
        }

        warn!("session lost: {cause}");
        self.teardown(&cause).await;
        self.set_state(SessionState::Reconnecting);

        let max = self.config.timing.max_reconnect_attempts;
        for attempt in 1..=max {
            if !self.pause(self.config.timing.reconnect_interval).await {
                self.set_state(SessionState::Idle);
                return;
            }
            info!(attempt, max, "reconnecting");
            match self.establish().await {
                Ok(()) => return,
                Err(e) => {
                    self.teardown(&e).await;
                    match e {
                        SessionError::Authentication | SessionError::SessionStolen => {
                            self.set_state(SessionState::Error);
                            self.emit(ClientEvent::Disconnected(disconnect_reason(&e)));
                            return;
                        }
                        SessionError::Cancelled => {
                            self.set_state(SessionState::Idle);
                            return;
                        }
                        other => {
                            warn!(attempt, "reconnect failed: {other}");
                            self.set_state(SessionState::Reconnecting);
                        }
                    }
                }
            }
        }

        warn!("giving up after {max} reconnect attempts");
        self.set_state(SessionState::Idle);
        self.emit(ClientEvent::Disconnected(DisconnectReason::ReconnectExhausted {
            attempts: max,
        }));
    }

    async fn shutdown(&mut self) {
        info!("shutting down gateway session");
        if self.state() == SessionState::Active {
            self.set_state(SessionState::Closing);
            self.close_session().await;
        }
        self.teardown(&SessionError::Closed).await;
        self.set_state(SessionState::Idle);
        self.emit(ClientEvent::Disconnected(DisconnectReason::Shutdown));

        for req in self.deferred.drain(..) {
            match req {
                Request::Connect(reply)
                | Request::RegisterSensor(_, reply)
                | Request::SendCommand(_, reply)
                | Request::RequestVersion(reply) => {
                    let _ = reply.send(Err(SessionError::Closed));
                }
                Request::Shutdown(done) => {
                    let _ = done.send(());
                }
            }
        }
    }

    /// Best-effort CloseSession: one attempt, bounded by the request timeout.
    async fn close_session(&mut self) {
        let reference = self.refs.next();
        if self
            .send_request(reference, Body::CloseSessionRequest)
            .await
            .is_err()
        {
            return;
        }
        let deadline = Instant::now() + self.config.timing.request_timeout;
        loop {
            match timeout_at(deadline, next_link_event(self.link.as_mut())).await {
                Ok(LinkEvent::Message(msg)) if msg.reference() == Some(reference) => {
                    debug!(result = ?msg.result(), "session closed");
                    return;
                }
                Ok(LinkEvent::Message(_)) | Ok(LinkEvent::Skipped(_)) => continue,
                Ok(_) | Err(_) => return,
            }
        }
    }
}

fn subscribe_body(id: SensorId) -> Body {
    Body::CnRpdoRequest(CnRpdoRequest {
        pdid: u32::from(id),
        zone: Some(1),
        r#type: Some(sensors::wire_type(id)),
        timeout: None,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
