//! Loopback transport
//!
//! `DUMMY` clients never touch the network. Each one is paired with a
//! [`DummyRemote`] that plays the server: it decides how requests are
//! answered and can push messages, kick the client or break the connection.
//! Everything the remote does is buffered and surfaces on the client's next
//! poll, like a real transport.
//!
//! ```rust,ignore
//! let hub = DummyHub::new();
//! let registry = TransportRegistry::with_dummy(hub.clone());
//! // ... create a client with transport_name = DUMMY ...
//! let remote = hub.latest().unwrap();
//! remote.reply("area.playerHandler.move", Reply::Fail(ResultCode::NotFound));
//! remote.push("onChat", r#"{"msg":"hi"}"#);
//! ```

use crate::client::NativeClient;
use crate::codes::{ClientState, ResultCode};
use crate::config::{ClientConfig, LibOptions};
use crate::event::{Completion, Delivery, NativeEvent, Timeout, Token};
use crate::transport::TransportFactory;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// How the remote answers messages sent to a route.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Reply {
    /// Respond with the request message itself
    #[default]
    Echo,
    Respond(String),
    Fail(ResultCode),
    /// Never answer; only a timeout (if any) completes the operation
    Silent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentKind {
    Request,
    Notify,
}

/// A message the client submitted, as seen by the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub kind: SentKind,
    pub route: String,
    pub message: String,
    pub timeout: Timeout,
}

#[derive(Debug)]
struct InFlight {
    token: Token,
    deadline: Option<Instant>,
}

#[derive(Debug)]
struct RemoteState {
    state: ClientState,
    conn_quality: i32,
    refuse: Option<String>,
    handshake: Option<String>,
    replies: HashMap<String, Reply>,
    outbox: VecDeque<Delivery>,
    in_flight: Vec<InFlight>,
    sent: Vec<SentMessage>,
    cleaned_up: bool,
}

impl Default for RemoteState {
    fn default() -> Self {
        Self {
            state: ClientState::Inited,
            conn_quality: 0,
            refuse: None,
            handshake: None,
            replies: HashMap::new(),
            outbox: VecDeque::new(),
            in_flight: Vec::new(),
            sent: Vec::new(),
            cleaned_up: false,
        }
    }
}

impl RemoteState {
    fn emit(&mut self, delivery: impl Into<Delivery>) {
        self.outbox.push_back(delivery.into());
    }

    /// Fail everything still waiting for an answer.
    fn reset_in_flight(&mut self) {
        for pending in std::mem::take(&mut self.in_flight) {
            self.emit(Completion::new(pending.token, ResultCode::Reset, None));
        }
    }

    fn answer(&mut self, token: Token, reply: Reply, message: &str, timeout: Timeout, wants_response: bool) {
        let completion = match reply {
            Reply::Echo => Completion::new(
                token,
                ResultCode::Ok,
                wants_response.then(|| message.to_string()),
            ),
            Reply::Respond(body) => {
                Completion::new(token, ResultCode::Ok, wants_response.then_some(body))
            }
            Reply::Fail(code) => Completion::new(token, code, None),
            Reply::Silent => {
                let deadline = timeout
                    .0
                    .map(|secs| Instant::now() + Duration::from_secs(u64::from(secs)));
                self.in_flight.push(InFlight { token, deadline });
                return;
            }
        };
        self.emit(completion);
    }
}

/// Server side of one loopback client.
#[derive(Debug, Clone, Default)]
pub struct DummyRemote {
    inner: Rc<RefCell<RemoteState>>,
}

impl DummyRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure how messages to `route` are answered.
    pub fn reply(&self, route: impl Into<String>, reply: Reply) {
        self.inner.borrow_mut().replies.insert(route.into(), reply);
    }

    /// Push a message on `route`.
    pub fn push(&self, route: impl Into<String>, payload: impl Into<String>) {
        self.inner.borrow_mut().emit(NativeEvent::Push {
            route: route.into(),
            payload: payload.into(),
        });
    }

    pub fn kick(&self) {
        let mut state = self.inner.borrow_mut();
        state.state = ClientState::Inited;
        state.reset_in_flight();
        state.emit(NativeEvent::KickedByServer);
    }

    /// Break the connection as if the network failed.
    pub fn drop_connection(&self, reason: impl Into<String>) {
        let mut state = self.inner.borrow_mut();
        state.state = ClientState::Inited;
        state.reset_in_flight();
        state.emit(NativeEvent::UnexpectedDisconnect(reason.into()));
    }

    pub fn protocol_error(&self, reason: impl Into<String>) {
        self.inner
            .borrow_mut()
            .emit(NativeEvent::ProtoError(reason.into()));
    }

    /// Raise an arbitrary event, including kinds the bridge ignores.
    pub fn emit(&self, event: NativeEvent) {
        self.inner.borrow_mut().emit(event);
    }

    /// Deliver a raw completion, bypassing the reply table.
    pub fn complete(&self, token: Token, code: ResultCode, response: Option<String>) {
        self.inner
            .borrow_mut()
            .emit(Completion::new(token, code, response));
    }

    /// Refuse subsequent connection attempts with `reason`; `None` accepts again.
    pub fn refuse_connections(&self, reason: Option<&str>) {
        self.inner.borrow_mut().refuse = reason.map(str::to_string);
    }

    pub fn set_conn_quality(&self, quality: i32) {
        self.inner.borrow_mut().conn_quality = quality;
    }

    pub fn state(&self) -> ClientState {
        self.inner.borrow().state
    }

    pub fn handshake(&self) -> Option<String> {
        self.inner.borrow().handshake.clone()
    }

    /// Every request and notify the client submitted, oldest first.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.inner.borrow().sent.clone()
    }

    /// Number of operations still waiting for an answer.
    pub fn in_flight(&self) -> usize {
        self.inner.borrow().in_flight.len()
    }

    pub fn is_cleaned_up(&self) -> bool {
        self.inner.borrow().cleaned_up
    }
}

/// Loopback native client.
#[derive(Debug)]
pub struct DummyClient {
    config: ClientConfig,
    remote: DummyRemote,
}

impl DummyClient {
    pub fn new(config: ClientConfig, remote: DummyRemote) -> Self {
        Self { config, remote }
    }

    fn require_connected(&self) -> Result<(), ResultCode> {
        match self.remote.state() {
            ClientState::Connected => Ok(()),
            _ => Err(ResultCode::InvalidState),
        }
    }

    fn record(&self, kind: SentKind, route: &str, message: &str, timeout: Timeout) {
        self.remote.inner.borrow_mut().sent.push(SentMessage {
            kind,
            route: route.to_string(),
            message: message.to_string(),
            timeout,
        });
    }

    fn reply_for(&self, route: &str) -> Reply {
        self.remote
            .inner
            .borrow()
            .replies
            .get(route)
            .cloned()
            .unwrap_or_default()
    }
}

impl NativeClient for DummyClient {
    fn connect(
        &mut self,
        host: &str,
        port: u16,
        handshake_opts: Option<&str>,
    ) -> Result<(), ResultCode> {
        if self.remote.state() != ClientState::Inited {
            return Err(ResultCode::InvalidState);
        }
        if let Some(opts) = handshake_opts {
            serde_json::from_str::<serde_json::Value>(opts).map_err(|_| ResultCode::InvalidJson)?;
        }

        debug!(host, port, "dummy transport connecting");
        let mut state = self.remote.inner.borrow_mut();
        state.handshake = handshake_opts.map(str::to_string);
        state.state = ClientState::Connecting;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), ResultCode> {
        let mut state = self.remote.inner.borrow_mut();
        match state.state {
            ClientState::Connecting | ClientState::Connected => {
                state.state = ClientState::Inited;
                state.reset_in_flight();
                state.emit(NativeEvent::Disconnect);
                Ok(())
            }
            _ => Err(ResultCode::InvalidState),
        }
    }

    fn request(
        &mut self,
        route: &str,
        message: &str,
        timeout: Timeout,
        token: Token,
    ) -> Result<(), ResultCode> {
        self.require_connected()?;
        if route.is_empty() {
            return Err(ResultCode::InvalidRoute);
        }
        self.record(SentKind::Request, route, message, timeout);

        let reply = self.reply_for(route);
        self.remote
            .inner
            .borrow_mut()
            .answer(token, reply, message, timeout, true);
        Ok(())
    }

    fn notify(
        &mut self,
        route: &str,
        message: &str,
        timeout: Timeout,
        token: Option<Token>,
    ) -> Result<(), ResultCode> {
        self.require_connected()?;
        if route.is_empty() {
            return Err(ResultCode::InvalidRoute);
        }
        self.record(SentKind::Notify, route, message, timeout);

        if let Some(token) = token {
            let reply = self.reply_for(route);
            self.remote
                .inner
                .borrow_mut()
                .answer(token, reply, message, timeout, false);
        }
        Ok(())
    }

    fn state(&self) -> ClientState {
        self.remote.state()
    }

    fn conn_quality(&self) -> i32 {
        self.remote.inner.borrow().conn_quality
    }

    fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn poll(&mut self) -> Result<Vec<Delivery>, ResultCode> {
        let mut state = self.remote.inner.borrow_mut();
        if state.cleaned_up {
            return Err(ResultCode::InvalidState);
        }

        if state.state == ClientState::Connecting {
            match state.refuse.clone() {
                Some(reason) => {
                    state.state = ClientState::Inited;
                    state.emit(NativeEvent::ConnectFailed(reason));
                }
                None => {
                    state.state = ClientState::Connected;
                    state.emit(NativeEvent::Connected);
                }
            }
        }

        let now = Instant::now();
        let (expired, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut state.in_flight)
            .into_iter()
            .partition(|pending| pending.deadline.is_some_and(|deadline| deadline <= now));
        state.in_flight = waiting;
        for pending in expired {
            state.emit(Completion::new(pending.token, ResultCode::Timeout, None));
        }

        let deliveries: Vec<Delivery> = state.outbox.drain(..).collect();
        trace!(count = deliveries.len(), "dummy transport poll");
        Ok(deliveries)
    }

    fn cleanup(&mut self) {
        let mut state = self.remote.inner.borrow_mut();
        state.outbox.clear();
        state.in_flight.clear();
        state.state = ClientState::Inited;
        state.cleaned_up = true;
    }
}

/// Records the remote of every loopback client its factory creates.
#[derive(Debug, Clone, Default)]
pub struct DummyHub {
    remotes: Rc<RefCell<Vec<DummyRemote>>>,
}

impl DummyHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory for [`crate::TransportRegistry`].
    pub fn factory(&self) -> TransportFactory {
        let remotes = self.remotes.clone();
        Rc::new(
            move |config: &ClientConfig, _options: &LibOptions| -> Result<Box<dyn NativeClient>, ResultCode> {
                let remote = DummyRemote::new();
                remotes.borrow_mut().push(remote.clone());
                Ok(Box::new(DummyClient::new(config.clone(), remote)))
            },
        )
    }

    /// Remote of the `index`-th client created, oldest first.
    pub fn remote(&self, index: usize) -> Option<DummyRemote> {
        self.remotes.borrow().get(index).cloned()
    }

    pub fn latest(&self) -> Option<DummyRemote> {
        self.remotes.borrow().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.remotes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.remotes.borrow().is_empty()
    }
}
