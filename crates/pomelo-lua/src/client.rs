//! Client lifecycle
//!
//! A [`Client`] owns one native client together with its listener registry
//! and its pending completion callbacks. It is created open and registered in
//! a poll registry; [`Client::close`] and dropping the last strong reference
//! (the Lua handle being collected) both run the same idempotent teardown:
//!
//! 1. the native client is taken out, marking the handle closed
//! 2. the client leaves the poll registry
//! 3. listeners and pending callbacks are released, pending ones unfired
//! 4. native cleanup runs
//!
//! Every other operation on a closed client fails with [`PomeloError::Closed`].

use crate::callback::Callback;
use crate::correlation::{CallKind, CorrelationTable, RequestDescriptor, Resolution};
use crate::dispatch::{self, DispatchReport};
use crate::error::{PomeloError, PomeloResult};
use crate::listeners::{ListenerEntry, ListenerRegistry, Matcher, OnceId};
use crate::poll::{ClientId, PollRegistry};
use mlua::{Lua, Table};
use pomelo_native::{
    ClientConfig, ClientState, Completion, Delivery, LibOptions, NativeClient, NativeEvent,
    Timeout, TransportRegistry,
};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, error, info};

/// Poll registry holding live clients.
pub type ClientRegistry = PollRegistry<Client>;

pub struct Client {
    id: ClientId,
    native: RefCell<Option<Box<dyn NativeClient>>>,
    listeners: RefCell<ListenerRegistry<Callback>>,
    pending: RefCell<CorrelationTable<Callback>>,
    registry: Rc<ClientRegistry>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .field("pending", &self.pending.borrow().len())
            .finish()
    }
}

impl Client {
    /// Validate `config`, allocate the native client and register the new
    /// client for polling.
    ///
    /// Invalid configuration is a caller error. A transport that cannot
    /// allocate yields [`PomeloError::Native`] and leaves nothing behind.
    pub fn create(
        config: ClientConfig,
        transports: &TransportRegistry,
        options: &LibOptions,
        registry: &Rc<ClientRegistry>,
    ) -> PomeloResult<Rc<Self>> {
        config.validate()?;
        let native = transports.create(&config, options)?;

        let id = registry.allocate_id();
        let client = Rc::new(Self {
            id,
            native: RefCell::new(Some(native)),
            listeners: RefCell::new(ListenerRegistry::new()),
            pending: RefCell::new(CorrelationTable::new()),
            registry: registry.clone(),
        });
        registry.add(id, &client);

        info!(client = %id, transport = %config.transport_name, "client created");
        Ok(client)
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn is_open(&self) -> bool {
        self.native.borrow().is_some()
    }

    /// Idempotent teardown.
    pub fn close(&self) {
        let Some(mut native) = self.native.borrow_mut().take() else {
            return;
        };

        self.registry.remove(self.id);
        self.listeners.borrow_mut().clear();
        let dropped = self.pending.borrow_mut().clear();
        native.cleanup();

        debug!(client = %self.id, dropped, "client closed");
    }

    fn ensure_open(&self) -> PomeloResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(PomeloError::Closed)
        }
    }

    /// Run `f` against the native client. The borrow ends before any script
    /// code can run.
    fn with_native<R>(&self, f: impl FnOnce(&mut dyn NativeClient) -> R) -> PomeloResult<R> {
        let mut native = self.native.borrow_mut();
        let native = native.as_mut().ok_or(PomeloError::Closed)?;
        Ok(f(native.as_mut()))
    }

    pub fn connect(&self, host: &str, port: u16, handshake_opts: Option<&str>) -> PomeloResult<()> {
        self.with_native(|native| native.connect(host, port, handshake_opts))?
            .map_err(PomeloError::from)
    }

    pub fn disconnect(&self) -> PomeloResult<()> {
        self.with_native(|native| native.disconnect())?
            .map_err(PomeloError::from)
    }

    pub fn state(&self) -> PomeloResult<ClientState> {
        self.with_native(|native| native.state())
    }

    pub fn conn_quality(&self) -> PomeloResult<i32> {
        self.with_native(|native| native.conn_quality())
    }

    pub fn config(&self) -> PomeloResult<ClientConfig> {
        self.with_native(|native| native.config().clone())
    }

    /// Send a request; `callback` fires once with its completion.
    pub fn request(
        &self,
        route: &str,
        message: &str,
        timeout: Timeout,
        callback: Callback,
    ) -> PomeloResult<()> {
        self.ensure_open()?;
        let descriptor = RequestDescriptor::new(route, message, timeout);
        let token = self
            .pending
            .borrow_mut()
            .register(CallKind::Request, descriptor, callback);

        let submitted = self.with_native(|native| native.request(route, message, timeout, token))?;
        if let Err(rc) = submitted {
            self.pending.borrow_mut().take(token);
            return Err(rc.into());
        }
        Ok(())
    }

    /// Send a notify; without a callback its completion is discarded.
    pub fn notify(
        &self,
        route: &str,
        message: &str,
        timeout: Timeout,
        callback: Option<Callback>,
    ) -> PomeloResult<()> {
        self.ensure_open()?;
        let token = callback.map(|callback| {
            let descriptor = RequestDescriptor::new(route, message, timeout);
            self.pending
                .borrow_mut()
                .register(CallKind::Notify, descriptor, callback)
        });

        let submitted = self.with_native(|native| native.notify(route, message, timeout, token))?;
        if let Err(rc) = submitted {
            if let Some(token) = token {
                self.pending.borrow_mut().take(token);
            }
            return Err(rc.into());
        }
        Ok(())
    }

    pub fn on(&self, event: &str, callback: Callback) -> PomeloResult<()> {
        self.ensure_open()?;
        self.listeners.borrow_mut().on(event, callback);
        Ok(())
    }

    pub fn once(&self, event: &str, callback: Callback) -> PomeloResult<OnceId> {
        self.ensure_open()?;
        Ok(self.listeners.borrow_mut().once(event, callback))
    }

    pub fn off(&self, event: &str, matcher: &Matcher<'_, Callback>) -> PomeloResult<bool> {
        self.ensure_open()?;
        Ok(self.listeners.borrow_mut().off(event, matcher))
    }

    pub fn listeners(&self, event: &str) -> PomeloResult<Vec<ListenerEntry<Callback>>> {
        self.ensure_open()?;
        Ok(self.listeners.borrow().listeners(event))
    }

    /// Remove a fired once-entry. A closed client has nothing left to remove.
    pub(crate) fn remove_once(&self, event: &str, id: OnceId) {
        self.listeners.borrow_mut().off(event, &Matcher::Once(id));
    }

    /// Number of callbacks waiting for a completion.
    pub fn pending_callbacks(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Drive the native client once and route what it delivered.
    ///
    /// Listeners and completion callbacks run synchronously from here and may
    /// call back into this client, including closing it.
    pub fn poll(&self, lua: &Lua) -> PomeloResult<()> {
        let deliveries = self.with_native(|native| native.poll())??;
        for delivery in deliveries {
            match delivery {
                Delivery::Event(event) => {
                    self.dispatch(&event);
                }
                Delivery::Completion(completion) => self.complete(lua, completion),
            }
        }
        Ok(())
    }

    /// Fan a native event out to this client's listeners.
    pub fn dispatch(&self, event: &NativeEvent) -> DispatchReport {
        dispatch::dispatch(&self.listeners, event, |callback, arg| match arg {
            Some(arg) => callback.call(arg),
            None => callback.call(()),
        })
    }

    /// Fire the callback parked for `completion`, if any.
    pub fn complete(&self, lua: &Lua, completion: Completion) {
        let resolution = self.pending.borrow_mut().resolve(completion);
        let Some(Resolution {
            call,
            error,
            response,
        }) = resolution
        else {
            return;
        };

        let result = descriptor_table(lua, &call.descriptor).and_then(|descriptor| {
            match call.kind {
                CallKind::Request => call.callback.call((error, descriptor, response)),
                CallKind::Notify => call.callback.call((error, descriptor)),
            }
        });
        if let Err(err) = result {
            error!(
                client = %self.id,
                route = %call.descriptor.route,
                "completion callback failed: {err}"
            );
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close();
    }
}

/// `{route, message, timeout}` as handed to completion callbacks.
pub fn descriptor_table(lua: &Lua, descriptor: &RequestDescriptor) -> mlua::Result<Table> {
    let table = lua.create_table()?;
    table.set("route", descriptor.route.as_str())?;
    table.set("message", descriptor.message.as_str())?;
    table.set("timeout", descriptor.timeout.as_script())?;
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlua::Value;
    use pomelo_native::{DummyHub, Reply, ResultCode, TransportSelector};

    struct Fixture {
        lua: Lua,
        hub: DummyHub,
        transports: TransportRegistry,
        registry: Rc<ClientRegistry>,
    }

    impl Fixture {
        fn new() -> Self {
            let hub = DummyHub::new();
            Self {
                lua: Lua::new(),
                transports: TransportRegistry::with_dummy(hub.clone()),
                hub,
                registry: Rc::new(ClientRegistry::new()),
            }
        }

        fn client(&self) -> Rc<Client> {
            let config = ClientConfig::default().with_transport(TransportSelector::Dummy);
            Client::create(config, &self.transports, &LibOptions::default(), &self.registry)
                .unwrap()
        }

        fn connected(&self) -> Rc<Client> {
            let client = self.client();
            client.connect("127.0.0.1", 3010, None).unwrap();
            client.poll(&self.lua).unwrap();
            client
        }

        fn callback(&self, source: &str) -> Callback {
            let value: Value = self.lua.load(source).eval().unwrap();
            Callback::from_value(&value).unwrap()
        }
    }

    #[test]
    fn create_registers_for_polling() {
        let fx = Fixture::new();
        let client = fx.client();
        assert!(client.is_open());
        assert!(fx.registry.contains(client.id()));
        assert_eq!(client.state().unwrap(), ClientState::Inited);
    }

    #[test]
    fn create_with_missing_transport_leaves_nothing_behind() {
        let fx = Fixture::new();
        let err = Client::create(
            ClientConfig::default(),
            &fx.transports,
            &LibOptions::default(),
            &fx.registry,
        )
        .unwrap_err();
        assert!(matches!(err, PomeloError::Native(ResultCode::NoTrans)));
        assert!(fx.registry.is_empty());
    }

    #[test]
    fn create_rejects_invalid_config() {
        let fx = Fixture::new();
        let config = ClientConfig {
            conn_timeout: -5,
            ..ClientConfig::default().with_transport(TransportSelector::Dummy)
        };
        let err = Client::create(config, &fx.transports, &LibOptions::default(), &fx.registry)
            .unwrap_err();
        assert!(matches!(err, PomeloError::Config(_)));
        assert!(fx.hub.is_empty());
    }

    #[test]
    fn close_is_idempotent_and_releases_everything() {
        let fx = Fixture::new();
        let client = fx.connected();
        let remote = fx.hub.latest().unwrap();
        remote.reply("slow", Reply::Silent);
        client
            .request("slow", "x", Timeout::NONE, fx.callback("return function() end"))
            .unwrap();
        client.on("connected", fx.callback("return function() end")).unwrap();

        client.close();
        client.close();

        assert!(!client.is_open());
        assert!(!fx.registry.contains(client.id()));
        assert_eq!(client.pending_callbacks(), 0);
        assert!(remote.is_cleaned_up());
    }

    #[test]
    fn operations_after_close_fail() {
        let fx = Fixture::new();
        let client = fx.client();
        client.close();

        assert!(matches!(client.connect("h", 1, None), Err(PomeloError::Closed)));
        assert!(matches!(client.state(), Err(PomeloError::Closed)));
        assert!(matches!(client.listeners("e"), Err(PomeloError::Closed)));
        assert!(matches!(client.poll(&fx.lua), Err(PomeloError::Closed)));
        let cb = fx.callback("return function() end");
        assert!(matches!(client.on("e", cb.clone()), Err(PomeloError::Closed)));
        assert!(matches!(
            client.request("r", "m", Timeout::NONE, cb),
            Err(PomeloError::Closed)
        ));
    }

    #[test]
    fn dropping_last_reference_tears_down() {
        let fx = Fixture::new();
        let client = fx.client();
        let id = client.id();
        drop(client);
        assert!(!fx.registry.contains(id));
        assert!(fx.hub.latest().unwrap().is_cleaned_up());
    }

    #[test]
    fn rejected_request_releases_its_token() {
        let fx = Fixture::new();
        let client = fx.client();
        let err = client
            .request("echo", "hi", Timeout::NONE, fx.callback("return function() end"))
            .unwrap_err();
        assert!(matches!(err, PomeloError::Native(ResultCode::InvalidState)));
        assert_eq!(client.pending_callbacks(), 0);
    }

    #[test]
    fn request_callback_fires_once_with_descriptor() {
        let fx = Fixture::new();
        let client = fx.connected();
        fx.hub
            .latest()
            .unwrap()
            .reply("echo", Reply::Fail(ResultCode::NotFound));

        fx.lua.globals().set("calls", 0).unwrap();
        let cb = fx.callback(
            r#"return function(err, req, res)
                calls = calls + 1
                last_err, last_route, last_msg, last_timeout, last_res = err, req.route, req.message, req.timeout, res
            end"#,
        );
        client.request("echo", "hello", Timeout::secs(1000), cb).unwrap();
        assert_eq!(client.pending_callbacks(), 1);

        client.poll(&fx.lua).unwrap();
        client.poll(&fx.lua).unwrap();

        let globals = fx.lua.globals();
        assert_eq!(globals.get::<i64>("calls").unwrap(), 1);
        assert_eq!(globals.get::<String>("last_err").unwrap(), "NOT_FOUND");
        assert_eq!(globals.get::<String>("last_route").unwrap(), "echo");
        assert_eq!(globals.get::<String>("last_msg").unwrap(), "hello");
        assert_eq!(globals.get::<i64>("last_timeout").unwrap(), 1000);
        assert_eq!(globals.get::<Option<String>>("last_res").unwrap(), None);
        assert_eq!(client.pending_callbacks(), 0);
    }

    #[test]
    fn duplicate_completion_is_ignored() {
        let fx = Fixture::new();
        let client = fx.connected();
        let remote = fx.hub.latest().unwrap();
        remote.reply("echo", Reply::Silent);

        fx.lua.globals().set("calls", 0).unwrap();
        let cb = fx.callback("return function() calls = calls + 1 end");
        client.request("echo", "hello", Timeout::NONE, cb).unwrap();

        let token = pomelo_native::Token(1);
        remote.complete(token, ResultCode::Ok, Some("a".into()));
        remote.complete(token, ResultCode::Ok, Some("b".into()));
        client.poll(&fx.lua).unwrap();

        assert_eq!(fx.lua.globals().get::<i64>("calls").unwrap(), 1);
    }

    #[test]
    fn failing_completion_callback_is_swallowed() {
        let fx = Fixture::new();
        let client = fx.connected();
        let cb = fx.callback("return function() error('callback broke') end");
        client.request("echo", "hello", Timeout::NONE, cb).unwrap();

        assert!(client.poll(&fx.lua).is_ok());
        assert_eq!(client.pending_callbacks(), 0);
    }

    #[test]
    fn listener_can_close_its_own_client() {
        let fx = Fixture::new();
        let client = fx.connected();
        let remote = fx.hub.latest().unwrap();

        let closer = client.clone();
        let cb = Callback::Function(
            fx.lua
                .create_function(move |_, ()| {
                    closer.close();
                    Ok(())
                })
                .unwrap(),
        );
        client.on("onChat", cb).unwrap();
        fx.lua.globals().set("later", 0).unwrap();
        client
            .on("onChat", fx.callback("return function() later = later + 1 end"))
            .unwrap();

        remote.push("onChat", "a");
        remote.push("onChat", "b");
        client.poll(&fx.lua).unwrap();

        assert!(!client.is_open());
        // the snapshot of the first push still ran; the second found nothing
        assert_eq!(fx.lua.globals().get::<i64>("later").unwrap(), 1);
    }
}
