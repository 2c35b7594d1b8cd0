//! The `pomelo` Lua module
//!
//! ```lua
//! local pomelo = require("pomelo")
//! pomelo.configure({ log = "WARN" })
//!
//! local client = pomelo.newClient({ transport_name = "TCP" })
//! client:on("connected", function() print("up") end)
//! client:connect("127.0.0.1", 3010)
//!
//! while running do
//!     pomelo.poll()
//! end
//! ```

use crate::client::{Client, ClientRegistry};
use crate::error::{PomeloError, PomeloResult};
use crate::logging;
use crate::lua_client::LuaClient;
use mlua::{Lua, LuaSerdeExt, Table, Value};
use pomelo_native::{
    ClientConfig, DummyHub, LibOptions, LogLevel, TransportFactory, TransportRegistry,
    TransportSelector,
};
use serde::Deserialize;
use std::cell::RefCell;
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;
use tracing::{debug, warn};

/// Options accepted by `pomelo.configure`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConfigureOptions {
    #[serde(alias = "logLevel")]
    pub log: Option<LogLevel>,
    #[serde(alias = "caFile")]
    pub cafile: Option<PathBuf>,
    #[serde(alias = "caPath")]
    pub capath: Option<PathBuf>,
}

/// Library state shared by every client created through one module instance.
pub struct Pomelo {
    registry: Rc<ClientRegistry>,
    transports: RefCell<TransportRegistry>,
    options: RefCell<LibOptions>,
}

impl fmt::Debug for Pomelo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pomelo")
            .field("clients", &self.registry.len())
            .field("transports", &self.transports.borrow())
            .field("options", &self.options.borrow())
            .finish()
    }
}

impl Pomelo {
    pub fn new(transports: TransportRegistry) -> Self {
        Self {
            registry: Rc::new(ClientRegistry::new()),
            transports: RefCell::new(transports),
            options: RefCell::new(LibOptions::default()),
        }
    }

    /// Runtime whose only transport is the loopback one recorded in `hub`.
    pub fn with_dummy(hub: DummyHub) -> Self {
        Self::new(TransportRegistry::with_dummy(hub))
    }

    pub fn register_transport(&self, selector: TransportSelector, factory: TransportFactory) {
        self.transports.borrow_mut().register(selector, factory);
    }

    /// Apply library options. The log level falls back to `DISABLE` when
    /// absent; CA settings are replaced together when either is given.
    pub fn configure(&self, opts: ConfigureOptions) {
        let level = opts.log.unwrap_or_default();
        {
            let mut options = self.options.borrow_mut();
            options.log_level = level;
            if opts.cafile.is_some() || opts.capath.is_some() {
                options.ca_file = opts.cafile;
                options.ca_path = opts.capath;
            }
        }
        logging::init_logging(level);
        debug!(?level, "pomelo configured");
    }

    pub fn options(&self) -> LibOptions {
        self.options.borrow().clone()
    }

    pub fn create_client(&self, config: ClientConfig) -> PomeloResult<Rc<Client>> {
        let transports = self.transports.borrow();
        let options = self.options.borrow();
        Client::create(config, &transports, &options, &self.registry)
    }

    /// One poll step for every open client; returns how many were driven.
    ///
    /// A client closed by an earlier client's step is skipped. Failures of
    /// one client's step are logged and do not stop the others.
    pub fn poll(&self, lua: &Lua) -> usize {
        let mut polled = 0;
        self.registry.for_each(|client| {
            if !client.is_open() {
                return;
            }
            polled += 1;
            if let Err(err) = client.poll(lua) {
                warn!(client = %client.id(), "poll failed: {err}");
            }
        });
        polled
    }

    /// Number of clients in the poll registry.
    pub fn live_clients(&self) -> usize {
        self.registry.len()
    }
}

fn client_config(lua: &Lua, opts: Value) -> PomeloResult<ClientConfig> {
    match opts {
        Value::Nil => Ok(ClientConfig::default()),
        value @ Value::Table(_) => lua
            .from_value(value)
            .map_err(|err| PomeloError::bad_argument(1, "newClient", err.to_string())),
        other => Err(PomeloError::bad_argument(
            1,
            "newClient",
            format!("table expected, got {}", other.type_name()),
        )),
    }
}

fn configure_options(lua: &Lua, opts: Value) -> PomeloResult<ConfigureOptions> {
    match opts {
        Value::Nil => Ok(ConfigureOptions::default()),
        value @ Value::Table(_) => lua
            .from_value(value)
            .map_err(|err| PomeloError::bad_argument(1, "configure", err.to_string())),
        other => Err(PomeloError::bad_argument(
            1,
            "configure",
            format!("table expected, got {}", other.type_name()),
        )),
    }
}

/// Build the `pomelo` module table and install it as `package.loaded.pomelo`.
pub fn register_pomelo_module(lua: &Lua, pomelo: Rc<Pomelo>) -> mlua::Result<Table> {
    let module = lua.create_table()?;

    let runtime = pomelo.clone();
    module.set(
        "configure",
        lua.create_function(move |lua, opts: Value| {
            runtime.configure(configure_options(lua, opts)?);
            Ok(())
        })?,
    )?;

    module.set(
        "version",
        lua.create_function(|_, ()| Ok(pomelo_native::VERSION))?,
    )?;

    // newClient(opts?) -> client | nil, reason
    let runtime = pomelo.clone();
    let new_client = lua.create_function(move |lua, opts: Value| {
        let config = client_config(lua, opts)?;
        match runtime.create_client(config) {
            Ok(client) => Ok((Some(lua.create_userdata(LuaClient::new(client))?), None)),
            Err(PomeloError::Native(rc)) => Ok((None, Some(rc.reason()))),
            Err(err) => Err(err.into()),
        }
    })?;
    module.set("newClient", new_client.clone())?;
    module.set("createClient", new_client)?;

    let runtime = pomelo;
    module.set(
        "poll",
        lua.create_function(move |lua, ()| {
            runtime.poll(lua);
            Ok(())
        })?,
    )?;

    let loaded: Table = lua.globals().get::<Table>("package")?.get("loaded")?;
    loaded.set("pomelo", module.clone())?;
    Ok(module)
}
