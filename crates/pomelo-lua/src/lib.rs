//! Lua 5.4 bindings for the pomelo client
//!
//! Scripts get a `pomelo` module that creates clients, and a client handle
//! with an event-emitter surface on top of the native request/notify/push
//! client from `pomelo-native`:
//! - **Listeners**: `on`/`once`/`off`/`listeners` per event name, fired in
//!   registration order against a snapshot
//! - **Completions**: request and notify callbacks correlated by token,
//!   each fired at most once
//! - **Polling**: `pomelo.poll()` drives every live client; all callbacks run
//!   from inside that call, on the thread that owns the Lua state
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  script: client:on(...), client:request(...) │
//! └──────────────────────────────────────────────┘
//!             │                     ▲
//!             ▼                     │ listeners / callbacks
//! ┌──────────────────────────────────────────────┐
//! │  LuaClient → Client                          │
//! │  ListenerRegistry · CorrelationTable         │
//! └──────────────────────────────────────────────┘
//!             │                     ▲
//!             ▼                     │ Vec<Delivery> from poll()
//! ┌──────────────────────────────────────────────┐
//! │  NativeClient (TCP, TLS, DUMMY, ...)         │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pomelo_lua::{register_pomelo_module, Pomelo};
//! use pomelo_native::DummyHub;
//! use std::rc::Rc;
//!
//! let lua = mlua::Lua::new();
//! let pomelo = Rc::new(Pomelo::with_dummy(DummyHub::new()));
//! register_pomelo_module(&lua, pomelo)?;
//!
//! lua.load(r#"
//!     local pomelo = require("pomelo")
//!     local client = pomelo.newClient({ transport_name = "DUMMY" })
//!     client:connect("127.0.0.1", 3010)
//!     pomelo.poll()
//! "#).exec()?;
//! ```

mod callback;
mod client;
mod correlation;
mod dispatch;
mod error;
mod listeners;
pub mod logging;
mod lua_client;
mod module;
mod poll;

pub use callback::Callback;
pub use client::{descriptor_table, Client, ClientRegistry};
pub use correlation::{
    error_reason, CallKind, CorrelationTable, PendingCall, RequestDescriptor, Resolution,
};
pub use dispatch::{
    dispatch, resolve, DispatchReport, Resolved, EVENT_CONNECTED, EVENT_DISCONNECT,
    EVENT_ERROR, EVENT_KICKED,
};
pub use error::{PomeloError, PomeloResult};
pub use listeners::{ListenerEntry, ListenerRegistry, Matcher, OnceId};
pub use lua_client::{LuaClient, LuaOnceListener};
pub use module::{register_pomelo_module, ConfigureOptions, Pomelo};
pub use poll::{ClientId, PollRegistry};
