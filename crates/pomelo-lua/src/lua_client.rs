//! Client handle exposed to Lua
//!
//! Caller mistakes (bad arguments, use after close) raise Lua errors.
//! Operational failures reported by the native layer come back as
//! `nil, reason` so scripts can branch on them:
//!
//! ```lua
//! local ok, err = client:connect("127.0.0.1", 3010)
//! if not ok then print("connect failed: " .. err) end
//! ```

use crate::callback::Callback;
use crate::client::Client;
use crate::error::{PomeloError, PomeloResult};
use crate::listeners::{ListenerEntry, Matcher, OnceId};
use mlua::{
    AnyUserData, Lua, LuaSerdeExt, MetaMethod, MultiValue, UserData, UserDataMethods, Value,
};
use pomelo_native::Timeout;
use std::rc::{Rc, Weak};
use tracing::error;

/// `(true)` on success, `(nil, reason)` for native failures, raise otherwise.
pub(crate) fn status(result: PomeloResult<()>) -> mlua::Result<(Option<bool>, Option<&'static str>)> {
    match result {
        Ok(()) => Ok((Some(true), None)),
        Err(PomeloError::Native(rc)) => Ok((None, Some(rc.reason()))),
        Err(err) => Err(err.into()),
    }
}

/// Script handle for a [`Client`].
pub struct LuaClient {
    inner: Rc<Client>,
}

impl LuaClient {
    pub fn new(inner: Rc<Client>) -> Self {
        Self { inner }
    }

    pub fn client(&self) -> &Rc<Client> {
        &self.inner
    }

    fn from_userdata(ud: &AnyUserData) -> mlua::Result<Rc<Client>> {
        Ok(ud.borrow::<LuaClient>()?.inner.clone())
    }
}

/// A once-listener as returned by `client:listeners()`.
///
/// Calling it runs the wrapped callback and removes the entry; passing it to
/// `client:off()` removes the entry without running it.
pub struct LuaOnceListener {
    client: Weak<Client>,
    event: String,
    id: OnceId,
    callback: Callback,
}

impl UserData for LuaOnceListener {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::Call, |_, this, args: MultiValue| {
            let result = this.callback.call(args);
            if let Some(client) = this.client.upgrade() {
                client.remove_once(&this.event, this.id);
            }
            if let Err(err) = result {
                error!(event = %this.event, "once listener failed: {err}");
            }
            Ok(())
        });

        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
            Ok(format!("OnceListener ({}, {})", this.event, this.id))
        });
    }
}

fn callable(value: &Value, position: usize, function: &'static str) -> PomeloResult<Callback> {
    Callback::from_value(value).ok_or_else(|| {
        PomeloError::bad_argument(
            position,
            function,
            format!("function expected, got {}", value.type_name()),
        )
    })
}

fn check_message(message: &str, function: &'static str) -> PomeloResult<()> {
    if message.is_empty() {
        return Err(PomeloError::bad_argument(3, function, "message should not be empty"));
    }
    Ok(())
}

/// Split the trailing `timeout?, callback?` arguments of request/notify.
fn timeout_and_callback(
    function: &'static str,
    fourth: Value,
    fifth: Value,
    callback_required: bool,
) -> PomeloResult<(Timeout, Option<Callback>)> {
    let (timeout, callback, position) = match fourth {
        Value::Integer(secs) => (Timeout::from_script(secs), fifth, 5),
        Value::Number(secs) => (Timeout::from_script(secs as i64), fifth, 5),
        Value::Nil if !callback_required => return Ok((Timeout::NONE, None)),
        value if Callback::from_value(&value).is_some() => (Timeout::NONE, value, 4),
        value => {
            return Err(PomeloError::bad_argument(
                4,
                function,
                format!("number or function expected, got {}", value.type_name()),
            ))
        }
    };

    match callback {
        Value::Nil if !callback_required => Ok((timeout, None)),
        value => callable(&value, position, function).map(|cb| (timeout, Some(cb))),
    }
}

fn lua_on(_: &Lua, (ud, event, callback): (AnyUserData, String, Value)) -> mlua::Result<AnyUserData> {
    let client = LuaClient::from_userdata(&ud)?;
    client.on(&event, callable(&callback, 3, "on")?)?;
    Ok(ud)
}

fn lua_off(_: &Lua, (ud, event, matcher): (AnyUserData, String, Value)) -> mlua::Result<AnyUserData> {
    let client = LuaClient::from_userdata(&ud)?;
    match &matcher {
        Value::UserData(handle) if handle.is::<LuaOnceListener>() => {
            let id = handle.borrow::<LuaOnceListener>()?.id;
            client.off(&event, &Matcher::Once(id))?;
        }
        value => {
            let callback = Callback::from_value(value).ok_or_else(|| {
                PomeloError::bad_argument(
                    3,
                    "off",
                    format!("function or listener expected, got {}", value.type_name()),
                )
            })?;
            client.off(&event, &Matcher::Callback(&callback))?;
        }
    }
    Ok(ud)
}

fn lua_conn_quality(_: &Lua, this: &LuaClient, (): ()) -> mlua::Result<i32> {
    Ok(this.inner.conn_quality()?)
}

impl UserData for LuaClient {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        // connect(host, port, handshake_opts?) -> true | nil, reason
        methods.add_method(
            "connect",
            |_, this, (host, port, handshake): (String, i64, Option<String>)| {
                let port = u16::try_from(port).map_err(|_| {
                    PomeloError::bad_argument(3, "connect", format!("port out of range: {port}"))
                })?;
                status(this.inner.connect(&host, port, handshake.as_deref()))
            },
        );

        methods.add_method("disconnect", |_, this, ()| status(this.inner.disconnect()));

        // request(route, message, timeout?, callback)
        methods.add_method(
            "request",
            |_, this, (route, message, fourth, fifth): (String, String, Value, Value)| {
                check_message(&message, "request")?;
                let (timeout, callback) = timeout_and_callback("request", fourth, fifth, true)?;
                let callback = callback.ok_or_else(|| {
                    PomeloError::bad_argument(4, "request", "function expected, got nil")
                })?;
                status(this.inner.request(&route, &message, timeout, callback))
            },
        );

        // notify(route, message, timeout?, callback?)
        methods.add_method(
            "notify",
            |_, this, (route, message, fourth, fifth): (String, String, Value, Value)| {
                check_message(&message, "notify")?;
                let (timeout, callback) = timeout_and_callback("notify", fourth, fifth, false)?;
                status(this.inner.notify(&route, &message, timeout, callback))
            },
        );

        methods.add_function("on", lua_on);
        methods.add_function("addListener", lua_on);

        methods.add_function(
            "once",
            |_, (ud, event, callback): (AnyUserData, String, Value)| {
                let client = LuaClient::from_userdata(&ud)?;
                client.once(&event, callable(&callback, 3, "once")?)?;
                Ok(ud)
            },
        );

        methods.add_function("off", lua_off);
        methods.add_function("removeListener", lua_off);

        methods.add_method("listeners", |lua, this, event: String| {
            let entries = this.inner.listeners(&event)?;
            let table = lua.create_table_with_capacity(entries.len(), 0)?;
            for entry in entries {
                let value = match entry {
                    ListenerEntry::Plain(callback) => callback.to_value(),
                    ListenerEntry::Once { callback, id } => {
                        Value::UserData(lua.create_userdata(LuaOnceListener {
                            client: Rc::downgrade(&this.inner),
                            event: event.clone(),
                            id,
                            callback,
                        })?)
                    }
                };
                table.raw_push(value)?;
            }
            Ok(table)
        });

        methods.add_method("config", |lua, this, ()| lua.to_value(&this.inner.config()?));

        methods.add_method("state", |_, this, ()| Ok(this.inner.state()?.name()));

        methods.add_method("conn_quality", lua_conn_quality);
        methods.add_method("connQuality", lua_conn_quality);

        methods.add_method("poll", |lua, this, ()| status(this.inner.poll(lua)));

        methods.add_method("close", |_, this, ()| {
            this.inner.close();
            Ok(())
        });

        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
            if this.inner.is_open() {
                Ok(format!("Client ({})", this.inner.id()))
            } else {
                Ok("Client (closed)".to_string())
            }
        });
    }
}
