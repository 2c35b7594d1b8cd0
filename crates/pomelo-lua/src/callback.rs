//! Script callbacks
//!
//! Anything Lua can call: a function, or a table whose metatable has
//! `__call`. Two callbacks are equal when they are the same Lua object (raw
//! equality), which is what listener removal compares.

use mlua::{Function, IntoLuaMulti, ObjectLike, Table, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Callback {
    Function(Function),
    Callable(Table),
}

impl Callback {
    /// `Some` when `value` can be called.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Function(f) => Some(Callback::Function(f.clone())),
            Value::Table(t) if has_call_metamethod(t) => Some(Callback::Callable(t.clone())),
            _ => None,
        }
    }

    /// Call with `args`, discarding whatever the callback returns.
    pub fn call(&self, args: impl IntoLuaMulti) -> mlua::Result<()> {
        match self {
            Callback::Function(f) => f.call::<()>(args),
            Callback::Callable(t) => t.call::<()>(args),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Callback::Function(f) => Value::Function(f.clone()),
            Callback::Callable(t) => Value::Table(t.clone()),
        }
    }
}

fn has_call_metamethod(table: &Table) -> bool {
    table
        .metatable()
        .and_then(|mt| mt.raw_get::<Value>("__call").ok())
        .is_some_and(|call| matches!(call, Value::Function(_)))
}
