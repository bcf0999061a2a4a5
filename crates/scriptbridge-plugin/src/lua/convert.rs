//! Conversion between host values and Lua values.

use std::sync::Arc;

use mlua::{Function, Lua, MultiValue, Value};
use scriptbridge_core::{BridgeError, BridgeResult, Handle, HostFunction, HostValue, TypeHint};

use super::proxy::LuaProxy;

/// Convert a host value into a Lua value.
///
/// Composites are never copied: they become proxy userdata over the shared
/// host storage. Unsigned integers above `i64::MAX` keep their bit pattern
/// and appear negative to scripts.
pub fn to_script(lua: &Lua, value: HostValue) -> mlua::Result<Value> {
    match value {
        HostValue::Nil => Ok(Value::Nil),
        HostValue::Bool(b) => Ok(Value::Boolean(b)),
        HostValue::Int(i) => Ok(Value::Integer(i)),
        HostValue::UInt(u) => Ok(Value::Integer(u as i64)),
        HostValue::Float(f) => Ok(Value::Number(f)),
        HostValue::String(s) => lua.create_string(&s).map(Value::String),
        HostValue::Function(f) => host_function(lua, f).map(Value::Function),
        HostValue::Sequence(_)
        | HostValue::Mapping(_)
        | HostValue::Channel(_)
        | HostValue::Struct(_)
        | HostValue::Pointer(_) => match Handle::from_host(&value) {
            Some(handle) => lua.create_userdata(LuaProxy(handle)).map(Value::UserData),
            None => Ok(Value::Nil),
        },
    }
}

/// Convert a Lua value into a host value of the kind `hint` describes.
///
/// Only strings, numbers and booleans convert; every other destination is
/// [`BridgeError::UnsupportedType`].
pub fn to_host(value: Value, hint: TypeHint) -> BridgeResult<HostValue> {
    if !hint.is_convertible() {
        return Err(BridgeError::UnsupportedType { hint });
    }
    match (hint, value) {
        (TypeHint::String, Value::String(s)) => Ok(HostValue::String(s.to_string_lossy())),
        (TypeHint::Number(width), Value::Integer(i)) => Ok(width.from_i64(i)),
        (TypeHint::Number(width), Value::Number(n)) => Ok(width.from_f64(n)),
        (TypeHint::Bool, Value::Boolean(b)) => Ok(HostValue::Bool(b)),
        (hint, other) => Err(BridgeError::mismatch(hint, describe(&other))),
    }
}

/// Short description of a Lua value's type, naming the kind for proxies.
pub fn describe(value: &Value) -> String {
    match value {
        Value::Integer(_) | Value::Number(_) => "number".to_string(),
        Value::UserData(ud) => match ud.borrow::<LuaProxy>() {
            Ok(proxy) => proxy.0.kind().to_string(),
            Err(_) => value.type_name().to_string(),
        },
        other => other.type_name().to_string(),
    }
}

/// Render a Lua value for display.
pub fn render(value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.to_string_lossy(),
        Value::UserData(ud) => match ud.borrow::<LuaProxy>() {
            Ok(proxy) => proxy.0.to_string(),
            Err(_) => value.type_name().to_string(),
        },
        other => other.type_name().to_string(),
    }
}

/// Bad-argument error for the argument at `pos` (1-based, receiver included).
pub(crate) fn bad_argument(pos: usize, err: BridgeError) -> mlua::Error {
    mlua::Error::BadArgument {
        to: None,
        pos,
        name: None,
        cause: Arc::new(mlua::Error::external(err)),
    }
}

/// Convert call arguments with declared parameter hints.
///
/// Missing arguments are converted from nil; extra arguments are dropped.
/// `first_pos` is the position of the first converted argument.
pub(crate) fn convert_args(
    args: impl IntoIterator<Item = Value>,
    params: &[TypeHint],
    first_pos: usize,
) -> mlua::Result<Vec<HostValue>> {
    let mut args = args.into_iter();
    params
        .iter()
        .enumerate()
        .map(|(i, hint)| {
            let value = args.next().unwrap_or(Value::Nil);
            to_host(value, *hint).map_err(|e| bad_argument(first_pos + i, e))
        })
        .collect()
}

/// Expose a host function as a Lua function.
fn host_function(lua: &Lua, func: HostFunction) -> mlua::Result<Function> {
    lua.create_function(move |lua, args: MultiValue| {
        let args = convert_args(args, func.params(), 1)?;
        let result = func.call(args).map_err(mlua::Error::external)?;
        to_script(lua, result)
    })
}
