//! Resolving and invoking script functions from the host.

use mlua::{Function, Lua, MultiValue, Value};
use scriptbridge_core::{BridgeError, BridgeResult, HostValue};
use tracing::debug;

use super::convert::to_script;

/// Resolve a bare or `namespace.function` name to a function.
pub(crate) fn resolve(lua: &Lua, name: &str) -> BridgeResult<Function> {
    let globals = lua.globals();
    let lookup = |e: mlua::Error| BridgeError::script(format!("resolve {name}"), e);
    let value = match name.split_once('.') {
        Some((namespace, field)) => match globals.get::<Value>(namespace).map_err(lookup)? {
            Value::Table(table) => table.get::<Value>(field).map_err(lookup)?,
            _ => return Err(BridgeError::not_found(name)),
        },
        None => globals.get::<Value>(name).map_err(lookup)?,
    };
    match value {
        Value::Function(func) => Ok(func),
        _ => Err(BridgeError::not_found(name)),
    }
}

/// Call `func` in protected mode, keeping only the first result.
pub(crate) fn invoke(
    lua: &Lua,
    func: &Function,
    name: &str,
    args: Vec<HostValue>,
) -> BridgeResult<Value> {
    let operation = || format!("call {name}");
    let args = args
        .into_iter()
        .map(|arg| to_script(lua, arg))
        .collect::<mlua::Result<Vec<_>>>()
        .map_err(|e| BridgeError::script(operation(), e))?;
    debug!(function = name, args = args.len(), "Calling script function");
    let results = func
        .call::<MultiValue>(MultiValue::from_vec(args))
        .map_err(|e| BridgeError::script(operation(), e))?;
    Ok(results.into_iter().next().unwrap_or(Value::Nil))
}
