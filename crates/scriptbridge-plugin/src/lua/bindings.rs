//! Host API table exposed to scripts.

use mlua::{Lua, Table, Value};

use super::convert::describe;

/// Build the host API table: `version`, `kind(v)` and the logging functions.
pub fn create_host_api(lua: &Lua) -> mlua::Result<Table> {
    let api = lua.create_table()?;

    api.set("version", env!("CARGO_PKG_VERSION"))?;

    // host.kind(v) - bridge kind of a value, proxies included
    let kind = lua.create_function(|_, value: Value| Ok(describe(&value)))?;
    api.set("kind", kind)?;

    let log_debug = lua.create_function(|_, msg: String| {
        tracing::debug!(target: "plugin", "{}", msg);
        Ok(())
    })?;
    api.set("log_debug", log_debug)?;

    let log_info = lua.create_function(|_, msg: String| {
        tracing::info!(target: "plugin", "{}", msg);
        Ok(())
    })?;
    api.set("log_info", log_info)?;

    let log_warn = lua.create_function(|_, msg: String| {
        tracing::warn!(target: "plugin", "{}", msg);
        Ok(())
    })?;
    api.set("log_warn", log_warn)?;

    let log_error = lua.create_function(|_, msg: String| {
        tracing::error!(target: "plugin", "{}", msg);
        Ok(())
    })?;
    api.set("log_error", log_error)?;

    Ok(api)
}
