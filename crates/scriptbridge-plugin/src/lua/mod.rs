//! Lua adapter for the bridge.

mod bindings;
mod call;
mod convert;
mod namespace;
mod proxy;
mod runtime;

pub use convert::{describe, render, to_host, to_script};
pub use namespace::Namespace;
pub use proxy::LuaProxy;
pub use runtime::Bridge;
