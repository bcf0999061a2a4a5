//! Lua plugin bridge for scriptbridge.
//!
//! This crate embeds a Lua 5.4 interpreter and connects it to the host value
//! model from `scriptbridge-core`:
//!
//! - host values convert into Lua values, with composites exposed as proxy
//!   userdata over shared storage rather than copies;
//! - script files load as plugins, each into its own namespace table that
//!   falls back to the globals, so plugins with colliding identifiers can
//!   coexist and be unloaded independently;
//! - host code calls script functions by bare or `namespace.function` name
//!   and unmarshals the result into typed destinations.
//!
//! # Example
//!
//! ```ignore
//! use scriptbridge_plugin::{Bridge, BridgeConfig};
//!
//! let mut bridge = Bridge::new(BridgeConfig::default())?;
//! let plugin = bridge.load("plugins/square.lua")?;
//!
//! let mut out = 0_i64;
//! plugin.call_unmarshal(&bridge, &mut out, "Square", vec![3_i64.into()])?;
//! assert_eq!(out, 9);
//! ```

mod config;
pub mod lua;
mod registry;

pub use config::{BridgeConfig, BridgeConfigBuilder, BridgeConfigBuilderError};
pub use lua::{Bridge, LuaProxy, Namespace};
pub use registry::{Plugin, derive_name, normalize};

pub use mlua;
