//! Loaded plugin bookkeeping.

use std::path::{Component, Path, PathBuf};

use compact_str::CompactString;
use indexmap::IndexMap;
use itertools::Itertools;
use mlua::Value;
use scriptbridge_core::{BridgeError, BridgeResult, HostValue, Unmarshal};

use crate::Bridge;
use crate::config::is_identifier;

/// A script file loaded into its own namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Plugin {
    path: PathBuf,
    name: CompactString,
}

impl Plugin {
    pub(crate) fn new(path: PathBuf, name: CompactString) -> Self {
        Self { path, name }
    }

    /// Normalized absolute path; the registry key.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Namespace name, derived from the file stem.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fully qualified name of a function in this plugin's namespace.
    pub fn qualify(&self, function: &str) -> String {
        format!("{}.{function}", self.name)
    }

    /// Call a function defined by this plugin.
    pub fn call(&self, bridge: &Bridge, function: &str, args: Vec<HostValue>) -> BridgeResult<Value> {
        bridge.call(&self.qualify(function), args)
    }

    /// Call a function defined by this plugin and unmarshal its result.
    pub fn call_unmarshal<T: Unmarshal>(
        &self,
        bridge: &Bridge,
        dest: &mut T,
        function: &str,
        args: Vec<HostValue>,
    ) -> BridgeResult<()> {
        bridge.call_unmarshal(dest, &self.qualify(function), args)
    }

    pub fn unload(&self, bridge: &mut Bridge) -> BridgeResult<()> {
        bridge.unload(&self.path)
    }

    pub fn reload(&self, bridge: &mut Bridge) -> BridgeResult<Plugin> {
        bridge.reload(&self.path)
    }
}

/// Resolve a path to an absolute, lexically clean form.
///
/// `.` components are dropped and `..` removes the preceding component.
/// Symlinks are not resolved and the path does not have to exist.
pub fn normalize(path: &Path) -> BridgeResult<PathBuf> {
    let absolute = std::path::absolute(path).map_err(|e| BridgeError::io(path, e))?;
    let mut clean = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                clean.pop();
            }
            other => clean.push(other.as_os_str()),
        }
    }
    Ok(clean)
}

/// Derive a plugin name from the file stem.
///
/// The stem becomes a global and the first segment of dotted call names, so
/// it must be a Lua identifier.
pub fn derive_name(path: &Path) -> BridgeResult<CompactString> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| is_identifier(stem))
        .map(CompactString::from)
        .ok_or_else(|| BridgeError::InvalidPluginName {
            path: path.to_path_buf(),
        })
}

/// Plugins keyed by normalized path.
#[derive(Debug, Default)]
pub(crate) struct PluginRegistry {
    plugins: IndexMap<PathBuf, Plugin>,
}

impl PluginRegistry {
    /// Insert or replace the entry for the plugin's path.
    pub fn insert(&mut self, plugin: Plugin) -> Option<Plugin> {
        self.plugins.insert(plugin.path.clone(), plugin)
    }

    pub fn get(&self, path: &Path) -> Option<&Plugin> {
        self.plugins.get(path)
    }

    pub fn remove(&mut self, path: &Path) -> Option<Plugin> {
        self.plugins.shift_remove(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.plugins.contains_key(path)
    }

    /// Another registered plugin sharing `name`.
    pub fn name_owner(&self, name: &str, except: &Path) -> Option<&Plugin> {
        self.plugins
            .values()
            .find(|p| p.name == name && p.path != except)
    }

    /// Plugins ordered by name, then path.
    pub fn sorted(&self) -> impl Iterator<Item = &Plugin> {
        self.plugins
            .values()
            .sorted_by(|a, b| a.name.cmp(&b.name).then_with(|| a.path.cmp(&b.path)))
    }
}
