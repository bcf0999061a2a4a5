//! The Lua bridge.

use std::path::Path;

use mlua::{Lua, Value};
use scriptbridge_core::{BridgeError, BridgeResult, HostValue, Unmarshal};
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::registry::{Plugin, PluginRegistry, derive_name, normalize};

use super::bindings;
use super::call;
use super::convert::{to_host, to_script};
use super::namespace::Namespace;

/// Map an interpreter error into a script error for `operation`.
fn script_err(operation: &str) -> impl Fn(mlua::Error) -> BridgeError + Copy + '_ {
    move |e| BridgeError::script(operation, e)
}

/// An embedded Lua interpreter with isolated plugin namespaces.
pub struct Bridge {
    /// The Lua state.
    lua: Lua,

    /// Loaded plugins by normalized path.
    registry: PluginRegistry,

    /// Bridge configuration.
    config: BridgeConfig,
}

impl Bridge {
    /// Create a bridge with a fresh interpreter.
    pub fn new(config: BridgeConfig) -> BridgeResult<Self> {
        config.validate()?;
        let lua = Lua::new();
        let init = script_err("init");

        if config.memory_limit > 0 {
            lua.set_memory_limit(config.memory_limit).map_err(init)?;
        }

        let globals = lua.globals();
        for name in &config.disabled_globals {
            globals.raw_set(name.as_str(), Value::Nil).map_err(init)?;
        }

        if !config.host_api.is_empty() {
            let api = bindings::create_host_api(&lua).map_err(init)?;
            globals.set(config.host_api.as_str(), api).map_err(init)?;
        }

        for (name, value) in &config.globals {
            let value = to_script(&lua, HostValue::from(value.clone())).map_err(init)?;
            globals.set(name.as_str(), value).map_err(init)?;
        }

        debug!(
            memory_limit = config.memory_limit,
            host_api = %config.host_api,
            "Lua bridge initialized"
        );

        Ok(Self {
            lua,
            registry: PluginRegistry::default(),
            config,
        })
    }

    /// Shut the interpreter down.
    pub fn close(self) {
        debug!(plugins = self.registry.sorted().count(), "Closing Lua bridge");
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Bind a host value to a global name.
    pub fn set(&mut self, name: &str, value: impl Into<HostValue>) -> BridgeResult<()> {
        let set = script_err("set");
        let value = to_script(&self.lua, value.into()).map_err(set)?;
        self.lua.globals().set(name, value).map_err(set)
    }

    /// Read a global.
    pub fn get(&self, name: &str) -> BridgeResult<Value> {
        self.lua.globals().get(name).map_err(script_err("get"))
    }

    /// Run a chunk in the global environment.
    pub fn exec(&mut self, source: &str, chunk_name: &str) -> BridgeResult<()> {
        self.lua
            .load(source)
            .set_name(chunk_name)
            .exec()
            .map_err(script_err("exec"))
    }

    /// Run a script file in the global environment.
    pub fn run_file(&mut self, path: impl AsRef<Path>) -> BridgeResult<()> {
        let path = path.as_ref();
        let source = std::fs::read(path).map_err(|e| BridgeError::io(path, e))?;
        self.lua
            .load(&source[..])
            .set_name(format!("@{}", path.display()))
            .exec()
            .map_err(script_err("run"))
    }

    /// Load a script file into its own namespace.
    ///
    /// On failure the previous global binding for the plugin name is restored
    /// and the registry is left unchanged.
    pub fn load(&mut self, path: impl AsRef<Path>) -> BridgeResult<Plugin> {
        let path = normalize(path.as_ref())?;
        let name = derive_name(&path)?;
        let source = std::fs::read(&path).map_err(|e| BridgeError::io(&path, e))?;
        let load = script_err("load");

        if let Some(owner) = self.registry.name_owner(&name, &path) {
            warn!(
                name = %name,
                path = %path.display(),
                previous = %owner.path().display(),
                "Plugin name collides with a loaded plugin; the new namespace replaces it"
            );
        }

        let namespace = Namespace::new(&self.lua, &name).map_err(load)?;
        let previous = namespace.install(&self.lua).map_err(load)?;
        let chunk_name = format!("@{}", path.display());

        if let Err(e) = namespace.run_chunk(&self.lua, &source, &chunk_name) {
            if let Err(restore) = self.lua.globals().raw_set(name.as_str(), previous) {
                warn!(name = %name, error = %restore, "Failed to restore previous binding");
            }
            return Err(load(e));
        }

        let plugin = Plugin::new(path, name);
        self.registry.insert(plugin.clone());
        info!(name = plugin.name(), path = %plugin.path().display(), "Loaded plugin");
        Ok(plugin)
    }

    /// Reset a plugin's namespace and forget it. Unknown paths are a no-op.
    pub fn unload(&mut self, path: impl AsRef<Path>) -> BridgeResult<()> {
        let path = normalize(path.as_ref())?;
        let Some(name) = self.registry.get(&path).map(|p| p.name().to_string()) else {
            warn!(path = %path.display(), "Unload of a plugin that is not loaded");
            return Ok(());
        };

        // The entry stays registered until its bindings are gone.
        let unload = script_err("unload");
        let namespace = Namespace::new(&self.lua, &name).map_err(unload)?;
        namespace.install(&self.lua).map_err(unload)?;
        self.registry.remove(&path);
        debug!(name = %name, path = %path.display(), "Unloaded plugin");
        Ok(())
    }

    /// Load a plugin again, replacing its registry entry and namespace.
    pub fn reload(&mut self, path: impl AsRef<Path>) -> BridgeResult<Plugin> {
        self.load(path)
    }

    pub fn is_loaded(&self, path: impl AsRef<Path>) -> bool {
        normalize(path.as_ref()).is_ok_and(|path| self.registry.contains(&path))
    }

    /// Visit every loaded plugin, ordered by name then path.
    pub fn each(&self, mut visitor: impl FnMut(&Plugin)) {
        for plugin in self.registry.sorted() {
            visitor(plugin);
        }
    }

    /// Snapshot of the loaded plugins in [`each`](Self::each) order.
    pub fn plugins(&self) -> Vec<Plugin> {
        self.registry.sorted().cloned().collect()
    }

    /// Load every plugin file in `dir`, in path order.
    ///
    /// Files without a configured extension and plugins disabled in the
    /// configuration are skipped. A missing directory loads nothing.
    pub fn load_dir(&mut self, dir: impl AsRef<Path>) -> BridgeResult<Vec<Plugin>> {
        let dir = dir.as_ref();
        if !dir.exists() {
            return Ok(vec![]);
        }

        let mut paths = vec![];
        for entry in std::fs::read_dir(dir).map_err(|e| BridgeError::io(dir, e))? {
            let path = entry.map_err(|e| BridgeError::io(dir, e))?.path();
            if path.is_file() && self.config.has_extension(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut loaded = vec![];
        for path in paths {
            let name = match derive_name(&path) {
                Ok(name) => name,
                Err(e) => {
                    warn!(path = %path.display(), "Skipping plugin: {e}");
                    continue;
                }
            };
            if self.config.is_disabled(&name) {
                debug!(name = %name, "Skipping disabled plugin");
                continue;
            }
            loaded.push(self.load(&path)?);
        }
        Ok(loaded)
    }

    /// The namespace currently bound to `name`, if it is a table.
    pub fn namespace(&self, name: &str) -> Option<Namespace> {
        match self.lua.globals().raw_get::<Value>(name) {
            Ok(Value::Table(table)) => Some(Namespace::from_table(name, table)),
            _ => None,
        }
    }

    /// Call a bare or `namespace.function` name, returning its first result.
    pub fn call(&self, name: &str, args: Vec<HostValue>) -> BridgeResult<Value> {
        let func = call::resolve(&self.lua, name)?;
        call::invoke(&self.lua, &func, name, args)
    }

    /// Call a function and unmarshal its first result into `dest`.
    pub fn call_unmarshal<T: Unmarshal>(
        &self,
        dest: &mut T,
        name: &str,
        args: Vec<HostValue>,
    ) -> BridgeResult<()> {
        let result = self.call(name, args)?;
        *dest = T::unmarshal(to_host(result, T::HINT)?)?;
        Ok(())
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
