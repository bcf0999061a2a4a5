//! Per-plugin namespaces.
//!
//! A namespace is a plain table whose metatable falls back to the globals.
//! A plugin chunk runs with the namespace as its `_ENV`, so its top-level
//! definitions land in the namespace while globals remain readable.

use compact_str::CompactString;
use itertools::Itertools;
use mlua::{Lua, Table, Value};

/// An isolated plugin table.
#[derive(Debug, Clone)]
pub struct Namespace {
    name: CompactString,
    table: Table,
}

impl Namespace {
    /// Create an empty namespace with a fallback to the globals.
    pub(crate) fn new(lua: &Lua, name: &str) -> mlua::Result<Self> {
        let table = lua.create_table()?;
        let meta = lua.create_table()?;
        meta.set("__index", lua.globals())?;
        table.set_metatable(Some(meta))?;
        Ok(Self {
            name: CompactString::from(name),
            table,
        })
    }

    /// Wrap an existing global table.
    pub(crate) fn from_table(name: &str, table: Table) -> Self {
        Self {
            name: CompactString::from(name),
            table,
        }
    }

    /// Bind this namespace as the global `name`, returning the previous
    /// binding.
    pub(crate) fn install(&self, lua: &Lua) -> mlua::Result<Value> {
        let globals = lua.globals();
        let previous: Value = globals.raw_get(self.name.as_str())?;
        globals.raw_set(self.name.as_str(), self.table.clone())?;
        Ok(previous)
    }

    /// Run a chunk with this namespace as its environment.
    pub(crate) fn run_chunk(&self, lua: &Lua, source: &[u8], chunk_name: &str) -> mlua::Result<()> {
        lua.load(source)
            .set_name(chunk_name)
            .set_environment(self.table.clone())
            .exec()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a symbol defined in this namespace, ignoring the fallback.
    pub fn get(&self, symbol: &str) -> mlua::Result<Value> {
        self.table.raw_get(symbol)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.get(symbol).is_ok_and(|v| !v.is_nil())
    }

    /// Names defined in this namespace, sorted.
    pub fn symbols(&self) -> mlua::Result<Vec<String>> {
        let mut names = Vec::new();
        for pair in self.table.clone().pairs::<Value, Value>() {
            let (key, _) = pair?;
            if let Value::String(s) = key {
                names.push(s.to_string_lossy());
            }
        }
        Ok(names.into_iter().sorted().collect())
    }
}
