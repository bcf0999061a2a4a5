//! Bridge configuration.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use derive_builder::Builder;
use indexmap::IndexMap;
use scriptbridge_core::{BridgeError, BridgeResult, Primitive};
use serde::{Deserialize, Serialize};

/// Configuration for a [`Bridge`](crate::Bridge).
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
#[serde(default)]
pub struct BridgeConfig {
    /// Directory searched by plugin discovery.
    #[builder(default = "default_plugin_dir()")]
    pub plugin_dir: PathBuf,

    /// File extensions treated as plugin scripts, without the leading dot.
    #[builder(default = "default_extensions()")]
    pub extensions: Vec<String>,

    /// Interpreter memory limit in bytes (0 = unlimited).
    #[builder(default)]
    pub memory_limit: usize,

    /// Globals removed from the interpreter at startup.
    #[builder(default = "default_disabled_globals()")]
    pub disabled_globals: Vec<String>,

    /// Name of the host API table. Empty disables it.
    #[builder(default = "default_host_api()")]
    pub host_api: String,

    /// Plugin names skipped by discovery.
    #[builder(default)]
    pub disabled_plugins: HashSet<String>,

    /// Primitive globals installed at startup.
    #[builder(default)]
    pub globals: IndexMap<String, Primitive>,
}

fn default_plugin_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("scriptbridge")
        .join("plugins")
}

fn default_extensions() -> Vec<String> {
    vec!["lua".to_string()]
}

fn default_disabled_globals() -> Vec<String> {
    vec!["loadfile".to_string(), "dofile".to_string()]
}

fn default_host_api() -> String {
    "host".to_string()
}

/// Lua identifiers: a letter or underscore followed by letters, digits or
/// underscores.
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn check_extensions(extensions: &[String]) -> Result<(), String> {
    if extensions.is_empty() {
        return Err("at least one plugin extension is required".to_string());
    }
    if let Some(bad) = extensions
        .iter()
        .find(|ext| ext.trim_start_matches('.').is_empty())
    {
        return Err(format!("invalid plugin extension '{bad}'"));
    }
    Ok(())
}

fn check_host_api(name: &str) -> Result<(), String> {
    if !name.is_empty() && !is_identifier(name) {
        return Err(format!("host API name '{name}' is not a valid identifier"));
    }
    Ok(())
}

fn check_globals(globals: &IndexMap<String, Primitive>) -> Result<(), String> {
    match globals.keys().find(|name| !is_identifier(name)) {
        Some(name) => Err(format!("global name '{name}' is not a valid identifier")),
        None => Ok(()),
    }
}

impl BridgeConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref extensions) = self.extensions {
            check_extensions(extensions)?;
        }
        if let Some(ref host_api) = self.host_api {
            check_host_api(host_api)?;
        }
        if let Some(ref globals) = self.globals {
            check_globals(globals)?;
        }
        Ok(())
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            plugin_dir: default_plugin_dir(),
            extensions: default_extensions(),
            memory_limit: 0,
            disabled_globals: default_disabled_globals(),
            host_api: default_host_api(),
            disabled_plugins: HashSet::new(),
            globals: IndexMap::new(),
        }
    }
}

impl BridgeConfig {
    /// Create a new bridge config builder.
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::default()
    }

    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> BridgeResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| BridgeError::Config {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> BridgeResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| BridgeError::io(path, e))?;
        Self::from_toml_str(&content)
    }

    /// Check the invariants the builder enforces.
    pub fn validate(&self) -> BridgeResult<()> {
        check_extensions(&self.extensions)
            .and_then(|()| check_host_api(&self.host_api))
            .and_then(|()| check_globals(&self.globals))
            .map_err(|message| BridgeError::Config { message })
    }

    /// Create a new config with a custom plugin directory.
    pub fn with_plugin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plugin_dir = dir.into();
        self
    }

    /// Disable a specific plugin.
    pub fn disable_plugin(mut self, name: impl Into<String>) -> Self {
        self.disabled_plugins.insert(name.into());
        self
    }

    /// Check if a plugin is disabled.
    pub fn is_disabled(&self, name: &str) -> bool {
        self.disabled_plugins.contains(name)
    }

    /// Whether a path has one of the configured plugin extensions.
    pub fn has_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.extensions
                    .iter()
                    .any(|allowed| allowed.trim_start_matches('.') == ext)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = BridgeConfig::default();
        assert!(config.plugin_dir.ends_with("scriptbridge/plugins"));
        assert_eq!(config.extensions, vec!["lua".to_string()]);
        assert_eq!(config.host_api, "host");
        assert!(config.disabled_globals.contains(&"dofile".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = BridgeConfig::builder()
            .plugin_dir("/tmp/plugins")
            .memory_limit(1024 * 1024usize)
            .host_api("")
            .build()
            .unwrap();

        assert_eq!(config.plugin_dir, PathBuf::from("/tmp/plugins"));
        assert_eq!(config.memory_limit, 1024 * 1024);
        assert!(config.host_api.is_empty());
        assert_eq!(config.extensions, vec!["lua".to_string()]);
    }

    #[test]
    fn test_config_builder_validation() {
        let result = BridgeConfig::builder()
            .extensions(Vec::<String>::new())
            .build();
        assert!(result.is_err());

        let result = BridgeConfig::builder().host_api("not valid").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let config = BridgeConfig::from_toml_str(
            r#"
            extensions = ["lua", ".luau"]
            disabled_plugins = ["broken"]

            [globals]
            greeting = "hello"
            answer = 42
            verbose = true
            "#,
        )
        .unwrap();

        assert!(config.is_disabled("broken"));
        assert!(config.has_extension(Path::new("x/plugin.luau")));
        assert!(!config.has_extension(Path::new("x/plugin.txt")));
        assert_eq!(config.globals.get("answer"), Some(&Primitive::Int(42)));
        assert_eq!(config.globals.get("verbose"), Some(&Primitive::Bool(true)));
        assert_eq!(config.host_api, "host");
    }

    #[test]
    fn test_config_from_toml_rejects_bad_globals() {
        let err = BridgeConfig::from_toml_str("[globals]\n\"bad name\" = 1\n").unwrap_err();
        assert!(matches!(err, BridgeError::Config { .. }));
    }
}
