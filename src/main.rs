//! scriptbridge - Run Lua plugins against a Rust host.
//!
//! Usage:
//!   scriptbridge call <FILE> <FUNCTION> [ARGS]...   Load a plugin and call a function
//!   scriptbridge list [DIR]                         Discover plugins and list their symbols
//!   scriptbridge run <FILE>                         Run a script in global scope
//!   scriptbridge --help                             Show help

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Context, Result};

use scriptbridge_core::{HostValue, Primitive};
use scriptbridge_plugin::{Bridge, BridgeConfig, lua::render};

#[derive(Parser)]
#[command(
    name = "scriptbridge",
    version,
    about = "Run Lua plugins against a Rust host",
    long_about = "scriptbridge loads Lua files as plugins, each in its own namespace, \
                  and calls their functions with values converted from the command line."
)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load a plugin and call one of its functions
    Call {
        /// Plugin file
        file: PathBuf,

        /// Function name inside the plugin namespace
        function: String,

        /// Arguments: true/false, integers and floats are converted, anything else is a string
        args: Vec<String>,
    },

    /// Discover plugins in a directory and list them
    List {
        /// Plugin directory (defaults to the configured plugin directory)
        dir: Option<PathBuf>,
    },

    /// Run a script in the global environment
    Run {
        /// Script file
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let mut bridge = Bridge::new(config).context("Failed to start Lua bridge")?;

    match cli.command {
        Command::Call {
            file,
            function,
            args,
        } => run_call(&mut bridge, &file, &function, &args)?,
        Command::List { dir } => run_list(&mut bridge, dir)?,
        Command::Run { file } => {
            bridge
                .run_file(&file)
                .with_context(|| format!("Failed to run {}", file.display()))?;
        }
    }

    bridge.close();
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<BridgeConfig> {
    match path {
        Some(path) => BridgeConfig::from_file(path)
            .with_context(|| format!("Invalid configuration file {}", path.display())),
        None => Ok(BridgeConfig::default()),
    }
}

/// Convert command-line arguments into host values.
fn parse_args(args: &[String]) -> Vec<HostValue> {
    args.iter()
        .map(|arg| HostValue::from(Primitive::parse(arg)))
        .collect()
}

/// Load a plugin and print the result of one call.
fn run_call(bridge: &mut Bridge, file: &Path, function: &str, args: &[String]) -> Result<()> {
    let plugin = bridge
        .load(file)
        .with_context(|| format!("Failed to load {}", file.display()))?;

    let result = plugin
        .call(bridge, function, parse_args(args))
        .with_context(|| format!("Call to {} failed", plugin.qualify(function)))?;

    println!("{}", render(&result));
    Ok(())
}

/// Load every plugin in a directory and print them in enumeration order.
fn run_list(bridge: &mut Bridge, dir: Option<PathBuf>) -> Result<()> {
    let dir = dir.unwrap_or_else(|| bridge.config().plugin_dir.clone());
    bridge
        .load_dir(&dir)
        .with_context(|| format!("Failed to load plugins from {}", dir.display()))?;

    let mut rows = vec![];
    bridge.each(|plugin| rows.push(plugin.clone()));

    if rows.is_empty() {
        println!("No plugins found in {}", dir.display());
        return Ok(());
    }

    println!("{}", "─".repeat(60));
    for plugin in rows {
        let symbols = match bridge.namespace(plugin.name()) {
            Some(namespace) => namespace.symbols().context("Failed to read namespace")?,
            None => vec![],
        };
        println!(" {:<16} {}", plugin.name(), plugin.path().display());
        if !symbols.is_empty() {
            println!("   {}", symbols.join(", "));
        }
    }
    println!("{}", "─".repeat(60));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_args() {
        let args = ["3", "2.5", "true", "name"].map(String::from);
        assert_eq!(
            parse_args(&args),
            vec![
                HostValue::Int(3),
                HostValue::Float(2.5),
                HostValue::Bool(true),
                HostValue::from("name"),
            ]
        );
    }

    #[test]
    fn test_call_subcommand_parses() {
        let cli = Cli::parse_from(["scriptbridge", "call", "square.lua", "Square", "3"]);
        match cli.command {
            Command::Call {
                function, args, ..
            } => {
                assert_eq!(function, "Square");
                assert_eq!(args, vec!["3".to_string()]);
            }
            _ => panic!("expected the call subcommand"),
        }
    }
}
