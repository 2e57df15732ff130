use std::rc::Rc;

use clap::Subcommand;
use tomate_core::EventBus;

use super::{open_store, plugin_engine, CmdResult};

#[derive(Subcommand)]
pub enum PluginAction {
    /// List known plugins
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Enable a plugin
    Enable {
        /// Plugin name (case-sensitive)
        name: String,
    },
    /// Disable a plugin
    Disable {
        /// Plugin name (case-sensitive)
        name: String,
    },
}

pub fn run(action: PluginAction) -> CmdResult {
    let bus = Rc::new(EventBus::new());
    let store = open_store(&bus)?;
    let mut engine = plugin_engine(&bus, &store)?;

    match action {
        PluginAction::List { json } => {
            let plugins = engine.list();
            if json {
                println!("{}", serde_json::to_string_pretty(&plugins)?);
            } else if plugins.is_empty() {
                println!("no plugins found");
            } else {
                for p in plugins {
                    let mark = if p.enabled { "*" } else { " " };
                    println!("{mark} {:<16} {:<10} {}", p.name, p.version, p.description);
                }
            }
        }
        PluginAction::Enable { name } => {
            let Some(info) = engine.lookup(&name) else {
                return Err(format!("unknown plugin: {name}").into());
            };
            if info.enabled {
                println!("{name} is already enabled");
            } else if engine.activate(&name) {
                println!("enabled {name}");
            } else {
                return Err(format!("plugin {name} failed to activate").into());
            }
        }
        PluginAction::Disable { name } => {
            let Some(info) = engine.lookup(&name) else {
                return Err(format!("unknown plugin: {name}").into());
            };
            if !info.enabled {
                println!("{name} is already disabled");
            } else {
                if !engine.deactivate(&name) {
                    tracing::warn!(plugin = %name, "deactivation hook failed");
                }
                println!("disabled {name}");
            }
        }
    }
    Ok(())
}
