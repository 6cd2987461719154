// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Twin Bridge CLI
//!
//! Command-line access to the bridged address space.
//!
//! # Usage
//!
//! ```bash
//! # Browse the Objects folder
//! twin-bridge --api http://localhost:8080 browse "i=85"
//!
//! # Batch read two features
//! twin-bridge --api http://localhost:8080 read "ns=2;s=pump#flow" "ns=2;s=pump#mode"
//!
//! # Follow live values
//! twin-bridge --config bridge.toml watch "ns=2;s=pump#flow"
//!
//! # Generate and check a configuration
//! twin-bridge gen-config -o bridge.toml
//! twin-bridge validate -c bridge.toml
//! ```

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use twin_bridge::address_space::{
    AttributeId, DataItem, DataValue, NodeId, ReadValueId, SharedDataItem, StatusCode,
};
use twin_bridge::{Bridge, BridgeConfig, ConfigError};

/// Twin Bridge
#[derive(Parser, Debug)]
#[command(name = "twin-bridge")]
#[command(about = "Twin Bridge - Digital twin things as a browsable address space")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base URL of the twin API (overrides the file)
    #[arg(long)]
    api: Option<String>,

    /// Twin application (overrides the file)
    #[arg(long)]
    application: Option<String>,

    /// Log level (trace, debug, info, warn, error); overrides the file
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Browse a node and print its references
    Browse {
        /// Node id, e.g. "i=85" or "ns=1;s=/"
        node: String,
    },

    /// Read attributes of one or more nodes
    Read {
        /// Node ids
        #[arg(required = true)]
        nodes: Vec<String>,

        /// Attribute id (13 = Value)
        #[arg(short, long, default_value = "13")]
        attribute: u32,
    },

    /// Print live values until Ctrl+C
    Watch {
        /// Property node ids
        #[arg(required = true)]
        nodes: Vec<String>,
    },

    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "bridge.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.command {
        Commands::GenConfig { .. } | Commands::Validate { .. } => None,
        _ => Some(build_config(&args)?),
    };

    // Initialize logging
    let level = config
        .as_ref()
        .map(|config| config.log_level.as_str())
        .or(args.log_level.as_deref())
        .unwrap_or("info");
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = match (&args.command, config) {
        (Commands::GenConfig { output }, _) => return cmd_gen_config(output),
        (Commands::Validate { config }, _) => return cmd_validate(config),
        (_, Some(config)) => config,
        (_, None) => return Ok(()),
    };

    let bridge = Bridge::from_config(config).await?;

    let result = match args.command {
        Commands::Browse { node } => cmd_browse(&bridge, &node).await,
        Commands::Read { nodes, attribute } => cmd_read(&bridge, &nodes, attribute).await,
        Commands::Watch { nodes } => cmd_watch(&bridge, &nodes).await,
        Commands::GenConfig { .. } | Commands::Validate { .. } => Ok(()),
    };

    bridge.shutdown();
    result
}

fn build_config(args: &Args) -> Result<BridgeConfig, ConfigError> {
    let mut config = match (&args.config, &args.api) {
        (Some(path), _) => BridgeConfig::from_file(path)?,
        (None, Some(api)) => BridgeConfig::new(api.clone()),
        (None, None) => {
            return Err(ConfigError::Invalid(
                "Missing --api (or use --config)".into(),
            ))
        }
    };

    if let Some(api) = &args.api {
        config.api = api.clone();
    }
    if let Some(application) = &args.application {
        config.application = application.clone();
    }
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }

    config.validate()?;
    Ok(config)
}

fn parse_nodes(nodes: &[String]) -> Result<Vec<NodeId>, Box<dyn std::error::Error>> {
    let mut ids = Vec::with_capacity(nodes.len());
    for node in nodes {
        ids.push(node.parse::<NodeId>()?);
    }
    Ok(ids)
}

async fn cmd_browse(bridge: &Bridge, node: &str) -> Result<(), Box<dyn std::error::Error>> {
    let node_id: NodeId = node.parse()?;
    let references = bridge.address_space().browse(&node_id).await;

    println!("{} ({} references)", node_id, references.len());
    for reference in references {
        println!("  --[{}]--> {}", reference.reference_type, reference.target);
    }
    Ok(())
}

async fn cmd_read(
    bridge: &Bridge,
    nodes: &[String],
    attribute: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let items: Vec<ReadValueId> = parse_nodes(nodes)?
        .into_iter()
        .map(|node_id| ReadValueId {
            node_id,
            attribute_id: attribute,
        })
        .collect();

    let results = bridge.address_space().read(&items).await;
    for (item, value) in items.iter().zip(results) {
        println!("{} = {}", item.node_id, value);
    }
    Ok(())
}

async fn cmd_watch(bridge: &Bridge, nodes: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let items: Vec<SharedDataItem> = parse_nodes(nodes)?
        .into_iter()
        .zip(1u32..)
        .map(|(node_id, id)| {
            Arc::new(PrintedItem {
                id,
                target: ReadValueId::new(node_id, AttributeId::Value),
            }) as SharedDataItem
        })
        .collect();

    bridge.address_space().create_data_items(&items);

    println!("Watching {} node(s)", items.len());
    println!("Press Ctrl+C to stop...");
    println!();

    tokio::signal::ctrl_c().await?;
    println!("\nShutting down...");

    bridge.address_space().delete_data_items(&items);
    Ok(())
}

/// Monitored item printing every update.
struct PrintedItem {
    id: u32,
    target: ReadValueId,
}

impl DataItem for PrintedItem {
    fn id(&self) -> u32 {
        self.id
    }

    fn read_value_id(&self) -> &ReadValueId {
        &self.target
    }

    fn set_value(&self, value: DataValue) {
        println!("[{}] {} = {}", self.id, self.target.node_id, value);
    }

    fn set_quality(&self, status: StatusCode) {
        println!("[{}] {} = ({})", self.id, self.target.node_id, status);
    }
}

fn cmd_gen_config(output: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = BridgeConfig::example();
    let toml_str = toml::to_string_pretty(&config)?;

    // Add comments
    let content = format!(
        r#"# Twin Bridge Configuration
# Generated by twin-bridge gen-config

{}
"#,
        toml_str
    );

    std::fs::write(output, content)?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    match BridgeConfig::from_file(config_path) {
        Ok(config) => {
            println!("Configuration valid!");
            println!();
            println!("Bridge: {}", config.name);
            println!("API: {}", config.api);
            println!("Application: {}", config.application);
            println!("Root thing: {}", config.root_thing);
            println!(
                "Auth: {}",
                match &config.auth {
                    Some(auth) if auth.token.is_some() => "static token",
                    Some(_) => "client credentials",
                    None => "none",
                }
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }
}
