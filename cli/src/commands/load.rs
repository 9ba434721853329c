//! Load command - full boot without serving
//!
//! Runs the same boot sequence as the gateway process (validation,
//! encryption key, store, reconciliation, plugins, backfill) and prints what
//! the reconciliation wrote. With `--store` the result persists to a snapshot
//! file, so running `load` twice shows the second pass as unchanged.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use config::{SettingsOverrides, load_from_env, merge_settings};
use gateway::{Bootstrap, Gateway};
use std::path::PathBuf;

use crate::output;

#[derive(Args)]
pub struct LoadArgs {
    /// Config file (defaults to <app-dir>/config.json)
    #[arg(value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Application directory searched for config.json
    #[arg(long)]
    pub app_dir: Option<PathBuf>,

    /// Snapshot file backing the config store (in-memory when omitted)
    #[arg(long, value_name = "FILE")]
    pub store: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool
}

pub async fn run(args: LoadArgs) -> Result<()> {
    let cli = SettingsOverrides {
        config_path: args.config.clone(),
        app_dir: args.app_dir.clone(),
        log_level: None,
        store_path: args.store.clone()
    };
    let settings = merge_settings(
        config::GatewaySettings::default(),
        &[("env", load_from_env()?), ("cli", cli)]
    );
    let config_path = settings.resolved_config_path();

    let gateway = Bootstrap::from_settings(&settings).boot().await?;
    let failed = !gateway.report().failures().is_empty();

    if args.json {
        print_json(&gateway, config_path.as_ref()).await?;
    } else {
        print_summary(&gateway, config_path.as_ref()).await;
        if failed {
            output::error("One or more collections failed to reconcile");
        } else {
            output::success("Control plane loaded");
        }
    }

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

async fn print_json(gateway: &Gateway, config_path: Option<&PathBuf>) -> Result<()> {
    let cache = gateway.cache();
    let json = serde_json::json!({
        "success": gateway.report().failures().is_empty(),
        "config_path": config_path.map(|p| p.display().to_string()),
        "store": gateway.store().backend(),
        "report": gateway.report(),
        "providers": cache.redacted_providers().await,
        "mcp_clients": cache.redacted_mcp_clients().await.iter().map(|c| &c.name).collect::<Vec<_>>(),
        "plugins": cache.plugin_statuses(),
        "env_references": cache.env_references().await
    });
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

async fn print_summary(gateway: &Gateway, config_path: Option<&PathBuf>) {
    let cache = gateway.cache();

    output::header("Control Plane Load");
    println!();
    let source = config_path.map_or_else(
        || "(none, store only)".to_string(),
        |p| p.display().to_string()
    );
    println!("  {} {}", "Config:".dimmed(), source.cyan());
    println!("  {} {}", "Store:".dimmed(), gateway.store().backend().cyan());
    println!();

    output::subheader("Reconciliation");
    for collection in &gateway.report().collections {
        let line = collection.to_string();
        if collection.failed.is_some() {
            println!("  {} {}", "✗".red(), line);
        } else if collection.writes() > 0 {
            println!("  {} {}", "•".cyan(), line);
        } else {
            println!("  {} {}", "✓".green(), line.dimmed());
        }
    }
    println!();

    output::subheader("Runtime");
    let providers = cache.provider_names().await;
    println!("  {} {}", "Providers:".dimmed(), providers.join(", "));
    let clients: Vec<String> = cache
        .redacted_mcp_clients()
        .await
        .into_iter()
        .map(|c| c.name)
        .collect();
    println!("  {} {}", "MCP clients:".dimmed(), clients.join(", "));
    for status in cache.plugin_statuses() {
        println!("  {} {} ({})", "Plugin:".dimmed(), status.name, status.status);
    }
    println!();
}
