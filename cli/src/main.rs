use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod output;
pub mod ux_error;

use commands::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries command output; logs go to stderr.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let result = match cli.command {
        Commands::Check(args) => commands::check::run(args),
        Commands::Load(args) => commands::load::run(args).await,
        Commands::Completion(args) => commands::completion::run(args)
    };

    if let Err(e) = result {
        if let Some(ux) = e.downcast_ref::<ux_error::UxError>() {
            ux.display();
        } else if let Some(config_error) = e.downcast_ref::<errors::ConfigError>() {
            ux_error::from_config_error(config_error).display();
        } else {
            output::error(&format!("{e:#}"));
        }
        std::process::exit(1);
    }
    Ok(())
}
