pub mod check;
pub mod completion;
pub mod load;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "gatewayctl",
    author,
    version,
    about = "Gateway control plane - check and load config files",
    long_about = "Validates gateway config files and runs the full boot sequence against a \
                  config store without serving traffic.\n\nSecrets are never printed; env \
                  references are reported by name."
)]
pub struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, env = "GATEWAY_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Validate a config file and report its env references")]
    Check(check::CheckArgs),

    #[command(about = "Boot the control plane from a config file and print the sync report")]
    Load(load::LoadArgs),

    #[command(about = "Generate shell completions")]
    Completion(completion::CompletionArgs)
}
