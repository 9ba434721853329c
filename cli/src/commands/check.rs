//! Check command - config file validation
//!
//! Runs everything the boot sequence would run against a config file short
//! of touching a store:
//! - document structure and the `$schema` identifier
//! - per-entity validation of providers and MCP clients
//! - every `env.NAME` reference, checked against the process environment
//! - whether an encryption key will be found

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use config::{
    GatewayConfigFile, GatewaySettings, SchemaValidator, StructuralValidator,
    check_schema_identifier, load_document, parse_document, resolve_encryption_key
};
use gw_core::{EnvLookup, EnvReference, EnvVar, ProcessEnv, env_references};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::output;
use crate::ux_error;

#[derive(Args)]
pub struct CheckArgs {
    /// Config file (defaults to <app-dir>/config.json)
    #[arg(value_name = "PATH", env = "GATEWAY_CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Application directory searched for config.json
    #[arg(long, env = "GATEWAY_APP_DIR", default_value = ".")]
    pub app_dir: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Fail on warnings (exit code 1)
    #[arg(long)]
    pub strict: bool
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum Severity {
    Error,
    Warning
}

#[derive(Debug, Clone, Serialize)]
struct Finding {
    severity: Severity,
    subject: String,
    message: String
}

impl Finding {
    fn new(severity: Severity, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            subject: subject.into(),
            message: message.into()
        }
    }

    fn error(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, subject, message)
    }

    fn warning(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, subject, message)
    }
}

#[derive(Debug, Clone, Serialize)]
struct ReferenceStatus {
    #[serde(flatten)]
    reference: EnvReference,
    set: bool
}

#[derive(Debug, Default, Serialize)]
struct CheckOutcome {
    references: Vec<ReferenceStatus>,
    findings: Vec<Finding>
}

impl CheckOutcome {
    fn count(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }

    fn failed(&self, strict: bool) -> bool {
        self.count(Severity::Error) > 0 || (strict && self.count(Severity::Warning) > 0)
    }
}

pub fn run(args: CheckArgs) -> Result<()> {
    let settings = GatewaySettings {
        config_path: args.config.clone(),
        app_dir: args.app_dir.clone(),
        ..GatewaySettings::default()
    };
    let Some(path) = settings.resolved_config_path() else {
        return Err(ux_error::config_not_found(&args.app_dir).into());
    };

    let outcome = check_file(&path, &ProcessEnv)?;
    let failed = outcome.failed(args.strict);

    if args.json {
        let json = serde_json::json!({
            "success": !failed,
            "path": path.display().to_string(),
            "strict": args.strict,
            "env_references": outcome.references,
            "findings": outcome.findings
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else {
        print_outcome(&path, &outcome);
        if failed {
            if outcome.count(Severity::Error) == 0 {
                output::warn("Check failed (strict mode) with warnings");
            } else {
                output::error("Check failed with errors");
            }
        } else {
            output::success("Config file is ready to load");
        }
    }

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

fn check_file(path: &Path, env: &dyn EnvLookup) -> Result<CheckOutcome> {
    let document = load_document(path).map_err(|e| e.into_config_error(path))?;
    let mut outcome = CheckOutcome::default();

    let schema = StructuralValidator.validate(&document);
    let severity = if schema.valid { Severity::Warning } else { Severity::Error };
    outcome.findings.extend(
        schema
            .diagnostics
            .iter()
            .map(|d| Finding::new(severity, "document", d.as_str()))
    );
    if !schema.valid {
        return Ok(outcome);
    }

    let file = parse_document(document).map_err(|e| e.into_config_error(path))?;
    if let Some(warning) = check_schema_identifier(&file) {
        outcome.findings.push(Finding::warning("$schema", warning));
    }
    check_entities(&file, &mut outcome);
    check_references(&file, env, &mut outcome);

    if resolve_encryption_key(file.encryption_key.as_ref(), env).is_none() {
        outcome.findings.push(Finding::warning(
            "encryption_key",
            format!(
                "no encryption key configured and {} is unset; secrets are stored in plaintext",
                config::ENCRYPTION_KEY_ENV
            )
        ));
    }
    Ok(outcome)
}

fn check_entities(file: &GatewayConfigFile, outcome: &mut CheckOutcome) {
    for (name, provider) in file.providers.iter().flatten() {
        if let Err(e) = provider.validate_for(name) {
            outcome
                .findings
                .push(Finding::error(format!("providers.{name}"), e.to_string()));
        }
    }
    for client in file.mcp_clients() {
        if let Err(e) = client.check() {
            outcome.findings.push(Finding::error(
                format!("mcp.client_configs.{}", client.name),
                e.to_string()
            ));
        }
    }
}

fn declared_references(file: &GatewayConfigFile) -> Vec<EnvReference> {
    let mut references: Vec<EnvReference> = file
        .providers
        .iter()
        .flatten()
        .flat_map(|(name, p)| env_references(p, &format!("providers.{name}")))
        .collect();
    references.extend(
        file.mcp_clients()
            .iter()
            .flat_map(|c| env_references(c, &format!("mcp.client_configs.{}", c.name)))
    );
    if let Some(var) = file.encryption_key.as_ref().and_then(EnvVar::env_name) {
        references.push(EnvReference {
            var: var.to_string(),
            path: "encryption_key".to_string(),
            required: false
        });
    }
    references
}

fn check_references(file: &GatewayConfigFile, env: &dyn EnvLookup, outcome: &mut CheckOutcome) {
    for reference in declared_references(file) {
        let set = env.var(&reference.var).is_some_and(|v| !v.is_empty());
        if !set {
            let message = format!("environment variable {} is not set", reference.var);
            outcome.findings.push(if reference.required {
                Finding::error(reference.path.clone(), message)
            } else {
                Finding::warning(reference.path.clone(), message)
            });
        }
        outcome.references.push(ReferenceStatus { reference, set });
    }
}

fn print_outcome(path: &Path, outcome: &CheckOutcome) {
    output::header("Config Check");
    println!();
    println!("  {} {}", "File:".dimmed(), path.display().to_string().cyan());
    println!();

    if !outcome.references.is_empty() {
        output::subheader("Environment references");
        for status in &outcome.references {
            let mark = if status.set {
                "✓".green()
            } else if status.reference.required {
                "✗".red()
            } else {
                "⚠".yellow()
            };
            println!(
                "  {} {} {}",
                mark,
                status.reference.var.bold(),
                status.reference.path.dimmed()
            );
        }
        println!();
    }

    for (severity, title) in [(Severity::Error, "Errors"), (Severity::Warning, "Warnings")] {
        let findings: Vec<_> = outcome.findings.iter().filter(|f| f.severity == severity).collect();
        if findings.is_empty() {
            continue;
        }
        output::subheader(title);
        for finding in findings {
            println!("  {} {}", finding.subject.cyan(), finding.message);
        }
        println!();
    }

    output::subheader("Summary");
    println!("  {} errors", outcome.count(Severity::Error));
    println!("  {} warnings", outcome.count(Severity::Warning));
    println!("  {} env references", outcome.references.len());
    println!();
}
