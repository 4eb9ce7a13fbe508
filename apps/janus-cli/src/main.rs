//! # janus-cli
//!
//! Command-line front end for the Janus policy decision point.
//!
//! - `janus evaluate` — decide one request against the policy directory
//! - `janus policies list/check` — inspect and validate loaded policies
//!
//! Policies are read from `<project-root>/policies` unless `.janus/pdp.toml`
//! or `--policy-dir` says otherwise. Logs go to stderr (`RUST_LOG` controls
//! verbosity) so stdout stays clean for `--json` output.

mod commands;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use janus_policy::{AttrValue, PdpConfig};
use tracing_subscriber::EnvFilter;

/// Janus — evaluate agent actions against layered policies.
#[derive(Parser)]
#[command(name = "janus", version, about)]
struct Cli {
    /// Project root directory (defaults to current directory).
    #[arg(long, default_value = ".")]
    project_root: PathBuf,

    /// Policy directory (overrides the configured one; relative paths are
    /// resolved against the project root).
    #[arg(long)]
    policy_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decide a single request.
    Evaluate {
        /// Who is acting (e.g., "finance-agent-1").
        #[arg(long)]
        subject: String,
        /// What they want to do (e.g., "payment.transfer").
        #[arg(long)]
        action: String,
        /// Target resource (defaults to "*").
        #[arg(long)]
        resource: Option<String>,
        /// Request attribute as key=value (repeatable), e.g. --attr amount=1500.
        #[arg(long = "attr", value_parser = parse_attr)]
        attrs: Vec<(String, AttrValue)>,
        /// Print the per-policy trace as well as the decision.
        #[arg(long)]
        trace: bool,
        /// Emit JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Inspect loaded policies.
    Policies {
        #[command(subcommand)]
        command: commands::policies::PolicyCommands,
    },
}

/// Parse `key=value`. Values read as bool, then number, then string.
fn parse_attr(raw: &str) -> Result<(String, AttrValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty attribute name in '{}'", raw));
    }
    let value = match value {
        "true" => AttrValue::Bool(true),
        "false" => AttrValue::Bool(false),
        v => match v.parse::<f64>() {
            Ok(n) if n.is_finite() => AttrValue::Number(n),
            _ => AttrValue::String(v.to_string()),
        },
    };
    Ok((key.to_string(), value))
}

/// Project config, with `--policy-dir` resolved the same way as a configured `policy_dir`.
fn build_config(project_root: &Path, policy_dir: Option<PathBuf>) -> PdpConfig {
    let mut config = PdpConfig::for_project(project_root);
    if let Some(dir) = policy_dir {
        config.policy_dir = project_root.join(dir);
    }
    config
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let project_root = cli.project_root.canonicalize().unwrap_or(cli.project_root);
    let config = build_config(&project_root, cli.policy_dir);
    tracing::debug!("policy directory: {}", config.policy_dir.display());

    match cli.command {
        Commands::Evaluate {
            subject,
            action,
            resource,
            attrs,
            trace,
            json,
        } => commands::evaluate::execute(
            &config,
            commands::evaluate::EvaluateArgs {
                subject,
                action,
                resource,
                attrs: attrs.into_iter().collect(),
                trace,
                json,
            },
        ),
        Commands::Policies { command } => commands::policies::execute(&command, &config),
    }
}
