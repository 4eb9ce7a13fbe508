// policies.rs — Policy subcommands: list, check.

use clap::Subcommand;
use janus_policy::PdpConfig;

#[derive(Subcommand)]
pub enum PolicyCommands {
    /// List loaded policies in load order.
    List {
        /// Emit JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Load the policy directory and report anything that was skipped.
    Check,
}

pub fn execute(cmd: &PolicyCommands, config: &PdpConfig) -> anyhow::Result<()> {
    match cmd {
        PolicyCommands::List { json } => {
            let (store, _) = config.load_store();

            if *json {
                println!("{}", serde_json::to_string_pretty(store.list())?);
                return Ok(());
            }

            if store.is_empty() {
                println!("No policies found in {}", config.policy_dir.display());
                return Ok(());
            }

            println!(
                "{:<32} {:<12} {:>8}  {:<18} {:<24} {:<20} RESOURCE",
                "ID", "LEVEL", "PRIORITY", "EFFECT", "ACTION", "SUBJECT"
            );
            println!("{}", "-".repeat(130));
            for p in store.list() {
                println!(
                    "{:<32} {:<12} {:>8}  {:<18} {:<24} {:<20} {}",
                    p.id,
                    p.level.to_string(),
                    p.priority,
                    p.effect.to_string(),
                    p.action,
                    p.subject,
                    p.resource,
                );
            }
        }

        PolicyCommands::Check => {
            let (store, report) = config.load_store();

            println!(
                "Loaded {} policies from {} file(s) in {}",
                store.size(),
                report.files_loaded,
                config.policy_dir.display()
            );

            for failed in &report.failed_files {
                println!("  FAILED  {}: {}", failed.path.display(), failed.error);
            }
            for skipped in &report.skipped {
                let file = skipped
                    .file
                    .as_ref()
                    .map(|f| f.display().to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "  SKIPPED {} entry #{} ({}): {}",
                    file,
                    skipped.index,
                    skipped.id.as_deref().unwrap_or("no id"),
                    skipped.reason
                );
            }

            if !report.failed_files.is_empty() || !report.skipped.is_empty() {
                anyhow::bail!(
                    "policy check failed: {} file(s) unreadable, {} entries skipped",
                    report.failed_files.len(),
                    report.skipped.len()
                );
            }
            println!("All policies loaded cleanly.");
        }
    }

    Ok(())
}
