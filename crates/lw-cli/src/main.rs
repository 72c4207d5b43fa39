use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lw_core::trace::TraceRecord;
use lw_storage::LeadStore;

#[derive(Parser)]
#[command(name = "lw")]
#[command(about = "LeadWire operator CLI", long_about = None)]
struct Cli {
    /// Path to the lead log database; falls back to LW_DB_PATH.
    #[arg(long, default_value = "")]
    db: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the latest intake attempts, most recent first
    Recent {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Delivered count and average latency across the lead log
    Summary {
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let db_path = resolve_db(&cli.db);
    let store = LeadStore::open(&db_path)
        .with_context(|| format!("failed to open lead log at {db_path}"))?;

    match cli.command {
        Commands::Recent { limit, json } => {
            let records = store
                .recent(limit)
                .context("failed to query recent leads")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("No leads recorded yet.");
            } else {
                for record in &records {
                    println!("{}", format_record_line(record));
                }
            }
        }
        Commands::Summary { json } => {
            let summary = store.summary().context("failed to compute summary")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "Delivered: {}  |  Average latency: {:.0} ms",
                    summary.delivered_count, summary.average_latency_ms
                );
            }
        }
    }

    Ok(())
}

fn resolve_db(flag: &str) -> String {
    if !flag.trim().is_empty() {
        return flag.to_string();
    }
    if let Ok(value) = std::env::var("LW_DB_PATH") {
        if !value.trim().is_empty() {
            return value;
        }
    }
    "leads.db".to_string()
}

fn format_record_line(record: &TraceRecord) -> String {
    let claimed = if record.claimed { " [claimed]" } else { "" };
    format!(
        "{} {:9} {} {} | {} ({}, {} ms){}",
        record.timestamp.format("%Y-%m-%d %H:%M:%S"),
        record.status.as_str(),
        record.trace_id,
        record.client_id,
        record.lead.name,
        record.lead.service,
        record.latency_ms,
        claimed
    )
}
