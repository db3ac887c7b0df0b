use anyhow::Context;
use chamahub::core::reports;
use chamahub::domain::model::Database;
use chamahub::utils::logger;
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "statement-export")]
#[command(about = "Export a group statement ZIP from a ChamaHub snapshot")]
struct Args {
    /// Path to the snapshot JSON (e.g. ./data/chamahub.json)
    #[arg(short, long, default_value = "data/chamahub.json")]
    snapshot: PathBuf,

    /// Group id
    #[arg(short, long)]
    group: Uuid,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    logger::init_cli_logger(args.verbose);
    tracing::info!("📂 Loading snapshot from: {}", args.snapshot.display());

    let bytes = tokio::fs::read(&args.snapshot)
        .await
        .with_context(|| format!("Failed to read snapshot '{}'", args.snapshot.display()))?;
    let db: Database = serde_json::from_slice(&bytes).context("Snapshot is not valid JSON")?;

    let statement = reports::build_statement(&db, args.group, Utc::now())?;

    tokio::fs::create_dir_all(&args.output).await?;
    let path = args.output.join(&statement.file_name);
    tokio::fs::write(&path, &statement.bytes)
        .await
        .with_context(|| format!("Failed to write '{}'", path.display()))?;

    tracing::info!("✅ Statement exported");
    println!("📁 Output saved to: {}", path.display());
    Ok(())
}
