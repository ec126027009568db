use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use ccp_import::ImportSchema;
use ccp_storage::{AccountsStore, ContentStore};
use ccp_sync::{MetricsSyncer, SyncConfig};
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "ccp-cli")]
#[command(about = "Creator Content Pipeline command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the dashboard API server.
    Serve,
    /// Import a CSV export into the content collection.
    Import {
        file: PathBuf,
        /// Show the mapping preview instead of writing anything.
        #[arg(long)]
        preview: bool,
        /// Custom column-alias table (YAML) replacing the built-in one.
        #[arg(long)]
        schema: Option<PathBuf>,
    },
    /// Pull fresh engagement metrics from the configured platforms.
    Sync,
}

fn data_dir() -> PathBuf {
    std::env::var("DATA_DIR").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("."))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            ccp_web::serve_from_env().await?;
        }
        Commands::Import { file, preview, schema } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let schema = match schema {
                Some(path) => ImportSchema::from_yaml_file(path)?,
                None => ImportSchema::default(),
            };

            if preview {
                let preview = ccp_import::preview(&text, &schema);
                println!("{}", serde_json::to_string_pretty(&preview)?);
                return Ok(());
            }

            let records = schema.reconcile(&ccp_import::parse_table(&text));
            let store = ContentStore::new(data_dir());
            let mut existing = store.load().await?;
            let summary = ccp_import::merge_into(&mut existing, &records, Utc::now());
            store.replace_all(&existing).await?;
            println!(
                "import complete: created={} updated={} total={}",
                summary.created, summary.updated, summary.total
            );
        }
        Commands::Sync => {
            let config = SyncConfig::from_env();
            let syncer = MetricsSyncer::from_config(&config)?;
            let store = ContentStore::new(data_dir());
            let accounts_store = AccountsStore::new(data_dir());

            let mut records = store.load().await?;
            let mut accounts = accounts_store.load().await?;
            let outcome = syncer.sync_once(&mut records, &mut accounts, Utc::now()).await;
            store.replace_all(&records).await?;
            accounts_store.save(&accounts).await?;

            println!(
                "sync complete: updated={} errors={}",
                outcome.updated,
                outcome.errors.len()
            );
            for error in &outcome.errors {
                eprintln!("  {error}");
            }
        }
    }

    Ok(())
}
