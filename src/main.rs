//! `contentforge` CLI: a thin harness over the [`contentforge::Pipeline`]
//! admission surface. Everything here maps one-to-one onto a `Pipeline`
//! method; an embedding HTTP service would call the same methods directly
//! instead of shelling out to this binary.

use clap::{Parser, Subcommand};
use comfy_table::{Cell, Table};
use contentforge::config::load_with_fallback;
use contentforge::logging::{init_logging, LogLevel};
use contentforge::{Pipeline, SubmitJobRequest};
use contentforge_core::{ContentStore, JobStore, NullCreditLedger, ScenarioStore};
use contentforge_images::NullImageProvider;
use contentforge_llm::ScriptedLlmGateway;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[clap(name = "contentforge", version, about = "Bulk long-form content generation pipeline")]
struct Cli {
    /// Path to the SQLite database backing jobs/scenarios/content.
    #[clap(long, global = true, default_value = "contentforge.db")]
    database: String,

    /// Path to a TOML config file; falls back to ./contentforge.toml, then
    /// the user config directory, then built-in defaults.
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv).
    #[clap(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Write logs as JSON to this file instead of compact text on stdout.
    #[clap(long, global = true)]
    log_file: Option<PathBuf>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a new content generation job.
    Submit {
        #[clap(long)]
        niche: String,

        /// Repeatable; at least one required.
        #[clap(long = "value-proposition", required = true)]
        value_propositions: Vec<String>,

        #[clap(long)]
        tone: String,

        #[clap(long)]
        total_blogs: u32,

        /// One per blog type, e.g. `functional=2,transactional=1,commercial=1,informational=0`.
        #[clap(long)]
        allocations: String,

        #[clap(long)]
        target_word_count: u32,

        #[clap(long)]
        user_id: String,

        #[clap(long, default_value_t = 0)]
        credits_cost: u32,
    },
    /// Poll a job's current status.
    Status { job_id: String },
    /// Retrieve a completed (or partially completed) job's content.
    Content { job_id: String },
    /// Cancel a job and delete its data.
    Delete { job_id: String },
}

fn parse_allocations(raw: &str) -> anyhow::Result<HashMap<String, u32>> {
    let mut map = HashMap::new();
    for pair in raw.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("invalid allocation entry {pair:?}, expected key=count"))?;
        let value: u32 = value
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid allocation count in {pair:?}"))?;
        map.insert(key.trim().to_string(), value);
    }
    Ok(map)
}

async fn build_pipeline(cli: &Cli) -> anyhow::Result<Pipeline> {
    let config = load_with_fallback(cli.config.as_deref())?;
    let store = contentforge_core::open(&cli.database).await?;

    let job_store = store.clone() as Arc<dyn JobStore>;
    let content_store = store.clone() as Arc<dyn ContentStore>;
    let scenario_store = store as Arc<dyn ScenarioStore>;

    Ok(Pipeline::new(
        job_store,
        content_store,
        scenario_store,
        Arc::new(NullCreditLedger),
        Arc::new(ScriptedLlmGateway::new()),
        Arc::new(NullImageProvider),
        config,
        256,
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(LogLevel::from_verbosity(cli.verbose), cli.log_file.as_deref())?;

    let pipeline = build_pipeline(&cli).await?;

    match &cli.command {
        Commands::Submit {
            niche,
            value_propositions,
            tone,
            total_blogs,
            allocations,
            target_word_count,
            user_id,
            credits_cost,
        } => {
            let req = SubmitJobRequest {
                niche: niche.clone(),
                value_propositions: value_propositions.clone(),
                tone: tone.clone(),
                total_blogs: *total_blogs,
                blog_type_allocations: parse_allocations(allocations)?,
                target_word_count: *target_word_count,
                user_id: user_id.clone(),
                credits_cost: *credits_cost,
            };
            let job_id = pipeline.submit_job(req).await?;
            println!("{job_id}");
        }
        Commands::Status { job_id } => {
            let status = pipeline.get_status(job_id).await?;
            let mut table = Table::new();
            table.set_header(vec!["field", "value"]);
            table.add_row(vec![Cell::new("status"), Cell::new(status.status.to_string())]);
            table.add_row(vec![Cell::new("progress"), Cell::new(status.progress.to_string())]);
            table.add_row(vec![
                Cell::new("content_generated"),
                Cell::new(format!("{}/{}", status.total_content_generated, status.total_blogs)),
            ]);
            if let Some(remaining) = status.estimated_seconds_remaining {
                table.add_row(vec![Cell::new("eta_seconds"), Cell::new(remaining.to_string())]);
            }
            if let Some(err) = &status.error_message {
                table.add_row(vec![Cell::new("error"), Cell::new(err)]);
            }
            println!("{table}");
        }
        Commands::Content { job_id } => {
            let view = pipeline.get_content(job_id).await?;
            let mut table = Table::new();
            table.set_header(vec!["scenario_id", "title", "status", "words"]);
            for row in &view.rows {
                table.add_row(vec![
                    Cell::new(row.scenario_id.to_string()),
                    Cell::new(&row.blog_title),
                    Cell::new(row.status.to_string()),
                    Cell::new(row.word_count.to_string()),
                ]);
            }
            println!("{table}");
            println!(
                "{} posts, {} words, {:.0} avg",
                view.stats.total_posts, view.stats.total_words, view.stats.avg_word_count
            );
        }
        Commands::Delete { job_id } => {
            pipeline.delete_job(job_id).await?;
            println!("deleted {job_id}");
        }
    }

    pipeline.shutdown().await
}
