//! Autopost CLI - Command-line client for the Autopost engine

mod render;
mod rpc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use render::{ExecutionRow, JobRow, TopicRow};
use rpc::{RpcClient, RpcError, BUSY};
use serde_json::{json, Value};
use std::io::Read;
use tabled::Table;

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9627";

#[derive(Parser)]
#[command(name = "autopost")]
#[command(about = "Autopost engine CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, global = true, env = "AUTOPOST_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage job definitions
    #[command(subcommand)]
    Jobs(JobCommand),

    /// Inspect and validate executions
    #[command(subcommand)]
    Executions(ExecutionCommand),

    /// Manage per-site topic pools
    #[command(subcommand)]
    Topics(TopicCommand),

    /// Show engine status
    Status,
}

#[derive(Subcommand)]
enum JobCommand {
    /// List all jobs
    List,
    /// Show one job as JSON
    Get { job_id: i64 },
    /// Create a job from a JSON definition (`-` reads stdin)
    Create { file: String },
    /// Apply a partial JSON update; the document must carry `id`
    Update { file: String },
    /// Stop scheduling a job
    Pause { job_id: i64 },
    /// Schedule a paused or errored job again
    Resume { job_id: i64 },
    /// Delete a job and its history
    Delete { job_id: i64 },
    /// Start a run now
    Run { job_id: i64 },
}

#[derive(Subcommand)]
enum ExecutionCommand {
    /// Recent executions of a job, newest first
    List {
        job_id: i64,
        #[arg(short = 'n', long)]
        limit: Option<u32>,
    },
    /// Approve generated content and publish it
    Approve {
        execution_id: String,
        /// Replace the generated title
        #[arg(long)]
        title: Option<String>,
        /// Replace the generated content
        #[arg(long)]
        content: Option<String>,
    },
    /// Reject generated content
    Reject {
        execution_id: String,
        #[arg(long)]
        reason: Option<String>,
    },
}

#[derive(Subcommand)]
enum TopicCommand {
    /// Add titles to a site's pool
    Add {
        site_id: i64,
        #[arg(required = true)]
        titles: Vec<String>,
    },
    /// List a site's pool
    List { site_id: i64 },
}

fn read_document(file: &str) -> Result<Value> {
    let raw = if file == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        buf
    } else {
        std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file))?
    };
    serde_json::from_str(&raw).context("Invalid JSON document")
}

fn rows<T>(items: &Value, build: fn(&Value) -> T) -> Vec<T> {
    items
        .as_array()
        .map(|items| items.iter().map(build).collect())
        .unwrap_or_default()
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn jobs(client: &RpcClient, command: JobCommand) -> Result<()> {
    match command {
        JobCommand::List => {
            let result = client.call("jobs.list.v1", json!({})).await?;
            let rows = rows(&result["jobs"], JobRow::from_json);
            if rows.is_empty() {
                println!("{}", "No jobs defined".yellow());
            } else {
                println!("{}", Table::new(rows));
            }
        }
        JobCommand::Get { job_id } => {
            let job = client.call("jobs.get.v1", json!({ "job_id": job_id })).await?;
            print_json(&job)?;
        }
        JobCommand::Create { file } => {
            let job = client.call("jobs.create.v1", read_document(&file)?).await?;
            println!("{}", format!("✓ Job {} created", job["id"]).green().bold());
            println!("{}", Table::new(vec![JobRow::from_json(&job)]));
        }
        JobCommand::Update { file } => {
            let job = client.call("jobs.update.v1", read_document(&file)?).await?;
            println!("{}", format!("✓ Job {} updated", job["id"]).green().bold());
            println!("{}", Table::new(vec![JobRow::from_json(&job)]));
        }
        JobCommand::Pause { job_id } => {
            client.call("jobs.pause.v1", json!({ "job_id": job_id })).await?;
            println!("{}", format!("✓ Job {} paused", job_id).green().bold());
        }
        JobCommand::Resume { job_id } => {
            let job = client.call("jobs.resume.v1", json!({ "job_id": job_id })).await?;
            println!("{}", format!("✓ Job {} resumed", job_id).green().bold());
            println!(
                "  {} {}",
                "Next run:".bold(),
                render::timestamp(&job["run"]["next_run_at"])
            );
        }
        JobCommand::Delete { job_id } => {
            client.call("jobs.delete.v1", json!({ "job_id": job_id })).await?;
            println!("{}", format!("✓ Job {} deleted", job_id).green().bold());
        }
        JobCommand::Run { job_id } => {
            match client.call("jobs.execute.v1", json!({ "job_id": job_id })).await {
                Ok(started) => println!(
                    "{} {}",
                    "✓ Execution started:".green().bold(),
                    started["execution_id"].as_str().unwrap_or("-")
                ),
                Err(e) => match e.downcast_ref::<RpcError>() {
                    Some(refused) if refused.code == BUSY => {
                        println!("{} {}", "○ Not started:".yellow().bold(), refused.message);
                    }
                    _ => return Err(e),
                },
            }
        }
    }
    Ok(())
}

async fn executions(client: &RpcClient, command: ExecutionCommand) -> Result<()> {
    match command {
        ExecutionCommand::List { job_id, limit } => {
            let result = client
                .call(
                    "executions.list.v1",
                    json!({ "job_id": job_id, "limit": limit }),
                )
                .await?;
            let rows = rows(&result["executions"], ExecutionRow::from_json);
            if rows.is_empty() {
                println!("{}", format!("No executions for job {}", job_id).yellow());
            } else {
                println!("{}", Table::new(rows));
            }
        }
        ExecutionCommand::Approve {
            execution_id,
            title,
            content,
        } => {
            let execution = client
                .call(
                    "executions.validate.v1",
                    json!({
                        "execution_id": execution_id,
                        "decision": "approve",
                        "title": title,
                        "content": content,
                    }),
                )
                .await?;
            println!(
                "{} {}",
                "✓ Approved:".green().bold(),
                execution["status"].as_str().unwrap_or("-")
            );
        }
        ExecutionCommand::Reject {
            execution_id,
            reason,
        } => {
            client
                .call(
                    "executions.validate.v1",
                    json!({
                        "execution_id": execution_id,
                        "decision": "reject",
                        "reason": reason,
                    }),
                )
                .await?;
            println!("{}", format!("✓ Execution {} rejected", execution_id).green().bold());
        }
    }
    Ok(())
}

async fn topics(client: &RpcClient, command: TopicCommand) -> Result<()> {
    match command {
        TopicCommand::Add { site_id, titles } => {
            let requested = titles.len();
            let result = client
                .call("topics.add.v1", json!({ "site_id": site_id, "titles": titles }))
                .await?;
            let added = result["topics"].as_array().map_or(0, Vec::len);
            println!(
                "{}",
                format!("✓ {} of {} topics added to site {}", added, requested, site_id)
                    .green()
                    .bold()
            );
        }
        TopicCommand::List { site_id } => {
            let result = client
                .call("topics.list.v1", json!({ "site_id": site_id }))
                .await?;
            let rows = rows(&result["topics"], TopicRow::from_json);
            if rows.is_empty() {
                println!("{}", format!("No topics for site {}", site_id).yellow());
            } else {
                println!("{}", Table::new(rows));
            }
        }
    }
    Ok(())
}

async fn status(client: &RpcClient) {
    println!("{}", "Engine Status".cyan().bold());
    println!();

    match client.call("admin.stats.v1", json!({})).await {
        Ok(stats) => {
            println!("  {} {}", "RPC URL:".bold(), client.url());
            println!("  {} {}", "Status:".bold(), "ONLINE".green());
            println!("  {} {}", "Version:".bold(), stats["version"]);
            println!("  {} {} seconds", "Uptime:".bold(), stats["uptime_secs"]);
            println!("  {} {}", "Active workers:".bold(), stats["active_workers"]);
            println!();
            println!("  {} {}", "Jobs:".bold(), stats["job_count"]);
            print_counts(&stats["jobs_by_status"]);
            println!("  {} {}", "Executions:".bold(), stats["execution_count"]);
            print_counts(&stats["executions_by_status"]);
            println!(
                "  {} {}",
                "Oldest execution:".bold(),
                render::timestamp(&stats["oldest_execution_at"])
            );
        }
        Err(e) => {
            println!("  {} {}", "Status:".bold(), "ERROR".red());
            println!("  {} {}", "Error:".bold(), e);
        }
    }
}

fn print_counts(counts: &Value) {
    if let Some(counts) = counts.as_object() {
        for (status, count) in counts {
            println!("    {:<20} {}", status, count);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = RpcClient::new(cli.rpc_url);

    match cli.command {
        Commands::Jobs(command) => jobs(&client, command).await?,
        Commands::Executions(command) => executions(&client, command).await?,
        Commands::Topics(command) => topics(&client, command).await?,
        Commands::Status => status(&client).await,
    }

    Ok(())
}
