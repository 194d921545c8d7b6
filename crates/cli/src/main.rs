//! Taskmill CLI - operator access to the shared job store

mod logging;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::sync::Arc;
use std::time::Duration;
use tabled::Table;
use tracing::{debug, info};

use taskmill_core::domain::{JobConf, JobInfo, JobInfoUpdate, JobStatus};
use taskmill_core::JobBackend;
use taskmill_infra_sqlite::{
    SqliteStore, StoreConfig, DEFAULT_DATABASE_URL, DEFAULT_MAX_CONNECTIONS,
};

use output::{ClaimedJobRow, JobRow};

#[derive(Parser)]
#[command(name = "taskmill")]
#[command(about = "Taskmill job backend administration", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Store location (sqlite URL, `~` is expanded)
    #[arg(long, env = "TASKMILL_DATABASE_URL", default_value = DEFAULT_DATABASE_URL)]
    database_url: String,

    /// Connection pool size
    #[arg(long, env = "TASKMILL_MAX_CONNECTIONS", default_value_t = DEFAULT_MAX_CONNECTIONS)]
    max_connections: u32,

    /// How long to wait on the store's write lock, in milliseconds
    #[arg(long, env = "TASKMILL_BUSY_TIMEOUT_MS", default_value_t = 5000)]
    busy_timeout_ms: u64,

    /// Log format: pretty or json
    #[arg(long, env = "TASKMILL_LOG_FORMAT", default_value = "pretty")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Show store health and job count
    Status,

    /// List jobs, newest id first
    List {
        /// Only list jobs whose id sorts strictly below this one
        #[arg(long)]
        marker: Option<String>,

        /// Maximum number of jobs (0 = default page size)
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show a job's configuration and progress
    Show {
        /// Job ID
        job_id: String,
    },

    /// Queue a new job
    Create {
        /// Job ID
        job_id: String,

        /// Job type
        #[arg(short, long)]
        job_type: String,

        /// Parameters as JSON
        #[arg(long, default_value = "{}")]
        params: String,

        /// Expected number of tasks, if known up front
        #[arg(long)]
        total: Option<u64>,
    },

    /// Delete a job that is not running
    Delete {
        /// Job ID
        job_id: String,
    },

    /// List jobs claimed by an orchestrator
    OrchestratorJobs {
        /// Orchestrator ID
        orchestrator_id: String,
    },

    /// Detach a job from an orchestrator
    Release {
        /// Orchestrator ID
        orchestrator_id: String,

        /// Job ID
        job_id: String,

        /// Status to leave the job in (unchanged if omitted)
        #[arg(long)]
        status: Option<JobStatus>,
    },
}

impl Cli {
    fn store_config(&self) -> StoreConfig {
        StoreConfig {
            database_url: self.database_url.clone(),
            max_connections: self.max_connections,
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_format)?;

    let config = cli.store_config();
    debug!(database_url = %config.resolved_url(), "Connecting to store");
    let store = SqliteStore::connect(&config)
        .await
        .context("Failed to open the job store")?;
    let backend = JobBackend::new(Arc::new(store));
    backend
        .health_check()
        .await
        .context("Job store is not responding")?;

    match cli.command {
        Commands::Status => {
            let status = backend.status().await?;

            println!("{}", "Backend Status".cyan().bold());
            println!();
            println!("  {} {}", "Store:".bold(), config.resolved_url());
            println!("  {} {}", "Status:".bold(), "ONLINE".green());
            println!("  {} {}", "Jobs:".bold(), status.job_count);
        }

        Commands::List { marker, limit } => {
            let jobs = backend.list_jobs(marker.as_deref(), limit).await?;
            if jobs.is_empty() {
                println!("{}", "No jobs".yellow());
            } else {
                let rows: Vec<JobRow> = jobs.iter().map(JobRow::from).collect();
                println!("{}", Table::new(rows));
                if let Some(last) = jobs.last() {
                    println!();
                    println!("  {} {}", "Next marker:".bold(), last.job_id);
                }
            }
        }

        Commands::Show { job_id } => {
            let conf = backend.get_job_conf(&job_id).await?;
            let info = backend.get_job_info(&job_id).await?;

            println!("{}", format!("Job {}", job_id).cyan().bold());
            println!();
            println!("  {} {}", "Type:".bold(), conf.job_type);
            println!("  {} {}", "Status:".bold(), output::colored_status(info.status));
            println!("  {} {}", "Progress:".bold(), output::progress(&info));
            println!("  {} {}", "Errors:".bold(), info.errors);
            println!("  {} {}", "All sent:".bold(), info.all_sent);
            println!("  {} {}", "Params:".bold(), conf.params);
            println!("  {} {}", "Result:".bold(), info.result);
        }

        Commands::Create {
            job_id,
            job_type,
            params,
            total,
        } => {
            let params: serde_json::Value =
                serde_json::from_str(&params).context("Invalid JSON params")?;

            backend
                .create_job(&job_id, &JobConf::new(job_type, params), &JobInfo::waiting(total))
                .await?;

            println!("{}", format!("✓ Job {} queued", job_id).green().bold());
        }

        Commands::Delete { job_id } => {
            backend.delete_job(&job_id).await?;

            println!("{}", format!("✓ Job {} deleted", job_id).green().bold());
        }

        Commands::OrchestratorJobs { orchestrator_id } => {
            let jobs = backend
                .list_orchestrator_jobs(&orchestrator_id)
                .await?
                .collect::<taskmill_core::Result<Vec<_>>>()?;

            if jobs.is_empty() {
                println!(
                    "{}",
                    format!("No jobs claimed by {}", orchestrator_id).yellow()
                );
            } else {
                let rows: Vec<ClaimedJobRow> = jobs.iter().map(ClaimedJobRow::from).collect();
                println!("{}", Table::new(rows));
            }
        }

        Commands::Release {
            orchestrator_id,
            job_id,
            status,
        } => {
            let updates = status.map(JobInfoUpdate::status).unwrap_or_default();
            backend
                .fail_job(&orchestrator_id, &job_id, &updates)
                .await?;

            info!(orchestrator_id = %orchestrator_id, job_id = %job_id, "Released by operator");
            println!(
                "{}",
                format!("✓ Job {} released from {}", job_id, orchestrator_id)
                    .green()
                    .bold()
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_release_parses_status() {
        let cli = Cli::try_parse_from([
            "taskmill",
            "release",
            "orc-1",
            "job-1",
            "--status",
            "FINISHED",
        ])
        .unwrap();
        match cli.command {
            Commands::Release { status, .. } => assert_eq!(status, Some(JobStatus::Finished)),
            _ => panic!("expected release"),
        }
    }

    #[test]
    fn test_store_config_from_flags() {
        let cli = Cli::try_parse_from([
            "taskmill",
            "--database-url",
            "sqlite::memory:",
            "--busy-timeout-ms",
            "250",
            "status",
        ])
        .unwrap();
        let config = cli.store_config();
        assert!(config.is_in_memory());
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
    }
}
