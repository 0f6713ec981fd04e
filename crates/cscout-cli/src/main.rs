mod client;

use std::time::Duration;

use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::client::{ApiClient, JobReport};

#[derive(Debug, Parser)]
#[command(name = "cscout-cli")]
#[command(about = "Creator discovery command line interface")]
struct Cli {
    /// Base URL of the cscout-server API.
    #[arg(long, env = "CSCOUT_API_URL", default_value = "http://127.0.0.1:8080")]
    api_url: String,

    /// Bearer token; omit when the server runs with auth disabled.
    #[arg(long, env = "CSCOUT_API_KEY")]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create a search job and print its ID.
    Create {
        #[arg(long)]
        owner_id: Uuid,
        #[arg(long)]
        campaign_id: Option<Uuid>,
        #[arg(long)]
        platform: String,
        /// Seed keyword; repeat the flag for more.
        #[arg(long = "keyword", required = true)]
        keywords: Vec<String>,
        /// One of 50, 100, 250, 500.
        #[arg(long, default_value_t = 50)]
        target: i64,
        /// Wait for the job to finish instead of returning immediately.
        #[arg(long)]
        watch: bool,
    },
    /// Print the status (and results, once finished) of a job.
    Status {
        job_id: Uuid,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Poll a job until it reaches a terminal state.
    Watch {
        job_id: Uuid,
        #[arg(long, default_value_t = 2)]
        interval_secs: u64,
    },
    /// Re-trigger processing for a stuck job.
    Trigger { job_id: Uuid },
    /// List recent jobs for an owner.
    List {
        #[arg(long)]
        owner_id: Uuid,
    },
}

/// Upper bound on watch polling so a wedged server cannot hang the CLI
/// forever; jobs themselves time out server-side well before this.
const MAX_WATCH_POLLS: u32 = 600;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let client = ApiClient::new(&cli.api_url, cli.api_key.as_deref())?;

    match cli.command {
        Commands::Create {
            owner_id,
            campaign_id,
            platform,
            keywords,
            target,
            watch,
        } => {
            let created = client
                .create_job(owner_id, campaign_id, &platform, &keywords, target)
                .await?;
            println!(
                "created job {} (status: {}, target: {})",
                created.job_id, created.status, created.effective_target
            );
            if watch {
                let report = watch_job(&client, created.job_id, 2).await?;
                print_report(&report);
            }
        }
        Commands::Status {
            job_id,
            offset,
            limit,
        } => {
            let report = client.job_status(job_id, offset, limit).await?;
            print_report(&report);
        }
        Commands::Watch {
            job_id,
            interval_secs,
        } => {
            let report = watch_job(&client, job_id, interval_secs).await?;
            print_report(&report);
        }
        Commands::Trigger { job_id } => {
            client.trigger_job(job_id).await?;
            println!("processing triggered for job {job_id}");
        }
        Commands::List { owner_id } => {
            let jobs = client.list_jobs(owner_id).await?;
            if jobs.is_empty() {
                println!("no jobs for owner {owner_id}");
            }
            for job in jobs {
                println!(
                    "{}  {:<10} {:>3}%  {:<10} {:>5} creators  {}",
                    job.job_id,
                    job.status.to_string(),
                    job.progress,
                    job.platform,
                    job.processed_results,
                    job.created_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
    }

    Ok(())
}

async fn watch_job(
    client: &ApiClient,
    job_id: Uuid,
    interval_secs: u64,
) -> anyhow::Result<JobReport> {
    let interval = Duration::from_secs(interval_secs.max(1));

    for _ in 0..MAX_WATCH_POLLS {
        let report = client.job_status(job_id, 0, 50).await?;
        if report.status.is_terminal() {
            return Ok(report);
        }
        println!("job {} {} ({}%)", job_id, report.status, report.progress);
        tokio::time::sleep(interval).await;
    }

    anyhow::bail!("job {job_id} did not finish within the watch window")
}

fn print_report(report: &JobReport) {
    println!("job       {}", report.job_id);
    println!("status    {} ({}%)", report.status, report.progress);
    println!("platform  {}", report.platform);
    println!(
        "creators  {} of {} requested",
        report.processed_results, report.target_results
    );
    if let Some(message) = &report.error_message {
        println!("error     {message}");
    }
    if let Some(finished) = report.completed_at {
        let elapsed = finished - report.created_at;
        println!("duration  {}s", elapsed.num_seconds());
    }
    if let Some(page) = &report.results {
        println!(
            "results   {}..{} of {}",
            page.offset,
            page.offset + page.creators.len(),
            page.total
        );
        for creator in &page.creators {
            let badge = if creator.verified { "[verified] " } else { "" };
            println!(
                "  @{:<24} {:>10} followers  {badge}via '{}'",
                creator.username, creator.follower_count, creator.source_keyword
            );
        }
    }
}
