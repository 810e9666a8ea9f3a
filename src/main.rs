use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use lead_nurture::config::NurtureConfig;
use lead_nurture::engine::{NurtureReport, Nurturer};
use lead_nurture::mail::{ImapSmtpTransport, MailerConfig};
use lead_nurture::seed::{SeedOptions, seed_from_csv};
use lead_nurture::store::{JsonFileStore, LeadStatus, LeadStore};

#[derive(Parser, Debug)]
#[command(
    name = "lead-nurture",
    version,
    about = "Reply-driven lead nurturing for outbound email campaigns"
)]
struct Cli {
    /// Nurturing configuration document.
    #[arg(long, default_value = "nurture.json")]
    config: PathBuf,

    /// Lead store file.
    #[arg(long, default_value = "data/leads.json")]
    store: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a single nurturing cycle
    Cycle,
    /// Run cycles on the configured interval until interrupted
    Watch {
        /// Override the configured interval between cycles
        #[arg(long)]
        interval_hours: Option<u32>,
        /// Directory for rolling log files
        #[arg(long, default_value = "logs")]
        log_dir: PathBuf,
    },
    /// Show store status and per-status lead counts
    Status,
    /// Render the lead nurturing report
    Report,
    /// Show one lead record as JSON
    Lead { identity: String },
    /// Send the initial outreach to every contact in a CSV
    Seed {
        csv: PathBuf,
        /// Outbound rate limit
        #[arg(long, default_value_t = 12)]
        per_minute: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let _log_guard = init_tracing(&cli.command);

    match cli.command {
        Commands::Cycle => {
            let nurturer = build_engine(&cli.config, &cli.store).await?;
            let summary = nurturer.run_cycle().await?;
            println!("Cycle complete: {summary}");
        }

        Commands::Watch { interval_hours, .. } => {
            let nurturer = build_engine(&cli.config, &cli.store).await?;
            let hours = interval_hours.unwrap_or_else(|| nurturer.check_interval_hours());
            tracing::info!(interval_hours = hours, "Nurturing automation started");

            let mut tick = tokio::time::interval(Duration::from_secs(u64::from(hours) * 3600));
            loop {
                tick.tick().await;
                match nurturer.run_cycle().await {
                    Ok(summary) => tracing::info!(%summary, "Nurturing cycle finished"),
                    Err(e) => tracing::error!(error = %e, "Nurturing cycle failed"),
                }
            }
        }

        Commands::Status => {
            let store = open_store(&cli.store).await?;
            let records = store.all_records().await;
            println!("Store: {}", cli.store.display());
            println!("Leads: {}", records.len());
            for status in [
                LeadStatus::New,
                LeadStatus::Contacted,
                LeadStatus::Responded,
                LeadStatus::Interested,
                LeadStatus::NotInterested,
            ] {
                let count = records.iter().filter(|l| l.status == status).count();
                println!("  {:<15} {}", status.label(), count);
            }
            match store.checkpoint().await {
                Some(cp) => println!("Checkpoint: {}", cp.to_rfc3339()),
                None => println!("Checkpoint: (none — no inbound processed yet)"),
            }
        }

        Commands::Report => {
            let store = open_store(&cli.store).await?;
            let report =
                NurtureReport::from_records(&store.all_records().await, store.checkpoint().await);
            println!("{report}");
        }

        Commands::Lead { identity } => {
            let store = open_store(&cli.store).await?;
            match store.get(&identity).await {
                Some(lead) => println!("{}", serde_json::to_string_pretty(&lead)?),
                None => {
                    eprintln!("No lead record for {identity}");
                    std::process::exit(1);
                }
            }
        }

        Commands::Seed { csv, per_minute } => {
            let config = NurtureConfig::load(&cli.config)?;
            let store: Arc<dyn LeadStore> = Arc::new(open_store(&cli.store).await?);
            let transport = Arc::new(ImapSmtpTransport::new(MailerConfig::from_env()?));
            let summary = seed_from_csv(
                &csv,
                store,
                transport,
                &config,
                SeedOptions { per_minute },
                chrono::Utc::now(),
            )
            .await?;
            println!("Seed complete: {summary}");
        }
    }

    Ok(())
}

async fn open_store(path: &Path) -> anyhow::Result<JsonFileStore> {
    JsonFileStore::open(path)
        .await
        .with_context(|| format!("Failed to open lead store at {}", path.display()))
}

async fn build_engine(config_path: &Path, store_path: &Path) -> anyhow::Result<Nurturer> {
    let config = NurtureConfig::load(config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    let store: Arc<dyn LeadStore> = Arc::new(open_store(store_path).await?);
    let transport = Arc::new(ImapSmtpTransport::new(MailerConfig::from_env()?));
    Ok(Nurturer::new(config, store, transport)?)
}

/// Stderr logging everywhere; `watch` also writes a daily-rolling file.
fn init_tracing(command: &Commands) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if let Commands::Watch { log_dir, .. } = command {
        use tracing_subscriber::fmt::writer::MakeWriterExt;

        let appender = tracing_appender::rolling::daily(log_dir, "lead-nurture.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_ansi(false)
            .with_writer(non_blocking.and(std::io::stderr))
            .init();
        Some(guard)
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
        None
    }
}
