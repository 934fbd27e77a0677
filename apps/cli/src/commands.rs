//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use leadflow_inference::InferenceClient;
use leadflow_pipeline::orchestrator::{BatchReceipt, BatchUpload, Orchestrator};
use leadflow_shared::{
    AppConfig, BatchId, BatchProgress, BatchStatus, StageKey, StageStatus, init_config,
    load_config, load_config_from,
};
use leadflow_store::{DataLayout, IntelStore, ProgressStore};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// LeadFlow — concurrent batch lead enrichment.
#[derive(Parser)]
#[command(
    name = "leadflow",
    version,
    about = "Submit five-file CSV batches for staged lead enrichment and inspect the results.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Path to a config file (defaults to ~/.leadflow/leadflow.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Submit a five-file batch for enrichment.
    Submit {
        /// Agent mapping CSV.
        #[arg(long)]
        agent_mapping: PathBuf,

        /// CRM pipeline CSV.
        #[arg(long)]
        crm_pipeline: PathBuf,

        /// Email interaction log CSV.
        #[arg(long)]
        email_logs: PathBuf,

        /// Leads dataset CSV.
        #[arg(long)]
        leads_data: PathBuf,

        /// Sales pipeline CSV.
        #[arg(long)]
        sales_pipeline: PathBuf,

        /// Render a progress bar until the batch finishes.
        #[arg(long)]
        watch: bool,
    },

    /// Show the progress document for a batch.
    Progress {
        /// Batch id (BATCH_YYYY_MM_DD_XXXXXXXX).
        batch_id: String,
    },

    /// Show the stored enrichment intel for one lead.
    Intel {
        /// Lead id, e.g. L0042.
        lead_id: String,
    },

    /// List the five pipeline stages.
    Stages,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = format!(
        "leadflow={level},leadflow_shared={level},leadflow_store={level},\
         leadflow_inference={level},leadflow_pipeline={level}"
    );

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Submit {
            agent_mapping,
            crm_pipeline,
            email_logs,
            leads_data,
            sales_pipeline,
            watch,
        } => {
            let upload = BatchUpload {
                agent_mapping,
                crm_pipeline,
                email_logs,
                leads_data,
                sales_pipeline,
            };
            cmd_submit(config_path, upload, watch).await
        }
        Command::Progress { batch_id } => cmd_progress(config_path, &batch_id),
        Command::Intel { lead_id } => cmd_intel(config_path, &lead_id),
        Command::Stages => cmd_stages(),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn effective_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    })
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_submit(config_path: Option<&Path>, upload: BatchUpload, watch: bool) -> Result<()> {
    let config = effective_config(config_path)?;
    let client = InferenceClient::new(&config.inference)?;
    let orchestrator = Orchestrator::new(&config, config.defaults.data_dir.clone(), client);

    info!(leads = %upload.leads_data.display(), "submitting batch");
    let receipt = orchestrator.submit(upload).await?;

    println!();
    println!("  Batch accepted!");
    println!("  ID:      {}", receipt.batch_id);
    println!("  Files:   {}", receipt.files_received);
    println!("  Records: {}", receipt.total_records);
    println!();

    if watch {
        watch_progress(&orchestrator, &receipt).await
    } else {
        // The run lives in this process; hold it open until the batch
        // drains, with progress visible in the logs.
        orchestrator.shutdown().await;
        let progress = orchestrator.progress(&receipt.batch_id)?;
        report_outcome(&receipt.batch_id, progress.status)
    }
}

/// Poll the progress document every 300 ms, driving an indicatif bar until
/// the batch reaches a terminal status.
async fn watch_progress(orchestrator: &Orchestrator, receipt: &BatchReceipt) -> Result<()> {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("  {bar:40.cyan/blue} {pos:>3}% {msg}")
            .unwrap()
            .progress_chars("##-"),
    );

    let final_status = loop {
        let progress = orchestrator.progress(&receipt.batch_id)?;
        bar.set_position(progress.percent as u64);
        bar.set_message(format!(
            "{} ({}/{} records)",
            progress.status, progress.processed, progress.total
        ));
        if progress.status.is_terminal() {
            break progress.status;
        }
        tokio::time::sleep(Duration::from_millis(300)).await;
    };
    bar.finish_and_clear();

    // The poll can observe the terminal status before the task has fully
    // unwound; join it for a clean exit.
    orchestrator.shutdown().await;
    report_outcome(&receipt.batch_id, final_status)
}

fn report_outcome(batch_id: &BatchId, status: BatchStatus) -> Result<()> {
    match status {
        BatchStatus::Completed => {
            println!("  Batch {batch_id} completed.");
            Ok(())
        }
        status => Err(eyre!("batch {batch_id} ended {status}")),
    }
}

fn cmd_progress(config_path: Option<&Path>, batch_id: &str) -> Result<()> {
    let config = effective_config(config_path)?;
    let batch_id = BatchId::from_str(batch_id)?;
    let layout = DataLayout::new(&config.defaults.data_dir);
    let progress = ProgressStore::new(layout).read(&batch_id)?;
    print_progress(&progress);
    Ok(())
}

fn print_progress(progress: &BatchProgress) {
    println!();
    println!("  Batch:    {}", progress.batch_id);
    println!("  Status:   {}", progress.status);
    println!(
        "  Progress: {}% ({}/{} records)",
        progress.percent, progress.processed, progress.total
    );
    println!("  Stages:");
    for key in StageKey::ALL {
        let status = progress
            .stages
            .get(&key)
            .copied()
            .unwrap_or(StageStatus::Pending);
        println!("    {:<14} {status}", key.to_string());
    }
    println!();
}

fn cmd_intel(config_path: Option<&Path>, lead_id: &str) -> Result<()> {
    let config = effective_config(config_path)?;
    let layout = DataLayout::new(&config.defaults.data_dir);
    let store = IntelStore::load(layout.intel())?;
    let state = store
        .get(lead_id)
        .ok_or_else(|| eyre!("no intel stored for lead '{lead_id}'"))?;
    println!("{}", serde_json::to_string_pretty(state)?);
    Ok(())
}

fn cmd_stages() -> Result<()> {
    println!();
    for key in StageKey::ALL {
        println!("  {:<14} {:<22} {}", key.to_string(), key.label(), key.description());
    }
    println!();
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config: AppConfig = effective_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
