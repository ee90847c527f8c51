use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use bulk_courier::channels::{Channel, SimulatedChannel, WebDriverChannel};
use bulk_courier::config::{CampaignConfig, ChannelSelectors, DelayRange, WebDriverConfig};
use bulk_courier::dataset::phone::{looks_like_phone, validate_phone_numbers};
use bulk_courier::dataset::{
    DatasetValidator, ValidatedDataset, load_dataset, preview, write_sample_dataset,
};
use bulk_courier::delivery::{CancelSignal, Clock, DeliveryOrchestrator, RunFailure, SystemClock};
use bulk_courier::error::DatasetError;
use bulk_courier::scheduler::{DailySchedule, run_daily};
use bulk_courier::stats::{RunReport, RunStatus, SessionStats};
use bulk_courier::templates::{self, BUILTIN_TEMPLATES};

const PREVIEW_LIMIT: usize = 5;
const EXIT_CANCELLED: u8 = 130;

/// Rate-limited, personalized bulk messaging.
#[derive(Parser)]
#[command(name = "bulk-courier", version, about = "Rate-limited personalized bulk messaging")]
struct Cli {
    /// Directory for the daily log file
    #[arg(long, global = true, env = "COURIER_LOG_DIR", default_value = "./logs")]
    log_dir: PathBuf,

    /// Log to the console only
    #[arg(long, global = true)]
    no_log_file: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deliver one message per row of a contacts file
    Run {
        /// Contacts file (.csv, .tsv, .txt or .json)
        file: PathBuf,
        #[command(flatten)]
        campaign: CampaignArgs,
        #[command(flatten)]
        driver: DriverArgs,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
        /// Write the run report as JSON
        #[arg(long)]
        report_json: Option<PathBuf>,
    },

    /// Check a contacts file without sending anything
    Validate {
        /// Contacts file (.csv, .tsv, .txt or .json)
        file: PathBuf,
        #[command(flatten)]
        campaign: CampaignArgs,
        /// List every dropped row instead of counts
        #[arg(long)]
        rows: bool,
    },

    /// Write a sample contacts file
    Init {
        #[arg(default_value = "sample_contacts.csv")]
        path: PathBuf,
    },

    /// Run the campaign every day at a fixed local time
    Schedule {
        /// Contacts file, re-read before every run
        file: PathBuf,
        /// Local send time, HH:MM
        #[arg(long)]
        at: String,
        #[command(flatten)]
        campaign: CampaignArgs,
        #[command(flatten)]
        driver: DriverArgs,
    },

    /// List built-in message templates
    Templates,
}

#[derive(Args, Clone)]
struct CampaignArgs {
    /// Column holding the contact name or phone number
    #[arg(long)]
    contact_column: Option<String>,
    /// Column holding the message body
    #[arg(long)]
    message_column: Option<String>,
    /// Built-in template name or literal template text used to build messages
    #[arg(long)]
    template: Option<String>,
    /// Template variable default, KEY=VALUE (repeatable)
    #[arg(long = "var", value_name = "KEY=VALUE")]
    vars: Vec<String>,
    /// Minimum delay between recipients, seconds
    #[arg(long)]
    min_delay: Option<u64>,
    /// Maximum delay between recipients, seconds
    #[arg(long)]
    max_delay: Option<u64>,
    /// Use the longer 5-10s campaign delay range
    #[arg(long, conflicts_with_all = ["min_delay", "max_delay"])]
    campaign_delays: bool,
    #[arg(long)]
    per_minute: Option<u32>,
    #[arg(long)]
    per_hour: Option<u32>,
    #[arg(long)]
    per_day: Option<u32>,
    /// Cooldown after hitting a ceiling, seconds
    #[arg(long)]
    cooldown: Option<u64>,
    /// Contact resolution timeout, seconds
    #[arg(long)]
    resolution_timeout: Option<u64>,
    /// Settle delay around the send action, milliseconds
    #[arg(long)]
    send_settle_ms: Option<u64>,
    /// Consecutive rate-limit denials before aborting
    #[arg(long)]
    max_denials: Option<u32>,
    /// Validate and preview only
    #[arg(long)]
    dry_run: bool,
    /// Rehearse against an in-memory channel that accepts every contact
    #[arg(long)]
    simulate: bool,
}

impl CampaignArgs {
    /// Overlay flags on environment-derived config.
    fn config(&self) -> anyhow::Result<CampaignConfig> {
        let mut config = CampaignConfig::from_env().context("reading COURIER_* environment")?;

        if let Some(c) = &self.contact_column {
            config.columns.contact = c.clone();
        }
        if let Some(m) = &self.message_column {
            config.columns.message = m.clone();
        }
        if self.campaign_delays {
            config.delay = DelayRange::campaign();
        } else if self.min_delay.is_some() || self.max_delay.is_some() {
            let min = self.min_delay.map(Duration::from_secs).unwrap_or(config.delay.min);
            let max = self.max_delay.map(Duration::from_secs).unwrap_or(config.delay.max);
            config.delay = DelayRange::new(min, max)?;
        }
        let limits = &mut config.rate_limits;
        if let Some(v) = self.per_minute {
            limits.per_minute = v;
        }
        if let Some(v) = self.per_hour {
            limits.per_hour = v;
        }
        if let Some(v) = self.per_day {
            limits.per_day = v;
        }
        if let Some(v) = self.cooldown {
            limits.cooldown = Duration::from_secs(v);
        }
        if let Some(v) = self.resolution_timeout {
            config.resolver.resolution_timeout = Duration::from_secs(v);
            config.resolver.fallback_timeout = Duration::from_secs(v);
            config.dispatch.compose_timeout = Duration::from_secs(v);
        }
        if let Some(v) = self.send_settle_ms {
            config.dispatch.settle_before_commit = Duration::from_millis(v);
            config.dispatch.settle_after_commit = Duration::from_millis(v);
        }
        if let Some(v) = self.max_denials {
            config.max_consecutive_denials = v;
        }
        config.dry_run |= self.dry_run;

        config.validate()?;
        Ok(config)
    }

    fn template_vars(&self) -> anyhow::Result<HashMap<String, String>> {
        self.vars
            .iter()
            .map(|pair| match pair.split_once('=') {
                Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
                _ => bail!("invalid --var {pair:?}, expected KEY=VALUE"),
            })
            .collect()
    }
}

#[derive(Args, Clone)]
struct DriverArgs {
    /// WebDriver server URL
    #[arg(long, env = "COURIER_WEBDRIVER_URL")]
    webdriver_url: Option<String>,
    /// Browser profile directory (keeps the login between runs)
    #[arg(long, env = "COURIER_PROFILE_DIR")]
    profile_dir: Option<String>,
    /// Run the browser without a window
    #[arg(long)]
    headless: bool,
    /// Seconds to wait for the login to complete
    #[arg(long)]
    login_timeout: Option<u64>,
}

impl DriverArgs {
    fn config(&self) -> WebDriverConfig {
        let mut config = WebDriverConfig::default();
        if let Some(url) = &self.webdriver_url {
            config.webdriver_url = url.clone();
        }
        if let Some(dir) = &self.profile_dir {
            config.profile_dir = dir.clone();
        }
        config.headless = self.headless;
        if let Some(secs) = self.login_timeout {
            config.login_timeout = Duration::from_secs(secs);
        }
        config
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = init_tracing(&cli.log_dir, !cli.no_log_file);

    match execute(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Command failed");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(log_dir: &Path, to_file: bool) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(io::stderr)
        .compact();

    if !to_file {
        tracing_subscriber::registry().with(filter).with(console).init();
        return None;
    }

    let appender = tracing_appender::rolling::daily(log_dir, "bulk-courier.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let file = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(writer);
    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();
    Some(guard)
}

async fn execute(command: Commands) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Run {
            file,
            campaign,
            driver,
            yes,
            report_json,
        } => run_command(&file, &campaign, &driver, yes, report_json.as_deref()).await,
        Commands::Validate {
            file,
            campaign,
            rows,
        } => validate_command(&file, &campaign, rows),
        Commands::Init { path } => {
            write_sample_dataset(&path)?;
            println!("Sample contacts written to {}", path.display());
            println!("Edit it with your contacts and messages, then run:");
            println!("  bulk-courier run {}", path.display());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Schedule {
            file,
            at,
            campaign,
            driver,
        } => schedule_command(file, &at, campaign, driver).await,
        Commands::Templates => {
            for (name, body) in BUILTIN_TEMPLATES {
                println!("{name}:\n  {body}\n");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

// ── Dataset preparation ─────────────────────────────────────────────────

fn prepare_dataset(
    file: &Path,
    args: &CampaignArgs,
    config: &CampaignConfig,
    row_diagnostics: bool,
) -> anyhow::Result<ValidatedDataset> {
    let mut raw = load_dataset(file)?;
    info!(file = %file.display(), rows = raw.len(), "Loaded contacts");

    if let Some(template) = &args.template {
        let body = templates::builtin(template).unwrap_or(template.as_str());
        raw = templates::apply_template(&raw, body, &config.columns.message, &args.template_vars()?)?;
    }

    let validator = DatasetValidator::new(config.columns.clone()).with_row_diagnostics(row_diagnostics);
    let dataset = match validator.validate(&raw) {
        Ok(dataset) => dataset,
        Err(report) => {
            for issue in &report.issues {
                eprintln!("  - {issue}");
            }
            return Err(DatasetError::Rejected(report).into());
        }
    };
    for warning in &dataset.report.warnings {
        println!("Warning: {warning}");
    }
    Ok(dataset)
}

fn validate_command(file: &Path, args: &CampaignArgs, rows: bool) -> anyhow::Result<ExitCode> {
    let config = args.config()?;
    let dataset = prepare_dataset(file, args, &config, rows)?;
    let report = &dataset.report;
    println!("File is valid");
    println!("  Rows:    {}", report.total_rows);
    println!("  Valid:   {}", report.valid_rows);
    println!("  Skipped: {}", dataset.skipped.len());

    let numbers = dataset
        .records
        .iter()
        .map(|r| r.identifier.as_str())
        .filter(|id| looks_like_phone(id));
    let phones = validate_phone_numbers(numbers);
    if !phones.valid.is_empty() || !phones.invalid.is_empty() {
        println!(
            "  Phone numbers: {} valid, {} invalid",
            phones.valid.len(),
            phones.invalid.len()
        );
        for bad in &phones.invalid {
            println!("    - {bad}");
        }
    }
    println!();
    print!("{}", preview(&dataset, PREVIEW_LIMIT));
    Ok(ExitCode::SUCCESS)
}

// ── Delivery ────────────────────────────────────────────────────────────

async fn run_command(
    file: &Path,
    args: &CampaignArgs,
    driver: &DriverArgs,
    yes: bool,
    report_json: Option<&Path>,
) -> anyhow::Result<ExitCode> {
    let config = args.config()?;
    let dataset = prepare_dataset(file, args, &config, false)?;

    println!("Preview ({} recipients):", dataset.records.len());
    print!("{}", preview(&dataset, PREVIEW_LIMIT));
    println!();

    if !config.dry_run && !yes && !confirm(dataset.records.len())? {
        println!("Cancelled.");
        return Ok(ExitCode::SUCCESS);
    }

    let cancel = CancelSignal::new();
    spawn_interrupt_handler(cancel.clone());

    let mut session = SessionStats::new(SystemClock.now());
    let outcome = deliver(&dataset, config, args.simulate, driver, cancel).await?;
    let code = finish_run(outcome, report_json, &mut session)?;

    let snap = session.snapshot(SystemClock.now());
    info!(
        sent = snap.messages_sent,
        failed = snap.messages_failed,
        seconds = snap.duration_seconds,
        avg_secs_per_message = snap.average_time_per_message,
        "Session finished"
    );
    Ok(code)
}

/// Open the right channel, run once, shut the channel down.
async fn deliver(
    dataset: &ValidatedDataset,
    config: CampaignConfig,
    simulate: bool,
    driver: &DriverArgs,
    cancel: CancelSignal,
) -> anyhow::Result<Result<RunReport, RunFailure>> {
    let selectors = ChannelSelectors::default();
    if simulate || config.dry_run {
        let channel = SimulatedChannel::accepting_all(selectors.clone());
        return Ok(run_with(channel, dataset, config, selectors, cancel).await);
    }

    let driver_config = driver.config();
    let channel = WebDriverChannel::connect(driver_config.clone())
        .await
        .context("starting browser session")?;
    Ok(run_with(channel, dataset, config, driver_config.selectors, cancel).await)
}

async fn run_with<C: Channel>(
    channel: C,
    dataset: &ValidatedDataset,
    config: CampaignConfig,
    selectors: ChannelSelectors,
    cancel: CancelSignal,
) -> Result<RunReport, RunFailure> {
    let mut orchestrator =
        DeliveryOrchestrator::new(channel, config, selectors).with_cancel_signal(cancel);
    let result = orchestrator.run(dataset).await;
    orchestrator.into_channel().await;
    result
}

fn finish_run(
    outcome: Result<RunReport, RunFailure>,
    report_json: Option<&Path>,
    session: &mut SessionStats,
) -> anyhow::Result<ExitCode> {
    let (report, failure) = match outcome {
        Ok(report) => (report, None),
        Err(RunFailure { error, report }) => (report, Some(error)),
    };
    session.absorb(&report);
    print_report(&report);

    if let Some(path) = report_json {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("writing report to {}", path.display()))?;
        info!(path = %path.display(), "Run report written");
    }

    if let Some(error) = failure {
        return Err(anyhow::Error::new(error).context("delivery run aborted"));
    }
    Ok(match report.status {
        RunStatus::Cancelled => ExitCode::from(EXIT_CANCELLED),
        _ => ExitCode::SUCCESS,
    })
}

fn print_report(report: &RunReport) {
    println!();
    println!("Run {}", report.status);
    println!("  Total:      {}", report.total);
    println!("  Successful: {}", report.successful);
    println!("  Failed:     {}", report.failed);
    println!("  Skipped:    {}", report.skipped);
    if report.unprocessed > 0 {
        println!("  Not processed: {}", report.unprocessed);
    }
    println!("  Success rate: {:.1}%", report.success_rate * 100.0);
    println!("  Time: {:.1}s", report.processing_time_seconds);
    if !report.failed_identifiers.is_empty() {
        println!("  Failed contacts:");
        for id in &report.failed_identifiers {
            println!("    - {id}");
        }
    }
    if let Some(reason) = &report.abort_reason {
        println!("  Aborted: {reason}");
    }
}

fn confirm(count: usize) -> anyhow::Result<bool> {
    print!("Proceed with sending {count} messages? (yes/no): ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("yes"))
}

fn spawn_interrupt_handler(cancel: CancelSignal) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping after the current recipient");
            cancel.cancel();
        }
    });
}

// ── Scheduling ──────────────────────────────────────────────────────────

async fn schedule_command(
    file: PathBuf,
    at: &str,
    args: CampaignArgs,
    driver: DriverArgs,
) -> anyhow::Result<ExitCode> {
    let schedule = DailySchedule::parse(at)?;
    // Fail fast on bad flags before waiting for the first fire time.
    args.config()?;

    let cancel = CancelSignal::new();
    spawn_interrupt_handler(cancel.clone());
    let session = Arc::new(Mutex::new(SessionStats::new(SystemClock.now())));

    println!("Campaign scheduled daily at {schedule}. Press Ctrl+C to stop.");
    let runs = run_daily(&schedule, &cancel, || {
        let (file, args, driver) = (file.clone(), args.clone(), driver.clone());
        let (cancel, session) = (cancel.clone(), Arc::clone(&session));
        async move {
            if let Err(e) = scheduled_job(&file, &args, &driver, cancel, &session).await {
                error!(error = %format!("{e:#}"), "Scheduled run failed");
            }
        }
    })
    .await?;

    let snap = session.lock().await.snapshot(SystemClock.now());
    println!(
        "Schedule stopped after {runs} runs: {} sent, {} failed",
        snap.messages_sent, snap.messages_failed
    );
    Ok(ExitCode::SUCCESS)
}

async fn scheduled_job(
    file: &Path,
    args: &CampaignArgs,
    driver: &DriverArgs,
    cancel: CancelSignal,
    session: &Mutex<SessionStats>,
) -> anyhow::Result<()> {
    let config = args.config()?;
    let dataset = prepare_dataset(file, args, &config, false)?;
    let outcome = deliver(&dataset, config, args.simulate, driver, cancel).await?;
    let mut session = session.lock().await;
    finish_run(outcome, None, &mut session)?;
    Ok(())
}
