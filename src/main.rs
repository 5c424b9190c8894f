use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use jobscout::api::{HttpScraperApi, ScraperApi};
use jobscout::config::Config;
use jobscout::logging;
use jobscout::results::{self, ResultsSnapshot, ResultsView};
use jobscout::session::resume::{self, ResumeOutcome, StoredCredentials};
use jobscout::session::{
    ControllerSettings, Session, SessionController, SessionEvent, StartStrategy, VerificationFlow,
    VerificationListener,
};
use jobscout::state::{FileFlagStore, FlagStore};

#[derive(Parser)]
#[command(name = "jobscout")]
#[command(about = "Start, track and resume remote job-scraping sessions")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Override the configured maximum number of jobs to scrape
    #[arg(long, global = true)]
    max_jobs: Option<u32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a session with the shared demo account
    Demo,

    /// Start a session with job board credentials
    Start {
        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        password: String,
    },

    /// Start a session by email one-time code
    Verify {
        #[arg(short, long)]
        email: String,
    },

    /// Arm an automatic start for the next `resume`
    Arm {
        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        password: Option<String>,

        /// Resume into the email code prompt instead of starting directly
        #[arg(long)]
        verification_code: bool,
    },

    /// Consume an armed start, if any
    Resume,

    /// Show results left pending by an earlier run
    Results,

    /// Write the effective configuration to .jobscout/config.toml
    Init,
}

/// Everything a session command needs, wired from configuration
struct Runtime {
    config: Config,
    api: Arc<dyn ScraperApi>,
    store: FileFlagStore,
    controller: Arc<SessionController>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl Runtime {
    fn new(config: Config) -> Result<Self> {
        let api: Arc<dyn ScraperApi> = Arc::new(
            HttpScraperApi::from_config(&config).context("Failed to build scraping API client")?,
        );
        let store = FileFlagStore::new(config.flags_path());
        let (tx, events) = mpsc::unbounded_channel();
        let controller = Arc::new(SessionController::new(
            api.clone(),
            ControllerSettings::from_config(&config),
            tx,
        ));

        Ok(Self {
            config,
            api,
            store,
            controller,
            events,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(max_jobs) = cli.max_jobs {
        config.scraping.max_jobs = max_jobs;
    }

    let logging_handle = logging::init_logging(&config, cli.debug)?;

    let result = match cli.command {
        Commands::Demo => cmd_start(config, StartStrategy::Demo).await,
        Commands::Start { email, password } => {
            cmd_start(config, StartStrategy::Credentials { email, password }).await
        }
        Commands::Verify { email } => cmd_verify(config, email).await,
        Commands::Arm {
            email,
            password,
            verification_code,
        } => cmd_arm(&config, email, password, verification_code),
        Commands::Resume => cmd_resume(config).await,
        Commands::Results => cmd_results(config).await,
        Commands::Init => cmd_init(&config),
    };

    print_log_location(logging_handle.log_file_path);
    result
}

fn print_log_location(log_file_path: Option<PathBuf>) {
    if let Some(log_path) = log_file_path {
        if let Ok(metadata) = log_path.metadata() {
            if metadata.len() > 0 {
                eprintln!("Session log: {}", log_path.display());
            }
        }
    }
}

async fn cmd_start(config: Config, strategy: StartStrategy) -> Result<()> {
    let mut runtime = Runtime::new(config)?;
    resume::discard_armed(&runtime.store);

    let session_id = runtime
        .controller
        .start(strategy)
        .await
        .map_err(|e| anyhow!("{}", e))?;
    println!("Session {} started", session_id);

    watch_session(&mut runtime).await
}

async fn cmd_verify(config: Config, email: String) -> Result<()> {
    let mut runtime = Runtime::new(config)?;
    resume::discard_armed(&runtime.store);
    if run_verification(&runtime, email).await? {
        watch_session(&mut runtime).await?;
    }
    Ok(())
}

fn cmd_arm(
    config: &Config,
    email: String,
    password: Option<String>,
    use_verification_code: bool,
) -> Result<()> {
    let store = FileFlagStore::new(config.flags_path());
    let credentials = StoredCredentials {
        email,
        password,
        use_verification_code,
    };
    resume::arm(&store, &credentials).context("Failed to write auto-start flags")?;

    println!(
        "Armed auto-start for {} ({})",
        credentials.email,
        describe_resume(&credentials)
    );
    println!("Flags stored in {}", store.path().display());
    println!("Run 'jobscout resume' to start it");
    Ok(())
}

fn describe_resume(credentials: &StoredCredentials) -> &'static str {
    if credentials.use_verification_code {
        "email code"
    } else if credentials.password.is_some() {
        "credentials"
    } else {
        "demo account"
    }
}

async fn cmd_resume(config: Config) -> Result<()> {
    let mut runtime = Runtime::new(config)?;

    match resume::resume_on_mount(&runtime.controller, &runtime.store).await {
        ResumeOutcome::Skipped | ResumeOutcome::NotArmed => {
            println!("Nothing to resume");
            Ok(())
        }
        ResumeOutcome::AwaitingVerification { email } => {
            if run_verification(&runtime, email).await? {
                watch_session(&mut runtime).await?;
            }
            Ok(())
        }
        ResumeOutcome::Started(Ok(session_id)) => {
            println!("Resumed session {}", session_id);
            watch_session(&mut runtime).await
        }
        ResumeOutcome::Started(Err(e)) => Err(anyhow!("Resumed start failed: {}", e)),
    }
}

async fn cmd_results(config: Config) -> Result<()> {
    let runtime = Runtime::new(config)?;

    match results::take_pending(&runtime.store).context("Failed to read pending results")? {
        Some(snapshot) => show_results(&runtime, snapshot).await,
        None => println!("No pending results"),
    }
    Ok(())
}

fn cmd_init(config: &Config) -> Result<()> {
    let path = config.save()?;
    println!("Wrote configuration to {}", path.display());
    Ok(())
}

/// Drive the email code prompt. Returns true once a session was handed to
/// the controller, false if the user gave up.
async fn run_verification(runtime: &Runtime, email: String) -> Result<bool> {
    let listener: Arc<dyn VerificationListener> = runtime.controller.clone();
    let mut flow = VerificationFlow::new(
        runtime.api.clone(),
        listener,
        runtime.config.scraping.max_jobs,
    )
    .with_email(email.clone());

    if let Err(e) = flow.request_code(&email).await {
        flow.cancel();
        return Err(anyhow!("Could not request a verification code: {}", e));
    }
    if let Some(notice) = flow.notice() {
        println!("{}", notice);
    }

    loop {
        let input = prompt("Enter the 6-digit code (blank to cancel): ")?;
        if input.trim().is_empty() {
            flow.cancel();
            println!("Verification cancelled");
            return Ok(false);
        }

        let code = flow.set_code_input(&input).to_string();
        match flow.submit_code(&email, &code).await {
            Ok(session_id) => {
                println!("Session {} started", session_id);
                return Ok(true);
            }
            Err(e) => eprintln!("{}", e),
        }
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input)
}

/// Print progress until the session finishes, then show results if any.
/// Ctrl-C stops tracking; the remote run is left alone.
async fn watch_session(runtime: &mut Runtime) -> Result<()> {
    let mut last_line = String::new();

    let finished = loop {
        let event = tokio::select! {
            event = runtime.events.recv() => event,
            _ = tokio::signal::ctrl_c() => {
                runtime.controller.stop();
                if let Some(id) = runtime.controller.session().and_then(|s| s.id) {
                    println!("\nStopped tracking session {}; it keeps running remotely", id);
                }
                return Ok(());
            }
        };

        match event {
            Some(SessionEvent::Updated(session)) => {
                let line = progress_line(&session);
                if line != last_line {
                    println!("{}", line);
                    last_line = line;
                }
            }
            Some(SessionEvent::StartFailed { message }) => return Err(anyhow!(message)),
            Some(SessionEvent::Finished(session)) => break session,
            Some(SessionEvent::ResultsReady(_)) => {}
            None => return Ok(()),
        }
    };

    print_summary(&finished);

    let mut pending = None;
    while let Ok(event) = runtime.events.try_recv() {
        if let SessionEvent::ResultsReady(snapshot) = event {
            pending = Some(snapshot);
        }
    }
    if let Some(snapshot) = pending {
        results::stash_pending(&runtime.store, &snapshot)
            .context("Failed to record pending results")?;
        if let Some(snapshot) = results::take_pending(&runtime.store)? {
            show_results(runtime, snapshot).await;
        }
    }

    Ok(())
}

fn progress_line(session: &Session) -> String {
    let model = session.progress_model();
    let steps: Vec<String> = model
        .steps
        .iter()
        .map(|s| format!("{} {}", s.status.symbol(), s.label))
        .collect();

    format!(
        "[{:>3}%] {:<10} {} | {}",
        model.overall_percent,
        session.status,
        steps.join("  "),
        session.message
    )
}

fn print_summary(session: &Session) {
    let elapsed = session
        .elapsed(chrono::Utc::now())
        .map(|d| format!(" in {}s", d.num_seconds()))
        .unwrap_or_default();
    println!("{}", "─".repeat(60));
    println!(
        "Session {}{}: {} of {} jobs scraped",
        session.status, elapsed, session.jobs_scraped, session.total_jobs
    );
}

async fn show_results(runtime: &Runtime, snapshot: ResultsSnapshot) {
    let view = ResultsView::open(
        runtime.api.as_ref(),
        snapshot,
        runtime.config.scraping.results_limit,
    )
    .await;
    println!();
    print!("{}", view.render());
}
