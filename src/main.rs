use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use stgcp::config::{ProviderConfig, StateFile};
use stgcp::eab::{self, EabCredential, EabProvisioner};
use stgcp::gcp::auth::{GcpCredentials, ServiceAccount, DEFAULT_SCOPES};
use stgcp::gcp::client::Endpoints;
use stgcp::gcp::http::GcpHttpClient;
use stgcp::resource::{self, tags::TagMap, ComputeBackendServices, ResourceFilter};
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// ACME EAB credentials and tagged backend services on GCP
#[derive(Parser, Debug)]
#[command(name = "stgcp", version = stgcp::VERSION, about, long_about = None)]
struct Cli {
    /// GCP project to use
    #[arg(short, long, global = true)]
    project: Option<String>,

    /// Service account key: a file path or the JSON contents
    #[arg(short, long, global = true)]
    credentials: Option<String>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage the ACME External Account Binding credential
    #[command(subcommand)]
    Eab(EabCommand),

    /// List load balancer backend services matching a name and/or tags
    BackendServices(BackendServicesArgs),
}

#[derive(Subcommand, Debug)]
enum EabCommand {
    /// Request a new credential and store it
    Create(StateArgs),
    /// Request a replacement for the stored credential
    Rotate(StateArgs),
    /// Show the stored credential (the Public CA cannot be queried)
    Read(StateArgs),
    /// Forget the stored credential (nothing is revoked server-side)
    Delete(StateArgs),
}

#[derive(Args, Debug)]
struct StateArgs {
    /// Local credential state file
    #[arg(long)]
    state: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct BackendServicesArgs {
    /// Exact backend service name
    #[arg(long)]
    name: Option<String>,

    /// Required tag, as KEY=VALUE (repeatable)
    #[arg(long = "tag", value_parser = parse_tag)]
    tags: Vec<(String, String)>,

    /// Apply an empty tag filter when no --tag is given
    #[arg(long, conflicts_with = "tags")]
    empty_tags: bool,
}

impl BackendServicesArgs {
    fn filter(&self) -> ResourceFilter {
        let mut filter = ResourceFilter::new();
        if let Some(name) = &self.name {
            filter = filter.with_name(name.clone());
        }
        if !self.tags.is_empty() || self.empty_tags {
            filter = filter.with_tags(self.tags.iter().cloned().collect::<TagMap>());
        }
        filter
    }
}

fn parse_tag(value: &str) -> Result<(String, String), String> {
    value
        .split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got {value:?}"))
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("stgcp started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("stgcp").join("stgcp.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".stgcp").join("stgcp.log");
    }
    PathBuf::from("stgcp.log")
}

fn state_file(args: &StateArgs) -> Result<StateFile> {
    let path = match &args.state {
        Some(path) => path.clone(),
        None => StateFile::default_path()
            .context("Cannot determine config directory, pass --state")?,
    };
    Ok(StateFile::new(path))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    write_json(&mut std::io::stdout().lock(), value)
}

fn write_json(out: &mut impl Write, value: &impl serde::Serialize) -> Result<()> {
    writeln!(out, "{}", serde_json::to_string_pretty(value)?)?;
    Ok(())
}

/// Persist a freshly issued credential and emit it. The credential is
/// emitted even when persisting fails.
fn store_and_emit(
    state: &StateFile,
    credential: &EabCredential,
    out: &mut impl Write,
) -> Result<()> {
    let saved = state.save(credential);
    write_json(out, credential)?;
    saved.with_context(|| {
        format!(
            "Credential {} was issued but could not be stored in {}; the output above is the only copy",
            credential.key_id,
            state.path().display()
        )
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _log_guard = setup_logging(cli.log_level)?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling");
                cancel.cancel();
            }
        });
    }

    let config = ProviderConfig::resolve(cli.project.clone(), cli.credentials.clone())?;
    let endpoints = Endpoints::from_env();

    match &cli.command {
        Command::Eab(command) => run_eab(command, &config, endpoints, &cancel).await,
        Command::BackendServices(args) => {
            run_backend_services(args, &config, &endpoints, &cancel).await
        }
    }
}

async fn run_eab(
    command: &EabCommand,
    config: &ProviderConfig,
    endpoints: Endpoints,
    cancel: &CancellationToken,
) -> Result<()> {
    match command {
        EabCommand::Create(args) => {
            let state = state_file(args)?;
            let provisioner = EabProvisioner::new(endpoints);
            let credential = provisioner
                .create(config.require_credentials()?, cancel)
                .await?;
            store_and_emit(&state, &credential, &mut std::io::stdout().lock())
        }
        EabCommand::Rotate(args) => {
            let state = state_file(args)?;
            let prior = state.load()?.with_context(|| {
                format!(
                    "No stored credential at {}, run `stgcp eab create` first",
                    state.path().display()
                )
            })?;
            let provisioner = EabProvisioner::new(endpoints);
            let credential = provisioner
                .rotate(config.require_credentials()?, &prior, cancel)
                .await?;
            store_and_emit(&state, &credential, &mut std::io::stdout().lock())
        }
        EabCommand::Read(args) => {
            let state = state_file(args)?;
            let credential = state.load()?;
            eab::read_remote(credential.as_ref());
            match credential {
                Some(credential) => print_json(&credential),
                None => anyhow::bail!("No stored credential at {}", state.path().display()),
            }
        }
        EabCommand::Delete(args) => {
            let state = state_file(args)?;
            let credential = state.load()?;
            eab::delete_remote(credential);
            if state.remove()? {
                eprintln!(
                    "Removed {}. The Public CA has no delete API, so the credential itself remains valid.",
                    state.path().display()
                );
            }
            Ok(())
        }
    }
}

async fn run_backend_services(
    args: &BackendServicesArgs,
    config: &ProviderConfig,
    endpoints: &Endpoints,
    cancel: &CancellationToken,
) -> Result<()> {
    let (credentials, project) = match config.credentials.as_deref() {
        Some(json) => {
            let credentials = GcpCredentials::from_service_account_json(json, DEFAULT_SCOPES)?;
            let project = match config.project.clone() {
                Some(project) => project,
                None => ServiceAccount::from_json(json)?.project()?.to_string(),
            };
            (credentials, project)
        }
        None => {
            tracing::info!("No credentials configured, using Application Default Credentials");
            let credentials = GcpCredentials::application_default(DEFAULT_SCOPES)
                .await
                .context("Failed to initialize GCP authentication. Run 'gcloud auth application-default login'")?;
            (credentials, config.require_project()?.to_string())
        }
    };

    tracing::info!("Scanning backend services in project {}", project);

    let http = GcpHttpClient::new(Arc::new(credentials))?;
    let source = ComputeBackendServices::new(http, endpoints, &project);
    let matches = resource::scan(&source, &args.filter(), cancel).await?;

    print_json(&matches)
}
