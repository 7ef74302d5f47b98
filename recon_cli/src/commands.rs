use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use recon_client::{ReconstructionClient, RemoteClient};
use recon_config::ReconConfig;
use recon_logging::{init_logging, LoggingConfig};
use recon_session::upload::content_type_for_path;
use recon_session::{InputFile, SessionContext, SessionStatus};
use recon_types::{Method, Quality, SessionId};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use utils::normalized_path_from_user_string;

use crate::render::{self, TerminalRenderer};

const VERSION: &str = concat!("recon ", env!("CARGO_PKG_VERSION"));

/// Command-line client for the photogrammetry reconstruction service.
///
/// Uploads a batch of photographs, starts a reconstruction job, follows its progress
/// until it finishes, and reports where the resulting 3D model can be fetched.
#[derive(Parser, Debug)]
#[clap(name = "recon", version, propagate_version = true)]
pub struct ReconApp {
    #[clap(flatten)]
    overrides: CliOverrides,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct CliOverrides {
    /// Base URL of the reconstruction service.  Overrides RECON_CLIENT_ENDPOINT.
    #[clap(long, short, global = true)]
    endpoint: Option<String>,

    /// Increase verbosity of log output (-v, -vv, etc.)
    #[clap(long, short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Write logs to this file, or to a new file in this directory.  Writes to stderr if not provided.
    #[clap(long, global = true)]
    log: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload images, start a reconstruction and follow it until it finishes.
    Run(RunArgs),

    /// Print the current status of a session once.
    Status(SessionArg),

    /// Re-attach to an existing session and follow it until it finishes.
    Resume(ResumeArgs),

    /// Print the model URL of a completed session.
    Model(SessionArg),

    /// Download the result bundle, or one result file, of a completed session.
    Download(DownloadArgs),

    /// Delete a session on the service.
    Delete(SessionArg),

    /// Check that the service is up.
    Health,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Image files, or directories whose images are all uploaded.
    #[clap(required = true)]
    images: Vec<String>,

    /// Reconstruction quality: low, medium or high.
    #[clap(long, short, default_value_t = Quality::Medium)]
    quality: Quality,

    /// Reconstruction method: colmap, openmvs or neural.
    #[clap(long, short, default_value_t = Method::Colmap)]
    method: Method,

    /// Exit after the job has started, printing the session id to resume later.
    #[clap(long)]
    no_wait: bool,

    /// Write the result bundle (zip) to this path once the job completes.
    #[clap(long, short)]
    output: Option<String>,
}

#[derive(Args, Debug)]
struct SessionArg {
    session_id: String,
}

#[derive(Args, Debug)]
struct ResumeArgs {
    session_id: String,

    /// Write the result bundle (zip) to this path once the job completes.
    #[clap(long, short)]
    output: Option<String>,
}

#[derive(Args, Debug)]
struct DownloadArgs {
    session_id: String,

    /// Download only this result file instead of the zip bundle.
    #[clap(long, short)]
    file: Option<String>,

    /// Destination path.
    #[clap(long, short)]
    output: String,
}

impl ReconApp {
    pub async fn run(self) -> Result<()> {
        let mut config = ReconConfig::new();
        if let Some(endpoint) = self.overrides.endpoint {
            config.client.endpoint = endpoint;
        }
        if let Some(log) = self.overrides.log {
            config.log.dest = Some(log);
        }

        let mut logging = LoggingConfig::from_config(&config, VERSION);
        if let Some(level) = console_level(self.overrides.verbose) {
            logging = logging.with_console_level(level);
        }
        init_logging(logging);

        let client: Arc<dyn ReconstructionClient> =
            Arc::new(RemoteClient::from_config(&config).context("invalid service endpoint")?);
        debug!(endpoint = client.endpoint(), command = self.command.name(), "client ready");

        self.command.run(client, &config).await
    }
}

impl Command {
    async fn run(self, client: Arc<dyn ReconstructionClient>, config: &ReconConfig) -> Result<()> {
        match self {
            Command::Run(args) => run_command(client, config, args).await,
            Command::Status(arg) => status_command(client, arg).await,
            Command::Resume(args) => resume_command(client, config, args).await,
            Command::Model(arg) => model_command(client, config, arg).await,
            Command::Download(args) => download_command(client, config, args).await,
            Command::Delete(arg) => delete_command(client, arg).await,
            Command::Health => health_command(client).await,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Command::Run(_) => "run",
            Command::Status(_) => "status",
            Command::Resume(_) => "resume",
            Command::Model(_) => "model",
            Command::Download(_) => "download",
            Command::Delete(_) => "delete",
            Command::Health => "health",
        }
    }
}

fn console_level(verbose: u8) -> Option<&'static str> {
    match verbose {
        0 => None,
        1 => Some("info"),
        2 => Some("debug"),
        _ => Some("trace"),
    }
}

async fn run_command(client: Arc<dyn ReconstructionClient>, config: &ReconConfig, args: RunArgs) -> Result<()> {
    let context = SessionContext::new(client, config);
    let _subscription = context.machine().subscribe(TerminalRenderer::default().into_listener());

    let files = collect_inputs(&args.images).await?;
    let report = context.uploads().stage(files);
    if let Some(warning) = &report.warning {
        eprintln!("warning: {warning}");
    }
    info!(staged = report.staged.len(), bytes = context.uploads().total_bytes(), "images staged");

    let session_id = context.upload().await?;
    let status = context.machine().start(session_id.clone(), args.quality, args.method).await?;

    if args.no_wait && !status.is_terminal() {
        println!("{session_id}");
        return Ok(());
    }

    follow_to_completion(&context, args.output.as_deref()).await
}

async fn status_command(client: Arc<dyn ReconstructionClient>, arg: SessionArg) -> Result<()> {
    let status = client.get_status(&SessionId::from(arg.session_id)).await?;
    render::print_status(&status);
    Ok(())
}

async fn resume_command(client: Arc<dyn ReconstructionClient>, config: &ReconConfig, args: ResumeArgs) -> Result<()> {
    let context = SessionContext::new(client, config);
    let _subscription = context.machine().subscribe(TerminalRenderer::default().into_listener());

    let session_id = SessionId::from(args.session_id);
    match context.machine().resume(session_id.clone()).await? {
        SessionStatus::Uploaded => bail!("session {session_id} was uploaded but never started"),
        _ => follow_to_completion(&context, args.output.as_deref()).await,
    }
}

async fn model_command(client: Arc<dyn ReconstructionClient>, config: &ReconConfig, arg: SessionArg) -> Result<()> {
    let context = attach_completed(client, config, arg.session_id).await?;
    let handoff = context.machine().render_handoff().await?;
    render::print_handoff(&handoff);
    Ok(())
}

async fn download_command(
    client: Arc<dyn ReconstructionClient>,
    config: &ReconConfig,
    args: DownloadArgs,
) -> Result<()> {
    let context = attach_completed(client, config, args.session_id).await?;
    let path = normalized_path_from_user_string(&args.output);

    let written = match &args.file {
        Some(name) => {
            let mut file = create_output(&path).await?;
            let n = context.machine().download_file(name, &mut file).await?;
            file.flush().await?;
            n
        },
        None => download_bundle(&context, &path).await?,
    };

    println!("wrote {written} bytes to {}", path.display());
    Ok(())
}

async fn delete_command(client: Arc<dyn ReconstructionClient>, arg: SessionArg) -> Result<()> {
    let session_id = SessionId::from(arg.session_id);
    client
        .delete_session(&session_id)
        .await
        .with_context(|| format!("failed to delete session {session_id}"))?;
    println!("deleted {session_id}");
    Ok(())
}

async fn health_command(client: Arc<dyn ReconstructionClient>) -> Result<()> {
    let health = client
        .health_check()
        .await
        .with_context(|| format!("service at {} is unreachable", client.endpoint()))?;
    if !health.is_ok() {
        bail!("service at {} reports status {}", client.endpoint(), health.status);
    }
    println!("{} is up", client.endpoint());
    Ok(())
}

/// Waits for a terminal status, then prints the results and the render handoff.
async fn follow_to_completion(context: &SessionContext, output: Option<&str>) -> Result<()> {
    let session = context.machine().wait_for_terminal().await?;
    render::print_session(&context.machine().snapshot());

    let handoff = context.machine().render_handoff().await?;
    render::print_handoff(&handoff);

    if let Some(output) = output {
        let path = normalized_path_from_user_string(output);
        let written = download_bundle(context, &path).await?;
        println!("wrote {written} bytes to {}", path.display());
    }

    debug!(session_id = ?session.session_id, "session finished");
    Ok(())
}

async fn attach_completed(
    client: Arc<dyn ReconstructionClient>,
    config: &ReconConfig,
    session_id: String,
) -> Result<SessionContext> {
    let context = SessionContext::new(client, config);
    let session_id = SessionId::from(session_id);

    let status = context.machine().resume(session_id.clone()).await?;
    context.machine().stop_polling();
    if status != SessionStatus::Completed {
        bail!("session {session_id} is {status}, results are not available");
    }
    Ok(context)
}

async fn download_bundle(context: &SessionContext, path: &Path) -> Result<u64> {
    let mut file = create_output(path).await?;
    let written = context.machine().download_bundle(&mut file).await?;
    file.flush().await?;
    Ok(written)
}

async fn create_output(path: &Path) -> Result<tokio::fs::File> {
    tokio::fs::File::create(path)
        .await
        .with_context(|| format!("cannot create {}", path.display()))
}

/// Expands directories (one level, sorted by name) and reads every file.  Non-image files
/// are read too; staging reports them.
async fn collect_inputs(args: &[String]) -> Result<Vec<InputFile>> {
    let mut paths = Vec::new();
    for arg in args {
        let path = normalized_path_from_user_string(arg);
        if path.is_dir() {
            paths.extend(image_files_in_dir(&path).await?);
        } else {
            paths.push(path);
        }
    }

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let file = InputFile::from_path(&path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?;
        files.push(file);
    }
    Ok(files)
}

async fn image_files_in_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("cannot list {}", dir.display()))?;

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.is_file() && content_type_for_path(&path).starts_with("image/") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_arguments() {
        let app = ReconApp::parse_from([
            "recon",
            "--endpoint",
            "http://recon.local:5000",
            "-vv",
            "run",
            "a.jpg",
            "b.jpg",
            "--quality",
            "high",
            "--method",
            "neural",
        ]);

        assert_eq!(app.overrides.endpoint.as_deref(), Some("http://recon.local:5000"));
        assert_eq!(console_level(app.overrides.verbose), Some("debug"));
        let Command::Run(args) = app.command else {
            panic!("expected the run command");
        };
        assert_eq!(args.images, vec!["a.jpg", "b.jpg"]);
        assert_eq!(args.quality, Quality::High);
        assert_eq!(args.method, Method::Neural);
        assert!(!args.no_wait);
    }

    #[tokio::test]
    async fn test_health_command() {
        let app = ReconApp::parse_from(["recon", "health"]);
        assert!(matches!(app.command, Command::Health));

        let client = recon_client::testing_utils::MockReconstructionClient::default().into_arc();
        health_command(client.clone()).await.unwrap();
        assert_eq!(client.calls(), vec![recon_client::testing_utils::MockCall::Health]);
    }

    #[test]
    fn test_rejects_unknown_quality() {
        assert!(ReconApp::try_parse_from(["recon", "run", "a.jpg", "--quality", "ultra"]).is_err());
    }

    #[tokio::test]
    async fn test_collect_inputs_expands_directories() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.jpg", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"data").unwrap();
        }
        let extra = dir.path().join("notes.txt");

        let files = collect_inputs(&[
            dir.path().to_str().unwrap().to_owned(),
            extra.to_str().unwrap().to_owned(),
        ])
        .await
        .unwrap();

        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.jpg", "b.png", "notes.txt"]);
        assert!(!files[2].is_image());
    }
}
