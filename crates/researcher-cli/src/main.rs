use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use researcher_core::{
    AgentEntrypoint, Document, EngineChoice, FailurePolicy, HostingPort, ProgressUpdate,
    ResearchRequest, ResearchResult, ResearcherError, RunLogSettings, Settings, SettingsProfile,
    SettingsSource, TelemetryOptions, init_telemetry,
};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;
use tracing::{info, warn};
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(
    name = "researcher",
    version,
    about = "Run the research agent from the terminal"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Research a query and stream the report to stdout.
    Run(RunArgs),
    /// Print the engine environment a request would resolve to.
    Resolve(ResolveArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Query to research.
    #[arg(long)]
    query: String,

    /// File or directory whose text files are attached as documents.
    #[arg(long)]
    docs: Option<PathBuf>,

    /// Recurse into subdirectories of `--docs`.
    #[arg(long, default_value_t = false)]
    recursive: bool,

    /// Settings profile providing defaults and environment keys.
    #[arg(long, default_value = "granite")]
    profile: SettingsProfile,

    #[arg(long)]
    report_type: Option<String>,

    #[arg(long)]
    tone: Option<String>,

    /// web, local or hybrid; derived from documents when omitted.
    #[arg(long)]
    report_source: Option<String>,
}

#[derive(Args, Debug)]
struct ResolveArgs {
    #[arg(long, default_value = "granite")]
    profile: SettingsProfile,

    /// Resolve as if documents were attached.
    #[arg(long, default_value_t = false)]
    with_docs: bool,

    #[arg(long)]
    report_type: Option<String>,

    #[arg(long)]
    tone: Option<String>,

    #[arg(long)]
    report_source: Option<String>,
}

fn main() -> Result<()> {
    init_telemetry(TelemetryOptions::default())?;

    let cli = Cli::parse();

    let rt = Runtime::new()?;
    rt.block_on(async move {
        match cli.command {
            Command::Run(args) => run_command(args).await?,
            Command::Resolve(args) => resolve_command(args)?,
        }
        Ok::<(), anyhow::Error>(())
    })?;

    Ok(())
}

async fn run_command(args: RunArgs) -> Result<()> {
    let documents = match &args.docs {
        Some(path) => {
            let docs = collect_documents(path, args.recursive)?;
            if docs.is_empty() {
                warn!(path = %path.display(), "no readable documents found");
            }
            Some(docs).filter(|docs| !docs.is_empty())
        }
        None => None,
    };

    let request = ResearchRequest::new(args.query)
        .with_documents(documents)
        .with_report_type(args.report_type)
        .with_tone(args.tone)
        .with_report_source(args.report_source);

    let engine = EngineChoice::from_env();
    if engine == EngineChoice::Scripted {
        warn!("RESEARCHER_ENGINE_PROGRAM not set; using the built-in scripted engine");
    }
    let entry = AgentEntrypoint::new(
        "cli",
        SettingsSource::Fixed(Settings::from_env(args.profile)),
        engine.into_factory(),
        FailurePolicy::Propagate,
    )
    .with_run_log(RunLogSettings::from_env());

    info!(profile = %args.profile, query = %request.query, "starting research run");
    let port = TerminalPort::new(std::io::stdout(), std::io::stderr());
    entry.handle(request, port).await?;
    Ok(())
}

fn resolve_command(args: ResolveArgs) -> Result<()> {
    let documents = args
        .with_docs
        .then(|| vec![Document::new("placeholder").with_source("cli")]);
    let request = ResearchRequest::new("")
        .with_documents(documents)
        .with_report_type(args.report_type)
        .with_tone(args.tone)
        .with_report_source(args.report_source);

    let settings = Settings::from_env(args.profile);
    let config = researcher_core::ConfigResolver::resolve(&settings, &request)?;
    for (key, value) in config.redacted_env_vars() {
        println!("{key}={value}");
    }
    Ok(())
}

/// Hosting port for the terminal: report chunks to `out`, log lines to `err`.
struct TerminalPort<O, E> {
    out: O,
    err: E,
}

impl<O: Write + Send, E: Write + Send> TerminalPort<O, E> {
    fn new(out: O, err: E) -> Self {
        Self { out, err }
    }
}

fn closed(err: std::io::Error) -> ResearcherError {
    ResearcherError::HostDisconnected(format!("terminal write failed: {err}"))
}

#[async_trait]
impl<O: Write + Send, E: Write + Send> HostingPort for TerminalPort<O, E> {
    async fn emit_progress(&mut self, update: ProgressUpdate) -> Result<(), ResearcherError> {
        match update {
            ProgressUpdate::Log(record) => writeln!(self.err, "{}", record.message).map_err(closed),
            ProgressUpdate::ReportChunk { text } => {
                self.out.write_all(text.as_bytes()).map_err(closed)?;
                self.out.flush().map_err(closed)
            }
        }
    }

    async fn emit_final(&mut self, result: &ResearchResult) -> Result<(), ResearcherError> {
        if !result.text.ends_with('\n') {
            writeln!(self.out).map_err(closed)?;
        }
        self.out.flush().map_err(closed)
    }

    async fn emit_error(&mut self, error: &ResearcherError) -> Result<(), ResearcherError> {
        writeln!(self.err, "error: {error}").map_err(closed)
    }
}

fn collect_documents(path: &Path, recursive: bool) -> Result<Vec<Document>> {
    let mut docs = Vec::new();
    let entries: Box<dyn Iterator<Item = PathBuf>> = if path.is_file() {
        Box::new(std::iter::once(path.to_path_buf()))
    } else {
        let walker = WalkDir::new(path)
            .min_depth(0)
            .max_depth(if recursive { usize::MAX } else { 1 });
        Box::new(
            walker
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file())
                .map(|entry| entry.into_path()),
        )
    };

    for file in entries {
        let text = match fs::read_to_string(&file) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::InvalidData => {
                warn!(file = %file.display(), "skipping non-UTF-8 file");
                continue;
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", file.display()));
            }
        };
        if text.trim().is_empty() {
            continue;
        }
        docs.push(Document::new(text).with_source(file.display().to_string()));
    }

    info!(count = docs.len(), path = %path.display(), "collected local documents");
    Ok(docs)
}
