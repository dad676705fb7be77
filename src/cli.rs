use anyhow::{Context, Result};
use clap::Parser;
use squish::engine::{CompressionEngine, RasterTranscoder};
use squish::model::{CompressConfig, CompressEvent, FileInput, RecordId, DEFAULT_TARGET_MB};
use squish::orchestrator::{self, SessionCommand, SessionOptions};
use squish::workflow::WorkflowController;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

const HELP: &str = "\
Commands:
  open <path>        load an image (JPEG, PNG, WebP)
  target <mb>        set the target size in MB (0.1 - 5.0)
  compress           compress the loaded image
  download [id]      save the current result, or history record <id>
  history            list completed compressions, newest first
  reset              discard the current image and result
  status             show the workflow state
  help               show this help
  quit               end the session";

#[derive(Debug, Parser, Clone)]
#[command(
    name = "squish",
    version,
    about = "Shrink one image at a time, entirely on this machine"
)]
pub struct Cli {
    /// Image to compress in one shot; omit for an interactive session
    pub file: Option<PathBuf>,

    /// Target size in megabytes (clamped to 0.1 - 5.0)
    #[arg(long, default_value_t = DEFAULT_TARGET_MB)]
    pub target_mb: f64,

    /// Largest allowed width or height in pixels
    #[arg(long, default_value_t = 1920)]
    pub max_dimension: u32,

    /// Give up on a compression after this long
    #[arg(long, default_value = "60s")]
    pub timeout: humantime::Duration,

    /// Directory compressed images are saved to (default: your downloads folder)
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Compress as soon as an image is opened
    #[arg(long)]
    pub auto_compress: bool,

    /// Print the history record as JSON (one-shot mode)
    #[arg(long)]
    pub json: bool,

    /// Export the session history as JSON on exit
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long)]
    pub verbose: bool,
}

/// Build a `CompressConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> CompressConfig {
    CompressConfig {
        target_mb: args.target_mb,
        max_dimension_px: args.max_dimension,
        timeout: Duration::from(args.timeout),
        auto_compress: args.auto_compress,
    }
}

fn build_engine(cfg: &CompressConfig) -> CompressionEngine {
    CompressionEngine::new(Arc::new(RasterTranscoder::new()), cfg.timeout)
}

async fn read_input(path: &Path) -> Result<FileInput> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("read {}", path.display()))?;
    Ok(FileInput::from_path_bytes(path, bytes))
}

pub async fn run(args: Cli) -> Result<()> {
    match args.file.clone() {
        Some(file) => run_once(args, &file).await,
        None => run_interactive(args).await,
    }
}

/// Submit, compress, save and print a single image.
async fn run_once(args: Cli, file: &Path) -> Result<()> {
    let cfg = build_config(&args);
    let out_dir = args.out_dir.clone().unwrap_or_else(squish::export::default_out_dir);
    let engine = build_engine(&cfg);
    let mut controller = WorkflowController::new(&cfg);
    let (out_tx, out_handle) = spawn_output_writer();

    let input = read_input(file).await?;
    controller
        .submit(vec![input])
        .map_err(|e| anyhow::anyhow!("{}", e.user_message()))
        .with_context(|| format!("{} was not accepted", file.display()))?;

    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<CompressEvent>();
    let progress_out = out_tx.clone();
    let quiet = args.json;
    let printer = tokio::spawn(async move {
        while let Some(ev) = evt_rx.recv().await {
            if let CompressEvent::Progress { percent } = ev {
                if !quiet {
                    let _ = progress_out.send(OutputLine::Stderr(format!("Compressing… {percent}%")));
                }
            }
        }
    });

    let compressed = controller.compress(&engine, evt_tx).await;
    let _ = printer.await;
    let record = compressed.map_err(|e| anyhow::anyhow!("{}", e.user_message()))?;

    let processed = orchestrator::process_completion(
        &controller,
        &record,
        &out_dir,
        args.export_json.as_deref(),
    );
    if args.json {
        let out = serde_json::to_string_pretty(&record)?;
        let _ = out_tx.send(OutputLine::Stdout(out));
    } else {
        for line in processed.summary_lines {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }
    if let Some(p) = processed.saved_path.as_ref() {
        let _ = out_tx.send(OutputLine::Stderr(format!("Saved: {}", p.display())));
    }
    for msg in processed.messages {
        let _ = out_tx.send(OutputLine::Stderr(msg));
    }

    let summary = controller.end_session();
    debug!(?summary, "one-shot session closed");

    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}

/// Parse one line of interactive input. `Ok(None)` means nothing to send.
pub(crate) fn parse_command(line: &str) -> std::result::Result<Option<ParsedCommand>, String> {
    let mut parts = line.split_whitespace();
    let Some(verb) = parts.next() else {
        return Ok(None);
    };
    let rest: Vec<&str> = parts.collect();
    let cmd = match verb.to_ascii_lowercase().as_str() {
        "open" | "o" => {
            if rest.is_empty() {
                return Err("usage: open <path>".into());
            }
            ParsedCommand::Open(rest.iter().map(PathBuf::from).collect())
        }
        "target" | "t" => {
            let mb = rest
                .first()
                .and_then(|v| v.trim_end_matches("MB").trim_end_matches("mb").parse::<f64>().ok())
                .ok_or_else(|| "usage: target <mb>".to_string())?;
            ParsedCommand::Session(SessionCommand::SetTarget(mb))
        }
        "compress" | "c" => ParsedCommand::Session(SessionCommand::Compress),
        "download" | "d" => {
            let record = match rest.first() {
                None => None,
                Some(id) => Some(RecordId(
                    id.trim_start_matches('#')
                        .parse::<u64>()
                        .map_err(|_| format!("not a record id: {id}"))?,
                )),
            };
            ParsedCommand::Session(SessionCommand::Download(record))
        }
        "history" | "h" => ParsedCommand::Session(SessionCommand::History),
        "reset" | "r" => ParsedCommand::Session(SessionCommand::Reset),
        "status" | "s" => ParsedCommand::Session(SessionCommand::Status),
        "help" | "?" => ParsedCommand::Help,
        "quit" | "exit" | "q" => ParsedCommand::Session(SessionCommand::Quit),
        other => return Err(format!("unknown command '{other}' (try 'help')")),
    };
    Ok(Some(cmd))
}

#[derive(Debug)]
pub(crate) enum ParsedCommand {
    /// Paths still need reading before they become a submission.
    Open(Vec<PathBuf>),
    Help,
    Session(SessionCommand),
}

fn render_event(ev: CompressEvent) -> Option<OutputLine> {
    match ev {
        CompressEvent::StateChanged { state } => {
            debug!(%state, "state changed");
            None
        }
        CompressEvent::Progress { percent } => {
            Some(OutputLine::Stderr(format!("Compressing… {percent}%")))
        }
        CompressEvent::Info(info) => Some(OutputLine::Stdout(info.to_message())),
        CompressEvent::Completed { .. } => None,
        CompressEvent::Failed { message } => Some(OutputLine::Stderr(message)),
    }
}

async fn run_interactive(args: Cli) -> Result<()> {
    let cfg = build_config(&args);
    let out_dir = args.out_dir.clone().unwrap_or_else(squish::export::default_out_dir);
    let opts = SessionOptions {
        out_dir,
        auto_compress: cfg.auto_compress,
    };
    let engine = build_engine(&cfg);
    let controller = WorkflowController::new(&cfg);

    let (out_tx, out_handle) = spawn_output_writer();
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<CompressEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<SessionCommand>();

    let _ = out_tx.send(OutputLine::Stderr(
        "squish: type 'help' for commands".to_string(),
    ));

    let printer_out = out_tx.clone();
    let printer = tokio::spawn(async move {
        while let Some(ev) = evt_rx.recv().await {
            if let Some(line) = render_event(ev) {
                let _ = printer_out.send(line);
            }
        }
    });

    // Reads stdin until EOF or quit; dropping `cmd_tx` ends the session.
    let reader_out = out_tx.clone();
    let reader = tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match parse_command(&line) {
                Ok(None) => {}
                Ok(Some(ParsedCommand::Help)) => {
                    let _ = reader_out.send(OutputLine::Stdout(HELP.to_string()));
                }
                Ok(Some(ParsedCommand::Open(paths))) => {
                    let mut files = Vec::with_capacity(paths.len());
                    let mut failed = false;
                    for path in &paths {
                        match read_input(path).await {
                            Ok(f) => files.push(f),
                            Err(e) => {
                                let _ = reader_out.send(OutputLine::Stderr(format!("{e:#}")));
                                failed = true;
                            }
                        }
                    }
                    if !failed && cmd_tx.send(SessionCommand::Submit(files)).is_err() {
                        break;
                    }
                }
                Ok(Some(ParsedCommand::Session(cmd))) => {
                    let quit = matches!(cmd, SessionCommand::Quit);
                    if cmd_tx.send(cmd).is_err() || quit {
                        break;
                    }
                }
                Err(msg) => {
                    let _ = reader_out.send(OutputLine::Stderr(msg));
                }
            }
        }
    });

    let outcome = orchestrator::run_session(controller, engine, opts, evt_tx, cmd_rx).await;
    // Stdin may still be blocked on a read; the session is over either way.
    reader.abort();
    let _ = printer.await;

    if let Some(path) = args.export_json.as_deref() {
        match squish::export::export_history_json(path, &outcome.history) {
            Ok(()) => {
                let _ = out_tx.send(OutputLine::Stderr(format!(
                    "Exported JSON: {}",
                    path.display()
                )));
            }
            Err(e) => {
                let _ = out_tx.send(OutputLine::Stderr(format!("Export JSON failed: {e:#}")));
            }
        }
    }
    info!(
        records = outcome.summary.records,
        leaked = outcome.summary.references_leaked,
        "session closed"
    );

    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(line: &str) -> SessionCommand {
        match parse_command(line) {
            Ok(Some(ParsedCommand::Session(cmd))) => cmd,
            other => panic!("expected session command for {line:?}, got {other:?}"),
        }
    }

    #[test]
    fn parses_targets_and_downloads() {
        assert!(matches!(session("target 0.5"), SessionCommand::SetTarget(mb) if mb == 0.5));
        assert!(matches!(session("t 2MB"), SessionCommand::SetTarget(mb) if mb == 2.0));
        assert!(matches!(session("download"), SessionCommand::Download(None)));
        assert!(matches!(
            session("download #3"),
            SessionCommand::Download(Some(RecordId(3)))
        ));
        assert!(matches!(session("  QUIT "), SessionCommand::Quit));
    }

    #[test]
    fn open_collects_every_path() {
        match parse_command("open a.jpg b.png") {
            Ok(Some(ParsedCommand::Open(paths))) => {
                assert_eq!(paths, vec![PathBuf::from("a.jpg"), PathBuf::from("b.png")]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bad_input_is_reported() {
        assert!(parse_command("").unwrap().is_none());
        assert!(parse_command("open").is_err());
        assert!(parse_command("target lots").is_err());
        assert!(parse_command("download x").is_err());
        assert!(parse_command("frobnicate").is_err());
    }

    #[test]
    fn config_comes_from_flags() {
        let args = Cli::parse_from(["squish", "--target-mb", "0.3", "--timeout", "5s", "--auto-compress"]);
        let cfg = build_config(&args);
        assert_eq!(cfg.target_mb, 0.3);
        assert_eq!(cfg.max_dimension_px, 1920);
        assert_eq!(cfg.timeout, Duration::from_secs(5));
        assert!(cfg.auto_compress);
        assert!(args.file.is_none());
    }
}
