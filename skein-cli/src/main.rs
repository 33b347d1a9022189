//! `skein` CLI binary: run a declarative YAML workflow, serve one over
//! HTTP+SSE, and inspect/resume its checkpoints.
//!
//! Subcommands: `run` (default), `serve`, `checkpoint list|resume`.

mod backend;
mod log_format;
mod logging;
mod registry;

use std::path::PathBuf;
use std::sync::Arc;

use backend::{BackendError, LocalBackend, RemoteBackend, RunBackend};
use clap::{Parser, Subcommand};
use skein::Event;

#[derive(Parser, Debug)]
#[command(name = "skein")]
#[command(about = "skein — run and serve declarative workflows")]
struct Args {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a workflow to completion (or until it suspends on request-info).
    Run(RunArgs),
    /// Serve a workflow over HTTP+SSE.
    Serve(ServeArgs),
    /// List or resume saved checkpoints.
    Checkpoint(CheckpointArgs),
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Path to the workflow YAML file.
    workflow: PathBuf,

    /// Input payload, as JSON. Defaults to a JSON string built from --message.
    #[arg(long, value_name = "JSON")]
    input: Option<String>,

    /// Input payload as a plain string (sugar for `--input '"..."'`).
    #[arg(short, long, value_name = "TEXT")]
    message: Option<String>,

    /// Run against a remote `skein serve` instance instead of in-process.
    #[arg(long)]
    remote: Option<String>,

    /// Do not auto-start a server when `--remote` is unreachable.
    #[arg(long)]
    no_auto_start: bool,

    /// Print each event as it arrives (default: only the final outputs).
    #[arg(short, long)]
    verbose: bool,

    /// Output the final result as JSON instead of plain text.
    #[arg(long)]
    json: bool,

    /// With --json, write output to this file instead of stdout.
    #[arg(long, value_name = "PATH")]
    file: Option<PathBuf>,

    /// With --json, pretty-print (multi-line).
    #[arg(long)]
    pretty: bool,
}

#[derive(clap::Args, Debug)]
struct ServeArgs {
    /// Path to the workflow YAML file.
    workflow: PathBuf,

    /// Listen address (default 127.0.0.1:8080).
    #[arg(long, value_name = "ADDR")]
    addr: Option<String>,
}

#[derive(clap::Args, Debug)]
struct CheckpointArgs {
    #[command(subcommand)]
    sub: CheckpointCommand,
}

#[derive(Subcommand, Debug)]
enum CheckpointCommand {
    /// List checkpoints saved for a workflow.
    List {
        workflow: PathBuf,
        #[arg(long)]
        remote: Option<String>,
    },
    /// Resume a run from a saved checkpoint.
    Resume {
        workflow: PathBuf,
        checkpoint_id: String,
        #[arg(long)]
        remote: Option<String>,
        #[arg(short, long)]
        verbose: bool,
        #[arg(long)]
        json: bool,
    },
}

fn resolve_auto_start() -> bool {
    !matches!(std::env::var("SKEIN_NO_AUTO_START").as_deref(), Ok("1") | Ok("true") | Ok("yes"))
}

fn make_backend(remote: Option<&str>) -> Arc<dyn RunBackend> {
    match remote {
        Some(url) => Arc::new(RemoteBackend::new(url.to_string())),
        None => Arc::new(LocalBackend::new()),
    }
}

/// Preview length for the --verbose event log; full payloads still go out
/// in --json output untruncated.
const MAX_PREVIEW_LEN: usize = 200;

/// Truncates a display string to at most `max` chars, appending `...` when
/// truncated (total length = max).
fn truncate_message(s: &str, max: usize) -> String {
    const SUFFIX_LEN: usize = 3;
    if max <= SUFFIX_LEN {
        return s.chars().take(max).collect();
    }
    if s.chars().count() <= max {
        return s.to_string();
    }
    format!("{}...", s.chars().take(max - SUFFIX_LEN).collect::<String>())
}

fn print_event(event: &Event) {
    match event {
        Event::ExecutorInvoked { executor_id, message_type } => {
            eprintln!("→ {executor_id} ({message_type})");
        }
        Event::ExecutorCompleted { executor_id, .. } => eprintln!("✓ {executor_id}"),
        Event::ExecutorFailed { executor_id, message, .. } => {
            eprintln!("✗ {executor_id}: {}", truncate_message(message, MAX_PREVIEW_LEN));
        }
        Event::AgentRunUpdate { chunk, .. } => eprint!("{chunk}"),
        Event::RequestInfo { request_id, prompt, .. } => {
            eprintln!("? [{request_id}] {}", truncate_message(prompt, MAX_PREVIEW_LEN));
        }
        Event::CheckpointCreated { checkpoint_id, step } => eprintln!("checkpoint {checkpoint_id} @ step {step}"),
        Event::WorkflowOutput { .. } | Event::WorkflowStatus { .. } => {}
    }
}

fn write_json_output(value: &serde_json::Value, file: Option<&std::path::Path>, pretty: bool) -> Result<(), Box<dyn std::error::Error>> {
    let s = if pretty { serde_json::to_string_pretty(value)? } else { serde_json::to_string(value)? };
    match file {
        Some(path) => std::fs::write(path, format!("{s}\n"))?,
        None => {
            println!("{s}");
            std::io::Write::flush(&mut std::io::stdout())?;
        }
    }
    Ok(())
}

async fn run_command(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let input: serde_json::Value = match (args.input, args.message) {
        (Some(raw), _) => serde_json::from_str(&raw)?,
        (None, Some(text)) => serde_json::Value::String(text),
        (None, None) => {
            eprintln!("skein: provide --input <json> or --message <text>");
            std::process::exit(1);
        }
    };

    if let Some(url) = &args.remote {
        if !args.no_auto_start && resolve_auto_start() {
            let addr = url.trim_start_matches("http://").trim_start_matches("https://").to_string();
            if let Err(e) = backend::auto_start::ensure_server_or_spawn(url, &addr, &args.workflow).await {
                eprintln!("skein: {e}");
                std::process::exit(1);
            }
        }
    }

    let backend = make_backend(args.remote.as_deref());
    let mut events = Vec::new();
    let mut sink = |event: &Event| {
        if args.verbose {
            print_event(event);
        }
        if args.json {
            events.push(serde_json::to_value(event).unwrap_or_default());
        }
    };
    let outcome = backend.run(&args.workflow, input, &mut sink).await?;

    if args.json {
        let out = serde_json::json!({ "events": events, "outputs": outcome.outputs, "final_state": outcome.final_state });
        write_json_output(&out, args.file.as_deref(), args.pretty)?;
    } else {
        for output in &outcome.outputs {
            match output {
                serde_json::Value::String(s) => println!("{s}"),
                other => println!("{other}"),
            }
        }
    }
    Ok(())
}

async fn serve_command(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let loader = skein::Loader::new(registry::default_agents(), registry::default_functions(), registry::default_selectors());
    let loaded = loader.load_file(&args.workflow)?;
    let storage = Arc::new(skein::FileCheckpointStorage::new(backend::LocalBackend::checkpoint_dir(&args.workflow)));
    let workflow = Arc::new(loaded.builder.checkpoint_storage(storage).build()?);

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    skein_serve::run_serve(args.addr.as_deref(), workflow, shutdown).await?;
    Ok(())
}

async fn checkpoint_command(args: CheckpointArgs) -> Result<(), Box<dyn std::error::Error>> {
    match args.sub {
        CheckpointCommand::List { workflow, remote } => {
            let backend = make_backend(remote.as_deref());
            let summaries = backend.list_checkpoints(&workflow).await?;
            for s in summaries {
                println!("{}\tstep={}\t{}", s.checkpoint_id, s.step, s.timestamp);
            }
        }
        CheckpointCommand::Resume { workflow, checkpoint_id, remote, verbose, json } => {
            let backend = make_backend(remote.as_deref());
            let mut events = Vec::new();
            let mut sink = |event: &Event| {
                if verbose {
                    print_event(event);
                }
                if json {
                    events.push(serde_json::to_value(event).unwrap_or_default());
                }
            };
            let outcome = backend.resume(&workflow, &checkpoint_id, &mut sink).await?;
            if json {
                let out = serde_json::json!({ "events": events, "outputs": outcome.outputs, "final_state": outcome.final_state });
                write_json_output(&out, None, true)?;
            } else {
                for output in &outcome.outputs {
                    println!("{output}");
                }
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    skein_config::load_and_apply("skein", None::<&std::path::Path>).ok();
    logging::init()?;

    let args = Args::parse();
    let result = match args.cmd {
        Command::Run(a) => run_command(a).await,
        Command::Serve(a) => serve_command(a).await,
        Command::Checkpoint(a) => checkpoint_command(a).await,
    };

    if let Err(e) = result {
        if let Some(be) = e.downcast_ref::<BackendError>() {
            eprintln!("skein: {be}");
        } else {
            eprintln!("skein: {e}");
        }
        std::process::exit(1);
    }
    Ok(())
}
