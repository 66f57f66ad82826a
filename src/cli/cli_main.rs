// Main CLI entrypoint
// (c) 2024 sendplz contributors

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anstream::{eprintln, println};
use clap::{CommandFactory as _, Parser as _};
use indicatif::{MultiProgress, ProgressDrawTarget};
use tracing::{error, warn};

use super::args::{CliArgs, Command, ReceiveArgs, SendArgs};
use super::styles::ERROR;
use crate::clipboard::{Clipboard as _, SystemClipboard};
use crate::config::{Configuration, Manager};
use crate::listener::Listener;
use crate::protocol::{Endpoint, Scheme};
use crate::sender::{send_clipboard, send_file, LocalFile, MAX_UPDATE_FPS};
use crate::session::{ConsoleHandler, ReceiverSettings};
use crate::util::setup_tracing;

/// Main CLI entrypoint
pub fn cli() -> anyhow::Result<ExitCode> {
    let args = CliArgs::parse();
    if args.config_files {
        for file in Manager::config_files() {
            println!("{file}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let mut manager = Manager::new();
    if let Some(path) = &args.config {
        manager.merge_toml_file(path);
    }
    manager.merge_provider(args.overrides.clone());

    if args.show_config {
        println!("{manager}");
        return Ok(ExitCode::SUCCESS);
    }

    match &args.command {
        Some(Command::Send(send)) => run_sender(&args, send, &manager),
        Some(Command::Receive(receive)) => run_receiver(&args, receive, &manager),
        None => CliArgs::command()
            .error(
                clap::error::ErrorKind::MissingSubcommand,
                "a command is required",
            )
            .exit(),
    }
}

/// Extracts the configuration once tracing is up, reporting any problems with it
fn configuration(manager: &Manager) -> anyhow::Result<Configuration> {
    for (field, source) in manager.unknown_fields() {
        warn!("unrecognised configuration field `{field}` in {source}");
    }
    manager
        .configuration()
        .inspect_err(|e| error!("invalid configuration: {e:#}"))
}

fn exit_code(result: anyhow::Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(feature = "tls")]
fn install_tls_provider() {
    // Fails only if a provider is already installed, which is fine
    let _ = rustls::crypto::ring::default_provider().install_default();
}

#[cfg(not(feature = "tls"))]
fn install_tls_provider() {}

#[tokio::main(flavor = "current_thread")]
async fn run_sender(
    args: &CliArgs,
    send: &SendArgs,
    manager: &Manager,
) -> anyhow::Result<ExitCode> {
    let progress =
        MultiProgress::with_draw_target(ProgressDrawTarget::stderr_with_hz(MAX_UPDATE_FPS));
    setup_tracing(args.trace_level(), Some(&progress), args.log_file.as_deref())
        .inspect_err(|e| eprintln!("{ERROR}Error:{ERROR:#} {e:?}"))?;
    let Ok(config) = configuration(manager) else {
        return Ok(ExitCode::FAILURE);
    };
    install_tls_provider();

    let result = async {
        let scheme = if send.secure { Scheme::Wss } else { Scheme::Ws };
        let endpoint = Endpoint::new(scheme, &send.ip, send.port)?;
        let display = (!args.quiet).then_some(&progress);
        match &send.file {
            Some(path) => {
                let _ = send_file(&endpoint, LocalFile::new(path, *config.chunk_size), display)
                    .await?;
                Ok::<_, anyhow::Error>(())
            }
            None => send_local_clipboard(&endpoint).await,
        }
    }
    .await;
    Ok(exit_code(result))
}

async fn send_local_clipboard(endpoint: &Endpoint) -> anyhow::Result<()> {
    let text = tokio::task::spawn_blocking(|| SystemClipboard::default().read()).await??;
    send_clipboard(endpoint, &text).await
}

#[tokio::main]
async fn run_receiver(
    args: &CliArgs,
    receive: &ReceiveArgs,
    manager: &Manager,
) -> anyhow::Result<ExitCode> {
    setup_tracing(args.trace_level(), None, args.log_file.as_deref())
        .inspect_err(|e| eprintln!("{ERROR}Error:{ERROR:#} {e:?}"))?;
    let Ok(config) = configuration(manager) else {
        return Ok(ExitCode::FAILURE);
    };
    let directory = Path::new(&config.directory);
    if !directory.is_dir() {
        error!("destination {} is not a directory", directory.display());
        return Ok(ExitCode::FAILURE);
    }
    let settings = Arc::new(ReceiverSettings::new(
        directory,
        &config.allow,
        Arc::new(SystemClipboard::default()),
    ));

    let result = async {
        let listener = Listener::bind((receive.network.as_str(), receive.port))
            .await?
            .with_idle_timeout(config.idle_timeout());
        listener
            .run(move || ConsoleHandler::new(settings.clone()))
            .await
    }
    .await;
    Ok(exit_code(result))
}
