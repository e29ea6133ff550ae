//! ftpmirror - mirror a remote FTP directory tree into a local directory
//!
//! ```text
//! ftpmirror /site=ftp.example.com /user=bob /pwd=secret /dir="C:\mirror"
//! ```

use anyhow::{Context, Result};
use ftpmirror::cli::{self, Invocation, Settings};
use ftpmirror::logger::{Logger, NoopLogger, TextLogger};
use ftpmirror::progress::ConsoleProgress;
use ftpmirror::{EngineHandle, FtpClient, MirrorEngine, MirrorError};
use std::io::{self, BufRead, IsTerminal};
use std::process::ExitCode;
use std::sync::Arc;

/// Events buffered between the engine thread and the terminal
const EVENT_QUEUE: usize = 256;

const EXIT_FAILURE: u8 = 1;
const EXIT_CONFIGURATION: u8 = 2;
const EXIT_INTERRUPTED: u8 = 130;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = match cli::parse_from(std::env::args()) {
        Ok(Invocation::Mirror(args)) => args,
        Ok(Invocation::Help(text)) => {
            println!("{text}");
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(EXIT_CONFIGURATION);
        }
    };

    let settings = match args.resolve() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(EXIT_CONFIGURATION);
        }
    };

    match run(settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let cause = e.chain().find_map(|c| c.downcast_ref::<MirrorError>());
            match cause {
                Some(MirrorError::Cancelled) => {
                    eprintln!("\nInterrupted by user (Ctrl-C)");
                    ExitCode::from(EXIT_INTERRUPTED)
                }
                Some(MirrorError::Configuration(_)) => {
                    eprintln!("Error: {e:#}");
                    ExitCode::from(EXIT_CONFIGURATION)
                }
                _ => {
                    eprintln!("Error: {e:#}");
                    ExitCode::from(EXIT_FAILURE)
                }
            }
        }
    }
}

fn run(settings: Settings) -> Result<()> {
    // Choose logger once; NoopLogger costs nothing per event
    let logger: Arc<dyn Logger> = match &settings.log_file {
        Some(path) => Arc::new(
            TextLogger::new(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?,
        ),
        None => Arc::new(NoopLogger),
    };

    let host = settings.session.host.clone();
    let auto_close = settings.session.auto_close;
    let client = FtpClient::new(settings.ftp);
    let engine = MirrorEngine::new(client, settings.session)
        .with_pacing(settings.pacing)
        .with_logger(logger);
    let events = engine.bus().subscribe_queued(EVENT_QUEUE);
    let handle = EngineHandle::spawn(engine).context("failed to start the mirror thread")?;

    let signals = handle.signals();
    ctrlc::set_handler(move || {
        if signals.is_cancelled() {
            eprintln!("\nInterrupted by user. Exiting (Ctrl-C)...");
            std::process::exit(i32::from(EXIT_INTERRUPTED));
        }
        eprintln!("\nCancelling after the current step (Ctrl-C again to exit now)...");
        signals.cancel();
    })
    .context("Error setting Ctrl-C handler")?;

    let mut console = if io::stdout().is_terminal() {
        ConsoleProgress::new(true)
    } else {
        ConsoleProgress::hidden()
    };
    handle.start();
    for event in events.iter() {
        console.apply(&event);
    }
    console.finish_idle();

    let result = handle.join();
    if !auto_close && !matches!(result, Err(MirrorError::Cancelled)) {
        println!("Press Enter to exit");
        let mut line = String::new();
        let _ = io::stdin().lock().read_line(&mut line);
    }

    let session = result.with_context(|| format!("mirror of {host} failed"))?;
    if !io::stdout().is_terminal() {
        println!(
            "Mirrored {} files ({} bytes) from {}",
            session.files.len(),
            session.total_bytes,
            host
        );
    }
    Ok(())
}
