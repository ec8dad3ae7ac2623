use clap::Parser;
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use regex::Regex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use pollwatch::{
    cli::{Cli, OutputFormat},
    ChannelListener, DirectoryMonitor, FileEvent, FileEventKind, MonitorEvent, StatusEvent,
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(err) = cli.validate() {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }

    cli.setup_logging();

    let watch_path = cli.get_watch_path();
    tracing::info!("Starting pollwatch on: {}", watch_path.display());

    let config = cli.build_config().context("Failed to load configuration")?;
    let ignore = cli.get_ignore_patterns().context("Failed to compile ignore patterns")?;

    let monitor = DirectoryMonitor::with_config(&watch_path, &config);
    let (tx, rx) = mpsc::channel::<MonitorEvent>();
    monitor
        .add_listener(Arc::new(ChannelListener::new(tx)))
        .context("Failed to register listener")?;
    monitor.start().context("Failed to start monitor")?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    if matches!(cli.output, OutputFormat::Text) {
        println!("Monitoring: {}", watch_path.display());
        println!("Press Ctrl+C to quit");
        println!("---");
    }

    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(MonitorEvent::Activity(event)) => {
                if should_include_file(&event, &cli, &ignore) {
                    print_event(&event, &cli)?;
                }
            }
            Ok(MonitorEvent::Status(status)) => {
                if cli.status {
                    print_status(&status, &cli)?;
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    monitor.destroy().context("Failed to shut down monitor")?;
    Ok(())
}

fn should_include_file(event: &FileEvent, cli: &Cli, ignore: &[Regex]) -> bool {
    let path = event.path.to_string_lossy();
    cli.should_watch_extension(&event.path) && !ignore.iter().any(|pattern| pattern.is_match(&path))
}

fn print_event(event: &FileEvent, cli: &Cli) -> Result<()> {
    match cli.output {
        OutputFormat::Json => println!("{}", serde_json::to_string(event)?),
        OutputFormat::Text => print_text_event(event, cli),
        OutputFormat::Compact => print_compact_event(event),
    }
    Ok(())
}

fn print_status(status: &StatusEvent, cli: &Cli) -> Result<()> {
    match cli.output {
        OutputFormat::Json => println!("{}", serde_json::to_string(status)?),
        OutputFormat::Text | OutputFormat::Compact => {
            println!("[{}] -- {:?}: {}", time_str(status.timestamp), status.kind, status.message);
        }
    }
    Ok(())
}

fn time_str(timestamp: std::time::SystemTime) -> String {
    DateTime::<Local>::from(timestamp).format("%H:%M:%S").to_string()
}

fn print_text_event(event: &FileEvent, cli: &Cli) {
    let size = event
        .size
        .map(|size| format!(" ({} bytes)", size))
        .unwrap_or_default();

    if cli.no_color {
        println!("[{}] {} {}{}", time_str(event.timestamp), event.kind.label(), event.path.display(), size);
    } else {
        let color = match event.kind {
            FileEventKind::Created => "\x1b[32m",         // Green
            FileEventKind::Modified => "\x1b[33m",        // Yellow
            FileEventKind::Deleted => "\x1b[31m",         // Red
            FileEventKind::FinishedWriting => "\x1b[34m", // Blue
        };
        println!(
            "[{}] {}{}\x1b[0m {}{}",
            time_str(event.timestamp),
            color,
            event.kind.label(),
            event.path.display(),
            size
        );
    }
}

fn print_compact_event(event: &FileEvent) {
    let event_type = match event.kind {
        FileEventKind::Created => "C",
        FileEventKind::Modified => "M",
        FileEventKind::Deleted => "D",
        FileEventKind::FinishedWriting => "F",
    };

    println!("{} {}", event_type, event.path.display());
}
