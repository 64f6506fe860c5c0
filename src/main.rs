//! taskboard - live build-status dashboard client
//!
//! Connects to a build daemon's status stream and maintains the incremental
//! status tree, emitting NDJSON snapshots on stdout after each coalesced
//! refresh.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::{mpsc, watch};

use taskboard_core::prelude::*;
use taskboard_core::WorkspaceResolver;
use taskboard_stream::{Dashboard, StreamReader};

mod config;
mod headless;
mod signals;

use headless::HeadlessEvent;

/// Live build-status dashboard client
#[derive(Parser, Debug)]
#[command(name = "taskboard")]
#[command(about = "Live build-status dashboard client", long_about = None)]
struct Args {
    /// Project root, used to resolve diagnostic filenames (defaults to the
    /// current directory)
    #[arg(value_name = "PATH")]
    project: Option<PathBuf>,

    /// Daemon host (overrides config file)
    #[arg(long)]
    host: Option<String>,

    /// Daemon port (overrides config file)
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    taskboard_core::logging::init()?;

    let project = args
        .project
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    let settings = config::load_settings(&project);
    let reader_config = settings.reader_config(args.host, args.port);
    info!(
        "watching {} via {}:{}",
        project.display(),
        reader_config.host,
        reader_config.port
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    signals::spawn_signal_handler(shutdown_tx);

    // The view side only needs to know that something changed; capacity 1
    // coalesces change storms the same way the reader's dispatch does.
    let (refresh_tx, refresh_rx) = mpsc::channel::<()>(1);
    let dashboard = Arc::new(Dashboard::new(
        Arc::new(WorkspaceResolver::new(&project)),
        None,
        Arc::new(move || {
            let _ = refresh_tx.try_send(());
        }),
    ));

    let emitter = tokio::spawn(emit_snapshots(
        Arc::clone(&dashboard),
        refresh_rx,
        shutdown_rx.clone(),
    ));

    let reader = StreamReader::new(reader_config, Arc::clone(&dashboard), shutdown_rx);
    let result = reader.run().await;

    if let Err(ref e) = result {
        HeadlessEvent::error(e.to_string(), true).emit();
    }

    let _ = emitter.await;
    info!("taskboard exiting");
    result
}

/// Emit one snapshot per change notification until shutdown
async fn emit_snapshots(
    dashboard: Arc<Dashboard>,
    mut refresh_rx: mpsc::Receiver<()>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = refresh_rx.recv() => {
                if changed.is_none() {
                    break;
                }
                dashboard
                    .with_tree(|tree, root| HeadlessEvent::snapshot(tree, root))
                    .emit();
            }
            _ = shutdown.changed() => break,
        }
    }
    debug!("snapshot emitter finished");
}
