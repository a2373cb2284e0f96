//! Application entry point — storytap console reader.
//!
//! A minimal frontend for the playback engine: hotspot taps and mode
//! switches are typed as commands on stdin, engine events are printed as
//! they arrive.  A real reader UI replaces this loop with hit-testing on
//! the rendered PDF page.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`ReaderConfig`] from disk (returns default on first run).
//! 3. Resolve the book directory (first CLI argument, else the
//!    configured library).
//! 4. Load and validate the bundle via [`DirBookSource`].
//! 5. Open the cpal output; fall back to [`SilentBackend`] when no
//!    device is available so the engine still runs.
//! 6. Spawn the playback engine and the event printer.
//! 7. Read commands from stdin until `quit`.

use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use storytap::{
    audio::{AudioBackend, CpalBackend, SilentBackend},
    book::{BookSource, DirBookSource},
    config::ReaderConfig,
    engine::{EngineCommand, PlaybackEngine},
};

const USAGE: &str = "\
commands:
  tap <hotspot-id>   tap a hotspot
  seq | normal       enter / leave sequential mode
  repeat | exit      enter / leave repeat mode
  pause | resume     pause / resume the repeat loop
  status             print the current session state
  quit               stop playback and exit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ReaderConfig::load().unwrap_or_else(|e| {
        log::warn!("failed to load settings ({e}); using defaults");
        ReaderConfig::default()
    });

    let book_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| config.books_dir());
    log::info!("opening book bundle at {}", book_dir.display());

    let loaded = DirBookSource::new(&book_dir).load().await?;
    for failure in &loaded.failures {
        log::warn!(
            "narration file {} is unusable: {}",
            failure.file,
            failure.reason
        );
    }
    let book = loaded.book;

    let backend: Box<dyn AudioBackend> =
        match CpalBackend::new(config.audio.device.as_deref(), config.audio.volume) {
            Ok(backend) => Box::new(backend),
            Err(e) => {
                log::warn!("audio output unavailable ({e}); continuing without sound");
                Box::new(SilentBackend)
            }
        };

    let (events_tx, mut events_rx) = mpsc::channel(64);
    let (engine, handle) =
        PlaybackEngine::new(&book, backend.as_ref(), loaded.assets, &config, events_tx);
    let engine_task = tokio::spawn(engine.run());
    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            println!("  << {event:?}");
        }
    });

    println!("loaded '{}' ({} hotspots)", book.title, book.hotspots.len());
    println!("{USAGE}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let mut words = line.split_whitespace();
        match (words.next(), words.next()) {
            (Some("tap"), Some(id)) => match book.hotspot(id) {
                Some(hotspot) => {
                    handle
                        .send(EngineCommand::HotspotTapped(hotspot.clone()))
                        .await;
                }
                None => println!("no hotspot named {id}"),
            },
            (Some("seq"), _) => {
                handle.send(EngineCommand::EnterSequentialMode).await;
            }
            (Some("normal"), _) => {
                handle.send(EngineCommand::ExitSequentialMode).await;
            }
            (Some("repeat"), _) => {
                handle.send(EngineCommand::EnterRepeatMode).await;
            }
            (Some("exit"), _) => {
                handle.send(EngineCommand::ExitRepeatMode).await;
            }
            (Some("pause"), _) => {
                handle.send(EngineCommand::PauseRepeat).await;
            }
            (Some("resume"), _) => {
                handle.send(EngineCommand::ResumeRepeat).await;
            }
            (Some("status"), _) => {
                let snap = handle.snapshot();
                println!(
                    "  mode={} playing={:?} queued={} range={:?}..{:?} paused={}",
                    snap.mode.label(),
                    snap.current_hotspot,
                    snap.queue_pending,
                    snap.repeat_start,
                    snap.repeat_end,
                    snap.repeat_paused
                );
            }
            (Some("quit"), _) => {
                handle.send(EngineCommand::Shutdown).await;
                break;
            }
            (None, _) => {}
            _ => println!("{USAGE}"),
        }
    }

    let _ = engine_task.await;
    Ok(())
}
