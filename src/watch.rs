//! Change source adapter over the platform file watcher.
//!
//! The watcher callback runs on notify's own thread and forwards a single
//! normalized "something changed" signal per relevant event; all payload
//! interpretation happens downstream in the debouncer and the rescan.
//! Creation, deletion, and rename events count; plain data writes and
//! access events do not trigger rescans. Events for the persistent cache's
//! own store file are filtered out to avoid feedback loops.

use std::path::{Path, PathBuf};

use notify::event::ModifyKind;
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::Result;

/// Starts a recursive watcher on `root`, forwarding change signals to `tx`.
///
/// The returned watcher must be held to keep watching; dropping it stops
/// event delivery. Setup failure is fatal to subsystem start.
pub fn spawn_change_source(
    root: &Path,
    store_file: Option<PathBuf>,
    tx: mpsc::UnboundedSender<()>,
) -> Result<RecommendedWatcher> {
    let watch_root = root.to_path_buf();
    let mut watcher =
        recommended_watcher(move |event_result: notify::Result<Event>| match event_result {
            Ok(event) => {
                if !should_forward(&event, store_file.as_deref()) {
                    return;
                }
                log::debug!("filesystem changed: {:?}", event.paths.first());
                let _ = tx.send(());
            }
            Err(error) => {
                // Watcher errors can mean dropped events; a rescan is the
                // safe response either way.
                log::warn!("watch error on {}: {}", watch_root.display(), error);
                let _ = tx.send(());
            }
        })?;
    watcher.watch(root, RecursiveMode::Recursive)?;
    Ok(watcher)
}

/// Decides whether an event becomes a change signal.
fn should_forward(event: &Event, store_file: Option<&Path>) -> bool {
    if !is_relevant(&event.kind) {
        return false;
    }
    match store_file {
        // Self-generated writes to the cache store must not trigger rescans.
        Some(store) => {
            event.paths.is_empty() || event.paths.iter().any(|path| path != store)
        }
        None => true,
    }
}

fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_))
    )
}
