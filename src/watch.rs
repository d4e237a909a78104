//! Rebuilds the site as its sources change.
//!
//! A single-threaded loop: filesystem events arrive on a channel, bursts are
//! coalesced until [`QUIET_PERIOD`] passes without a new event, and then the
//! whole batch of changed paths goes to [`Site::update`] at once.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use notify::{Event, EventKind, RecursiveMode, Watcher};
use thiserror::Error;

use crate::build::{self, Site};
use crate::config::Config;
use crate::publish::{self, Lock};

/// How long the sources must be quiet before a batch is processed.
pub const QUIET_PERIOD: Duration = Duration::from_millis(200);

/// Builds the site, then blocks rebuilding it on every change until the
/// watcher goes away. Holds the destination lock throughout.
pub fn watch(config: Config) -> Result<()> {
    let lock = Lock::acquire(&config.destination)?;
    let mut site = Site::new(config);
    match site.build() {
        Ok(report) => tracing::info!("{}", report),
        Err(build::Error::Scan(err)) => return Err(Error::Scan(err)),
        Err(err) => tracing::error!("build failed: {}", err),
    }

    let (tx, rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(tx)?;
    let config = site.config();
    watcher.watch(&config.root, RecursiveMode::Recursive)?;
    if let Some(theme) = &config.theme_directory {
        if theme.is_dir() && !theme.starts_with(&config.root) {
            watcher.watch(theme, RecursiveMode::Recursive)?;
        }
    }
    tracing::info!(
        root = %config.root.display(),
        lock = %lock.path().display(),
        "watching for changes"
    );

    let mut pending = BTreeSet::new();
    loop {
        match rx.recv_timeout(QUIET_PERIOD) {
            Ok(Ok(event)) => pending.extend(changed_paths(site.config(), event)),
            Ok(Err(err)) => tracing::warn!("watch error: {}", err),
            Err(RecvTimeoutError::Timeout) if !pending.is_empty() => {
                let batch: Vec<PathBuf> = std::mem::take(&mut pending).into_iter().collect();
                tracing::debug!(paths = batch.len(), "processing changes");
                match site.update(&batch) {
                    Ok(Some(report)) => tracing::info!("{}", report),
                    Ok(None) => {}
                    Err(err) => tracing::error!("rebuild failed: {}", err),
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    Ok(())
}

// Paths from an event that can affect the site. Output written by the build
// itself lands in the destination and is dropped here.
fn changed_paths(config: &Config, event: Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => event
            .paths
            .into_iter()
            .filter(|path| !path.starts_with(&config.destination))
            .collect(),
        _ => Vec::new(),
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A startup failure. Errors after startup are logged, not returned.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Lock(#[from] publish::Error),

    #[error(transparent)]
    Scan(#[from] crate::scan::ScanError),

    #[error("starting the file watcher: {0}")]
    Watcher(#[from] notify::Error),
}
