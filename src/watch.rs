use crate::workspace::{FileEvent, Workspace};
use anyhow::{Context, Result};
use clap::ValueEnum;
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

const DEFAULT_DEBOUNCE_MS: u64 = 300;
const READY_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(ValueEnum, Clone, Copy, Debug, Eq, PartialEq)]
pub enum WatchMode {
    Off,
    /// Watch when the platform allows it, otherwise rely on modification times.
    Auto,
    On,
}

#[derive(Clone, Copy, Debug)]
pub struct WatchConfig {
    pub mode: WatchMode,
    pub debounce: Duration,
}

impl WatchConfig {
    pub fn new(mode: WatchMode, debounce_ms: u64) -> Self {
        Self {
            mode,
            debounce: Duration::from_millis(debounce_ms.max(1)),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self::new(WatchMode::Auto, DEFAULT_DEBOUNCE_MS)
    }
}

pub struct WatchHandle {
    stop: Sender<()>,
    thread: Option<thread::JoinHandle<()>>,
}

impl WatchHandle {
    pub fn stop(mut self) {
        let _ = self.stop.send(());
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        let _ = self.stop.send(());
    }
}

/// Starts invalidating `workspace`'s analysis cache from file system events.
///
/// Returns `None` when watching is off, or when it could not start in
/// [`WatchMode::Auto`]. In [`WatchMode::On`] a watcher failure is an error.
pub fn start(workspace: Arc<Workspace>, config: WatchConfig) -> Result<Option<WatchHandle>> {
    if config.mode == WatchMode::Off {
        return Ok(None);
    }
    let (ready_tx, ready_rx) = mpsc::channel();
    let (stop_tx, stop_rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        if let Err(err) = run_loop(&workspace, config, stop_rx, ready_tx) {
            tracing::error!(error = %err, "watch loop failed");
        }
    });
    let watching = WatchHandle {
        stop: stop_tx,
        thread: Some(handle),
    };
    match ready_rx.recv_timeout(READY_TIMEOUT) {
        Ok(Ok(true)) => Ok(Some(watching)),
        Ok(Ok(false)) => {
            watching.stop();
            Ok(None)
        }
        Ok(Err(err)) => {
            watching.stop();
            Err(err)
        }
        Err(_) => Ok(Some(watching)),
    }
}

fn run_loop(
    workspace: &Workspace,
    config: WatchConfig,
    stop_rx: Receiver<()>,
    ready: Sender<Result<bool>>,
) -> Result<()> {
    let (_watcher, event_rx) = match try_start_watcher(workspace.roots()) {
        Ok(started) => {
            let _ = ready.send(Ok(true));
            started
        }
        Err(err) => {
            if config.mode == WatchMode::On {
                let _ = ready.send(Err(err));
            } else {
                tracing::warn!(error = %err, "file watching disabled, cache relies on modification times");
                let _ = ready.send(Ok(false));
            }
            return Ok(());
        }
    };
    tracing::info!(roots = workspace.roots().len(), "watching for file changes");

    let mut pending: BTreeMap<PathBuf, FileEvent> = BTreeMap::new();
    let mut last_event = Instant::now();
    loop {
        if stop_requested(&stop_rx) {
            return Ok(());
        }
        match event_rx.recv_timeout(config.debounce) {
            Ok(Ok(event)) => {
                if event.need_rescan() {
                    tracing::debug!("watcher asked for a rescan, clearing cache");
                    workspace.clear_cache();
                    pending.clear();
                    continue;
                }
                for change in file_events(&event) {
                    pending.insert(change.path().to_path_buf(), change);
                }
                last_event = Instant::now();
            }
            Ok(Err(err)) => tracing::warn!(error = %err, "watch error"),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                tracing::warn!("watcher channel closed");
                return Ok(());
            }
        }

        if !pending.is_empty() && last_event.elapsed() >= config.debounce {
            let batch = std::mem::take(&mut pending);
            apply_events(workspace, batch.into_values());
        }
    }
}

fn stop_requested(stop_rx: &Receiver<()>) -> bool {
    match stop_rx.try_recv() {
        Ok(()) => true,
        Err(TryRecvError::Disconnected) => true,
        Err(TryRecvError::Empty) => false,
    }
}

fn try_start_watcher(
    roots: &[PathBuf],
) -> Result<(RecommendedWatcher, Receiver<notify::Result<Event>>)> {
    let (event_tx, event_rx) = mpsc::channel::<notify::Result<Event>>();
    let mut watcher = notify::recommended_watcher(event_tx)?;
    for root in roots {
        watcher
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| format!("watch {}", root.display()))?;
    }
    Ok((watcher, event_rx))
}

pub fn apply_events(workspace: &Workspace, events: impl IntoIterator<Item = FileEvent>) {
    let mut applied = 0usize;
    for event in events {
        workspace.handle_file_event(&event);
        applied += 1;
    }
    tracing::debug!(applied, "file events applied");
}

/// Source file changes carried by a notify event. Access events, directories
/// and files of other languages yield nothing.
pub fn file_events(event: &Event) -> Vec<FileEvent> {
    event
        .paths
        .iter()
        .filter(|path| is_watched_source(path))
        .filter_map(|path| {
            let path = path.clone();
            match event.kind {
                EventKind::Create(_) => Some(FileEvent::Created(path)),
                EventKind::Modify(ModifyKind::Name(_)) if path.exists() => {
                    Some(FileEvent::Created(path))
                }
                EventKind::Modify(ModifyKind::Name(_)) | EventKind::Remove(_) => {
                    Some(FileEvent::Deleted(path))
                }
                EventKind::Modify(_) => Some(FileEvent::Changed(path)),
                _ => None,
            }
        })
        .collect()
}

fn is_watched_source(path: &Path) -> bool {
    let in_git = path
        .components()
        .any(|component| component == Component::Normal(".git".as_ref()));
    !in_git && crate::scan::language_for_path(path).is_some()
}
