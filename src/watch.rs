//! File system watcher for development rebuilds.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Event Loop                              │
//! │                                                              │
//! │  ┌──────────┐    ┌────────────┐    ┌──────────────────────┐  │
//! │  │ notify   │───▶│ WatchState │───▶│  Orchestrator::run   │  │
//! │  │ events   │    │  (300ms)   │    │  (widest scope of    │  │
//! │  └────┬─────┘    └────────────┘    │   the changed paths) │  │
//! │       │                ▲           └──────────┬───────────┘  │
//! │       │ cancel flag    │ re-queue if cancelled│              │
//! │       └────────────────┴──────────────────────┘              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Events are coalesced until the tree has been quiet for the debounce
//! window. Only one rebuild runs at a time, on the loop's own thread; an
//! event arriving meanwhile raises the orchestrator's cancellation flag, and
//! the paths of the abandoned run are merged into the next batch.

use crate::{
    build::{Orchestrator, RebuildScope},
    config::SiteConfig,
    error::{BuildError, error_chain},
    log,
    reload::ReloadServer,
    utils::category::{FileCategory, categorize_path, is_temp_file},
};
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;
use std::{
    path::{Path, PathBuf},
    sync::{atomic::Ordering, mpsc},
    time::{Duration, Instant},
};

const DEBOUNCE_MS: u64 = 300;

// =============================================================================
// Debounce State
// =============================================================================

/// Watched roots plus the batch of changed paths waiting for quiet.
struct WatchState {
    watched: Vec<(PathBuf, RecursiveMode)>,
    pending: FxHashSet<PathBuf>,
    last_event: Option<Instant>,
    last_triggered: Option<Instant>,
}

impl WatchState {
    fn new(config: &SiteConfig) -> Self {
        let build = &config.build;
        Self {
            watched: vec![
                (build.src.clone(), RecursiveMode::Recursive),
                (build.public.clone(), RecursiveMode::Recursive),
                (config.config_path.clone(), RecursiveMode::NonRecursive),
            ],
            pending: FxHashSet::default(),
            last_event: None,
            last_triggered: None,
        }
    }

    fn add(&mut self, paths: impl IntoIterator<Item = PathBuf>) {
        let before = self.pending.len();
        self.pending
            .extend(paths.into_iter().filter(|p| !is_temp_file(p)));
        if self.pending.len() > before {
            self.last_event = Some(Instant::now());
        }
    }

    /// Put back the paths of a cancelled rebuild.
    fn requeue(&mut self, paths: Vec<PathBuf>) {
        self.pending.extend(paths);
        self.last_event.get_or_insert_with(Instant::now);
    }

    fn ready(&self) -> bool {
        !self.pending.is_empty()
            && self
                .last_event
                .is_some_and(|t| t.elapsed() >= Duration::from_millis(DEBOUNCE_MS))
    }

    fn take(&mut self) -> Vec<PathBuf> {
        self.last_event = None;
        self.last_triggered = Some(Instant::now());
        let mut paths: Vec<_> = self.pending.drain().collect();
        paths.sort();
        paths
    }

    fn timeout(&self) -> Duration {
        if self.pending.is_empty() {
            Duration::from_secs(60)
        } else {
            Duration::from_millis(DEBOUNCE_MS)
        }
    }
}

// =============================================================================
// Rebuild
// =============================================================================

/// Widest scope any of `paths` needs; `None` if all are outside the build.
fn scope_of(paths: &[PathBuf], config: &SiteConfig) -> Option<RebuildScope> {
    paths
        .iter()
        .filter_map(|p| categorize_path(p, config).scope())
        .max()
}

/// `/proj/src/pages/index.twig` → `src/pages/index.twig`
fn rel_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

fn rebuild(
    paths: Vec<PathBuf>,
    config: &SiteConfig,
    orchestrator: &mut Orchestrator,
    reload: Option<&ReloadServer>,
    state: &mut WatchState,
) {
    let Some(scope) = scope_of(&paths, config) else {
        return;
    };

    let root = config.get_root();
    let trigger = paths.iter().map(|p| rel_path(p, root)).collect::<Vec<_>>().join(", ");
    log!("watch"; "{trigger} changed");
    if paths
        .iter()
        .any(|p| categorize_path(p, config) == FileCategory::Config)
    {
        log!("warn"; "config changes take effect after a restart");
    }

    orchestrator.cancel_flag().store(false, Ordering::Relaxed);
    match orchestrator.run(scope) {
        Ok(_) => {
            if let Some(reload) = reload {
                reload.notify_reload();
            }
        }
        Err(BuildError::Cancelled) => {
            log!("watch"; "superseded by a newer change");
            state.requeue(paths);
        }
        Err(err) => {
            log!("error"; "{}", error_chain(&err));
            if let Some(culprit) = err.culprit() {
                log!("error"; "at {culprit}");
            }
        }
    }
    eprintln!(); // Blank line to separate rebuild sessions
}

// =============================================================================
// Watcher Setup
// =============================================================================

fn setup_watchers(watcher: &mut impl Watcher, state: &WatchState, config: &SiteConfig) -> Result<()> {
    let root = config.get_root();
    let mut watched = Vec::new();
    for (path, mode) in &state.watched {
        if !path.exists() {
            continue;
        }
        watcher
            .watch(path, *mode)
            .with_context(|| format!("Failed to watch {}", path.display()))?;
        watched.push(rel_path(path, root));
    }
    log!("watch"; "{}", watched.join(", "));
    Ok(())
}

const fn is_relevant(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    )
}

// =============================================================================
// Public API
// =============================================================================

/// Watch the sources and rebuild through `orchestrator` until the watcher
/// goes away. Blocks.
pub fn watch_for_changes_blocking(
    config: &'static SiteConfig,
    mut orchestrator: Orchestrator<'static>,
    reload: Option<ReloadServer>,
) -> Result<()> {
    let (tx, rx) = mpsc::channel();
    let cancel = orchestrator.cancel_flag();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        if let Ok(event) = &res
            && is_relevant(event)
            && event
                .paths
                .iter()
                .any(|p| !is_temp_file(p) && categorize_path(p, config).scope().is_some())
        {
            cancel.store(true, Ordering::Relaxed);
        }
        let _ = tx.send(res);
    })
    .context("Failed to create file watcher")?;

    let mut state = WatchState::new(config);
    setup_watchers(&mut watcher, &state, config)?;

    loop {
        match rx.recv_timeout(state.timeout()) {
            Ok(Ok(event)) if is_relevant(&event) => state.add(event.paths),
            Ok(Err(e)) => log!("watch"; "error: {e}"),
            Err(mpsc::RecvTimeoutError::Timeout) if state.ready() => {
                let paths = state.take();
                rebuild(paths, config, &mut orchestrator, reload.as_ref(), &mut state);
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
            // Irrelevant events, timeout with nothing ready
            _ => {}
        }
    }

    Ok(())
}
