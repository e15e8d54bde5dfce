use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use tracing::{debug, info, warn};

use crate::core::select::PathSelector;
use crate::error::{Result, SnapError};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Fires once the tree has been quiet for `window` after the last event.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    last_event: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_event: None,
        }
    }

    pub fn record(&mut self, now: Instant) {
        self.last_event = Some(now);
    }

    pub fn is_pending(&self) -> bool {
        self.last_event.is_some()
    }

    /// True exactly once per burst, when the quiet window has elapsed
    pub fn ready(&mut self, now: Instant) -> bool {
        match self.last_event {
            Some(last) if now.saturating_duration_since(last) >= self.window => {
                self.last_event = None;
                true
            }
            _ => false,
        }
    }
}

/// Turns filesystem events under the root into full rebuilds
pub struct Watcher {
    selector: PathSelector,
    debounce: Duration,
    poll_interval: Duration,
    stop: Arc<AtomicBool>,
}

impl Watcher {
    /// `selector` must already exclude the output directory
    pub fn new(selector: PathSelector) -> Self {
        Self {
            selector,
            debounce: DEFAULT_DEBOUNCE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }

    /// Set to `true` to make [`Watcher::run`] return after its current wait
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn root(&self) -> &Path {
        self.selector.root()
    }

    /// An event matters if it changes something and touches a non-excluded path
    pub fn is_relevant(&self, event: &Event) -> bool {
        if matches!(event.kind, EventKind::Access(_)) {
            return false;
        }
        event.paths.iter().any(|p| !self.selector.is_excluded(p))
    }

    /// Watch until stopped, calling `rebuild` once per debounced burst.
    ///
    /// A failing rebuild is logged and watching continues. Returns the number
    /// of rebuilds that succeeded.
    pub fn run<F>(&self, mut rebuild: F) -> Result<usize>
    where
        F: FnMut() -> Result<()>,
    {
        let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
        let mut watcher: RecommendedWatcher = notify::recommended_watcher(tx)?;
        watcher.watch(self.root(), RecursiveMode::Recursive)?;
        info!(root = %self.root().display(), debounce_ms = self.debounce.as_millis() as u64, "watching for changes");

        let mut debouncer = Debouncer::new(self.debounce);
        let mut rebuilds = 0;

        while !self.stop.load(Ordering::SeqCst) {
            match rx.recv_timeout(self.poll_interval) {
                Ok(Ok(event)) => {
                    if self.is_relevant(&event) {
                        debug!(kind = ?event.kind, paths = ?relevant_paths(&self.selector, &event), "change");
                        debouncer.record(Instant::now());
                    }
                }
                Ok(Err(err)) => warn!(error = %err, "watch event error"),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(SnapError::Watch {
                        reason: "event channel closed".to_string(),
                        source: None,
                    });
                }
            }

            if debouncer.ready(Instant::now()) {
                info!("changes settled, rebuilding");
                match rebuild() {
                    Ok(()) => rebuilds += 1,
                    Err(err) => warn!(error = %err, "rebuild failed, still watching"),
                }
            }
        }

        debug!(rebuilds, "watcher stopped");
        Ok(rebuilds)
    }
}

/// Paths from an event that survive exclusion, mostly for logging
pub fn relevant_paths(selector: &PathSelector, event: &Event) -> Vec<PathBuf> {
    event
        .paths
        .iter()
        .filter(|p| !selector.is_excluded(p))
        .cloned()
        .collect()
}
