//! Single-file watcher feeding a coalescing change queue

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Create a change queue with a single slot.
///
/// Consumers always re-read the file from scratch, so one pending
/// notification is enough: further signals while the slot is full are
/// dropped.
pub fn change_queue() -> (ChangeSender, ChangeReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (ChangeSender { tx }, ChangeReceiver { rx })
}

/// Producer half of the change queue
#[derive(Debug, Clone)]
pub struct ChangeSender {
    tx: mpsc::Sender<()>,
}

impl ChangeSender {
    /// Signal that the file may have changed. Never blocks.
    ///
    /// Returns `false` once the receiver is gone.
    pub fn notify(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(())) => {
                tracing::trace!("Change already pending, dropping notification");
                true
            }
            Err(mpsc::error::TrySendError::Closed(())) => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half of the change queue
#[derive(Debug)]
pub struct ChangeReceiver {
    rx: mpsc::Receiver<()>,
}

impl ChangeReceiver {
    /// Wait for the next change. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<()> {
        self.rx.recv().await
    }

    /// Take a pending change without waiting
    pub fn try_recv(&mut self) -> Option<()> {
        self.rx.try_recv().ok()
    }
}

/// How a low-level filesystem event affects the watched path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Content or metadata changed in place
    Modified,
    /// Path removed or renamed, the watch must be re-registered
    Replaced,
}

impl ChangeKind {
    /// Classify a notify event, `None` for events that cannot change content
    pub fn classify(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Modify(ModifyKind::Name(_)) | EventKind::Remove(_) => Some(Self::Replaced),
            EventKind::Modify(_) | EventKind::Create(_) => Some(Self::Modified),
            EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
        }
    }
}

/// Watches one file and emits change notifications.
pub struct FileWatcher {
    path: PathBuf,
    rewatch_delay: Duration,
}

impl FileWatcher {
    pub fn new(path: impl Into<PathBuf>, rewatch_delay: Duration) -> Self {
        Self {
            path: path.into(),
            rewatch_delay,
        }
    }

    /// Register the watch, emit the initial notification and spawn the
    /// event loop. Fails only if the initial registration fails.
    pub fn spawn(self, changes: ChangeSender, cancel: CancellationToken) -> Result<JoinHandle<()>> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = event_tx.send(res);
            },
            notify::Config::default(),
        )?;
        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::debug!(path = %self.path.display(), "Watching file");

        // First render should not wait for a filesystem event
        changes.notify();

        let watcher = Arc::new(Mutex::new(watcher));
        Ok(tokio::spawn(self.run(watcher, event_rx, changes, cancel)))
    }

    async fn run(
        self,
        watcher: Arc<Mutex<RecommendedWatcher>>,
        mut events: mpsc::UnboundedReceiver<notify::Result<Event>>,
        changes: ChangeSender,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!("Watcher shutting down");
                    break;
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        break;
                    };
                    match event {
                        Ok(event) => {
                            if !self.handle_event(&event, &watcher, &changes, &cancel) {
                                tracing::debug!("Change queue closed, stopping watcher");
                                break;
                            }
                        }
                        Err(e) => tracing::warn!("File watcher error: {}", e),
                    }
                }
            }
        }
    }

    /// Returns `false` when nobody listens for changes anymore.
    fn handle_event(
        &self,
        event: &Event,
        watcher: &Arc<Mutex<RecommendedWatcher>>,
        changes: &ChangeSender,
        cancel: &CancellationToken,
    ) -> bool {
        tracing::debug!(paths = ?event.paths, kind = ?event.kind, "File event");

        match ChangeKind::classify(&event.kind) {
            Some(ChangeKind::Modified) => changes.notify(),
            Some(ChangeKind::Replaced) => {
                self.schedule_rewatch(watcher.clone(), changes.clone(), cancel.clone());
                changes.notify()
            }
            None => true,
        }
    }

    /// Editors that save by writing a temp file and renaming it over the
    /// original invalidate the watch on the old inode; re-register the
    /// path once the new file is in place.
    ///
    /// Writes landing before the new registration produce no event, so a
    /// successful re-registration is followed by one more notification.
    fn schedule_rewatch(
        &self,
        watcher: Arc<Mutex<RecommendedWatcher>>,
        changes: ChangeSender,
        cancel: CancellationToken,
    ) {
        let path = self.path.clone();
        let delay = self.rewatch_delay;

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            let mut watcher = watcher.lock().await;
            // Drop the registration of the replaced inode, if still listed
            if let Err(e) = watcher.unwatch(&path) {
                tracing::trace!("Stale watch already gone: {}", e);
            }
            match watcher.watch(&path, RecursiveMode::NonRecursive) {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "Re-registered watch");
                    changes.notify();
                }
                Err(e) => tracing::debug!("Failed to re-add watch: {}", e),
            }
        });
    }
}
