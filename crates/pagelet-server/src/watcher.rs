//! Page directory watching.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc as async_mpsc;

/// Events emitted by the file watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A page file was created or modified
    PageChanged(PathBuf),

    /// A page file was removed
    PageRemoved(PathBuf),
}

/// Watches the pages directory for edits made outside the editor.
pub struct PageWatcher {
    _watcher: RecommendedWatcher,
}

impl PageWatcher {
    /// Create a watcher for `dir`.
    ///
    /// Returns the watcher and a channel to receive events. Events for the
    /// same path within 100ms of each other are collapsed.
    pub fn new(dir: &Path) -> Result<(Self, async_mpsc::Receiver<WatchEvent>), std::io::Error> {
        let (sync_tx, sync_rx) = mpsc::channel();
        let (async_tx, async_rx) = async_mpsc::channel(100);

        let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, _>| {
            if let Ok(event) = res {
                let _ = sync_tx.send(event);
            }
        })
        .map_err(std::io::Error::other)?;

        if dir.exists() {
            watcher
                .watch(dir, RecursiveMode::Recursive)
                .map_err(std::io::Error::other)?;
        }

        std::thread::spawn(move || {
            let debounce = Duration::from_millis(100);
            let mut last: Option<(PathBuf, Instant)> = None;

            while let Ok(event) = sync_rx.recv() {
                for path in event.paths {
                    let Some(watch_event) = classify_event(&path, &event.kind) else {
                        continue;
                    };

                    let now = Instant::now();
                    let repeated = matches!(
                        &last,
                        Some((p, at)) if *p == path && now.duration_since(*at) < debounce
                    );
                    last = Some((path, now));
                    if repeated {
                        continue;
                    }

                    if async_tx.blocking_send(watch_event).is_err() {
                        return;
                    }
                }
            }
        });

        Ok((Self { _watcher: watcher }, async_rx))
    }
}

/// Classify a notify event. Only `.jsx` files are pages.
fn classify_event(path: &Path, kind: &notify::EventKind) -> Option<WatchEvent> {
    use notify::EventKind;

    if path.extension().and_then(|e| e.to_str()) != Some("jsx") {
        return None;
    }

    match kind {
        EventKind::Create(_) | EventKind::Modify(_) => Some(WatchEvent::PageChanged(path.to_path_buf())),
        EventKind::Remove(_) => Some(WatchEvent::PageRemoved(path.to_path_buf())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RemoveKind};
    use notify::EventKind;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn classifies_page_events() {
        let page = Path::new("pages/home.jsx");
        assert_eq!(
            classify_event(page, &EventKind::Modify(ModifyKind::Any)),
            Some(WatchEvent::PageChanged(page.to_path_buf()))
        );
        assert_eq!(
            classify_event(page, &EventKind::Create(CreateKind::File)),
            Some(WatchEvent::PageChanged(page.to_path_buf()))
        );
        assert_eq!(
            classify_event(page, &EventKind::Remove(RemoveKind::File)),
            Some(WatchEvent::PageRemoved(page.to_path_buf()))
        );
        assert_eq!(
            classify_event(Path::new("pages/notes.md"), &EventKind::Modify(ModifyKind::Any)),
            None
        );
    }

    #[tokio::test]
    async fn watches_page_changes() {
        let temp = tempdir().unwrap();
        let page = temp.path().join("home.jsx");

        let (watcher, mut rx) = PageWatcher::new(temp.path()).unwrap();

        // Give inotify time to set up
        tokio::time::sleep(Duration::from_millis(100)).await;

        fs::write(&page, "return null;").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(3), rx.recv()).await;

        drop(watcher);

        assert!(event.is_ok(), "timeout waiting for file watch event");
        assert!(event.unwrap().is_some(), "channel should not be closed");
    }
}
