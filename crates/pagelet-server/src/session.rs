//! One editing session: a preview controller on its own thread.
//!
//! Interpreter values are not `Send`, so each session's controller lives on
//! a dedicated sandbox thread for its whole life. The socket handler talks
//! to it through a command queue and receives [`ServerMessage`]s back.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use pagelet_preview::PreviewController;
use pagelet_sandbox::{spawn_sandbox_thread, SandboxExecutor};
use pagelet_source::parse_page;
use pagelet_store::{ArtifactProducer, PageDraft, PageStore};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use walkdir::WalkDir;

use crate::html::Templates;
use crate::websocket::{PageChange, ServerMessage};

/// Interval at which virtual timers follow the wall clock.
pub const TICK: Duration = Duration::from_millis(100);

/// Work for a session thread.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    SetSource(String),
    Regenerate,
    Dispatch {
        node: String,
        event: String,
        args: Vec<serde_json::Value>,
    },
    Open(String),
    Save {
        slug: String,
        title: String,
        published: bool,
    },
    /// A page file changed on disk
    PageChanged(PageChange),
    /// Advance virtual time by this many milliseconds
    Tick(u64),
}

/// What a session needs from the server.
#[derive(Clone)]
pub struct SessionConfig {
    pub executor: SandboxExecutor,
    pub store: Arc<dyn PageStore>,
    pub pages_dir: PathBuf,
}

/// Handle to a running session thread. Dropping it ends the session.
#[derive(Debug)]
pub struct Session {
    commands: Sender<SessionCommand>,
}

impl Session {
    /// Start a session thread.
    pub fn spawn(
        name: &str,
        config: SessionConfig,
    ) -> std::io::Result<(Self, UnboundedReceiver<ServerMessage>)> {
        let (commands, queue) = mpsc::channel();
        let (updates, rx) = unbounded_channel();

        spawn_sandbox_thread(format!("session-{name}"), move || {
            SessionWorker::new(config, updates).run(queue);
        })?;

        Ok((Self { commands }, rx))
    }

    /// Queue a command. Returns `false` once the session thread has stopped.
    pub fn send(&self, command: SessionCommand) -> bool {
        self.commands.send(command).is_ok()
    }
}

/// Drop every `SetSource` that a later one in the same batch supersedes,
/// along with the `Dispatch`es queued ahead of it. Their node ids belong to
/// a tree the new source replaces.
pub fn coalesce(batch: Vec<SessionCommand>) -> Vec<SessionCommand> {
    let Some(last_source) = batch
        .iter()
        .rposition(|command| matches!(command, SessionCommand::SetSource(_)))
    else {
        return batch;
    };
    batch
        .into_iter()
        .enumerate()
        .filter(|(i, command)| {
            *i >= last_source
                || !matches!(
                    command,
                    SessionCommand::SetSource(_) | SessionCommand::Dispatch { .. }
                )
        })
        .map(|(_, command)| command)
        .collect()
}

struct SessionWorker {
    controller: PreviewController,
    producer: ArtifactProducer,
    store: Arc<dyn PageStore>,
    pages_dir: PathBuf,
    templates: Templates,
    updates: UnboundedSender<ServerMessage>,
    open_slug: Option<String>,
    last_html: Option<String>,
}

impl SessionWorker {
    fn new(config: SessionConfig, updates: UnboundedSender<ServerMessage>) -> Self {
        Self {
            controller: PreviewController::new(config.executor),
            producer: ArtifactProducer::new(),
            store: config.store,
            pages_dir: config.pages_dir,
            templates: Templates::new(),
            updates,
            open_slug: None,
            last_html: None,
        }
    }

    fn run(mut self, queue: Receiver<SessionCommand>) {
        self.publish(true);
        let mut last_tick = Instant::now();

        loop {
            let first = match queue.recv_timeout(TICK) {
                Ok(command) => Some(command),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            let mut batch: Vec<SessionCommand> = first.into_iter().collect();
            batch.extend(queue.try_iter());
            for command in coalesce(batch) {
                self.handle(command);
            }

            let elapsed = last_tick.elapsed();
            if elapsed >= TICK {
                last_tick = Instant::now();
                if self.controller.has_pending_timers() {
                    self.handle(SessionCommand::Tick(elapsed.as_millis() as u64));
                }
            }

            if self.updates.is_closed() {
                break;
            }
        }

        // Let effect cleanups run
        self.controller.set_source("");
        tracing::debug!("Session ended");
    }

    fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::SetSource(source) => {
                self.controller.set_source(source);
                self.publish(true);
            }
            SessionCommand::Regenerate => {
                self.controller.force_remount();
                self.publish(true);
            }
            SessionCommand::Dispatch { node, event, args } => {
                if self.controller.dispatch(&node, &event, &args) {
                    self.publish(false);
                } else {
                    tracing::debug!("No {} handler on node {}", event, node);
                }
            }
            SessionCommand::Tick(ms) => {
                self.controller.advance_time(ms);
                self.publish(false);
            }
            SessionCommand::Open(slug) => self.open(slug),
            SessionCommand::Save {
                slug,
                title,
                published,
            } => self.save(slug, title, published),
            SessionCommand::PageChanged(change) => {
                let is_open = self.open_slug.as_deref() == Some(change.slug.as_str());
                if is_open && change.source != self.controller.source() {
                    tracing::info!("Reloading {} after an external edit", change.slug);
                    self.load(change);
                }
            }
        }
        self.forward_host_events();
    }

    fn open(&mut self, slug: String) {
        match find_page(&self.pages_dir, self.store.as_ref(), &slug) {
            Some(page) => self.load(page),
            None => {
                tracing::warn!("No page with slug {}", slug);
                self.send(ServerMessage::SaveFailed {
                    message: format!("No page with slug {slug:?}"),
                    slug,
                });
            }
        }
    }

    fn load(&mut self, page: PageChange) {
        self.open_slug = Some(page.slug.clone());
        self.controller.set_source(page.source.clone());
        self.send(ServerMessage::Opened {
            slug: page.slug,
            title: page.title,
            source: page.source,
        });
        self.publish(true);
    }

    fn save(&mut self, slug: String, title: String, published: bool) {
        let draft = PageDraft {
            title,
            slug: slug.clone(),
            source_text: self.controller.source().to_string(),
            is_published: published,
        };
        match self.producer.save(self.store.as_ref(), draft) {
            Ok(record) => {
                self.open_slug = Some(record.slug.clone());
                self.send(ServerMessage::Saved {
                    slug: record.slug,
                    registry_version: record.registry_version,
                });
            }
            Err(e) => self.send(ServerMessage::SaveFailed {
                slug,
                message: e.to_string(),
            }),
        }
    }

    /// Send the preview, unless `force` is unset and it has not changed.
    fn publish(&mut self, force: bool) {
        let html = match self.templates.preview(self.controller.result()) {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!("Failed to render preview: {}", e);
                return;
            }
        };
        if !force && self.last_html.as_deref() == Some(html.as_str()) {
            return;
        }

        let error = match self.controller.result() {
            pagelet_preview::PreviewResult::Failed(error) => Some(error.clone()),
            _ => None,
        };
        self.last_html = Some(html.clone());
        self.send(ServerMessage::Preview {
            state: self.controller.state(),
            generation: self.controller.generation().0,
            html,
            error,
        });
    }

    fn forward_host_events(&mut self) {
        for event in self.controller.drain_host_events() {
            self.send(ServerMessage::HostEvent { event });
        }
    }

    fn send(&self, message: ServerMessage) {
        // The socket may already be gone
        let _ = self.updates.send(message);
    }
}

/// Look a page up by slug: page files first, then stored records.
pub fn find_page(pages_dir: &Path, store: &dyn PageStore, slug: &str) -> Option<PageChange> {
    let from_file = WalkDir::new(pages_dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|ext| ext.to_str()) == Some("jsx"))
        .find_map(|e| {
            let page = read_page(e.path())?;
            (page.slug == slug).then_some(page)
        });
    if from_file.is_some() {
        return from_file;
    }

    match store.get(slug) {
        Ok(record) => record.map(|record| PageChange {
            slug: record.slug,
            title: record.title,
            source: record.source_text,
        }),
        Err(e) => {
            tracing::warn!("Failed to read record {}: {}", slug, e);
            None
        }
    }
}

/// Parse a page file into its slug, title and source.
pub fn read_page(path: &Path) -> Option<PageChange> {
    let text = std::fs::read_to_string(path).ok()?;
    let page = match parse_page(&text) {
        Ok(page) => page,
        Err(e) => {
            tracing::warn!("{}: {}", path.display(), e);
            return None;
        }
    };
    let stem = path.file_stem()?.to_str()?.to_string();
    let meta = page.meta.unwrap_or_default();
    Some(PageChange {
        title: if meta.title.is_empty() {
            stem.clone()
        } else {
            meta.title
        },
        slug: meta.slug.unwrap_or(stem),
        source: page.source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagelet_preview::PreviewState;
    use pagelet_store::MemoryStore;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn config(pages_dir: &Path, store: Arc<MemoryStore>) -> SessionConfig {
        SessionConfig {
            executor: SandboxExecutor::default(),
            store,
            pages_dir: pages_dir.to_path_buf(),
        }
    }

    async fn next(rx: &mut UnboundedReceiver<ServerMessage>) -> ServerMessage {
        tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("timed out waiting for session")
            .expect("session ended")
    }

    async fn next_preview(rx: &mut UnboundedReceiver<ServerMessage>) -> (PreviewState, String) {
        loop {
            if let ServerMessage::Preview { state, html, .. } = next(rx).await {
                return (state, html);
            }
        }
    }

    #[test]
    fn coalesces_source_edits() {
        let batch = vec![
            SessionCommand::SetSource("a".to_string()),
            SessionCommand::Regenerate,
            SessionCommand::SetSource("ab".to_string()),
            SessionCommand::SetSource("abc".to_string()),
            SessionCommand::Tick(100),
        ];
        assert_eq!(
            coalesce(batch),
            vec![
                SessionCommand::Regenerate,
                SessionCommand::SetSource("abc".to_string()),
                SessionCommand::Tick(100),
            ]
        );
    }

    #[test]
    fn drops_dispatches_for_superseded_trees() {
        let click = |node: &str| SessionCommand::Dispatch {
            node: node.to_string(),
            event: "onClick".to_string(),
            args: Vec::new(),
        };
        let batch = vec![
            click("n1"),
            SessionCommand::SetSource("a".to_string()),
            click("n2"),
            SessionCommand::Tick(100),
            SessionCommand::SetSource("ab".to_string()),
            click("n3"),
        ];
        assert_eq!(
            coalesce(batch),
            vec![
                SessionCommand::Tick(100),
                SessionCommand::SetSource("ab".to_string()),
                click("n3"),
            ]
        );

        let clicks = vec![click("n1"), SessionCommand::Tick(100), click("n2")];
        assert_eq!(coalesce(clicks.clone()), clicks);
    }

    #[test]
    fn reads_page_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("about.jsx");
        std::fs::write(&path, "---\ntitle: About us\n---\nreturn null;\n").unwrap();

        let page = read_page(&path).unwrap();
        assert_eq!(page.slug, "about");
        assert_eq!(page.title, "About us");
        assert_eq!(page.source, "return null;\n");
    }

    #[test]
    fn finds_stored_pages_without_files() {
        let dir = tempdir().unwrap();
        let store = MemoryStore::new();
        ArtifactProducer::new()
            .save(
                &store,
                PageDraft {
                    title: "Saved".to_string(),
                    slug: "saved".to_string(),
                    source_text: "return null;".to_string(),
                    is_published: false,
                },
            )
            .unwrap();

        let page = find_page(dir.path(), &store, "saved").unwrap();
        assert_eq!(page.title, "Saved");
        assert!(find_page(dir.path(), &store, "missing").is_none());
    }

    #[tokio::test]
    async fn renders_source_and_interactions() {
        let dir = tempdir().unwrap();
        let (session, mut rx) = Session::spawn("test", config(dir.path(), Arc::new(MemoryStore::new()))).unwrap();

        let (state, html) = next_preview(&mut rx).await;
        assert_eq!(state, PreviewState::Idle);
        assert!(html.contains(crate::html::PLACEHOLDER));

        session.send(SessionCommand::SetSource(
            r#"const App = () => {
  const [n, setN] = useState(0);
  return <TouchableOpacity onPress={() => setN(n + 1)}><Text>Count {n}</Text></TouchableOpacity>;
};
return <App />;"#
                .to_string(),
        ));
        let (state, html) = next_preview(&mut rx).await;
        assert_eq!(state, PreviewState::Rendered);
        assert!(html.contains("Count 0"));

        session.send(SessionCommand::Dispatch {
            node: "0".to_string(),
            event: "onPress".to_string(),
            args: vec![],
        });
        let (_, html) = next_preview(&mut rx).await;
        assert!(html.contains("Count 1"));
    }

    #[tokio::test]
    async fn reports_failures_and_saves() {
        let dir = tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let (session, mut rx) = Session::spawn("test", config(dir.path(), store.clone())).unwrap();
        next_preview(&mut rx).await;

        session.send(SessionCommand::SetSource("return <View>;".to_string()));
        let (state, html) = next_preview(&mut rx).await;
        assert_eq!(state, PreviewState::Failed);
        assert!(html.contains("Compile error"));

        session.send(SessionCommand::Save {
            slug: "broken".to_string(),
            title: "Broken".to_string(),
            published: false,
        });
        match next(&mut rx).await {
            ServerMessage::SaveFailed { slug, message } => {
                assert_eq!(slug, "broken");
                assert!(message.contains("SyntaxError"));
            }
            other => panic!("Expected save_failed, got {other:?}"),
        }
        assert_eq!(store.get("broken").unwrap(), None);

        session.send(SessionCommand::SetSource("return <Text>ok</Text>;".to_string()));
        next_preview(&mut rx).await;
        session.send(SessionCommand::Save {
            slug: "fixed".to_string(),
            title: "Fixed".to_string(),
            published: true,
        });
        match next(&mut rx).await {
            ServerMessage::Saved { slug, .. } => assert_eq!(slug, "fixed"),
            other => panic!("Expected saved, got {other:?}"),
        }
        assert!(store.get("fixed").unwrap().unwrap().is_published);
    }

    #[tokio::test]
    async fn external_edits_reload_open_pages() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("home.jsx"), "return <Text>v1</Text>;\n").unwrap();
        let (session, mut rx) = Session::spawn("test", config(dir.path(), Arc::new(MemoryStore::new()))).unwrap();
        next_preview(&mut rx).await;

        session.send(SessionCommand::Open("home".to_string()));
        match next(&mut rx).await {
            ServerMessage::Opened { slug, source, .. } => {
                assert_eq!(slug, "home");
                assert_eq!(source, "return <Text>v1</Text>;\n");
            }
            other => panic!("Expected opened, got {other:?}"),
        }
        let (_, html) = next_preview(&mut rx).await;
        assert!(html.contains("v1"));

        session.send(SessionCommand::PageChanged(PageChange {
            slug: "other".to_string(),
            title: "Other".to_string(),
            source: "return <Text>nope</Text>;".to_string(),
        }));
        session.send(SessionCommand::PageChanged(PageChange {
            slug: "home".to_string(),
            title: "home".to_string(),
            source: "return <Text>v2</Text>;".to_string(),
        }));
        let (_, html) = next_preview(&mut rx).await;
        assert!(html.contains("v2"));
    }

    #[tokio::test]
    async fn forwards_host_events() {
        let dir = tempdir().unwrap();
        let (session, mut rx) = Session::spawn("test", config(dir.path(), Arc::new(MemoryStore::new()))).unwrap();
        next_preview(&mut rx).await;

        session.send(SessionCommand::SetSource(
            r#"return <TouchableOpacity onPress={() => redirectTo("about")}><Text>Go</Text></TouchableOpacity>;"#
                .to_string(),
        ));
        next_preview(&mut rx).await;
        session.send(SessionCommand::Dispatch {
            node: "0".to_string(),
            event: "onPress".to_string(),
            args: vec![],
        });

        loop {
            if let ServerMessage::HostEvent { event } = next(&mut rx).await {
                assert!(matches!(event, pagelet_sandbox::HostEvent::Redirect { ref slug, .. } if slug == "about"));
                break;
            }
        }
    }
}
