//! Live preview server implementation.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use pagelet_sandbox::{ExecuteOptions, SandboxExecutor, SandboxLimits};
use pagelet_store::{JsonFileStore, PageStore};
use tower_http::services::ServeDir;

use crate::html::Templates;
use crate::session::{read_page, Session, SessionCommand, SessionConfig};
use crate::watcher::{PageWatcher, WatchEvent};
use crate::websocket::{live_client_script, ClientMessage, PageHub, ServerMessage};

/// Configuration for the live preview server.
#[derive(Debug, Clone)]
pub struct LiveServerConfig {
    /// Directory of `.jsx` page files
    pub pages_dir: PathBuf,

    /// Directory of stored page records
    pub store_dir: PathBuf,

    /// Port to listen on
    pub port: u16,

    /// Host to bind to
    pub host: String,

    /// Open browser on start
    pub open: bool,

    /// Limits for every session's sandbox
    pub limits: SandboxLimits,

    /// Values exposed to previewed pages
    pub options: ExecuteOptions,
}

impl Default for LiveServerConfig {
    fn default() -> Self {
        Self {
            pages_dir: PathBuf::from("pages"),
            store_dir: PathBuf::from(".pagelet/records"),
            port: 7878,
            host: "127.0.0.1".to_string(),
            open: true,
            limits: SandboxLimits::default(),
            options: ExecuteOptions::default(),
        }
    }
}

/// Errors that can occur with the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid address {0}")]
    InvalidAddress(String),

    #[error("Failed to bind to {0}: {1}")]
    BindError(SocketAddr, String),

    #[error("File watch error: {0}")]
    WatchError(String),
}

/// Shared server state.
struct ServerState {
    config: LiveServerConfig,
    hub: PageHub,
    templates: Templates,
    store: Arc<dyn PageStore>,
    sessions: AtomicU64,
}

impl ServerState {
    fn new(config: LiveServerConfig) -> Self {
        Self {
            store: Arc::new(JsonFileStore::new(&config.store_dir)),
            config,
            hub: PageHub::new(),
            templates: Templates::new(),
            sessions: AtomicU64::new(0),
        }
    }

    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            executor: SandboxExecutor::new(self.config.limits.clone(), self.config.options.clone()),
            store: Arc::clone(&self.store),
            pages_dir: self.config.pages_dir.clone(),
        }
    }
}

/// Live preview server.
pub struct LiveServer {
    config: LiveServerConfig,
}

impl LiveServer {
    /// Create a new live preview server.
    pub fn new(config: LiveServerConfig) -> Self {
        Self { config }
    }

    /// Start the server and run until it fails.
    pub async fn start(self) -> Result<(), ServerError> {
        let address = format!("{}:{}", self.config.host, self.config.port);
        let addr: SocketAddr = address
            .parse()
            .map_err(|_| ServerError::InvalidAddress(address))?;

        let state = Arc::new(ServerState::new(self.config.clone()));

        let (watcher, mut rx) = PageWatcher::new(&self.config.pages_dir)
            .map_err(|e| ServerError::WatchError(e.to_string()))?;

        let watch_state = Arc::clone(&state);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                handle_watch_event(&watch_state, event);
            }
            // Keep watcher alive
            drop(watcher);
        });

        let app = router(state);

        tracing::info!("Starting live preview at http://{}", addr);

        if self.config.open {
            let url = format!("http://{}", addr);
            let _ = open::that(&url);
        }

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(addr, e.to_string()))?;

        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::BindError(addr, e.to_string()))?;

        Ok(())
    }
}

fn router(state: Arc<ServerState>) -> Router {
    let records = ServeDir::new(&state.config.store_dir);
    Router::new()
        .route("/", get(index_handler))
        .route("/__live", get(ws_handler))
        .route("/__live.js", get(live_script_handler))
        .nest_service("/records", records)
        .with_state(state)
}

/// Push external page edits to sessions.
fn handle_watch_event(state: &ServerState, event: WatchEvent) {
    match event {
        WatchEvent::PageChanged(path) => {
            tracing::info!("Page modified: {}", path.display());
            if let Some(change) = read_page(&path) {
                state.hub.send(change);
            }
        }
        WatchEvent::PageRemoved(path) => {
            tracing::info!("Page removed: {}", path.display());
        }
    }
}

/// Handler for the editor shell.
async fn index_handler(State(state): State<Arc<ServerState>>) -> Response {
    match state.templates.shell("pagelet") {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::warn!("Failed to render shell: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Handler for the live client script.
async fn live_script_handler() -> impl IntoResponse {
    let script = live_client_script("/__live");
    ([("content-type", "application/javascript")], script)
}

/// Handler for the live WebSocket endpoint.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Run one editing session for the lifetime of a socket.
async fn handle_ws(mut socket: WebSocket, state: Arc<ServerState>) {
    let id = state.sessions.fetch_add(1, Ordering::Relaxed) + 1;
    let (session, mut updates) = match Session::spawn(&id.to_string(), state.session_config()) {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!("Failed to start session {}: {}", id, e);
            return;
        }
    };
    let mut changes = state.hub.subscribe();
    tracing::debug!("Session {} connected", id);

    if !send_json(&mut socket, &ServerMessage::Connected).await {
        return;
    }

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                let Some(Ok(message)) = incoming else { break };
                let text = match message {
                    Message::Text(text) => text,
                    Message::Close(_) => break,
                    _ => continue,
                };
                match serde_json::from_str::<ClientMessage>(text.as_str()) {
                    Ok(message) => {
                        if !session.send(command_for(message)) {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!("Ignoring malformed message: {}", e),
                }
            }
            update = updates.recv() => {
                let Some(update) = update else { break };
                if !send_json(&mut socket, &update).await {
                    break;
                }
            }
            change = changes.recv() => {
                if let Ok(change) = change {
                    session.send(SessionCommand::PageChanged(change));
                }
            }
        }
    }

    tracing::debug!("Session {} disconnected", id);
}

fn command_for(message: ClientMessage) -> SessionCommand {
    match message {
        ClientMessage::SetSource { source } => SessionCommand::SetSource(source),
        ClientMessage::Regenerate => SessionCommand::Regenerate,
        ClientMessage::Dispatch { node, event, args } => SessionCommand::Dispatch { node, event, args },
        ClientMessage::Open { slug } => SessionCommand::Open(slug),
        ClientMessage::Save {
            slug,
            title,
            published,
        } => SessionCommand::Save {
            slug,
            title,
            published,
        },
    }
}

async fn send_json(socket: &mut WebSocket, message: &ServerMessage) -> bool {
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!("Failed to encode message: {}", e);
            return true;
        }
    };
    socket.send(Message::Text(json.into())).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn creates_server_with_default_config() {
        let server = LiveServer::new(LiveServerConfig::default());
        assert_eq!(server.config.port, 7878);
        assert_eq!(server.config.limits.max_steps, 5_000_000);
    }

    #[test]
    fn maps_client_messages_to_commands() {
        assert_eq!(
            command_for(ClientMessage::SetSource {
                source: "return null;".to_string()
            }),
            SessionCommand::SetSource("return null;".to_string())
        );
        assert_eq!(
            command_for(ClientMessage::Open {
                slug: "home".to_string()
            }),
            SessionCommand::Open("home".to_string())
        );
    }

    #[tokio::test]
    async fn serves_shell() {
        let state = Arc::new(ServerState::new(LiveServerConfig::default()));
        let response = index_handler(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.contains("/__live.js"));
    }

    #[tokio::test]
    async fn rejects_invalid_address() {
        let server = LiveServer::new(LiveServerConfig {
            host: "not an address".to_string(),
            open: false,
            ..LiveServerConfig::default()
        });
        assert!(matches!(server.start().await, Err(ServerError::InvalidAddress(_))));
    }

    #[tokio::test]
    async fn external_edits_reach_subscribers() {
        let dir = tempfile::tempdir().unwrap();
        let page = dir.path().join("home.jsx");
        std::fs::write(&page, "---\ntitle: Home\n---\nreturn null;\n").unwrap();

        let state = ServerState::new(LiveServerConfig {
            pages_dir: dir.path().to_path_buf(),
            ..LiveServerConfig::default()
        });
        let mut rx = state.hub.subscribe();
        handle_watch_event(&state, WatchEvent::PageChanged(page));

        let change = rx.recv().await.unwrap();
        assert_eq!(change.slug, "home");
        assert_eq!(change.title, "Home");
    }
}
