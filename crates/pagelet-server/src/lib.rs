//! Live preview server for pagelet pages.
//!
//! Each websocket connection is an editing session: the browser sends source
//! edits and interactions, the session's preview controller runs them in
//! the sandbox, and the rendered surface comes back as HTML.

pub mod html;
pub mod server;
pub mod session;
pub mod watcher;
pub mod websocket;

pub use html::{render_tree, Templates, PLACEHOLDER};
pub use server::{LiveServer, LiveServerConfig, ServerError};
pub use session::{Session, SessionCommand, SessionConfig};
pub use watcher::{PageWatcher, WatchEvent};
pub use websocket::{ClientMessage, PageChange, PageHub, ServerMessage};
