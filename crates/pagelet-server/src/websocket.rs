//! Live preview wire protocol and page change broadcasting.

use pagelet_preview::{PreviewError, PreviewState};
use pagelet_sandbox::HostEvent;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Messages an editor sends over the live socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// The editor content changed
    SetSource { source: String },

    /// Discard component state and mount again
    Regenerate,

    /// An interaction on a rendered node
    Dispatch {
        node: String,
        event: String,
        #[serde(default)]
        args: Vec<serde_json::Value>,
    },

    /// Load a page into the editor
    Open { slug: String },

    /// Compile the current source and store it
    Save {
        slug: String,
        title: String,
        #[serde(default)]
        published: bool,
    },
}

/// Messages the server sends over the live socket.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection established
    Connected,

    /// The preview surface to display
    Preview {
        state: PreviewState,
        generation: u64,
        html: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<PreviewError>,
    },

    /// A page was loaded into the session, from `open` or an external edit
    Opened {
        slug: String,
        title: String,
        source: String,
    },

    Saved {
        slug: String,
        registry_version: u32,
    },

    SaveFailed {
        slug: String,
        message: String,
    },

    /// A side effect requested by the previewed page
    HostEvent { event: HostEvent },
}

/// A page file changed on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct PageChange {
    pub slug: String,
    pub title: String,
    pub source: String,
}

/// Broadcasts page changes to every open session.
#[derive(Debug, Clone)]
pub struct PageHub {
    sender: broadcast::Sender<PageChange>,
}

impl PageHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }

    /// Send a change to all sessions.
    pub fn send(&self, change: PageChange) {
        // No sessions is fine
        let _ = self.sender.send(change);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PageChange> {
        self.sender.subscribe()
    }

    /// Get the number of connected sessions.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for PageHub {
    fn default() -> Self {
        Self::new()
    }
}

/// The client side of the live socket.
///
/// Wires the editor textarea, the preview pane and the page controls in the
/// shell to the socket at `ws_path`. Interactions on rendered nodes are
/// sent back as `dispatch` messages; nothing from the page runs in the
/// browser.
pub fn live_client_script(ws_path: &str) -> String {
    format!(
        r#"
(function() {{
  'use strict';

  const url = (location.protocol === 'https:' ? 'wss://' : 'ws://') + location.host + '{ws_path}';
  const editor = document.getElementById('editor');
  const preview = document.getElementById('preview');
  const status = document.getElementById('status');
  const slugInput = document.getElementById('slug');
  const titleInput = document.getElementById('title');
  const publishedInput = document.getElementById('published');
  let ws;
  let pending = null;
  let reconnectAttempts = 0;

  function send(msg) {{
    if (ws && ws.readyState === WebSocket.OPEN) {{
      ws.send(JSON.stringify(msg));
    }}
  }}

  function flushSource() {{
    pending = null;
    send({{ type: 'set_source', source: editor.value }});
  }}

  function eventsOf(el) {{
    return (el.dataset.events || '').split(' ');
  }}

  function connect() {{
    ws = new WebSocket(url);

    ws.onopen = function() {{
      reconnectAttempts = 0;
      status.textContent = 'Connected';
      flushSource();
    }};

    ws.onmessage = function(event) {{
      const msg = JSON.parse(event.data);
      switch (msg.type) {{
        case 'preview':
          preview.innerHTML = msg.html;
          preview.dataset.state = msg.state;
          preview.dataset.generation = msg.generation;
          break;
        case 'opened':
          editor.value = msg.source;
          slugInput.value = msg.slug;
          titleInput.value = msg.title;
          status.textContent = 'Opened ' + msg.slug;
          break;
        case 'saved':
          status.textContent = 'Saved ' + msg.slug;
          break;
        case 'save_failed':
          status.textContent = 'Save failed: ' + msg.message;
          break;
        case 'host_event':
          console.log('[pagelet]', msg.event);
          if (msg.event.type === 'alert') {{
            window.alert(msg.event.title + '\n' + msg.event.message);
          }} else if (msg.event.type === 'redirect') {{
            send({{ type: 'open', slug: msg.event.slug }});
          }} else if (msg.event.type === 'open_url') {{
            window.open(msg.event.url, '_blank', 'noopener');
          }}
          break;
      }}
    }};

    ws.onclose = function() {{
      status.textContent = 'Disconnected';
      if (reconnectAttempts < 10) {{
        reconnectAttempts++;
        setTimeout(connect, 1000 * reconnectAttempts);
      }}
    }};
  }}

  editor.addEventListener('input', function() {{
    if (pending) clearTimeout(pending);
    pending = setTimeout(flushSource, 150);
  }});

  document.getElementById('regenerate').addEventListener('click', function() {{
    send({{ type: 'regenerate' }});
  }});

  document.getElementById('open').addEventListener('click', function() {{
    send({{ type: 'open', slug: slugInput.value }});
  }});

  document.getElementById('save').addEventListener('click', function() {{
    send({{
      type: 'save',
      slug: slugInput.value,
      title: titleInput.value,
      published: publishedInput.checked
    }});
  }});

  preview.addEventListener('click', function(e) {{
    const el = e.target.closest('[data-node]');
    if (el && eventsOf(el).includes('onPress')) {{
      send({{ type: 'dispatch', node: el.dataset.node, event: 'onPress', args: [] }});
    }}
  }});

  preview.addEventListener('input', function(e) {{
    const el = e.target;
    if (el.dataset && eventsOf(el).includes('onChangeText')) {{
      send({{ type: 'dispatch', node: el.dataset.node, event: 'onChangeText', args: [el.value] }});
    }}
  }});

  preview.addEventListener('keydown', function(e) {{
    const el = e.target;
    if (e.key === 'Enter' && el.dataset && eventsOf(el).includes('onSubmitEditing')) {{
      send({{ type: 'dispatch', node: el.dataset.node, event: 'onSubmitEditing', args: [] }});
    }}
  }});

  connect();
}})();
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagelet_preview::Stage;
    use pretty_assertions::assert_eq;

    #[test]
    fn hub_broadcasts_changes() {
        let hub = PageHub::new();
        let mut rx = hub.subscribe();

        hub.send(PageChange {
            slug: "home".to_string(),
            title: "Home".to_string(),
            source: "return null;".to_string(),
        });

        match rx.try_recv() {
            Ok(change) => assert_eq!(change.slug, "home"),
            other => panic!("Expected a page change, got {other:?}"),
        }
    }

    #[test]
    fn parses_client_messages() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"dispatch","node":"0.1","event":"onPress"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Dispatch {
                node: "0.1".to_string(),
                event: "onPress".to_string(),
                args: vec![],
            }
        );

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"regenerate"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Regenerate);
    }

    #[test]
    fn serializes_preview_errors() {
        let msg = ServerMessage::Preview {
            state: PreviewState::Failed,
            generation: 2,
            html: String::new(),
            error: Some(PreviewError {
                stage: Stage::Transpile,
                message: "SyntaxError: Unexpected token (1:8)".to_string(),
            }),
        };

        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            serde_json::json!({
                "type": "preview",
                "state": "failed",
                "generation": 2,
                "html": "",
                "error": { "stage": "transpile", "message": "SyntaxError: Unexpected token (1:8)" }
            })
        );
    }

    #[test]
    fn client_script_targets_socket_path() {
        let script = live_client_script("/__live");
        assert!(script.contains("location.host + '/__live'"));
        assert!(script.contains("set_source"));
    }
}
