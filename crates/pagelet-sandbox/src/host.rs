//! Side effects requested by sandboxed code.
//!
//! Capabilities never perform navigation or I/O themselves; they record a
//! [`HostEvent`] that the embedding application drains and acts on.

use serde::{Deserialize, Serialize};

/// A side effect requested by sandboxed code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    /// `redirectTo(slug, params)` or `props.navigation.navigate(slug, params)`
    Redirect {
        slug: String,
        params: serde_json::Value,
    },

    /// `Alert.alert(title, message, buttons)`
    Alert {
        title: String,
        message: String,
        buttons: Vec<String>,
    },

    /// `Linking.openURL(url)`
    OpenUrl { url: String },

    /// `Keyboard.dismiss()`
    KeyboardDismiss,

    /// `console.*`
    Log { level: LogLevel, message: String },
}

/// Console method that produced a log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}
