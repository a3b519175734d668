//! Module metadata and the shared enums used across the plugin API

use serde::{Deserialize, Serialize};

use crate::API_VERSION;

/// Module manifest containing metadata about the module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleManifest {
    /// Module name (used in logs and diagnostics)
    pub name: String,
    /// Module version (semver)
    pub version: String,
    /// API version this module was built against
    pub api_version: u32,
    /// Human-readable description
    pub description: String,
    /// Module author
    pub author: String,
}

impl Default for ModuleManifest {
    fn default() -> Self {
        Self {
            name: String::new(),
            version: "0.0.0".to_string(),
            api_version: API_VERSION,
            description: String::new(),
            author: String::new(),
        }
    }
}

/// The active response locale filter.
///
/// Plugins and phrase pools are tagged with a locale; `Any` acts as a
/// wildcard that matches whatever locale the host is running in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    /// Wildcard - matches any active locale
    Any,
    /// English
    En,
    /// French
    Fr,
    /// Dutch
    Nl,
}

impl Locale {
    /// Parse a short locale code. Unrecognized codes are rejected with `None`.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "any" => Some(Self::Any),
            "en" => Some(Self::En),
            "fr" => Some(Self::Fr),
            "nl" => Some(Self::Nl),
            _ => None,
        }
    }

    /// The short code for this locale, as used in pool paths and configs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::En => "en",
            Self::Fr => "fr",
            Self::Nl => "nl",
        }
    }
}

/// The kind of channel event an event plugin responds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Join,
    Nick,
    Quit,
    Part,
    Split,
    /// Produced for unrecognized tags at registration time; no real event
    /// ever carries this kind, so such a plugin can never match.
    Unknown,
}

impl EventKind {
    /// Parse the textual tag a module supplies at registration time.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "join" => Self::Join,
            "nick" => Self::Nick,
            "quit" => Self::Quit,
            "part" => Self::Part,
            "split" => Self::Split,
            _ => Self::Unknown,
        }
    }
}

/// Log levels for [`crate::Host::log`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

/// Arguments delivered to simple, complex, event and admin callbacks.
///
/// For admin plugins, `text` holds the remainder of the command line after
/// the command word.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    /// Nick that triggered the event
    pub nick: String,
    /// Hostmask of the nick
    pub host: String,
    /// Handle (account name) of the nick
    pub handle: String,
    /// Channel the event happened in
    pub channel: String,
    /// Event text (message body, quit reason, new nick, ...)
    pub text: String,
}

impl MessageEvent {
    pub fn new(nick: &str, host: &str, handle: &str, channel: &str, text: &str) -> Self {
        Self {
            nick: nick.to_string(),
            host: host.to_string(),
            handle: handle.to_string(),
            channel: channel.to_string(),
            text: text.to_string(),
        }
    }
}

/// Arguments delivered to output callbacks alongside the mutable line.
#[derive(Debug, Clone)]
pub struct OutputEvent {
    /// Nick the output is addressed to
    pub nick: String,
    /// Channel the output is going to
    pub channel: String,
    /// Additional free-form text passed through the output pipeline
    pub more_text: String,
}
