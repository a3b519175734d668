//! Behaviour plugins - named units of module behaviour
//!
//! The five plugin variants share one struct; the variant-specific parts
//! (event kind, literal admin command vs regex) live in [`PluginKind`] and
//! [`Matcher`]. Enable/disable and invocation are driven by the registry,
//! since both may need to open or close the plugin's source library.

use regex::Regex;

use banter_plugin_api::{EventKind, Locale, MessageCallback, OutputCallback};

use crate::library::{Library, LibraryId};

/// A typed callback resolved from a library's export table.
#[derive(Clone)]
pub(crate) enum Callback {
    Message(MessageCallback),
    Output(OutputCallback),
}

/// The plugin variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginKind {
    /// First regex match wins; executed unconditionally once selected
    Simple,
    /// All matches run in registration order until one succeeds
    Complex,
    /// Like Complex, scoped to one event kind
    Event(EventKind),
    /// Exact command-token match; at most one ever runs
    Admin,
    /// Every match runs in sequence, each free to rewrite the line
    Output,
}

impl PluginKind {
    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Complex => "complex",
            Self::Event(_) => "event",
            Self::Admin => "admin",
            Self::Output => "output",
        }
    }
}

/// How incoming text selects this plugin.
#[derive(Debug)]
pub(crate) enum Matcher {
    /// Regex match against the event text
    Pattern(Regex),
    /// Exact match against the admin command token
    Command(String),
}

/// One registered behaviour unit, bound to the library that registered it.
pub struct Plugin {
    name: String,
    kind: PluginKind,
    source: LibraryId,
    symbol: String,
    matcher: Matcher,
    chance: u8,
    locale: Locale,
    enabled: bool,
    callback: Option<Callback>,
}

impl Plugin {
    /// Construct a pattern-matched plugin (every variant but Admin).
    ///
    /// `chance` is clamped into 0..=100; out-of-range input is never
    /// rejected. Fails only on an invalid pattern.
    pub(crate) fn new(
        kind: PluginKind,
        source: LibraryId,
        name: &str,
        symbol: &str,
        pattern: &str,
        chance: i32,
        locale: Locale,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.to_string(),
            kind,
            source,
            symbol: symbol.to_string(),
            matcher: Matcher::Pattern(Regex::new(pattern)?),
            chance: chance.clamp(0, 100) as u8,
            locale,
            enabled: false,
            callback: None,
        })
    }

    /// Construct an admin plugin. The command token is matched exactly and
    /// admin plugins always pass the chance gate.
    pub(crate) fn new_admin(
        source: LibraryId,
        name: &str,
        symbol: &str,
        command: &str,
        locale: Locale,
    ) -> Self {
        Self {
            name: name.to_string(),
            kind: PluginKind::Admin,
            source,
            symbol: symbol.to_string(),
            matcher: Matcher::Command(command.to_string()),
            chance: 100,
            locale,
            enabled: false,
            callback: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> PluginKind {
        self.kind
    }

    pub fn source(&self) -> LibraryId {
        self.source
    }

    pub fn chance(&self) -> u8 {
        self.chance
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Whether the event text selects this plugin (pattern variants only).
    pub(crate) fn matches_text(&self, text: &str) -> bool {
        match &self.matcher {
            Matcher::Pattern(regex) => regex.is_match(text),
            Matcher::Command(_) => false,
        }
    }

    /// Whether an admin command token selects this plugin.
    pub(crate) fn matches_command(&self, command: &str) -> bool {
        match &self.matcher {
            Matcher::Command(cmd) => cmd == command,
            Matcher::Pattern(_) => false,
        }
    }

    /// Re-resolve the callback from the source library's export table.
    /// Needed whenever the library has been reloaded, since a reload
    /// rebuilds the table.
    pub(crate) fn refresh_callback(&mut self, library: &Library) -> bool {
        self.callback = library.export(&self.symbol);
        self.callback.is_some()
    }

    /// Forget the resolved callback. Called whenever the source library is
    /// closed; the callback's code is about to be unmapped.
    pub(crate) fn clear_callback(&mut self) {
        self.callback = None;
    }

    /// Whether a callback is currently resolved from the source library.
    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    /// Snapshot what an invocation needs, or `None` if this plugin cannot
    /// run right now (disabled, unresolved, or wrong callback shape).
    pub(crate) fn message_call(&self) -> Option<(String, LibraryId, MessageCallback)> {
        if !self.enabled {
            return None;
        }
        match &self.callback {
            Some(Callback::Message(cb)) => Some((self.name.clone(), self.source, cb.clone())),
            _ => None,
        }
    }

    /// Snapshot for an output invocation; same rules as [`Plugin::message_call`].
    pub(crate) fn output_call(&self) -> Option<(String, LibraryId, OutputCallback)> {
        if !self.enabled {
            return None;
        }
        match &self.callback {
            Some(Callback::Output(cb)) => Some((self.name.clone(), self.source, cb.clone())),
            _ => None,
        }
    }

    /// The event kind this plugin responds to, for Event plugins.
    pub(crate) fn event_kind(&self) -> Option<EventKind> {
        match self.kind {
            PluginKind::Event(kind) => Some(kind),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plugin_with_chance(chance: i32) -> Plugin {
        Plugin::new(
            PluginKind::Simple,
            LibraryId(0),
            "test",
            "test_cb",
            ".*",
            chance,
            Locale::Any,
        )
        .unwrap()
    }

    #[test]
    fn test_chance_is_clamped() {
        assert_eq!(plugin_with_chance(-5).chance(), 0);
        assert_eq!(plugin_with_chance(0).chance(), 0);
        assert_eq!(plugin_with_chance(42).chance(), 42);
        assert_eq!(plugin_with_chance(100).chance(), 100);
        assert_eq!(plugin_with_chance(250).chance(), 100);
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let result = Plugin::new(
            PluginKind::Complex,
            LibraryId(0),
            "broken",
            "cb",
            "([unclosed",
            100,
            Locale::Any,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_pattern_matching() {
        let plugin = Plugin::new(
            PluginKind::Complex,
            LibraryId(0),
            "rah",
            "cb",
            "^rah",
            100,
            Locale::Any,
        )
        .unwrap();
        assert!(plugin.matches_text("rah rah"));
        assert!(!plugin.matches_text("hurrah"));
        assert!(!plugin.matches_command("rah"));
    }

    #[test]
    fn test_admin_matches_command_exactly() {
        let plugin = Plugin::new_admin(LibraryId(0), "status plugin", "cb", "status", Locale::Any);
        assert!(plugin.matches_command("status"));
        assert!(!plugin.matches_command("statusx"));
        assert!(!plugin.matches_text("status"));
        assert_eq!(plugin.chance(), 100);
    }

    #[test]
    fn test_disabled_plugin_has_no_call() {
        let plugin = plugin_with_chance(100);
        assert!(!plugin.is_enabled());
        assert!(plugin.message_call().is_none());
    }
}
