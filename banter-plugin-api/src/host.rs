//! The Host trait - a module's interface to the banter engine
//!
//! A `&mut dyn Host` is handed to every module `init`, every plugin
//! callback and every timer callback. It is the only way module code
//! touches host state; there are no process-wide globals to reach for.

use std::sync::Arc;

use crate::types::{LogLevel, MessageEvent, OutputEvent};

/// Callback for simple, complex, event and admin plugins.
///
/// Returns whether the plugin considers the event handled; the dispatch
/// loops use this to stop at the first success.
pub type MessageCallback = Arc<dyn Fn(&mut dyn Host, &MessageEvent) -> bool + Send + Sync>;

/// Callback for output plugins. May rewrite the line in place; the
/// rewritten line is what the next plugin in the chain (and ultimately
/// the sink) sees.
pub type OutputCallback = Arc<dyn Fn(&mut dyn Host, &OutputEvent, &mut String) -> bool + Send + Sync>;

/// One-shot timer callback.
pub type TimerCallback = Arc<dyn Fn(&mut dyn Host) + Send + Sync>;

/// The capability surface banter exposes to module code.
///
/// Registration calls are only meaningful while a library is active (module
/// init, or a callback executing on behalf of a library); outside of that
/// they fail and log a warning.
///
/// All registration calls succeed only if the plugin name is unique, the
/// locale code is recognized and matches the active locale (or is `"any"`),
/// and the resulting plugin enables immediately.
pub trait Host {
    // ─── Plugin registration ─────────────────────────────────────────

    /// Register a simple responder: first regex match wins, executed
    /// unconditionally once selected.
    fn register_simple(
        &mut self,
        name: &str,
        symbol: &str,
        pattern: &str,
        chance: i32,
        locale: &str,
        callback: MessageCallback,
    ) -> bool;

    /// Register a complex responder: all matches run in registration order
    /// until one reports success.
    fn register_complex(
        &mut self,
        name: &str,
        symbol: &str,
        pattern: &str,
        chance: i32,
        locale: &str,
        callback: MessageCallback,
    ) -> bool;

    /// Register an event responder for one event kind
    /// (`"join"`, `"nick"`, `"quit"`, `"part"`, `"split"`).
    fn register_event(
        &mut self,
        name: &str,
        symbol: &str,
        event: &str,
        pattern: &str,
        chance: i32,
        locale: &str,
        callback: MessageCallback,
    ) -> bool;

    /// Register an admin command; `command` is matched exactly against the
    /// command word after the admin prefix.
    fn register_admin(
        &mut self,
        name: &str,
        symbol: &str,
        command: &str,
        locale: &str,
        callback: MessageCallback,
    ) -> bool;

    /// Register an output rewriter; every matching output plugin runs in
    /// sequence over outbound lines.
    fn register_output(
        &mut self,
        name: &str,
        symbol: &str,
        pattern: &str,
        chance: i32,
        locale: &str,
        callback: OutputCallback,
    ) -> bool;

    // ─── Phrase pools ────────────────────────────────────────────────

    /// Register (create or load) a named phrase pool.
    fn abstract_register(&mut self, pool: &str) -> bool;

    /// Append phrases to a pool, in order. Duplicates are silently
    /// skipped; the call fails only if the pool is not registered.
    fn abstract_batch_add(&mut self, pool: &str, phrases: &[&str]) -> bool;

    /// Fetch one uniformly random phrase from a pool.
    fn abstract_value(&mut self, pool: &str) -> Option<String>;

    // ─── Timers ──────────────────────────────────────────────────────

    /// Schedule a one-shot callback after `delay_ms` milliseconds, owned by
    /// the active library.
    fn add_timer(&mut self, delay_ms: u64, callback: TimerCallback) -> bool;

    // ─── Moods ───────────────────────────────────────────────────────

    /// Create a named mood. Fails on duplicate names.
    fn mood_create(&mut self, name: &str, target: i32, lower: i32, upper: i32) -> bool;

    /// Nudge a mood up. Fails for unknown moods.
    fn mood_increase(&mut self, name: &str, amount: i32) -> bool;

    /// Nudge a mood down. Fails for unknown moods.
    fn mood_decrease(&mut self, name: &str, amount: i32) -> bool;

    /// Read a mood's current value; unknown moods read as 0.
    fn mood_value(&self, name: &str) -> i32;

    // ─── Output ──────────────────────────────────────────────────────

    /// Emit a response line through the output pipeline. `None` channel
    /// broadcasts to every configured non-silent channel.
    fn do_action(
        &mut self,
        channel: Option<&str>,
        nick: &str,
        text: &str,
        more_text: &str,
        urgent: bool,
    ) -> bool;

    // ─── Host state ──────────────────────────────────────────────────

    /// Store an ad-hoc string value, scoped process-wide.
    fn set_value(&mut self, key: &str, value: &str);

    /// Read back an ad-hoc string value.
    fn get_value(&self, key: &str) -> Option<String>;

    /// The configured (min, max) random response delay, in seconds.
    fn random_delay_range(&self) -> (u64, u64);

    /// Switch the active locale and reload all plugin libraries. Fails for
    /// unknown codes, `"any"`, or the already-active locale.
    fn use_locale(&mut self, code: &str) -> bool;

    /// Log a status report of the whole engine.
    fn status(&self);

    // ─── Logging ─────────────────────────────────────────────────────

    /// Route a message to the host log.
    fn log(&self, level: LogLevel, message: &str);

    fn log_error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    fn log_warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    fn log_info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    fn log_debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }
}
