//! The engine - the embedding host's handle on the whole system
//!
//! One application thread drives the event entry points synchronously;
//! one background thread polls the timer list. A single coarse mutex
//! around the registry serializes the two, and every plugin or timer
//! callback runs with that lock held, receiving the registry itself as
//! its host context.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use banter_plugin_api::{EventKind, Host, MessageEvent, TimerCallback};

use crate::error::EngineError;
use crate::output::MessageSink;
use crate::registry::Registry;
use crate::settings::Settings;

/// Config file consulted when `init` is given no explicit path.
pub const DEFAULT_CONFIG: &str = "banter.toml";

/// Fixed token that opens an admin command line.
const ADMIN_PREFIX: &str = "!bmadmin";

/// State shared between the application thread and the timer thread.
pub(crate) struct EngineShared {
    registry: Mutex<Registry>,
}

impl EngineShared {
    pub(crate) fn lock_registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The plugin hosting and dispatch engine.
///
/// Dropping the engine discards all pending timers; the checking thread
/// notices the empty list on its next pass and exits on its own.
pub struct Engine {
    shared: Arc<EngineShared>,
}

impl Engine {
    /// Build an engine around existing settings, without touching the
    /// disk. The embedding host loads libraries and arms timers itself.
    pub fn with_settings(settings: Settings) -> Self {
        let shared = Arc::new_cyclic(|weak: &Weak<EngineShared>| {
            let mut registry = Registry::new(settings);
            registry.set_shared(weak.clone());
            EngineShared {
                registry: Mutex::new(registry),
            }
        });
        Self { shared }
    }

    /// Full initialisation: load the config (explicit path, else
    /// [`DEFAULT_CONFIG`]), sweep the plugin directory, and arm the
    /// built-in mood-drift and pool-sweep ticks. Fails if the config is
    /// bad or no module library loads.
    pub fn init(config: Option<&Path>) -> Result<Self, EngineError> {
        let settings = match config {
            Some(path) => Settings::load(path)?,
            None => Settings::load(Path::new(DEFAULT_CONFIG))?,
        };
        let engine = Self::with_settings(settings);
        {
            let mut registry = engine.lock();
            registry.kill_timers();
            if registry.load_plugin_dir() == 0 {
                tracing::error!("failed to load any useable plugins");
                return Err(EngineError::NoPluginsLoaded {
                    path: registry.settings().plugin_path().to_path_buf(),
                });
            }
            registry.arm_builtin_timers();
        }
        Ok(engine)
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.shared.lock_registry()
    }

    /// Replace the outward delivery sink.
    pub fn set_sink(&self, sink: Box<dyn MessageSink>) {
        self.lock().set_sink(sink);
    }

    // ─── Event entry points ──────────────────────────────────────────

    /// Someone joined a channel.
    pub fn on_join(&self, nick: &str, host: &str, handle: &str, channel: &str) -> bool {
        let mut registry = self.lock();
        if !registry.settings().is_channel_allowed(channel) {
            return false;
        }
        let event = MessageEvent::new(nick, host, handle, channel, "");
        dispatch_event(&mut registry, EventKind::Join, &event)
    }

    /// Someone left a channel.
    pub fn on_part(&self, nick: &str, host: &str, handle: &str, channel: &str, msg: &str) -> bool {
        let mut registry = self.lock();
        if !registry.settings().is_channel_allowed(channel) {
            return false;
        }
        let event = MessageEvent::new(nick, host, handle, channel, msg);
        dispatch_event(&mut registry, EventKind::Part, &event)
    }

    /// Someone quit.
    pub fn on_quit(
        &self,
        nick: &str,
        host: &str,
        handle: &str,
        channel: &str,
        reason: &str,
    ) -> bool {
        let mut registry = self.lock();
        if !registry.settings().is_channel_allowed(channel) {
            return false;
        }
        let event = MessageEvent::new(nick, host, handle, channel, reason);
        dispatch_event(&mut registry, EventKind::Quit, &event)
    }

    /// Someone changed nick.
    pub fn on_nick_change(
        &self,
        nick: &str,
        host: &str,
        handle: &str,
        channel: &str,
        newnick: &str,
    ) -> bool {
        let mut registry = self.lock();
        if !registry.settings().is_channel_allowed(channel) {
            return false;
        }
        let event = MessageEvent::new(nick, host, handle, channel, newnick);
        dispatch_event(&mut registry, EventKind::Nick, &event)
    }

    /// A channel mode changed. Recognized but never handled.
    pub fn on_mode_change(
        &self,
        _nick: &str,
        _host: &str,
        _handle: &str,
        channel: &str,
        _mode: &str,
        _victim: &str,
    ) -> bool {
        let registry = self.lock();
        if !registry.settings().is_channel_allowed(channel) {
            return false;
        }
        false
    }

    /// A CTCP ACTION in a channel; runs the complex chain only.
    pub fn on_action(&self, nick: &str, host: &str, handle: &str, dest: &str, text: &str) -> bool {
        let mut registry = self.lock();
        if !registry.settings().is_channel_allowed(dest) {
            return false;
        }
        let processed = collapse_spaces(text.trim());
        let event = MessageEvent::new(nick, host, handle, dest, &processed);
        for index in registry.find_complex(&processed) {
            if registry.run_message_plugin(index, &event) {
                break;
            }
        }
        true
    }

    /// A normal channel message: the admin command path, then at most one
    /// simple plugin, then the complex chain.
    pub fn on_main_message(
        &self,
        nick: &str,
        host: &str,
        handle: &str,
        channel: &str,
        text: &str,
    ) -> bool {
        tracing::debug!(channel = %channel, "entering main message dispatch");
        let mut registry = self.lock();
        if !registry.settings().is_channel_allowed(channel) {
            return false;
        }
        let text = text.trim();

        if let Some(rest) = admin_remainder(text) {
            let rest = rest.trim();
            if rest.is_empty() {
                return true;
            }
            let (command, remainder) = match rest.split_once(' ') {
                Some((command, remainder)) => (command, remainder.trim()),
                None => (rest, ""),
            };
            // rehash is built in and shadows any registered admin command
            if command == "rehash" && remainder.is_empty() {
                return registry.rehash();
            }
            if let Some(index) = registry.find_admin(command) {
                let event = MessageEvent::new(nick, host, handle, channel, remainder);
                return registry.run_message_plugin(index, &event);
            }
            return true;
        }

        if let Some(index) = registry.find_simple(text) {
            let event = MessageEvent::new(nick, host, handle, channel, text);
            registry.run_message_plugin(index, &event);
        }

        let event = MessageEvent::new(nick, host, handle, channel, text);
        for index in registry.find_complex(text) {
            if registry.run_message_plugin(index, &event) {
                break;
            }
        }
        true
    }

    // ─── Host-level API ──────────────────────────────────────────────

    /// Schedule a one-shot callback after `delay_ms` milliseconds.
    pub fn add_timer(&self, delay_ms: u64, callback: TimerCallback) -> bool {
        self.lock().add_timer(delay_ms, callback)
    }

    /// Emit a response line through the output pipeline.
    pub fn do_action(
        &self,
        channel: Option<&str>,
        nick: &str,
        text: &str,
        more_text: &str,
        urgent: bool,
    ) -> bool {
        self.lock().do_action(channel, nick, text, more_text, urgent)
    }

    /// Full unload-and-reload of every non-active plugin library.
    pub fn rehash(&self) -> bool {
        self.lock().rehash()
    }

    /// Switch the active locale and reload everything.
    pub fn use_locale(&self, code: &str) -> bool {
        self.lock().use_locale(code)
    }

    /// Log a status report of settings and registry.
    pub fn status(&self) {
        self.lock().status();
    }

    /// Store an ad-hoc string value, scoped process-wide.
    pub fn set(&self, key: &str, value: &str) {
        self.lock().set_value(key, value);
    }

    /// Read back an ad-hoc string value.
    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().get_value(key)
    }

    /// Create a named mood.
    pub fn mood_create(&self, name: &str, target: i32, lower: i32, upper: i32) -> bool {
        self.lock().mood_create(name, target, lower, upper)
    }

    pub fn mood_increase(&self, name: &str, amount: i32) -> bool {
        self.lock().mood_increase(name, amount)
    }

    pub fn mood_decrease(&self, name: &str, amount: i32) -> bool {
        self.lock().mood_decrease(name, amount)
    }

    pub fn mood_value(&self, name: &str) -> i32 {
        self.lock().mood_value(name)
    }

    /// Register a named phrase pool.
    pub fn abstract_register(&self, pool: &str) -> bool {
        self.lock().abstract_register(pool)
    }

    /// Append phrases to a pool.
    pub fn abstract_batch_add(&self, pool: &str, phrases: &[&str]) -> bool {
        self.lock().abstract_batch_add(pool, phrases)
    }

    /// Fetch one random phrase from a pool.
    pub fn abstract_value(&self, pool: &str) -> Option<String> {
        self.lock().abstract_value(pool)
    }

    #[cfg(test)]
    pub(crate) fn registry(&self) -> MutexGuard<'_, Registry> {
        self.lock()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.lock().kill_timers();
    }
}

/// Run the matching event plugins in order, stopping at the first one
/// that reports success.
fn dispatch_event(registry: &mut Registry, kind: EventKind, event: &MessageEvent) -> bool {
    tracing::debug!(kind = ?kind, "dispatching event response");
    let matches = registry.find_event(kind, &event.text);
    if matches.is_empty() {
        return false;
    }
    for index in matches {
        if registry.run_message_plugin(index, event) {
            return true;
        }
    }
    false
}

/// The remainder after the admin prefix, if this line is an admin line.
fn admin_remainder(text: &str) -> Option<&str> {
    let rest = text.strip_prefix(ADMIN_PREFIX)?;
    if rest.is_empty() {
        return Some(rest);
    }
    rest.strip_prefix(' ')
}

fn collapse_spaces(text: &str) -> String {
    let mut out = text.to_string();
    while out.contains("  ") {
        out = out.replace("  ", " ");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::test_sink::MemorySink;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use banter_plugin_api::MessageCallback;

    fn engine_with_stub() -> Engine {
        let engine = Engine::with_settings(Settings::default());
        engine.registry().install_stub_library();
        engine
    }

    fn counting_callback(counter: Arc<AtomicUsize>, handled: bool) -> MessageCallback {
        Arc::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            handled
        })
    }

    #[test]
    fn test_complex_dispatch_scenario() {
        let engine = engine_with_stub();
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));
        let c = Arc::new(AtomicUsize::new(0));
        {
            let mut registry = engine.registry();
            registry.register_complex("A", "cb_a", "xyz", 100, "any", counting_callback(a.clone(), true));
            registry.register_complex("B", "cb_b", "^rah", 100, "any", counting_callback(b.clone(), true));
            registry.register_complex("C", "cb_c", ".*", 100, "any", counting_callback(c.clone(), true));
        }

        assert!(engine.on_main_message("nick", "host", "handle", "#test", "rah"));
        assert_eq!(a.load(Ordering::SeqCst), 0);
        assert_eq!(b.load(Ordering::SeqCst), 1);
        assert_eq!(c.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_simple_runs_before_complex() {
        let engine = engine_with_stub();
        let simple = Arc::new(AtomicUsize::new(0));
        let complex = Arc::new(AtomicUsize::new(0));
        {
            let mut registry = engine.registry();
            registry.register_simple(
                "greet simple",
                "simple_cb",
                "^hi",
                100,
                "any",
                counting_callback(simple.clone(), true),
            );
            registry.register_complex(
                "greet complex",
                "complex_cb",
                "^hi",
                100,
                "any",
                counting_callback(complex.clone(), true),
            );
        }

        engine.on_main_message("nick", "host", "handle", "#test", "hi there");
        // a successful simple run does not stop the complex chain
        assert_eq!(simple.load(Ordering::SeqCst), 1);
        assert_eq!(complex.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_admin_command_gets_remainder() {
        let engine = engine_with_stub();
        let seen: Arc<StdMutex<Vec<String>>> = Arc::new(StdMutex::new(Vec::new()));
        {
            let seen = seen.clone();
            engine.registry().register_admin(
                "status plugin",
                "status_cb",
                "status",
                "any",
                Arc::new(move |_, event| {
                    seen.lock().unwrap().push(event.text.clone());
                    true
                }),
            );
        }

        assert!(engine.on_main_message("nick", "host", "handle", "#test", "!bmadmin status"));
        assert_eq!(seen.lock().unwrap().as_slice(), ["".to_string()]);

        assert!(engine.on_main_message("nick", "host", "handle", "#test", "!bmadmin status all the things"));
        assert_eq!(seen.lock().unwrap().len(), 2);
        assert_eq!(seen.lock().unwrap()[1], "all the things");
    }

    #[test]
    fn test_admin_rehash_is_built_in() {
        let engine = engine_with_stub();
        let rehash_calls = Arc::new(AtomicUsize::new(0));
        {
            let mut registry = engine.registry();
            registry.register_admin(
                "rehash shadow",
                "rehash_cb",
                "rehash",
                "any",
                counting_callback(rehash_calls.clone(), true),
            );
            registry.clear_active_library();
        }

        // the built-in reload runs; the registered plugin is never consulted
        engine.on_main_message("nick", "host", "handle", "#test", "!bmadmin rehash");
        assert_eq!(rehash_calls.load(Ordering::SeqCst), 0);
        // the reload removed the stub library and its plugins
        assert_eq!(engine.registry().plugin_count(), 0);
    }

    #[test]
    fn test_admin_prefix_must_stand_alone() {
        let engine = engine_with_stub();
        let counter = Arc::new(AtomicUsize::new(0));
        {
            engine.registry().register_complex(
                "catchall",
                "catchall_cb",
                ".*",
                100,
                "any",
                counting_callback(counter.clone(), true),
            );
        }

        // not an admin line; dispatches normally
        engine.on_main_message("nick", "host", "handle", "#test", "!bmadminish");
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        // a bare prefix is an admin line that does nothing
        assert!(engine.on_main_message("nick", "host", "handle", "#test", "!bmadmin"));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_event_dispatch_scoped_to_kind() {
        let engine = engine_with_stub();
        let joins = Arc::new(AtomicUsize::new(0));
        {
            engine.registry().register_event(
                "join greeter",
                "join_cb",
                "join",
                ".*",
                100,
                "any",
                counting_callback(joins.clone(), true),
            );
        }

        assert!(engine.on_join("nick", "host", "handle", "#test"));
        assert!(!engine.on_quit("nick", "host", "handle", "#test", "bye"));
        assert_eq!(joins.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disallowed_channel_is_ignored() {
        let settings = Settings::from_toml("channels = [\"#home\"]").unwrap();
        let engine = Engine::with_settings(settings);
        engine.registry().install_stub_library();
        let counter = Arc::new(AtomicUsize::new(0));
        {
            engine.registry().register_complex(
                "catchall",
                "catchall_cb",
                ".*",
                100,
                "any",
                counting_callback(counter.clone(), true),
            );
        }

        assert!(!engine.on_main_message("nick", "host", "handle", "#elsewhere", "hello"));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert!(engine.on_main_message("nick", "host", "handle", "#home", "hello"));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_mode_change_is_never_handled() {
        let engine = engine_with_stub();
        assert!(!engine.on_mode_change("nick", "host", "handle", "#test", "+o", "victim"));
    }

    #[test]
    fn test_action_runs_complex_chain_with_collapsed_spaces() {
        let engine = engine_with_stub();
        let seen: Arc<StdMutex<Vec<String>>> = Arc::new(StdMutex::new(Vec::new()));
        {
            let seen = seen.clone();
            engine.registry().register_complex(
                "action watcher",
                "action_cb",
                "^waves",
                100,
                "any",
                Arc::new(move |_, event| {
                    seen.lock().unwrap().push(event.text.clone());
                    true
                }),
            );
        }

        assert!(engine.on_action("nick", "host", "handle", "#test", "  waves   at  everyone "));
        assert_eq!(seen.lock().unwrap().as_slice(), ["waves at everyone".to_string()]);
    }

    #[test]
    fn test_timer_fires_exactly_once() {
        let engine = Engine::with_settings(Settings::default());
        let fired = Arc::new(AtomicUsize::new(0));
        {
            let fired = fired.clone();
            assert!(engine.add_timer(
                50,
                Arc::new(move |_| {
                    fired.fetch_add(1, Ordering::SeqCst);
                }),
            ));
        }

        // wait out at least two poll cycles
        std::thread::sleep(Duration::from_millis(800));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(engine.registry().timer_count(), 0);
    }

    #[test]
    fn test_timer_callback_can_reschedule() {
        let engine = Engine::with_settings(Settings::default());
        let fired = Arc::new(AtomicUsize::new(0));
        {
            let fired = fired.clone();
            engine.add_timer(
                10,
                Arc::new(move |host| {
                    if fired.fetch_add(1, Ordering::SeqCst) == 0 {
                        let fired = fired.clone();
                        host.add_timer(
                            10,
                            Arc::new(move |_| {
                                fired.fetch_add(1, Ordering::SeqCst);
                            }),
                        );
                    }
                }),
            );
        }

        std::thread::sleep(Duration::from_millis(1200));
        assert_eq!(fired.load(Ordering::SeqCst), 2);
        assert_eq!(engine.registry().timer_count(), 0);
    }

    #[test]
    fn test_kill_timers_discards_pending() {
        let engine = Engine::with_settings(Settings::default());
        let fired = Arc::new(AtomicUsize::new(0));
        {
            let fired = fired.clone();
            engine.add_timer(
                60_000,
                Arc::new(move |_| {
                    fired.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }
        assert_eq!(engine.registry().timer_count(), 1);
        engine.registry().kill_timers();
        assert_eq!(engine.registry().timer_count(), 0);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_init_with_missing_config_fails() {
        let result = Engine::init(Some(Path::new("/nonexistent/banter.toml")));
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn test_init_with_empty_plugin_dir_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = dir.path().join("banter.toml");
        std::fs::write(
            &config,
            format!("plugins = {:?}", dir.path().to_str().unwrap()),
        )
        .unwrap();
        let result = Engine::init(Some(&config));
        assert!(matches!(result, Err(EngineError::NoPluginsLoaded { .. })));
    }

    #[test]
    fn test_output_plugin_transforms_response() {
        let engine = engine_with_stub();
        let sink = MemorySink::default();
        engine.set_sink(Box::new(sink.clone()));
        {
            let mut registry = engine.registry();
            registry.register_complex(
                "echo",
                "echo_cb",
                "^say ",
                100,
                "any",
                Arc::new(|host, event| {
                    let text = event.text.trim_start_matches("say ").to_string();
                    host.do_action(Some(&event.channel), &event.nick, &text, "", false)
                }),
            );
            registry.register_output(
                "shouty",
                "shouty_cb",
                ".*",
                100,
                "any",
                Arc::new(|_, _, line: &mut String| {
                    *line = line.to_uppercase();
                    true
                }),
            );
        }

        assert!(engine.on_main_message("nick", "host", "handle", "#test", "say hello world"));
        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "HELLO WORLD");
    }

    #[test]
    fn test_admin_prefix_requires_word_boundary() {
        assert_eq!(admin_remainder("!bmadmin"), Some(""));
        assert_eq!(admin_remainder("!bmadmin status"), Some("status"));
        assert_eq!(admin_remainder("!bmadminstatus"), None);
        assert_eq!(admin_remainder("hello"), None);
    }
}
