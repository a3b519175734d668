//! The registry - single source of truth for libraries, plugins, timers,
//! moods and phrase pools
//!
//! The registry owns every other component and is the only thing with
//! lifetime authority over them. It also implements [`Host`], so module
//! init, plugin callbacks and timer callbacks all receive the registry
//! itself as their capability context; mutation from inside a callback
//! goes through the same `&mut` the dispatching code already holds, so
//! the engine's one coarse lock covers everything.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use rand::Rng;

use banter_plugin_api::{
    EventKind, Host, Locale, LogLevel, MessageCallback, MessageEvent, OutputCallback, OutputEvent,
    TimerCallback,
};

use crate::abstracts::Abstract;
use crate::engine::EngineShared;
use crate::library::{Library, LibraryId};
use crate::mood::Mood;
use crate::output::{ConsoleSink, MessageSink};
use crate::plugin::{Callback, Plugin, PluginKind};
use crate::sandbox;
use crate::timer::{Timer, TimerFn};

/// Interval between mood drift ticks.
pub(crate) const MOOD_DRIFT_INTERVAL: Duration = Duration::from_secs(1);

/// Interval between phrase-pool garbage collection sweeps.
pub(crate) const ABSTRACT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// The engine's component registry.
pub struct Registry {
    settings: crate::settings::Settings,
    /// Slot table; a removed library leaves a `None` hole so ids stay valid
    libraries: Vec<Option<Library>>,
    /// Registration order is dispatch order
    plugins: Vec<Plugin>,
    timers: Vec<Timer>,
    moods: Vec<Mood>,
    abstracts: HashMap<String, Abstract>,
    /// The library whose code is currently executing, if any
    active_library: Option<LibraryId>,
    timer_thread_running: bool,
    sink: Box<dyn MessageSink>,
    /// Back-reference to the engine, for starting the timer thread
    shared: Weak<EngineShared>,
}

impl Registry {
    pub fn new(settings: crate::settings::Settings) -> Self {
        Self {
            settings,
            libraries: Vec::new(),
            plugins: Vec::new(),
            timers: Vec::new(),
            moods: Vec::new(),
            abstracts: HashMap::new(),
            active_library: None,
            timer_thread_running: false,
            sink: Box::new(ConsoleSink),
            shared: Weak::new(),
        }
    }

    pub(crate) fn set_shared(&mut self, shared: Weak<EngineShared>) {
        self.shared = shared;
    }

    pub fn settings(&self) -> &crate::settings::Settings {
        &self.settings
    }

    pub fn set_sink(&mut self, sink: Box<dyn MessageSink>) {
        self.sink = sink;
    }

    pub(crate) fn send_line(&mut self, target: &str, text: &str) {
        self.sink.send(target, text);
    }

    /// Log a summary of everything the registry holds.
    pub fn dump(&self) {
        tracing::info!("--System");
        tracing::info!(
            count = self.libraries.iter().flatten().count(),
            "  libraries loaded"
        );
        let active = self.plugins.iter().filter(|p| p.is_enabled()).count();
        tracing::info!(
            total = self.plugins.len(),
            active,
            inactive = self.plugins.len() - active,
            "  plugins loaded"
        );
        tracing::info!(count = self.timers.len(), "  timers active");
        tracing::info!(count = self.moods.len(), "  moods active");
        tracing::info!(count = self.abstracts.len(), "  phrase pools");
    }

    // ─── Libraries ───────────────────────────────────────────────────

    pub fn library(&self, id: LibraryId) -> Option<&Library> {
        self.libraries.get(id.0).and_then(Option::as_ref)
    }

    fn library_mut(&mut self, id: LibraryId) -> Option<&mut Library> {
        self.libraries.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Load a module library from disk and run its init. Duplicate paths
    /// are rejected; a failed load leaves no trace in the registry.
    pub fn load_library(&mut self, path: &Path) -> bool {
        if self.libraries.iter().flatten().any(|l| l.path() == path) {
            return false;
        }
        let id = LibraryId(self.libraries.len());
        self.libraries.push(Some(Library::new(path)));
        let ok = self.open_library(id);
        if !ok {
            self.libraries[id.0] = None;
        }
        ok
    }

    /// Open a library: load the dylib, then run its module init inside the
    /// sandbox with this library active. No-op if already open.
    pub(crate) fn open_library(&mut self, id: LibraryId) -> bool {
        let Some(lib) = self.library_mut(id) else {
            return false;
        };
        if lib.is_open() {
            return true;
        }
        let path = lib.path().to_path_buf();
        if let Err(error) = lib.load_module() {
            tracing::error!(path = %path.display(), %error, "failed to load module library");
            lib.fail();
            return false;
        }
        let manifest = lib.manifest().unwrap_or_default();
        let Some(mut module) = lib.take_module() else {
            lib.fail();
            return false;
        };

        let prev = self.active_library;
        self.active_library = Some(id);
        let outcome = sandbox::protected("module init", || module.init(&mut *self));
        self.active_library = prev;

        match outcome {
            Ok(Ok(())) => {
                if let Some(lib) = self.library_mut(id) {
                    lib.store_module(module);
                    lib.set_loaded();
                }
                tracing::info!(
                    module = %manifest.name,
                    version = %manifest.version,
                    "module library loaded"
                );
                true
            }
            Ok(Err(error)) => {
                tracing::error!(path = %path.display(), %error, "module init failed");
                self.discard_failed_library(id, module);
                false
            }
            Err(_) => {
                tracing::error!(
                    path = %path.display(),
                    "library initialisation caused a serious error"
                );
                self.discard_failed_library(id, module);
                false
            }
        }
    }

    /// Roll back everything a failed init left behind. Plugins and timers
    /// registered by the library hold callbacks into its code and must go
    /// before the handle is released.
    fn discard_failed_library(&mut self, id: LibraryId, module: Box<dyn banter_plugin_api::Module>) {
        self.plugins.retain(|p| p.source() != id);
        self.timers.retain(|t| t.owner() != Some(id));
        drop(module);
        if let Some(lib) = self.library_mut(id) {
            lib.fail();
        }
    }

    /// Close a library: disable every plugin sourced from it (their
    /// callbacks are about to be unmapped), then release the handle.
    /// Idempotent.
    pub fn close_library(&mut self, id: LibraryId) -> bool {
        let Some(lib) = self.library_mut(id) else {
            return false;
        };
        if !lib.is_open() {
            return true;
        }
        lib.mark_unloaded();
        self.disable_library_plugins(id);
        if let Some(lib) = self.library_mut(id) {
            lib.release();
        }
        true
    }

    /// Disable every plugin sourced from a library and drop their resolved
    /// callbacks.
    pub fn disable_library_plugins(&mut self, id: LibraryId) -> bool {
        if self.library(id).is_none() {
            return false;
        }
        for plugin in &mut self.plugins {
            if plugin.source() == id {
                if plugin.is_enabled() {
                    tracing::debug!(plugin = %plugin.name(), "plugin disabled");
                }
                plugin.set_enabled(false);
                plugin.clear_callback();
            }
        }
        true
    }

    /// Remove every library, plugin and library-owned timer except those
    /// belonging to the currently-active library. The active library is
    /// spared so the module servicing a rehash doesn't destroy itself
    /// mid-call; ownerless timers (the built-in ticks) survive too.
    pub fn remove_all_libraries(&mut self) -> bool {
        let active = self.active_library;
        tracing::info!("cleaning plugins");
        self.plugins.retain(|plugin| {
            if Some(plugin.source()) == active {
                return true;
            }
            tracing::info!(plugin = %plugin.name(), "removing plugin");
            false
        });
        tracing::info!("cleaning timers");
        self.timers
            .retain(|timer| timer.owner().is_none() || timer.owner() == active);
        tracing::info!("cleaning libraries");
        for index in 0..self.libraries.len() {
            if Some(LibraryId(index)) == active {
                continue;
            }
            if let Some(mut lib) = self.libraries[index].take() {
                tracing::info!(path = %lib.path().display(), "removing library");
                lib.release();
            }
        }
        true
    }

    /// Sweep the configured plugin directory and load every module library
    /// in it. Returns how many loaded.
    pub fn load_plugin_dir(&mut self) -> usize {
        let dir = self.settings.plugin_path().to_path_buf();
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(error) => {
                tracing::warn!(dir = %dir.display(), %error, "could not open plugin directory");
                return 0;
            }
        };
        let mut candidates: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| is_module_library(path))
            .collect();
        candidates.sort();
        let mut loaded = 0;
        for path in candidates {
            tracing::info!(path = %path.display(), "trying to load module library");
            if self.load_library(&path) {
                loaded += 1;
            }
        }
        loaded
    }

    /// Full reload: unload everything except the active library, then
    /// sweep the plugin directory again.
    pub fn rehash(&mut self) -> bool {
        tracing::info!("rehashing");
        if !self.remove_all_libraries() {
            return false;
        }
        self.load_plugin_dir() > 0
    }

    // ─── Plugins ─────────────────────────────────────────────────────

    pub fn get_plugin(&self, name: &str) -> Option<&Plugin> {
        self.plugins.iter().find(|p| p.name() == name)
    }

    fn plugin_index(&self, name: &str) -> Option<usize> {
        self.plugins.iter().position(|p| p.name() == name)
    }

    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    /// Add a freshly constructed plugin and enable it; rejects duplicate
    /// names and rolls back if enabling fails.
    fn register_plugin(&mut self, plugin: Plugin) -> bool {
        let name = plugin.name().to_string();
        if self.get_plugin(&name).is_some() {
            tracing::warn!(plugin = %name, "duplicate plugin name");
            return false;
        }
        let kind = plugin.kind();
        self.plugins.push(plugin);
        let index = self.plugins.len() - 1;
        if !self.enable_plugin_at(index) {
            self.plugins.remove(index);
            return false;
        }
        tracing::info!(plugin = %name, kind = kind.label(), "registered plugin");
        true
    }

    pub fn enable_plugin(&mut self, name: &str) -> bool {
        let Some(index) = self.plugin_index(name) else {
            return false;
        };
        self.enable_plugin_at(index)
    }

    fn enable_plugin_at(&mut self, index: usize) -> bool {
        {
            let plugin = &self.plugins[index];
            if !self.settings.is_plugin_allowed(plugin.name()) {
                tracing::debug!(plugin = %plugin.name(), "plugin disallowed by configuration");
                return false;
            }
            if plugin.is_enabled() {
                return false;
            }
        }
        let source = self.plugins[index].source();
        let loaded = self.library(source).is_some_and(Library::is_loaded);
        if !loaded && !self.open_library(source) {
            return false;
        }
        let Some(lib) = self.libraries.get(source.0).and_then(Option::as_ref) else {
            return false;
        };
        let plugin = &mut self.plugins[index];
        if !plugin.refresh_callback(lib) {
            return false;
        }
        plugin.set_enabled(true);
        tracing::debug!(plugin = %plugin.name(), "plugin enabled");
        true
    }

    /// Disable a plugin. If its source library is loaded and no other
    /// enabled plugin still needs it, the library is closed, which clears
    /// the resolved callbacks of everything sourced from it.
    pub fn disable_plugin(&mut self, name: &str) -> bool {
        let Some(index) = self.plugin_index(name) else {
            return false;
        };
        if !self.plugins[index].is_enabled() {
            return false;
        }
        self.plugins[index].set_enabled(false);
        tracing::debug!(plugin = %name, "plugin disabled");
        let source = self.plugins[index].source();
        let loaded = self.library(source).is_some_and(Library::is_loaded);
        if loaded
            && !self
                .plugins
                .iter()
                .any(|p| p.source() == source && p.is_enabled())
        {
            self.close_library(source);
        }
        true
    }

    // ─── Selection ───────────────────────────────────────────────────

    fn locale_passes(&self, plugin: &Plugin) -> bool {
        plugin.locale() == Locale::Any || plugin.locale() == self.settings.locale()
    }

    fn chance_passes(chance: u8) -> bool {
        i32::from(chance) >= rand::thread_rng().gen_range(0..100)
    }

    /// First simple plugin that matches the text and wins its chance roll.
    pub(crate) fn find_simple(&self, text: &str) -> Option<usize> {
        for (index, plugin) in self.plugins.iter().enumerate() {
            if plugin.kind() != PluginKind::Simple {
                continue;
            }
            if !self.locale_passes(plugin) || !plugin.matches_text(text) {
                continue;
            }
            if !Self::chance_passes(plugin.chance()) {
                continue;
            }
            return Some(index);
        }
        None
    }

    /// Every complex plugin that matches, in registration order.
    pub(crate) fn find_complex(&self, text: &str) -> Vec<usize> {
        self.plugins
            .iter()
            .enumerate()
            .filter(|(_, plugin)| {
                plugin.kind() == PluginKind::Complex
                    && self.locale_passes(plugin)
                    && plugin.matches_text(text)
                    && Self::chance_passes(plugin.chance())
            })
            .map(|(index, _)| index)
            .collect()
    }

    /// Every event plugin of the given kind that matches.
    pub(crate) fn find_event(&self, kind: EventKind, text: &str) -> Vec<usize> {
        self.plugins
            .iter()
            .enumerate()
            .filter(|(_, plugin)| {
                plugin.event_kind() == Some(kind)
                    && self.locale_passes(plugin)
                    && plugin.matches_text(text)
                    && Self::chance_passes(plugin.chance())
            })
            .map(|(index, _)| index)
            .collect()
    }

    /// The admin plugin whose command token matches exactly, if any.
    pub(crate) fn find_admin(&self, command: &str) -> Option<usize> {
        for (index, plugin) in self.plugins.iter().enumerate() {
            if plugin.kind() != PluginKind::Admin {
                continue;
            }
            if !self.locale_passes(plugin) || !plugin.matches_command(command) {
                continue;
            }
            return Some(index);
        }
        None
    }

    /// Every output plugin that matches the outbound line.
    pub(crate) fn find_output(&self, text: &str) -> Vec<usize> {
        self.plugins
            .iter()
            .enumerate()
            .filter(|(_, plugin)| {
                plugin.kind() == PluginKind::Output
                    && self.locale_passes(plugin)
                    && plugin.matches_text(text)
                    && Self::chance_passes(plugin.chance())
            })
            .map(|(index, _)| index)
            .collect()
    }

    // ─── Invocation ──────────────────────────────────────────────────

    /// Run a message-shaped plugin inside the sandbox, with its source
    /// library active for the duration. A fault is logged and counts as a
    /// failed run; the plugin stays registered and enabled.
    pub(crate) fn run_message_plugin(&mut self, index: usize, event: &MessageEvent) -> bool {
        let Some((name, source, callback)) =
            self.plugins.get(index).and_then(|p| p.message_call())
        else {
            return false;
        };
        let prev = self.active_library;
        self.active_library = Some(source);
        let outcome = sandbox::protected(&name, || callback(&mut *self, event));
        self.active_library = prev;
        match outcome {
            Ok(handled) => handled,
            Err(_) => {
                tracing::error!(plugin = %name, "plugin has caused a serious error");
                false
            }
        }
    }

    /// Run an output plugin over the line. The rewrite is kept only when
    /// the callback reports success; a fault leaves the line untouched.
    pub(crate) fn run_output_plugin(
        &mut self,
        index: usize,
        event: &OutputEvent,
        line: &mut String,
    ) -> bool {
        let Some((name, source, callback)) = self.plugins.get(index).and_then(|p| p.output_call())
        else {
            return false;
        };
        let prev = self.active_library;
        self.active_library = Some(source);
        let mut scratch = line.clone();
        let outcome = sandbox::protected(&name, || callback(&mut *self, event, &mut scratch));
        self.active_library = prev;
        match outcome {
            Ok(true) => {
                *line = scratch;
                true
            }
            Ok(false) => false,
            Err(_) => {
                tracing::error!(plugin = %name, "plugin has caused a serious error");
                false
            }
        }
    }

    // ─── Timers ──────────────────────────────────────────────────────

    /// Queue a one-shot timer and make sure the checking thread runs.
    pub(crate) fn add_core_timer(
        &mut self,
        interval: Duration,
        owner: Option<LibraryId>,
        callback: TimerFn,
    ) -> bool {
        self.timers.push(Timer::new(owner, interval, callback));
        if !self.timer_thread_running {
            let Some(shared) = self.shared.upgrade() else {
                tracing::warn!("no engine attached, timers will not be active");
                return false;
            };
            tracing::debug!("starting timer checking thread");
            self.timer_thread_running = true;
            std::thread::spawn(move || crate::timer::run_checker(shared));
        }
        true
    }

    /// Discard every pending timer. The checking thread exits on its next
    /// pass.
    pub fn kill_timers(&mut self) -> bool {
        self.timers.clear();
        true
    }

    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }

    pub(crate) fn has_timers(&self) -> bool {
        !self.timers.is_empty()
    }

    pub(crate) fn timer_thread_stopped(&mut self) {
        self.timer_thread_running = false;
    }

    /// Fire every due timer: remove it, then dispatch inside the sandbox
    /// with the owning library active.
    pub(crate) fn fire_due_timers(&mut self) {
        loop {
            let Some(index) = self.timers.iter().position(Timer::is_due) else {
                break;
            };
            let (owner, callback) = self.timers.remove(index).into_parts();
            // a timer owned by a since-removed library never fires
            if owner.is_some_and(|id| self.library(id).is_none()) {
                continue;
            }
            let prev = self.active_library;
            self.active_library = owner;
            let outcome = sandbox::protected("timer callback", || callback(&mut *self));
            self.active_library = prev;
            if outcome.is_err() {
                tracing::error!("timer callback has caused a serious error");
            }
        }
    }

    /// Arm the built-in periodic ticks. Both re-register themselves on
    /// every firing and carry no owner, so a rehash never cancels them.
    pub(crate) fn arm_builtin_timers(&mut self) {
        self.add_core_timer(ABSTRACT_SWEEP_INTERVAL, None, Arc::new(abstract_sweep_tick));
        self.add_core_timer(MOOD_DRIFT_INTERVAL, None, Arc::new(mood_drift_tick));
    }

    // ─── Moods ───────────────────────────────────────────────────────

    /// Drift every mood one step toward its target. False when there are
    /// no moods at all.
    pub fn mood_drift(&mut self) -> bool {
        if self.moods.is_empty() {
            return false;
        }
        for mood in &mut self.moods {
            mood.drift();
        }
        true
    }

    fn mood_mut(&mut self, name: &str) -> Option<&mut Mood> {
        self.moods.iter_mut().find(|m| m.name() == name)
    }

    pub fn mood_count(&self) -> usize {
        self.moods.len()
    }

    // ─── Phrase pools ────────────────────────────────────────────────

    /// Run garbage collection over every pool. Reports whether anything
    /// was evicted.
    pub fn abstract_garbage_collect(&mut self) -> bool {
        tracing::debug!("garbage collecting phrase pools");
        let active = self.settings.locale();
        let mut happened = false;
        for pool in self.abstracts.values_mut() {
            if pool.garbage_collect(active) {
                happened = true;
            }
        }
        happened
    }

    pub fn abstract_count(&self) -> usize {
        self.abstracts.len()
    }

    // ─── Test support ────────────────────────────────────────────────

    /// Install a stub library that behaves as loaded and make it active,
    /// so tests can drive registration through the real paths.
    #[cfg(test)]
    pub(crate) fn install_stub_library(&mut self) -> LibraryId {
        let id = LibraryId(self.libraries.len());
        self.libraries.push(Some(Library::stub_loaded()));
        self.active_library = Some(id);
        id
    }

    /// Outside of a dispatch no library is executing; tests that finished
    /// registering call this to mirror that.
    #[cfg(test)]
    pub(crate) fn clear_active_library(&mut self) {
        self.active_library = None;
    }
}

fn is_module_library(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let extension = if cfg!(target_os = "macos") {
        ".dylib"
    } else if cfg!(target_os = "windows") {
        ".dll"
    } else {
        ".so"
    };
    name.starts_with("lib") && name.ends_with(extension)
}

fn mood_drift_tick(registry: &mut Registry) {
    registry.mood_drift();
    registry.add_core_timer(MOOD_DRIFT_INTERVAL, None, Arc::new(mood_drift_tick));
}

fn abstract_sweep_tick(registry: &mut Registry) {
    registry.abstract_garbage_collect();
    registry.add_core_timer(ABSTRACT_SWEEP_INTERVAL, None, Arc::new(abstract_sweep_tick));
}

// ─── Host implementation ─────────────────────────────────────────────

impl Registry {
    /// Locale + active-library checks shared by every registration call.
    fn registration_target(&self, locale_code: &str) -> Option<(LibraryId, Locale)> {
        let Some(locale) = Locale::from_code(locale_code) else {
            tracing::warn!(code = %locale_code, "unrecognized locale code");
            return None;
        };
        if locale != Locale::Any && locale != self.settings.locale() {
            return None;
        }
        let Some(source) = self.active_library else {
            tracing::warn!("plugin registration with no active library");
            return None;
        };
        Some((source, locale))
    }

    fn register_pattern_plugin(
        &mut self,
        kind: PluginKind,
        name: &str,
        symbol: &str,
        pattern: &str,
        chance: i32,
        locale_code: &str,
        callback: Callback,
    ) -> bool {
        let Some((source, locale)) = self.registration_target(locale_code) else {
            return false;
        };
        let plugin = match Plugin::new(kind, source, name, symbol, pattern, chance, locale) {
            Ok(plugin) => plugin,
            Err(error) => {
                tracing::warn!(plugin = %name, %error, "invalid plugin pattern");
                return false;
            }
        };
        let Some(lib) = self.library_mut(source) else {
            return false;
        };
        lib.insert_export(symbol, callback);
        self.register_plugin(plugin)
    }
}

impl Host for Registry {
    fn register_simple(
        &mut self,
        name: &str,
        symbol: &str,
        pattern: &str,
        chance: i32,
        locale: &str,
        callback: MessageCallback,
    ) -> bool {
        self.register_pattern_plugin(
            PluginKind::Simple,
            name,
            symbol,
            pattern,
            chance,
            locale,
            Callback::Message(callback),
        )
    }

    fn register_complex(
        &mut self,
        name: &str,
        symbol: &str,
        pattern: &str,
        chance: i32,
        locale: &str,
        callback: MessageCallback,
    ) -> bool {
        self.register_pattern_plugin(
            PluginKind::Complex,
            name,
            symbol,
            pattern,
            chance,
            locale,
            Callback::Message(callback),
        )
    }

    fn register_event(
        &mut self,
        name: &str,
        symbol: &str,
        event: &str,
        pattern: &str,
        chance: i32,
        locale: &str,
        callback: MessageCallback,
    ) -> bool {
        let kind = EventKind::from_tag(event);
        if kind == EventKind::Unknown {
            tracing::warn!(tag = %event, "unknown event plugin type");
        }
        self.register_pattern_plugin(
            PluginKind::Event(kind),
            name,
            symbol,
            pattern,
            chance,
            locale,
            Callback::Message(callback),
        )
    }

    fn register_admin(
        &mut self,
        name: &str,
        symbol: &str,
        command: &str,
        locale: &str,
        callback: MessageCallback,
    ) -> bool {
        let Some((source, locale)) = self.registration_target(locale) else {
            return false;
        };
        let plugin = Plugin::new_admin(source, name, symbol, command, locale);
        let Some(lib) = self.library_mut(source) else {
            return false;
        };
        lib.insert_export(symbol, Callback::Message(callback));
        self.register_plugin(plugin)
    }

    fn register_output(
        &mut self,
        name: &str,
        symbol: &str,
        pattern: &str,
        chance: i32,
        locale: &str,
        callback: OutputCallback,
    ) -> bool {
        self.register_pattern_plugin(
            PluginKind::Output,
            name,
            symbol,
            pattern,
            chance,
            locale,
            Callback::Output(callback),
        )
    }

    fn abstract_register(&mut self, pool: &str) -> bool {
        if let Some(existing) = self.abstracts.get_mut(pool) {
            return existing.create();
        }
        tracing::info!(pool = %pool, "creating phrase pool");
        let root = self.settings.abstract_path().to_path_buf();
        let mut created = Abstract::new(pool, &root, self.settings.locale());
        if !created.create() {
            return false;
        }
        self.abstracts.insert(created.pool().to_string(), created);
        true
    }

    fn abstract_batch_add(&mut self, pool: &str, phrases: &[&str]) -> bool {
        let Some(entry) = self.abstracts.get_mut(pool) else {
            return false;
        };
        for phrase in phrases {
            entry.add_value(phrase, true);
        }
        true
    }

    fn abstract_value(&mut self, pool: &str) -> Option<String> {
        self.abstracts.get_mut(pool)?.random_value()
    }

    fn add_timer(&mut self, delay_ms: u64, callback: TimerCallback) -> bool {
        let owner = self.active_library;
        self.add_core_timer(
            Duration::from_millis(delay_ms),
            owner,
            Arc::new(move |registry: &mut Registry| callback(registry)),
        )
    }

    fn mood_create(&mut self, name: &str, target: i32, lower: i32, upper: i32) -> bool {
        if self.moods.iter().any(|m| m.name() == name) {
            return false;
        }
        self.moods.push(Mood::new(name, target, lower, upper));
        true
    }

    fn mood_increase(&mut self, name: &str, amount: i32) -> bool {
        match self.mood_mut(name) {
            Some(mood) => {
                mood.increase(amount);
                true
            }
            None => false,
        }
    }

    fn mood_decrease(&mut self, name: &str, amount: i32) -> bool {
        self.mood_increase(name, -amount)
    }

    fn mood_value(&self, name: &str) -> i32 {
        self.moods
            .iter()
            .find(|m| m.name() == name)
            .map(Mood::value)
            .unwrap_or(0)
    }

    fn do_action(
        &mut self,
        channel: Option<&str>,
        nick: &str,
        text: &str,
        more_text: &str,
        urgent: bool,
    ) -> bool {
        crate::output::do_action(self, channel, nick, text, more_text, urgent)
    }

    fn set_value(&mut self, key: &str, value: &str) {
        self.settings.set(key, value);
    }

    fn get_value(&self, key: &str) -> Option<String> {
        self.settings.get(key).map(str::to_string)
    }

    fn random_delay_range(&self) -> (u64, u64) {
        (
            self.settings.min_random_delay(),
            self.settings.max_random_delay(),
        )
    }

    fn use_locale(&mut self, code: &str) -> bool {
        let Some(locale) = Locale::from_code(code) else {
            return false;
        };
        if locale == Locale::Any || locale == self.settings.locale() {
            return false;
        }
        if !self.settings.set_locale(locale) {
            return false;
        }
        if !self.remove_all_libraries() {
            return false;
        }
        self.load_plugin_dir() > 0
    }

    fn status(&self) {
        self.settings.dump();
        self.dump();
    }

    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Error => tracing::error!(target: "module", "{message}"),
            LogLevel::Warn => tracing::warn!(target: "module", "{message}"),
            LogLevel::Info => tracing::info!(target: "module", "{message}"),
            LogLevel::Debug => tracing::debug!(target: "module", "{message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::LibraryState;
    use crate::settings::Settings;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry_with_stub() -> (Registry, LibraryId) {
        let mut registry = Registry::new(Settings::default());
        let id = registry.install_stub_library();
        (registry, id)
    }

    fn counting_callback(counter: Arc<AtomicUsize>, handled: bool) -> MessageCallback {
        Arc::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            handled
        })
    }

    #[test]
    fn test_register_and_enable() {
        let (mut registry, _) = registry_with_stub();
        let counter = Arc::new(AtomicUsize::new(0));
        assert!(registry.register_complex(
            "greeting",
            "greeting_cb",
            "^hi",
            100,
            "any",
            counting_callback(counter, true),
        ));
        let plugin = registry.get_plugin("greeting").unwrap();
        assert!(plugin.is_enabled());
        assert_eq!(registry.plugin_count(), 1);
    }

    #[test]
    fn test_duplicate_name_is_rejected() {
        let (mut registry, _) = registry_with_stub();
        let counter = Arc::new(AtomicUsize::new(0));
        assert!(registry.register_complex(
            "greeting",
            "cb_one",
            "^hi",
            100,
            "any",
            counting_callback(counter.clone(), true),
        ));
        assert!(!registry.register_complex(
            "greeting",
            "cb_two",
            "^hello",
            100,
            "any",
            counting_callback(counter, true),
        ));
        assert_eq!(registry.plugin_count(), 1);
    }

    #[test]
    fn test_unrecognized_locale_is_rejected() {
        let (mut registry, _) = registry_with_stub();
        let counter = Arc::new(AtomicUsize::new(0));
        assert!(!registry.register_complex(
            "greeting",
            "cb",
            "^hi",
            100,
            "de",
            counting_callback(counter, true),
        ));
        assert_eq!(registry.plugin_count(), 0);
    }

    #[test]
    fn test_locale_mismatch_is_rejected() {
        let (mut registry, _) = registry_with_stub();
        let counter = Arc::new(AtomicUsize::new(0));
        // system locale is En by default
        assert!(!registry.register_complex(
            "bonjour",
            "cb",
            "^bonjour",
            100,
            "fr",
            counting_callback(counter, true),
        ));
    }

    #[test]
    fn test_registration_without_active_library_fails() {
        let mut registry = Registry::new(Settings::default());
        let counter = Arc::new(AtomicUsize::new(0));
        assert!(!registry.register_complex(
            "greeting",
            "cb",
            "^hi",
            100,
            "any",
            counting_callback(counter, true),
        ));
    }

    #[test]
    fn test_disallowed_plugin_cannot_register() {
        let settings = Settings::from_toml("noplugin = [\"greeting\"]").unwrap();
        let mut registry = Registry::new(settings);
        registry.install_stub_library();
        let counter = Arc::new(AtomicUsize::new(0));
        assert!(!registry.register_complex(
            "greeting",
            "cb",
            "^hi",
            100,
            "any",
            counting_callback(counter, true),
        ));
        assert_eq!(registry.plugin_count(), 0);
    }

    #[test]
    fn test_complex_dispatch_stops_at_first_success() {
        let (mut registry, _) = registry_with_stub();
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));
        let c = Arc::new(AtomicUsize::new(0));
        registry.register_complex("A", "cb_a", "xyz", 100, "any", counting_callback(a.clone(), true));
        registry.register_complex("B", "cb_b", "^rah", 100, "any", counting_callback(b.clone(), true));
        registry.register_complex("C", "cb_c", ".*", 100, "any", counting_callback(c.clone(), true));

        let event = MessageEvent::new("nick", "host", "handle", "#test", "rah");
        let matches = registry.find_complex("rah");
        let mut handled = false;
        for index in matches {
            if registry.run_message_plugin(index, &event) {
                handled = true;
                break;
            }
        }

        assert!(handled);
        assert_eq!(a.load(Ordering::SeqCst), 0);
        assert_eq!(b.load(Ordering::SeqCst), 1);
        assert_eq!(c.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failed_complex_plugin_does_not_stop_chain() {
        let (mut registry, _) = registry_with_stub();
        let b = Arc::new(AtomicUsize::new(0));
        let c = Arc::new(AtomicUsize::new(0));
        registry.register_complex("B", "cb_b", "^rah", 100, "any", counting_callback(b.clone(), false));
        registry.register_complex("C", "cb_c", ".*", 100, "any", counting_callback(c.clone(), true));

        let event = MessageEvent::new("nick", "host", "handle", "#test", "rah");
        for index in registry.find_complex("rah") {
            if registry.run_message_plugin(index, &event) {
                break;
            }
        }

        assert_eq!(b.load(Ordering::SeqCst), 1);
        assert_eq!(c.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_event_plugins_filter_by_kind() {
        let (mut registry, _) = registry_with_stub();
        let joins = Arc::new(AtomicUsize::new(0));
        registry.register_event(
            "join greeter",
            "join_cb",
            "join",
            ".*",
            100,
            "any",
            counting_callback(joins.clone(), true),
        );
        assert_eq!(registry.find_event(EventKind::Join, "").len(), 1);
        assert!(registry.find_event(EventKind::Quit, "").is_empty());
    }

    #[test]
    fn test_unknown_event_tag_never_matches() {
        let (mut registry, _) = registry_with_stub();
        let counter = Arc::new(AtomicUsize::new(0));
        assert!(registry.register_event(
            "mystery",
            "mystery_cb",
            "topic",
            ".*",
            100,
            "any",
            counting_callback(counter, true),
        ));
        for kind in [
            EventKind::Join,
            EventKind::Nick,
            EventKind::Quit,
            EventKind::Part,
            EventKind::Split,
        ] {
            assert!(registry.find_event(kind, "anything").is_empty());
        }
    }

    #[test]
    fn test_faulting_plugin_is_contained_and_stays_enabled() {
        let (mut registry, _) = registry_with_stub();
        let cb: MessageCallback = Arc::new(|_, _| panic!("plugin bug"));
        registry.register_complex("faulty", "faulty_cb", ".*", 100, "any", cb);

        let event = MessageEvent::new("nick", "host", "handle", "#test", "boom");
        let index = registry.find_complex("boom")[0];
        assert!(!registry.run_message_plugin(index, &event));
        assert!(registry.get_plugin("faulty").unwrap().is_enabled());
        // it can be invoked again
        assert!(!registry.run_message_plugin(index, &event));
    }

    #[test]
    fn test_disabling_last_plugin_unloads_library() {
        let (mut registry, id) = registry_with_stub();
        let counter = Arc::new(AtomicUsize::new(0));
        registry.register_complex("only", "only_cb", ".*", 100, "any", counting_callback(counter, true));

        assert!(registry.disable_plugin("only"));
        assert_eq!(registry.library(id).unwrap().state(), LibraryState::Unloaded);
        assert!(!registry.get_plugin("only").unwrap().has_callback());
    }

    #[test]
    fn test_disabling_one_of_two_keeps_library_loaded() {
        let (mut registry, id) = registry_with_stub();
        let counter = Arc::new(AtomicUsize::new(0));
        registry.register_complex("one", "one_cb", ".*", 100, "any", counting_callback(counter.clone(), true));
        registry.register_complex("two", "two_cb", ".*", 100, "any", counting_callback(counter, true));

        assert!(registry.disable_plugin("one"));
        assert_eq!(registry.library(id).unwrap().state(), LibraryState::Loaded);
        assert!(registry.get_plugin("two").unwrap().is_enabled());
    }

    #[test]
    fn test_disable_then_enable_requires_callback() {
        let (mut registry, _) = registry_with_stub();
        let counter = Arc::new(AtomicUsize::new(0));
        registry.register_complex("only", "only_cb", ".*", 100, "any", counting_callback(counter, true));
        registry.disable_plugin("only");
        // the stub library cannot actually be reopened from disk, so the
        // callback stays unresolved and enabling must fail
        assert!(!registry.enable_plugin("only"));
        assert!(!registry.get_plugin("only").unwrap().is_enabled());
    }

    #[test]
    fn test_remove_all_libraries_spares_active() {
        let (mut registry, first) = registry_with_stub();
        let counter = Arc::new(AtomicUsize::new(0));
        registry.register_complex("first", "first_cb", ".*", 100, "any", counting_callback(counter.clone(), true));

        let _second = registry.install_stub_library();
        registry.register_complex("second", "second_cb", ".*", 100, "any", counting_callback(counter, true));

        // the second stub is now active; a rehash-style sweep spares it
        registry.remove_all_libraries();
        assert!(registry.get_plugin("second").is_some());
        assert!(registry.get_plugin("first").is_none());
        assert!(registry.library(first).is_none());
    }

    #[test]
    fn test_mood_create_rejects_duplicates() {
        let mut registry = Registry::new(Settings::default());
        assert!(registry.mood_create("joy", 0, -30, 30));
        assert!(!registry.mood_create("joy", 5, -10, 10));
        assert_eq!(registry.mood_count(), 1);
    }

    #[test]
    fn test_mood_ops() {
        let mut registry = Registry::new(Settings::default());
        registry.mood_create("joy", 0, -30, 30);
        assert!(registry.mood_increase("joy", 4));
        assert_eq!(registry.mood_value("joy"), 4);
        assert!(registry.mood_decrease("joy", 1));
        assert_eq!(registry.mood_value("joy"), 3);
        assert!(!registry.mood_increase("anger", 1));
        assert_eq!(registry.mood_value("anger"), 0);
    }

    #[test]
    fn test_mood_drift_false_without_moods() {
        let mut registry = Registry::new(Settings::default());
        assert!(!registry.mood_drift());
        registry.mood_create("joy", 0, -30, 30);
        assert!(registry.mood_drift());
    }

    #[test]
    fn test_add_timer_without_engine_warns() {
        let mut registry = Registry::new(Settings::default());
        // queued, but no checking thread can start without an engine
        assert!(!registry.add_core_timer(Duration::from_millis(1), None, Arc::new(|_| {})));
        assert_eq!(registry.timer_count(), 1);
        registry.kill_timers();
        assert_eq!(registry.timer_count(), 0);
    }

    #[test]
    fn test_value_store_via_host() {
        let mut registry = Registry::new(Settings::default());
        registry.set_value("testing", "true");
        assert_eq!(registry.get_value("testing"), Some("true".to_string()));
        assert_eq!(registry.get_value("empty"), None);
    }
}
