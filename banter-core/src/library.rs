//! Dynamically loaded module libraries
//!
//! A `Library` wraps one native module: the dylib handle, the module
//! instance created through the C ABI entry points, and the export table
//! of typed callbacks the module registered during init. The registry
//! owns all libraries and orchestrates open/close, since module init
//! calls straight back into the registry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use banter_plugin_api::{API_VERSION, Module, ModuleManifest};

use crate::error::EngineError;
use crate::plugin::Callback;

/// Index of a library in the registry's library table.
///
/// Plugins and timers refer to their source library through this handle
/// rather than a reference, so a removed library is detectable without
/// dangling access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LibraryId(pub(crate) usize);

/// Library lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryState {
    /// Not loaded (never opened, or closed again)
    Unloaded,
    /// Module init completed successfully
    Loaded,
    /// The last open attempt failed
    Failed,
}

/// One dynamically loaded native behaviour module.
pub struct Library {
    path: PathBuf,
    state: LibraryState,
    /// The module instance created by `_banter_module_create`
    module: Option<Box<dyn Module>>,
    /// Typed callbacks registered during module init, keyed by callback name
    exports: HashMap<String, Callback>,
    /// Declared last: the module instance and the export table hold code
    /// owned by this handle and must drop first.
    handle: Option<libloading::Library>,
}

impl Library {
    pub(crate) fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            state: LibraryState::Unloaded,
            module: None,
            exports: HashMap::new(),
            handle: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> LibraryState {
        self.state
    }

    /// Fully loaded: module init has completed.
    pub fn is_loaded(&self) -> bool {
        self.state == LibraryState::Loaded
    }

    /// Open, or mid-open: a further open attempt would be a no-op. During
    /// module init the handle is already present but the state is not yet
    /// `Loaded`; plugins registered at that point must see the library as
    /// open.
    pub(crate) fn is_open(&self) -> bool {
        self.handle.is_some() || self.state == LibraryState::Loaded
    }

    /// Load the dylib, check the API handshake, and create the module
    /// instance. Does not run module init - the registry does that inside
    /// the sandbox with this library active.
    pub(crate) fn load_module(&mut self) -> Result<(), EngineError> {
        if self.is_open() {
            return Ok(());
        }
        if self.path.as_os_str().is_empty() {
            return Err(EngineError::EmptyLibraryPath);
        }

        // SAFETY: loading a module the operator put in the plugin
        // directory; it is expected to follow the banter module ABI.
        let handle = unsafe { libloading::Library::new(&self.path)? };

        // SAFETY: calling the C entry points generated by export_module!.
        let api_version: libloading::Symbol<extern "C" fn() -> u32> =
            unsafe { handle.get(b"_banter_module_api_version")? };
        let found = api_version();
        if found != API_VERSION {
            return Err(EngineError::ApiVersionMismatch {
                expected: API_VERSION,
                found,
            });
        }

        // SAFETY: the create function returns a raw pointer we take
        // ownership of, per the module ABI contract.
        let create: libloading::Symbol<extern "C" fn() -> *mut dyn Module> =
            unsafe { handle.get(b"_banter_module_create")? };
        let module = unsafe { Box::from_raw(create()) };

        self.module = Some(module);
        self.handle = Some(handle);
        Ok(())
    }

    /// Take the module instance out for an init call. The registry puts it
    /// back with [`Library::store_module`] unless init faulted.
    pub(crate) fn take_module(&mut self) -> Option<Box<dyn Module>> {
        self.module.take()
    }

    pub(crate) fn store_module(&mut self, module: Box<dyn Module>) {
        self.module = Some(module);
    }

    pub(crate) fn manifest(&self) -> Option<ModuleManifest> {
        self.module.as_ref().map(|m| m.manifest())
    }

    pub(crate) fn set_loaded(&mut self) {
        self.state = LibraryState::Loaded;
    }

    /// Mark the library as no longer loaded without releasing anything
    /// yet; the registry cascades plugin disables in between.
    pub(crate) fn mark_unloaded(&mut self) {
        self.state = LibraryState::Unloaded;
    }

    /// Drop the module instance, the export table and the native handle,
    /// in that order.
    pub(crate) fn release(&mut self) {
        self.module = None;
        self.exports.clear();
        self.handle = None;
    }

    /// Release everything after a failed open attempt.
    pub(crate) fn fail(&mut self) {
        self.release();
        self.state = LibraryState::Failed;
    }

    /// Record a typed callback under its callback name.
    pub(crate) fn insert_export(&mut self, symbol: &str, callback: Callback) {
        self.exports.insert(symbol.to_string(), callback);
    }

    /// Resolve a callback by name from the current export table.
    pub(crate) fn export(&self, symbol: &str) -> Option<Callback> {
        self.exports.get(symbol).cloned()
    }

    /// A library that behaves as loaded without a native handle, so tests
    /// can drive registration and dispatch through the real code paths.
    #[cfg(test)]
    pub(crate) fn stub_loaded() -> Self {
        Self {
            path: PathBuf::from("stub.so"),
            state: LibraryState::Loaded,
            module: None,
            exports: HashMap::new(),
            handle: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use banter_plugin_api::MessageCallback;
    use std::sync::Arc;

    #[test]
    fn test_new_library_is_unloaded() {
        let lib = Library::new(Path::new("libgreeter.so"));
        assert_eq!(lib.state(), LibraryState::Unloaded);
        assert!(!lib.is_loaded());
        assert!(!lib.is_open());
    }

    #[test]
    fn test_empty_path_fails_load() {
        let mut lib = Library::new(Path::new(""));
        assert!(matches!(
            lib.load_module(),
            Err(EngineError::EmptyLibraryPath)
        ));
    }

    #[test]
    fn test_missing_file_fails_load() {
        let mut lib = Library::new(Path::new("/nonexistent/libmissing.so"));
        assert!(matches!(
            lib.load_module(),
            Err(EngineError::LibraryLoad(_))
        ));
        lib.fail();
        assert_eq!(lib.state(), LibraryState::Failed);
    }

    #[test]
    fn test_export_table_roundtrip() {
        let mut lib = Library::stub_loaded();
        let cb: MessageCallback = Arc::new(|_, _| true);
        lib.insert_export("my_cb", Callback::Message(cb));
        assert!(lib.export("my_cb").is_some());
        assert!(lib.export("other_cb").is_none());

        lib.release();
        assert!(lib.export("my_cb").is_none());
    }

    #[test]
    fn test_stub_counts_as_open() {
        let lib = Library::stub_loaded();
        assert!(lib.is_loaded());
        assert!(lib.is_open());
    }
}
