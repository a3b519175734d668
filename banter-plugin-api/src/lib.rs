//! banter-plugin-api - Plugin API for the banter engine
//!
//! This crate provides the traits and types needed to write behaviour
//! modules for banter. Modules are native Rust dynamic libraries that
//! register behaviour plugins (simple responders, complex responders,
//! event handlers, admin commands, output rewriters) with the host at
//! load time, and can read and mutate host state (moods, phrase pools,
//! timers, key/value settings) from inside their callbacks.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use banter_plugin_api::{export_module, Host, Module, ModuleError, ModuleManifest};
//!
//! #[derive(Default)]
//! pub struct MyModule;
//!
//! impl Module for MyModule {
//!     fn manifest(&self) -> ModuleManifest {
//!         ModuleManifest {
//!             name: "my-module".to_string(),
//!             version: "0.1.0".to_string(),
//!             ..Default::default()
//!         }
//!     }
//!
//!     fn init(&mut self, host: &mut dyn Host) -> Result<(), ModuleError> {
//!         host.register_complex(
//!             "my greeting",
//!             "my_greeting_cb",
//!             "^hello",
//!             80,
//!             "any",
//!             Arc::new(|host, ev| {
//!                 host.do_action(Some(&ev.channel), &ev.nick, "waves", "", false)
//!             }),
//!         );
//!         Ok(())
//!     }
//! }
//!
//! export_module!(MyModule);
//! ```

pub mod error;
pub mod host;
pub mod types;

pub use error::ModuleError;
pub use host::{Host, MessageCallback, OutputCallback, TimerCallback};
pub use types::*;

/// Current module API version. Modules must match this exactly; the host
/// checks it before creating the module instance.
pub const API_VERSION: u32 = 1;

/// A loadable behaviour module.
///
/// The host creates one instance per dynamic library and calls [`Module::init`]
/// once, inside its fault-isolating call boundary. All plugin, pool, mood
/// and timer registration happens in `init` through the [`Host`] handle.
pub trait Module: Send {
    /// Return module metadata.
    fn manifest(&self) -> ModuleManifest;

    /// Called once after the library is loaded. Register plugins here.
    fn init(&mut self, host: &mut dyn Host) -> Result<(), ModuleError>;
}

/// Export a module type for dynamic loading.
///
/// This macro generates the C ABI entry points that banter uses to load
/// and unload modules dynamically.
///
/// # Usage
///
/// ```ignore
/// banter_plugin_api::export_module!(MyModule);
/// ```
///
/// # Generated Functions
///
/// - `_banter_module_create()`: Creates a new module instance
/// - `_banter_module_api_version()`: Returns the API version
/// - `_banter_module_destroy()`: Destroys a module instance
#[macro_export]
macro_rules! export_module {
    ($module_type:ty) => {
        #[unsafe(no_mangle)]
        pub extern "C" fn _banter_module_create() -> *mut dyn $crate::Module {
            let module: Box<dyn $crate::Module> = Box::new(<$module_type>::default());
            Box::into_raw(module)
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn _banter_module_api_version() -> u32 {
            $crate::API_VERSION
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn _banter_module_destroy(ptr: *mut dyn $crate::Module) {
            if !ptr.is_null() {
                unsafe {
                    drop(Box::from_raw(ptr));
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_version_is_set() {
        assert_eq!(API_VERSION, 1);
    }

    #[test]
    fn test_module_trait_is_object_safe() {
        // This compiles only if Module is object-safe
        fn _takes_boxed_module(_: Box<dyn Module>) {}
    }
}
