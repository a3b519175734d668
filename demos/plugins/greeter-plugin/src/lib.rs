//! Greeter - an example behaviour module for banter
//!
//! Demonstrates:
//! - Registering complex, event, output and admin plugins
//! - Backing responses with a phrase pool (`%VAR{greetings}`)
//! - Moods nudged by traffic, and a one-shot timer
//!
//! ## Building
//!
//! ```bash
//! cargo build --release
//! ```
//!
//! ## Installing
//!
//! Copy `target/release/libgreeter_plugin.so` into the plugin directory
//! your banter config points at, then say hello.

use std::sync::Arc;

use banter_plugin_api::{
    export_module, Host, Module, ModuleError, ModuleManifest,
};

#[derive(Default)]
pub struct GreeterModule;

impl Module for GreeterModule {
    fn manifest(&self) -> ModuleManifest {
        ModuleManifest {
            name: "greeter".to_string(),
            version: "0.1.0".to_string(),
            description: "Greets arrivals and answers hellos".to_string(),
            author: "banter-team".to_string(),
            ..Default::default()
        }
    }

    fn init(&mut self, host: &mut dyn Host) -> Result<(), ModuleError> {
        host.abstract_register("greetings");
        host.abstract_batch_add(
            "greetings",
            &["hello there", "hi!", "/waves", "oh, it's you again"],
        );

        host.mood_create("cheer", 0, -30, 30);

        if !host.register_complex(
            "greeter response",
            "greeter_response",
            r"^(hi|hiya|hello|hey)\b",
            80,
            "any",
            Arc::new(|host, event| {
                host.mood_increase("cheer", 1);
                host.do_action(
                    Some(&event.channel),
                    &event.nick,
                    "%VAR{greetings}",
                    "",
                    false,
                )
            }),
        ) {
            return Err(ModuleError::registration("greeter response"));
        }

        host.register_event(
            "greeter join",
            "greeter_join",
            "join",
            ".*",
            40,
            "any",
            Arc::new(|host, event| {
                host.do_action(Some(&event.channel), &event.nick, "%VAR{greetings}", "", false)
            }),
        );

        // grumpy moods leak into everything said
        host.register_output(
            "greeter grumble",
            "greeter_grumble",
            ".*",
            25,
            "any",
            Arc::new(|host, _event, line: &mut String| {
                if host.mood_value("cheer") < -5 {
                    line.push_str(" ...whatever.");
                    return true;
                }
                false
            }),
        );

        host.register_admin(
            "greeter cheer report",
            "greeter_cheer",
            "cheer",
            "any",
            Arc::new(|host, event| {
                let value = host.mood_value("cheer");
                host.do_action(
                    Some(&event.channel),
                    &event.nick,
                    &format!("cheer is at {value}"),
                    "",
                    false,
                )
            }),
        );

        host.add_timer(
            10_000,
            Arc::new(|host| {
                host.log_info("greeter timer checks out ok");
                host.set_value("greeter.timer", "fired");
            }),
        );

        Ok(())
    }
}

// Generates the C ABI entry points banter loads the module through
export_module!(GreeterModule);
