//! One-shot deferred callbacks and the background checking loop
//!
//! Timers are plain entries in the registry's timer list; a single
//! background thread polls the list, fires whatever is due, and exits
//! when the list drains. Adding a timer while no thread is running
//! starts one. Periodic behaviour is a callback that re-registers a
//! fresh timer for itself each time it fires.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::engine::EngineShared;
use crate::library::LibraryId;
use crate::registry::Registry;

/// Internal timer callback shape; the plugin-facing [`banter_plugin_api::TimerCallback`]
/// is wrapped into this at registration.
pub(crate) type TimerFn = Arc<dyn Fn(&mut Registry) + Send + Sync>;

/// Lapse between polling passes of the checking loop.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// A one-shot deferred callback.
pub(crate) struct Timer {
    due: Instant,
    owner: Option<LibraryId>,
    callback: TimerFn,
}

impl Timer {
    pub(crate) fn new(owner: Option<LibraryId>, interval: Duration, callback: TimerFn) -> Self {
        Self {
            due: Instant::now() + interval,
            owner,
            callback,
        }
    }

    pub(crate) fn is_due(&self) -> bool {
        Instant::now() >= self.due
    }

    /// The library this timer came from, if any. Used only to decide
    /// whether the timer is discarded when that library goes away.
    pub(crate) fn owner(&self) -> Option<LibraryId> {
        self.owner
    }

    pub(crate) fn into_parts(self) -> (Option<LibraryId>, TimerFn) {
        (self.owner, self.callback)
    }
}

/// Body of the timer checking thread. Holds the engine state alive for
/// as long as timers remain pending.
pub(crate) fn run_checker(shared: Arc<EngineShared>) {
    tracing::debug!("timer checking thread started");
    loop {
        {
            let mut registry = shared.lock_registry();
            if !registry.has_timers() {
                registry.timer_thread_stopped();
                break;
            }
            registry.fire_due_timers();
        }
        std::thread::sleep(POLL_INTERVAL);
    }
    tracing::debug!("timer checking thread exiting");
}
