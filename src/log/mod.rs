//! The `log` module configures the logging facilities used by all components of a run.
//! Logging is about the internal behavior of the simulation and is not to be confused with
//! _reporting_ (see `crate::report`), which records model outputs.
//!
//! Components emit messages with the five macros re-exported here: `error!`, `warn!`,
//! `info!`, `debug!` and `trace!`, where `error!` has the highest priority and `trace!` the
//! lowest. The conventions used throughout the crate are:
//!
//!  - `warn!` for population shortfalls (no vaccination candidates, seeding pool widened),
//!  - `info!` for per-iteration summaries,
//!  - `debug!` / `trace!` for per-container and per-person details.
//!
//! Logging is _disabled_ by default. It can be enabled with the `--log-level` command line
//! option of the `episim` binary, or from code:
//!
//! ```rust
//! use episim::log::{set_log_level, set_module_filter, LevelFilter};
//!
//! pub fn setup_logging() {
//!     // Enable `info` log messages globally.
//!     set_log_level(LevelFilter::Info);
//!     // Per-container details of the transmission model.
//!     set_module_filter("episim::infection", LevelFilter::Trace);
//! }
//! ```
#[cfg(feature = "logging")]
mod standard_logger;

#[cfg(not(feature = "logging"))]
mod null_logger;

pub use log::{debug, error, info, trace, warn, LevelFilter};
use std::collections::hash_map::Entry;

use crate::hashing::{HashMap, HashMapExt};
#[cfg(feature = "logging")]
use log4rs::Handle;
use std::sync::LazyLock;
use std::sync::{Mutex, MutexGuard};

// Logging disabled
const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::Off;

/// A global instance of the logging configuration.
static LOG_CONFIGURATION: LazyLock<Mutex<LogConfiguration>> = LazyLock::new(Mutex::default);

/// A level filter applied to the messages of one module path (e.g. `"episim::vaccination"`).
#[derive(Debug, PartialEq)]
struct ModuleLogConfiguration {
    module: String,
    level: LevelFilter,
}

impl From<(&str, LevelFilter)> for ModuleLogConfiguration {
    fn from((module, level): (&str, LevelFilter)) -> Self {
        Self {
            module: module.to_string(),
            level,
        }
    }
}

/// Holds the global level, the module filters and a handle to the installed logger.
///
/// Loggers are installed process-wide, so only the singleton behind `LOG_CONFIGURATION`
/// exists. The public API are free functions that lock it and delegate.
#[derive(Debug)]
pub(in crate::log) struct LogConfiguration {
    /// Level for modules without an explicit filter. `LevelFilter::Off` disables logging.
    pub(in crate::log) global_log_level: LevelFilter,
    pub(in crate::log) module_configurations: HashMap<String, ModuleLogConfiguration>,

    #[cfg(feature = "logging")]
    root_handle: Option<Handle>,
}

impl Default for LogConfiguration {
    fn default() -> Self {
        Self {
            global_log_level: DEFAULT_LOG_LEVEL,
            module_configurations: HashMap::new(),

            #[cfg(feature = "logging")]
            root_handle: None,
        }
    }
}

impl LogConfiguration {
    pub(in crate::log) fn set_log_level(&mut self, level: LevelFilter) {
        self.global_log_level = level;
        self.set_config();
    }

    /// Returns true if the configuration was mutated, false otherwise.
    fn insert_module_filter(&mut self, module: &str, level: LevelFilter) -> bool {
        match self.module_configurations.entry(module.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().level == level {
                    return false;
                }
                entry.get_mut().level = level;
            }
            Entry::Vacant(entry) => {
                entry.insert((module, level).into());
            }
        }
        true
    }

    pub(in crate::log) fn set_module_filters(&mut self, module_filters: &[(&str, LevelFilter)]) {
        let mut mutated = false;
        for (module, level) in module_filters {
            mutated |= self.insert_module_filter(module, *level);
        }
        if mutated {
            self.set_config();
        }
    }

    pub(in crate::log) fn remove_module_filter(&mut self, module: &str) {
        if self.module_configurations.remove(module).is_some() {
            self.set_config();
        }
    }
}

// The public API

/// Enables all log messages. Equivalent to `set_log_level(LevelFilter::Trace)`.
pub fn enable_logging() {
    set_log_level(LevelFilter::Trace);
}

/// Disables logging completely. Equivalent to `set_log_level(LevelFilter::Off)`.
pub fn disable_logging() {
    set_log_level(LevelFilter::Off);
}

/// Sets the global log level. A global filter level of `LevelFilter::Off` disables logging.
pub fn set_log_level(level: LevelFilter) {
    get_log_configuration().set_log_level(level);
}

/// Sets a level filter for the given module path.
pub fn set_module_filter(module_path: &str, level_filter: LevelFilter) {
    get_log_configuration().set_module_filters(&[(module_path, level_filter)]);
}

/// Sets the level filters for a set of modules. Use this instead of `set_module_filter()` to
/// set filters in bulk; the logger is rebuilt once.
pub fn set_module_filters(module_filters: &[(&str, LevelFilter)]) {
    get_log_configuration().set_module_filters(module_filters);
}

/// Removes a module-specific level filter. The global level filter applies to the module again.
pub fn remove_module_filter(module_path: &str) {
    get_log_configuration().remove_module_filter(module_path);
}

/// Fetches a mutable reference to the global `LogConfiguration`.
fn get_log_configuration() -> MutexGuard<'static, LogConfiguration> {
    LOG_CONFIGURATION.lock().expect("Mutex poisoned")
}

#[cfg(test)]
mod tests {
    use super::{get_log_configuration, remove_module_filter, set_log_level, set_module_filters};
    use log::{error, trace, LevelFilter};
    use std::sync::{LazyLock, Mutex};

    // Force logging tests to run serially for consistent behavior.
    static TEST_MUTEX: LazyLock<Mutex<()>> = LazyLock::new(Mutex::default);

    #[test]
    fn test_set_log_level() {
        let _guard = TEST_MUTEX.lock().expect("Mutex poisoned");
        set_log_level(LevelFilter::Error);
        {
            let config = get_log_configuration();
            assert_eq!(config.global_log_level, LevelFilter::Error);
            error!("test_set_log_level: global set to error");
            trace!("test_set_log_level: NOT EMITTED");
        }
        set_log_level(LevelFilter::Off);
        assert_eq!(get_log_configuration().global_log_level, LevelFilter::Off);
    }

    #[test]
    fn test_set_remove_module_filters() {
        let _guard = TEST_MUTEX.lock().expect("Mutex poisoned");
        let filters = [
            ("episim::infection", LevelFilter::Trace),
            ("episim::vaccination", LevelFilter::Warn),
        ];
        set_module_filters(&filters);
        {
            let config = get_log_configuration();
            for (module_path, level) in &filters {
                assert_eq!(
                    config.module_configurations.get(*module_path),
                    Some(&((*module_path, *level).into()))
                );
            }
        }

        remove_module_filter("episim::infection");
        {
            let config = get_log_configuration();
            assert!(config
                .module_configurations
                .get("episim::infection")
                .is_none());
            assert!(config
                .module_configurations
                .contains_key("episim::vaccination"));
        }
        remove_module_filter("episim::vaccination");
        set_log_level(LevelFilter::Off);
    }
}
