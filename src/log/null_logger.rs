//! Used when the `logging` feature is off: no logger is installed, but the public API of
//! `crate::log` keeps working and still adjusts the `log` facade's maximum level.

use crate::log::LogConfiguration;

impl LogConfiguration {
    pub(in crate::log) fn set_config(&mut self) {
        log::set_max_level(self.global_log_level);
    }
}
