//! Verbosity-gated `tracing` events for the analysis passes.
//!
//! `AnalysisConfig::verbosity` picks how much of a run is reported; the
//! macros expand to a plain `if` so suppressed events cost one comparison.
//! Installing a subscriber is left to the embedding application.
//!
//! | verbosity | macro          | level   | emitted by                         |
//! |-----------|----------------|---------|------------------------------------|
//! | 1         | `log_changes!` | `INFO`  | analysis totals, aggregated report |
//! | 2         | `log_checks!`  | `DEBUG` | each bottleneck and opportunity    |
//! | 3         | `log_debug!`   | `TRACE` | each layer of both passes          |

pub const VERBOSITY_SILENT: u8 = 0;
pub const VERBOSITY_CHANGES: u8 = 1;
pub const VERBOSITY_CHECKS: u8 = 2;
pub const VERBOSITY_DEBUG: u8 = 3;

/// One `INFO` event per finished stage, e.g. makespan and path length.
#[macro_export]
macro_rules! log_changes {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_CHANGES {
            ::tracing::info!($($arg)*);
        }
    };
}

/// `DEBUG` event per classified step: bottleneck causes, parallel runs,
/// elimination and caching candidates.
#[macro_export]
macro_rules! log_checks {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_CHECKS {
            ::tracing::debug!($($arg)*);
        }
    };
}

/// `TRACE` event per topological layer visited.
#[macro_export]
macro_rules! log_debug {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_DEBUG {
            ::tracing::trace!($($arg)*);
        }
    };
}
