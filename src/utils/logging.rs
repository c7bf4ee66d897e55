//! Module-gated logging macros for widget diagnostics.
//!
//! A broken embed must never throw on the host page, so every widget-side
//! failure ends up here as a console diagnostic instead of an error value.
//!
//! Usage:
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//!
//! use crate::{widget_info, widget_warn};
//!
//! widget_warn!("config fetch failed for {}: {}", company_id, err);
//! ```

/// Info-level widget diagnostic. Requires `ENABLE_LOGS` in the calling module.
#[macro_export]
macro_rules! widget_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!(target: "careerchat_widget", $($arg)*);
        }
    };
}

/// Debug-level widget diagnostic, used for per-attempt tracing.
#[macro_export]
macro_rules! widget_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!(target: "careerchat_widget", $($arg)*);
        }
    };
}

/// Warn-level widget diagnostic. Requires `ENABLE_LOGS` in the calling module.
#[macro_export]
macro_rules! widget_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!(target: "careerchat_widget", $($arg)*);
        }
    };
}

/// Error-level widget diagnostic. Requires `ENABLE_LOGS` in the calling module.
#[macro_export]
macro_rules! widget_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!(target: "careerchat_widget", $($arg)*);
        }
    };
}
