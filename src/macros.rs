// SPDX-License-Identifier: Apache-2.0 OR MIT
// Logging macros for convenient submission through a router

/// Submit a log event with an explicit severity
///
/// # Examples
/// ```ignore
/// relay_log!(router, Severity::Info, "physics", "step took {}ms", elapsed);
/// ```
#[macro_export]
macro_rules! relay_log {
    ($router:expr, $level:expr, $source:expr, $($arg:tt)+) => {
        $router.submit($source, $level, format!($($arg)+))
    };
}

/// Submit with fatal severity
#[macro_export]
macro_rules! relay_fatal {
    ($router:expr, $source:expr, $($arg:tt)+) => {
        $crate::relay_log!($router, $crate::Severity::Fatal, $source, $($arg)+)
    };
}

/// Submit with error severity
#[macro_export]
macro_rules! relay_error {
    ($router:expr, $source:expr, $($arg:tt)+) => {
        $crate::relay_log!($router, $crate::Severity::Error, $source, $($arg)+)
    };
}

/// Submit with warning severity
#[macro_export]
macro_rules! relay_warning {
    ($router:expr, $source:expr, $($arg:tt)+) => {
        $crate::relay_log!($router, $crate::Severity::Warning, $source, $($arg)+)
    };
}

/// Submit with info severity
#[macro_export]
macro_rules! relay_info {
    ($router:expr, $source:expr, $($arg:tt)+) => {
        $crate::relay_log!($router, $crate::Severity::Info, $source, $($arg)+)
    };
}

/// Submit with debug severity
#[macro_export]
macro_rules! relay_debug {
    ($router:expr, $source:expr, $($arg:tt)+) => {
        $crate::relay_log!($router, $crate::Severity::Debug, $source, $($arg)+)
    };
}
