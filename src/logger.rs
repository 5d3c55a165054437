//! Console logging macros. Every line carries a colored tag and a millisecond UTC timestamp.

/// Shared line printer behind the public macros.
#[macro_export]
macro_rules! emit {
    ($color:literal, $tag:literal, $($arg:tt)*) => {
        println!(
            concat!("\x1b[", $color, "m", $tag, "[{}]\x1b[0m {}"),
            chrono::Utc::now().format("%H:%M:%S%.3f"),
            format!($($arg)*)
        )
    };
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => { $crate::emit!("32", "[INFO] ", $($arg)*) };
}

#[macro_export]
macro_rules! log {
    ($($arg:tt)*) => { $crate::emit!("33", "[LOG]  ", $($arg)*) };
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => { $crate::emit!("35", "[WARN] ", $($arg)*) };
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => { $crate::emit!("31", "[ERROR]", $($arg)*) };
}

/// Transitions and guidance mode changes.
#[macro_export]
macro_rules! state {
    ($($arg:tt)*) => { $crate::emit!("1;34", "[STATE]", $($arg)*) };
}

/// Per-message trace, only printed when `LOG_MISSION_EVENTS` is set.
#[macro_export]
macro_rules! event {
    ($($arg:tt)*) => {
        if std::env::var("LOG_MISSION_EVENTS").is_ok() {
            $crate::emit!("36", "[EVENT]", $($arg)*)
        }
    };
}

#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {
        panic!(
            "\x1b[1;31m[FATAL][{}]\x1b[0m {}",
            chrono::Utc::now().format("%H:%M:%S%.3f"),
            format!($($arg)*)
        )
    };
}
