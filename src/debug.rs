use std::sync::atomic::{AtomicU8, Ordering};

static VERBOSITY: AtomicU8 = AtomicU8::new(0);

/// 0 is silent, 1 enables per-unit progress detail, 2 adds per-entry
/// detail. Driven by how often `--debug` is passed on the command line.
pub fn set_verbosity(level: u8) {
    VERBOSITY.store(level, Ordering::Relaxed);
}

pub fn verbosity() -> u8 {
    VERBOSITY.load(Ordering::Relaxed)
}

#[macro_export]
macro_rules! debug_println {
    ($($arg:tt)*) => {
        if $crate::debug::verbosity() >= 1 {
            println!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! debug_eprintln {
    ($($arg:tt)*) => {
        if $crate::debug::verbosity() >= 1 {
            eprintln!($($arg)*);
        }
    };
}

/// Noisier than `debug_println!`; for messages that can fire once per
/// property entry rather than once per unit.
#[macro_export]
macro_rules! trace_println {
    ($($arg:tt)*) => {
        if $crate::debug::verbosity() >= 2 {
            println!($($arg)*);
        }
    };
}
