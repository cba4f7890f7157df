//! Toolchain logging.
//!
//! Messages go to stderr as `+<elapsed>s [LEVEL] <module>: <message>`, with the
//! level tag colored when stderr is a terminal. The elapsed time counts from the
//! first message of the process. Messages below the current threshold are
//! dropped; the default threshold is [`Level::Info`], and [`enable_verbose`]
//! lowers it to [`Level::Debug`] for the `-v` mode of the front-ends.

use std::fmt::{self, Display};
use std::io::Write;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

impl Level {
    fn from_u8(value: u8) -> Level {
        match value {
            0 => Level::Debug,
            1 => Level::Info,
            2 => Level::Warn,
            _ => Level::Error,
        }
    }

    fn color(self) -> ColorSpec {
        let mut spec = ColorSpec::new();
        match self {
            Level::Debug => spec.set_fg(Some(Color::Cyan)),
            Level::Info => spec.set_fg(Some(Color::Green)),
            Level::Warn => spec.set_fg(Some(Color::Yellow)).set_bold(true),
            Level::Error => spec.set_fg(Some(Color::Red)).set_bold(true),
        };
        spec
    }
}

impl Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        })
    }
}

static THRESHOLD: AtomicU8 = AtomicU8::new(Level::Info as u8);
static START: OnceLock<Instant> = OnceLock::new();

/// Lowers the threshold so that `debug!` output is shown.
pub fn enable_verbose() {
    set_threshold(Level::Debug);
}

/// Drops every message below `level`.
pub fn set_threshold(level: Level) {
    THRESHOLD.store(level as u8, Ordering::Relaxed);
}

pub fn threshold() -> Level {
    Level::from_u8(THRESHOLD.load(Ordering::Relaxed))
}

pub fn enabled(level: Level) -> bool {
    level >= threshold()
}

/// Formats the line prefix that follows the colored level tag.
fn origin(module: &str) -> &str {
    module.strip_prefix("coppervm::").unwrap_or(module)
}

/// Writes one record. Use the `debug!`, `info!`, `warn!` and `error!` macros instead.
#[doc(hidden)]
pub fn log(level: Level, module: &str, message: fmt::Arguments<'_>) {
    if !enabled(level) {
        return;
    }
    let elapsed = START.get_or_init(Instant::now).elapsed();

    let mut stderr = StandardStream::stderr(ColorChoice::Auto);
    let _ = write!(stderr, "+{:>8.3}s [", elapsed.as_secs_f64());
    let _ = stderr.set_color(&level.color());
    let _ = write!(stderr, "{level:<5}");
    let _ = stderr.reset();
    let _ = writeln!(stderr, "] {}: {message}", origin(module));
}

#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::__log!($crate::utils::log::Level::Debug, $($arg)*)
    };
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::__log!($crate::utils::log::Level::Info, $($arg)*)
    };
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::__log!($crate::utils::log::Level::Warn, $($arg)*)
    };
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::__log!($crate::utils::log::Level::Error, $($arg)*)
    };
}

// Test builds stay silent.
#[doc(hidden)]
#[macro_export]
macro_rules! __log {
    ($level:expr, $($arg:tt)*) => {{
        if cfg!(not(test)) && $crate::utils::log::enabled($level) {
            $crate::utils::log::log($level, module_path!(), format_args!($($arg)*))
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_tags_pad() {
        assert_eq!(format!("[{:<5}]", Level::Warn), "[WARN ]");
        assert_eq!(format!("[{:<5}]", Level::Error), "[ERROR]");
    }

    #[test]
    fn threshold_filters_levels() {
        assert!(Level::Debug < Level::Info && Level::Warn < Level::Error);
        assert_eq!(Level::from_u8(7), Level::Error);

        let before = threshold();
        set_threshold(Level::Warn);
        assert!(!enabled(Level::Info));
        assert!(enabled(Level::Error));
        set_threshold(before);
    }

    #[test]
    fn every_level_macro_takes_format_arguments() {
        let file = "main.casm";
        crate::debug!("resolving {file}");
        crate::info!("assembled {}: {} instructions", file, 2);
        crate::warn!("no 'halt' instruction found");
        crate::error!("{file}:{}: unknown instruction", 3);
    }

    #[test]
    fn origin_drops_crate_name() {
        assert_eq!(origin("coppervm::assembler::ir"), "assembler::ir");
        assert_eq!(origin("other::module"), "other::module");
    }
}
