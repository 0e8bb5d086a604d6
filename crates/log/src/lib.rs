// plcconnector-rs
//
// a CIP/EtherNet/IP tag server, with rust style APIs and useful extensions.
// Copyright: 2022, Joylei <leingliu@gmail.com>
// License: MIT

//! # plcconnector-log
//!  log adapter for `plcconnector`, one component of `plcconnector`
//!
//! ## Usage
//! the server writes its diagnostics through crate `log`; nothing is printed
//! unless the application installs a logger (`env_logger`, ...).
//! [`set_debug_level`] maps a [`DebugLevel`] onto the maximum level of crate `log`.
//!
//! | DebugLevel | log level |
//! |---|---|
//! | None | off |
//! | Error | error |
//! | Warn | warn |
//! | Info | info |
//! | Detail | debug |
//! | Spew | trace, with hex dumps of every frame |
//!
//! ### Examples
//! ```rust
//! use plcconnector_log::*;
//!
//! set_debug_level(DebugLevel::Info);
//! assert_eq!(get_debug_level(), DebugLevel::Info);
//!
//! set_verbose(false);
//! assert_eq!(get_debug_level(), DebugLevel::Warn);
//! ```
#![warn(missing_docs)]

extern crate plcconnector_core;

pub use plcconnector_core::DebugLevel;

use log::LevelFilter;

/// `log` level filter of a debug level
#[inline]
pub fn level_filter(debug: DebugLevel) -> LevelFilter {
    match debug {
        DebugLevel::None => LevelFilter::Off,
        DebugLevel::Error => LevelFilter::Error,
        DebugLevel::Warn => LevelFilter::Warn,
        DebugLevel::Info => LevelFilter::Info,
        DebugLevel::Detail => LevelFilter::Debug,
        DebugLevel::Spew => LevelFilter::Trace,
    }
}

/// set the maximum level of crate `log`
#[inline]
pub fn set_debug_level(debug: DebugLevel) {
    log::set_max_level(level_filter(debug));
}

/// current maximum level of crate `log` as a debug level
#[inline]
pub fn get_debug_level() -> DebugLevel {
    match log::max_level() {
        LevelFilter::Off => DebugLevel::None,
        LevelFilter::Error => DebugLevel::Error,
        LevelFilter::Warn => DebugLevel::Warn,
        LevelFilter::Info => DebugLevel::Info,
        LevelFilter::Debug => DebugLevel::Detail,
        LevelFilter::Trace => DebugLevel::Spew,
    }
}

/// `true` logs every request with its status, `false` only warnings and errors
#[inline]
pub fn set_verbose(verbose: bool) {
    set_debug_level(if verbose {
        DebugLevel::Detail
    } else {
        DebugLevel::Warn
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::*;
    use std::sync::{Arc, Mutex};

    struct MemLogger {
        buf: Arc<Mutex<Vec<String>>>,
    }

    impl MemLogger {
        fn new() -> Self {
            Self {
                buf: Arc::new(Mutex::new(vec![])),
            }
        }

        fn buf(&self) -> Vec<String> {
            self.buf.lock().unwrap().clone()
        }

        fn init(&self) {
            let _ = log::set_boxed_logger(Box::new(self.clone()));
        }
    }

    impl Clone for MemLogger {
        fn clone(&self) -> Self {
            Self {
                buf: self.buf.clone(),
            }
        }
    }

    impl Log for MemLogger {
        fn enabled(&self, meta: &log::Metadata<'_>) -> bool {
            meta.level() <= log::max_level()
        }
        fn log(&self, record: &log::Record<'_>) {
            if self.enabled(record.metadata()) {
                self.buf
                    .lock()
                    .unwrap()
                    .push(format!("{} - {}", record.level(), record.args()));
            }
        }
        fn flush(&self) {}
    }

    #[test]
    fn test_level_mapping() {
        for v in 0..=5_u8 {
            let level = DebugLevel::from(v);
            let filter = level_filter(level);
            assert_eq!(filter as usize, v as usize);
        }
    }

    #[test]
    fn test_set_verbose() {
        let logger = MemLogger::new();
        logger.init();

        set_verbose(false);
        info!("request served");
        warn!("malformed frame");
        set_verbose(true);
        assert_eq!(get_debug_level(), DebugLevel::Detail);
        debug!("ReadTag -> success");
        trace!("recv: 65 00");
        set_debug_level(DebugLevel::None);
        error!("dropped");

        let buf = logger.buf();
        assert_eq!(
            buf,
            vec![
                "WARN - malformed frame".to_owned(),
                "DEBUG - ReadTag -> success".to_owned()
            ]
        );
    }
}
