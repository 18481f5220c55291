//! Shared helpers: logging, wall clock time, strict number parsing.

use std::{fs::OpenOptions, io::{self, Write}, process::id, time::{Duration, SystemTime, UNIX_EPOCH}};
use chrono::Local;
use crate::server::server_read;

pub enum LogLevel {
    Debug,
    Verbose,
    Notice,
    Warning,
}

impl LogLevel {
    fn less(&self, rhs: &Self) -> bool {
        self.severity() < rhs.severity()
    }

    fn severity(&self) -> u8 {
        match self {
            Self::Debug => 0,
            Self::Verbose => 1,
            Self::Notice => 2,
            Self::Warning => 3,
        }
    }
}

impl Clone for LogLevel {
    fn clone(&self) -> Self {
        match self {
            Self::Debug => Self::Debug,
            Self::Verbose => Self::Verbose,
            Self::Notice => Self::Notice,
            Self::Warning => Self::Warning,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ch = match self {
            Self::Debug => '.',
            Self::Verbose => '-',
            Self::Notice => '*',
            Self::Warning => '#',
        };
        write!(f, "{ch}")
    }
}

pub fn log(level: LogLevel, body: &str) {
    let (verbosity, log_file) = {
        let server = server_read();
        (server.verbosity(), server.log_file().to_string())
    };
    if level.less(&verbosity) {
        return;
    }

    let line = format!("[{}] {} {} {}\n", id(), Local::now().format("%d %b %H:%M:%S%.3f"), level, body);
    if log_file.is_empty() {
        let _ = io::stdout().write_all(line.as_bytes());
    } else {
        match OpenOptions::new().create(true).append(true).open(&log_file) {
            Ok(mut f) => {
                if let Err(e) = f.write_all(line.as_bytes()) {
                    eprintln!("Can't write log: {}", e);
                }
            },
            Err(_) => {
                eprintln!("Can't open log file: {}", log_file);
            },
        }
    }
}

pub fn timestamp() -> Duration {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap()
}

/// Milliseconds since the epoch. Expiration deadlines and time events
/// are all expressed on this clock.
pub fn get_time_ms() -> u64 {
    timestamp().as_millis() as u64
}

pub fn add_ms_to_now(milliseconds: u64) -> u64 {
    get_time_ms() + milliseconds
}

pub fn error() -> i32 {
    io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

/// Strict string-to-i64 parser. Rejects empty strings, leading zeros,
/// bare signs and anything that overflows, so that a value which round-trips
/// through here is exactly the canonical decimal form.
pub fn to_int64(s: &str) -> Option<i64> {
    let bytes = s.as_bytes();
    if bytes.is_empty() || bytes.len() > 20 {
        return None;
    }
    let mut sign = 1i64;
    let mut start = 0usize;
    if bytes[0] == b'+' || bytes[0] == b'-' {
        if bytes[0] == b'-' {
            sign = -1;
        }
        start = 1;
        if bytes.len() == 1 {
            return None;
        }
    }
    // "0" is fine, "007" and "-07" are not
    if bytes[start] == b'0' && bytes.len() > start + 1 {
        return None;
    }
    let mut val: i64 = 0;
    for &b in &bytes[start..] {
        if !b.is_ascii_digit() {
            return None;
        }
        val = val.checked_mul(10)?.checked_add(sign * ((b - b'0') as i64))?;
    }
    Some(val)
}

/// Render a score the way the reply layer expects: plain fixed notation in
/// the human range, scientific outside of it.
pub fn float_to_string(fl: f64) -> String {
    if fl == f64::INFINITY {
        return "inf".to_string();
    }
    if fl == f64::NEG_INFINITY {
        return "-inf".to_string();
    }
    if fl.abs() >= 0.0001 && fl.abs() < 100000.0 || fl == 0.0 {
        format!("{:.6}", fl)
    } else {
        format!("{:e}", fl)
    }
}

pub fn digits10(mut v: u64) -> u32 {
    let mut digits = 1;
    while v >= 10 {
        v /= 10;
        digits += 1;
    }
    digits
}
