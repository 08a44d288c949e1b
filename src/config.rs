//! Options-string configuration (C2).
//!
//! Parses a single opaque string — the value of the `MEMTRACE_OPTIONS`
//! environment variable — into a typed [`Config`]. The parser never fails:
//! malformed values leave the corresponding field at its default, and
//! unrecognized tokens are silently ignored for forward compatibility
//! (spec.md §4.1).

use std::env;

/// Recognized options and their defaults, per spec.md §3 "Configuration".
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub disable: bool,
    pub verbosity: i32,
    pub debug: bool,
    pub compression: bool,
    pub filename: Option<String>,
    pub funcname: Option<String>,
}

const ENV_VAR: &str = "MEMTRACE_OPTIONS";

impl Config {
    /// Defaults per spec.md §3: `compression` is on unless told otherwise.
    fn with_defaults() -> Self {
        Config {
            disable: false,
            verbosity: 0,
            debug: false,
            compression: true,
            filename: None,
            funcname: None,
        }
    }

    /// Reads and parses `MEMTRACE_OPTIONS`, matching the original's
    /// `getenv("MEMA_OPTIONS")` + `InitializeFlags` pair.
    pub fn from_env() -> Self {
        match env::var(ENV_VAR) {
            Ok(s) => Self::parse(&s),
            Err(_) => Self::with_defaults(),
        }
    }

    /// Parses `s` against every recognized option name, leaving unmatched
    /// fields at their default.
    pub fn parse(s: &str) -> Self {
        let mut cfg = Self::with_defaults();
        parse_bool(s, "disable", &mut cfg.disable);
        parse_int(s, "verbosity", &mut cfg.verbosity);
        parse_bool(s, "debug", &mut cfg.debug);
        parse_bool(s, "compression", &mut cfg.compression);
        parse_string(s, "filename", &mut cfg.filename);
        parse_string(s, "funcname", &mut cfg.funcname);
        cfg
    }
}

/// Extracts the raw value for `name` in `s`, per spec.md §4.1. If the
/// character right after the name is not `=`, the option is present with an
/// empty value (a bare flag token, left unmatched by every synonym table
/// below — which is how an unadorned `disable` leaves the field untouched).
/// After a leading `=`, a quote introduces a quoted value terminated by the
/// matching quote (or end-of-string if unterminated); otherwise the value
/// runs to the next whitespace or end-of-string.
fn get_value<'a>(s: &'a str, name: &str) -> Option<&'a str> {
    let pos = s.find(name)?;
    let after_name = pos + name.len();
    let rest = &s[after_name..];
    let mut chars = rest.char_indices();
    match chars.next() {
        Some((_, '=')) => {
            let value_start = 1;
            let value = &rest[value_start..];
            match value.chars().next() {
                Some(q @ ('"' | '\'')) => {
                    let inner = &value[1..];
                    match inner.find(q) {
                        Some(end) => Some(&inner[..end]),
                        None => Some(inner),
                    }
                }
                _ => match value.find(char::is_whitespace) {
                    Some(end) => Some(&value[..end]),
                    None => Some(value),
                },
            }
        }
        _ => Some(""),
    }
}

fn parse_bool(s: &str, name: &str, field: &mut bool) {
    let Some(val) = get_value(s, name) else {
        return;
    };
    match val {
        "0" | "no" | "false" => *field = false,
        "1" | "yes" | "true" => *field = true,
        _ => {}
    }
}

fn parse_int(s: &str, name: &str, field: &mut i32) {
    let Some(val) = get_value(s, name) else {
        return;
    };
    if let Ok(n) = val.parse() {
        *field = n;
    }
}

fn parse_string(s: &str, name: &str, field: &mut Option<String>) {
    let Some(val) = get_value(s, name) else {
        return;
    };
    if !val.is_empty() {
        *field = Some(val.to_string());
    }
}
