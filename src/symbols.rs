//! Resolves the monitored-function address set for scoped-auto gating (C6).
//!
//! A subprocess-based approach — shelling out to `nm` and parsing its output
//! line-by-line — would work but adds a process-spawn and a text-parsing
//! failure mode for every scan. This parses the running executable's own
//! symbol table directly with the `object` crate instead, portable across
//! ELF and Mach-O with no subprocess involved.

use std::collections::BTreeSet;

use glob::Pattern;
use object::{Object, ObjectSymbol};

/// Scans the current executable's symbol table and returns the addresses of
/// every function whose demangled (or, failing that, raw mangled) name
/// matches `pattern` (a glob, e.g. `bubble*Sort`).
pub fn resolve_monitored_functions(pattern: &str) -> anyhow::Result<BTreeSet<u64>> {
    let exe = current_executable_path()?;
    let data = std::fs::read(&exe)
        .map_err(|e| anyhow::anyhow!("cannot read executable {} for symbol scan: {e}", exe))?;
    let file = object::File::parse(&*data)
        .map_err(|e| anyhow::anyhow!("cannot parse executable {} symbol table: {e}", exe))?;

    let glob = Pattern::new(pattern)
        .map_err(|e| anyhow::anyhow!("invalid funcname glob {pattern:?}: {e}"))?;
    let bias = load_bias(&exe).unwrap_or(0);

    let mut addrs = BTreeSet::new();
    for sym in file.symbols() {
        if !sym.is_definition() {
            continue;
        }
        let Ok(mangled) = sym.name() else { continue };
        let demangled = rustc_demangle::demangle(mangled).to_string();
        if glob.matches(&demangled) || glob.matches(mangled) {
            addrs.insert(sym.address() + bias);
        }
    }
    Ok(addrs)
}

/// The difference between where the running process actually loaded `exe`
/// and the addresses recorded in its own symbol table, so addresses handed
/// to [`crate::runtime::function_entry`] (real function pointers, already
/// relocated) can be compared against this module's resolved set. Zero for a
/// non-relocated (`ET_EXEC`) binary; nonzero for a PIE (`ET_DYN`) one.
///
/// Found by locating the `/proc/self/maps` mapping of `exe` whose file
/// offset is zero — that mapping's start address is where file-offset (and
/// therefore symbol-table-relative) zero actually landed.
#[cfg(target_os = "linux")]
fn load_bias(exe: &str) -> anyhow::Result<u64> {
    let canonical = std::fs::canonicalize(exe)?;
    let maps = std::fs::read_to_string("/proc/self/maps")?;
    for line in maps.lines() {
        let mut fields = line.split_whitespace();
        let Some(range) = fields.next() else { continue };
        let Some(_perms) = fields.next() else { continue };
        let Some(offset) = fields.next() else { continue };
        let _dev = fields.next();
        let _inode = fields.next();
        let Some(pathname) = fields.next() else { continue };
        if std::fs::canonicalize(pathname).ok().as_deref() != Some(canonical.as_path()) {
            continue;
        }
        if u64::from_str_radix(offset, 16) != Ok(0) {
            continue;
        }
        let Some(start) = range.split('-').next() else { continue };
        return Ok(u64::from_str_radix(start, 16)?);
    }
    Ok(0)
}

#[cfg(not(target_os = "linux"))]
fn load_bias(_exe: &str) -> anyhow::Result<u64> {
    Ok(0)
}

#[cfg(target_os = "linux")]
fn current_executable_path() -> anyhow::Result<String> {
    std::fs::read_link("/proc/self/exe")
        .map(|p| p.to_string_lossy().into_owned())
        .map_err(anyhow::Error::from)
}

#[cfg(not(target_os = "linux"))]
fn current_executable_path() -> anyhow::Result<String> {
    std::env::current_exe()
        .map(|p| p.to_string_lossy().into_owned())
        .map_err(anyhow::Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scanning_self_finds_a_known_symbol() {
        // The running test binary always exports at least one symbol whose
        // demangled name contains "symbols::tests", since that's this
        // module's own test path.
        let addrs = resolve_monitored_functions("*symbols*tests*").unwrap();
        assert!(!addrs.is_empty());
    }

    #[test]
    fn non_matching_pattern_yields_empty_set() {
        let addrs =
            resolve_monitored_functions("definitely_not_a_real_function_name_xyz").unwrap();
        assert!(addrs.is_empty());
    }

    #[test]
    fn invalid_glob_pattern_errors() {
        assert!(resolve_monitored_functions("[").is_err());
    }

    #[test]
    fn resolved_address_matches_a_live_function_pointer() {
        #[inline(never)]
        fn memtrace_symbols_probe_target() -> u32 {
            std::hint::black_box(42)
        }
        let want = memtrace_symbols_probe_target as usize as u64;
        let addrs = resolve_monitored_functions("*memtrace_symbols_probe_target*").unwrap();
        assert!(
            addrs.contains(&want),
            "load-bias-corrected address should match the function's own runtime pointer"
        );
    }
}
