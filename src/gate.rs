//! Gating / enable logic (C6).
//!
//! A process-wide `disable` flag plus, when `funcname` is configured, a
//! scoped-auto mode: the gate opens while the current call chain contains at
//! least one monitored function, tracked by a per-thread depth counter.
//! Re-entry is guarded per-thread so the runtime's own allocator/I/O traffic
//! never recurses into itself.

use std::cell::Cell;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide gate state.
///
/// `disable` is deliberately racy: a transient miss or duplicate record
/// across threads when another thread flips it is acceptable. The
/// monitored-function set is populated once at startup and never mutated
/// afterward, so unguarded reads from any thread are safe.
pub struct Gate {
    disable: AtomicBool,
    scoped_auto: AtomicBool,
    monitored: BTreeSet<u64>,
}

thread_local! {
    static INSIDE_RUNTIME: Cell<bool> = const { Cell::new(false) };
    static MONITOR_DEPTH: Cell<u32> = const { Cell::new(0) };
}

impl Gate {
    /// Gate with explicit-only control: open unless `disable` is set.
    pub fn explicit(initially_disabled: bool) -> Self {
        Gate {
            disable: AtomicBool::new(initially_disabled),
            scoped_auto: AtomicBool::new(false),
            monitored: BTreeSet::new(),
        }
    }

    /// Gate in scoped-auto mode: starts disabled, `monitored` opens it on
    /// entry to any listed address.
    pub fn scoped_auto(monitored: BTreeSet<u64>) -> Self {
        Gate {
            disable: AtomicBool::new(true),
            scoped_auto: AtomicBool::new(true),
            monitored,
        }
    }

    pub fn enable(&self) {
        self.disable.store(false, Ordering::Relaxed);
    }

    pub fn disable(&self) {
        self.disable.store(true, Ordering::Relaxed);
    }

    pub fn is_scoped_auto(&self) -> bool {
        self.scoped_auto.load(Ordering::Relaxed)
    }

    fn is_monitored(&self, addr: u64) -> bool {
        self.monitored.contains(&addr)
    }

    /// Handles `FuncEnter(addr)`: opens the gate on the outermost entry into
    /// a monitored function, always bumps the depth counter for a monitored
    /// address.
    pub fn on_function_entry(&self, addr: u64) {
        if !self.scoped_auto.load(Ordering::Relaxed) || !self.is_monitored(addr) {
            return;
        }
        let depth = MONITOR_DEPTH.with(|d| d.get());
        if depth == 0 {
            self.enable();
        }
        MONITOR_DEPTH.with(|d| d.set(depth + 1));
    }

    /// Handles `FuncExit(addr)`: decrements depth, closes the gate once it
    /// reaches zero.
    pub fn on_function_exit(&self, addr: u64) {
        if !self.scoped_auto.load(Ordering::Relaxed) || !self.is_monitored(addr) {
            return;
        }
        let depth = MONITOR_DEPTH.with(|d| d.get());
        let depth = depth.saturating_sub(1);
        MONITOR_DEPTH.with(|d| d.set(depth));
        if depth == 0 {
            self.disable();
        }
    }

    /// Whether recording is currently permitted. Does not consider
    /// re-entrancy — callers must also check [`inside_runtime`].
    pub fn is_open(&self) -> bool {
        !self.disable.load(Ordering::Relaxed)
    }
}

/// True while the current thread is inside runtime code that must not
/// recursively trigger instrumentation (e.g. drain's own compression and
/// I/O, which may call an instrumented allocator).
pub fn inside_runtime() -> bool {
    INSIDE_RUNTIME.with(|c| c.get())
}

/// Runs `f` with the per-thread re-entry guard held, restoring the previous
/// value afterward (so nested calls on the same thread behave correctly).
pub fn with_runtime_guard<R>(f: impl FnOnce() -> R) -> R {
    let was_inside = INSIDE_RUNTIME.with(|c| c.replace(true));
    let result = f();
    INSIDE_RUNTIME.with(|c| c.set(was_inside));
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_gate_toggles() {
        let gate = Gate::explicit(false);
        assert!(gate.is_open());
        gate.disable();
        assert!(!gate.is_open());
        gate.enable();
        assert!(gate.is_open());
    }

    #[test]
    fn scoped_auto_opens_only_inside_monitored_call() {
        let mut set = BTreeSet::new();
        set.insert(0x1000);
        let gate = Gate::scoped_auto(set);
        assert!(!gate.is_open());

        gate.on_function_entry(0x1000);
        assert!(gate.is_open());

        gate.on_function_exit(0x1000);
        assert!(!gate.is_open());
    }

    #[test]
    fn scoped_auto_handles_nested_monitored_calls() {
        let mut set = BTreeSet::new();
        set.insert(0x1000);
        let gate = Gate::scoped_auto(set);

        gate.on_function_entry(0x1000);
        gate.on_function_entry(0x1000); // recursive call
        assert!(gate.is_open());

        gate.on_function_exit(0x1000);
        assert!(gate.is_open(), "still inside outer call");

        gate.on_function_exit(0x1000);
        assert!(!gate.is_open());
    }

    #[test]
    fn scoped_auto_ignores_unmonitored_functions() {
        let mut set = BTreeSet::new();
        set.insert(0x1000);
        let gate = Gate::scoped_auto(set);
        gate.on_function_entry(0x2000);
        assert!(!gate.is_open());
    }

    #[test]
    fn reentry_guard_nests_correctly() {
        assert!(!inside_runtime());
        with_runtime_guard(|| {
            assert!(inside_runtime());
            with_runtime_guard(|| {
                assert!(inside_runtime());
            });
            assert!(inside_runtime(), "still inside the outer guard");
        });
        assert!(!inside_runtime());
    }
}
