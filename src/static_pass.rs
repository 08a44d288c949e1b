//! Static instrumentation policy (C7).
//!
//! The compiler-plugin glue that iterates a module's IR is out of scope
//! (spec.md §1) — only the *decision* of what to instrument and what runtime
//! call to emit lives here. A real LLVM (or any other IR) pass maps its own
//! instruction types onto [`StaticInstr`] and lowers each [`StaticEmission`]
//! to a call into the [`crate::runtime`] entry points named in its comments.

use crate::record::Addr;

/// A minimal, IR-framework-agnostic shape of "the instructions a function
/// body contains", as seen by the original LLVM pass (`isInterestingMemoryAccess`
/// and the `MemIntrinsic`/`CallInst` branches of its instruction walk).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaticInstr {
    /// A plain load of `size` bytes from a pointer operand.
    Load { size_bytes: u8 },
    /// A plain store of `size` bytes to a pointer operand.
    Store { size_bytes: u8 },
    /// An atomic read-modify-write or compare-exchange. Recorded as a single
    /// write; the read half is a documented limitation (spec.md §9).
    AtomicRmw { size_bytes: u8 },
    /// A bulk memory intrinsic (`memcpy`/`memset`/`memmove`). The length
    /// operand is intentionally not recorded — `size_bytes` is always the
    /// sentinel `0` (spec.md §4.6, open question in §9).
    MemIntrinsic,
    /// A call instruction. Not instrumented — foreign-call interception is a
    /// future extension (spec.md §4.6).
    Call,
}

/// What the pass should insert for one [`StaticInstr`]: zero or one call
/// into `__mema_access`-equivalent runtime entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticEmission {
    pub size_bytes: u8,
    pub is_write: bool,
}

/// Classifies one IR instruction, returning the `access()` call to insert
/// (`None` for `Call`, which is never instrumented).
pub fn classify(instr: StaticInstr) -> Option<StaticEmission> {
    match instr {
        StaticInstr::Load { size_bytes } => Some(StaticEmission {
            size_bytes,
            is_write: false,
        }),
        StaticInstr::Store { size_bytes } => Some(StaticEmission {
            size_bytes,
            is_write: true,
        }),
        StaticInstr::AtomicRmw { size_bytes } => Some(StaticEmission {
            size_bytes,
            is_write: true,
        }),
        StaticInstr::MemIntrinsic => Some(StaticEmission {
            size_bytes: 0,
            is_write: true,
        }),
        StaticInstr::Call => None,
    }
}

/// Describes the per-function entry/exit instrumentation every
/// non-declaration function receives (spec.md §4.6): one `func_enter` call
/// at the top, one `func_exit` call before each return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionInstrumentation {
    pub addr: Addr,
}

impl FunctionInstrumentation {
    pub fn new(addr: Addr) -> Self {
        FunctionInstrumentation { addr }
    }
}

/// Marker describing the module constructor a static pass must append once
/// per module: a call to the runtime initializer before `main`
/// (`kMemaModuleCtorName` / `kMemaInitName` in the original; spec.md §4.6).
pub const MODULE_CTOR_NAME: &str = "memtrace.module_ctor";
pub const RUNTIME_INIT_NAME: &str = "__memtrace_initialize";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_becomes_a_read_access() {
        let e = classify(StaticInstr::Load { size_bytes: 4 }).unwrap();
        assert_eq!(e, StaticEmission { size_bytes: 4, is_write: false });
    }

    #[test]
    fn store_becomes_a_write_access() {
        let e = classify(StaticInstr::Store { size_bytes: 8 }).unwrap();
        assert_eq!(e, StaticEmission { size_bytes: 8, is_write: true });
    }

    #[test]
    fn atomic_rmw_is_a_single_write() {
        let e = classify(StaticInstr::AtomicRmw { size_bytes: 4 }).unwrap();
        assert!(e.is_write);
        assert_eq!(e.size_bytes, 4);
    }

    #[test]
    fn mem_intrinsic_uses_size_zero_sentinel() {
        let e = classify(StaticInstr::MemIntrinsic).unwrap();
        assert_eq!(e.size_bytes, 0);
        assert!(e.is_write);
    }

    #[test]
    fn calls_are_not_instrumented() {
        assert_eq!(classify(StaticInstr::Call), None);
    }
}
