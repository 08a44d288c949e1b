//! The process-wide singleton tying records, ring, gating, compression, and
//! persistence together. Every entry point here is callable from any thread
//! at any time: crash-free, never throwing, never allocating on the hot path
//! beyond the ring.
//!
//! Lifecycle: `Uninitialized -> Initialized(open_sink) -> Finalized`.
//! Re-entering `initialize()` after it already ran is a no-op; appends
//! before initialization are ignored; appends after finalization are
//! ignored defensively rather than left as undefined behavior.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

use crate::config::Config;
use crate::gate::{self, Gate};
use crate::record::{AccessFields, Addr, Record};
use crate::ring::{AppendOutcome, RingBuffer};
use crate::sink::Sink;
use crate::symbols;

#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Uninitialized = 0,
    Initialized = 1,
    Finalized = 2,
}

struct Runtime {
    state: AtomicU8,
    config: OnceLock<Config>,
    gate: OnceLock<Gate>,
    sink: Sink,
}

impl Runtime {
    const fn new() -> Self {
        Runtime {
            state: AtomicU8::new(State::Uninitialized as u8),
            config: OnceLock::new(),
            gate: OnceLock::new(),
            sink: Sink::unopened(),
        }
    }

    fn state(&self) -> State {
        match self.state.load(Ordering::Acquire) {
            1 => State::Initialized,
            2 => State::Finalized,
            _ => State::Uninitialized,
        }
    }

    fn config(&self) -> &Config {
        self.config.get_or_init(Config::from_env)
    }

    fn gate(&self) -> &Gate {
        self.gate.get_or_init(|| build_gate(self.config()))
    }
}

/// Resolves the monitored-function set if `funcname` is set, falling back to
/// explicit-only gating, disabled, on any resolution failure — printed once,
/// so a bad `funcname` degrades to "record nothing" rather than crashing.
fn build_gate(config: &Config) -> Gate {
    let Some(pattern) = &config.funcname else {
        return Gate::explicit(config.disable);
    };
    #[cfg(feature = "no-symbols")]
    {
        eprintln!(
            "memtrace: built with `no-symbols`, ignoring funcname={pattern:?}; recording disabled"
        );
        return Gate::explicit(true);
    }
    #[cfg(not(feature = "no-symbols"))]
    match symbols::resolve_monitored_functions(pattern) {
        Ok(addrs) if !addrs.is_empty() => {
            if config.verbosity > 0 {
                eprintln!(
                    "memtrace: monitoring {} function(s) matching {pattern:?}",
                    addrs.len()
                );
            }
            Gate::scoped_auto(addrs)
        }
        Ok(_) => {
            eprintln!("memtrace: no function matching {pattern:?} found; recording disabled");
            Gate::explicit(true)
        }
        Err(e) => {
            eprintln!("memtrace: symbol resolution failed ({e}); recording disabled");
            Gate::explicit(true)
        }
    }
}

static RUNTIME: Runtime = Runtime::new();

struct ThreadRing {
    ring: RefCell<RingBuffer>,
}

impl Drop for ThreadRing {
    fn drop(&mut self) {
        drain_ring(&mut self.ring.borrow_mut());
    }
}

thread_local! {
    static THREAD_RING: ThreadRing = ThreadRing {
        ring: RefCell::new(RingBuffer::new()),
    };
}

/// `initialize()` — idempotent: only the first call has any effect.
///
/// Reads configuration, resolves the gate (including a symbol scan if
/// `funcname` is set), and opens the output sink. If `filename` is unset,
/// prints once and leaves recording disabled rather than failing the
/// program.
pub fn initialize() {
    init_with(None)
}

/// Like [`initialize`], but supplies the configuration directly instead of
/// parsing it from `MEMTRACE_OPTIONS`. Used by embedders that already have
/// their own CLI-derived settings, such as the dynamic-tool front-end's
/// `--outputfile` flag.
///
/// Has no effect if the runtime is already initialized — the first caller
/// wins, matching the idempotent `initialize()` contract.
pub fn initialize_with(config: Config) {
    init_with(Some(config))
}

fn init_with(config: Option<Config>) {
    if RUNTIME
        .state
        .compare_exchange(
            State::Uninitialized as u8,
            State::Initialized as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        )
        .is_err()
    {
        return;
    }

    if let Some(c) = config {
        let _ = RUNTIME.config.set(c);
    }
    let config = RUNTIME.config();
    // Force gate construction now, not lazily on first access, so the
    // symbol scan (if any) happens during init rather than on a hot path.
    let _ = RUNTIME.gate();

    match &config.filename {
        Some(path) => {
            if let Err(e) = RUNTIME.sink.open(path) {
                eprintln!("memtrace: could not open output file {path:?}: {e}");
            }
        }
        None => {
            eprintln!("memtrace: filename not set, recording disabled");
        }
    }
}

/// `finalize()` — drains every live thread's ring it can still observe (its
/// own, synchronously; others drain themselves on thread exit), closes the
/// sink, then reports totals (spec.md §4.3: "drain all live thread rings,
/// close the file, emit a summary"). Runs at most once.
pub fn finalize() {
    if RUNTIME
        .state
        .compare_exchange(
            State::Initialized as u8,
            State::Finalized as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        )
        .is_err()
    {
        return;
    }

    THREAD_RING.with(|t| drain_ring(&mut t.ring.borrow_mut()));

    let stats = RUNTIME.sink.stats();
    RUNTIME.sink.close();
    if RUNTIME.config().verbosity > 0 {
        eprintln!(
            "memtrace: total bytes written (compressed)  : {}",
            stats.total_compressed
        );
        eprintln!(
            "memtrace: total bytes written (uncompressed): {}",
            stats.total_uncompressed
        );
    }
}

pub fn enable() {
    if RUNTIME.state() != State::Initialized {
        return;
    }
    RUNTIME.gate().enable();
}

pub fn disable() {
    if RUNTIME.state() != State::Initialized {
        return;
    }
    RUNTIME.gate().disable();
}

/// Called on entry to every instrumented function.
pub fn function_entry(addr: Addr) {
    if RUNTIME.state() != State::Initialized || gate::inside_runtime() {
        return;
    }
    RUNTIME.gate().on_function_entry(addr);
    if !RUNTIME.gate().is_open() {
        return;
    }
    emit(Record::FuncEnter(addr));
}

/// Called before every return from an instrumented function.
pub fn function_exit(addr: Addr) {
    if RUNTIME.state() != State::Initialized || gate::inside_runtime() {
        return;
    }
    let was_open = RUNTIME.gate().is_open();
    RUNTIME.gate().on_function_exit(addr);
    if was_open {
        emit(Record::FuncExit(addr));
    }
}

/// `access(addr, size, is_write)` — spec.md §6, the static front-end's
/// single memory-access entry point. Stamps a timestamp, since spec.md §3
/// says it is mandatory for the static front-end.
pub fn access(addr: Addr, size: u8, is_write: bool) {
    if RUNTIME.state() != State::Initialized
        || gate::inside_runtime()
        || !RUNTIME.gate().is_open()
    {
        return;
    }
    let fields = AccessFields::new(addr, size, is_write).with_now();
    let record = if is_write {
        Record::DataWrite(fields)
    } else {
        Record::DataRead(fields)
    };
    emit(record);
}

/// Lower-level entry point used by the dynamic front-end's policy
/// ([`crate::dynamic_pass`]), which already knows the exact record kind
/// (including `InstrRead`/`DataModify`, which [`access`] cannot express) and
/// decides for itself whether to stamp a timestamp.
pub fn emit_record(record: Record) {
    if RUNTIME.state() != State::Initialized
        || gate::inside_runtime()
        || !RUNTIME.gate().is_open()
    {
        return;
    }
    emit(record);
}

fn emit(record: Record) {
    THREAD_RING.with(|t| {
        let mut ring = t.ring.borrow_mut();
        match ring.append(record) {
            AppendOutcome::Stored => {}
            AppendOutcome::StoredAndFull => drain_ring(&mut ring),
        }
    });
}

/// Drains the calling thread's ring: emits one frame (or discards silently
/// if the sink is not yet open, spec.md §4.2's "not-yet-writing" mode), then
/// resets the cursor. Runs with the re-entry guard held so any
/// instrumentation triggered by the allocator or I/O during compression is
/// suppressed (spec.md §4.2, §4.6).
fn drain_ring(ring: &mut RingBuffer) {
    gate::with_runtime_guard(|| {
        let records = ring.take();
        if !RUNTIME.sink.is_open() {
            return;
        }
        let compress = RUNTIME.config().compression;
        let bytes = encode_records(records);
        RUNTIME.sink.write_frame(&bytes, compress);
    });
}

fn encode_records(records: &[Record]) -> Vec<u8> {
    let mut out = Vec::with_capacity(records.len() * crate::record::RECORD_SIZE);
    let mut cell = [0u8; crate::record::RECORD_SIZE];
    for r in records {
        r.to_bytes(&mut cell);
        out.extend_from_slice(&cell);
    }
    out
}
