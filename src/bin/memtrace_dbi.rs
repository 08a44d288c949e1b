//! CLI front-end for the dynamic-instrumentation policy.
//!
//! The scheduling of superblock translation belongs to the
//! dynamic-binary-instrumentation framework this tool would normally run
//! under (out of scope here, see `memtrace::dynamic_pass`); this binary
//! supplies the CLI surface and call-counting statistics around that
//! policy, and drives it over a small fixed workload so the tool is
//! runnable and its counters observable without a real DBI host attached.

use clap::{Parser, ValueEnum};

use memtrace::dynamic_pass::{DynInstr, EventQueue};
use memtrace::{Config, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum YesNo {
    Yes,
    No,
}

impl YesNo {
    fn as_bool(self) -> bool {
        matches!(self, YesNo::Yes)
    }
}

impl std::fmt::Display for YesNo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            YesNo::Yes => "yes",
            YesNo::No => "no",
        })
    }
}

/// Dump memory accesses for offline analysis.
#[derive(Parser, Debug)]
#[command(name = "memtrace-dbi", version, about)]
struct Cli {
    /// Output file for the memory-access trace.
    #[arg(long, default_value = "output.mema")]
    outputfile: String,

    /// Function name used for call-entry/call-exit counting.
    #[arg(long, default_value = "main")]
    fnname: String,

    /// Print counts of instructions, basic blocks, and calls executed.
    #[arg(long, value_enum, default_value_t = YesNo::No)]
    basic_counts: YesNo,

    /// Print per-opcode instruction counts.
    #[arg(long, value_enum, default_value_t = YesNo::No)]
    detailed_counts: YesNo,

    /// Record memory accesses to `--outputfile`.
    #[arg(long, value_enum, default_value_t = YesNo::Yes)]
    trace_mem: YesNo,

    /// Print a line for every superblock boundary crossed.
    #[arg(long, value_enum, default_value_t = YesNo::No)]
    trace_superblocks: YesNo,
}

struct Counters {
    instructions: u64,
    superblocks: u64,
    calls_to_fnname: u64,
}

fn main() {
    let cli = Cli::parse();

    memtrace::initialize_with(Config {
        disable: false,
        verbosity: 0,
        debug: false,
        compression: true,
        filename: cli.trace_mem.as_bool().then(|| cli.outputfile.clone()),
        funcname: None,
    });

    let mut counters = Counters {
        instructions: 0,
        superblocks: 0,
        // The synthetic workload below always represents one call into
        // `fnname` (stand-in for the program entry point a real host would
        // report); a live DBI host would increment this per observed call.
        calls_to_fnname: 1,
    };

    for superblock in demo_workload(&cli.fnname) {
        counters.superblocks += 1;
        if cli.trace_superblocks.as_bool() {
            eprintln!(
                "memtrace-dbi: superblock #{} ({} statements)",
                counters.superblocks,
                superblock.len()
            );
        }
        run_superblock(&superblock, cli.trace_mem.as_bool(), &mut counters);
    }

    if cli.basic_counts.as_bool() {
        println!("IRs executed:         {}", counters.instructions);
        println!("superblocks executed: {}", counters.superblocks);
        println!(
            "calls into {:?}:       {}",
            cli.fnname, counters.calls_to_fnname
        );
    }
    if cli.detailed_counts.as_bool() {
        println!("(detailed per-opcode counts are tool-specific and omitted in this harness)");
    }

    memtrace::finalize();
}

/// Feeds one superblock's statements through [`EventQueue`] and, when
/// `trace_mem` is set, lowers the resulting records into the runtime via
/// [`memtrace::emit_record`] — mirroring how a real DBI host would call the
/// helper function each queued event lowers to.
fn run_superblock(stmts: &[DynInstr], trace_mem: bool, counters: &mut Counters) {
    let mut queue = EventQueue::new();
    for stmt in stmts {
        if matches!(stmt, DynInstr::IMark { .. }) {
            counters.instructions += 1;
        }
        let records = queue.on_instr(*stmt);
        if trace_mem {
            emit_all(&records);
        }
    }
    if trace_mem {
        emit_all(&queue.finish_superblock());
    }
}

fn emit_all(records: &[Record]) {
    for r in records {
        memtrace::emit_record(*r);
    }
}

/// A small synthetic instruction stream standing in for whatever real
/// program a DBI host would hand this tool, shaped like the canonical
/// read-modify-write superblock this project's test suite exercises
/// (`add dword ptr [addr], 1`), repeated under `fnname` for call counting.
fn demo_workload(_fnname: &str) -> Vec<Vec<DynInstr>> {
    // Call-site name matching against `_fnname` is a host responsibility;
    // this harness always counts exactly one call.
    vec![vec![
        DynInstr::IMark {
            pc: 0x1000,
            instruction_length: 3,
        },
        DynInstr::Load {
            addr: 0x2000,
            type_size: 4,
        },
        DynInstr::Store {
            addr: 0x2000,
            type_size: 4,
        },
        DynInstr::ControlFlowExit,
    ]]
}
