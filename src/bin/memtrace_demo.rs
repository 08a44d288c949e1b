//! A statically-instrumented target program, standing in for what the
//! compiler plugin described by `memtrace::static_pass` would generate: a
//! module constructor calling the runtime initializer before `main`, explicit
//! `function_entry`/`function_exit`/`access` calls around a small workload,
//! and a module destructor finalizing the trace on the way out (spec.md
//! §4.6, §4.8). Configuration comes from `MEMTRACE_OPTIONS`, exactly as it
//! would for a real instrumented binary.

const MAIN_ADDR: u64 = 0x1000;
const BUBBLE_SORT_ADDR: u64 = 0x2000;

#[ctor::ctor]
fn module_ctor() {
    memtrace::initialize();
}

#[ctor::dtor]
fn module_dtor() {
    memtrace::finalize();
}

fn main() {
    memtrace::function_entry(MAIN_ADDR);
    let mut data = [5i64, 3, 8, 1, 9, 2];
    bubble_sort(&mut data);
    memtrace::function_exit(MAIN_ADDR);

    let _ = std::hint::black_box(&data);
}

/// Every read and write the sort performs is reported through
/// [`memtrace::access`], the way the static pass's `isInterestingMemoryAccess`
/// classification (spec.md §4.6) would have inserted it around each array
/// element load/store.
fn bubble_sort(data: &mut [i64]) {
    memtrace::function_entry(BUBBLE_SORT_ADDR);
    let base = data.as_ptr() as u64;
    let n = data.len();
    for i in 0..n {
        for j in 0..n.saturating_sub(i + 1) {
            let addr_j = base + (j * std::mem::size_of::<i64>()) as u64;
            let addr_j1 = base + ((j + 1) * std::mem::size_of::<i64>()) as u64;
            memtrace::access(addr_j, 8, false);
            memtrace::access(addr_j1, 8, false);
            if data[j] > data[j + 1] {
                data.swap(j, j + 1);
                memtrace::access(addr_j, 8, true);
                memtrace::access(addr_j1, 8, true);
            }
        }
    }
    memtrace::function_exit(BUBBLE_SORT_ADDR);
}
