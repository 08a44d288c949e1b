//! End-to-end: a short traced call sequence with compression on, read back
//! and decoded bit-for-bit (spec.md §8 "S1").

mod common;

use memtrace::{Config, Record};

#[test]
fn sort_like_sequence_round_trips_through_compression() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.mema");

    memtrace::initialize_with(Config {
        disable: false,
        verbosity: 0,
        debug: false,
        compression: true,
        filename: Some(path.to_str().unwrap().to_string()),
        funcname: None,
    });

    const MAIN: u64 = 0x4000;
    memtrace::function_entry(MAIN);
    for i in 0..16u64 {
        memtrace::access(0x8000 + i * 8, 8, false);
        memtrace::access(0x8000 + i * 8, 8, true);
    }
    memtrace::function_exit(MAIN);
    memtrace::finalize();

    let bytes = std::fs::read(&path).unwrap();
    let decoded = common::decode_file(&bytes, true);
    let records = common::all_records(&decoded);

    assert_eq!(records.first(), Some(&Record::FuncEnter(MAIN)));
    assert_eq!(records.last(), Some(&Record::FuncExit(MAIN)));
    assert_eq!(records.len(), 2 + 32, "func enter/exit plus 16 reads + 16 writes");
    assert!(
        records
            .iter()
            .filter(|r| matches!(r, Record::DataWrite(_)))
            .count()
            == 16
    );
}
