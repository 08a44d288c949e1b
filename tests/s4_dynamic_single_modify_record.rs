//! End-to-end: a dynamic-front-end superblock doing `add dword ptr [addr], 1`
//! lowers to a single `DataModify` record once the runtime writes it out
//! (spec.md §8 "S4", §4.7 merge rule).

mod common;

use memtrace::dynamic_pass::{DynInstr, EventQueue};
use memtrace::{Config, Record};

#[test]
fn read_modify_write_superblock_yields_one_modify_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.mema");

    memtrace::initialize_with(Config {
        disable: false,
        verbosity: 0,
        debug: false,
        compression: false,
        filename: Some(path.to_str().unwrap().to_string()),
        funcname: None,
    });

    let mut queue = EventQueue::new();
    for r in queue.on_instr(DynInstr::IMark {
        pc: 0x1000,
        instruction_length: 3,
    }) {
        memtrace::emit_record(r);
    }
    for r in queue.on_instr(DynInstr::Load {
        addr: 0x5000,
        type_size: 4,
    }) {
        memtrace::emit_record(r);
    }
    for r in queue.on_instr(DynInstr::Store {
        addr: 0x5000,
        type_size: 4,
    }) {
        memtrace::emit_record(r);
    }
    for r in queue.finish_superblock() {
        memtrace::emit_record(r);
    }
    memtrace::finalize();

    let bytes = std::fs::read(&path).unwrap();
    let decoded = common::decode_file(&bytes, false);
    let records = common::all_records(&decoded);

    let modifies: Vec<_> = records
        .iter()
        .filter(|r| matches!(r, Record::DataModify(_)))
        .collect();
    assert_eq!(modifies.len(), 1);
    if let Record::DataModify(f) = modifies[0] {
        assert_eq!(f.addr, 0x5000);
        assert_eq!(f.size, 4);
    }
    assert!(!records.iter().any(|r| matches!(r, Record::DataWrite(_))));
    assert_eq!(
        records
            .iter()
            .filter(|r| matches!(r, Record::InstrRead(_)))
            .count(),
        1
    );
}
