//! Shared decoding helpers for the end-to-end tests, mirroring how an
//! offline trace reader would parse `memtrace`'s output format (spec.md §3
//! "Output file", §4.3–§4.4).

use memtrace::record::RECORD_SIZE;
use memtrace::sink::MAGIC;
use memtrace::Record;

pub struct DecodedFile {
    pub memory_map: String,
    pub frames: Vec<Vec<Record>>,
}

/// Parses a complete trace file: magic, NUL-terminated memory-map snapshot,
/// then a sequence of `length: u64 || payload` frames. `compressed` selects
/// whether each frame's payload went through [`memtrace::compress`]'s
/// double-LZ4 pass before being decoded into fixed-stride records.
pub fn decode_file(bytes: &[u8], compressed: bool) -> DecodedFile {
    assert_eq!(&bytes[0..8], MAGIC, "missing MEMACCES magic");
    let nul_pos = bytes[8..]
        .iter()
        .position(|&b| b == 0)
        .expect("NUL terminator after memory-map snapshot");
    let memory_map = String::from_utf8_lossy(&bytes[8..8 + nul_pos]).into_owned();

    let mut offset = 8 + nul_pos + 1;
    let mut frames = Vec::new();
    while offset < bytes.len() {
        let len = u64::from_ne_bytes(bytes[offset..offset + 8].try_into().unwrap()) as usize;
        offset += 8;
        let payload = &bytes[offset..offset + len];
        offset += len;

        let raw = if compressed {
            memtrace::compress::decompress_twice(payload).expect("valid double-LZ4 frame")
        } else {
            payload.to_vec()
        };
        assert_eq!(raw.len() % RECORD_SIZE, 0, "frame is not a whole number of records");
        let mut records = Vec::new();
        for cell in raw.chunks_exact(RECORD_SIZE) {
            let buf: [u8; RECORD_SIZE] = cell.try_into().unwrap();
            records.push(Record::from_bytes(&buf).expect("recognized discriminant"));
        }
        frames.push(records);
    }
    DecodedFile { memory_map, frames }
}

pub fn all_records(decoded: &DecodedFile) -> Vec<Record> {
    decoded.frames.iter().flatten().copied().collect()
}
