//! Double-pass LZ4 compression for drained frames (C4).
//!
//! LZ4 itself is consumed as a library with a documented contract, via the
//! `lz4_flex` crate, rather than reimplemented; this module only implements
//! the framing policy: compress twice, prefix with a machine-word length,
//! track running byte counters.

use lz4_flex::block::{compress_into, decompress, get_maximum_output_size};

/// Result of compressing one drained frame's payload.
pub struct CompressedFrame {
    /// The bytes to write after the length prefix.
    pub payload: Vec<u8>,
    /// `sizeof(length) + payload.len()`, for the compressed byte counter.
    pub frame_bytes: usize,
}

/// Runs the payload through LZ4 twice.
///
/// The second pass is cheap when the first pass already yields
/// near-incompressible data, and empirically reduces size further on
/// memory-access streams with long runs of similar addresses.
pub fn compress_twice(payload: &[u8]) -> CompressedFrame {
    let c1 = lz4_block_compress(payload);
    let c2 = lz4_block_compress(&c1);
    CompressedFrame {
        frame_bytes: std::mem::size_of::<usize>() + c2.len(),
        payload: c2,
    }
}

/// Inverse of [`compress_twice`]: decompress twice and return the
/// underlying record bytes. Used by tests and by offline consumers of the
/// format.
pub fn decompress_twice(payload: &[u8]) -> Result<Vec<u8>, lz4_flex::block::DecompressError> {
    let c1 = lz4_block_decompress(payload)?;
    lz4_block_decompress(&c1)
}

/// One LZ4 block-compression pass: `compress_bound` sizes a scratch buffer,
/// `compress_into_scratch` fills it, and the original length is prefixed
/// (8 bytes, native endianness) ahead of the compressed bytes so the matching
/// decompress call knows how large a buffer to allocate — the two-step
/// bound-then-compress shape most LZ4 bindings expose as
/// `LZ4_compressBound` + `LZ4_compress`.
fn lz4_block_compress(data: &[u8]) -> Vec<u8> {
    let bound = compress_bound(data.len());
    let mut scratch = vec![0u8; bound];
    let n = compress_into_scratch(data, &mut scratch);
    let mut out = Vec::with_capacity(8 + n);
    out.extend_from_slice(&(data.len() as u64).to_ne_bytes());
    out.extend_from_slice(&scratch[..n]);
    out
}

fn lz4_block_decompress(data: &[u8]) -> Result<Vec<u8>, lz4_flex::block::DecompressError> {
    let (len_bytes, compressed) = data.split_at(8);
    let orig_len = u64::from_ne_bytes(len_bytes.try_into().unwrap()) as usize;
    decompress(compressed, orig_len)
}

/// Upper bound on the compressed size of `len` input bytes (mirrors
/// `LZ4_compressBound`), used to size the scratch buffer each
/// [`lz4_block_compress`] pass compresses into.
pub fn compress_bound(len: usize) -> usize {
    get_maximum_output_size(len)
}

/// Performs one raw LZ4 block compression into a caller-provided buffer
/// sized via [`compress_bound`].
pub fn compress_into_scratch(src: &[u8], scratch: &mut [u8]) -> usize {
    compress_into(src, scratch).expect("scratch sized via compress_bound")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_is_identity() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(64);
        let compressed = compress_twice(&data);
        let decompressed = decompress_twice(&compressed.payload).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn empty_payload_round_trips() {
        let compressed = compress_twice(&[]);
        let decompressed = decompress_twice(&compressed.payload).unwrap();
        assert!(decompressed.is_empty());
    }

    #[test]
    fn low_entropy_stream_compresses_well() {
        // 64 KiB of a repeating 8-byte address pattern, modeling a
        // low-address-entropy memory-access stream.
        let mut data = Vec::with_capacity(64 * 1024);
        while data.len() < 64 * 1024 {
            data.extend_from_slice(&0x0000_7fff_0010_0000u64.to_ne_bytes());
        }
        let compressed = compress_twice(&data);
        assert!(compressed.frame_bytes < data.len() / 4);
    }

    #[test]
    fn scratch_buffer_path_matches_bound() {
        let data = b"abababababababababababababab";
        let bound = compress_bound(data.len());
        let mut scratch = vec![0u8; bound];
        let n = compress_into_scratch(data, &mut scratch);
        assert!(n <= bound);
    }
}
