//! Persistence and file header (C5).
//!
//! One process-wide append-only sink: magic, a memory-map snapshot, then a
//! sequence of length-prefixed frames. Writes are serialized behind a single
//! mutex so frames from different threads interleave at frame granularity
//! only, never mid-payload.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::Mutex;

use crate::compress::{compress_twice, CompressedFrame};

pub const MAGIC: &[u8; 8] = b"MEMACCES";

/// Running byte counters, reported once at finalize.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stats {
    pub total_uncompressed: u64,
    pub total_compressed: u64,
}

struct Inner {
    file: File,
    stats: Stats,
}

/// Process-wide output sink. `None` until [`Sink::open`] succeeds; all
/// writes after that go through the single `Mutex<Inner>`.
pub struct Sink {
    inner: Mutex<Option<Inner>>,
}

impl Sink {
    pub const fn unopened() -> Self {
        Sink {
            inner: Mutex::new(None),
        }
    }

    /// Opens `path` write-create-truncate (mode 0666), writes the magic and
    /// a NUL-terminated memory-map snapshot.
    ///
    /// Idempotent in the sense that calling `open` while already open is a
    /// logic error at the call site (the runtime's `Uninitialized ->
    /// Initialized` transition guards this); `open` itself just does the work.
    pub fn open(&self, path: &str) -> anyhow::Result<()> {
        let mut guard = self.inner.lock().expect("sink mutex poisoned");
        let mut file = open_create_truncate(path)?;
        let mut stats = Stats::default();

        file.write_all(MAGIC)?;
        stats.total_uncompressed += MAGIC.len() as u64;
        stats.total_compressed += MAGIC.len() as u64;

        let maps = read_memory_map_snapshot();
        file.write_all(maps.as_bytes())?;
        file.write_all(&[0u8])?;
        stats.total_uncompressed += maps.len() as u64 + 1;
        stats.total_compressed += maps.len() as u64 + 1;

        *guard = Some(Inner { file, stats });
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().expect("sink mutex poisoned").is_some()
    }

    /// Writes one frame: `length: uword || payload`. When `compress` is
    /// true the payload is double-LZ4-compressed first; otherwise the raw
    /// bytes are written unmodified.
    ///
    /// A short write is treated as disk-full/descriptor-loss and is fatal:
    /// framing integrity is a hard invariant, so this aborts the process
    /// rather than risk desynchronized frames.
    pub fn write_frame(&self, raw_payload: &[u8], compress: bool) {
        let mut guard = self.inner.lock().expect("sink mutex poisoned");
        let Some(inner) = guard.as_mut() else {
            // Not-yet-writing mode: caller already checked `is_open()`
            // before draining, so this should not happen in practice.
            return;
        };

        let (bytes_to_write, frame_bytes): (Vec<u8>, usize) = if compress {
            let CompressedFrame {
                payload,
                frame_bytes,
            } = compress_twice(raw_payload);
            (payload, frame_bytes)
        } else {
            (
                raw_payload.to_vec(),
                std::mem::size_of::<usize>() + raw_payload.len(),
            )
        };

        let len_prefix = (bytes_to_write.len() as u64).to_ne_bytes();
        write_all_or_abort(&mut inner.file, &len_prefix);
        write_all_or_abort(&mut inner.file, &bytes_to_write);

        inner.stats.total_uncompressed +=
            std::mem::size_of::<usize>() as u64 + raw_payload.len() as u64;
        inner.stats.total_compressed += frame_bytes as u64;
    }

    /// Returns the running byte counters, or zeroed stats if never opened.
    pub fn stats(&self) -> Stats {
        self.inner
            .lock()
            .expect("sink mutex poisoned")
            .as_ref()
            .map(|i| i.stats)
            .unwrap_or_default()
    }

    /// Closes the underlying file, per spec.md §4.3's finalization step
    /// ("drain all live thread rings, close the file, emit a summary"). Takes
    /// the `Inner` out and drops it, flushing and closing the descriptor
    /// rather than leaving it to process teardown. Idempotent: closing an
    /// already-closed (or never-opened) sink is a no-op.
    pub fn close(&self) {
        let mut guard = self.inner.lock().expect("sink mutex poisoned");
        guard.take();
    }
}

fn write_all_or_abort(file: &mut File, buf: &[u8]) {
    if let Err(e) = file.write_all(buf) {
        eprintln!("memtrace: short write to output file, aborting: {e}");
        std::process::abort();
    }
}

#[cfg(unix)]
fn open_create_truncate(path: &str) -> anyhow::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o666)
        .open(path)
        .map_err(anyhow::Error::from)
}

#[cfg(not(unix))]
fn open_create_truncate(path: &str) -> anyhow::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(anyhow::Error::from)
}

/// Copies the OS's view of loaded regions verbatim. On Linux this is
/// `/proc/self/maps`; other platforms have no equivalent pseudo-file readily
/// available, so a short placeholder line is emitted instead (documented
/// limitation, see DESIGN.md).
#[cfg(target_os = "linux")]
fn read_memory_map_snapshot() -> String {
    std::fs::read_to_string("/proc/self/maps").unwrap_or_default()
}

#[cfg(not(target_os = "linux"))]
fn read_memory_map_snapshot() -> String {
    String::from("# memory map snapshot unavailable on this platform\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn open_writes_magic_and_nul_terminated_maps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mtr");
        let sink = Sink::unopened();
        sink.open(path.to_str().unwrap()).unwrap();

        let mut bytes = Vec::new();
        File::open(&path).unwrap().read_to_end(&mut bytes).unwrap();
        assert_eq!(&bytes[0..8], MAGIC);
        let nul_pos = bytes[8..].iter().position(|&b| b == 0).unwrap();
        assert!(nul_pos > 0 || cfg!(not(target_os = "linux")));
    }

    #[test]
    fn empty_frame_is_permitted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mtr");
        let sink = Sink::unopened();
        sink.open(path.to_str().unwrap()).unwrap();
        sink.write_frame(&[], true);
        let stats = sink.stats();
        assert!(stats.total_compressed > 0);
    }

    #[test]
    fn uncompressed_counters_match_when_compression_off() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mtr");
        let sink = Sink::unopened();
        sink.open(path.to_str().unwrap()).unwrap();
        let header_stats = sink.stats();

        let payload = vec![7u8; 256];
        sink.write_frame(&payload, false);
        let after = sink.stats();
        let added_uncompressed = after.total_uncompressed - header_stats.total_uncompressed;
        let added_compressed = after.total_compressed - header_stats.total_compressed;
        assert_eq!(added_uncompressed, added_compressed);
    }

    #[test]
    fn close_drops_the_file_and_stops_accepting_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mtr");
        let sink = Sink::unopened();
        sink.open(path.to_str().unwrap()).unwrap();
        sink.write_frame(&[1, 2, 3], false);
        sink.close();

        assert!(!sink.is_open());
        let before = sink.stats();
        sink.write_frame(&[4, 5, 6], false);
        assert_eq!(sink.stats().total_compressed, before.total_compressed);
    }

    #[test]
    fn close_before_open_is_a_no_op() {
        let sink = Sink::unopened();
        sink.close();
        assert!(!sink.is_open());
    }

    #[test]
    fn writing_before_open_is_a_no_op() {
        let sink = Sink::unopened();
        sink.write_frame(&[1, 2, 3], true);
        assert_eq!(sink.stats().total_compressed, 0);
    }
}
