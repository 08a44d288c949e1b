//! Fixed-layout trace records (C1).
//!
//! Six record kinds, a closed sum type. Modeled as a tagged enum rather than
//! a polymorphic hierarchy: the ring is a plain array of identical-stride
//! cells, so every variant is padded up to the size of the largest one and
//! the discriminant is always the first field in memory.

use std::time::{SystemTime, UNIX_EPOCH};

/// A machine-word-sized address: program counter, frame/stack pointer, or a
/// traced memory location.
pub type Addr = u64;

/// One entry in the trace stream.
///
/// `InstrRead`, `DataRead`, `DataWrite`, `DataModify` are memory-access
/// variants; `FuncEnter`/`FuncExit` carry only a function address. All six
/// variants round-trip through [`Record::to_bytes`] / [`Record::from_bytes`]
/// at a fixed stride ([`RECORD_SIZE`]), so the ring can be a `[Record; N]`
/// array with no per-record allocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Record {
    /// An instruction fetch, dynamic front-end only (`Ir` in §4.7).
    InstrRead(AccessFields),
    /// A plain load.
    DataRead(AccessFields),
    /// A plain store.
    DataWrite(AccessFields),
    /// A read immediately followed by a write of the same address and size,
    /// collapsed into a single event (§4.7, §9 "Modify").
    DataModify(AccessFields),
    /// Function entry, carries only the function's address.
    FuncEnter(Addr),
    /// Function exit, carries only the function's address.
    FuncExit(Addr),
}

/// Fields common to the four memory-access record kinds.
///
/// `timestamp` is mandatory for the static front-end and optional for the
/// dynamic one (spec.md §3); `pc`/`bp`/`sp` are populated only where the
/// caller has them cheaply available. `size` and `is_write` are mutually
/// relevant depending on which front-end produced the record: the static
/// front-end fills `size` (bytes, 0 = "bulk, see length operand" sentinel);
/// the dynamic front-end fills `is_write` via the record kind itself and
/// also carries `size`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccessFields {
    pub timestamp: Option<f64>,
    pub pc: Addr,
    pub bp: Addr,
    pub sp: Addr,
    pub addr: Addr,
    pub size: u8,
    pub is_write: bool,
}

impl AccessFields {
    pub fn new(addr: Addr, size: u8, is_write: bool) -> Self {
        AccessFields {
            timestamp: None,
            pc: 0,
            bp: 0,
            sp: 0,
            addr,
            size,
            is_write,
        }
    }

    /// Stamps `timestamp` with seconds-since-epoch at microsecond
    /// resolution, matching the original's `tv_sec + 0.000001 * tv_usec`.
    pub fn with_now(mut self) -> Self {
        self.timestamp = Some(now_secs());
        self
    }

    pub fn with_frame(mut self, pc: Addr, bp: Addr, sp: Addr) -> Self {
        self.pc = pc;
        self.bp = bp;
        self.sp = sp;
        self
    }
}

pub fn now_secs() -> f64 {
    let d = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    d.as_secs() as f64 + d.subsec_micros() as f64 * 0.000_001
}

/// Discriminant values written as the first field of the on-disk layout.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discriminant {
    InstrRead = 0,
    DataRead = 1,
    DataWrite = 2,
    DataModify = 3,
    FuncEnter = 4,
    FuncExit = 5,
}

impl Discriminant {
    fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(Discriminant::InstrRead),
            1 => Some(Discriminant::DataRead),
            2 => Some(Discriminant::DataWrite),
            3 => Some(Discriminant::DataModify),
            4 => Some(Discriminant::FuncEnter),
            5 => Some(Discriminant::FuncExit),
            _ => None,
        }
    }
}

// Layout: 4-byte discriminant (padded to 8 for alignment) + union body.
// The access body is the largest variant: timestamp flag (1) + pad(7) +
// timestamp f64 (8) + pc/bp/sp/addr (8 each) + size (1) + is_write (1) + pad.
// Function bodies just need one address, left-padded to the same stride.
const ACCESS_BODY_SIZE: usize = 1 + 7 + 8 + 8 * 4 + 1 + 1 + 6; // = 56, 8-aligned
pub const RECORD_SIZE: usize = 8 /* discriminant */ + ACCESS_BODY_SIZE;

impl Record {
    pub fn discriminant(&self) -> Discriminant {
        match self {
            Record::InstrRead(_) => Discriminant::InstrRead,
            Record::DataRead(_) => Discriminant::DataRead,
            Record::DataWrite(_) => Discriminant::DataWrite,
            Record::DataModify(_) => Discriminant::DataModify,
            Record::FuncEnter(_) => Discriminant::FuncEnter,
            Record::FuncExit(_) => Discriminant::FuncExit,
        }
    }

    /// Encodes this record into exactly [`RECORD_SIZE`] bytes, native
    /// endianness, matching spec.md §6's on-disk record layout.
    pub fn to_bytes(&self, out: &mut [u8; RECORD_SIZE]) {
        out.fill(0);
        out[0..4].copy_from_slice(&(self.discriminant() as u32).to_ne_bytes());
        match self {
            Record::InstrRead(a)
            | Record::DataRead(a)
            | Record::DataWrite(a)
            | Record::DataModify(a) => encode_access(a, &mut out[8..]),
            Record::FuncEnter(addr) | Record::FuncExit(addr) => {
                out[8..16].copy_from_slice(&addr.to_ne_bytes());
            }
        }
    }

    /// Inverse of [`Record::to_bytes`]. Returns `None` on an unrecognized
    /// discriminant (corrupt or foreign data).
    pub fn from_bytes(buf: &[u8; RECORD_SIZE]) -> Option<Record> {
        let tag = u32::from_ne_bytes(buf[0..4].try_into().ok()?);
        let disc = Discriminant::from_u32(tag)?;
        Some(match disc {
            Discriminant::InstrRead => Record::InstrRead(decode_access(&buf[8..])),
            Discriminant::DataRead => Record::DataRead(decode_access(&buf[8..])),
            Discriminant::DataWrite => Record::DataWrite(decode_access(&buf[8..])),
            Discriminant::DataModify => Record::DataModify(decode_access(&buf[8..])),
            Discriminant::FuncEnter => {
                Record::FuncEnter(Addr::from_ne_bytes(buf[8..16].try_into().ok()?))
            }
            Discriminant::FuncExit => {
                Record::FuncExit(Addr::from_ne_bytes(buf[8..16].try_into().ok()?))
            }
        })
    }
}

fn encode_access(a: &AccessFields, out: &mut [u8]) {
    out[0] = a.timestamp.is_some() as u8;
    out[8..16].copy_from_slice(&a.timestamp.unwrap_or(0.0).to_ne_bytes());
    out[16..24].copy_from_slice(&a.pc.to_ne_bytes());
    out[24..32].copy_from_slice(&a.bp.to_ne_bytes());
    out[32..40].copy_from_slice(&a.sp.to_ne_bytes());
    out[40..48].copy_from_slice(&a.addr.to_ne_bytes());
    out[48] = a.size;
    out[49] = a.is_write as u8;
}

fn decode_access(buf: &[u8]) -> AccessFields {
    let has_ts = buf[0] != 0;
    let ts = f64::from_ne_bytes(buf[8..16].try_into().unwrap());
    AccessFields {
        timestamp: has_ts.then_some(ts),
        pc: Addr::from_ne_bytes(buf[16..24].try_into().unwrap()),
        bp: Addr::from_ne_bytes(buf[24..32].try_into().unwrap()),
        sp: Addr::from_ne_bytes(buf[32..40].try_into().unwrap()),
        addr: Addr::from_ne_bytes(buf[40..48].try_into().unwrap()),
        size: buf[48],
        is_write: buf[49] != 0,
    }
}
