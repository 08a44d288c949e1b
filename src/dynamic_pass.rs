//! Dynamic instrumentation policy (C8).
//!
//! For each translated superblock, a dynamic-binary-instrumentation
//! front-end walks IR statements top-to-bottom and feeds them through
//! [`EventQueue`], which maintains the bounded pending-event queue, applies
//! the load/store merge-to-`Dm` rule, and enforces the flush discipline
//! below. The superblock-scheduling framework itself (the host deciding when
//! a superblock starts and ends) is out of scope; only the
//! queueing/merging/flushing decision lives here.

use crate::record::{AccessFields, Record};

/// One IR statement as handed to the instrumentation walk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DynInstr {
    /// Instruction marker: `pc`, `instruction_length`.
    IMark { pc: u64, instruction_length: u8 },
    /// A temporary-assigning load.
    Load { addr: u64, type_size: u8 },
    /// A store, possibly mergeable with the immediately preceding `Dr`.
    Store { addr: u64, type_size: u8 },
    /// A compare-and-swap; `type_size` is the combined data size (doubled
    /// for a dual-word CAS).
    CompareAndSwap { addr: u64, type_size: u8 },
    /// Load-linked: enqueues a read and forces an immediate flush so the SC
    /// helper call cannot clobber the reservation.
    LoadLinked { addr: u64, type_size: u8 },
    /// Store-conditional: enqueues a write.
    StoreConditional { addr: u64, type_size: u8 },
    /// A "dirty" helper call with a declared memory effect.
    DirtyHelper {
        reads: Option<(u64, u8)>,
        writes: Option<(u64, u8)>,
    },
    /// Any control-flow exit statement (branch, jump, superblock end).
    ControlFlowExit,
}

/// One queued memory event, a triple of `{kind, addr, size}` — `pc` doubles
/// as the address for `Ir` events.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingEvent {
    kind: EventKind,
    addr: u64,
    size: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    Ir,
    Dr,
    Dw,
    Dm,
}

/// Queue capacity: the fifth pending event forces a flush before it is
/// enqueued.
pub const QUEUE_CAPACITY: usize = 4;

/// The bounded pending-event queue for one superblock's instrumentation
/// walk. Call [`EventQueue::on_instr`] for every IR statement in order, then
/// [`EventQueue::flush`] at superblock end — `on_instr` already flushes
/// automatically at every other required point (control-flow exits and
/// before load-linked).
pub struct EventQueue {
    pending: Vec<PendingEvent>,
    emitted: Vec<Record>,
}

impl EventQueue {
    pub fn new() -> Self {
        EventQueue {
            pending: Vec::with_capacity(QUEUE_CAPACITY),
            emitted: Vec::new(),
        }
    }

    /// Feeds one IR statement through the merge/enqueue rules, flushing
    /// automatically when required. Returns the [`Record`]s lowered by any
    /// flush this call triggered, in emission order.
    pub fn on_instr(&mut self, instr: DynInstr) -> Vec<Record> {
        self.emitted.clear();
        match instr {
            DynInstr::IMark {
                pc,
                instruction_length,
            } => self.enqueue(EventKind::Ir, pc, instruction_length),
            DynInstr::Load { addr, type_size } => self.enqueue(EventKind::Dr, addr, type_size),
            DynInstr::Store { addr, type_size } => self.store(addr, type_size),
            DynInstr::CompareAndSwap { addr, type_size } => {
                self.enqueue(EventKind::Dr, addr, type_size);
                self.enqueue(EventKind::Dw, addr, type_size);
            }
            DynInstr::LoadLinked { addr, type_size } => {
                self.enqueue(EventKind::Dr, addr, type_size);
                self.flush();
            }
            DynInstr::StoreConditional { addr, type_size } => {
                self.enqueue(EventKind::Dw, addr, type_size);
            }
            DynInstr::DirtyHelper { reads, writes } => {
                if let Some((addr, size)) = reads {
                    self.enqueue(EventKind::Dr, addr, size);
                }
                if let Some((addr, size)) = writes {
                    self.enqueue(EventKind::Dw, addr, size);
                }
            }
            DynInstr::ControlFlowExit => self.flush(),
        }
        std::mem::take(&mut self.emitted)
    }

    /// Forces a flush, e.g. at superblock end. Idempotent on an empty queue.
    pub fn finish_superblock(&mut self) -> Vec<Record> {
        self.flush();
        std::mem::take(&mut self.emitted)
    }

    fn enqueue(&mut self, kind: EventKind, addr: u64, size: u8) {
        self.pending.push(PendingEvent { kind, addr, size });
        if self.pending.len() == QUEUE_CAPACITY {
            self.flush();
        }
    }

    /// Implements the load/op/store collapse: a store immediately following
    /// a `Dr` at the same address and size is rewritten in place to `Dm`
    /// instead of enqueuing a new event.
    fn store(&mut self, addr: u64, size: u8) {
        if let Some(last) = self.pending.last_mut() {
            if last.kind == EventKind::Dr && last.addr == addr && last.size == size {
                last.kind = EventKind::Dm;
                return;
            }
        }
        self.enqueue(EventKind::Dw, addr, size);
    }

    /// Lowers every queued event to a [`Record`], in insertion order, and
    /// resets the queue.
    fn flush(&mut self) {
        for ev in self.pending.drain(..) {
            let fields = AccessFields::new(ev.addr, ev.size, ev.kind == EventKind::Dw);
            let record = match ev.kind {
                EventKind::Ir => Record::InstrRead(fields),
                EventKind::Dr => Record::DataRead(fields),
                EventKind::Dw => Record::DataWrite(fields),
                EventKind::Dm => Record::DataModify(fields),
            };
            self.emitted.push(record);
        }
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs every statement of one superblock through a fresh [`EventQueue`] and
/// returns the complete, ordered stream of lowered records, flushing at the
/// end. Convenience wrapper for front-ends that process a whole superblock
/// at once rather than statement-by-statement.
pub fn instrument_superblock(stmts: &[DynInstr]) -> Vec<Record> {
    let mut queue = EventQueue::new();
    let mut out = Vec::new();
    for &stmt in stmts {
        out.extend(queue.on_instr(stmt));
    }
    out.extend(queue.finish_superblock());
    out
}
