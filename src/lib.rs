//! Thread-local ring-buffered memory-access tracing runtime.
//!
//! Two front-ends funnel into this core: a compile-time instrumentation
//! pass ([`static_pass`]) that decides what to inject into a target
//! program's IR, and a dynamic-binary-instrumentation policy
//! ([`dynamic_pass`]) that decides how to lower each translated
//! superblock's statements into trace records. Both call the same
//! process-wide [`runtime`] entry points, which gate ([`gate`]), buffer
//! ([`ring`]), compress ([`compress`]), and persist ([`sink`]) the
//! resulting [`record::Record`] stream.

pub mod compress;
pub mod config;
pub mod dynamic_pass;
pub mod gate;
pub mod record;
pub mod ring;
pub mod runtime;
pub mod sink;
pub mod static_pass;
pub mod symbols;

pub use config::Config;
pub use record::{AccessFields, Record};
pub use runtime::{
    access, disable, emit_record, enable, finalize, function_entry, function_exit, initialize,
    initialize_with,
};
