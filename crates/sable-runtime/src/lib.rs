// crates/sable-runtime/src/lib.rs
//! Sable runtime: reference counting, class metadata, and the ABI surface
//! called by generated code. All entry points use the C ABI and carry the
//! `sbl_` prefix.

pub mod class_info;
pub mod object;
pub mod panic;
pub mod type_description;
pub mod weak;

pub use class_info::{
    ClassInfo, ProtocolConformanceEntry, sbl_find_protocol_conformance, sbl_inherits_from,
};
pub use object::{
    ControlBlock, ObjectHeader, Ownership, sbl_alloc, sbl_is_unique, sbl_release,
    sbl_release_local, sbl_release_memory, sbl_release_without_deinit, sbl_retain,
    sbl_retain_local, sbl_retain_memory,
};
pub use panic::sbl_panic;
pub use type_description::{
    RunTimeTypeInfo, TypeDescription, sbl_check_generic_args, sbl_index_type_description,
    sbl_type_description_length,
};
pub use weak::{
    AcquiredStrong, WeakReference, sbl_acquire_strong, sbl_create_weak, sbl_release_weak,
    sbl_retain_weak,
};
