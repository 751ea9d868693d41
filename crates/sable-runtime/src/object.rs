// crates/sable-runtime/src/object.rs
//! Object headers and the retain/release family.
//!
//! Every managed allocation starts with an [`ObjectHeader`]. The ownership
//! regime is an explicit tagged field, not a sentinel pointer: objects the
//! compiler proved never to cross a concurrency boundary carry a plain
//! embedded count (`Ownership::Local`), shared objects carry a pointer to a
//! heap [`ControlBlock`] with atomic strong and weak counts, and permanent
//! objects (`Ownership::Untracked`) ignore counting entirely.

use std::alloc::{alloc, dealloc, handle_alloc_error, Layout};
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::class_info::ClassInfo;

/// Strong and weak counts for a fully reference-counted object.
///
/// Allocated separately from the object so weak references can outlive it.
/// Both counts are atomic; weak references may be shared across threads.
/// The strong side collectively holds one weak count, dropped when the
/// strong count reaches zero, so whichever decrement takes the weak count
/// to zero owns the block and frees it.
#[repr(C)]
pub struct ControlBlock {
    pub strong: AtomicUsize,
    pub weak: AtomicUsize,
}

impl ControlBlock {
    fn new_boxed() -> *mut ControlBlock {
        Box::into_raw(Box::new(ControlBlock {
            strong: AtomicUsize::new(1),
            weak: AtomicUsize::new(1),
        }))
    }
}

/// How an object's lifetime is tracked.
#[repr(C)]
pub enum Ownership {
    /// Embedded non-atomic count. Chosen by escape analysis for objects
    /// that never leave their allocating thread.
    Local(i64),
    /// Full strong/weak counting through a heap control block.
    RefCounted(*mut ControlBlock),
    /// Never counted, never destroyed (process-lifetime constants).
    Untracked,
}

/// Common prefix of every managed allocation. Generated code lays out the
/// payload immediately after this header.
#[repr(C)]
pub struct ObjectHeader {
    pub ownership: Ownership,
    pub class_info: *const ClassInfo,
    /// Total allocation size in bytes, including this header. Needed to
    /// reconstruct the layout on deallocation.
    pub size: usize,
}

impl ObjectHeader {
    fn layout(size: usize) -> Layout {
        Layout::from_size_align(size, align_of::<ObjectHeader>()).expect("object layout overflow")
    }
}

/// Allocates a heap object of `size` bytes (header included) with a fresh
/// control block holding one strong reference. The payload is left
/// uninitialized; generated code stores into it before the object becomes
/// visible.
///
/// # Safety
/// `size` must be at least `size_of::<ObjectHeader>()`. `class_info` must
/// point to a class-info record that outlives the object.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sbl_alloc(size: usize, class_info: *const ClassInfo) -> *mut ObjectHeader {
    let layout = ObjectHeader::layout(size);
    // SAFETY: `layout` has non-zero size (caller guarantees it covers the
    // header). After the null check the allocation is valid for writes.
    unsafe {
        let object = alloc(layout) as *mut ObjectHeader;
        if object.is_null() {
            handle_alloc_error(layout);
        }
        ptr::write(
            object,
            ObjectHeader {
                ownership: Ownership::RefCounted(ControlBlock::new_boxed()),
                class_info,
                size,
            },
        );
        object
    }
}

/// Increments the strong count.
///
/// A relaxed increment suffices on the ref-counted path: the retaining
/// thread already holds a valid reference, so no ordering with other
/// operations needs to be established.
///
/// # Safety
/// `object` must point to a live managed object.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sbl_retain(object: *mut ObjectHeader) {
    // SAFETY: Caller guarantees `object` is live, so the header is valid
    // and the control block (if any) has not been freed.
    unsafe {
        match &mut (*object).ownership {
            Ownership::Local(count) => *count += 1,
            Ownership::RefCounted(block) => {
                (**block).strong.fetch_add(1, Ordering::Relaxed);
            }
            Ownership::Untracked => {}
        }
    }
}

/// Retain for objects known to be fully reference counted (never local).
///
/// # Safety
/// `object` must point to a live managed object whose ownership is
/// `RefCounted` or `Untracked`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sbl_retain_memory(object: *mut ObjectHeader) {
    // SAFETY: See `sbl_retain`.
    unsafe {
        match &(*object).ownership {
            Ownership::RefCounted(block) => {
                (**block).strong.fetch_add(1, Ordering::Relaxed);
            }
            Ownership::Local(_) | Ownership::Untracked => {}
        }
    }
}

/// Retain for objects the compiler placed under local counting.
///
/// # Safety
/// `object` must point to a live managed object with `Ownership::Local`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sbl_retain_local(object: *mut ObjectHeader) {
    // SAFETY: Caller guarantees a live local object.
    unsafe {
        if let Ownership::Local(count) = &mut (*object).ownership {
            *count += 1;
        }
    }
}

/// Runs the destructor through the class-info dispatch pointer.
unsafe fn run_destructor(object: *mut ObjectHeader) {
    // SAFETY: Caller guarantees the object is still valid; the destructor
    // pointer was installed at allocation and outlives the object.
    unsafe {
        let class_info = (*object).class_info;
        if !class_info.is_null() {
            if let Some(destructor) = (*class_info).destructor {
                destructor(object);
            }
        }
    }
}

/// Drops the strong side's collective weak count; frees the block when no
/// weak references remain either.
unsafe fn release_control_block(block: *mut ControlBlock) {
    // SAFETY: Caller guarantees the strong count reached zero. Exactly one
    // decrement of the weak count can observe the 1 -> 0 transition, and
    // that decrement owns the block.
    unsafe {
        if (*block).weak.fetch_sub(1, Ordering::AcqRel) == 1 {
            drop(Box::from_raw(block));
        }
    }
}

unsafe fn free_object(object: *mut ObjectHeader) {
    // SAFETY: The size recorded at allocation reconstructs the layout.
    unsafe {
        let layout = ObjectHeader::layout((*object).size);
        dealloc(object as *mut u8, layout);
    }
}

/// Decrements the strong count; on the 1 → 0 transition the destructor
/// runs exactly once, then the control block (if unreferenced) and the
/// storage are freed. The acquire-release decrement makes all writes
/// before the final release visible to the destroying thread.
///
/// # Safety
/// `object` must point to a live managed object; the caller gives up its
/// reference.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sbl_release(object: *mut ObjectHeader) {
    // SAFETY: Caller guarantees a live object and a reference to give up.
    unsafe {
        match &mut (*object).ownership {
            Ownership::Local(count) => {
                *count -= 1;
                if *count == 0 {
                    run_destructor(object);
                    // Local storage (stack or inline) is reclaimed by the
                    // frame, not here.
                }
            }
            Ownership::RefCounted(block) => {
                let block = *block;
                if (*block).strong.fetch_sub(1, Ordering::AcqRel) != 1 {
                    return;
                }
                run_destructor(object);
                release_control_block(block);
                free_object(object);
            }
            Ownership::Untracked => {}
        }
    }
}

/// Release that skips the destructor. Used for raw memory objects that
/// carry no payload requiring cleanup; ref-counted regime only.
///
/// # Safety
/// `object` must point to a live `RefCounted` managed object.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sbl_release_memory(object: *mut ObjectHeader) {
    // SAFETY: See `sbl_release`.
    unsafe {
        if let Ownership::RefCounted(block) = (*object).ownership {
            if (*block).strong.fetch_sub(1, Ordering::AcqRel) != 1 {
                return;
            }
            release_control_block(block);
            free_object(object);
        }
    }
}

/// Local fast-path release: plain decrement, destructor at zero.
///
/// # Safety
/// `object` must point to a live managed object with `Ownership::Local`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sbl_release_local(object: *mut ObjectHeader) {
    // SAFETY: Caller guarantees a live local object.
    unsafe {
        if let Ownership::Local(count) = &mut (*object).ownership {
            *count -= 1;
            if *count == 0 {
                run_destructor(object);
            }
        }
    }
}

/// Release that never runs the destructor even on the final reference.
/// Used when the payload was already deinitialized, e.g. after a raise
/// inside an initializer released the initialized fields individually.
///
/// # Safety
/// `object` must point to a live managed object.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sbl_release_without_deinit(object: *mut ObjectHeader) {
    // SAFETY: See `sbl_release`.
    unsafe {
        match &mut (*object).ownership {
            Ownership::Local(count) => {
                *count -= 1;
            }
            Ownership::RefCounted(block) => {
                let block = *block;
                if (*block).strong.fetch_sub(1, Ordering::AcqRel) != 1 {
                    return;
                }
                release_control_block(block);
                free_object(object);
            }
            Ownership::Untracked => {}
        }
    }
}

/// Whether exactly one strong reference exists. Unanswerable for
/// untracked objects, so they report `false`.
///
/// # Safety
/// `object` must point to a live managed object.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sbl_is_unique(object: *const ObjectHeader) -> bool {
    // SAFETY: Caller guarantees a live object.
    unsafe {
        match &(*object).ownership {
            Ownership::Local(count) => *count == 1,
            Ownership::RefCounted(block) => (**block).strong.load(Ordering::Acquire) == 1,
            Ownership::Untracked => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class_info::ClassInfo;
    use std::cell::Cell;

    thread_local! {
        static DESTRUCTIONS: Cell<usize> = const { Cell::new(0) };
    }

    unsafe extern "C" fn counting_destructor(_object: *mut ObjectHeader) {
        DESTRUCTIONS.with(|d| d.set(d.get() + 1));
    }

    fn counting_class() -> ClassInfo {
        ClassInfo {
            superclass: ptr::null(),
            destructor: Some(counting_destructor),
            protocol_table: ptr::null(),
        }
    }

    #[test]
    fn destructor_fires_exactly_once() {
        DESTRUCTIONS.with(|d| d.set(0));
        let class = counting_class();
        unsafe {
            let object = sbl_alloc(size_of::<ObjectHeader>(), &class);
            sbl_retain(object);
            sbl_retain(object);
            sbl_release(object);
            sbl_release(object);
            assert_eq!(DESTRUCTIONS.with(Cell::get), 0);
            sbl_release(object);
        }
        assert_eq!(DESTRUCTIONS.with(Cell::get), 1);
    }

    #[test]
    fn local_counting_runs_destructor_in_place() {
        DESTRUCTIONS.with(|d| d.set(0));
        let class = counting_class();
        let mut object = ObjectHeader {
            ownership: Ownership::Local(1),
            class_info: &class,
            size: size_of::<ObjectHeader>(),
        };
        unsafe {
            sbl_retain(&mut object);
            sbl_release_local(&mut object);
            sbl_release(&mut object);
        }
        assert_eq!(DESTRUCTIONS.with(Cell::get), 1);
        assert!(matches!(object.ownership, Ownership::Local(0)));
    }

    #[test]
    fn release_without_deinit_skips_destructor() {
        DESTRUCTIONS.with(|d| d.set(0));
        let class = counting_class();
        unsafe {
            let object = sbl_alloc(size_of::<ObjectHeader>(), &class);
            sbl_release_without_deinit(object);
        }
        assert_eq!(DESTRUCTIONS.with(Cell::get), 0);
    }

    #[test]
    fn uniqueness_tracks_strong_count() {
        let class = counting_class();
        unsafe {
            let object = sbl_alloc(size_of::<ObjectHeader>(), &class);
            assert!(sbl_is_unique(object));
            sbl_retain(object);
            assert!(!sbl_is_unique(object));
            sbl_release(object);
            assert!(sbl_is_unique(object));
            sbl_release(object);
        }

        let mut untracked = ObjectHeader {
            ownership: Ownership::Untracked,
            class_info: ptr::null(),
            size: size_of::<ObjectHeader>(),
        };
        unsafe {
            assert!(!sbl_is_unique(&untracked));
            sbl_retain(&mut untracked);
            sbl_release(&mut untracked);
        }
    }
}
