// crates/sable-runtime/src/weak.rs
//! The weak reference protocol.
//!
//! A weak reference holds the control block alive, not the object.
//! Acquiring a strong reference from a weak one must observe a non-zero
//! strong count at the moment of the increment; when the object is
//! concurrently released for the last time, acquisition fails with an
//! explicit no-value result instead of handing out a dangling pointer.
//! The strong references collectively hold one weak count, so the block
//! is freed by exactly one party: whoever drops the weak count to zero.

use std::ptr;
use std::sync::atomic::Ordering;

use crate::object::{ControlBlock, ObjectHeader, Ownership};

/// In-place weak reference slot, written by generated code.
#[repr(C)]
pub struct WeakReference {
    pub block: *mut ControlBlock,
    pub object: *mut ObjectHeader,
}

/// Result of [`sbl_acquire_strong`]: a tagged optional object pointer.
#[repr(C)]
pub struct AcquiredStrong {
    pub object: *mut ObjectHeader,
    pub present: bool,
}

impl AcquiredStrong {
    fn none() -> Self {
        Self {
            object: ptr::null_mut(),
            present: false,
        }
    }
}

/// Drops a weak slot's claim on the control block, freeing the block when
/// it was the last reference of any kind.
unsafe fn drop_weak(reference: &mut WeakReference) {
    // SAFETY: The slot holds a weak count on the block, so the block is
    // alive. The strong side collectively holds one weak count of its own,
    // so the weak count can only reach zero after the strong count did,
    // and exactly one decrement observes the 1 -> 0 transition.
    unsafe {
        let block = reference.block;
        if (*block).weak.fetch_sub(1, Ordering::AcqRel) == 1 {
            drop(Box::from_raw(block));
        }
    }
    reference.block = ptr::null_mut();
}

/// Initializes a weak reference slot from a strong reference.
///
/// # Safety
/// `reference` must point to writable slot storage; `object` must be a
/// live managed object under full reference counting.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sbl_create_weak(reference: *mut WeakReference, object: *mut ObjectHeader) {
    // SAFETY: Caller guarantees a live ref-counted object, so its control
    // block is valid for the duration of this call.
    unsafe {
        let Ownership::RefCounted(block) = (*object).ownership else {
            (*reference).block = ptr::null_mut();
            (*reference).object = object;
            return;
        };
        (*block).weak.fetch_add(1, Ordering::Relaxed);
        (*reference).block = block;
        (*reference).object = object;
    }
}

/// Duplicates a weak reference.
///
/// # Safety
/// `reference` must point to an initialized weak slot.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sbl_retain_weak(reference: *mut WeakReference) {
    // SAFETY: An initialized non-null slot holds a weak count, keeping the
    // block alive.
    unsafe {
        if !(*reference).block.is_null() {
            (*(*reference).block).weak.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Releases a weak reference.
///
/// # Safety
/// `reference` must point to an initialized weak slot; the caller gives
/// up the slot.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sbl_release_weak(reference: *mut WeakReference) {
    // SAFETY: See `drop_weak`.
    unsafe {
        if !(*reference).block.is_null() {
            drop_weak(&mut *reference);
        }
    }
}

/// Attempts to promote a weak reference to a strong one. Fails when the
/// strong count already reached zero; a failed acquisition on a dead
/// object also retires the weak slot.
///
/// # Safety
/// `reference` must point to an initialized weak slot.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sbl_acquire_strong(reference: *mut WeakReference) -> AcquiredStrong {
    // SAFETY: The slot's weak count keeps the block alive. The increment
    // goes through fetch_update so it can never resurrect a zero count.
    unsafe {
        let reference = &mut *reference;
        if reference.block.is_null() {
            return AcquiredStrong::none();
        }
        let acquired = (*reference.block)
            .strong
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |strong| {
                if strong == 0 { None } else { Some(strong + 1) }
            });
        match acquired {
            Ok(_) => AcquiredStrong {
                object: reference.object,
                present: true,
            },
            Err(_) => {
                drop_weak(reference);
                AcquiredStrong::none()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class_info::ClassInfo;
    use crate::object::{sbl_alloc, sbl_release, sbl_retain};

    fn plain_class() -> ClassInfo {
        ClassInfo {
            superclass: ptr::null(),
            destructor: None,
            protocol_table: ptr::null(),
        }
    }

    #[test]
    fn acquire_succeeds_while_object_lives() {
        let class = plain_class();
        unsafe {
            let object = sbl_alloc(size_of::<ObjectHeader>(), &class);
            let mut weak = WeakReference {
                block: ptr::null_mut(),
                object: ptr::null_mut(),
            };
            sbl_create_weak(&mut weak, object);

            let acquired = sbl_acquire_strong(&mut weak);
            assert!(acquired.present);
            assert_eq!(acquired.object, object);
            sbl_release(acquired.object);

            sbl_release_weak(&mut weak);
            sbl_release(object);
        }
    }

    #[test]
    fn acquire_fails_after_last_release() {
        let class = plain_class();
        unsafe {
            let object = sbl_alloc(size_of::<ObjectHeader>(), &class);
            let mut weak = WeakReference {
                block: ptr::null_mut(),
                object: ptr::null_mut(),
            };
            sbl_create_weak(&mut weak, object);
            sbl_retain(object);
            sbl_release(object);
            sbl_release(object);

            let acquired = sbl_acquire_strong(&mut weak);
            assert!(!acquired.present);
            assert!(acquired.object.is_null());
            // The failed acquisition retired the slot and freed the block.
            assert!(weak.block.is_null());
        }
    }

    #[test]
    fn block_outlives_the_object_while_a_weak_slot_remains() {
        let class = plain_class();
        unsafe {
            let object = sbl_alloc(size_of::<ObjectHeader>(), &class);
            let mut weak = WeakReference {
                block: ptr::null_mut(),
                object: ptr::null_mut(),
            };
            sbl_create_weak(&mut weak, object);

            sbl_release(object);
            // The last strong release dropped the strong side's collective
            // weak count; only the slot's claim keeps the block alive now.
            assert_eq!((*weak.block).strong.load(Ordering::Relaxed), 0);
            assert_eq!((*weak.block).weak.load(Ordering::Relaxed), 1);

            sbl_release_weak(&mut weak);
            assert!(weak.block.is_null());
        }
    }

    #[test]
    fn weak_slots_can_be_duplicated() {
        let class = plain_class();
        unsafe {
            let object = sbl_alloc(size_of::<ObjectHeader>(), &class);
            let mut first = WeakReference {
                block: ptr::null_mut(),
                object: ptr::null_mut(),
            };
            sbl_create_weak(&mut first, object);
            let mut second = WeakReference {
                block: first.block,
                object: first.object,
            };
            sbl_retain_weak(&mut second);

            sbl_release(object);
            assert!(!sbl_acquire_strong(&mut first).present);
            assert!(second.block.is_null() || !sbl_acquire_strong(&mut second).present);
        }
    }
}
