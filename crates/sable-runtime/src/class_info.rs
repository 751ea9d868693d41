// crates/sable-runtime/src/class_info.rs
//! Class metadata: superclass chain and protocol conformance table.

use std::ffi::c_void;
use std::ptr;

use crate::object::ObjectHeader;

/// One entry of a class's protocol conformance table. The table is a
/// compiler-emitted array terminated by an entry with a null protocol id.
#[repr(C)]
pub struct ProtocolConformanceEntry {
    pub protocol_id: *const c_void,
    pub conformance: *const c_void,
}

/// Per-class metadata emitted by the compiler. Referenced from every
/// object header of the class.
#[repr(C)]
pub struct ClassInfo {
    pub superclass: *const ClassInfo,
    pub destructor: Option<unsafe extern "C" fn(*mut ObjectHeader)>,
    pub protocol_table: *const ProtocolConformanceEntry,
}

/// Walks the superclass chain. `true` when `class_info` is `from` or a
/// descendant of it.
///
/// # Safety
/// `class_info` must be null or point to a valid class-info record whose
/// superclass chain consists of valid records.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sbl_inherits_from(
    class_info: *const ClassInfo,
    from: *const ClassInfo,
) -> bool {
    let mut current = class_info;
    while !current.is_null() {
        if ptr::eq(current, from) {
            return true;
        }
        // SAFETY: Caller guarantees the chain consists of valid records.
        current = unsafe { (*current).superclass };
    }
    false
}

/// Linear scan of the null-terminated conformance table. Returns the
/// conformance pointer, or null when the class does not conform.
///
/// # Safety
/// `table` must point to an array of entries terminated by a null
/// protocol id.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sbl_find_protocol_conformance(
    table: *const ProtocolConformanceEntry,
    protocol_id: *const c_void,
) -> *const c_void {
    let mut entry = table;
    // SAFETY: Caller guarantees the array is null-terminated; the scan
    // stops at the terminator.
    unsafe {
        while !(*entry).protocol_id.is_null() {
            if (*entry).protocol_id == protocol_id {
                return (*entry).conformance;
            }
            entry = entry.add(1);
        }
    }
    ptr::null()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inherits_from_walks_the_chain() {
        let root = ClassInfo {
            superclass: ptr::null(),
            destructor: None,
            protocol_table: ptr::null(),
        };
        let middle = ClassInfo {
            superclass: &root,
            destructor: None,
            protocol_table: ptr::null(),
        };
        let leaf = ClassInfo {
            superclass: &middle,
            destructor: None,
            protocol_table: ptr::null(),
        };
        let unrelated = ClassInfo {
            superclass: ptr::null(),
            destructor: None,
            protocol_table: ptr::null(),
        };
        unsafe {
            assert!(sbl_inherits_from(&leaf, &root));
            assert!(sbl_inherits_from(&leaf, &leaf));
            assert!(sbl_inherits_from(&middle, &root));
            assert!(!sbl_inherits_from(&root, &leaf));
            assert!(!sbl_inherits_from(&leaf, &unrelated));
        }
    }

    #[test]
    fn conformance_lookup_scans_to_terminator() {
        let proto_a = 1usize as *const c_void;
        let proto_b = 2usize as *const c_void;
        let conf_a = 10usize as *const c_void;
        let conf_b = 20usize as *const c_void;
        let table = [
            ProtocolConformanceEntry {
                protocol_id: proto_a,
                conformance: conf_a,
            },
            ProtocolConformanceEntry {
                protocol_id: proto_b,
                conformance: conf_b,
            },
            ProtocolConformanceEntry {
                protocol_id: ptr::null(),
                conformance: ptr::null(),
            },
        ];
        unsafe {
            assert_eq!(sbl_find_protocol_conformance(table.as_ptr(), proto_b), conf_b);
            assert_eq!(sbl_find_protocol_conformance(table.as_ptr(), proto_a), conf_a);
            assert!(
                sbl_find_protocol_conformance(table.as_ptr(), 3usize as *const c_void).is_null()
            );
        }
    }
}
