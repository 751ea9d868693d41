// crates/sable-runtime/src/type_description.rs
//! Structural comparison of generic arguments at runtime.
//!
//! Generic instantiations are encoded as a flattened pre-order sequence of
//! [`TypeDescription`] entries. Each entry points at the per-type
//! [`RunTimeTypeInfo`], which records how many of the following entries
//! are the type's own generic arguments (`param_count`) and where they
//! start relative to the entry (`param_offset`). Equality is an O(n) walk
//! over both sequences; no named generic parameter binding exists at
//! runtime.

/// Static per-type record emitted by the compiler.
#[repr(C)]
pub struct RunTimeTypeInfo {
    pub param_count: i16,
    pub param_offset: i16,
}

/// One node of a flattened pre-order type encoding.
#[repr(C)]
pub struct TypeDescription {
    pub rtti: *const RunTimeTypeInfo,
    pub optional: bool,
}

unsafe fn check_generic_args(
    left: &mut *const TypeDescription,
    right: &mut *const TypeDescription,
    count: i16,
    offset: i16,
) -> bool {
    // SAFETY: Caller guarantees both sequences contain `offset + count`
    // entries plus the transitive arguments each entry announces.
    unsafe {
        *left = left.offset(offset as isize);
        *right = right.offset(offset as isize);
        for _ in 0..count {
            let l = &**left;
            let r = &**right;
            *left = left.add(1);
            *right = right.add(1);
            if !std::ptr::eq(l.rtti, r.rtti) || l.optional != r.optional {
                return false;
            }
            if !check_generic_args(left, right, (*l.rtti).param_count, (*l.rtti).param_offset) {
                return false;
            }
        }
    }
    true
}

/// Compares two flattened generic-argument sequences for exact structural
/// identity.
///
/// # Safety
/// Both pointers must reference well-formed flattened encodings covering
/// at least `offset + count` entries and their transitive arguments.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sbl_check_generic_args(
    mut left: *const TypeDescription,
    mut right: *const TypeDescription,
    count: i16,
    offset: i16,
) -> bool {
    // SAFETY: Forwarded caller contract.
    unsafe { check_generic_args(&mut left, &mut right, count, offset) }
}

/// Total number of entries a description occupies, including the
/// transitive generic arguments of every entry.
///
/// # Safety
/// `description` must point to a well-formed flattened encoding.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sbl_type_description_length(description: *const TypeDescription) -> i64 {
    let mut count: i64 = 1;
    let mut entry = description;
    let mut index: i64 = 0;
    // SAFETY: A well-formed encoding contains every entry it announces,
    // so the walk stays in bounds.
    unsafe {
        while index < count {
            count += (*(*entry).rtti).param_count as i64;
            entry = entry.add(1);
            index += 1;
        }
    }
    count
}

/// Returns the entry at logical `index`, skipping over the generic
/// arguments of the entries before it.
///
/// # Safety
/// `description` must point to a well-formed flattened encoding with at
/// least `index + 1` logical entries.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sbl_index_type_description(
    description: *const TypeDescription,
    index: i64,
) -> *const TypeDescription {
    let mut entry = description;
    let mut target = index;
    let mut position: i64 = 0;
    // SAFETY: Well-formedness keeps the walk in bounds.
    unsafe {
        while position < target {
            target += (*(*entry).rtti).param_count as i64;
            entry = entry.add(1);
            position += 1;
        }
    }
    entry
}

#[cfg(test)]
mod tests {
    use super::*;

    // A tiny type universe: a scalar and a one-parameter container.
    static SCALAR: RunTimeTypeInfo = RunTimeTypeInfo {
        param_count: 0,
        param_offset: 0,
    };
    static CONTAINER: RunTimeTypeInfo = RunTimeTypeInfo {
        param_count: 1,
        param_offset: 0,
    };

    fn entry(rtti: &'static RunTimeTypeInfo, optional: bool) -> TypeDescription {
        TypeDescription {
            rtti,
            optional,
        }
    }

    #[test]
    fn identical_instantiations_compare_equal() {
        // Container<Scalar> on both sides.
        let left = [entry(&CONTAINER, false), entry(&SCALAR, false)];
        let right = [entry(&CONTAINER, false), entry(&SCALAR, false)];
        unsafe {
            assert!(sbl_check_generic_args(left.as_ptr(), right.as_ptr(), 1, 0));
        }
    }

    #[test]
    fn optionality_distinguishes_instantiations() {
        let left = [entry(&CONTAINER, false), entry(&SCALAR, false)];
        let right = [entry(&CONTAINER, false), entry(&SCALAR, true)];
        unsafe {
            assert!(!sbl_check_generic_args(left.as_ptr(), right.as_ptr(), 1, 0));
        }
    }

    #[test]
    fn different_argument_types_compare_unequal() {
        let left = [entry(&CONTAINER, false), entry(&SCALAR, false)];
        let right = [entry(&CONTAINER, false), entry(&CONTAINER, false), entry(&SCALAR, false)];
        unsafe {
            assert!(!sbl_check_generic_args(left.as_ptr(), right.as_ptr(), 1, 0));
        }
    }

    #[test]
    fn length_counts_transitive_arguments() {
        // Container<Container<Scalar>> flattens to three entries.
        let nested = [
            entry(&CONTAINER, false),
            entry(&CONTAINER, false),
            entry(&SCALAR, false),
        ];
        unsafe {
            assert_eq!(sbl_type_description_length(nested.as_ptr()), 3);
            assert_eq!(sbl_type_description_length(&nested[2]), 1);
        }
    }

    #[test]
    fn indexing_skips_nested_arguments() {
        let nested = [
            entry(&CONTAINER, false),
            entry(&CONTAINER, false),
            entry(&SCALAR, false),
        ];
        unsafe {
            let zeroth = sbl_index_type_description(nested.as_ptr(), 0);
            assert!(std::ptr::eq(zeroth, &nested[0]));
        }
    }
}
