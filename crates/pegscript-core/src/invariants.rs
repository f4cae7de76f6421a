//! Invariant checks excluded from coverage reports.

#![cfg_attr(coverage_nightly, coverage(off))]

/// Panics with a descriptive message if `index` is not `< len`.
///
/// Used at the handful of places in the bytecode and VM crates where an
/// out-of-range index would mean the bytecode image itself is malformed in
/// a way earlier validation should already have rejected — reaching this
/// check is a bug in the loader, not a property of untrusted input.
#[track_caller]
pub fn debug_assert_range(what: &str, index: usize, len: usize) {
    debug_assert!(
        index < len,
        "{what}: index {index} out of range (len {len})"
    );
}
