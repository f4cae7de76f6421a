#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Small primitives shared by the bytecode and execution-engine crates.
//!
//! Neither type here knows anything about PEGs: `Colors` is the terminal
//! palette used by `pretty`/`highlight` tree rendering, and `invariants`
//! holds `debug_assert!`-style helpers kept out of coverage reports.

mod colors;
mod invariants;

pub use colors::Colors;
pub use invariants::debug_assert_range;
