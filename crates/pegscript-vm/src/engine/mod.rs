//! Execution engine for the pegscript PEG bytecode machine.
//!
//! The VM executes compiled bytecode against a byte-string subject,
//! producing a capture tree, or against a cons-list subject via the
//! alternate list evaluator.

mod error;
mod expected;
mod frame;
mod list;
mod trace;
mod tree;
mod vm;

pub use error::ParsingError;
pub use expected::{Expectation, ExpectedSet};
pub use frame::{Frame, FrameStack, NodeBuffer};
pub use list::{ListValue, ListVm, ListVmLimits};
pub use trace::{NoopTracer, PrintTracer, Tracer};
pub use tree::{ChildRange, NodeId, TreeArena, TreeNode};
pub use vm::{NodeKind, Vm, VmLimits};
