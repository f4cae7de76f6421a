//! Execution engine for the pegscript PEG bytecode machine.
//!
//! This crate provides the virtual machine that executes compiled PEG
//! bytecode (from `pegscript-bytecode`) against either a byte-string
//! subject or a cons-list subject, producing a structured capture tree or a
//! labeled failure.

pub mod engine;

// Re-export commonly used items at crate root
pub use engine::{
    ChildRange, Expectation, ExpectedSet, Frame, FrameStack, ListValue, ListVm, ListVmLimits,
    NodeBuffer, NodeId, NodeKind, NoopTracer, ParsingError, PrintTracer, Tracer, TreeArena,
    TreeNode, Vm, VmLimits,
};
