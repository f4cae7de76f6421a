//! Tracing infrastructure for debugging VM execution.
//!
//! `NoopTracer`'s methods are `#[inline(always)]` no-ops so a release build
//! with the default tracer carries no overhead in the dispatch loop — the
//! failure routine runs at matcher-hot speeds and must not be slowed down
//! by diagnostics machinery.

use pegscript_bytecode::Instruction;

/// Instrumentation hook for the dispatch loop.
///
/// Every method is called at a specific point during execution; none of
/// them may affect control flow — this is observation only.
pub trait Tracer {
    /// Called before executing the instruction at `pc`.
    fn trace_step(&mut self, pc: u16, instr: Instruction, cursor: usize, frame_depth: usize);

    /// Called when the failure routine begins unwinding.
    fn trace_fail(&mut self, cursor: usize, ffp: usize);

    /// Called when the failure routine finds a Backtrack frame to resume at.
    fn trace_backtrack(&mut self, resume_pc: u16, cursor: usize);

    /// Called on a `CALL`.
    fn trace_call(&mut self, target_pc: u16);

    /// Called on a `RETURN`.
    fn trace_return(&mut self, resume_pc: u16);

    /// Called on a `THROW`, with `handled` true if a recovery rule exists.
    fn trace_throw(&mut self, label: u32, handled: bool);
}

/// Tracer that does nothing; compiles away entirely.
pub struct NoopTracer;

impl Tracer for NoopTracer {
    #[inline(always)]
    fn trace_step(&mut self, _pc: u16, _instr: Instruction, _cursor: usize, _frame_depth: usize) {}

    #[inline(always)]
    fn trace_fail(&mut self, _cursor: usize, _ffp: usize) {}

    #[inline(always)]
    fn trace_backtrack(&mut self, _resume_pc: u16, _cursor: usize) {}

    #[inline(always)]
    fn trace_call(&mut self, _target_pc: u16) {}

    #[inline(always)]
    fn trace_return(&mut self, _resume_pc: u16) {}

    #[inline(always)]
    fn trace_throw(&mut self, _label: u32, _handled: bool) {}
}

/// Tracer that writes one line per event to an in-memory log, for tests and
/// CLI `-v` output. This crate has no stdout/stderr story of its own, so it
/// accumulates lines instead and leaves printing them to the caller.
#[derive(Default)]
pub struct PrintTracer {
    pub lines: Vec<String>,
}

impl PrintTracer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tracer for PrintTracer {
    fn trace_step(&mut self, pc: u16, instr: Instruction, cursor: usize, frame_depth: usize) {
        let mnemonic = instr.opcode().map(|op| op.mnemonic()).unwrap_or("???");
        self.lines.push(format!(
            "pc={pc:04} {mnemonic:<14} cursor={cursor} frames={frame_depth}"
        ));
    }

    fn trace_fail(&mut self, cursor: usize, ffp: usize) {
        self.lines.push(format!("FAIL cursor={cursor} ffp={ffp}"));
    }

    fn trace_backtrack(&mut self, resume_pc: u16, cursor: usize) {
        self.lines
            .push(format!("backtrack -> pc={resume_pc:04} cursor={cursor}"));
    }

    fn trace_call(&mut self, target_pc: u16) {
        self.lines.push(format!("call -> pc={target_pc:04}"));
    }

    fn trace_return(&mut self, resume_pc: u16) {
        self.lines.push(format!("return -> pc={resume_pc:04}"));
    }

    fn trace_throw(&mut self, label: u32, handled: bool) {
        self.lines
            .push(format!("throw label={label} handled={handled}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pegscript_bytecode::Opcode;

    #[test]
    fn print_tracer_records_one_line_per_step() {
        let mut tracer = PrintTracer::new();
        tracer.trace_step(0, Instruction::no_operand(Opcode::Halt), 3, 1);
        assert_eq!(tracer.lines.len(), 1);
        assert!(tracer.lines[0].contains("HALT"));
        assert!(tracer.lines[0].contains("cursor=3"));
    }

    #[test]
    fn noop_tracer_accepts_every_call_site() {
        let mut tracer = NoopTracer;
        tracer.trace_step(0, Instruction::no_operand(Opcode::Halt), 0, 0);
        tracer.trace_fail(0, 0);
        tracer.trace_backtrack(0, 0);
        tracer.trace_call(0);
        tracer.trace_return(0);
        tracer.trace_throw(0, false);
    }
}
