//! Dispatch loop for the PEG bytecode machine, wired to the capture
//! machinery and the charset-driven diagnostics.

use std::collections::HashMap;

use pegscript_bytecode::{Charset, Image, Instruction, Opcode};
use pegscript_core::Colors;

use super::error::ParsingError;
use super::expected::{Expectation, ExpectedSet};
use super::frame::{Frame, FrameStack, NodeBuffer};
use super::trace::{NoopTracer, Tracer};
use super::tree::{NodeId, TreeArena, TreeNode};

/// Runtime limits for a match call. The machine relies on the compiler to
/// guarantee termination for compiler-correct bytecode; these bound the
/// damage a corrupted or adversarial image can do instead of hanging the
/// host process (a runaway `PARTIAL_COMMIT` loop, for instance).
#[derive(Clone, Copy, Debug)]
pub struct VmLimits {
    max_steps: u32,
    max_frames: u32,
}

impl Default for VmLimits {
    fn default() -> Self {
        Self {
            max_steps: 10_000_000,
            max_frames: 100_000,
        }
    }
}

impl VmLimits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn max_frames(mut self, max_frames: u32) -> Self {
        self.max_frames = max_frames;
        self
    }
}

/// The kind of a capture-tree node, exposed without the payload for
/// callers that just want to branch on shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    String,
    Sequence,
    Node,
    Error,
}

/// Outcome of popping a Call frame on `RETURN`/`CAP_RETURN`.
enum ReturnOutcome {
    Resumed,
    Finished(NodeId),
}

/// Executes compiled PEG bytecode against a byte-string subject, producing
/// a capture tree rooted at a [`NodeId`].
///
/// One `Vm` can run many matches against the same [`Image`] sequentially.
/// Each `match_*` call resets the frame stack, node buffer, tree arena and
/// furthest-failure state before running, so a [`NodeId`] returned by one
/// call is invalidated by the next.
pub struct Vm<'img> {
    image: &'img Image,
    frames: FrameStack,
    node_buffer: NodeBuffer,
    tree: TreeArena,
    expected: ExpectedSet,
    ffp: usize,
    show_fails: bool,
    limits: VmLimits,
    steps: u32,
    label_messages: HashMap<u32, u32>,
    cap_offset_id: Option<u32>,
    cap_offset_start: usize,
    pc: u16,
    cursor: usize,
}

impl<'img> Vm<'img> {
    pub fn new(image: &'img Image) -> Self {
        Self {
            image,
            frames: FrameStack::new(),
            node_buffer: NodeBuffer::new(),
            tree: TreeArena::new(),
            expected: ExpectedSet::new(),
            ffp: 0,
            show_fails: false,
            limits: VmLimits::default(),
            steps: 0,
            label_messages: HashMap::new(),
            cap_offset_id: None,
            cap_offset_start: 0,
            pc: 0,
            cursor: 0,
        }
    }

    /// Populates the label→message map used in error formatting. Entries
    /// here take priority over whatever the image's own message map
    /// carries for a given label (see [`Self::message_index_for`]).
    pub fn set_label_messages(&mut self, messages: impl IntoIterator<Item = (u32, u32)>) {
        self.label_messages.extend(messages);
    }

    /// Toggles expected-set accumulation. Off by default since it's
    /// diagnostic-only overhead on the matcher-hot path.
    pub fn set_show_fails(&mut self, show: bool) {
        self.show_fails = show;
    }

    pub fn set_limits(&mut self, limits: VmLimits) {
        self.limits = limits;
    }

    pub fn match_input(&mut self, input: &[u8]) -> Result<NodeId, ParsingError> {
        self.match_with_tracer(input, 0, &mut NoopTracer)
    }

    pub fn match_with_tracer(
        &mut self,
        input: &[u8],
        start_pc: u16,
        tracer: &mut impl Tracer,
    ) -> Result<NodeId, ParsingError> {
        self.reset_for_match();
        self.pc = start_pc;
        self.run(input, false, tracer)
    }

    /// Enters at an arbitrary rule address, equivalent to synthesizing a
    /// call frame before entering. Implemented by running with
    /// `allow_halt_on_return_underflow = true`: a `RETURN` with no
    /// enclosing `CALL` (because none was synthesized) ends the match
    /// successfully instead of signalling a frame-stack-underflow bug.
    pub fn match_rule(&mut self, input: &[u8], rule_address: u16) -> Result<NodeId, ParsingError> {
        self.match_rule_with_tracer(input, rule_address, &mut NoopTracer)
    }

    pub fn match_rule_with_tracer(
        &mut self,
        input: &[u8],
        rule_address: u16,
        tracer: &mut impl Tracer,
    ) -> Result<NodeId, ParsingError> {
        self.reset_for_match();
        self.pc = rule_address;
        self.run(input, true, tracer)
    }

    fn reset_for_match(&mut self) {
        self.frames.reset();
        self.node_buffer.reset();
        self.tree.reset();
        self.expected.reset();
        self.ffp = 0;
        self.steps = 0;
        self.cap_offset_id = None;
        self.cap_offset_start = 0;
        self.cursor = 0;
    }

    fn run(
        &mut self,
        input: &[u8],
        allow_halt_on_return_underflow: bool,
        tracer: &mut impl Tracer,
    ) -> Result<NodeId, ParsingError> {
        loop {
            self.steps += 1;
            if self.steps > self.limits.max_steps {
                return Err(self.build_error(
                    Some("<step-limit>".into()),
                    Some(format!(
                        "execution step limit of {} exceeded",
                        self.limits.max_steps
                    )),
                ));
            }
            if self.frames.len() as u32 > self.limits.max_frames {
                return Err(self.build_error(
                    Some("<frame-limit>".into()),
                    Some(format!(
                        "frame stack limit of {} exceeded",
                        self.limits.max_frames
                    )),
                ));
            }

            let pc = self.pc;
            let instr = self.image.instr(pc as usize);
            tracer.trace_step(pc, instr, self.cursor, self.frames.len());

            let Some(opcode) = instr.opcode() else {
                panic!("unknown opcode byte at pc {pc}");
            };

            match opcode {
                Opcode::Halt => return Ok(self.close_success()),

                Opcode::Any => match self.peek_char(input) {
                    Some((_, len)) => {
                        self.cursor += len;
                        self.pc = pc + 1;
                    }
                    None => self.fail_plain(tracer)?,
                },

                Opcode::Char => {
                    let target = char::from_u32(instr.uoperand())
                        .expect("CHAR operand is not a valid Unicode scalar value");
                    match self.peek_char(input) {
                        Some((c, len)) if c == target => {
                            self.cursor += len;
                            self.pc = pc + 1;
                        }
                        _ => self.fail_with(tracer, Expectation::Single(target))?,
                    }
                }

                Opcode::Range => {
                    let lo = char::from_u32(instr.u1() as u32)
                        .expect("RANGE operand lo is not a valid Unicode scalar value");
                    let hi = char::from_u32(instr.u2() as u32)
                        .expect("RANGE operand hi is not a valid Unicode scalar value");
                    match self.peek_char(input) {
                        Some((c, len)) if c >= lo && c <= hi => {
                            self.cursor += len;
                            self.pc = pc + 1;
                        }
                        _ => self.fail_with(tracer, Expectation::Range(lo, hi))?,
                    }
                }

                Opcode::Set => {
                    let charset = self.image.charsets().get(instr.uoperand());
                    if self.cursor < input.len() && charset.contains(input[self.cursor]) {
                        self.cursor += 1;
                        self.pc = pc + 1;
                    } else {
                        let expectations = charset_expectations(&charset);
                        self.fail_with_many(tracer, expectations)?;
                    }
                }

                Opcode::Span => {
                    let charset = self.image.charsets().get(instr.uoperand());
                    while self.cursor < input.len() && charset.contains(input[self.cursor]) {
                        self.cursor += 1;
                    }
                    self.pc = pc + 1;
                }

                Opcode::Choice => {
                    self.frames.push(Frame::Backtrack {
                        cursor: self.cursor,
                        resume_pc: instr.address(),
                        predicate: false,
                        nodes_start: self.node_buffer.len(),
                    });
                    self.pc = pc + 1;
                }

                Opcode::ChoicePred => {
                    self.frames.push(Frame::Backtrack {
                        cursor: self.cursor,
                        resume_pc: instr.address(),
                        predicate: true,
                        nodes_start: self.node_buffer.len(),
                    });
                    self.pc = pc + 1;
                }

                Opcode::Commit | Opcode::CapCommit => {
                    self.expect_pop_backtrack(opcode.mnemonic());
                    self.pc = instr.address();
                }

                Opcode::PartialCommit => {
                    self.refresh_top_backtrack(opcode.mnemonic(), false);
                    self.pc = instr.address();
                }

                Opcode::CapPartialCommit => {
                    self.refresh_top_backtrack(opcode.mnemonic(), true);
                    self.pc = instr.address();
                }

                Opcode::BackCommit | Opcode::CapBackCommit => {
                    let (cursor, _) = self.expect_pop_backtrack(opcode.mnemonic());
                    self.cursor = cursor;
                    self.pc = instr.address();
                }

                Opcode::Fail => self.fail_plain(tracer)?,

                Opcode::FailTwice => {
                    self.expect_pop_backtrack(opcode.mnemonic());
                    self.fail_plain(tracer)?;
                }

                Opcode::Jump => {
                    self.pc = instr.address();
                }

                Opcode::Call => {
                    self.frames.push(Frame::Call {
                        return_pc: pc + 1,
                        nodes_start: self.node_buffer.len(),
                    });
                    tracer.trace_call(instr.address());
                    self.pc = instr.address();
                }

                Opcode::Return | Opcode::CapReturn => {
                    match self.do_return(tracer, allow_halt_on_return_underflow) {
                        ReturnOutcome::Resumed => {}
                        ReturnOutcome::Finished(id) => return Ok(id),
                    }
                }

                Opcode::Throw => {
                    let label = instr.address() as u32;
                    if self.nearest_backtrack_predicate() {
                        self.fail_plain(tracer)?;
                    } else if let Some(handler_pc) = self.image.handler_for(label) {
                        tracer.trace_throw(label, true);
                        self.frames.push(Frame::Call {
                            return_pc: pc + 1,
                            nodes_start: self.node_buffer.len(),
                        });
                        self.pc = handler_pc;
                    } else {
                        tracer.trace_throw(label, false);
                        self.bump_ffp();
                        let name = self.label_name(label);
                        let message = self.message_text_for(label);
                        return Err(self.build_error(Some(name), message));
                    }
                }

                Opcode::CapBegin => {
                    self.frames.push(Frame::Capture {
                        id: instr.uoperand(),
                        start: self.cursor,
                        nodes_start: self.node_buffer.len(),
                    });
                    self.pc = pc + 1;
                }

                Opcode::CapEnd => {
                    self.cap_end();
                    self.pc = pc + 1;
                }

                Opcode::CapTerm => {
                    let off = instr.uoperand() as usize;
                    let start = self
                        .cursor
                        .checked_sub(off)
                        .expect("CAP_TERM offset runs before start of input");
                    let id = self.tree.push_string(start, self.cursor);
                    self.node_buffer.push(id);
                    self.pc = pc + 1;
                }

                Opcode::CapNonTerm => {
                    let name = instr.u1() as u32;
                    let off = instr.u2() as usize;
                    let start = self
                        .cursor
                        .checked_sub(off)
                        .expect("CAP_NON_TERM offset runs before start of input");
                    let leaf = self.tree.push_string(start, self.cursor);
                    let node = self.tree.push_node(name, leaf, start, self.cursor);
                    self.node_buffer.push(node);
                    self.pc = pc + 1;
                }

                Opcode::CapTermBeginOffset => {
                    self.cap_offset_id = None;
                    self.cap_offset_start = self.cursor;
                    self.pc = pc + 1;
                }

                Opcode::CapNonTermBeginOffset => {
                    self.cap_offset_id = Some(instr.u1() as u32);
                    self.cap_offset_start = self.cursor;
                    self.pc = pc + 1;
                }

                Opcode::CapEndOffset => {
                    let start = self.cap_offset_start;
                    let end = self.cursor;
                    let leaf = self.tree.push_string(start, end);
                    let result = match self.cap_offset_id.take() {
                        Some(id) => self.tree.push_node(id, leaf, start, end),
                        None => leaf,
                    };
                    self.node_buffer.push(result);
                    self.pc = pc + 1;
                }

                Opcode::Atom | Opcode::Open | Opcode::Close => {
                    panic!(
                        "{} is only valid in list-matching bytecode; \
                         use pegscript_vm::list::ListVm for a list-mode program",
                        opcode.mnemonic()
                    );
                }
            }
        }
    }

    fn peek_char(&self, input: &[u8]) -> Option<(char, usize)> {
        if self.cursor >= input.len() {
            None
        } else {
            Some(decode_utf8_lossy(&input[self.cursor..]))
        }
    }

    fn bump_ffp(&mut self) {
        if self.cursor > self.ffp {
            self.ffp = self.cursor;
        }
    }

    /// The failure routine, minus the expected-set bookkeeping a caller
    /// may want to do first (see [`Self::fail_with`]/[`Self::fail_plain`]).
    /// Pops frames until a Backtrack frame is found to resume into,
    /// truncating the node buffer back to each discarded frame's
    /// watermark along the way; with no Backtrack frame left, the match
    /// has failed outright.
    fn enter_failure(&mut self, tracer: &mut impl Tracer) -> Result<(), ParsingError> {
        tracer.trace_fail(self.cursor, self.ffp);
        self.bump_ffp();
        loop {
            match self.frames.pop() {
                None => return Err(self.build_error(None, None)),
                Some(Frame::Call { .. }) => continue,
                Some(Frame::Capture { nodes_start, .. }) => {
                    self.node_buffer.truncate(nodes_start);
                    continue;
                }
                Some(Frame::Backtrack {
                    cursor,
                    resume_pc,
                    nodes_start,
                    ..
                }) => {
                    self.cursor = cursor;
                    self.node_buffer.truncate(nodes_start);
                    self.pc = resume_pc;
                    tracer.trace_backtrack(resume_pc, cursor);
                    return Ok(());
                }
            }
        }
    }

    fn fail_plain(&mut self, tracer: &mut impl Tracer) -> Result<(), ParsingError> {
        self.enter_failure(tracer)
    }

    fn fail_with(
        &mut self,
        tracer: &mut impl Tracer,
        expectation: Expectation,
    ) -> Result<(), ParsingError> {
        if self.show_fails {
            self.expected.record(self.cursor, self.ffp, expectation);
        }
        self.enter_failure(tracer)
    }

    fn fail_with_many(
        &mut self,
        tracer: &mut impl Tracer,
        expectations: impl IntoIterator<Item = Expectation>,
    ) -> Result<(), ParsingError> {
        if self.show_fails {
            self.expected
                .record_many(self.cursor, self.ffp, expectations);
        }
        self.enter_failure(tracer)
    }

    /// THROW: if the nearest enclosing Backtrack frame's predicate
    /// flag is set, a THROW behaves as a plain FAIL. That frame may sit
    /// underneath open Call/Capture frames, so this walks down from the
    /// top rather than reading the topmost frame directly.
    fn nearest_backtrack_predicate(&self) -> bool {
        self.frames
            .iter_from_top()
            .find_map(|frame| match frame {
                Frame::Backtrack { predicate, .. } => Some(*predicate),
                _ => None,
            })
            .unwrap_or(false)
    }

    fn expect_pop_backtrack(&mut self, who: &str) -> (usize, u16) {
        match self.frames.pop() {
            Some(Frame::Backtrack {
                cursor, resume_pc, ..
            }) => (cursor, resume_pc),
            other => panic!("{who}: expected a Backtrack frame on top, found {other:?}"),
        }
    }

    fn refresh_top_backtrack(&mut self, who: &str, reset_nodes_start: bool) {
        let cursor = self.cursor;
        let nodes_len = self.node_buffer.len();
        match self.frames.top_mut() {
            Some(Frame::Backtrack {
                cursor: snapshot,
                nodes_start,
                ..
            }) => {
                *snapshot = cursor;
                if reset_nodes_start {
                    *nodes_start = nodes_len;
                }
            }
            other => panic!("{who}: expected a Backtrack frame on top, found {other:?}"),
        }
    }

    fn do_return(&mut self, tracer: &mut impl Tracer, allow_halt: bool) -> ReturnOutcome {
        match self.frames.pop() {
            Some(Frame::Call { return_pc, .. }) => {
                tracer.trace_return(return_pc);
                self.pc = return_pc;
                ReturnOutcome::Resumed
            }
            None if allow_halt => ReturnOutcome::Finished(self.close_success()),
            other => panic!("RETURN: expected a Call frame on top, found {other:?}"),
        }
    }

    /// `CAP_END`: pops the capture frame, builds exactly one tree
    /// node from its accumulated children (or none), and attaches the
    /// result to whatever encloses it.
    fn cap_end(&mut self) {
        let (id, start, nodes_start) = match self.frames.pop() {
            Some(Frame::Capture {
                id,
                start,
                nodes_start,
            }) => (id, start, nodes_start),
            other => panic!("CAP_END: expected a Capture frame on top, found {other:?}"),
        };
        let end = self.cursor;
        let children: Vec<NodeId> = self.node_buffer.slice(nodes_start).to_vec();
        let is_error = id != 0 && self.image.is_registered_error_label(id);

        let inner = match children.len() {
            0 if end > start => Some(self.tree.push_string(start, end)),
            0 => None,
            1 => Some(children[0]),
            _ => Some(self.tree.push_sequence(start, end, &children)),
        };

        self.node_buffer.truncate(nodes_start);

        let result = if is_error {
            let message = self.message_index_for(id);
            Some(self.tree.push_error(id, message, inner, start, end))
        } else {
            inner.map(|child| {
                if id != 0 {
                    self.tree.push_node(id, child, start, end)
                } else {
                    child
                }
            })
        };

        if let Some(node) = result {
            self.node_buffer.push(node);
        }
    }

    fn close_success(&mut self) -> NodeId {
        self.node_buffer
            .last()
            .unwrap_or_else(|| self.tree.push_string(0, self.cursor))
    }

    fn message_index_for(&self, label: u32) -> Option<u32> {
        self.label_messages
            .get(&label)
            .copied()
            .or_else(|| self.image.message_for(label))
    }

    fn message_text_for(&self, label: u32) -> Option<String> {
        self.message_index_for(label)
            .map(|index| self.image.strings().get(index).to_string())
    }

    fn label_name(&self, label: u32) -> Box<str> {
        self.image.strings().get(label).into()
    }

    fn build_error(&self, label: Option<Box<str>>, message: Option<String>) -> ParsingError {
        ParsingError::new(label, message, self.ffp, &self.expected)
    }

    // --- tree introspection ---

    pub fn node_kind(&self, id: NodeId) -> NodeKind {
        match self.tree.get(id) {
            TreeNode::String { .. } => NodeKind::String,
            TreeNode::Sequence { .. } => NodeKind::Sequence,
            TreeNode::Node { .. } => NodeKind::Node,
            TreeNode::Error { .. } => NodeKind::Error,
        }
    }

    pub fn range(&self, id: NodeId) -> (usize, usize) {
        self.tree.get(id).span()
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        match self.tree.get(id) {
            TreeNode::Node { name, .. } => Some(self.image.strings().get(*name)),
            _ => None,
        }
    }

    pub fn error_label(&self, id: NodeId) -> Option<&str> {
        match self.tree.get(id) {
            TreeNode::Error { label, .. } => Some(self.image.strings().get(*label)),
            _ => None,
        }
    }

    pub fn error_message(&self, id: NodeId) -> Option<&str> {
        match self.tree.get(id) {
            TreeNode::Error {
                message: Some(msg), ..
            } => Some(self.image.strings().get(*msg)),
            _ => None,
        }
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        match self.tree.get(id) {
            TreeNode::String { .. } => Vec::new(),
            TreeNode::Sequence { children, .. } => self.tree.children_of(*children).to_vec(),
            TreeNode::Node { child, .. } => vec![*child],
            TreeNode::Error { child, .. } => child.iter().copied().collect(),
        }
    }

    /// `text(id) -> bytes`: the source slice a node spans, concatenating
    /// children in order for a Sequence.
    pub fn text(&self, id: NodeId, input: &[u8]) -> Vec<u8> {
        match self.tree.get(id) {
            TreeNode::String { start, end } => input[*start..*end].to_vec(),
            TreeNode::Sequence { children, .. } => {
                let mut out = Vec::new();
                for &child in self.tree.children_of(*children) {
                    out.extend(self.text(child, input));
                }
                out
            }
            TreeNode::Node { child, .. } => self.text(*child, input),
            TreeNode::Error { child, .. } => child.map(|c| self.text(c, input)).unwrap_or_default(),
        }
    }

    /// Unicode box-drawing tree renderer.
    pub fn pretty(&self, id: NodeId, input: &[u8]) -> String {
        let mut out = String::new();
        self.render_node(id, input, Colors::OFF, "", true, &mut out);
        out
    }

    /// The colorized variant of [`Self::pretty`].
    pub fn highlight(&self, id: NodeId, input: &[u8], colors: Colors) -> String {
        let mut out = String::new();
        self.render_node(id, input, colors, "", true, &mut out);
        out
    }

    fn render_node(
        &self,
        id: NodeId,
        input: &[u8],
        colors: Colors,
        prefix: &str,
        is_last: bool,
        out: &mut String,
    ) {
        let (start, end) = self.range(id);
        let label = match self.node_kind(id) {
            NodeKind::String => format!(
                "{}{:?}{}",
                colors.green,
                String::from_utf8_lossy(&self.text(id, input)),
                colors.reset
            ),
            NodeKind::Sequence => format!("{}Sequence{}", colors.dim, colors.reset),
            NodeKind::Node => format!(
                "{}Node({}{}{}{})",
                colors.blue,
                colors.reset,
                self.name(id).unwrap_or(""),
                colors.reset,
                colors.blue
            ),
            NodeKind::Error => format!(
                "{}Error({}{}{}{})",
                colors.blue,
                colors.reset,
                self.error_label(id).unwrap_or(""),
                colors.reset,
                colors.blue
            ),
        };

        let branch = if prefix.is_empty() {
            ""
        } else if is_last {
            "└── "
        } else {
            "├── "
        };
        out.push_str(prefix);
        out.push_str(&format!("{}{branch}{}", colors.dim, colors.reset));
        out.push_str(&label);
        out.push_str(&format!("{} [{start}..{end}){}\n", colors.dim, colors.reset));

        let children = self.children(id);
        let child_prefix = if is_last {
            format!("{prefix}    ")
        } else {
            format!("{prefix}│   ")
        };
        for (i, child) in children.iter().enumerate() {
            let last = i + 1 == children.len();
            self.render_node(*child, input, colors, &child_prefix, last, out);
        }
    }
}

/// Decodes a single code point at `cursor` using a canonical UTF-8
/// decoder: on malformed input, yields U+FFFD and consumes one byte.
fn decode_utf8_lossy(bytes: &[u8]) -> (char, usize) {
    let b0 = bytes[0];
    let len = if b0 < 0x80 {
        1
    } else if b0 & 0xE0 == 0xC0 {
        2
    } else if b0 & 0xF0 == 0xE0 {
        3
    } else if b0 & 0xF8 == 0xF0 {
        4
    } else {
        0
    };
    if len == 0 || len > bytes.len() {
        return ('\u{FFFD}', 1);
    }
    match std::str::from_utf8(&bytes[..len]) {
        Ok(s) => (s.chars().next().expect("non-empty valid UTF-8 slice"), len),
        Err(_) => ('\u{FFFD}', 1),
    }
}

/// A charset's precomputed expected-ranges, as [`Expectation`]s.
fn charset_expectations(charset: &Charset) -> Vec<Expectation> {
    charset
        .precompute_expected()
        .unwrap_or_default()
        .into_iter()
        .map(|(a, b)| {
            if a == b {
                Expectation::Single(char::from(a))
            } else {
                Expectation::Range(char::from(a), char::from(b))
            }
        })
        .collect()
}

#[cfg(test)]
#[path = "vm_tests.rs"]
mod vm_tests;
