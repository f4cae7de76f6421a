//! List matcher: an alternate evaluator that runs the same control-flow
//! opcodes over a cons-list subject instead of a byte string. Grounded on
//! the same append-only, watermark-truncated buffer shape as the byte
//! evaluator's capture machinery ([`super::vm::Vm::cap_end`]) — here the
//! buffer accumulates consumed list elements instead of tree nodes, and
//! `CLOSE` plays the role `CAP_END` plays there.

use std::rc::Rc;

use pegscript_bytecode::{Image, Opcode};

use super::error::ParsingError;
use super::expected::ExpectedSet;
use super::trace::{NoopTracer, Tracer};

/// A cons-list subject: `Nil`, an `Atom` naming itself by string, or a
/// `Cons` of a head and tail. Persistent (structural sharing via [`Rc`])
/// so that backtracking never needs to copy a list, only a pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListValue {
    Nil,
    Atom(Box<str>),
    Cons(Rc<ListValue>, Rc<ListValue>),
}

impl ListValue {
    pub fn nil() -> Rc<Self> {
        Rc::new(ListValue::Nil)
    }

    pub fn atom(name: impl Into<Box<str>>) -> Rc<Self> {
        Rc::new(ListValue::Atom(name.into()))
    }

    pub fn cons(head: Rc<ListValue>, tail: Rc<ListValue>) -> Rc<Self> {
        Rc::new(ListValue::Cons(head, tail))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, ListValue::Nil)
    }
}

impl FromIterator<Rc<ListValue>> for Rc<ListValue> {
    /// Builds a right-nested cons chain terminated by `Nil`, in the order
    /// the items were yielded.
    fn from_iter<T: IntoIterator<Item = Rc<ListValue>>>(iter: T) -> Self {
        let items: Vec<_> = iter.into_iter().collect();
        items
            .into_iter()
            .rev()
            .fold(ListValue::nil(), |tail, head| ListValue::cons(head, tail))
    }
}

/// One entry of the list evaluator's frame stack. Mirrors
/// [`super::frame::Frame`]'s shape: a Backtrack frame for ordered choice, a
/// Call frame for rule invocation, and an Enclosure frame — the list
/// evaluator's analogue of a Capture frame — opened by `OPEN` and closed by
/// `CLOSE`.
#[derive(Debug, Clone)]
enum ListFrame {
    Backtrack {
        cursor: Rc<ListValue>,
        position: usize,
        resume_pc: u16,
        predicate: bool,
        collected_start: usize,
    },
    Call {
        return_pc: u16,
    },
    Enclosure {
        saved_cdr: Rc<ListValue>,
        collected_start: usize,
    },
}

/// Runtime limits shared with the byte evaluator's [`super::vm::VmLimits`],
/// duplicated here rather than imported because the two evaluators don't
/// otherwise share any mutable state.
#[derive(Clone, Copy, Debug)]
pub struct ListVmLimits {
    max_steps: u32,
    max_frames: u32,
}

impl Default for ListVmLimits {
    fn default() -> Self {
        Self {
            max_steps: 10_000_000,
            max_frames: 100_000,
        }
    }
}

impl ListVmLimits {
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

/// Executes the control-flow subset of the bytecode format against a
/// cons-list subject. Does not build a capture tree; a successful match
/// returns either the unconsumed tail of the subject, or — if the program
/// wraps the whole match in `OPEN ... CLOSE` — the list `CLOSE` built out
/// of the elements it enclosed.
pub struct ListVm<'img> {
    image: &'img Image,
    frames: Vec<ListFrame>,
    collected: Vec<Rc<ListValue>>,
    expected: ExpectedSet,
    ffp: usize,
    limits: ListVmLimits,
    steps: u32,
    pc: u16,
    cursor: Rc<ListValue>,
    position: usize,
    /// Nesting depth of currently-open `OPEN`/`CLOSE` scopes.
    enclosure_depth: usize,
    /// The most recently built `CLOSE` result that closed its outermost
    /// enclosure, invalidated the moment any further element is consumed
    /// at depth zero. See [`Self::close_success`].
    last_closed: Option<Rc<ListValue>>,
}

impl<'img> ListVm<'img> {
    pub fn new(image: &'img Image) -> Self {
        Self {
            image,
            frames: Vec::new(),
            collected: Vec::new(),
            expected: ExpectedSet::new(),
            ffp: 0,
            limits: ListVmLimits::default(),
            steps: 0,
            pc: 0,
            cursor: ListValue::nil(),
            position: 0,
            enclosure_depth: 0,
            last_closed: None,
        }
    }

    pub fn set_limits(&mut self, limits: ListVmLimits) {
        self.limits = limits;
    }

    pub fn match_input(&mut self, subject: Rc<ListValue>) -> Result<Rc<ListValue>, ParsingError> {
        self.match_with_tracer(subject, 0, &mut NoopTracer)
    }

    pub fn match_with_tracer(
        &mut self,
        subject: Rc<ListValue>,
        start_pc: u16,
        tracer: &mut impl Tracer,
    ) -> Result<Rc<ListValue>, ParsingError> {
        self.frames.clear();
        self.collected.clear();
        self.expected.reset();
        self.ffp = 0;
        self.steps = 0;
        self.position = 0;
        self.enclosure_depth = 0;
        self.last_closed = None;
        self.pc = start_pc;
        self.cursor = subject;
        self.run(tracer)
    }

    fn run(&mut self, tracer: &mut impl Tracer) -> Result<Rc<ListValue>, ParsingError> {
        loop {
            self.steps += 1;
            if self.steps > self.limits.max_steps {
                return Err(ParsingError::new(
                    Some("<step-limit>".into()),
                    Some(format!(
                        "execution step limit of {} exceeded",
                        self.limits.max_steps
                    )),
                    self.ffp,
                    &self.expected,
                ));
            }
            if self.frames.len() as u32 > self.limits.max_frames {
                return Err(ParsingError::new(
                    Some("<frame-limit>".into()),
                    Some(format!(
                        "frame stack limit of {} exceeded",
                        self.limits.max_frames
                    )),
                    self.ffp,
                    &self.expected,
                ));
            }

            let pc = self.pc;
            let instr = self.image.instr(pc as usize);
            tracer.trace_step(pc, instr, self.position, self.frames.len());

            let Some(opcode) = instr.opcode() else {
                panic!("unknown opcode byte at pc {pc}");
            };

            match opcode {
                Opcode::Halt => return Ok(self.close_success()),

                Opcode::Any => match self.head() {
                    Some((head, tail)) => {
                        self.collect(head);
                        self.advance(tail, pc + 1);
                    }
                    None => self.fail(tracer)?,
                },

                Opcode::Atom => {
                    let expected_name = self.image.strings().get(instr.uoperand());
                    match self.head() {
                        Some((head, tail)) if matches!(head.as_ref(), ListValue::Atom(n) if n.as_ref() == expected_name) =>
                        {
                            self.collect(head);
                            self.advance(tail, pc + 1);
                        }
                        _ => self.fail(tracer)?,
                    }
                }

                // Requires the head to be a cons — the first element of
                // the current list must itself be a non-empty nested list.
                // Descends into that element (it becomes the
                // new cursor); the outer list's remainder is stashed on the
                // Enclosure frame and restored by `CLOSE`.
                Opcode::Open => match self.head() {
                    Some((head, outer_tail)) if matches!(head.as_ref(), ListValue::Cons(..)) => {
                        self.frames.push(ListFrame::Enclosure {
                            saved_cdr: outer_tail,
                            collected_start: self.collected.len(),
                        });
                        self.enclosure_depth += 1;
                        self.cursor = head;
                        self.pc = pc + 1;
                    }
                    _ => self.fail(tracer)?,
                },

                Opcode::Close => {
                    if !self.cursor.is_nil() {
                        self.fail(tracer)?;
                        continue;
                    }
                    match self.frames.pop() {
                        Some(ListFrame::Enclosure {
                            saved_cdr,
                            collected_start,
                        }) => {
                            let items: Vec<_> = self.collected.split_off(collected_start);
                            let list: Rc<ListValue> = items.into_iter().collect();
                            self.enclosure_depth -= 1;
                            if self.enclosure_depth > 0 {
                                self.collected.push(list);
                            } else {
                                self.last_closed = Some(list);
                            }
                            self.cursor = saved_cdr;
                            self.pc = pc + 1;
                        }
                        other => panic!("CLOSE: expected an Enclosure frame on top, found {other:?}"),
                    }
                }

                Opcode::Span => {
                    // SPAN is a no-op in list mode; there are no bytes to span.
                    self.pc = pc + 1;
                }

                Opcode::Choice => {
                    self.frames.push(ListFrame::Backtrack {
                        cursor: self.cursor.clone(),
                        position: self.position,
                        resume_pc: instr.address(),
                        predicate: false,
                        collected_start: self.collected.len(),
                    });
                    self.pc = pc + 1;
                }

                Opcode::ChoicePred => {
                    self.frames.push(ListFrame::Backtrack {
                        cursor: self.cursor.clone(),
                        position: self.position,
                        resume_pc: instr.address(),
                        predicate: true,
                        collected_start: self.collected.len(),
                    });
                    self.pc = pc + 1;
                }

                Opcode::Commit | Opcode::CapCommit => {
                    self.expect_pop_backtrack(opcode.mnemonic());
                    self.pc = instr.address();
                }

                Opcode::PartialCommit | Opcode::CapPartialCommit => {
                    let cursor = self.cursor.clone();
                    let position = self.position;
                    let collected_len = self.collected.len();
                    match self.frames.last_mut() {
                        Some(ListFrame::Backtrack {
                            cursor: snapshot,
                            position: snapshot_position,
                            collected_start,
                            ..
                        }) => {
                            *snapshot = cursor;
                            *snapshot_position = position;
                            if opcode == Opcode::CapPartialCommit {
                                *collected_start = collected_len;
                            }
                        }
                        other => panic!(
                            "{}: expected a Backtrack frame on top, found {other:?}",
                            opcode.mnemonic()
                        ),
                    }
                    self.pc = instr.address();
                }

                Opcode::BackCommit | Opcode::CapBackCommit => {
                    let (cursor, position, _) = self.expect_pop_backtrack(opcode.mnemonic());
                    self.cursor = cursor;
                    self.position = position;
                    self.pc = instr.address();
                }

                Opcode::Fail => self.fail(tracer)?,

                Opcode::FailTwice => {
                    self.expect_pop_backtrack(opcode.mnemonic());
                    self.fail(tracer)?;
                }

                Opcode::Jump => self.pc = instr.address(),

                Opcode::Call => {
                    self.frames.push(ListFrame::Call { return_pc: pc + 1 });
                    tracer.trace_call(instr.address());
                    self.pc = instr.address();
                }

                Opcode::Return | Opcode::CapReturn => match self.frames.pop() {
                    Some(ListFrame::Call { return_pc }) => {
                        tracer.trace_return(return_pc);
                        self.pc = return_pc;
                    }
                    None => return Ok(self.close_success()),
                    other => panic!("RETURN: expected a Call frame on top, found {other:?}"),
                },

                Opcode::Throw => {
                    let label = instr.address() as u32;
                    if self.nearest_backtrack_predicate() {
                        self.fail(tracer)?;
                    } else if let Some(handler_pc) = self.image.handler_for(label) {
                        tracer.trace_throw(label, true);
                        self.frames.push(ListFrame::Call { return_pc: pc + 1 });
                        self.pc = handler_pc;
                    } else {
                        tracer.trace_throw(label, false);
                        let name: Box<str> = self.image.strings().get(label).into();
                        let message = self
                            .image
                            .message_for(label)
                            .map(|index| self.image.strings().get(index).to_string());
                        return Err(ParsingError::new(Some(name), message, self.ffp, &self.expected));
                    }
                }

                Opcode::Char
                | Opcode::Range
                | Opcode::Set
                | Opcode::CapBegin
                | Opcode::CapEnd
                | Opcode::CapTerm
                | Opcode::CapNonTerm
                | Opcode::CapTermBeginOffset
                | Opcode::CapNonTermBeginOffset
                | Opcode::CapEndOffset => {
                    panic!(
                        "{} is only valid in byte-matching bytecode; \
                         use pegscript_vm::Vm for a byte-mode program",
                        opcode.mnemonic()
                    );
                }
            }
        }
    }

    fn head(&self) -> Option<(Rc<ListValue>, Rc<ListValue>)> {
        match self.cursor.as_ref() {
            ListValue::Cons(head, tail) => Some((head.clone(), tail.clone())),
            _ => None,
        }
    }

    /// Records a matched element as a child of the innermost open
    /// enclosure, if any. At depth zero there is no enclosing `CLOSE` to
    /// gather it, so it's dropped — but doing so invalidates whatever
    /// [`Self::last_closed`] was set by an earlier depth-zero `CLOSE`,
    /// since more of the subject has now been consumed past it.
    fn collect(&mut self, value: Rc<ListValue>) {
        if self.enclosure_depth > 0 {
            self.collected.push(value);
        } else {
            self.last_closed = None;
        }
    }

    fn advance(&mut self, tail: Rc<ListValue>, next_pc: u16) {
        self.cursor = tail;
        self.position += 1;
        self.pc = next_pc;
    }

    fn fail(&mut self, tracer: &mut impl Tracer) -> Result<(), ParsingError> {
        tracer.trace_fail(self.position, self.ffp);
        if self.position > self.ffp {
            self.ffp = self.position;
        }
        loop {
            match self.frames.pop() {
                None => {
                    return Err(ParsingError::new(None, None, self.ffp, &self.expected));
                }
                Some(ListFrame::Call { .. }) => continue,
                Some(ListFrame::Enclosure { collected_start, .. }) => {
                    self.collected.truncate(collected_start);
                    self.enclosure_depth -= 1;
                    continue;
                }
                Some(ListFrame::Backtrack {
                    cursor,
                    position,
                    resume_pc,
                    collected_start,
                    ..
                }) => {
                    self.cursor = cursor;
                    self.position = position;
                    self.collected.truncate(collected_start);
                    self.pc = resume_pc;
                    tracer.trace_backtrack(resume_pc, position);
                    return Ok(());
                }
            }
        }
    }

    fn nearest_backtrack_predicate(&self) -> bool {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| match frame {
                ListFrame::Backtrack { predicate, .. } => Some(*predicate),
                _ => None,
            })
            .unwrap_or(false)
    }

    fn expect_pop_backtrack(&mut self, who: &str) -> (Rc<ListValue>, usize, u16) {
        match self.frames.pop() {
            Some(ListFrame::Backtrack {
                cursor,
                position,
                resume_pc,
                ..
            }) => (cursor, position, resume_pc),
            other => panic!("{who}: expected a Backtrack frame on top, found {other:?}"),
        }
    }

    fn close_success(&mut self) -> Rc<ListValue> {
        self.last_closed
            .clone()
            .or_else(|| self.collected.last().cloned())
            .unwrap_or_else(|| self.cursor.clone())
    }
}

#[cfg(test)]
#[path = "list_tests.rs"]
mod list_tests;
