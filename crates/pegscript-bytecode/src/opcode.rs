//! The instruction set: 31 opcodes, each occupying the top 5 bits of a
//! 32-bit instruction word.

/// One opcode of the PEG bytecode machine.
///
/// Discriminants are the 5-bit opcode value stored in the high bits of an
/// [`crate::instruction::Instruction`] word; they are part of the on-disk
/// contract and must never be renumbered once assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Halt = 0,
    Any = 1,
    Char = 2,
    Range = 3,
    Set = 4,
    Span = 5,
    Choice = 6,
    ChoicePred = 7,
    Commit = 8,
    PartialCommit = 9,
    BackCommit = 10,
    Fail = 11,
    FailTwice = 12,
    Jump = 13,
    Call = 14,
    Return = 15,
    Throw = 16,
    CapBegin = 17,
    CapEnd = 18,
    CapTerm = 19,
    CapNonTerm = 20,
    CapTermBeginOffset = 21,
    CapNonTermBeginOffset = 22,
    CapEndOffset = 23,
    CapCommit = 24,
    CapBackCommit = 25,
    CapPartialCommit = 26,
    CapReturn = 27,
    Atom = 28,
    Open = 29,
    Close = 30,
}

/// How an instruction's 27-bit operand field is carved up. Purely
/// descriptive — used by the disassembler and by tests that want to
/// sanity-check encode/decode round trips generically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandShape {
    /// No operand bits used.
    None,
    /// Unsigned 27-bit value.
    Unsigned,
    /// Signed 27-bit value, two's complement, sign-extended from bit 26.
    Signed,
    /// Split into an 11-bit high field and a 16-bit low field.
    Split,
    /// 16-bit code address, stored in the low 16 bits.
    Address,
}

impl Opcode {
    pub const COUNT: usize = 31;

    pub fn from_u8(value: u8) -> Option<Self> {
        use Opcode::*;
        let op = match value {
            0 => Halt,
            1 => Any,
            2 => Char,
            3 => Range,
            4 => Set,
            5 => Span,
            6 => Choice,
            7 => ChoicePred,
            8 => Commit,
            9 => PartialCommit,
            10 => BackCommit,
            11 => Fail,
            12 => FailTwice,
            13 => Jump,
            14 => Call,
            15 => Return,
            16 => Throw,
            17 => CapBegin,
            18 => CapEnd,
            19 => CapTerm,
            20 => CapNonTerm,
            21 => CapTermBeginOffset,
            22 => CapNonTermBeginOffset,
            23 => CapEndOffset,
            24 => CapCommit,
            25 => CapBackCommit,
            26 => CapPartialCommit,
            27 => CapReturn,
            28 => Atom,
            29 => Open,
            30 => Close,
            _ => return None,
        };
        Some(op)
    }

    pub fn mnemonic(self) -> &'static str {
        use Opcode::*;
        match self {
            Halt => "HALT",
            Any => "ANY",
            Char => "CHAR",
            Range => "RANGE",
            Set => "SET",
            Span => "SPAN",
            Choice => "CHOICE",
            ChoicePred => "CHOICE_PRED",
            Commit => "COMMIT",
            PartialCommit => "PARTIAL_COMMIT",
            BackCommit => "BACK_COMMIT",
            Fail => "FAIL",
            FailTwice => "FAIL_TWICE",
            Jump => "JUMP",
            Call => "CALL",
            Return => "RETURN",
            Throw => "THROW",
            CapBegin => "CAP_BEGIN",
            CapEnd => "CAP_END",
            CapTerm => "CAP_TERM",
            CapNonTerm => "CAP_NON_TERM",
            CapTermBeginOffset => "CAP_TERM_BEGIN_OFFSET",
            CapNonTermBeginOffset => "CAP_NON_TERM_BEGIN_OFFSET",
            CapEndOffset => "CAP_END_OFFSET",
            CapCommit => "CAP_COMMIT",
            CapBackCommit => "CAP_BACK_COMMIT",
            CapPartialCommit => "CAP_PARTIAL_COMMIT",
            CapReturn => "CAP_RETURN",
            Atom => "ATOM",
            Open => "OPEN",
            Close => "CLOSE",
        }
    }

    pub fn operand_shape(self) -> OperandShape {
        use Opcode::*;
        use OperandShape::*;
        match self {
            Halt | Any | Fail | FailTwice | Return | CapEnd | CapEndOffset | CapReturn | Open
            | Close => None,
            Char | Set | Span | CapBegin | CapTerm | CapTermBeginOffset | Atom => Unsigned,
            Range | CapNonTerm | CapNonTermBeginOffset => Split,
            Choice | ChoicePred | Commit | PartialCommit | BackCommit | Jump | Call | Throw
            | CapCommit | CapBackCommit | CapPartialCommit => Address,
        }
    }
}

#[cfg(test)]
#[path = "opcode_tests.rs"]
mod opcode_tests;
