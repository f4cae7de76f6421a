//! Loaded bytecode image: string table, instruction stream, and the
//! extended sections (charsets, handler map, message map, registered error
//! labels) a real compiler must also hand the VM.

use crate::aligned_vec::AlignedVec;
use crate::charset::CharsetTable;
use crate::header::{self, Header};
use crate::instruction::{Instruction, STEP_SIZE};
use crate::opcode::{Opcode, OperandShape};
use crate::strings::StringTable;

/// Failures that can occur while validating and loading a bytecode image.
///
/// Every variant is a load-time defect — a malformed or truncated blob, or
/// an operand that a correct compiler would never emit. None of these are
/// reachable once an image has been successfully loaded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("blob too short: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("bad extended-container magic: {0:?}")]
    BadMagic([u8; 4]),

    #[error("unsupported extended-container version: {0}")]
    UnsupportedVersion(u32),

    #[error("string {index} length {len} runs past end of string blob")]
    StringOverrun { index: usize, len: usize },

    #[error("instruction {pc} references out-of-range string index {index} (table has {count})")]
    StringRefOutOfRange { pc: usize, index: u32, count: usize },

    #[error(
        "instruction {pc} references out-of-range charset index {index} (table has {count})"
    )]
    CharsetRefOutOfRange { pc: usize, index: u32, count: usize },

    #[error("instruction {pc} jumps to out-of-range address {target} (code has {code_len} instructions)")]
    AddressOutOfRange {
        pc: usize,
        target: u32,
        code_len: usize,
    },

    #[error("instruction {pc} has unknown opcode byte {opcode}")]
    UnknownOpcode { pc: usize, opcode: u8 },
}

/// A fully validated bytecode image, owning its backing bytes.
pub struct Image {
    code_storage: AlignedVec,
    code_count: usize,
    str_offsets: Vec<u8>,
    str_blob: Vec<u8>,
    str_count: usize,
    charset_storage: AlignedVec,
    charset_count: usize,
    handlers: Vec<(u32, u16)>,
    messages: Vec<(u32, u32)>,
    registered_error_labels: Vec<u8>,
}

fn validate_instruction(
    pc: usize,
    instr: Instruction,
    code_count: usize,
    str_count: usize,
    charset_count: usize,
) -> Result<(), LoadError> {
    let Some(op) = instr.opcode() else {
        return Err(LoadError::UnknownOpcode {
            pc,
            opcode: (instr.word() >> 27) as u8,
        });
    };

    let check_str = |index: u32| -> Result<(), LoadError> {
        if index as usize >= str_count {
            Err(LoadError::StringRefOutOfRange {
                pc,
                index,
                count: str_count,
            })
        } else {
            Ok(())
        }
    };

    match op.operand_shape() {
        OperandShape::Address if op == Opcode::Throw => {
            // THROW's operand is a label (string-table index), not a code
            // address, despite sharing the Address operand shape with the
            // jump-target opcodes.
            check_str(instr.address() as u32)?;
        }
        OperandShape::Address => {
            let target = instr.address() as u32;
            if target as usize >= code_count {
                return Err(LoadError::AddressOutOfRange {
                    pc,
                    target,
                    code_len: code_count,
                });
            }
        }
        OperandShape::Unsigned => match op {
            Opcode::Set | Opcode::Span => {
                let index = instr.uoperand();
                if index as usize >= charset_count {
                    return Err(LoadError::CharsetRefOutOfRange {
                        pc,
                        index,
                        count: charset_count,
                    });
                }
            }
            Opcode::CapBegin | Opcode::Atom => check_str(instr.uoperand())?,
            // CHAR's operand is a Unicode scalar value; CAP_TERM/
            // CAP_TERM_BEGIN_OFFSET operands are byte offsets. Neither is
            // a table index.
            _ => {}
        },
        OperandShape::Split => {
            if matches!(op, Opcode::CapNonTerm | Opcode::CapNonTermBeginOffset) {
                check_str(instr.u1() as u32)?;
            }
            // RANGE's u1/u2 are code point bounds, not indices.
        }
        OperandShape::None | OperandShape::Signed => {}
    }

    Ok(())
}

impl Image {
    /// Load the primary blob, with no extended sections.
    pub fn load(blob: &[u8]) -> Result<Self, LoadError> {
        Self::load_extended(blob, &[], &[], &[], &[])
    }

    /// Load a primary blob plus its extended sections (charsets, handler
    /// map, message map, registered-error-label set).
    pub fn load_extended(
        blob: &[u8],
        charsets: &[u8],
        handlers: &[(u32, u16)],
        messages: &[(u32, u32)],
        registered_error_labels: &[u8],
    ) -> Result<Self, LoadError> {
        let mut cursor = 0usize;
        let str_count = read_u16(blob, &mut cursor)? as usize;

        // The primary blob interleaves (8-bit length, bytes) pairs directly in the
        // blob; re-flatten them into an offsets table + contiguous blob so
        // `StringTable` can do O(1) lookups afterwards.
        let mut str_offsets = Vec::with_capacity((str_count + 1) * 4);
        let mut str_blob = Vec::new();
        str_offsets.extend_from_slice(&0u32.to_le_bytes());
        for i in 0..str_count {
            let len = read_u8(blob, &mut cursor)? as usize;
            let bytes = blob.get(cursor..cursor + len).ok_or(LoadError::StringOverrun { index: i, len })?;
            str_blob.extend_from_slice(bytes);
            cursor += len;
            str_offsets.extend_from_slice(&(str_blob.len() as u32).to_le_bytes());
        }

        let code_count = read_u16(blob, &mut cursor)? as usize;
        let code_start = cursor;
        let code_bytes = code_count * STEP_SIZE;
        let code_end = code_start + code_bytes;
        if code_end > blob.len() {
            return Err(LoadError::Truncated {
                expected: code_end,
                actual: blob.len(),
            });
        }

        let charset_count = charsets.len() / 32;

        for pc in 0..code_count {
            let word_bytes = &blob[code_start + pc * STEP_SIZE..code_start + (pc + 1) * STEP_SIZE];
            let word = u32::from_be_bytes(word_bytes.try_into().unwrap());
            let instr = Instruction::from_word(word);
            validate_instruction(pc, instr, code_count, str_count, charset_count)?;
        }

        let code_storage = AlignedVec::copy_from_slice(&blob[code_start..code_end]);
        let charset_storage = AlignedVec::copy_from_slice(charsets);

        Ok(Self {
            code_storage,
            code_count,
            str_offsets,
            str_blob,
            str_count,
            charset_storage,
            charset_count,
            handlers: handlers.to_vec(),
            messages: messages.to_vec(),
            registered_error_labels: registered_error_labels.to_vec(),
        })
    }

    /// Load a blob produced by the extended container format this crate
    /// defines (magic `PSX1` + 32-byte [`Header`]) for bundling charsets
    /// and the handler/message maps alongside the primary blob.
    pub fn load_container(bytes: &[u8]) -> Result<Self, LoadError> {
        let header = Header::from_bytes(bytes).ok_or(LoadError::Truncated {
            expected: header::HEADER_SIZE,
            actual: bytes.len(),
        })?;
        if !header.validate_magic() {
            return Err(LoadError::BadMagic(header.magic));
        }
        if !header.validate_version() {
            return Err(LoadError::UnsupportedVersion(header.version));
        }

        let mut cursor = header::HEADER_SIZE;
        let primary_end = cursor + header.primary_size as usize;
        let primary = slice(bytes, cursor, primary_end)?;
        cursor = primary_end;

        let charset_bytes_len = header.charset_count as usize * 32;
        let charsets = slice(bytes, cursor, cursor + charset_bytes_len)?;
        cursor += charset_bytes_len;

        let mut handlers = Vec::with_capacity(header.handler_count as usize);
        for _ in 0..header.handler_count {
            let label = read_u32(bytes, &mut cursor)?;
            let addr = read_u32(bytes, &mut cursor)? as u16;
            handlers.push((label, addr));
        }

        let mut messages = Vec::with_capacity(header.message_count as usize);
        for _ in 0..header.message_count {
            let label = read_u32(bytes, &mut cursor)?;
            let message = read_u32(bytes, &mut cursor)?;
            messages.push((label, message));
        }

        let registered_len = header.registered_label_bytes as usize;
        let registered = slice(bytes, cursor, cursor + registered_len)?;

        Self::load_extended(primary, charsets, &handlers, &messages, registered)
    }

    pub fn strings(&self) -> StringTable<'_> {
        StringTable::new(&self.str_offsets, &self.str_blob, self.str_count)
    }

    pub fn code_len(&self) -> usize {
        self.code_count
    }

    pub fn instr(&self, pc: usize) -> Instruction {
        assert!(
            pc < self.code_count,
            "instr: pc {pc} out of range (code has {} instructions)",
            self.code_count
        );
        let start = pc * STEP_SIZE;
        let word = u32::from_be_bytes(
            self.code_storage.as_slice()[start..start + STEP_SIZE]
                .try_into()
                .unwrap(),
        );
        Instruction::from_word(word)
    }

    pub fn charsets(&self) -> CharsetTable<'_> {
        CharsetTable::new(self.charset_storage.as_slice())
    }

    pub fn charset_count(&self) -> usize {
        self.charset_count
    }

    pub fn handler_for(&self, label: u32) -> Option<u16> {
        self.handlers.iter().find(|(l, _)| *l == label).map(|(_, a)| *a)
    }

    pub fn message_for(&self, label: u32) -> Option<u32> {
        self.messages.iter().find(|(l, _)| *l == label).map(|(_, m)| *m)
    }

    pub fn is_registered_error_label(&self, label: u32) -> bool {
        let index = label as usize;
        let byte = index / 8;
        let bit = index % 8;
        self.registered_error_labels
            .get(byte)
            .is_some_and(|b| (b >> bit) & 1 != 0)
    }
}

fn slice(bytes: &[u8], start: usize, end: usize) -> Result<&[u8], LoadError> {
    bytes.get(start..end).ok_or(LoadError::Truncated {
        expected: end,
        actual: bytes.len(),
    })
}

fn read_u8(bytes: &[u8], cursor: &mut usize) -> Result<u8, LoadError> {
    let b = *bytes.get(*cursor).ok_or(LoadError::Truncated {
        expected: *cursor + 1,
        actual: bytes.len(),
    })?;
    *cursor += 1;
    Ok(b)
}

fn read_u16(bytes: &[u8], cursor: &mut usize) -> Result<u16, LoadError> {
    let s = bytes.get(*cursor..*cursor + 2).ok_or(LoadError::Truncated {
        expected: *cursor + 2,
        actual: bytes.len(),
    })?;
    *cursor += 2;
    Ok(u16::from_le_bytes(s.try_into().unwrap()))
}

fn read_u32(bytes: &[u8], cursor: &mut usize) -> Result<u32, LoadError> {
    let s = bytes.get(*cursor..*cursor + 4).ok_or(LoadError::Truncated {
        expected: *cursor + 4,
        actual: bytes.len(),
    })?;
    *cursor += 4;
    Ok(u32::from_le_bytes(s.try_into().unwrap()))
}

#[cfg(test)]
#[path = "image_tests.rs"]
mod image_tests;
