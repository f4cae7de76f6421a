//! Human-readable bytecode disassembly, used by tooling and snapshot tests.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use pegscript_core::Colors;

use crate::image::Image;
use crate::opcode::{Opcode, OperandShape};

/// Render `image`'s string table and instruction stream as text.
pub fn disassemble(image: &Image, colors: Colors) -> String {
    let mut out = String::new();
    let c = &colors;

    let strings = image.strings();
    writeln!(out, "{}[strings]{}", c.blue, c.reset).unwrap();
    let str_width = width_for_count(strings.len());
    for i in 0..strings.len() as u32 {
        writeln!(
            out,
            "S{i:0w$} {}{:?}{}",
            c.green,
            strings.get(i),
            c.reset,
            w = str_width
        )
        .unwrap();
    }
    out.push('\n');

    writeln!(out, "{}[code]{}", c.blue, c.reset).unwrap();
    let jump_targets = collect_jump_targets(image);
    let pc_width = width_for_count(image.code_len());
    for pc in 0..image.code_len() {
        let instr = image.instr(pc);
        let marker = if jump_targets.contains(&pc) { "->" } else { "  " };
        write!(out, "{marker} {pc:0pw$} ", pw = pc_width).unwrap();
        match instr.opcode() {
            Some(op) => write_operands(&mut out, op, instr, &strings),
            None => write!(out, "<invalid opcode>").unwrap(),
        }
        out.push('\n');
    }

    out
}

fn collect_jump_targets(image: &Image) -> BTreeSet<usize> {
    let mut targets = BTreeSet::new();
    for pc in 0..image.code_len() {
        let instr = image.instr(pc);
        if let Some(op) = instr.opcode() {
            if op.operand_shape() == OperandShape::Address {
                targets.insert(instr.address() as usize);
            }
        }
    }
    targets
}

fn write_operands(
    out: &mut String,
    op: Opcode,
    instr: crate::instruction::Instruction,
    strings: &crate::strings::StringTable<'_>,
) {
    match op.operand_shape() {
        OperandShape::None => {
            write!(out, "{}", op.mnemonic()).unwrap();
        }
        OperandShape::Address => {
            write!(out, "{} {}", op.mnemonic(), instr.address()).unwrap();
        }
        OperandShape::Unsigned => match op {
            Opcode::Char => {
                let c = char::from_u32(instr.uoperand()).unwrap_or('\u{FFFD}');
                write!(out, "{} {:?}", op.mnemonic(), c).unwrap();
            }
            Opcode::Set | Opcode::Span => {
                write!(out, "{} C{}", op.mnemonic(), instr.uoperand()).unwrap();
            }
            Opcode::CapBegin | Opcode::Atom => {
                let index = instr.uoperand();
                write!(out, "{} S{} {:?}", op.mnemonic(), index, strings.get(index)).unwrap();
            }
            _ => {
                write!(out, "{} {}", op.mnemonic(), instr.uoperand()).unwrap();
            }
        },
        OperandShape::Split => match op {
            Opcode::CapNonTerm | Opcode::CapNonTermBeginOffset => {
                let index = instr.u1() as u32;
                write!(
                    out,
                    "{} S{} {:?} off={}",
                    op.mnemonic(),
                    index,
                    strings.get(index),
                    instr.u2()
                )
                .unwrap();
            }
            Opcode::Range => {
                let a = char::from_u32(instr.u1() as u32).unwrap_or('\u{FFFD}');
                let b = char::from_u32(instr.u2() as u32).unwrap_or('\u{FFFD}');
                write!(out, "{} {a:?} {b:?}", op.mnemonic()).unwrap();
            }
            _ => {
                write!(out, "{} {} {}", op.mnemonic(), instr.u1(), instr.u2()).unwrap();
            }
        },
        OperandShape::Signed => {
            write!(out, "{} {}", op.mnemonic(), instr.soperand()).unwrap();
        }
    }
}

fn width_for_count(count: usize) -> usize {
    count.checked_sub(1).map_or(1, |n| n.to_string().len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Image;
    use crate::instruction::Instruction;

    fn push_primary(strings: &[&str], code: &[Instruction]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(strings.len() as u16).to_le_bytes());
        for s in strings {
            out.push(s.len() as u8);
            out.extend_from_slice(s.as_bytes());
        }
        out.extend_from_slice(&(code.len() as u16).to_le_bytes());
        for instr in code {
            out.extend_from_slice(&instr.word().to_be_bytes());
        }
        out
    }

    #[test]
    fn disassembles_the_ordered_choice_scenario() {
        let code = vec![
            Instruction::at_address(Opcode::Choice, 3),
            Instruction::unsigned(Opcode::Char, 'a' as u32),
            Instruction::at_address(Opcode::Commit, 4),
            Instruction::unsigned(Opcode::Char, 'b' as u32),
            Instruction::no_operand(Opcode::Halt),
        ];
        let blob = push_primary(&[], &code);
        let image = Image::load(&blob).unwrap();

        let text = disassemble(&image, Colors::OFF);
        assert!(text.contains("CHOICE 3"));
        assert!(text.contains("CHAR 'a'"));
        assert!(text.contains("-> "));
        assert!(text.contains("HALT"));
    }

    #[test]
    fn ordered_choice_scenario_snapshot() {
        let code = vec![
            Instruction::at_address(Opcode::Choice, 3),
            Instruction::unsigned(Opcode::Char, 'a' as u32),
            Instruction::at_address(Opcode::Commit, 4),
            Instruction::unsigned(Opcode::Char, 'b' as u32),
            Instruction::no_operand(Opcode::Halt),
        ];
        let blob = push_primary(&[], &code);
        let image = Image::load(&blob).unwrap();

        insta::assert_snapshot!(disassemble(&image, Colors::OFF), @r"
        [strings]

        [code]
           0 CHOICE 3
           1 CHAR 'a'
           2 COMMIT 4
        -> 3 CHAR 'b'
        -> 4 HALT
        ");
    }

    #[test]
    fn recursive_rule_scenario_snapshot() {
        // S <- D '+' D; D <- '0' / '1'
        let code = vec![
            Instruction::at_address(Opcode::Call, 2),
            Instruction::unsigned(Opcode::Char, '+' as u32),
            Instruction::at_address(Opcode::Call, 2),
            Instruction::no_operand(Opcode::Halt),
            Instruction::at_address(Opcode::Choice, 7),
            Instruction::unsigned(Opcode::Char, '0' as u32),
            Instruction::at_address(Opcode::Commit, 8),
            Instruction::unsigned(Opcode::Char, '1' as u32),
            Instruction::no_operand(Opcode::Return),
        ];
        let blob = push_primary(&["S", "D"], &code);
        let image = Image::load(&blob).unwrap();

        insta::assert_snapshot!(disassemble(&image, Colors::OFF), @r#"
        [strings]
        S0 "S"
        S1 "D"

        [code]
           0 CALL 2
           1 CHAR '+'
        -> 2 CALL 2
           3 HALT
           4 CHOICE 7
           5 CHAR '0'
           6 COMMIT 8
        -> 7 CHAR '1'
        -> 8 RETURN
        "#);
    }
}
