use super::*;

#[test]
fn opcode_occupies_top_five_bits() {
    let instr = Instruction::no_operand(Opcode::Halt);
    assert_eq!(instr.word() >> 27, 0);
    let instr = Instruction::no_operand(Opcode::Close);
    assert_eq!(instr.word() >> 27, Opcode::Close as u32);
}

#[test]
fn unsigned_operand_round_trips() {
    let instr = Instruction::unsigned(Opcode::Char, 'a' as u32);
    assert_eq!(instr.opcode(), Some(Opcode::Char));
    assert_eq!(instr.uoperand(), 'a' as u32);
}

#[test]
fn signed_operand_round_trips_negative_values() {
    let instr = Instruction::signed(Opcode::Jump, -1);
    assert_eq!(instr.soperand(), -1);

    let instr = Instruction::signed(Opcode::Jump, -5);
    assert_eq!(instr.soperand(), -5);
}

#[test]
fn signed_operand_round_trips_positive_values() {
    let instr = Instruction::signed(Opcode::Jump, 1234);
    assert_eq!(instr.soperand(), 1234);
}

#[test]
fn split_operand_recovers_both_fields() {
    let instr = Instruction::split(Opcode::Range, 0x41, 0x7A);
    assert_eq!(instr.u1(), 0x41);
    assert_eq!(instr.u2(), 0x7A);
}

#[test]
fn split_operand_masks_high_field_to_eleven_bits() {
    let instr = Instruction::split(Opcode::CapNonTerm, 0xFFFF, 0);
    assert_eq!(instr.u1(), 0x07FF);
}

#[test]
fn address_operand_round_trips() {
    let instr = Instruction::at_address(Opcode::Choice, 0xBEEF);
    assert_eq!(instr.address(), 0xBEEF);
}

#[test]
fn invalid_opcode_decodes_to_none() {
    let word = 31u32 << 27;
    let instr = Instruction::from_word(word);
    assert_eq!(instr.opcode(), None);
}

#[test]
fn word_round_trips_through_from_word() {
    let instr = Instruction::split(Opcode::Range, 5, 600);
    let rebuilt = Instruction::from_word(instr.word());
    assert_eq!(rebuilt, instr);
}
