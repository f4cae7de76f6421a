use super::*;
use pegscript_bytecode::{Image, Instruction, Opcode};
use std::rc::Rc;

fn encode_primary(strings: &[&str], code: &[Instruction]) -> Vec<u8> {
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

fn build(strings: &[&str], code: &[Instruction]) -> Image {
    Image::load(&encode_primary(strings, code)).expect("well-formed test program")
}

fn list_of(names: &[&str]) -> Rc<ListValue> {
    names.iter().rev().fold(ListValue::nil(), |tail, name| {
        ListValue::cons(ListValue::atom(*name), tail)
    })
}

#[test]
fn atom_matches_and_advances() {
    // ATOM "x"; ATOM "y"; HALT
    let code = vec![
        Instruction::unsigned(Opcode::Atom, 1),
        Instruction::unsigned(Opcode::Atom, 2),
        Instruction::no_operand(Opcode::Halt),
    ];
    let image = build(&["", "x", "y"], &code);
    let mut vm = ListVm::new(&image);

    let result = vm.match_input(list_of(&["x", "y"])).expect("matches both atoms");
    assert!(result.is_nil());
}

#[test]
fn atom_mismatch_fails() {
    let code = vec![
        Instruction::unsigned(Opcode::Atom, 1),
        Instruction::no_operand(Opcode::Halt),
    ];
    let image = build(&["", "x"], &code);
    let mut vm = ListVm::new(&image);

    assert!(vm.match_input(list_of(&["y"])).is_err());
}

#[test]
fn any_consumes_a_single_element_of_any_shape() {
    let code = vec![
        Instruction::no_operand(Opcode::Any),
        Instruction::no_operand(Opcode::Halt),
    ];
    let image = build(&[], &code);
    let mut vm = ListVm::new(&image);

    let result = vm.match_input(list_of(&["whatever"])).expect("ANY consumes one element");
    assert!(result.is_nil());
}

#[test]
fn ordered_choice_over_list_elements_backtracks() {
    // CHOICE -> 3; ATOM "a"; COMMIT -> 4; L1: ATOM "b"; L2: HALT
    let code = vec![
        Instruction::at_address(Opcode::Choice, 3),
        Instruction::unsigned(Opcode::Atom, 1),
        Instruction::at_address(Opcode::Commit, 4),
        Instruction::unsigned(Opcode::Atom, 2),
        Instruction::no_operand(Opcode::Halt),
    ];
    let image = build(&["", "a", "b"], &code);

    let mut vm = ListVm::new(&image);
    assert!(vm.match_input(list_of(&["b"])).is_ok());

    let mut vm = ListVm::new(&image);
    assert!(vm.match_input(list_of(&["a"])).is_ok());

    let mut vm = ListVm::new(&image);
    assert!(vm.match_input(list_of(&["c"])).is_err());
}

#[test]
fn open_close_descends_into_a_nested_list_and_resumes_the_outer_tail() {
    // OPEN; ATOM "inner"; CLOSE; ATOM "outer"; HALT
    let code = vec![
        Instruction::no_operand(Opcode::Open),
        Instruction::unsigned(Opcode::Atom, 1),
        Instruction::no_operand(Opcode::Close),
        Instruction::unsigned(Opcode::Atom, 2),
        Instruction::no_operand(Opcode::Halt),
    ];
    let image = build(&["", "inner", "outer"], &code);
    let mut vm = ListVm::new(&image);

    let nested = list_of(&["inner"]);
    let subject = ListValue::cons(nested, ListValue::cons(ListValue::atom("outer"), ListValue::nil()));

    let result = vm.match_input(subject).expect("descends, closes, then matches the outer atom");
    assert!(result.is_nil());
}

#[test]
fn top_level_open_close_returns_the_enclosed_list_not_the_outer_tail() {
    // OPEN; ATOM "a"; ATOM "b"; CLOSE; HALT
    let code = vec![
        Instruction::no_operand(Opcode::Open),
        Instruction::unsigned(Opcode::Atom, 1),
        Instruction::unsigned(Opcode::Atom, 2),
        Instruction::no_operand(Opcode::Close),
        Instruction::no_operand(Opcode::Halt),
    ];
    let image = build(&["", "a", "b"], &code);
    let mut vm = ListVm::new(&image);

    let nested = list_of(&["a", "b"]);
    let subject = ListValue::cons(nested, ListValue::nil());

    let result = vm
        .match_input(subject)
        .expect("closes the nested list and halts with nothing left");
    assert_eq!(result, list_of(&["a", "b"]));
}

#[test]
fn close_without_full_consumption_fails() {
    // OPEN; ATOM "a"; CLOSE; HALT  -- nested list has a leftover element
    let code = vec![
        Instruction::no_operand(Opcode::Open),
        Instruction::unsigned(Opcode::Atom, 1),
        Instruction::no_operand(Opcode::Close),
        Instruction::no_operand(Opcode::Halt),
    ];
    let image = build(&["", "a"], &code);
    let mut vm = ListVm::new(&image);

    let nested = list_of(&["a", "leftover"]);
    let subject = ListValue::cons(nested, ListValue::nil());

    assert!(vm.match_input(subject).is_err());
}

#[test]
fn open_requires_a_nested_list_not_a_plain_atom() {
    let code = vec![Instruction::no_operand(Opcode::Open)];
    let image = build(&[], &code);
    let mut vm = ListVm::new(&image);

    let subject = ListValue::cons(ListValue::atom("flat"), ListValue::nil());
    assert!(vm.match_input(subject).is_err());
}

#[test]
fn span_is_a_no_op_in_list_mode() {
    let code = vec![
        Instruction::unsigned(Opcode::Span, 0),
        Instruction::unsigned(Opcode::Atom, 1),
        Instruction::no_operand(Opcode::Halt),
    ];
    let image = build(&["", "x"], &code);
    let mut vm = ListVm::new(&image);

    assert!(vm.match_input(list_of(&["x"])).is_ok());
}
