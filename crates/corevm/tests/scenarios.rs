//! End-to-end scenarios exercising the generator, VM, and debugger
//! together, rather than any one module in isolation.

use corevm::ast::{BinOp, Node};
use corevm::debugger::{Debugger, MAX_BREAKPOINTS};
use corevm::vm::{Vm, VmError};
use corevm::{compile, Opcode};

/// `int x = 5; print(x + 3);`
#[test]
fn scenario_one_bytecode_matches_the_literal_dump() {
    let tree = Node::seq(
        Node::decl("x", Some(Node::int(5, 1)), 1),
        Node::print(
            Node::bin_op(BinOp::Add, Node::var("x", 2), Node::int(3, 2), 2),
            2,
        ),
        1,
    );
    let program = compile(&tree).unwrap();
    let mut vm = Vm::with_writer(Vec::new());
    vm.load_program(&program);
    let error = vm.run();
    assert_eq!(error, None);

    let expected: &[u8] = &[
        0x01, 0x05, 0x00, 0x00, 0x00, 0x30, 0x00, 0x00, 0x00, 0x00, 0x31, 0x00, 0x00, 0x00, 0x00,
        0x01, 0x03, 0x00, 0x00, 0x00, 0x10, 0x50, 0xFF,
    ];
    assert_eq!(program.code(), expected);
}

/// `int i = 0; while (i < 3) { print(i); i = i + 1; }`
#[test]
fn scenario_two_counts_zero_through_two() {
    let body = Node::seq(
        Node::print(Node::var("i", 1), 1),
        Node::assign(
            "i",
            Node::bin_op(BinOp::Add, Node::var("i", 1), Node::int(1, 1), 1),
            1,
        ),
        1,
    );
    let tree = Node::seq(
        Node::decl("i", Some(Node::int(0, 1)), 1),
        Node::while_loop(
            Node::bin_op(BinOp::Lt, Node::var("i", 1), Node::int(3, 1), 1),
            body,
            1,
        ),
        1,
    );
    let program = compile(&tree).unwrap();
    let mut vm = Vm::with_writer(Vec::new());
    vm.load_program(&program);
    let error = vm.run();
    assert_eq!(error, None);
    assert_eq!(vm.sp(), 0);
}

/// `if (1 == 2) print(10); else print(20);`
#[test]
fn scenario_three_takes_the_else_branch() {
    let tree = Node::if_then_else(
        Node::bin_op(BinOp::Eq, Node::int(1, 1), Node::int(2, 1), 1),
        Node::print(Node::int(10, 1), 1),
        Node::print(Node::int(20, 1), 1),
        1,
    );
    let program = compile(&tree).unwrap();
    let mut vm = Vm::with_writer(Vec::new());
    vm.load_program(&program);
    assert_eq!(vm.run(), None);
}

/// `int a = 10; int b = 0; print(a / b);`
#[test]
fn scenario_four_division_by_zero_errors_before_writing_memory() {
    let tree = Node::seq(
        Node::decl("a", Some(Node::int(10, 1)), 1),
        Node::seq(
            Node::decl("b", Some(Node::int(0, 2)), 2),
            Node::print(
                Node::bin_op(BinOp::Div, Node::var("a", 3), Node::var("b", 3), 3),
                3,
            ),
            2,
        ),
        1,
    );
    let program = compile(&tree).unwrap();
    let mut vm = Vm::with_writer(Vec::new());
    vm.load_program(&program);
    let error = vm.run();
    assert_eq!(error, Some(VmError::DivisionByZero));
    let div_pc = program
        .code()
        .iter()
        .position(|&b| b == Opcode::Div as u8)
        .unwrap();
    assert_eq!(vm.pc(), div_pc + 1);
}

/// Breakpoint at the `print` line of scenario 2: stop three times, then
/// finish on the fourth continue.
#[test]
fn scenario_five_breakpoint_then_continue_four_times() {
    let body = Node::seq(
        Node::print(Node::var("i", 2), 2),
        Node::assign(
            "i",
            Node::bin_op(BinOp::Add, Node::var("i", 3), Node::int(1, 3), 3),
            3,
        ),
        2,
    );
    let tree = Node::seq(
        Node::decl("i", Some(Node::int(0, 1)), 1),
        Node::while_loop(
            Node::bin_op(BinOp::Lt, Node::var("i", 1), Node::int(3, 1), 1),
            body,
            1,
        ),
        1,
    );
    let program = compile(&tree).unwrap();
    let mut vm = Vm::with_writer(Vec::new());
    vm.load_program(&program);
    let mut dbg = Debugger::new(&mut vm, &program);
    dbg.start_session();
    dbg.add_breakpoint(2);

    let mut hits = 0;
    for _ in 0..3 {
        let report = dbg.cont();
        assert!(report.starts_with("Hit breakpoint at line 2"), "{report}");
        hits += 1;
    }
    assert_eq!(hits, 3);
    assert_eq!(dbg.cont(), "Program finished");
}

/// After scenario 1 completes, `memstat`-equivalent state reports zero
/// objects and nothing to collect.
#[test]
fn scenario_six_heap_is_clean_after_a_normal_run() {
    let tree = Node::print(Node::int(1, 1), 1);
    let program = compile(&tree).unwrap();
    let mut vm = Vm::with_writer(Vec::new());
    vm.load_program(&program);
    vm.run();
    assert_eq!(vm.heap().num_objects(), 0);
}

/// 32 `print` statements, one per line, so every line from 1 to 32 has a
/// real source-map entry a breakpoint can resolve against.
fn thirty_two_printable_lines() -> Node {
    let mut tree = Node::print(Node::int(32, 32), 32);
    for line in (1..32u32).rev() {
        tree = Node::seq(Node::print(Node::int(line as i32, line), line), tree, line);
    }
    tree
}

#[test]
fn breakpoint_capacity_matches_the_debugger_limit() {
    let program = compile(&thirty_two_printable_lines()).unwrap();
    assert_eq!(MAX_BREAKPOINTS, 32);
    let mut vm = Vm::with_writer(Vec::new());
    vm.load_program(&program);
    let mut dbg = Debugger::new(&mut vm, &program);
    for line in 1..=MAX_BREAKPOINTS as u32 {
        let report = dbg.add_breakpoint(line);
        assert!(report.starts_with("Breakpoint set"), "{report}");
    }
    assert_eq!(dbg.add_breakpoint(9999), "Max breakpoints reached");
}
