//! Bundled example programs, built directly as [`corevm::ast::Node`] trees.
//!
//! The core treats an AST as a given input and has no parser of its own,
//! so `submit <name>` picks one of a small set of programmatically built
//! trees instead of parsing a source file.

use corevm::ast::{BinOp, Node};

/// Looks up a bundled example by name, or `None` if the name is unknown.
pub fn lookup(name: &str) -> Option<Node> {
    match name {
        "add" => Some(add()),
        "counter" => Some(counter()),
        "branch" => Some(branch()),
        "divzero" => Some(divzero()),
        _ => None,
    }
}

/// The names of every bundled example, in a stable listing order.
pub const NAMES: &[&str] = &["add", "counter", "branch", "divzero"];

/// `int x = 5; print(x + 3);`
fn add() -> Node {
    Node::seq(
        Node::decl("x", Some(Node::int(5, 1)), 1),
        Node::print(
            Node::bin_op(BinOp::Add, Node::var("x", 2), Node::int(3, 2), 2),
            2,
        ),
        1,
    )
}

/// `int i = 0; while (i < 3) { print(i); i = i + 1; }`
fn counter() -> Node {
    let body = Node::seq(
        Node::print(Node::var("i", 2), 2),
        Node::assign(
            "i",
            Node::bin_op(BinOp::Add, Node::var("i", 3), Node::int(1, 3), 3),
            3,
        ),
        2,
    );
    Node::seq(
        Node::decl("i", Some(Node::int(0, 1)), 1),
        Node::while_loop(
            Node::bin_op(BinOp::Lt, Node::var("i", 1), Node::int(3, 1), 1),
            body,
            1,
        ),
        1,
    )
}

/// `if (1 == 2) print(10); else print(20);`
fn branch() -> Node {
    Node::if_then_else(
        Node::bin_op(BinOp::Eq, Node::int(1, 1), Node::int(2, 1), 1),
        Node::print(Node::int(10, 1), 1),
        Node::print(Node::int(20, 1), 1),
        1,
    )
}

/// `int a = 10; int b = 0; print(a / b);`
fn divzero() -> Node {
    Node::seq(
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
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_listed_name_resolves() {
        for name in NAMES {
            assert!(lookup(name).is_some(), "{name} should resolve");
        }
    }

    #[test]
    fn unknown_name_resolves_to_none() {
        assert!(lookup("nonexistent").is_none());
    }
}
