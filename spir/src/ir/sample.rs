//! Sample translation units.
//!
//! Small real-world programs used by the integration tests and the CLI.
//! They double as worked examples of the IR building API.

use crate::ir::graph::{synthesize_cfg, BasicBlock};
use crate::ir::id::{EntityKind, ScopeId};
use crate::ir::insn::Insn;
use crate::ir::expr::{Expr, ExprKind};
use crate::ir::types::ValueType;
use crate::ir::unit::{FunctionBody, TranslationUnit};

/// Builds the unit for
///
/// ```c
/// int main() {
///   int x = y + 10;
///   return x;
/// }
/// ```
///
/// There are no global initializations. The function body is a single
/// basic block with two instructions.
#[must_use]
pub fn unit_straight_line() -> TranslationUnit {
    let mut tu = TranslationUnit::new("straight_line.c");

    let main = tu.new_function("main", ValueType::int32(), Vec::new());
    let x = tu.new_var("x", EntityKind::Var, ValueType::int32(), main.entity());
    let y = tu.new_var("y", EntityKind::Var, ValueType::int32(), main.entity());
    let c10 = tu.new_const(10, ValueType::int32());

    let mut bb = BasicBlock::with_capacity(tu.new_basic_block_id(), ScopeId::NULL, main.entity(), 2);
    tu.add_insn(
        &mut bb,
        Insn::assign_rhs_op(x, Expr::binary(ExprKind::Add, y, c10)),
        None,
    );
    tu.add_insn(&mut bb, Insn::ret(x), None);
    // A single basic block is itself a graph.
    tu.set_body(main, FunctionBody::Block(bb));

    tu
}

/// Builds the unit for
///
/// ```c
/// int main(int argc) {
///   if (0 < argc)
///     return 0;
///   else
///     return 1;
/// }
/// ```
///
/// The body is written as a flat labeled stream and run through CFG
/// synthesis, yielding three blocks: the compare-and-branch head and one
/// block per return.
#[must_use]
pub fn unit_branching() -> TranslationUnit {
    let mut tu = TranslationUnit::new("branching.c");

    let main = tu.new_function("main", ValueType::int32(), Vec::new());
    let argc = tu.new_var("argc", EntityKind::Var, ValueType::int32(), main.entity());
    let t1 = tu.new_var("t1", EntityKind::TmpVar, ValueType::int32(), main.entity());
    let c0 = tu.new_const(0, ValueType::int32());
    let c1 = tu.new_const(1, ValueType::int32());
    let l1 = tu.new_label_id();
    let l2 = tu.new_label_id();

    let body = vec![
        Insn::assign_rhs_op(t1, Expr::binary(ExprKind::Lt, c0, argc)),
        Insn::cond(t1, l1, l2),
        Insn::label(l1),
        Insn::ret(c0),
        Insn::label(l2),
        Insn::ret(c1),
    ];
    let cfg = synthesize_cfg(&mut tu, ScopeId::NULL, main.entity(), body);
    tu.set_body(main, FunctionBody::Cfg(cfg));

    tu
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::graph::Graph;

    #[test]
    fn test_straight_line_shape() {
        let tu = unit_straight_line();
        let main = tu.function_by_name("main").expect("main exists");
        let graph = main.body_graph().expect("main has a body");
        let entry = graph.block(graph.entry_block_id()).unwrap();
        assert_eq!(entry.insn_count(), 2);
        assert!(entry.exit_insn().is_return());
        assert_eq!(graph.entry_block_id(), graph.exit_block_id());
    }

    #[test]
    fn test_branching_shape() {
        let tu = unit_branching();
        let main = tu.function_by_name("main").expect("main exists");
        let graph = main.body_graph().expect("main has a body");

        let entry = graph.block(graph.entry_block_id()).unwrap();
        assert_eq!(entry.succ_count(), 2, "branch head has two successors");
        assert!(entry.exit_insn().is_cond());

        let true_bb = graph.block(entry.true_succ().unwrap()).unwrap();
        let false_bb = graph.block(entry.false_succ().unwrap()).unwrap();
        assert!(true_bb.exit_insn().is_return());
        assert!(false_bb.exit_insn().is_return());
        assert_eq!(true_bb.succ_count(), 0);
        assert_eq!(false_bb.succ_count(), 0);
    }
}
