//! CFG synthesis from flat instruction streams.

use spir::ir::{
    next_context_id, synthesize_cfg, Context, EntityKind, Expr, ExprKind, FunctionBody, Graph,
    Insn, ScopeId, TranslationUnit, ValueType,
};

/// `[t1 = 0 < argc; IF t1 L1 L2; L1; RETURN 0; L2; RETURN 1]`
#[test]
fn branch_stream_yields_three_blocks() {
    let mut tu = TranslationUnit::new("branch.c");
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

    assert_eq!(cfg.block_count(), 3);

    let entry = cfg.block(cfg.entry_block_id()).unwrap();
    assert_eq!(entry.insn_count(), 2);
    assert!(entry.exit_insn().is_cond());
    assert_eq!(entry.succ_count(), 2);

    // Edge polarity: the first successor is the true target (L1), the
    // second the false target (L2).
    let true_bb = cfg.block(entry.true_succ().unwrap()).unwrap();
    let false_bb = cfg.block(entry.false_succ().unwrap()).unwrap();
    assert_eq!(true_bb.entry_insn().labels().0, l1);
    assert_eq!(false_bb.entry_insn().labels().0, l2);

    // No edges leave the return blocks.
    assert_eq!(true_bb.succ_count(), 0);
    assert_eq!(false_bb.succ_count(), 0);
    assert_eq!(true_bb.pred_count(), 1);
    assert_eq!(false_bb.pred_count(), 1);

    // The exit block is the last block ending in a return.
    assert_eq!(cfg.exit_block_id(), false_bb.id());
}

#[test]
fn unused_labels_do_not_split() {
    let mut tu = TranslationUnit::new("linear.c");
    let main = tu.new_function("main", ValueType::int32(), Vec::new());
    let x = tu.new_var("x", EntityKind::Var, ValueType::int32(), main.entity());
    let c0 = tu.new_const(0, ValueType::int32());
    let dead_label = tu.new_label_id();

    let body = vec![
        Insn::assign_simple(x, c0),
        Insn::label(dead_label), // never targeted by a jump
        Insn::ret(x),
    ];
    let cfg = synthesize_cfg(&mut tu, ScopeId::NULL, main.entity(), body);
    assert_eq!(cfg.block_count(), 1, "an unused label is not a boundary");
}

#[test]
fn calls_terminate_blocks() {
    let mut tu = TranslationUnit::new("calls.c");
    let main = tu.new_function("main", ValueType::int32(), Vec::new());
    let callee = tu.new_function_decl("helper", ValueType::int32(), Vec::new());
    let x = tu.new_var("x", EntityKind::Var, ValueType::int32(), main.entity());
    let c0 = tu.new_const(0, ValueType::int32());

    let body = vec![
        Insn::assign_call(x, Expr::call0(callee.entity())),
        Insn::assign_simple(x, c0),
        Insn::call(Expr::call0(callee.entity())),
        Insn::ret(x),
    ];
    let cfg = synthesize_cfg(&mut tu, ScopeId::NULL, main.entity(), body);

    // Split after the call assignment and after the bare call.
    assert_eq!(cfg.block_count(), 3);
    let entry = cfg.block(cfg.entry_block_id()).unwrap();
    assert_eq!(entry.insn_count(), 1);
    assert!(entry.exit_insn().has_call_expr());
    assert!(entry.has_only_one_succ(), "call blocks fall through");
}

#[test]
fn goto_connects_to_its_target() {
    let mut tu = TranslationUnit::new("loop.c");
    let main = tu.new_function("main", ValueType::int32(), Vec::new());
    let x = tu.new_var("x", EntityKind::Var, ValueType::int32(), main.entity());
    let c0 = tu.new_const(0, ValueType::int32());
    let head = tu.new_label_id();

    // An infinite loop: L: x = 0; goto L.
    let body = vec![
        Insn::label(head),
        Insn::assign_simple(x, c0),
        Insn::goto(head),
    ];
    let cfg = synthesize_cfg(&mut tu, ScopeId::NULL, main.entity(), body);

    assert_eq!(cfg.block_count(), 1);
    let block = cfg.block(cfg.entry_block_id()).unwrap();
    assert_eq!(block.succ_count(), 1);
    assert_eq!(block.succ(0), block.id(), "the goto loops back to its own block");
    assert_eq!(block.pred_count(), 1);
    // With no returning block, the last block is the exit.
    assert_eq!(cfg.exit_block_id(), block.id());
}

#[test]
fn instruction_info_tracks_final_blocks() {
    let mut tu = TranslationUnit::new("info.c");
    let main = tu.new_function("main", ValueType::int32(), Vec::new());
    let x = tu.new_var("x", EntityKind::Var, ValueType::int32(), main.entity());
    let c0 = tu.new_const(0, ValueType::int32());
    let target = tu.new_label_id();

    let body = vec![
        Insn::goto(target),
        Insn::label(target),
        Insn::assign_simple(x, c0),
        Insn::ret(x),
    ];
    let cfg = synthesize_cfg(&mut tu, ScopeId::NULL, main.entity(), body);
    assert_eq!(cfg.block_count(), 2);

    // Every instruction's metadata points at the block that finally owns
    // it, not at any intermediate staging block.
    for bb_id in spir::ir::reverse_post_order(&cfg, true) {
        let block = cfg.block(bb_id).unwrap();
        for i in 0..block.insn_count() {
            let info = tu.insn_info(block.insn(i).id()).expect("info recorded");
            assert_eq!(info.block(), block.id());
        }
    }
}

#[test]
fn synthesized_graph_supports_analysis_contexts() {
    let mut tu = TranslationUnit::new("ctx.c");
    let main = tu.new_function("main", ValueType::int32(), Vec::new());
    let x = tu.new_var("x", EntityKind::Var, ValueType::int32(), main.entity());
    let c0 = tu.new_const(0, ValueType::int32());
    let body = vec![Insn::assign_simple(x, c0), Insn::ret(x)];
    let cfg = synthesize_cfg(&mut tu, ScopeId::NULL, main.entity(), body);
    tu.set_body(main, FunctionBody::Cfg(cfg));

    let ctx = Context::new(&tu);
    assert_eq!(ctx.unit().name(), "ctx.c");
    assert!(next_context_id().0 > 0);
}
