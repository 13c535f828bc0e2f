//! End-to-end scenarios for the intra-procedural analyzer.

use spir::analysis::clients::{BackwardBotBot, ConstPropagation, ConstVal, ForwardBotBot};
use spir::analysis::{lattice, Fact, FactMap, IntraAnalyzer};
use spir::ir::{
    next_context_id, sample, synthesize_cfg, Context, ContextId, EntityKind, Expr, ExprKind,
    FunctionBody, Graph, Insn, ScopeId, TranslationUnit, ValueType,
};

fn fact_map<'a>(ctx: &'a Context<'_>, ctx_id: ContextId) -> &'a FactMap {
    ctx.get_info(ctx_id)
        .and_then(|info| info.downcast_ref::<FactMap>())
        .expect("analysis stored its fact map")
}

/// Asserts that every instruction of every reachable block has the given
/// fact in the chosen slot.
fn assert_all_insns(graph: &dyn Graph, facts: &FactMap, want_bot_in: bool, want_bot_out: bool) {
    for bb_id in spir::ir::reverse_post_order(graph, true) {
        let block = graph.block(bb_id).unwrap();
        for i in 0..block.insn_count() {
            let id = block.insn(i).id();
            let pair = facts.get(&id).expect("every instruction has facts");
            if want_bot_in {
                assert!(
                    lattice::is_bot(pair.l1.as_ref()),
                    "IN of {id} should be Bot, got {}",
                    lattice::stringify(pair.l1.as_ref())
                );
            }
            if want_bot_out {
                assert!(
                    lattice::is_bot(pair.l2.as_ref()),
                    "OUT of {id} should be Bot, got {}",
                    lattice::stringify(pair.l2.as_ref())
                );
            }
        }
    }
}

#[test]
fn forward_botbot_floods_straight_line() {
    let tu = sample::unit_straight_line();
    let mut ctx = Context::new(&tu);
    let graph = tu.function_by_name("main").unwrap().body_graph().unwrap();

    let ctx_id = next_context_id();
    let mut analyzer = IntraAnalyzer::new(ctx_id, ForwardBotBot::new(), graph, &mut ctx);
    analyzer.analyze_graph();

    assert_all_insns(graph, fact_map(&ctx, ctx_id), true, true);
}

#[test]
fn backward_botbot_floods_straight_line() {
    let tu = sample::unit_straight_line();
    let mut ctx = Context::new(&tu);
    let graph = tu.function_by_name("main").unwrap().body_graph().unwrap();

    let ctx_id = next_context_id();
    let mut analyzer = IntraAnalyzer::new(ctx_id, BackwardBotBot::new(), graph, &mut ctx);
    analyzer.analyze_graph();

    assert_all_insns(graph, fact_map(&ctx, ctx_id), true, true);
}

#[test]
fn forward_botbot_floods_branches() {
    let tu = sample::unit_branching();
    let mut ctx = Context::new(&tu);
    let graph = tu.function_by_name("main").unwrap().body_graph().unwrap();

    let ctx_id = next_context_id();
    let mut analyzer = IntraAnalyzer::new(ctx_id, ForwardBotBot::new(), graph, &mut ctx);
    analyzer.analyze_graph();

    let facts = fact_map(&ctx, ctx_id);
    assert_all_insns(graph, facts, true, false);

    // Both return instructions converged to Bot on both sides.
    for bb_id in spir::ir::reverse_post_order(graph, true) {
        let block = graph.block(bb_id).unwrap();
        if block.exit_insn().is_return() {
            let pair = facts.get(&block.exit_insn_id()).unwrap();
            assert!(lattice::is_bot(pair.l2.as_ref()));
        }
    }
}

#[test]
fn reanalysis_is_idempotent() {
    let tu = sample::unit_branching();
    let mut ctx = Context::new(&tu);
    let graph = tu.function_by_name("main").unwrap().body_graph().unwrap();
    let ctx_id = next_context_id();

    let mut analyzer = IntraAnalyzer::new(ctx_id, ForwardBotBot::new(), graph, &mut ctx);
    analyzer.analyze_graph();
    let before: Vec<_> = {
        let facts = fact_map(&ctx, ctx_id);
        let mut entries: Vec<_> = facts.iter().map(|(k, v)| (*k, v.clone())).collect();
        entries.sort_by_key(|(k, _)| k.raw());
        entries
    };

    // A second run over the stable fact map must not change anything.
    let mut analyzer = IntraAnalyzer::new(ctx_id, ForwardBotBot::new(), graph, &mut ctx);
    analyzer.analyze_graph();
    let facts = fact_map(&ctx, ctx_id);
    assert_eq!(facts.len(), before.len());
    for (id, pair) in &before {
        let after = facts.get(id).expect("instruction still present");
        assert!(
            pair.equals(after),
            "facts for {id} changed across reanalysis: {pair} vs {after}"
        );
    }
}

#[test]
fn analysis_terminates_on_loops() {
    // An infinite source loop is a finite fixpoint problem:
    // L: x = 0; goto L.
    let mut tu = TranslationUnit::new("loop.c");
    let main = tu.new_function("main", ValueType::int32(), Vec::new());
    let x = tu.new_var("x", EntityKind::Var, ValueType::int32(), main.entity());
    let c0 = tu.new_const(0, ValueType::int32());
    let head = tu.new_label_id();
    let body = vec![
        Insn::label(head),
        Insn::assign_simple(x, c0),
        Insn::goto(head),
    ];
    let cfg = synthesize_cfg(&mut tu, ScopeId::NULL, main.entity(), body);
    tu.set_body(main, FunctionBody::Cfg(cfg));

    let mut ctx = Context::new(&tu);
    let graph = tu.function_by_name("main").unwrap().body_graph().unwrap();
    let ctx_id = next_context_id();
    IntraAnalyzer::new(ctx_id, ForwardBotBot::new(), graph, &mut ctx).analyze_graph();

    assert_all_insns(graph, fact_map(&ctx, ctx_id), true, true);
}

#[test]
fn contexts_isolate_runs() {
    let tu = sample::unit_straight_line();
    let mut ctx = Context::new(&tu);
    let graph = tu.function_by_name("main").unwrap().body_graph().unwrap();

    let first = next_context_id();
    IntraAnalyzer::new(first, ForwardBotBot::new(), graph, &mut ctx).analyze_graph();
    let second = next_context_id();
    IntraAnalyzer::new(second, BackwardBotBot::new(), graph, &mut ctx).analyze_graph();

    assert!(ctx.get_info(first).is_some());
    assert!(ctx.get_info(second).is_some());
    assert_ne!(first, second);
}

/// Builds `main() { a = 2; b = 3; c = a + b; return c; }`.
fn const_unit() -> TranslationUnit {
    let mut tu = TranslationUnit::new("consts.c");
    let main = tu.new_function("main", ValueType::int32(), Vec::new());
    let a = tu.new_var("a", EntityKind::Var, ValueType::int32(), main.entity());
    let b = tu.new_var("b", EntityKind::Var, ValueType::int32(), main.entity());
    let c = tu.new_var("c", EntityKind::Var, ValueType::int32(), main.entity());
    let c2 = tu.new_const(2, ValueType::int32());
    let c3 = tu.new_const(3, ValueType::int32());

    let body = vec![
        Insn::assign_simple(a, c2),
        Insn::assign_simple(b, c3),
        Insn::assign_rhs_op(c, Expr::binary(ExprKind::Add, a, b)),
        Insn::ret(c),
    ];
    let cfg = synthesize_cfg(&mut tu, ScopeId::NULL, main.entity(), body);
    tu.set_body(main, FunctionBody::Cfg(cfg));
    tu
}

fn const_of(facts: &FactMap, graph: &dyn Graph, var: u32) -> ConstVal {
    let exit = graph.block(graph.exit_block_id()).unwrap();
    let pair = facts.get(&exit.exit_insn_id()).unwrap();
    let Some(Fact::Map(map)) = pair.l1.as_ref() else {
        panic!("IN fact of the exit instruction is not a map");
    };
    match map.get(u64::from(var)) {
        Some(Fact::Ext(ext)) => ext
            .as_any()
            .downcast_ref::<ConstVal>()
            .copied()
            .unwrap_or(ConstVal::Conflict),
        Some(_) => ConstVal::Conflict,
        None => ConstVal::Unknown,
    }
}

#[test]
fn const_propagation_folds_straight_line() {
    let tu = const_unit();
    let mut ctx = Context::new(&tu);
    let graph = tu.function_by_name("main").unwrap().body_graph().unwrap();

    let ctx_id = next_context_id();
    IntraAnalyzer::new(ctx_id, ConstPropagation::new(), graph, &mut ctx).analyze_graph();

    let facts = fact_map(&ctx, ctx_id);
    assert_eq!(const_of(facts, graph, tu.lookup("a").raw()), ConstVal::Known(2));
    assert_eq!(const_of(facts, graph, tu.lookup("b").raw()), ConstVal::Known(3));
    assert_eq!(const_of(facts, graph, tu.lookup("c").raw()), ConstVal::Known(5));
}

/// Builds a diamond whose two arms assign different constants to `x`:
///
/// ```c
/// main(argc) {
///   t1 = 0 < argc;
///   if (t1) { x = 1; } else { x = 2; }
///   y = x;
///   return y;
/// }
/// ```
fn diamond_unit() -> TranslationUnit {
    let mut tu = TranslationUnit::new("diamond.c");
    let main = tu.new_function("main", ValueType::int32(), Vec::new());
    let argc = tu.new_var("argc", EntityKind::Var, ValueType::int32(), main.entity());
    let t1 = tu.new_var("t1", EntityKind::TmpVar, ValueType::int32(), main.entity());
    let x = tu.new_var("x", EntityKind::Var, ValueType::int32(), main.entity());
    let y = tu.new_var("y", EntityKind::Var, ValueType::int32(), main.entity());
    let c0 = tu.new_const(0, ValueType::int32());
    let c1 = tu.new_const(1, ValueType::int32());
    let c2 = tu.new_const(2, ValueType::int32());
    let l1 = tu.new_label_id();
    let l2 = tu.new_label_id();
    let l3 = tu.new_label_id();

    let body = vec![
        Insn::assign_rhs_op(t1, Expr::binary(ExprKind::Lt, c0, argc)),
        Insn::cond(t1, l1, l2),
        Insn::label(l1),
        Insn::assign_simple(x, c1),
        Insn::goto(l3),
        Insn::label(l2),
        Insn::assign_simple(x, c2),
        Insn::label(l3),
        Insn::assign_simple(y, x),
        Insn::ret(y),
    ];
    let cfg = synthesize_cfg(&mut tu, ScopeId::NULL, main.entity(), body);
    tu.set_body(main, FunctionBody::Cfg(cfg));
    tu
}

#[test]
fn const_propagation_meets_at_joins() {
    let tu = diamond_unit();
    let mut ctx = Context::new(&tu);
    let graph = tu.function_by_name("main").unwrap().body_graph().unwrap();

    let ctx_id = next_context_id();
    IntraAnalyzer::new(ctx_id, ConstPropagation::new(), graph, &mut ctx).analyze_graph();

    let facts = fact_map(&ctx, ctx_id);
    // The arms disagree on x, so the join sees a conflict, which then
    // flows into y.
    assert_eq!(
        const_of(facts, graph, tu.lookup("x").raw()),
        ConstVal::Conflict
    );
    assert_eq!(
        const_of(facts, graph, tu.lookup("y").raw()),
        ConstVal::Conflict
    );
    // argc was never assigned and stays unknown.
    assert_eq!(
        const_of(facts, graph, tu.lookup("argc").raw()),
        ConstVal::Unknown
    );
}
