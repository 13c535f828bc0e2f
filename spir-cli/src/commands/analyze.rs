use std::path::Path;

use anyhow::Context as _;
use log::info;

use spir::analysis::clients::ForwardBotBot;
use spir::analysis::{lattice, FactMap, IntraAnalyzer};
use spir::ir::{format, next_context_id, reverse_post_order, Context};

pub fn run(path: &Path) -> anyhow::Result<()> {
    let tu = format::read_unit_from_path(path)
        .with_context(|| format!("loading {}", path.display()))?;
    info!("loaded unit {}", tu.name());

    println!("unit {}", tu.name());
    let mut ctx = Context::new(&tu);
    let mut analyzed = 0usize;
    for func in tu.functions() {
        let Some(graph) = func.body_graph() else {
            continue;
        };
        let ctx_id = next_context_id();
        let mut analyzer = IntraAnalyzer::new(ctx_id, ForwardBotBot::new(), graph, &mut ctx);
        analyzer.analyze_graph();
        analyzed += 1;

        let facts: &FactMap = ctx
            .get_info(ctx_id)
            .and_then(|info| info.downcast_ref())
            .expect("the analyzer stored its fact map");
        let blocks = reverse_post_order(graph, true).len();
        let saturated = facts
            .values()
            .filter(|pair| lattice::is_bot(pair.l1.as_ref()))
            .count();
        println!(
            "  {:<24} blocks {:>4}  facts {:>5}  saturated {:>5}",
            func.name(),
            blocks,
            facts.len(),
            saturated
        );
    }
    if analyzed == 0 {
        println!("  (no function definitions)");
    }
    Ok(())
}
