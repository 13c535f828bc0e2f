#![deny(missing_docs)]

//! # spir
//!
//! A static program analysis engine over a compact, bit-packed intermediate
//! representation of C-like programs.
//!
//! Client analyses (constant propagation, liveness, dead code, ...) plug in
//! by supplying a lattice of abstract values and a per-instruction transfer
//! function; the engine drives them to fixpoint over a function's
//! control-flow graph.
//!
//! # Architecture
//!
//! Three tightly coupled subsystems:
//!
//! - **IR** ([`crate::ir`]): 32-bit structured entity ids, 64-bit tagged
//!   expressions, 128-bit instructions, basic blocks and control-flow
//!   graphs, all owned by a [`crate::ir::TranslationUnit`]. Includes a
//!   pool-based id allocator, CFG synthesis from flat instruction streams,
//!   and a compact binary container format.
//! - **Lattice framework** ([`crate::analysis::lattice`]): the algebra of
//!   abstract values (meet, join, widen, ordering, top and bot) as a tagged
//!   sum with a boxed extension handle, plus the per-instruction IN/OUT
//!   pair.
//! - **Intra-procedural analyzer** ([`crate::analysis::intra`]): a
//!   reverse-post-order worklist driver propagating facts forward or
//!   backward, with branch-pair splitting at two-successor blocks.
//!
//! # Quick start
//!
//! ```
//! use spir::analysis::clients::ForwardBotBot;
//! use spir::analysis::{FactMap, IntraAnalyzer};
//! use spir::ir::{next_context_id, sample, Context};
//!
//! let tu = sample::unit_branching();
//! let mut ctx = Context::new(&tu);
//! let graph = tu.function_by_name("main").unwrap().body_graph().unwrap();
//!
//! let ctx_id = next_context_id();
//! let mut analyzer = IntraAnalyzer::new(ctx_id, ForwardBotBot::new(), graph, &mut ctx);
//! analyzer.analyze_graph();
//!
//! let facts: &FactMap = ctx
//!     .get_info(ctx_id)
//!     .and_then(|info| info.downcast_ref())
//!     .unwrap();
//! assert!(!facts.is_empty());
//! ```
//!
//! # Error handling
//!
//! Normal analysis flow reports exhaustion and absence through sentinel
//! returns; [`Error`] and [`Result`] cover the edges (loading, writing and
//! linking persisted units). Contract violations by callers or clients
//! panic.

#[macro_use]
mod error;

pub mod analysis;
pub mod ir;

pub use error::{Error, Result};
