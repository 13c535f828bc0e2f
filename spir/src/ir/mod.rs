//! The bit-packed intermediate representation.
//!
//! Programs are held by a [`TranslationUnit`] that owns every entity and
//! addresses each one through a structured 32-bit [`EntityId`]. Expressions
//! are single 64-bit words ([`Expr`]), instructions two ([`Insn`]).
//! Functions carry their control flow as basic blocks and graphs
//! ([`BasicBlock`], [`ControlFlowGraph`]), and the [`format`] module can
//! persist a whole unit to a compact binary container.

pub mod context;
pub mod expr;
pub mod format;
pub mod graph;
pub mod id;
pub mod idgen;
pub mod insn;
pub mod sample;
pub mod srcloc;
pub mod types;
pub mod unit;

pub use context::{next_context_id, Context};
pub use expr::{Expr, ExprKind};
pub use graph::{
    reverse_post_order, synthesize_cfg, BasicBlock, ControlFlowGraph, EdgeKind, Graph,
};
pub use id::{
    BasicBlockId, CallSiteId, CfgId, ContextId, EntityId, EntityKind, FunctionId, InsnId, LabelId,
    ScopeId, SrcFileId,
};
pub use idgen::{construct_full_id, IdAllocator};
pub use insn::{Insn, InsnKind};
pub use srcloc::{SourceMap, SrcLoc};
pub use types::{BasicType, Qualifiers, ValueKind, ValueType};
pub use unit::{
    Function, FunctionBody, InsnInfo, LiteralInfo, TranslationUnit, ValueInfo, GLOBAL_INIT_NAME,
};
