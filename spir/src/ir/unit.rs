//! The translation unit, owner of every IR entity.
//!
//! A [`TranslationUnit`] issues ids through its allocator and keeps the
//! record behind each one: variables and functions in the value tables,
//! literals in the constants table, labels in the label-name table,
//! instructions in the instruction-info table. Creation primitives hide the
//! allocation details; see [`TranslationUnit::new_var`],
//! [`TranslationUnit::new_const`] and friends.

use rustc_hash::FxHashMap;

use crate::ir::graph::{BasicBlock, ControlFlowGraph, Graph};
use crate::ir::id::{
    BasicBlockId, CallSiteId, CfgId, EntityId, EntityKind, FunctionId, InsnId, LabelId, ScopeId,
    CALL_SITE_MASK, IMMEDIATE_MASK, KIND_SHIFT, SUB_KIND_SHIFT,
};
use crate::ir::insn::Insn;
use crate::ir::srcloc::{SourceMap, SrcLoc};
use crate::ir::types::ValueType;
use crate::ir::IdAllocator;

/// The name of the synthetic function holding global initialization.
pub const GLOBAL_INIT_NAME: &str = "<global-inits>";

/// The record behind a literal id.
#[derive(Debug, Clone)]
pub struct LiteralInfo {
    value_type: ValueType,
    value: u64,
}

impl LiteralInfo {
    /// The literal's type.
    #[must_use]
    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    /// The literal's value bits.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.value
    }
}

/// The record behind a variable or function id.
#[derive(Debug, Clone)]
pub struct ValueInfo {
    name: String,
    func: EntityId,
    kind: EntityKind,
    value_type: ValueType,
}

impl ValueInfo {
    /// The entity's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The owning function, or null for globals.
    #[must_use]
    pub fn func_id(&self) -> EntityId {
        self.func
    }

    /// The entity kind.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// The entity's type.
    #[must_use]
    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }
}

/// Per-instruction metadata: the owning block and an optional source
/// location.
#[derive(Debug, Clone)]
pub struct InsnInfo {
    block: BasicBlockId,
    src_loc: Option<SrcLoc>,
}

impl InsnInfo {
    /// The block the instruction belongs to.
    #[must_use]
    pub fn block(&self) -> BasicBlockId {
        self.block
    }

    /// Where the instruction came from, if known.
    #[must_use]
    pub fn src_loc(&self) -> Option<SrcLoc> {
        self.src_loc
    }
}

/// The body of a function: a single block, or a full graph.
#[derive(Debug)]
pub enum FunctionBody {
    /// A function that fits in one basic block.
    Block(BasicBlock),
    /// A function with control flow.
    Cfg(ControlFlowGraph),
}

impl FunctionBody {
    /// The body viewed as a graph.
    #[must_use]
    pub fn as_graph(&self) -> &dyn Graph {
        match self {
            FunctionBody::Block(block) => block,
            FunctionBody::Cfg(cfg) => cfg,
        }
    }
}

/// A function in the IR.
#[derive(Debug)]
pub struct Function {
    id: FunctionId,
    name: String,
    return_type: ValueType,
    params: Vec<EntityId>,
    body: Option<FunctionBody>,
}

impl Function {
    /// The function's id.
    #[must_use]
    pub fn id(&self) -> FunctionId {
        self.id
    }

    /// The function's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The return type.
    #[must_use]
    pub fn return_type(&self) -> &ValueType {
        &self.return_type
    }

    /// Parameter entity ids in declaration order.
    #[must_use]
    pub fn params(&self) -> &[EntityId] {
        &self.params
    }

    /// The body, absent for declarations.
    #[must_use]
    pub fn body(&self) -> Option<&FunctionBody> {
        self.body.as_ref()
    }

    /// The body viewed as a graph, absent for declarations.
    #[must_use]
    pub fn body_graph(&self) -> Option<&dyn Graph> {
        self.body.as_ref().map(FunctionBody::as_graph)
    }
}

/// An in-memory container for one program's IR.
///
/// # Examples
///
/// ```
/// use spir::ir::{EntityKind, TranslationUnit, ValueType};
///
/// let mut tu = TranslationUnit::new("demo.c");
/// let main = tu.new_function("main", ValueType::int32(), Vec::new());
/// let x = tu.new_var("x", EntityKind::Var, ValueType::int32(), main.entity());
/// assert_eq!(tu.lookup("x"), x);
/// assert!(x.is_variable());
/// ```
#[derive(Debug)]
pub struct TranslationUnit {
    name: String,
    global_init: FunctionId,
    functions: FxHashMap<FunctionId, Function>,
    function_order: Vec<FunctionId>,
    call_args: FxHashMap<CallSiteId, Vec<EntityId>>,
    constants: FxHashMap<EntityId, LiteralInfo>,
    label_names: FxHashMap<LabelId, String>,
    names: FxHashMap<String, EntityId>,
    values: FxHashMap<EntityId, ValueInfo>,
    insn_info: FxHashMap<InsnId, InsnInfo>,
    id_gen: IdAllocator,
    source_map: SourceMap,
    next_call_site: u32,
}

impl TranslationUnit {
    /// Creates a unit named after its source file.
    ///
    /// The unit starts with the synthetic global-initialization function,
    /// so a fresh unit already owns one function id.
    #[must_use]
    pub fn new(name: &str) -> Self {
        let mut tu = TranslationUnit {
            name: name.to_string(),
            global_init: FunctionId::NULL,
            functions: FxHashMap::default(),
            function_order: Vec::new(),
            call_args: FxHashMap::default(),
            constants: FxHashMap::default(),
            label_names: FxHashMap::default(),
            names: FxHashMap::default(),
            values: FxHashMap::default(),
            insn_info: FxHashMap::default(),
            id_gen: IdAllocator::new(),
            source_map: SourceMap::new(),
            next_call_site: 0,
        };
        tu.global_init = tu.new_function(GLOBAL_INIT_NAME, ValueType::void(), Vec::new());
        tu
    }

    /// The unit's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The synthetic global-initialization function.
    #[must_use]
    pub fn global_init(&self) -> FunctionId {
        self.global_init
    }

    fn allocate(&mut self, kind: EntityKind, sub_kind: u8) -> EntityId {
        EntityId(
            self.id_gen
                .allocate(kind.pool_prefix(sub_kind), kind.seq_bit_length()),
        )
    }

    /// Creates a variable entity and registers its name.
    ///
    /// `func` is the owning function, or [`EntityId::NULL`] for a global.
    ///
    /// # Panics
    ///
    /// Panics when `kind` is not a variable kind; that is a caller bug.
    pub fn new_var(
        &mut self,
        name: &str,
        kind: EntityKind,
        value_type: ValueType,
        func: EntityId,
    ) -> EntityId {
        assert!(
            kind.is_variable(),
            "new_var called with non-variable kind {kind}"
        );
        let id = self.allocate(kind, value_type.value_kind() as u8);
        self.values.insert(
            id,
            ValueInfo {
                name: name.to_string(),
                func,
                kind,
                value_type,
            },
        );
        self.names.insert(name.to_string(), id);
        id
    }

    /// Creates a numeric literal.
    ///
    /// Integer values that fit in 20 bits are packed directly into the id
    /// as an immediate; everything else is allocated and stored in the
    /// constants table. Either way the literal is recorded, so
    /// [`literal`](Self::literal) resolves both forms.
    pub fn new_const(&mut self, value: u64, value_type: ValueType) -> EntityId {
        let kind = value_type.value_kind();
        let id = if kind.is_integer() && value & !u64::from(IMMEDIATE_MASK) == 0 {
            EntityId(
                (EntityKind::ImmNumLit as u32) << KIND_SHIFT
                    | u32::from(kind as u8) << SUB_KIND_SHIFT
                    | (value as u32 & IMMEDIATE_MASK),
            )
        } else {
            self.allocate(EntityKind::NumLit, kind as u8)
        };
        self.constants.insert(id, LiteralInfo { value_type, value });
        id
    }

    /// Creates a function with a definition pending; attach the body with
    /// [`set_body`](Self::set_body).
    pub fn new_function(
        &mut self,
        name: &str,
        return_type: ValueType,
        params: Vec<EntityId>,
    ) -> FunctionId {
        self.new_function_of_kind(EntityKind::Func, name, return_type, params)
    }

    /// Creates a function declaration without a definition.
    pub fn new_function_decl(
        &mut self,
        name: &str,
        return_type: ValueType,
        params: Vec<EntityId>,
    ) -> FunctionId {
        self.new_function_of_kind(EntityKind::FuncDecl, name, return_type, params)
    }

    fn new_function_of_kind(
        &mut self,
        kind: EntityKind,
        name: &str,
        return_type: ValueType,
        params: Vec<EntityId>,
    ) -> FunctionId {
        debug_assert!(kind.is_function());
        let id = FunctionId(self.allocate(kind, return_type.value_kind() as u8));
        self.values.insert(
            id.entity(),
            ValueInfo {
                name: name.to_string(),
                func: EntityId::NULL,
                kind,
                value_type: return_type.clone(),
            },
        );
        self.functions.insert(
            id,
            Function {
                id,
                name: name.to_string(),
                return_type,
                params,
                body: None,
            },
        );
        self.function_order.push(id);
        self.names.insert(name.to_string(), id.entity());
        id
    }

    /// Attaches a body to a function.
    ///
    /// # Panics
    ///
    /// Panics when `id` is not a function of this unit.
    pub fn set_body(&mut self, id: FunctionId, body: FunctionBody) {
        self.functions
            .get_mut(&id)
            .unwrap_or_else(|| panic!("set_body: unknown function {id}"))
            .body = Some(body);
    }

    /// Replaces a function's parameter list.
    ///
    /// Parameter variables are often created after the function they
    /// belong to (they name it as their owner), so the list is attached in
    /// a second step.
    ///
    /// # Panics
    ///
    /// Panics when `id` is not a function of this unit.
    pub fn set_params(&mut self, id: FunctionId, params: Vec<EntityId>) {
        self.functions
            .get_mut(&id)
            .unwrap_or_else(|| panic!("set_params: unknown function {id}"))
            .params = params;
    }

    /// Allocates a basic-block id.
    pub fn new_basic_block_id(&mut self) -> BasicBlockId {
        BasicBlockId(self.allocate(EntityKind::BasicBlock, 0))
    }

    /// Allocates a CFG id.
    pub fn new_cfg_id(&mut self) -> CfgId {
        CfgId(self.allocate(EntityKind::Cfg, 0))
    }

    /// Allocates a scope id.
    pub fn new_scope_id(&mut self) -> ScopeId {
        ScopeId(self.allocate(EntityKind::Scope, 0))
    }

    /// Allocates a label with a generated name.
    pub fn new_label_id(&mut self) -> LabelId {
        let id = LabelId(self.allocate(EntityKind::Label, 0));
        self.label_names
            .insert(id, format!(".L{}", id.entity().seq_id()));
        id
    }

    /// Allocates a label carrying a source-level name.
    pub fn new_named_label(&mut self, name: &str) -> LabelId {
        let id = LabelId(self.allocate(EntityKind::Label, 0));
        self.label_names.insert(id, name.to_string());
        id
    }

    /// Registers `args` under a fresh call-site id.
    pub fn new_call_site(&mut self, args: Vec<EntityId>) -> CallSiteId {
        self.next_call_site += 1;
        let id = CallSiteId(self.next_call_site & CALL_SITE_MASK);
        self.call_args.insert(id, args);
        id
    }

    /// Stamps an id onto a free-standing instruction and records its
    /// metadata.
    ///
    /// The owning-block record stays null until the instruction is appended
    /// to a block. Useful when building flat streams whose blocks are
    /// decided later by CFG synthesis.
    pub fn register_insn(&mut self, mut insn: Insn, src_loc: Option<SrcLoc>) -> Insn {
        if insn.id().entity().seq_id() == 0 {
            let raw = self
                .id_gen
                .allocate(insn.pool_prefix(), EntityKind::Insn.seq_bit_length());
            insn.stamp_id(InsnId(EntityId(raw)));
        }
        let id = insn.id();
        let src_loc = src_loc.or_else(|| self.insn_info.get(&id).and_then(InsnInfo::src_loc));
        self.insn_info.insert(
            id,
            InsnInfo {
                block: BasicBlockId::NULL,
                src_loc,
            },
        );
        insn
    }

    /// Appends `insn` to `block`, allocating and stamping its id.
    ///
    /// An instruction that already carries a stamped id (one being
    /// redistributed during CFG synthesis) keeps it; only its owning-block
    /// record is updated, and an existing source location is preserved.
    pub fn add_insn(
        &mut self,
        block: &mut BasicBlock,
        insn: Insn,
        src_loc: Option<SrcLoc>,
    ) -> InsnId {
        let insn = self.register_insn(insn, src_loc);
        let id = insn.id();
        if let Some(info) = self.insn_info.get_mut(&id) {
            info.block = block.id();
        }
        block.push_insn(insn);
        id
    }

    /// Resolves a name to its entity id.
    ///
    /// # Panics
    ///
    /// Panics when the name is unknown; a caller asking for a name it never
    /// registered has violated the contract.
    #[must_use]
    pub fn lookup(&self, name: &str) -> EntityId {
        match self.names.get(name) {
            Some(&id) => id,
            None => panic!("no entity named `{name}` in unit `{}`", self.name),
        }
    }

    /// Returns `true` when `name` is registered.
    #[must_use]
    pub fn contains_name(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// The function behind `id`.
    #[must_use]
    pub fn function(&self, id: FunctionId) -> Option<&Function> {
        self.functions.get(&id)
    }

    /// The function registered under `name`.
    #[must_use]
    pub fn function_by_name(&self, name: &str) -> Option<&Function> {
        let id = self.names.get(name)?;
        self.functions.get(&FunctionId(*id))
    }

    /// Functions in creation order, the global-init function first.
    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.function_order
            .iter()
            .filter_map(|id| self.functions.get(id))
    }

    /// The literal behind `id`, immediate or table-stored.
    #[must_use]
    pub fn literal(&self, id: EntityId) -> Option<&LiteralInfo> {
        self.constants.get(&id)
    }

    /// The numeric value of a literal id.
    ///
    /// Immediates decode straight from the id even when the constants table
    /// has no entry for them (e.g. after deserialization).
    #[must_use]
    pub fn literal_value(&self, id: EntityId) -> Option<u64> {
        if let Some(info) = self.constants.get(&id) {
            return Some(info.value);
        }
        if id.kind() == Some(EntityKind::ImmNumLit) {
            return Some(u64::from(id.immediate_value()));
        }
        None
    }

    /// The value record behind a variable or function id.
    #[must_use]
    pub fn value_info(&self, id: EntityId) -> Option<&ValueInfo> {
        self.values.get(&id)
    }

    /// The metadata of an instruction.
    #[must_use]
    pub fn insn_info(&self, id: InsnId) -> Option<&InsnInfo> {
        self.insn_info.get(&id)
    }

    /// The name of a label.
    #[must_use]
    pub fn label_name(&self, id: LabelId) -> Option<&str> {
        self.label_names.get(&id).map(String::as_str)
    }

    /// The argument list of a call site.
    #[must_use]
    pub fn call_args(&self, id: CallSiteId) -> Option<&[EntityId]> {
        self.call_args.get(&id).map(Vec::as_slice)
    }

    /// The interned source-file table.
    #[must_use]
    pub fn source_map(&self) -> &SourceMap {
        &self.source_map
    }

    /// Mutable access to the source-file table.
    pub fn source_map_mut(&mut self) -> &mut SourceMap {
        &mut self.source_map
    }

    /// Returns the allocator, for callers that free ids explicitly.
    pub fn id_gen_mut(&mut self) -> &mut IdAllocator {
        &mut self.id_gen
    }
}
