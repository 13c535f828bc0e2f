//! The persisted SPIR container.
//!
//! A little-endian binary format holding one translation unit: a string
//! table, an entity table, and per-function instruction streams whose
//! operands reference entity-table indices. Loading replays the container
//! through the [`TranslationUnit`] creation primitives, so entities receive
//! fresh ids and every operand is remapped; the 30/64/128-bit field
//! layouts of ids, expressions and instructions are preserved exactly.
//!
//! Layout (version 1):
//!
//! ```text
//! "SPIR" magic | version u8 | flags u8 | reserved u16
//! string table  : count u32, then per string (len u32, utf-8 bytes)
//! entity table  : count u32, then per entity
//!                 (kind u8, value-kind u8, name u32, owner u32, value u64)
//! function table: count u32, then per function
//!                 (name u32, kind u8, return-kind u8,
//!                  param count u16 + entity indices,
//!                  body flag u8 + instruction stream)
//! ```
//!
//! Loading several containers into one unit is how linking works: name
//! collisions between definitions are an error, declarations unify with
//! whatever they meet.

use std::path::Path;

use rustc_hash::FxHashMap;

use crate::ir::expr::{Expr, ExprKind};
use crate::ir::graph::synthesize_cfg;
use crate::ir::id::{EntityId, EntityKind, FunctionId, LabelId, ScopeId};
use crate::ir::insn::{Insn, InsnKind};
use crate::ir::srcloc::SrcLoc;
use crate::ir::types::{Qualifiers, ValueKind, ValueType};
use crate::ir::unit::{FunctionBody, TranslationUnit, GLOBAL_INIT_NAME};
use crate::{Error, Result};

/// The four magic bytes opening every container.
pub const MAGIC: &[u8; 4] = b"SPIR";
/// The container version this library reads and writes.
pub const VERSION: u8 = 1;

const NONE: u32 = u32::MAX;

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Strings {
    table: Vec<String>,
    index: FxHashMap<String, u32>,
}

impl Strings {
    fn intern(&mut self, s: &str) -> u32 {
        if let Some(&idx) = self.index.get(s) {
            return idx;
        }
        let idx = self.table.len() as u32;
        self.table.push(s.to_string());
        self.index.insert(s.to_string(), idx);
        idx
    }
}

#[derive(Default)]
struct Entities {
    /// (kind, value-kind, name idx, owner function position, value)
    table: Vec<(u8, u8, u32, u32, u64)>,
    index: FxHashMap<EntityId, u32>,
}

struct Writer<'a> {
    tu: &'a TranslationUnit,
    strings: Strings,
    entities: Entities,
    /// Function id to position in the function table.
    func_pos: FxHashMap<FunctionId, u32>,
}

impl<'a> Writer<'a> {
    fn new(tu: &'a TranslationUnit) -> Self {
        let mut func_pos = FxHashMap::default();
        for (pos, func) in tu.functions().enumerate() {
            func_pos.insert(func.id(), pos as u32);
        }
        Writer {
            tu,
            strings: Strings::default(),
            entities: Entities::default(),
            func_pos,
        }
    }

    /// Interns an entity reference, returning its table index.
    fn entity(&mut self, id: EntityId) -> Result<u32> {
        if id.is_null() {
            return Ok(NONE);
        }
        if let Some(&idx) = self.entities.index.get(&id) {
            return Ok(idx);
        }
        let kind = id
            .kind()
            .ok_or_else(|| malformed_error!("unit references id {id} of unknown kind"))?;

        let entry = if kind.is_function() {
            let func = self
                .tu
                .function(FunctionId(id))
                .ok_or_else(|| malformed_error!("unit references unknown function {id}"))?;
            let name = self.strings.intern(func.name());
            let pos = self.func_pos.get(&FunctionId(id)).copied().unwrap_or(NONE);
            (kind as u8, func.return_type().value_kind() as u8, name, pos, 0)
        } else if kind == EntityKind::Label {
            let name = match self.tu.label_name(LabelId(id)) {
                Some(name) => self.strings.intern(name),
                None => NONE,
            };
            (kind as u8, 0, name, NONE, 0)
        } else if kind.is_literal() {
            let value = self
                .tu
                .literal_value(id)
                .ok_or_else(|| malformed_error!("unit references unknown literal {id}"))?;
            (kind as u8, id.sub_kind(), NONE, NONE, value)
        } else if kind.is_variable() {
            let info = self
                .tu
                .value_info(id)
                .ok_or_else(|| malformed_error!("unit references unknown variable {id}"))?;
            let name = self.strings.intern(info.name());
            let owner = match FunctionId(info.func_id()) {
                f if f.is_null() => NONE,
                f => self.func_pos.get(&f).copied().unwrap_or(NONE),
            };
            (
                kind as u8,
                info.value_type().value_kind() as u8,
                name,
                owner,
                0,
            )
        } else {
            return Err(malformed_error!(
                "entity {id} of kind {kind} cannot be persisted"
            ));
        };

        let idx = self.entities.table.len() as u32;
        self.entities.table.push(entry);
        self.entities.index.insert(id, idx);
        Ok(idx)
    }

    fn expr(&mut self, out: &mut Vec<u8>, expr: Expr) -> Result<()> {
        let kind = expr.kind();
        out.push(kind as u8);
        let op1 = self.entity(expr.operand1())?;
        out.extend_from_slice(&op1.to_le_bytes());
        match kind {
            ExprKind::Call => {
                // Arguments ride inline instead of the raw call-site id.
                out.extend_from_slice(&NONE.to_le_bytes());
                let args = self
                    .tu
                    .call_args(expr.call_site_id())
                    .map(<[EntityId]>::to_vec)
                    .unwrap_or_default();
                out.extend_from_slice(&(args.len() as u16).to_le_bytes());
                for arg in args {
                    let idx = self.entity(arg)?;
                    out.extend_from_slice(&idx.to_le_bytes());
                }
            }
            _ if kind.is_two_operand() => {
                let op2 = self.entity(expr.operand2())?;
                out.extend_from_slice(&op2.to_le_bytes());
            }
            _ => {
                out.extend_from_slice(&NONE.to_le_bytes());
            }
        }
        Ok(())
    }

    fn insn(&mut self, out: &mut Vec<u8>, insn: Insn) -> Result<()> {
        let kind = insn.kind();
        out.push(kind as u8);

        // 32-bit payload: an entity reference or nothing.
        let payload = match kind {
            InsnKind::Nop | InsnKind::Barrier | InsnKind::Call => NONE,
            InsnKind::Label | InsnKind::Goto => self.entity(insn.labels().0.entity())?,
            _ => self.entity(insn.payload_entity())?,
        };
        out.extend_from_slice(&payload.to_le_bytes());

        // Second half: nothing, an expression, or a label pair.
        match kind {
            InsnKind::Nop
            | InsnKind::Barrier
            | InsnKind::Label
            | InsnKind::Goto
            | InsnKind::Return
            | InsnKind::AssignPhi => {
                out.push(0);
            }
            InsnKind::Cond => {
                out.push(2);
                let (t, f) = insn.labels();
                let t = self.entity(t.entity())?;
                let f = self.entity(f.entity())?;
                out.extend_from_slice(&t.to_le_bytes());
                out.extend_from_slice(&f.to_le_bytes());
            }
            _ => {
                out.push(1);
                self.expr(out, insn.rhs_expr())?;
            }
        }

        // Source location, when recorded.
        match self.tu.insn_info(insn.id()).and_then(|info| info.src_loc()) {
            Some(loc) => {
                out.push(1);
                let name = self.tu.source_map().name(loc.file).unwrap_or("");
                let idx = self.strings.intern(name);
                out.extend_from_slice(&idx.to_le_bytes());
                out.extend_from_slice(&loc.line.to_le_bytes());
                out.extend_from_slice(&loc.col.to_le_bytes());
                out.extend_from_slice(&loc.byte_pos.to_le_bytes());
            }
            None => out.push(0),
        }
        Ok(())
    }
}

/// Serializes a translation unit into a fresh byte buffer.
pub fn write_unit(tu: &TranslationUnit) -> Result<Vec<u8>> {
    let mut writer = Writer::new(tu);

    // Function records are written first into a side buffer so the string
    // and entity tables are complete by the time the header sections are
    // assembled.
    let mut funcs = Vec::new();
    let functions: Vec<_> = tu.functions().collect();
    funcs.extend_from_slice(&(functions.len() as u32).to_le_bytes());
    for func in &functions {
        let name = writer.strings.intern(func.name());
        funcs.extend_from_slice(&name.to_le_bytes());
        let kind = func
            .id()
            .entity()
            .kind()
            .ok_or_else(|| malformed_error!("function {} has a malformed id", func.name()))?;
        funcs.push(kind as u8);
        funcs.push(func.return_type().value_kind() as u8);
        funcs.extend_from_slice(&(func.params().len() as u16).to_le_bytes());
        for &param in func.params() {
            let idx = writer.entity(param)?;
            funcs.extend_from_slice(&idx.to_le_bytes());
        }
        match func.body() {
            Some(body) => {
                funcs.push(1);
                // Blocks are flattened in textual order so that re-running
                // CFG synthesis on load reproduces every fall-through edge.
                let mut insns = Vec::new();
                let mut count: u32 = 0;
                let mut flatten = |writer: &mut Writer<'_>,
                                   block: &crate::ir::BasicBlock|
                 -> Result<()> {
                    for i in 0..block.insn_count() {
                        writer.insn(&mut insns, block.insn(i))?;
                        count += 1;
                    }
                    Ok(())
                };
                match body {
                    FunctionBody::Block(block) => flatten(&mut writer, block)?,
                    FunctionBody::Cfg(cfg) => {
                        for block in cfg.blocks() {
                            flatten(&mut writer, block)?;
                        }
                    }
                }
                funcs.extend_from_slice(&count.to_le_bytes());
                funcs.extend_from_slice(&insns);
            }
            None => funcs.push(0),
        }
    }

    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    out.push(0); // flags
    out.extend_from_slice(&0u16.to_le_bytes()); // reserved

    out.extend_from_slice(&(writer.strings.table.len() as u32).to_le_bytes());
    for s in &writer.strings.table {
        out.extend_from_slice(&(s.len() as u32).to_le_bytes());
        out.extend_from_slice(s.as_bytes());
    }

    out.extend_from_slice(&(writer.entities.table.len() as u32).to_le_bytes());
    for &(kind, vk, name, owner, value) in &writer.entities.table {
        out.push(kind);
        out.push(vk);
        out.extend_from_slice(&name.to_le_bytes());
        out.extend_from_slice(&owner.to_le_bytes());
        out.extend_from_slice(&value.to_le_bytes());
    }

    out.extend_from_slice(&funcs);
    Ok(out)
}

/// Serializes a translation unit to a file.
pub fn write_unit_to_path(tu: &TranslationUnit, path: &Path) -> Result<()> {
    std::fs::write(path, write_unit(tu)?)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// A bounds-checked little-endian cursor over the container bytes.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(Error::OutOfBounds)?;
        if end > self.data.len() {
            return Err(Error::OutOfBounds);
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.bytes(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.bytes(2)?.try_into().expect("len 2")))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.bytes(4)?.try_into().expect("len 4")))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.bytes(8)?.try_into().expect("len 8")))
    }

    fn string(&mut self) -> Result<String> {
        let len = self.u32()? as usize;
        let bytes = self.bytes(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| malformed_error!("string table entry is not valid utf-8"))
    }
}

struct RawEntity {
    kind: EntityKind,
    value_kind: ValueKind,
    name: u32,
    owner: u32,
    value: u64,
}

struct RawFunction {
    name: u32,
    kind: EntityKind,
    return_kind: ValueKind,
    params: Vec<u32>,
    insns: Option<Vec<RawInsn>>,
}

struct RawInsn {
    kind: InsnKind,
    payload: u32,
    expr: Option<RawExpr>,
    labels: Option<(u32, u32)>,
    src_loc: Option<(u32, u32, u32, u32)>,
}

struct RawExpr {
    kind: ExprKind,
    op1: u32,
    op2: u32,
    args: Vec<u32>,
}

/// Parses a container and replays it into a fresh translation unit.
pub fn read_unit(name: &str, data: &[u8]) -> Result<TranslationUnit> {
    let mut tu = TranslationUnit::new(name);
    read_unit_into(&mut tu, data)?;
    Ok(tu)
}

/// Parses a container from a file.
pub fn read_unit_from_path(path: &Path) -> Result<TranslationUnit> {
    let data = std::fs::read(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unit".to_string());
    read_unit(&name, &data)
}

/// Parses a container and replays it into an existing unit.
///
/// This is the linking primitive: reading several containers into one unit
/// merges them. Entities get fresh ids from the receiving unit's allocator,
/// so ids never collide across inputs. A function defined in both the unit
/// and the container is a [`Error::DuplicateSymbol`]; declarations unify
/// with an existing function of the same name.
pub fn read_unit_into(tu: &mut TranslationUnit, data: &[u8]) -> Result<()> {
    let mut r = Reader::new(data);

    let magic = r.bytes(4)?;
    if magic != MAGIC.as_slice() {
        return Err(malformed_error!("bad magic {magic:02x?}"));
    }
    let version = r.u8()?;
    if version != VERSION {
        return Err(Error::NotSupported(version));
    }
    let _flags = r.u8()?;
    let _reserved = r.u16()?;

    // String table.
    let count = r.u32()? as usize;
    let mut strings = Vec::with_capacity(count);
    for _ in 0..count {
        strings.push(r.string()?);
    }
    // Entity table.
    let count = r.u32()? as usize;
    let mut raw_entities = Vec::with_capacity(count);
    for _ in 0..count {
        let kind = r.u8()?;
        let kind = EntityKind::from_repr(kind)
            .ok_or_else(|| malformed_error!("unknown entity kind {kind}"))?;
        let vk = r.u8()?;
        let value_kind = ValueKind::from_repr(vk)
            .ok_or_else(|| malformed_error!("unknown value kind {vk}"))?;
        raw_entities.push(RawEntity {
            kind,
            value_kind,
            name: r.u32()?,
            owner: r.u32()?,
            value: r.u64()?,
        });
    }

    // Function table.
    let count = r.u32()? as usize;
    let mut raw_functions = Vec::with_capacity(count);
    for _ in 0..count {
        let name = r.u32()?;
        let kind = r.u8()?;
        let kind = EntityKind::from_repr(kind)
            .ok_or_else(|| malformed_error!("unknown function kind {kind}"))?;
        if !kind.is_function() {
            return Err(malformed_error!("function record with kind {kind}"));
        }
        let rk = r.u8()?;
        let return_kind = ValueKind::from_repr(rk)
            .ok_or_else(|| malformed_error!("unknown value kind {rk}"))?;
        let param_count = r.u16()? as usize;
        let mut params = Vec::with_capacity(param_count);
        for _ in 0..param_count {
            params.push(r.u32()?);
        }
        let insns = if r.u8()? != 0 {
            let insn_count = r.u32()? as usize;
            let mut insns = Vec::with_capacity(insn_count);
            for _ in 0..insn_count {
                insns.push(read_insn(&mut r)?);
            }
            Some(insns)
        } else {
            None
        };
        raw_functions.push(RawFunction {
            name,
            kind,
            return_kind,
            params,
            insns,
        });
    }

    if r.pos != data.len() {
        return Err(malformed_error!(
            "{} trailing bytes after the function table",
            data.len() - r.pos
        ));
    }

    Replayer {
        tu,
        strings: &strings,
        raw_entities: &raw_entities,
        entity_ids: vec![EntityId::NULL; raw_entities.len()],
        func_ids: Vec::new(),
    }
    .replay(&raw_functions)
}

fn read_insn(r: &mut Reader<'_>) -> Result<RawInsn> {
    let kind = r.u8()?;
    let kind = InsnKind::from_repr(kind)
        .ok_or_else(|| malformed_error!("unknown instruction kind {kind}"))?;
    let payload = r.u32()?;
    let (expr, labels) = match r.u8()? {
        0 => (None, None),
        1 => {
            let xk = r.u8()?;
            let xk = ExprKind::from_repr(xk)
                .ok_or_else(|| malformed_error!("unknown expression kind {xk}"))?;
            let op1 = r.u32()?;
            let op2 = r.u32()?;
            let args = if xk == ExprKind::Call {
                let argc = r.u16()? as usize;
                let mut args = Vec::with_capacity(argc);
                for _ in 0..argc {
                    args.push(r.u32()?);
                }
                args
            } else {
                Vec::new()
            };
            (
                Some(RawExpr {
                    kind: xk,
                    op1,
                    op2,
                    args,
                }),
                None,
            )
        }
        2 => {
            let t = r.u32()?;
            let f = r.u32()?;
            (None, Some((t, f)))
        }
        tag => return Err(malformed_error!("unknown second-half tag {tag}")),
    };
    let src_loc = if r.u8()? != 0 {
        Some((r.u32()?, r.u32()?, r.u32()?, r.u32()?))
    } else {
        None
    };
    Ok(RawInsn {
        kind,
        payload,
        expr,
        labels,
        src_loc,
    })
}

struct Replayer<'a, 'tu> {
    tu: &'tu mut TranslationUnit,
    strings: &'a [String],
    raw_entities: &'a [RawEntity],
    /// Resolved id per entity-table index; null until first use.
    entity_ids: Vec<EntityId>,
    /// Resolved id per function-table position.
    func_ids: Vec<FunctionId>,
}

impl<'a, 'tu> Replayer<'a, 'tu> {
    fn string(&self, idx: u32) -> Result<&'a str> {
        self.strings
            .get(idx as usize)
            .map(String::as_str)
            .ok_or_else(|| malformed_error!("string index {idx} out of range"))
    }

    fn replay(mut self, raw_functions: &[RawFunction]) -> Result<()> {
        // Functions first, so variables can name their owner and call
        // expressions their callee.
        for raw in raw_functions {
            let name = self.string(raw.name)?;
            let return_type = ValueType::basic(raw.return_kind, Qualifiers::empty());
            let id = if name == GLOBAL_INIT_NAME {
                self.tu.global_init()
            } else if self.tu.contains_name(name) {
                let existing = self
                    .tu
                    .function_by_name(name)
                    .ok_or_else(|| Error::DuplicateSymbol(name.to_string()))?;
                if raw.insns.is_some() && existing.body().is_some() {
                    return Err(Error::DuplicateSymbol(name.to_string()));
                }
                existing.id()
            } else if raw.kind == EntityKind::FuncDecl {
                self.tu.new_function_decl(name, return_type, Vec::new())
            } else {
                self.tu.new_function(name, return_type, Vec::new())
            };
            self.func_ids.push(id);
        }

        // Parameter lists, now that owners resolve.
        for (pos, raw) in raw_functions.iter().enumerate() {
            if raw.params.is_empty() {
                continue;
            }
            let mut params = Vec::with_capacity(raw.params.len());
            for &param in &raw.params {
                params.push(self.entity(param)?);
            }
            self.tu.set_params(self.func_ids[pos], params);
        }

        // Bodies, replayed through CFG synthesis.
        for (pos, raw) in raw_functions.iter().enumerate() {
            let func_id = self.func_ids[pos];
            let Some(raw_insns) = &raw.insns else {
                continue;
            };
            if self
                .tu
                .function(func_id)
                .is_some_and(|f| f.body().is_some())
            {
                continue; // keep the existing definition
            }
            let mut body = Vec::with_capacity(raw_insns.len());
            for raw_insn in raw_insns {
                body.push(self.insn(raw_insn)?);
            }
            if body.is_empty() {
                continue;
            }
            let cfg = synthesize_cfg(self.tu, ScopeId::NULL, func_id.entity(), body);
            self.tu.set_body(func_id, FunctionBody::Cfg(cfg));
        }
        Ok(())
    }

    /// Resolves an entity-table index to an id in the receiving unit,
    /// creating the entity on first use.
    fn entity(&mut self, idx: u32) -> Result<EntityId> {
        if idx == NONE {
            return Ok(EntityId::NULL);
        }
        let raw = self
            .raw_entities
            .get(idx as usize)
            .ok_or_else(|| malformed_error!("entity index {idx} out of range"))?;
        if !self.entity_ids[idx as usize].is_null() {
            return Ok(self.entity_ids[idx as usize]);
        }

        let id = if raw.kind.is_function() {
            let pos = raw.owner as usize;
            self.func_ids
                .get(pos)
                .copied()
                .map(FunctionId::entity)
                .ok_or_else(|| malformed_error!("function position {pos} out of range"))?
        } else if raw.kind == EntityKind::Label {
            match raw.name {
                NONE => self.tu.new_label_id().entity(),
                name => {
                    let name = self.string(name)?.to_string();
                    self.tu.new_named_label(&name).entity()
                }
            }
        } else if raw.kind.is_literal() {
            let value_type = ValueType::basic(raw.value_kind, Qualifiers::empty());
            self.tu.new_const(raw.value, value_type)
        } else if raw.kind.is_variable() {
            let name = self.string(raw.name)?;
            let owner = match raw.owner {
                NONE => EntityId::NULL,
                pos => self
                    .func_ids
                    .get(pos as usize)
                    .copied()
                    .map(FunctionId::entity)
                    .ok_or_else(|| malformed_error!("function position {pos} out of range"))?,
            };
            let value_type = ValueType::basic(raw.value_kind, Qualifiers::empty());
            // Variables may be shared across inputs when linking; reuse an
            // existing global of the same name.
            if owner.is_null() && self.tu.contains_name(name) {
                self.tu.lookup(name)
            } else {
                self.tu.new_var(name, raw.kind, value_type, owner)
            }
        } else {
            return Err(malformed_error!(
                "entity of kind {} cannot be replayed",
                raw.kind
            ));
        };

        self.entity_ids[idx as usize] = id;
        Ok(id)
    }

    fn label(&mut self, idx: u32) -> Result<LabelId> {
        Ok(LabelId(self.entity(idx)?))
    }

    fn expr(&mut self, raw: &RawExpr) -> Result<Expr> {
        let op1 = self.entity(raw.op1)?;
        Ok(match raw.kind {
            ExprKind::Val => Expr::val(op1),
            ExprKind::Call0 => Expr::call0(op1),
            ExprKind::Call => {
                let mut args = Vec::with_capacity(raw.args.len());
                for &arg in &raw.args {
                    args.push(self.entity(arg)?);
                }
                let site = self.tu.new_call_site(args);
                Expr::call(op1, site)
            }
            kind if kind.is_single_operand() => Expr::unary(kind, op1),
            kind => {
                let op2 = self.entity(raw.op2)?;
                Expr::binary(kind, op1, op2)
            }
        })
    }

    fn insn(&mut self, raw: &RawInsn) -> Result<Insn> {
        let expr = |this: &mut Self| -> Result<Expr> {
            let raw_expr = raw
                .expr
                .as_ref()
                .ok_or_else(|| malformed_error!("{} instruction without expression", raw.kind))?;
            this.expr(raw_expr)
        };

        let mut insn = match raw.kind {
            InsnKind::Nop => Insn::nop(),
            InsnKind::Barrier => Insn::barrier(),
            InsnKind::Label => Insn::label(self.label(raw.payload)?),
            InsnKind::Goto => Insn::goto(self.label(raw.payload)?),
            InsnKind::Return => Insn::ret(self.entity(raw.payload)?),
            InsnKind::AssignSimple => {
                let lhs = self.entity(raw.payload)?;
                let rhs = expr(self)?;
                if !rhs.is_simple() {
                    return Err(malformed_error!("simple assignment with a compound rhs"));
                }
                Insn::assign_simple(lhs, rhs.operand1())
            }
            InsnKind::AssignRhsOp => {
                let lhs = self.entity(raw.payload)?;
                Insn::assign_rhs_op(lhs, expr(self)?)
            }
            InsnKind::AssignLhsOp => {
                let rhs = self.entity(raw.payload)?;
                Insn::assign_lhs_op(expr(self)?, rhs)
            }
            InsnKind::AssignCall => {
                let lhs = self.entity(raw.payload)?;
                Insn::assign_call(lhs, expr(self)?)
            }
            InsnKind::AssignPhi => Insn::assign_phi(self.entity(raw.payload)?),
            InsnKind::Call => Insn::call(expr(self)?),
            InsnKind::Cond => {
                let (t, f) = raw
                    .labels
                    .ok_or_else(|| malformed_error!("branch without labels"))?;
                let cond = self.entity(raw.payload)?;
                Insn::cond(
                    cond,
                    self.label(t)?,
                    self.label(f)?,
                )
            }
        };

        if let Some((file, line, col, byte_pos)) = raw.src_loc {
            let name = self.string(file)?.to_string();
            let file_id = self.tu.source_map_mut().intern(&name);
            // Stamp the id early so the location survives redistribution
            // into synthesized blocks.
            insn = self
                .tu
                .register_insn(insn, Some(SrcLoc::new(file_id, line, col, byte_pos)));
        }

        Ok(insn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::sample;

    #[test]
    fn test_header_round_trip() {
        let tu = sample::unit_straight_line();
        let bytes = write_unit(&tu).expect("writes");
        assert_eq!(&bytes[0..4], MAGIC.as_slice());
        assert_eq!(bytes[4], VERSION);
        let back = read_unit("straight_line.c", &bytes).expect("reads");
        assert!(back.function_by_name("main").is_some());
    }

    #[test]
    fn test_bad_magic_rejected() {
        let err = read_unit("x", b"NOPE\x01\x00\x00\x00").unwrap_err();
        assert!(matches!(err, Error::Malformed { .. }));
    }

    #[test]
    fn test_truncated_input_rejected() {
        let tu = sample::unit_straight_line();
        let bytes = write_unit(&tu).expect("writes");
        let err = read_unit("x", &bytes[..bytes.len() / 2]).unwrap_err();
        assert!(matches!(
            err,
            Error::OutOfBounds | Error::Malformed { .. }
        ));
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let tu = sample::unit_straight_line();
        let mut bytes = write_unit(&tu).expect("writes");
        bytes[4] = 99;
        let err = read_unit("x", &bytes).unwrap_err();
        assert!(matches!(err, Error::NotSupported(99)));
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        let tu = sample::unit_straight_line();
        let mut bytes = write_unit(&tu).expect("writes");
        bytes.extend_from_slice(&[0, 1, 2, 3]);
        let err = read_unit("x", &bytes).unwrap_err();
        assert!(matches!(err, Error::Malformed { .. }));
    }

    #[test]
    fn test_duplicate_definition_rejected() {
        let tu = sample::unit_straight_line();
        let bytes = write_unit(&tu).expect("writes");
        let mut merged = read_unit("a", &bytes).expect("first read");
        let err = read_unit_into(&mut merged, &bytes).unwrap_err();
        assert!(matches!(err, Error::DuplicateSymbol(name) if name == "main"));
    }
}
