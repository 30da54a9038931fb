//! Programmatic construction of well-formed annotated trees.
//!
//! The builder plays the role of parser plus mode checker: every node it returns
//! already carries its mode, identifiers are bound to tags, and declarations are
//! laid out in the frame of the innermost open scope.

use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::builtin::{Builtin, Prim};
use crate::mode::{ModeId, ModeKind, ModeTable};
use crate::tag::{ScopeTable, TableId, Tag, TagId, TagKind};
use crate::tree::{Attribute, Node, NodeId, SyntaxTree};

/// Tail of a conditional clause.
#[derive(Debug, Clone, Copy)]
pub enum ElsePart {
    Else(NodeId),
    Elif(NodeId),
}

/// Tail of a case clause.
#[derive(Debug, Clone, Copy)]
pub enum OutPart {
    Out(NodeId),
    Ouse(NodeId),
}

/// The optional parts of a loop clause; `body` is the serial clause of the `DO` part.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopParts {
    pub counter: Option<TagId>,
    pub from: Option<NodeId>,
    pub by: Option<NodeId>,
    pub to: Option<NodeId>,
    pub downto: Option<NodeId>,
    pub while_part: Option<NodeId>,
    pub body: Option<NodeId>,
    pub until: Option<NodeId>,
}

#[derive(Debug)]
pub struct TreeBuilder {
    tree: SyntaxTree,
    scopes: Vec<TableId>,
    standard: FxHashMap<Builtin, TagId>,
    line: u32,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeBuilder {
    pub fn new() -> Self {
        let mut tree = SyntaxTree::default();
        let outer = tree.tables.alloc(ScopeTable::default());
        Self {
            tree,
            scopes: vec![outer],
            standard: FxHashMap::default(),
            line: 1,
        }
    }

    pub fn modes(&mut self) -> &mut ModeTable {
        &mut self.tree.modes
    }

    pub fn tree(&self) -> &SyntaxTree {
        &self.tree
    }

    /// Sets the source line recorded on subsequently built nodes.
    pub fn line(&mut self, line: u32) -> &mut Self {
        self.line = line;
        self
    }

    /// Allocates a node and links `children` under it in order.
    pub fn node(&mut self, attribute: Attribute, mode: Option<ModeId>, children: &[NodeId]) -> NodeId {
        let mut node = Node::new(attribute);
        node.mode = mode;
        node.line = self.line;
        node.sub = children.first().copied();
        for pair in children.windows(2) {
            self.tree.nodes[pair[0]].next = Some(pair[1]);
        }
        if let Some(last) = children.last() {
            self.tree.nodes[*last].next = None;
        }
        self.tree.nodes.alloc(node)
    }

    fn with_symbol(&mut self, id: NodeId, symbol: &str) -> NodeId {
        self.tree.nodes[id].symbol = SmolStr::new(symbol);
        id
    }

    fn with_tag(&mut self, id: NodeId, tag: TagId) -> NodeId {
        self.tree.nodes[id].tag = Some(tag);
        id
    }

    fn mode_of(&self, id: NodeId) -> ModeId {
        self.tree.nodes[id]
            .mode
            .unwrap_or(self.tree.modes.standard().void)
    }

    fn current_scope(&self) -> TableId {
        *self.scopes.last().unwrap_or(&TableId::new(0))
    }

    /// Opens a new range; declarations until the matching [`serial`](Self::serial) land in it.
    pub fn open_scope(&mut self) -> TableId {
        let parent = self.current_scope();
        let level = self.tree.tables[parent].level + 1;
        let id = self.tree.tables.alloc(ScopeTable {
            level,
            parent: Some(parent),
            ..Default::default()
        });
        self.scopes.push(id);
        id
    }

    fn close_scope(&mut self) -> TableId {
        if self.scopes.len() > 1
            && let Some(id) = self.scopes.pop()
        {
            return id;
        }
        self.current_scope()
    }

    fn new_tag(&mut self, name: &str, mode: ModeId, kind: TagKind, frame_mode: Option<ModeId>) -> TagId {
        let scope = self.current_scope();
        let table = &self.tree.tables[scope];
        let (level, offset) = (table.level, table.frame_increment);
        if let Some(frame_mode) = frame_mode {
            let size = self.tree.modes.size(frame_mode);
            self.tree.tables[scope].frame_increment += size;
        }
        self.tree.tags.alloc(Tag {
            name: SmolStr::new(name),
            mode,
            kind,
            defining_node: None,
            value: None,
            body: None,
            builtin: None,
            level,
            offset,
        })
    }

    /// The standard-environment tag of `builtin`.
    pub fn standard_tag(&mut self, builtin: Builtin) -> TagId {
        if let Some(tag) = self.standard.get(&builtin) {
            return *tag;
        }
        let sig = builtin.signature();
        let result = sig.result.mode(&self.tree.modes);
        let mode = if sig.params.is_empty() && builtin != Builtin::Random {
            result
        } else {
            let params = sig.params.iter().map(|p| p.mode(&self.tree.modes)).collect();
            self.tree.modes.proc(params, result)
        };
        let tag = self.tree.tags.alloc(Tag {
            name: SmolStr::new(sig.name),
            mode,
            kind: TagKind::Standard,
            defining_node: None,
            value: None,
            body: None,
            builtin: Some(builtin),
            level: 0,
            offset: 0,
        });
        self.standard.insert(builtin, tag);
        tag
    }

    pub fn denotation(&mut self, text: &str, mode: ModeId) -> NodeId {
        let id = self.node(Attribute::Denotation, Some(mode), &[]);
        self.with_symbol(id, text)
    }

    pub fn identifier(&mut self, tag: TagId) -> NodeId {
        let (name, mode) = {
            let t = &self.tree.tags[tag];
            (t.name.clone(), t.mode)
        };
        let id = self.node(Attribute::Identifier, Some(mode), &[]);
        self.with_symbol(id, &name);
        self.with_tag(id, tag)
    }

    /// An applied occurrence of a standard-environment identifier such as `pi` or `sqrt`.
    pub fn standard(&mut self, builtin: Builtin) -> NodeId {
        let tag = self.standard_tag(builtin);
        self.identifier(tag)
    }

    pub fn identity_declaration(&mut self, name: &str, mode: ModeId, source: NodeId) -> (NodeId, TagId) {
        let tag = self.new_tag(name, mode, TagKind::Identifier, Some(mode));
        let decl = self.node(Attribute::IdentityDeclaration, Some(mode), &[source]);
        self.with_symbol(decl, name);
        self.with_tag(decl, tag);
        let t = &mut self.tree.tags[tag];
        t.defining_node = Some(decl);
        t.value = Some(source);
        (decl, tag)
    }

    /// `LOC m name [:= init]`; the tag's mode is `REF m`.
    pub fn variable_declaration(&mut self, name: &str, mode: ModeId, init: Option<NodeId>) -> (NodeId, TagId) {
        let ref_mode = self.tree.modes.reference(mode);
        let tag = self.new_tag(name, ref_mode, TagKind::Variable, Some(ref_mode));
        // Room for the value the reference points at.
        let scope = self.current_scope();
        self.tree.tables[scope].frame_increment += self.tree.modes.size(mode);
        let children = init.into_iter().collect::<Vec<_>>();
        let decl = self.node(Attribute::VariableDeclaration, Some(ref_mode), &children);
        self.with_symbol(decl, name);
        self.with_tag(decl, tag);
        self.tree.tags[tag].defining_node = Some(decl);
        (decl, tag)
    }

    pub fn procedure_declaration(&mut self, name: &str, routine: NodeId) -> (NodeId, TagId) {
        let mode = self.mode_of(routine);
        let tag = self.new_tag(name, mode, TagKind::Procedure, Some(mode));
        let decl = self.node(Attribute::ProcedureDeclaration, Some(mode), &[routine]);
        self.with_symbol(decl, name);
        self.with_tag(decl, tag);
        let scope = self.current_scope();
        self.tree.tables[scope].has_routines = true;
        let t = &mut self.tree.tags[tag];
        t.defining_node = Some(decl);
        t.body = Some(routine);
        (decl, tag)
    }

    /// A declaration the generator only ever delegates (`MODE`, `PRIO`, `OP`).
    pub fn other_declaration(&mut self, attribute: Attribute, name: &str) -> NodeId {
        let decl = self.node(attribute, None, &[]);
        self.with_symbol(decl, name)
    }

    pub fn parameter(&mut self, name: &str, mode: ModeId) -> TagId {
        self.new_tag(name, mode, TagKind::Parameter, Some(mode))
    }

    pub fn loop_counter(&mut self, name: &str) -> TagId {
        let int = self.tree.modes.standard().int;
        self.new_tag(name, int, TagKind::Identifier, Some(int))
    }

    /// A user-defined operator indication.
    pub fn operator_tag(&mut self, name: &str, mode: ModeId) -> TagId {
        self.new_tag(name, mode, TagKind::Operator, None)
    }

    pub fn label(&mut self, name: &str) -> (NodeId, TagId) {
        let void = self.tree.modes.standard().void;
        let tag = self.new_tag(name, void, TagKind::Label, None);
        let id = self.node(Attribute::Label, None, &[]);
        self.with_symbol(id, name);
        self.with_tag(id, tag);
        self.tree.tags[tag].defining_node = Some(id);
        (id, tag)
    }

    pub fn jump(&mut self, label: TagId) -> NodeId {
        let name = self.tree.tags[label].name.clone();
        let id = self.node(Attribute::Jump, None, &[]);
        self.with_symbol(id, &name);
        self.with_tag(id, label)
    }

    pub fn dereference(&mut self, operand: NodeId) -> NodeId {
        let mode = self.mode_of(operand);
        let to = self.tree.modes.deref(mode).unwrap_or(mode);
        self.node(Attribute::Dereferencing, Some(to), &[operand])
    }

    pub fn deprocedure(&mut self, operand: NodeId) -> NodeId {
        let mode = self.mode_of(operand);
        let result = match self.tree.modes.kind(mode) {
            ModeKind::Proc { result, .. } => *result,
            _ => mode,
        };
        self.node(Attribute::Deproceduring, Some(result), &[operand])
    }

    fn operator(&mut self, tag: TagId) -> NodeId {
        let name = self.tree.tags[tag].name.clone();
        let mode = self.tree.tags[tag].mode;
        let id = self.node(Attribute::Operator, Some(mode), &[]);
        self.with_symbol(id, &name);
        self.with_tag(id, tag)
    }

    pub fn formula(&mut self, lhs: NodeId, builtin: Builtin, rhs: NodeId) -> NodeId {
        let tag = self.standard_tag(builtin);
        let result = builtin.signature().result.mode(&self.tree.modes);
        self.user_formula(lhs, tag, rhs, result)
    }

    pub fn user_formula(&mut self, lhs: NodeId, op: TagId, rhs: NodeId, mode: ModeId) -> NodeId {
        let operator = self.operator(op);
        self.node(Attribute::Formula, Some(mode), &[lhs, operator, rhs])
    }

    pub fn monadic(&mut self, builtin: Builtin, operand: NodeId) -> NodeId {
        let tag = self.standard_tag(builtin);
        let result = builtin.signature().result.mode(&self.tree.modes);
        let operator = self.operator(tag);
        self.node(Attribute::MonadicFormula, Some(result), &[operator, operand])
    }

    /// Calls a standard procedure such as `sqrt`.
    pub fn call_builtin(&mut self, builtin: Builtin, args: &[NodeId]) -> NodeId {
        let callee = self.standard(builtin);
        let result = builtin.signature().result.mode(&self.tree.modes);
        self.call(callee, args, result)
    }

    pub fn call(&mut self, callee: NodeId, args: &[NodeId], mode: ModeId) -> NodeId {
        let mut children = vec![callee];
        children.extend_from_slice(args);
        self.node(Attribute::Call, Some(mode), &children)
    }

    /// `primary[i, j, ...]`; a slice of a `REF [] m` yields `REF m`.
    pub fn slice(&mut self, primary: NodeId, indices: &[NodeId]) -> NodeId {
        let indexer = self.node(Attribute::Indexer, None, indices);
        self.finish_slice(primary, indexer)
    }

    /// `primary[:]`, an open-ended trim.
    pub fn trimmed_slice(&mut self, primary: NodeId) -> NodeId {
        let trimmer = self.node(Attribute::Trimmer, None, &[]);
        let indexer = self.node(Attribute::Indexer, None, &[trimmer]);
        let mode = self.mode_of(primary);
        self.node(Attribute::Slice, Some(mode), &[primary, indexer])
    }

    fn finish_slice(&mut self, primary: NodeId, indexer: NodeId) -> NodeId {
        let mode = self.mode_of(primary);
        let elem = self.tree.modes.row_element(mode).unwrap_or(mode);
        let result = if self.tree.modes.deref(mode).is_some() {
            self.tree.modes.reference(elem)
        } else {
            elem
        };
        self.node(Attribute::Slice, Some(result), &[primary, indexer])
    }

    /// `field OF secondary`; selecting from a `REF STRUCT` yields a reference.
    pub fn selection(&mut self, field: &str, secondary: NodeId) -> NodeId {
        let mode = self.mode_of(secondary);
        let (is_ref, structure) = match self.tree.modes.deref(mode) {
            Some(to) => (true, to),
            None => (false, mode),
        };
        let field_mode = self
            .tree
            .modes
            .field(structure, field)
            .map(|(_, m)| m)
            .unwrap_or(self.tree.modes.standard().void);
        let result = if is_ref {
            self.tree.modes.reference(field_mode)
        } else {
            field_mode
        };
        let selector = self.node(Attribute::Selector, Some(field_mode), &[]);
        self.with_symbol(selector, field);
        self.node(Attribute::Selection, Some(result), &[selector, secondary])
    }

    pub fn cast(&mut self, mode: ModeId, operand: NodeId) -> NodeId {
        self.node(Attribute::Cast, Some(mode), &[operand])
    }

    pub fn widen(&mut self, operand: NodeId, mode: ModeId) -> NodeId {
        self.node(Attribute::Widening, Some(mode), &[operand])
    }

    pub fn void(&mut self, operand: NodeId) -> NodeId {
        let void = self.tree.modes.standard().void;
        self.node(Attribute::Voiding, Some(void), &[operand])
    }

    pub fn unite(&mut self, operand: NodeId, mode: ModeId) -> NodeId {
        self.node(Attribute::Uniting, Some(mode), &[operand])
    }

    pub fn assign(&mut self, destination: NodeId, source: NodeId) -> NodeId {
        let mode = self.mode_of(destination);
        self.node(Attribute::Assignation, Some(mode), &[destination, source])
    }

    pub fn identity_relation(&mut self, lhs: NodeId, is: bool, rhs: NodeId) -> NodeId {
        let op = self.node(if is { Attribute::Is } else { Attribute::Isnt }, None, &[]);
        let bool = self.tree.modes.standard().bool;
        self.node(Attribute::IdentityRelation, Some(bool), &[lhs, op, rhs])
    }

    pub fn nil(&mut self, mode: ModeId) -> NodeId {
        self.node(Attribute::Nihil, Some(mode), &[])
    }

    pub fn skip(&mut self, mode: ModeId) -> NodeId {
        self.node(Attribute::Skip, Some(mode), &[])
    }

    pub fn generator(&mut self, mode: ModeId) -> NodeId {
        let ref_mode = self.tree.modes.reference(mode);
        self.node(Attribute::Generator, Some(ref_mode), &[])
    }

    pub fn collateral(&mut self, units: &[NodeId], mode: ModeId) -> NodeId {
        self.node(Attribute::CollateralClause, Some(mode), units)
    }

    /// Closes the innermost scope opened with [`open_scope`](Self::open_scope) and
    /// attaches it to a serial clause over `items`. Its mode is that of the last item.
    pub fn serial(&mut self, items: &[NodeId]) -> NodeId {
        let table = self.close_scope();
        let mode = items.last().map(|last| self.mode_of(*last));
        let id = self.node(Attribute::SerialClause, mode, items);
        self.tree.nodes[id].table = Some(table);
        id
    }

    pub fn closed(&mut self, serial: NodeId) -> NodeId {
        let mode = self.mode_of(serial);
        self.node(Attribute::ClosedClause, Some(mode), &[serial])
    }

    /// Body of an `ELIF` or of a whole conditional clause.
    fn conditional_parts(&mut self, guard: NodeId, then: NodeId, otherwise: Option<ElsePart>) -> Vec<NodeId> {
        let if_part = self.node(Attribute::IfPart, None, &[guard]);
        let then_mode = self.mode_of(then);
        let then_part = self.node(Attribute::ThenPart, Some(then_mode), &[then]);
        let mut parts = vec![if_part, then_part];
        match otherwise {
            Some(ElsePart::Else(serial)) => {
                let mode = self.mode_of(serial);
                parts.push(self.node(Attribute::ElsePart, Some(mode), &[serial]));
            }
            Some(ElsePart::Elif(elif)) => parts.push(elif),
            None => {}
        }
        parts
    }

    pub fn elif(&mut self, guard: NodeId, then: NodeId, otherwise: Option<ElsePart>) -> NodeId {
        let mode = self.mode_of(then);
        let parts = self.conditional_parts(guard, then, otherwise);
        self.node(Attribute::ElifPart, Some(mode), &parts)
    }

    pub fn conditional(&mut self, guard: NodeId, then: NodeId, otherwise: Option<ElsePart>) -> NodeId {
        let mode = self.mode_of(then);
        let parts = self.conditional_parts(guard, then, otherwise);
        self.node(Attribute::ConditionalClause, Some(mode), &parts)
    }

    fn case_parts(&mut self, selector: NodeId, alternatives: &[NodeId], out: Option<OutPart>) -> Vec<NodeId> {
        let case_part = self.node(Attribute::CasePart, None, &[selector]);
        let in_part = self.node(Attribute::InPart, None, alternatives);
        let mut parts = vec![case_part, in_part];
        match out {
            Some(OutPart::Out(serial)) => {
                let mode = self.mode_of(serial);
                parts.push(self.node(Attribute::OutPart, Some(mode), &[serial]));
            }
            Some(OutPart::Ouse(ouse)) => parts.push(ouse),
            None => {}
        }
        parts
    }

    pub fn ouse(&mut self, selector: NodeId, alternatives: &[NodeId], out: Option<OutPart>) -> NodeId {
        let mode = alternatives.first().map(|a| self.mode_of(*a));
        let parts = self.case_parts(selector, alternatives, out);
        self.node(Attribute::OusePart, mode, &parts)
    }

    pub fn case_clause(&mut self, selector: NodeId, alternatives: &[NodeId], out: Option<OutPart>) -> NodeId {
        let mode = alternatives.first().map(|a| self.mode_of(*a));
        let parts = self.case_parts(selector, alternatives, out);
        self.node(Attribute::CaseClause, mode, &parts)
    }

    pub fn loop_clause(&mut self, parts: LoopParts) -> NodeId {
        let void = self.tree.modes.standard().void;
        let mut children = Vec::new();
        if let Some(counter) = parts.counter {
            let name = self.tree.tags[counter].name.clone();
            let for_part = self.node(Attribute::ForPart, None, &[]);
            self.with_symbol(for_part, &name);
            children.push(self.with_tag(for_part, counter));
        }
        for (attribute, unit) in [
            (Attribute::FromPart, parts.from),
            (Attribute::ByPart, parts.by),
            (Attribute::ToPart, parts.to),
            (Attribute::DowntoPart, parts.downto),
            (Attribute::WhilePart, parts.while_part),
        ] {
            if let Some(unit) = unit {
                children.push(self.node(attribute, None, &[unit]));
            }
        }
        if let Some(body) = parts.body {
            children.push(self.node(Attribute::DoPart, None, &[body]));
        }
        if let Some(until) = parts.until {
            children.push(self.node(Attribute::UntilPart, None, &[until]));
        }
        self.node(Attribute::LoopClause, Some(void), &children)
    }

    /// `(params) mode: body`; the body's scope must have been opened by the caller.
    pub fn routine_text(&mut self, mode: ModeId, body: NodeId) -> NodeId {
        let table = self.close_scope();
        let id = self.node(Attribute::RoutineText, Some(mode), &[body]);
        self.tree.nodes[id].table = Some(table);
        id
    }

    /// Wraps `clause` in a particular program and hands out the finished tree.
    pub fn program(mut self, clause: NodeId) -> SyntaxTree {
        let mode = self.mode_of(clause);
        let root = self.node(Attribute::ParticularProgram, Some(mode), &[clause]);
        self.tree.root = Some(root);
        self.tree
    }

    /// Hands out the tree with `root` as its root, without wrapping it.
    pub fn finish(mut self, root: NodeId) -> SyntaxTree {
        self.tree.root = Some(root);
        self.tree
    }
}

/// Operand categories of a builtin call site, for callers that look builtins up by name.
pub fn operand_prims(tree: &SyntaxTree, operands: &[NodeId]) -> Option<Vec<Prim>> {
    operands
        .iter()
        .map(|o| tree.mode(*o).and_then(|m| Prim::of(&tree.modes, m)))
        .collect()
}
