//! Generators turning eligible fragments into C functions.
//!
//! Every generated function has the shape of a propagator: it takes the node it
//! replaces, computes the fragment and leaves the evaluation stack as the
//! interpreter would.
//!
//! ```c
//! /* a + 1 (line 3) */
//! A68_PROP_T _formula_int_12 (A68_NODE_T *p)
//! {
//!   A68_PROP_T self;
//!   A68_INT *a_obj_8;
//!   A68_UNIT (&self) = _formula_int_12;
//!   A68_SOURCE (&self) = p;
//!   a_obj_8 = A68_DEREF (A68_INT, (A68_REF *) A68_FRAME (p, 1, 0));
//!   A68_PUSH_VALUE (p, (V (a_obj_8) + 1), A68_INT);
//!   return (self);
//! }
//! ```
//!
//! Clause generators plan their items first: a unit the inline emitter can take is
//! emitted in place, any other unit is handed to the driver and called by name once
//! compiled. A clause with an item that stays interpreted is declined.

use a68_lang::{Annotation, Attribute, ModeId, ModeKind, NodeId, SyntaxTree, TagId, TagKind, Value};
use smol_str::SmolStr;

use crate::classify::Classifier;
use crate::context::{CompilationContext, Phase, c_identifier, emit};
use crate::driver;
use crate::error::internal_error;
use crate::fold;
use crate::inline::{self, inline_unit};
use crate::options::tier;
use crate::predicates;

/// Generates a function for a node, or declines with `None`.
pub type Generator = fn(&mut CompilationContext, &mut SyntaxTree, NodeId) -> Option<String>;

#[derive(Debug, Clone, Copy)]
pub struct Entry {
    /// Lowest tier at which the generator is tried.
    pub tier: u8,
    pub shape: &'static str,
    pub generate: Generator,
}

/// All generators, in order of decreasing tier.
pub const GENERATORS: &[Entry] = &[
    Entry {
        tier: tier::CLAUSES,
        shape: "serial",
        generate: serial_clause,
    },
    Entry {
        tier: tier::CLAUSES,
        shape: "collateral",
        generate: collateral_clause,
    },
    Entry {
        tier: tier::CLAUSES,
        shape: "conditional",
        generate: conditional_clause,
    },
    Entry {
        tier: tier::CLAUSES,
        shape: "case",
        generate: case_clause,
    },
    Entry {
        tier: tier::CLAUSES,
        shape: "loop",
        generate: loop_clause,
    },
    Entry {
        tier: tier::CLAUSES,
        shape: "call",
        generate: routine_call,
    },
    Entry {
        tier: tier::INDEXING,
        shape: "uniting",
        generate: uniting,
    },
    Entry {
        tier: tier::UNITS,
        shape: "constant",
        generate: constant_unit,
    },
    Entry {
        tier: tier::UNITS,
        shape: "unit",
        generate: basic_unit,
    },
];

/// Tries the generators allowed at the context's tier and returns the first function made.
///
/// A generator that reports a diagnostic abandons the node; no later generator is tried.
pub fn generate(ctx: &mut CompilationContext, tree: &mut SyntaxTree, node: NodeId) -> Option<String> {
    let tier = ctx.tier;
    for entry in GENERATORS.iter().filter(|entry| entry.tier <= tier) {
        let errors = ctx.error_count();
        if let Some(name) = (entry.generate)(ctx, tree, node) {
            return Some(name);
        }
        if ctx.error_count() > errors {
            tracing::debug!(shape = entry.shape, %node, "abandoned after a diagnostic");
            return None;
        }
    }
    None
}

/// Path from the function's node `p` to the `n`th child of the node at `parent`.
pub fn child_path(parent: &str, n: usize) -> String {
    (0..n).fold(format!("A68_SUB ({parent})"), |path, _| format!("A68_NEXT ({path})"))
}

fn function_name(tree: &SyntaxTree, node: NodeId, shape: &str) -> String {
    let mode = tree.mode(node).map_or_else(|| "void".to_string(), |m| tree.modes.c_name(m));
    format!("_{shape}_{mode}_{node}")
}

fn is_void(tree: &SyntaxTree, mode: Option<ModeId>) -> bool {
    mode.is_none_or(|m| matches!(tree.modes.kind(m), ModeKind::Void))
}

/// Writes one function around `body`, which is called once per phase.
///
/// Nothing is written when the declare phase reports a diagnostic, and the function
/// is dropped again when a later phase does.
fn emit_function(
    ctx: &mut CompilationContext,
    tree: &SyntaxTree,
    node: NodeId,
    name: &str,
    mut body: impl FnMut(&mut Emitter<'_, '_>, Phase),
) -> Option<String> {
    let errors = ctx.error_count();
    let mark = ctx.out_mark();
    ctx.begin_function();

    body(&mut Emitter { ctx: &mut *ctx, tree }, Phase::Declare);
    if ctx.error_count() > errors {
        tracing::debug!(name, line = tree.line(node), "declare phase failed");
        return None;
    }
    let source = tree.source_text(node).replace("*/", "* /");
    emit!(ctx, "/* {source} (line {}) */", tree.line(node));
    emit!(ctx, "A68_PROP_T {name} (A68_NODE_T *p)");
    emit!(ctx, "{{");
    ctx.indent();
    emit!(ctx, "A68_PROP_T self;");
    ctx.print_declarations();
    emit!(ctx, "A68_UNIT (&self) = {name};");
    emit!(ctx, "A68_SOURCE (&self) = p;");
    body(&mut Emitter { ctx: &mut *ctx, tree }, Phase::Execute);
    emit!(ctx, "return (self);");
    ctx.outdent();
    emit!(ctx, "}}");
    ctx.blank_line();

    if ctx.error_count() > errors {
        ctx.truncate_out(mark);
        return None;
    }
    tracing::debug!(name, line = tree.line(node), "generated function");
    Some(name.to_string())
}

/// One item of a clause and how it is emitted.
#[derive(Debug, Clone)]
struct Item {
    node: NodeId,
    path: String,
    kind: ItemKind,
}

#[derive(Debug, Clone)]
enum ItemKind {
    /// A basic unit emitted in place.
    Inline,
    /// A unit with its own generated function.
    Call(SmolStr),
    /// A declaration handed to the interpreter.
    Declaration,
    /// `LOC m x [:= basic unit]`, allocated in a nested scope.
    Variable,
}

#[derive(Debug, Clone)]
struct SerialPlan {
    node: NodeId,
    path: String,
    items: Vec<Item>,
    /// The clause opens its own frame.
    frame: bool,
}

impl SerialPlan {
    fn only_declarations(&self) -> bool {
        self.items.iter().all(|item| matches!(item.kind, ItemKind::Declaration))
    }
}

#[derive(Debug, Clone)]
struct ConditionalPlan {
    guard: NodeId,
    then: SerialPlan,
    otherwise: ConditionalTail,
}

#[derive(Debug, Clone)]
enum ConditionalTail {
    Else(SerialPlan),
    Elif(Box<ConditionalPlan>),
    None,
}

#[derive(Debug, Clone)]
struct CasePlan {
    selector: NodeId,
    alternatives: Vec<Item>,
    out: CaseTail,
}

#[derive(Debug, Clone)]
enum CaseTail {
    Out(SerialPlan),
    Ouse(Box<CasePlan>),
    None,
}

#[derive(Debug, Clone)]
struct LoopPlan {
    counter: Option<TagId>,
    from: Option<NodeId>,
    by: Option<NodeId>,
    to: Option<NodeId>,
    downto: bool,
    body: SerialPlan,
    needs_initialisation: bool,
}

fn is_inline_variable(tree: &SyntaxTree, decl: NodeId, tier: u8) -> bool {
    let Some(tag) = tree.tag(decl) else {
        return false;
    };
    let basic_object = tree
        .modes
        .deref(tag.mode)
        .is_some_and(|object| predicates::is_basic_mode_non_row(&tree.modes, object));
    basic_object && tree.sub(decl).is_none_or(|init| Classifier::new(tree).is_basic(init, tier))
}

fn plan_item(ctx: &mut CompilationContext, tree: &mut SyntaxTree, node: NodeId, path: String) -> Option<Item> {
    let tier = ctx.tier;
    let attribute = tree.attribute(node);
    let kind = if attribute == Attribute::VariableDeclaration && is_inline_variable(tree, node, tier) {
        ItemKind::Variable
    } else if attribute.is_declaration() {
        if let Some(sub) = tree.sub(node) {
            driver::drive(ctx, tree, sub);
        }
        ItemKind::Declaration
    } else if Classifier::new(tree).is_basic(node, tier) {
        ItemKind::Inline
    } else {
        driver::drive_unit(ctx, tree, node);
        match tree.annotation(node) {
            Annotation::Compiled(name) => ItemKind::Call(name.clone()),
            _ => return None,
        }
    };
    Some(Item { node, path, kind })
}

fn plan_serial(
    ctx: &mut CompilationContext,
    tree: &mut SyntaxTree,
    serial: NodeId,
    path: String,
    open_frame: bool,
) -> Option<SerialPlan> {
    if !tree.is(serial, Attribute::SerialClause) || Classifier::new(tree).has_labels(serial) {
        return None;
    }
    let nodes = tree.children(serial).collect::<Vec<_>>();
    if nodes.is_empty() {
        return None;
    }
    let mut items = Vec::with_capacity(nodes.len());
    for (n, node) in nodes.into_iter().enumerate() {
        items.push(plan_item(ctx, tree, node, child_path(&path, n))?);
    }
    let frame = open_frame && tree.table(serial).is_some_and(|table| table.needs_initialisation());
    Some(SerialPlan {
        node: serial,
        path,
        items,
        frame,
    })
}

/// The single unit of a basic serial clause, such as a guard or a case selector.
fn single_basic_unit(ctx: &CompilationContext, tree: &SyntaxTree, serial: NodeId, mode: ModeId) -> Option<NodeId> {
    let accepted = tree.mode(serial) == Some(mode) && Classifier::new(tree).is_basic_serial(serial, ctx.tier);
    accepted.then(|| tree.sub(serial)).flatten()
}

fn plan_conditional(
    ctx: &mut CompilationContext,
    tree: &mut SyntaxTree,
    node: NodeId,
    path: &str,
) -> Option<ConditionalPlan> {
    let (Some(if_part), Some(then_part)) = (tree.child(node, 0), tree.child(node, 1)) else {
        internal_error(tree, node, "conditional clause without if and then parts")
    };
    if !tree.is(if_part, Attribute::IfPart) || !tree.is(then_part, Attribute::ThenPart) {
        internal_error(tree, node, "conditional clause parts out of order");
    }
    let Some(guard_serial) = tree.sub(if_part) else {
        internal_error(tree, node, "if part without a guard")
    };
    let bool = tree.modes.standard().bool;
    let guard = single_basic_unit(ctx, tree, guard_serial, bool)?;
    let then_serial = tree.sub(then_part)?;
    let then = plan_serial(ctx, tree, then_serial, format!("A68_SUB ({})", child_path(path, 1)), true)?;
    let otherwise = match tree.child(node, 2) {
        Some(part) if tree.is(part, Attribute::ElsePart) => {
            let serial = tree.sub(part)?;
            ConditionalTail::Else(plan_serial(
                ctx,
                tree,
                serial,
                format!("A68_SUB ({})", child_path(path, 2)),
                true,
            )?)
        }
        Some(part) if tree.is(part, Attribute::ElifPart) => {
            ConditionalTail::Elif(Box::new(plan_conditional(ctx, tree, part, &child_path(path, 2))?))
        }
        Some(_) => internal_error(tree, node, "conditional tail that is neither else nor elif"),
        // Without an else part a value-yielding conditional gives SKIP, which stays interpreted.
        None if !is_void(tree, tree.mode(node)) => return None,
        None => ConditionalTail::None,
    };
    Some(ConditionalPlan { guard, then, otherwise })
}

fn plan_case(ctx: &mut CompilationContext, tree: &mut SyntaxTree, node: NodeId, path: &str) -> Option<CasePlan> {
    let (Some(case_part), Some(in_part)) = (tree.child(node, 0), tree.child(node, 1)) else {
        internal_error(tree, node, "case clause without case and in parts")
    };
    let int = tree.modes.standard().int;
    let selector = single_basic_unit(ctx, tree, tree.sub(case_part)?, int)?;
    let in_path = child_path(path, 1);
    let nodes = tree.children(in_part).collect::<Vec<_>>();
    let mut alternatives = Vec::with_capacity(nodes.len());
    for (n, alternative) in nodes.into_iter().enumerate() {
        let item = plan_item(ctx, tree, alternative, child_path(&in_path, n))?;
        if matches!(item.kind, ItemKind::Declaration | ItemKind::Variable) {
            return None;
        }
        alternatives.push(item);
    }
    let out = match tree.child(node, 2) {
        Some(part) if tree.is(part, Attribute::OutPart) => {
            let serial = tree.sub(part)?;
            CaseTail::Out(plan_serial(
                ctx,
                tree,
                serial,
                format!("A68_SUB ({})", child_path(path, 2)),
                true,
            )?)
        }
        Some(part) if tree.is(part, Attribute::OusePart) => {
            CaseTail::Ouse(Box::new(plan_case(ctx, tree, part, &child_path(path, 2))?))
        }
        Some(_) => internal_error(tree, node, "case tail that is neither out nor ouse"),
        None if !is_void(tree, tree.mode(node)) => return None,
        None => CaseTail::None,
    };
    Some(CasePlan {
        selector,
        alternatives,
        out,
    })
}

fn plan_loop(ctx: &mut CompilationContext, tree: &mut SyntaxTree, node: NodeId) -> Option<LoopPlan> {
    let int = tree.modes.standard().int;
    let mut counter = None;
    let (mut from, mut by, mut to, mut downto) = (None, None, None, false);
    let mut body = None;
    for (n, part) in tree.children(node).enumerate() {
        let unit = tree.sub(part);
        match tree.attribute(part) {
            Attribute::ForPart => counter = tree.node(part).tag,
            Attribute::FromPart => from = unit,
            Attribute::ByPart => by = unit,
            Attribute::ToPart => to = unit,
            Attribute::DowntoPart => {
                to = unit;
                downto = true;
            }
            Attribute::DoPart => body = unit.map(|serial| (serial, n)),
            Attribute::WhilePart | Attribute::UntilPart => return None,
            _ => internal_error(tree, part, "unexpected part in a loop clause"),
        }
    }
    let bounds_basic = [from, by, to].into_iter().flatten().all(|bound| {
        tree.mode(bound) == Some(int) && Classifier::new(tree).is_basic(bound, ctx.tier)
    });
    if !bounds_basic {
        return None;
    }
    let Some((serial, n)) = body else {
        internal_error(tree, node, "loop clause without a do part")
    };
    let needs_initialisation = tree.table(serial).is_some_and(|table| table.needs_initialisation());
    let body = plan_serial(ctx, tree, serial, format!("A68_SUB ({})", child_path("p", n)), false)?;
    Some(LoopPlan {
        counter,
        from,
        by,
        to,
        downto,
        body,
        needs_initialisation,
    })
}

/// Emission of planned items into the current function.
struct Emitter<'c, 't> {
    ctx: &'c mut CompilationContext,
    tree: &'t SyntaxTree,
}

impl Emitter<'_, '_> {
    fn mode(&self, node: NodeId) -> Option<ModeId> {
        self.tree.mode(node)
    }

    /// Emits a basic unit and, when `push` is set and it has a value, pushes it.
    fn inline_value(&mut self, node: NodeId, phase: Phase, push: bool) {
        inline_unit(self.ctx, self.tree, node, phase);
        if phase != Phase::Execute || !push {
            return;
        }
        if let Some(mode) = self.mode(node).filter(|m| !is_void(self.tree, Some(*m))) {
            let value = inline_unit(self.ctx, self.tree, node, Phase::Yield);
            let statement = inline::push_statement(&self.tree.modes, mode, &value);
            emit!(self.ctx, "{statement}");
        }
    }

    fn item(&mut self, item: &Item, last: bool, phase: Phase) {
        match (&item.kind, phase) {
            (ItemKind::Inline, _) => self.inline_value(item.node, phase, last),
            (ItemKind::Call(name), Phase::Execute) => emit!(self.ctx, "{name} ({});", item.path),
            (ItemKind::Declaration, Phase::Execute) => emit!(self.ctx, "a68_genie_declaration ({});", item.path),
            (ItemKind::Variable, _) => self.variable(item, phase),
            _ => {}
        }
    }

    fn variable(&mut self, item: &Item, phase: Phase) {
        let tree = self.tree;
        let init = tree.sub(item.node);
        if phase == Phase::Declare {
            if let Some(init) = init {
                inline_unit(self.ctx, tree, init, Phase::Declare);
            }
            return;
        }
        if phase != Phase::Execute {
            return;
        }
        let Some(tag) = tree.tag(item.node) else {
            internal_error(tree, item.node, "variable declaration without a tag")
        };
        let Some(object) = tree.modes.deref(tag.mode) else {
            internal_error(tree, item.node, "variable of a mode that is not a reference")
        };
        let reference = format!("{}_ref_{}", c_identifier(&tag.name), item.node);
        emit!(self.ctx, "{{");
        self.ctx.indent();
        emit!(
            self.ctx,
            "A68_REF *{reference} = (A68_REF *) {};",
            inline::frame_slot(tag)
        );
        emit!(
            self.ctx,
            "A68_LOCAL_GENERATOR ({}, {reference}, {});",
            item.path,
            tree.modes.size(object)
        );
        if let Some(init) = init {
            inline_unit(self.ctx, tree, init, Phase::Execute);
            let value = inline_unit(self.ctx, tree, init, Phase::Yield);
            let class = inline::object_class(&tree.modes, object);
            let target = format!("A68_DEREF ({class}, {reference})");
            let statement = inline::store_statement(&tree.modes, object, &target, &value);
            emit!(self.ctx, "{statement}");
        }
        self.ctx.outdent();
        emit!(self.ctx, "}}");
    }

    fn serial(&mut self, plan: &SerialPlan, phase: Phase) {
        let pop_sp = format!("pop_sp_{}", plan.node);
        let pop_fp = format!("pop_fp_{}", plan.node);
        if phase == Phase::Declare {
            self.ctx.declarations.add("ADDR_T", &pop_sp);
            if plan.frame {
                self.ctx.declarations.add("ADDR_T", &pop_fp);
            }
            for item in &plan.items {
                self.item(item, false, Phase::Declare);
            }
            return;
        }
        if plan.frame {
            emit!(self.ctx, "{pop_fp} = A68_FP;");
            emit!(self.ctx, "A68_OPEN_STATIC_FRAME ({});", plan.path);
            emit!(self.ctx, "A68_INIT_STATIC_FRAME ({});", plan.path);
        }
        emit!(self.ctx, "{pop_sp} = A68_SP;");
        let count = plan.items.len();
        for (n, item) in plan.items.iter().enumerate() {
            let last = n + 1 == count;
            let mark = self.ctx.booking.mark();
            self.item(item, last, Phase::Execute);
            if !last {
                emit!(self.ctx, "A68_SP = {pop_sp};");
            }
            self.ctx.booking.truncate(mark);
        }
        if plan.frame {
            emit!(self.ctx, "A68_CLOSE_FRAME ({pop_fp});");
        }
    }

    /// Emits a branch body between braces the caller wrote; its bookings do not leak.
    fn branch(&mut self, body: impl FnOnce(&mut Self)) {
        let mark = self.ctx.booking.mark();
        self.ctx.indent();
        body(self);
        self.ctx.outdent();
        self.ctx.booking.truncate(mark);
    }

    fn conditional(&mut self, plan: &ConditionalPlan, phase: Phase) {
        if phase == Phase::Declare {
            inline_unit(self.ctx, self.tree, plan.guard, Phase::Declare);
            self.serial(&plan.then, Phase::Declare);
            match &plan.otherwise {
                ConditionalTail::Else(serial) => self.serial(serial, Phase::Declare),
                ConditionalTail::Elif(elif) => self.conditional(elif, Phase::Declare),
                ConditionalTail::None => {}
            }
            return;
        }
        inline_unit(self.ctx, self.tree, plan.guard, Phase::Execute);
        let guard = inline_unit(self.ctx, self.tree, plan.guard, Phase::Yield);
        emit!(self.ctx, "if ({guard}) {{");
        self.branch(|e| e.serial(&plan.then, Phase::Execute));
        match &plan.otherwise {
            ConditionalTail::Else(serial) => {
                emit!(self.ctx, "}} else {{");
                self.branch(|e| e.serial(serial, Phase::Execute));
            }
            ConditionalTail::Elif(elif) => {
                emit!(self.ctx, "}} else {{");
                self.branch(|e| e.conditional(elif, Phase::Execute));
            }
            ConditionalTail::None => {}
        }
        emit!(self.ctx, "}}");
    }

    fn case(&mut self, plan: &CasePlan, phase: Phase) {
        if phase == Phase::Declare {
            inline_unit(self.ctx, self.tree, plan.selector, Phase::Declare);
            for alternative in &plan.alternatives {
                self.item(alternative, true, Phase::Declare);
            }
            match &plan.out {
                CaseTail::Out(serial) => self.serial(serial, Phase::Declare),
                CaseTail::Ouse(ouse) => self.case(ouse, Phase::Declare),
                CaseTail::None => {}
            }
            return;
        }
        inline_unit(self.ctx, self.tree, plan.selector, Phase::Execute);
        let selector = inline_unit(self.ctx, self.tree, plan.selector, Phase::Yield);
        emit!(self.ctx, "switch ({selector}) {{");
        for (n, alternative) in plan.alternatives.iter().enumerate() {
            emit!(self.ctx, "case {}: {{", n + 1);
            self.branch(|e| {
                e.item(alternative, true, Phase::Execute);
                emit!(e.ctx, "break;");
            });
            emit!(self.ctx, "}}");
        }
        emit!(self.ctx, "default: {{");
        self.branch(|e| {
            match &plan.out {
                CaseTail::Out(serial) => e.serial(serial, Phase::Execute),
                CaseTail::Ouse(ouse) => e.case(ouse, Phase::Execute),
                CaseTail::None => {}
            }
            emit!(e.ctx, "break;");
        });
        emit!(self.ctx, "}}");
        emit!(self.ctx, "}}");
    }

    fn for_loop(&mut self, node: NodeId, plan: &LoopPlan, phase: Phase) {
        let tree = self.tree;
        let [from, by, to, count, pop_sp, pop_fp] =
            ["from", "by", "to", "count", "pop_sp", "pop_fp"].map(|prefix| format!("{prefix}_{node}"));
        let counter = plan.counter.map(|id| {
            let tag = &tree.tags[id];
            (format!("{}_counter_{node}", c_identifier(&tag.name)), tag)
        });
        let frame = plan.counter.is_some() || plan.needs_initialisation;
        let bounds = [plan.from, plan.by, plan.to].into_iter().flatten().collect::<Vec<_>>();

        if phase == Phase::Declare {
            for bound in &bounds {
                inline_unit(self.ctx, tree, *bound, Phase::Declare);
            }
            for scalar in [&from, &by, &to, &count] {
                self.ctx.declarations.add("INT_T", scalar);
            }
            self.ctx.declarations.add("ADDR_T", &pop_sp);
            if frame {
                self.ctx.declarations.add("ADDR_T", &pop_fp);
            }
            if let Some((name, _)) = &counter {
                self.ctx.declarations.add("A68_INT", &format!("*{name}"));
            }
            self.serial(&plan.body, Phase::Declare);
            return;
        }

        for bound in &bounds {
            inline_unit(self.ctx, tree, *bound, Phase::Execute);
        }
        let bound = |unit: Option<NodeId>, e: &mut Self| match unit {
            Some(unit) => inline_unit(e.ctx, tree, unit, Phase::Yield),
            None => "1".to_string(),
        };
        let start = bound(plan.from, self);
        let step = bound(plan.by, self);
        emit!(self.ctx, "{from} = {start};");
        emit!(self.ctx, "{by} = {step};");
        let condition = match plan.to {
            Some(limit) => {
                let limit = bound(Some(limit), self);
                emit!(self.ctx, "{to} = {limit};");
                let (up, down) = if plan.downto { (">=", "<=") } else { ("<=", ">=") };
                format!("({by} >= 0 ? {count} {up} {to} : {count} {down} {to})")
            }
            None => "A68_TRUE".to_string(),
        };
        let advance = if plan.downto { "-=" } else { "+=" };
        if frame {
            emit!(self.ctx, "{pop_fp} = A68_FP;");
            emit!(self.ctx, "A68_OPEN_STATIC_FRAME ({});", plan.body.path);
            emit!(self.ctx, "A68_INIT_STATIC_FRAME ({});", plan.body.path);
        }
        if let Some((name, tag)) = &counter {
            emit!(self.ctx, "{name} = (A68_INT *) {};", inline::frame_slot(tag));
        }
        emit!(self.ctx, "{pop_sp} = A68_SP;");
        emit!(
            self.ctx,
            "for ({count} = {from}; {condition}; {count} {advance} {by}) {{"
        );
        self.branch(|e| {
            if let Some((name, _)) = &counter {
                emit!(e.ctx, "V ({name}) = {count};");
            }
            e.serial(&plan.body, Phase::Execute);
            emit!(e.ctx, "A68_SP = {pop_sp};");
            if plan.needs_initialisation {
                emit!(e.ctx, "A68_INIT_STATIC_FRAME ({});", plan.body.path);
            }
        });
        emit!(self.ctx, "}}");
        if frame {
            emit!(self.ctx, "A68_CLOSE_FRAME ({pop_fp});");
        }
    }
}

/// A closed or serial clause.
fn serial_clause(ctx: &mut CompilationContext, tree: &mut SyntaxTree, node: NodeId) -> Option<String> {
    let (serial, path) = match tree.attribute(node) {
        Attribute::ClosedClause => (tree.sub(node)?, "A68_SUB (p)".to_string()),
        Attribute::SerialClause => (node, "p".to_string()),
        _ => return None,
    };
    let plan = plan_serial(ctx, tree, serial, path, true)?;
    if plan.only_declarations() {
        return None;
    }
    let name = function_name(tree, node, tree.attribute(node).short_name());
    emit_function(ctx, tree, node, &name, |e, phase| e.serial(&plan, phase))
}

/// A structure display of basic members, or a void collateral clause of statements.
fn collateral_clause(ctx: &mut CompilationContext, tree: &mut SyntaxTree, node: NodeId) -> Option<String> {
    if !tree.is(node, Attribute::CollateralClause) {
        return None;
    }
    let mode = tree.mode(node)?;
    let name = function_name(tree, node, "collateral");
    let members = tree.children(node).collect::<Vec<_>>();

    if predicates::is_basic_struct(&tree.modes, mode) {
        let tier = ctx.tier;
        let basic = members.iter().all(|m| Classifier::new(tree).is_basic(*m, tier));
        if !basic || members.is_empty() {
            return None;
        }
        return emit_function(ctx, tree, node, &name, |e, phase| {
            for member in &members {
                e.inline_value(*member, phase, true);
            }
        });
    }

    if !is_void(tree, Some(mode)) || members.is_empty() {
        return None;
    }
    let mut items = Vec::with_capacity(members.len());
    for (n, member) in members.into_iter().enumerate() {
        let item = plan_item(ctx, tree, member, child_path("p", n))?;
        if matches!(item.kind, ItemKind::Declaration | ItemKind::Variable) {
            return None;
        }
        items.push(item);
    }
    let plan = SerialPlan {
        node,
        path: "p".to_string(),
        items,
        frame: false,
    };
    emit_function(ctx, tree, node, &name, |e, phase| e.serial(&plan, phase))
}

fn conditional_clause(ctx: &mut CompilationContext, tree: &mut SyntaxTree, node: NodeId) -> Option<String> {
    if !tree.is(node, Attribute::ConditionalClause) {
        return None;
    }
    let name = function_name(tree, node, "conditional");
    if Classifier::new(tree).is_basic_conditional(node, ctx.tier) {
        return emit_function(ctx, tree, node, &name, |e, phase| e.inline_value(node, phase, true));
    }
    let plan = plan_conditional(ctx, tree, node, "p")?;
    emit_function(ctx, tree, node, &name, |e, phase| e.conditional(&plan, phase))
}

/// An integer case clause as a C `switch`.
fn case_clause(ctx: &mut CompilationContext, tree: &mut SyntaxTree, node: NodeId) -> Option<String> {
    if !tree.is(node, Attribute::CaseClause) || !Classifier::new(tree).is_basic_case(node, ctx.tier) {
        return None;
    }
    let plan = plan_case(ctx, tree, node, "p")?;
    let name = function_name(tree, node, "case");
    emit_function(ctx, tree, node, &name, |e, phase| e.case(&plan, phase))
}

/// A counting loop; loops with a while or until part stay interpreted.
fn loop_clause(ctx: &mut CompilationContext, tree: &mut SyntaxTree, node: NodeId) -> Option<String> {
    if !tree.is(node, Attribute::LoopClause) {
        return None;
    }
    let plan = plan_loop(ctx, tree, node)?;
    let name = function_name(tree, node, "loop");
    emit_function(ctx, tree, node, &name, |e, phase| e.for_loop(node, &plan, phase))
}

/// A call of a user procedure with basic arguments, through the interpreter's frame protocol.
fn routine_call(ctx: &mut CompilationContext, tree: &mut SyntaxTree, node: NodeId) -> Option<String> {
    if !tree.is(node, Attribute::Call) {
        return None;
    }
    let callee = tree.sub(node)?;
    let tag = tree.tag(callee)?;
    if tag.kind != TagKind::Procedure {
        return None;
    }
    let routine = tag.body?;
    let level = tag.level;
    let body = tree.sub(routine)?;
    let ModeKind::Proc { params, .. } = tree.modes.kind(tag.mode) else {
        return None;
    };
    let params = params.clone();
    let args = tree.children(node).skip(1).collect::<Vec<_>>();
    let tier = ctx.tier;
    let basic_args = args.len() == params.len()
        && args.iter().zip(&params).all(|(arg, param)| {
            tree.mode(*arg) == Some(*param)
                && predicates::is_basic_mode_non_row(&tree.modes, *param)
                && Classifier::new(tree).is_basic(*arg, tier)
        });
    if !basic_args {
        return None;
    }

    let name = function_name(tree, node, "call");
    let [pop_sp, pop_fp] = ["pop_sp", "pop_fp"].map(|prefix| format!("{prefix}_{node}"));
    emit_function(ctx, tree, node, &name, |e, phase| {
        for arg in &args {
            inline_unit(e.ctx, e.tree, *arg, phase);
        }
        match phase {
            Phase::Declare => {
                e.ctx.declarations.add("ADDR_T", &pop_sp);
                e.ctx.declarations.add("ADDR_T", &pop_fp);
            }
            Phase::Execute => {
                emit!(e.ctx, "{pop_sp} = A68_SP;");
                for (arg, param) in args.iter().zip(&params) {
                    let value = inline_unit(e.ctx, e.tree, *arg, Phase::Yield);
                    let statement = inline::push_statement(&e.tree.modes, *param, &value);
                    emit!(e.ctx, "{statement}");
                }
                emit!(e.ctx, "{pop_fp} = A68_FP;");
                emit!(e.ctx, "A68_OPEN_PROC_FRAME (A68_NODE ({routine}), {level});");
                emit!(e.ctx, "A68_BIND_ARGUMENTS (A68_NODE ({routine}), {pop_sp});");
                emit!(e.ctx, "A68_SP = {pop_sp};");
                emit!(e.ctx, "A68_EXECUTE_UNIT (A68_NODE ({body}));");
                emit!(e.ctx, "A68_CLOSE_FRAME ({pop_fp});");
            }
            Phase::Yield => {}
        }
    })
}

/// Injection of a basic value into a united mode.
fn uniting(ctx: &mut CompilationContext, tree: &mut SyntaxTree, node: NodeId) -> Option<String> {
    if !tree.is(node, Attribute::Uniting) {
        return None;
    }
    let union = tree.mode(node)?;
    let operand = tree.sub(node)?;
    let operand_mode = tree.mode(operand)?;
    let ModeKind::Union(alternatives) = tree.modes.kind(union) else {
        return None;
    };
    let alternative = alternatives.iter().position(|m| *m == operand_mode)?;
    if !Classifier::new(tree).is_basic(operand, ctx.tier) {
        return None;
    }
    let padding = tree
        .modes
        .size(union)
        .saturating_sub(8 + tree.modes.size(operand_mode));
    let name = function_name(tree, node, "uniting");
    emit_function(ctx, tree, node, &name, |e, phase| {
        inline_unit(e.ctx, e.tree, operand, phase);
        if phase == Phase::Execute {
            emit!(e.ctx, "A68_PUSH_UNION (p, {alternative});");
            let value = inline_unit(e.ctx, e.tree, operand, Phase::Yield);
            let statement = inline::push_statement(&e.tree.modes, operand_mode, &value);
            emit!(e.ctx, "{statement}");
            if padding > 0 {
                emit!(e.ctx, "A68_INCREMENT_STACK_POINTER (p, {padding});");
            }
        }
    })
}

/// Part of a generated name identifying a folded value.
fn value_key(value: &Value) -> String {
    match value {
        Value::Int(i) if *i < 0 => format!("m{}", i.unsigned_abs()),
        Value::Int(i) => i.to_string(),
        Value::Real(r) => format!("{:016x}", r.to_bits()),
        Value::Bool(b) => b.to_string(),
        Value::Char(c) => format!("{c:02x}"),
        Value::Bits(b) => format!("{b:x}"),
        Value::Complex(re, im) => format!("{:016x}_{:016x}", re.to_bits(), im.to_bits()),
    }
}

/// A denotation or folded identifier; equal values share one function.
fn constant_unit(ctx: &mut CompilationContext, tree: &mut SyntaxTree, node: NodeId) -> Option<String> {
    let attribute = tree.attribute(node);
    if !matches!(attribute, Attribute::Denotation | Attribute::Identifier) {
        return None;
    }
    let mode = tree.mode(node)?;
    if !predicates::is_foldable_mode(&tree.modes, mode) || !Classifier::new(tree).is_constant(node) {
        return None;
    }
    let constant = fold::fold_unit(ctx, tree, node)?;
    let name = format!(
        "_{}_{}_{}",
        attribute.short_name(),
        tree.modes.c_name(mode),
        value_key(&constant.value)
    );
    if !ctx.unique.insert(&name) {
        return Some(name);
    }
    let statement = inline::push_statement(&tree.modes, mode, &constant.literal);
    emit_function(ctx, tree, node, &name, |e, phase| {
        if phase == Phase::Execute {
            emit!(e.ctx, "{statement}");
        }
    })
}

/// Any other basic unit, emitted inline and its value pushed.
fn basic_unit(ctx: &mut CompilationContext, tree: &mut SyntaxTree, node: NodeId) -> Option<String> {
    if !Classifier::new(tree).is_basic(node, ctx.tier) {
        return None;
    }
    let name = function_name(tree, node, tree.attribute(node).short_name());
    emit_function(ctx, tree, node, &name, |e, phase| e.inline_value(node, phase, true))
}
