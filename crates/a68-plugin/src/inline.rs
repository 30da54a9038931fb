//! Inline emission of basic units.
//!
//! Every caller emits an expression in three passes over the same node:
//! [`Phase::Declare`] registers temporaries, [`Phase::Execute`] writes the
//! statements computing them, and [`Phase::Yield`] returns a side-effect free C
//! expression for the value. Addresses of identifiers, slices and selections are
//! kept in pointer temporaries booked in the context, so an identical
//! subexpression inside one function is computed once.

use a68_lang::{Attribute, Builtin, ModeId, ModeKind, ModeTable, NodeId, Rendering, SyntaxTree, Tag, TagId};
use itertools::Itertools;

use crate::classify::Classifier;
use crate::context::{Action, CompilationContext, Payload, Phase, c_identifier, emit};
use crate::error::internal_error;
use crate::fold;
use crate::predicates;

/// Emits one phase of `node` and returns the yielded expression, or an empty string
/// for the declare and execute phases.
pub fn inline_unit(ctx: &mut CompilationContext, tree: &SyntaxTree, node: NodeId, phase: Phase) -> String {
    Inline { ctx, tree }.unit(node, phase)
}

/// C type of the object a value of `mode` occupies.
pub(crate) fn object_class(modes: &ModeTable, mode: ModeId) -> &'static str {
    match modes.kind(mode) {
        ModeKind::Row { .. } => "A68_ROW",
        ModeKind::Struct(_) if predicates::is_complex(modes, mode) => "A68_REAL",
        ModeKind::Struct(_) => "BYTE_T",
        _ => modes.storage_class(mode).unwrap_or("BYTE_T"),
    }
}

/// The value behind a pointer temporary to an object of `mode`.
pub(crate) fn value_of(modes: &ModeTable, mode: ModeId, pointer: &str) -> String {
    match modes.kind(mode) {
        ModeKind::Ref(_) => format!("*{pointer}"),
        _ if predicates::is_primitive(modes, mode) => format!("V ({pointer})"),
        _ => pointer.to_string(),
    }
}

/// Statement pushing `expr`, a value of `mode`, onto the evaluation stack.
pub(crate) fn push_statement(modes: &ModeTable, mode: ModeId, expr: &str) -> String {
    match modes.kind(mode) {
        ModeKind::Ref(_) => format!("A68_PUSH_REF (p, {expr});"),
        _ if predicates::is_complex(modes, mode) => format!("A68_PUSH_COMPLEX (p, {expr});"),
        ModeKind::Struct(_) => format!("A68_PUSH_STRUCT (p, {expr}, {});", modes.size(mode)),
        _ => format!(
            "A68_PUSH_VALUE (p, {expr}, {});",
            modes.storage_class(mode).unwrap_or("A68_INT")
        ),
    }
}

/// Statement storing `value` into the object `pointer` refers to.
pub(crate) fn store_statement(modes: &ModeTable, mode: ModeId, pointer: &str, value: &str) -> String {
    if predicates::is_complex(modes, mode) {
        format!("A68_COPY_COMPLEX ({pointer}, {value});")
    } else if predicates::is_primitive(modes, mode) {
        format!("V ({pointer}) = {value};")
    } else {
        format!("A68_COPY ({pointer}, {value}, {});", modes.size(mode))
    }
}

/// Byte offset of the `index`th field of a structure.
fn field_offset(modes: &ModeTable, structure: ModeId, index: usize) -> usize {
    match modes.kind(structure) {
        ModeKind::Struct(fields) => fields.iter().take(index).map(|f| modes.size(f.mode)).sum(),
        _ => 0,
    }
}

pub(crate) fn frame_slot(tag: &Tag) -> String {
    format!("A68_FRAME (p, {}, {})", tag.level, tag.offset)
}

/// Booking key of an identifier; the tag id keeps equally named identifiers apart.
fn tag_key(id: TagId, tag: &Tag) -> String {
    format!("{}#{id}", tag.name)
}

fn temp_name(prefix: &str, owner: NodeId) -> String {
    format!("{prefix}_{owner}")
}

struct Inline<'c, 't> {
    ctx: &'c mut CompilationContext,
    tree: &'t SyntaxTree,
}

impl<'t> Inline<'_, 't> {
    fn modes(&self) -> &'t ModeTable {
        &self.tree.modes
    }

    fn mode(&self, node: NodeId) -> ModeId {
        match self.tree.mode(node) {
            Some(mode) => mode,
            None => internal_error(self.tree, node, "unit without a mode"),
        }
    }

    fn tag(&self, node: NodeId) -> (TagId, &'t Tag) {
        let tree = self.tree;
        match tree.node(node).tag {
            Some(id) => (id, &tree.tags[id]),
            None => internal_error(self.tree, node, "identifier without a tag"),
        }
    }

    fn child(&self, node: NodeId, n: usize) -> NodeId {
        match self.tree.child(node, n) {
            Some(child) => child,
            None => internal_error(self.tree, node, "missing child"),
        }
    }

    fn unit(&mut self, node: NodeId, phase: Phase) -> String {
        let tree = self.tree;
        let attribute = tree.attribute(node);
        let foldable = !matches!(
            attribute,
            Attribute::Denotation | Attribute::Voiding | Attribute::Assignation | Attribute::Nihil
        );
        if foldable && Classifier::new(tree).is_constant(node) {
            return self.constant(node, phase);
        }

        match attribute {
            Attribute::Denotation => self.constant(node, phase),
            Attribute::Identifier => {
                let pointer = self.fetch(node, phase);
                self.yielded(phase, || value_of(&tree.modes, self.mode(node), &pointer))
            }
            Attribute::Dereferencing => self.dereferencing(node, phase),
            Attribute::Slice | Attribute::Selection => {
                let pointer = self.address(node, phase);
                let mode = self.mode(node);
                self.yielded(phase, || match tree.modes.deref(mode) {
                    Some(_) => format!("A68_MAKE_REF (p, {pointer})"),
                    None => value_of(&tree.modes, mode, &pointer),
                })
            }
            Attribute::Formula | Attribute::MonadicFormula | Attribute::Call => self.operation(node, phase),
            Attribute::Deproceduring => self.deproceduring(node, phase),
            Attribute::Cast | Attribute::ClosedClause | Attribute::SerialClause => {
                let only = self.child(node, 0);
                self.unit(only, phase)
            }
            Attribute::Widening => self.widening(node, phase),
            Attribute::IdentityRelation => self.identity_relation(node, phase),
            Attribute::Nihil => self.yielded(phase, || "A68_NIL".to_string()),
            Attribute::ConditionalClause | Attribute::ElifPart => self.conditional(node, phase),
            Attribute::CollateralClause => self.collateral(node, phase),
            Attribute::Assignation => self.assignation(node, phase),
            Attribute::Voiding => {
                let operand = self.child(node, 0);
                self.unit(operand, phase);
                String::new()
            }
            _ => internal_error(tree, node, "inline emission of a unit that is not basic"),
        }
    }

    fn yielded(&self, phase: Phase, expr: impl FnOnce() -> String) -> String {
        if phase == Phase::Yield { expr() } else { String::new() }
    }

    /// Folds in the declare phase so a failure is counted once, before any code is written.
    fn constant(&mut self, node: NodeId, phase: Phase) -> String {
        match phase {
            Phase::Declare => {
                if !self.ctx.folded.contains_key(&node) {
                    let literal = fold::fold_unit(self.ctx, self.tree, node).map(|constant| constant.literal);
                    self.ctx.folded.insert(node, literal);
                }
                String::new()
            }
            Phase::Execute => String::new(),
            Phase::Yield => match self.ctx.folded.get(&node) {
                Some(Some(literal)) => literal.clone(),
                Some(None) => internal_error(self.tree, node, "yield of a constant whose fold failed"),
                None => internal_error(self.tree, node, "yield of a constant before its declare phase"),
            },
        }
    }

    /// Declares a pointer temporary for `action` unless an equal one is booked.
    fn book_declare(&mut self, action: Action, key: &str, payload: Option<Payload>, node: NodeId, class: &str, prefix: &str) {
        if self
            .ctx
            .booking
            .signed_in(self.tree, action, Phase::Declare, key, payload.as_ref())
            .is_none()
        {
            self.ctx.declarations.add(class, &format!("*{}", temp_name(prefix, node)));
            self.ctx.booking.sign_in(action, Phase::Declare, key, payload, node);
        }
    }

    /// The node owning the temporary for `action`, or `None` when it is computed already.
    fn pending_execute(&self, action: Action, key: &str, payload: Option<&Payload>, node: NodeId) -> Option<NodeId> {
        if self
            .ctx
            .booking
            .signed_in(self.tree, action, Phase::Execute, key, payload)
            .is_some()
        {
            return None;
        }
        Some(self.owner(action, key, payload, node))
    }

    fn owner(&self, action: Action, key: &str, payload: Option<&Payload>, node: NodeId) -> NodeId {
        self.ctx
            .booking
            .signed_in(self.tree, action, Phase::Declare, key, payload)
            .map(|booking| booking.node)
            .unwrap_or(node)
    }

    /// Pointer to an identifier's frame slot.
    fn fetch(&mut self, ident: NodeId, phase: Phase) -> String {
        let (id, tag) = self.tag(ident);
        let key = tag_key(id, tag);
        let prefix = c_identifier(&tag.name);
        let class = object_class(self.modes(), tag.mode);
        match phase {
            Phase::Declare => {
                self.book_declare(Action::Fetch, &key, None, ident, class, &prefix);
                String::new()
            }
            Phase::Execute => {
                if let Some(owner) = self.pending_execute(Action::Fetch, &key, None, ident) {
                    let slot = frame_slot(tag);
                    emit!(self.ctx, "{} = ({class} *) {slot};", temp_name(&prefix, owner));
                    self.ctx.booking.sign_in(Action::Fetch, Phase::Execute, &key, None, owner);
                }
                String::new()
            }
            Phase::Yield => temp_name(&prefix, self.owner(Action::Fetch, &key, None, ident)),
        }
    }

    /// Pointer to the object a reference identifier refers to.
    fn deref_identifier(&mut self, ident: NodeId, phase: Phase) -> String {
        let (id, tag) = self.tag(ident);
        let key = tag_key(id, tag);
        let prefix = format!("{}_obj", c_identifier(&tag.name));
        let Some(object) = self.modes().deref(tag.mode) else {
            internal_error(self.tree, ident, "dereferencing an identifier that is not a reference")
        };
        let class = object_class(self.modes(), object);
        match phase {
            Phase::Declare => {
                self.book_declare(Action::Deref, &key, None, ident, class, &prefix);
                String::new()
            }
            Phase::Execute => {
                if let Some(owner) = self.pending_execute(Action::Deref, &key, None, ident) {
                    let temp = temp_name(&prefix, owner);
                    let slot = frame_slot(tag);
                    emit!(self.ctx, "{temp} = A68_DEREF ({class}, (A68_REF *) {slot});");
                    self.check_initialised(&temp, object);
                    self.ctx.booking.sign_in(Action::Deref, Phase::Execute, &key, None, owner);
                }
                String::new()
            }
            Phase::Yield => temp_name(&prefix, self.owner(Action::Deref, &key, None, ident)),
        }
    }

    /// Checked builds refuse to read a primitive object that was never assigned.
    fn check_initialised(&mut self, pointer: &str, mode: ModeId) {
        if self.ctx.checked() && predicates::is_primitive(self.modes(), mode) {
            let mode_name = self.modes().name(mode);
            emit!(self.ctx, "A68_CHECK_INIT (p, {pointer}, \"{mode_name}\");");
        }
    }

    fn dereferencing(&mut self, node: NodeId, phase: Phase) -> String {
        let operand = self.child(node, 0);
        let mode = self.mode(node);
        let pointer = match self.tree.attribute(operand) {
            Attribute::Identifier => self.deref_identifier(operand, phase),
            Attribute::Slice | Attribute::Selection => {
                let pointer = self.address(operand, phase);
                if phase == Phase::Execute {
                    let element = self.address(operand, Phase::Yield);
                    self.check_initialised(&element, mode);
                }
                pointer
            }
            _ => internal_error(self.tree, node, "dereferencing of an unsupported primary"),
        };
        self.yielded(phase, || value_of(&self.tree.modes, mode, &pointer))
    }

    /// Pointer to the object a slice, selection or reference identifier designates.
    fn address(&mut self, node: NodeId, phase: Phase) -> String {
        match self.tree.attribute(node) {
            Attribute::Identifier => self.deref_identifier(node, phase),
            Attribute::Slice => self.slice(node, phase),
            Attribute::Selection => self.selection(node, phase),
            _ => internal_error(self.tree, node, "address of a unit that designates no object"),
        }
    }

    /// Pointer to the base object of a row or struct identifier, through its reference if any.
    fn base(&mut self, ident: NodeId, phase: Phase) -> String {
        let mode = self.mode(ident);
        if predicates::is_ref(self.modes(), mode) {
            self.deref_identifier(ident, phase)
        } else {
            self.fetch(ident, phase)
        }
    }

    fn slice(&mut self, node: NodeId, phase: Phase) -> String {
        let tree = self.tree;
        let primary = self.child(node, 0);
        let indexer = self.child(node, 1);
        let (id, tag) = self.tag(primary);
        let key = tag_key(id, tag);
        let prefix = format!("{}_elem", c_identifier(&tag.name));
        let Some(element) = tree.modes.row_element(tag.mode) else {
            internal_error(tree, node, "slice of a primary that is not a row")
        };
        let class = object_class(&tree.modes, element);
        let payload = Payload::new(tree, indexer);
        let indices = tree.children(indexer).collect::<Vec<_>>();

        match phase {
            Phase::Declare => {
                self.base(primary, Phase::Declare);
                for index in &indices {
                    self.unit(*index, Phase::Declare);
                }
                self.book_declare(Action::Slice, &key, Some(payload), node, class, &prefix);
                String::new()
            }
            Phase::Execute => {
                if let Some(owner) = self.pending_execute(Action::Slice, &key, Some(&payload), node) {
                    self.base(primary, Phase::Execute);
                    for index in &indices {
                        self.unit(*index, Phase::Execute);
                    }
                    let row = self.base(primary, Phase::Yield);
                    let subscripts = indices.iter().map(|i| self.unit(*i, Phase::Yield)).join(", ");
                    emit!(
                        self.ctx,
                        "{} = ({class} *) A68_ROW_ELEMENT (p, {row}, {}, {subscripts});",
                        temp_name(&prefix, owner),
                        indices.len()
                    );
                    self.ctx.booking.sign_in(Action::Slice, Phase::Execute, &key, Some(payload), owner);
                }
                String::new()
            }
            Phase::Yield => temp_name(&prefix, self.owner(Action::Slice, &key, Some(&payload), node)),
        }
    }

    fn selection(&mut self, node: NodeId, phase: Phase) -> String {
        let tree = self.tree;
        let selector = self.child(node, 0);
        let secondary = self.child(node, 1);
        let (id, tag) = self.tag(secondary);
        let key = tag_key(id, tag);
        let field_name = tree.symbol(selector);
        let prefix = format!("{}_{}", c_identifier(&tag.name), c_identifier(field_name));
        let structure = tree.modes.deref(tag.mode).unwrap_or(tag.mode);
        let Some((index, field_mode)) = tree.modes.field(structure, field_name) else {
            internal_error(tree, node, "selection of a field the structure lacks")
        };
        let class = object_class(&tree.modes, field_mode);
        let payload = Payload::new(tree, selector);

        match phase {
            Phase::Declare => {
                self.base(secondary, Phase::Declare);
                self.book_declare(Action::Selection, &key, Some(payload), node, class, &prefix);
                String::new()
            }
            Phase::Execute => {
                if let Some(owner) = self.pending_execute(Action::Selection, &key, Some(&payload), node) {
                    self.base(secondary, Phase::Execute);
                    let base = self.base(secondary, Phase::Yield);
                    let temp = temp_name(&prefix, owner);
                    if predicates::is_complex(&tree.modes, structure) {
                        emit!(self.ctx, "{temp} = &{base}[{index}];");
                    } else {
                        let offset = field_offset(&tree.modes, structure, index);
                        emit!(self.ctx, "{temp} = ({class} *) A68_FIELD ({base}, {offset});");
                    }
                    self.ctx
                        .booking
                        .sign_in(Action::Selection, Phase::Execute, &key, Some(payload), owner);
                }
                String::new()
            }
            Phase::Yield => temp_name(&prefix, self.owner(Action::Selection, &key, Some(&payload), node)),
        }
    }

    fn operator_and_operands(&self, node: NodeId) -> (Builtin, Vec<NodeId>) {
        let tree = self.tree;
        let children = tree.children(node).collect::<Vec<_>>();
        let found = match (tree.attribute(node), children.as_slice()) {
            (Attribute::Formula, [lhs, op, rhs]) => a68_lang::operator_builtin(tree, *op).map(|b| (b, vec![*lhs, *rhs])),
            (Attribute::MonadicFormula, [op, operand]) => {
                a68_lang::operator_builtin(tree, *op).map(|b| (b, vec![*operand]))
            }
            (Attribute::Call, [callee, args @ ..]) => tree.tag(*callee).and_then(|t| t.builtin).map(|b| (b, args.to_vec())),
            _ => None,
        };
        match found {
            Some(found) => found,
            None => internal_error(tree, node, "operation without a standard operator or procedure"),
        }
    }

    /// A temporary holding the result of `builtin` at `node`, when one is needed:
    /// `COMPL` results are written through an out parameter, and checked builds
    /// test results that may raise a math error.
    fn result_temporary(&self, node: NodeId, builtin: Builtin) -> Option<(&'static str, String, String)> {
        let signature = builtin.signature();
        if let Rendering::Out(_) = signature.rendering {
            let name = temp_name("cplx", node);
            return Some(("A68_REAL", format!("{name}[2]"), name));
        }
        if self.ctx.checked() && builtin.may_raise_math_error() {
            let name = temp_name("tmp", node);
            let class = self.modes().storage_class(self.mode(node)).unwrap_or("A68_REAL");
            return Some((class, name.clone(), name));
        }
        None
    }

    fn operation(&mut self, node: NodeId, phase: Phase) -> String {
        let (builtin, operands) = self.operator_and_operands(node);
        let temporary = self.result_temporary(node, builtin);
        match phase {
            Phase::Declare => {
                for operand in &operands {
                    self.unit(*operand, Phase::Declare);
                }
                if let Some((class, declared, _)) = &temporary {
                    self.ctx.declarations.add(class, declared);
                }
                String::new()
            }
            Phase::Execute => {
                for operand in &operands {
                    self.unit(*operand, Phase::Execute);
                }
                if let Some((_, _, name)) = temporary {
                    let args = operands.iter().map(|o| self.unit(*o, Phase::Yield)).collect::<Vec<_>>();
                    match builtin.signature().rendering {
                        Rendering::Out(function) => {
                            emit!(self.ctx, "{function} ({name}, {});", args.join(", "));
                        }
                        rendering => {
                            let expr = render(rendering, &args);
                            emit!(self.ctx, "{name} = {expr};");
                            emit!(self.ctx, "A68_MATH_RTE (p, {name}, \"{}\");", builtin.name());
                        }
                    }
                }
                String::new()
            }
            Phase::Yield => match temporary {
                Some((_, _, name)) => name,
                None => {
                    let args = operands.iter().map(|o| self.unit(*o, Phase::Yield)).collect::<Vec<_>>();
                    render(builtin.signature().rendering, &args)
                }
            },
        }
    }

    /// Calls a parameterless standard procedure such as `random` once, into a temporary.
    fn deproceduring(&mut self, node: NodeId, phase: Phase) -> String {
        let operand = self.child(node, 0);
        let Some(builtin) = self.tree.tag(operand).and_then(|t| t.builtin) else {
            internal_error(self.tree, node, "deproceduring of a procedure outside the standard environment")
        };
        let name = temp_name("tmp", node);
        match phase {
            Phase::Declare => {
                let class = self.modes().storage_class(self.mode(node)).unwrap_or("A68_REAL");
                self.ctx.declarations.add(class, &name);
                String::new()
            }
            Phase::Execute => {
                let expr = render(builtin.signature().rendering, &[]);
                emit!(self.ctx, "{name} = {expr};");
                String::new()
            }
            Phase::Yield => name,
        }
    }

    fn widening(&mut self, node: NodeId, phase: Phase) -> String {
        let operand = self.child(node, 0);
        let to_complex = predicates::is_complex(self.modes(), self.mode(node));
        let name = temp_name("cplx", node);
        match phase {
            Phase::Declare => {
                self.unit(operand, Phase::Declare);
                if to_complex {
                    self.ctx.declarations.add("A68_REAL", &format!("{name}[2]"));
                }
                String::new()
            }
            Phase::Execute => {
                self.unit(operand, Phase::Execute);
                if to_complex {
                    let re = self.unit(operand, Phase::Yield);
                    emit!(self.ctx, "A68_SET_COMPLEX ({name}, {re}, 0.0);");
                }
                String::new()
            }
            Phase::Yield if to_complex => name,
            Phase::Yield => format!("((A68_REAL) {})", self.unit(operand, Phase::Yield)),
        }
    }

    fn identity_relation(&mut self, node: NodeId, phase: Phase) -> String {
        let lhs = self.child(node, 0);
        let is = self.tree.is(self.child(node, 1), Attribute::Is);
        let rhs = self.child(node, 2);
        let left = self.unit(lhs, phase);
        let right = self.unit(rhs, phase);
        let op = if is { "==" } else { "!=" };
        self.yielded(phase, || format!("(A68_ADDRESS ({left}) {op} A68_ADDRESS ({right}))"))
    }

    /// `IF g THEN a ELSE b FI` as a C conditional expression; each branch computes its
    /// temporaries only when taken.
    fn conditional(&mut self, node: NodeId, phase: Phase) -> String {
        let tree = self.tree;
        let guard = self.child(self.child(node, 0), 0);
        let then = self.child(self.child(node, 1), 0);
        let tail = self.child(node, 2);
        let otherwise = match tree.attribute(tail) {
            Attribute::ElsePart => self.child(tail, 0),
            Attribute::ElifPart => tail,
            _ => internal_error(tree, node, "conditional without an else or elif part"),
        };
        match phase {
            Phase::Declare => {
                for part in [guard, then, otherwise] {
                    self.unit(part, Phase::Declare);
                }
                String::new()
            }
            Phase::Execute => {
                self.unit(guard, Phase::Execute);
                let condition = self.unit(guard, Phase::Yield);
                emit!(self.ctx, "if ({condition}) {{");
                self.branch(then);
                emit!(self.ctx, "}} else {{");
                self.branch(otherwise);
                emit!(self.ctx, "}}");
                String::new()
            }
            Phase::Yield => {
                let condition = self.unit(guard, Phase::Yield);
                let yes = self.unit(then, Phase::Yield);
                let no = self.unit(otherwise, Phase::Yield);
                format!("({condition} ? {yes} : {no})")
            }
        }
    }

    fn branch(&mut self, unit: NodeId) {
        let mark = self.ctx.booking.mark();
        self.ctx.indent();
        self.unit(unit, Phase::Execute);
        self.ctx.outdent();
        self.ctx.booking.truncate(mark);
    }

    /// A structure display built in a local object: a `COMPL` pair, or a byte
    /// buffer whose fields are stored one by one.
    fn collateral(&mut self, node: NodeId, phase: Phase) -> String {
        let tree = self.tree;
        let mode = self.mode(node);
        let members = tree.children(node).collect::<Vec<_>>();
        let complex = predicates::is_complex(&tree.modes, mode);
        let name = temp_name(if complex { "cplx" } else { "display" }, node);
        match phase {
            Phase::Declare => {
                for member in &members {
                    self.unit(*member, Phase::Declare);
                }
                let declared = if complex {
                    ("A68_REAL", format!("{name}[2]"))
                } else {
                    ("BYTE_T", format!("{name}[{}]", tree.modes.size(mode)))
                };
                self.ctx.declarations.add(declared.0, &declared.1);
                String::new()
            }
            Phase::Execute => {
                for member in &members {
                    self.unit(*member, Phase::Execute);
                }
                let values = members.iter().map(|m| self.unit(*m, Phase::Yield)).collect::<Vec<_>>();
                if let (true, [x, y]) = (complex, values.as_slice()) {
                    emit!(self.ctx, "A68_SET_COMPLEX ({name}, {x}, {y});");
                    return String::new();
                }
                let ModeKind::Struct(fields) = tree.modes.kind(mode) else {
                    internal_error(tree, node, "display of a mode that is not a structure")
                };
                for (index, (field, value)) in fields.iter().zip(&values).enumerate() {
                    let class = object_class(&tree.modes, field.mode);
                    let offset = field_offset(&tree.modes, mode, index);
                    let target = format!("(({class} *) A68_FIELD ({name}, {offset}))");
                    emit!(self.ctx, "STATUS {target} = INIT_MASK;");
                    emit!(self.ctx, "V {target} = {value};");
                }
                String::new()
            }
            Phase::Yield => name,
        }
    }

    fn assignation(&mut self, node: NodeId, phase: Phase) -> String {
        let destination = self.child(node, 0);
        let source = self.child(node, 1);
        match phase {
            Phase::Declare => {
                self.unit(source, Phase::Declare);
                self.address(destination, Phase::Declare);
                String::new()
            }
            Phase::Execute => {
                self.unit(source, Phase::Execute);
                self.address(destination, Phase::Execute);
                let pointer = self.address(destination, Phase::Yield);
                let value = self.unit(source, Phase::Yield);
                let statement = store_statement(self.modes(), self.mode(source), &pointer, &value);
                emit!(self.ctx, "{statement}");
                String::new()
            }
            Phase::Yield => format!("A68_MAKE_REF (p, {})", self.address(destination, Phase::Yield)),
        }
    }
}

fn render(rendering: Rendering, args: &[String]) -> String {
    match (rendering, args) {
        (Rendering::Infix(op), [lhs, rhs]) => format!("({lhs} {op} {rhs})"),
        (Rendering::Prefix(op), [operand]) => format!("({op}{operand})"),
        (Rendering::Constant(name), _) => name.to_string(),
        (Rendering::Call(function) | Rendering::Out(function), args) => format!("{function} ({})", args.join(", ")),
        (Rendering::Infix(op) | Rendering::Prefix(op), args) => format!("A68_OP ({op}, {})", args.join(", ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;
    use a68_lang::{ElsePart, TreeBuilder};

    /// Runs the three phases over `node` the way a generator does.
    fn emit_all(ctx: &mut CompilationContext, tree: &SyntaxTree, node: NodeId) -> String {
        ctx.begin_function();
        inline_unit(ctx, tree, node, Phase::Declare);
        inline_unit(ctx, tree, node, Phase::Execute);
        inline_unit(ctx, tree, node, Phase::Yield)
    }

    #[test]
    fn test_formula_over_variable() {
        let mut b = TreeBuilder::new();
        b.open_scope();
        let int = b.modes().standard().int;
        let (_, a) = b.variable_declaration("a", int, None);
        let ai = b.identifier(a);
        let value = b.dereference(ai);
        let one = b.denotation("1", int);
        let sum = b.formula(value, Builtin::IntAdd, one);
        let tree = b.finish(sum);
        let mut ctx = CompilationContext::new(Options::default());

        ctx.begin_function();
        inline_unit(&mut ctx, &tree, sum, Phase::Declare);
        assert_eq!(ctx.declarations.lines().collect::<Vec<_>>(), vec![format!("A68_INT *a_obj_{ai};")]);
        inline_unit(&mut ctx, &tree, sum, Phase::Execute);
        assert_eq!(
            ctx.out(),
            format!("a_obj_{ai} = A68_DEREF (A68_INT, (A68_REF *) A68_FRAME (p, 1, 0));\n")
        );
        let yielded = inline_unit(&mut ctx, &tree, sum, Phase::Yield);
        assert_eq!(yielded, format!("(V (a_obj_{ai}) + 1)"));
    }

    #[test]
    fn test_repeated_identifier_is_fetched_once() {
        let mut b = TreeBuilder::new();
        b.open_scope();
        let int = b.modes().standard().int;
        let (_, a) = b.variable_declaration("a", int, None);
        let first = b.identifier(a);
        let lhs = b.dereference(first);
        let second = b.identifier(a);
        let rhs = b.dereference(second);
        let product = b.formula(lhs, Builtin::IntMul, rhs);
        let tree = b.finish(product);
        let mut ctx = CompilationContext::new(Options::default());

        let yielded = emit_all(&mut ctx, &tree, product);
        assert_eq!(ctx.out().matches("A68_DEREF").count(), 1);
        assert_eq!(yielded, format!("(V (a_obj_{first}) * V (a_obj_{first}))"));
    }

    #[test]
    fn test_constant_subexpression_is_folded() {
        let mut b = TreeBuilder::new();
        b.open_scope();
        let int = b.modes().standard().int;
        let (_, a) = b.variable_declaration("a", int, None);
        let ai = b.identifier(a);
        let value = b.dereference(ai);
        let two = b.denotation("2", int);
        let three = b.denotation("3", int);
        let six = b.formula(two, Builtin::IntMul, three);
        let sum = b.formula(value, Builtin::IntAdd, six);
        let tree = b.finish(sum);
        let mut ctx = CompilationContext::new(Options::default());

        assert_eq!(emit_all(&mut ctx, &tree, sum), format!("(V (a_obj_{ai}) + 6)"));
    }

    #[test]
    fn test_checked_math_uses_temporary() {
        let mut b = TreeBuilder::new();
        b.open_scope();
        let real = b.modes().standard().real;
        let (_, x) = b.variable_declaration("x", real, None);
        let xi = b.identifier(x);
        let value = b.dereference(xi);
        let root = b.call_builtin(Builtin::Sqrt, &[value]);
        let tree = b.finish(root);
        let mut ctx = CompilationContext::new(Options::default().with_checked(true));

        let yielded = emit_all(&mut ctx, &tree, root);
        assert_eq!(yielded, format!("tmp_{root}"));
        assert!(ctx.out().contains("A68_CHECK_INIT (p, x_obj_"));
        assert!(ctx.out().contains(&format!("tmp_{root} = sqrt (V (x_obj_{xi}));")));
        assert!(ctx.out().contains("A68_MATH_RTE (p, tmp_"));
    }

    #[test]
    fn test_complex_addition_writes_through_out_parameter() {
        let mut b = TreeBuilder::new();
        b.open_scope();
        let complex = b.modes().standard().complex;
        let (_, z) = b.variable_declaration("z", complex, None);
        let zi = b.identifier(z);
        let lhs = b.dereference(zi);
        let zi2 = b.identifier(z);
        let rhs = b.dereference(zi2);
        let sum = b.formula(lhs, Builtin::ComplexAdd, rhs);
        let tree = b.finish(sum);
        let mut ctx = CompilationContext::new(Options::default());

        let yielded = emit_all(&mut ctx, &tree, sum);
        assert_eq!(yielded, format!("cplx_{sum}"));
        assert!(ctx.declarations.contains("A68_REAL", &format!("cplx_{sum}[2]")));
        assert!(
            ctx.out()
                .contains(&format!("a68_complex_add (cplx_{sum}, z_obj_{zi}, z_obj_{zi});"))
        );
    }

    #[test]
    fn test_basic_conditional_computes_branches_separately() {
        let mut b = TreeBuilder::new();
        b.open_scope();
        let std = *b.modes().standard();
        let row = b.modes().row(std.int);
        let (_, x) = b.variable_declaration("x", row, None);
        let (_, flag) = b.variable_declaration("flag", std.bool, None);

        let element = |b: &mut TreeBuilder| {
            let xi = b.identifier(x);
            let one = b.denotation("1", std.int);
            let slice = b.slice(xi, &[one]);
            b.dereference(slice)
        };
        b.open_scope();
        let fi = b.identifier(flag);
        let guard_unit = b.dereference(fi);
        let guard = b.serial(&[guard_unit]);
        b.open_scope();
        let then_unit = element(&mut b);
        let then = b.serial(&[then_unit]);
        b.open_scope();
        let else_element = element(&mut b);
        let two = b.denotation("2", std.int);
        let else_unit = b.formula(else_element, Builtin::IntAdd, two);
        let otherwise = b.serial(&[else_unit]);
        let conditional = b.conditional(guard, then, Some(ElsePart::Else(otherwise)));
        let tree = b.finish(conditional);
        let mut ctx = CompilationContext::new(Options::default());

        let yielded = emit_all(&mut ctx, &tree, conditional);
        // Both branches share one temporary but compute it under their own guard.
        assert_eq!(ctx.out().matches("A68_ROW_ELEMENT").count(), 2);
        assert_eq!(ctx.declarations.lines().filter(|l| l.contains("x_elem_")).count(), 1);
        assert!(yielded.starts_with("(V (flag_obj_"));
        assert!(yielded.contains(" ? V (x_elem_"));
    }

    #[test]
    fn test_structure_display_is_stored_field_by_field() {
        let mut b = TreeBuilder::new();
        b.open_scope();
        let std = *b.modes().standard();
        let pair = b.modes().structure(&[("a", std.int), ("b", std.bool)]);
        let (_, s) = b.variable_declaration("s", pair, None);
        let (_, n) = b.variable_declaration("n", std.int, None);
        let ni = b.identifier(n);
        let value = b.dereference(ni);
        let yes = b.denotation("TRUE", std.bool);
        let display = b.collateral(&[value, yes], pair);
        let si = b.identifier(s);
        let assignment = b.assign(si, display);
        let tree = b.finish(assignment);
        let mut ctx = CompilationContext::new(Options::default());

        emit_all(&mut ctx, &tree, assignment);
        assert!(ctx.declarations.contains("BYTE_T", &format!("display_{display}[24]")));
        let expected = [
            format!("STATUS ((A68_INT *) A68_FIELD (display_{display}, 0)) = INIT_MASK;"),
            format!("V ((A68_INT *) A68_FIELD (display_{display}, 0)) = V (n_obj_{ni});"),
            format!("STATUS ((A68_BOOL *) A68_FIELD (display_{display}, 16)) = INIT_MASK;"),
            format!("V ((A68_BOOL *) A68_FIELD (display_{display}, 16)) = A68_TRUE;"),
            format!("A68_COPY (s_obj_{si}, display_{display}, 24);"),
        ];
        for line in &expected {
            assert!(ctx.out().contains(line.as_str()), "missing {line}");
        }
        assert!(!ctx.out().contains("A68_SET_COMPLEX"));
    }

    #[test]
    fn test_checked_element_read_is_guarded() {
        let mut b = TreeBuilder::new();
        b.open_scope();
        let int = b.modes().standard().int;
        let row = b.modes().row(int);
        let (_, xs) = b.variable_declaration("xs", row, None);
        let xi = b.identifier(xs);
        let one = b.denotation("1", int);
        let slice = b.slice(xi, &[one]);
        let element = b.dereference(slice);
        let tree = b.finish(element);

        let mut unchecked = CompilationContext::new(Options::default());
        emit_all(&mut unchecked, &tree, element);
        assert!(!unchecked.out().contains("A68_CHECK_INIT"));

        let mut checked = CompilationContext::new(Options::default().with_checked(true));
        let yielded = emit_all(&mut checked, &tree, element);
        assert_eq!(yielded, format!("V (xs_elem_{slice})"));
        assert!(
            checked
                .out()
                .ends_with(&format!("A68_CHECK_INIT (p, xs_elem_{slice}, \"INT\");\n"))
        );
    }
}
