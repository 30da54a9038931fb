//! Decides which fragments the code generator may take over.
//!
//! A fragment is *basic* at a tier when the generator can emit it without falling
//! back to the interpreter, and *constant* when its value is known statically. Both
//! questions are answered by the same walk, parameterised by a [`Requirement`].

use a68_lang::{Attribute, ModeKind, NodeId, SyntaxTree, TagId, TagKind};
use rustc_hash::FxHashSet;

use crate::options::tier;
use crate::predicates::{self, Requirement};

pub struct Classifier<'t> {
    tree: &'t SyntaxTree,
    in_progress: FxHashSet<TagId>,
}

impl<'t> Classifier<'t> {
    pub fn new(tree: &'t SyntaxTree) -> Self {
        Self {
            tree,
            in_progress: FxHashSet::default(),
        }
    }

    pub fn is_basic(&mut self, node: NodeId, tier: u8) -> bool {
        tier >= tier::UNITS && self.unit(node, Requirement::Basic, tier)
    }

    pub fn is_constant(&mut self, node: NodeId) -> bool {
        self.unit(node, Requirement::Constant, tier::MAX)
    }

    fn unit(&mut self, node: NodeId, req: Requirement, tier: u8) -> bool {
        let tree = self.tree;
        let Some(mode) = tree.mode(node) else {
            return false;
        };
        let basic = req == Requirement::Basic;
        let shapes = |min: u8| req == Requirement::Constant || tier >= min;

        match tree.attribute(node) {
            Attribute::Voiding => basic && tier >= tier::INDEXING && self.voiding(node, tier),
            _ if !req.accepts(&tree.modes, mode) => false,
            Attribute::Denotation => true,
            Attribute::Identifier => self.identifier(node, req),
            Attribute::Dereferencing => basic && self.dereferencing(node, tier),
            Attribute::Formula => self.formula(node, req, tier),
            Attribute::MonadicFormula => self.monadic_formula(node, req, tier),
            Attribute::Call => self.call(node, req, tier),
            Attribute::Deproceduring => basic && self.deproceduring(node),
            Attribute::Slice => basic && tier >= tier::INDEXING && self.slice(node, tier),
            Attribute::Selection => basic && tier >= tier::INDEXING && self.selection(node),
            Attribute::Assignation => basic && tier >= tier::INDEXING && self.assignation(node, tier),
            Attribute::IdentityRelation => basic && tier >= tier::INDEXING && self.identity_relation(node),
            Attribute::Cast => {
                shapes(tier::INDEXING)
                    && predicates::is_foldable_mode(&tree.modes, mode)
                    && tree.sub(node).is_some_and(|operand| self.unit(operand, req, tier))
            }
            Attribute::Widening => shapes(tier::INDEXING) && self.widening(node, req, tier),
            Attribute::ClosedClause => {
                shapes(tier::CLAUSES) && tree.sub(node).is_some_and(|serial| self.single_unit_serial(serial, req, tier))
            }
            Attribute::SerialClause => shapes(tier::CLAUSES) && self.single_unit_serial(node, req, tier),
            Attribute::CollateralClause => shapes(tier::CLAUSES) && self.collateral(node, req, tier),
            Attribute::ConditionalClause => basic && tier >= tier::CLAUSES && self.conditional(node, tier),
            _ => false,
        }
    }

    fn identifier(&mut self, node: NodeId, req: Requirement) -> bool {
        let Some(tag_id) = self.tree.node(node).tag else {
            return false;
        };
        let tag = &self.tree.tags[tag_id];
        match (req, tag.builtin) {
            (_, Some(builtin)) => builtin.arity() == 0 && builtin.is_constant(),
            (Requirement::Basic, None) => {
                matches!(tag.kind, TagKind::Identifier | TagKind::Variable | TagKind::Parameter)
            }
            (Requirement::Constant, None) => match (tag.kind, tag.value) {
                (TagKind::Identifier, Some(value)) => self.through_identity(tag_id, value),
                _ => false,
            },
        }
    }

    /// Follows an identity declaration to its defining unit, refusing cycles.
    fn through_identity(&mut self, tag: TagId, value: NodeId) -> bool {
        if !self.in_progress.insert(tag) {
            tracing::warn!(
                identifier = %self.tree.tags[tag].name,
                line = self.tree.line(value),
                "identity declaration refers to itself"
            );
            return false;
        }
        let constant = self.unit(value, Requirement::Constant, tier::MAX);
        self.in_progress.remove(&tag);
        constant
    }

    fn dereferencing(&mut self, node: NodeId, tier: u8) -> bool {
        let tree = self.tree;
        let Some(operand) = tree.sub(node) else {
            return false;
        };
        let Some(operand_mode) = tree.mode(operand) else {
            return false;
        };
        if !predicates::is_ref(&tree.modes, operand_mode) || !predicates::is_basic_mode(&tree.modes, operand_mode) {
            return false;
        }
        match tree.attribute(operand) {
            Attribute::Identifier => tree
                .tag(operand)
                .is_some_and(|t| matches!(t.kind, TagKind::Identifier | TagKind::Variable | TagKind::Parameter)),
            Attribute::Slice => tier >= tier::INDEXING && self.slice(operand, tier),
            Attribute::Selection => tier >= tier::INDEXING && self.selection(operand),
            _ => false,
        }
    }

    fn formula(&mut self, node: NodeId, req: Requirement, tier: u8) -> bool {
        let tree = self.tree;
        let mut children = tree.children(node);
        let (Some(lhs), Some(op), Some(rhs)) = (children.next(), children.next(), children.next()) else {
            return false;
        };
        self.known_operator(op, req) && self.unit(lhs, req, tier) && self.unit(rhs, req, tier)
    }

    fn monadic_formula(&mut self, node: NodeId, req: Requirement, tier: u8) -> bool {
        let tree = self.tree;
        let mut children = tree.children(node);
        let (Some(op), Some(operand)) = (children.next(), children.next()) else {
            return false;
        };
        self.known_operator(op, req) && self.unit(operand, req, tier)
    }

    fn known_operator(&self, op: NodeId, req: Requirement) -> bool {
        match a68_lang::operator_builtin(self.tree, op) {
            Some(builtin) => req == Requirement::Basic || builtin.is_constant(),
            None => false,
        }
    }

    fn call(&mut self, node: NodeId, req: Requirement, tier: u8) -> bool {
        let tree = self.tree;
        let mut children = tree.children(node);
        let Some(callee) = children.next() else {
            return false;
        };
        let Some(builtin) = tree.tag(callee).and_then(|t| t.builtin) else {
            return false;
        };
        if req == Requirement::Constant && !builtin.is_constant() {
            return false;
        }
        let args = children.collect::<Vec<_>>();
        args.len() == builtin.arity() && args.into_iter().all(|arg| self.unit(arg, req, tier))
    }

    fn deproceduring(&self, node: NodeId) -> bool {
        self.tree
            .sub(node)
            .and_then(|operand| self.tree.tag(operand))
            .and_then(|t| t.builtin)
            .is_some_and(|builtin| builtin.arity() == 0)
    }

    fn slice(&mut self, node: NodeId, tier: u8) -> bool {
        let tree = self.tree;
        let modes = &tree.modes;
        let (Some(primary), Some(indexer)) = (tree.child(node, 0), tree.child(node, 1)) else {
            return false;
        };
        if !tree.is(primary, Attribute::Identifier) {
            return false;
        }
        let Some(row_mode) = tree.mode(primary) else {
            return false;
        };
        let element_is_basic = modes
            .row_element(row_mode)
            .is_some_and(|elem| predicates::is_basic_mode_non_row(modes, elem) && !predicates::is_ref(modes, elem));
        let node_is_basic = tree
            .mode(node)
            .is_some_and(|m| predicates::is_basic_mode_non_row(modes, m));
        element_is_basic && node_is_basic && self.is_basic_indexer(indexer, tier)
    }

    /// Every index is a units-tier basic `INT` unit; trims are refused.
    pub fn is_basic_indexer(&mut self, indexer: NodeId, tier: u8) -> bool {
        let tree = self.tree;
        if !tree.is(indexer, Attribute::Indexer) || tree.sub(indexer).is_none() {
            return false;
        }
        let int = tree.modes.standard().int;
        let indices = tree.children(indexer).collect::<Vec<_>>();
        indices.into_iter().all(|index| {
            !tree.is(index, Attribute::Trimmer)
                && tree.mode(index) == Some(int)
                && self.unit(index, Requirement::Basic, tier.min(tier::UNITS))
        })
    }

    fn selection(&self, node: NodeId) -> bool {
        let tree = self.tree;
        let modes = &tree.modes;
        let (Some(selector), Some(secondary)) = (tree.child(node, 0), tree.child(node, 1)) else {
            return false;
        };
        if !tree.is(secondary, Attribute::Identifier) {
            return false;
        }
        let Some(secondary_mode) = tree.mode(secondary) else {
            return false;
        };
        let structure = modes.deref(secondary_mode).unwrap_or(secondary_mode);
        predicates::is_basic_struct(modes, structure) && modes.field(structure, tree.symbol(selector)).is_some()
    }

    fn widening(&mut self, node: NodeId, req: Requirement, tier: u8) -> bool {
        let tree = self.tree;
        let modes = &tree.modes;
        let Some(operand) = tree.sub(node) else {
            return false;
        };
        let (Some(from), Some(to)) = (tree.mode(operand), tree.mode(node)) else {
            return false;
        };
        let supported = matches!(
            (modes.kind(from), modes.kind(to)),
            (ModeKind::Int, ModeKind::Real)
        ) || (matches!(modes.kind(from), ModeKind::Real) && predicates::is_complex(modes, to));
        supported && self.unit(operand, req, tier)
    }

    fn voiding(&mut self, node: NodeId, tier: u8) -> bool {
        let Some(operand) = self.tree.sub(node) else {
            return false;
        };
        if self.tree.is(operand, Attribute::Assignation) {
            self.assignation(operand, tier)
        } else {
            self.unit(operand, Requirement::Basic, tier)
        }
    }

    fn assignation(&mut self, node: NodeId, tier: u8) -> bool {
        let tree = self.tree;
        let modes = &tree.modes;
        let (Some(destination), Some(source)) = (tree.child(node, 0), tree.child(node, 1)) else {
            return false;
        };
        let (Some(dst_mode), Some(src_mode)) = (tree.mode(destination), tree.mode(source)) else {
            return false;
        };
        if modes.deref(dst_mode) != Some(src_mode) || !predicates::is_basic_mode_non_row(modes, src_mode) {
            return false;
        }
        let destination_ok = match tree.attribute(destination) {
            Attribute::Identifier => {
                predicates::is_basic_mode(modes, dst_mode)
                    && tree
                        .tag(destination)
                        .is_some_and(|t| matches!(t.kind, TagKind::Variable | TagKind::Identifier | TagKind::Parameter))
            }
            Attribute::Slice => self.slice(destination, tier),
            Attribute::Selection => self.selection(destination),
            _ => false,
        };
        destination_ok && self.unit(source, Requirement::Basic, tier)
    }

    fn identity_relation(&self, node: NodeId) -> bool {
        let tree = self.tree;
        let mut children = tree.children(node);
        let (Some(lhs), Some(_), Some(rhs)) = (children.next(), children.next(), children.next()) else {
            return false;
        };
        let reference = |n: NodeId| {
            tree.is(n, Attribute::Identifier) && tree.mode(n).is_some_and(|m| predicates::is_ref(&tree.modes, m))
        };
        let nil = |n: NodeId| tree.is(n, Attribute::Nihil);
        (reference(lhs) && (reference(rhs) || nil(rhs))) || (nil(lhs) && reference(rhs))
    }

    fn single_unit_serial(&mut self, serial: NodeId, req: Requirement, tier: u8) -> bool {
        let tree = self.tree;
        if !tree.is(serial, Attribute::SerialClause) || self.has_labels(serial) {
            return false;
        }
        let mut items = tree.children(serial);
        match (items.next(), items.next()) {
            (Some(only), None) => !tree.attribute(only).is_declaration() && self.unit(only, req, tier),
            _ => false,
        }
    }

    /// A serial clause of exactly one basic unit, without labels or declarations.
    pub fn is_basic_serial(&mut self, serial: NodeId, tier: u8) -> bool {
        tier >= tier::CLAUSES && self.single_unit_serial(serial, Requirement::Basic, tier)
    }

    fn collateral(&mut self, node: NodeId, req: Requirement, tier: u8) -> bool {
        let tree = self.tree;
        let Some(mode) = tree.mode(node).filter(|m| predicates::is_basic_struct(&tree.modes, *m)) else {
            return false;
        };
        let ModeKind::Struct(fields) = tree.modes.kind(mode) else {
            return false;
        };
        let members = tree.children(node).collect::<Vec<_>>();
        members.len() == fields.len() && members.into_iter().all(|m| self.unit(m, req, tier))
    }

    /// A structure display, such as a `COMPL` pair, whose members are basic.
    pub fn is_basic_collateral(&mut self, node: NodeId, tier: u8) -> bool {
        tier >= tier::CLAUSES && self.collateral(node, Requirement::Basic, tier)
    }

    fn conditional(&mut self, node: NodeId, tier: u8) -> bool {
        let tree = self.tree;
        let mut parts = tree.children(node);
        let (Some(if_part), Some(then_part)) = (parts.next(), parts.next()) else {
            return false;
        };
        let guard = tree.sub(if_part);
        let then = tree.sub(then_part);
        let bool = tree.modes.standard().bool;
        let guard_ok = guard.is_some_and(|g| {
            tree.mode(g) == Some(bool) && self.single_unit_serial(g, Requirement::Basic, tier)
        });
        let then_ok = then.is_some_and(|t| self.single_unit_serial(t, Requirement::Basic, tier));
        let else_ok = match parts.next() {
            Some(part) if tree.is(part, Attribute::ElsePart) => {
                tree.sub(part).is_some_and(|s| self.single_unit_serial(s, Requirement::Basic, tier))
            }
            Some(part) if tree.is(part, Attribute::ElifPart) => self.conditional(part, tier),
            _ => false,
        };
        guard_ok && then_ok && else_ok
    }

    /// A conditional whose guards and branches are all single basic units.
    pub fn is_basic_conditional(&mut self, node: NodeId, tier: u8) -> bool {
        tier >= tier::CLAUSES
            && self
                .tree
                .mode(node)
                .is_some_and(|m| predicates::is_basic_mode(&self.tree.modes, m))
            && self.conditional(node, tier)
    }

    /// An integer case clause with a basic selector and no labels in any branch.
    pub fn is_basic_case(&mut self, node: NodeId, tier: u8) -> bool {
        let tree = self.tree;
        if tier < tier::CLAUSES {
            return false;
        }
        let (Some(case_part), Some(in_part)) = (tree.child(node, 0), tree.child(node, 1)) else {
            return false;
        };
        let int = tree.modes.standard().int;
        let selector_ok = tree
            .sub(case_part)
            .is_some_and(|s| tree.mode(s) == Some(int) && self.single_unit_serial(s, Requirement::Basic, tier));
        let tail_ok = match tree.child(node, 2) {
            Some(ouse) if tree.is(ouse, Attribute::OusePart) => self.is_basic_case(ouse, tier),
            Some(out) => !self.has_labels(out),
            None => true,
        };
        selector_ok && !self.has_labels(in_part) && tail_ok
    }

    /// Whether any serial clause inside `node` declares a label; routine texts are opaque.
    pub fn has_labels(&self, node: NodeId) -> bool {
        let tree = self.tree;
        tree.children(node).any(|child| match tree.attribute(child) {
            Attribute::Label => true,
            Attribute::RoutineText => false,
            _ => self.has_labels(child),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use a68_lang::{Builtin, ElsePart, TreeBuilder};
    use rstest::rstest;

    #[test]
    fn test_integer_denotation_is_basic_and_constant() {
        let mut b = TreeBuilder::new();
        let int = b.modes().standard().int;
        let d = b.denotation("42", int);
        let tree = b.finish(d);
        let mut c = Classifier::new(&tree);
        assert!(c.is_basic(d, tier::UNITS));
        assert!(c.is_constant(d));
        assert!(!c.is_basic(d, 0));
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
        let mut c = Classifier::new(&tree);
        assert!(c.is_basic(sum, tier::UNITS));
        assert!(!c.is_constant(sum));
    }

    #[test]
    fn test_constant_through_identity() {
        let mut b = TreeBuilder::new();
        let real = b.modes().standard().real;
        let half = b.denotation("0.5", real);
        let (_, h) = b.identity_declaration("h", real, half);
        let hi = b.identifier(h);
        let pi = b.standard(Builtin::Pi);
        let product = b.formula(hi, Builtin::RealMul, pi);
        let tree = b.finish(product);
        assert!(Classifier::new(&tree).is_constant(product));
    }

    #[test]
    fn test_self_referential_identity_is_rejected() {
        let mut b = TreeBuilder::new();
        let int = b.modes().standard().int;
        let placeholder = b.denotation("0", int);
        let (_, n) = b.identity_declaration("n", int, placeholder);
        let ni = b.identifier(n);
        let one = b.denotation("1", int);
        let sum = b.formula(ni, Builtin::IntAdd, one);
        let mut tree = b.finish(sum);
        tree.tags[n].value = Some(sum);

        let mut c = Classifier::new(&tree);
        assert!(!c.is_constant(sum));
        assert!(!c.is_constant(sum));
        assert!(c.is_basic(sum, tier::UNITS));
    }

    #[test]
    fn test_random_is_basic_but_not_constant() {
        let mut b = TreeBuilder::new();
        let random = b.standard(Builtin::Random);
        let call = b.deprocedure(random);
        let tree = b.finish(call);
        let mut c = Classifier::new(&tree);
        assert!(c.is_basic(call, tier::UNITS));
        assert!(!c.is_constant(call));
    }

    fn slice_tree(trim: bool) -> (a68_lang::SyntaxTree, NodeId) {
        let mut b = TreeBuilder::new();
        b.open_scope();
        let int = b.modes().standard().int;
        let row = b.modes().row(int);
        let (_, x) = b.variable_declaration("x", row, None);
        let (_, i) = b.variable_declaration("i", int, None);
        let xi = b.identifier(x);
        let slice = if trim {
            b.trimmed_slice(xi)
        } else {
            let ii = b.identifier(i);
            let index = b.dereference(ii);
            b.slice(xi, &[index])
        };
        let value = b.dereference(slice);
        (b.finish(value), value)
    }

    #[rstest]
    #[case::units(tier::UNITS, false, false)]
    #[case::indexing(tier::INDEXING, false, true)]
    #[case::clauses(tier::CLAUSES, false, true)]
    #[case::trimmed(tier::MAX, true, false)]
    fn test_slices(#[case] tier: u8, #[case] trim: bool, #[case] expected: bool) {
        let (tree, node) = slice_tree(trim);
        assert_eq!(Classifier::new(&tree).is_basic(node, tier), expected);
    }

    #[test]
    fn test_voided_assignation_to_selection() {
        let mut b = TreeBuilder::new();
        b.open_scope();
        let std = *b.modes().standard();
        let (_, z) = b.variable_declaration("z", std.complex, None);
        let zi = b.identifier(z);
        let re = b.selection("re", zi);
        let two = b.denotation("2.0", std.real);
        let assign = b.assign(re, two);
        let voided = b.void(assign);
        let tree = b.finish(voided);
        let mut c = Classifier::new(&tree);
        assert!(!c.is_basic(voided, tier::UNITS));
        assert!(c.is_basic(voided, tier::INDEXING));
    }

    #[test]
    fn test_identity_relation_with_nil() {
        let mut b = TreeBuilder::new();
        b.open_scope();
        let std = *b.modes().standard();
        let (_, x) = b.variable_declaration("x", std.int, None);
        let xi = b.identifier(x);
        let nil = b.nil(std.ref_int);
        let is = b.identity_relation(xi, true, nil);
        let tree = b.finish(is);
        assert!(Classifier::new(&tree).is_basic(is, tier::INDEXING));
    }

    #[test]
    fn test_basic_conditional_requires_else() {
        let mut b = TreeBuilder::new();
        let std = *b.modes().standard();
        let guard = |b: &mut TreeBuilder| {
            b.open_scope();
            let t = b.denotation("TRUE", std.bool);
            b.serial(&[t])
        };
        let branch = |b: &mut TreeBuilder, text: &str| {
            b.open_scope();
            let d = b.denotation(text, std.int);
            b.serial(&[d])
        };
        let g = guard(&mut b);
        let t = branch(&mut b, "1");
        let e = branch(&mut b, "2");
        let full = b.conditional(g, t, Some(ElsePart::Else(e)));
        let g = guard(&mut b);
        let t = branch(&mut b, "1");
        let partial = b.conditional(g, t, None);
        let tree = b.finish(full);

        let mut c = Classifier::new(&tree);
        assert!(c.is_basic(full, tier::CLAUSES));
        assert!(!c.is_basic(full, tier::INDEXING));
        assert!(!c.is_basic(partial, tier::CLAUSES));
    }

    #[test]
    fn test_labels_disqualify_serial() {
        let mut b = TreeBuilder::new();
        let int = b.modes().standard().int;
        b.open_scope();
        let (label, _) = b.label("l");
        let d = b.denotation("1", int);
        let serial = b.serial(&[label, d]);
        let tree = b.finish(serial);
        let mut c = Classifier::new(&tree);
        assert!(c.has_labels(serial));
        assert!(!c.is_basic_serial(serial, tier::MAX));
    }

    #[test]
    fn test_complex_collateral() {
        let mut b = TreeBuilder::new();
        let std = *b.modes().standard();
        let re = b.denotation("1.0", std.real);
        let im = b.denotation("2.0", std.real);
        let z = b.collateral(&[re, im], std.complex);
        let tree = b.finish(z);
        let mut c = Classifier::new(&tree);
        assert!(c.is_basic_collateral(z, tier::CLAUSES));
        assert!(c.is_constant(z));
        assert!(!c.is_basic(z, tier::INDEXING));
    }

    #[test]
    fn test_structure_display() {
        let mut b = TreeBuilder::new();
        b.open_scope();
        let std = *b.modes().standard();
        let pair = b.modes().structure(&[("a", std.int), ("b", std.bool)]);
        let (_, n) = b.variable_declaration("n", std.int, None);
        let ni = b.identifier(n);
        let value = b.dereference(ni);
        let yes = b.denotation("TRUE", std.bool);
        let display = b.collateral(&[value, yes], pair);
        let one = b.denotation("1", std.int);
        let short = b.collateral(&[one], pair);
        let tree = b.finish(display);
        let mut c = Classifier::new(&tree);
        assert!(c.is_basic(display, tier::CLAUSES));
        assert!(!c.is_basic(display, tier::INDEXING));
        assert!(!c.is_constant(display));
        assert!(!c.is_basic(short, tier::CLAUSES));
    }
}
