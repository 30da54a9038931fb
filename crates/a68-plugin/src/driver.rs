//! Walks the tree and hands every fragment to the generators.

use a68_lang::{Annotation, NodeId, SyntaxTree};

use crate::context::CompilationContext;
use crate::generate;
use crate::options::tier;

/// Visits `node` and its following siblings.
pub fn drive(ctx: &mut CompilationContext, tree: &mut SyntaxTree, node: NodeId) {
    let mut cursor = Some(node);
    while let Some(current) = cursor {
        drive_unit(ctx, tree, current);
        cursor = tree.next(current);
    }
}

/// Compiles `node` if a generator takes it, otherwise looks for fragments below it.
///
/// Nodes already annotated are left alone.
pub fn drive_unit(ctx: &mut CompilationContext, tree: &mut SyntaxTree, node: NodeId) {
    if !tree.annotation(node).is_pending() {
        return;
    }
    let errors = ctx.error_count();
    match generate::generate(ctx, tree, node) {
        Some(name) => {
            ctx.record_compiled(node, &name);
            tree.annotate(node, Annotation::Compiled(name.into()));
        }
        None => {
            tree.annotate(node, Annotation::NotGenerated);
            // A fragment that failed with a diagnostic is interpreted as a whole.
            if ctx.error_count() > errors {
                return;
            }
            if let Some(sub) = tree.sub(node) {
                drive(ctx, tree, sub);
            }
        }
    }
}

/// The pass used at the lowest optimisation level: units only.
pub fn drive_tier1(ctx: &mut CompilationContext, tree: &mut SyntaxTree, root: NodeId) {
    ctx.tier = tier::UNITS;
    drive(ctx, tree, root);
}

/// The pass for every other level, at the tier the options ask for.
pub fn drive_full(ctx: &mut CompilationContext, tree: &mut SyntaxTree, root: NodeId) {
    ctx.tier = ctx.options.tier();
    drive(ctx, tree, root);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;
    use a68_lang::{Builtin, LoopParts, TreeBuilder};

    #[test]
    fn test_refused_node_is_searched_for_fragments() {
        let mut b = TreeBuilder::new();
        b.open_scope();
        let std = *b.modes().standard();
        let (_, n) = b.variable_declaration("n", std.int, None);
        b.open_scope();
        let ni = b.identifier(n);
        let nv = b.dereference(ni);
        let seven = b.denotation("7", std.int);
        let product = b.formula(nv, Builtin::IntMul, seven);
        let ni2 = b.identifier(n);
        let store = b.assign(ni2, product);
        let statement = b.void(store);
        let body = b.serial(&[statement]);
        let ni3 = b.identifier(n);
        let nv3 = b.dereference(ni3);
        let limit = b.denotation("100", std.int);
        let guard = b.formula(nv3, Builtin::IntLt, limit);
        let lp = b.loop_clause(LoopParts {
            while_part: Some(guard),
            body: Some(body),
            ..LoopParts::default()
        });
        let program = b.serial(&[lp]);
        let mut tree = b.program(program);
        let mut ctx = CompilationContext::new(Options::default());
        let root = tree.root.unwrap();

        drive_full(&mut ctx, &mut tree, root);
        assert_eq!(tree.annotation(lp), &Annotation::NotGenerated);
        assert_eq!(tree.annotation(root), &Annotation::NotGenerated);
        assert!(matches!(tree.annotation(guard), Annotation::Compiled(_)));
        assert!(matches!(tree.annotation(body), Annotation::Compiled(_)));
        // Covered by the body's function.
        assert_eq!(tree.annotation(statement), &Annotation::Pending);
        assert_eq!(ctx.compiled().len(), 2);
    }

    #[test]
    fn test_tier1_pass_compiles_units_only() {
        let mut b = TreeBuilder::new();
        b.open_scope();
        let std = *b.modes().standard();
        let (_, n) = b.variable_declaration("n", std.int, None);
        let ni = b.identifier(n);
        let one = b.denotation("1", std.int);
        let store = b.assign(ni, one);
        let statement = b.void(store);
        let mut tree = b.finish(statement);
        let mut ctx = CompilationContext::new(Options::default());

        drive_tier1(&mut ctx, &mut tree, statement);
        assert_eq!(tree.annotation(statement), &Annotation::NotGenerated);
        assert_eq!(tree.annotation(one), &Annotation::Compiled("_denotation_int_1".into()));
        // The destination alone is a basic unit yielding the variable's reference.
        assert_eq!(
            tree.annotation(ni),
            &Annotation::Compiled(format!("_identifier_ref_int_{ni}").into())
        );
    }

    #[test]
    fn test_annotated_nodes_are_not_revisited() {
        let mut b = TreeBuilder::new();
        let int = b.modes().standard().int;
        let d = b.denotation("3", int);
        let mut tree = b.finish(d);
        tree.annotate(d, Annotation::NotGenerated);
        let mut ctx = CompilationContext::new(Options::default());

        drive_full(&mut ctx, &mut tree, d);
        assert_eq!(tree.annotation(d), &Annotation::NotGenerated);
        assert!(ctx.compiled().is_empty());
    }

    #[test]
    fn test_failed_fold_is_not_searched() {
        let mut b = TreeBuilder::new();
        let real = b.modes().standard().real;
        let max = b.standard(Builtin::MaxReal);
        let big = b.denotation("1e300", real);
        let product = b.formula(max, Builtin::RealMul, big);
        let mut tree = b.finish(product);
        let mut ctx = CompilationContext::new(Options::default());

        drive_full(&mut ctx, &mut tree, product);
        assert_eq!(tree.annotation(product), &Annotation::NotGenerated);
        assert_eq!(tree.annotation(max), &Annotation::Pending);
        assert_eq!(ctx.error_count(), 1);
    }
}
