use a68_lang::{Annotation, Builtin, LoopParts, NodeId, SyntaxTree, TreeBuilder};
use a68_plugin::{Options, Plugin, PluginError};
use rstest::{fixture, rstest};

#[fixture]
fn plugin() -> Plugin {
    Plugin::new(Options::new(3))
}

fn definitions(source: &str, name: &str) -> usize {
    source.matches(&format!("A68_PROP_T {name} (A68_NODE_T *p)")).count()
}

#[rstest]
#[case::opt1(1)]
#[case::opt3(3)]
fn test_integer_literal(#[case] opt_level: u8) {
    let mut b = TreeBuilder::new();
    let int = b.modes().standard().int;
    let one = b.denotation("1", int);
    let mut tree = b.finish(one);

    let compiled = Plugin::new(Options::new(opt_level)).compile(&mut tree).unwrap();
    assert_eq!(tree.annotation(one), &Annotation::Compiled("_denotation_int_1".into()));
    assert_eq!(definitions(&compiled.source, "_denotation_int_1"), 1);
    assert!(compiled.source.contains("A68_PUSH_VALUE (p, 1, A68_INT);"));
}

#[rstest]
fn test_simple_formula(mut plugin: Plugin) {
    let mut b = TreeBuilder::new();
    b.open_scope();
    let int = b.modes().standard().int;
    let (_, a) = b.variable_declaration("a", int, None);
    let ai = b.identifier(a);
    let value = b.dereference(ai);
    let one = b.denotation("1", int);
    let sum = b.formula(value, Builtin::IntAdd, one);
    let mut tree = b.finish(sum);

    let compiled = plugin.compile(&mut tree).unwrap();
    let name = format!("_formula_int_{sum}");
    assert_eq!(tree.annotation(sum), &Annotation::Compiled(name.clone().into()));
    assert_eq!(compiled.compiled, vec![(sum, name.into())]);
    assert!(compiled.source.contains(&format!("A68_PUSH_VALUE (p, (V (a_obj_{ai}) + 1), A68_INT);")));
    // Operands are covered by the formula's function.
    assert!(tree.annotation(one).is_pending());
}

#[rstest]
fn test_voided_slice_assignment(mut plugin: Plugin) {
    let mut b = TreeBuilder::new();
    b.open_scope();
    let int = b.modes().standard().int;
    let row = b.modes().row(int);
    let (_, x) = b.variable_declaration("x", row, None);
    let (_, i) = b.variable_declaration("i", int, None);
    let element = |b: &mut TreeBuilder| {
        let xi = b.identifier(x);
        let ii = b.identifier(i);
        let index = b.dereference(ii);
        b.slice(xi, &[index])
    };
    let destination = element(&mut b);
    let source = element(&mut b);
    let value = b.dereference(source);
    let one = b.denotation("1", int);
    let sum = b.formula(value, Builtin::IntAdd, one);
    let assignment = b.assign(destination, sum);
    let voided = b.void(assignment);
    let mut tree = b.finish(voided);

    let compiled = plugin.compile(&mut tree).unwrap();
    assert!(matches!(tree.annotation(voided), Annotation::Compiled(_)));
    assert_eq!(compiled.function_count(), 1);
    assert_eq!(compiled.source.matches("A68_ROW_ELEMENT").count(), 1);
}

fn while_loop() -> (SyntaxTree, NodeId, NodeId, NodeId) {
    let mut b = TreeBuilder::new();
    b.open_scope();
    let int = b.modes().standard().int;
    let (_, n) = b.variable_declaration("n", int, None);
    b.open_scope();
    let ni = b.identifier(n);
    let nv = b.dereference(ni);
    let two = b.denotation("2", int);
    let product = b.formula(nv, Builtin::IntMul, two);
    let target = b.identifier(n);
    let store = b.assign(target, product);
    let statement = b.void(store);
    let body = b.serial(&[statement]);
    let guard_n = b.identifier(n);
    let guard_v = b.dereference(guard_n);
    let limit = b.denotation("1000", int);
    let guard = b.formula(guard_v, Builtin::IntLt, limit);
    let lp = b.loop_clause(LoopParts {
        while_part: Some(guard),
        body: Some(body),
        ..LoopParts::default()
    });
    let program = b.serial(&[lp]);
    (b.program(program), lp, guard, body)
}

#[rstest]
fn test_while_loop_is_left_to_the_interpreter(mut plugin: Plugin) {
    let (mut tree, lp, guard, body) = while_loop();

    let compiled = plugin.compile(&mut tree).unwrap();
    assert_eq!(tree.annotation(lp), &Annotation::NotGenerated);
    assert!(matches!(tree.annotation(guard), Annotation::Compiled(_)));
    assert!(matches!(tree.annotation(body), Annotation::Compiled(_)));
    assert_eq!(compiled.error_count, 0);
    assert!(!compiled.source.contains("while"));
}

#[rstest]
fn test_non_finite_fold_is_reported_and_interpreted(mut plugin: Plugin) {
    let mut b = TreeBuilder::new();
    let real = b.modes().standard().real;
    let max = b.standard(Builtin::MaxReal);
    let big = b.denotation("1e300", real);
    let product = b.formula(max, Builtin::RealMul, big);
    let mut tree = b.finish(product);

    let compiled = plugin.compile(&mut tree).unwrap();
    assert_eq!(compiled.error_count, 1);
    assert_eq!(compiled.diagnostics.len(), 1);
    assert_eq!(compiled.diagnostics[0].cause, PluginError::NonFiniteConstant(product));
    assert_eq!(tree.annotation(product), &Annotation::NotGenerated);
    assert_eq!(compiled.function_count(), 0);
}

#[test]
fn test_equal_constants_share_one_function() {
    let mut b = TreeBuilder::new();
    b.open_scope();
    let int = b.modes().standard().int;
    let (_, m) = b.variable_declaration("m", int, None);
    let (_, n) = b.variable_declaration("n", int, None);
    let statements = [m, n].map(|tag| {
        let target = b.identifier(tag);
        let value = b.denotation("42", int);
        let store = b.assign(target, value);
        (b.void(store), value)
    });
    let serial = b.serial(&statements.map(|(statement, _)| statement));
    let mut tree = b.finish(serial);

    // Assignations are out of reach at the units tier, so only their operands compile.
    let compiled = Plugin::new(Options::new(1)).compile(&mut tree).unwrap();
    for (_, value) in statements {
        assert_eq!(tree.annotation(value), &Annotation::Compiled("_denotation_int_42".into()));
    }
    assert_eq!(definitions(&compiled.source, "_denotation_int_42"), 1);
}

#[test]
fn test_checked_build_guards_math_errors() {
    let mut b = TreeBuilder::new();
    b.open_scope();
    let real = b.modes().standard().real;
    let int = b.modes().standard().int;
    let row = b.modes().row(real);
    let (_, x) = b.variable_declaration("x", real, None);
    let (_, xs) = b.variable_declaration("xs", row, None);
    let xi = b.identifier(x);
    let value = b.dereference(xi);
    let xsi = b.identifier(xs);
    let one = b.denotation("1", int);
    let slice = b.slice(xsi, &[one]);
    let element = b.dereference(slice);
    let sum = b.formula(value, Builtin::RealAdd, element);
    let root = b.call_builtin(Builtin::Sqrt, &[sum]);
    let mut tree = b.finish(root);

    let unchecked = Plugin::new(Options::new(3)).compile(&mut tree.clone()).unwrap();
    assert!(!unchecked.source.contains("A68_MATH_RTE"));
    assert!(!unchecked.source.contains("A68_CHECK_INIT"));

    let checked = Plugin::new(Options::new(3).with_checked(true)).compile(&mut tree).unwrap();
    assert!(checked.source.contains(&format!("A68_CHECK_INIT (p, x_obj_{xi}, \"REAL\");")));
    assert!(checked.source.contains(&format!("A68_CHECK_INIT (p, xs_elem_{slice}, \"REAL\");")));
    assert!(checked.source.contains("A68_MATH_RTE"));
}
