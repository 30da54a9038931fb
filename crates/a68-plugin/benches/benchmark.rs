use a68_lang::{Builtin, LoopParts, SyntaxTree, TreeBuilder};
use a68_plugin::{CompiledSource, Options, Plugin};

fn main() {
    divan::main();
}

/// `a + 1 + a + 1 + ...` with `n` terms.
fn long_formula(n: usize) -> SyntaxTree {
    let mut b = TreeBuilder::new();
    b.open_scope();
    let int = b.modes().standard().int;
    let (_, a) = b.variable_declaration("a", int, None);
    let mut sum = b.denotation("0", int);
    for k in 0..n {
        let term = if k % 2 == 0 {
            let ai = b.identifier(a);
            b.dereference(ai)
        } else {
            b.denotation("1", int)
        };
        sum = b.formula(sum, Builtin::IntAdd, term);
    }
    b.finish(sum)
}

/// `n` counting loops summing into a row element.
fn loops(n: usize) -> SyntaxTree {
    let mut b = TreeBuilder::new();
    b.open_scope();
    let int = b.modes().standard().int;
    let row = b.modes().row(int);
    let (_, xs) = b.variable_declaration("xs", row, None);
    let mut statements = Vec::with_capacity(n);
    for _ in 0..n {
        b.open_scope();
        let k = b.loop_counter("k");
        let target = {
            let xi = b.identifier(xs);
            let one = b.denotation("1", int);
            b.slice(xi, &[one])
        };
        let source = {
            let xi = b.identifier(xs);
            let one = b.denotation("1", int);
            b.slice(xi, &[one])
        };
        let value = b.dereference(source);
        let ki = b.identifier(k);
        let sum = b.formula(value, Builtin::IntAdd, ki);
        let store = b.assign(target, sum);
        let statement = b.void(store);
        let body = b.serial(&[statement]);
        let to = b.denotation("100", int);
        statements.push(b.loop_clause(LoopParts {
            counter: Some(k),
            to: Some(to),
            body: Some(body),
            ..LoopParts::default()
        }));
    }
    let program = b.serial(&statements);
    b.program(program)
}

#[divan::bench(args = [16, 256])]
fn compile_long_formula(bencher: divan::Bencher, n: usize) {
    bencher
        .with_inputs(|| long_formula(n))
        .bench_local_values(|mut tree| -> CompiledSource { Plugin::default().compile(&mut tree).unwrap() });
}

#[divan::bench(args = [8, 64])]
fn compile_loops(bencher: divan::Bencher, n: usize) {
    bencher
        .with_inputs(|| loops(n))
        .bench_local_values(|mut tree| -> CompiledSource { Plugin::new(Options::new(3)).compile(&mut tree).unwrap() });
}
