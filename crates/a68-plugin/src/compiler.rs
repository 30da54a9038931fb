use std::io;

use a68_lang::{NodeId, SyntaxTree};
use smol_str::SmolStr;

use crate::context::CompilationContext;
use crate::driver;
use crate::error::{Diagnostic, Error, PluginError};
use crate::options::{Options, tier};

/// Directives opening every generated file.
pub const PRELUDE: &str = "\
#include <a68g-config.h>
#include <a68g.h>
#include <a68g-genie.h>
#include <a68g-prelude.h>
#include <a68g-compiler.h>
";

/// The outcome of one compilation run.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSource {
    /// Complete C source: prelude, file-scope constants and functions.
    pub source: String,
    /// Compiled nodes with the function installed for each, in generation order.
    pub compiled: Vec<(NodeId, SmolStr)>,
    pub error_count: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompiledSource {
    pub fn function_count(&self) -> usize {
        self.compiled.len()
    }
}

/// Entry point of the code generator.
///
/// ```rust
/// use a68_lang::{Builtin, TreeBuilder};
/// use a68_plugin::{Options, Plugin};
///
/// let mut b = TreeBuilder::new();
/// let int = b.modes().standard().int;
/// let six = b.denotation("6", int);
/// let seven = b.denotation("7", int);
/// let product = b.formula(six, Builtin::IntMul, seven);
/// let mut tree = b.finish(product);
///
/// let compiled = Plugin::new(Options::default()).compile(&mut tree).unwrap();
/// assert!(compiled.source.contains("A68_PUSH_VALUE (p, 42, A68_INT);"));
/// ```
#[derive(Debug)]
pub struct Plugin {
    ctx: CompilationContext,
}

impl Default for Plugin {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

impl Plugin {
    pub fn new(options: Options) -> Self {
        Self {
            ctx: CompilationContext::new(options),
        }
    }

    pub fn options(&self) -> Options {
        self.ctx.options
    }

    pub fn set_options(&mut self, options: Options) {
        self.ctx.options = options;
    }

    /// Generates C for every eligible fragment of `tree` and annotates the tree.
    ///
    /// Diagnostics do not fail the run: the affected fragments are annotated as
    /// not generated and stay interpreted.
    pub fn compile(&mut self, tree: &mut SyntaxTree) -> Result<CompiledSource, Error> {
        let root = tree.root.ok_or_else(|| Error::from_error(tree, PluginError::MissingRoot))?;
        self.ctx.reset();
        let options = self.ctx.options;
        tracing::debug!(opt_level = options.opt_level, checked = options.checked, "compiling");

        match options.opt_level {
            0 => {}
            tier::UNITS => driver::drive_tier1(&mut self.ctx, tree, root),
            _ => driver::drive_full(&mut self.ctx, tree, root),
        }

        let (globals, functions, compiled, error_count, diagnostics) = self.ctx.take();
        let mut source = String::with_capacity(PRELUDE.len() + globals.len() + functions.len() + 1);
        source.push_str(PRELUDE);
        if !globals.is_empty() {
            source.push('\n');
            source.push_str(&globals);
        }
        if !functions.is_empty() {
            source.push('\n');
            source.push_str(&functions);
        }
        tracing::debug!(functions = compiled.len(), errors = error_count, "compiled");
        Ok(CompiledSource {
            source,
            compiled,
            error_count,
            diagnostics,
        })
    }

    /// Like [`compile`](Self::compile), writing the source to `writer`.
    pub fn compile_to<W: io::Write>(&mut self, tree: &mut SyntaxTree, writer: &mut W) -> Result<CompiledSource, Error> {
        let compiled = self.compile(tree)?;
        writer
            .write_all(compiled.source.as_bytes())
            .and_then(|_| writer.flush())
            .map_err(|err| Error::from_error(tree, PluginError::Io(err.to_string())))?;
        Ok(compiled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use a68_lang::{Annotation, Builtin, TreeBuilder};
    use rstest::rstest;

    fn sample() -> (SyntaxTree, NodeId) {
        let mut b = TreeBuilder::new();
        b.open_scope();
        let std = *b.modes().standard();
        let (_, a) = b.variable_declaration("a", std.int, None);
        let ai = b.identifier(a);
        let value = b.dereference(ai);
        let one = b.denotation("1", std.int);
        let sum = b.formula(value, Builtin::IntAdd, one);
        (b.finish(sum), sum)
    }

    #[rstest]
    #[case::nothing(0, 0)]
    #[case::units(1, 1)]
    #[case::clauses(3, 1)]
    fn test_opt_level_selects_pass(#[case] opt_level: u8, #[case] functions: usize) {
        let (mut tree, sum) = sample();
        let compiled = Plugin::new(Options::new(opt_level)).compile(&mut tree).unwrap();
        assert_eq!(compiled.function_count(), functions);
        assert!(compiled.source.starts_with(PRELUDE));
        if functions == 0 {
            assert_eq!(compiled.source, PRELUDE);
            assert!(tree.annotation(sum).is_pending());
        } else {
            assert!(matches!(tree.annotation(sum), Annotation::Compiled(_)));
        }
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let mut tree = SyntaxTree::default();
        let err = Plugin::default().compile(&mut tree).unwrap_err();
        assert_eq!(err.cause, PluginError::MissingRoot);
    }

    #[test]
    fn test_compile_is_deterministic() {
        let (mut first, _) = sample();
        let (mut second, _) = sample();
        let mut plugin = Plugin::default();
        let a = plugin.compile(&mut first).unwrap();
        let b = plugin.compile(&mut second).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_compile_to_writer() {
        let (mut tree, _) = sample();
        let mut out = Vec::new();
        let compiled = Plugin::default().compile_to(&mut tree, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), compiled.source);
    }

    #[test]
    fn test_globals_precede_functions() {
        let mut b = TreeBuilder::new();
        let std = *b.modes().standard();
        let re = b.denotation("1.0", std.real);
        let im = b.denotation("2.0", std.real);
        let z = b.collateral(&[re, im], std.complex);
        let (_, c) = b.identity_declaration("c", std.complex, z);
        let ci = b.identifier(c);
        let mut tree = b.finish(ci);

        let compiled = Plugin::default().compile(&mut tree).unwrap();
        let global = compiled.source.find("static const A68_REAL _complex_").unwrap();
        let function = compiled.source.find("A68_PROP_T ").unwrap();
        assert!(global < function);
        assert!(compiled.source.contains("A68_PUSH_COMPLEX (p, _complex_"));
    }
}
