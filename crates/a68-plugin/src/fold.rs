//! Constant folding by meta-evaluation.
//!
//! A constant unit is evaluated by the interpreter's own stack machine, so the
//! folded value is the value the interpreter would compute. The result is rendered
//! as a C literal.

use a68_lang::{NodeId, SyntaxTree, Value};

use crate::context::CompilationContext;
use crate::error::{Diagnostic, PluginError};

/// A folded value and the C text standing for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    pub value: Value,
    /// An inline literal, or the name of a file-scope array for `COMPL` values.
    pub literal: String,
}

/// Folds a unit the classifier judged constant.
///
/// Returns `None` and records a diagnostic when the value is not finite or the
/// evaluation fails; the caller leaves the fragment to the interpreter.
pub fn fold_unit(ctx: &mut CompilationContext, tree: &SyntaxTree, node: NodeId) -> Option<Constant> {
    let value = match ctx.genie.evaluate(tree, node) {
        Ok(value) => value,
        Err(err) => {
            ctx.error(Diagnostic::new(tree, node, PluginError::Fold(err)));
            return None;
        }
    };
    if !value.is_finite() {
        ctx.error(Diagnostic::new(tree, node, PluginError::NonFiniteConstant(node)));
        return None;
    }
    let literal = match value {
        Value::Complex(re, im) => complex_global(ctx, re, im),
        _ => render_literal(&value),
    };
    Some(Constant { value, literal })
}

/// C literal for a primitive value.
pub fn render_literal(value: &Value) -> String {
    match value {
        Value::Int(i64::MIN) => "(-A68_MAX_INT - 1)".to_string(),
        Value::Int(i) if *i < 0 => format!("({i})"),
        Value::Int(i) => i.to_string(),
        Value::Real(r) => render_real(*r),
        Value::Bool(true) => "A68_TRUE".to_string(),
        Value::Bool(false) => "A68_FALSE".to_string(),
        Value::Char(c) => render_char(*c),
        Value::Bits(b) => format!("0x{b:x}u"),
        Value::Complex(re, im) => format!("{{{}, {}}}", render_real(*re), render_real(*im)),
    }
}

fn render_real(r: f64) -> String {
    if r == f64::MAX {
        "A68_MAX_REAL".to_string()
    } else if r == -f64::MAX {
        "(-A68_MAX_REAL)".to_string()
    } else if r == f64::MIN_POSITIVE {
        "A68_MIN_REAL".to_string()
    } else if r.is_sign_negative() {
        format!("({r:e})")
    } else {
        format!("{r:e}")
    }
}

fn render_char(c: u8) -> String {
    match c {
        b'\'' => "'\\''".to_string(),
        b'\\' => "'\\\\'".to_string(),
        b'\n' => "'\\n'".to_string(),
        b'\t' => "'\\t'".to_string(),
        b'\r' => "'\\r'".to_string(),
        0 => "'\\0'".to_string(),
        0x20..=0x7e => format!("'{}'", c as char),
        _ => format!("'\\x{c:02x}'"),
    }
}

/// Defines a `COMPL` constant once at file scope and returns its name.
fn complex_global(ctx: &mut CompilationContext, re: f64, im: f64) -> String {
    let name = format!("_complex_{:016x}_{:016x}", re.to_bits(), im.to_bits());
    if ctx.unique.insert(&name) {
        ctx.global(format_args!(
            "static const A68_REAL {name}[2] = {};",
            render_literal(&Value::Complex(re, im))
        ));
    }
    name
}
