//! The interpreter's stack machine, restricted to what expression evaluation needs.
//!
//! Values are pushed and popped on a private stack; builtins pop their operands and
//! push their result. [`Genie::evaluate`] is the reference evaluation of a unit, and
//! the primitives are public so other clients can drive the same machine.

use smallvec::SmallVec;

use crate::builtin::{Builtin, Prim};
use crate::error::RuntimeError;
use crate::mode::ModeKind;
use crate::tree::{Attribute, NodeId, SyntaxTree};
use crate::value::Value;

const DEFAULT_SEED: u64 = 0x2545_f491_4f6c_dd1d;

#[derive(Debug, Clone)]
pub struct Genie {
    stack: Vec<Value>,
    seed: u64,
}

impl Default for Genie {
    fn default() -> Self {
        Self::new()
    }
}

impl Genie {
    pub fn new() -> Self {
        Self {
            stack: Vec::with_capacity(64),
            seed: DEFAULT_SEED,
        }
    }

    pub fn reset(&mut self) {
        self.stack.clear();
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub fn pop(&mut self, node: NodeId) -> Result<Value, RuntimeError> {
        self.stack.pop().ok_or(RuntimeError::StackUnderflow(node))
    }

    /// Pushes the value a denotation stands for.
    pub fn push_denotation(&mut self, tree: &SyntaxTree, node: NodeId) -> Result<(), RuntimeError> {
        let text = tree.symbol(node).trim();
        let invalid = || RuntimeError::InvalidDenotation(node, text.to_string());
        let mode = tree.mode(node).ok_or_else(invalid)?;
        let value = match tree.modes.kind(mode) {
            ModeKind::Int => Value::Int(text.parse().map_err(|_| invalid())?),
            ModeKind::Real => Value::Real(text.to_ascii_lowercase().parse().map_err(|_| invalid())?),
            ModeKind::Bool => match text {
                "TRUE" => Value::Bool(true),
                "FALSE" => Value::Bool(false),
                _ => return Err(invalid()),
            },
            ModeKind::Char => {
                let inner = text.strip_prefix('"').and_then(|t| t.strip_suffix('"')).unwrap_or(text);
                let inner = inner.replace("\"\"", "\"");
                match inner.as_bytes() {
                    [c] => Value::Char(*c),
                    _ => return Err(invalid()),
                }
            }
            ModeKind::Bits => {
                let (radix, digits) = text.split_once(['r', 'R']).unwrap_or(("2", text));
                let radix = radix.parse::<u32>().map_err(|_| invalid())?;
                if !matches!(radix, 2 | 4 | 8 | 16) {
                    return Err(invalid());
                }
                Value::Bits(u64::from_str_radix(digits, radix).map_err(|_| invalid())?)
            }
            _ => return Err(invalid()),
        };
        self.push(value);
        Ok(())
    }

    /// Pops the operands of `builtin`, applies it and pushes the result.
    pub fn apply(&mut self, builtin: Builtin, node: NodeId, line: u32) -> Result<(), RuntimeError> {
        if builtin == Builtin::Random {
            let value = self.next_random();
            self.push(Value::Real(value));
            return Ok(());
        }
        let arity = builtin.arity();
        if self.stack.len() < arity {
            return Err(RuntimeError::StackUnderflow(node));
        }
        let args: SmallVec<[Value; 2]> = self.stack.drain(self.stack.len() - arity..).collect();
        let result = builtin
            .apply(&args)
            .map_err(|source| RuntimeError::Builtin { node, line, source })?;
        self.push(result);
        Ok(())
    }

    /// Widens the top of the stack to `to`.
    pub fn widen(&mut self, to: Prim, node: NodeId) -> Result<(), RuntimeError> {
        let value = self.pop(node)?;
        let widened = match (value, to) {
            (Value::Int(i), Prim::Real) => Value::Real(i as f64),
            (Value::Int(i), Prim::Complex) => Value::Complex(i as f64, 0.0),
            (Value::Real(r), Prim::Complex) => Value::Complex(r, 0.0),
            (v, _) => return Err(RuntimeError::InvalidWidening(node, v.type_name())),
        };
        self.push(widened);
        Ok(())
    }

    fn next_random(&mut self) -> f64 {
        self.seed ^= self.seed << 13;
        self.seed ^= self.seed >> 7;
        self.seed ^= self.seed << 17;
        (self.seed >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Evaluates an expression unit the way the interpreter would.
    pub fn evaluate(&mut self, tree: &SyntaxTree, node: NodeId) -> Result<Value, RuntimeError> {
        self.reset();
        self.execute(tree, node)?;
        self.pop(node)
    }

    fn execute(&mut self, tree: &SyntaxTree, node: NodeId) -> Result<(), RuntimeError> {
        let line = tree.line(node);
        match tree.attribute(node) {
            Attribute::Denotation => self.push_denotation(tree, node),
            Attribute::Identifier => {
                let tag = tree.tag(node).ok_or(RuntimeError::NotEvaluable(node))?;
                if let Some(builtin) = tag.builtin {
                    self.apply(builtin, node, line)
                } else if let Some(value) = tag.value {
                    self.execute(tree, value)
                } else {
                    Err(RuntimeError::NotEvaluable(node))
                }
            }
            Attribute::Formula => {
                let lhs = tree.child(node, 0).ok_or(RuntimeError::NotEvaluable(node))?;
                let op = tree.child(node, 1).ok_or(RuntimeError::NotEvaluable(node))?;
                let rhs = tree.child(node, 2).ok_or(RuntimeError::NotEvaluable(node))?;
                let builtin = operator_builtin(tree, op).ok_or(RuntimeError::NotEvaluable(node))?;
                self.execute(tree, lhs)?;
                self.execute(tree, rhs)?;
                self.apply(builtin, node, line)
            }
            Attribute::MonadicFormula => {
                let op = tree.child(node, 0).ok_or(RuntimeError::NotEvaluable(node))?;
                let operand = tree.child(node, 1).ok_or(RuntimeError::NotEvaluable(node))?;
                let builtin = operator_builtin(tree, op).ok_or(RuntimeError::NotEvaluable(node))?;
                self.execute(tree, operand)?;
                self.apply(builtin, node, line)
            }
            Attribute::Call => {
                let mut children = tree.children(node);
                let callee = children.next().ok_or(RuntimeError::NotEvaluable(node))?;
                let builtin = tree
                    .tag(callee)
                    .and_then(|t| t.builtin)
                    .ok_or(RuntimeError::NotEvaluable(node))?;
                for arg in children {
                    self.execute(tree, arg)?;
                }
                self.apply(builtin, node, line)
            }
            Attribute::Deproceduring => {
                let operand = tree.sub(node).ok_or(RuntimeError::NotEvaluable(node))?;
                match tree.tag(operand).and_then(|t| t.builtin) {
                    Some(builtin) => self.apply(builtin, node, line),
                    None => Err(RuntimeError::NotEvaluable(node)),
                }
            }
            Attribute::Widening => {
                let operand = tree.sub(node).ok_or(RuntimeError::NotEvaluable(node))?;
                let to = tree
                    .mode(node)
                    .and_then(|m| Prim::of(&tree.modes, m))
                    .ok_or(RuntimeError::NotEvaluable(node))?;
                self.execute(tree, operand)?;
                self.widen(to, node)
            }
            Attribute::CollateralClause => {
                let mut members = tree.children(node);
                let (Some(re), Some(im), None) = (members.next(), members.next(), members.next()) else {
                    return Err(RuntimeError::NotEvaluable(node));
                };
                self.execute(tree, re)?;
                self.execute(tree, im)?;
                match (self.pop(node)?, self.pop(node)?) {
                    (Value::Real(im), Value::Real(re)) => {
                        self.push(Value::Complex(re, im));
                        Ok(())
                    }
                    _ => Err(RuntimeError::NotEvaluable(node)),
                }
            }
            Attribute::Cast | Attribute::ClosedClause | Attribute::SerialClause => {
                let mut children = tree.children(node);
                match (children.next(), children.next()) {
                    (Some(only), None) => self.execute(tree, only),
                    _ => Err(RuntimeError::NotEvaluable(node)),
                }
            }
            _ => Err(RuntimeError::NotEvaluable(node)),
        }
    }
}

/// The builtin an `Operator` node is bound to, if it is a standard operator.
pub fn operator_builtin(tree: &SyntaxTree, op: NodeId) -> Option<Builtin> {
    tree.tag(op).and_then(|t| t.builtin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TreeBuilder;
    use crate::builtin::BuiltinError;
    use rstest::rstest;

    #[rstest]
    #[case::int("42", Value::Int(42))]
    #[case::bool("TRUE", Value::Bool(true))]
    #[case::char("\"a\"", Value::Char(b'a'))]
    #[case::quote("\"\"\"\"", Value::Char(b'"'))]
    #[case::bits("16rff", Value::Bits(255))]
    #[case::binary("101", Value::Bits(5))]
    fn test_push_denotation(#[case] text: &str, #[case] expected: Value) {
        let mut b = TreeBuilder::new();
        let std = *b.modes().standard();
        let mode = match expected {
            Value::Int(_) => std.int,
            Value::Bool(_) => std.bool,
            Value::Char(_) => std.char,
            Value::Bits(_) => std.bits,
            _ => std.real,
        };
        let d = b.denotation(text, mode);
        let tree = b.finish(d);
        assert_eq!(Genie::new().evaluate(&tree, d), Ok(expected));
    }

    #[test]
    fn test_real_denotation_with_exponent() {
        let mut b = TreeBuilder::new();
        let real = b.modes().standard().real;
        let d = b.denotation("1.5E3", real);
        let tree = b.finish(d);
        assert_eq!(Genie::new().evaluate(&tree, d), Ok(Value::Real(1500.0)));
    }

    #[test]
    fn test_evaluate_formula_through_identity() {
        let mut b = TreeBuilder::new();
        let int = b.modes().standard().int;
        let ten = b.denotation("10", int);
        let (_, n) = b.identity_declaration("n", int, ten);
        let n_ref = b.identifier(n);
        let two = b.denotation("2", int);
        let product = b.formula(n_ref, Builtin::IntMul, two);
        let neg = b.monadic(Builtin::IntNeg, product);
        let tree = b.finish(neg);
        assert_eq!(Genie::new().evaluate(&tree, neg), Ok(Value::Int(-20)));
    }

    #[test]
    fn test_evaluate_reports_builtin_errors() {
        let mut b = TreeBuilder::new();
        let int = b.modes().standard().int;
        let one = b.denotation("1", int);
        let zero = b.denotation("0", int);
        let over = b.formula(one, Builtin::IntOver, zero);
        let tree = b.finish(over);
        assert_eq!(
            Genie::new().evaluate(&tree, over),
            Err(RuntimeError::Builtin {
                node: over,
                line: 1,
                source: BuiltinError::DivisionByZero("OVER"),
            })
        );
    }

    #[test]
    fn test_widening_and_call() {
        let mut b = TreeBuilder::new();
        let std = *b.modes().standard();
        let four = b.denotation("4", std.int);
        let widened = b.widen(four, std.real);
        let root = b.call_builtin(Builtin::Sqrt, &[widened]);
        let tree = b.finish(root);
        assert_eq!(Genie::new().evaluate(&tree, root), Ok(Value::Real(2.0)));
    }

    #[test]
    fn test_variables_are_not_evaluable() {
        let mut b = TreeBuilder::new();
        let int = b.modes().standard().int;
        let (_, x) = b.variable_declaration("x", int, None);
        let xi = b.identifier(x);
        let tree = b.finish(xi);
        assert_eq!(Genie::new().evaluate(&tree, xi), Err(RuntimeError::NotEvaluable(xi)));
    }

    #[test]
    fn test_complex_display() {
        let mut b = TreeBuilder::new();
        let std = *b.modes().standard();
        let re = b.denotation("1.5", std.real);
        let two = b.denotation("2", std.int);
        let im = b.widen(two, std.real);
        let z = b.collateral(&[re, im], std.complex);
        let tree = b.finish(z);
        assert_eq!(Genie::new().evaluate(&tree, z), Ok(Value::Complex(1.5, 2.0)));
    }
}
