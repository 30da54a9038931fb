use std::fmt;

#[cfg(feature = "tree-json")]
use serde::{Deserialize, Serialize};

/// A primitive value as it lives on the interpreter stack.
#[cfg_attr(feature = "tree-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int(i64),
    Real(f64),
    Bool(bool),
    Char(u8),
    Bits(u64),
    /// `COMPL`, stored as its two `REAL` fields.
    Complex(f64, f64),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "INT",
            Value::Real(_) => "REAL",
            Value::Bool(_) => "BOOL",
            Value::Char(_) => "CHAR",
            Value::Bits(_) => "BITS",
            Value::Complex(_, _) => "COMPL",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// `true` when every real component is finite.
    pub fn is_finite(&self) -> bool {
        match self {
            Value::Real(r) => r.is_finite(),
            Value::Complex(re, im) => re.is_finite() && im.is_finite(),
            _ => true,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r:e}"),
            Value::Bool(true) => write!(f, "TRUE"),
            Value::Bool(false) => write!(f, "FALSE"),
            Value::Char(c) => write!(f, "\"{}\"", *c as char),
            Value::Bits(b) => write!(f, "16r{b:x}"),
            Value::Complex(re, im) => write!(f, "{re:e} I {im:e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Value::Int(42), "42")]
    #[case(Value::Real(0.5), "5e-1")]
    #[case(Value::Bool(true), "TRUE")]
    #[case(Value::Char(b'a'), "\"a\"")]
    #[case(Value::Bits(255), "16rff")]
    fn test_display(#[case] value: Value, #[case] expected: &str) {
        assert_eq!(value.to_string(), expected);
    }

    #[test]
    fn test_is_finite() {
        assert!(Value::Real(1.0).is_finite());
        assert!(!Value::Real(f64::INFINITY).is_finite());
        assert!(!Value::Complex(1.0, f64::NAN).is_finite());
        assert!(Value::Int(i64::MAX).is_finite());
    }
}
