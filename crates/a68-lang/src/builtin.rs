//! The standard environment: builtin operators and procedures.
//!
//! Every builtin is a [`Builtin`] variant. A tag bound to a standard-environment entry
//! carries the variant directly, so code generators match on it instead of comparing
//! names or addresses.

#[cfg(feature = "tree-json")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mode::{ModeId, ModeKind, ModeTable};
use crate::value::Value;

/// Primitive operand/result categories of builtins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Prim {
    Int,
    Real,
    Bool,
    Char,
    Bits,
    Complex,
}

impl Prim {
    pub fn of(modes: &ModeTable, mode: ModeId) -> Option<Prim> {
        match modes.kind(mode) {
            ModeKind::Int => Some(Prim::Int),
            ModeKind::Real => Some(Prim::Real),
            ModeKind::Bool => Some(Prim::Bool),
            ModeKind::Char => Some(Prim::Char),
            ModeKind::Bits => Some(Prim::Bits),
            _ if mode == modes.standard().complex => Some(Prim::Complex),
            _ => None,
        }
    }

    pub fn mode(self, modes: &ModeTable) -> ModeId {
        let std = modes.standard();
        match self {
            Prim::Int => std.int,
            Prim::Real => std.real,
            Prim::Bool => std.bool,
            Prim::Char => std.char,
            Prim::Bits => std.bits,
            Prim::Complex => std.complex,
        }
    }
}

/// How a builtin is written in generated C.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rendering {
    /// `(a OP b)`
    Infix(&'static str),
    /// `(OP a)`
    Prefix(&'static str),
    /// `f (a, b)`
    Call(&'static str),
    /// A named runtime constant.
    Constant(&'static str),
    /// `f (dst, a, b)`; the result is written through `dst`, used for `COMPL` results.
    Out(&'static str),
}

#[derive(Debug, Clone, Copy)]
pub struct Signature {
    pub name: &'static str,
    pub params: &'static [Prim],
    pub result: Prim,
    pub rendering: Rendering,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuiltinError {
    #[error("INT overflow in \"{0}\"")]
    IntOverflow(&'static str),
    #[error("Division by zero in \"{0}\"")]
    DivisionByZero(&'static str),
    #[error("Argument out of range for \"{0}\"")]
    OutOfRange(&'static str),
    #[error("Invalid operands for \"{0}\"")]
    InvalidOperands(&'static str),
}

#[cfg_attr(feature = "tree-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    IntAdd,
    IntSub,
    IntMul,
    IntOver,
    IntMod,
    IntDiv,
    IntPow,
    IntEq,
    IntNe,
    IntLt,
    IntLe,
    IntGt,
    IntGe,
    IntNeg,
    IntPlus,
    IntAbs,
    IntSign,
    IntOdd,
    RealAdd,
    RealSub,
    RealMul,
    RealDiv,
    RealPow,
    RealEq,
    RealNe,
    RealLt,
    RealLe,
    RealGt,
    RealGe,
    RealNeg,
    RealAbs,
    RealSign,
    Entier,
    Round,
    Not,
    And,
    Or,
    BoolEq,
    BoolNe,
    CharEq,
    CharNe,
    CharLt,
    CharGt,
    Repr,
    CharAbs,
    BitsAnd,
    BitsOr,
    BitsNot,
    BitsEq,
    BitsNe,
    ComplexI,
    Re,
    Im,
    ComplexAdd,
    ComplexSub,
    ComplexMul,
    Sqrt,
    Exp,
    Ln,
    Sin,
    Cos,
    Tan,
    Arctan,
    Pi,
    MaxInt,
    MaxReal,
    MinReal,
    SmallReal,
    Random,
}

use Prim::*;
use Rendering::*;

const II: &[Prim] = &[Int, Int];
const RR: &[Prim] = &[Real, Real];
const BB: &[Prim] = &[Bool, Bool];
const CC: &[Prim] = &[Char, Char];
const XX: &[Prim] = &[Bits, Bits];
const ZZ: &[Prim] = &[Complex, Complex];
const I1: &[Prim] = &[Int];
const R1: &[Prim] = &[Real];
const B1: &[Prim] = &[Bool];
const C1: &[Prim] = &[Char];
const X1: &[Prim] = &[Bits];
const Z1: &[Prim] = &[Complex];
const NONE: &[Prim] = &[];

const fn sig(name: &'static str, params: &'static [Prim], result: Prim, rendering: Rendering) -> Signature {
    Signature {
        name,
        params,
        result,
        rendering,
    }
}

impl Builtin {
    pub const ALL: &'static [Builtin] = &[
        Builtin::IntAdd,
        Builtin::IntSub,
        Builtin::IntMul,
        Builtin::IntOver,
        Builtin::IntMod,
        Builtin::IntDiv,
        Builtin::IntPow,
        Builtin::IntEq,
        Builtin::IntNe,
        Builtin::IntLt,
        Builtin::IntLe,
        Builtin::IntGt,
        Builtin::IntGe,
        Builtin::IntNeg,
        Builtin::IntPlus,
        Builtin::IntAbs,
        Builtin::IntSign,
        Builtin::IntOdd,
        Builtin::RealAdd,
        Builtin::RealSub,
        Builtin::RealMul,
        Builtin::RealDiv,
        Builtin::RealPow,
        Builtin::RealEq,
        Builtin::RealNe,
        Builtin::RealLt,
        Builtin::RealLe,
        Builtin::RealGt,
        Builtin::RealGe,
        Builtin::RealNeg,
        Builtin::RealAbs,
        Builtin::RealSign,
        Builtin::Entier,
        Builtin::Round,
        Builtin::Not,
        Builtin::And,
        Builtin::Or,
        Builtin::BoolEq,
        Builtin::BoolNe,
        Builtin::CharEq,
        Builtin::CharNe,
        Builtin::CharLt,
        Builtin::CharGt,
        Builtin::Repr,
        Builtin::CharAbs,
        Builtin::BitsAnd,
        Builtin::BitsOr,
        Builtin::BitsNot,
        Builtin::BitsEq,
        Builtin::BitsNe,
        Builtin::ComplexI,
        Builtin::Re,
        Builtin::Im,
        Builtin::ComplexAdd,
        Builtin::ComplexSub,
        Builtin::ComplexMul,
        Builtin::Sqrt,
        Builtin::Exp,
        Builtin::Ln,
        Builtin::Sin,
        Builtin::Cos,
        Builtin::Tan,
        Builtin::Arctan,
        Builtin::Pi,
        Builtin::MaxInt,
        Builtin::MaxReal,
        Builtin::MinReal,
        Builtin::SmallReal,
        Builtin::Random,
    ];

    pub const fn signature(self) -> Signature {
        match self {
            Builtin::IntAdd => sig("+", II, Int, Infix("+")),
            Builtin::IntSub => sig("-", II, Int, Infix("-")),
            Builtin::IntMul => sig("*", II, Int, Infix("*")),
            Builtin::IntOver => sig("OVER", II, Int, Infix("/")),
            Builtin::IntMod => sig("MOD", II, Int, Call("a68_mod_int")),
            Builtin::IntDiv => sig("/", II, Real, Call("a68_div_int")),
            Builtin::IntPow => sig("**", II, Int, Call("a68_pow_int")),
            Builtin::IntEq => sig("=", II, Bool, Infix("==")),
            Builtin::IntNe => sig("/=", II, Bool, Infix("!=")),
            Builtin::IntLt => sig("<", II, Bool, Infix("<")),
            Builtin::IntLe => sig("<=", II, Bool, Infix("<=")),
            Builtin::IntGt => sig(">", II, Bool, Infix(">")),
            Builtin::IntGe => sig(">=", II, Bool, Infix(">=")),
            Builtin::IntNeg => sig("-", I1, Int, Prefix("-")),
            Builtin::IntPlus => sig("+", I1, Int, Prefix("+")),
            Builtin::IntAbs => sig("ABS", I1, Int, Call("A68_ABS")),
            Builtin::IntSign => sig("SIGN", I1, Int, Call("A68_SIGN")),
            Builtin::IntOdd => sig("ODD", I1, Bool, Call("A68_ODD")),
            Builtin::RealAdd => sig("+", RR, Real, Infix("+")),
            Builtin::RealSub => sig("-", RR, Real, Infix("-")),
            Builtin::RealMul => sig("*", RR, Real, Infix("*")),
            Builtin::RealDiv => sig("/", RR, Real, Infix("/")),
            Builtin::RealPow => sig("**", &[Real, Int], Real, Call("a68_pow_real_int")),
            Builtin::RealEq => sig("=", RR, Bool, Infix("==")),
            Builtin::RealNe => sig("/=", RR, Bool, Infix("!=")),
            Builtin::RealLt => sig("<", RR, Bool, Infix("<")),
            Builtin::RealLe => sig("<=", RR, Bool, Infix("<=")),
            Builtin::RealGt => sig(">", RR, Bool, Infix(">")),
            Builtin::RealGe => sig(">=", RR, Bool, Infix(">=")),
            Builtin::RealNeg => sig("-", R1, Real, Prefix("-")),
            Builtin::RealAbs => sig("ABS", R1, Real, Call("fabs")),
            Builtin::RealSign => sig("SIGN", R1, Int, Call("A68_SIGN")),
            Builtin::Entier => sig("ENTIER", R1, Int, Call("a68_entier")),
            Builtin::Round => sig("ROUND", R1, Int, Call("a68_round")),
            Builtin::Not => sig("NOT", B1, Bool, Prefix("!")),
            Builtin::And => sig("AND", BB, Bool, Infix("&")),
            Builtin::Or => sig("OR", BB, Bool, Infix("|")),
            Builtin::BoolEq => sig("=", BB, Bool, Infix("==")),
            Builtin::BoolNe => sig("/=", BB, Bool, Infix("!=")),
            Builtin::CharEq => sig("=", CC, Bool, Infix("==")),
            Builtin::CharNe => sig("/=", CC, Bool, Infix("!=")),
            Builtin::CharLt => sig("<", CC, Bool, Infix("<")),
            Builtin::CharGt => sig(">", CC, Bool, Infix(">")),
            Builtin::Repr => sig("REPR", I1, Char, Call("a68_repr")),
            Builtin::CharAbs => sig("ABS", C1, Int, Call("A68_TO_UCHAR")),
            Builtin::BitsAnd => sig("AND", XX, Bits, Infix("&")),
            Builtin::BitsOr => sig("OR", XX, Bits, Infix("|")),
            Builtin::BitsNot => sig("NOT", X1, Bits, Prefix("~")),
            Builtin::BitsEq => sig("=", XX, Bool, Infix("==")),
            Builtin::BitsNe => sig("/=", XX, Bool, Infix("!=")),
            Builtin::ComplexI => sig("I", RR, Complex, Out("a68_complex_i")),
            Builtin::Re => sig("RE", Z1, Real, Call("A68_RE")),
            Builtin::Im => sig("IM", Z1, Real, Call("A68_IM")),
            Builtin::ComplexAdd => sig("+", ZZ, Complex, Out("a68_complex_add")),
            Builtin::ComplexSub => sig("-", ZZ, Complex, Out("a68_complex_sub")),
            Builtin::ComplexMul => sig("*", ZZ, Complex, Out("a68_complex_mul")),
            Builtin::Sqrt => sig("sqrt", R1, Real, Call("sqrt")),
            Builtin::Exp => sig("exp", R1, Real, Call("exp")),
            Builtin::Ln => sig("ln", R1, Real, Call("log")),
            Builtin::Sin => sig("sin", R1, Real, Call("sin")),
            Builtin::Cos => sig("cos", R1, Real, Call("cos")),
            Builtin::Tan => sig("tan", R1, Real, Call("tan")),
            Builtin::Arctan => sig("arctan", R1, Real, Call("atan")),
            Builtin::Pi => sig("pi", NONE, Real, Constant("A68_PI")),
            Builtin::MaxInt => sig("max int", NONE, Int, Constant("A68_MAX_INT")),
            Builtin::MaxReal => sig("max real", NONE, Real, Constant("A68_MAX_REAL")),
            Builtin::MinReal => sig("min real", NONE, Real, Constant("A68_MIN_REAL")),
            Builtin::SmallReal => sig("small real", NONE, Real, Constant("A68_SMALL_REAL")),
            Builtin::Random => sig("random", NONE, Real, Call("a68_random")),
        }
    }

    pub fn name(self) -> &'static str {
        self.signature().name
    }

    pub fn arity(self) -> usize {
        self.signature().params.len()
    }

    pub fn is_operator(self) -> bool {
        self.name()
            .chars()
            .next()
            .is_some_and(|c| !c.is_ascii_lowercase())
    }

    /// Members of the constants list: pure and insensitive to anything but their operands.
    pub fn is_constant(self) -> bool {
        !matches!(self, Builtin::Random)
    }

    /// Whether a checked build must test the result for a math error.
    pub fn may_raise_math_error(self) -> bool {
        matches!(
            self,
            Builtin::Sqrt
                | Builtin::Exp
                | Builtin::Ln
                | Builtin::Tan
                | Builtin::RealDiv
                | Builtin::RealPow
                | Builtin::IntDiv
        )
    }

    /// Applies the builtin to already evaluated operands.
    ///
    /// `random` is stateful and is handled by the genie, never here.
    pub fn apply(self, args: &[Value]) -> Result<Value, BuiltinError> {
        let name = self.name();
        let invalid = || BuiltinError::InvalidOperands(name);
        let overflow = || BuiltinError::IntOverflow(name);
        let int = |i: usize| args.get(i).and_then(Value::as_int).ok_or_else(invalid);
        let real = |i: usize| args.get(i).and_then(Value::as_real).ok_or_else(invalid);
        let boolean = |i: usize| args.get(i).and_then(Value::as_bool).ok_or_else(invalid);
        let char = |i: usize| match args.get(i) {
            Some(Value::Char(c)) => Ok(*c),
            _ => Err(invalid()),
        };
        let bits = |i: usize| match args.get(i) {
            Some(Value::Bits(b)) => Ok(*b),
            _ => Err(invalid()),
        };
        let complex = |i: usize| match args.get(i) {
            Some(Value::Complex(re, im)) => Ok((*re, *im)),
            _ => Err(invalid()),
        };

        Ok(match self {
            Builtin::IntAdd => Value::Int(int(0)?.checked_add(int(1)?).ok_or_else(overflow)?),
            Builtin::IntSub => Value::Int(int(0)?.checked_sub(int(1)?).ok_or_else(overflow)?),
            Builtin::IntMul => Value::Int(int(0)?.checked_mul(int(1)?).ok_or_else(overflow)?),
            Builtin::IntOver => {
                let divisor = int(1)?;
                if divisor == 0 {
                    return Err(BuiltinError::DivisionByZero(name));
                }
                Value::Int(int(0)?.checked_div(divisor).ok_or_else(overflow)?)
            }
            Builtin::IntMod => {
                let divisor = int(1)?;
                if divisor == 0 {
                    return Err(BuiltinError::DivisionByZero(name));
                }
                Value::Int(int(0)?.checked_rem_euclid(divisor).ok_or_else(overflow)?)
            }
            Builtin::IntDiv => {
                let divisor = int(1)?;
                if divisor == 0 {
                    return Err(BuiltinError::DivisionByZero(name));
                }
                Value::Real(int(0)? as f64 / divisor as f64)
            }
            Builtin::IntPow => {
                let exponent = int(1)?;
                let exponent = u32::try_from(exponent).map_err(|_| BuiltinError::OutOfRange(name))?;
                Value::Int(int(0)?.checked_pow(exponent).ok_or_else(overflow)?)
            }
            Builtin::IntEq => Value::Bool(int(0)? == int(1)?),
            Builtin::IntNe => Value::Bool(int(0)? != int(1)?),
            Builtin::IntLt => Value::Bool(int(0)? < int(1)?),
            Builtin::IntLe => Value::Bool(int(0)? <= int(1)?),
            Builtin::IntGt => Value::Bool(int(0)? > int(1)?),
            Builtin::IntGe => Value::Bool(int(0)? >= int(1)?),
            Builtin::IntNeg => Value::Int(int(0)?.checked_neg().ok_or_else(overflow)?),
            Builtin::IntPlus => Value::Int(int(0)?),
            Builtin::IntAbs => Value::Int(int(0)?.checked_abs().ok_or_else(overflow)?),
            Builtin::IntSign => Value::Int(int(0)?.signum()),
            Builtin::IntOdd => Value::Bool(int(0)? % 2 != 0),
            Builtin::RealAdd => Value::Real(real(0)? + real(1)?),
            Builtin::RealSub => Value::Real(real(0)? - real(1)?),
            Builtin::RealMul => Value::Real(real(0)? * real(1)?),
            Builtin::RealDiv => {
                let divisor = real(1)?;
                if divisor == 0.0 {
                    return Err(BuiltinError::DivisionByZero(name));
                }
                Value::Real(real(0)? / divisor)
            }
            Builtin::RealPow => {
                let exponent = i32::try_from(int(1)?).map_err(|_| BuiltinError::OutOfRange(name))?;
                Value::Real(real(0)?.powi(exponent))
            }
            Builtin::RealEq => Value::Bool(real(0)? == real(1)?),
            Builtin::RealNe => Value::Bool(real(0)? != real(1)?),
            Builtin::RealLt => Value::Bool(real(0)? < real(1)?),
            Builtin::RealLe => Value::Bool(real(0)? <= real(1)?),
            Builtin::RealGt => Value::Bool(real(0)? > real(1)?),
            Builtin::RealGe => Value::Bool(real(0)? >= real(1)?),
            Builtin::RealNeg => Value::Real(-real(0)?),
            Builtin::RealAbs => Value::Real(real(0)?.abs()),
            Builtin::RealSign => {
                let x = real(0)?;
                Value::Int(if x > 0.0 {
                    1
                } else if x < 0.0 {
                    -1
                } else {
                    0
                })
            }
            Builtin::Entier => Value::Int(real_to_int(real(0)?.floor(), name)?),
            Builtin::Round => Value::Int(real_to_int(real(0)?.round(), name)?),
            Builtin::Not => Value::Bool(!boolean(0)?),
            Builtin::And => Value::Bool(boolean(0)? & boolean(1)?),
            Builtin::Or => Value::Bool(boolean(0)? | boolean(1)?),
            Builtin::BoolEq => Value::Bool(boolean(0)? == boolean(1)?),
            Builtin::BoolNe => Value::Bool(boolean(0)? != boolean(1)?),
            Builtin::CharEq => Value::Bool(char(0)? == char(1)?),
            Builtin::CharNe => Value::Bool(char(0)? != char(1)?),
            Builtin::CharLt => Value::Bool(char(0)? < char(1)?),
            Builtin::CharGt => Value::Bool(char(0)? > char(1)?),
            Builtin::Repr => {
                Value::Char(u8::try_from(int(0)?).map_err(|_| BuiltinError::OutOfRange(name))?)
            }
            Builtin::CharAbs => Value::Int(char(0)? as i64),
            Builtin::BitsAnd => Value::Bits(bits(0)? & bits(1)?),
            Builtin::BitsOr => Value::Bits(bits(0)? | bits(1)?),
            Builtin::BitsNot => Value::Bits(!bits(0)?),
            Builtin::BitsEq => Value::Bool(bits(0)? == bits(1)?),
            Builtin::BitsNe => Value::Bool(bits(0)? != bits(1)?),
            Builtin::ComplexI => Value::Complex(real(0)?, real(1)?),
            Builtin::Re => Value::Real(complex(0)?.0),
            Builtin::Im => Value::Real(complex(0)?.1),
            Builtin::ComplexAdd => {
                let ((a, b), (c, d)) = (complex(0)?, complex(1)?);
                Value::Complex(a + c, b + d)
            }
            Builtin::ComplexSub => {
                let ((a, b), (c, d)) = (complex(0)?, complex(1)?);
                Value::Complex(a - c, b - d)
            }
            Builtin::ComplexMul => {
                let ((a, b), (c, d)) = (complex(0)?, complex(1)?);
                Value::Complex(a * c - b * d, a * d + b * c)
            }
            Builtin::Sqrt => {
                let x = real(0)?;
                if x < 0.0 {
                    return Err(BuiltinError::OutOfRange(name));
                }
                Value::Real(x.sqrt())
            }
            Builtin::Exp => Value::Real(real(0)?.exp()),
            Builtin::Ln => {
                let x = real(0)?;
                if x <= 0.0 {
                    return Err(BuiltinError::OutOfRange(name));
                }
                Value::Real(x.ln())
            }
            Builtin::Sin => Value::Real(real(0)?.sin()),
            Builtin::Cos => Value::Real(real(0)?.cos()),
            Builtin::Tan => Value::Real(real(0)?.tan()),
            Builtin::Arctan => Value::Real(real(0)?.atan()),
            Builtin::Pi => Value::Real(std::f64::consts::PI),
            Builtin::MaxInt => Value::Int(i64::MAX),
            Builtin::MaxReal => Value::Real(f64::MAX),
            Builtin::MinReal => Value::Real(f64::MIN_POSITIVE),
            Builtin::SmallReal => Value::Real(f64::EPSILON),
            Builtin::Random => return Err(invalid()),
        })
    }
}

fn real_to_int(x: f64, name: &'static str) -> Result<i64, BuiltinError> {
    if x.is_finite() && x >= i64::MIN as f64 && x < i64::MAX as f64 {
        Ok(x as i64)
    } else {
        Err(BuiltinError::IntOverflow(name))
    }
}

/// Lookup from a standard-environment indication to its builtin.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardEnvironment;

impl StandardEnvironment {
    /// Finds the builtin called `name` whose operands have exactly the given categories.
    pub fn lookup(name: &str, operands: &[Prim]) -> Option<Builtin> {
        Builtin::ALL.iter().copied().find(|b| {
            let sig = b.signature();
            sig.name.eq_ignore_ascii_case(name) && sig.params == operands
        })
    }
}
