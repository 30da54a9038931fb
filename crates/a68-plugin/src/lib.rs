//! `a68-plugin` is the selective ahead-of-time code generator of the a68 interpreter.
//!
//! It walks an annotated [`a68_lang::SyntaxTree`], picks the fragments that can run
//! faster as straight-line C against the interpreter's runtime, and emits one C
//! function per fragment. Every node it compiles is annotated with the function
//! name; everything else is left to the interpreter.
//!
//! ## Examples
//!
//! ```rust
//! use a68_lang::{Annotation, Builtin, TreeBuilder};
//! use a68_plugin::{Options, Plugin};
//!
//! let mut b = TreeBuilder::new();
//! b.open_scope();
//! let int = b.modes().standard().int;
//! let (_, a) = b.variable_declaration("a", int, None);
//! let ai = b.identifier(a);
//! let value = b.dereference(ai);
//! let one = b.denotation("1", int);
//! let sum = b.formula(value, Builtin::IntAdd, one);
//! let mut tree = b.finish(sum);
//!
//! let compiled = Plugin::new(Options::new(2)).compile(&mut tree).unwrap();
//!
//! assert_eq!(compiled.function_count(), 1);
//! assert!(matches!(tree.annotation(sum), Annotation::Compiled(_)));
//! assert!(compiled.source.contains("A68_PUSH_VALUE (p, "));
//! ```
mod classify;
mod compiler;
mod context;
mod driver;
mod error;
mod fold;
mod generate;
mod inline;
mod options;
mod predicates;

pub use classify::Classifier;
pub use compiler::{CompiledSource, PRELUDE, Plugin};
pub use context::{
    Action, Booking, BookingCache, CompilationContext, DeclarationRegistry, Payload, Phase, UniqueFunctions,
    c_identifier, same_structure, structural_hash,
};
pub use driver::{drive, drive_full, drive_tier1, drive_unit};
pub use error::{Diagnostic, Error, PluginError};
pub use fold::{Constant, fold_unit, render_literal};
pub use generate::{Entry, GENERATORS, Generator, child_path, generate};
pub use inline::inline_unit;
pub use options::{Options, tier};
pub use predicates::{
    Requirement, is_basic_mode, is_basic_mode_non_row, is_basic_struct, is_complex, is_foldable_mode, is_primitive,
    is_ref, is_ref_row, is_row,
};
