//! `a68-lang` holds the front-end side of the a68 toolchain that code generators read:
//! the annotated syntax tree, the mode table, symbol tags, the standard environment
//! and the interpreter's stack-machine primitives.
//!
//! ## Examples
//!
//! ```rust
//! use a68_lang::{Builtin, Genie, TreeBuilder, Value};
//!
//! let mut b = TreeBuilder::new();
//! let int = b.modes().standard().int;
//! let one = b.denotation("1", int);
//! let two = b.denotation("2", int);
//! let sum = b.formula(one, Builtin::IntAdd, two);
//! let tree = b.finish(sum);
//!
//! assert_eq!(Genie::new().evaluate(&tree, sum), Ok(Value::Int(3)));
//! ```
mod arena;
mod builder;
mod builtin;
mod error;
mod genie;
mod mode;
mod tag;
mod tree;
mod value;

pub use arena::{Arena, ArenaId};
pub use builder::{ElsePart, LoopParts, OutPart, TreeBuilder, operand_prims};
pub use builtin::{Builtin, BuiltinError, Prim, Rendering, Signature, StandardEnvironment};
pub use error::RuntimeError;
pub use genie::{Genie, operator_builtin};
pub use mode::{Field, Mode, ModeId, ModeKind, ModeTable, StandardModes};
pub use tag::{ScopeTable, TableId, Tag, TagId, TagKind};
pub use tree::{Annotation, Attribute, Node, NodeId, Siblings, SyntaxTree};
pub use value::Value;

#[cfg(feature = "tree-json")]
pub fn tree_from_json(json: &str) -> Result<SyntaxTree, serde_json::Error> {
    serde_json::from_str(json)
}

#[cfg(feature = "tree-json")]
pub fn tree_to_json(tree: &SyntaxTree) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(tree)
}
