#[cfg(feature = "tree-json")]
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::arena::ArenaId;
use crate::builtin::Builtin;
use crate::mode::ModeId;
use crate::tree::NodeId;

pub type TagId = ArenaId<Tag>;
pub type TableId = ArenaId<ScopeTable>;

#[cfg_attr(feature = "tree-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    /// Bound by an identity declaration `m x = e`.
    Identifier,
    /// A `LOC` variable; its mode is `REF m`.
    Variable,
    Parameter,
    /// A user procedure declared with `PROC f = ...`.
    Procedure,
    Operator,
    Label,
    /// A standard-environment entry.
    Standard,
}

/// A symbol-table binding.
#[cfg_attr(feature = "tree-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub name: SmolStr,
    pub mode: ModeId,
    pub kind: TagKind,
    pub defining_node: Option<NodeId>,
    /// Defining expression of an identity declaration.
    pub value: Option<NodeId>,
    /// Routine text bound to a user procedure.
    pub body: Option<NodeId>,
    pub builtin: Option<Builtin>,
    /// Lexical level of the frame that holds the value.
    pub level: u32,
    /// Byte offset inside that frame.
    pub offset: usize,
}

impl Tag {
    pub fn is_builtin(&self) -> bool {
        self.builtin.is_some()
    }
}

/// Frame layout of a serial clause.
#[cfg_attr(feature = "tree-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeTable {
    pub level: u32,
    pub parent: Option<TableId>,
    /// Bytes the frame grows by when the clause is entered.
    pub frame_increment: usize,
    /// The clause declares routine or format texts that close over the frame.
    pub has_routines: bool,
}

impl ScopeTable {
    /// Whether entering the clause must (re)initialise its frame.
    pub fn needs_initialisation(&self) -> bool {
        self.frame_increment > 0 || self.has_routines
    }
}
