//! The annotated syntax tree.
//!
//! Nodes live in an [`Arena`] and are linked by `sub` (first child) and `next`
//! (sibling) ids. Each attribute has a fixed child shape:
//!
//! | attribute | children |
//! |---|---|
//! | `ParticularProgram` | enclosed clause |
//! | `ClosedClause` | `SerialClause` |
//! | `SerialClause` | units, declarations and `Label`s; owns a scope table |
//! | `CollateralClause` | units |
//! | `ConditionalClause`, `ElifPart` | `IfPart`, `ThenPart`, optional `ElsePart` or `ElifPart` |
//! | `CaseClause`, `OusePart` | `CasePart`, `InPart`, optional `OutPart` or `OusePart` |
//! | `IfPart`, `ThenPart`, `ElsePart`, `CasePart`, `OutPart`, `WhilePart`, `DoPart` | `SerialClause` |
//! | `InPart` | one unit per alternative |
//! | `LoopClause` | optional `ForPart`, `FromPart`, `ByPart`, `ToPart`/`DowntoPart`, `WhilePart`, mandatory `DoPart`, optional `UntilPart` |
//! | `FromPart`, `ByPart`, `ToPart`, `DowntoPart`, `UntilPart` | unit |
//! | `Formula` | operand, `Operator`, operand |
//! | `MonadicFormula` | `Operator`, operand |
//! | `Call` | procedure primary, arguments |
//! | `Slice` | row primary, `Indexer` |
//! | `Indexer` | index units or `Trimmer`s |
//! | `Selection` | `Selector`, secondary |
//! | `IdentityRelation` | operand, `Is`/`Isnt`, operand |
//! | `Assignation` | destination, source |
//! | `Dereferencing`, `Deproceduring`, `Cast`, `Widening`, `Voiding`, `Uniting` | operand |
//! | `IdentityDeclaration`, `VariableDeclaration`, `ProcedureDeclaration` | source (optional for variables) |
//! | `RoutineText` | body unit; owns a scope table |

#[cfg(feature = "tree-json")]
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::arena::{Arena, ArenaId};
use crate::mode::{ModeId, ModeTable};
use crate::tag::{ScopeTable, TableId, Tag, TagId};

pub type NodeId = ArenaId<Node>;

#[cfg_attr(feature = "tree-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    ParticularProgram,
    ClosedClause,
    SerialClause,
    CollateralClause,
    ConditionalClause,
    IfPart,
    ThenPart,
    ElsePart,
    ElifPart,
    CaseClause,
    CasePart,
    InPart,
    OutPart,
    OusePart,
    ConformityClause,
    LoopClause,
    ForPart,
    FromPart,
    ByPart,
    ToPart,
    DowntoPart,
    WhilePart,
    DoPart,
    UntilPart,
    IdentityDeclaration,
    VariableDeclaration,
    ProcedureDeclaration,
    ModeDeclaration,
    PriorityDeclaration,
    OperatorDeclaration,
    Label,
    Denotation,
    Identifier,
    Formula,
    MonadicFormula,
    Operator,
    Call,
    Slice,
    Indexer,
    Trimmer,
    Selection,
    Selector,
    Dereferencing,
    Deproceduring,
    Cast,
    Widening,
    Voiding,
    Uniting,
    Assignation,
    IdentityRelation,
    Is,
    Isnt,
    Nihil,
    Skip,
    Jump,
    Generator,
    RoutineText,
    FormatText,
}

impl Attribute {
    pub fn is_declaration(self) -> bool {
        matches!(
            self,
            Attribute::IdentityDeclaration
                | Attribute::VariableDeclaration
                | Attribute::ProcedureDeclaration
                | Attribute::ModeDeclaration
                | Attribute::PriorityDeclaration
                | Attribute::OperatorDeclaration
        )
    }

    /// Lower-case name used in generated function names.
    pub fn short_name(self) -> &'static str {
        match self {
            Attribute::ParticularProgram => "program",
            Attribute::ClosedClause => "closed",
            Attribute::SerialClause => "serial",
            Attribute::CollateralClause => "collateral",
            Attribute::ConditionalClause => "conditional",
            Attribute::CaseClause => "case",
            Attribute::LoopClause => "loop",
            Attribute::Denotation => "denotation",
            Attribute::Identifier => "identifier",
            Attribute::Formula => "formula",
            Attribute::MonadicFormula => "monadic",
            Attribute::Call => "call",
            Attribute::Slice => "slice",
            Attribute::Selection => "selection",
            Attribute::Dereferencing => "deref",
            Attribute::Deproceduring => "deproc",
            Attribute::Cast => "cast",
            Attribute::Widening => "widening",
            Attribute::Voiding => "voiding",
            Attribute::Uniting => "uniting",
            Attribute::Assignation => "assignation",
            Attribute::IdentityRelation => "identity_relation",
            _ => "unit",
        }
    }
}

/// The annotation slot written by the code generator.
#[cfg_attr(feature = "tree-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Annotation {
    #[default]
    Pending,
    NotGenerated,
    /// Name of the generated function that replaces interpretation of the node.
    Compiled(SmolStr),
}

impl Annotation {
    pub fn is_pending(&self) -> bool {
        matches!(self, Annotation::Pending)
    }
}

#[cfg_attr(feature = "tree-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub attribute: Attribute,
    pub mode: Option<ModeId>,
    pub tag: Option<TagId>,
    pub table: Option<TableId>,
    /// Source symbol: denotation text, identifier or operator name, field selector.
    pub symbol: SmolStr,
    pub line: u32,
    pub sub: Option<NodeId>,
    pub next: Option<NodeId>,
    #[cfg_attr(feature = "tree-json", serde(default))]
    pub annotation: Annotation,
}

impl Node {
    pub fn new(attribute: Attribute) -> Self {
        Self {
            attribute,
            mode: None,
            tag: None,
            table: None,
            symbol: SmolStr::default(),
            line: 0,
            sub: None,
            next: None,
            annotation: Annotation::Pending,
        }
    }
}

#[cfg_attr(feature = "tree-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default)]
pub struct SyntaxTree {
    pub nodes: Arena<Node>,
    pub modes: ModeTable,
    pub tags: Arena<Tag>,
    pub tables: Arena<ScopeTable>,
    pub root: Option<NodeId>,
}

impl SyntaxTree {
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn attribute(&self, id: NodeId) -> Attribute {
        self.nodes[id].attribute
    }

    pub fn is(&self, id: NodeId, attribute: Attribute) -> bool {
        self.nodes[id].attribute == attribute
    }

    pub fn mode(&self, id: NodeId) -> Option<ModeId> {
        self.nodes[id].mode
    }

    pub fn tag(&self, id: NodeId) -> Option<&Tag> {
        self.nodes[id].tag.map(|t| &self.tags[t])
    }

    pub fn table(&self, id: NodeId) -> Option<&ScopeTable> {
        self.nodes[id].table.map(|t| &self.tables[t])
    }

    pub fn sub(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].sub
    }

    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].next
    }

    pub fn symbol(&self, id: NodeId) -> &str {
        &self.nodes[id].symbol
    }

    pub fn line(&self, id: NodeId) -> u32 {
        self.nodes[id].line
    }

    pub fn annotation(&self, id: NodeId) -> &Annotation {
        &self.nodes[id].annotation
    }

    pub fn annotate(&mut self, id: NodeId, annotation: Annotation) {
        self.nodes[id].annotation = annotation;
    }

    /// Children of `id` in order.
    pub fn children(&self, id: NodeId) -> Siblings<'_> {
        Siblings {
            tree: self,
            current: self.sub(id),
        }
    }

    /// `id` followed by its following siblings.
    pub fn siblings(&self, id: NodeId) -> Siblings<'_> {
        Siblings {
            tree: self,
            current: Some(id),
        }
    }

    pub fn child(&self, id: NodeId, n: usize) -> Option<NodeId> {
        self.children(id).nth(n)
    }

    pub fn find_child(&self, id: NodeId, attribute: Attribute) -> Option<NodeId> {
        self.children(id).find(|c| self.is(*c, attribute))
    }

    pub fn mode_table(&self) -> &ModeTable {
        &self.modes
    }

    /// Approximate source text of a fragment, for comments in generated code.
    pub fn source_text(&self, id: NodeId) -> String {
        let node = self.node(id);
        let kids = || self.children(id).map(|c| self.source_text(c)).collect::<Vec<_>>();
        match node.attribute {
            Attribute::Denotation | Attribute::Identifier | Attribute::Operator | Attribute::Selector => {
                node.symbol.to_string()
            }
            Attribute::Nihil => "NIL".to_string(),
            Attribute::Skip => "SKIP".to_string(),
            Attribute::Is => ":=:".to_string(),
            Attribute::Isnt => ":/=:".to_string(),
            Attribute::Formula | Attribute::MonadicFormula | Attribute::IdentityRelation => kids().join(" "),
            Attribute::Assignation => kids().join(" := "),
            Attribute::Call => {
                let mut parts = kids().into_iter();
                let callee = parts.next().unwrap_or_default();
                format!("{callee} ({})", parts.collect::<Vec<_>>().join(", "))
            }
            Attribute::Slice => {
                let parts = kids();
                format!(
                    "{}[{}]",
                    parts.first().cloned().unwrap_or_default(),
                    parts.get(1..).unwrap_or_default().join("")
                )
            }
            Attribute::Indexer => kids().join(", "),
            Attribute::Trimmer => ":".to_string(),
            Attribute::Selection => kids().join(" OF "),
            Attribute::CollateralClause => format!("({})", kids().join(", ")),
            Attribute::ClosedClause => format!("({})", kids().join("")),
            Attribute::SerialClause => kids().join("; "),
            Attribute::ConditionalClause => format!("IF {} FI", kids().join(" ")),
            Attribute::CaseClause => format!("CASE {} ESAC", kids().join(" ")),
            Attribute::LoopClause => format!("{} OD", kids().join(" ")),
            Attribute::IfPart | Attribute::ThenPart | Attribute::ElsePart | Attribute::ElifPart => {
                let keyword = match node.attribute {
                    Attribute::IfPart => "",
                    Attribute::ThenPart => "THEN ",
                    Attribute::ElsePart => "ELSE ",
                    _ => "ELIF ",
                };
                format!("{keyword}{}", kids().join(" "))
            }
            Attribute::CasePart | Attribute::OusePart => kids().join(" "),
            Attribute::InPart => format!("IN {}", kids().join(", ")),
            Attribute::OutPart => format!("OUT {}", kids().join(" ")),
            Attribute::ForPart => format!("FOR {}", node.symbol),
            Attribute::FromPart => format!("FROM {}", kids().join("")),
            Attribute::ByPart => format!("BY {}", kids().join("")),
            Attribute::ToPart => format!("TO {}", kids().join("")),
            Attribute::DowntoPart => format!("DOWNTO {}", kids().join("")),
            Attribute::WhilePart => format!("WHILE {}", kids().join("")),
            Attribute::DoPart => format!("DO {}", kids().join("")),
            Attribute::UntilPart => format!("UNTIL {}", kids().join("")),
            Attribute::Cast => format!(
                "{} ({})",
                node.mode.map(|m| self.modes.name(m)).unwrap_or_default(),
                kids().join("")
            ),
            Attribute::IdentityDeclaration => format!("{} = {}", node.symbol, kids().join("")),
            Attribute::VariableDeclaration if node.sub.is_some() => {
                format!("{} := {}", node.symbol, kids().join(""))
            }
            Attribute::Label => format!("{}:", node.symbol),
            _ if node.sub.is_some() => kids().join(" "),
            _ => node.symbol.to_string(),
        }
    }
}

pub struct Siblings<'a> {
    tree: &'a SyntaxTree,
    current: Option<NodeId>,
}

impl Iterator for Siblings<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.current?;
        self.current = self.tree.next(current);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TreeBuilder;
    use crate::builtin::Builtin;

    #[test]
    fn test_children_and_siblings() {
        let mut b = TreeBuilder::new();
        let int = b.modes().standard().int;
        let one = b.denotation("1", int);
        let two = b.denotation("2", int);
        let sum = b.formula(one, Builtin::IntAdd, two);
        let tree = b.finish(sum);

        let kids = tree.children(sum).collect::<Vec<_>>();
        assert_eq!(kids.len(), 3);
        assert_eq!(kids[0], one);
        assert!(tree.is(kids[1], Attribute::Operator));
        assert_eq!(tree.siblings(kids[1]).count(), 2);
        assert_eq!(tree.source_text(sum), "1 + 2");
    }

    #[test]
    fn test_annotation_slot() {
        let mut b = TreeBuilder::new();
        let int = b.modes().standard().int;
        let one = b.denotation("1", int);
        let mut tree = b.finish(one);
        assert!(tree.annotation(one).is_pending());
        tree.annotate(one, Annotation::Compiled("_denotation_int_1".into()));
        assert_eq!(tree.annotation(one), &Annotation::Compiled("_denotation_int_1".into()));
    }
}
