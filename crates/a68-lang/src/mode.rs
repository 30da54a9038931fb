//! The mode (type) table.
//!
//! Modes form a shared, deduplicated graph: interning a structurally equal
//! [`ModeKind`] twice yields the same [`ModeId`], so mode equality is id equality.

use itertools::Itertools;
use rustc_hash::FxHashMap;
#[cfg(feature = "tree-json")]
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::arena::{Arena, ArenaId};

pub type ModeId = ArenaId<Mode>;

#[cfg_attr(feature = "tree-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: SmolStr,
    pub mode: ModeId,
}

#[cfg_attr(feature = "tree-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModeKind {
    Void,
    Int,
    Real,
    Bool,
    Char,
    Bits,
    /// The mode of `NIL`.
    Hip,
    Ref(ModeId),
    Row { dims: u8, elem: ModeId },
    Struct(Vec<Field>),
    Union(Vec<ModeId>),
    Proc { params: Vec<ModeId>, result: ModeId },
}

#[cfg_attr(feature = "tree-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Mode {
    pub kind: ModeKind,
    /// Optional declared name (`COMPL`), printed instead of the structure.
    pub name: Option<SmolStr>,
}

/// Ids of the modes every table starts with.
#[cfg_attr(feature = "tree-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy)]
pub struct StandardModes {
    pub void: ModeId,
    pub int: ModeId,
    pub real: ModeId,
    pub bool: ModeId,
    pub char: ModeId,
    pub bits: ModeId,
    pub hip: ModeId,
    pub complex: ModeId,
    pub ref_int: ModeId,
    pub ref_real: ModeId,
    pub ref_bool: ModeId,
    pub ref_char: ModeId,
    pub ref_bits: ModeId,
    pub ref_complex: ModeId,
}

#[cfg_attr(feature = "tree-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct ModeTable {
    modes: Arena<Mode>,
    #[cfg_attr(feature = "tree-json", serde(skip))]
    index: FxHashMap<ModeKind, ModeId>,
    standard: StandardModes,
}

impl Default for ModeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeTable {
    pub fn new() -> Self {
        let mut modes = Arena::new(64);
        let mut index = FxHashMap::default();
        let mut intern = |kind: ModeKind, name: Option<&str>| {
            let id = modes.alloc(Mode {
                kind: kind.clone(),
                name: name.map(SmolStr::new),
            });
            index.insert(kind, id);
            id
        };

        let void = intern(ModeKind::Void, None);
        let int = intern(ModeKind::Int, None);
        let real = intern(ModeKind::Real, None);
        let bool = intern(ModeKind::Bool, None);
        let char = intern(ModeKind::Char, None);
        let bits = intern(ModeKind::Bits, None);
        let hip = intern(ModeKind::Hip, None);
        let complex = intern(
            ModeKind::Struct(vec![
                Field {
                    name: SmolStr::new_static("re"),
                    mode: real,
                },
                Field {
                    name: SmolStr::new_static("im"),
                    mode: real,
                },
            ]),
            Some("COMPL"),
        );
        let ref_int = intern(ModeKind::Ref(int), None);
        let ref_real = intern(ModeKind::Ref(real), None);
        let ref_bool = intern(ModeKind::Ref(bool), None);
        let ref_char = intern(ModeKind::Ref(char), None);
        let ref_bits = intern(ModeKind::Ref(bits), None);
        let ref_complex = intern(ModeKind::Ref(complex), None);

        Self {
            modes,
            index,
            standard: StandardModes {
                void,
                int,
                real,
                bool,
                char,
                bits,
                hip,
                complex,
                ref_int,
                ref_real,
                ref_bool,
                ref_char,
                ref_bits,
                ref_complex,
            },
        }
    }

    pub fn standard(&self) -> &StandardModes {
        &self.standard
    }

    /// Returns the id of `kind`, allocating it only if no equal mode exists.
    pub fn intern(&mut self, kind: ModeKind) -> ModeId {
        if self.index.is_empty() {
            self.rebuild_index();
        }
        if let Some(id) = self.index.get(&kind) {
            return *id;
        }
        let id = self.modes.alloc(Mode {
            kind: kind.clone(),
            name: None,
        });
        self.index.insert(kind, id);
        id
    }

    pub fn reference(&mut self, to: ModeId) -> ModeId {
        self.intern(ModeKind::Ref(to))
    }

    pub fn row(&mut self, elem: ModeId) -> ModeId {
        self.intern(ModeKind::Row { dims: 1, elem })
    }

    pub fn proc(&mut self, params: Vec<ModeId>, result: ModeId) -> ModeId {
        self.intern(ModeKind::Proc { params, result })
    }

    pub fn structure(&mut self, fields: &[(&str, ModeId)]) -> ModeId {
        self.intern(ModeKind::Struct(
            fields
                .iter()
                .map(|(name, mode)| Field {
                    name: SmolStr::new(name),
                    mode: *mode,
                })
                .collect(),
        ))
    }

    pub fn union(&mut self, alternatives: Vec<ModeId>) -> ModeId {
        self.intern(ModeKind::Union(alternatives))
    }

    /// Deserialized tables carry no index; rebuild it on first use.
    fn rebuild_index(&mut self) {
        self.index = self
            .modes
            .iter()
            .map(|(id, mode)| (mode.kind.clone(), id))
            .collect();
    }

    pub fn kind(&self, id: ModeId) -> &ModeKind {
        &self.modes[id].kind
    }

    pub fn get(&self, id: ModeId) -> &Mode {
        &self.modes[id]
    }

    pub fn len(&self) -> usize {
        self.modes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }

    /// The mode referred to by `REF m`, if `id` is a reference.
    pub fn deref(&self, id: ModeId) -> Option<ModeId> {
        match self.kind(id) {
            ModeKind::Ref(to) => Some(*to),
            _ => None,
        }
    }

    /// The element mode of a row, looking through one reference.
    pub fn row_element(&self, id: ModeId) -> Option<ModeId> {
        match self.kind(id) {
            ModeKind::Row { elem, .. } => Some(*elem),
            ModeKind::Ref(to) => match self.kind(*to) {
                ModeKind::Row { elem, .. } => Some(*elem),
                _ => None,
            },
            _ => None,
        }
    }

    /// Index and mode of a struct field.
    pub fn field(&self, id: ModeId, name: &str) -> Option<(usize, ModeId)> {
        match self.kind(id) {
            ModeKind::Struct(fields) => fields
                .iter()
                .position(|f| f.name == name)
                .map(|i| (i, fields[i].mode)),
            _ => None,
        }
    }

    /// Human readable rendering as used in comments and function names.
    pub fn name(&self, id: ModeId) -> String {
        let mode = &self.modes[id];
        if let Some(name) = &mode.name {
            return name.to_string();
        }
        match &mode.kind {
            ModeKind::Void => "VOID".to_string(),
            ModeKind::Int => "INT".to_string(),
            ModeKind::Real => "REAL".to_string(),
            ModeKind::Bool => "BOOL".to_string(),
            ModeKind::Char => "CHAR".to_string(),
            ModeKind::Bits => "BITS".to_string(),
            ModeKind::Hip => "HIP".to_string(),
            ModeKind::Ref(to) => format!("REF {}", self.name(*to)),
            ModeKind::Row { dims, elem } => {
                format!("[{}] {}", ",".repeat(*dims as usize - 1), self.name(*elem))
            }
            ModeKind::Struct(fields) => format!(
                "STRUCT ({})",
                fields
                    .iter()
                    .map(|f| format!("{} {}", self.name(f.mode), f.name))
                    .join(", ")
            ),
            ModeKind::Union(alts) => {
                format!("UNION ({})", alts.iter().map(|m| self.name(*m)).join(", "))
            }
            ModeKind::Proc { params, result } if params.is_empty() => {
                format!("PROC {}", self.name(*result))
            }
            ModeKind::Proc { params, result } => format!(
                "PROC ({}) {}",
                params.iter().map(|m| self.name(*m)).join(", "),
                self.name(*result)
            ),
        }
    }

    /// Lower-case identifier-safe rendering, e.g. `ref_int`, used in generated names.
    pub fn c_name(&self, id: ModeId) -> String {
        self.name(id)
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect::<String>()
            .split('_')
            .filter(|s| !s.is_empty())
            .join("_")
    }

    /// Runtime storage class of a primitive mode.
    pub fn storage_class(&self, id: ModeId) -> Option<&'static str> {
        match self.kind(id) {
            ModeKind::Int => Some("A68_INT"),
            ModeKind::Real => Some("A68_REAL"),
            ModeKind::Bool => Some("A68_BOOL"),
            ModeKind::Char => Some("A68_CHAR"),
            ModeKind::Bits => Some("A68_BITS"),
            ModeKind::Ref(_) => Some("A68_REF"),
            _ => None,
        }
    }

    /// Size in bytes of a value of this mode on the runtime stack.
    pub fn size(&self, id: ModeId) -> usize {
        match self.kind(id) {
            ModeKind::Void => 0,
            ModeKind::Int | ModeKind::Real | ModeKind::Bits => 16,
            ModeKind::Bool | ModeKind::Char => 8,
            ModeKind::Hip | ModeKind::Ref(_) | ModeKind::Proc { .. } => 24,
            ModeKind::Row { .. } => 24,
            ModeKind::Struct(fields) => fields.iter().map(|f| self.size(f.mode)).sum(),
            ModeKind::Union(alts) => 8 + alts.iter().map(|m| self.size(*m)).max().unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_intern_deduplicates() {
        let mut table = ModeTable::new();
        let int = table.standard().int;
        let a = table.row(int);
        let b = table.intern(ModeKind::Row { dims: 1, elem: int });
        assert_eq!(a, b);
        assert_eq!(table.reference(int), table.standard().ref_int);
    }

    #[test]
    fn test_complex_fields() {
        let table = ModeTable::new();
        let complex = table.standard().complex;
        assert_eq!(table.field(complex, "im"), Some((1, table.standard().real)));
        assert_eq!(table.field(complex, "nope"), None);
    }

    #[rstest]
    #[case::int(|t: &mut ModeTable| t.standard().int, "INT", "int")]
    #[case::ref_int(|t: &mut ModeTable| t.standard().ref_int, "REF INT", "ref_int")]
    #[case::row(|t: &mut ModeTable| { let r = t.standard().real; t.row(r) }, "[] REAL", "real")]
    #[case::complex(|t: &mut ModeTable| t.standard().ref_complex, "REF COMPL", "ref_compl")]
    fn test_names(
        #[case] make: fn(&mut ModeTable) -> ModeId,
        #[case] name: &str,
        #[case] c_name: &str,
    ) {
        let mut table = ModeTable::new();
        let id = make(&mut table);
        assert_eq!(table.name(id), name);
        assert_eq!(table.c_name(id), c_name);
    }
}
