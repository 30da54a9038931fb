//! Pure queries over modes.

use a68_lang::{ModeId, ModeKind, ModeTable};

pub fn is_primitive(modes: &ModeTable, mode: ModeId) -> bool {
    matches!(
        modes.kind(mode),
        ModeKind::Int | ModeKind::Real | ModeKind::Bool | ModeKind::Char | ModeKind::Bits
    )
}

/// A struct whose every field is primitive, such as `COMPL`.
pub fn is_basic_struct(modes: &ModeTable, mode: ModeId) -> bool {
    match modes.kind(mode) {
        ModeKind::Struct(fields) => !fields.is_empty() && fields.iter().all(|f| is_primitive(modes, f.mode)),
        _ => false,
    }
}

pub fn is_complex(modes: &ModeTable, mode: ModeId) -> bool {
    mode == modes.standard().complex
}

/// Primitive, basic struct, or a reference to one of those.
pub fn is_basic_mode(modes: &ModeTable, mode: ModeId) -> bool {
    match modes.kind(mode) {
        ModeKind::Ref(to) => match modes.kind(*to) {
            ModeKind::Ref(_) | ModeKind::Proc { .. } => false,
            _ => is_primitive(modes, *to) || is_basic_struct(modes, *to),
        },
        _ => is_primitive(modes, mode) || is_basic_struct(modes, mode),
    }
}

/// Rows are never basic; the distinction is kept for call sites that index rows.
pub fn is_basic_mode_non_row(modes: &ModeTable, mode: ModeId) -> bool {
    !matches!(modes.kind(mode), ModeKind::Row { .. }) && is_basic_mode(modes, mode)
}

pub fn is_ref(modes: &ModeTable, mode: ModeId) -> bool {
    matches!(modes.kind(mode), ModeKind::Ref(_))
}

pub fn is_ref_row(modes: &ModeTable, mode: ModeId) -> bool {
    modes
        .deref(mode)
        .is_some_and(|to| matches!(modes.kind(to), ModeKind::Row { .. }))
}

pub fn is_row(modes: &ModeTable, mode: ModeId) -> bool {
    matches!(modes.kind(mode), ModeKind::Row { .. })
}

/// Modes whose values the constant folder can render as literals.
pub fn is_foldable_mode(modes: &ModeTable, mode: ModeId) -> bool {
    is_primitive(modes, mode) || is_complex(modes, mode)
}

/// What a classified node's mode must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Basic,
    Constant,
}

impl Requirement {
    pub fn accepts(self, modes: &ModeTable, mode: ModeId) -> bool {
        match self {
            Requirement::Basic => is_basic_mode(modes, mode),
            Requirement::Constant => is_foldable_mode(modes, mode),
        }
    }
}
