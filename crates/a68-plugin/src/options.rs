/// Optimisation tiers; each tier unlocks more shapes and keeps everything below it.
pub mod tier {
    /// Identifiers, denotations, formulas and calls of builtins.
    pub const UNITS: u8 = 1;
    /// Slices, selections, casts, widenings, assignations and identity relations.
    pub const INDEXING: u8 = 2;
    /// Whole clauses: serial, collateral, conditional, case and loop clauses, routine calls.
    pub const CLAUSES: u8 = 3;
    pub const MAX: u8 = 9;
}

/// Code generator configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// 0 disables generation; 1 runs the units-only pass; higher levels run the full pass.
    pub opt_level: u8,
    /// Emit initialisation and math-error checks matching the interpreter's checked mode.
    pub checked: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            opt_level: tier::CLAUSES,
            checked: false,
        }
    }
}

impl Options {
    pub fn new(opt_level: u8) -> Self {
        Self {
            opt_level: opt_level.min(tier::MAX),
            ..Default::default()
        }
    }

    pub fn with_checked(mut self, checked: bool) -> Self {
        self.checked = checked;
        self
    }

    pub fn tier(&self) -> u8 {
        self.opt_level.min(tier::MAX)
    }
}
