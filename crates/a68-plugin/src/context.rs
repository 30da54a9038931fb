//! State threaded through one compilation run.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Write as _};
use std::hash::{Hash, Hasher};

use a68_lang::{Genie, NodeId, SyntaxTree};
use itertools::Itertools;
use rustc_hash::{FxHashMap, FxHashSet, FxHasher};
use smol_str::SmolStr;

use crate::error::Diagnostic;
use crate::options::Options;

const INDENT: &str = "  ";

/// Writes one indented line of generated code through [`CompilationContext::line`].
macro_rules! emit {
    ($ctx:expr, $($arg:tt)*) => {
        $ctx.line(format_args!($($arg)*))
    };
}
pub(crate) use emit;

/// The three passes an inline emission makes over an expression, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    /// Register temporaries.
    Declare,
    /// Emit the statements that compute them.
    Execute,
    /// Produce a side-effect free expression for the value.
    Yield,
}

/// What a booking caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Pointer to an identifier's frame slot.
    Fetch,
    /// Pointer to the object a reference identifier refers to.
    Deref,
    /// Address of a row element, keyed by the indexer.
    Slice,
    /// Address of a struct field, keyed by the selector.
    Selection,
}

/// Cheap identity of a subtree: a structural hash plus the node to compare on collision.
#[derive(Debug, Clone, Copy)]
pub struct Payload {
    pub node: NodeId,
    pub hash: u64,
}

impl Payload {
    pub fn new(tree: &SyntaxTree, node: NodeId) -> Self {
        Self {
            node,
            hash: structural_hash(tree, node),
        }
    }

    fn matches(&self, tree: &SyntaxTree, other: &Payload) -> bool {
        self.hash == other.hash && same_structure(tree, self.node, other.node)
    }
}

pub fn structural_hash(tree: &SyntaxTree, node: NodeId) -> u64 {
    let mut hasher = FxHasher::default();
    hash_subtree(tree, node, &mut hasher);
    hasher.finish()
}

fn hash_subtree(tree: &SyntaxTree, node: NodeId, hasher: &mut impl Hasher) {
    let n = tree.node(node);
    n.attribute.hash(hasher);
    n.symbol.hash(hasher);
    n.tag.hash(hasher);
    n.mode.hash(hasher);
    tree.children(node).count().hash(hasher);
    for child in tree.children(node) {
        hash_subtree(tree, child, hasher);
    }
}

pub fn same_structure(tree: &SyntaxTree, a: NodeId, b: NodeId) -> bool {
    if a == b {
        return true;
    }
    let (x, y) = (tree.node(a), tree.node(b));
    x.attribute == y.attribute
        && x.symbol == y.symbol
        && x.tag == y.tag
        && x.mode == y.mode
        && tree
            .children(a)
            .zip_longest(tree.children(b))
            .all(|pair| pair.both().is_some_and(|(p, q)| same_structure(tree, p, q)))
}

#[derive(Debug, Clone)]
pub struct Booking {
    pub action: Action,
    pub phase: Phase,
    pub name: SmolStr,
    pub payload: Option<Payload>,
    /// The node whose emission created the entry; temporaries are named after it.
    pub node: NodeId,
}

/// Common-subexpression cache of the function being generated.
#[derive(Debug, Default)]
pub struct BookingCache {
    entries: Vec<Booking>,
}

impl BookingCache {
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn mark(&self) -> usize {
        self.entries.len()
    }

    /// Forgets every entry booked since `mark`.
    pub fn truncate(&mut self, mark: usize) {
        self.entries.truncate(mark);
    }

    pub fn sign_in(&mut self, action: Action, phase: Phase, name: &str, payload: Option<Payload>, node: NodeId) {
        self.entries.push(Booking {
            action,
            phase,
            name: SmolStr::new(name),
            payload,
            node,
        });
    }

    /// The first entry for `action` on `name` booked at `phase` or later with an equal payload.
    pub fn signed_in(
        &self,
        tree: &SyntaxTree,
        action: Action,
        phase: Phase,
        name: &str,
        payload: Option<&Payload>,
    ) -> Option<&Booking> {
        self.entries.iter().find(|b| {
            b.action == action
                && b.phase >= phase
                && b.name == name
                && match (&b.payload, payload) {
                    (None, None) => true,
                    (Some(booked), Some(wanted)) => booked.matches(tree, wanted),
                    _ => false,
                }
        })
    }
}

/// Local temporaries of one generated function, grouped by storage class.
#[derive(Debug, Default)]
pub struct DeclarationRegistry {
    classes: BTreeMap<SmolStr, BTreeSet<SmolStr>>,
}

impl DeclarationRegistry {
    pub fn add(&mut self, class: &str, name: &str) {
        self.classes
            .entry(SmolStr::new(class))
            .or_default()
            .insert(SmolStr::new(name));
    }

    pub fn clear(&mut self) {
        self.classes.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn contains(&self, class: &str, name: &str) -> bool {
        self.classes.get(class).is_some_and(|names| names.contains(name))
    }

    /// One C declaration per storage class, classes and names in sorted order.
    pub fn lines(&self) -> impl Iterator<Item = String> + '_ {
        self.classes
            .iter()
            .map(|(class, names)| format!("{class} {};", names.iter().join(", ")))
    }
}

/// Names of argument-free functions already emitted somewhere in the program.
#[derive(Debug, Default)]
pub struct UniqueFunctions {
    names: FxHashSet<SmolStr>,
}

impl UniqueFunctions {
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Returns `false` when `name` was already registered.
    pub fn insert(&mut self, name: &str) -> bool {
        self.names.insert(SmolStr::new(name))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[derive(Debug)]
pub struct CompilationContext {
    pub options: Options,
    /// Tier the current pass runs at.
    pub tier: u8,
    pub declarations: DeclarationRegistry,
    pub booking: BookingCache,
    pub unique: UniqueFunctions,
    pub genie: Genie,
    /// Literals folded for the current function; `None` marks a fold that failed.
    pub folded: FxHashMap<NodeId, Option<String>>,
    indent: usize,
    out: String,
    globals: String,
    function_counter: usize,
    error_count: usize,
    diagnostics: Vec<Diagnostic>,
    compiled: Vec<(NodeId, SmolStr)>,
}

impl CompilationContext {
    pub fn new(options: Options) -> Self {
        Self {
            options,
            tier: options.tier(),
            declarations: DeclarationRegistry::default(),
            booking: BookingCache::default(),
            unique: UniqueFunctions::default(),
            genie: Genie::new(),
            folded: FxHashMap::default(),
            indent: 0,
            out: String::new(),
            globals: String::new(),
            function_counter: 0,
            error_count: 0,
            diagnostics: Vec::new(),
            compiled: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.options);
    }

    pub fn checked(&self) -> bool {
        self.options.checked
    }

    /// Starts a new generated function: fresh declarations, bookings and folded literals.
    pub fn begin_function(&mut self) -> usize {
        self.declarations.clear();
        self.booking.clear();
        self.folded.clear();
        self.indent = 0;
        self.function_counter += 1;
        self.function_counter
    }

    pub fn function_count(&self) -> usize {
        self.function_counter
    }

    pub fn indent(&mut self) {
        self.indent += 1;
    }

    pub fn outdent(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }

    /// Writes one indented line of generated code.
    pub fn line(&mut self, args: fmt::Arguments<'_>) {
        for _ in 0..self.indent {
            self.out.push_str(INDENT);
        }
        let _ = self.out.write_fmt(args);
        self.out.push('\n');
    }

    pub fn blank_line(&mut self) {
        self.out.push('\n');
    }

    /// Prints the registered declarations at the current indentation.
    pub fn print_declarations(&mut self) {
        let lines = self.declarations.lines().collect::<Vec<_>>();
        for line in lines {
            self.line(format_args!("{line}"));
        }
    }

    /// Appends a file-scope definition.
    pub fn global(&mut self, args: fmt::Arguments<'_>) {
        let _ = self.globals.write_fmt(args);
        self.globals.push('\n');
    }

    /// Records a non-fatal problem; the affected fragment stays interpreted.
    pub fn error(&mut self, diagnostic: Diagnostic) {
        tracing::warn!(line = diagnostic.line, node = %diagnostic.node, "{}", diagnostic.message());
        self.error_count += 1;
        self.diagnostics.push(diagnostic);
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn record_compiled(&mut self, node: NodeId, name: &str) {
        self.compiled.push((node, SmolStr::new(name)));
    }

    pub fn compiled(&self) -> &[(NodeId, SmolStr)] {
        &self.compiled
    }

    pub fn out(&self) -> &str {
        &self.out
    }

    pub fn out_mark(&self) -> usize {
        self.out.len()
    }

    /// Drops generated text written after `mark`.
    pub fn truncate_out(&mut self, mark: usize) {
        self.out.truncate(mark);
    }

    pub fn globals(&self) -> &str {
        &self.globals
    }

    /// Hands out `(globals, functions, compiled, error count, diagnostics)` and empties the context.
    pub fn take(&mut self) -> (String, String, Vec<(NodeId, SmolStr)>, usize, Vec<Diagnostic>) {
        let taken = (
            std::mem::take(&mut self.globals),
            std::mem::take(&mut self.out),
            std::mem::take(&mut self.compiled),
            self.error_count,
            std::mem::take(&mut self.diagnostics),
        );
        self.reset();
        taken
    }
}

/// Lower-case C identifier for a source name such as `max int`.
pub fn c_identifier(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect::<String>()
        .split('_')
        .filter(|s| !s.is_empty())
        .join("_")
}
