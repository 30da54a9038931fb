use a68_lang::{NodeId, RuntimeError, SyntaxTree};
use miette::{SourceOffset, SourceSpan};

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum PluginError {
    #[error("Constant expression does not evaluate to a finite value")]
    NonFiniteConstant(NodeId),
    #[error("Constant expression cannot be folded: {0}")]
    Fold(#[from] RuntimeError),
    #[error("The syntax tree has no root")]
    MissingRoot,
    #[error("Failed to write generated source: {0}")]
    Io(String),
}

impl PluginError {
    pub fn node(&self) -> Option<NodeId> {
        match self {
            PluginError::NonFiniteConstant(node) => Some(*node),
            PluginError::Fold(err) => Some(err.node()),
            PluginError::MissingRoot | PluginError::Io(_) => None,
        }
    }
}

/// A non-fatal problem found while generating code; the fragment is left to the interpreter.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub node: NodeId,
    pub line: u32,
    pub cause: PluginError,
}

impl Diagnostic {
    pub fn new(tree: &SyntaxTree, node: NodeId, cause: PluginError) -> Self {
        Self {
            node,
            line: tree.line(node),
            cause,
        }
    }

    pub fn message(&self) -> String {
        self.cause.to_string()
    }
}

/// Aborts the run on a tree shape that successful mode checking rules out.
#[cold]
pub fn internal_error(tree: &SyntaxTree, node: NodeId, invariant: &str) -> ! {
    panic!(
        "internal error at line {} ({:?} node {node}): {invariant}",
        tree.line(node),
        tree.attribute(node)
    )
}

/// User-facing error with the source text of the offending fragment.
#[derive(PartialEq, Debug, thiserror::Error)]
#[error("{cause}")]
pub struct Error {
    pub cause: PluginError,
    pub source_code: String,
    pub location: SourceSpan,
    pub line: Option<u32>,
}

impl Error {
    pub fn from_error(tree: &SyntaxTree, cause: PluginError) -> Self {
        let (source_code, line) = match cause.node() {
            Some(node) if (node.number() as usize) < tree.nodes.len() => (tree.source_text(node), Some(tree.line(node))),
            _ => (String::new(), None),
        };
        let location = SourceSpan::new(SourceOffset::from(0), source_code.len().max(1));
        Self {
            cause,
            source_code,
            location,
            line,
        }
    }

    pub fn from_diagnostic(tree: &SyntaxTree, diagnostic: &Diagnostic) -> Self {
        Self::from_error(tree, diagnostic.cause.clone())
    }
}

impl miette::Diagnostic for Error {
    fn code<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        let code = match &self.cause {
            PluginError::NonFiniteConstant(_) => "PluginError::NonFiniteConstant",
            PluginError::Fold(_) => "PluginError::Fold",
            PluginError::MissingRoot => "PluginError::MissingRoot",
            PluginError::Io(_) => "PluginError::Io",
        };
        Some(Box::new(code))
    }

    fn severity(&self) -> Option<miette::Severity> {
        match &self.cause {
            PluginError::MissingRoot | PluginError::Io(_) => Some(miette::Severity::Error),
            _ => Some(miette::Severity::Warning),
        }
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        let msg = match &self.cause {
            PluginError::NonFiniteConstant(_) => {
                "The fragment overflows; it will be left to the interpreter, which reports the error at run time."
                    .to_string()
            }
            PluginError::Fold(_) => "The fragment will be interpreted instead of compiled.".to_string(),
            PluginError::MissingRoot => "Pass a finished syntax tree with a root node.".to_string(),
            PluginError::Io(_) => "Check that the output path is writable.".to_string(),
        };
        Some(Box::new(match self.line {
            Some(line) => format!("line {line}: {msg}"),
            None => msg,
        }))
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = miette::LabeledSpan> + '_>> {
        if self.source_code.is_empty() {
            return None;
        }
        Some(Box::new(std::iter::once(miette::LabeledSpan::new_with_span(
            Some(format!("{}", self.cause)),
            self.location,
        ))))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        if self.source_code.is_empty() {
            None
        } else {
            Some(&self.source_code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use a68_lang::TreeBuilder;
    use miette::Diagnostic as _;

    #[test]
    fn test_error_carries_fragment_source() {
        let mut b = TreeBuilder::new();
        b.line(7);
        let real = b.modes().standard().real;
        let big = b.denotation("1e308", real);
        let tree = b.finish(big);

        let err = Error::from_error(&tree, PluginError::NonFiniteConstant(big));
        assert_eq!(err.source_code, "1e308");
        assert_eq!(err.line, Some(7));
        assert_eq!(err.severity(), Some(miette::Severity::Warning));
        assert!(err.labels().is_some());
    }

    #[test]
    fn test_missing_root_has_no_source() {
        let tree = SyntaxTree::default();
        let err = Error::from_error(&tree, PluginError::MissingRoot);
        assert!(err.source_code().is_none());
        assert_eq!(err.severity(), Some(miette::Severity::Error));
    }
}
