use thiserror::Error;

use crate::builtin::BuiltinError;
use crate::tree::NodeId;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("line {line}: {source}")]
    Builtin {
        node: NodeId,
        line: u32,
        #[source]
        source: BuiltinError,
    },
    #[error("Invalid denotation \"{1}\"")]
    InvalidDenotation(NodeId, String),
    #[error("Cannot widen a value of mode {1}")]
    InvalidWidening(NodeId, &'static str),
    #[error("Evaluation stack underflow")]
    StackUnderflow(NodeId),
    #[error("Unit cannot be evaluated statically")]
    NotEvaluable(NodeId),
}

impl RuntimeError {
    #[cold]
    pub fn node(&self) -> NodeId {
        match self {
            RuntimeError::Builtin { node, .. } => *node,
            RuntimeError::InvalidDenotation(node, _) => *node,
            RuntimeError::InvalidWidening(node, _) => *node,
            RuntimeError::StackUnderflow(node) => *node,
            RuntimeError::NotEvaluable(node) => *node,
        }
    }
}
