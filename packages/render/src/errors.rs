use pagetree_dom::{DomError, NodeId};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("Tree lock poisoned")]
    LockPoisoned,

    #[error("Output error: {0}")]
    Output(String),

    #[error(transparent)]
    Dom(#[from] DomError),
}

impl From<std::fmt::Error> for RenderError {
    fn from(e: std::fmt::Error) -> Self {
        RenderError::Output(e.to_string())
    }
}

pub type RenderResult<T> = Result<T, RenderError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("Unexpected character at {position} in '{expression}'")]
    Lex { expression: String, position: usize },

    #[error("Unexpected {found} in '{expression}', expected {expected}")]
    Syntax {
        expression: String,
        found: String,
        expected: String,
    },

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("{function}(): {message}")]
    InvalidArguments { function: String, message: String },
}

pub type ExpressionResult<T> = Result<T, ExpressionError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataSourceError {
    #[error("Query failed: {0}")]
    Query(String),

    #[error(transparent)]
    Expression(#[from] ExpressionError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InstructionError {
    #[error("Not a deployment instruction: {0}")]
    Unknown(String),

    #[error("Malformed deployment instruction: {0}")]
    Malformed(String),
}
