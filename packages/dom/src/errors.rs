//! Error types for the content tree

use crate::node::NodeId;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomError {
    /// Insertion would create a cycle or break the document shape
    #[error("Hierarchy violation: {0}")]
    HierarchyViolation(String),

    #[error("Node {node} belongs to a different document than {document}")]
    WrongDocument { node: NodeId, document: NodeId },

    #[error("Node {child} is not a child of {parent}")]
    NotFound { parent: NodeId, child: NodeId },

    #[error("Modification of {node} not allowed: {reason}")]
    NoModificationAllowed { node: NodeId, reason: String },

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Store failure: {0}")]
    StoreFailure(#[from] StoreError),

    #[error("Node not found: {0}")]
    UnknownNode(NodeId),
}

impl DomError {
    /// Errors raised by tree validation, as opposed to the backing store.
    /// Merge passes recover from these by trying another insert position.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, DomError::StoreFailure(_))
    }
}

pub type DomResult<T> = Result<T, DomError>;
