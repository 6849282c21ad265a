//! Error types for the diff/merge engine

use pagetree_dom::{DomError, NodeId};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DiffError {
    #[error("Tree error: {0}")]
    Dom(#[from] DomError),

    #[error("Root kinds differ: existing {existing} is a {existing_kind}, target {target} is a {target_kind}")]
    RootMismatch {
        existing: NodeId,
        existing_kind: &'static str,
        target: NodeId,
        target_kind: &'static str,
    },
}

pub type DiffResult<T> = Result<T, DiffError>;
