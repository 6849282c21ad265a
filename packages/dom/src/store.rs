//! # Node Store Adapter
//!
//! Boundary to the persistent graph store. The tree keeps the authoritative
//! in-memory node table; the store receives the touched nodes of each
//! committed transaction and may refuse the commit, in which case the
//! engine rolls the in-memory tree back as well.

use crate::node::{Node, NodeId};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("No transaction in progress")]
    NoTransaction,

    #[error("Transaction already in progress")]
    TransactionInProgress,

    #[error("Commit failed: {0}")]
    CommitFailed(String),

    #[error("Node not found in store: {0}")]
    NodeNotFound(NodeId),
}

pub trait NodeStore {
    fn begin_transaction(&mut self) -> Result<(), StoreError>;

    fn commit(&mut self) -> Result<(), StoreError>;

    fn rollback(&mut self) -> Result<(), StoreError>;

    fn load_node(&self, id: NodeId) -> Result<Node, StoreError>;

    /// Stage a node write inside the current transaction
    fn persist(&mut self, node: &Node) -> Result<(), StoreError>;

    /// Stage a node removal inside the current transaction
    fn delete(&mut self, id: NodeId) -> Result<(), StoreError>;
}

/// In-memory store with staged writes, used by tests and the CLI
#[derive(Debug, Default)]
pub struct MemoryStore {
    committed: HashMap<NodeId, Node>,
    staged: Option<HashMap<NodeId, Option<Node>>>,
    fail_next_commit: Option<String>,
    commits: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next commit fail with the given reason
    pub fn fail_next_commit(&mut self, reason: impl Into<String>) {
        self.fail_next_commit = Some(reason.into());
    }

    pub fn commit_count(&self) -> usize {
        self.commits
    }

    pub fn len(&self) -> usize {
        self.committed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.committed.is_empty()
    }

    pub fn in_transaction(&self) -> bool {
        self.staged.is_some()
    }
}

impl NodeStore for MemoryStore {
    fn begin_transaction(&mut self) -> Result<(), StoreError> {
        if self.staged.is_some() {
            return Err(StoreError::TransactionInProgress);
        }
        self.staged = Some(HashMap::new());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        let staged = self.staged.take().ok_or(StoreError::NoTransaction)?;

        if let Some(reason) = self.fail_next_commit.take() {
            return Err(StoreError::CommitFailed(reason));
        }

        for (id, node) in staged {
            match node {
                Some(node) => {
                    self.committed.insert(id, node);
                }
                None => {
                    self.committed.remove(&id);
                }
            }
        }
        self.commits += 1;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        self.staged.take().ok_or(StoreError::NoTransaction)?;
        Ok(())
    }

    fn load_node(&self, id: NodeId) -> Result<Node, StoreError> {
        if let Some(staged) = &self.staged {
            if let Some(entry) = staged.get(&id) {
                return entry.clone().ok_or(StoreError::NodeNotFound(id));
            }
        }
        self.committed
            .get(&id)
            .cloned()
            .ok_or(StoreError::NodeNotFound(id))
    }

    fn persist(&mut self, node: &Node) -> Result<(), StoreError> {
        let staged = self.staged.as_mut().ok_or(StoreError::NoTransaction)?;
        staged.insert(node.id(), Some(node.clone()));
        Ok(())
    }

    fn delete(&mut self, id: NodeId) -> Result<(), StoreError> {
        let staged = self.staged.as_mut().ok_or(StoreError::NoTransaction)?;
        staged.insert(id, None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeKind, NodeSpec};

    fn node(id: u64) -> Node {
        Node::new(NodeId(id), NodeSpec::new(NodeKind::element("div")))
    }

    #[test]
    fn test_writes_visible_after_commit() {
        let mut store = MemoryStore::new();
        store.begin_transaction().unwrap();
        store.persist(&node(1)).unwrap();

        assert!(store.load_node(NodeId(1)).is_ok());
        assert!(store.is_empty());

        store.commit().unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.commit_count(), 1);
    }

    #[test]
    fn test_rollback_discards_staged_writes() {
        let mut store = MemoryStore::new();
        store.begin_transaction().unwrap();
        store.persist(&node(1)).unwrap();
        store.rollback().unwrap();

        assert_eq!(
            store.load_node(NodeId(1)),
            Err(StoreError::NodeNotFound(NodeId(1)))
        );
    }

    #[test]
    fn test_injected_commit_failure() {
        let mut store = MemoryStore::new();
        store.fail_next_commit("disk full");
        store.begin_transaction().unwrap();
        store.persist(&node(1)).unwrap();

        assert_eq!(
            store.commit(),
            Err(StoreError::CommitFailed("disk full".to_string()))
        );
        assert!(!store.in_transaction());
        assert!(store.is_empty());
    }

    #[test]
    fn test_nested_begin_is_rejected() {
        let mut store = MemoryStore::new();
        store.begin_transaction().unwrap();
        assert_eq!(
            store.begin_transaction(),
            Err(StoreError::TransactionInProgress)
        );
    }

    #[test]
    fn test_writes_outside_transaction_fail() {
        let mut store = MemoryStore::new();
        assert_eq!(store.persist(&node(1)), Err(StoreError::NoTransaction));
        assert_eq!(store.delete(NodeId(1)), Err(StoreError::NoTransaction));
    }
}
