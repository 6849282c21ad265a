//! Bidirectional shared-component index.
//!
//! component id → mirror ids, and mirror id → component id. Maintained by
//! the mutation engine; never derived from a tree walk.

use crate::node::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncIndex {
    mirrors: HashMap<NodeId, BTreeSet<NodeId>>,
    component_of: HashMap<NodeId, NodeId>,
}

impl SyncIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `mirror` as mirroring `component`. Returns the component the
    /// mirror previously pointed at.
    pub(crate) fn link(&mut self, mirror: NodeId, component: NodeId) -> Option<NodeId> {
        let previous = self.unlink(mirror);
        self.mirrors.entry(component).or_default().insert(mirror);
        self.component_of.insert(mirror, component);
        previous
    }

    pub(crate) fn unlink(&mut self, mirror: NodeId) -> Option<NodeId> {
        let component = self.component_of.remove(&mirror)?;
        if let Some(set) = self.mirrors.get_mut(&component) {
            set.remove(&mirror);
            if set.is_empty() {
                self.mirrors.remove(&component);
            }
        }
        Some(component)
    }

    /// Drop every relation touching `id`
    pub(crate) fn forget(&mut self, id: NodeId) {
        self.unlink(id);
        if let Some(mirrors) = self.mirrors.remove(&id) {
            for mirror in mirrors {
                self.component_of.remove(&mirror);
            }
        }
    }

    pub fn component_of(&self, mirror: NodeId) -> Option<NodeId> {
        self.component_of.get(&mirror).copied()
    }

    pub fn mirrors_of(&self, component: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.mirrors
            .get(&component)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    pub fn has_mirrors(&self, component: NodeId) -> bool {
        self.mirrors
            .get(&component)
            .map(|set| !set.is_empty())
            .unwrap_or(false)
    }

    /// Has a shared component or is mirrored by others
    pub fn is_synced(&self, id: NodeId) -> bool {
        self.component_of.contains_key(&id) || self.has_mirrors(id)
    }
}
