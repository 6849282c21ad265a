//! # Ordered application
//!
//! Operations run in priority order (Delete, Create, Move, Update) inside a
//! single mutation transaction. A skipped operation is not an error; any
//! error aborts the pass and the whole transaction rolls back.

use crate::compute::MergePlan;
use crate::config::DiffConfig;
use crate::errors::DiffResult;
use crate::operation::{sort_operations, MergeOperation};
use crate::position::{find_insert_position, HashIndex};
use pagetree_dom::{DomResult, MutationEngine, NodeId, NodeStore};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SkipReason {
    /// Parent hash did not resolve in the existing tree
    NoInsertPosition,
    /// The parent takes part in a shared component relation
    SyncedParent,
    /// Same parent and same next sibling already
    AlreadyInPlace,
    /// The existing node is gone
    UnknownNode,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::NoInsertPosition => "no insert position",
            SkipReason::SyncedParent => "synced parent",
            SkipReason::AlreadyInPlace => "already in place",
            SkipReason::UnknownNode => "unknown node",
        };
        write!(f, "{}", text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Outcome {
    Applied,
    Skipped { reason: SkipReason },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEntry {
    pub operation: MergeOperation,
    pub outcome: Outcome,
}

/// Every operation of a pass with its outcome, in execution order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergeReport {
    pub entries: Vec<ReportEntry>,
}

impl MergeReport {
    pub fn applied(&self) -> impl Iterator<Item = &MergeOperation> {
        self.entries
            .iter()
            .filter(|e| e.outcome == Outcome::Applied)
            .map(|e| &e.operation)
    }

    pub fn skipped(&self) -> impl Iterator<Item = (&MergeOperation, SkipReason)> {
        self.entries.iter().filter_map(|e| match e.outcome {
            Outcome::Skipped { reason } => Some((&e.operation, reason)),
            Outcome::Applied => None,
        })
    }

    pub fn applied_count(&self) -> usize {
        self.applied().count()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped().count()
    }
}

fn skipped(reason: SkipReason) -> Outcome {
    Outcome::Skipped { reason }
}

impl MergePlan {
    /// Apply the plan through `engine` in one transaction
    #[instrument(skip_all)]
    pub fn apply<S: NodeStore>(
        self,
        engine: &mut MutationEngine<'_, S>,
        config: &DiffConfig,
    ) -> DiffResult<MergeReport> {
        let MergePlan {
            mut operations,
            mut index,
        } = self;
        sort_operations(&mut operations);

        let report = engine.transaction(|engine| {
            let mut report = MergeReport::default();
            for operation in operations {
                let outcome = apply_operation(engine, &mut index, &operation, config)?;
                match outcome {
                    Outcome::Applied => debug!(operation = %operation, "Applied"),
                    Outcome::Skipped { reason } => {
                        debug!(operation = %operation, reason = %reason, "Skipped")
                    }
                }
                report.entries.push(ReportEntry { operation, outcome });
            }
            Ok(report)
        })?;

        info!(
            applied = report.applied_count(),
            skipped = report.skipped_count(),
            "Merge pass complete"
        );
        Ok(report)
    }
}

fn parent_is_synced<S: NodeStore>(engine: &MutationEngine<'_, S>, id: NodeId) -> bool {
    engine
        .tree()
        .parent(id)
        .map(|p| engine.tree().is_synced(p))
        .unwrap_or(false)
}

fn apply_operation<S: NodeStore>(
    engine: &mut MutationEngine<'_, S>,
    index: &mut HashIndex,
    operation: &MergeOperation,
    config: &DiffConfig,
) -> DomResult<Outcome> {
    match operation {
        MergeOperation::Delete { original_node } => {
            if !engine.tree().contains(*original_node) {
                return Ok(skipped(SkipReason::UnknownNode));
            }
            if parent_is_synced(engine, *original_node) {
                return Ok(skipped(SkipReason::SyncedParent));
            }
            engine.trash_node(*original_node)?;
            Ok(Outcome::Applied)
        }

        MergeOperation::Create {
            parent_hash,
            sibling_hashes,
            node_hash,
            spec,
        } => {
            let Some(position) =
                find_insert_position(engine.tree(), index, parent_hash, sibling_hashes)
            else {
                return Ok(skipped(SkipReason::NoInsertPosition));
            };
            if engine.tree().is_synced(position.parent) {
                return Ok(skipped(SkipReason::SyncedParent));
            }

            let document = engine.tree().owner_document(position.parent);
            let id = engine.create(document, spec.clone())?;
            let anchor = position
                .sibling
                .filter(|s| engine.tree().parent(*s) == Some(position.parent));
            engine.insert_before(position.parent, id, anchor)?;
            index.insert(node_hash.clone(), id);
            Ok(Outcome::Applied)
        }

        MergeOperation::Move {
            parent_hash,
            sibling_hashes,
            node_hash,
            original_node,
        } => {
            let Some(position) =
                find_insert_position(engine.tree(), index, parent_hash, sibling_hashes)
            else {
                return Ok(skipped(SkipReason::NoInsertPosition));
            };
            let Some(original) = original_node
                .or_else(|| index.get(node_hash))
                .filter(|id| engine.tree().contains(*id))
            else {
                return Ok(skipped(SkipReason::UnknownNode));
            };
            apply_move(engine, position.parent, position.sibling, original, config)
        }

        MergeOperation::Update {
            original_node,
            spec,
            ..
        } => {
            if !engine.tree().contains(*original_node) {
                return Ok(skipped(SkipReason::UnknownNode));
            }
            if parent_is_synced(engine, *original_node) {
                return Ok(skipped(SkipReason::SyncedParent));
            }
            // Ownership stays with the existing node
            let mut spec = spec.clone();
            let current = engine.tree().node(*original_node)?.properties();
            spec.properties.owner = current.owner.clone();
            spec.properties.grants = current.grants.clone();
            engine.update_node(*original_node, spec)?;
            Ok(Outcome::Applied)
        }
    }
}

/// Insert `original` before `sibling`, climbing from the sibling towards
/// the root when the tree rejects the position, then fall back to append
fn apply_move<S: NodeStore>(
    engine: &mut MutationEngine<'_, S>,
    parent: NodeId,
    sibling: Option<NodeId>,
    original: NodeId,
    config: &DiffConfig,
) -> DomResult<Outcome> {
    if engine.tree().is_synced(parent) {
        return Ok(skipped(SkipReason::SyncedParent));
    }

    let original_parent = engine.tree().parent(original);
    let original_sibling = engine.tree().next_sibling(original);
    if original_parent == Some(parent) {
        if sibling.is_some() && sibling == original_sibling {
            return Ok(skipped(SkipReason::AlreadyInPlace));
        }
        if sibling.is_none() && original_sibling.is_none() {
            return Ok(skipped(SkipReason::AlreadyInPlace));
        }
    }

    let mut anchor = sibling;
    let mut attempts = 0;
    while let Some(current) = anchor {
        if attempts >= config.max_ascent_attempts {
            break;
        }
        attempts += 1;

        match engine.insert_before(parent, original, Some(current)) {
            Ok(_) => return Ok(Outcome::Applied),
            Err(e) if e.is_recoverable() => {
                debug!(node = %original, anchor = %current, error = %e, "Insert rejected, ascending");
            }
            Err(e) => return Err(e),
        }
        anchor = engine.tree().parent(current);
    }

    engine.append_child(parent, original)?;
    Ok(Outcome::Applied)
}
