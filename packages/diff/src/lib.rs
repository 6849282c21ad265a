//! # Pagetree Diff
//!
//! Reconciles an existing page with a target snapshot by content hash
//! rather than by identity.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐   ┌──────────────────┐
//! │ existing Tree    │   │ target Tree      │
//! └────────┬─────────┘   └────────┬─────────┘
//!          └──────────┬───────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ compute: Merkle pairing → MergePlan         │
//! │  - Delete / Create / Move / Update          │
//! │  - HashIndex (hash key → existing node)     │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ apply: priority order, one transaction      │
//! │  via MutationEngine → MergeReport           │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pagetree_diff::{merge, DiffConfig};
//!
//! let report = merge(&mut engine, page, &target, target_page, &DiffConfig::default())?;
//! for (op, reason) in report.skipped() {
//!     println!("{} skipped: {}", op, reason);
//! }
//! ```

mod apply;
mod compute;
mod config;
mod errors;
mod operation;
mod position;

pub use apply::{MergeReport, Outcome, ReportEntry, SkipReason};
pub use compute::{compute_operations, MergePlan};
pub use config::{DiffConfig, DEFAULT_MAX_ASCENT_ATTEMPTS};
pub use errors::{DiffError, DiffResult};
pub use operation::{sort_operations, HashKey, MergeOperation};
pub use position::{find_insert_position, HashIndex, InsertPosition};

use pagetree_dom::{MutationEngine, NodeId, NodeStore, Tree};
use tracing::instrument;

/// Compute and apply the operations that turn `existing_root` (in the
/// engine's tree) into the shape of `target_root`
#[instrument(skip(engine, target, config))]
pub fn merge<S: NodeStore>(
    engine: &mut MutationEngine<'_, S>,
    existing_root: NodeId,
    target: &Tree,
    target_root: NodeId,
    config: &DiffConfig,
) -> DiffResult<MergeReport> {
    let plan = compute_operations(engine.tree(), existing_root, target, target_root)?;
    plan.apply(engine, config)
}
