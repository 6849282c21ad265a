//! # Pagetree DOM
//!
//! Persistent, DOM-shaped content tree with a permission-checked,
//! transactional mutation API.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ MutationEngine                              │
//! │  - appendChild / insertBefore / replace...  │
//! │  - validate, then apply (journaled)         │
//! │  - permission checks per write              │
//! └─────────────────────────────────────────────┘
//!          ↓ raw writes            ↓ commit
//! ┌──────────────────────┐  ┌───────────────────┐
//! │ Tree                 │  │ NodeStore         │
//! │  - node table        │  │  - begin/commit   │
//! │  - sync index        │  │  - persist nodes  │
//! │  - read API          │  └───────────────────┘
//! └──────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use pagetree_dom::{AllowAll, MemoryStore, MutationEngine, Principal, Tree};
//!
//! let mut tree = Tree::new();
//! let mut store = MemoryStore::new();
//! let mut engine = MutationEngine::new(&mut tree, &mut store, &AllowAll, Principal::admin("root"));
//!
//! let page = engine.create_page("home")?;
//! let body = engine.create_element(page, "body")?;
//! engine.append_child(page, body)?;
//!
//! assert_eq!(engine.tree().children(page), &[body]);
//! # Ok::<(), pagetree_dom::DomError>(())
//! ```

mod config;
mod errors;
mod hash;
mod mutations;
mod node;
mod permissions;
mod snapshot;
mod store;
mod sync_index;
mod tree;
pub mod visitor;

pub use config::{MutationConfig, SyncedParentPolicy};
pub use errors::{DomError, DomResult};
pub use hash::{comparable_spec, content_hash, format_hash, merkle_hashes};
pub use mutations::MutationEngine;
pub use node::{Grant, Link, Node, NodeId, NodeKind, NodeProperties, NodeSpec, Permission};
pub use permissions::{AccessControl, AllowAll, PermissionEvaluator, Principal};
pub use snapshot::NodeSnapshot;
pub use store::{MemoryStore, NodeStore, StoreError};
pub use sync_index::SyncIndex;
pub use tree::{Ancestors, Descendants, Tree, SHADOW_DOCUMENT_NAME};
