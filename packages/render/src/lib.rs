//! # Pagetree Render
//!
//! Turns a content tree into HTML for a viewer, honouring visibility,
//! locale and condition filters and expanding data-bound nodes.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │ RenderContext                │
//! │  - principal, locale, mode   │
//! │  - details, request params   │
//! │  - bound data objects        │
//! └──────────────┬───────────────┘
//!                ↓
//! ┌─────────────────────────────────────────────┐
//! │ RenderWalker                                │
//! │  - PermissionEvaluator (read gate)          │
//! │  - ExpressionEvaluator (conditions, ${...}) │
//! │  - DataSourceChain (list rendering)         │
//! └─────────────────────────────────────────────┘
//!                ↓
//! ┌──────────────────────────────┐
//! │ RenderOutput { html, ... }   │
//! └──────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use pagetree_dom::{AllowAll, NodeKind, NodeSnapshot, Principal, Tree};
//! use pagetree_render::{RenderContext, RenderWalker};
//! use std::sync::Arc;
//!
//! let mut tree = Tree::new();
//! let page = tree.import_snapshot(
//!     &NodeSnapshot::new(NodeKind::page("home")).with_children(vec![
//!         NodeSnapshot::new(NodeKind::element("h1"))
//!             .with_children(vec![NodeSnapshot::new(NodeKind::text("Hello"))]),
//!     ]),
//! )?;
//!
//! let walker = RenderWalker::new(Arc::new(AllowAll));
//! let output = walker.render(&tree, page, &mut RenderContext::new(Principal::Anonymous))?;
//! assert_eq!(output.html, "<!DOCTYPE html><h1>Hello</h1>");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod cache;
mod conditions;
mod config;
mod context;
mod data_source;
pub mod deployment;
mod errors;
mod expression;
pub mod html;
mod value;
mod walker;

pub use cache::TtlCache;
pub use conditions::{display_for_conditions, display_for_locale};
pub use config::{RenderConfig, DEFAULT_DETAIL_PARAMETER};
pub use context::{CancellationToken, EditMode, RenderContext};
pub use data_source::{
    DataSource, DataSourceChain, Fixtures, FunctionQuerySource, GraphQuerySource,
    IdParameterSource, PathQuerySource, QueryHandler, QueryKind, RestQuerySource,
};
pub use errors::{
    DataSourceError, ExpressionError, ExpressionResult, InstructionError, RenderError,
    RenderResult,
};
pub use expression::{interpolate, ExpressionEvaluator, SimpleExpressionEvaluator};
pub use value::Value;
pub use walker::{RenderOutput, RenderWalker, SharedTree};
