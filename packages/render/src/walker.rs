//! # Render walker
//!
//! Read-only traversal producing HTML from a tree. Per node:
//!
//! ```text
//! cancelled? ──yes──→ stop (output so far stays valid)
//!     ↓
//! readable by viewer? ──no──→ skip node and subtree
//!     ↓
//! hide-on-detail / hide-on-index ──→ skip
//!     ↓
//! Raw / Widget / Deployment ──→ content
//!     ↓
//! data key?
//!   render-details in detail mode ──→ content once, details bound
//!   list sources non-empty         ──→ content once per element
//!   current object property        ──→ content once per element
//!     ↓
//! content: locale + condition filters, then own markup and children
//! ```

use crate::conditions::{display_for_conditions, display_for_locale};
use crate::config::RenderConfig;
use crate::context::{EditMode, RenderContext};
use crate::data_source::{DataSourceChain, QueryHandler};
use crate::deployment::{format_comment, instructions};
use crate::errors::{RenderError, RenderResult};
use crate::expression::{interpolate, ExpressionEvaluator, SimpleExpressionEvaluator};
use crate::html::{escape_attribute, escape_text, is_void_element, HtmlWriter};
use crate::value::Value;
use pagetree_dom::{Node, NodeId, NodeKind, NodeProperties, PermissionEvaluator, Tree};
use serde::Serialize;
use std::sync::{Arc, RwLock};
use tracing::{debug, instrument, warn};

/// Tree shared between writers and concurrent render passes
pub type SharedTree = Arc<RwLock<Tree>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOutput {
    pub html: String,
    /// The pass stopped on cancellation before visiting every node
    pub aborted: bool,
    /// Nodes whose content was written (list elements count once each)
    pub nodes_rendered: usize,
}

pub struct RenderWalker {
    permissions: Arc<dyn PermissionEvaluator>,
    evaluator: Arc<dyn ExpressionEvaluator>,
    sources: DataSourceChain,
    config: RenderConfig,
}

impl RenderWalker {
    /// Walker with the built-in evaluator and no data sources
    pub fn new(permissions: Arc<dyn PermissionEvaluator>) -> Self {
        Self {
            permissions,
            evaluator: Arc::new(SimpleExpressionEvaluator::new()),
            sources: DataSourceChain::new(),
            config: RenderConfig::default(),
        }
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_config(mut self, config: RenderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_sources(mut self, sources: DataSourceChain) -> Self {
        self.sources = sources;
        self
    }

    /// Standard source chain over `handler`, using the current evaluator
    /// and detail parameter
    pub fn with_query_handler(self, handler: Arc<dyn QueryHandler>) -> Self {
        let sources = DataSourceChain::standard(
            handler,
            self.evaluator.clone(),
            &self.config.detail_parameter,
        );
        self.with_sources(sources)
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Render the subtree at `root`. Bindings made during the pass are
    /// undone before returning.
    #[instrument(skip(self, tree, context), fields(mode = %context.edit_mode(), locale = %context.locale()))]
    pub fn render(
        &self,
        tree: &Tree,
        root: NodeId,
        context: &mut RenderContext,
    ) -> RenderResult<RenderOutput> {
        if !tree.contains(root) {
            return Err(RenderError::UnknownNode(root));
        }

        let mut walk = Walk {
            walker: self,
            tree,
            mode: context.edit_mode(),
            out: HtmlWriter::new(self.config.indent_html),
            aborted: false,
            rendered: 0,
        };
        walk.render_node(root, context, 0)?;

        debug!(
            nodes = walk.rendered,
            aborted = walk.aborted,
            bytes = walk.out.len(),
            "Render pass complete"
        );
        Ok(RenderOutput {
            aborted: walk.aborted,
            nodes_rendered: walk.rendered,
            html: walk.out.finish(),
        })
    }

    /// Render while holding the read lock for the whole pass
    pub fn render_shared(
        &self,
        tree: &SharedTree,
        root: NodeId,
        context: &mut RenderContext,
    ) -> RenderResult<RenderOutput> {
        let guard = tree.read().map_err(|_| RenderError::LockPoisoned)?;
        self.render(&guard, root, context)
    }
}

struct Walk<'w> {
    walker: &'w RenderWalker,
    tree: &'w Tree,
    mode: EditMode,
    out: HtmlWriter,
    aborted: bool,
    rendered: usize,
}

fn data_key(properties: &NodeProperties) -> Option<&str> {
    properties
        .data_key
        .as_deref()
        .filter(|k| !k.trim().is_empty())
}

/// Data attributes written in the export modes, `data-pagetree-meta-<name>`
fn meta_attributes(properties: &NodeProperties) -> Vec<(&'static str, String)> {
    let strings = [
        ("data-key", &properties.data_key),
        ("rest-query", &properties.rest_query),
        ("graph-query", &properties.graph_query),
        ("path-query", &properties.path_query),
        ("function-query", &properties.function_query),
    ];
    let flags = [
        ("hide-on-index", properties.hide_on_index),
        ("hide-on-detail", properties.hide_on_detail),
        ("render-details", properties.render_details),
    ];
    let filters = [
        ("show-for-locales", &properties.show_for_locales),
        ("hide-for-locales", &properties.hide_for_locales),
        ("show-conditions", &properties.show_conditions),
        ("hide-conditions", &properties.hide_conditions),
    ];

    let mut out = Vec::new();
    for (name, value) in strings {
        if let Some(value) = value.as_ref().filter(|v| !v.trim().is_empty()) {
            out.push((name, value.clone()));
        }
    }
    for (name, value) in flags {
        if value {
            out.push((name, "true".to_string()));
        }
    }
    for (name, value) in filters {
        if let Some(value) = value.as_ref().filter(|v| !v.trim().is_empty()) {
            out.push((name, value.clone()));
        }
    }
    out
}

impl<'w> Walk<'w> {
    fn render_node(&mut self, id: NodeId, context: &mut RenderContext, depth: usize) -> RenderResult<()> {
        if self.aborted {
            return Ok(());
        }
        if context.cancellation().is_cancelled() {
            debug!(node = %id, "Render cancelled");
            self.aborted = true;
            return Ok(());
        }

        let (tree, walker) = (self.tree, self.walker);
        let node = tree.node(id)?;
        if !walker.permissions.can_read(context.principal(), node) {
            debug!(node = %id, principal = %context.principal(), "Not visible, skipping subtree");
            return Ok(());
        }

        let properties = node.properties();
        let detail_mode = context.is_detail_mode();
        if detail_mode && properties.hide_on_detail {
            return Ok(());
        }
        if !detail_mode && properties.hide_on_index {
            return Ok(());
        }

        if self.mode.is_export() {
            return self.render_content(id, context, depth);
        }

        let Some(key) = data_key(properties) else {
            return self.render_content(id, context, depth);
        };

        if properties.render_details && detail_mode {
            let details = context.details().cloned().unwrap_or(Value::Null);
            return self.render_list(id, key, vec![details], context, depth);
        }

        let list = walker.sources.fetch(context, node);
        if !list.is_empty() {
            return self.render_list(id, key, list, context, depth);
        }

        // No list source: iterate the current object's property of that name
        let Some(elements) = context.current().and_then(|c| c.get(key)).cloned() else {
            return Ok(());
        };
        let objects = elements
            .into_items()
            .into_iter()
            .filter(|v| matches!(v, Value::Object(_)))
            .collect();
        self.render_list(id, key, objects, context, depth)
    }

    /// Content once per element with the element bound under `key`; the
    /// previous binding and current object are restored afterwards
    fn render_list(
        &mut self,
        id: NodeId,
        key: &str,
        items: Vec<Value>,
        context: &mut RenderContext,
        depth: usize,
    ) -> RenderResult<()> {
        let previous_current = context.current.clone();
        let previous_binding = context.data_objects.get(key).cloned();

        for item in items {
            context.put_data_object(key, item);
            self.render_content(id, context, depth)?;
        }

        context.current = previous_current;
        match previous_binding {
            Some(value) => {
                context.data_objects.insert(key.to_string(), value);
            }
            None => context.clear_data_object(key),
        }
        Ok(())
    }

    fn render_content(&mut self, id: NodeId, context: &mut RenderContext, depth: usize) -> RenderResult<()> {
        let (tree, walker) = (self.tree, self.walker);
        let node = tree.node(id)?;
        let evaluator = walker.evaluator.as_ref();

        if !display_for_locale(node, context) || !display_for_conditions(node, context, evaluator) {
            return Ok(());
        }
        self.rendered += 1;

        match node.kind() {
            NodeKind::Page { .. } => {
                self.out.line(depth);
                self.out.push_str("<!DOCTYPE html>");
                self.render_children(node, context, depth)
            }
            NodeKind::Element { tag, attributes } => {
                self.deployment_comment(id, depth);
                self.out.line(depth);
                self.out.push_str("<");
                self.out.push_str(tag);

                for (name, raw) in attributes {
                    let value = match self.mode {
                        EditMode::Default | EditMode::Detail => {
                            interpolate(raw, evaluator, context, node).trim().to_string()
                        }
                        _ => raw.clone(),
                    };
                    if value.trim().is_empty() {
                        continue;
                    }
                    let value = if self.mode.escapes_output() {
                        escape_attribute(&value)
                    } else {
                        value
                    };
                    self.out.attribute(name, &value)?;
                }
                self.meta_attributes(node)?;
                self.out.push_str(">");

                if is_void_element(tag) {
                    return Ok(());
                }
                self.render_children(node, context, depth + 1)?;
                self.out.line(depth);
                self.out.push_str("</");
                self.out.push_str(tag);
                self.out.push_str(">");
                Ok(())
            }
            NodeKind::Text { content, .. } => {
                self.deployment_comment(id, depth);
                self.out.line(depth);
                match self.mode {
                    EditMode::Default | EditMode::Detail => {
                        let text = interpolate(content, evaluator, context, node);
                        self.out.push_str(&escape_text(&text));
                    }
                    _ => self.out.push_str(content),
                }
                Ok(())
            }
            NodeKind::Component { .. } | NodeKind::Fragment => {
                self.render_children(node, context, depth)
            }
        }
    }

    fn render_children(&mut self, node: &Node, context: &mut RenderContext, depth: usize) -> RenderResult<()> {
        for child in node.children() {
            if self.tree.parent(*child) != Some(node.id()) {
                warn!(parent = %node.id(), child = %child, "Child does not point back to parent, skipping");
                continue;
            }
            self.render_node(*child, context, depth)?;
        }
        Ok(())
    }

    fn deployment_comment(&mut self, id: NodeId, depth: usize) {
        if self.mode != EditMode::Deployment {
            return;
        }
        if let Some(comment) = format_comment(&instructions(self.tree, id)) {
            self.out.line(depth);
            self.out.push_str(&comment);
        }
    }

    fn meta_attributes(&mut self, node: &Node) -> RenderResult<()> {
        if !self.mode.is_export() {
            return Ok(());
        }
        let properties = node.properties();
        let deployment = self.mode == EditMode::Deployment;

        if deployment {
            if let Some(name) = &properties.name {
                self.out
                    .attribute("data-pagetree-meta-name", &escape_attribute(name))?;
            }
        }
        for (name, value) in meta_attributes(properties) {
            self.out.attribute(
                &format!("data-pagetree-meta-{}", name),
                &escape_attribute(&value),
            )?;
        }
        if deployment {
            if let Some(configuration) = properties
                .shared_component_configuration
                .as_ref()
                .filter(|c| !c.trim().is_empty())
            {
                self.out.attribute(
                    "data-pagetree-meta-shared-component-configuration",
                    &escape_attribute(configuration),
                )?;
            }
        }
        Ok(())
    }
}
