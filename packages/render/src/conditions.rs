//! Locale and scripted show/hide filters.
//!
//! Both filters pass everything in the export modes. A condition that
//! fails to evaluate is logged and does not hide the node.

use crate::context::RenderContext;
use crate::expression::ExpressionEvaluator;
use crate::value::Value;
use pagetree_dom::Node;
use tracing::error;

fn blank(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.trim().is_empty())
}

/// Locale lists are matched by substring against the viewer's locale tag
pub fn display_for_locale(node: &Node, context: &RenderContext) -> bool {
    if context.edit_mode().is_export() {
        return true;
    }

    let properties = node.properties();
    let show = blank(properties.show_for_locales.as_ref());
    let hide = blank(properties.hide_for_locales.as_ref());
    let locale = context.locale();

    if hide.is_some_and(|h| h.contains(locale)) {
        return false;
    }
    if show.is_some_and(|s| !s.contains(locale)) {
        return false;
    }
    true
}

pub fn display_for_conditions(
    node: &Node,
    context: &RenderContext,
    evaluator: &dyn ExpressionEvaluator,
) -> bool {
    if context.edit_mode().is_export() {
        return true;
    }

    let properties = node.properties();

    if let Some(hide) = blank(properties.hide_conditions.as_ref()) {
        match evaluator.evaluate(hide, context, node) {
            Ok(Value::Boolean(true)) => return false,
            Ok(_) => {}
            Err(e) => {
                error!(node = %node.id(), condition = %hide, error = %e, "Hide condition could not be evaluated")
            }
        }
    }

    if let Some(show) = blank(properties.show_conditions.as_ref()) {
        match evaluator.evaluate(show, context, node) {
            Ok(Value::Boolean(false)) => return false,
            Ok(_) => {}
            Err(e) => {
                error!(node = %node.id(), condition = %show, error = %e, "Show condition could not be evaluated")
            }
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EditMode;
    use crate::expression::SimpleExpressionEvaluator;
    use pagetree_dom::{NodeKind, NodeProperties, NodeSnapshot, Principal, Tree};

    fn node(properties: NodeProperties) -> Node {
        let mut tree = Tree::new();
        let page = tree
            .import_snapshot(
                &NodeSnapshot::new(NodeKind::page("p"))
                    .with_children(vec![NodeSnapshot::new(NodeKind::element("div")).with_properties(properties)]),
            )
            .unwrap();
        let div = tree.children(page)[0];
        tree.node(div).unwrap().clone()
    }

    #[test]
    fn test_hide_for_locales() {
        let node = node(NodeProperties {
            hide_for_locales: Some("de,fr".to_string()),
            ..NodeProperties::default()
        });
        let user = Principal::user("ann");

        assert!(!display_for_locale(&node, &RenderContext::new(user.clone()).with_locale("de")));
        assert!(display_for_locale(&node, &RenderContext::new(user.clone()).with_locale("en")));
        assert!(display_for_locale(
            &node,
            &RenderContext::new(user).with_locale("de").with_mode(EditMode::Deployment)
        ));
    }

    #[test]
    fn test_show_for_locales() {
        let node = node(NodeProperties {
            show_for_locales: Some("en_US".to_string()),
            ..NodeProperties::default()
        });

        assert!(display_for_locale(&node, &RenderContext::new(Principal::Anonymous).with_locale("en")));
        assert!(!display_for_locale(&node, &RenderContext::new(Principal::Anonymous).with_locale("de")));
    }

    #[test]
    fn test_conditions() {
        let evaluator = SimpleExpressionEvaluator::new();
        let hidden = node(NodeProperties {
            hide_conditions: Some("locale == 'de'".to_string()),
            ..NodeProperties::default()
        });
        let shown = node(NodeProperties {
            show_conditions: Some("me.isAnonymous".to_string()),
            ..NodeProperties::default()
        });
        let context = RenderContext::new(Principal::Anonymous).with_locale("de");

        assert!(!display_for_conditions(&hidden, &context, &evaluator));
        assert!(display_for_conditions(&shown, &context, &evaluator));
        assert!(!display_for_conditions(
            &shown,
            &RenderContext::new(Principal::user("ann")),
            &evaluator
        ));
    }

    #[test]
    fn test_broken_condition_does_not_hide() {
        let evaluator = SimpleExpressionEvaluator::new();
        let node = node(NodeProperties {
            show_conditions: Some("((".to_string()),
            hide_conditions: Some("unknown_fn()".to_string()),
            ..NodeProperties::default()
        });

        assert!(display_for_conditions(
            &node,
            &RenderContext::new(Principal::Anonymous),
            &evaluator
        ));
    }
}
