//! # Deployment export comments
//!
//! Node metadata that has no place in plain HTML travels in a comment
//! written right before the node:
//!
//! ```text
//! <!-- @pagetree:public-only, @pagetree:owner(ann), @pagetree:grant(editors,rw) -->
//! <div>...</div>
//! ```
//!
//! Visibility tokens are relative to the owning page: a node that is as
//! visible as its page carries none.

use crate::errors::InstructionError;
use crate::html::{escape_attribute, unescape_attribute};
use pagetree_dom::{NodeId, NodeKind, Tree};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

pub const NAMESPACE: &str = "@pagetree:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Owner(String),
    /// Principal name plus one letter per permission
    Grant { principal: String, permissions: String },
    Public,
    PublicOnly,
    Protected,
    Private,
    Link(String),
    PageLink(String),
    Content(String),
    Show(String),
    Hide(String),
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Owner(name) => write!(f, "{}owner({})", NAMESPACE, name),
            Instruction::Grant {
                principal,
                permissions,
            } => write!(f, "{}grant({},{})", NAMESPACE, principal, permissions),
            Instruction::Public => write!(f, "{}public", NAMESPACE),
            Instruction::PublicOnly => write!(f, "{}public-only", NAMESPACE),
            Instruction::Protected => write!(f, "{}protected", NAMESPACE),
            Instruction::Private => write!(f, "{}private", NAMESPACE),
            Instruction::Link(path) => write!(f, "{}link({})", NAMESPACE, path),
            Instruction::PageLink(path) => write!(f, "{}pagelink({})", NAMESPACE, path),
            Instruction::Content(t) => write!(f, "{}content({})", NAMESPACE, escape_attribute(t)),
            Instruction::Show(c) => write!(f, "{}show({})", NAMESPACE, escape_attribute(c)),
            Instruction::Hide(c) => write!(f, "{}hide({})", NAMESPACE, escape_attribute(c)),
        }
    }
}

impl FromStr for Instruction {
    type Err = InstructionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .trim()
            .strip_prefix(NAMESPACE)
            .ok_or_else(|| InstructionError::Unknown(s.to_string()))?;
        let malformed = || InstructionError::Malformed(s.to_string());

        let (directive, args) = match body.find('(') {
            Some(open) => {
                let args = body[open + 1..].strip_suffix(')').ok_or_else(malformed)?;
                (&body[..open], Some(args))
            }
            None => (body, None),
        };

        match (directive, args) {
            ("public", None) => Ok(Instruction::Public),
            ("public-only", None) => Ok(Instruction::PublicOnly),
            ("protected", None) => Ok(Instruction::Protected),
            ("private", None) => Ok(Instruction::Private),
            ("owner", Some(name)) => Ok(Instruction::Owner(name.to_string())),
            ("grant", Some(args)) => {
                let (principal, permissions) = args.rsplit_once(',').ok_or_else(malformed)?;
                Ok(Instruction::Grant {
                    principal: principal.to_string(),
                    permissions: permissions.to_string(),
                })
            }
            ("link", Some(path)) => Ok(Instruction::Link(path.to_string())),
            ("pagelink", Some(path)) => Ok(Instruction::PageLink(path.to_string())),
            ("content", Some(t)) => Ok(Instruction::Content(unescape_attribute(t))),
            ("show", Some(c)) => Ok(Instruction::Show(unescape_attribute(c))),
            ("hide", Some(c)) => Ok(Instruction::Hide(unescape_attribute(c))),
            _ => Err(InstructionError::Unknown(s.to_string())),
        }
    }
}

/// Visibility of a node relative to its page, `None` when no token is needed
pub fn visibility_instruction(
    page_public: bool,
    page_protected: bool,
    element_public: bool,
    element_protected: bool,
) -> Option<Instruction> {
    let page_private = !page_public && !page_protected;
    let page_public_only = page_public && !page_protected;
    let element_private = !element_public && !element_protected;
    let element_public_only = element_public && !element_protected;
    let element_both = element_public && element_protected;

    if page_private && !element_private {
        if element_public_only {
            return Some(Instruction::PublicOnly);
        }
        if element_both {
            return Some(Instruction::Public);
        }
        if element_protected {
            return Some(Instruction::Protected);
        }
    }

    if page_protected && !element_protected {
        if element_public_only {
            return Some(Instruction::PublicOnly);
        }
        if element_private {
            return Some(Instruction::Private);
        }
    }

    if page_public && !element_public {
        if element_protected {
            return Some(Instruction::Protected);
        }
        if element_private {
            return Some(Instruction::Private);
        }
    }

    if page_public_only && !element_public_only {
        if element_both {
            return Some(Instruction::Public);
        }
        if element_protected {
            return Some(Instruction::Protected);
        }
        if element_private {
            return Some(Instruction::Private);
        }
    }

    None
}

/// Instructions for `id` in export order: visibility, link, security, then
/// content metadata for text nodes
pub fn instructions(tree: &Tree, id: NodeId) -> Vec<Instruction> {
    let Some(node) = tree.get(id) else {
        return Vec::new();
    };
    let properties = node.properties();
    let mut out = Vec::new();

    let page = tree.owner_document(id).and_then(|page| tree.get(page));
    if page.is_none() {
        warn!(node = %id, "Node has no owner document");
    }
    let (page_public, page_protected) = page
        .map(|p| {
            (
                p.properties().visible_to_public_users,
                p.properties().visible_to_authenticated_users,
            )
        })
        .unwrap_or((false, false));
    out.extend(visibility_instruction(
        page_public,
        page_protected,
        properties.visible_to_public_users,
        properties.visible_to_authenticated_users,
    ));

    if let Some(link) = node.link() {
        out.push(if link.to_page {
            Instruction::PageLink(link.path.clone())
        } else {
            Instruction::Link(link.path.clone())
        });
    }

    if let Some(owner) = &properties.owner {
        out.push(Instruction::Owner(owner.clone()));
    }
    for grant in &properties.grants {
        let permissions: String = grant.permissions.iter().map(|p| p.short()).collect();
        if !permissions.is_empty() {
            out.push(Instruction::Grant {
                principal: grant.principal.clone(),
                permissions,
            });
        }
    }

    if let NodeKind::Text { content_type, .. } = node.kind() {
        if let Some(content_type) = content_type {
            out.push(Instruction::Content(content_type.clone()));
        }
        if let Some(show) = properties.show_conditions.as_ref().filter(|s| !s.is_empty()) {
            out.push(Instruction::Show(show.clone()));
        }
        if let Some(hide) = properties.hide_conditions.as_ref().filter(|s| !s.is_empty()) {
            out.push(Instruction::Hide(hide.clone()));
        }
    }

    out
}

/// `<!-- token, token -->`, or `None` without instructions
pub fn format_comment(instructions: &[Instruction]) -> Option<String> {
    if instructions.is_empty() {
        return None;
    }
    let tokens: Vec<String> = instructions.iter().map(|i| i.to_string()).collect();
    Some(format!("<!-- {} -->", tokens.join(", ")))
}

/// Parse a comment written by [`format_comment`]
pub fn parse_comment(comment: &str) -> Result<Vec<Instruction>, InstructionError> {
    let body = comment
        .trim()
        .strip_prefix("<!--")
        .and_then(|c| c.strip_suffix("-->"))
        .ok_or_else(|| InstructionError::Malformed(comment.to_string()))?
        .trim();

    let separator = format!(", {}", NAMESPACE);
    let mut out = Vec::new();
    for (i, part) in body.split(separator.as_str()).enumerate() {
        let token = if i == 0 {
            part.to_string()
        } else {
            format!("{}{}", NAMESPACE, part)
        };
        out.push(token.parse()?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagetree_dom::{Grant, Link, NodeProperties, NodeSnapshot, Permission};

    #[test]
    fn test_visibility_relative_to_page() {
        // private page
        assert_eq!(visibility_instruction(false, false, true, false), Some(Instruction::PublicOnly));
        assert_eq!(visibility_instruction(false, false, true, true), Some(Instruction::Public));
        assert_eq!(visibility_instruction(false, false, false, false), None);
        // public page
        assert_eq!(visibility_instruction(true, true, true, true), None);
        assert_eq!(visibility_instruction(true, true, false, false), Some(Instruction::Private));
        assert_eq!(visibility_instruction(true, true, false, true), Some(Instruction::Protected));
        // public-only page
        assert_eq!(visibility_instruction(true, false, true, true), Some(Instruction::Public));
        assert_eq!(visibility_instruction(true, false, true, false), None);
    }

    #[test]
    fn test_instructions_for_text_node() {
        let snapshot = NodeSnapshot::new(NodeKind::page("home"))
            .with_properties(NodeProperties::public())
            .with_children(vec![NodeSnapshot::new(NodeKind::Text {
                content: "# Title".to_string(),
                content_type: Some("text/markdown".to_string()),
            })
            .with_properties(NodeProperties {
                owner: Some("ann".to_string()),
                grants: vec![Grant::new("editors", [Permission::Write, Permission::Read])],
                show_conditions: Some("me.name == \"ann\"".to_string()),
                ..NodeProperties::default()
            })]);
        let mut tree = Tree::new();
        let page = tree.import_snapshot(&snapshot).unwrap();
        let text = tree.children(page)[0];

        let comment = format_comment(&instructions(&tree, text)).unwrap();
        assert_eq!(
            comment,
            "<!-- @pagetree:private, @pagetree:owner(ann), @pagetree:grant(editors,rw), \
             @pagetree:content(text/markdown), @pagetree:show(me.name == &quot;ann&quot;) -->"
        );
        assert_eq!(parse_comment(&comment).unwrap(), instructions(&tree, text));
    }

    #[test]
    fn test_link_instructions() {
        let mut element = NodeSnapshot::new(NodeKind::element("a"));
        element.link = Some(Link {
            path: "/about".to_string(),
            to_page: true,
        });
        let mut tree = Tree::new();
        let page = tree
            .import_snapshot(&NodeSnapshot::new(NodeKind::page("home")).with_children(vec![element]))
            .unwrap();
        let a = tree.children(page)[0];

        assert_eq!(instructions(&tree, a), vec![Instruction::PageLink("/about".to_string())]);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "@other:public".parse::<Instruction>(),
            Err(InstructionError::Unknown(_))
        ));
        assert!(matches!(
            "@pagetree:owner(ann".parse::<Instruction>(),
            Err(InstructionError::Malformed(_))
        ));
        assert!(matches!(
            "@pagetree:grant(ann)".parse::<Instruction>(),
            Err(InstructionError::Malformed(_))
        ));
        assert!(parse_comment("not a comment").is_err());
    }
}
