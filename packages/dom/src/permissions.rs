//! Permission evaluation boundary.
//!
//! The engine asks an evaluator before every write and the render walker
//! asks before every node visit. `AccessControl` evaluates the node's own
//! visibility flags, owner and grants.

use crate::node::{Node, Permission};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Acting identity for mutations and renders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Principal {
    Anonymous,
    User {
        name: String,
        #[serde(default)]
        admin: bool,
    },
}

impl Principal {
    pub fn user(name: impl Into<String>) -> Self {
        Principal::User {
            name: name.into(),
            admin: false,
        }
    }

    pub fn admin(name: impl Into<String>) -> Self {
        Principal::User {
            name: name.into(),
            admin: true,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Principal::Anonymous => None,
            Principal::User { name, .. } => Some(name),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Principal::Anonymous)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Principal::User { admin: true, .. })
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Principal::Anonymous => write!(f, "anonymous"),
            Principal::User { name, .. } => write!(f, "{}", name),
        }
    }
}

pub trait PermissionEvaluator: Send + Sync {
    fn can_read(&self, principal: &Principal, node: &Node) -> bool;

    fn can_write(&self, principal: &Principal, node: &Node) -> bool;
}

/// Grants everything; for trusted batch jobs and tests
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PermissionEvaluator for AllowAll {
    fn can_read(&self, _principal: &Principal, _node: &Node) -> bool {
        true
    }

    fn can_write(&self, _principal: &Principal, _node: &Node) -> bool {
        true
    }
}

/// Evaluates visibility flags, ownership and grants stored on the node
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessControl;

impl AccessControl {
    fn has_grant(node: &Node, name: &str, permission: Permission) -> bool {
        node.properties()
            .grant(name)
            .map(|g| g.permissions.contains(&permission))
            .unwrap_or(false)
    }

    fn is_owner(node: &Node, name: &str) -> bool {
        node.properties().owner.as_deref() == Some(name)
    }
}

impl PermissionEvaluator for AccessControl {
    fn can_read(&self, principal: &Principal, node: &Node) -> bool {
        let props = node.properties();
        match principal {
            Principal::Anonymous => props.visible_to_public_users,
            Principal::User { admin: true, .. } => true,
            Principal::User { name, .. } => {
                props.visible_to_authenticated_users
                    || Self::is_owner(node, name)
                    || Self::has_grant(node, name, Permission::Read)
            }
        }
    }

    fn can_write(&self, principal: &Principal, node: &Node) -> bool {
        match principal {
            Principal::Anonymous => false,
            Principal::User { admin: true, .. } => true,
            Principal::User { name, .. } => {
                Self::is_owner(node, name) || Self::has_grant(node, name, Permission::Write)
            }
        }
    }
}
