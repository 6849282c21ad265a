//! Mutation engine configuration

use serde::{Deserialize, Serialize};

/// What a structural change under a synced parent does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncedParentPolicy {
    /// Fail with `NoModificationAllowed`
    #[default]
    Reject,
    /// Perform the change anyway
    Allow,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationConfig {
    #[serde(default)]
    pub synced_parent_policy: SyncedParentPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rejects_synced_parents() {
        assert_eq!(
            MutationConfig::default().synced_parent_policy,
            SyncedParentPolicy::Reject
        );
    }

    #[test]
    fn test_deserialize_camel_case() {
        let config: MutationConfig =
            serde_json::from_str(r#"{ "syncedParentPolicy": "allow" }"#).unwrap();
        assert_eq!(config.synced_parent_policy, SyncedParentPolicy::Allow);

        let empty: MutationConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, MutationConfig::default());
    }
}
