use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_ASCENT_ATTEMPTS: usize = 10;

fn default_max_ascent_attempts() -> usize {
    DEFAULT_MAX_ASCENT_ATTEMPTS
}

/// Merge pass configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffConfig {
    /// How far a move climbs from its anchor sibling before appending
    #[serde(default = "default_max_ascent_attempts")]
    pub max_ascent_attempts: usize,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            max_ascent_attempts: DEFAULT_MAX_ASCENT_ATTEMPTS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ascent_bound() {
        assert_eq!(DiffConfig::default().max_ascent_attempts, 10);
        let parsed: DiffConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, DiffConfig::default());
    }
}
