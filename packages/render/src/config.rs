use serde::{Deserialize, Serialize};

pub const DEFAULT_DETAIL_PARAMETER: &str = "nodeId";

/// Render walker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RenderConfig {
    /// Put every element and text node on its own line
    pub indent_html: bool,
    /// Request parameter read by the ID-parameter data source
    pub detail_parameter: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            indent_html: false,
            detail_parameter: DEFAULT_DETAIL_PARAMETER.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: RenderConfig = serde_json::from_str(r#"{ "indentHtml": true }"#).unwrap();

        assert!(config.indent_html);
        assert_eq!(config.detail_parameter, "nodeId");
    }
}
