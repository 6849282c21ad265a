use pagetree_diff::{DiffConfig, DEFAULT_MAX_ASCENT_ATTEMPTS};
use pagetree_dom::{MutationConfig, Principal, SyncedParentPolicy};
use pagetree_render::{EditMode, RenderConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_CONFIG_NAME: &str = "pagetree.config.json";

/// Pagetree configuration file format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Viewer locale for render passes
    pub locale: String,

    /// Edit mode for render passes
    pub edit_mode: EditMode,

    /// Acting principal: `anonymous`, a user name, or `admin:<name>`
    pub principal: String,

    /// One node per line in rendered HTML
    pub indent_html: bool,

    /// Fixtures file backing data sources, relative to the config file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixtures: Option<String>,

    pub synced_parent_policy: SyncedParentPolicy,

    pub max_ascent_attempts: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            locale: "en".to_string(),
            edit_mode: EditMode::Default,
            principal: "anonymous".to_string(),
            indent_html: false,
            fixtures: None,
            synced_parent_policy: SyncedParentPolicy::Reject,
            max_ascent_attempts: DEFAULT_MAX_ASCENT_ATTEMPTS,
        }
    }
}

impl Config {
    /// Load config from a directory
    pub fn load(cwd: &str) -> anyhow::Result<Self> {
        let config_path = PathBuf::from(cwd).join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            // Return default config if none exists
            Ok(Config::default())
        }
    }

    /// Absolute path of the fixtures file, if configured
    pub fn fixtures_path(&self, cwd: &str) -> Option<PathBuf> {
        self.fixtures.as_ref().map(|f| PathBuf::from(cwd).join(f))
    }

    pub fn render_config(&self) -> RenderConfig {
        RenderConfig {
            indent_html: self.indent_html,
            ..RenderConfig::default()
        }
    }

    pub fn mutation_config(&self) -> MutationConfig {
        MutationConfig {
            synced_parent_policy: self.synced_parent_policy,
        }
    }

    pub fn diff_config(&self) -> DiffConfig {
        DiffConfig {
            max_ascent_attempts: self.max_ascent_attempts,
        }
    }
}

/// `anonymous`, `admin:<name>` or a plain user name
pub fn parse_principal(text: &str) -> Principal {
    let text = text.trim();
    if text.is_empty() || text.eq_ignore_ascii_case("anonymous") {
        return Principal::Anonymous;
    }
    match text.strip_prefix("admin:") {
        Some(name) => Principal::admin(name),
        None => Principal::user(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let json = r#"{
            "locale": "de",
            "editMode": "deployment",
            "principal": "admin:root",
            "indentHtml": true,
            "fixtures": "data/fixtures.json",
            "syncedParentPolicy": "allow",
            "maxAscentAttempts": 3
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.locale, "de");
        assert_eq!(config.edit_mode, EditMode::Deployment);
        assert!(config.render_config().indent_html);
        assert_eq!(config.mutation_config().synced_parent_policy, SyncedParentPolicy::Allow);
        assert_eq!(config.diff_config().max_ascent_attempts, 3);
        assert_eq!(
            config.fixtures_path("/work"),
            Some(PathBuf::from("/work/data/fixtures.json"))
        );
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.locale, "en");
        assert_eq!(config.principal, "anonymous");
        assert_eq!(config.max_ascent_attempts, 10);
        assert_eq!(config.fixtures_path("/work"), None);
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let cwd = dir.path().display().to_string();
        assert_eq!(Config::load(&cwd).unwrap(), Config::default());

        std::fs::write(dir.path().join(DEFAULT_CONFIG_NAME), r#"{ "locale": "fr" }"#).unwrap();
        let config = Config::load(&cwd).unwrap();
        assert_eq!(config.locale, "fr");
        assert_eq!(config.principal, "anonymous");
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DEFAULT_CONFIG_NAME), "{ not json").unwrap();
        assert!(Config::load(&dir.path().display().to_string()).is_err());
    }

    #[test]
    fn test_parse_principal() {
        assert_eq!(parse_principal("anonymous"), Principal::Anonymous);
        assert_eq!(parse_principal(""), Principal::Anonymous);
        assert_eq!(parse_principal("admin:root"), Principal::admin("root"));
        assert_eq!(parse_principal("ann"), Principal::user("ann"));
    }
}
