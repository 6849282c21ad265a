use crate::config::{parse_principal, Config};
use anyhow::{anyhow, Result};
use clap::Args;
use colored::Colorize;
use pagetree_dom::{AccessControl, NodeSnapshot, Principal, Tree};
use pagetree_render::{
    EditMode, Fixtures, QueryHandler, RenderConfig, RenderContext, RenderOutput, RenderWalker,
};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Snapshot JSON of the page to render
    pub input: PathBuf,

    /// Edit mode (default, raw, widget, deployment, detail)
    #[arg(short, long)]
    pub mode: Option<EditMode>,

    /// Viewer locale
    #[arg(short, long)]
    pub locale: Option<String>,

    /// Acting principal: anonymous, a user name, or admin:<name>
    #[arg(short, long)]
    pub principal: Option<String>,

    /// Fixtures JSON answering entity lookups and queries
    #[arg(short, long)]
    pub fixtures: Option<PathBuf>,

    /// Fixture entity id used as the detail object
    #[arg(long)]
    pub details: Option<String>,

    /// Request parameter as key=value, repeatable
    #[arg(long = "param", value_parser = parse_key_value)]
    pub params: Vec<(String, String)>,

    /// Write HTML here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Everything a single render pass needs besides the tree
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub mode: EditMode,
    pub locale: String,
    pub principal: Principal,
    pub details: Option<String>,
    pub params: Vec<(String, String)>,
    pub config: RenderConfig,
}

impl RenderRequest {
    /// Command line flags over config file values
    pub fn from_args(args: &RenderArgs, config: &Config) -> Self {
        Self {
            mode: args.mode.unwrap_or(config.edit_mode),
            locale: args.locale.clone().unwrap_or_else(|| config.locale.clone()),
            principal: parse_principal(args.principal.as_deref().unwrap_or(&config.principal)),
            details: args.details.clone(),
            params: args.params.clone(),
            config: config.render_config(),
        }
    }
}

pub fn render(args: RenderArgs, cwd: &str) -> Result<()> {
    let config = Config::load(cwd)?;
    let request = RenderRequest::from_args(&args, &config);

    let snapshot = NodeSnapshot::from_json(&fs::read_to_string(&args.input)?)?;
    let fixtures = match args.fixtures.clone().or_else(|| config.fixtures_path(cwd)) {
        Some(path) => {
            debug!(path = %path.display(), "Loading fixtures");
            Fixtures::from_json(&fs::read_to_string(&path)?)?
        }
        None => Fixtures::default(),
    };

    let output = render_snapshot(&snapshot, fixtures, &request)?;

    match &args.output {
        Some(path) => {
            fs::write(path, &output.html)?;
            println!(
                "{} {} ({} nodes, {} mode)",
                "✓".green(),
                path.display(),
                output.nodes_rendered,
                request.mode
            );
        }
        None => println!("{}", output.html),
    }

    if output.aborted {
        println!("{} Render aborted before completion", "⚠".yellow());
    }

    Ok(())
}

/// Import `snapshot` into a fresh tree and render it for `request`
pub fn render_snapshot(
    snapshot: &NodeSnapshot,
    fixtures: Fixtures,
    request: &RenderRequest,
) -> Result<RenderOutput> {
    let mut tree = Tree::new();
    let root = tree.import_snapshot(snapshot)?;
    let fixtures = Arc::new(fixtures);

    let mut context = RenderContext::new(request.principal.clone())
        .with_locale(request.locale.clone())
        .with_mode(request.mode);
    if let Some(id) = &request.details {
        let details = fixtures
            .entity(id)?
            .ok_or_else(|| anyhow!("Unknown detail object: {}", id))?;
        context = context.with_details(details);
    }
    for (key, value) in &request.params {
        context = context.with_request_parameter(key.clone(), value.clone());
    }

    let walker = RenderWalker::new(Arc::new(AccessControl))
        .with_config(request.config.clone())
        .with_query_handler(fixtures);

    Ok(walker.render(&tree, root, &mut context)?)
}

fn parse_key_value(text: &str) -> Result<(String, String), String> {
    text.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got `{}`", text))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"{
        "type": "page",
        "name": "team",
        "properties": { "visibleToPublicUsers": true },
        "children": [{
            "type": "element",
            "tag": "ul",
            "properties": { "visibleToPublicUsers": true },
            "children": [{
                "type": "element",
                "tag": "li",
                "properties": {
                    "visibleToPublicUsers": true,
                    "dataKey": "member",
                    "restQuery": "/members?team=${request.team}"
                },
                "children": [{
                    "type": "text",
                    "content": "${member.name}",
                    "properties": { "visibleToPublicUsers": true }
                }]
            }]
        }]
    }"#;

    const FIXTURES: &str = r#"{
        "entities": { "m1": { "name": "Ann" } },
        "queries": {
            "/members?team=core": [{ "name": "Ann" }, { "name": "Bo & Co" }]
        }
    }"#;

    fn request(params: Vec<(String, String)>) -> RenderRequest {
        RenderRequest {
            mode: EditMode::Default,
            locale: "en".to_string(),
            principal: Principal::Anonymous,
            details: None,
            params,
            config: RenderConfig::default(),
        }
    }

    #[test]
    fn test_render_with_fixtures() {
        let snapshot = NodeSnapshot::from_json(PAGE).unwrap();
        let fixtures = Fixtures::from_json(FIXTURES).unwrap();
        let params = vec![("team".to_string(), "core".to_string())];

        let output = render_snapshot(&snapshot, fixtures, &request(params)).unwrap();
        assert_eq!(
            output.html,
            "<!DOCTYPE html><ul><li>Ann</li><li>Bo &amp; Co</li></ul>"
        );
        assert!(!output.aborted);
    }

    #[test]
    fn test_render_without_matching_query() {
        let snapshot = NodeSnapshot::from_json(PAGE).unwrap();
        let output = render_snapshot(&snapshot, Fixtures::default(), &request(vec![])).unwrap();
        assert_eq!(output.html, "<!DOCTYPE html><ul></ul>");
    }

    #[test]
    fn test_unknown_detail_object() {
        let snapshot = NodeSnapshot::from_json(PAGE).unwrap();
        let mut request = request(vec![]);
        request.details = Some("missing".to_string());

        let err = render_snapshot(&snapshot, Fixtures::default(), &request).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_request_prefers_flags_over_config() {
        let args = RenderArgs {
            input: PathBuf::from("page.json"),
            mode: Some(EditMode::Raw),
            locale: None,
            principal: Some("admin:root".to_string()),
            fixtures: None,
            details: None,
            params: vec![],
            output: None,
        };
        let config = Config {
            locale: "de".to_string(),
            ..Config::default()
        };

        let request = RenderRequest::from_args(&args, &config);
        assert_eq!(request.mode, EditMode::Raw);
        assert_eq!(request.locale, "de");
        assert_eq!(request.principal, Principal::admin("root"));
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("team=core").unwrap(),
            ("team".to_string(), "core".to_string())
        );
        assert_eq!(
            parse_key_value("q=a=b").unwrap(),
            ("q".to_string(), "a=b".to_string())
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }
}
