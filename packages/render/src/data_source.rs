//! # Data sources
//!
//! A node with a data key renders once per element of a list. The list
//! comes from the first source in the chain that yields anything:
//!
//! ```text
//! IdParameterSource → RestQuerySource → FunctionQuerySource
//!                   → GraphQuerySource → PathQuerySource
//! ```
//!
//! A failing source is logged and the chain moves on.

use crate::context::RenderContext;
use crate::errors::DataSourceError;
use crate::expression::{interpolate, ExpressionEvaluator};
use crate::value::Value;
use pagetree_dom::Node;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

pub trait DataSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Elements for `node`; empty when the source does not apply
    fn fetch(&self, context: &RenderContext, node: &Node) -> Result<Vec<Value>, DataSourceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryKind {
    Rest,
    Graph,
    Path,
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            QueryKind::Rest => "rest",
            QueryKind::Graph => "graph",
            QueryKind::Path => "path",
        };
        write!(f, "{}", text)
    }
}

/// Backend answering entity lookups and queries
pub trait QueryHandler: Send + Sync {
    fn query(
        &self,
        kind: QueryKind,
        query: &str,
        context: &RenderContext,
    ) -> Result<Vec<Value>, DataSourceError>;

    fn entity(&self, id: &str) -> Result<Option<Value>, DataSourceError>;
}

/// Looks up the entity named by a request parameter
pub struct IdParameterSource {
    handler: Arc<dyn QueryHandler>,
    parameter: String,
}

impl IdParameterSource {
    pub fn new(handler: Arc<dyn QueryHandler>, parameter: impl Into<String>) -> Self {
        Self {
            handler,
            parameter: parameter.into(),
        }
    }
}

impl DataSource for IdParameterSource {
    fn name(&self) -> &'static str {
        "id-parameter"
    }

    fn fetch(&self, context: &RenderContext, _node: &Node) -> Result<Vec<Value>, DataSourceError> {
        let Some(id) = context.request_parameter(&self.parameter) else {
            return Ok(Vec::new());
        };
        Ok(self.handler.entity(id)?.into_iter().collect())
    }
}

fn non_blank(query: Option<&String>) -> Option<&str> {
    query.map(String::as_str).filter(|q| !q.trim().is_empty())
}

/// Expand placeholders in the query text, then hand it to the handler
fn run_query(
    kind: QueryKind,
    query: Option<&String>,
    handler: &dyn QueryHandler,
    evaluator: &dyn ExpressionEvaluator,
    context: &RenderContext,
    node: &Node,
) -> Result<Vec<Value>, DataSourceError> {
    let Some(query) = non_blank(query) else {
        return Ok(Vec::new());
    };
    let query = interpolate(query, evaluator, context, node);
    debug!(node = %node.id(), kind = %kind, query = %query, "Running query");
    handler.query(kind, &query, context)
}

macro_rules! query_source {
    ($(#[$doc:meta])* $name:ident, $kind:expr, $field:ident, $label:literal) => {
        $(#[$doc])*
        pub struct $name {
            handler: Arc<dyn QueryHandler>,
            evaluator: Arc<dyn ExpressionEvaluator>,
        }

        impl $name {
            pub fn new(handler: Arc<dyn QueryHandler>, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
                Self { handler, evaluator }
            }
        }

        impl DataSource for $name {
            fn name(&self) -> &'static str {
                $label
            }

            fn fetch(&self, context: &RenderContext, node: &Node) -> Result<Vec<Value>, DataSourceError> {
                run_query(
                    $kind,
                    node.properties().$field.as_ref(),
                    self.handler.as_ref(),
                    self.evaluator.as_ref(),
                    context,
                    node,
                )
            }
        }
    };
}

query_source!(
    /// Runs the node's REST query
    RestQuerySource, QueryKind::Rest, rest_query, "rest-query"
);
query_source!(
    /// Runs the node's graph-pattern query
    GraphQuerySource, QueryKind::Graph, graph_query, "graph-query"
);
query_source!(
    /// Runs the node's path query
    PathQuerySource, QueryKind::Path, path_query, "path-query"
);

/// Evaluates the node's function query as an expression
pub struct FunctionQuerySource {
    evaluator: Arc<dyn ExpressionEvaluator>,
}

impl FunctionQuerySource {
    pub fn new(evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        Self { evaluator }
    }
}

impl DataSource for FunctionQuerySource {
    fn name(&self) -> &'static str {
        "function-query"
    }

    fn fetch(&self, context: &RenderContext, node: &Node) -> Result<Vec<Value>, DataSourceError> {
        let Some(expression) = non_blank(node.properties().function_query.as_ref()) else {
            return Ok(Vec::new());
        };
        let value = self.evaluator.evaluate(expression, context, node)?;
        Ok(value.into_items())
    }
}

/// Ordered list of sources; the first non-empty result wins
#[derive(Default)]
pub struct DataSourceChain {
    sources: Vec<Box<dyn DataSource>>,
}

impl DataSourceChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// The five standard sources in lookup order
    pub fn standard(
        handler: Arc<dyn QueryHandler>,
        evaluator: Arc<dyn ExpressionEvaluator>,
        detail_parameter: &str,
    ) -> Self {
        Self::new()
            .with(IdParameterSource::new(handler.clone(), detail_parameter))
            .with(RestQuerySource::new(handler.clone(), evaluator.clone()))
            .with(FunctionQuerySource::new(evaluator.clone()))
            .with(GraphQuerySource::new(handler.clone(), evaluator.clone()))
            .with(PathQuerySource::new(handler, evaluator))
    }

    pub fn with(mut self, source: impl DataSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn fetch(&self, context: &RenderContext, node: &Node) -> Vec<Value> {
        for source in &self.sources {
            match source.fetch(context, node) {
                Ok(items) if !items.is_empty() => {
                    debug!(node = %node.id(), source = source.name(), count = items.len(), "List source");
                    return items;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(node = %node.id(), source = source.name(), error = %e, "Could not retrieve data from source")
                }
            }
        }
        Vec::new()
    }
}

/// In-memory entities and canned query results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Fixtures {
    /// Entities by id
    pub entities: BTreeMap<String, Value>,
    /// Results by query text
    pub queries: BTreeMap<String, Vec<Value>>,
}

impl Fixtures {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl QueryHandler for Fixtures {
    fn query(
        &self,
        _kind: QueryKind,
        query: &str,
        _context: &RenderContext,
    ) -> Result<Vec<Value>, DataSourceError> {
        Ok(self.queries.get(query).cloned().unwrap_or_default())
    }

    fn entity(&self, id: &str) -> Result<Option<Value>, DataSourceError> {
        Ok(self.entities.get(id).cloned())
    }
}
