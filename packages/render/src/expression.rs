//! # Expressions
//!
//! Show/hide conditions, function queries and `${...}` placeholders are
//! evaluated through the [`ExpressionEvaluator`] seam. The built-in
//! [`SimpleExpressionEvaluator`] understands a small language:
//!
//! ```text
//! expr    := or
//! or      := and ("||" and)*
//! and     := eq ("&&" eq)*
//! eq      := unary (("==" | "!=") unary)?
//! unary   := "!" unary | primary
//! primary := literal | "(" expr ")" | ident "(" args ")" | ident ("." ident)*
//! ```
//!
//! Builtins: `empty(x)` and `cache(key, seconds, expr)`, the latter backed
//! by the process-wide [`TtlCache`].

use crate::cache::TtlCache;
use crate::context::RenderContext;
use crate::errors::{ExpressionError, ExpressionResult};
use crate::value::Value;
use logos::Logos;
use pagetree_dom::Node;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Evaluates expression text against a render context and the node being
/// rendered
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(&self, expression: &str, context: &RenderContext, node: &Node) -> ExpressionResult<Value>;
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
enum Token<'src> {
    #[token("true")]
    True,

    #[token("false")]
    False,

    #[token("null")]
    Null,

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice())]
    Ident(&'src str),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| lex.slice())]
    #[regex(r#"'([^'\\]|\\.)*'"#, |lex| lex.slice())]
    String(&'src str),

    #[regex(r"-?[0-9]+(\.[0-9]+)?", |lex| lex.slice())]
    Number(&'src str),

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token(",")]
    Comma,

    #[token(".")]
    Dot,

    #[token("!")]
    Bang,

    #[token("==")]
    Equal,

    #[token("!=")]
    NotEqual,

    #[token("&&")]
    And,

    #[token("||")]
    Or,
}

impl<'src> fmt::Display for Token<'src> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Null => write!(f, "null"),
            Token::Ident(s) => write!(f, "identifier '{}'", s),
            Token::String(s) => write!(f, "string {}", s),
            Token::Number(n) => write!(f, "number {}", n),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
            Token::Dot => write!(f, "."),
            Token::Bang => write!(f, "!"),
            Token::Equal => write!(f, "=="),
            Token::NotEqual => write!(f, "!="),
            Token::And => write!(f, "&&"),
            Token::Or => write!(f, "||"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Path(Vec<String>),
    Not(Box<Expr>),
    Equal(Box<Expr>, Box<Expr>),
    NotEqual(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

fn tokenize(source: &str) -> ExpressionResult<Vec<Token<'_>>> {
    Token::lexer(source)
        .spanned()
        .map(|(result, span)| {
            result.map_err(|_| ExpressionError::Lex {
                expression: source.to_string(),
                position: span.start,
            })
        })
        .collect()
}

/// Strip quotes and resolve backslash escapes
fn unquote(literal: &str) -> String {
    let inner = &literal[1..literal.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

struct Parser<'a, 'src> {
    source: &'a str,
    tokens: Vec<Token<'src>>,
    pos: usize,
}

impl<'a, 'src> Parser<'a, 'src> {
    fn peek(&self) -> Option<&Token<'src>> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token<'src>> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn error(&self, found: Option<&Token<'src>>, expected: &str) -> ExpressionError {
        ExpressionError::Syntax {
            expression: self.source.to_string(),
            found: found
                .map(|t| t.to_string())
                .unwrap_or_else(|| "end of expression".to_string()),
            expected: expected.to_string(),
        }
    }

    fn expect(&mut self, expected: Token<'src>) -> ExpressionResult<()> {
        match self.advance() {
            Some(token) if token == expected => Ok(()),
            other => Err(self.error(other.as_ref(), &expected.to_string())),
        }
    }

    fn parse(mut self) -> ExpressionResult<Expr> {
        let expr = self.parse_or()?;
        match self.peek() {
            None => Ok(expr),
            Some(token) => Err(self.error(Some(token), "end of expression")),
        }
    }

    fn parse_or(&mut self) -> ExpressionResult<Expr> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> ExpressionResult<Expr> {
        let mut lhs = self.parse_equality()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let rhs = self.parse_equality()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> ExpressionResult<Expr> {
        let lhs = self.parse_unary()?;
        match self.peek() {
            Some(Token::Equal) => {
                self.advance();
                let rhs = self.parse_unary()?;
                Ok(Expr::Equal(Box::new(lhs), Box::new(rhs)))
            }
            Some(Token::NotEqual) => {
                self.advance();
                let rhs = self.parse_unary()?;
                Ok(Expr::NotEqual(Box::new(lhs), Box::new(rhs)))
            }
            _ => Ok(lhs),
        }
    }

    fn parse_unary(&mut self) -> ExpressionResult<Expr> {
        if self.peek() == Some(&Token::Bang) {
            self.advance();
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> ExpressionResult<Expr> {
        match self.advance() {
            Some(Token::True) => Ok(Expr::Literal(Value::Boolean(true))),
            Some(Token::False) => Ok(Expr::Literal(Value::Boolean(false))),
            Some(Token::Null) => Ok(Expr::Literal(Value::Null)),
            Some(Token::String(s)) => Ok(Expr::Literal(Value::String(unquote(s)))),
            Some(Token::Number(n)) => n
                .parse::<f64>()
                .map(|n| Expr::Literal(Value::Number(n)))
                .map_err(|_| self.error(Some(&Token::Number(n)), "number")),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.advance();
                    let args = self.parse_arguments()?;
                    return Ok(Expr::Call(name.to_string(), args));
                }
                let mut path = vec![name.to_string()];
                while self.peek() == Some(&Token::Dot) {
                    self.advance();
                    match self.advance() {
                        Some(Token::Ident(segment)) => path.push(segment.to_string()),
                        other => return Err(self.error(other.as_ref(), "property name")),
                    }
                }
                Ok(Expr::Path(path))
            }
            other => Err(self.error(other.as_ref(), "value")),
        }
    }

    fn parse_arguments(&mut self) -> ExpressionResult<Vec<Expr>> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.parse_or()?);
            match self.advance() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                other => return Err(self.error(other.as_ref(), "',' or ')'")),
            }
        }
    }
}

fn parse(source: &str) -> ExpressionResult<Expr> {
    let tokens = tokenize(source)?;
    Parser {
        source,
        tokens,
        pos: 0,
    }
    .parse()
}

/// Loose equality: numbers compare with numeric strings
fn loose_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            s.trim().parse::<f64>().map(|p| p == *n).unwrap_or(false)
        }
        _ => a == b,
    }
}

/// Values the expression `this` exposes about the rendered node
fn node_value(node: &Node) -> Value {
    let mut map = BTreeMap::new();
    map.insert("id".to_string(), Value::String(node.id_hash_or_property()));
    map.insert("name".to_string(), Value::String(node.context_name()));
    map.insert(
        "type".to_string(),
        Value::String(node.kind().kind_name().to_string()),
    );
    if let Some(tag) = node.kind().tag() {
        map.insert("tag".to_string(), Value::String(tag.to_string()));
    }
    Value::Object(map)
}

/// Built-in evaluator for the condition language
#[derive(Debug, Clone)]
pub struct SimpleExpressionEvaluator {
    cache: Arc<TtlCache>,
}

impl Default for SimpleExpressionEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl SimpleExpressionEvaluator {
    /// Evaluator backed by the process-wide cache
    pub fn new() -> Self {
        Self {
            cache: TtlCache::global(),
        }
    }

    pub fn with_cache(cache: Arc<TtlCache>) -> Self {
        Self { cache }
    }

    fn eval(&self, expr: &Expr, context: &RenderContext, node: &Node) -> ExpressionResult<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Path(path) => Ok(self.resolve_path(path, context, node)),
            Expr::Not(inner) => Ok(Value::Boolean(!self.eval(inner, context, node)?.is_truthy())),
            Expr::Equal(lhs, rhs) => {
                let (a, b) = (self.eval(lhs, context, node)?, self.eval(rhs, context, node)?);
                Ok(Value::Boolean(loose_equals(&a, &b)))
            }
            Expr::NotEqual(lhs, rhs) => {
                let (a, b) = (self.eval(lhs, context, node)?, self.eval(rhs, context, node)?);
                Ok(Value::Boolean(!loose_equals(&a, &b)))
            }
            Expr::And(lhs, rhs) => {
                if !self.eval(lhs, context, node)?.is_truthy() {
                    return Ok(Value::Boolean(false));
                }
                Ok(Value::Boolean(self.eval(rhs, context, node)?.is_truthy()))
            }
            Expr::Or(lhs, rhs) => {
                if self.eval(lhs, context, node)?.is_truthy() {
                    return Ok(Value::Boolean(true));
                }
                Ok(Value::Boolean(self.eval(rhs, context, node)?.is_truthy()))
            }
            Expr::Call(name, args) => self.call(name, args, context, node),
        }
    }

    fn resolve_path(&self, path: &[String], context: &RenderContext, node: &Node) -> Value {
        let Some((head, rest)) = path.split_first() else {
            return Value::Null;
        };
        let root = if head == "this" {
            Some(node_value(node))
        } else {
            context.lookup(head)
        };
        let Some(mut value) = root else {
            return Value::Null;
        };
        for segment in rest {
            match value.get(segment) {
                Some(next) => value = next.clone(),
                None => return Value::Null,
            }
        }
        value
    }

    fn call(
        &self,
        name: &str,
        args: &[Expr],
        context: &RenderContext,
        node: &Node,
    ) -> ExpressionResult<Value> {
        let invalid = |message: &str| ExpressionError::InvalidArguments {
            function: name.to_string(),
            message: message.to_string(),
        };

        match name {
            "empty" => {
                let [arg] = args else {
                    return Err(invalid("expected one argument"));
                };
                Ok(Value::Boolean(self.eval(arg, context, node)?.is_empty()))
            }
            "cache" => {
                let [key, timeout, value] = args else {
                    return Err(invalid("expected key, timeout and value"));
                };
                let key = self.eval(key, context, node)?.to_display_string();
                if key.trim().is_empty() {
                    return Err(invalid("key may not be empty"));
                }
                let seconds = self
                    .eval(timeout, context, node)?
                    .as_f64()
                    .ok_or_else(|| invalid("timeout must be a number"))?;
                let ttl = Duration::try_from_secs_f64(seconds.max(0.0))
                    .map_err(|_| invalid("timeout out of range"))?;
                self.cache
                    .lookup(&key, ttl, || self.eval(value, context, node))
            }
            other => Err(ExpressionError::UnknownFunction(other.to_string())),
        }
    }
}

impl ExpressionEvaluator for SimpleExpressionEvaluator {
    fn evaluate(&self, expression: &str, context: &RenderContext, node: &Node) -> ExpressionResult<Value> {
        let expr = parse(expression)?;
        self.eval(&expr, context, node)
    }
}

/// Replace every `${expr}` in `text`. A failing expression logs and
/// renders as empty text.
pub fn interpolate(
    text: &str,
    evaluator: &dyn ExpressionEvaluator,
    context: &RenderContext,
    node: &Node,
) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let body = &rest[start + 2..];
        let Some(end) = placeholder_end(body) else {
            // Unterminated placeholder stays literal
            out.push_str(&rest[start..]);
            return out;
        };

        let expression = &body[..end];
        match evaluator.evaluate(expression, context, node) {
            Ok(value) => out.push_str(&value.to_display_string()),
            Err(e) => warn!(node = %node.id(), expression = %expression, error = %e, "Placeholder could not be evaluated"),
        }
        rest = &body[end + 1..];
    }

    out.push_str(rest);
    out
}

/// Index of the `}` closing a placeholder body, skipping quoted strings
/// and nested braces
fn placeholder_end(body: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in body.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '{' => depth += 1,
            '}' if depth == 0 => return Some(i),
            '}' => depth -= 1,
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagetree_dom::{NodeKind, NodeSnapshot, Principal, Tree};
    use serde_json::json;

    fn node() -> (Tree, Node) {
        let mut tree = Tree::new();
        let snapshot = NodeSnapshot::new(NodeKind::page("home"))
            .with_children(vec![NodeSnapshot::new(NodeKind::element("section"))]);
        let page = tree.import_snapshot(&snapshot).unwrap();
        let section = tree.children(page)[0];
        let node = tree.node(section).unwrap().clone();
        (tree, node)
    }

    fn eval(expression: &str, context: &RenderContext) -> ExpressionResult<Value> {
        let (_tree, node) = node();
        SimpleExpressionEvaluator::with_cache(Arc::new(TtlCache::new())).evaluate(expression, context, &node)
    }

    #[test]
    fn test_tokenize_operators() {
        let tokens = tokenize("!a.b == 'x' && (c != 2 || true)").unwrap();
        assert_eq!(tokens[0], Token::Bang);
        assert_eq!(tokens[1], Token::Ident("a"));
        assert_eq!(tokens[2], Token::Dot);
        assert_eq!(tokens[4], Token::Equal);
        assert_eq!(tokens[5], Token::String("'x'"));
        assert!(tokens.contains(&Token::NotEqual));
        assert_eq!(tokens.last(), Some(&Token::RParen));
    }

    #[test]
    fn test_lex_error_reports_position() {
        assert_eq!(
            tokenize("a # b"),
            Err(ExpressionError::Lex {
                expression: "a # b".to_string(),
                position: 2
            })
        );
    }

    #[test]
    fn test_logic_and_comparison() {
        let context = RenderContext::new(Principal::user("ann")).with_locale("de");

        assert_eq!(eval("locale == 'de'", &context), Ok(Value::Boolean(true)));
        assert_eq!(eval("locale != \"de\" || false", &context), Ok(Value::Boolean(false)));
        assert_eq!(eval("!(true && null)", &context), Ok(Value::Boolean(true)));
        assert_eq!(eval("me.name", &context), Ok(Value::from("ann")));
        assert_eq!(eval("me.isAdmin", &context), Ok(Value::Boolean(false)));
    }

    #[test]
    fn test_numbers_compare_with_numeric_strings() {
        let context = RenderContext::new(Principal::Anonymous).with_request_parameter("page", "2");
        assert_eq!(eval("request.page == 2", &context), Ok(Value::Boolean(true)));
    }

    #[test]
    fn test_data_paths_and_empty() {
        let context = RenderContext::new(Principal::Anonymous)
            .with_data_object(Value::from(json!({ "title": "Hi", "tags": [] })));

        assert_eq!(eval("current.title", &context), Ok(Value::from("Hi")));
        assert_eq!(eval("empty(current.tags)", &context), Ok(Value::Boolean(true)));
        assert_eq!(eval("empty(current.missing)", &context), Ok(Value::Boolean(true)));
        assert_eq!(eval("this.tag", &context), Ok(Value::from("section")));
    }

    #[test]
    fn test_syntax_errors() {
        let context = RenderContext::new(Principal::Anonymous);

        assert!(matches!(eval("a ==", &context), Err(ExpressionError::Syntax { .. })));
        assert!(matches!(eval("(a", &context), Err(ExpressionError::Syntax { .. })));
        assert_eq!(
            eval("nope(1)", &context),
            Err(ExpressionError::UnknownFunction("nope".to_string()))
        );
        assert!(matches!(
            eval("empty(1, 2)", &context),
            Err(ExpressionError::InvalidArguments { .. })
        ));
    }

    #[test]
    fn test_cache_builtin() {
        let (_tree, node) = node();
        let cache = Arc::new(TtlCache::new());
        let evaluator = SimpleExpressionEvaluator::with_cache(cache.clone());
        let first = RenderContext::new(Principal::Anonymous).with_locale("de");
        let second = RenderContext::new(Principal::Anonymous).with_locale("fr");

        assert_eq!(
            evaluator.evaluate("cache('greeting', 60, locale)", &first, &node),
            Ok(Value::from("de"))
        );
        // Fresh entry: the value expression is not evaluated again
        assert_eq!(
            evaluator.evaluate("cache('greeting', 60, locale)", &second, &node),
            Ok(Value::from("de"))
        );
        assert_eq!(cache.len(), 1);
        assert!(matches!(
            evaluator.evaluate("cache('', 60, locale)", &first, &node),
            Err(ExpressionError::InvalidArguments { .. })
        ));
        assert!(matches!(
            evaluator.evaluate("cache('k', 'soon', locale)", &first, &node),
            Err(ExpressionError::InvalidArguments { .. })
        ));
    }

    #[test]
    fn test_interpolate() {
        let (_tree, node) = node();
        let evaluator = SimpleExpressionEvaluator::with_cache(Arc::new(TtlCache::new()));
        let context = RenderContext::new(Principal::Anonymous)
            .with_data_object(Value::from(json!({ "name": "Ada" })));

        assert_eq!(
            interpolate("Hello ${current.name}!", &evaluator, &context, &node),
            "Hello Ada!"
        );
        assert_eq!(
            interpolate("${'}'} and ${broken ==}", &evaluator, &context, &node),
            "} and "
        );
        assert_eq!(interpolate("cost: ${unclosed", &evaluator, &context, &node), "cost: ${unclosed");
    }
}
