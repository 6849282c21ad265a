//! Per-pass render state: viewer, locale, edit mode and bound data objects

use crate::value::Value;
use pagetree_dom::Principal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EditMode {
    #[default]
    Default,
    Raw,
    Widget,
    Deployment,
    Detail,
}

impl EditMode {
    /// Effective mode of a pass. Anonymous viewers never get the export
    /// modes; a details object turns `Default` into `Detail`.
    pub fn resolve(requested: EditMode, principal: &Principal, has_details: bool) -> EditMode {
        let mode = if principal.is_anonymous() && requested.is_export() {
            EditMode::Default
        } else {
            requested
        };
        match mode {
            EditMode::Default | EditMode::Detail if has_details => EditMode::Detail,
            EditMode::Detail => EditMode::Default,
            other => other,
        }
    }

    /// Raw, Widget and Deployment render full structure without filters
    pub fn is_export(&self) -> bool {
        matches!(self, EditMode::Raw | EditMode::Widget | EditMode::Deployment)
    }

    /// Whether text and attribute values are HTML-escaped
    pub fn escapes_output(&self) -> bool {
        !matches!(self, EditMode::Raw | EditMode::Widget)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EditMode::Default => "default",
            EditMode::Raw => "raw",
            EditMode::Widget => "widget",
            EditMode::Deployment => "deployment",
            EditMode::Detail => "detail",
        }
    }
}

impl fmt::Display for EditMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EditMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(EditMode::Default),
            "raw" => Ok(EditMode::Raw),
            "widget" => Ok(EditMode::Widget),
            "deployment" => Ok(EditMode::Deployment),
            "detail" => Ok(EditMode::Detail),
            other => Err(format!("unknown edit mode '{}'", other)),
        }
    }
}

/// Cooperative cancellation flag shared between a render pass and its caller
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// State of one render pass
#[derive(Debug, Clone)]
pub struct RenderContext {
    principal: Principal,
    locale: String,
    requested_mode: EditMode,
    details: Option<Value>,
    request_parameters: BTreeMap<String, String>,
    cancel: CancellationToken,
    pub(crate) data_objects: BTreeMap<String, Value>,
    pub(crate) current: Option<Value>,
}

impl RenderContext {
    pub fn new(principal: Principal) -> Self {
        Self {
            principal,
            locale: "en".to_string(),
            requested_mode: EditMode::Default,
            details: None,
            request_parameters: BTreeMap::new(),
            cancel: CancellationToken::new(),
            data_objects: BTreeMap::new(),
            current: None,
        }
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    pub fn with_mode(mut self, mode: EditMode) -> Self {
        self.requested_mode = mode;
        self
    }

    /// Details object of a detail page request
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_request_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.request_parameters.insert(key.into(), value.into());
        self
    }

    /// Initial current data object
    pub fn with_data_object(mut self, value: Value) -> Self {
        self.current = Some(value);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn edit_mode(&self) -> EditMode {
        EditMode::resolve(self.requested_mode, &self.principal, self.details.is_some())
    }

    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    pub fn is_detail_mode(&self) -> bool {
        self.details.is_some()
    }

    pub fn request_parameter(&self, key: &str) -> Option<&str> {
        self.request_parameters.get(key).map(String::as_str)
    }

    pub fn request_parameters(&self) -> &BTreeMap<String, String> {
        &self.request_parameters
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn data_object(&self, key: &str) -> Option<&Value> {
        self.data_objects.get(key)
    }

    pub fn current(&self) -> Option<&Value> {
        self.current.as_ref()
    }

    /// Bind `value` under `key` and make it the current data object
    pub(crate) fn put_data_object(&mut self, key: &str, value: Value) {
        self.data_objects.insert(key.to_string(), value.clone());
        self.current = Some(value);
    }

    pub(crate) fn clear_data_object(&mut self, key: &str) {
        self.data_objects.remove(key);
    }

    /// Root value for the first segment of a dotted path
    pub(crate) fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.data_objects.get(name) {
            return Some(value.clone());
        }
        match name {
            "current" => self.current.clone(),
            "details" => self.details.clone(),
            "locale" => Some(Value::String(self.locale.clone())),
            "request" => Some(Value::Object(
                self.request_parameters
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            )),
            "me" => Some(principal_value(&self.principal)),
            _ => None,
        }
    }
}

fn principal_value(principal: &Principal) -> Value {
    let mut map = BTreeMap::new();
    map.insert(
        "name".to_string(),
        principal
            .name()
            .map(|n| Value::String(n.to_string()))
            .unwrap_or(Value::Null),
    );
    map.insert("isAdmin".to_string(), Value::Boolean(principal.is_admin()));
    map.insert(
        "isAnonymous".to_string(),
        Value::Boolean(principal.is_anonymous()),
    );
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_never_exports() {
        let anonymous = Principal::Anonymous;
        assert_eq!(
            EditMode::resolve(EditMode::Deployment, &anonymous, false),
            EditMode::Default
        );
        assert_eq!(
            EditMode::resolve(EditMode::Raw, &Principal::user("ann"), false),
            EditMode::Raw
        );
    }

    #[test]
    fn test_details_select_detail_mode() {
        let user = Principal::user("ann");
        assert_eq!(EditMode::resolve(EditMode::Default, &user, true), EditMode::Detail);
        assert_eq!(EditMode::resolve(EditMode::Detail, &user, false), EditMode::Default);
        assert_eq!(EditMode::resolve(EditMode::Widget, &user, true), EditMode::Widget);
    }

    #[test]
    fn test_cancellation_is_shared() {
        let token = CancellationToken::new();
        let context = RenderContext::new(Principal::Anonymous).with_cancellation(token.clone());

        assert!(!context.cancellation().is_cancelled());
        token.cancel();
        assert!(context.cancellation().is_cancelled());
    }

    #[test]
    fn test_lookup_prefers_bound_keys() {
        let mut context = RenderContext::new(Principal::user("ann"))
            .with_locale("de")
            .with_request_parameter("page", "2");
        context.put_data_object("locale", Value::from("bound"));

        assert_eq!(context.lookup("locale"), Some(Value::from("bound")));
        assert_eq!(
            context.lookup("request").and_then(|r| r.get("page").cloned()),
            Some(Value::from("2"))
        );
        assert_eq!(context.current(), Some(&Value::from("bound")));
    }
}
