//! Cache Key Module
//!
//! Structured cache keys and their reduction to a single canonical string.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CacheError, EngineResult};

/// Ordered filter mapping. `BTreeMap` keeps serialization order stable.
pub type Filters = BTreeMap<String, Value>;

// == Operation ==
/// Logical operation a cached result belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
    Upsert,
    Custom,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Select => "select",
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Upsert => "upsert",
            Operation::Custom => "custom",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// == Cache Key ==
/// Structured description of a cached result.
///
/// Reduced to a string by [`CacheKey::generate_key`]:
/// - `custom:<custom>` when a custom key is set
/// - `<namespace>:<operation>:[scope:<scope>]:<canonical filters JSON>` otherwise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheKey {
    /// Logical table or namespace
    pub namespace: String,
    /// Operation the cached result answers
    pub operation: Operation,
    /// Scalar filters, serialized with sorted keys
    pub filters: Option<Filters>,
    /// Optional scope such as a user id
    pub scope: Option<String>,
    /// Explicit key overriding the derived form
    pub custom: Option<String>,
}

impl CacheKey {
    // == Constructors ==
    /// Creates a key for `operation` on `namespace` with no filters or scope.
    pub fn new(namespace: impl Into<String>, operation: Operation) -> Self {
        Self {
            namespace: namespace.into(),
            operation,
            filters: None,
            scope: None,
            custom: None,
        }
    }

    /// Shorthand for a `select` key.
    pub fn select(namespace: impl Into<String>) -> Self {
        Self::new(namespace, Operation::Select)
    }

    /// Creates a key whose string form is `custom:<key>`.
    pub fn custom(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            custom: Some(key.into()),
            ..Self::new(namespace, Operation::Custom)
        }
    }

    // == Builders ==
    /// Replaces the filter mapping.
    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = Some(filters);
        self
    }

    /// Adds a single filter entry.
    pub fn with_filter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters
            .get_or_insert_with(Filters::new)
            .insert(name.into(), value.into());
        self
    }

    /// Sets or clears the scope.
    pub fn with_scope(mut self, scope: Option<String>) -> Self {
        self.scope = scope;
        self
    }

    // == Generate Key ==
    /// Reduces the key to its canonical string.
    ///
    /// Fails when a filter value is not a scalar or when a derived key has
    /// no namespace. Empty `custom`/`scope` strings count as unset.
    pub fn generate_key(&self) -> EngineResult<String> {
        if let Some(custom) = self.custom.as_deref().filter(|c| !c.is_empty()) {
            return Ok(format!("custom:{}", custom));
        }

        if self.namespace.is_empty() {
            return Err(CacheError::KeyDerivation(
                "namespace must not be empty".to_string(),
            ));
        }

        let filter_string = match &self.filters {
            Some(filters) => canonical_filters(filters)?,
            None => String::new(),
        };

        let scope_string = match self.scope.as_deref().filter(|s| !s.is_empty()) {
            Some(scope) => format!("scope:{}", scope),
            None => String::new(),
        };

        Ok(format!(
            "{}:{}:{}:{}",
            self.namespace, self.operation, scope_string, filter_string
        ))
    }
}

/// Serializes filters as JSON with sorted keys, rejecting non-scalar values.
fn canonical_filters(filters: &Filters) -> EngineResult<String> {
    if let Some((name, _)) = filters
        .iter()
        .find(|(_, value)| matches!(value, Value::Array(_) | Value::Object(_)))
    {
        return Err(CacheError::KeyDerivation(format!(
            "filter '{}' is not a scalar value",
            name
        )));
    }

    serde_json::to_string(filters).map_err(|e| CacheError::KeyDerivation(e.to_string()))
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_with_filters() {
        let key = CacheKey::select("products").with_filter("id", "P1");
        assert_eq!(key.generate_key().unwrap(), r#"products:select::{"id":"P1"}"#);
    }

    #[test]
    fn test_key_without_filters() {
        let key = CacheKey::select("orders");
        assert_eq!(key.generate_key().unwrap(), "orders:select::");

        let key = CacheKey::select("orders").with_filters(Filters::new());
        assert_eq!(key.generate_key().unwrap(), "orders:select::{}");
    }

    #[test]
    fn test_key_with_scope() {
        let key = CacheKey::select("alerts")
            .with_filter("resolved", false)
            .with_scope(Some("user-7".to_string()));
        assert_eq!(
            key.generate_key().unwrap(),
            r#"alerts:select:scope:user-7:{"resolved":false}"#
        );
    }

    #[test]
    fn test_empty_scope_is_ignored() {
        let key = CacheKey::select("alerts").with_scope(Some(String::new()));
        assert_eq!(key.generate_key().unwrap(), "alerts:select::");
    }

    #[test]
    fn test_custom_key_overrides_everything() {
        let key = CacheKey::custom("req", "req:GET:/api/alerts").with_filter("ignored", 1);
        assert_eq!(key.generate_key().unwrap(), "custom:req:GET:/api/alerts");
    }

    #[test]
    fn test_filter_order_is_canonical() {
        let a = CacheKey::select("sales")
            .with_filter("store", "north")
            .with_filter("amount", 10);
        let b = CacheKey::select("sales")
            .with_filter("amount", 10)
            .with_filter("store", "north");
        assert_eq!(a.generate_key().unwrap(), b.generate_key().unwrap());
        assert_eq!(
            a.generate_key().unwrap(),
            r#"sales:select::{"amount":10,"store":"north"}"#
        );
    }

    #[test]
    fn test_non_scalar_filter_is_rejected() {
        let key = CacheKey::select("products").with_filter("tags", json!(["a", "b"]));
        assert!(matches!(
            key.generate_key(),
            Err(CacheError::KeyDerivation(_))
        ));
    }

    #[test]
    fn test_empty_namespace_is_rejected() {
        let key = CacheKey::select("");
        assert!(key.generate_key().is_err());
    }

    #[test]
    fn test_operation_names() {
        assert_eq!(Operation::Upsert.to_string(), "upsert");
        assert_eq!(
            serde_json::to_string(&Operation::Select).unwrap(),
            "\"select\""
        );
    }
}
