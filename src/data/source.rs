//! Source Module
//!
//! Contract of the authoritative store behind the data access layer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::Filters;
use crate::error::SourceError;

/// Result of a source call.
pub type SourceResult<T> = std::result::Result<T, SourceError>;

// == Select Options ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    pub direction: SortDirection,
}

/// Paging and ordering forwarded to [`Source::select`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOptions {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub order_by: Option<OrderBy>,
}

impl SelectOptions {
    pub fn is_default(&self) -> bool {
        self.limit.is_none() && self.offset.is_none() && self.order_by.is_none()
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_order(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by = Some(OrderBy {
            column: column.into(),
            direction,
        });
        self
    }
}

// == Source ==
/// Authoritative store of namespaced records.
///
/// Records travel as JSON values; the data access layer decodes them into
/// typed rows. Filters are equality matches and entries whose value is
/// `null` are ignored.
#[async_trait]
pub trait Source: Send + Sync {
    /// Rows of `namespace` matching every filter.
    async fn select(
        &self,
        namespace: &str,
        filters: &Filters,
        options: &SelectOptions,
    ) -> SourceResult<Vec<Value>>;

    /// A single row by id. `Ok(None)` means the row does not exist.
    async fn select_by_id(&self, namespace: &str, id: &str) -> SourceResult<Option<Value>>;

    /// Inserts a row and returns it as stored.
    async fn insert(&self, namespace: &str, record: Value) -> SourceResult<Value>;

    /// Applies `patch` to the row with `id` and returns the result.
    async fn update(&self, namespace: &str, id: &str, patch: Value) -> SourceResult<Value>;

    /// Inserts or replaces a row keyed by its `id` field.
    async fn upsert(&self, namespace: &str, record: Value) -> SourceResult<Value>;

    /// Removes the row with `id`.
    async fn delete(&self, namespace: &str, id: &str) -> SourceResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_options_builders() {
        let options = SelectOptions::default();
        assert!(options.is_default());

        let options = options
            .with_limit(10)
            .with_offset(20)
            .with_order("triggered_at", SortDirection::Desc);
        assert!(!options.is_default());
        assert_eq!(options.limit, Some(10));
        assert_eq!(options.offset, Some(20));
        assert_eq!(options.order_by.unwrap().direction, SortDirection::Desc);
    }
}
