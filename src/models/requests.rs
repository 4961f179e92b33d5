//! Request DTOs for the admin API
//!
//! Defines the structure of incoming HTTP request bodies and queries.

use serde::Deserialize;

/// Longest accepted invalidation pattern
const MAX_PATTERN_LEN: usize = 256;

/// Request body for POST /invalidate
///
/// Every cached key containing `pattern` as a substring is removed.
#[derive(Debug, Clone, Deserialize)]
pub struct InvalidateRequest {
    pub pattern: String,
}

impl InvalidateRequest {
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.pattern.is_empty() {
            return Some("Pattern cannot be empty".to_string());
        }
        if self.pattern.len() > MAX_PATTERN_LEN {
            return Some(format!(
                "Pattern exceeds maximum length of {} characters",
                MAX_PATTERN_LEN
            ));
        }
        None
    }
}

/// Query string of GET /keys
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeysQuery {
    /// Only list keys containing this substring
    #[serde(default)]
    pub contains: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalidate_request_deserialize() {
        let req: InvalidateRequest = serde_json::from_str(r#"{"pattern": "products"}"#).unwrap();
        assert_eq!(req.pattern, "products");
        assert!(req.validate().is_none());
    }

    #[test]
    fn test_validate_empty_pattern() {
        let req = InvalidateRequest {
            pattern: String::new(),
        };
        assert!(req.validate().is_some());
    }

    #[test]
    fn test_validate_long_pattern() {
        let req = InvalidateRequest {
            pattern: "p".repeat(MAX_PATTERN_LEN + 1),
        };
        assert!(req.validate().is_some());
    }

    #[test]
    fn test_keys_query_defaults() {
        let query: KeysQuery = serde_json::from_str("{}").unwrap();
        assert!(query.contains.is_none());
    }
}
