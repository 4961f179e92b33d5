//! Entity records for the dashboard tables
//!
//! Typed views of rows held by the authoritative source. Each record names
//! the namespace it lives in so typed table handles can be created without
//! repeating the table name.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// A row type stored in a single namespace of the source.
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Namespace (table) holding rows of this type
    const NAMESPACE: &'static str;

    /// Primary key of this row
    fn id(&self) -> &str;
}

/// Catalog product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shelf_life_days: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl Record for Product {
    const NAMESPACE: &'static str = "products";

    fn id(&self) -> &str {
        &self.id
    }
}

/// Operational alert raised against a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    pub alert_type: String,
    pub message: String,
    pub severity: String,
    pub triggered_at: DateTime<Utc>,
    pub resolved: bool,
}

impl Record for Alert {
    const NAMESPACE: &'static str = "alerts";

    fn id(&self) -> &str {
        &self.id
    }
}

/// Point-of-sale transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    pub id: String,
    pub product_id: String,
    pub quantity_sold: u32,
    pub sale_time: DateTime<Utc>,
    pub price: f64,
    pub channel: String,
}

impl Record for Sale {
    const NAMESPACE: &'static str = "sales";

    fn id(&self) -> &str {
        &self.id
    }
}

/// Goods supplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Supplier {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_products: Option<String>,
}

impl Record for Supplier {
    const NAMESPACE: &'static str = "suppliers";

    fn id(&self) -> &str {
        &self.id
    }
}
