use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A stored record, a JSON object keyed by field name.
pub type Record = Map<String, Value>;

/// The sort direction of a list query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Ascending order.
    Asc,
    /// Descending order.
    Desc,
}

/// Options accepted by [`list`](crate::Adapter::list).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOptions {
    /// Equality filter, every entry must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Record>,
    /// Sort order. Only the first key is applied by the in-memory adapter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<BTreeMap<String, SortDirection>>,
    /// 1-based page number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u64>,
    /// Page size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

/// A page of records returned by [`list`](crate::Adapter::list).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResult {
    /// The records on this page.
    pub data: Vec<Value>,
    /// Number of records matching the filter, across all pages.
    pub total: u64,
    /// The page returned.
    pub page: u64,
    /// The page size used.
    pub limit: u64,
    /// Whether more records follow this page.
    pub has_more: bool,
}

/// Features supported by an adapter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterCapabilities {
    #[allow(missing_docs)]
    pub transactions: bool,
    #[allow(missing_docs)]
    pub joins: bool,
    #[allow(missing_docs)]
    pub full_text_search: bool,
    #[allow(missing_docs)]
    pub ttl: bool,
    #[allow(missing_docs)]
    pub json_queries: bool,
    #[allow(missing_docs)]
    pub aggregations: bool,
    #[allow(missing_docs)]
    pub relations: bool,
}
