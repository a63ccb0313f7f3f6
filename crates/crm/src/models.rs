//! Wire models for the CRM record store API.
//!
//! The CRM exposes a property-bag object model: every record is an id plus
//! a string-valued property map. Typed projection into local columns happens
//! in `examsync-core`; this crate only knows the wire shape.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A raw record as returned by the CRM search and batch endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmRecord {
    pub id: String,
    /// Property values. The CRM serializes absent values as `null`.
    #[serde(default)]
    pub properties: HashMap<String, Option<String>>,
    /// Server-side last modification timestamp.
    #[serde(rename = "updatedAt", default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CrmRecord {
    /// Fetch a property value, treating `null` and empty strings as absent.
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .get(name)
            .and_then(|v| v.as_deref())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

/// A single filter condition within a search filter group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub property_name: String,
    /// CRM comparison operator, e.g. `GTE`, `EQ`.
    pub operator: String,
    pub value: String,
}

impl Filter {
    pub fn gte(property: &str, value: String) -> Self {
        Self {
            property_name: property.to_string(),
            operator: "GTE".to_string(),
            value,
        }
    }
}

/// A group of filters combined with AND; groups themselves are OR-ed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterGroup {
    pub filters: Vec<Filter>,
}

/// Request body for `POST /objects/{type}/search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub filter_groups: Vec<FilterGroup>,
    /// Allow-list of properties to return.
    pub properties: Vec<String>,
    /// Page size; the CRM caps this at 100.
    pub limit: u32,
    /// Continuation token from the previous page, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
}

/// Response body for `POST /objects/{type}/search`.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub results: Vec<CrmRecord>,
    #[serde(default)]
    pub paging: Option<Paging>,
}

impl SearchResponse {
    /// Continuation token for the next page, if the CRM reported one.
    pub fn next_after(&self) -> Option<&str> {
        self.paging
            .as_ref()
            .and_then(|p| p.next.as_ref())
            .map(|n| n.after.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Paging {
    #[serde(default)]
    pub next: Option<PagingNext>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PagingNext {
    pub after: String,
}

/// One record update within a batch update request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchUpdateInput {
    pub id: String,
    pub properties: HashMap<String, String>,
}

/// Request body for `POST /objects/{type}/batch/read`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct BatchReadRequest {
    pub properties: Vec<String>,
    pub inputs: Vec<BatchInputId>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct BatchInputId {
    pub id: String,
}

/// Request body for `POST /objects/{type}/batch/update`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct BatchUpdateRequest {
    pub inputs: Vec<BatchUpdateInput>,
}

/// Response body shared by the batch endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub results: Vec<CrmRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_normalizes_null_and_empty() {
        let mut properties = HashMap::new();
        properties.insert("name".to_string(), Some("B2 Mock Exam".to_string()));
        properties.insert("location".to_string(), Some("  ".to_string()));
        properties.insert("status".to_string(), None);

        let record = CrmRecord {
            id: "101".to_string(),
            properties,
            updated_at: None,
        };

        assert_eq!(record.property("name"), Some("B2 Mock Exam"));
        assert_eq!(record.property("location"), None);
        assert_eq!(record.property("status"), None);
        assert_eq!(record.property("missing"), None);
    }

    #[test]
    fn test_search_request_serialization() {
        let request = SearchRequest {
            filter_groups: vec![FilterGroup {
                filters: vec![Filter::gte("hs_lastmodifieddate", "1718000000000".to_string())],
            }],
            properties: vec!["name".to_string()],
            limit: 100,
            after: None,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json["filterGroups"][0]["filters"][0]["propertyName"],
            "hs_lastmodifieddate"
        );
        assert_eq!(json["filterGroups"][0]["filters"][0]["operator"], "GTE");
        // Absent continuation token must not be serialized at all.
        assert!(json.get("after").is_none());
    }

    #[test]
    fn test_search_response_next_after() {
        let body = r#"{
            "total": 250,
            "results": [],
            "paging": { "next": { "after": "b2b00a1" } }
        }"#;
        let response: SearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.next_after(), Some("b2b00a1"));

        let last_page: SearchResponse = serde_json::from_str(r#"{"results": []}"#).unwrap();
        assert_eq!(last_page.next_after(), None);
    }
}
