//! Data types that cross the service boundary.
//!
//! Request bodies for the search API, registrar records, artifact
//! descriptors returned by the discovery service, and the search hits the
//! index produces.

use serde::{Deserialize, Serialize};

/// Body of `POST /api/search/add`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddData {
    pub uuid: String,
    pub name: String,
    pub description: String,
}

/// Body of the query endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryData {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    1
}

/// One data-product record as listed by the registrar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrarRecord {
    pub uuid: String,
    pub name: String,
    pub description: String,
}

/// Downloadable resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub mimetype: String,
    pub url: String,
}

/// Artifact (data reference) attached to a data product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub productnamespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub productname: Option<String>,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub license: String,
    pub securitypolicy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Resource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub createtimestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updatetimestamp: Option<String>,
}

/// Metadata stored alongside every indexed description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitMetadata {
    pub name: String,
    /// External (registrar) id of the data product.
    pub id: String,
}

/// A search result: the indexed text, its metadata and, for artifact
/// queries, the artifacts of the matching data product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub data: String,
    pub metadata: HitMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Vec<Artifact>>,
}

/// Response body of the query endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub data: Vec<SearchHit>,
}
