use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Dispatch mode for the proxy core. See spec §4.5 / GLOSSARY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyMode {
    Record,
    Replay,
    Spy,
}

impl Default for ProxyMode {
    fn default() -> Self {
        ProxyMode::Spy
    }
}

/// Text vs. binary body encoding, as decided by the Recording Builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyEncoding {
    #[serde(rename = "utf-8")]
    Utf8,
    Base64,
}

/// A canonicalized inbound request, ready for matching and persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: HashMap<String, Vec<String>>,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
    pub body_encoding: BodyEncoding,
    pub content_type: Option<String>,
}

/// A canonicalized upstream response, ready for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedResponse {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
    pub body_encoding: BodyEncoding,
}

/// Cassette-level metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CassetteMeta {
    pub recorded_at: DateTime<Utc>,
    pub target: String,
    pub domain: String,
    pub vcr_proxy_version: String,
}

/// A single persisted request/response exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cassette {
    pub meta: CassetteMeta,
    pub request: RecordedRequest,
    pub response: RecordedResponse,
}

/// The canonical tuple used to locate a cassette. Equality is structural
/// over all five fields (invariant 1 in spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchingKey {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub body: Option<String>,
    pub headers: Option<String>,
}

/// Per-route fields that should be excluded from the matching key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteIgnoreConfig {
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default)]
    pub body_fields: Vec<String>,
    #[serde(default)]
    pub query_params: Vec<String>,
}

/// Union of field names observed across all recordings for a route.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchedFields {
    #[serde(default)]
    pub query_params: Vec<String>,
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default)]
    pub body_fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteMatchRule {
    pub method: String,
    pub path: String,
}

/// A per-(domain, method, path) override document, persisted as YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteMatchingOverride {
    pub route: RouteMatchRule,
    #[serde(default)]
    pub matched: MatchedFields,
    #[serde(default)]
    pub ignore: RouteIgnoreConfig,
}

/// Snapshot of the dispatcher's monotonic counters, as exposed to an
/// admin surface.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProxyStats {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub recorded: u64,
    pub errors: u64,
}

/// A listed cassette, as exposed to an admin surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CassetteInfo {
    pub domain: String,
    pub filename: String,
    pub cassette_id: String,
}
