//! Pure conversion from raw HTTP fields to canonical [`RecordedRequest`] /
//! [`RecordedResponse`] values. No I/O, no failure modes.

use std::collections::HashMap;

use crate::config::REDACTION_PLACEHOLDER;
use crate::model::{BodyEncoding, RecordedRequest, RecordedResponse};

const TEXT_CONTENT_TYPES: &[&str] = &[
    "application/json",
    "text/",
    "application/xml",
    "application/x-www-form-urlencoded",
];

fn is_text_content(content_type: Option<&str>) -> bool {
    match content_type {
        None => true,
        Some(ct) => TEXT_CONTENT_TYPES.iter().any(|t| ct.contains(t)),
    }
}

fn classify_body(body: Option<&[u8]>, content_type: Option<&str>) -> (Option<String>, BodyEncoding) {
    match body {
        None => (None, BodyEncoding::Utf8),
        Some(bytes) if bytes.is_empty() => (None, BodyEncoding::Utf8),
        Some(bytes) if is_text_content(content_type) => {
            let text = String::from_utf8_lossy(bytes).into_owned();
            (Some(text), BodyEncoding::Utf8)
        }
        Some(bytes) => (
            Some(base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                bytes,
            )),
            BodyEncoding::Base64,
        ),
    }
}

fn parse_query_string(query_string: &str) -> HashMap<String, Vec<String>> {
    let mut query: HashMap<String, Vec<String>> = HashMap::new();
    if query_string.is_empty() {
        return query;
    }
    for (key, value) in url::form_urlencoded::parse(query_string.trim_start_matches('?').as_bytes()) {
        query
            .entry(key.into_owned())
            .or_default()
            .push(value.into_owned());
    }
    query
}

fn redact(headers: HashMap<String, String>, sensitive: &std::collections::HashSet<String>) -> HashMap<String, String> {
    headers
        .into_iter()
        .map(|(name, value)| {
            if sensitive.contains(&name.to_ascii_lowercase()) {
                (name, REDACTION_PLACEHOLDER.to_string())
            } else {
                (name, value)
            }
        })
        .collect()
}

/// Build a [`RecordedRequest`] from raw inbound fields.
///
/// `headers` keys are lowercased on storage. Sensitive headers (case
/// insensitive) have their values replaced with the redaction placeholder.
pub fn build_request(
    method: &str,
    path: &str,
    query_string: &str,
    headers: &HashMap<String, String>,
    body: Option<&[u8]>,
    sensitive_headers: &std::collections::HashSet<String>,
) -> RecordedRequest {
    let lowered: HashMap<String, String> = headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
        .collect();
    let content_type = lowered.get("content-type").cloned();
    let query = parse_query_string(query_string);
    let (body, body_encoding) = classify_body(body, content_type.as_deref());
    let headers = redact(lowered, sensitive_headers);

    RecordedRequest {
        method: method.to_ascii_uppercase(),
        path: path.to_string(),
        query,
        headers,
        body,
        body_encoding,
        content_type,
    }
}

/// Build a [`RecordedResponse`] from raw upstream fields.
///
/// Header case is preserved for display, unlike request headers.
pub fn build_response(
    status: u16,
    headers: &HashMap<String, String>,
    body: Option<&[u8]>,
    sensitive_headers: &std::collections::HashSet<String>,
) -> RecordedResponse {
    let content_type = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
        .map(|(_, v)| v.clone());
    let (body, body_encoding) = classify_body(body, content_type.as_deref());
    let headers = redact(headers.clone(), sensitive_headers);

    RecordedResponse {
        status_code: status,
        headers,
        body,
        body_encoding,
    }
}
