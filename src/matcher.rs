//! Pure normalization of a [`RecordedRequest`] into a [`MatchingKey`], and
//! derivation of the short content hash used as the cassette filename.

use std::collections::HashSet;

use sha2::{Digest, Sha256};

use crate::model::{MatchingKey, RecordedRequest, RouteIgnoreConfig};

fn normalize_path(path: &str) -> String {
    let lower = path.to_ascii_lowercase();
    if lower == "/" {
        lower
    } else {
        let trimmed = lower.trim_end_matches('/');
        if trimmed.is_empty() {
            "/".to_string()
        } else {
            trimmed.to_string()
        }
    }
}

fn url_encode_doseq(pairs: &[(String, String)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in pairs {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}

fn normalize_query(query: &std::collections::HashMap<String, Vec<String>>, ignore: &[String]) -> Option<String> {
    let ignored: HashSet<&str> = ignore.iter().map(String::as_str).collect();
    let mut pairs: Vec<(String, String)> = Vec::new();
    let mut names: Vec<&String> = query
        .keys()
        .filter(|name| !ignored.contains(name.as_str()))
        .collect();
    names.sort();

    for name in names {
        let mut values = query[name].clone();
        values.sort();
        for value in values {
            pairs.push((name.clone(), value));
        }
    }

    if pairs.is_empty() {
        None
    } else {
        Some(url_encode_doseq(&pairs))
    }
}

fn normalize_headers(
    headers: &std::collections::HashMap<String, String>,
    always_ignore: &HashSet<String>,
    route_ignore: &[String],
) -> Option<String> {
    let mut ignored: HashSet<String> = always_ignore.iter().map(|h| h.to_ascii_lowercase()).collect();
    ignored.extend(route_ignore.iter().map(|h| h.to_ascii_lowercase()));

    let mut entries: Vec<(String, &String)> = headers
        .iter()
        .filter(|(name, _)| !ignored.contains(name.as_str()))
        .map(|(name, value)| (name.to_ascii_lowercase(), value))
        .collect();

    if entries.is_empty() {
        return None;
    }

    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Some(
        entries
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&"),
    )
}

fn normalize_json_body(body: &str, ignore_fields: &[String]) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(mut map)) => {
            for field in ignore_fields {
                map.remove(field);
            }
            let sorted: std::collections::BTreeMap<String, serde_json::Value> = map.into_iter().collect();
            serde_json::to_string(&sorted).unwrap_or_else(|_| body.to_string())
        }
        Ok(other) => serde_json::to_string(&other).unwrap_or_else(|_| body.to_string()),
        Err(_) => body.to_string(),
    }
}

fn normalize_form_body(body: &str) -> String {
    let mut pairs: Vec<(String, String)> = url::form_urlencoded::parse(body.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();
    url_encode_doseq(&pairs)
}

fn normalize_body(
    body: Option<&str>,
    content_type: Option<&str>,
    ignore_fields: &[String],
) -> Option<String> {
    let body = body?;
    match content_type {
        Some(ct) if ct.contains("application/json") => Some(normalize_json_body(body, ignore_fields)),
        Some(ct) if ct.contains("application/x-www-form-urlencoded") => Some(normalize_form_body(body)),
        _ => Some(body.to_string()),
    }
}

/// Compute the canonical [`MatchingKey`] for a request.
pub fn compute_key(
    request: &RecordedRequest,
    always_ignore_headers: &HashSet<String>,
    route_ignore: &RouteIgnoreConfig,
) -> MatchingKey {
    MatchingKey {
        method: request.method.to_ascii_uppercase(),
        path: normalize_path(&request.path),
        query: normalize_query(&request.query, &route_ignore.query_params),
        body: normalize_body(
            request.body.as_deref(),
            request.content_type.as_deref(),
            &route_ignore.body_fields,
        ),
        headers: normalize_headers(&request.headers, always_ignore_headers, &route_ignore.headers),
    }
}

/// Derive the 8-hex-char filename fragment from a matching key: SHA-256 of
/// the canonical JSON of the key, field order fixed as method, path, query,
/// body, headers, truncated to its first 8 hex chars.
pub fn compute_hash(key: &MatchingKey) -> String {
    let canonical = serde_json::to_string(key).expect("MatchingKey always serializes");
    let digest = Sha256::digest(canonical.as_bytes());
    let full = hex_encode(&digest);
    full[..8].to_string()
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(s, "{b:02x}").expect("writing to a String never fails");
    }
    s
}
