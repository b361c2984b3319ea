//! Per-route override documents: one YAML file per (domain, method, path),
//! holding an advisory `matched` field inventory alongside the operator's
//! `ignore` rules. Auto-generation merges `matched` only; `ignore` is
//! never written by anything but the operator.

use std::collections::HashSet;
use std::path::PathBuf;

use crate::error::Result;
use crate::model::{MatchedFields, RecordedRequest, RouteIgnoreConfig, RouteMatchRule, RouteMatchingOverride};
use crate::store::path_to_slug;

#[derive(Debug, Clone)]
pub struct RouteConfigManager {
    routes_dir: PathBuf,
}

impl RouteConfigManager {
    pub fn new(routes_dir: impl Into<PathBuf>) -> Self {
        Self {
            routes_dir: routes_dir.into(),
        }
    }

    fn config_path(&self, domain: &str, method: &str, path: &str) -> PathBuf {
        self.routes_dir
            .join(domain)
            .join(format!("{}_{}.yaml", method.to_ascii_uppercase(), path_to_slug(path)))
    }

    /// Load the override document for a route, if one exists. A missing
    /// file is not an error: callers get a default (empty) document.
    pub fn load(&self, domain: &str, method: &str, path: &str) -> Result<RouteMatchingOverride> {
        let file = self.config_path(domain, method, path);
        match std::fs::read_to_string(&file) {
            Ok(content) => Ok(serde_yaml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RouteMatchingOverride {
                route: RouteMatchRule {
                    method: method.to_ascii_uppercase(),
                    path: path.to_string(),
                },
                matched: MatchedFields::default(),
                ignore: RouteIgnoreConfig::default(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Just the `ignore` half, the only part the Matcher needs.
    pub fn load_ignore(&self, domain: &str, method: &str, path: &str) -> Result<RouteIgnoreConfig> {
        Ok(self.load(domain, method, path)?.ignore)
    }

    /// Merge field names observed in `request` into the route's `matched`
    /// inventory and persist. `ignore` is read back unchanged and
    /// rewritten verbatim; this function never adds to or removes from it.
    pub fn auto_generate(&self, domain: &str, request: &RecordedRequest) -> Result<()> {
        let mut doc = self.load(domain, &request.method, &request.path)?;

        let mut query_params: HashSet<String> = doc.matched.query_params.iter().cloned().collect();
        query_params.extend(request.query.keys().cloned());

        let mut headers: HashSet<String> = doc.matched.headers.iter().cloned().collect();
        headers.extend(request.headers.keys().cloned());

        let mut body_fields: HashSet<String> = doc.matched.body_fields.iter().cloned().collect();
        if let Some(body) = &request.body {
            let content_type = request.content_type.as_deref().unwrap_or("");
            if content_type.contains("application/x-www-form-urlencoded") {
                body_fields.extend(
                    url::form_urlencoded::parse(body.as_bytes()).map(|(k, _)| k.into_owned()),
                );
            } else if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body) {
                body_fields.extend(map.keys().cloned());
            }
        }

        let mut query_params: Vec<String> = query_params.into_iter().collect();
        query_params.sort();
        let mut headers: Vec<String> = headers.into_iter().collect();
        headers.sort();
        let mut body_fields: Vec<String> = body_fields.into_iter().collect();
        body_fields.sort();

        doc.matched = MatchedFields {
            query_params,
            headers,
            body_fields,
        };
        doc.route = RouteMatchRule {
            method: request.method.to_ascii_uppercase(),
            path: request.path.clone(),
        };

        let dir = self.routes_dir.join(domain);
        std::fs::create_dir_all(&dir)?;
        let file = self.config_path(domain, &request.method, &request.path);
        let yaml = serde_yaml::to_string(&doc)?;
        std::fs::write(file, yaml)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BodyEncoding;
    use std::collections::HashMap;

    fn request(body: Option<&str>) -> RecordedRequest {
        RecordedRequest {
            method: "POST".to_string(),
            path: "/login".to_string(),
            query: HashMap::from([("debug".to_string(), vec!["1".to_string()])]),
            headers: HashMap::from([("x-client".to_string(), "web".to_string())]),
            body: body.map(str::to_string),
            body_encoding: BodyEncoding::Utf8,
            content_type: Some("application/json".to_string()),
        }
    }

    #[test]
    fn load_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = RouteConfigManager::new(dir.path());
        let doc = mgr.load("api.example.com", "GET", "/x").unwrap();
        assert!(doc.matched.headers.is_empty());
        assert!(doc.ignore.headers.is_empty());
    }

    #[test]
    fn auto_generate_creates_and_merges_matched() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = RouteConfigManager::new(dir.path());

        mgr.auto_generate("api.example.com", &request(Some(r#"{"login":"a","password":"b"}"#)))
            .unwrap();

        let doc = mgr.load("api.example.com", "POST", "/login").unwrap();
        assert_eq!(doc.matched.query_params, vec!["debug".to_string()]);
        assert_eq!(doc.matched.headers, vec!["x-client".to_string()]);
        assert_eq!(
            doc.matched.body_fields,
            vec!["login".to_string(), "password".to_string()]
        );
    }

    #[test]
    fn auto_generate_is_monotonic_union_across_calls() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = RouteConfigManager::new(dir.path());

        mgr.auto_generate("api.example.com", &request(Some(r#"{"login":"a"}"#)))
            .unwrap();
        mgr.auto_generate("api.example.com", &request(Some(r#"{"action":"go"}"#)))
            .unwrap();

        let doc = mgr.load("api.example.com", "POST", "/login").unwrap();
        assert_eq!(
            doc.matched.body_fields,
            vec!["action".to_string(), "login".to_string()]
        );
    }

    #[test]
    fn auto_generate_extracts_form_urlencoded_field_names() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = RouteConfigManager::new(dir.path());

        let mut req = request(Some("login=a&remember=1"));
        req.content_type = Some("application/x-www-form-urlencoded".to_string());

        mgr.auto_generate("api.example.com", &req).unwrap();

        let doc = mgr.load("api.example.com", "POST", "/login").unwrap();
        assert_eq!(
            doc.matched.body_fields,
            vec!["login".to_string(), "remember".to_string()]
        );
    }

    #[test]
    fn auto_generate_never_touches_ignore() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = RouteConfigManager::new(dir.path());
        let domain_dir = dir.path().join("api.example.com");
        std::fs::create_dir_all(&domain_dir).unwrap();
        std::fs::write(
            domain_dir.join("POST_login.yaml"),
            "route:\n  method: POST\n  path: /login\nmatched:\n  query_params: []\n  headers: []\n  body_fields: []\nignore:\n  headers: []\n  body_fields: [login, password]\n  query_params: []\n",
        )
        .unwrap();

        mgr.auto_generate("api.example.com", &request(Some(r#"{"login":"a","password":"b"}"#)))
            .unwrap();

        let doc = mgr.load("api.example.com", "POST", "/login").unwrap();
        assert_eq!(
            doc.ignore.body_fields,
            vec!["login".to_string(), "password".to_string()]
        );
    }
}
