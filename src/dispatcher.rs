//! The three-mode dispatch state machine tying the Recording Builder,
//! Matcher, Cassette Store and Route Config Manager together.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;

use crate::config::VcrConfig;
use crate::error::VcrError;
use crate::matcher::compute_key;
use crate::model::{CassetteInfo, CassetteMeta, Cassette, ProxyMode, ProxyStats};
use crate::recording::{build_request, build_response};
use crate::route_config::RouteConfigManager;
use crate::store::CassetteStore;

/// Distinguishes the two upstream failure modes the dispatcher maps to
/// different status codes.
#[derive(Debug)]
pub enum UpstreamError {
    Timeout,
    ConnectionFailed(String),
}

impl std::fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpstreamError::Timeout => write!(f, "upstream timeout"),
            UpstreamError::ConnectionFailed(msg) => write!(f, "upstream unreachable: {msg}"),
        }
    }
}

impl std::error::Error for UpstreamError {}

/// Outbound HTTP forwarding, injected so the core stays transport-agnostic.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn send(
        &self,
        base_url: &str,
        method: &str,
        path: &str,
        headers: &HashMap<String, String>,
        body: Option<Vec<u8>>,
        timeout: Duration,
    ) -> Result<(u16, HashMap<String, String>, Vec<u8>), UpstreamError>;
}

/// A fully formed response ready for the server framing to write out.
pub struct DispatchResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl DispatchResponse {
    fn json_error(status: u16, body: serde_json::Value) -> Self {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        Self {
            status,
            headers,
            body: body.to_string().into_bytes(),
        }
    }

    /// Render a [`VcrError`] using its own status/body mapping, so the
    /// dispatcher never re-derives the status code a variant already knows.
    fn from_error(error: &VcrError) -> Self {
        Self::json_error(error.status_code(), error.to_json_body())
    }
}

fn host_of(base_url: &str) -> String {
    let without_scheme = base_url.splitn(2, "://").nth(1).unwrap_or(base_url);
    without_scheme
        .trim_end_matches('/')
        .splitn(2, '/')
        .next()
        .unwrap_or(without_scheme)
        .to_string()
}

/// Finds the longest matching configured prefix for an inbound path.
/// Returns `(base_url, remaining_path)`.
fn resolve_target<'a>(targets: &'a HashMap<String, String>, path: &str) -> Option<(&'a str, String)> {
    let mut prefixes: Vec<&String> = targets.keys().collect();
    prefixes.sort_by_key(|p| std::cmp::Reverse(p.len()));

    for prefix in prefixes {
        let matches = path == prefix || path.starts_with(&format!("{prefix}/")) || prefix == "/";
        if !matches {
            continue;
        }
        let remaining = if prefix == "/" {
            path.to_string()
        } else {
            path[prefix.len()..].to_string()
        };
        let remaining = if remaining.is_empty() { "/".to_string() } else { remaining };
        return Some((targets.get(prefix).unwrap().as_str(), remaining));
    }
    None
}

fn decode_body(body: Option<&str>, encoding: crate::model::BodyEncoding) -> Vec<u8> {
    match body {
        None => Vec::new(),
        Some(text) => match encoding {
            crate::model::BodyEncoding::Base64 => base64::engine::general_purpose::STANDARD
                .decode(text)
                .unwrap_or_default(),
            crate::model::BodyEncoding::Utf8 => text.as_bytes().to_vec(),
        },
    }
}

pub struct Dispatcher {
    config: VcrConfig,
    mode: RwLock<ProxyMode>,
    store: CassetteStore,
    routes: RouteConfigManager,
    client: Box<dyn UpstreamClient>,
    stats_total: AtomicU64,
    stats_hits: AtomicU64,
    stats_misses: AtomicU64,
    stats_recorded: AtomicU64,
    stats_errors: AtomicU64,
}

impl Dispatcher {
    pub fn new(config: VcrConfig, client: Box<dyn UpstreamClient>) -> Self {
        let store = CassetteStore::new(config.cassettes_dir.clone());
        let routes = RouteConfigManager::new(store.routes_dir());
        let mode = RwLock::new(config.mode);
        Self {
            config,
            mode,
            store,
            routes,
            client,
            stats_total: AtomicU64::new(0),
            stats_hits: AtomicU64::new(0),
            stats_misses: AtomicU64::new(0),
            stats_recorded: AtomicU64::new(0),
            stats_errors: AtomicU64::new(0),
        }
    }

    pub fn mode(&self) -> ProxyMode {
        *self.mode.read().expect("mode lock poisoned")
    }

    pub fn set_mode(&self, mode: ProxyMode) {
        *self.mode.write().expect("mode lock poisoned") = mode;
    }

    pub fn stats(&self) -> ProxyStats {
        ProxyStats {
            total_requests: self.stats_total.load(Ordering::Relaxed),
            cache_hits: self.stats_hits.load(Ordering::Relaxed),
            cache_misses: self.stats_misses.load(Ordering::Relaxed),
            recorded: self.stats_recorded.load(Ordering::Relaxed),
            errors: self.stats_errors.load(Ordering::Relaxed),
        }
    }

    pub fn list_all_cassettes(&self) -> Vec<CassetteInfo> {
        self.store.list_all().iter().filter_map(|p| cassette_info(p)).collect()
    }

    pub fn list_domain_cassettes(&self, domain: &str) -> Vec<CassetteInfo> {
        self.store.list(domain).iter().filter_map(|p| cassette_info(p)).collect()
    }

    pub fn delete_cassette(&self, domain: &str, cassette_id: &str) -> bool {
        self.store.delete(domain, cassette_id)
    }

    pub fn delete_domain(&self, domain: &str) -> usize {
        self.store.delete_domain(domain)
    }

    pub fn delete_all(&self) -> usize {
        self.store.delete_all()
    }

    /// Handle one inbound request end to end, per the three-mode state
    /// machine. Never panics on a malformed upstream or cassette; any
    /// such condition is surfaced as a response the server framing can
    /// write out directly.
    pub async fn handle(
        &self,
        method: &str,
        path: &str,
        query_string: &str,
        headers: &HashMap<String, String>,
        body: Option<&[u8]>,
    ) -> DispatchResponse {
        self.stats_total.fetch_add(1, Ordering::Relaxed);

        let Some((base_url, remaining_path)) = resolve_target(&self.config.targets, path) else {
            self.stats_errors.fetch_add(1, Ordering::Relaxed);
            return DispatchResponse::from_error(&VcrError::NoTarget);
        };
        let base_url = base_url.to_string();
        let domain = host_of(&base_url);

        let recorded_request = build_request(
            method,
            &remaining_path,
            query_string,
            headers,
            body,
            &self.config.sensitive_headers,
        );

        let ignore = match self.routes.load_ignore(&domain, method, &remaining_path) {
            Ok(ignore) => ignore,
            Err(e) => {
                self.stats_errors.fetch_add(1, Ordering::Relaxed);
                return DispatchResponse::from_error(&e);
            }
        };
        let key = compute_key(&recorded_request, &self.config.always_ignore_headers, &ignore);
        log::debug!("{method} {path} -> domain={domain} key={key:?}");

        match self.mode() {
            ProxyMode::Record => self.record(&base_url, &domain, &remaining_path, headers, body, recorded_request, key).await,
            ProxyMode::Replay => match self.store.lookup(&domain, &key) {
                Some(cassette) => {
                    self.stats_hits.fetch_add(1, Ordering::Relaxed);
                    replay_response(&cassette)
                }
                None => {
                    self.stats_misses.fetch_add(1, Ordering::Relaxed);
                    DispatchResponse::from_error(&VcrError::ReplayMiss)
                }
            },
            ProxyMode::Spy => match self.store.lookup(&domain, &key) {
                Some(cassette) => {
                    self.stats_hits.fetch_add(1, Ordering::Relaxed);
                    replay_response(&cassette)
                }
                None => {
                    self.stats_misses.fetch_add(1, Ordering::Relaxed);
                    self.record(&base_url, &domain, &remaining_path, headers, body, recorded_request, key).await
                }
            },
        }
    }

    async fn record(
        &self,
        base_url: &str,
        domain: &str,
        remaining_path: &str,
        inbound_headers: &HashMap<String, String>,
        body: Option<&[u8]>,
        recorded_request: crate::model::RecordedRequest,
        key: crate::model::MatchingKey,
    ) -> DispatchResponse {
        let mut forward_headers = inbound_headers.clone();
        forward_headers.retain(|k, _| !k.eq_ignore_ascii_case("host"));

        let outcome = self
            .client
            .send(
                base_url,
                &recorded_request.method,
                remaining_path,
                &forward_headers,
                body.map(|b| b.to_vec()),
                self.config.proxy_timeout,
            )
            .await;

        let (status, resp_headers, resp_body) = match outcome {
            Ok(triple) => triple,
            Err(UpstreamError::Timeout) => {
                self.stats_errors.fetch_add(1, Ordering::Relaxed);
                return DispatchResponse::from_error(&VcrError::UpstreamTimeout);
            }
            Err(UpstreamError::ConnectionFailed(msg)) => {
                self.stats_errors.fetch_add(1, Ordering::Relaxed);
                return DispatchResponse::from_error(&VcrError::UpstreamUnreachable(msg));
            }
        };

        let recorded_response = build_response(status, &resp_headers, Some(&resp_body), &self.config.sensitive_headers);

        let cassette = Cassette {
            meta: CassetteMeta {
                recorded_at: chrono::Utc::now(),
                target: base_url.to_string(),
                domain: domain.to_string(),
                vcr_proxy_version: env!("CARGO_PKG_VERSION").to_string(),
            },
            request: recorded_request.clone(),
            response: recorded_response,
        };

        if let Err(e) = self.store.save(&cassette, &key) {
            self.stats_errors.fetch_add(1, Ordering::Relaxed);
            log::error!("failed to persist cassette for {domain}{remaining_path}: {e}");
            return DispatchResponse::from_error(&e);
        }
        if let Err(e) = self.routes.auto_generate(domain, &recorded_request) {
            log::warn!("failed to update route config for {domain}{remaining_path}: {e}");
        }

        self.stats_recorded.fetch_add(1, Ordering::Relaxed);
        DispatchResponse {
            status,
            headers: resp_headers,
            body: resp_body,
        }
    }
}

fn replay_response(cassette: &Cassette) -> DispatchResponse {
    let body = decode_body(cassette.response.body.as_deref(), cassette.response.body_encoding);
    DispatchResponse {
        status: cassette.response.status_code,
        headers: cassette.response.headers.clone(),
        body,
    }
}

fn cassette_info(path: &std::path::Path) -> Option<CassetteInfo> {
    let filename = path.file_name()?.to_str()?.to_string();
    let domain = path.parent()?.file_name()?.to_str()?.to_string();
    let cassette_id = filename.trim_end_matches(".json").to_string();
    Some(CassetteInfo {
        domain,
        filename,
        cassette_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ScriptedClient {
        responses: Mutex<Vec<Result<(u16, HashMap<String, String>, Vec<u8>), UpstreamError>>>,
    }

    #[async_trait]
    impl UpstreamClient for ScriptedClient {
        async fn send(
            &self,
            _base_url: &str,
            _method: &str,
            _path: &str,
            _headers: &HashMap<String, String>,
            _body: Option<Vec<u8>>,
            _timeout: Duration,
        ) -> Result<(u16, HashMap<String, String>, Vec<u8>), UpstreamError> {
            self.responses.lock().unwrap().remove(0)
        }
    }

    fn config(dir: &std::path::Path) -> VcrConfig {
        let mut config = VcrConfig::default();
        config.cassettes_dir = dir.to_path_buf();
        config.targets.insert("/api".to_string(), "https://api.example.com".to_string());
        config
    }

    fn json_ok(body: &str) -> Result<(u16, HashMap<String, String>, Vec<u8>), UpstreamError> {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        Ok((200, headers, body.as_bytes().to_vec()))
    }

    #[tokio::test]
    async fn record_then_replay_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.mode = ProxyMode::Record;
        let client = Box::new(ScriptedClient {
            responses: Mutex::new(vec![json_ok(r#"{"id":1,"name":"Alice"}"#)]),
        });
        let dispatcher = Dispatcher::new(config, client);

        let resp = dispatcher
            .handle("GET", "/api/v1/users", "", &HashMap::new(), None)
            .await;
        assert_eq!(resp.status, 200);
        assert_eq!(dispatcher.stats().recorded, 1);

        dispatcher.set_mode(ProxyMode::Replay);
        let resp = dispatcher
            .handle("GET", "/api/v1/users", "", &HashMap::new(), None)
            .await;
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, br#"{"id":1,"name":"Alice"}"#);
        assert_eq!(dispatcher.stats().cache_hits, 1);
    }

    #[tokio::test]
    async fn replay_miss_on_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.mode = ProxyMode::Replay;
        let client = Box::new(ScriptedClient { responses: Mutex::new(vec![]) });
        let dispatcher = Dispatcher::new(config, client);

        let resp = dispatcher
            .handle("GET", "/api/v1/nonexistent", "", &HashMap::new(), None)
            .await;
        assert_eq!(resp.status, 404);
        assert_eq!(dispatcher.stats().cache_misses, 1);
    }

    #[tokio::test]
    async fn distinct_bodies_produce_distinct_cassettes() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.mode = ProxyMode::Record;
        let client = Box::new(ScriptedClient {
            responses: Mutex::new(vec![json_ok(r#"{"ok":true}"#), json_ok(r#"{"ok":true}"#)]),
        });
        let dispatcher = Dispatcher::new(config, client);

        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());

        dispatcher
            .handle("POST", "/api/v1/search", "", &headers, Some(br#"{"query":"a"}"#))
            .await;
        dispatcher
            .handle("POST", "/api/v1/search", "", &headers, Some(br#"{"query":"b"}"#))
            .await;

        assert_eq!(dispatcher.list_domain_cassettes("api.example.com").len(), 2);
    }

    #[tokio::test]
    async fn no_target_configured_returns_502() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let client = Box::new(ScriptedClient { responses: Mutex::new(vec![]) });
        let dispatcher = Dispatcher::new(config, client);

        let resp = dispatcher
            .handle("GET", "/unmapped", "", &HashMap::new(), None)
            .await;
        assert_eq!(resp.status, 502);
    }

    #[tokio::test]
    async fn spy_mode_forwards_and_records_on_miss_then_hits() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.mode = ProxyMode::Spy;
        let client = Box::new(ScriptedClient {
            responses: Mutex::new(vec![json_ok(r#"{"ok":true}"#)]),
        });
        let dispatcher = Dispatcher::new(config, client);

        let resp = dispatcher
            .handle("GET", "/api/v1/ping", "", &HashMap::new(), None)
            .await;
        assert_eq!(resp.status, 200);
        assert_eq!(dispatcher.stats().cache_misses, 1);
        assert_eq!(dispatcher.stats().recorded, 1);

        let resp = dispatcher
            .handle("GET", "/api/v1/ping", "", &HashMap::new(), None)
            .await;
        assert_eq!(resp.status, 200);
        assert_eq!(dispatcher.stats().cache_hits, 1);
    }

    #[tokio::test]
    async fn upstream_timeout_maps_to_504_and_is_not_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.mode = ProxyMode::Record;
        let client = Box::new(ScriptedClient {
            responses: Mutex::new(vec![Err(UpstreamError::Timeout)]),
        });
        let dispatcher = Dispatcher::new(config, client);

        let resp = dispatcher
            .handle("GET", "/api/v1/slow", "", &HashMap::new(), None)
            .await;
        assert_eq!(resp.status, 504);
        assert_eq!(dispatcher.stats().errors, 1);
        assert_eq!(dispatcher.stats().recorded, 0);
    }

    #[tokio::test]
    async fn route_ignore_body_fields_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.mode = ProxyMode::Record;

        let routes_dir = dir.path().join("_routes/api.example.com");
        std::fs::create_dir_all(&routes_dir).unwrap();
        std::fs::write(
            routes_dir.join("POST_v1_login.yaml"),
            "route:\n  method: POST\n  path: /v1/login\nmatched:\n  query_params: []\n  headers: []\n  body_fields: []\nignore:\n  headers: []\n  body_fields: [login, password]\n  query_params: []\n",
        )
        .unwrap();

        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());

        let client = Box::new(ScriptedClient {
            responses: Mutex::new(vec![json_ok(r#"{"ok":true}"#)]),
        });
        let dispatcher = Dispatcher::new(config, client);
        dispatcher
            .handle(
                "POST",
                "/api/v1/login",
                "",
                &headers,
                Some(br#"{"login":"x","password":"y","action":"go"}"#),
            )
            .await;

        dispatcher.set_mode(ProxyMode::Replay);
        let hit = dispatcher
            .handle(
                "POST",
                "/api/v1/login",
                "",
                &headers,
                Some(br#"{"login":"z","password":"z","action":"go"}"#),
            )
            .await;
        assert_eq!(hit.status, 200);

        let miss = dispatcher
            .handle(
                "POST",
                "/api/v1/login",
                "",
                &headers,
                Some(br#"{"login":"z","password":"z","action":"other"}"#),
            )
            .await;
        assert_eq!(miss.status, 404);
    }
}
