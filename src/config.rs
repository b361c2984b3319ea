use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::ProxyMode;

fn default_always_ignore_headers() -> HashSet<String> {
    [
        "date",
        "x-request-id",
        "x-trace-id",
        "traceparent",
        "tracestate",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

fn default_sensitive_headers() -> HashSet<String> {
    [
        "authorization",
        "cookie",
        "set-cookie",
        "proxy-authorization",
        "x-api-key",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

const fn default_proxy_timeout() -> Duration {
    Duration::from_secs(30)
}

const fn default_max_body_size() -> usize {
    10 * 1024 * 1024
}

fn default_cassettes_dir() -> PathBuf {
    PathBuf::from("cassettes")
}

/// Placeholder written in place of a sensitive header's value before a
/// cassette is persisted.
pub const REDACTION_PLACEHOLDER: &str = "[REDACTED]";

/// Options recognized by the core, with the defaults from spec §6.
///
/// Deliberately plain serde-derived data: loading it from the environment
/// or a CLI is a bootstrap concern left to the caller (out of scope here).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VcrConfig {
    pub mode: ProxyMode,
    pub targets: HashMap<String, String>,
    pub cassettes_dir: PathBuf,
    pub always_ignore_headers: HashSet<String>,
    pub sensitive_headers: HashSet<String>,
    #[serde(with = "duration_secs")]
    pub proxy_timeout: Duration,
    pub max_body_size: usize,
}

impl Default for VcrConfig {
    fn default() -> Self {
        Self {
            mode: ProxyMode::default(),
            targets: HashMap::new(),
            cassettes_dir: default_cassettes_dir(),
            always_ignore_headers: default_always_ignore_headers(),
            sensitive_headers: default_sensitive_headers(),
            proxy_timeout: default_proxy_timeout(),
            max_body_size: default_max_body_size(),
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs))
    }
}
