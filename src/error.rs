use thiserror::Error;

/// Errors surfaced by the VCR core.
///
/// Each variant knows the HTTP status the (out-of-scope) server framing
/// should map it to, so callers don't have to re-derive that mapping.
#[derive(Debug, Error)]
pub enum VcrError {
    #[error("no target configured for path")]
    NoTarget,

    #[error("target timeout")]
    UpstreamTimeout,

    #[error("target unreachable")]
    UpstreamUnreachable(String),

    #[error("no matching cassette found")]
    ReplayMiss,

    #[error("cassette storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("cassette serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("route config error: {0}")]
    RouteConfig(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl VcrError {
    /// The HTTP status code the server framing should respond with.
    pub fn status_code(&self) -> u16 {
        match self {
            VcrError::NoTarget => 502,
            VcrError::UpstreamTimeout => 504,
            VcrError::UpstreamUnreachable(_) => 502,
            VcrError::ReplayMiss => 404,
            VcrError::Storage(_) => 500,
            VcrError::Serialization(_) => 500,
            VcrError::RouteConfig(_) => 500,
            VcrError::Config(_) => 400,
        }
    }

    /// The JSON error body shape specified for client-facing errors.
    pub fn to_json_body(&self) -> serde_json::Value {
        serde_json::json!({ "error": self.to_string() })
    }
}

pub type Result<T> = std::result::Result<T, VcrError>;
