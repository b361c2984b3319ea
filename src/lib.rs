//! Request-matching and caching core for a record/replay HTTP proxy.
//!
//! This crate is the engine, not the server: it canonicalizes inbound
//! requests, computes a stable fingerprint, stores and retrieves
//! cassettes from disk, and runs the RECORD/REPLAY/SPY dispatch state
//! machine. Wiring it to an actual HTTP server and client is left to the
//! embedder; see [`dispatcher::UpstreamClient`].

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod matcher;
pub mod model;
pub mod recording;
pub mod route_config;
pub mod store;

pub use config::VcrConfig;
pub use dispatcher::{DispatchResponse, Dispatcher, UpstreamClient, UpstreamError};
pub use error::{Result, VcrError};
pub use model::{
    BodyEncoding, Cassette, CassetteInfo, CassetteMeta, MatchedFields, MatchingKey, ProxyMode,
    ProxyStats, RecordedRequest, RecordedResponse, RouteIgnoreConfig, RouteMatchRule,
    RouteMatchingOverride,
};
pub use store::CassetteStore;
