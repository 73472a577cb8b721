//! Data passed between the execution manager, the work queue and the crawlers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Opaque catalog document returned by a node
pub type CatalogPayload = serde_json::Value;

/// One unit of work: crawl this node with this protocol
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CrawlTarget {
    /// Node to crawl, also the cache key
    pub node_id: String,

    /// Protocol key used to resolve the adapter
    pub protocol: String,

    /// Address the adapter talks to
    pub endpoint: String,
}

impl CrawlTarget {
    pub fn new(
        node_id: impl Into<String>,
        protocol: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            protocol: protocol.into(),
            endpoint: endpoint.into(),
        }
    }
}

/// Classification of a failed fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    /// No adapter is registered for the target's protocol
    UnsupportedProtocol,
    /// The fetch did not finish within its time budget
    Timeout,
    /// The node could not be reached or answered with a server error
    Network,
    /// The node answered with something that is not a catalog
    Protocol,
    /// The node refused to serve its catalog to us
    Denied,
}

impl FetchErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchErrorKind::UnsupportedProtocol => "unsupported_protocol",
            FetchErrorKind::Timeout => "timeout",
            FetchErrorKind::Network => "network",
            FetchErrorKind::Protocol => "protocol",
            FetchErrorKind::Denied => "denied",
        }
    }
}

impl FromStr for FetchErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unsupported_protocol" => Ok(FetchErrorKind::UnsupportedProtocol),
            "timeout" => Ok(FetchErrorKind::Timeout),
            "network" => Ok(FetchErrorKind::Network),
            "protocol" => Ok(FetchErrorKind::Protocol),
            "denied" => Ok(FetchErrorKind::Denied),
            other => Err(format!("unknown failure kind '{}'", other)),
        }
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by a protocol adapter
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Timeout, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Network, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Protocol, message)
    }

    pub fn denied(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Denied, message)
    }
}

/// Outcome of crawling one target
///
/// Produced exactly once per dequeued target, unless the crawl was cancelled
/// by shutdown.
#[derive(Debug, Clone, PartialEq)]
pub enum CrawlResult {
    Success {
        node_id: String,
        payload: CatalogPayload,
        fetched_at: DateTime<Utc>,
    },
    Failure {
        node_id: String,
        kind: FetchErrorKind,
        message: String,
        fetched_at: DateTime<Utc>,
    },
}

impl CrawlResult {
    /// Builds the result for `target` from an adapter outcome
    pub fn from_fetch(
        target: &CrawlTarget,
        outcome: Result<CatalogPayload, FetchError>,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        match outcome {
            Ok(payload) => CrawlResult::Success {
                node_id: target.node_id.clone(),
                payload,
                fetched_at,
            },
            Err(error) => CrawlResult::Failure {
                node_id: target.node_id.clone(),
                kind: error.kind,
                message: error.message,
                fetched_at,
            },
        }
    }

    pub fn node_id(&self) -> &str {
        match self {
            CrawlResult::Success { node_id, .. } | CrawlResult::Failure { node_id, .. } => node_id,
        }
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        match self {
            CrawlResult::Success { fetched_at, .. } | CrawlResult::Failure { fetched_at, .. } => {
                *fetched_at
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CrawlResult::Success { .. })
    }
}
