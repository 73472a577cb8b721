use crate::config::{CooldownGrowth, RetryConfig};
use crate::crawler::{CrawlResult, FetchErrorKind};
use crate::state::NodeFailureState;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Longest suspension ever applied, whatever the base and growth
pub const MAX_COOLDOWN: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Thresholds and cooldown growth applied by the [`RetryTracker`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub failure_threshold: u32,
    pub base_cooldown: Duration,
    pub cooldown_cap: u32,
    pub growth: CooldownGrowth,
    pub kind_thresholds: HashMap<FetchErrorKind, u32>,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            base_cooldown: config.base_cooldown(),
            cooldown_cap: config.suspension_cooldown_cap,
            growth: config.cooldown_growth,
            kind_thresholds: config.kind_thresholds.clone(),
        }
    }

    /// Consecutive failures needed to suspend a node failing with `kind`
    pub fn threshold_for(&self, kind: FetchErrorKind) -> u32 {
        self.kind_thresholds
            .get(&kind)
            .copied()
            .unwrap_or(self.failure_threshold)
            .max(1)
    }

    /// Cooldown of a suspension given the number of earlier suspensions
    pub fn cooldown(&self, suspensions: u32) -> chrono::Duration {
        let exponent = suspensions.min(self.cooldown_cap);
        let factor = match self.growth {
            CooldownGrowth::Exponential => 2u32.saturating_pow(exponent),
            CooldownGrowth::Linear => exponent.saturating_add(1),
        };
        let cooldown = self.base_cooldown.saturating_mul(factor).min(MAX_COOLDOWN);
        chrono::Duration::milliseconds(cooldown.as_millis() as i64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Shared per-node failure map
///
/// Workers record outcomes concurrently while the execution manager reads
/// eligibility, so the map is sharded and every update to one node is atomic.
#[derive(Debug)]
pub struct RetryTracker {
    states: DashMap<String, NodeFailureState>,
    policy: RetryPolicy,
}

impl RetryTracker {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            states: DashMap::new(),
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Records the outcome of one crawl, timestamped by the result itself
    ///
    /// # Returns
    ///
    /// The end of the suspension window if this outcome suspended the node.
    pub fn record(&self, result: &CrawlResult) -> Option<DateTime<Utc>> {
        match result {
            CrawlResult::Success {
                node_id,
                fetched_at,
                ..
            } => {
                self.record_success(node_id, *fetched_at);
                None
            }
            CrawlResult::Failure {
                node_id,
                kind,
                message,
                fetched_at,
            } => self.record_failure(node_id, *kind, message.as_str(), *fetched_at),
        }
    }

    pub fn record_success(&self, node_id: &str, at: DateTime<Utc>) {
        self.states
            .entry(node_id.to_string())
            .or_insert_with(|| NodeFailureState::new(node_id))
            .record_success(at);
    }

    pub fn record_failure(
        &self,
        node_id: &str,
        kind: FetchErrorKind,
        message: &str,
        at: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        self.states
            .entry(node_id.to_string())
            .or_insert_with(|| NodeFailureState::new(node_id))
            .record_failure(kind, message, at, &self.policy)
    }

    /// Unknown nodes are always eligible
    pub fn is_eligible(&self, node_id: &str, now: DateTime<Utc>) -> bool {
        self.states
            .get(node_id)
            .map_or(true, |state| state.is_eligible(now))
    }

    pub fn state(&self, node_id: &str) -> Option<NodeFailureState> {
        self.states.get(node_id).map(|state| state.clone())
    }

    /// All nodes currently inside a suspension window, ordered by node id
    pub fn suspended(&self, now: DateTime<Utc>) -> Vec<NodeFailureState> {
        let mut suspended: Vec<_> = self
            .states
            .iter()
            .filter(|entry| entry.is_suspended(now))
            .map(|entry| entry.value().clone())
            .collect();
        suspended.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        suspended
    }

    /// Every tracked node, ordered by node id
    pub fn all(&self) -> Vec<NodeFailureState> {
        let mut states: Vec<_> = self.states.iter().map(|e| e.value().clone()).collect();
        states.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        states
    }

    /// Drops the state of a node, returning whether it was tracked
    pub fn forget(&self, node_id: &str) -> bool {
        self.states.remove(node_id).is_some()
    }

    /// Drops every node not in `known`, returning how many were dropped
    pub fn retain_nodes(&self, known: &HashSet<&str>) -> usize {
        let before = self.states.len();
        self.states.retain(|node_id, _| known.contains(node_id.as_str()));
        before.saturating_sub(self.states.len())
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
