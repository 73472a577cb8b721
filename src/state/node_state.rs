use crate::crawler::FetchErrorKind;
use crate::state::RetryPolicy;
use chrono::{DateTime, Duration, Utc};

/// The most recent failure observed for a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub kind: FetchErrorKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Tracks the health of a single node across crawl cycles
///
/// A node becomes suspended once its consecutive failures reach the threshold
/// for the failing kind. Every further failure while at or above the threshold
/// renews the suspension with a longer cooldown. One success clears everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFailureState {
    /// Node this state belongs to
    pub node_id: String,

    /// Failures since the last success
    pub consecutive_failures: u32,

    /// Suspensions since the last success, drives cooldown growth
    pub suspensions: u32,

    /// The node is not crawled before this instant
    pub suspended_until: Option<DateTime<Utc>>,

    /// Last failure, if the node has not succeeded since
    pub last_error: Option<FailureRecord>,

    /// When the node was last crawled, successfully or not
    pub last_attempt: Option<DateTime<Utc>>,
}

impl NodeFailureState {
    /// Creates a healthy state for `node_id`
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            consecutive_failures: 0,
            suspensions: 0,
            suspended_until: None,
            last_error: None,
            last_attempt: None,
        }
    }

    /// Checks whether the node may be enqueued at `now`
    ///
    /// A node whose suspension window has passed is eligible again; its
    /// counters are kept so that a further failure escalates the cooldown.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        match self.suspended_until {
            Some(until) => now >= until,
            None => true,
        }
    }

    pub fn is_suspended(&self, now: DateTime<Utc>) -> bool {
        !self.is_eligible(now)
    }

    /// Time left in the current suspension window, if any
    pub fn remaining_suspension(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.suspended_until
            .filter(|until| *until > now)
            .map(|until| until - now)
    }

    /// Records a successful crawl, clearing all failure history
    pub fn record_success(&mut self, at: DateTime<Utc>) {
        self.consecutive_failures = 0;
        self.suspensions = 0;
        self.suspended_until = None;
        self.last_error = None;
        self.last_attempt = Some(at);
    }

    /// Records a failed crawl
    ///
    /// # Arguments
    ///
    /// * `kind` - Classification of the failure
    /// * `message` - Human readable failure detail
    /// * `at` - When the failed crawl happened
    /// * `policy` - Thresholds and cooldown growth to apply
    ///
    /// # Returns
    ///
    /// * `Some(until)` - The node is now suspended until `until`
    /// * `None` - The node stays eligible
    pub fn record_failure(
        &mut self,
        kind: FetchErrorKind,
        message: impl Into<String>,
        at: DateTime<Utc>,
        policy: &RetryPolicy,
    ) -> Option<DateTime<Utc>> {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_attempt = Some(at);
        self.last_error = Some(FailureRecord {
            kind,
            message: message.into(),
            at,
        });

        if self.consecutive_failures < policy.threshold_for(kind) {
            return None;
        }

        let until = at + policy.cooldown(self.suspensions);
        self.suspended_until = Some(until);
        self.suspensions = self.suspensions.saturating_add(1);
        Some(until)
    }
}
