//! State module for tracking node health between crawl cycles
//!
//! # Components
//!
//! - `NodeFailureState`: consecutive failures and suspension window of one node
//! - `RetryTracker`: the shared per-node failure map consulted before enqueuing
//! - `Clock`: the time source, injectable so suspension windows can be tested

mod clock;
mod node_state;
mod tracker;

// Re-export main types
pub use clock::{Clock, ManualClock, SystemClock};
pub use node_state::{FailureRecord, NodeFailureState};
pub use tracker::{RetryPolicy, RetryTracker, MAX_COOLDOWN};
