use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::jobs::millis;

/// Timing and quorum settings of a signature round and of anchoring
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorConfig {
    /// Valid signatures needed, counting our own. Defaults to every
    /// read-write collaborator.
    pub quorum: Option<usize>,
    /// Timeout of a single signature request
    #[serde(with = "millis")]
    pub peer_timeout: Duration,
    /// Requests per peer before it is considered non-responsive
    pub peer_attempts: u32,
    /// Pause between requests to the same peer
    #[serde(with = "millis")]
    pub peer_retry_delay: Duration,
    /// Deadline of the whole signature round
    #[serde(with = "millis")]
    pub round_timeout: Duration,
    /// Ledger reads while waiting for an anchor to show up
    pub confirmation_polls: u32,
    #[serde(with = "millis")]
    pub confirmation_interval: Duration,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            quorum: None,
            peer_timeout: Duration::from_secs(10),
            peer_attempts: 3,
            peer_retry_delay: Duration::from_millis(500),
            round_timeout: Duration::from_secs(60),
            confirmation_polls: 10,
            confirmation_interval: Duration::from_secs(1),
        }
    }
}

impl AnchorConfig {
    /// Signatures required for a document with `writers` read-write collaborators
    pub fn required_signatures(&self, writers: usize) -> usize {
        self.quorum.unwrap_or(writers).clamp(1, writers.max(1))
    }
}
