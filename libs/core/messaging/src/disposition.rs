//! What a consumer does with a delivery once processing has finished.

use crate::error::{ErrorCategory, ProcessingError};
use std::fmt;

/// Acknowledgment decision for a single delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Remove the message from the queue.
    Ack,
    /// Negative-acknowledge and put the message back for redelivery.
    Requeue,
    /// Drop the message (or dead-letter it, when the queue has a DLX).
    Reject,
}

impl Disposition {
    /// Map a processing outcome onto the acknowledgment protocol.
    pub fn for_outcome(outcome: &Result<(), ProcessingError>) -> Self {
        match outcome {
            Ok(()) => Disposition::Ack,
            Err(e) => e.category().into(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Ack => "ack",
            Disposition::Requeue => "requeue",
            Disposition::Reject => "reject",
        }
    }
}

impl From<ErrorCategory> for Disposition {
    fn from(category: ErrorCategory) -> Self {
        match category {
            ErrorCategory::Transient | ErrorCategory::RateLimited => Disposition::Requeue,
            ErrorCategory::Permanent => Disposition::Reject,
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
