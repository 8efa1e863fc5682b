//! Processor trait for message handling.

use crate::error::ProcessingError;
use crate::message::Message;
use async_trait::async_trait;

/// Message processor.
///
/// The consumer calls [`Processor::process`] once per delivery and maps the
/// returned error category onto ack / requeue / reject. Processors must be
/// idempotent: delivery is at-least-once, so the same message may arrive more
/// than once.
#[async_trait]
pub trait Processor<M: Message>: Send + Sync {
    /// Process one message.
    async fn process(&self, message: &M) -> Result<(), ProcessingError>;

    /// Used for logging and metrics labels.
    fn name(&self) -> &'static str;

    /// Downstream availability check for readiness probes.
    async fn health_check(&self) -> Result<bool, ProcessingError> {
        Ok(true)
    }
}

/// Accepts everything.
#[derive(Debug, Clone, Default)]
pub struct NoOpProcessor;

#[async_trait]
impl<M: Message> Processor<M> for NoOpProcessor {
    async fn process(&self, _message: &M) -> Result<(), ProcessingError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "noop_processor"
    }
}

/// Fails every message with a fixed category.
#[derive(Debug, Clone)]
pub struct FailingProcessor {
    error_message: String,
    transient: bool,
}

impl FailingProcessor {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            error_message: message.into(),
            transient: true,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            error_message: message.into(),
            transient: false,
        }
    }
}

#[async_trait]
impl<M: Message> Processor<M> for FailingProcessor {
    async fn process(&self, _message: &M) -> Result<(), ProcessingError> {
        if self.transient {
            Err(ProcessingError::transient(&self.error_message))
        } else {
            Err(ProcessingError::permanent(&self.error_message))
        }
    }

    fn name(&self) -> &'static str {
        "failing_processor"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Serialize, Deserialize)]
    struct Ping {
        id: String,
    }

    impl Message for Ping {
        fn message_id(&self) -> String {
            self.id.clone()
        }
    }

    fn ping() -> Ping {
        Ping {
            id: "m-1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_noop_processor() {
        let processor = NoOpProcessor;

        assert!(Processor::<Ping>::process(&processor, &ping()).await.is_ok());
        assert_eq!(Processor::<Ping>::name(&processor), "noop_processor");
        assert!(Processor::<Ping>::health_check(&processor).await.unwrap());
    }

    #[tokio::test]
    async fn test_failing_processor_categories() {
        let transient = FailingProcessor::transient("store down");
        let err = Processor::<Ping>::process(&transient, &ping())
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Transient);

        let permanent = FailingProcessor::permanent("bad tenant");
        let err = Processor::<Ping>::process(&permanent, &ping())
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Permanent);
    }
}
