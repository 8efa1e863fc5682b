//! Broker-agnostic abstractions for consuming messages.
//!
//! A consumer backend (see `amqp-worker`) decodes each delivery into a
//! [`Message`], hands it to a [`Processor`], and turns the outcome into a
//! [`Disposition`]:
//!
//! ```text
//! delivery ──decode──▶ Message ──Processor::process──▶ Result<(), ProcessingError>
//!                                                          │
//!                         ┌────────────────────────────────┘
//!                         ▼
//!           Ok ─▶ Ack   Transient/RateLimited ─▶ Requeue   Permanent ─▶ Reject
//! ```
//!
//! # Example
//!
//! ```ignore
//! use messaging::{Message, Processor, ProcessingError};
//!
//! #[derive(Clone, Serialize, Deserialize)]
//! struct Payment { id: String, amount: u64 }
//!
//! impl Message for Payment {
//!     fn message_id(&self) -> String { self.id.clone() }
//! }
//!
//! struct PaymentProcessor { store: Arc<Store> }
//!
//! #[async_trait]
//! impl Processor<Payment> for PaymentProcessor {
//!     async fn process(&self, payment: &Payment) -> Result<(), ProcessingError> { ... }
//!     fn name(&self) -> &'static str { "payment_processor" }
//! }
//! ```

mod disposition;
mod error;
mod message;
mod processor;

pub use disposition::Disposition;
pub use error::{ErrorCategory, ProcessingError};
pub use message::Message;
pub use processor::{FailingProcessor, NoOpProcessor, Processor};
