//! WhatsApp Cloud API integration
//!
//! - **Webhook** (`webhook`) - payload types, message classification and the
//!   subscription handshake
//! - **Channel** (`channel`) - outbound text, read receipts and typing indicators
//! - **Queue** (`queue`) - bounded hand-off from the webhook route to a worker that
//!   processes each message id at most once at a time
//!
//! # Architecture
//!
//! ```text
//! POST /webhook → classify → MessageQueue → QueueWorker → MessageHandler → Agent
//!                                                              ↓
//!                                           MessagingChannel ← reply
//! ```

pub mod channel;
pub mod queue;
pub mod webhook;

pub use channel::{ChannelError, GraphApiClient, MessagingChannel, NoopChannel};
pub use queue::{
    HandlerError, HandlerOutcome, MessageHandler, MessageQueue, MessageTask, QueueError, QueueWorker,
    RetryPolicy, WorkerStats,
};
pub use webhook::{
    classify, verify_subscription, InboundMessage, MessageContent, VerifyError, VerifyQuery, WebhookError,
    WebhookEvent, WebhookPayload,
};
