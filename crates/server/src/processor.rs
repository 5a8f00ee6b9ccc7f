//! Queue handler that turns one inbound WhatsApp message into an agent reply.

use std::sync::Arc;

use async_trait::async_trait;
use chrono_tz::Tz;
use thiserror::Error;
use tracing::{error, info, warn};

use concierge_agent::prompts::system_instruction;
use concierge_agent::{AgentOutcome, AgentRuntime, ConversationContext, ToolContext};
use concierge_core::domain::business::{BusinessId, UserProfile};
use concierge_core::errors::ApplicationError;
use concierge_core::scheduling::Clock;
use concierge_db::{
    BusinessRepository, ConversationRepository, MessageLedger, MessageStatus, RepositoryError,
    UserRepository,
};
use concierge_whatsapp::webhook::InboundMessage;
use concierge_whatsapp::{
    ChannelError, HandlerError, HandlerOutcome, MessageHandler, MessageTask, MessagingChannel,
};

/// Most recent turns loaded as model context for each conversation.
pub const HISTORY_LIMIT: usize = 50;

#[derive(Clone, Debug)]
pub struct ProcessorSettings {
    pub business_id: BusinessId,
    pub default_zone: Tz,
    pub assistant_instructions: String,
}

pub struct Stores {
    pub businesses: Arc<dyn BusinessRepository>,
    pub users: Arc<dyn UserRepository>,
    pub conversations: Arc<dyn ConversationRepository>,
    pub ledger: Arc<dyn MessageLedger>,
}

#[derive(Debug, Error)]
enum ProcessError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("reply delivery failed: {0}")]
    Delivery(#[from] ChannelError),
}

impl ProcessError {
    /// Delivery happens after tools ran; retrying would repeat their side effects.
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Repository(_))
    }
}

impl From<ProcessError> for ApplicationError {
    fn from(value: ProcessError) -> Self {
        match value {
            ProcessError::Repository(error) => Self::Persistence(error.to_string()),
            ProcessError::Delivery(error) => Self::Integration(error.to_string()),
        }
    }
}

pub struct MessageProcessor {
    settings: ProcessorSettings,
    stores: Stores,
    channel: Arc<dyn MessagingChannel>,
    agent: Arc<AgentRuntime>,
    clock: Arc<dyn Clock>,
}

impl MessageProcessor {
    pub fn new(
        settings: ProcessorSettings,
        stores: Stores,
        channel: Arc<dyn MessagingChannel>,
        agent: Arc<AgentRuntime>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { settings, stores, channel, agent, clock }
    }

    async fn respond(&self, message: &InboundMessage, text: &str) -> Result<(), ProcessError> {
        if let Err(error) = self.channel.mark_read(&message.id).await {
            warn!(event_name = "processor.mark_read_failed", correlation_id = %message.id, error = %error, "could not mark message as read");
        }
        if let Err(error) = self.channel.typing_indicator(&message.id).await {
            warn!(event_name = "processor.typing_failed", correlation_id = %message.id, error = %error, "could not show typing indicator");
        }

        let zone = self
            .stores
            .businesses
            .find_by_id(&self.settings.business_id)
            .await?
            .map_or(self.settings.default_zone, |business| business.time_zone);
        let user = self.load_user(message).await?;
        let history = self.stores.conversations.load_recent(&message.from, HISTORY_LIMIT).await?;
        let mut conversation = ConversationContext::new(message.from.clone(), history);

        let instruction =
            system_instruction(&self.settings.assistant_instructions, self.clock.now(), zone, user.notes.as_deref());
        let context = ToolContext {
            business_id: self.settings.business_id.0.clone(),
            conversation_key: message.from.clone(),
            correlation_id: message.id.clone(),
        };
        let outcome = self.agent.run(&mut conversation, text, &instruction, &context).await;
        log_execution_summary(&message.id, &outcome);

        match self.stores.conversations.append(conversation.key(), conversation.new_turns()).await {
            Ok(()) => conversation.mark_persisted(),
            Err(error) => {
                error!(event_name = "processor.history_persist_failed", correlation_id = %message.id, error = %error, "conversation turns were not saved");
            }
        }

        self.channel.send_text(&message.from, &outcome.final_text).await?;
        info!(
            event_name = "processor.replied",
            correlation_id = %message.id,
            termination = outcome.termination.as_str(),
            turns_used = outcome.turns_used,
            "reply sent"
        );
        Ok(())
    }

    async fn load_user(&self, message: &InboundMessage) -> Result<UserProfile, RepositoryError> {
        let existing = self.stores.users.find_by_phone(&self.settings.business_id, &message.from).await?;
        let needs_save = existing.as_ref().map_or(true, |user| user.display_name.is_none() && message.contact_name.is_some());

        let mut user = existing
            .unwrap_or_else(|| UserProfile::new(self.settings.business_id.clone(), message.from.clone()));
        if needs_save {
            user.display_name = user.display_name.or_else(|| message.contact_name.clone());
            self.stores.users.save(user.clone()).await?;
        }
        Ok(user)
    }

    async fn finish(&self, message_id: &str, status: MessageStatus, failure: Option<&str>) {
        if let Err(error) = self.stores.ledger.finish(message_id, status, failure).await {
            error!(
                event_name = "processor.ledger_failed",
                correlation_id = %message_id,
                status = status.as_str(),
                error = %error,
                "could not record message status"
            );
        }
    }
}

#[async_trait]
impl MessageHandler for MessageProcessor {
    async fn handle(&self, task: &MessageTask) -> Result<HandlerOutcome, HandlerError> {
        let message = &task.message;
        let claimed = self
            .stores
            .ledger
            .claim(&message.id, &message.from)
            .await
            .map_err(|error| HandlerError::Retryable(error.to_string()))?;
        if !claimed {
            info!(event_name = "processor.duplicate", correlation_id = %message.id, "message already processed");
            return Ok(HandlerOutcome::AlreadyProcessed);
        }

        let Some(text) = message.text() else {
            info!(event_name = "processor.unsupported", correlation_id = %message.id, content = ?message.content, "skipping non-text message");
            self.finish(&message.id, MessageStatus::Skipped, None).await;
            return Ok(HandlerOutcome::Skipped);
        };

        match self.respond(message, text).await {
            Ok(()) => {
                self.finish(&message.id, MessageStatus::Completed, None).await;
                Ok(HandlerOutcome::Replied)
            }
            Err(failure) => {
                let retryable = failure.is_retryable();
                let reason = ApplicationError::from(failure).into_interface(&message.id).to_string();
                if retryable {
                    self.finish(&message.id, MessageStatus::Failed, Some(&reason)).await;
                    Err(HandlerError::Retryable(reason))
                } else {
                    self.finish(&message.id, MessageStatus::Abandoned, Some(&reason)).await;
                    Err(HandlerError::Fatal(reason))
                }
            }
        }
    }
}

fn log_execution_summary(correlation_id: &str, outcome: &AgentOutcome) {
    if outcome.tool_results.is_empty() {
        return;
    }
    let functions: Vec<String> = outcome
        .tool_results
        .iter()
        .map(|result| match &result.error {
            Some(error) => format!("{} -> Error: {error}", result.name),
            None => format!("{} -> Success", result.name),
        })
        .collect();

    info!(
        event_name = if outcome.is_parallel_execution { "agent.execution.parallel" } else { "agent.execution.single" },
        correlation_id = %correlation_id,
        function_count = functions.len(),
        functions = ?functions,
        "tool execution summary"
    );
}
