use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use concierge_agent::gemini::GeminiClient;
use concierge_agent::prompts::DEFAULT_ASSISTANT_INSTRUCTIONS;
use concierge_agent::tools::calendar::{register_calendar_tools, CalendarToolkit};
use concierge_agent::tools::devices::{ControlMusic, SetLightValues, SetThermostat};
use concierge_agent::tools::knowledge::SearchSimilarText;
use concierge_agent::{AgentRuntime, AgentSettings, ToolExecutor, ToolRegistry};
use concierge_core::config::{AppConfig, ConfigError};
use concierge_core::domain::business::BusinessId;
use concierge_core::scheduling::{CalendarGateway, InMemoryCalendar, SystemClock};
use concierge_db::repositories::{
    SqlBusinessRepository, SqlCalendarServiceRepository, SqlConversationRepository, SqlMessageLedger,
    SqlUserRepository,
};
use concierge_db::{connect_from_config, migrations, DbPool};
use concierge_whatsapp::{GraphApiClient, MessageQueue};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::calendar_api::HttpCalendarGateway;
use crate::health::{self, HealthState};
use crate::knowledge_api::GeminiVectorIndex;
use crate::processor::{MessageProcessor, ProcessorSettings, Stores};
use crate::webhook::{self, WebhookState};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub processor: Arc<MessageProcessor>,
    pub tool_names: Vec<String>,
    pub calendar_backend: &'static str,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("{component} client could not be built: {message}")]
    Integration { component: &'static str, message: String },
}

fn integration(component: &'static str, error: impl ToString) -> BootstrapError {
    BootstrapError::Integration { component, message: error.to_string() }
}

pub async fn bootstrap(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", correlation_id = "bootstrap", "starting application bootstrap");

    let db_pool = connect_from_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let default_zone = config.agent.time_zone();
    let (calendar, calendar_backend): (Arc<dyn CalendarGateway>, &'static str) =
        match HttpCalendarGateway::from_config(&config.calendar).map_err(|error| integration("calendar", error))? {
            Some(gateway) => (Arc::new(gateway), "http"),
            None => {
                warn!(
                    event_name = "system.bootstrap.calendar_in_memory",
                    correlation_id = "bootstrap",
                    "calendar.base_url is not set; bookings are kept in memory"
                );
                (Arc::new(InMemoryCalendar::new()), "in_memory")
            }
        };

    let mut registry = ToolRegistry::default();
    registry.register(SetLightValues);
    registry.register(SetThermostat);
    registry.register(ControlMusic);
    if let Some(index) = GeminiVectorIndex::from_config(&config.knowledge, &config.llm)
        .map_err(|error| integration("knowledge", error))?
    {
        registry.register(SearchSimilarText::new(Arc::new(index), config.knowledge.top_k));
    }
    let toolkit = CalendarToolkit::new(
        Arc::new(SqlCalendarServiceRepository::new(db_pool.clone(), default_zone)),
        calendar,
        Arc::new(SystemClock),
    );
    register_calendar_tools(&mut registry, Arc::new(toolkit));
    let tool_names: Vec<String> = registry.names().into_iter().map(str::to_string).collect();

    let model = GeminiClient::from_config(&config.llm).map_err(|error| integration("llm", error))?;
    let executor = ToolExecutor::new(Arc::new(registry), Duration::from_secs(config.agent.tool_timeout_secs));
    let agent = AgentRuntime::new(Arc::new(model), executor, AgentSettings::from_config(&config.agent, &config.llm));

    let channel = GraphApiClient::from_config(&config.whatsapp).map_err(|error| integration("whatsapp", error))?;
    let processor = MessageProcessor::new(
        ProcessorSettings {
            business_id: BusinessId(config.calendar.business_id.clone()),
            default_zone,
            assistant_instructions: config
                .agent
                .assistant_instructions
                .clone()
                .unwrap_or_else(|| DEFAULT_ASSISTANT_INSTRUCTIONS.to_string()),
        },
        Stores {
            businesses: Arc::new(SqlBusinessRepository::new(db_pool.clone())),
            users: Arc::new(SqlUserRepository::new(db_pool.clone())),
            conversations: Arc::new(SqlConversationRepository::new(db_pool.clone())),
            ledger: Arc::new(SqlMessageLedger::new(db_pool.clone())),
        },
        Arc::new(channel),
        Arc::new(agent),
        Arc::new(SystemClock),
    );

    info!(
        event_name = "system.bootstrap.tools_registered",
        correlation_id = "bootstrap",
        tools = ?tool_names,
        "agent tools registered"
    );

    Ok(Application { config, db_pool, processor: Arc::new(processor), tool_names, calendar_backend })
}

impl Application {
    /// Webhook and health routes behind request tracing.
    pub fn router(&self, queue: MessageQueue) -> Router {
        let health_state = HealthState {
            db_pool: self.db_pool.clone(),
            queue: queue.clone(),
            calendar_backend: self.calendar_backend,
        };
        let webhook_state = WebhookState { verify_token: self.config.whatsapp.verify_token.clone(), queue };
        webhook::router(webhook_state)
            .merge(health::router(health_state))
            .layer(TraceLayer::new_for_http())
    }
}
