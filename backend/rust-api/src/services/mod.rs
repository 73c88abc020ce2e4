use mongodb::Client as MongoClient;
use std::sync::Arc;

use crate::config::Config;

pub mod adaptive;
pub mod agent_service;
pub mod attempt_service;
pub mod fallback;
pub mod learner_store;
pub mod parser;
pub mod quota;
pub mod reasoning;
pub mod tools;

use self::agent_service::AgentService;
use self::attempt_service::AttemptService;
use self::learner_store::{LearnerStore, MongoLearnerStore};
use self::quota::QuotaGovernor;
use self::reasoning::{GeminiClient, ReasoningClient};

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn LearnerStore>,
    pub agent: Arc<AgentService>,
    pub quota: Arc<QuotaGovernor>,
}

impl AppState {
    pub async fn new(config: Config, mongo_client: MongoClient) -> anyhow::Result<Self> {
        let mongo = mongo_client.database(&config.mongo_database);
        tracing::info!(database = %config.mongo_database, "MongoDB database selected");

        let store: Arc<dyn LearnerStore> = Arc::new(MongoLearnerStore::new(mongo));
        let client: Arc<dyn ReasoningClient> = Arc::new(GeminiClient::new(
            config.ai_api_url.clone(),
            config.ai_api_key.clone(),
            config.ai_model.clone(),
        ));

        Ok(Self::with_parts(config, store, client))
    }

    /// Wire the state from explicit collaborators. Production uses
    /// [`AppState::new`]; tests inject fakes here.
    pub fn with_parts(
        config: Config,
        store: Arc<dyn LearnerStore>,
        client: Arc<dyn ReasoningClient>,
    ) -> Self {
        let quota = Arc::new(QuotaGovernor::new(config.ai_daily_call_limit));
        let agent = Arc::new(AgentService::new(client, store.clone(), quota.clone()));

        Self {
            config,
            store,
            agent,
            quota,
        }
    }

    pub fn attempt_service(&self) -> AttemptService {
        AttemptService::new(
            self.store.clone(),
            self.agent.clone(),
            self.config.questions_per_session,
        )
    }
}
