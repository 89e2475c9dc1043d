use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::core::config::settings::EngineSettings;
use crate::core::config::{AppPaths, ConfigService};
use crate::core::security::get_or_create_session_token;
use crate::ingest::{IngestPipeline, IngestQueue};
use crate::llm::{AzureOpenAiClient, EmbeddingClient, LlmProvider};
use crate::query::{AnswerGenerator, QuestionSuggester, Retriever};
use crate::threads::ThreadStore;
use crate::vector::{QdrantIndex, VectorIndex};

pub mod error;

use error::InitializationError;

/// Global application state shared across all routes and background tasks.
///
/// Contains references to:
/// - Configuration and paths
/// - The hosted model provider and vector store clients
/// - The ingestion pipeline and its background queue
/// - Query-side services (retrieval, answering, suggestions, threads)
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: ConfigService,
    pub settings: EngineSettings,
    pub session_token: String,
    pub provider: Arc<dyn LlmProvider>,
    pub index: Arc<dyn VectorIndex>,
    pub pipeline: Arc<IngestPipeline>,
    pub queue: Arc<IngestQueue>,
    pub retriever: Retriever,
    pub answers: AnswerGenerator,
    pub suggester: QuestionSuggester,
    pub threads: ThreadStore,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Initializes the application state.
    ///
    /// This process includes:
    /// 1. Setting up paths and loading configuration
    /// 2. Building the Azure OpenAI and vector store clients
    /// 3. Wiring the ingestion pipeline, queue, and query services
    ///
    /// Settings are snapshotted here; config edits made over the API take
    /// effect on the next start.
    pub fn initialize() -> Result<Arc<Self>, InitializationError> {
        let paths = Arc::new(AppPaths::new());
        let config = ConfigService::new(paths.clone());
        let loaded = config
            .load_config()
            .map_err(|e| InitializationError::Config(e.into()))?;
        let settings = EngineSettings::from_config(&loaded);
        let session_token = get_or_create_session_token();

        let provider: Arc<dyn LlmProvider> = Arc::new(AzureOpenAiClient::new(&settings.azure));
        let index: Arc<dyn VectorIndex> = Arc::new(QdrantIndex::new(&settings.vector_store));
        let embeddings = EmbeddingClient::new(provider.clone(), settings.embedding_dimension);

        let pipeline = Arc::new(IngestPipeline::new(
            &settings,
            provider.clone(),
            index.clone(),
        ));
        let queue = Arc::new(IngestQueue::new(
            pipeline.clone(),
            settings.ingest.max_concurrent_jobs,
        ));
        let retriever = Retriever::new(&settings.query, embeddings.clone(), index.clone());
        let answers = AnswerGenerator::new(&settings, provider.clone());
        let suggester = QuestionSuggester::new(provider.clone(), index.clone());
        let threads = ThreadStore::new(embeddings, index.clone());
        let started_at = Utc::now();

        Ok(Arc::new(AppState {
            paths,
            config,
            settings,
            session_token,
            provider,
            index,
            pipeline,
            queue,
            retriever,
            answers,
            suggester,
            threads,
            started_at,
        }))
    }
}

/// Probes the hosted services once at startup so misconfiguration shows up
/// in the log right away instead of on the first request. Failures are
/// logged, never fatal; the server still starts so the config can be fixed
/// over the API.
pub async fn run_startup_probes(state: &AppState) {
    match state.provider.health_check().await {
        Ok(true) => info!("{} endpoint is reachable", state.provider.name()),
        Ok(false) => warn!(
            "{} endpoint is not reachable; embedding and chat calls will fail",
            state.provider.name()
        ),
        Err(err) => warn!("{} health check failed: {}", state.provider.name(), err),
    }

    match state.index.health_check().await {
        Ok(true) => info!("Vector store is reachable"),
        Ok(false) => warn!("Vector store is not reachable; uploads and queries will fail"),
        Err(err) => warn!("Vector store health check failed: {}", err),
    }

    if let Err(err) = state.threads.ensure_collection().await {
        warn!("Could not ensure the thread collection: {}", err);
    }
}
