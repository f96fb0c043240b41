use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use tokio::sync::oneshot;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use mnemo_engine::ChatService;
use mnemo_llm::hub::HUB_MODELS_URL;
use mnemo_store::MessageStore;

use crate::config::{ProviderSettings, ServerConfig};
use crate::handlers;

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub chat: ChatService,
    pub store: Arc<MessageStore>,
    pub settings: Arc<ProviderSettings>,
    pub http: reqwest::Client,
    pub hub_models_url: String,
}

impl AppState {
    pub fn new(chat: ChatService, settings: ProviderSettings) -> Self {
        Self {
            store: Arc::clone(chat.store()),
            chat,
            settings: Arc::new(settings),
            http: reqwest::Client::new(),
            hub_models_url: HUB_MODELS_URL.into(),
        }
    }

    pub fn with_hub_models_url(mut self, url: impl Into<String>) -> Self {
        self.hub_models_url = url.into();
        self
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState, body_limit: usize) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/memory/save", post(handlers::save_message))
        .route("/api/memory/messages", get(handlers::list_messages))
        .route("/api/memory/search", get(handlers::search_messages))
        .route("/api/memory/ltm", get(handlers::ltm_page))
        .route("/api/memory/reindex", post(handlers::reindex))
        .route("/api/memory/clear", delete(handlers::clear_messages))
        .route("/api/memory/count", get(handlers::message_count))
        .route("/api/memory/stats", get(handlers::memory_stats))
        .route("/api/models", get(handlers::list_models))
        .route("/api/chat", post(handlers::chat))
        .with_state(state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Open the message store, wire providers from `settings` and start serving.
pub async fn start(
    config: ServerConfig,
    settings: ProviderSettings,
) -> Result<ServerHandle, std::io::Error> {
    let store = Arc::new(MessageStore::open(config.database_path.clone()));
    if let Err(e) = store.ensure_ready().await {
        warn!(
            path = %config.database_path.display(),
            error = %e,
            "message store not ready, retrying on first use"
        );
    }

    let chat = ChatService::new(settings.registry(), store);
    let state = AppState::new(chat, settings).with_hub_models_url(config.hub_models_url.clone());
    start_with_state(&config, state).await
}

/// Serve prebuilt state. Binding to port 0 picks a free port.
pub async fn start_with_state(
    config: &ServerConfig,
    state: AppState,
) -> Result<ServerHandle, std::io::Error> {
    let router = build_router(state, config.body_limit);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    info!(port = local_addr.port(), host = %config.host, "mnemo server started");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let shutdown = async {
            let _ = shutdown_rx.await;
        };
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!(error = %e, "server exited with error");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        shutdown: shutdown_tx,
        server,
    })
}

/// Handle returned by `start()`; keeps the server task alive.
pub struct ServerHandle {
    pub port: u16,
    shutdown: oneshot::Sender<()>,
    server: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// Stop accepting connections and wait for in-flight requests.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.server.await {
            warn!(error = %e, "server task ended abnormally");
        }
        info!("mnemo server stopped");
    }
}
