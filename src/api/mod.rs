//! HTTP API server: text-to-speech proxy and health checks

pub mod health;
pub mod tts;

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::Result;
use crate::config::TtsConfig;
use crate::tts::{CloudSynthesizer, CredentialProblem, GoogleTts, ServiceAccount};

/// Upstream synthesis backend, or why there is none
#[derive(Clone)]
pub enum TtsBackend {
    /// Credentials parsed; synthesis can be attempted
    Ready(Arc<dyn CloudSynthesizer>),
    /// Credentials missing or malformed
    Misconfigured(CredentialProblem),
}

impl TtsBackend {
    /// Build the Google Cloud backend from configuration
    ///
    /// Credential problems are kept and reported per request rather than
    /// failing startup.
    #[must_use]
    pub fn from_config(config: &TtsConfig) -> Self {
        match ServiceAccount::from_json(config.credentials_json.as_ref()) {
            Ok(account) => {
                tracing::info!(
                    client_email = %account.client_email,
                    voice = %config.voice_name,
                    "Cloud TTS configured"
                );
                Self::Ready(Arc::new(GoogleTts::new(account, config)))
            }
            Err(problem) => {
                tracing::warn!(problem = %problem, "Cloud TTS not configured");
                Self::Misconfigured(problem)
            }
        }
    }
}

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub tts: TtsBackend,
}

/// Configuration for building an API server
pub struct ApiServerBuilder {
    port: u16,
    tts: Option<TtsBackend>,
    tts_config: TtsConfig,
}

impl ApiServerBuilder {
    /// Create a new API server builder
    #[must_use]
    pub fn new(port: u16) -> Self {
        Self {
            port,
            tts: None,
            tts_config: TtsConfig::default(),
        }
    }

    /// Set the Cloud TTS configuration used to build the default backend
    #[must_use]
    pub fn tts_config(mut self, config: TtsConfig) -> Self {
        self.tts_config = config;
        self
    }

    /// Use an explicit synthesis backend
    #[must_use]
    pub fn tts_backend(mut self, backend: TtsBackend) -> Self {
        self.tts = Some(backend);
        self
    }

    /// Build the API server
    #[must_use]
    pub fn build(self) -> ApiServer {
        let tts = self
            .tts
            .unwrap_or_else(|| TtsBackend::from_config(&self.tts_config));

        ApiServer {
            state: Arc::new(ApiState { tts }),
            port: self.port,
        }
    }
}

/// Build the router with all routes
pub fn router(state: Arc<ApiState>) -> Router {
    // CORS layer so a browser front end can call the proxy
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", tts::router(state.clone()))
        .merge(health::router())
        .merge(health::ready_router(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
}

impl ApiServer {
    /// The router this server serves
    #[must_use]
    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(port = self.port, "TTS proxy listening");

        axum::serve(listener, self.router())
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }

    /// Run the API server in a background task
    ///
    /// A failure to bind or serve is logged when the task ends.
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        let port = self.port;
        tokio::spawn(async move {
            let result = self.run().await;
            if let Err(e) = &result {
                tracing::error!(port, error = %e, "TTS proxy stopped");
            }
            result
        })
    }
}
