//! HTTP API server.

mod error;
pub mod handlers;
mod routes;

pub use error::ApiError;
pub use routes::create_router;

use std::sync::Arc;

use crate::config::Settings;
use crate::ingest::IngestGateway;
use crate::orchestrate::PollSettings;
use crate::queue::JobQueue;
use crate::store::JobStore;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<IngestGateway>,
    pub store: Arc<dyn JobStore>,
    pub queue: Arc<dyn JobQueue>,
    pub settings: Arc<Settings>,
    /// Poll cadence used by the comparison endpoint.
    pub poll: PollSettings,
}

/// Bind and serve the API until the process is stopped.
pub async fn serve(state: AppState, bind: &str) -> std::io::Result<()> {
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "API server listening");
    axum::serve(listener, router).await
}
