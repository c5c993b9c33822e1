pub mod routes;
pub mod state;

pub use routes::make_app;
pub use state::ServerState;

use crate::errors::{GamdlWebError, Result};
use tracing::info;

/// Bind the configured address and serve until Ctrl-C
pub async fn run_server(state: ServerState) -> Result<()> {
    let address = state.config.bind_address();
    let app = make_app(state);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(|e| GamdlWebError::Server(format!("Failed to bind {}: {}", address, e)))?;
    info!("Listening on http://{}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutting down");
    }
}
