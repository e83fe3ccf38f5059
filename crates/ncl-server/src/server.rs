use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};

use ncl_ledger::ConsentLedger;

use crate::auth::AuthProvider;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::AppState;
use crate::router::build_router;

/// Consent ledger HTTP server.
pub struct ConsentServer {
    config: ServerConfig,
    ledger: Arc<ConsentLedger>,
    auth: Arc<dyn AuthProvider>,
}

impl ConsentServer {
    /// Open the ledger in `config.data_dir`.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let ledger = ConsentLedger::open(&config.data_dir, config.store.clone(), config.bus.clone())?
            .with_name(config.ledger_name.clone());
        Ok(Self::with_ledger(config, Arc::new(ledger)))
    }

    /// Serve an already open ledger.
    pub fn with_ledger(config: ServerConfig, ledger: Arc<ConsentLedger>) -> Self {
        let auth = config.auth.provider();
        Self {
            config,
            ledger,
            auth,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<ConsentLedger> {
        &self.ledger
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(AppState::new(
            Arc::clone(&self.ledger),
            Arc::clone(&self.auth),
        ))
    }

    /// Serve until Ctrl-C, then close the ledger.
    pub async fn serve(self) -> ServerResult<()> {
        let app = self.router();
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!(
            addr = %self.config.bind_addr,
            data_dir = %self.config.data_dir.display(),
            "consent ledger server listening"
        );
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?;

        info!("shutting down");
        self.ledger.close()?;
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
