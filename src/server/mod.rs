//! HTTP surface
//!
//! Upload, metadata, merged store download and render endpoints on top of a
//! shared [`Pipeline`].

pub mod handler;
pub mod response;
pub mod router;

pub use response::ApiError;
pub use router::build_router;

use crate::config::Config;
use crate::error::{MapmergeError, MapmergeResult};
use crate::pipeline::Pipeline;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Map merge server
pub struct MapServer {
    config: Config,
    pipeline: Arc<Pipeline>,
}

impl MapServer {
    pub fn new(config: Config) -> MapmergeResult<Self> {
        let pipeline = Arc::new(Pipeline::from_config(&config)?);
        Ok(Self::with_pipeline(config, pipeline))
    }

    /// Serve an already assembled pipeline
    pub fn with_pipeline(config: Config, pipeline: Arc<Pipeline>) -> Self {
        Self { config, pipeline }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(
            Arc::clone(&self.pipeline),
            self.config.server.max_upload_bytes(),
        )
    }

    /// Sweep leftovers, then serve until Ctrl-C.
    pub async fn serve(self) -> MapmergeResult<()> {
        match self.pipeline.sweep().await {
            Ok(report) if report.removed + report.scheduled + report.skipped > 0 => info!(
                "Startup sweep: removed {} expired artifacts, scheduled {}, left {} foreign entries",
                report.removed, report.scheduled, report.skipped
            ),
            Ok(_) => {}
            Err(e) => warn!("Startup sweep failed: {}", e),
        }

        let bind = self.config.server.bind;
        let app = self.router();
        let listener = TcpListener::bind(bind)
            .await
            .map_err(|e| MapmergeError::io(format!("binding {}", bind), e))?;
        info!("Listening on {}", bind);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| MapmergeError::io("serving HTTP", e))
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
