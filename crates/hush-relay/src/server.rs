//! Relay server

use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::{create_router, ApiState};
use crate::config::{RelayConfig, StorageBackend};
use crate::registry::KeyRegistry;
use crate::store::{MemoryStore, RecordStore, SqliteStore};

/// Relay server
pub struct RelayServer {
    config: RelayConfig,
    registry: Arc<KeyRegistry>,
    store: Arc<dyn RecordStore>,
}

impl RelayServer {
    /// Create a relay server with the configured storage backend
    pub async fn new(config: RelayConfig) -> Result<Self> {
        let store: Arc<dyn RecordStore> = match config.storage_backend() {
            StorageBackend::Sqlite => Arc::new(SqliteStore::new(&config.database_path).await?),
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
        };
        Ok(Self::with_store(config, store))
    }

    /// Create a relay server over an existing store
    pub fn with_store(config: RelayConfig, store: Arc<dyn RecordStore>) -> Self {
        let registry = Arc::new(KeyRegistry::new(store.clone()));
        Self {
            config,
            registry,
            store,
        }
    }

    /// Router with tracing applied
    pub fn router(&self) -> Router {
        let state = ApiState {
            registry: self.registry.clone(),
            store: self.store.clone(),
            max_key_request_size: self.config.max_key_request_size,
            max_blob_size: self.config.max_blob_size,
        };
        create_router(state).layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
    }

    /// Serve on an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        info!("HTTP server listening on {}", listener.local_addr()?);
        axum::serve(listener, self.router()).await?;
        Ok(())
    }

    /// Run the relay server
    pub async fn run(&self) -> Result<()> {
        info!(
            backend = %self.config.storage_backend,
            "Starting relay on {}",
            self.config.listen_addr
        );
        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        self.serve(listener).await
    }
}

/// Start an in-memory relay on an ephemeral localhost port.
///
/// Returns the base URL; the server runs until the runtime shuts down.
pub async fn spawn_ephemeral() -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let config = RelayConfig {
        listen_addr: addr,
        storage_backend: "memory".to_string(),
        ..RelayConfig::default()
    };
    let server = RelayServer::with_store(config, Arc::new(MemoryStore::new()));
    tokio::spawn(async move {
        if let Err(e) = server.serve(listener).await {
            tracing::error!("Relay stopped: {}", e);
        }
    });
    Ok(format!("http://{}", addr))
}
