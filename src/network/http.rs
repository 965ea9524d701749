use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::{NeighborSpec, RuntimeConfig};
use crate::core::{Error, NodeStatus, Result};
use crate::sync::Shared;

/// Reads the status of a network neighbor
pub trait StatusFetcher: Send + Sync {
    fn fetch<'a>(&'a self, neighbor: &'a NeighborSpec) -> BoxFuture<'a, Result<NodeStatus>>;
}

/// Polls `GET {address}{status_path}` on the neighbor
#[derive(Debug, Clone)]
pub struct HttpStatusFetcher {
    client: reqwest::Client,
    path: String,
}

impl HttpStatusFetcher {
    pub fn new(timeout: Duration, path: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(HttpStatusFetcher {
            client,
            path: path.into(),
        })
    }

    pub fn from_runtime(runtime: &RuntimeConfig) -> Result<Self> {
        Self::new(runtime.fetch_timeout, runtime.status_path.clone())
    }

    fn url(&self, address: &str) -> String {
        format!("{}{}", address.trim_end_matches('/'), self.path)
    }
}

impl StatusFetcher for HttpStatusFetcher {
    fn fetch<'a>(&'a self, neighbor: &'a NeighborSpec) -> BoxFuture<'a, Result<NodeStatus>> {
        async move {
            let address = neighbor
                .address
                .as_deref()
                .ok_or_else(|| Error::transport(format!("neighbor {} has no address", neighbor.id)))?;
            let url = self.url(address);

            let response = self
                .client
                .get(&url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| Error::transport(format!("GET {} failed: {}", url, e)))?;

            response
                .json::<NodeStatus>()
                .await
                .map_err(|e| Error::transport(format!("bad status from {}: {}", url, e)))
        }
        .boxed()
    }
}

async fn get_status(State(status): State<Shared<NodeStatus>>) -> Json<NodeStatus> {
    Json(*status.load())
}

/// Router answering neighbor polls with the published status
pub fn status_router(path: &str, status: Shared<NodeStatus>) -> Router {
    Router::new().route(path, get(get_status)).with_state(status)
}

/// Serves the status endpoint until `shutdown` fires
pub async fn serve_status(
    addr: SocketAddr,
    path: &str,
    status: Shared<NodeStatus>,
    shutdown: CancellationToken,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, path, "status endpoint listening");
    axum::serve(listener, status_router(path, status))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
