//! Shared state handed to every handler.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::checkout::cache::CheckoutCache;
use crate::config::Config;
use crate::git_http::errors::GitHttpError;

#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub checkouts: Arc<CheckoutCache>,
    git_semaphore: Arc<Semaphore>,
}

impl GatewayState {
    pub fn new(config: Config) -> Result<Self> {
        let checkouts = Arc::new(CheckoutCache::new(&config)?);
        let git_semaphore = Arc::new(Semaphore::new(config.git.max_concurrency.max(1)));
        Ok(GatewayState {
            config: Arc::new(config),
            checkouts,
            git_semaphore,
        })
    }

    /// Bound the number of concurrently running git subprocesses.
    pub async fn acquire_git_slot(&self) -> Result<OwnedSemaphorePermit, GitHttpError> {
        self.git_semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| GitHttpError::Internal("gateway is shutting down".into()))
    }

    pub fn git_timeout(&self) -> Duration {
        Duration::from_millis(self.config.git.timeout_ms)
    }
}
