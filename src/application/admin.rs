use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::application::error::AppError;
use crate::cache::{CacheRegistry, InstanceStats};

#[derive(Debug, Clone, Serialize)]
pub struct CacheStatsView {
    pub enabled: bool,
    pub instances: Vec<InstanceStats>,
}

/// Operator-facing cache maintenance.
#[derive(Clone)]
pub struct AdminCacheService {
    registry: Arc<CacheRegistry>,
}

impl AdminCacheService {
    pub fn new(registry: Arc<CacheRegistry>) -> Self {
        Self { registry }
    }

    /// Wipe every configured instance; the error lists each instance that failed.
    pub async fn purge(&self) -> Result<(), AppError> {
        match self.registry.clear_all().await {
            Ok(()) => {
                info!(
                    instances = self.registry.instances().len(),
                    "Cache purge complete"
                );
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "Cache purge incomplete");
                Err(AppError::from(err))
            }
        }
    }

    pub async fn stats(&self) -> Result<CacheStatsView, AppError> {
        let instances = self.registry.stats().await?;
        Ok(CacheStatsView {
            enabled: self.registry.is_enabled(),
            instances,
        })
    }
}
