//! Health check for the configured storage backend.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::Filesystem;

/// Result of one health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: String,
    pub message: Option<String>,
    pub duration_ms: f64,
    pub timestamp: String,
}

impl HealthCheck {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Liveness check registered as `"filesystem"`
#[derive(Clone)]
pub struct FilesystemHealthCheck {
    fs: Arc<dyn Filesystem>,
}

impl FilesystemHealthCheck {
    pub const NAME: &'static str = "filesystem";

    pub fn new(fs: Arc<dyn Filesystem>) -> Self {
        Self { fs }
    }

    /// Probe the backend and report its state
    pub async fn check(&self) -> HealthCheck {
        let start = Instant::now();
        let healthy = self.fs.probe().await;

        HealthCheck {
            name: Self::NAME.to_string(),
            status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
            message: if healthy {
                None
            } else {
                Some(format!("{} filesystem is not healthy", self.fs.kind()))
            },
            duration_ms: start.elapsed().as_secs_f64() * 1000.0,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
