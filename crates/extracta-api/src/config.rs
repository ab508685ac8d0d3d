//! HTTP server configuration.

use std::net::SocketAddr;
use std::path::PathBuf;

use extracta_core::{defaults, Error, Result};

/// Bind address, upload storage and request limits.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Where uploaded inputs are written.
    pub uploads_dir: PathBuf,
    /// Largest accepted upload in bytes.
    pub max_upload_bytes: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: defaults::SERVER_HOST.to_string(),
            port: defaults::SERVER_PORT,
            uploads_dir: PathBuf::from(defaults::UPLOADS_DIR),
            max_upload_bytes: defaults::MAX_UPLOAD_BYTES,
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `HOST` | `0.0.0.0` | Bind host |
    /// | `PORT` | `8080` | Bind port |
    /// | `UPLOADS_DIR` | `uploads` | Upload storage directory |
    /// | `MAX_UPLOAD_BYTES` | 500 MiB | Upload size limit |
    pub fn from_env() -> Self {
        let fallback = Self::default();
        let var = |key: &str| {
            std::env::var(key)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Self {
            host: var(defaults::ENV_HOST).unwrap_or(fallback.host),
            port: var(defaults::ENV_PORT)
                .and_then(|v| v.parse().ok())
                .unwrap_or(fallback.port),
            uploads_dir: var(defaults::ENV_UPLOADS_DIR)
                .map(PathBuf::from)
                .unwrap_or(fallback.uploads_dir),
            max_upload_bytes: var(defaults::ENV_MAX_UPLOAD_BYTES)
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(fallback.max_upload_bytes),
        }
    }

    pub fn with_uploads_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.uploads_dir = dir.into();
        self
    }

    pub fn with_max_upload_bytes(mut self, limit: u64) -> Self {
        self.max_upload_bytes = limit.max(1);
        self
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| Error::Config(format!("invalid bind address {}:{}: {e}", self.host, self.port)))
    }
}
