//! Configuration for the zipcontent server.
//!
//! Loaded from a TOML or JSON file, then overridden by `ZIPCONTENT_*`
//! environment variables, then validated:
//!
//! ```toml
//! [server]
//! listen_addr = "0.0.0.0"
//! listen_port = 8080
//! shutdown_timeout_secs = 30
//!
//! [storage]
//! content_dir = "/var/lib/content/storage"
//!
//! [routes]
//! archive_route = "zipcontent"
//! download_route = "downloadcontent"
//!
//! [streaming]
//! chunk_size = 65536
//! channel_capacity = 4
//!
//! [logging]
//! level = "info"
//! json = true
//!
//! [mime.types]
//! h5p = "application/zip"
//! ```

use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use zipcontent_core::body::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_CHUNK_SIZE};
use zipcontent_core::{
    ContentTypeClassifier, StreamSettings, DEFAULT_ARCHIVE_ROUTE, DEFAULT_DOWNLOAD_ROUTE,
};

use crate::error::{ServerError, ServerResult};

/// Prefix of environment variable overrides.
pub const ENV_PREFIX: &str = "ZIPCONTENT_";

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener settings.
    pub server: ServerSettings,
    /// Content storage settings.
    pub storage: StorageSettings,
    /// Route names.
    pub routes: RouteSettings,
    /// Streaming settings.
    pub streaming: StreamingSettings,
    /// Logging settings.
    pub logging: LoggingSettings,
    /// Extra MIME types.
    pub mime: MimeSettings,
}

impl ServerConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Load configuration from a file.
    pub fn from_file(path: impl Into<PathBuf>) -> ServerResult<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ServerError::config(format!("failed to read config file: {e}")))?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        match extension {
            "toml" => toml::from_str(&content)
                .map_err(|e| ServerError::config(format!("invalid TOML: {e}"))),
            "json" => serde_json::from_str(&content)
                .map_err(|e| ServerError::config(format!("invalid JSON: {e}"))),
            _ => Err(ServerError::config(format!(
                "unsupported config format: {extension}"
            ))),
        }
    }

    /// Apply `ZIPCONTENT_*` environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    /// Apply overrides from `lookup`, keyed by the variable name without
    /// [`ENV_PREFIX`]. Unparseable values are ignored.
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(addr) = lookup("LISTEN_ADDR") {
            self.server.listen_addr = addr;
        }

        if let Some(port) = lookup("LISTEN_PORT") {
            if let Ok(port) = port.parse() {
                self.server.listen_port = port;
            }
        }

        if let Some(dir) = lookup("CONTENT_DIR") {
            self.storage.content_dir = PathBuf::from(dir);
        }

        if let Some(route) = lookup("ARCHIVE_ROUTE") {
            self.routes.archive_route = route;
        }

        if let Some(route) = lookup("DOWNLOAD_ROUTE") {
            self.routes.download_route = route;
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(json) = lookup("LOG_JSON") {
            if let Ok(json) = json.parse() {
                self.logging.json = json;
            }
        }

        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ServerResult<()> {
        if self.server.listen_addr.parse::<IpAddr>().is_err() {
            return Err(ServerError::config(format!(
                "invalid listen_addr: {}",
                self.server.listen_addr
            )));
        }

        if self.storage.content_dir.as_os_str().is_empty() {
            return Err(ServerError::config("content_dir is required"));
        }

        for (name, route) in [
            ("archive_route", &self.routes.archive_route),
            ("download_route", &self.routes.download_route),
        ] {
            if route.is_empty() || route.contains('/') {
                return Err(ServerError::config(format!(
                    "{name} must be a single non-empty path segment"
                )));
            }
        }

        if self.routes.archive_route == self.routes.download_route {
            return Err(ServerError::config(
                "archive_route and download_route must differ",
            ));
        }

        if self.streaming.chunk_size == 0 {
            return Err(ServerError::config("chunk_size must be greater than zero"));
        }

        if self.streaming.channel_capacity == 0 {
            return Err(ServerError::config(
                "channel_capacity must be greater than zero",
            ));
        }

        Ok(())
    }

    /// The socket address to listen on.
    pub fn socket_addr(&self) -> ServerResult<SocketAddr> {
        let ip: IpAddr = self
            .server
            .listen_addr
            .parse()
            .map_err(|e| ServerError::config(format!("invalid listen address: {e}")))?;
        Ok(SocketAddr::new(ip, self.server.listen_port))
    }

    /// How long shutdown waits for open connections.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Chunking for streamed bodies.
    pub fn stream_settings(&self) -> StreamSettings {
        StreamSettings {
            chunk_size: self.streaming.chunk_size,
            channel_capacity: self.streaming.channel_capacity,
        }
    }

    /// The bundled MIME table with configured additions layered on top.
    pub fn classifier(&self) -> ContentTypeClassifier {
        ContentTypeClassifier::bundled().with_types(&self.mime.types)
    }
}

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Address to bind to.
    pub listen_addr: String,
    /// Port to listen on.
    pub listen_port: u16,
    /// Seconds to wait for open connections on shutdown.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            listen_port: 8080,
            shutdown_timeout_secs: 30,
        }
    }
}

/// Content storage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Root of the sharded content directory.
    pub content_dir: PathBuf,
}

/// Route names, each a single path segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteSettings {
    /// Prefix for archive members.
    pub archive_route: String,
    /// Prefix for downloads.
    pub download_route: String,
}

impl Default for RouteSettings {
    fn default() -> Self {
        Self {
            archive_route: DEFAULT_ARCHIVE_ROUTE.to_string(),
            download_route: DEFAULT_DOWNLOAD_ROUTE.to_string(),
        }
    }
}

/// Streaming settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingSettings {
    /// Bytes per chunk.
    pub chunk_size: usize,
    /// Chunks buffered ahead of the client.
    pub channel_capacity: usize,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter directive, e.g. `info` or `zipcontent_core=debug,info`.
    /// `RUST_LOG` takes precedence when set.
    pub level: String,
    /// JSON output; pretty output otherwise.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

/// Additional extension to MIME type mappings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MimeSettings {
    /// Extension (without the dot) to MIME type.
    pub types: BTreeMap<String, String>,
}

/// Builder for `ServerConfig`.
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Set the listen address.
    #[must_use]
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.server.listen_addr = addr.into();
        self
    }

    /// Set the listen port.
    #[must_use]
    pub fn listen_port(mut self, port: u16) -> Self {
        self.config.server.listen_port = port;
        self
    }

    /// Set the shutdown timeout.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.server.shutdown_timeout_secs = timeout.as_secs();
        self
    }

    /// Set the content directory.
    #[must_use]
    pub fn content_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.storage.content_dir = dir.into();
        self
    }

    /// Set the archive route name.
    #[must_use]
    pub fn archive_route(mut self, route: impl Into<String>) -> Self {
        self.config.routes.archive_route = route.into();
        self
    }

    /// Set the download route name.
    #[must_use]
    pub fn download_route(mut self, route: impl Into<String>) -> Self {
        self.config.routes.download_route = route.into();
        self
    }

    /// Set the streaming chunk size.
    #[must_use]
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.streaming.chunk_size = size;
        self
    }

    /// Set the streaming channel capacity.
    #[must_use]
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.streaming.channel_capacity = capacity;
        self
    }

    /// Set the log level.
    #[must_use]
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// Add a MIME type mapping.
    #[must_use]
    pub fn mime_type(mut self, extension: impl Into<String>, mime: impl Into<String>) -> Self {
        self.config.mime.types.insert(extension.into(), mime.into());
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ServerResult<ServerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
