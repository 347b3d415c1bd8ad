//! zipcontent server
//!
//! A standalone HTTP server that streams members of zip archives and
//! standalone content files out of a local content directory.
//!
//! # Routes
//!
//! ```text
//! GET|HEAD|OPTIONS  /zipcontent/<archive>/<member path...>
//! GET|HEAD          /downloadcontent/<filename>/<new filename>
//! ```
//!
//! Both route names are configurable. Archive members are served with CORS
//! and Content-Security-Policy headers and a far-future `Expires`. JSON
//! members have their image placeholder token rewritten to the archive's URL
//! prefix. Downloads are sent as attachments.
//!
//! # Example Usage
//!
//! ```bash
//! # Serve ./content on port 8080
//! $ ZIPCONTENT_CONTENT_DIR=./content zipcontent
//!
//! # Run with a configuration file
//! $ zipcontent --config /etc/zipcontent/zipcontent.toml
//! ```

#![doc(html_root_url = "https://docs.rs/zipcontent-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod logging;
pub mod router;
pub mod server;
pub mod shutdown;

pub use config::{
    LoggingSettings, ServerConfig, ServerConfigBuilder, ServerSettings, StorageSettings,
};
pub use error::{ErrorResponse, ServerError, ServerResult};
pub use logging::init_logging;
pub use router::{Route, RouteTable};
pub use server::ContentServer;
pub use shutdown::ShutdownSignal;

/// Server version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
