//! zipcontent - Entry point

use std::path::PathBuf;

use anyhow::Context;
use tracing::{error, info};

use zipcontent_server::{init_logging, ContentServer, ServerConfig};

/// Command-line arguments.
struct Args {
    /// Path to configuration file.
    config: Option<PathBuf>,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    config = args.next().map(PathBuf::from);
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("zipcontent {}", zipcontent_server::VERSION);
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {other}");
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
            }
        }

        Self { config }
    }
}

fn print_help() {
    println!(
        r"zipcontent - Serve zip archive members over HTTP

USAGE:
    zipcontent [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file (TOML or JSON)
    -h, --help             Print help information
    -v, --version          Print version information

ENVIRONMENT VARIABLES:
    ZIPCONTENT_LISTEN_ADDR      Address to bind (default: 0.0.0.0)
    ZIPCONTENT_LISTEN_PORT      Port to bind (default: 8080)
    ZIPCONTENT_CONTENT_DIR      Content storage directory (required)
    ZIPCONTENT_ARCHIVE_ROUTE    Archive route name (default: zipcontent)
    ZIPCONTENT_DOWNLOAD_ROUTE   Download route name (default: downloadcontent)
    ZIPCONTENT_LOG_LEVEL        Log filter when RUST_LOG is unset (default: info)
    ZIPCONTENT_LOG_JSON         Emit JSON logs (default: true)

EXAMPLES:
    # Run with configuration file
    zipcontent --config /etc/zipcontent/zipcontent.toml

    # Run with environment variables
    ZIPCONTENT_CONTENT_DIR=/var/lib/content zipcontent
"
    );
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => ServerConfig::from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => ServerConfig::default(),
    }
    .with_env_overrides();

    config.validate().context("invalid configuration")?;
    init_logging(&config.logging).context("failed to initialize logging")?;

    info!(version = zipcontent_server::VERSION, "starting zipcontent");
    if let Some(path) = &args.config {
        info!(path = %path.display(), "loaded configuration file");
    }

    let server = ContentServer::new(config).context("failed to create server")?;
    server.run().await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!(error = %e, "zipcontent exited with error");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
