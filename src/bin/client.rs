//! # Client Binary Entry Point
//!
//! Walks through a typical session against the query endpoint.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin client -- --config config/client.toml
//! ```
//!
//! Uploading an image as well:
//! ```bash
//! cargo run --bin client -- --config config/client.toml \
//!   --image ./photo.jpg --output-dir ./downloads
//! ```
//!
//! The client will:
//! 1. Load configuration from the specified TOML file
//! 2. Authenticate and install the session token
//! 3. List the unique ids of up to `--limit` images
//! 4. Fetch the first listed image with all its properties and save its blob
//! 5. Upload `--image`, if given, with an `AddImage` command

use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use query_client::client::{ClientMiddleware, QueryClient};
use query_client::common::config::ClientConfig;
use query_client::common::messages::{QueryRequest, QueryResponse};
use query_client::utils::logging::init_logger;

/// Command-line arguments for the client binary
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the client configuration file (TOML format)
    ///
    /// Example: config/client.toml
    #[arg(short, long)]
    config: String,

    /// Image file to upload with an AddImage command (optional)
    #[arg(long)]
    image: Option<PathBuf>,

    /// Directory where returned image blobs are written
    #[arg(long, default_value = "downloads")]
    output_dir: PathBuf,

    /// Maximum number of images to list
    #[arg(long, default_value_t = 10)]
    limit: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();

    let args = Args::parse();
    let config = ClientConfig::from_file(&args.config)
        .with_context(|| format!("failed to load {}", args.config))?;

    let client = Arc::new(QueryClient::new(&config.server.endpoint())?);
    info!("Using endpoint {}", client.endpoint());

    let mut middleware = ClientMiddleware::new(client).with_deadline(config.server.timeout());

    middleware
        .authenticate(
            &config.auth.username,
            &config.auth.password,
            &config.auth.token,
        )
        .await
        .context("authentication failed")?;

    // List images
    let listing = middleware
        .query(QueryRequest::new(vec![json!({
            "FindImage": {
                "blobs": false,
                "uniqueids": true,
                "results": { "limit": args.limit }
            }
        })]))
        .await
        .context("listing images failed")?;
    display("List images", &listing, middleware.last_query_time());

    // Find the first listed image
    let first_id = listing
        .result(0, "FindImage")
        .and_then(|result| result["entities"].get(0))
        .and_then(|entity| entity.get("_uniqueid"))
        .cloned();

    match first_id {
        Some(id) => {
            let found = middleware
                .query(QueryRequest::new(vec![json!({
                    "FindImage": {
                        "constraints": { "_uniqueid": ["==", id] },
                        "blobs": true,
                        "results": { "all_properties": true }
                    }
                })]))
                .await
                .context("finding image failed")?;
            display("Find image", &found, middleware.last_query_time());
            save_blobs(&args.output_dir, &found.blobs)?;
        }
        None => warn!("No images listed, skipping lookup"),
    }

    // Upload
    if let Some(path) = &args.image {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        info!("Uploading {} ({} bytes)", path.display(), bytes.len());

        let added = middleware
            .query(
                QueryRequest::new(vec![json!({
                    "AddImage": {
                        "properties": { "rest_api_example_id": 123456789 }
                    }
                })])
                .with_attachment(bytes),
            )
            .await
            .context("adding image failed")?;
        display("Add image", &added, middleware.last_query_time());
    }

    middleware.logout();
    Ok(())
}

fn display(title: &str, response: &QueryResponse, elapsed: Duration) {
    info!(
        "<<<<<<< {} ({} ms, {} blob(s))\n{}",
        title,
        elapsed.as_millis(),
        response.blobs.len(),
        response.pretty()
    );
}

/// Writes each blob to `dir`, naming it after its detected image format.
fn save_blobs(dir: &Path, blobs: &[Vec<u8>]) -> anyhow::Result<()> {
    if blobs.is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;

    for (index, blob) in blobs.iter().enumerate() {
        let extension = image::guess_format(blob)
            .ok()
            .and_then(|format| format.extensions_str().first().copied())
            .unwrap_or("bin");

        match image::load_from_memory(blob) {
            Ok(decoded) => info!(
                "Blob #{}: {}x{} image ({} bytes)",
                index,
                decoded.width(),
                decoded.height(),
                blob.len()
            ),
            Err(e) => warn!("Blob #{} is not a decodable image: {}", index, e),
        }

        let path = dir.join(format!("blob_{}.{}", index, extension));
        std::fs::write(&path, blob)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!("Saved {}", path.display());
    }

    Ok(())
}
