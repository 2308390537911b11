//! # Configuration Utilities
//!
//! TOML configuration for the query client and the helpers that turn it into
//! an endpoint URL.
//!
//! # Example TOML
//!
//! ```toml
//! [server]
//! host = "coco.datasets.aperturedata.io"
//! port = 443
//! use_ssl = true
//! api_path = "/api/"
//! timeout_secs = 30
//!
//! [auth]
//! username = "admin"
//! password = "admin"
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

/// Load a TOML configuration file and deserialize it into the specified type.
///
/// # Arguments
/// - `path`: Path to the TOML configuration file
///
/// # Returns
/// - `Ok(T)`: Successfully loaded and parsed configuration
/// - `Err`: File I/O or parsing error
pub fn load_config<T>(path: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let content = fs::read_to_string(path)?;
    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Complete configuration of a query client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Where the query endpoint lives
    pub server: ServerInfo,
    /// Credentials used for the `Authenticate` command
    #[serde(default)]
    pub auth: AuthInfo,
}

impl ClientConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        load_config(path)
    }
}

/// Location of the query endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Host name or address (e.g., "localhost")
    pub host: String,
    /// Port; defaults to 443 with TLS and 80 without
    pub port: Option<u16>,
    #[serde(default = "default_use_ssl")]
    pub use_ssl: bool,
    #[serde(default = "default_api_path")]
    pub api_path: String,
    /// Deadline applied to every request, if set
    pub timeout_secs: Option<u64>,
}

impl ServerInfo {
    /// Endpoint URL in the form `scheme://host:port/api/`.
    pub fn endpoint(&self) -> String {
        let scheme = if self.use_ssl { "https" } else { "http" };
        let port = self
            .port
            .unwrap_or(if self.use_ssl { 443 } else { 80 });
        let path = if self.api_path.starts_with('/') {
            self.api_path.clone()
        } else {
            format!("/{}", self.api_path)
        };
        format!("{}://{}:{}{}", scheme, self.host, port, path)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Credentials for the `Authenticate` command. Either `password` or `token`
/// must be non-empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthInfo {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub token: String,
}

fn default_use_ssl() -> bool {
    true
}

fn default_api_path() -> String {
    "/api/".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_config_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
host = "db.example.com"

[auth]
username = "admin"
password = "secret"
"#
        )
        .unwrap();

        let config = ClientConfig::from_file(file.path().to_str().unwrap()).unwrap();

        assert_eq!(config.server.endpoint(), "https://db.example.com:443/api/");
        assert_eq!(config.server.timeout(), None);
        assert_eq!(config.auth.username, "admin");
        assert_eq!(config.auth.password, "secret");
        assert!(config.auth.token.is_empty());
    }

    #[test]
    fn test_endpoint_without_tls() {
        let server = ServerInfo {
            host: "localhost".to_string(),
            port: None,
            use_ssl: false,
            api_path: "api".to_string(),
            timeout_secs: Some(5),
        };

        assert_eq!(server.endpoint(), "http://localhost:80/api");
        assert_eq!(server.timeout(), Some(Duration::from_secs(5)));

        let custom = ServerInfo {
            port: Some(8080),
            ..server
        };
        assert_eq!(custom.endpoint(), "http://localhost:8080/api");
    }

    #[test]
    fn test_load_config_missing_file() {
        assert!(ClientConfig::from_file("/nonexistent/client.toml").is_err());
    }
}
