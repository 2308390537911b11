//! # Query Client
//!
//! Transport and session-credential plumbing for the query endpoint.
//!
//! ## Responsibility
//!
//! The [`QueryClient`] struct does one thing: submit a command sequence (plus
//! optional attachments) in a single HTTP POST and hand back the parsed
//! `json` value and decoded blobs. It does not interpret commands, retry,
//! refresh sessions or chain requests; those concerns belong to the caller
//! (see [`ClientMiddleware`](super::middleware::ClientMiddleware)).
//!
//! ## Credential
//!
//! The client holds at most one bearer token. It starts absent, is replaced
//! only through [`QueryClient::set_credential`], and is cleared automatically
//! in exactly one case: the server rejects the token with 401/403.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use query_client::client::QueryClient;
//! use query_client::common::messages::QueryRequest;
//! use serde_json::json;
//!
//! let client = QueryClient::new("https://localhost:443/api/")?;
//! client.set_credential(Some(token));
//!
//! let request = QueryRequest::new(vec![json!({"AddImage": {}})]).with_attachment(jpeg_bytes);
//! let response = client.submit(request).await?;
//! println!("{}", response.pretty());
//! ```

use log::debug;
use reqwest::multipart::{Form, Part};
use reqwest::Url;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use crate::common::error::{is_auth_failure, ClientError, Result};
use crate::common::messages::{QueryRequest, QueryResponse, BLOBS_FIELD, QUERY_FIELD};

/// Client for a JSON-command-plus-binary-attachment query endpoint.
///
/// Safe to share between tasks (e.g. behind an `Arc`); concurrent submits are
/// independent apart from the shared credential, which each submit snapshots
/// once before building its request.
pub struct QueryClient {
    /// Immutable endpoint every request is posted to
    endpoint: Url,
    http: reqwest::Client,
    /// Bearer token presented with each request, if any
    credential: RwLock<Option<String>>,
}

impl QueryClient {
    /// Creates a client for `endpoint`. Performs no network I/O.
    ///
    /// # Errors
    ///
    /// * `InvalidEndpoint` - the endpoint is not an absolute http(s) URL
    pub fn new(endpoint: &str) -> Result<Self> {
        let url = Url::parse(endpoint).map_err(|e| ClientError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ClientError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        let http = reqwest::Client::builder().build()?;

        Ok(Self {
            endpoint: url,
            http,
            credential: RwLock::new(None),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Replaces the held credential; `None` clears it.
    pub fn set_credential(&self, token: Option<String>) {
        *self
            .credential
            .write()
            .unwrap_or_else(PoisonError::into_inner) = token;
    }

    pub fn current_credential(&self) -> Option<String> {
        self.credential
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Submits `request` in exactly one POST and parses the response.
    ///
    /// # Errors
    ///
    /// * `InvalidRequest` - the command sequence is empty (no I/O is done)
    /// * `Transport` - the exchange or the body read failed (a failed error
    ///   body read on 401/403 still clears the credential)
    /// * `Protocol` - non-2xx status; 401/403 also clears the credential
    /// * `MalformedResponse` - the body violates the `json`/`blobs` contract
    pub async fn submit(&self, request: QueryRequest) -> Result<QueryResponse> {
        self.send(request, None).await
    }

    /// Same as [`submit`](Self::submit), with `deadline` handed to the
    /// transport. Expiry surfaces as `Transport`.
    pub async fn submit_with_deadline(
        &self,
        request: QueryRequest,
        deadline: Duration,
    ) -> Result<QueryResponse> {
        self.send(request, Some(deadline)).await
    }

    async fn send(
        &self,
        request: QueryRequest,
        deadline: Option<Duration>,
    ) -> Result<QueryResponse> {
        let query = request.encode_commands()?;

        // Snapshot: later set_credential calls must not affect this request
        let credential = self.current_credential();

        let command_count = request.commands.len();
        let attachment_count = request.attachments.len();

        let mut form = Form::new().text(QUERY_FIELD, query);
        for attachment in request.attachments {
            form = form.part(BLOBS_FIELD, Part::bytes(attachment).file_name(BLOBS_FIELD));
        }

        let mut builder = self.http.post(self.endpoint.clone()).multipart(form);
        if let Some(token) = &credential {
            builder = builder.bearer_auth(token);
        }
        if let Some(deadline) = deadline {
            builder = builder.timeout(deadline);
        }

        debug!(
            "POST {} ({} command(s), {} attachment(s), authorized: {})",
            self.endpoint,
            command_count,
            attachment_count,
            credential.is_some()
        );

        let response = builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            // Clear only once the read has completed or failed; a dropped
            // future must leave the credential untouched
            let body = response.text().await;
            if is_auth_failure(status.as_u16()) {
                self.clear_credential_if(credential.as_deref());
            }
            return Err(ClientError::Protocol {
                status: status.as_u16(),
                body: body?,
            });
        }

        let body = response.bytes().await?;
        let parsed = QueryResponse::from_body(&body)?;

        debug!(
            "Response {} ({} bytes, {} blob(s))",
            status,
            body.len(),
            parsed.blobs.len()
        );

        Ok(parsed)
    }

    /// Clears the credential only while it is still the one that was rejected.
    fn clear_credential_if(&self, rejected: Option<&str>) {
        let mut held = self
            .credential
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if held.is_some() && held.as_deref() == rejected {
            *held = None;
        }
    }
}
