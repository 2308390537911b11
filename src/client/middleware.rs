//! # Client Middleware
//!
//! Caller-side session orchestration layered on top of [`QueryClient`].
//!
//! ## Responsibilities
//!
//! The [`ClientMiddleware`] struct is the "caller" that inspects responses and
//! drives the credential explicitly:
//! - **Authentication**: sends an `Authenticate` command and installs the
//!   returned session token with `set_credential`
//! - **Refresh**: exchanges the refresh token for a new session once the
//!   current one is about to expire
//! - **Status checks**: turns a failing command status into an error
//! - **Bookkeeping**: keeps the last response and how long it took
//!
//! It never retries; a failed query is returned as-is.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let client = Arc::new(QueryClient::new(&config.server.endpoint())?);
//! let mut middleware = ClientMiddleware::new(client);
//!
//! middleware.authenticate("admin", "admin", "").await?;
//! let response = middleware
//!     .query(QueryRequest::new(vec![json!({"FindImage": {"uniqueids": true}})]))
//!     .await?;
//! ```

use log::{debug, info};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::client::client::QueryClient;
use crate::common::error::{ClientError, Result};
use crate::common::messages::{QueryRequest, QueryResponse};

/// Sessions are refreshed this long before their advertised expiry.
const SESSION_EXPIRY_OFFSET: Duration = Duration::from_secs(10);

/// Tokens issued by an `Authenticate` or `RefreshToken` command.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_token: String,
    pub refresh_token: String,
    /// Lifetime of the session token; zero when the server did not say
    pub session_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub started: Instant,
}

impl Session {
    /// Reads the session fields out of a command result body.
    ///
    /// `command` is the name the body was found under, used in errors.
    pub fn from_result(command: &str, body: &Value) -> Result<Self> {
        let status = body.get("status").and_then(Value::as_i64).unwrap_or(0);
        if status != 0 {
            return Err(ClientError::Command {
                command: command.to_string(),
                status,
                info: info_of(body),
            });
        }

        let session_token = body
            .get("session_token")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ClientError::MalformedResponse(format!("{} result has no session_token", command))
            })?
            .to_string();

        let refresh_token = body
            .get("refresh_token")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let ttl = |field: &str| Duration::from_secs(body.get(field).and_then(Value::as_u64).unwrap_or(0));

        Ok(Self {
            session_token,
            refresh_token,
            session_token_ttl: ttl("session_token_expires_in"),
            refresh_token_ttl: ttl("refresh_token_expires_in"),
            started: Instant::now(),
        })
    }

    /// False once the session token is within the expiry offset of its TTL.
    pub fn valid(&self) -> bool {
        if self.session_token_ttl.is_zero() {
            return true;
        }
        self.started.elapsed() + SESSION_EXPIRY_OFFSET < self.session_token_ttl
    }
}

/// Session-aware wrapper around a shared [`QueryClient`].
pub struct ClientMiddleware {
    client: Arc<QueryClient>,
    session: Option<Session>,
    last_response: Option<QueryResponse>,
    last_query_time: Duration,
    /// Deadline applied to every query, if any
    deadline: Option<Duration>,
}

impl ClientMiddleware {
    pub fn new(client: Arc<QueryClient>) -> Self {
        Self {
            client,
            session: None,
            last_response: None,
            last_query_time: Duration::ZERO,
            deadline: None,
        }
    }

    /// Applies `deadline` to every query sent through this middleware.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn client(&self) -> &Arc<QueryClient> {
        &self.client
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn last_response(&self) -> Option<&QueryResponse> {
        self.last_response.as_ref()
    }

    pub fn last_query_time(&self) -> Duration {
        self.last_query_time
    }

    /// Authenticates with either `password` or `token` (password wins when
    /// both are given) and installs the resulting session token.
    ///
    /// # Errors
    ///
    /// * `InvalidRequest` - neither password nor token was supplied
    /// * `Command` - the server reported a non-zero status
    /// * any error of [`QueryClient::submit`]
    pub async fn authenticate(&mut self, username: &str, password: &str, token: &str) -> Result<()> {
        let mut body = json!({ "username": username });
        if !password.is_empty() {
            body["password"] = json!(password);
        } else if !token.is_empty() {
            body["token"] = json!(token);
        } else {
            return Err(ClientError::InvalidRequest(
                "either password or token must be specified for authentication".to_string(),
            ));
        }

        let session = self.exchange("Authenticate", body).await?;
        info!("Authenticated as '{}'", username);
        self.install(session);
        Ok(())
    }

    /// Exchanges the held refresh token for a new session.
    pub async fn refresh(&mut self) -> Result<()> {
        let refresh_token = self
            .session
            .as_ref()
            .map(|session| session.refresh_token.clone())
            .ok_or(ClientError::NotAuthenticated)?;

        let session = self
            .exchange("RefreshToken", json!({ "refresh_token": refresh_token }))
            .await?;
        debug!("Session refreshed");
        self.install(session);
        Ok(())
    }

    /// Forgets the session and clears the client's credential.
    pub fn logout(&mut self) {
        self.session = None;
        self.client.set_credential(None);
    }

    /// Submits `request`, refreshing the session first if it is about to expire.
    ///
    /// # Errors
    ///
    /// * `Command` - the first command reported a negative status
    /// * any error of [`QueryClient::submit`]; on 401/403 the session is dropped
    pub async fn query(&mut self, request: QueryRequest) -> Result<QueryResponse> {
        if self.session.as_ref().is_some_and(|session| !session.valid()) {
            self.refresh().await?;
        }

        let response = self.submit(request).await?;
        self.last_response = Some(response.clone());

        if !response.is_ok() {
            let (command, info) = response
                .command(0)
                .map(|(name, body)| (name.to_string(), info_of(body)))
                .unwrap_or_default();
            return Err(ClientError::Command {
                command,
                status: response.status(),
                info,
            });
        }

        Ok(response)
    }

    async fn submit(&mut self, request: QueryRequest) -> Result<QueryResponse> {
        let start = Instant::now();
        let result = match self.deadline {
            Some(deadline) => self.client.submit_with_deadline(request, deadline).await,
            None => self.client.submit(request).await,
        };
        self.last_query_time = start.elapsed();

        if let Err(e) = &result {
            if e.is_unauthorized() && self.client.current_credential().is_none() {
                self.session = None;
            }
        }
        result
    }

    async fn exchange(&mut self, command: &str, body: Value) -> Result<Session> {
        let mut wrapper = Map::new();
        wrapper.insert(command.to_string(), body);
        let response = self
            .submit(QueryRequest::new(vec![Value::Object(wrapper)]))
            .await?;

        let result = response.result(0, command).ok_or_else(|| {
            ClientError::MalformedResponse(format!("response has no {} result", command))
        })?;
        let session = Session::from_result(command, result)?;

        self.last_response = Some(response);
        Ok(session)
    }

    fn install(&mut self, session: Session) {
        self.client
            .set_credential(Some(session.session_token.clone()));
        self.session = Some(session);
    }
}

fn info_of(body: &Value) -> String {
    body.get("info")
        .and_then(Value::as_str)
        .unwrap_or("no details")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_from_authenticate_result() {
        let body = json!({
            "status": 0,
            "session_token": "st",
            "refresh_token": "rt",
            "session_token_expires_in": 3600,
            "refresh_token_expires_in": 86400
        });

        let session = Session::from_result("Authenticate", &body).unwrap();

        assert_eq!(session.session_token, "st");
        assert_eq!(session.refresh_token, "rt");
        assert_eq!(session.session_token_ttl, Duration::from_secs(3600));
        assert_eq!(session.refresh_token_ttl, Duration::from_secs(86400));
        assert!(session.valid());
    }

    #[test]
    fn test_session_failure_status() {
        let body = json!({"status": -1, "info": "wrong password"});

        match Session::from_result("Authenticate", &body) {
            Err(ClientError::Command { command, status, info }) => {
                assert_eq!(command, "Authenticate");
                assert_eq!(status, -1);
                assert_eq!(info, "wrong password");
            }
            other => panic!("unexpected result: {:?}", other.map(|s| s.session_token)),
        }
    }

    #[test]
    fn test_session_without_token_is_malformed() {
        let err = Session::from_result("Authenticate", &json!({"status": 0})).unwrap_err();
        assert!(matches!(err, ClientError::MalformedResponse(_)));
    }

    #[test]
    fn test_session_expiry() {
        let mut session = Session::from_result("RefreshToken", &json!({"session_token": "st"})).unwrap();
        assert!(session.session_token_ttl.is_zero());
        assert!(session.valid());

        // Inside the expiry offset counts as expired
        session.session_token_ttl = Duration::from_secs(5);
        assert!(!session.valid());
    }

    #[tokio::test]
    async fn test_authenticate_requires_secret() {
        let client = Arc::new(QueryClient::new("http://127.0.0.1:9/api/").unwrap());
        let mut middleware = ClientMiddleware::new(client);

        let err = middleware.authenticate("admin", "", "").await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidRequest(_)));
        assert!(middleware.session().is_none());
    }

    #[tokio::test]
    async fn test_refresh_without_session() {
        let client = Arc::new(QueryClient::new("http://127.0.0.1:9/api/").unwrap());
        let mut middleware = ClientMiddleware::new(client);

        assert!(matches!(
            middleware.refresh().await,
            Err(ClientError::NotAuthenticated)
        ));
    }

    #[test]
    fn test_logout_clears_credential() {
        let client = Arc::new(QueryClient::new("http://127.0.0.1:9/api/").unwrap());
        client.set_credential(Some("st".to_string()));

        let mut middleware = ClientMiddleware::new(client.clone());
        middleware.logout();

        assert_eq!(client.current_credential(), None);
    }
}
