//! Login-then-act client for the remote playback endpoint
//!
//! Two calls: POST `<login_url>/login` with JSON credentials returning a
//! bearer token, then GET `<action_url>/play/<action_id>/<action_index>`.
//! The token is cached after the first successful login and is never
//! refreshed on 401; `reset` drops it.
//!
//! In simulation mode no I/O happens: login returns `SIMULATION_TOKEN` and the
//! action sleeps for the configured delay.

use crate::infra::config::Config;
use crate::io::retry::{Exhausted, RetryPolicy};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

/// Token returned by login in simulation mode
pub const SIMULATION_TOKEN: &str = "debug_token";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    #[error("transport failed after {attempts} attempt(s): {message}")]
    Transport { attempts: u32, message: String },
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl<E: std::fmt::Display> From<Exhausted<E>> for CallError {
    fn from(e: Exhausted<E>) -> Self {
        CallError::Transport { attempts: e.attempts, message: e.last.to_string() }
    }
}

/// The two remote calls the dispatch worker drives.
///
/// Implementations are owned by exactly one worker, hence `&mut self`.
#[async_trait]
pub trait RemoteAction: Send {
    /// Obtain a bearer token, reusing a cached one when present
    async fn authenticate(&mut self) -> Result<String, CallError>;

    /// Trigger the configured action with `token`
    async fn perform_action(&mut self, token: &str) -> Result<(), CallError>;

    /// Forget any cached credentials
    fn reset(&mut self);
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

enum Mode {
    Simulation { delay: Duration },
    Http(HttpEndpoint),
}

struct HttpEndpoint {
    client: reqwest::Client,
    login_url: String,
    play_url: String,
    username: String,
    password: String,
    retry: RetryPolicy,
}

pub struct ActionClient {
    mode: Mode,
    token: Option<String>,
}

impl ActionClient {
    /// Build a client from config. Fails only if the HTTP client cannot be
    /// constructed (TLS backend initialisation).
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let mode = if config.simulation() {
            Mode::Simulation { delay: config.simulation_delay() }
        } else {
            // Create HTTP client once for reuse (connection pooling)
            let client = reqwest::Client::builder()
                .timeout(config.request_timeout())
                .danger_accept_invalid_certs(config.accept_invalid_certs())
                .build()?;
            Mode::Http(HttpEndpoint {
                client,
                login_url: format!("{}/login", config.login_url()),
                play_url: format!(
                    "{}/play/{}/{}",
                    config.action_url(),
                    config.action_id(),
                    config.action_index()
                ),
                username: config.username().to_string(),
                password: config.password().to_string(),
                retry: RetryPolicy::new(config.retry_count(), config.retry_delay()),
            })
        };

        Ok(Self { mode, token: None })
    }

    #[inline]
    pub fn is_simulation(&self) -> bool {
        matches!(self.mode, Mode::Simulation { .. })
    }

    #[inline]
    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    async fn login(endpoint: &HttpEndpoint) -> Result<String, CallError> {
        let body = LoginRequest { username: &endpoint.username, password: &endpoint.password };

        let response = endpoint
            .retry
            .run("login", |_| endpoint.client.post(&endpoint.login_url).json(&body).send())
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(CallError::Status(status.as_u16()));
        }

        response
            .json::<LoginResponse>()
            .await
            .map(|r| r.token)
            .map_err(|e| CallError::MalformedResponse(e.to_string()))
    }

    async fn play(endpoint: &HttpEndpoint, token: &str) -> Result<(), CallError> {
        let response = endpoint
            .retry
            .run("play", |_| endpoint.client.get(&endpoint.play_url).bearer_auth(token).send())
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(CallError::Status(status.as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteAction for ActionClient {
    async fn authenticate(&mut self) -> Result<String, CallError> {
        if let Some(token) = &self.token {
            return Ok(token.clone());
        }

        let start = Instant::now();
        let token = match &self.mode {
            Mode::Simulation { .. } => SIMULATION_TOKEN.to_string(),
            Mode::Http(endpoint) => Self::login(endpoint).await?,
        };

        info!(
            latency_ms = %start.elapsed().as_millis(),
            simulation = %self.is_simulation(),
            "remote_login"
        );
        self.token = Some(token.clone());
        Ok(token)
    }

    async fn perform_action(&mut self, token: &str) -> Result<(), CallError> {
        let start = Instant::now();
        match &self.mode {
            Mode::Simulation { delay } => tokio::time::sleep(*delay).await,
            Mode::Http(endpoint) => Self::play(endpoint, token).await?,
        }

        info!(
            latency_ms = %start.elapsed().as_millis(),
            simulation = %self.is_simulation(),
            "remote_action"
        );
        Ok(())
    }

    fn reset(&mut self) {
        if self.token.take().is_some() {
            debug!("remote_token_cleared");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_config() -> Config {
        // Port 1 on loopback refuses connections immediately
        Config::default()
            .with_simulation(false)
            .with_endpoints("http://127.0.0.1:1", "http://127.0.0.1:1")
            .with_retry(2, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_simulation_login_returns_fixed_token() {
        let mut client = ActionClient::new(&Config::default()).unwrap();
        assert!(client.is_simulation());

        let start = Instant::now();
        let token = client.authenticate().await.unwrap();
        assert_eq!(token, SIMULATION_TOKEN);
        assert!(client.has_token());
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_simulation_action_sleeps_configured_delay() {
        let config = Config::default().with_simulation_delay(Duration::from_millis(30));
        let mut client = ActionClient::new(&config).unwrap();

        let start = Instant::now();
        client.perform_action(SIMULATION_TOKEN).await.unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(30));
        assert!(elapsed < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_reset_clears_cached_token() {
        let mut client = ActionClient::new(&Config::default()).unwrap();
        client.authenticate().await.unwrap();
        client.reset();
        assert!(!client.has_token());
    }

    #[tokio::test]
    async fn test_login_transport_failure_is_retried_then_reported() {
        let mut client = ActionClient::new(&unreachable_config()).unwrap();
        let err = client.authenticate().await.unwrap_err();
        assert!(matches!(err, CallError::Transport { attempts: 2, .. }), "{err:?}");
        assert!(!client.has_token());
    }

    #[tokio::test]
    async fn test_action_transport_failure() {
        let mut client = ActionClient::new(&unreachable_config()).unwrap();
        let err = client.perform_action("t").await.unwrap_err();
        assert!(matches!(err, CallError::Transport { attempts: 2, .. }));
    }

    #[test]
    fn test_exhausted_converts_to_transport() {
        let err: CallError = Exhausted { attempts: 3, last: "refused" }.into();
        assert_eq!(err, CallError::Transport { attempts: 3, message: "refused".to_string() });
    }
}
