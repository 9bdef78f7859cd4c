//! HTTP client for the license server.
//!
//! Talks to two endpoints, `POST /v1/validate` and `POST /v1/activate`.
//! Non-success responses are decoded and mapped to semantic errors; see
//! [`crate::error_map`].

use crate::error::{LicenseError, LicenseResult};
use crate::error_map::{map_server_error, parse_error_response};
use crate::types::{ActivateRequest, ActivationRecord, ValidateRequest, ValidateResult};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use warden_types::CallContext;

/// Response bodies beyond this size are truncated.
pub const MAX_RESPONSE_BYTES: usize = 1 << 20;

const VALIDATE_PATH: &str = "/v1/validate";
const ACTIVATE_PATH: &str = "/v1/activate";

/// License server client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the license server (e.g. `https://license.example.com`).
    pub server_url: String,
    /// API key sent as `X-API-Key`.
    pub api_key: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// `User-Agent` header value.
    pub user_agent: String,
    /// Default fingerprint for requests that carry none.
    pub fingerprint: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            api_key: String::new(),
            timeout_secs: 10,
            user_agent: concat!("warden-license-rs/", env!("CARGO_PKG_VERSION")).to_string(),
            fingerprint: None,
        }
    }
}

impl ClientConfig {
    /// Configuration for `server_url` with an API key and defaults otherwise.
    #[must_use]
    pub fn new(server_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Per-request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

/// Client for the license server API.
#[derive(Debug, Clone)]
pub struct OnlineClient {
    base_url: String,
    api_key: String,
    user_agent: String,
    timeout: Duration,
    fingerprint: Option<String>,
    http: Client,
}

impl OnlineClient {
    /// Creates a client with its own HTTP connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::Config`] if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> LicenseResult<Self> {
        let http = Client::builder()
            .build()
            .map_err(|e| LicenseError::Config(format!("build HTTP client: {e}")))?;
        Ok(Self::with_http_client(config, http))
    }

    /// Creates a client on top of a caller-supplied HTTP client.
    ///
    /// The configured timeout is applied to every request, so it holds
    /// regardless of how `http` was built.
    #[must_use]
    pub fn with_http_client(config: ClientConfig, http: Client) -> Self {
        let timeout = config.timeout();
        Self {
            base_url: config.server_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            user_agent: config.user_agent,
            timeout,
            fingerprint: config.fingerprint.filter(|fp| !fp.is_empty()),
            http,
        }
    }

    /// The default fingerprint configured for this client, if any.
    #[must_use]
    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    /// Checks whether a license is valid.
    ///
    /// `valid: false` in the result is a normal outcome, not an error.
    ///
    /// # Errors
    ///
    /// Returns a semantic error for mapped server responses, a transport
    /// error for network or decoding failures, and
    /// [`LicenseError::Interrupted`] if `ctx` ends first.
    pub async fn validate(
        &self,
        ctx: &CallContext,
        mut req: ValidateRequest,
    ) -> LicenseResult<ValidateResult> {
        if req.fingerprint.as_deref().is_none_or(str::is_empty) {
            req.fingerprint = self.fingerprint.clone();
        }
        self.post(ctx, VALIDATE_PATH, &req).await
    }

    /// Activates a machine against a license.
    ///
    /// # Errors
    ///
    /// Same as [`OnlineClient::validate`]; a full license yields
    /// [`LicenseError::ActivationLimit`].
    pub async fn activate(
        &self,
        ctx: &CallContext,
        mut req: ActivateRequest,
    ) -> LicenseResult<ActivationRecord> {
        if req.fingerprint.is_empty() {
            if let Some(fp) = &self.fingerprint {
                req.fingerprint = fp.clone();
            }
        }
        let envelope: DataEnvelope<ActivationRecord> = self.post(ctx, ACTIVATE_PATH, &req).await?;
        Ok(envelope.data)
    }

    async fn post<B, T>(&self, ctx: &CallContext, path: &str, body: &B) -> LicenseResult<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        ctx.run(self.send(path, body)).await?
    }

    async fn send<B, T>(&self, path: &str, body: &B) -> LicenseResult<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);
        debug!(%path, "license server request");

        let mut response = self
            .http
            .post(&url)
            .timeout(self.timeout)
            .header("X-API-Key", &self.api_key)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .json(body)
            .send()
            .await
            .map_err(|e| LicenseError::Network(format!("POST {path}: {e}")))?;

        let status = response.status();
        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| LicenseError::Network(format!("read response: {e}")))?
        {
            let room = MAX_RESPONSE_BYTES - bytes.len();
            if chunk.len() >= room {
                bytes.extend_from_slice(&chunk[..room]);
                break;
            }
            bytes.extend_from_slice(&chunk);
        }
        debug!(%path, status = status.as_u16(), bytes = bytes.len(), "license server response");

        if !status.is_success() {
            return Err(map_server_error(parse_error_response(status.as_u16(), &bytes)));
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| LicenseError::MalformedResponse(format!("decode {path} response: {e}")))
    }
}
