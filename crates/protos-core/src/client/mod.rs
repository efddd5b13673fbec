//! REST client for the host API
//!
//! Every call goes through [`ProtosClient::execute`], which:
//!
//! - attaches the `Appid` identity header
//! - sends the request and reads the full response body
//! - returns the body on a 2xx status
//! - otherwise decodes `{"error": "..."}` from the body, falling back to the
//!   raw body text
//!
//! There is no retry and no partial success: a request either fully succeeds
//! with its payload or fully fails.

mod api;

pub use api::{AppInfo, UserInfo};
pub use reqwest::Method;

use crate::config::{APP_ID_HEADER, ProtosConfig};
use crate::error::{Error, Result};
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use tracing::debug;

/// Error body returned by the host
#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Decode the `error` field of a host error body
///
/// Returns `None` when the body is not a JSON object with a string `error`
/// field.
pub fn decode_error(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .map(|body| body.error)
}

/// Classify a response as payload or application error
pub fn classify_response(status: u16, body: &[u8]) -> Result<Vec<u8>> {
    if (200..300).contains(&status) {
        return Ok(body.to_vec());
    }

    let message =
        decode_error(body).unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string());
    Err(Error::Api { status, message })
}

/// Client for the host REST API
///
/// Cloning is cheap; clones share the underlying connection pool.
#[derive(Clone)]
pub struct ProtosClient {
    /// Base URL with a trailing slash
    base_url: String,

    /// App identity token
    /// ⚠️ NEVER log this value
    app_id: String,

    /// HTTP client for API requests
    http: reqwest::Client,
}

// Custom Debug implementation that hides the app ID
impl fmt::Debug for ProtosClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtosClient")
            .field("base_url", &self.base_url)
            .field("app_id", &"<REDACTED>")
            .finish()
    }
}

impl ProtosClient {
    /// Create a client from configuration
    pub fn new(config: &ProtosConfig) -> Result<Self> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self::with_http_client(config.api_base(), config.app_id.clone(), http))
    }

    /// Create a client around an existing `reqwest::Client`
    pub fn with_http_client(
        base_url: impl Into<String>,
        app_id: impl Into<String>,
        http: reqwest::Client,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: format!("{}/", base_url.trim_end_matches('/')),
            app_id: app_id.into(),
            http,
        }
    }

    /// Base URL requests are resolved against
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send one authenticated request and return the response body
    ///
    /// # Parameters
    ///
    /// - `method`: HTTP verb
    /// - `path`: Path relative to the base URL (e.g. `resource/abc`)
    /// - `body`: Optional JSON body
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<u8>)`: The body of a 2xx response
    /// - `Err(Error::Api)`: Non-success status with the decoded message
    /// - `Err(Error::Http)`: The request could not be sent or read
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Vec<u8>> {
        let url = format!("{}{}", self.base_url, path.trim_start_matches('/'));
        debug!("{} {}", method, url);

        let mut request = self
            .http
            .request(method.clone(), &url)
            .header(APP_ID_HEADER, &self.app_id);

        if let Some(body) = body {
            request = request.header(CONTENT_TYPE, "application/json").body(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::http(format!("{} {} failed: {}", method, path, e)))?;

        let status = response.status();
        let payload = response
            .bytes()
            .await
            .map_err(|e| Error::http(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            debug!("{} {} returned {}", method, path, status);
        }

        classify_response(status.as_u16(), &payload)
    }

    /// Send a request with an optional JSON body and decode a JSON response
    pub(crate) async fn execute_json<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = body.map(serde_json::to_vec).transpose()?;
        let payload = self.execute(method, path, body).await?;
        Ok(serde_json::from_slice(&payload)?)
    }
}
