use std::fmt;
use std::time::Duration;

use engine_logging::engine_debug;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use serde_json::json;

use crate::extract::{code_from_text, code_from_url, extract_code};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct TransportSettings {
    /// Endpoint that receives `{"email", "operator"}` and answers with a code.
    pub endpoint: String,
    /// Page fetched when the endpoint's answer carries no code.
    pub thanks_url: Option<String>,
    pub referer: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
    pub accept_language: String,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            thanks_url: None,
            referer: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(15),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: "it-IT,it;q=0.9,en-US;q=0.8,en;q=0.7".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    InvalidHeader,
    HttpStatus(u16),
    Timeout,
    Network,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::InvalidHeader => write!(f, "invalid header value"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Network => write!(f, "network error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: FailureKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// One request-response exchange against the remote endpoint.
///
/// `Ok(None)` means the exchange worked but carried no code.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn attempt(&self, identity: &str, operator: &str)
        -> Result<Option<String>, TransportError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    settings: TransportSettings,
    endpoint: reqwest::Url,
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(settings: TransportSettings) -> Result<Self, TransportError> {
        let endpoint = reqwest::Url::parse(&settings.endpoint)
            .map_err(|err| TransportError::new(FailureKind::InvalidUrl, err.to_string()))?;
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .default_headers(build_headers(&settings)?)
            .build()
            .map_err(|err| TransportError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self {
            settings,
            endpoint,
            client,
        })
    }

    /// Last resort: the thanks page may redirect to a URL carrying the code.
    async fn check_thanks_page(&self) -> Option<String> {
        let url = self.settings.thanks_url.as_deref()?;
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(err) => {
                engine_debug!("thanks page fetch failed: {}", err);
                return None;
            }
        };
        let final_url = response.url().to_string();
        if let Some(code) = code_from_url(&final_url) {
            return Some(code);
        }
        let body = response.text().await.ok()?;
        code_from_text(&body)
    }
}

fn build_headers(settings: &TransportSettings) -> Result<HeaderMap, TransportError> {
    let invalid = |err: reqwest::header::InvalidHeaderValue| {
        TransportError::new(FailureKind::InvalidHeader, err.to_string())
    };
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_str(&settings.user_agent).map_err(invalid)?);
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/json, text/plain, */*"),
    );
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_str(&settings.accept_language).map_err(invalid)?,
    );
    if let Some(referer) = settings.referer.as_deref() {
        headers.insert(REFERER, HeaderValue::from_str(referer).map_err(invalid)?);
    }
    Ok(headers)
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn attempt(
        &self,
        identity: &str,
        operator: &str,
    ) -> Result<Option<String>, TransportError> {
        let payload = json!({ "email": identity, "operator": operator });
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&payload)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        let body = response.text().await.map_err(map_reqwest_error)?;
        engine_debug!(
            "{} -> {} body={}",
            identity,
            status,
            body.chars().take(300).collect::<String>()
        );

        if let Some(code) = extract_code(&body) {
            return Ok(Some(code));
        }
        Ok(self.check_thanks_page().await)
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::new(FailureKind::Timeout, err.to_string());
    }
    TransportError::new(FailureKind::Network, err.to_string())
}
