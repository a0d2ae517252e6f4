use crate::constants::{env, network};
use crate::errors::ToolError;
use crate::services::config::{ApiToken, IspwConfig};
use crate::services::logger::Logger;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpVerb {
    Get,
    Post,
    Put,
}

impl HttpVerb {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpVerb::Get => "GET",
            HttpVerb::Post => "POST",
            HttpVerb::Put => "PUT",
        }
    }

    fn method(self) -> reqwest::Method {
        match self {
            HttpVerb::Get => reqwest::Method::GET,
            HttpVerb::Post => reqwest::Method::POST,
            HttpVerb::Put => reqwest::Method::PUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamRequest {
    pub verb: HttpVerb,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamBody {
    Json(Value),
    Text(String),
    Empty,
}

impl UpstreamBody {
    pub fn parse(bytes: &[u8], content_type: Option<&str>) -> Self {
        let text = String::from_utf8_lossy(bytes);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return UpstreamBody::Empty;
        }
        let looks_json = content_type
            .map(|ct| ct.to_lowercase().contains("json"))
            .unwrap_or(false)
            || trimmed.starts_with('{')
            || trimmed.starts_with('[');
        if looks_json {
            if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
                return UpstreamBody::Json(value);
            }
        }
        UpstreamBody::Text(text.into_owned())
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            UpstreamBody::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            UpstreamBody::Json(value) => value.clone(),
            UpstreamBody::Text(text) => Value::String(text.clone()),
            UpstreamBody::Empty => Value::Null,
        }
    }

    pub fn raw_text(&self) -> String {
        match self {
            UpstreamBody::Json(value) => value.to_string(),
            UpstreamBody::Text(text) => text.clone(),
            UpstreamBody::Empty => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamResult {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: UpstreamBody,
}

impl UpstreamResult {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues one upstream call. Implementations never interpret the status code.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &UpstreamRequest) -> Result<UpstreamResult, ToolError>;
}

pub struct HttpTransport {
    base_url: Url,
    token: ApiToken,
    client: Client,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url.as_str())
            .field("token", &self.token)
            .finish()
    }
}

impl HttpTransport {
    pub fn new(config: &IspwConfig, logger: &Logger) -> Result<Self, ToolError> {
        let mut builder = Client::builder()
            .user_agent(network::USER_AGENT)
            .connect_timeout(Duration::from_millis(network::TIMEOUT_CONNECTION_MS))
            .pool_idle_timeout(Duration::from_millis(network::POOL_IDLE_TIMEOUT_MS))
            .timeout(config.timeout);
        if config.insecure_tls {
            logger.warn(
                "TLS certificate verification is disabled for the upstream connection",
                Some(&serde_json::json!({ "base_url": config.base_url.as_str() })),
            );
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder.build().map_err(|err| {
            ToolError::connection(format!("Failed to build HTTP client: {}", err))
        })?;
        Ok(Self {
            base_url: config.base_url.clone(),
            token: config.token.clone(),
            client,
        })
    }

    fn build_url(&self, request: &UpstreamRequest) -> Result<Url, ToolError> {
        let mut url = self.base_url.join(&request.path).map_err(|err| {
            ToolError::invalid_field(
                "path",
                "url",
                format!("Invalid request path '{}': {}", request.path, err),
            )
        })?;
        if !request.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &request.query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &UpstreamRequest) -> Result<UpstreamResult, ToolError> {
        if self.token.is_empty() {
            return Err(ToolError::authentication("No API token is configured")
                .with_hint(format!(
                    "Set {} to a valid access token and restart the server.",
                    env::API_TOKEN
                )));
        }
        let url = self.build_url(request)?;

        let mut builder = self
            .client
            .request(request.verb.method(), url)
            .timeout(request.timeout)
            .bearer_auth(self.token.expose())
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(body) = request.body.as_ref() {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let mut headers = BTreeMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_string(), value.to_string());
            }
        }
        let bytes = response.bytes().await.map_err(map_reqwest_error)?;
        let body = UpstreamBody::parse(
            &bytes,
            headers.get("content-type").map(String::as_str),
        );
        Ok(UpstreamResult {
            status,
            headers,
            body,
        })
    }
}

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> ToolError {
    if err.is_timeout() {
        return ToolError::timeout("Request to the ISPW service timed out")
            .with_hint("The service may be busy; try again or raise ISPW_TIMEOUT.");
    }
    let detail = if err.is_connect() {
        "could not connect to the ISPW service"
    } else {
        "the connection to the ISPW service failed"
    };
    ToolError::connection(format!("Network error: {} ({})", detail, err.without_url()))
        .with_hint("Check ISPW_BASE_URL (or CES_HOST/CES_PORT), DNS and TLS settings.")
}

#[derive(Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
    default_timeout: Duration,
    logger: Logger,
}

impl fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

impl RequestExecutor {
    pub fn new(transport: Arc<dyn Transport>, default_timeout: Duration, logger: Logger) -> Self {
        Self {
            transport,
            default_timeout,
            logger: logger.child("executor"),
        }
    }

    pub fn from_config(config: &IspwConfig, logger: Logger) -> Result<Self, ToolError> {
        let transport = HttpTransport::new(config, &logger)?;
        Ok(Self::new(Arc::new(transport), config.timeout, logger))
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub async fn execute(
        &self,
        verb: HttpVerb,
        path: &str,
        query: Vec<(String, String)>,
        body: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<UpstreamResult, ToolError> {
        let request = UpstreamRequest {
            verb,
            path: path.to_string(),
            query,
            body,
            timeout: timeout.unwrap_or(self.default_timeout),
        };
        self.send(&request).await
    }

    pub async fn send(&self, request: &UpstreamRequest) -> Result<UpstreamResult, ToolError> {
        let started = Instant::now();
        self.logger.debug(
            "upstream request",
            Some(&serde_json::json!({
                "verb": request.verb.as_str(),
                "path": request.path,
                "query": request.query.len(),
                "body": request.body.is_some(),
            })),
        );
        let outcome = match tokio::time::timeout(request.timeout, self.transport.send(request)).await
        {
            Ok(result) => result,
            Err(_) => Err(ToolError::timeout(format!(
                "Request to the ISPW service timed out after {} ms",
                request.timeout.as_millis()
            ))
            .with_hint("The service may be busy; try again or raise ISPW_TIMEOUT.")),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            Ok(result) => self.logger.debug(
                "upstream response",
                Some(&serde_json::json!({
                    "path": request.path,
                    "status": result.status,
                    "duration_ms": elapsed_ms,
                })),
            ),
            Err(err) => self.logger.warn(
                "upstream call failed",
                Some(&serde_json::json!({
                    "path": request.path,
                    "category": err.category.as_str(),
                    "duration_ms": elapsed_ms,
                })),
            ),
        }
        outcome
    }
}
