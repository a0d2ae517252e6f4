use crate::constants::{defaults, env, network, protocols::ALLOWED_HTTP};
use crate::errors::ToolError;
use std::fmt;
use std::time::Duration;
use url::Url;

#[derive(Clone, Default)]
pub struct ApiToken(String);

impl ApiToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into().trim().to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "ApiToken(<unset>)")
        } else {
            write!(f, "ApiToken(<redacted>)")
        }
    }
}

#[derive(Debug, Clone)]
pub struct IspwConfig {
    pub base_url: Url,
    pub token: ApiToken,
    pub default_srid: String,
    pub timeout: Duration,
    pub insecure_tls: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub default_srid: Option<String>,
    pub timeout_secs: Option<u64>,
    pub insecure_tls: bool,
}

impl IspwConfig {
    pub fn from_env() -> Result<Self, ToolError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ToolError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let base_url = match read(env::BASE_URL) {
            Some(raw) => parse_base_url(&raw, env::BASE_URL)?,
            None => {
                let host = read(env::CES_HOST)
                    .unwrap_or_else(|| network::DEFAULT_CES_HOST.to_string());
                let port = match read(env::CES_PORT) {
                    Some(raw) => raw.parse::<u16>().ok().filter(|p| *p > 0).ok_or_else(|| {
                        ToolError::invalid_field(
                            env::CES_PORT,
                            "port",
                            format!("{} must be a port number between 1 and 65535", env::CES_PORT),
                        )
                    })?,
                    None => network::DEFAULT_CES_PORT,
                };
                parse_base_url(&format!("https://{}:{}", host, port), env::CES_HOST)?
            }
        };

        let timeout_secs = match read(env::TIMEOUT) {
            Some(raw) => parse_timeout_secs(&raw)?,
            None => network::TIMEOUT_API_REQUEST_SECS,
        };

        Ok(Self {
            base_url,
            token: ApiToken::new(read(env::API_TOKEN).unwrap_or_default()),
            default_srid: read(env::DEFAULT_SRID).unwrap_or_else(|| defaults::SRID.to_string()),
            timeout: Duration::from_secs(timeout_secs),
            insecure_tls: read(env::INSECURE_TLS)
                .map(|v| is_truthy(&v))
                .unwrap_or(false),
        })
    }

    pub fn apply_overrides(mut self, overrides: ConfigOverrides) -> Result<Self, ToolError> {
        if let Some(raw) = overrides.base_url {
            self.base_url = parse_base_url(&raw, "--base-url")?;
        }
        if let Some(srid) = overrides.default_srid.map(|s| s.trim().to_string()) {
            if srid.is_empty() {
                return Err(ToolError::invalid_field(
                    "--default-srid",
                    "min_length",
                    "--default-srid must be a non-empty string",
                ));
            }
            self.default_srid = srid;
        }
        if let Some(secs) = overrides.timeout_secs {
            if secs == 0 {
                return Err(ToolError::invalid_field(
                    "--timeout-secs",
                    "minimum",
                    "--timeout-secs must be at least 1",
                ));
            }
            self.timeout = Duration::from_secs(secs);
        }
        if overrides.insecure_tls {
            self.insecure_tls = true;
        }
        Ok(self)
    }

    pub fn for_base_url(base_url: &str, token: &str) -> Result<Self, ToolError> {
        Ok(Self {
            base_url: parse_base_url(base_url, "base_url")?,
            token: ApiToken::new(token),
            default_srid: defaults::SRID.to_string(),
            timeout: Duration::from_secs(network::TIMEOUT_API_REQUEST_SECS),
            insecure_tls: false,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_default_srid(mut self, srid: &str) -> Self {
        self.default_srid = srid.to_string();
        self
    }
}

fn parse_base_url(raw: &str, source: &str) -> Result<Url, ToolError> {
    let mut normalized = raw.trim().to_string();
    // Url::join drops the last path segment unless the base ends with '/'.
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    let url = Url::parse(&normalized).map_err(|err| {
        ToolError::invalid_field(source, "url", format!("{} is not a valid URL: {}", source, err))
    })?;
    let scheme = format!("{}:", url.scheme());
    if !ALLOWED_HTTP.contains(&scheme.as_str()) {
        return Err(ToolError::invalid_field(
            source,
            "scheme",
            format!("{} must use http or https", source),
        ));
    }
    Ok(url)
}

fn parse_timeout_secs(raw: &str) -> Result<u64, ToolError> {
    raw.parse::<u64>()
        .ok()
        .filter(|secs| *secs > 0)
        .ok_or_else(|| {
            ToolError::invalid_field(
                env::TIMEOUT,
                "minimum",
                format!("{} must be a positive number of seconds", env::TIMEOUT),
            )
        })
}

fn is_truthy(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_ces_conventions() {
        let config = IspwConfig::from_lookup(lookup(&[])).expect("config");
        assert_eq!(config.base_url.as_str(), "https://localhost:2020/");
        assert_eq!(config.default_srid, "ISPW");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.token.is_empty());
        assert!(!config.insecure_tls);
    }

    #[test]
    fn host_and_port_build_the_base_url() {
        let config = IspwConfig::from_lookup(lookup(&[
            ("CES_HOST", "ces.example.com"),
            ("CES_PORT", "48226"),
        ]))
        .expect("config");
        assert_eq!(config.base_url.as_str(), "https://ces.example.com:48226/");
    }

    #[test]
    fn explicit_base_url_wins_over_host_and_port() {
        let config = IspwConfig::from_lookup(lookup(&[
            ("CES_HOST", "ignored"),
            ("ISPW_BASE_URL", "http://gateway.local/ces"),
            ("ISPW_DEFAULT_SRID", "PROD"),
            ("ISPW_TIMEOUT", "5"),
            ("ISPW_INSECURE_TLS", "true"),
        ]))
        .expect("config");
        assert_eq!(config.base_url.as_str(), "http://gateway.local/ces/");
        assert_eq!(config.default_srid, "PROD");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert!(config.insecure_tls);
    }

    #[test]
    fn rejects_invalid_timeout_and_scheme() {
        let err = IspwConfig::from_lookup(lookup(&[("ISPW_TIMEOUT", "soon")])).unwrap_err();
        assert_eq!(err.field(), Some("ISPW_TIMEOUT"));
        let err =
            IspwConfig::from_lookup(lookup(&[("ISPW_BASE_URL", "ftp://host/")])).unwrap_err();
        assert_eq!(err.constraint(), Some("scheme"));
    }

    #[test]
    fn debug_output_never_contains_the_token() {
        let config = IspwConfig::for_base_url("https://h/", "very-secret-token").expect("config");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("very-secret-token"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn overrides_replace_resolved_values() {
        let config = IspwConfig::from_lookup(lookup(&[]))
            .expect("config")
            .apply_overrides(ConfigOverrides {
                base_url: Some("https://other:1/".to_string()),
                default_srid: Some("TEST".to_string()),
                timeout_secs: Some(2),
                insecure_tls: false,
            })
            .expect("overrides");
        assert_eq!(config.base_url.as_str(), "https://other:1/");
        assert_eq!(config.default_srid, "TEST");
        assert_eq!(config.timeout, Duration::from_secs(2));
    }
}
