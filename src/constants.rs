pub mod network {
    pub const DEFAULT_CES_HOST: &str = "localhost";
    pub const DEFAULT_CES_PORT: u16 = 2020;
    pub const TIMEOUT_API_REQUEST_SECS: u64 = 30;
    pub const TIMEOUT_CONNECTION_MS: u64 = 5_000;
    pub const POOL_IDLE_TIMEOUT_MS: u64 = 90_000;
    pub const USER_AGENT: &str = concat!("ispw-mcp/", env!("CARGO_PKG_VERSION"));
}

pub mod defaults {
    pub const SRID: &str = "ISPW";
    pub const RESPONSE_FORMAT: &str = "markdown";
}

pub mod limits {
    pub const SRID_MAX_LENGTH: u64 = 50;
    pub const IDENTIFIER_MAX_LENGTH: u64 = 100;
    pub const DESCRIPTION_MAX_LENGTH: u64 = 500;
    pub const PATH_MAX_LENGTH: u64 = 200;
    pub const SHORT_FIELD_MAX_LENGTH: u64 = 50;
    pub const ERROR_BODY_PREVIEW_BYTES: usize = 512;
    pub const LOG_VALUE_MAX_BYTES: usize = 2_048;
    pub const SUGGESTION_LIMIT: usize = 5;
}

pub mod protocols {
    pub const ALLOWED_HTTP: &[&str] = &["http:", "https:"];
}

pub mod env {
    pub const CES_HOST: &str = "CES_HOST";
    pub const CES_PORT: &str = "CES_PORT";
    pub const BASE_URL: &str = "ISPW_BASE_URL";
    pub const API_TOKEN: &str = "ISPW_API_TOKEN";
    pub const DEFAULT_SRID: &str = "ISPW_DEFAULT_SRID";
    pub const TIMEOUT: &str = "ISPW_TIMEOUT";
    pub const INSECURE_TLS: &str = "ISPW_INSECURE_TLS";
    pub const LOG_LEVEL: &str = "LOG_LEVEL";
}
