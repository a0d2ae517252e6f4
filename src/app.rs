use crate::errors::ToolError;
use crate::mcp::catalog::{catalog, ArgLocation};
use crate::services::config::{ConfigOverrides, IspwConfig};
use crate::services::dispatcher::Dispatcher;
use crate::services::executor::{RequestExecutor, Transport};
use crate::services::logger::{LogLevel, Logger};
use std::sync::Arc;

pub struct App {
    pub logger: Logger,
    pub config: Arc<IspwConfig>,
    pub dispatcher: Arc<Dispatcher>,
}

impl App {
    fn validate_catalog_wiring() -> Result<(), ToolError> {
        let mut broken = Vec::new();
        for descriptor in catalog() {
            let placeholders = descriptor.path_placeholders();
            for name in &placeholders {
                match descriptor.arg_spec(name) {
                    Some(spec) if spec.location == ArgLocation::Path => {}
                    _ => broken.push(format!("{}: {{{}}}", descriptor.operation, name)),
                }
            }
            for spec in &descriptor.args {
                if spec.location == ArgLocation::Path && !placeholders.contains(&spec.name) {
                    broken.push(format!("{}: {}", descriptor.operation, spec.name));
                }
            }
        }
        if broken.is_empty() {
            return Ok(());
        }
        Err(ToolError::input_invalid("Operation catalog wiring is incomplete")
            .with_hint("Every path placeholder needs exactly one path argument.")
            .with_details(serde_json::json!({ "broken": broken })))
    }

    pub fn initialize(
        overrides: ConfigOverrides,
        log_level: Option<LogLevel>,
    ) -> Result<Self, ToolError> {
        let config = IspwConfig::from_env()?.apply_overrides(overrides)?;
        let mut logger = Logger::new("ispw");
        if let Some(level) = log_level {
            logger.set_level(level);
        }
        Self::with_config(config, logger)
    }

    pub fn with_config(config: IspwConfig, logger: Logger) -> Result<Self, ToolError> {
        Self::validate_catalog_wiring()?;
        let logger = Self::scoped_logger(&config, logger);
        let dispatcher = Dispatcher::from_config(&config, logger.clone())?;
        Ok(Self::assemble(config, logger, dispatcher))
    }

    pub fn with_transport(
        config: IspwConfig,
        logger: Logger,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ToolError> {
        Self::validate_catalog_wiring()?;
        let logger = Self::scoped_logger(&config, logger);
        let executor = RequestExecutor::new(transport, config.timeout, logger.clone());
        let dispatcher = Dispatcher::new(executor, &config.default_srid, logger.clone());
        Ok(Self::assemble(config, logger, dispatcher))
    }

    fn scoped_logger(config: &IspwConfig, logger: Logger) -> Logger {
        let secrets = if config.token.is_empty() {
            Vec::new()
        } else {
            vec![config.token.expose().to_string()]
        };
        logger.with_secrets(secrets)
    }

    fn assemble(config: IspwConfig, logger: Logger, dispatcher: Dispatcher) -> Self {
        if config.token.is_empty() {
            logger.warn(
                "ISPW_API_TOKEN is not set; every upstream call will fail authentication",
                None,
            );
        }
        logger.info(
            "ISPW tool server configured",
            Some(&serde_json::json!({
                "base_url": config.base_url.as_str(),
                "default_srid": config.default_srid,
                "timeout_ms": config.timeout.as_millis() as u64,
                "insecure_tls": config.insecure_tls,
                "operations": catalog().len(),
            })),
        );
        Self {
            logger,
            config: Arc::new(config),
            dispatcher: Arc::new(dispatcher),
        }
    }
}
