use crate::error::{Error, Result};
use crate::infrastructure::InMemoryTraceSink;
use crate::proxy::headers::DEFAULT_SENSITIVE_HEADERS;
use crate::proxy::types::*;
use crate::proxy::ProxyPolicyConfig;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use std::env;
use std::sync::Arc;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub proxy: ProxySettings,
    pub trace: TraceSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProxySettings {
    pub ignored_headers: Vec<String>,
    pub sensitive_headers: Vec<String>,
    pub whitelist_hosts: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TraceSettings {
    pub enabled: bool,
    pub capacity: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
    pub format: String,
}

impl LoggingSettings {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

const LIST_KEYS: [&str; 3] = [
    "proxy.ignored_headers",
    "proxy.sensitive_headers",
    "proxy.whitelist_hosts",
];

impl Settings {
    /// Load settings for the environment named by `ENVIRONMENT`.
    ///
    /// Later sources override earlier ones: built-in defaults, then
    /// `config/default`, `config/{environment}`, `config/local` and finally
    /// `FORWARD_POLICY__*` variables (lists are comma separated).
    pub fn new() -> std::result::Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let mut variables = Environment::with_prefix("FORWARD_POLICY")
            .separator("__")
            .try_parsing(true)
            .list_separator(",");
        for key in LIST_KEYS {
            variables = variables.with_list_parse_key(key);
        }

        Self::defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(variables)
            .build()?
            .try_deserialize()
    }

    /// Load settings from a TOML document layered over the defaults
    pub fn from_toml(source: &str) -> std::result::Result<Self, ConfigError> {
        Self::defaults()?
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    fn defaults() -> std::result::Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("proxy.ignored_headers", Vec::<String>::new())?
            .set_default("proxy.sensitive_headers", DEFAULT_SENSITIVE_HEADERS.to_vec())?
            .set_default("proxy.whitelist_hosts", Vec::<String>::new())?
            .set_default("trace.enabled", false)?
            .set_default("trace.capacity", DEFAULT_TRACE_CAPACITY as u64)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")
    }

    /// Validate the proxy section into a [`ProxyPolicyConfig`]
    pub fn policy_config(&self) -> Result<ProxyPolicyConfig> {
        let header_names = |names: &[String]| -> Result<Vec<PolicyHeaderName>> {
            names
                .iter()
                .map(|name| {
                    PolicyHeaderName::try_new(name.as_str())
                        .map_err(|_| Error::from(ProxyError::InvalidHeaderName(name.clone())))
                })
                .collect()
        };

        let whitelist = self
            .proxy
            .whitelist_hosts
            .iter()
            .map(|pattern| {
                HostPattern::try_new(pattern.as_str())
                    .map_err(|_| Error::from(ProxyError::InvalidHostPattern(pattern.clone())))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ProxyPolicyConfig::new()
            .with_ignored_headers(header_names(&self.proxy.ignored_headers)?)
            .with_sensitive_headers(header_names(&self.proxy.sensitive_headers)?)
            .with_whitelist_hosts(whitelist))
    }

    /// The trace sink to record into, when tracing is enabled
    pub fn trace_sink(&self) -> Result<Option<Arc<InMemoryTraceSink>>> {
        if !self.trace.enabled {
            return Ok(None);
        }
        let capacity = TraceCapacity::try_new(self.trace.capacity)
            .map_err(|e| Error::invalid_setting("trace.capacity", e.to_string()))?;
        Ok(Some(Arc::new(InMemoryTraceSink::new(capacity))))
    }
}
