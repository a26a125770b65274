use crate::config::Settings;
use crate::infrastructure::log_messages::application as messages;
use crate::infrastructure::InMemoryTraceSink;
use crate::proxy::ProxyRequestHelper;
use crate::Result;
use std::sync::Arc;
use tracing::{info, instrument};

/// Main application struct that wires settings into a ready helper
pub struct Application {
    settings: Settings,
    helper: ProxyRequestHelper,
    traces: Option<Arc<InMemoryTraceSink>>,
}

impl Application {
    /// Build from settings loaded from files and the environment
    #[instrument]
    pub fn load() -> Result<Self> {
        Self::new(Settings::new()?)
    }

    pub fn new(settings: Settings) -> Result<Self> {
        let policy = settings.policy_config()?;
        let traces = settings.trace_sink()?;

        let mut helper = ProxyRequestHelper::new(policy);
        if let Some(sink) = &traces {
            helper = helper.with_trace_sink(sink.clone());
        }

        Ok(Self {
            settings,
            helper,
            traces,
        })
    }

    /// Log the effective forwarding policy
    #[instrument(skip(self))]
    pub fn run(&self) -> Result<()> {
        let policy = self.helper.policy();
        info!(
            ignored_headers = ?policy.ignored_headers(),
            sensitive_headers = ?policy.sensitive_headers(),
            whitelist_hosts = ?policy.whitelist_hosts(),
            "{}",
            messages::POLICY_LOADED
        );

        match &self.traces {
            Some(sink) => info!(capacity = sink.capacity(), "{}", messages::TRACING_ENABLED),
            None => info!("{}", messages::TRACING_DISABLED),
        }

        info!("{}", messages::STARTED_SUCCESSFULLY);
        Ok(())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn helper(&self) -> &ProxyRequestHelper {
        &self.helper
    }

    /// The in-memory trace store, when tracing is enabled
    pub fn traces(&self) -> Option<&Arc<InMemoryTraceSink>> {
        self.traces.as_ref()
    }
}
