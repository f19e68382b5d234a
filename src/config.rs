use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::workflow::{FormContext, RuntimeOptions, DEFAULT_EVENT_QUEUE_CAPACITY, DEFAULT_HISTORY_LIMIT};

/// Main configuration structure for form-workflow
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct FormWorkflowConfig {
    /// Workflow runtime settings
    pub workflow: WorkflowSettings,
    /// Logging settings
    pub observability: ObservabilityConfig,
    /// Sample sales-order service used by the CLI
    pub demo: DemoConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkflowSettings {
    /// Capacity of the single-consumer event queue
    pub event_queue_capacity: usize,
    /// Number of transitions kept in the audit trail
    pub history_limit: usize,
    /// Values the form starts out with
    pub initial_values: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level, overridden by RUST_LOG
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable ones
    pub json_logs: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Smallest order the sample service accepts
    pub min_reams: u32,
    /// Simulated backend latency
    pub latency_ms: u64,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            event_queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
            history_limit: DEFAULT_HISTORY_LIMIT,
            initial_values: HashMap::new(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            min_reams: 100,
            latency_ms: 250,
        }
    }
}

impl WorkflowSettings {
    pub fn runtime_options(&self) -> RuntimeOptions {
        RuntimeOptions {
            event_queue_capacity: self.event_queue_capacity,
        }
    }

    pub fn initial_context(&self) -> FormContext {
        FormContext::with_values(self.initial_values.clone())
    }
}

impl FormWorkflowConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (form-workflow.toml, .form-workflow-rc)
    /// 3. Environment variables (prefixed with FORM_WORKFLOW_, `__` between levels)
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder();

        if Path::new("form-workflow.toml").exists() {
            builder = builder.add_source(File::with_name("form-workflow"));
        }

        if Path::new(".form-workflow-rc").exists() {
            builder = builder.add_source(
                File::with_name(".form-workflow-rc").format(config::FileFormat::Toml),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix("FORM_WORKFLOW")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        Self::from_config(builder.build()?)
    }

    /// Load from an explicit file, still letting the environment override it
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("FORM_WORKFLOW")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Self::from_config(config)
    }

    fn from_config(config: Config) -> Result<Self> {
        let loaded: FormWorkflowConfig = config.try_deserialize()?;
        Ok(loaded)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<FormWorkflowConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = FormWorkflowConfig::load_env_file();
        FormWorkflowConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static FormWorkflowConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

/// Initialize configuration (called at startup)
pub fn init_config() -> Result<()> {
    let _config = config()?;
    tracing::info!("Configuration loaded successfully");
    Ok(())
}
