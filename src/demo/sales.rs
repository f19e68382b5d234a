use async_trait::async_trait;
use std::time::Duration;

use crate::config::DemoConfig;
use crate::workflow::{FieldErrors, FormContext, SubmissionService};

/// Sample paper-order backend.
///
/// Stands in for a real network call: waits a configurable amount of time,
/// then accepts or rejects the order with per-field messages.
#[derive(Debug, Clone)]
pub struct SalesOrderService {
    min_reams: u32,
    latency: Duration,
}

impl SalesOrderService {
    pub fn new(min_reams: u32, latency: Duration) -> Self {
        Self { min_reams, latency }
    }

    pub fn from_config(demo: &DemoConfig) -> Self {
        Self::new(demo.min_reams, Duration::from_millis(demo.latency_ms))
    }

    pub fn validate(&self, context: &FormContext) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();

        let name = context.value("name").map(str::trim).unwrap_or_default();
        if name.is_empty() {
            errors.insert("name", "Name is required");
        }

        match context.value("reams").map(str::trim) {
            None | Some("") => errors.insert("reams", "Number of reams is required"),
            Some(raw) => match raw.parse::<u32>() {
                Ok(reams) if reams < self.min_reams => {
                    errors.insert("reams", "Not enough reams!")
                }
                Ok(_) => {}
                Err(_) => errors.insert("reams", "Reams must be a whole number"),
            },
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Default for SalesOrderService {
    fn default() -> Self {
        Self::from_config(&DemoConfig::default())
    }
}

#[async_trait]
impl SubmissionService for SalesOrderService {
    async fn submit(&self, context: FormContext) -> Result<(), FieldErrors> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let result = self.validate(&context);
        match &result {
            Ok(()) => tracing::info!(
                name = context.value("name").unwrap_or_default(),
                reams = context.value("reams").unwrap_or_default(),
                "Sales order accepted"
            ),
            Err(errors) => tracing::info!(errors = %errors, "Sales order rejected"),
        }
        result
    }
}
