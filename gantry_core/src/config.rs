//! Scheduler configuration

use crate::error::{GantryError, GantryResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing of the run loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Period length in milliseconds
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,
    /// Work budget per period in milliseconds; defaults to the period
    #[serde(default)]
    pub budget_ms: Option<u64>,
    #[serde(default = "default_name")]
    pub name: String,
}

fn default_period_ms() -> u64 {
    20
}

fn default_name() -> String {
    "gantry".to_string()
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            period_ms: default_period_ms(),
            budget_ms: None,
            name: default_name(),
        }
    }
}

impl SchedulerConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn budget(&self) -> Duration {
        Duration::from_millis(self.budget_ms.unwrap_or(self.period_ms))
    }

    pub fn validate(&self) -> GantryResult<()> {
        if self.period_ms == 0 {
            return Err(GantryError::config("scheduler.period_ms must be positive"));
        }
        if self.budget_ms == Some(0) {
            return Err(GantryError::config("scheduler.budget_ms must be positive"));
        }
        if self.name.trim().is_empty() {
            return Err(GantryError::config("scheduler.name must not be empty"));
        }
        Ok(())
    }
}
