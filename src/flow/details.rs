// ABOUTME: Immutable identity of a flow instance
// ABOUTME: Holds the validated flow name and its construction timestamp

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{FlowError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowDetails {
    name: String,
    timestamp: DateTime<Utc>,
}

impl FlowDetails {
    /// Create details stamped with the current time
    pub fn new(name: impl Into<String>) -> Result<Self> {
        Self::with_timestamp(name, Utc::now())
    }

    pub fn with_timestamp(name: impl Into<String>, timestamp: DateTime<Utc>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(FlowError::Configuration("Empty flow name".to_string()));
        }
        Ok(Self { name, timestamp })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
