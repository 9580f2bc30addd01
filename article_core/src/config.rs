//! Pipeline configuration.
//!
//! Every component takes its own section by value; nothing reads globals.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::compliance::ComplianceRules;
use crate::context_assembler::ContextConfig;
use crate::draft::DraftConfig;
use crate::error::ConfigError;
use crate::outline::PlannerConfig;
use crate::session::EventConfig;

/// Model selection shared by planning and drafting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model id passed through to the generation collaborator.
    pub model: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
        }
    }
}

/// Complete configuration for a generation pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub model: ModelConfig,
    pub context: ContextConfig,
    pub planner: PlannerConfig,
    pub drafting: DraftConfig,
    pub events: EventConfig,
    pub compliance: ComplianceRules,
}

impl GenerationConfig {
    /// Parse a TOML document. Missing sections and keys keep their defaults.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Reject values no component can work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.context.similarity_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "context.similarity_threshold must be in (0, 1], got {}",
                threshold
            )));
        }
        if self.drafting.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "drafting.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.events.subscriber_capacity == 0 {
            return Err(ConfigError::Invalid(
                "events.subscriber_capacity must be at least 1".to_string(),
            ));
        }
        if self.model.model.trim().is_empty() {
            return Err(ConfigError::Invalid("model.model must not be empty".to_string()));
        }
        Ok(())
    }
}
