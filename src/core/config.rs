//! Pipeline configuration with documented constants
//!
//! Every bound the pipeline enforces lives here so that none of them is a
//! silent magic number at a call site. Values load from TOML; any key left
//! out keeps its default.

use crate::core::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Configuration for the conversational action pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    // === RESOLUTION ===
    /// Maximum number of store matches a search-based UPDATE/DELETE expands to
    ///
    /// Each match becomes its own confirmable action, so this bounds the size
    /// of the confirmation list. Matches past the cap are not shown and the
    /// turn summary says so.
    pub max_search_matches: usize,

    /// Maximum number of records a READ attaches to its action
    pub max_read_results: usize,

    /// Maximum number of entities rendered into a context re-prompt
    pub max_context_entities: usize,

    // === EXTRACTION ===
    /// Number of most recent conversation messages sent with each prompt
    pub context_messages: usize,

    /// Wall-clock bound on a single language-model call, in seconds
    ///
    /// A call that has not returned by then is reported as a generation
    /// failure instead of leaving the turn pending.
    pub llm_timeout_secs: u64,

    /// Sampling temperature passed to the model
    ///
    /// Kept low: the model is asked for strict JSON, not prose.
    pub temperature: f32,

    /// Upper bound on generated tokens per call
    pub max_tokens: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_search_matches: 10,
            max_read_results: 50,
            max_context_entities: 20,
            context_messages: 6,
            llm_timeout_secs: 30,
            temperature: 0.2,
            max_tokens: 1024,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_search_matches == 0 {
            return Err("max_search_matches must be at least 1".into());
        }

        if self.max_read_results == 0 {
            return Err("max_read_results must be at least 1".into());
        }

        if self.llm_timeout_secs == 0 {
            return Err("llm_timeout_secs must be positive".into());
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(format!(
                "temperature ({}) must be within 0.0..=2.0",
                self.temperature
            ));
        }

        if self.max_tokens == 0 {
            return Err("max_tokens must be positive".into());
        }

        Ok(())
    }
}

/// Load and validate a configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> Result<PipelineConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    parse_config(&contents)
        .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))
}

/// Parse and validate a configuration from TOML text
pub fn parse_config(contents: &str) -> std::result::Result<PipelineConfig, String> {
    let config: PipelineConfig =
        toml::from_str(contents).map_err(|e| format!("Failed to parse config TOML: {}", e))?;
    config.validate()?;
    Ok(config)
}
