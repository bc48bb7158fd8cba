// Pipeline configuration.
//
// Every tunable the orchestrator reads lives in `PipelineConfig`: the base
// seed, the acceptance threshold and iteration cap of the refinement loop,
// the quality weights, and the LLM gateway settings. All fields carry serde
// defaults, so a config file only needs the keys it changes and `{}` is a
// valid file. The CLI loads a file (if given), applies flag overrides on top,
// and calls `validate()` before building a pipeline.
//
// Loaded from JSON via serde_json. Threshold and weights are configuration,
// not invariants; `validate()` only rejects values that would make scoring
// meaningless.

use crate::error::PipelineError;
use crate::quality::QualityWeights;
use midigen_llm::{DEFAULT_TIMEOUT, HttpGateway, LlmGateway, OfflineGateway};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Upper bound on `max_iterations`; more passes never pay for themselves.
pub const MAX_ITERATIONS_LIMIT: u32 = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Base seed. `None` derives one from the prompt text, so the same
    /// prompt always gives the same piece.
    pub seed: Option<u64>,
    /// Overall quality at or above which the first acceptable result is kept.
    pub accept_threshold: f64,
    /// Refinement passes allowed after the first generation.
    pub max_iterations: u32,
    pub weights: QualityWeights,
    pub llm: LlmSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            seed: None,
            accept_threshold: 0.70,
            max_iterations: 2,
            weights: QualityWeights::default(),
            llm: LlmSettings::default(),
        }
    }
}

/// How to reach an OpenAI-compatible completion endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Base URL; `None` means offline (keyword extraction only).
    pub endpoint: Option<String>,
    pub model: String,
    /// Environment variable holding the API key, read at gateway build time.
    pub api_key_env: String,
    pub timeout_secs: f64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        LlmSettings {
            endpoint: None,
            model: "gpt-4o-mini".into(),
            api_key_env: "MIDIGEN_API_KEY".into(),
            timeout_secs: DEFAULT_TIMEOUT.as_secs_f64(),
        }
    }
}

impl PipelineConfig {
    /// Read and validate a JSON config file.
    pub fn load(path: &Path) -> Result<PipelineConfig, PipelineError> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&text)
            .map_err(|e| PipelineError::Config(format!("{}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<PipelineConfig, PipelineError> {
        let config: PipelineConfig =
            serde_json::from_str(json).map_err(|e| PipelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(0.0..=1.0).contains(&self.accept_threshold) {
            return Err(PipelineError::Config(format!(
                "accept_threshold must be in [0, 1], got {}",
                self.accept_threshold
            )));
        }
        if self.max_iterations > MAX_ITERATIONS_LIMIT {
            return Err(PipelineError::Config(format!(
                "max_iterations must be at most {MAX_ITERATIONS_LIMIT}, got {}",
                self.max_iterations
            )));
        }
        self.weights.validate().map_err(PipelineError::Config)?;
        if !self.llm.timeout_secs.is_finite() || self.llm.timeout_secs <= 0.0 {
            return Err(PipelineError::Config(format!(
                "llm.timeout_secs must be positive, got {}",
                self.llm.timeout_secs
            )));
        }
        Ok(())
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.llm.timeout_secs).unwrap_or(DEFAULT_TIMEOUT)
    }

    /// The gateway these settings describe. Without an endpoint this is the
    /// offline gateway.
    pub fn build_gateway(&self) -> Result<Box<dyn LlmGateway>, PipelineError> {
        let Some(endpoint) = &self.llm.endpoint else {
            return Ok(Box::new(OfflineGateway));
        };
        let api_key = std::env::var(&self.llm.api_key_env).ok().filter(|k| !k.is_empty());
        if api_key.is_none() {
            tracing::warn!(
                var = %self.llm.api_key_env,
                "no API key in the environment, calling the endpoint without one"
            );
        }
        let gateway = HttpGateway::new(endpoint, &self.llm.model, api_key)
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        Ok(Box::new(gateway))
    }
}
