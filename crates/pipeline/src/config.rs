use std::str::FromStr;
use std::time::Duration;

use clipforge_comfyui::api::ApiConfig;
use clipforge_comfyui::payload::DEFAULT_METADATA_KEYS;
use clipforge_comfyui::resolver::ResolverConfig;
use clipforge_comfyui::submission::DEFAULT_IMAGE_NODE;
use clipforge_core::correlation::DEFAULT_TOKEN_PREFIX;
use clipforge_core::error::CoreError;

use crate::duration::DEFAULT_HISTORY_CAPACITY;

/// Pipeline configuration loaded from environment variables.
///
/// All fields have defaults suitable for a local ComfyUI instance.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Connection settings for the ComfyUI-Connect instance.
    pub api: ApiConfig,
    /// Workflow node that receives the uploaded image.
    pub image_node: String,
    /// Polling fallback parameters.
    pub resolver: ResolverConfig,
    /// Delay between progress updates.
    pub progress_interval: Duration,
    /// Number of job durations kept for estimates.
    pub history_capacity: usize,
    /// First component of every correlation token.
    pub token_prefix: String,
    /// Submission response keys that never carry a result.
    pub metadata_keys: Vec<String>,
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default                 |
    /// |-------------------------------|-------------------------|
    /// | `COMFYUI_BASE_URL`            | `http://localhost:8188` |
    /// | `COMFYUI_WORKFLOW`            | `api-video`             |
    /// | `COMFYUI_API_TOKEN`           | unset                   |
    /// | `COMFYUI_IMAGE_NODE`          | `image`                 |
    /// | `SUBMIT_TIMEOUT_SECS`         | `600`                   |
    /// | `POLL_INTERVAL_SECS`          | `3`                     |
    /// | `POLL_DEADLINE_SECS`          | `60`                    |
    /// | `POLL_MAX_CONSECUTIVE_ERRORS` | unset                   |
    /// | `PROGRESS_INTERVAL_SECS`      | `2`                     |
    /// | `DURATION_HISTORY_CAPACITY`   | `50`                    |
    /// | `CORRELATION_PREFIX`          | `telegram`              |
    /// | `INLINE_METADATA_KEYS`        | `status,client_id,prompt_id,number,node_errors,error,message` |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let api = ApiConfig {
            base_url: text("COMFYUI_BASE_URL", "http://localhost:8188"),
            workflow: text("COMFYUI_WORKFLOW", "api-video"),
            api_token: lookup("COMFYUI_API_TOKEN").filter(|t| !t.trim().is_empty()),
            submit_timeout: Duration::from_secs(parse_or(&lookup, "SUBMIT_TIMEOUT_SECS", 600)?),
        };

        let resolver = ResolverConfig {
            poll_interval: Duration::from_secs(parse_or(&lookup, "POLL_INTERVAL_SECS", 3)?),
            deadline: Duration::from_secs(parse_or(&lookup, "POLL_DEADLINE_SECS", 60)?),
            max_consecutive_errors: parse_optional(&lookup, "POLL_MAX_CONSECUTIVE_ERRORS")?,
        };

        let metadata_keys = match lookup("INLINE_METADATA_KEYS") {
            Some(raw) => raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => DEFAULT_METADATA_KEYS.iter().map(|k| k.to_string()).collect(),
        };

        let config = Self {
            api,
            image_node: text("COMFYUI_IMAGE_NODE", DEFAULT_IMAGE_NODE),
            resolver,
            progress_interval: Duration::from_secs(parse_or(&lookup, "PROGRESS_INTERVAL_SECS", 2)?),
            history_capacity: parse_or(&lookup, "DURATION_HISTORY_CAPACITY", DEFAULT_HISTORY_CAPACITY)?,
            token_prefix: text("CORRELATION_PREFIX", DEFAULT_TOKEN_PREFIX),
            metadata_keys,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall or spin the job loops.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.resolver.poll_interval.is_zero() {
            return Err(CoreError::Validation("POLL_INTERVAL_SECS must be positive".into()));
        }
        if self.progress_interval.is_zero() {
            return Err(CoreError::Validation("PROGRESS_INTERVAL_SECS must be positive".into()));
        }
        if self.history_capacity == 0 {
            return Err(CoreError::Validation(
                "DURATION_HISTORY_CAPACITY must be positive".into(),
            ));
        }
        if self.api.base_url.trim().is_empty() {
            return Err(CoreError::Validation("COMFYUI_BASE_URL must not be empty".into()));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                base_url: "http://localhost:8188".into(),
                workflow: "api-video".into(),
                api_token: None,
                submit_timeout: clipforge_comfyui::api::DEFAULT_SUBMIT_TIMEOUT,
            },
            image_node: DEFAULT_IMAGE_NODE.into(),
            resolver: ResolverConfig::default(),
            progress_interval: crate::progress::DEFAULT_PROGRESS_INTERVAL,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            token_prefix: DEFAULT_TOKEN_PREFIX.into(),
            metadata_keys: DEFAULT_METADATA_KEYS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, CoreError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    Ok(parse_optional(lookup, key)?.unwrap_or(default))
}

fn parse_optional<F, T>(lookup: &F, key: &str) -> Result<Option<T>, CoreError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| CoreError::Validation(format!("{key} has an invalid value: {raw:?}"))),
    }
}
