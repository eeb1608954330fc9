//! Configuration management for the voice bridge
//!
//! Supports loading configuration from:
//! - `config/default.yaml` - base configuration
//! - `config/{env}.yaml` - environment overrides
//! - `VOICE_BRIDGE_*` environment variables - final overrides
//!
//! All tunable audio/bridging values have a single source of truth in
//! [`constants`]; the [`Settings`] defaults mirror them.

pub mod constants;
pub mod settings;

pub use settings::{
    load_settings, AgentBackendConfig, BridgeConfig, GatingMode, ObservabilityConfig,
    RuntimeEnvironment, SchedulerMode, ServerConfig, Settings, TelephonyConfig,
};

use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Missing required setting: {0}")]
    Missing(String),
}
