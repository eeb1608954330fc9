//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::constants::{audio, bridge};
use crate::ConfigError;

/// Runtime environment enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Development mode - relaxed validation, warnings only
    #[default]
    Development,
    /// Staging mode - stricter validation
    Staging,
    /// Production mode - all validations enforced
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Runtime environment (development, staging, production)
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Telephony provider credentials and endpoints
    #[serde(default)]
    pub telephony: TelephonyConfig,

    /// Agent backend connection
    #[serde(default)]
    pub agent: AgentBackendConfig,

    /// Audio bridging parameters
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP/WebSocket server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Publicly reachable base URL of this server (https://host), used in
    /// TwiML stream targets and status callbacks
    #[serde(default = "default_public_host")]
    pub public_host: String,

    /// Enable CORS restrictions
    #[serde(default)]
    pub cors_enabled: bool,

    /// Allowed CORS origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_port() -> u16 {
    std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000)
}

fn default_public_host() -> String {
    std::env::var("PUBLIC_HOST").unwrap_or_default()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            public_host: default_public_host(),
            cors_enabled: false,
            cors_origins: Vec::new(),
        }
    }
}

/// Telephony provider (call control) configuration
///
/// Credentials default from the provider's conventional environment
/// variables so a plain `TWILIO_ACCOUNT_SID=... cargo run` works without a
/// config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelephonyConfig {
    #[serde(default = "default_account_sid")]
    pub account_sid: String,

    #[serde(default = "default_auth_token")]
    pub auth_token: String,

    /// E.164 caller id used for outbound calls
    #[serde(default = "default_caller_id")]
    pub caller_id: String,

    /// REST API base URL
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_account_sid() -> String {
    std::env::var("TWILIO_ACCOUNT_SID").unwrap_or_default()
}

fn default_auth_token() -> String {
    std::env::var("TWILIO_AUTH_TOKEN").unwrap_or_default()
}

fn default_caller_id() -> String {
    std::env::var("TWILIO_CALLER_ID").unwrap_or_default()
}

fn default_api_base() -> String {
    "https://api.twilio.com".to_string()
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            account_sid: default_account_sid(),
            auth_token: default_auth_token(),
            caller_id: default_caller_id(),
            api_base: default_api_base(),
        }
    }
}

/// Agent backend (realtime session) connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentBackendConfig {
    /// WebSocket endpoint of the agent backend
    #[serde(default = "default_agent_endpoint")]
    pub endpoint: String,

    /// Optional bearer token for the backend
    #[serde(default = "default_agent_api_key")]
    pub api_key: Option<String>,
}

fn default_agent_endpoint() -> String {
    std::env::var("AGENT_ENDPOINT").unwrap_or_else(|_| "ws://127.0.0.1:8081/realtime".to_string())
}

fn default_agent_api_key() -> Option<String> {
    std::env::var("AGENT_API_KEY").ok()
}

impl Default for AgentBackendConfig {
    fn default() -> Self {
        Self {
            endpoint: default_agent_endpoint(),
            api_key: default_agent_api_key(),
        }
    }
}

/// Output scheduler operating mode
///
/// The relay deployment forwards every frame to the provider immediately;
/// the device deployment feeds a local DAC and needs pre-roll before
/// playback starts. Same scheduler, one flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerMode {
    #[default]
    Relay,
    Device,
}

/// Microphone gating policy while the agent is speaking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GatingMode {
    /// Keep forwarding caller audio; rely on the backend's echo-aware VAD
    /// plus the local barge-in amplitude check
    #[default]
    FullDuplex,
    /// Hard-mute inbound forwarding while an utterance plays
    HalfDuplex,
}

/// Audio bridging parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Provider frame duration in milliseconds
    #[serde(default = "default_frame_ms")]
    pub frame_ms: u64,

    /// Model-side sample rate (8000 to skip resampling, 24000 for the
    /// realtime model's native rate)
    #[serde(default = "default_model_rate")]
    pub model_rate: u32,

    /// Inbound flush target in milliseconds
    #[serde(default = "default_chunk_ms")]
    pub chunk_ms: u64,

    /// Maximum inter-flush age for a non-empty inbound buffer (ms)
    #[serde(default = "default_max_flush_age_ms")]
    pub max_flush_age_ms: u64,

    /// Jitter buffer capacity in frames
    #[serde(default = "default_jitter_capacity")]
    pub jitter_capacity: usize,

    /// Pre-roll depth in frames (device mode only)
    #[serde(default = "default_preroll_frames")]
    pub preroll_frames: usize,

    /// Output scheduler mode
    #[serde(default)]
    pub scheduler_mode: SchedulerMode,

    /// Microphone gating policy
    #[serde(default)]
    pub gating: GatingMode,

    /// Normalized peak threshold for local barge-in detection
    #[serde(default = "default_barge_in_peak")]
    pub barge_in_peak: f32,

    /// Keepalive ping period (seconds)
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
}

fn default_frame_ms() -> u64 {
    audio::FRAME_MS
}

fn default_model_rate() -> u32 {
    audio::MODEL_RATE
}

fn default_chunk_ms() -> u64 {
    bridge::CHUNK_MS
}

fn default_max_flush_age_ms() -> u64 {
    bridge::MAX_FLUSH_AGE_MS
}

fn default_jitter_capacity() -> usize {
    bridge::JITTER_CAPACITY
}

fn default_preroll_frames() -> usize {
    bridge::PREROLL_FRAMES
}

fn default_barge_in_peak() -> f32 {
    bridge::BARGE_IN_PEAK
}

fn default_keepalive_secs() -> u64 {
    bridge::KEEPALIVE_SECS
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            frame_ms: default_frame_ms(),
            model_rate: default_model_rate(),
            chunk_ms: default_chunk_ms(),
            max_flush_age_ms: default_max_flush_age_ms(),
            jitter_capacity: default_jitter_capacity(),
            preroll_frames: default_preroll_frames(),
            scheduler_mode: SchedulerMode::default(),
            gating: GatingMode::default(),
            barge_in_peak: default_barge_in_peak(),
            keepalive_secs: default_keepalive_secs(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON-formatted logs
    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bridge.frame_ms == 0 || self.bridge.frame_ms > 60 {
            return Err(ConfigError::InvalidValue {
                field: "bridge.frame_ms".to_string(),
                message: format!("Frame duration must be 1-60ms, got {}", self.bridge.frame_ms),
            });
        }

        if self.bridge.model_rate % 8000 != 0 {
            return Err(ConfigError::InvalidValue {
                field: "bridge.model_rate".to_string(),
                message: format!(
                    "Model rate must be a multiple of the 8kHz telephony rate, got {}",
                    self.bridge.model_rate
                ),
            });
        }

        if self.bridge.chunk_ms < self.bridge.frame_ms {
            return Err(ConfigError::InvalidValue {
                field: "bridge.chunk_ms".to_string(),
                message: "Flush target must be at least one frame".to_string(),
            });
        }

        if self.bridge.jitter_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "bridge.jitter_capacity".to_string(),
                message: "Jitter buffer capacity must be non-zero".to_string(),
            });
        }

        if self.bridge.preroll_frames >= self.bridge.jitter_capacity {
            return Err(ConfigError::InvalidValue {
                field: "bridge.preroll_frames".to_string(),
                message: "Pre-roll depth must be below jitter capacity".to_string(),
            });
        }

        if !(0.0..=1.0).contains(&self.bridge.barge_in_peak) {
            return Err(ConfigError::InvalidValue {
                field: "bridge.barge_in_peak".to_string(),
                message: format!(
                    "Must be between 0.0 and 1.0, got {}",
                    self.bridge.barge_in_peak
                ),
            });
        }

        if self.environment.is_production() {
            if self.server.public_host.is_empty() {
                return Err(ConfigError::Missing("server.public_host".to_string()));
            }
            if self.telephony.account_sid.is_empty() || self.telephony.auth_token.is_empty() {
                return Err(ConfigError::Missing("telephony credentials".to_string()));
            }
        }

        Ok(())
    }
}

/// Load settings from config files and environment
///
/// Priority: env vars > `config/{env}.yaml` > `config/default.yaml` > defaults
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    let default_path = Path::new("config/default.yaml");
    if default_path.exists() {
        builder = builder.add_source(File::from(default_path));
    }

    if let Some(env_name) = env {
        let env_path_string = format!("config/{}.yaml", env_name);
        let env_path = Path::new(&env_path_string);
        if env_path.exists() {
            builder = builder.add_source(File::from(env_path));
        } else {
            tracing::warn!("Config file not found: {}", env_path_string);
        }
    }

    builder = builder.add_source(
        Environment::with_prefix("VOICE_BRIDGE")
            .separator("__")
            .try_parsing(true),
    );

    let settings: Settings = builder.build()?.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}
