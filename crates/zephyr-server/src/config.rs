//! Server configuration

use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf};
use zephyr_core::worker::WorkerConfig;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server binding address
    pub bind: SocketAddr,

    /// CORS configuration
    pub cors: CorsConfig,

    /// Model and tokenizer configuration
    pub engine: EngineConfig,

    /// Generation queue configuration
    pub worker: WorkerConfig,

    /// Request limits
    pub limits: RequestLimits,
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Enable CORS
    pub enabled: bool,

    /// Allowed origins ("*" means all)
    pub allowed_origins: Vec<String>,

    /// Allowed methods ("*" means all)
    pub allowed_methods: Vec<String>,

    /// Allowed headers ("*" means all)
    pub allowed_headers: Vec<String>,

    /// Max age for preflight requests in seconds
    pub max_age: u64,
}

/// Compute device for the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Cpu,
    Cuda,
    Metal,
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Quantized GGUF model file
    pub model_path: PathBuf,

    /// HuggingFace tokenizer.json
    pub tokenizer_path: PathBuf,

    /// Model name reported by the readiness check
    pub model_name: String,

    /// Sampling seed; random per process when unset
    pub seed: Option<u64>,

    /// Preferred device, with CPU fallback
    pub device: DeviceType,

    /// Device ID (for multi-GPU systems)
    pub device_id: usize,
}

/// Request size limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestLimits {
    /// Maximum request body size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8000)),
            cors: CorsConfig::default(),
            engine: EngineConfig::default(),
            worker: WorkerConfig::default(),
            limits: RequestLimits::default(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec!["*".to_string()],
            allowed_methods: vec!["*".to_string()],
            allowed_headers: vec!["*".to_string()],
            max_age: 3600,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("./models/zephyr-7b-alpha.Q4_K_M.gguf"),
            tokenizer_path: PathBuf::from("./models/tokenizer.json"),
            model_name: "HuggingFaceH4/zephyr-7b-alpha".to_string(),
            seed: None,
            device: DeviceType::Cpu,
            device_id: 0,
        }
    }
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

impl ServerConfig {
    /// Load configuration from file, with `ZEPHYR__SECTION__KEY` environment overrides
    pub fn from_file(path: &PathBuf) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_path()))
            .add_source(config::Environment::with_prefix("ZEPHYR").prefix_separator("__").separator("__"))
            .build()?;

        settings.try_deserialize()
    }

    /// Save configuration to file
    pub fn to_file(&self, path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;
        Ok(())
    }
}
