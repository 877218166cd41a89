//! Engine bootstrap

use crate::{config::EngineConfig, error::ServerResult};
use zephyr_core::EngineHandle;

#[cfg(feature = "candle")]
use crate::{config::DeviceType, error::ServerError};

/// Load the configured engine. Any failure means the server must not start.
#[cfg(feature = "candle")]
pub async fn load_engine(config: &EngineConfig) -> ServerResult<EngineHandle> {
    use std::sync::Arc;
    use zephyr_core::engine::{CandleEngine, CandleEngineConfig, DeviceKind};

    let engine_config = CandleEngineConfig {
        model_path: config.model_path.clone(),
        tokenizer_path: config.tokenizer_path.clone(),
        model_name: config.model_name.clone(),
        seed: config.seed,
        device: match config.device {
            DeviceType::Cpu => DeviceKind::Cpu,
            DeviceType::Cuda => DeviceKind::Cuda,
            DeviceType::Metal => DeviceKind::Metal,
        },
        device_id: config.device_id,
    };

    let engine = tokio::task::spawn_blocking(move || CandleEngine::load(&engine_config))
        .await
        .map_err(|e| ServerError::Internal(format!("Engine loader task failed: {}", e)))??;

    Ok(Arc::new(engine))
}

/// Without a compiled-in backend there is no engine to serve with.
#[cfg(not(feature = "candle"))]
pub async fn load_engine(_config: &EngineConfig) -> ServerResult<EngineHandle> {
    Err(zephyr_core::CoreError::engine_unavailable(
        "No text generation backend compiled in",
        "Rebuild zephyr-server with the `candle` feature",
    )
    .into())
}
