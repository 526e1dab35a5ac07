// src/config/mod.rs
pub mod pipeline;

pub use pipeline::{
    AlertConfig, ClassifierConfig, ClassifierProvider, EngineConfig, PipelineConfig,
    SchedulerConfig, SourceConfig, SourceKind, WeightLadder,
};

pub const DEFAULT_PIPELINE_CONFIG_PATH: &str = "config/pipeline.toml";
pub const ENV_PIPELINE_CONFIG_PATH: &str = "PIPELINE_CONFIG_PATH";
pub const ENV_TARGET_CURRENCY: &str = "PIPELINE_TARGET_CURRENCY";
pub const ENV_INTERVAL_SECS: &str = "PIPELINE_INTERVAL_SECS";
pub const ENV_HF_API_TOKEN: &str = "HF_API_TOKEN";
