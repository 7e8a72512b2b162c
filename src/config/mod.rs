// src/config/mod.rs
pub mod pipeline;

pub use pipeline::{
    BingConfig, GNewsConfig, ModelConfig, PipelineConfig, PriceConfig, RedditConfig, SourcesConfig,
    TwitterConfig,
};
