//! Error types for the terrain engine

use thiserror::Error;

/// Main error type for the engine
#[derive(Debug, Error)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Height map error: {0}")]
    HeightMap(String),

    #[error("Allocation error: {0}")]
    Allocation(String),

    #[error("Cache request of {requested} bytes exceeds arena capacity of {capacity} bytes")]
    CacheOverRequest { requested: usize, capacity: usize },

    #[error("Fence error: {0}")]
    Fence(String),

    #[error("Occlusion cache error: {0}")]
    OcclusionCache(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}
