//! Error types for the compositor

use thiserror::Error;

/// Failure reported by a [`RenderBackend`](crate::backend::RenderBackend)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Failed to create GPU resource: {0}")]
    ResourceCreation(String),

    #[error("Shader compilation failed for {label}: {diagnostics}")]
    ShaderCompilation { label: String, diagnostics: String },

    #[error("Unknown {0} handle")]
    InvalidHandle(&'static str),

    #[error("Draw issued with no program bound")]
    NoProgramBound,

    #[error("GPU context lost")]
    ContextLost,

    #[error("Pixel readback failed: {0}")]
    Readback(String),

    #[error("GPU error: {0}")]
    Device(String),
}

/// Failure uploading a content source to the GPU
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UploadError {
    #[error("Content is not ready")]
    NotReady,

    #[error("Invalid pixel data: {0}")]
    InvalidData(String),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

/// Errors surfaced by compositor operations that return a result
#[derive(Error, Debug)]
pub enum CompositorError {
    #[error("GPU context lost")]
    ContextLost,

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

/// Errors loading a [`CompositorConfig`](crate::config::CompositorConfig)
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, CompositorError>;
