use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("{name} must be defined in environment")]
    MissingEnv { name: &'static str },

    #[error("invalid value for {name}: {reason}")]
    InvalidConfig { name: &'static str, reason: String },

    #[error("invalid domain name '{domain}': {reason}")]
    InvalidDomain { domain: String, reason: String },

    #[error("invalid name '{0}': must start with a letter and contain only alphanumerics and hyphens (max 128)")]
    InvalidName(String),

    #[error("logical id already declared in stack: {0}")]
    DuplicateLogicalId(String),

    #[error("asset directory not found: {}", .0.display())]
    AssetNotFound(PathBuf),

    #[error("configuration has errors:\n{0}")]
    ConfigErrors(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, InfraError>;
