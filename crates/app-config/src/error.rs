// In crates/app-config/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to load configuration")]
    LoadError(#[from] config::ConfigError),

    #[error("Strategy tier `{0}` is not defined under [strategy.tiers]")]
    UnknownTier(String),

    #[error(transparent)]
    InvalidStrategy(#[from] core_types::Error),

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),
}

pub type Result<T> = std::result::Result<T, Error>;
