use thiserror::Error;

use aacs_core::CoreError;

/**
    Errors surfaced by the AACS key-derivation pipeline and session API.
*/
#[derive(Debug, Error)]
pub enum AacsError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("no readable key database config file found")]
    ConfigMissing,

    #[error("malformed key database config: {0}")]
    ConfigMalformed(String),

    #[error("disc file missing or unreadable: {0}")]
    DiscFilesMissing(String),

    #[error("disc hash matches no config entry")]
    NoMatchingEntry,

    #[error("no valid processing key found for this disc")]
    NoValidProcessingKey,

    #[error("could not obtain a volume id from config or any host credential")]
    NoVolumeId,

    #[error("unit key derivation failed: no volume unique key available")]
    UnitKeyDerivationFailed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type AacsResult<T> = Result<T, AacsError>;
