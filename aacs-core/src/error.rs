use thiserror::Error;

/**
    Errors from the primitive layer: MKB parsing and the AES/SHA-1 wrappers.

    Higher-level crates fold these into their own error enum via `#[from]`.
*/
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    #[error("malformed MKB: {0}")]
    MkbMalformed(String),

    #[error("MKB record type {0:#04x} not found")]
    MkbRecordNotFound(u8),

    #[error("invalid AES-CBC input: {0}")]
    AesCbcInvalidInput(String),
}
