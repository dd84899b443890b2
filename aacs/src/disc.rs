use std::fs;
use std::path::Path;

use aacs_core::sha1_digest;

use crate::error::{AacsError, AacsResult};

fn digest_unit_key_file(bytes: &[u8]) -> [u8; 20] {
    sha1_digest(bytes)
}

/**
    Identity hash for a disc: SHA-1 over the raw bytes of
    `{disc_path}/AACS/Unit_Key_RO.inf`, used as the lookup key into the key
    database.
*/
pub fn disc_hash(disc_path: &Path) -> AacsResult<[u8; 20]> {
    let path = disc_path.join("AACS").join("Unit_Key_RO.inf");
    let bytes =
        fs::read(&path).map_err(|_| AacsError::DiscFilesMissing(path.display().to_string()))?;
    Ok(digest_unit_key_file(&bytes))
}
