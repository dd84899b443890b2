use subtle::ConstantTimeEq;

use aacs_core::{aes128_ecb_decrypt_block, Mkb, PK_VERIFICATION_PREFIX};

use crate::config::{ConfigFile, DiscEntry};
use crate::error::{AacsError, AacsResult};

/**
    Result of matching a disc hash against the key database.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome<'a> {
    /// The entry already supplies per-unit keys; the MKB/MMC waterfall can be skipped entirely.
    HaveUnitKeys(&'a [[u8; 16]]),
    /// The entry supplies some key material; later waterfall stages may still short-circuit.
    Partial(&'a DiscEntry),
    /// No entry in the config matches this disc.
    None,
}

/**
    Linear scan of `config.disc_entries` for one whose `disc_id` matches
    `hash`, compared in constant time.
*/
pub fn match_entry<'a>(config: &'a ConfigFile, hash: &[u8; 20]) -> MatchOutcome<'a> {
    let Some(entry) = config.find_entry(hash) else {
        return MatchOutcome::None;
    };

    match entry.unit_keys.as_deref() {
        Some(uks) if !uks.is_empty() => MatchOutcome::HaveUnitKeys(uks),
        _ => MatchOutcome::Partial(entry),
    }
}

/**
    Processing Key validation (§ Processing Key Validation).

    Attempts to recover the Media Key from one `(uv, cvalue)` Subset
    Difference pair under a candidate Processing Key. Returns `Some(mk)` if
    the recovered key reproduces the MKB's verification pattern, `None`
    otherwise.
*/
pub fn validate_pk(
    pk: &[u8; 16],
    cvalue: &[u8; 16],
    uv: &[u8; 4],
    verification_data: &[u8; 16],
) -> Option<[u8; 16]> {
    let mut mk = aes128_ecb_decrypt_block(pk, cvalue);
    for i in 0..4 {
        mk[12 + i] ^= uv[i];
    }

    let dec = aes128_ecb_decrypt_block(&mk, verification_data);
    let verified: bool = dec[0..8].ct_eq(&PK_VERIFICATION_PREFIX).into();

    verified.then_some(mk)
}

/**
    Media Key derivation (§ Media Key Derivation): try every candidate
    Processing Key against every Subset Difference pair in `mkb`, in order,
    and return the first Media Key that validates.
*/
pub fn derive_media_key(mkb: &Mkb, processing_keys: &[[u8; 16]]) -> AacsResult<[u8; 16]> {
    let verification_data = mkb.mk_verification_data()?;
    let pairs = mkb.uv_cvalue_pairs()?;

    for pk in processing_keys {
        for (uv, cvalue) in &pairs {
            if let Some(mk) = validate_pk(pk, cvalue, uv, &verification_data) {
                log::debug!("processing key validated against MKB, media key recovered");
                return Ok(mk);
            }
        }
    }

    Err(AacsError::NoValidProcessingKey)
}

/**
    Volume Unique Key derivation (§ Volume Unique Key Derivation):
    `VUK := AES-128-ECB-decrypt(MK, VID) XOR VID`.
*/
pub fn derive_vuk(mk: &[u8; 16], vid: &[u8; 16]) -> [u8; 16] {
    let mut vuk = aes128_ecb_decrypt_block(mk, vid);
    for i in 0..16 {
        vuk[i] ^= vid[i];
    }
    vuk
}
