use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use aacs_core::{aes128_cbc_decrypt, aes128_ecb_decrypt_block, aes128_ecb_encrypt_block, ts_sanity_check};
use aacs_core::{ALIGNED_UNIT_LEN, UNIT_CBC_IV};

use crate::error::{AacsError, AacsResult};

const UNIT_KEY_ENTRY_STRIDE: u64 = 48;

/**
    CPS Unit Key list derivation (§ Unit-Key List Derivation).

    Reads `{disc_path}/AACS/Unit_Key_RO.inf` and decrypts each entry's
    16-byte encrypted unit key under `vuk`. A short read partway through
    the table is not a hard failure: the unit key count is truncated to
    whatever was read successfully, mirroring the original's behavior of
    recording however many keys it managed to decrypt.
*/
pub fn derive_unit_keys(disc_path: &Path, vuk: &[u8; 16]) -> AacsResult<Vec<[u8; 16]>> {
    let path = disc_path.join("AACS").join("Unit_Key_RO.inf");
    let mut file =
        File::open(&path).map_err(|_| AacsError::DiscFilesMissing(path.display().to_string()))?;

    let mut header = [0u8; 4];
    file.read_exact(&mut header)
        .map_err(|_| AacsError::DiscFilesMissing(path.display().to_string()))?;
    let key_table_offset = u32::from_be_bytes(header) as u64;

    file.seek(SeekFrom::Start(key_table_offset))
        .map_err(|_| AacsError::DiscFilesMissing(path.display().to_string()))?;
    let mut count_buf = [0u8; 2];
    file.read_exact(&mut count_buf)
        .map_err(|_| AacsError::DiscFilesMissing(path.display().to_string()))?;
    let num_uks = u16::from_be_bytes(count_buf) as usize;

    let mut uks = Vec::with_capacity(num_uks);
    for i in 0..num_uks {
        let entry_offset = key_table_offset + UNIT_KEY_ENTRY_STRIDE * (i as u64 + 1);
        if file.seek(SeekFrom::Start(entry_offset)).is_err() {
            log::warn!("unit key table truncated at index {i}, expected {num_uks}");
            break;
        }
        let mut enc_uk = [0u8; 16];
        if file.read_exact(&mut enc_uk).is_err() {
            log::warn!("unit key table truncated at index {i}, expected {num_uks}");
            break;
        }
        uks.push(aes128_ecb_decrypt_block(vuk, &enc_uk));
    }

    Ok(uks)
}

/**
    Unit decryption (§ Unit Decryption): decrypts a 6,144-byte aligned unit
    in place, trying each candidate unit key in turn until the
    transport-stream sanity check passes.

    Unencrypted units (top two bits of the first byte clear) pass through
    unchanged. On success, the Copy Permission Indicator bits are cleared
    at every 192-byte packet boundary. On failure — no candidate key
    reconstructs a valid transport stream — `buf` is left untouched.
*/
pub fn decrypt_unit(uks: &[[u8; 16]], buf: &mut [u8; ALIGNED_UNIT_LEN]) -> bool {
    if buf[0] & 0xC0 == 0 {
        return true;
    }

    let header: [u8; 16] = buf[0..16].try_into().unwrap();

    for uk in uks {
        let mut derived_key = aes128_ecb_encrypt_block(uk, &header);
        for i in 0..16 {
            derived_key[i] ^= header[i];
        }

        let Ok(decrypted) = aes128_cbc_decrypt(&derived_key, &UNIT_CBC_IV, &buf[16..]) else {
            continue;
        };

        let mut out = Vec::with_capacity(ALIGNED_UNIT_LEN);
        out.extend_from_slice(&header);
        out.extend_from_slice(&decrypted);

        if ts_sanity_check(&out) {
            buf.copy_from_slice(&out);
            for i in (0..ALIGNED_UNIT_LEN).step_by(192) {
                buf[i] &= 0x3F;
            }
            return true;
        }
    }

    false
}
