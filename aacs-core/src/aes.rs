use aes::{
    Aes128,
    cipher::{BlockDecrypt, BlockEncrypt, KeyInit, generic_array::GenericArray},
};

use crate::error::CoreError;

/**
    Single-block AES-128-ECB decryption. Used throughout the key ladder
    (Processing Key validation, VUK derivation, unit key decryption) where
    every operand is exactly one 16-byte block.
*/
pub fn aes128_ecb_decrypt_block(key: &[u8; 16], block: &[u8; 16]) -> [u8; 16] {
    let cipher = Aes128::new(key.into());
    let mut buf = *GenericArray::from_slice(block);
    cipher.decrypt_block(&mut buf);
    buf.into()
}

/**
    Single-block AES-128-ECB encryption. Used to derive the per-unit key
    from a Content Protection System unit key and the unit's plaintext
    header block.
*/
pub fn aes128_ecb_encrypt_block(key: &[u8; 16], block: &[u8; 16]) -> [u8; 16] {
    let cipher = Aes128::new(key.into());
    let mut buf = *GenericArray::from_slice(block);
    cipher.encrypt_block(&mut buf);
    buf.into()
}

/**
    AES-128-CBC decryption of the encrypted portion of an aligned unit.

    `ciphertext` must be non-empty and a multiple of 16 bytes. Returns
    plaintext of the same length.
*/
pub fn aes128_cbc_decrypt(
    key: &[u8; 16],
    iv: &[u8; 16],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CoreError> {
    if ciphertext.is_empty() || !ciphertext.len().is_multiple_of(16) {
        return Err(CoreError::AesCbcInvalidInput(
            "ciphertext must be non-empty and block-aligned".into(),
        ));
    }

    let cipher = Aes128::new(key.into());
    let mut plaintext = Vec::with_capacity(ciphertext.len());
    let mut prev = *iv;

    for chunk in ciphertext.chunks_exact(16) {
        let saved: [u8; 16] = chunk.try_into().unwrap();
        let mut block = *GenericArray::from_slice(chunk);
        cipher.decrypt_block(&mut block);
        for i in 0..16 {
            plaintext.push(block[i] ^ prev[i]);
        }
        prev = saved;
    }

    Ok(plaintext)
}
