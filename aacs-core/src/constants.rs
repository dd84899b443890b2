use hex_literal::hex;

/**
    Size of one aligned, encrypted content-protection unit: 32 MPEG-TS packets
    of 192 bytes each (188-byte packet plus a 4-byte TP_extra_header).
*/
pub const ALIGNED_UNIT_LEN: usize = 6144;

/**
    Size of one transport packet within an aligned unit, including its
    4-byte TP_extra_header.
*/
pub const PACKET_LEN: usize = 192;

/**
    Fixed IV for the AES-128-CBC decryption of an aligned unit's payload
    (everything past the first, plaintext, 16-byte block).
*/
pub const UNIT_CBC_IV: [u8; 16] = hex!("0ba0f8ddfea61fb3d8df9f566a050f78");

/**
    Expected plaintext prefix after decrypting MKB media-key-verification
    data with a candidate Media Key. A Processing Key / UV pair is valid
    only if this prefix is recovered.
*/
pub const PK_VERIFICATION_PREFIX: [u8; 8] = hex!("0123456789abcdef");
