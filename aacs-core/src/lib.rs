#![allow(clippy::doc_overindented_list_items)]

mod aes;
mod constants;
mod error;
mod mkb;
mod sha1;
mod ts;

pub use self::aes::{aes128_cbc_decrypt, aes128_ecb_decrypt_block, aes128_ecb_encrypt_block};
pub use self::constants::{ALIGNED_UNIT_LEN, PACKET_LEN, PK_VERIFICATION_PREFIX, UNIT_CBC_IV};
pub use self::error::CoreError;
pub use self::mkb::Mkb;
pub use self::sha1::sha1_digest;
pub use self::ts::ts_sanity_check;
