use sha1::{Digest, Sha1};

/**
    SHA-1 digest of a byte range. Used to compute the disc-identity hash
    over the raw `Unit_Key_RO.inf` file.
*/
pub fn sha1_digest(data: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().into()
}
