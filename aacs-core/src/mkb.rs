use crate::error::CoreError;

const RECORD_TYPE_AND_VERSION: u8 = 0x10;
const RECORD_SUBSET_DIFFERENCE: u8 = 0x04;
const RECORD_CVALUES: u8 = 0x05;
const RECORD_MK_VERIFICATION_DATA: u8 = 0x81;
const RECORD_SIGNATURE: u8 = 0x02;

const RECORD_HEADER_LEN: usize = 4;
const UV_ENTRY_LEN: usize = 5;

/**
    A parsed Media Key Block.

    The MKB is a flat sequence of type-length-value records:

      [0]     type: u8
      [1..4]  length: u24 big-endian, INCLUDES the 4-byte header
      [4..]   payload: `length - 4` bytes

    Records may appear in any order; `record()` scans the whole buffer on
    every call rather than assuming a fixed layout.
*/
#[derive(Debug, Clone)]
pub struct Mkb {
    buf: Vec<u8>,
}

impl Mkb {
    /**
        Wrap a raw MKB byte buffer (as read from `MKB_RO.inf`) for parsing.
    */
    pub fn from_bytes(buf: Vec<u8>) -> Self {
        Self { buf }
    }

    /**
        Raw underlying bytes.
    */
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /**
        Scan for the first record of the given type.

        Returns `(offset, length)` where `length` includes the 4-byte
        header. A record whose declared length is less than 4, or that
        would run past the end of the buffer, aborts the scan and is
        treated as "not found" rather than looping or panicking.
    */
    fn record(&self, record_type: u8) -> Option<(usize, usize)> {
        let mut pos = 0usize;
        while pos + RECORD_HEADER_LEN <= self.buf.len() {
            let len = read_u24_be(&self.buf[pos + 1..pos + 4]) as usize;
            if len < RECORD_HEADER_LEN || pos + len > self.buf.len() {
                return None;
            }
            if self.buf[pos] == record_type {
                return Some((pos, len));
            }
            pos += len;
        }
        None
    }

    fn record_payload(&self, record_type: u8) -> Result<&[u8], CoreError> {
        let (offset, len) = self
            .record(record_type)
            .ok_or(CoreError::MkbRecordNotFound(record_type))?;
        Ok(&self.buf[offset + RECORD_HEADER_LEN..offset + len])
    }

    /**
        `(mkb_type, version)` from the Type-and-Version record (`0x10`).
    */
    pub fn type_and_version(&self) -> Result<(u32, u32), CoreError> {
        let payload = self.record_payload(RECORD_TYPE_AND_VERSION)?;
        if payload.len() < 8 {
            return Err(CoreError::MkbMalformed(
                "type-and-version record too short".into(),
            ));
        }
        let mkb_type = u32::from_be_bytes(payload[0..4].try_into().unwrap());
        let version = u32::from_be_bytes(payload[4..8].try_into().unwrap());
        Ok((mkb_type, version))
    }

    /**
        Raw bytes of the Subset-Difference Index record (`0x04`), a
        concatenation of 5-byte UV entries.
    */
    pub fn subset_diff_records(&self) -> Result<&[u8], CoreError> {
        self.record_payload(RECORD_SUBSET_DIFFERENCE)
    }

    /**
        Raw bytes of the Encrypted C-values record (`0x05`), a
        concatenation of 16-byte ciphertexts parallel to the UV entries.
    */
    pub fn cvalues(&self) -> Result<&[u8], CoreError> {
        self.record_payload(RECORD_CVALUES)
    }

    /**
        The 16-byte Media Key Verification Data from record `0x81`.
    */
    pub fn mk_verification_data(&self) -> Result<[u8; 16], CoreError> {
        let payload = self.record_payload(RECORD_MK_VERIFICATION_DATA)?;
        payload
            .get(..16)
            .ok_or_else(|| CoreError::MkbMalformed("verification data record too short".into()))?
            .try_into()
            .map_err(|_| CoreError::MkbMalformed("verification data record too short".into()))
    }

    /**
        Raw bytes of the MKB signature record (`0x02`).
    */
    pub fn signature(&self) -> Result<&[u8], CoreError> {
        self.record_payload(RECORD_SIGNATURE)
    }

    /**
        Enumerate `(uv, cvalue)` pairs for Processing Key validation.

        Walks the UV list 5 bytes at a time, stopping at the terminator
        (first byte with either top bit set), then zips the resulting UVs
        against the 16-byte c-values. If the two lists disagree in count —
        unguarded in the original format — iteration stops at
        `min(num_uvs, num_cvalues)`.
    */
    pub fn uv_cvalue_pairs(&self) -> Result<Vec<([u8; 4], [u8; 16])>, CoreError> {
        let uvs = self.subset_diff_records()?;
        let cvalues = self.cvalues()?;

        let mut num_uvs = 0usize;
        let mut i = 0usize;
        while i + UV_ENTRY_LEN <= uvs.len() {
            if uvs[i] & 0xC0 != 0 {
                break;
            }
            num_uvs += 1;
            i += UV_ENTRY_LEN;
        }

        let num_cvalues = cvalues.len() / 16;
        let n = num_uvs.min(num_cvalues);

        let mut pairs = Vec::with_capacity(n);
        for idx in 0..n {
            let uv: [u8; 4] = uvs[idx * UV_ENTRY_LEN + 1..idx * UV_ENTRY_LEN + UV_ENTRY_LEN]
                .try_into()
                .unwrap();
            let cvalue: [u8; 16] = cvalues[idx * 16..idx * 16 + 16].try_into().unwrap();
            pairs.push((uv, cvalue));
        }
        Ok(pairs)
    }
}

fn read_u24_be(bytes: &[u8]) -> u32 {
    (bytes[0] as u32) << 16 | (bytes[1] as u32) << 8 | bytes[2] as u32
}
