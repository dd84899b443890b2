use std::fs;
use std::path::Path;

use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use aacs_core::{Mkb, ALIGNED_UNIT_LEN};

use crate::config::{resolve_config_path, ConfigFile};
use crate::disc::disc_hash;
use crate::error::{AacsError, AacsResult};
use crate::mmc::MmcSession;
use crate::pipeline::{derive_media_key, derive_vuk, match_entry, MatchOutcome};
use crate::unit::{decrypt_unit, derive_unit_keys};

/**
    An opened AACS session: the immutable state that survives the
    open→decrypt→close lifecycle (§ Session Object).

    Everything transient that `open` touches along the way — the tried
    Processing Key, the Media Key, the Volume Unique Key, and the parsed
    `ConfigFile` — is wiped with [`zeroize`] and dropped before `open`
    returns, on every exit path, including early returns via `?`. There is
    no explicit `close`: the unit keys and Volume ID held here are wiped in
    turn when an `AacsSession` itself drops.
*/
#[derive(Debug, Zeroize, ZeroizeOnDrop)]
pub struct AacsSession {
    uks: Vec<[u8; 16]>,
    vid: [u8; 16],
}

impl AacsSession {
    /**
        Derive the key material for `disc_path`, consulting `config_path`
        (or the default search order, see [`resolve_config_path`]) and
        `mmc` as needed.

        Drives the control flow in § System Overview: resolve and parse the
        config, match it against the disc's identity hash, and either take
        whatever shortcut the matched entry allows or fall through the
        MK → VUK → UK waterfall. On success, only the unit keys and the
        Volume ID survive in the returned session; everything else is
        zeroized before this function returns.
    */
    pub fn open(
        disc_path: &Path,
        config_path: Option<&Path>,
        mmc: &mut dyn MmcSession,
    ) -> AacsResult<Self> {
        let resolved = resolve_config_path(config_path).ok_or(AacsError::ConfigMissing)?;
        let config = Zeroizing::new(ConfigFile::load(&resolved)?);

        let hash = disc_hash(disc_path)?;

        let mut mk: Option<Zeroizing<[u8; 16]>> = None;
        let mut vuk: Option<Zeroizing<[u8; 16]>> = None;
        let mut vid: Option<[u8; 16]> = None;
        let mut uks: Vec<[u8; 16]> = Vec::new();

        match match_entry(&config, &hash) {
            MatchOutcome::HaveUnitKeys(entry_uks) => {
                log::debug!("config entry supplies unit keys directly, skipping waterfall");
                uks = entry_uks.to_vec();
            }
            MatchOutcome::Partial(entry) => {
                log::debug!("config entry matched, importing whatever key material it supplies");
                mk = entry.mk.map(Zeroizing::new);
                vid = entry.vid;
                vuk = entry.vuk.map(Zeroizing::new);
            }
            MatchOutcome::None => {
                log::debug!("disc hash matches no config entry, waterfall will derive from scratch");
            }
        }

        if uks.is_empty() {
            if mk.is_none() {
                let mkb_path = disc_path.join("AACS").join("MKB_RO.inf");
                let mkb_bytes = fs::read(&mkb_path)
                    .map_err(|_| AacsError::DiscFilesMissing(mkb_path.display().to_string()))?;
                let mkb = Mkb::from_bytes(mkb_bytes);
                let derived = derive_media_key(&mkb, &config.processing_keys)?;
                mk = Some(Zeroizing::new(derived));
                // `mkb` (and its backing buffer) is dropped here, at the end of this block.
            } else {
                log::debug!("media key already known, skipping MKB waterfall");
            }

            if vuk.is_none() {
                let mk_ref = mk.as_deref().expect("media key derived or imported above");
                if let Some(vid_val) = vid {
                    log::debug!("volume id already known, taking VUK fast path");
                    vuk = Some(Zeroizing::new(derive_vuk(mk_ref, &vid_val)));
                } else {
                    log::debug!("no volume id on hand, trying host credentials against mmc");
                    let mut found_vid = None;
                    for cred in &config.host_credentials {
                        if let Some(v) = mmc.read_vid(disc_path, cred) {
                            found_vid = Some(v);
                            break;
                        }
                    }
                    let vid_val = found_vid.ok_or_else(|| {
                        log::warn!("no host credential yielded a volume id");
                        AacsError::NoVolumeId
                    })?;
                    vuk = Some(Zeroizing::new(derive_vuk(mk_ref, &vid_val)));
                    vid = Some(vid_val);
                }
            }

            let vuk_ref = vuk
                .as_deref()
                .ok_or(AacsError::UnitKeyDerivationFailed)?;
            uks = derive_unit_keys(disc_path, vuk_ref)?;
        }

        Ok(Self {
            uks,
            vid: vid.unwrap_or([0u8; 16]),
        })
        // `config`, `mk`, and `vuk` are dropped (and zeroized) here, on every path
        // that reaches this point, and on every early return above via `?`.
    }

    /**
        Decrypt one 6,144-byte aligned unit in place.

        Tries each candidate unit key in order (§ Unit Decryption) until one
        passes the transport-stream sanity check. Returns `false`, leaving
        `buf` untouched, if no candidate key works — including the case
        where this session holds no unit keys at all.
    */
    pub fn decrypt_unit(&self, buf: &mut [u8; ALIGNED_UNIT_LEN]) -> bool {
        decrypt_unit(&self.uks, buf)
    }

    /**
        Borrow this session's Volume ID.

        All-zero if `open` never had to establish one — e.g. a config entry
        supplied unit keys directly without a paired VID (§ Session Object).
    */
    pub fn vid(&self) -> &[u8; 16] {
        &self.vid
    }

    /**
        Number of Content Protection System unit keys this session holds.
    */
    pub fn num_unit_keys(&self) -> usize {
        self.uks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostCredential;
    use crate::mmc::NoMmc;
    use aacs_core::{aes128_ecb_encrypt_block, UNIT_CBC_IV};
    use std::io::Write;

    struct TestDisc {
        dir: std::path::PathBuf,
    }

    impl TestDisc {
        fn new(name: &str) -> Self {
            let dir = std::env::temp_dir().join(format!("aacs-session-test-{name}"));
            let _ = fs::remove_dir_all(&dir);
            fs::create_dir_all(dir.join("AACS")).unwrap();
            Self { dir }
        }

        fn write_unit_key_file(&self, vuk: &[u8; 16], uks: &[[u8; 16]]) -> [u8; 20] {
            let key_table_offset: u32 = 16;
            let mut contents = Vec::new();
            contents.extend_from_slice(&key_table_offset.to_be_bytes());
            contents.resize(key_table_offset as usize, 0);
            contents.extend_from_slice(&(uks.len() as u16).to_be_bytes());
            contents.resize(key_table_offset as usize + 48, 0);
            for uk in uks {
                let enc = aes128_ecb_encrypt_block(vuk, uk);
                contents.extend_from_slice(&enc);
                contents.resize(contents.len() + (48 - 16), 0);
            }
            let path = self.dir.join("AACS").join("Unit_Key_RO.inf");
            fs::write(&path, &contents).unwrap();
            aacs_core::sha1_digest(&contents)
        }

        fn write_config(&self, text: &str) -> std::path::PathBuf {
            let path = self.dir.join("KEYDB.cfg");
            let mut f = fs::File::create(&path).unwrap();
            f.write_all(text.as_bytes()).unwrap();
            path
        }

        fn write_mkb(&self, bytes: &[u8]) {
            fs::write(self.dir.join("AACS").join("MKB_RO.inf"), bytes).unwrap();
        }
    }

    fn record(record_type: u8, payload: &[u8]) -> Vec<u8> {
        let len = (4 + payload.len()) as u32;
        let mut buf = vec![record_type];
        buf.extend_from_slice(&len.to_be_bytes()[1..]);
        buf.extend_from_slice(payload);
        buf
    }

    fn hexs(bytes: &[u8]) -> String {
        hex::encode(bytes)
    }

    #[test]
    fn open_fails_when_config_missing() {
        let disc = TestDisc::new("no-config");
        let mut mmc = NoMmc;
        let err = AacsSession::open(
            &disc.dir,
            Some(Path::new("/nonexistent/KEYDB.cfg")),
            &mut mmc,
        )
        .unwrap_err();
        assert!(matches!(err, AacsError::ConfigMissing));
    }

    #[test]
    fn open_fails_when_disc_files_missing() {
        let disc = TestDisc::new("no-disc-files");
        let config_path = disc.write_config("processing_key = 00\n");
        let mut mmc = NoMmc;
        let err = AacsSession::open(&disc.dir, Some(&config_path), &mut mmc).unwrap_err();
        assert!(matches!(err, AacsError::DiscFilesMissing(_)));
    }

    #[test]
    fn config_short_circuit_skips_mkb_entirely() {
        let disc = TestDisc::new("short-circuit");
        let vuk = [0x01u8; 16];
        let uk0 = [0x02u8; 16];
        let disc_id = disc.write_unit_key_file(&vuk, &[uk0]);
        // No MKB_RO.inf written at all: if the waterfall touched it, open would fail.

        let config_text = format!("[disc {}]\nuk = {}\n", hexs(&disc_id), hexs(&uk0));
        let config_path = disc.write_config(&config_text);

        let mut mmc = NoMmc;
        let session = AacsSession::open(&disc.dir, Some(&config_path), &mut mmc).unwrap();
        assert_eq!(session.num_unit_keys(), 1);
    }

    #[test]
    fn vid_fast_path_recovers_full_two_entry_unit_key_table() {
        let disc = TestDisc::new("vid-fast-path-two-keys");
        let mk = [0x10u8; 16];
        let vid = [0x20u8; 16];
        let vuk = derive_vuk(&mk, &vid);
        let uk0 = [0x30u8; 16];
        let uk1 = [0x31u8; 16];
        let disc_id = disc.write_unit_key_file(&vuk, &[uk0, uk1]);

        let config_text = format!(
            "[disc {}]\nmek = {}\nvid = {}\n",
            hexs(&disc_id),
            hexs(&mk),
            hexs(&vid),
        );
        let config_path = disc.write_config(&config_text);

        let mut mmc = NoMmc;
        let session = AacsSession::open(&disc.dir, Some(&config_path), &mut mmc).unwrap();
        assert_eq!(session.vid(), &vid);
        assert_eq!(session.num_unit_keys(), 2);
    }

    #[test]
    fn vid_fast_path_never_invokes_mmc() {
        struct PanicsIfCalled;
        impl MmcSession for PanicsIfCalled {
            fn read_vid(&mut self, _path: &Path, _cred: &HostCredential) -> Option<[u8; 16]> {
                panic!("mmc must not be invoked when config supplies mk and vid");
            }
        }

        let disc = TestDisc::new("vid-fast-path");
        let mk = [0x10u8; 16];
        let vid = [0x20u8; 16];
        let vuk = derive_vuk(&mk, &vid);
        let uk0 = [0x30u8; 16];
        let disc_id = disc.write_unit_key_file(&vuk, &[uk0]);

        let config_text = format!(
            "[disc {}]\nmek = {}\nvid = {}\n",
            hexs(&disc_id),
            hexs(&mk),
            hexs(&vid),
        );
        let config_path = disc.write_config(&config_text);

        let mut mmc = PanicsIfCalled;
        let session = AacsSession::open(&disc.dir, Some(&config_path), &mut mmc).unwrap();
        assert_eq!(session.vid(), &vid);
        assert_eq!(session.num_unit_keys(), 1);
    }

    #[test]
    fn full_waterfall_from_mkb_and_mmc() {
        struct FixedVid(Option<[u8; 16]>);
        impl MmcSession for FixedVid {
            fn read_vid(&mut self, _path: &Path, _cred: &HostCredential) -> Option<[u8; 16]> {
                self.0
            }
        }

        let disc = TestDisc::new("full-waterfall");

        let pk = [0x00u8; 16];
        let uv = [0xAA, 0xBB, 0xCC, 0xDD];
        let mut mk = [0x44u8; 16];
        for i in 0..4 {
            mk[12 + i] ^= uv[i];
        }

        let mut verification_plain = [0u8; 16];
        verification_plain[0..8].copy_from_slice(&aacs_core::PK_VERIFICATION_PREFIX);
        let verification_data = aes128_ecb_encrypt_block(&mk, &verification_plain);

        let mut pre_xor = mk;
        for i in 0..4 {
            pre_xor[12 + i] ^= uv[i];
        }
        let cvalue = aes128_ecb_encrypt_block(&pk, &pre_xor);

        let mut mkb_bytes = Vec::new();
        let mut uv_payload = Vec::new();
        uv_payload.push(0x00);
        uv_payload.extend_from_slice(&uv);
        uv_payload.push(0xC0); // terminator
        mkb_bytes.extend(record(0x04, &uv_payload));
        mkb_bytes.extend(record(0x05, &cvalue));
        mkb_bytes.extend(record(0x81, &verification_data));
        disc.write_mkb(&mkb_bytes);

        let vid = [0x55u8; 16];
        let vuk = derive_vuk(&mk, &vid);
        let uk0 = [0x66u8; 16];
        let disc_id = disc.write_unit_key_file(&vuk, &[uk0]);
        // Deliberately don't match this disc id in the config, so the waterfall
        // runs from scratch rather than through the config-entry shortcut.
        let _ = disc_id;

        let config_text = format!(
            "processing_key = {}\nhost_priv_key = {}\nhost_cert = {}\nhost_nonce = {}\nhost_key_point = {}\n",
            hexs(&pk),
            hex::encode([0x01u8; 20]),
            hex::encode([0x02u8; 92]),
            hex::encode([0x03u8; 20]),
            hex::encode([0x04u8; 40]),
        );
        let config_path = disc.write_config(&config_text);

        let mut mmc = FixedVid(Some(vid));
        let session = AacsSession::open(&disc.dir, Some(&config_path), &mut mmc).unwrap();
        assert_eq!(session.vid(), &vid);
        assert_eq!(session.num_unit_keys(), 1);
    }

    #[test]
    fn waterfall_fails_closed_without_a_volume_id() {
        let disc = TestDisc::new("no-vid");

        let pk = [0x00u8; 16];
        let uv = [0x01, 0x02, 0x03, 0x04];
        let mut mk = [0x11u8; 16];
        for i in 0..4 {
            mk[12 + i] ^= uv[i];
        }
        let mut verification_plain = [0u8; 16];
        verification_plain[0..8].copy_from_slice(&aacs_core::PK_VERIFICATION_PREFIX);
        let verification_data = aes128_ecb_encrypt_block(&mk, &verification_plain);
        let mut pre_xor = mk;
        for i in 0..4 {
            pre_xor[12 + i] ^= uv[i];
        }
        let cvalue = aes128_ecb_encrypt_block(&pk, &pre_xor);

        let mut mkb_bytes = Vec::new();
        let mut uv_payload = Vec::new();
        uv_payload.push(0x00);
        uv_payload.extend_from_slice(&uv);
        uv_payload.push(0xC0);
        mkb_bytes.extend(record(0x04, &uv_payload));
        mkb_bytes.extend(record(0x05, &cvalue));
        mkb_bytes.extend(record(0x81, &verification_data));
        disc.write_mkb(&mkb_bytes);

        disc.write_unit_key_file(&[0u8; 16], &[]);

        let config_text = format!("processing_key = {}\n", hexs(&pk));
        let config_path = disc.write_config(&config_text);

        let mut mmc = NoMmc;
        let err = AacsSession::open(&disc.dir, Some(&config_path), &mut mmc).unwrap_err();
        assert!(matches!(err, AacsError::NoVolumeId));
    }

    #[test]
    fn empty_uv_list_fails_with_no_valid_processing_key() {
        let disc = TestDisc::new("empty-uv-list");
        let mut mkb_bytes = Vec::new();
        mkb_bytes.extend(record(0x04, &[0xFF, 0xFF])); // terminator only, zero UVs
        mkb_bytes.extend(record(0x05, &[]));
        mkb_bytes.extend(record(0x81, &[0u8; 16]));
        disc.write_mkb(&mkb_bytes);
        disc.write_unit_key_file(&[0u8; 16], &[]);

        let config_text = format!("processing_key = {}\n", hexs(&[0x00u8; 16]));
        let config_path = disc.write_config(&config_text);

        let mut mmc = NoMmc;
        let err = AacsSession::open(&disc.dir, Some(&config_path), &mut mmc).unwrap_err();
        assert!(matches!(err, AacsError::NoValidProcessingKey));
    }

    #[test]
    fn session_with_no_unit_keys_fails_every_encrypted_unit() {
        let session = AacsSession {
            uks: Vec::new(),
            vid: [0u8; 16],
        };
        let mut buf = [0u8; ALIGNED_UNIT_LEN];
        buf[0] = 0x80;
        assert!(!session.decrypt_unit(&mut buf));
    }

    #[test]
    fn session_decrypts_through_its_public_api() {
        let uk = [0x42u8; 16];
        let mut header = [0u8; 16];
        header[0] = 0x80;

        let mut derived_key = aes128_ecb_encrypt_block(&uk, &header);
        for i in 0..16 {
            derived_key[i] ^= header[i];
        }

        let mut payload = vec![0u8; ALIGNED_UNIT_LEN - 16];
        for i in (0..payload.len()).step_by(192) {
            payload[i] = 0x47;
        }

        let aes_key = aes::Aes128::new_from_slice(&derived_key).unwrap();
        use aes::cipher::generic_array::GenericArray;
        use aes::cipher::{BlockEncrypt, KeyInit};
        use aes::Aes128;

        let mut prev = UNIT_CBC_IV;
        let mut ciphertext = Vec::with_capacity(payload.len());
        for chunk in payload.chunks(16) {
            let mut block = [0u8; 16];
            block[..chunk.len()].copy_from_slice(chunk);
            for i in 0..16 {
                block[i] ^= prev[i];
            }
            let mut ga = GenericArray::clone_from_slice(&block);
            aes_key.encrypt_block(&mut ga);
            let out: [u8; 16] = ga.into();
            ciphertext.extend_from_slice(&out);
            prev = out;
        }

        let mut buf = [0u8; ALIGNED_UNIT_LEN];
        buf[0..16].copy_from_slice(&header);
        buf[16..].copy_from_slice(&ciphertext);

        let session = AacsSession {
            uks: vec![uk],
            vid: [0u8; 16],
        };
        assert!(session.decrypt_unit(&mut buf));
        assert_eq!(buf[0] & 0xC0, 0);
    }
}
