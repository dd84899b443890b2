use std::fs;
use std::path::{Path, PathBuf};

use zeroize::Zeroize;

use crate::error::{AacsError, AacsResult};

/**
    Credentials used to authenticate an [`crate::mmc::MmcSession`] against a
    physical drive, in order to read back a disc's Volume ID.
*/
#[derive(Debug, Clone, PartialEq, Eq, Zeroize)]
pub struct HostCredential {
    pub priv_key: [u8; 20],
    pub cert: [u8; 92],
    pub nonce: [u8; 20],
    pub key_point: [u8; 40],
}

/**
    Key material the key database pre-associates with a specific disc,
    identified by its 20-byte [`crate::disc::disc_hash`].

    Any subset of the optional fields may be present; the config-entry
    matcher imports whichever are populated and lets the waterfall derive
    the rest.
*/
#[derive(Debug, Clone, PartialEq, Eq, Default, Zeroize)]
pub struct DiscEntry {
    pub disc_id: [u8; 20],
    pub mk: Option<[u8; 16]>,
    pub vid: Option<[u8; 16]>,
    pub vuk: Option<[u8; 16]>,
    pub unit_keys: Option<Vec<[u8; 16]>>,
}

/**
    Parsed key database.

    This is the data model the AACS pipeline consumes; [`ConfigFile::parse`]
    implements a simplified, line-oriented textual format invented for this
    crate rather than the historical libaacs `KEYDB.cfg` grammar (see
    DESIGN.md). Callers who already have candidate keys in hand can also
    build a `ConfigFile` directly via its public fields.
*/
#[derive(Debug, Clone, Default, PartialEq, Eq, Zeroize)]
pub struct ConfigFile {
    pub processing_keys: Vec<[u8; 16]>,
    pub host_credentials: Vec<HostCredential>,
    pub disc_entries: Vec<DiscEntry>,
}

#[derive(Default)]
struct PendingCredential {
    priv_key: Option<[u8; 20]>,
    cert: Option<[u8; 92]>,
    nonce: Option<[u8; 20]>,
    key_point: Option<[u8; 40]>,
}

impl PendingCredential {
    fn is_empty(&self) -> bool {
        self.priv_key.is_none() && self.cert.is_none() && self.nonce.is_none() && self.key_point.is_none()
    }

    fn finish(self) -> AacsResult<HostCredential> {
        Ok(HostCredential {
            priv_key: self
                .priv_key
                .ok_or_else(|| malformed("host credential missing host_priv_key"))?,
            cert: self
                .cert
                .ok_or_else(|| malformed("host credential missing host_cert"))?,
            nonce: self
                .nonce
                .ok_or_else(|| malformed("host credential missing host_nonce"))?,
            key_point: self
                .key_point
                .ok_or_else(|| malformed("host credential missing host_key_point"))?,
        })
    }
}

fn malformed(msg: impl Into<String>) -> AacsError {
    AacsError::ConfigMalformed(msg.into())
}

fn parse_hex_array<const N: usize>(field: &str, value: &str) -> AacsResult<[u8; N]> {
    let bytes =
        hex::decode(value.trim()).map_err(|e| malformed(format!("{field}: invalid hex ({e})")))?;
    bytes
        .try_into()
        .map_err(|v: Vec<u8>| malformed(format!("{field}: expected {N} bytes, got {}", v.len())))
}

impl ConfigFile {
    /**
        Parse the simplified textual key database format from raw bytes.
    */
    pub fn parse(bytes: &[u8]) -> AacsResult<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| malformed(format!("config is not valid UTF-8 ({e})")))?;

        let mut config = ConfigFile::default();
        let mut pending_cred = PendingCredential::default();
        let mut current_disc: Option<DiscEntry> = None;

        let flush_credential = |config: &mut ConfigFile, pending: &mut PendingCredential| -> AacsResult<()> {
            if !pending.is_empty() {
                let taken = std::mem::take(pending);
                config.host_credentials.push(taken.finish()?);
            }
            Ok(())
        };

        let flush_disc = |config: &mut ConfigFile, current: &mut Option<DiscEntry>| {
            if let Some(entry) = current.take() {
                config.disc_entries.push(entry);
            }
        };

        for (lineno, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(rest) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
                let disc_id_hex = rest
                    .trim()
                    .strip_prefix("disc")
                    .ok_or_else(|| malformed(format!("line {}: expected [disc <id>]", lineno + 1)))?
                    .trim();
                flush_credential(&mut config, &mut pending_cred)?;
                flush_disc(&mut config, &mut current_disc);
                let disc_id = parse_hex_array::<20>("disc id", disc_id_hex)?;
                current_disc = Some(DiscEntry {
                    disc_id,
                    ..Default::default()
                });
                continue;
            }

            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| malformed(format!("line {}: expected key = value", lineno + 1)))?;
            let key = key.trim();
            let value = value.trim();

            if let Some(entry) = current_disc.as_mut() {
                match key {
                    "mek" => entry.mk = Some(parse_hex_array::<16>("mek", value)?),
                    "vid" => entry.vid = Some(parse_hex_array::<16>("vid", value)?),
                    "vuk" => entry.vuk = Some(parse_hex_array::<16>("vuk", value)?),
                    "uk" => entry
                        .unit_keys
                        .get_or_insert_with(Vec::new)
                        .push(parse_hex_array::<16>("uk", value)?),
                    other => return Err(malformed(format!("line {}: unknown disc field '{other}'", lineno + 1))),
                }
                continue;
            }

            match key {
                "processing_key" => config
                    .processing_keys
                    .push(parse_hex_array::<16>("processing_key", value)?),
                "host_priv_key" => {
                    flush_credential(&mut config, &mut pending_cred)?;
                    pending_cred.priv_key = Some(parse_hex_array::<20>("host_priv_key", value)?);
                }
                "host_cert" => pending_cred.cert = Some(parse_hex_array::<92>("host_cert", value)?),
                "host_nonce" => pending_cred.nonce = Some(parse_hex_array::<20>("host_nonce", value)?),
                "host_key_point" => {
                    pending_cred.key_point = Some(parse_hex_array::<40>("host_key_point", value)?)
                }
                other => return Err(malformed(format!("line {}: unknown field '{other}'", lineno + 1))),
            }
        }

        flush_credential(&mut config, &mut pending_cred)?;
        flush_disc(&mut config, &mut current_disc);

        Ok(config)
    }

    /**
        Read and parse a key database file from disk.
    */
    pub fn load(path: &Path) -> AacsResult<Self> {
        let bytes = fs::read(path).map_err(|_| AacsError::ConfigMissing)?;
        Self::parse(&bytes)
    }

    /**
        Locate the config entry whose `disc_id` matches `hash`, comparing in
        constant time since disc identifiers double as key-database lookup
        keys derived from key material.
    */
    pub fn find_entry(&self, hash: &[u8; 20]) -> Option<&DiscEntry> {
        use subtle::ConstantTimeEq;
        self.disc_entries
            .iter()
            .find(|entry| entry.disc_id.ct_eq(hash).into())
    }
}

/**
    Resolve the key database config path per the documented search order:
    an explicit path, then `${HOME}/.libaacs/KEYDB.cfg`, then
    `/etc/libaacs/KEYDB.cfg`. The first *readable* candidate wins.
*/
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    resolve_config_path_with_home(explicit, home.as_deref())
}

/**
    Same search order as [`resolve_config_path`], with `home` injected
    rather than read from the environment, so tests do not depend on the
    real user's `$HOME`.
*/
fn resolve_config_path_with_home(explicit: Option<&Path>, home: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        return None;
    }

    if let Some(home) = home {
        let candidate = home.join(".libaacs/KEYDB.cfg");
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    let system = PathBuf::from("/etc/libaacs/KEYDB.cfg");
    if system.is_file() {
        return Some(system);
    }

    None
}
