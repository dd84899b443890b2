use std::path::Path;

use crate::config::HostCredential;

/**
    Seam to the physical drive's MMC/SCSI transport.

    Volume ID readback requires an authenticated `REPORT KEY` / `SEND KEY`
    handshake against the drive using a host certificate issued by AACS LA.
    That handshake is a collaborator concern outside this crate; callers
    supply an implementation, and [`NoMmc`] is provided for config-only
    sessions and tests where no drive is present.
*/
pub trait MmcSession {
    /**
        Authenticate with `cred` and read back the 16-byte Volume ID for the
        disc at `path`. Returns `None` if authentication or readback fails.
    */
    fn read_vid(&mut self, path: &Path, cred: &HostCredential) -> Option<[u8; 16]>;
}

/**
    Null [`MmcSession`] that never has a drive to talk to.
*/
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMmc;

impl MmcSession for NoMmc {
    fn read_vid(&mut self, _path: &Path, _cred: &HostCredential) -> Option<[u8; 16]> {
        None
    }
}
