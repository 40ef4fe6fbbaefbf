//! File-based VG/global locking, one `flock(2)`-held file per scope
//! under `/run/lock/lvm`, kept from the teacher's own `src/flock.rs`.

use std::borrow::Cow;
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use nix::fcntl::{flock, FlockArg};

use crate::error::Result;

const LVM_LOCK_DIR: &str = "/run/lock/lvm";

/// Held for as long as this value lives; dropping it releases the lock
/// (the underlying `flock(2)` is released when the fd closes).
pub struct Flock {
    _locked_file: File,
}

pub enum LockScope {
    Global,
    Vg(String),
}

impl Flock {
    pub fn lock_exclusive(scope: LockScope) -> Result<Flock> {
        Self::lock(scope, FlockArg::LockExclusive)
    }

    pub fn lock_shared(scope: LockScope) -> Result<Flock> {
        Self::lock(scope, FlockArg::LockShared)
    }

    fn lock(scope: LockScope, lock_type: FlockArg) -> Result<Flock> {
        let mut pathbuf: PathBuf = LVM_LOCK_DIR.into();
        let filename: Cow<Path> = match scope {
            LockScope::Global => Cow::Borrowed(Path::new("P_global")),
            LockScope::Vg(name) => Cow::Owned(PathBuf::from(format!("V_{}", name))),
        };
        pathbuf.push(filename);

        std::fs::create_dir_all(LVM_LOCK_DIR)?;
        let f = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&pathbuf)?;
        flock(f.as_raw_fd(), lock_type)?;
        Ok(Flock { _locked_file: f })
    }
}
