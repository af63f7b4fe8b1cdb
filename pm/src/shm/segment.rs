//! Race-safe creation and opening of named segments

use std::fs::{File, Metadata, Permissions};
use std::os::unix::fs::{MetadataExt, PermissionsExt, fchown};
use std::thread;
use std::time::Duration;

use fs2::FileExt;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::mman::{shm_open, shm_unlink};
use nix::sys::stat::Mode;
use nix::unistd::{getegid, geteuid};
use tracing::{debug, trace};

use super::name::SegmentName;
use super::region::Access;
use crate::error::ShmError;

/// Permission bits every segment must carry (owner read/write only)
pub const SEGMENT_MODE: u32 = 0o600;

/// A segment opened, validated and held under a shared file lock.
///
/// The lock keeps a creator from resizing underneath us while we map; `release`
/// drops it once the mapping exists.
#[derive(Debug)]
pub struct OpenedSegment {
    name: SegmentName,
    file: File,
}

impl OpenedSegment {
    pub fn name(&self) -> &SegmentName {
        &self.name
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    /// Drop the shared lock and close the descriptor
    pub fn release(self) -> Result<(), ShmError> {
        FileExt::unlock(&self.file).map_err(|e| ShmError::io("flock unlock", self.name.as_str(), e))
    }
}

/// Create the segment if nobody has, otherwise open the existing one.
///
/// Creation happens with mode 000 so that openers racing us get `EACCES` (and poll)
/// until it has been sized and opened up to 0600. Openers that get in anyway (root
/// ignores the mode) block on the creator's exclusive lock, or see a zero-length
/// segment and poll again.
pub fn acquire_or_create(
    name: &SegmentName,
    len: usize,
    access: Access,
    poll: Duration,
) -> Result<OpenedSegment, ShmError> {
    debug!(%name, len, ?access, "acquire_or_create: called");
    create(name, len)?;

    let oflag = match access {
        Access::ReadOnly => OFlag::O_RDONLY,
        Access::ReadWrite => OFlag::O_RDWR,
    };

    loop {
        let file = open_polling(name, oflag, poll)?;

        file.set_permissions(Permissions::from_mode(SEGMENT_MODE))
            .map_err(|e| ShmError::io("fchmod", name.as_str(), e))?;
        fchown(&file, Some(geteuid().as_raw()), Some(getegid().as_raw()))
            .map_err(|e| ShmError::io("fchown", name.as_str(), e))?;
        FileExt::lock_shared(&file).map_err(|e| ShmError::io("flock shared", name.as_str(), e))?;

        let meta = file.metadata().map_err(|e| ShmError::io("fstat", name.as_str(), e))?;
        if meta.len() == 0 && len != 0 {
            trace!(%name, "acquire_or_create: creator has not sized the segment yet");
            FileExt::unlock(&file).map_err(|e| ShmError::io("flock unlock", name.as_str(), e))?;
            drop(file);
            thread::sleep(poll);
            continue;
        }

        validate(name, &meta, len)?;
        debug!(%name, "acquire_or_create: segment opened");
        return Ok(OpenedSegment {
            name: name.clone(),
            file,
        });
    }
}

/// Try to be the creator; losing the race is fine
fn create(name: &SegmentName, len: usize) -> Result<(), ShmError> {
    let fd = match shm_open(
        name.as_str(),
        OFlag::O_RDWR | OFlag::O_CREAT | OFlag::O_EXCL,
        Mode::empty(),
    ) {
        Ok(fd) => fd,
        Err(Errno::EEXIST) => {
            trace!(%name, "create: segment already exists");
            return Ok(());
        }
        Err(e) => return Err(ShmError::os("shm_open create", name.as_str(), e)),
    };

    let file = File::from(fd);
    FileExt::lock_exclusive(&file).map_err(|e| ShmError::io("flock exclusive", name.as_str(), e))?;
    file.set_len(len as u64)
        .map_err(|e| ShmError::io("ftruncate", name.as_str(), e))?;
    file.set_permissions(Permissions::from_mode(SEGMENT_MODE))
        .map_err(|e| ShmError::io("fchmod", name.as_str(), e))?;
    FileExt::unlock(&file).map_err(|e| ShmError::io("flock unlock", name.as_str(), e))?;

    debug!(%name, len, "create: created segment");
    Ok(())
}

/// Open, polling while the creator still has the segment at mode 000
fn open_polling(name: &SegmentName, oflag: OFlag, poll: Duration) -> Result<File, ShmError> {
    loop {
        match shm_open(name.as_str(), oflag, Mode::empty()) {
            Ok(fd) => return Ok(File::from(fd)),
            Err(Errno::EACCES) => {
                trace!(%name, "open_polling: permission denied, creator still busy");
                thread::sleep(poll);
            }
            Err(e) => return Err(ShmError::os("shm_open", name.as_str(), e)),
        }
    }
}

/// Check kind, size, permissions and ownership against what we expect
pub fn validate(name: &SegmentName, meta: &Metadata, len: usize) -> Result<(), ShmError> {
    let euid = geteuid().as_raw();
    let egid = getegid().as_raw();
    let mode = meta.mode() & 0o7777;

    let detail = if !meta.is_file() {
        Some("not a regular file".to_string())
    } else if mode != SEGMENT_MODE {
        Some(format!("mode {mode:o}, expected {SEGMENT_MODE:o}"))
    } else if meta.len() != len as u64 {
        Some(format!("size {}, expected {len}", meta.len()))
    } else if meta.uid() != euid || meta.gid() != egid {
        Some(format!(
            "owner {}:{}, expected {euid}:{egid}",
            meta.uid(),
            meta.gid()
        ))
    } else {
        None
    };

    match detail {
        Some(detail) => Err(ShmError::UnexpectedStat {
            name: name.to_string(),
            detail,
        }),
        None => Ok(()),
    }
}

/// Remove a segment name; a name that is already gone is not an error
pub fn unlink(name: &SegmentName) -> Result<(), ShmError> {
    match shm_unlink(name.as_str()) {
        Ok(()) => {
            debug!(%name, "unlink: removed segment");
            Ok(())
        }
        Err(Errno::ENOENT) => {
            trace!(%name, "unlink: already removed");
            Ok(())
        }
        Err(e) => Err(ShmError::os("shm_unlink", name.as_str(), e)),
    }
}
