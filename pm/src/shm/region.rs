//! Isolated shared mappings
//!
//! Every segment is mapped inside a larger `PROT_NONE` reservation, one guard page on
//! either side, so a stray access just past a record faults instead of landing in a
//! neighbouring mapping.

use std::ffi::c_void;
use std::fs::File;
use std::marker::PhantomData;
use std::mem::{ManuallyDrop, size_of};
use std::num::NonZeroUsize;
use std::ops::Deref;
use std::ptr::NonNull;

use nix::sys::mman::{MapFlags, ProtFlags, mmap, mmap_anonymous, munmap};
use nix::unistd::{SysconfVar, sysconf};
use tracing::{debug, warn};

use super::name::SegmentName;
use crate::error::ShmError;

/// How this process may touch a mapped segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

impl Access {
    fn prot(self) -> ProtFlags {
        match self {
            Access::ReadOnly => ProtFlags::PROT_READ,
            Access::ReadWrite => ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
        }
    }
}

/// A record type that can live in a shared mapping.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]`, valid when all bytes are zero, and keep every
/// field that another process may change behind an atomic or an `UnsafeCell`.
pub unsafe trait SharedRecord: Sized {}

/// System page size
pub fn page_size() -> Result<usize, ShmError> {
    match sysconf(SysconfVar::PAGE_SIZE) {
        Ok(Some(size)) if size > 0 => Ok(size as usize),
        Ok(_) => Err(ShmError::UnexpectedStat {
            name: "sysconf".to_string(),
            detail: "page size unavailable".to_string(),
        }),
        Err(e) => Err(ShmError::os("sysconf", "PAGE_SIZE", e)),
    }
}

/// An inaccessible address range owned by this process
struct Reservation {
    base: NonNull<c_void>,
    len: usize,
}

impl Reservation {
    fn new(len: NonZeroUsize, name: &SegmentName) -> Result<Self, ShmError> {
        // SAFETY: a fresh anonymous PROT_NONE mapping aliases nothing
        let base = unsafe {
            mmap_anonymous(
                None,
                len,
                ProtFlags::PROT_NONE,
                MapFlags::MAP_PRIVATE | MapFlags::MAP_NORESERVE,
            )
        }
        .map_err(|e| ShmError::os("mmap reserve", name.as_str(), e))?;
        Ok(Self { base, len: len.get() })
    }

    /// Address `offset` bytes into the reservation
    fn at(&self, offset: usize) -> Option<NonZeroUsize> {
        debug_assert!(offset < self.len);
        NonZeroUsize::new(self.base.as_ptr() as usize + offset)
    }

    fn release(self) -> nix::Result<()> {
        let this = ManuallyDrop::new(self);
        // SAFETY: the range was mapped by `new` and nothing borrows it once the owner is gone
        unsafe { munmap(this.base, this.len) }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        // SAFETY: as in `release`
        if let Err(e) = unsafe { munmap(self.base, self.len) } {
            warn!(error = %e, len = self.len, "Failed to unmap reservation");
        }
    }
}

/// A shared file mapping placed one page into a guarded reservation
pub struct IsolatedMapping {
    reservation: Reservation,
    data: NonNull<c_void>,
    len: usize,
    access: Access,
}

impl IsolatedMapping {
    /// Map `len` bytes of `file` with the given access
    pub fn map(file: &File, len: usize, access: Access, name: &SegmentName) -> Result<Self, ShmError> {
        let page = page_size()?;
        let length = NonZeroUsize::new(len).ok_or_else(|| ShmError::UnexpectedStat {
            name: name.to_string(),
            detail: "cannot map an empty segment".to_string(),
        })?;
        let reserved = len.div_ceil(page) * page + 2 * page;
        let reservation = Reservation::new(
            NonZeroUsize::new(reserved).ok_or_else(|| ShmError::RecordTooLarge { size: len, page_size: page })?,
            name,
        )?;

        let target = reservation.at(page);
        // SAFETY: MAP_FIXED only replaces pages inside our own reservation
        let data = unsafe {
            mmap(
                target,
                length,
                access.prot(),
                MapFlags::MAP_SHARED | MapFlags::MAP_FIXED,
                file,
                0,
            )
        }
        .map_err(|e| ShmError::os("mmap", name.as_str(), e))?;

        debug!(%name, len, reserved, ?access, "IsolatedMapping::map: mapped segment");
        Ok(Self {
            reservation,
            data,
            len,
            access,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn access(&self) -> Access {
        self.access
    }

    /// Unmap the segment and its guard pages
    pub fn unmap(self) -> nix::Result<()> {
        self.reservation.release()
    }
}

/// A typed view of an isolated mapping holding one `T`
pub struct SharedRegion<T: SharedRecord> {
    mapping: IsolatedMapping,
    _record: PhantomData<T>,
}

// SAFETY: the region owns its mapping; concurrent access to `T` goes through its
// atomics and interior-mutable fields, which is what `SharedRecord` promises
unsafe impl<T: SharedRecord> Send for SharedRegion<T> {}

impl<T: SharedRecord> SharedRegion<T> {
    /// Map a segment sized exactly for one `T`
    pub fn map(file: &File, access: Access, name: &SegmentName) -> Result<Self, ShmError> {
        let size = size_of::<T>();
        let page = page_size()?;
        if size > page {
            return Err(ShmError::RecordTooLarge { size, page_size: page });
        }
        Ok(Self {
            mapping: IsolatedMapping::map(file, size, access, name)?,
            _record: PhantomData,
        })
    }

    pub fn access(&self) -> Access {
        self.mapping.access()
    }

    /// Raw pointer to the record, for primitives that take one (e.g. `sem_wait`)
    pub(crate) fn as_ptr(&self) -> *mut T {
        self.mapping.data.as_ptr().cast::<T>()
    }

    pub fn unmap(self) -> nix::Result<()> {
        self.mapping.unmap()
    }
}

impl<T: SharedRecord> Deref for SharedRegion<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the mapping is page aligned, at least size_of::<T>() long, lives as long
        // as `self`, and `SharedRecord` makes any byte pattern peers may write observable
        // through `&T`
        unsafe { self.mapping.data.cast::<T>().as_ref() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[repr(C)]
    struct Counter {
        value: AtomicU64,
    }

    unsafe impl SharedRecord for Counter {}

    fn scratch_file(len: u64) -> (tempfile::NamedTempFile, File) {
        let temp = tempfile::NamedTempFile::new().unwrap();
        temp.as_file().set_len(len).unwrap();
        let file = std::fs::OpenOptions::new().read(true).write(true).open(temp.path()).unwrap();
        (temp, file)
    }

    #[test]
    fn test_two_mappings_share_a_file() {
        let (_temp, file) = scratch_file(size_of::<Counter>() as u64);
        let name = SegmentName::new("/scratch").unwrap();

        let writer = SharedRegion::<Counter>::map(&file, Access::ReadWrite, &name).unwrap();
        let reader = SharedRegion::<Counter>::map(&file, Access::ReadOnly, &name).unwrap();

        assert_eq!(reader.value.load(Ordering::SeqCst), 0);
        writer.value.store(42, Ordering::SeqCst);
        assert_eq!(reader.value.load(Ordering::SeqCst), 42);
        assert_eq!(reader.access(), Access::ReadOnly);

        writer.unmap().unwrap();
        reader.unmap().unwrap();
    }

    #[test]
    fn test_mapping_starts_one_page_into_reservation() {
        let (_temp, file) = scratch_file(64);
        let name = SegmentName::new("/scratch").unwrap();
        let mapping = IsolatedMapping::map(&file, 64, Access::ReadOnly, &name).unwrap();

        let page = page_size().unwrap();
        let base = mapping.reservation.base.as_ptr() as usize;
        assert_eq!(mapping.data.as_ptr() as usize, base + page);
        assert_eq!(mapping.reservation.len, 3 * page);
        assert_eq!(mapping.len(), 64);
    }

    #[test]
    fn test_empty_mapping_is_rejected() {
        let (_temp, file) = scratch_file(0);
        let name = SegmentName::new("/scratch").unwrap();
        assert!(IsolatedMapping::map(&file, 0, Access::ReadOnly, &name).is_err());
    }
}
