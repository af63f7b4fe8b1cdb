//! Process-shared binary semaphore living in its own segment

use std::cell::UnsafeCell;

use nix::errno::Errno;
use tracing::trace;

use super::name::SegmentName;
use super::region::{SharedRecord, SharedRegion};
use crate::error::ShmError;

/// Segment contents: one bare `sem_t`
#[repr(C)]
pub struct RawSemaphore {
    sem: UnsafeCell<libc::sem_t>,
}

// SAFETY: repr(C), the only field is interior-mutable, and sem_init runs before any
// peer uses it (the init barrier orders that)
unsafe impl SharedRecord for RawSemaphore {}

/// A mapped semaphore segment
pub struct Semaphore {
    region: SharedRegion<RawSemaphore>,
    name: SegmentName,
}

impl Semaphore {
    pub fn new(region: SharedRegion<RawSemaphore>, name: SegmentName) -> Self {
        Self { region, name }
    }

    pub fn name(&self) -> &SegmentName {
        &self.name
    }

    fn raw(&self) -> *mut libc::sem_t {
        self.region.sem.get()
    }

    /// Initialize as an unlocked process-shared mutex; only the owner calls this
    pub(crate) fn init(&self) -> Result<(), ShmError> {
        // SAFETY: the pointer is into our live mapping; pshared=1 because peers map it too
        let ret = unsafe { libc::sem_init(self.raw(), 1, 1) };
        check(ret, "sem_init", &self.name)
    }

    /// Destroy the semaphore; only the owner calls this, after every peer has quit
    pub(crate) fn destroy(&self) -> Result<(), ShmError> {
        // SAFETY: as in `init`; no peer waits on it any more
        let ret = unsafe { libc::sem_destroy(self.raw()) };
        check(ret, "sem_destroy", &self.name)
    }

    fn wait(&self) -> Result<(), ShmError> {
        loop {
            // SAFETY: as in `init`
            let ret = unsafe { libc::sem_wait(self.raw()) };
            if ret == 0 {
                return Ok(());
            }
            match Errno::last() {
                Errno::EINTR => continue,
                errno => return Err(ShmError::os("sem_wait", self.name.as_str(), errno)),
            }
        }
    }

    fn post(&self) -> Result<(), ShmError> {
        // SAFETY: as in `init`
        let ret = unsafe { libc::sem_post(self.raw()) };
        check(ret, "sem_post", &self.name)
    }

    /// Run `f` while holding the semaphore
    pub fn with_lock<R>(&self, f: impl FnOnce() -> R) -> Result<R, ShmError> {
        trace!(name = %self.name, "Semaphore::with_lock: waiting");
        self.wait()?;
        let result = f();
        self.post()?;
        Ok(result)
    }

    pub fn unmap(self) -> Result<(), ShmError> {
        let name = self.name;
        self.region.unmap().map_err(|e| ShmError::os("munmap", name.as_str(), e))
    }
}

fn check(ret: libc::c_int, op: &'static str, name: &SegmentName) -> Result<(), ShmError> {
    if ret == 0 {
        Ok(())
    } else {
        Err(ShmError::os(op, name.as_str(), Errno::last()))
    }
}
