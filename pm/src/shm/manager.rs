//! Shared segments of every instance in a group
//!
//! Each instance owns one semaphore segment and one data segment. Everyone maps every
//! semaphore read-write (waiting and posting writes to it) but only its own data
//! segment; peers' data segments are mapped read-only.

use std::mem::size_of;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::name::{SegmentKind, SegmentName, validate_prefix};
use super::region::{Access, SharedRegion};
use super::segment::{acquire_or_create, unlink};
use super::semaphore::{RawSemaphore, Semaphore};
use super::slot::{SlotBody, SlotFlag, SlotRecord};
use crate::error::ShmError;
use crate::instance::Instance;
use crate::rendezvous::{Rendezvous, Signal, SignalBoard};
use crate::sync::SlotBoard;

struct SlotSegment {
    region: SharedRegion<SlotRecord>,
    name: SegmentName,
}

/// All 2N mapped segments of a group, from one instance's point of view
pub struct SharedRegionManager {
    instance: Instance,
    semaphores: Vec<Semaphore>,
    slots: Vec<SlotSegment>,
}

fn slot_flag(signal: Signal) -> SlotFlag {
    match signal {
        Signal::Initialized => SlotFlag::Initialized,
        Signal::Quit => SlotFlag::Quit,
    }
}

impl SharedRegionManager {
    /// Acquire (creating where needed), validate and map every segment of the group.
    ///
    /// `poll` is the retry interval while another instance is still creating a segment.
    pub fn open(instance: Instance, prefix: &str, poll: Duration) -> Result<Self, ShmError> {
        debug!(%instance, %prefix, ?poll, "SharedRegionManager::open: called");
        validate_prefix(prefix, instance.total() - 1)?;

        let mut semaphores = Vec::with_capacity(instance.total());
        let mut slots = Vec::with_capacity(instance.total());

        for index in 0..instance.total() {
            let name = SegmentName::for_instance(prefix, SegmentKind::Semaphore, index)?;
            let region = map_segment::<RawSemaphore>(&name, Access::ReadWrite, poll)?;
            semaphores.push(Semaphore::new(region, name));

            let name = SegmentName::for_instance(prefix, SegmentKind::Data, index)?;
            let access = if index == instance.index() {
                Access::ReadWrite
            } else {
                Access::ReadOnly
            };
            let region = map_segment::<SlotRecord>(&name, access, poll)?;
            slots.push(SlotSegment { region, name });
        }

        info!(%instance, %prefix, segments = 2 * instance.total(), "Mapped shared segments");
        Ok(Self {
            instance,
            semaphores,
            slots,
        })
    }

    pub fn instance(&self) -> Instance {
        self.instance
    }

    fn own_semaphore(&self) -> &Semaphore {
        &self.semaphores[self.instance.index()]
    }

    fn own_slot(&self) -> Result<&SlotSegment, ShmError> {
        let slot = &self.slots[self.instance.index()];
        match slot.region.access() {
            Access::ReadWrite => Ok(slot),
            Access::ReadOnly => Err(ShmError::ReadOnly {
                name: slot.name.to_string(),
            }),
        }
    }

    fn peer(&self, peer: usize) -> Result<(&Semaphore, &SlotSegment), ShmError> {
        match (self.semaphores.get(peer), self.slots.get(peer)) {
            (Some(semaphore), Some(slot)) => Ok((semaphore, slot)),
            _ => Err(ShmError::IdentityOutOfRange {
                index: peer,
                total: self.instance.total(),
            }),
        }
    }

    /// Initialize our semaphore and slot, then wait for every peer to do the same
    pub fn barrier_init(&self, rendezvous: &Rendezvous) -> Result<(), ShmError> {
        debug!(instance = %self.instance, "SharedRegionManager::barrier_init: called");
        self.own_semaphore().init()?;
        let slot = self.own_slot()?;
        // SAFETY: our slot is writable and no peer touches it before we raise `initialized`
        unsafe { slot.region.zero() };
        rendezvous.arrive(self, Signal::Initialized)
    }

    /// Withdraw our bounds, wait for every peer to quit, then release everything.
    ///
    /// Unlinking is best effort across the group: whoever gets there first removes the
    /// names and the others find them already gone.
    pub fn barrier_teardown(self, rendezvous: &Rendezvous) -> Result<(), ShmError> {
        debug!(instance = %self.instance, "SharedRegionManager::barrier_teardown: called");
        self.update_own(SlotBody::invalidate)?;
        rendezvous.arrive(&self, Signal::Quit)?;
        self.own_semaphore().destroy()?;

        let mut names = Vec::with_capacity(2 * self.instance.total());
        for semaphore in self.semaphores {
            names.push(semaphore.name().clone());
            semaphore.unmap()?;
        }
        for slot in self.slots {
            slot.region
                .unmap()
                .map_err(|e| ShmError::os("munmap", slot.name.as_str(), e))?;
            names.push(slot.name);
        }
        for name in &names {
            unlink(name)?;
        }

        info!(instance = %self.instance, "Released shared segments");
        Ok(())
    }
}

/// Acquire one segment sized for `T` and map it; the file lock is held until mapped
fn map_segment<T: super::region::SharedRecord>(
    name: &SegmentName,
    access: Access,
    poll: Duration,
) -> Result<SharedRegion<T>, ShmError> {
    let segment = acquire_or_create(name, size_of::<T>(), access, poll)?;
    let region = SharedRegion::<T>::map(segment.file(), access, name)?;
    if let Err(e) = segment.release() {
        warn!(%name, error = %e, "Failed to release segment lock after mapping");
        return Err(e);
    }
    Ok(region)
}

impl SlotBoard for SharedRegionManager {
    fn instance(&self) -> Instance {
        self.instance
    }

    fn update_own<R>(&self, f: impl FnOnce(&mut SlotBody) -> R) -> Result<R, ShmError> {
        let slot = self.own_slot()?;
        self.own_semaphore().with_lock(|| {
            // SAFETY: we hold our own semaphore and our slot is mapped writable
            let mut body = unsafe { slot.region.read_body() };
            let result = f(&mut body);
            unsafe { slot.region.write_body(body) };
            result
        })
    }

    fn read_peer(&self, peer: usize) -> Result<SlotBody, ShmError> {
        let (semaphore, slot) = self.peer(peer)?;
        // SAFETY: we hold the owner's semaphore, so the owner is not writing
        semaphore.with_lock(|| unsafe { slot.region.read_body() })
    }
}

impl SignalBoard for SharedRegionManager {
    fn instance(&self) -> Instance {
        self.instance
    }

    fn raise(&self, signal: Signal) -> Result<(), ShmError> {
        let slot = self.own_slot()?;
        // SAFETY: our slot is mapped writable
        if unsafe { slot.region.set(slot_flag(signal)) } {
            return Err(ShmError::FlagState {
                flag: signal.name(),
                state: true,
            });
        }
        Ok(())
    }

    fn is_raised(&self, peer: usize, signal: Signal) -> bool {
        self.slots
            .get(peer)
            .is_some_and(|slot| slot.region.is_set(slot_flag(signal)))
    }
}
