//! In-process board
//!
//! A group of instances living in one process, sharing slots through an `Arc` instead
//! of shared memory. Used to run the sync protocol and the barriers without touching
//! the system's shared-memory namespace.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::ShmError;
use crate::instance::Instance;
use crate::rendezvous::{Signal, SignalBoard};
use crate::shm::SlotBody;
use crate::sync::SlotBoard;

#[derive(Debug, Default)]
struct MemorySlot {
    body: Mutex<SlotBody>,
    initialized: AtomicBool,
    quit: AtomicBool,
}

impl MemorySlot {
    fn flag(&self, signal: Signal) -> &AtomicBool {
        match signal {
            Signal::Initialized => &self.initialized,
            Signal::Quit => &self.quit,
        }
    }
}

/// One instance's view of an in-process group
#[derive(Debug, Clone)]
pub struct MemoryBoard {
    instance: Instance,
    slots: Arc<Vec<MemorySlot>>,
}

impl MemoryBoard {
    /// Boards for every member of a group of `total` instances, in index order.
    ///
    /// An out-of-range `total` yields no boards.
    pub fn cluster(total: usize) -> Vec<MemoryBoard> {
        let slots: Arc<Vec<MemorySlot>> = Arc::new((0..total).map(|_| MemorySlot::default()).collect());
        (0..total)
            .filter_map(|index| Instance::new(index, total).ok())
            .map(|instance| MemoryBoard {
                instance,
                slots: Arc::clone(&slots),
            })
            .collect()
    }

    fn slot(&self, index: usize) -> Result<&MemorySlot, ShmError> {
        self.slots.get(index).ok_or(ShmError::IdentityOutOfRange {
            index,
            total: self.slots.len(),
        })
    }

    fn own(&self) -> &MemorySlot {
        &self.slots[self.instance.index()]
    }
}

impl SlotBoard for MemoryBoard {
    fn instance(&self) -> Instance {
        self.instance
    }

    fn update_own<R>(&self, f: impl FnOnce(&mut SlotBody) -> R) -> Result<R, ShmError> {
        let mut body = self.own().body.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(f(&mut *body))
    }

    fn read_peer(&self, peer: usize) -> Result<SlotBody, ShmError> {
        let body = self.slot(peer)?.body.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(*body)
    }
}

impl SignalBoard for MemoryBoard {
    fn instance(&self) -> Instance {
        self.instance
    }

    fn raise(&self, signal: Signal) -> Result<(), ShmError> {
        if self.own().flag(signal).swap(true, Ordering::SeqCst) {
            return Err(ShmError::FlagState {
                flag: signal.name(),
                state: true,
            });
        }
        Ok(())
    }

    fn is_raised(&self, peer: usize, signal: Signal) -> bool {
        self.slot(peer)
            .map(|slot| slot.flag(signal).load(Ordering::SeqCst))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantity::{Mode, Quantity};

    #[test]
    fn test_cluster_shares_slots() {
        let boards = MemoryBoard::cluster(2);
        boards[0]
            .update_own(|body| body.publish(Mode::Count, Quantity::Count, 1.0, 2.0))
            .unwrap();
        let seen = boards[1].read_peer(0).unwrap();
        assert_eq!(seen.bound(Quantity::Count), Some((1.0, 2.0)));
    }

    #[test]
    fn test_invalid_cluster_is_empty() {
        assert!(MemoryBoard::cluster(0).is_empty());
    }

    #[test]
    fn test_reading_unknown_peer_fails() {
        let boards = MemoryBoard::cluster(1);
        assert!(boards[0].read_peer(5).is_err());
        assert!(!boards[0].is_raised(5, Signal::Quit));
    }
}
