//! Per-instance slot record and its plain-data body

use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{AtomicU32, Ordering};

use super::region::SharedRecord;
use crate::quantity::{Mode, QUANTITY_COUNT, Quantity};

/// Axis bounds one instance has published for one quantity
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PublishedBound {
    valid: u32,
    _reserved: u32,
    min: f64,
    max: f64,
}

/// Everything in a slot that is only read or written under the owner's semaphore.
///
/// Flags are stored as `u32` rather than `bool` so that any bytes a peer leaves
/// behind still form a valid value.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SlotBody {
    valid: u32,
    mode: u32,
    bounds: [PublishedBound; QUANTITY_COUNT],
}

impl SlotBody {
    /// Whether the slot carries any published bounds
    pub fn is_valid(&self) -> bool {
        self.valid != 0
    }

    /// Mode the published bounds belong to
    pub fn mode(&self) -> Option<Mode> {
        Mode::from_tag(self.mode)
    }

    /// Published `(min, max)` for a quantity, if its valid flag is set
    pub fn bound(&self, quantity: Quantity) -> Option<(f64, f64)> {
        let bound = &self.bounds[quantity.index()];
        (bound.valid != 0).then_some((bound.min, bound.max))
    }

    /// Publish bounds for a quantity and mark the slot valid for `mode`
    pub fn publish(&mut self, mode: Mode, quantity: Quantity, min: f64, max: f64) {
        self.bounds[quantity.index()] = PublishedBound {
            valid: 1,
            _reserved: 0,
            min,
            max,
        };
        self.mode = mode.tag();
        self.valid = 1;
    }

    /// Stop publishing one quantity; the slot goes invalid once nothing is left
    pub fn withdraw(&mut self, quantity: Quantity) {
        self.bounds[quantity.index()].valid = 0;
        if self.bounds.iter().all(|bound| bound.valid == 0) {
            self.valid = 0;
        }
    }

    /// Clear the overall and every per-quantity valid flag
    pub fn invalidate(&mut self) {
        self.valid = 0;
        for bound in &mut self.bounds {
            bound.valid = 0;
        }
    }
}

/// Shared record owned by one instance
#[repr(C)]
pub struct SlotRecord {
    initialized: AtomicU32,
    quit: AtomicU32,
    body: UnsafeCell<SlotBody>,
}

// SAFETY: repr(C); all-zero is "not initialized, not quit, nothing published"; peers
// change the flags through atomics and the body through the UnsafeCell
unsafe impl SharedRecord for SlotRecord {}

/// The two lifecycle flags of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotFlag {
    Initialized,
    Quit,
}

impl SlotFlag {
    pub fn name(self) -> &'static str {
        match self {
            SlotFlag::Initialized => "initialized",
            SlotFlag::Quit => "quit",
        }
    }
}

impl SlotRecord {
    fn flag(&self, flag: SlotFlag) -> &AtomicU32 {
        match flag {
            SlotFlag::Initialized => &self.initialized,
            SlotFlag::Quit => &self.quit,
        }
    }

    /// Read a lifecycle flag
    pub fn is_set(&self, flag: SlotFlag) -> bool {
        self.flag(flag).load(Ordering::SeqCst) != 0
    }

    /// Set a lifecycle flag, returning its previous state
    ///
    /// # Safety
    ///
    /// The slot must be mapped writable.
    pub(crate) unsafe fn set(&self, flag: SlotFlag) -> bool {
        self.flag(flag).swap(1, Ordering::SeqCst) != 0
    }

    /// Copy the body out.
    ///
    /// # Safety
    ///
    /// The caller must hold the owner's semaphore.
    pub(crate) unsafe fn read_body(&self) -> SlotBody {
        // SAFETY: the pointer is valid for the mapping's life; the lock excludes writers
        unsafe { ptr::read_volatile(self.body.get()) }
    }

    /// Overwrite the body.
    ///
    /// # Safety
    ///
    /// The slot must be mapped writable and the caller must hold the owner's semaphore.
    pub(crate) unsafe fn write_body(&self, body: SlotBody) {
        // SAFETY: as in `read_body`, plus the mapping is writable
        unsafe { ptr::write_volatile(self.body.get(), body) }
    }

    /// Zero the whole record, flags included.
    ///
    /// # Safety
    ///
    /// The slot must be mapped writable, and no peer may hold its semaphore (only the
    /// owner calls this, before raising `initialized`).
    pub(crate) unsafe fn zero(&self) {
        self.initialized.store(0, Ordering::SeqCst);
        self.quit.store(0, Ordering::SeqCst);
        // SAFETY: see the function contract
        unsafe { self.write_body(SlotBody::default()) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_body_publishes_nothing() {
        let body = SlotBody::default();
        assert!(!body.is_valid());
        assert_eq!(body.mode(), None);
        for q in Quantity::ALL {
            assert_eq!(body.bound(q), None);
        }
    }

    #[test]
    fn test_publish_and_invalidate() {
        let mut body = SlotBody::default();
        body.publish(Mode::FitTest, Quantity::Ambient, 3.0, 5.0);
        assert!(body.is_valid());
        assert_eq!(body.mode(), Some(Mode::FitTest));
        assert_eq!(body.bound(Quantity::Ambient), Some((3.0, 5.0)));
        assert_eq!(body.bound(Quantity::Sample), None);

        body.invalidate();
        assert!(!body.is_valid());
        assert_eq!(body.bound(Quantity::Ambient), None);
    }

    #[test]
    fn test_withdrawing_last_bound_invalidates_slot() {
        let mut body = SlotBody::default();
        body.publish(Mode::FitTest, Quantity::Ambient, 3.0, 5.0);
        body.publish(Mode::FitTest, Quantity::Sample, 0.0, 1.0);

        body.withdraw(Quantity::Ambient);
        assert!(body.is_valid());
        assert_eq!(body.bound(Quantity::Ambient), None);
        assert_eq!(body.bound(Quantity::Sample), Some((0.0, 1.0)));

        body.withdraw(Quantity::Sample);
        assert!(!body.is_valid());
    }

    #[test]
    fn test_record_fits_in_a_page() {
        assert!(std::mem::size_of::<SlotRecord>() <= 4096);
    }
}
