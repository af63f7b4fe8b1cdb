//! POSIX shared-memory segments
//!
//! Naming, race-safe creation, guarded mappings, the per-instance semaphore and slot,
//! and the manager that ties the 2N segments of a group together.

mod manager;
mod name;
mod region;
mod segment;
mod semaphore;
mod slot;

pub use manager::SharedRegionManager;
pub use name::{MAX_NAME_LEN, SegmentKind, SegmentName, validate_prefix};
pub use region::{Access, IsolatedMapping, SharedRecord, SharedRegion, page_size};
pub use segment::{OpenedSegment, SEGMENT_MODE, acquire_or_create, unlink, validate};
pub use semaphore::{RawSemaphore, Semaphore};
pub use slot::{PublishedBound, SlotBody, SlotFlag, SlotRecord};
