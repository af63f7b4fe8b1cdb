//! Cross-instance axis synchronization
//!
//! Each refresh, an instance publishes its own meaningful bounds into its slot and
//! widens them by whatever its peers have published for the same mode. Every slot is
//! touched under its owner's lock only, one lock at a time, so a full snapshot is not
//! atomic; instances converge over successive refreshes.

use tracing::{debug, trace};

use crate::axis::AxisBounds;
use crate::error::ShmError;
use crate::instance::Instance;
use crate::quantity::{Mode, Quantity};
use crate::shm::SlotBody;

/// Access to the slots of a group of instances
pub trait SlotBoard {
    /// Identity of the instance that owns the writable slot
    fn instance(&self) -> Instance;

    /// Modify our own slot body while holding our own lock
    fn update_own<R>(&self, f: impl FnOnce(&mut SlotBody) -> R) -> Result<R, ShmError>;

    /// Snapshot a peer's slot body while holding that peer's lock
    fn read_peer(&self, peer: usize) -> Result<SlotBody, ShmError>;
}

/// Fold a peer's published bound into `merged`, if the peer has one for this mode.
///
/// Default bounds carry no data, so the first contributing peer replaces them rather
/// than widening them.
pub fn fold_peer(merged: AxisBounds, peer: &SlotBody, mode: Mode, quantity: Quantity) -> AxisBounds {
    if !peer.is_valid() || peer.mode() != Some(mode) {
        return merged;
    }
    match peer.bound(quantity) {
        Some((min, max)) if merged.is_default => AxisBounds {
            min,
            max,
            is_default: false,
        },
        Some((min, max)) => merged.union(min, max),
        None => merged,
    }
}

/// Publish-then-merge protocol over a `SlotBoard`
#[derive(Debug, Default, Clone, Copy)]
pub struct CrossInstanceAxisSync;

impl CrossInstanceAxisSync {
    /// Publish the non-default entries of `local` and merge in every peer's bounds.
    ///
    /// Anything else previously published (a quantity since reset, or one of another
    /// mode) is withdrawn first.
    ///
    /// The result keeps the order of `local`. An entry stays flagged default only when
    /// the local bound was default and no peer contributed to it.
    pub fn synchronize<B: SlotBoard>(
        board: &B,
        mode: Mode,
        local: &[(Quantity, AxisBounds)],
    ) -> Result<Vec<(Quantity, AxisBounds)>, ShmError> {
        let instance = board.instance();
        debug!(%instance, %mode, quantities = local.len(), "CrossInstanceAxisSync::synchronize: called");

        // The slot mirrors exactly this call: stale or default entries are withdrawn
        let published = board.update_own(|body| {
            let mut published = 0;
            for quantity in Quantity::ALL {
                match local.iter().find(|(q, _)| *q == quantity) {
                    Some(&(_, bounds)) if !bounds.is_default => {
                        body.publish(mode, quantity, bounds.min, bounds.max);
                        published += 1;
                    }
                    _ => body.withdraw(quantity),
                }
            }
            published
        })?;
        trace!(%instance, published, "CrossInstanceAxisSync::synchronize: published own bounds");

        let mut merged = local.to_vec();
        for peer in instance.peers() {
            let body = board.read_peer(peer)?;
            for (quantity, bounds) in merged.iter_mut() {
                *bounds = fold_peer(*bounds, &body, mode, *quantity);
            }
        }
        Ok(merged)
    }

    /// Clear our own slot so peers stop merging our bounds
    pub fn withdraw<B: SlotBoard>(board: &B) -> Result<(), ShmError> {
        debug!(instance = %board.instance(), "CrossInstanceAxisSync::withdraw: called");
        board.update_own(SlotBody::invalidate)
    }
}
