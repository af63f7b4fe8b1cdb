//! Instance identity within a group of cooperating monitors

use std::fmt;

use crate::error::ShmError;

/// Upper limit on the number of cooperating instances
pub const MAX_INSTANCES: usize = 10_000;

/// Position of this process among `total` cooperating instances
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instance {
    index: usize,
    total: usize,
}

impl Instance {
    /// Validate an identity; the index must be below the total
    pub fn new(index: usize, total: usize) -> Result<Self, ShmError> {
        if total == 0 || total > MAX_INSTANCES {
            return Err(ShmError::TotalOutOfRange {
                total,
                max: MAX_INSTANCES,
            });
        }
        if index >= total {
            return Err(ShmError::IdentityOutOfRange { index, total });
        }
        Ok(Self { index, total })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Every other instance index, ascending
    pub fn peers(&self) -> impl Iterator<Item = usize> + use<> {
        let me = self.index;
        (0..self.total).filter(move |&i| i != me)
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.total)
    }
}
