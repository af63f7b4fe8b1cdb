//! Shared-memory error types

use nix::errno::Errno;
use thiserror::Error;

/// Errors from the shared-memory layer.
///
/// None of these are recoverable: the protocol relies on every peer behaving, so any
/// of them ends the process.
#[derive(Debug, Error)]
pub enum ShmError {
    #[error("Instance index {index} out of range for {total} instances")]
    IdentityOutOfRange { index: usize, total: usize },

    #[error("Total instance count {total} out of range (1..={max})")]
    TotalOutOfRange { total: usize, max: usize },

    #[error("Invalid segment name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("{op} failed on {name}")]
    Os {
        op: &'static str,
        name: String,
        #[source]
        source: Errno,
    },

    #[error("{op} failed on {name}")]
    Io {
        op: &'static str,
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unexpected segment state for {name}: {detail}")]
    UnexpectedStat { name: String, detail: String },

    #[error("Record of {size} bytes does not fit in a {page_size} byte page")]
    RecordTooLarge { size: usize, page_size: usize },

    #[error("{flag} flag of own slot was already {state}")]
    FlagState { flag: &'static str, state: bool },

    #[error("Segment {name} is mapped read-only")]
    ReadOnly { name: String },
}

impl ShmError {
    pub(crate) fn os(op: &'static str, name: impl Into<String>, source: Errno) -> Self {
        ShmError::Os {
            op,
            name: name.into(),
            source,
        }
    }

    pub(crate) fn io(op: &'static str, name: impl Into<String>, source: std::io::Error) -> Self {
        ShmError::Io {
            op,
            name: name.into(),
            source,
        }
    }
}
