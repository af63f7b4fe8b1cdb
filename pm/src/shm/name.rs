//! Validated POSIX shared-memory segment names

use std::fmt;

use crate::error::ShmError;

/// Longest name the kernel accepts for a shared-memory object (NAME_MAX)
pub const MAX_NAME_LEN: usize = 255;

/// The two segments every instance owns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Semaphore,
    Data,
}

impl SegmentKind {
    fn label(self) -> &'static str {
        match self {
            SegmentKind::Semaphore => "semaphore",
            SegmentKind::Data => "data",
        }
    }
}

/// A shared-memory object name: `/` followed by one path component
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SegmentName(String);

impl SegmentName {
    pub fn new(name: impl Into<String>) -> Result<Self, ShmError> {
        let name = name.into();
        let reason = if !name.starts_with('/') {
            Some("must start with '/'")
        } else if name.len() == 1 {
            Some("must have a component after '/'")
        } else if name[1..].contains('/') {
            Some("must not contain '/' after the first character")
        } else if name.contains('\0') {
            Some("must not contain NUL")
        } else if name.len() > MAX_NAME_LEN {
            Some("longer than 255 bytes")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(ShmError::InvalidName { name, reason }),
            None => Ok(Self(name)),
        }
    }

    /// Name of an instance's segment: `<prefix>_<kind>_<index>`
    pub fn for_instance(prefix: &str, kind: SegmentKind, index: usize) -> Result<Self, ShmError> {
        Self::new(format!("{prefix}_{}_{index}", kind.label()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SegmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SegmentName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Check that a prefix yields valid names for every index up to `max_index`
pub fn validate_prefix(prefix: &str, max_index: usize) -> Result<(), ShmError> {
    SegmentName::for_instance(prefix, SegmentKind::Semaphore, max_index)?;
    SegmentName::for_instance(prefix, SegmentKind::Data, max_index)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_names() {
        let sem = SegmentName::for_instance("/portamon", SegmentKind::Semaphore, 3).unwrap();
        let data = SegmentName::for_instance("/portamon", SegmentKind::Data, 0).unwrap();
        assert_eq!(sem.as_str(), "/portamon_semaphore_3");
        assert_eq!(data.to_string(), "/portamon_data_0");
    }

    #[test]
    fn test_rejects_malformed_names() {
        for name in ["portamon", "/", "/a/b", "/nul\0byte"] {
            assert!(
                matches!(SegmentName::new(name), Err(ShmError::InvalidName { .. })),
                "{name:?}"
            );
        }
    }

    #[test]
    fn test_length_limit() {
        let longest = format!("/{}", "a".repeat(MAX_NAME_LEN - 1));
        assert!(SegmentName::new(longest.clone()).is_ok());
        assert!(SegmentName::new(format!("{longest}a")).is_err());
    }

    #[test]
    fn test_prefix_validation_accounts_for_suffix() {
        assert!(validate_prefix("/portamon", 9999).is_ok());
        let prefix = format!("/{}", "p".repeat(MAX_NAME_LEN - 10));
        assert!(validate_prefix(&prefix, 9999).is_err());
    }
}
