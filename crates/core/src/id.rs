//! Strongly-typed identifiers used across the domain.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Identifier of one allocation session (one load of a source list).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

/// Identifier of a source line (a purchase-order item), as issued by the
/// order-detail backend.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceLineId(u64);

macro_rules! impl_uuid_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Create a new identifier.
            ///
            /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
            /// for determinism.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::from_str(s)
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Ok(Self(uuid))
            }
        }
    };
}

impl_uuid_newtype!(SessionId, "SessionId");

impl SourceLineId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for SourceLineId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<u64> for SourceLineId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl FromStr for SourceLineId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s
            .trim()
            .parse::<u64>()
            .map_err(|e| DomainError::invalid_id(format!("SourceLineId: {e}")))?;
        Ok(Self(raw))
    }
}

/// Identifier of a committed allocation.
///
/// Combines the source line with a session-wide monotonic sequence number, so
/// two commits against the same line in quick succession can never collide and
/// a removed id is never handed out again.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct AllocationId {
    source_line_id: SourceLineId,
    seq: u64,
}

impl AllocationId {
    pub fn new(source_line_id: SourceLineId, seq: u64) -> Self {
        Self {
            source_line_id,
            seq,
        }
    }

    pub fn source_line_id(&self) -> SourceLineId {
        self.source_line_id
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl core::fmt::Display for AllocationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}-{}", self.source_line_id, self.seq)
    }
}

impl FromStr for AllocationId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (line, seq) = s
            .split_once('-')
            .ok_or_else(|| DomainError::invalid_id(format!("AllocationId: missing '-' in {s:?}")))?;
        let source_line_id = line.parse::<SourceLineId>()?;
        let seq = seq
            .parse::<u64>()
            .map_err(|e| DomainError::invalid_id(format!("AllocationId: {e}")))?;
        Ok(Self::new(source_line_id, seq))
    }
}

impl From<AllocationId> for String {
    fn from(value: AllocationId) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for AllocationId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_id_display_and_parse_agree() {
        let id = AllocationId::new(SourceLineId::new(42), 7);
        assert_eq!(id.to_string(), "42-7");
        assert_eq!("42-7".parse::<AllocationId>().unwrap(), id);
    }

    #[test]
    fn allocation_id_serializes_as_string() {
        let id = AllocationId::new(SourceLineId::new(3), 11);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"3-11\"");
        let back: AllocationId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn malformed_ids_are_rejected() {
        assert!(matches!(
            "42".parse::<AllocationId>(),
            Err(DomainError::InvalidId(_))
        ));
        assert!(matches!(
            "x-1".parse::<AllocationId>(),
            Err(DomainError::InvalidId(_))
        ));
        assert!(matches!(
            "not-a-uuid".parse::<SessionId>(),
            Err(DomainError::InvalidId(_))
        ));
    }
}
