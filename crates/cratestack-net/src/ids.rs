//! Identifiers shared by every peer in a session.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of object serials reserved for scene-fixed objects that every peer
/// creates on its own (the two cannons).
pub const RESERVED_SERIALS: u32 = 2;

/// Identity of a peer in a session. The host is always peer 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub u32);

impl PeerId {
    pub const HOST: PeerId = PeerId(0);

    pub fn is_host(self) -> bool {
        self == Self::HOST
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer{}", self.0)
    }
}

/// Cross-peer identity of a shared body.
///
/// The producing peer allocates serials; `(producer, serial)` is unique for
/// the lifetime of a session. Physics handles are peer-local and never go on
/// the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId {
    pub producer: PeerId,
    pub serial: u32,
}

impl ObjectId {
    pub const fn new(producer: PeerId, serial: u32) -> Self {
        Self { producer, serial }
    }

    /// Scene-fixed object created identically by every peer.
    pub const fn fixed(serial: u32) -> Self {
        Self {
            producer: PeerId::HOST,
            serial,
        }
    }

    /// Whether this id names a scene-fixed object rather than a spawned one.
    pub fn is_fixed(self) -> bool {
        self.producer == PeerId::HOST && self.serial < RESERVED_SERIALS
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.producer, self.serial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_is_zero() {
        assert_eq!(PeerId::HOST, PeerId(0));
        assert!(PeerId::HOST.is_host());
        assert!(!PeerId(1).is_host());
    }

    #[test]
    fn test_fixed_ids() {
        assert!(ObjectId::fixed(0).is_fixed());
        assert!(ObjectId::fixed(1).is_fixed());
        assert!(!ObjectId::new(PeerId::HOST, RESERVED_SERIALS).is_fixed());
        assert!(!ObjectId::new(PeerId(1), 0).is_fixed());
    }

    #[test]
    fn test_display() {
        assert_eq!(ObjectId::new(PeerId(1), 7).to_string(), "peer1#7");
    }

    #[test]
    fn test_object_id_json_roundtrip() {
        let id = ObjectId::new(PeerId(3), 42);
        let json = serde_json::to_string(&id).unwrap();
        let back: ObjectId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
