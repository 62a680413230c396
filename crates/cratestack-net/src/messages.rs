//! Wire messages exchanged between session peers.

use serde::{Deserialize, Serialize};

use crate::ids::{ObjectId, PeerId};

/// Current wire protocol version. Bump on any breaking change.
pub const PROTOCOL_VERSION: u8 = 1;

// ---------------------------------------------------------------------------
// Top-level enum
// ---------------------------------------------------------------------------

/// Top-level network message. The enum discriminant is the type tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum NetMessage {
    // --- Session ---
    /// Protocol manifest sent once by each peer before anything else.
    Hello(Hello),

    // --- Objects ---
    /// A peer produced a shared body through a registered factory.
    Spawn(Spawn),
    /// The owner removed a shared body.
    Despawn(Despawn),
    /// The owner hands a body to another peer.
    OwnershipTransfer(OwnershipTransfer),
    /// Periodic authoritative state of an owned body.
    BodyState(BodyStateUpdate),

    // --- Events ---
    /// A session-level event.
    Event(EventEnvelope),
}

impl NetMessage {
    /// Short name used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            NetMessage::Hello(_) => "hello",
            NetMessage::Spawn(_) => "spawn",
            NetMessage::Despawn(_) => "despawn",
            NetMessage::OwnershipTransfer(_) => "ownership_transfer",
            NetMessage::BodyState(_) => "body_state",
            NetMessage::Event(_) => "event",
        }
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Everything two peers must agree on before exchanging objects or events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Hello {
    pub peer: PeerId,
    pub version: u8,
    pub session_seed: u64,
    /// Factory names in id order.
    pub factories: Vec<String>,
    /// Event tags in registration order.
    pub events: Vec<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Spawn {
    pub object: ObjectId,
    pub factory_id: u32,
    /// Fixed-layout parameter bytes produced by the factory.
    pub params: Vec<u8>,
    pub owner: PeerId,
    /// Reset epoch the sender was in. Receivers drop object traffic from
    /// any other epoch.
    pub epoch: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Despawn {
    pub object: ObjectId,
    pub epoch: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OwnershipTransfer {
    pub object: ObjectId,
    pub new_owner: PeerId,
    pub epoch: u32,
}

/// Kinematic state of one body as seen by its owner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct WireState {
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    pub vx: f32,
    pub vy: f32,
    pub angvel: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BodyStateUpdate {
    pub object: ObjectId,
    pub state: WireState,
    pub epoch: u32,
}

/// A session event: its registered tag, the sender's sequence number and the
/// encoded payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    pub tag: u16,
    pub sequence: u32,
    pub payload: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Errors that can occur when encoding or decoding a message.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// The payload was empty (no version byte).
    #[error("empty payload, no version byte")]
    EmptyPayload,

    /// The version byte does not match [`PROTOCOL_VERSION`].
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// The encoded frame exceeds the configured limit.
    #[error("message of {size} bytes exceeds limit of {limit}")]
    TooLarge { size: usize, limit: usize },

    /// Postcard (de)serialization failed.
    #[error("postcard error: {0}")]
    Postcard(#[from] postcard::Error),
}

// ---------------------------------------------------------------------------
// Serialization helpers
// ---------------------------------------------------------------------------

/// Serialize a [`NetMessage`] into a versioned binary payload.
///
/// Wire format: `[version: u8] [postcard-encoded NetMessage]`
pub fn serialize_message(msg: &NetMessage) -> Result<Vec<u8>, MessageError> {
    let body = postcard::to_allocvec(msg)?;
    let mut out = Vec::with_capacity(1 + body.len());
    out.push(PROTOCOL_VERSION);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Deserialize a versioned binary payload into a [`NetMessage`].
pub fn deserialize_message(data: &[u8]) -> Result<NetMessage, MessageError> {
    let Some((&version, body)) = data.split_first() else {
        return Err(MessageError::EmptyPayload);
    };
    if version != PROTOCOL_VERSION {
        return Err(MessageError::UnsupportedVersion(version));
    }
    Ok(postcard::from_bytes(body)?)
}

/// Rejects frames longer than `limit` bytes.
pub fn check_size(size: usize, limit: usize) -> Result<(), MessageError> {
    if size > limit {
        return Err(MessageError::TooLarge { size, limit });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn() -> NetMessage {
        NetMessage::Spawn(Spawn {
            object: ObjectId::new(PeerId::HOST, 2),
            factory_id: 0,
            params: vec![0, 0, 128, 63, 0, 0, 0, 64, 0, 0, 128, 63, 0, 0, 128, 63],
            owner: PeerId::HOST,
            epoch: 0,
        })
    }

    #[test]
    fn test_spawn_roundtrip() {
        let msg = spawn();
        let bytes = serialize_message(&msg).unwrap();
        assert_eq!(deserialize_message(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_hello_roundtrip() {
        let msg = NetMessage::Hello(Hello {
            peer: PeerId(1),
            version: PROTOCOL_VERSION,
            session_seed: u64::MAX,
            factories: vec!["crate".to_string()],
            events: vec![0, 1],
        });
        let bytes = serialize_message(&msg).unwrap();
        assert_eq!(deserialize_message(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_body_state_preserves_bits() {
        let state = WireState {
            x: 1.0e-7,
            y: -0.0,
            angle: std::f32::consts::PI,
            vx: f32::MAX,
            vy: f32::MIN_POSITIVE,
            angvel: -3.5,
        };
        let msg = NetMessage::BodyState(BodyStateUpdate {
            object: ObjectId::fixed(0),
            state,
            epoch: 3,
        });
        let bytes = serialize_message(&msg).unwrap();
        let NetMessage::BodyState(decoded) = deserialize_message(&bytes).unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(decoded.state.y.to_bits(), state.y.to_bits());
        assert_eq!(decoded.state.vx.to_bits(), state.vx.to_bits());
        assert_eq!(decoded.epoch, 3);
    }

    #[test]
    fn test_version_byte_is_first_byte() {
        let bytes = serialize_message(&spawn()).unwrap();
        assert_eq!(bytes[0], PROTOCOL_VERSION);
    }

    #[test]
    fn test_empty_payload_rejected() {
        assert!(matches!(
            deserialize_message(&[]),
            Err(MessageError::EmptyPayload)
        ));
    }

    #[test]
    fn test_wrong_version_rejected() {
        let mut bytes = serialize_message(&spawn()).unwrap();
        bytes[0] = PROTOCOL_VERSION + 1;
        assert!(matches!(
            deserialize_message(&bytes),
            Err(MessageError::UnsupportedVersion(v)) if v == PROTOCOL_VERSION + 1
        ));
    }

    #[test]
    fn test_corrupted_payload_rejected() {
        let result = deserialize_message(&[PROTOCOL_VERSION, 0xFF, 0xFF, 0xFF]);
        assert!(matches!(result, Err(MessageError::Postcard(_))));
    }

    #[test]
    fn test_check_size() {
        assert!(check_size(10, 10).is_ok());
        assert!(matches!(
            check_size(11, 10),
            Err(MessageError::TooLarge { size: 11, limit: 10 })
        ));
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(spawn().kind(), "spawn");
        let ev = NetMessage::Event(EventEnvelope {
            tag: 0,
            sequence: 1,
            payload: vec![],
        });
        assert_eq!(ev.kind(), "event");
    }
}
