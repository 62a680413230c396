//! Peer and object identifiers, versioned wire messages, and an in-memory
//! link for running several peers in one process.

pub mod ids;
pub mod link;
pub mod messages;

pub use ids::{ObjectId, PeerId, RESERVED_SERIALS};
pub use link::{LinkError, LocalLink};
pub use messages::{
    BodyStateUpdate, Despawn, EventEnvelope, Hello, MessageError, NetMessage, OwnershipTransfer,
    PROTOCOL_VERSION, Spawn, WireState, check_size, deserialize_message, serialize_message,
};
