//! Authority core for a two-peer physics session: body ownership, replicated
//! object factories, ordered session events, and binary snapshots, tied
//! together by [`SceneController`].

pub mod events;
pub mod factory;
pub mod handshake;
pub mod ownership;
pub mod scene;
pub mod schedule;
pub mod snapshot;
pub mod visuals;

pub use events::{EventChannel, EventError, EventKind, InboundEvent, SessionEvent};
pub use factory::{
    CrateFactory, FactoryError, FactoryId, FactoryRegistry, ObjectFactory, ParamsError,
    SpawnParams, Spawned, variant_rng,
};
pub use handshake::{HandshakeError, ProtocolManifest};
pub use ownership::{OwnershipChange, OwnershipError, OwnershipRecord, OwnershipRegistry};
pub use scene::{CLIENT_PEER, PYRAMID, SceneController, SceneError, TickInput, TickReport};
pub use schedule::{FrameSteps, TickSchedule};
pub use snapshot::{
    CrateRecord, HEADER_LEN, RECORD_LEN, SimulationSnapshot, SnapshotError, load_snapshot,
    write_snapshot,
};
pub use visuals::{ProxyRegistry, VisualProxy, VisualSink, VisualTransform};
