//! Deterministic object factories.
//!
//! A shared object travels as `(factory id, parameter bytes)`. The producer
//! encodes the parameters, then both the producer and every receiver decode
//! those same bytes and run the same creation routine, so physical attributes
//! match exactly on all peers.
//!
//! Visual choices that need randomness draw from a ChaCha8 stream derived
//! from the session seed, the factory id and the parameter bytes. No shared
//! generator has to be advanced in lockstep across peers.
//!
//! ## Parameter layout
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 4 | position x (`f32` LE) |
//! | 4 | 4 | position y (`f32` LE) |
//! | 8 | 4 | draw scale (`f32` LE) |
//! | 12 | 4 | size multiplier (`f32` LE) |

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use cratestack_config::Config;
use cratestack_physics::{BodyDesc, BodyHandle, BodyKind, PhysicsError, PhysicsWorld};
use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::visuals::VisualProxy;

/// Identifier of a registered factory. Assigned in registration order from 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FactoryId(pub u32);

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// The four scalars a spawn carries on the wire.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpawnParams {
    pub x: f32,
    pub y: f32,
    pub scale: f32,
    pub size: f32,
}

impl SpawnParams {
    /// Encoded length in bytes.
    pub const ENCODED_LEN: usize = 16;

    pub fn new(position: Vec2, scale: f32, size: f32) -> Self {
        Self {
            x: position.x,
            y: position.y,
            scale,
            size,
        }
    }

    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let mut out = [0u8; Self::ENCODED_LEN];
        for (i, v) in [self.x, self.y, self.scale, self.size].iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ParamsError> {
        if bytes.len() < Self::ENCODED_LEN {
            return Err(ParamsError::Truncated {
                expected: Self::ENCODED_LEN,
                actual: bytes.len(),
            });
        }
        if bytes.len() > Self::ENCODED_LEN {
            return Err(ParamsError::TrailingBytes(bytes.len() - Self::ENCODED_LEN));
        }
        let f = |i: usize| {
            f32::from_le_bytes([bytes[i * 4], bytes[i * 4 + 1], bytes[i * 4 + 2], bytes[i * 4 + 3]])
        };
        Ok(Self {
            x: f(0),
            y: f(1),
            scale: f(2),
            size: f(3),
        })
    }

    /// Rejects values no factory can build from.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if ![self.x, self.y, self.scale, self.size]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(ParamsError::NonFinite);
        }
        if self.size <= 0.0 || self.scale <= 0.0 {
            return Err(ParamsError::NonPositive);
        }
        Ok(())
    }
}

/// Malformed parameter bytes or values.
#[derive(Debug, thiserror::Error)]
pub enum ParamsError {
    #[error("parameters truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("{0} unexpected bytes after parameters")]
    TrailingBytes(usize),
    #[error("parameters contain a non-finite value")]
    NonFinite,
    #[error("scale and size must be positive")]
    NonPositive,
}

/// Errors raised by the factory registry.
#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    #[error("no factory registered under id {0:?}")]
    Unregistered(FactoryId),
    #[error("a factory named {0:?} is already registered")]
    DuplicateName(String),
    #[error("invalid spawn parameters: {0}")]
    Params(#[from] ParamsError),
    #[error("body creation failed: {0}")]
    Physics(#[from] PhysicsError),
}

// ---------------------------------------------------------------------------
// Factory trait
// ---------------------------------------------------------------------------

/// A body plus its visual, as produced by a factory.
#[derive(Clone, Debug, PartialEq)]
pub struct Spawned {
    pub body: BodyHandle,
    pub visual: VisualProxy,
}

/// A deterministic generator of one kind of shared object.
pub trait ObjectFactory {
    /// Stable name, compared during the session handshake.
    fn name(&self) -> &str;

    /// Builds the object. Must depend only on `params`, the factory's own
    /// state and values drawn from `rng`.
    fn create(
        &self,
        world: &mut PhysicsWorld,
        params: &SpawnParams,
        rng: &mut ChaCha8Rng,
    ) -> Result<Spawned, FactoryError>;

    fn serialize_params(&self, params: &SpawnParams) -> Vec<u8> {
        params.encode().to_vec()
    }

    fn deserialize_params(&self, bytes: &[u8]) -> Result<SpawnParams, ParamsError> {
        SpawnParams::decode(bytes)
    }
}

/// Derive the generator for one object from the session seed, the factory id
/// and the encoded parameters.
///
/// Identical inputs give identical streams on every peer.
pub fn variant_rng(session_seed: u64, factory: FactoryId, params: &[u8]) -> ChaCha8Rng {
    let mut hasher = DefaultHasher::new();
    session_seed.hash(&mut hasher);
    factory.0.hash(&mut hasher);
    params.hash(&mut hasher);
    ChaCha8Rng::seed_from_u64(hasher.finish())
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Factories in registration order. Every peer must register the same
/// factories in the same order; the handshake checks this.
pub struct FactoryRegistry {
    session_seed: u64,
    factories: Vec<Box<dyn ObjectFactory>>,
}

impl FactoryRegistry {
    pub fn new(session_seed: u64) -> Self {
        Self {
            session_seed,
            factories: Vec::new(),
        }
    }

    pub fn session_seed(&self) -> u64 {
        self.session_seed
    }

    /// Registers a factory under the next free id.
    pub fn register(&mut self, factory: Box<dyn ObjectFactory>) -> Result<FactoryId, FactoryError> {
        if self.factories.iter().any(|f| f.name() == factory.name()) {
            return Err(FactoryError::DuplicateName(factory.name().to_string()));
        }
        let id = FactoryId(self.factories.len() as u32);
        debug!(name = factory.name(), id = id.0, "factory registered");
        self.factories.push(factory);
        Ok(id)
    }

    fn get(&self, id: FactoryId) -> Result<&dyn ObjectFactory, FactoryError> {
        self.factories
            .get(id.0 as usize)
            .map(|f| f.as_ref())
            .ok_or(FactoryError::Unregistered(id))
    }

    pub fn id_of(&self, name: &str) -> Option<FactoryId> {
        self.factories
            .iter()
            .position(|f| f.name() == name)
            .map(|i| FactoryId(i as u32))
    }

    /// Factory names in id order.
    pub fn names(&self) -> Vec<String> {
        self.factories.iter().map(|f| f.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Produces an object locally and returns it with the bytes to send.
    pub fn spawn(
        &self,
        world: &mut PhysicsWorld,
        id: FactoryId,
        position: Vec2,
        scale: f32,
        size: f32,
    ) -> Result<(Spawned, Vec<u8>), FactoryError> {
        let factory = self.get(id)?;
        let bytes = factory.serialize_params(&SpawnParams::new(position, scale, size));
        let spawned = self.build(world, id, factory, &bytes)?;
        Ok((spawned, bytes))
    }

    /// Rebuilds an object from bytes produced by another peer.
    ///
    /// Nothing is created if the bytes do not decode.
    pub fn reconstruct(
        &self,
        world: &mut PhysicsWorld,
        id: FactoryId,
        bytes: &[u8],
    ) -> Result<Spawned, FactoryError> {
        let factory = self.get(id)?;
        self.build(world, id, factory, bytes)
    }

    fn build(
        &self,
        world: &mut PhysicsWorld,
        id: FactoryId,
        factory: &dyn ObjectFactory,
        bytes: &[u8],
    ) -> Result<Spawned, FactoryError> {
        let params = factory.deserialize_params(bytes)?;
        params.validate()?;
        let mut rng = variant_rng(self.session_seed, id, bytes);
        factory.create(world, &params, &mut rng)
    }
}

// ---------------------------------------------------------------------------
// Crate factory
// ---------------------------------------------------------------------------

/// Produces dynamic crates with one of `variants` textures.
#[derive(Clone, Debug)]
pub struct CrateFactory {
    pub variants: u32,
    pub base_half_extents: Vec2,
    pub density: f32,
    pub friction: f32,
    pub restitution: f32,
    pub angular_damping: f32,
}

impl CrateFactory {
    pub const NAME: &'static str = "crate";

    pub fn from_config(config: &Config) -> Self {
        Self {
            variants: config.scene.crate_variants.max(1),
            base_half_extents: Vec2::from(config.scene.crate_half_extents),
            density: config.physics.crate_density,
            friction: config.physics.crate_friction,
            restitution: config.physics.crate_restitution,
            angular_damping: config.physics.crate_angular_damping,
        }
    }
}

impl ObjectFactory for CrateFactory {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn create(
        &self,
        world: &mut PhysicsWorld,
        params: &SpawnParams,
        rng: &mut ChaCha8Rng,
    ) -> Result<Spawned, FactoryError> {
        let variant = rng.random_range(1..=self.variants);
        let key = format!("crate{variant:02}");

        let mut desc = BodyDesc::new(
            BodyKind::Dynamic,
            params.position(),
            self.base_half_extents * params.size,
        )
        .tagged(key.clone())
        .with_material(self.density, self.friction, self.restitution);
        desc.angular_damping = self.angular_damping;

        let body = world.init_body(&desc)?;
        Ok(Spawned {
            body,
            visual: VisualProxy {
                body,
                key,
                scale: params.scale,
            },
        })
    }
}

#[cfg(test)]
#[path = "factory_tests.rs"]
mod tests;
