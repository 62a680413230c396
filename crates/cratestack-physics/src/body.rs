//! Body descriptions, handles, and read/write views over a single body.

use glam::Vec2;
use rapier2d::prelude::*;

use crate::PhysicsWorld;

/// Opaque identity of a body inside one [`PhysicsWorld`].
///
/// Handles are local to a peer: the same logical object has different handles
/// on different peers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BodyHandle(pub(crate) RigidBodyHandle);

/// Kinematic class of a body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyKind {
    /// Immovable geometry (walls, floors).
    Static,
    /// Fully simulated: gravity, contacts, velocities.
    Dynamic,
    /// Position-driven, never collides. Used for aim indicators and triggers.
    Sensor,
}

/// Everything needed to create a box-shaped body.
#[derive(Clone, Debug, PartialEq)]
pub struct BodyDesc {
    /// Kinematic class.
    pub kind: BodyKind,
    /// Centre position.
    pub position: Vec2,
    /// Orientation in radians.
    pub angle: f32,
    /// Initial linear velocity.
    pub linvel: Vec2,
    /// Initial angular velocity.
    pub angvel: f32,
    /// Box half extents.
    pub half_extents: Vec2,
    /// Collider density.
    pub density: f32,
    /// Collider friction.
    pub friction: f32,
    /// Collider restitution.
    pub restitution: f32,
    /// Angular damping of the body.
    pub angular_damping: f32,
    /// Free-form debug tag ("wall", "crate", "cannon").
    pub tag: String,
}

impl BodyDesc {
    /// A unit box of the given kind at `position` with neutral material values.
    pub fn new(kind: BodyKind, position: Vec2, half_extents: Vec2) -> Self {
        Self {
            kind,
            position,
            angle: 0.0,
            linvel: Vec2::ZERO,
            angvel: 0.0,
            half_extents,
            density: 1.0,
            friction: 0.5,
            restitution: 0.0,
            angular_damping: 0.0,
            tag: String::new(),
        }
    }

    /// Sets the debug tag.
    pub fn tagged(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Sets density, friction and restitution in one go.
    pub fn with_material(mut self, density: f32, friction: f32, restitution: f32) -> Self {
        self.density = density;
        self.friction = friction;
        self.restitution = restitution;
        self
    }

    /// Sets the initial orientation.
    pub fn with_angle(mut self, angle: f32) -> Self {
        self.angle = angle;
        self
    }

    /// Checks that every scalar is finite and the box has positive extents.
    pub(crate) fn validate(&self) -> Result<(), &'static str> {
        let scalars = [
            self.position.x,
            self.position.y,
            self.angle,
            self.linvel.x,
            self.linvel.y,
            self.angvel,
            self.density,
            self.friction,
            self.restitution,
            self.angular_damping,
        ];
        if scalars.iter().any(|v| !v.is_finite()) {
            return Err("non-finite scalar");
        }
        if !(self.half_extents.x > 0.0 && self.half_extents.y > 0.0) {
            return Err("half extents must be positive");
        }
        if self.density < 0.0 {
            return Err("negative density");
        }
        Ok(())
    }
}

/// Kinematic state of a body at the end of the last step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodyState {
    /// Centre position.
    pub position: Vec2,
    /// Orientation in radians.
    pub angle: f32,
    /// Linear velocity.
    pub linvel: Vec2,
    /// Angular velocity.
    pub angvel: f32,
}

/// Physical attributes fixed at creation time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodyMaterial {
    /// Box half extents.
    pub half_extents: Vec2,
    /// Collider density.
    pub density: f32,
    /// Collider friction.
    pub friction: f32,
    /// Collider restitution.
    pub restitution: f32,
}

/// Bookkeeping kept next to each rapier body.
#[derive(Clone, Debug)]
pub(crate) struct BodyMeta {
    pub(crate) kind: BodyKind,
    pub(crate) tag: String,
    pub(crate) half_extents: Vec2,
    pub(crate) collider: ColliderHandle,
}

/// Mutable view over one body.
///
/// Obtained from [`PhysicsWorld::body_mut`]. Shared bodies are only ever
/// reached through the multiplayer ownership gate, which hands out this view
/// after checking local ownership.
pub struct BodyMut<'w> {
    pub(crate) world: &'w mut PhysicsWorld,
    pub(crate) handle: BodyHandle,
}

impl BodyMut<'_> {
    /// Handle of the body being mutated.
    pub fn handle(&self) -> BodyHandle {
        self.handle
    }

    /// Current kinematic state.
    pub fn state(&self) -> Option<BodyState> {
        self.world.state(self.handle)
    }

    /// Replaces the linear velocity.
    pub fn set_linvel(&mut self, linvel: Vec2) {
        if let Some(body) = self.world.rigid_body_set.get_mut(self.handle.0) {
            body.set_linvel(Vector::new(linvel.x, linvel.y), true);
        }
    }

    /// Replaces the angular velocity.
    pub fn set_angvel(&mut self, angvel: f32) {
        if let Some(body) = self.world.rigid_body_set.get_mut(self.handle.0) {
            body.set_angvel(angvel, true);
        }
    }

    /// Teleports the body.
    pub fn set_transform(&mut self, position: Vec2, angle: f32) {
        if let Some(body) = self.world.rigid_body_set.get_mut(self.handle.0) {
            body.set_translation(Vector::new(position.x, position.y), true);
            body.set_rotation(Rotation::new(angle), true);
        }
    }

    /// Overwrites position, orientation and both velocities.
    pub fn set_state(&mut self, state: &BodyState) {
        self.set_transform(state.position, state.angle);
        self.set_linvel(state.linvel);
        self.set_angvel(state.angvel);
    }

    /// Applies an instantaneous impulse at the centre of mass.
    pub fn apply_impulse(&mut self, impulse: Vec2) {
        if let Some(body) = self.world.rigid_body_set.get_mut(self.handle.0) {
            body.apply_impulse(Vector::new(impulse.x, impulse.y), true);
        }
    }
}
