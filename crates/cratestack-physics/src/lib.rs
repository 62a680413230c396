//! Planar rigid-body simulation used by the shared crate scene.
//!
//! Wraps the Rapier 2D engine behind a single [`PhysicsWorld`] that owns all
//! simulation state. Bodies are boxes; callers address them by [`BodyHandle`]
//! and mutate them through [`BodyMut`].

mod body;

pub use body::{BodyDesc, BodyHandle, BodyKind, BodyMaterial, BodyMut, BodyState};

use body::BodyMeta;
use glam::Vec2;
use rapier2d::prelude::*;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

/// Errors raised when creating or addressing bodies.
#[derive(Debug, thiserror::Error)]
pub enum PhysicsError {
    #[error("invalid body description ({tag}): {reason}")]
    InvalidDesc { tag: String, reason: &'static str },
    #[error("body {0:?} does not exist")]
    UnknownBody(BodyHandle),
}

/// Central physics simulation owning all Rapier state.
pub struct PhysicsWorld {
    /// World-space gravity vector.
    pub gravity: Vector,
    /// Timestep and solver configuration.
    pub integration_parameters: IntegrationParameters,
    physics_pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: BroadPhaseBvh,
    narrow_phase: NarrowPhase,
    pub(crate) rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,
    meta: FxHashMap<RigidBodyHandle, BodyMeta>,
}

impl PhysicsWorld {
    /// Creates an empty world with vertical gravity `gravity_y` and the given
    /// fixed timestep.
    pub fn new(gravity_y: f32, dt: f32) -> Self {
        let integration_parameters = IntegrationParameters {
            dt,
            ..Default::default()
        };

        Self {
            gravity: Vector::new(0.0, gravity_y),
            integration_parameters,
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: BroadPhaseBvh::new(),
            narrow_phase: NarrowPhase::new(),
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            meta: FxHashMap::default(),
        }
    }

    // ------------------------------------------------------------------
    // Body lifecycle
    // ------------------------------------------------------------------

    /// Creates a box body from `desc`.
    ///
    /// The description is validated before anything is inserted, so a
    /// rejected description leaves the world untouched.
    pub fn init_body(&mut self, desc: &BodyDesc) -> Result<BodyHandle, PhysicsError> {
        desc.validate().map_err(|reason| PhysicsError::InvalidDesc {
            tag: desc.tag.clone(),
            reason,
        })?;

        let builder = match desc.kind {
            BodyKind::Static => RigidBodyBuilder::fixed(),
            BodyKind::Dynamic => RigidBodyBuilder::dynamic(),
            BodyKind::Sensor => RigidBodyBuilder::kinematic_position_based(),
        };
        let body = builder
            .translation(Vector::new(desc.position.x, desc.position.y))
            .rotation(desc.angle)
            .linvel(Vector::new(desc.linvel.x, desc.linvel.y))
            .angvel(desc.angvel)
            .angular_damping(desc.angular_damping)
            .build();
        let handle = self.rigid_body_set.insert(body);

        let collider = ColliderBuilder::cuboid(desc.half_extents.x, desc.half_extents.y)
            .density(desc.density)
            .friction(desc.friction)
            .restitution(desc.restitution)
            .sensor(desc.kind == BodyKind::Sensor)
            .build();
        let collider =
            self.collider_set
                .insert_with_parent(collider, handle, &mut self.rigid_body_set);

        self.meta.insert(
            handle,
            BodyMeta {
                kind: desc.kind,
                tag: desc.tag.clone(),
                half_extents: desc.half_extents,
                collider,
            },
        );
        debug!(tag = %desc.tag, kind = ?desc.kind, "body created");
        Ok(BodyHandle(handle))
    }

    /// Removes a body and its collider.
    pub fn remove_body(&mut self, handle: BodyHandle) -> Result<(), PhysicsError> {
        if self.meta.remove(&handle.0).is_none() {
            return Err(PhysicsError::UnknownBody(handle));
        }
        self.rigid_body_set.remove(
            handle.0,
            &mut self.island_manager,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            true,
        );
        Ok(())
    }

    /// Removes every body.
    pub fn clear(&mut self) {
        let handles: Vec<BodyHandle> = self.handles().collect();
        for handle in handles {
            let _ = self.remove_body(handle);
        }
    }

    // ------------------------------------------------------------------
    // Stepping
    // ------------------------------------------------------------------

    /// Advances the simulation by exactly `dt` seconds.
    ///
    /// Non-positive or non-finite steps are ignored.
    pub fn step_fixed(&mut self, dt: f32) {
        if !(dt.is_finite() && dt > 0.0) {
            warn!(dt, "ignoring invalid physics step");
            return;
        }
        self.integration_parameters.dt = dt;
        self.physics_pipeline.step(
            self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            &(),
            &(),
        );
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Whether `handle` refers to a live body.
    pub fn contains(&self, handle: BodyHandle) -> bool {
        self.meta.contains_key(&handle.0)
    }

    /// Number of live bodies.
    pub fn len(&self) -> usize {
        self.meta.len()
    }

    /// Whether the world has no bodies.
    pub fn is_empty(&self) -> bool {
        self.meta.is_empty()
    }

    /// Live body handles in insertion-arena order.
    pub fn handles(&self) -> impl Iterator<Item = BodyHandle> + '_ {
        self.rigid_body_set.iter().map(|(h, _)| BodyHandle(h))
    }

    pub fn kind(&self, handle: BodyHandle) -> Option<BodyKind> {
        self.meta.get(&handle.0).map(|m| m.kind)
    }

    pub fn tag(&self, handle: BodyHandle) -> Option<&str> {
        self.meta.get(&handle.0).map(|m| m.tag.as_str())
    }

    /// Kinematic state as of the last completed step.
    pub fn state(&self, handle: BodyHandle) -> Option<BodyState> {
        let body = self.rigid_body_set.get(handle.0)?;
        let t = body.translation();
        let v = body.linvel();
        Some(BodyState {
            position: Vec2::new(t.x, t.y),
            angle: body.rotation().angle(),
            linvel: Vec2::new(v.x, v.y),
            angvel: body.angvel(),
        })
    }

    /// Shape and collider material of a body.
    pub fn material(&self, handle: BodyHandle) -> Option<BodyMaterial> {
        let meta = self.meta.get(&handle.0)?;
        let collider = self.collider_set.get(meta.collider)?;
        Some(BodyMaterial {
            half_extents: meta.half_extents,
            density: collider.density(),
            friction: collider.friction(),
            restitution: collider.restitution(),
        })
    }

    /// Mutable access to a body.
    ///
    /// Shared bodies should be reached through the ownership registry
    /// instead; this is the unchecked primitive it builds on.
    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<BodyMut<'_>> {
        if !self.contains(handle) {
            return None;
        }
        Some(BodyMut {
            world: self,
            handle,
        })
    }
}
