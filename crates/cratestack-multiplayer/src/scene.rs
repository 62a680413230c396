//! The crate-stacking scene: one peer's view of a shared session.
//!
//! [`SceneController`] owns the physics world together with the ownership
//! registry, the factory registry, the event channel and the visual proxies.
//! Each fixed tick runs, in order:
//!
//! 1. apply queued inbound messages; each received event is handled before
//!    the next message, so it stays ordered with its sender's other traffic
//! 2. turn / fire the locally owned cannon
//! 3. goal check for locally owned crates
//! 4. relay state of locally owned bodies
//! 5. advance physics by one fixed step

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use cratestack_config::{Config, ConfigError};
use cratestack_net::{
    BodyStateUpdate, Despawn, EventEnvelope, NetMessage, ObjectId, OwnershipTransfer, PeerId,
    RESERVED_SERIALS, Spawn, WireState,
};
use cratestack_physics::{BodyDesc, BodyHandle, BodyKind, BodyState, PhysicsError, PhysicsWorld};
use glam::Vec2;
use rustc_hash::FxHashMap;
use tracing::{debug, info, trace, warn};

use crate::events::{EventChannel, EventError, EventKind, SessionEvent};
use crate::factory::{CrateFactory, FactoryError, FactoryId, FactoryRegistry, Spawned};
use crate::handshake::{HandshakeError, ProtocolManifest};
use crate::ownership::{OwnershipError, OwnershipRegistry};
use crate::schedule::{FrameSteps, TickSchedule};
use crate::snapshot::{CrateRecord, SimulationSnapshot, SnapshotError};
use crate::visuals::{ProxyRegistry, VisualProxy, VisualSink};

/// Crate pyramid built by the host, bottom row last.
pub const PYRAMID: [[f32; 2]; 15] = [
    [14.5, 14.25],
    [13.0, 12.0],
    [16.0, 12.0],
    [11.5, 9.75],
    [14.5, 9.75],
    [17.5, 9.75],
    [13.0, 7.5],
    [16.0, 7.5],
    [11.5, 5.25],
    [14.5, 5.25],
    [17.5, 5.25],
    [10.0, 3.0],
    [13.0, 3.0],
    [16.0, 3.0],
    [19.0, 3.0],
];

/// Peer that owns the second cannon.
pub const CLIENT_PEER: PeerId = PeerId(1);

const WALL_THICKNESS: f32 = 0.5;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error(transparent)]
    Ownership(#[from] OwnershipError),
    #[error(transparent)]
    Factory(#[from] FactoryError),
    #[error(transparent)]
    Event(#[from] EventError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Handshake(#[from] HandshakeError),
    #[error(transparent)]
    Physics(#[from] PhysicsError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("only the host may do this")]
    NotHost,
    #[error("unknown object {0}")]
    UnknownObject(ObjectId),
    #[error("object {0} is part of the fixed scene")]
    FixedObject(ObjectId),
    #[error("{sender} announced object {object} it did not produce")]
    ProducerMismatch { object: ObjectId, sender: PeerId },
    #[error("{sender} announced object {object} as owned by {owner}")]
    OwnerMismatch {
        object: ObjectId,
        owner: PeerId,
        sender: PeerId,
    },
    #[error("message for {object} from reset epoch {epoch}, current is {current}")]
    StaleEpoch {
        object: ObjectId,
        epoch: u32,
        current: u32,
    },
}

// ---------------------------------------------------------------------------
// Tick I/O
// ---------------------------------------------------------------------------

/// Player input for one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TickInput {
    /// Turn axis in `[-1, 1]`.
    pub turn: f32,
    /// Fire a crate from the local cannon.
    pub fire: bool,
}

/// What happened during one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub applied: usize,
    pub rejected: usize,
    pub events: usize,
}

#[derive(Clone, Copy, Debug)]
struct Cannon {
    body: BodyHandle,
    position: Vec2,
    angle: f32,
    /// +1 for the host cannon, -1 for the client cannon.
    turn_sign: f32,
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct SceneController {
    config: Config,
    local_peer: PeerId,
    world: PhysicsWorld,
    ownership: OwnershipRegistry,
    factories: FactoryRegistry,
    crate_factory: FactoryId,
    events: EventChannel,
    proxies: ProxyRegistry,
    manifest: ProtocolManifest,
    verified: BTreeSet<PeerId>,
    objects: BTreeMap<ObjectId, BodyHandle>,
    object_of: FxHashMap<BodyHandle, ObjectId>,
    cannons: Vec<Cannon>,
    next_serial: u32,
    inbound: VecDeque<(PeerId, NetMessage)>,
    outbound: Vec<NetMessage>,
    tick: u64,
    /// Bumped by every host reset. Object traffic from another epoch is dropped.
    epoch: u32,
    complete: Option<Vec2>,
    goal_reported: bool,
}

impl SceneController {
    /// Builds the fixed scene (walls, goal, cannons) and registers the
    /// factories and event kinds in their fixed order.
    pub fn new(config: Config, local_peer: PeerId) -> Result<Self, SceneError> {
        config.validate()?;

        let world = PhysicsWorld::new(config.physics.gravity, config.session.fixed_timestep_s);

        let mut factories = FactoryRegistry::new(config.session.seed);
        let crate_factory = factories.register(Box::new(CrateFactory::from_config(&config)))?;

        let mut events = EventChannel::new();
        events.register(EventKind::SessionComplete)?;
        events.register(EventKind::ResetRequested)?;

        let manifest =
            ProtocolManifest::new(config.session.seed, factories.names(), events.registered_tags());

        let angles = [
            config.scene.host_cannon_angle,
            config.scene.client_cannon_angle,
        ];
        let mut scene = Self {
            config,
            local_peer,
            world,
            ownership: OwnershipRegistry::new(local_peer),
            factories,
            crate_factory,
            events,
            proxies: ProxyRegistry::new(),
            manifest,
            verified: BTreeSet::new(),
            objects: BTreeMap::new(),
            object_of: FxHashMap::default(),
            cannons: Vec::with_capacity(2),
            next_serial: RESERVED_SERIALS,
            inbound: VecDeque::new(),
            outbound: Vec::new(),
            tick: 0,
            epoch: 0,
            complete: None,
            goal_reported: false,
        };
        scene.build_fixed_scene(angles)?;
        info!(peer = %local_peer, seed = scene.config.session.seed, "scene created");
        Ok(scene)
    }

    fn build_fixed_scene(&mut self, cannon_angles: [f32; 2]) -> Result<(), SceneError> {
        let physics = &self.config.physics;
        let (w, h, t) = (physics.width, physics.height, WALL_THICKNESS);
        let walls = [
            (Vec2::new(w / 2.0, t), Vec2::new(w / 2.0, t)),
            (Vec2::new(w / 2.0, h - t), Vec2::new(w / 2.0, t)),
            (Vec2::new(t, h / 2.0), Vec2::new(t, h / 2.0)),
            (Vec2::new(w - t, h / 2.0), Vec2::new(t, h / 2.0)),
        ];
        let (friction, restitution) = (physics.wall_friction, physics.wall_restitution);
        for (center, half) in walls {
            let desc = BodyDesc::new(BodyKind::Static, center, half)
                .tagged("wall")
                .with_material(0.0, friction, restitution);
            let body = self.world.init_body(&desc)?;
            self.attach_proxy(body, "earth");
        }

        let scene = &self.config.scene;
        let goal = BodyDesc::new(
            BodyKind::Sensor,
            Vec2::from(scene.goal),
            Vec2::splat(scene.goal_radius),
        )
        .tagged("goal");
        let placements = [
            (scene.host_cannon, PeerId::HOST, 1.0),
            (scene.client_cannon, CLIENT_PEER, -1.0),
        ];
        let half = Vec2::from(scene.cannon_half_extents);

        let goal = self.world.init_body(&goal)?;
        self.attach_proxy(goal, "goal");

        self.cannons.clear();
        for (serial, ((position, owner, turn_sign), angle)) in
            placements.into_iter().zip(cannon_angles).enumerate()
        {
            let position = Vec2::from(position);
            let desc = BodyDesc::new(BodyKind::Sensor, position, half)
                .tagged("cannon")
                .with_angle(angle);
            let body = self.world.init_body(&desc)?;
            let object = ObjectId::fixed(serial as u32);
            self.ownership.register_local_body(body, owner)?;
            self.objects.insert(object, body);
            self.object_of.insert(body, object);
            self.attach_proxy(body, "cannon");
            self.cannons.push(Cannon {
                body,
                position,
                angle,
                turn_sign,
            });
        }
        Ok(())
    }

    fn attach_proxy(&mut self, body: BodyHandle, key: &str) {
        self.proxies.attach(VisualProxy {
            body,
            key: key.to_string(),
            scale: self.config.scene.draw_scale,
        });
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn local_peer(&self) -> PeerId {
        self.local_peer
    }

    pub fn is_host(&self) -> bool {
        self.local_peer.is_host()
    }

    pub fn world(&self) -> &PhysicsWorld {
        &self.world
    }

    pub fn ownership(&self) -> &OwnershipRegistry {
        &self.ownership
    }

    pub fn manifest(&self) -> &ProtocolManifest {
        &self.manifest
    }

    pub fn is_verified(&self, peer: PeerId) -> bool {
        self.verified.contains(&peer)
    }

    pub fn body_of(&self, object: ObjectId) -> Option<BodyHandle> {
        self.objects.get(&object).copied()
    }

    pub fn object_of(&self, body: BodyHandle) -> Option<ObjectId> {
        self.object_of.get(&body).copied()
    }

    /// Spawned crates in object order.
    pub fn crates(&self) -> impl Iterator<Item = (ObjectId, BodyHandle)> + '_ {
        self.objects
            .iter()
            .filter(|(id, _)| !id.is_fixed())
            .map(|(id, h)| (*id, *h))
    }

    pub fn crate_count(&self) -> usize {
        self.crates().count()
    }

    /// Cannon orientations: host first, then client.
    pub fn cannon_angles(&self) -> [f32; 2] {
        [self.cannons[0].angle, self.cannons[1].angle]
    }

    /// Goal position reached, once the session is complete.
    pub fn completed_at(&self) -> Option<Vec2> {
        self.complete
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Number of host resets this peer has applied.
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    pub fn visual(&self, body: BodyHandle) -> Option<&VisualProxy> {
        self.proxies.get(body)
    }

    // ------------------------------------------------------------------
    // Messaging
    // ------------------------------------------------------------------

    /// Manifest message to send to every other peer.
    pub fn hello(&self) -> NetMessage {
        NetMessage::Hello(self.manifest.to_hello(self.local_peer))
    }

    /// Accepts a message from `from`.
    ///
    /// `Hello` is verified immediately. Everything else requires a verified
    /// sender and is queued for the next tick.
    pub fn receive(&mut self, from: PeerId, msg: NetMessage) -> Result<(), SceneError> {
        if let NetMessage::Hello(hello) = &msg {
            if hello.peer != from {
                warn!(%from, claimed = %hello.peer, "hello claims another peer");
                return Err(HandshakeError::PeerMismatch {
                    claimed: hello.peer,
                    sender: from,
                }
                .into());
            }
            let remote = ProtocolManifest::from_hello(hello);
            self.manifest.verify(&remote)?;
            if !self.verified.insert(from) {
                // a restarted peer numbers its events from 1 again
                self.events.forget_sender(from);
            }
            info!(local = %self.local_peer, remote = %from, "peer verified");
            return Ok(());
        }
        if !self.verified.contains(&from) {
            warn!(%from, kind = msg.kind(), "message from unverified peer");
            return Err(HandshakeError::NotVerified(from).into());
        }
        self.inbound.push_back((from, msg));
        Ok(())
    }

    /// Takes every message produced since the last drain, in order.
    pub fn drain_outbound(&mut self) -> Vec<NetMessage> {
        std::mem::take(&mut self.outbound)
    }

    fn emit_event(&mut self, event: &SessionEvent) -> Result<(), SceneError> {
        self.events.push(event)?;
        let envelopes: Vec<EventEnvelope> = self.events.drain_outbound();
        self.outbound
            .extend(envelopes.into_iter().map(NetMessage::Event));
        Ok(())
    }

    fn push_state(&mut self, object: ObjectId, body: BodyHandle) {
        if let Some(state) = self.world.state(body) {
            self.outbound.push(NetMessage::BodyState(BodyStateUpdate {
                object,
                state: to_wire(&state),
                epoch: self.epoch,
            }));
        }
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Runs one fixed tick.
    pub fn tick(&mut self, input: &TickInput) -> Result<TickReport, SceneError> {
        let mut report = TickReport::default();

        while let Some((from, msg)) = self.inbound.pop_front() {
            let kind = msg.kind();
            match self.apply_message(from, msg) {
                Ok(()) => report.applied += 1,
                Err(err) => {
                    warn!(%from, kind, "rejected message: {err}");
                    report.rejected += 1;
                }
            }
            report.events += self.dispatch_events()?;
        }

        self.drive_cannon(input)?;
        self.check_goal()?;

        let interval = self.config.session.state_sync_interval;
        if interval > 0 && self.tick % u64::from(interval) == 0 {
            self.relay_owned_state();
        }

        self.world.step_fixed(self.config.session.fixed_timestep_s);
        self.tick += 1;
        Ok(report)
    }

    /// Feeds a frame's elapsed time to `schedule` and runs the resulting
    /// ticks. `input` applies to the first tick only.
    pub fn advance(
        &mut self,
        schedule: &mut TickSchedule,
        frame_secs: f32,
        input: &TickInput,
    ) -> Result<FrameSteps, SceneError> {
        let frame = schedule.accumulate(frame_secs);
        for i in 0..frame.steps {
            let input = if i == 0 { *input } else { TickInput::default() };
            self.tick(&input)?;
        }
        Ok(frame)
    }

    /// Pushes changed proxy transforms to `sink`.
    pub fn sync_visuals(&mut self, leftover: f32, sink: &mut dyn VisualSink) -> usize {
        self.proxies.sync_visuals(&self.world, leftover, sink)
    }

    fn apply_message(&mut self, from: PeerId, msg: NetMessage) -> Result<(), SceneError> {
        match msg {
            NetMessage::Hello(_) => Ok(()),
            NetMessage::Spawn(spawn) => self.apply_spawn(from, spawn),
            NetMessage::Despawn(Despawn { object, epoch }) => {
                self.check_epoch(object, epoch)?;
                let body = self.require_object(object)?;
                if object.is_fixed() {
                    return Err(SceneError::FixedObject(object));
                }
                self.ownership.check_owner(body, from)?;
                self.remove_object(object, body)
            }
            NetMessage::OwnershipTransfer(OwnershipTransfer {
                object,
                new_owner,
                epoch,
            }) => {
                self.check_epoch(object, epoch)?;
                let body = self.require_object(object)?;
                self.ownership.check_owner(body, from)?;
                self.ownership.acquire(body, new_owner)?;
                debug!(%object, %new_owner, "ownership transferred by {from}");
                Ok(())
            }
            NetMessage::BodyState(BodyStateUpdate {
                object,
                state,
                epoch,
            }) => {
                self.check_epoch(object, epoch)?;
                let body = self.require_object(object)?;
                let state = from_wire(&state);
                self.ownership
                    .body_mut_as(&mut self.world, body, from)?
                    .set_state(&state);
                if let Some(cannon) = self.cannons.iter_mut().find(|c| c.body == body) {
                    cannon.angle = state.angle;
                }
                trace!(%object, "state applied");
                Ok(())
            }
            NetMessage::Event(envelope) => {
                self.events.receive(from, &envelope)?;
                Ok(())
            }
        }
    }

    fn check_epoch(&self, object: ObjectId, epoch: u32) -> Result<(), SceneError> {
        if epoch != self.epoch {
            return Err(SceneError::StaleEpoch {
                object,
                epoch,
                current: self.epoch,
            });
        }
        Ok(())
    }

    fn apply_spawn(&mut self, from: PeerId, spawn: Spawn) -> Result<(), SceneError> {
        self.check_epoch(spawn.object, spawn.epoch)?;
        if spawn.object.producer != from || spawn.object.is_fixed() {
            return Err(SceneError::ProducerMismatch {
                object: spawn.object,
                sender: from,
            });
        }
        if spawn.owner != from {
            return Err(SceneError::OwnerMismatch {
                object: spawn.object,
                owner: spawn.owner,
                sender: from,
            });
        }
        if self.objects.contains_key(&spawn.object) {
            debug!(object = %spawn.object, "duplicate spawn ignored");
            return Ok(());
        }
        let spawned =
            self.factories
                .reconstruct(&mut self.world, FactoryId(spawn.factory_id), &spawn.params)?;
        self.track(spawn.object, spawned, spawn.owner)?;
        debug!(object = %spawn.object, owner = %spawn.owner, "spawn reconstructed");
        Ok(())
    }

    fn require_object(&self, object: ObjectId) -> Result<BodyHandle, SceneError> {
        self.body_of(object)
            .ok_or(SceneError::UnknownObject(object))
    }

    fn track(&mut self, object: ObjectId, spawned: Spawned, owner: PeerId) -> Result<(), SceneError> {
        if let Err(err) = self.ownership.register_local_body(spawned.body, owner) {
            let _ = self.world.remove_body(spawned.body);
            return Err(err.into());
        }
        self.objects.insert(object, spawned.body);
        self.object_of.insert(spawned.body, object);
        self.proxies.attach(spawned.visual);
        Ok(())
    }

    fn remove_object(&mut self, object: ObjectId, body: BodyHandle) -> Result<(), SceneError> {
        self.world.remove_body(body)?;
        if self.ownership.is_registered(body) {
            self.ownership.release(body)?;
        }
        self.proxies.detach(body);
        self.objects.remove(&object);
        self.object_of.remove(&body);
        debug!(%object, "object removed");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Handles every received event. Runs after each inbound message so an
    /// event takes effect before the sender's later messages are applied.
    fn dispatch_events(&mut self) -> Result<usize, SceneError> {
        let mut handled = 0;
        while self.events.has_inbound() {
            let inbound = self.events.pop_inbound()?;
            self.handle_event(inbound.sender, &inbound.event)?;
            handled += 1;
        }
        Ok(handled)
    }

    fn handle_event(&mut self, sender: PeerId, event: &SessionEvent) -> Result<(), SceneError> {
        match event {
            SessionEvent::SessionComplete { x, y, epoch } => {
                if *epoch != self.epoch {
                    debug!(
                        %sender,
                        epoch,
                        current = self.epoch,
                        "completion from old epoch ignored"
                    );
                    return Ok(());
                }
                if self.complete.is_some() {
                    debug!(%sender, "session already complete");
                    return Ok(());
                }
                self.complete = Some(Vec2::new(*x, *y));
                let released = self.ownership.release_all_local();
                info!(%sender, x, y, released, "session complete");
            }
            SessionEvent::ResetRequested {
                cannon_angles,
                epoch,
            } => {
                if !sender.is_host() {
                    warn!(%sender, "reset requested by non-host ignored");
                    return Ok(());
                }
                self.epoch = *epoch;
                self.reset_with(*cannon_angles)?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Local actions
    // ------------------------------------------------------------------

    fn drive_cannon(&mut self, input: &TickInput) -> Result<(), SceneError> {
        let Some(idx) = self
            .cannons
            .iter()
            .position(|c| self.ownership.is_owned_by_local(c.body))
        else {
            return Ok(());
        };

        if input.turn != 0.0 && input.turn.is_finite() {
            let cannon = self.cannons[idx];
            let angle =
                cannon.angle + cannon.turn_sign * self.config.scene.turn_rate * input.turn;
            self.ownership
                .body_mut(&mut self.world, cannon.body)?
                .set_transform(cannon.position, angle);
            self.cannons[idx].angle = angle;
        }

        if input.fire && self.complete.is_none() {
            let cannon = self.cannons[idx];
            let dir = Vec2::new(-cannon.angle.sin(), cannon.angle.cos());
            let crate_half = Vec2::from(self.config.scene.crate_half_extents);
            let reach = self.config.scene.cannon_half_extents[1] + crate_half.max_element() + 0.25;
            let linvel = dir * self.config.scene.fire_speed;
            let state = BodyState {
                position: cannon.position + dir * reach,
                angle: cannon.angle,
                linvel,
                angvel: 0.0,
            };
            let object = self.spawn_owned(state.position, 1.0, Some(state))?;
            debug!(%object, "crate fired");
        }
        Ok(())
    }

    fn check_goal(&mut self) -> Result<(), SceneError> {
        if self.complete.is_some() || self.goal_reported {
            return Ok(());
        }
        let goal = Vec2::from(self.config.scene.goal);
        let radius = self.config.scene.goal_radius;
        let hit = self.crates().find_map(|(_, body)| {
            if !self.ownership.is_owned_by_local(body) {
                return None;
            }
            let state = self.world.state(body)?;
            (state.position.distance(goal) <= radius).then_some(state.position)
        });
        if let Some(pos) = hit {
            self.goal_reported = true;
            let event = SessionEvent::SessionComplete {
                x: pos.x,
                y: pos.y,
                epoch: self.epoch,
            };
            self.emit_event(&event)?;
            self.handle_event(self.local_peer, &event)?;
        }
        Ok(())
    }

    fn relay_owned_state(&mut self) {
        let owned: Vec<(ObjectId, BodyHandle)> = self
            .objects
            .iter()
            .filter(|(_, body)| self.ownership.is_owned_by_local(**body))
            .map(|(id, body)| (*id, *body))
            .collect();
        for (object, body) in owned {
            self.push_state(object, body);
        }
    }

    /// Spawns a crate owned by this peer and announces it.
    pub fn spawn_crate(&mut self, position: Vec2, size: f32) -> Result<ObjectId, SceneError> {
        self.spawn_owned(position, size, None)
    }

    fn spawn_owned(
        &mut self,
        position: Vec2,
        size: f32,
        initial: Option<BodyState>,
    ) -> Result<ObjectId, SceneError> {
        let (spawned, params) = self.factories.spawn(
            &mut self.world,
            self.crate_factory,
            position,
            self.config.scene.draw_scale,
            size,
        )?;
        let object = ObjectId::new(self.local_peer, self.next_serial);
        self.next_serial += 1;
        let body = spawned.body;
        self.track(object, spawned, self.local_peer)?;
        self.outbound.push(NetMessage::Spawn(Spawn {
            object,
            factory_id: self.crate_factory.0,
            params,
            owner: self.local_peer,
            epoch: self.epoch,
        }));

        if let Some(state) = initial {
            self.ownership
                .body_mut(&mut self.world, body)?
                .set_state(&state);
            self.push_state(object, body);
        }
        Ok(object)
    }

    /// Hands a locally owned object to `to` and announces it.
    pub fn transfer(&mut self, object: ObjectId, to: PeerId) -> Result<(), SceneError> {
        let body = self.require_object(object)?;
        self.ownership.hand_off(body, to)?;
        self.outbound
            .push(NetMessage::OwnershipTransfer(OwnershipTransfer {
                object,
                new_owner: to,
                epoch: self.epoch,
            }));
        info!(%object, %to, "ownership handed off");
        Ok(())
    }

    /// Removes a locally owned crate everywhere.
    pub fn despawn(&mut self, object: ObjectId) -> Result<(), SceneError> {
        let body = self.require_object(object)?;
        if object.is_fixed() {
            return Err(SceneError::FixedObject(object));
        }
        self.ownership.check_owner(body, self.local_peer)?;
        self.remove_object(object, body)?;
        self.outbound.push(NetMessage::Despawn(Despawn {
            object,
            epoch: self.epoch,
        }));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Population / reset
    // ------------------------------------------------------------------

    /// Host only: spawns the starting crate pyramid.
    pub fn populate(&mut self) -> Result<(), SceneError> {
        if !self.is_host() {
            return Err(SceneError::NotHost);
        }
        for [x, y] in PYRAMID {
            self.spawn_crate(Vec2::new(x, y), 1.0)?;
        }
        info!(crates = PYRAMID.len(), "scene populated");
        Ok(())
    }

    /// Host only: rebuilds the scene from a snapshot and announces it.
    pub fn populate_from_snapshot(
        &mut self,
        snapshot: &SimulationSnapshot,
    ) -> Result<(), SceneError> {
        if !self.is_host() {
            return Err(SceneError::NotHost);
        }
        self.begin_epoch(snapshot.orientations)?;
        for record in &snapshot.crates {
            let state = BodyState {
                position: Vec2::new(record.x, record.y),
                angle: record.angle,
                linvel: Vec2::new(record.vx, record.vy),
                angvel: record.angvel,
            };
            self.spawn_owned(state.position, 1.0, Some(state))?;
        }
        info!(crates = snapshot.crates.len(), "scene restored from snapshot");
        Ok(())
    }

    /// Host only: tells everyone to rebuild and repopulates.
    pub fn request_reset(&mut self) -> Result<(), SceneError> {
        if !self.is_host() {
            return Err(SceneError::NotHost);
        }
        let angles = [
            self.config.scene.host_cannon_angle,
            self.config.scene.client_cannon_angle,
        ];
        self.begin_epoch(angles)?;
        self.populate()
    }

    /// Announces a reset into the next epoch and applies it locally. Traffic
    /// already queued keeps the old epoch, which peers still hold until they
    /// reach this event.
    fn begin_epoch(&mut self, cannon_angles: [f32; 2]) -> Result<(), SceneError> {
        let epoch = self.epoch.wrapping_add(1);
        self.emit_event(&SessionEvent::ResetRequested {
            cannon_angles,
            epoch,
        })?;
        self.epoch = epoch;
        self.reset_with(cannon_angles)
    }

    /// Tears down every body and rebuilds the fixed scene.
    pub fn reset(&mut self) -> Result<(), SceneError> {
        let angles = [
            self.config.scene.host_cannon_angle,
            self.config.scene.client_cannon_angle,
        ];
        self.reset_with(angles)
    }

    fn reset_with(&mut self, cannon_angles: [f32; 2]) -> Result<(), SceneError> {
        self.world.clear();
        self.ownership.clear();
        self.proxies.clear();
        self.objects.clear();
        self.object_of.clear();
        self.complete = None;
        self.goal_reported = false;
        self.build_fixed_scene(cannon_angles)?;
        info!(peer = %self.local_peer, "scene reset");
        Ok(())
    }

    /// Current cannon orientations and crate states.
    pub fn capture_snapshot(&self) -> SimulationSnapshot {
        let crates = self
            .crates()
            .filter_map(|(_, body)| self.world.state(body))
            .map(|s| CrateRecord {
                x: s.position.x,
                y: s.position.y,
                angle: s.angle,
                vx: s.linvel.x,
                vy: s.linvel.y,
                angvel: s.angvel,
            })
            .collect();
        SimulationSnapshot {
            orientations: self.cannon_angles(),
            crates,
        }
    }
}

fn to_wire(state: &BodyState) -> WireState {
    WireState {
        x: state.position.x,
        y: state.position.y,
        angle: state.angle,
        vx: state.linvel.x,
        vy: state.linvel.y,
        angvel: state.angvel,
    }
}

fn from_wire(state: &WireState) -> BodyState {
    BodyState {
        position: Vec2::new(state.x, state.y),
        angle: state.angle,
        linvel: Vec2::new(state.vx, state.vy),
        angvel: state.angvel,
    }
}

#[cfg(test)]
#[path = "scene_tests.rs"]
mod tests;
