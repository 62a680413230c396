//! Host and client sessions wired together through an in-memory link.

use cratestack_config::Config;
use cratestack_multiplayer::{
    CLIENT_PEER, CrateFactory, FactoryId, FactoryRegistry, PYRAMID, SceneController, SceneError,
    SimulationSnapshot, TickInput, load_snapshot, write_snapshot,
};
use cratestack_net::{LinkError, LocalLink, ObjectId, PeerId};
use cratestack_physics::PhysicsWorld;
use glam::Vec2;

struct Session {
    host: SceneController,
    client: SceneController,
    host_link: LocalLink,
    client_link: LocalLink,
}

impl Session {
    fn new(config: Config) -> Self {
        let (host_link, client_link) =
            LocalLink::pair(config.network.max_message_bytes as usize);
        let host = SceneController::new(config.clone(), PeerId::HOST).unwrap();
        let client = SceneController::new(config, CLIENT_PEER).unwrap();
        let mut session = Self {
            host,
            client,
            host_link,
            client_link,
        };
        session.host_link.send(&session.host.hello()).unwrap();
        session.client_link.send(&session.client.hello()).unwrap();
        session.deliver();
        session
    }

    /// Sends everything both peers produced and hands it to the other side.
    fn deliver(&mut self) {
        for msg in self.host.drain_outbound() {
            self.host_link.send(&msg).unwrap();
        }
        for msg in self.client.drain_outbound() {
            self.client_link.send(&msg).unwrap();
        }
        while let Some(msg) = self.client_link.try_recv().unwrap() {
            self.client.receive(PeerId::HOST, msg).unwrap();
        }
        while let Some(msg) = self.host_link.try_recv().unwrap() {
            self.host.receive(CLIENT_PEER, msg).unwrap();
        }
    }

    fn step(&mut self, host_input: TickInput, client_input: TickInput) {
        self.host.tick(&host_input).unwrap();
        self.client.tick(&client_input).unwrap();
        self.deliver();
    }
}

fn idle() -> TickInput {
    TickInput::default()
}

#[test]
fn test_handshake_over_link() {
    let session = Session::new(Config::default());
    assert!(session.host.is_verified(CLIENT_PEER));
    assert!(session.client.is_verified(PeerId::HOST));
}

#[test]
fn test_first_factory_gets_id_zero_on_both_peers() {
    let config = Config::default();
    let mut a = FactoryRegistry::new(config.session.seed);
    let mut b = FactoryRegistry::new(config.session.seed);
    let id_a = a.register(Box::new(CrateFactory::from_config(&config))).unwrap();
    let id_b = b.register(Box::new(CrateFactory::from_config(&config))).unwrap();
    assert_eq!(id_a, FactoryId(0));
    assert_eq!(id_b, FactoryId(0));
}

#[test]
fn test_reconstructed_bodies_match_producer() {
    let config = Config::default();
    let mut producer = FactoryRegistry::new(config.session.seed);
    let mut consumer = FactoryRegistry::new(config.session.seed);
    let id = producer
        .register(Box::new(CrateFactory::from_config(&config)))
        .unwrap();
    consumer
        .register(Box::new(CrateFactory::from_config(&config)))
        .unwrap();

    let mut world_a = PhysicsWorld::new(config.physics.gravity, config.session.fixed_timestep_s);
    let mut world_b = PhysicsWorld::new(config.physics.gravity, config.session.fixed_timestep_s);
    for (i, [x, y]) in PYRAMID.iter().enumerate() {
        let size = 0.75 + i as f32 * 0.05;
        let (made, bytes) = producer
            .spawn(&mut world_a, id, Vec2::new(*x, *y), 1.0, size)
            .unwrap();
        let rebuilt = consumer.reconstruct(&mut world_b, id, &bytes).unwrap();
        assert_eq!(made.visual.key, rebuilt.visual.key);
        assert_eq!(
            world_a.material(made.body),
            world_b.material(rebuilt.body)
        );
        assert_eq!(
            world_a.state(made.body).unwrap().position,
            world_b.state(rebuilt.body).unwrap().position
        );
    }
}

#[test]
fn test_pyramid_replicates_and_tracks_host() {
    let mut config = Config::default();
    config.session.state_sync_interval = 1;
    let mut session = Session::new(config);
    session.host.populate().unwrap();
    session.deliver();

    for _ in 0..60 {
        session.step(idle(), idle());
    }
    // the client applies the host's last relay and catches up one step
    session.client.tick(&idle()).unwrap();

    assert_eq!(session.client.crate_count(), PYRAMID.len());
    for ((ho, hb), (co, cb)) in session.host.crates().zip(session.client.crates()) {
        assert_eq!(ho, co);
        assert_eq!(session.client.ownership().owner(cb), Some(PeerId::HOST));
        let h = session.host.world().state(hb).unwrap();
        let c = session.client.world().state(cb).unwrap();
        assert!(
            h.position.distance(c.position) < 0.1,
            "{ho} drifted: host {:?} client {:?}",
            h.position,
            c.position
        );
    }
}

#[test]
fn test_client_fired_crate_stays_client_owned() {
    let mut session = Session::new(Config::default());
    session.step(
        idle(),
        TickInput {
            turn: 0.0,
            fire: true,
        },
    );
    session.step(idle(), idle());

    assert_eq!(session.host.crate_count(), 1);
    let (object, body) = session.host.crates().next().unwrap();
    assert_eq!(object.producer, CLIENT_PEER);
    assert_eq!(session.host.ownership().owner(body), Some(CLIENT_PEER));
    assert!(matches!(
        session.host.despawn(object),
        Err(SceneError::Ownership(_))
    ));

    session.client.despawn(object).unwrap();
    session.deliver();
    session.step(idle(), idle());
    assert_eq!(session.host.crate_count(), 0);
}

#[test]
fn test_snapshot_file_restores_on_both_peers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.snap");

    let mut first = Session::new(Config::default());
    first.host.populate().unwrap();
    first.deliver();
    for _ in 0..30 {
        first.step(
            TickInput {
                turn: 0.5,
                fire: false,
            },
            idle(),
        );
    }
    let snap = first.host.capture_snapshot();
    write_snapshot(&path, &snap).unwrap();

    let loaded = load_snapshot(&path).unwrap();
    assert!(loaded.bits_eq(&snap));

    let mut second = Session::new(Config::default());
    second.host.populate_from_snapshot(&loaded).unwrap();
    second.deliver();
    second.step(idle(), idle());

    assert_eq!(second.client.crate_count(), loaded.crates.len());
    assert_eq!(second.client.cannon_angles(), loaded.orientations);
    assert_eq!(second.host.cannon_angles(), loaded.orientations);
}

#[test]
fn test_reset_after_completion_reopens_session() {
    let config = Config::default();
    let goal = Vec2::from(config.scene.goal);
    let mut session = Session::new(config);
    session.host.spawn_crate(goal, 1.0).unwrap();
    session.step(idle(), idle());
    session.step(idle(), idle());
    assert!(session.host.completed_at().is_some());
    assert!(session.client.completed_at().is_some());

    session.host.request_reset().unwrap();
    session.deliver();
    session.step(idle(), idle());
    assert!(session.client.completed_at().is_none());
    assert_eq!(session.client.crate_count(), PYRAMID.len());
    assert!(
        session
            .client
            .ownership()
            .is_owned_by_local(session.client.body_of(ObjectId::fixed(1)).unwrap())
    );
}

#[test]
fn test_malformed_frame_is_skipped() {
    let mut session = Session::new(Config::default());
    session.host_link.send_raw(vec![0xEE, 1, 2]).unwrap();
    session.host.spawn_crate(Vec2::new(20.0, 10.0), 1.0).unwrap();
    for msg in session.host.drain_outbound() {
        session.host_link.send(&msg).unwrap();
    }

    assert!(matches!(
        session.client_link.try_recv(),
        Err(LinkError::Message(_))
    ));
    while let Some(msg) = session.client_link.try_recv().unwrap() {
        session.client.receive(PeerId::HOST, msg).unwrap();
    }
    session.client.tick(&idle()).unwrap();
    assert_eq!(session.client.crate_count(), 1);
}

#[test]
fn test_empty_snapshot_roundtrips_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.snap");
    let snap = SimulationSnapshot {
        orientations: [0.0, 0.0],
        crates: Vec::new(),
    };
    write_snapshot(&path, &snap).unwrap();
    assert!(load_snapshot(&path).unwrap().bits_eq(&snap));
}
