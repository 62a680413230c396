//! Drives both peers frame by frame and moves their traffic over the link.

use std::path::PathBuf;

use cratestack_config::Config;
use cratestack_multiplayer::{
    CLIENT_PEER, SceneController, SceneError, SnapshotError, TickInput, TickSchedule, VisualProxy,
    VisualSink, VisualTransform, load_snapshot, write_snapshot,
};
use cratestack_net::{LinkError, LocalLink, PeerId};
use tracing::{debug, info, trace, warn};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Scene(#[from] SceneError),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

pub struct RunOptions {
    pub ticks: u64,
    pub fire_every: u64,
    pub snapshot_in: Option<PathBuf>,
    pub snapshot_out: Option<PathBuf>,
}

/// End-of-run figures.
#[derive(Debug, Default)]
pub struct Summary {
    pub ticks: u64,
    pub host_crates: usize,
    pub client_crates: usize,
    pub host_owned: usize,
    pub client_owned: usize,
    pub max_divergence: f32,
    pub completed: bool,
    pub visual_updates: usize,
    pub dropped_frames: usize,
}

impl Summary {
    pub fn log(&self) {
        info!(
            "ran {} ticks | crates host={} client={} | owned host={} client={}",
            self.ticks, self.host_crates, self.client_crates, self.host_owned, self.client_owned
        );
        info!(
            "max divergence {:.4} | complete={} | visual updates={} | dropped frames={}",
            self.max_divergence, self.completed, self.visual_updates, self.dropped_frames
        );
    }
}

/// Counts proxy updates instead of drawing them.
#[derive(Default)]
struct CountingSink {
    updates: usize,
}

impl VisualSink for CountingSink {
    fn update(&mut self, proxy: &VisualProxy, transform: VisualTransform) {
        trace!(key = %proxy.key, x = transform.position.x, y = transform.position.y, "visual");
        self.updates += 1;
    }

    fn removed(&mut self, proxy: &VisualProxy) {
        trace!(key = %proxy.key, "visual removed");
    }
}

struct Peer {
    scene: SceneController,
    link: LocalLink,
    schedule: TickSchedule,
    remote: PeerId,
}

impl Peer {
    fn new(config: &Config, local: PeerId, remote: PeerId, link: LocalLink) -> Result<Self, AppError> {
        let schedule = TickSchedule::new(
            config.session.fixed_timestep_s,
            config.session.max_catch_up_steps,
        );
        Ok(Self {
            scene: SceneController::new(config.clone(), local)?,
            link,
            schedule,
            remote,
        })
    }

    fn flush(&mut self) -> Result<(), AppError> {
        for msg in self.scene.drain_outbound() {
            self.link.send(&msg)?;
        }
        Ok(())
    }

    /// Hands every waiting frame to the scene. Returns the number of frames
    /// that could not be decoded or were refused.
    fn poll(&mut self) -> Result<usize, AppError> {
        let mut dropped = 0;
        loop {
            match self.link.try_recv() {
                Ok(Some(msg)) => {
                    if let Err(e) = self.scene.receive(self.remote, msg) {
                        warn!(peer = %self.scene.local_peer(), "refused frame: {e}");
                        dropped += 1;
                    }
                }
                Ok(None) => return Ok(dropped),
                Err(LinkError::Message(e)) => {
                    warn!(peer = %self.scene.local_peer(), "malformed frame: {e}");
                    dropped += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

pub struct Driver {
    host: Peer,
    client: Peer,
    frame_secs: f32,
    dropped_frames: usize,
}

impl Driver {
    /// Builds both peers and completes the handshake.
    pub fn new(config: Config) -> Result<Self, AppError> {
        let (host_link, client_link) = LocalLink::pair(config.network.max_message_bytes as usize);
        let mut host = Peer::new(&config, PeerId::HOST, CLIENT_PEER, host_link)?;
        let mut client = Peer::new(&config, CLIENT_PEER, PeerId::HOST, client_link)?;

        host.link.send(&host.scene.hello())?;
        client.link.send(&client.scene.hello())?;
        let mut driver = Self {
            host,
            client,
            frame_secs: config.session.fixed_timestep_s,
            dropped_frames: 0,
        };
        driver.exchange()?;

        if !driver.host.scene.is_verified(CLIENT_PEER) || !driver.client.scene.is_verified(PeerId::HOST) {
            warn!("handshake incomplete; peers will refuse each other's traffic");
        }
        Ok(driver)
    }

    fn exchange(&mut self) -> Result<(), AppError> {
        self.host.flush()?;
        self.client.flush()?;
        self.dropped_frames += self.host.poll()?;
        self.dropped_frames += self.client.poll()?;
        Ok(())
    }

    pub fn run(&mut self, options: &RunOptions) -> Result<Summary, AppError> {
        match &options.snapshot_in {
            Some(path) => {
                let snapshot = load_snapshot(path)?;
                self.host.scene.populate_from_snapshot(&snapshot)?;
            }
            None => self.host.scene.populate()?,
        }
        self.exchange()?;

        let mut sink = CountingSink::default();
        for tick in 0..options.ticks {
            let (host_input, client_input) = scripted_input(tick, options.fire_every);

            let frame = self
                .host
                .scene
                .advance(&mut self.host.schedule, self.frame_secs, &host_input)?;
            self.host.scene.sync_visuals(frame.leftover, &mut sink);

            let frame = self
                .client
                .scene
                .advance(&mut self.client.schedule, self.frame_secs, &client_input)?;
            self.client.scene.sync_visuals(frame.leftover, &mut sink);

            self.exchange()?;
            if let Some(at) = self.host.scene.completed_at()
                && tick % 60 == 0
            {
                debug!(tick, x = at.x, y = at.y, "session complete");
            }
        }

        if let Some(path) = &options.snapshot_out {
            write_snapshot(path, &self.host.scene.capture_snapshot())?;
        }

        Ok(self.summary(options.ticks, sink.updates))
    }

    fn summary(&self, ticks: u64, visual_updates: usize) -> Summary {
        let host = &self.host.scene;
        let client = &self.client.scene;
        let max_divergence = host
            .crates()
            .filter_map(|(object, hb)| {
                let cb = client.body_of(object)?;
                let h = host.world().state(hb)?;
                let c = client.world().state(cb)?;
                Some(h.position.distance(c.position))
            })
            .fold(0.0_f32, f32::max);

        Summary {
            ticks,
            host_crates: host.crate_count(),
            client_crates: client.crate_count(),
            host_owned: host.ownership().owned_by(PeerId::HOST).len(),
            client_owned: client.ownership().owned_by(CLIENT_PEER).len(),
            max_divergence,
            completed: host.completed_at().is_some(),
            visual_updates,
            dropped_frames: self.dropped_frames,
        }
    }
}

/// Host sweeps its cannon back and forth; the client mirrors it.
/// Fires alternate between the peers.
fn scripted_input(tick: u64, fire_every: u64) -> (TickInput, TickInput) {
    let turn = if (tick / 120) % 2 == 0 { 0.25 } else { -0.25 };
    let fire = |offset: u64| fire_every > 0 && tick >= offset && (tick - offset) % fire_every == 0;
    let host = TickInput {
        turn,
        fire: fire(fire_every),
    };
    let client = TickInput {
        turn: -turn,
        fire: fire(fire_every + fire_every / 2),
    };
    (host, client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_input_never_fires_when_disabled() {
        for tick in 0..500 {
            let (h, c) = scripted_input(tick, 0);
            assert!(!h.fire && !c.fire);
        }
    }

    #[test]
    fn test_scripted_input_alternates_fire() {
        let host: Vec<u64> = (0..400).filter(|&t| scripted_input(t, 100).0.fire).collect();
        let client: Vec<u64> = (0..400).filter(|&t| scripted_input(t, 100).1.fire).collect();
        assert_eq!(host, vec![100, 200, 300]);
        assert_eq!(client, vec![150, 250, 350]);
    }

    #[test]
    fn test_short_run_keeps_peers_in_step() {
        let mut driver = Driver::new(Config::default()).unwrap();
        let summary = driver
            .run(&RunOptions {
                ticks: 30,
                fire_every: 0,
                snapshot_in: None,
                snapshot_out: None,
            })
            .unwrap();
        assert_eq!(summary.host_crates, 15);
        assert_eq!(summary.client_crates, 15);
        assert_eq!(summary.host_owned, 16);
        assert_eq!(summary.client_owned, 1);
        assert_eq!(summary.dropped_frames, 0);
    }

    #[test]
    fn test_snapshot_out_then_in() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.snap");
        let mut first = Driver::new(Config::default()).unwrap();
        first
            .run(&RunOptions {
                ticks: 10,
                fire_every: 0,
                snapshot_in: None,
                snapshot_out: Some(path.clone()),
            })
            .unwrap();

        let mut second = Driver::new(Config::default()).unwrap();
        let summary = second
            .run(&RunOptions {
                ticks: 1,
                fire_every: 0,
                snapshot_in: Some(path),
                snapshot_out: None,
            })
            .unwrap();
        assert_eq!(summary.client_crates, 15);
    }
}
