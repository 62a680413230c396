//! Visual proxies and the per-frame transform push.
//!
//! A proxy and its body live independently. The proxy only remembers the
//! body handle for lookup; when the body disappears the proxy is dropped on
//! the next sync.

use cratestack_physics::{BodyHandle, PhysicsWorld};
use glam::Vec2;
use tracing::trace;

/// Render-side stand-in for a body.
#[derive(Clone, Debug, PartialEq)]
pub struct VisualProxy {
    /// Body this proxy follows. Lookup only.
    pub body: BodyHandle,
    /// Asset key, e.g. `crate07` or `cannon`.
    pub key: String,
    /// Draw scale applied by the renderer.
    pub scale: f32,
}

/// Transform pushed to the renderer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VisualTransform {
    pub position: Vec2,
    pub angle: f32,
    pub scale: f32,
}

/// Receiver of proxy updates. Rendering lives behind this trait.
pub trait VisualSink {
    fn update(&mut self, proxy: &VisualProxy, transform: VisualTransform);
    fn removed(&mut self, proxy: &VisualProxy);
}

struct ProxyEntry {
    proxy: VisualProxy,
    last_pushed: Option<VisualTransform>,
}

/// Proxies in attach order.
#[derive(Default)]
pub struct ProxyRegistry {
    entries: Vec<ProxyEntry>,
}

impl ProxyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a proxy, replacing any previous proxy for the same body.
    pub fn attach(&mut self, proxy: VisualProxy) {
        self.entries.retain(|e| e.proxy.body != proxy.body);
        self.entries.push(ProxyEntry {
            proxy,
            last_pushed: None,
        });
    }

    pub fn detach(&mut self, body: BodyHandle) -> Option<VisualProxy> {
        let idx = self.entries.iter().position(|e| e.proxy.body == body)?;
        Some(self.entries.remove(idx).proxy)
    }

    pub fn get(&self, body: BodyHandle) -> Option<&VisualProxy> {
        self.entries
            .iter()
            .find(|e| e.proxy.body == body)
            .map(|e| &e.proxy)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Pushes extrapolated transforms for proxies whose transform changed.
    ///
    /// `leftover` is the unsimulated time since the last fixed step. Proxies
    /// whose body is gone are reported to the sink and dropped. Returns the
    /// number of updates pushed.
    pub fn sync_visuals(
        &mut self,
        world: &PhysicsWorld,
        leftover: f32,
        sink: &mut dyn VisualSink,
    ) -> usize {
        let mut pushed = 0;
        self.entries.retain_mut(|entry| {
            let Some(state) = world.state(entry.proxy.body) else {
                sink.removed(&entry.proxy);
                return false;
            };
            let transform = VisualTransform {
                position: state.position + state.linvel * leftover,
                angle: state.angle + state.angvel * leftover,
                scale: entry.proxy.scale,
            };
            if entry.last_pushed != Some(transform) {
                trace!(key = %entry.proxy.key, x = transform.position.x, y = transform.position.y, "visual update");
                sink.update(&entry.proxy, transform);
                entry.last_pushed = Some(transform);
                pushed += 1;
            }
            true
        });
        pushed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cratestack_physics::{BodyDesc, BodyKind};

    #[derive(Default)]
    struct RecordingSink {
        updates: Vec<(String, VisualTransform)>,
        removed: Vec<String>,
    }

    impl VisualSink for RecordingSink {
        fn update(&mut self, proxy: &VisualProxy, transform: VisualTransform) {
            self.updates.push((proxy.key.clone(), transform));
        }
        fn removed(&mut self, proxy: &VisualProxy) {
            self.removed.push(proxy.key.clone());
        }
    }

    fn setup() -> (PhysicsWorld, BodyHandle, BodyHandle) {
        let mut world = PhysicsWorld::new(0.0, 0.01);
        let mut moving = BodyDesc::new(BodyKind::Dynamic, Vec2::new(1.0, 1.0), Vec2::splat(0.5));
        moving.linvel = Vec2::new(10.0, 0.0);
        moving.angvel = 2.0;
        let moving = world.init_body(&moving).unwrap();
        let wall = world
            .init_body(&BodyDesc::new(BodyKind::Static, Vec2::new(5.0, 0.0), Vec2::splat(1.0)))
            .unwrap();
        (world, moving, wall)
    }

    fn proxy(body: BodyHandle, key: &str) -> VisualProxy {
        VisualProxy {
            body,
            key: key.to_string(),
            scale: 32.0,
        }
    }

    #[test]
    fn test_extrapolates_with_leftover() {
        let (world, moving, _) = setup();
        let mut proxies = ProxyRegistry::new();
        proxies.attach(proxy(moving, "crate01"));
        let mut sink = RecordingSink::default();
        assert_eq!(proxies.sync_visuals(&world, 0.005, &mut sink), 1);
        let (_, t) = sink.updates[0];
        assert!((t.position.x - 1.05).abs() < 1e-5);
        assert!((t.angle - 0.01).abs() < 1e-6);
        assert_eq!(t.scale, 32.0);
    }

    #[test]
    fn test_unchanged_transforms_not_pushed_twice() {
        let (world, _, wall) = setup();
        let mut proxies = ProxyRegistry::new();
        proxies.attach(proxy(wall, "wall"));
        let mut sink = RecordingSink::default();
        assert_eq!(proxies.sync_visuals(&world, 0.0, &mut sink), 1);
        assert_eq!(proxies.sync_visuals(&world, 0.004, &mut sink), 0);
        assert_eq!(sink.updates.len(), 1);
    }

    #[test]
    fn test_proxy_dropped_when_body_gone() {
        let (mut world, moving, wall) = setup();
        let mut proxies = ProxyRegistry::new();
        proxies.attach(proxy(moving, "crate01"));
        proxies.attach(proxy(wall, "wall"));
        world.remove_body(moving).unwrap();

        let mut sink = RecordingSink::default();
        proxies.sync_visuals(&world, 0.0, &mut sink);
        assert_eq!(sink.removed, vec!["crate01".to_string()]);
        assert_eq!(proxies.len(), 1);
        assert!(proxies.get(moving).is_none());
    }

    #[test]
    fn test_attach_replaces_and_detach() {
        let (_, moving, _) = setup();
        let mut proxies = ProxyRegistry::new();
        proxies.attach(proxy(moving, "crate01"));
        proxies.attach(proxy(moving, "crate02"));
        assert_eq!(proxies.len(), 1);
        assert_eq!(proxies.get(moving).unwrap().key, "crate02");
        assert_eq!(proxies.detach(moving).unwrap().key, "crate02");
        assert!(proxies.is_empty());
    }
}
