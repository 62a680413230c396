//! Session handshake: peers exchange a manifest of everything whose order or
//! value must agree before objects and events can flow.

use cratestack_net::{Hello, PROTOCOL_VERSION, PeerId};

/// What a peer registered, in registration order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProtocolManifest {
    pub version: u8,
    pub session_seed: u64,
    pub factories: Vec<String>,
    pub events: Vec<u16>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("protocol version mismatch: local {local}, remote {remote}")]
    Version { local: u8, remote: u8 },
    #[error("session seed mismatch: local {local:#x}, remote {remote:#x}")]
    Seed { local: u64, remote: u64 },
    #[error("factory table differs at id {index}: local {local:?}, remote {remote:?}")]
    Factory {
        index: usize,
        local: Option<String>,
        remote: Option<String>,
    },
    #[error("event table differs at position {index}: local {local:?}, remote {remote:?}")]
    Event {
        index: usize,
        local: Option<u16>,
        remote: Option<u16>,
    },
    #[error("peer {0} has not completed the handshake")]
    NotVerified(PeerId),
    #[error("hello from {sender} claims to be {claimed}")]
    PeerMismatch { claimed: PeerId, sender: PeerId },
}

impl ProtocolManifest {
    pub fn new(session_seed: u64, factories: Vec<String>, events: Vec<u16>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            session_seed,
            factories,
            events,
        }
    }

    pub fn to_hello(&self, peer: PeerId) -> Hello {
        Hello {
            peer,
            version: self.version,
            session_seed: self.session_seed,
            factories: self.factories.clone(),
            events: self.events.clone(),
        }
    }

    pub fn from_hello(hello: &Hello) -> Self {
        Self {
            version: hello.version,
            session_seed: hello.session_seed,
            factories: hello.factories.clone(),
            events: hello.events.clone(),
        }
    }

    /// Reports the first disagreement with `remote`.
    pub fn verify(&self, remote: &ProtocolManifest) -> Result<(), HandshakeError> {
        if self.version != remote.version {
            return Err(HandshakeError::Version {
                local: self.version,
                remote: remote.version,
            });
        }
        if self.session_seed != remote.session_seed {
            return Err(HandshakeError::Seed {
                local: self.session_seed,
                remote: remote.session_seed,
            });
        }
        if let Some(index) = first_difference(&self.factories, &remote.factories) {
            return Err(HandshakeError::Factory {
                index,
                local: self.factories.get(index).cloned(),
                remote: remote.factories.get(index).cloned(),
            });
        }
        if let Some(index) = first_difference(&self.events, &remote.events) {
            return Err(HandshakeError::Event {
                index,
                local: self.events.get(index).copied(),
                remote: remote.events.get(index).copied(),
            });
        }
        Ok(())
    }
}

fn first_difference<T: PartialEq>(a: &[T], b: &[T]) -> Option<usize> {
    let common = a.len().min(b.len());
    (0..common)
        .find(|&i| a[i] != b[i])
        .or((a.len() != b.len()).then_some(common))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> ProtocolManifest {
        ProtocolManifest::new(42, vec!["crate".into()], vec![0, 1])
    }

    #[test]
    fn test_identical_manifests_verify() {
        assert_eq!(manifest().verify(&manifest()), Ok(()));
    }

    #[test]
    fn test_hello_roundtrip() {
        let hello = manifest().to_hello(PeerId(1));
        assert_eq!(hello.peer, PeerId(1));
        assert_eq!(ProtocolManifest::from_hello(&hello), manifest());
    }

    #[test]
    fn test_seed_mismatch() {
        let mut remote = manifest();
        remote.session_seed = 43;
        assert!(matches!(
            manifest().verify(&remote),
            Err(HandshakeError::Seed { local: 42, remote: 43 })
        ));
    }

    #[test]
    fn test_factory_order_mismatch() {
        let local = ProtocolManifest::new(1, vec!["crate".into(), "ball".into()], vec![]);
        let remote = ProtocolManifest::new(1, vec!["ball".into(), "crate".into()], vec![]);
        assert_eq!(
            local.verify(&remote),
            Err(HandshakeError::Factory {
                index: 0,
                local: Some("crate".into()),
                remote: Some("ball".into()),
            })
        );
    }

    #[test]
    fn test_missing_trailing_registration() {
        let local = manifest();
        let remote = ProtocolManifest::new(42, vec!["crate".into()], vec![0]);
        assert_eq!(
            local.verify(&remote),
            Err(HandshakeError::Event {
                index: 1,
                local: Some(1),
                remote: None,
            })
        );
    }

    #[test]
    fn test_version_checked_first() {
        let mut remote = manifest();
        remote.version = PROTOCOL_VERSION + 1;
        remote.session_seed = 0;
        assert!(matches!(
            manifest().verify(&remote),
            Err(HandshakeError::Version { .. })
        ));
    }
}
