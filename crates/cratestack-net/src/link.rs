//! In-memory duplex link between two peers living in one process.
//!
//! Used by the headless binary and by scenario tests. Sending is
//! fire-and-forget and receiving is poll-based, the same shape a real
//! transport would expose to the session core.

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};
use tracing::trace;

use crate::messages::{
    MessageError, NetMessage, check_size, deserialize_message, serialize_message,
};

/// Errors surfaced by [`LocalLink`].
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("remote end of the link is gone")]
    Disconnected,
    #[error(transparent)]
    Message(#[from] MessageError),
}

/// One end of an in-memory byte link.
pub struct LocalLink {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    max_message_bytes: usize,
}

impl LocalLink {
    /// Creates two connected ends.
    pub fn pair(max_message_bytes: usize) -> (LocalLink, LocalLink) {
        let (a_tx, b_rx) = unbounded();
        let (b_tx, a_rx) = unbounded();
        (
            LocalLink {
                tx: a_tx,
                rx: a_rx,
                max_message_bytes,
            },
            LocalLink {
                tx: b_tx,
                rx: b_rx,
                max_message_bytes,
            },
        )
    }

    /// Encodes and queues a message for the remote end.
    pub fn send(&self, msg: &NetMessage) -> Result<(), LinkError> {
        let bytes = serialize_message(msg)?;
        check_size(bytes.len(), self.max_message_bytes)?;
        trace!(kind = msg.kind(), len = bytes.len(), "link send");
        self.send_raw(bytes)
    }

    /// Queues an already-encoded frame.
    pub fn send_raw(&self, bytes: Vec<u8>) -> Result<(), LinkError> {
        self.tx.send(bytes).map_err(|_| LinkError::Disconnected)
    }

    /// Takes the next frame if one is waiting.
    ///
    /// `Ok(None)` means nothing is pending. A malformed frame is consumed and
    /// reported so the caller can drop it and keep polling.
    pub fn try_recv(&self) -> Result<Option<NetMessage>, LinkError> {
        let bytes = match self.rx.try_recv() {
            Ok(bytes) => bytes,
            Err(TryRecvError::Empty) => return Ok(None),
            Err(TryRecvError::Disconnected) => return Err(LinkError::Disconnected),
        };
        check_size(bytes.len(), self.max_message_bytes)?;
        Ok(Some(deserialize_message(&bytes)?))
    }

    /// Number of frames waiting to be received.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ObjectId;
    use crate::messages::{Despawn, PROTOCOL_VERSION};

    fn despawn(serial: u32) -> NetMessage {
        NetMessage::Despawn(Despawn {
            object: ObjectId::fixed(serial),
            epoch: 0,
        })
    }

    #[test]
    fn test_pair_delivers_in_order() {
        let (a, b) = LocalLink::pair(1024);
        a.send(&despawn(1)).unwrap();
        a.send(&despawn(2)).unwrap();
        assert_eq!(b.pending(), 2);
        assert_eq!(b.try_recv().unwrap(), Some(despawn(1)));
        assert_eq!(b.try_recv().unwrap(), Some(despawn(2)));
        assert_eq!(b.try_recv().unwrap(), None);
    }

    #[test]
    fn test_links_are_directional() {
        let (a, b) = LocalLink::pair(1024);
        a.send(&despawn(1)).unwrap();
        assert_eq!(a.try_recv().unwrap(), None);
        b.send(&despawn(9)).unwrap();
        assert_eq!(a.try_recv().unwrap(), Some(despawn(9)));
    }

    #[test]
    fn test_oversized_send_rejected() {
        let (a, b) = LocalLink::pair(2);
        assert!(matches!(
            a.send(&despawn(1)),
            Err(LinkError::Message(MessageError::TooLarge { .. }))
        ));
        assert_eq!(b.pending(), 0);
    }

    #[test]
    fn test_garbage_frame_reported_then_skipped() {
        let (a, b) = LocalLink::pair(1024);
        a.send_raw(vec![PROTOCOL_VERSION + 7, 1, 2]).unwrap();
        a.send(&despawn(3)).unwrap();
        assert!(matches!(
            b.try_recv(),
            Err(LinkError::Message(MessageError::UnsupportedVersion(_)))
        ));
        assert_eq!(b.try_recv().unwrap(), Some(despawn(3)));
    }

    #[test]
    fn test_disconnected() {
        let (a, b) = LocalLink::pair(1024);
        drop(b);
        assert!(matches!(a.send(&despawn(1)), Err(LinkError::Disconnected)));
        assert!(matches!(a.try_recv(), Err(LinkError::Disconnected)));
    }
}
