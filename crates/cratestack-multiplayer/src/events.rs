//! Ordered channel for session-level events.
//!
//! Events are a closed sum type. Each kind has a wire tag and must be
//! registered with the channel before it can be pushed or received. Events
//! from one sender are delivered in the order that sender pushed them;
//! replays and reordered stragglers are dropped.

use std::collections::VecDeque;

use cratestack_net::{EventEnvelope, PeerId};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Kinds of session events, with their wire tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    SessionComplete,
    ResetRequested,
}

impl EventKind {
    pub fn tag(self) -> u16 {
        match self {
            EventKind::SessionComplete => 0,
            EventKind::ResetRequested => 1,
        }
    }

    pub fn from_tag(tag: u16) -> Option<Self> {
        match tag {
            0 => Some(EventKind::SessionComplete),
            1 => Some(EventKind::ResetRequested),
            _ => None,
        }
    }
}

/// A session event and its payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SessionEvent {
    /// A crate reached the goal at `(x, y)` during reset epoch `epoch`.
    SessionComplete { x: f32, y: f32, epoch: u32 },
    /// The host asks everyone to rebuild the scene with these cannon angles
    /// and to enter reset epoch `epoch`.
    ResetRequested { cannon_angles: [f32; 2], epoch: u32 },
}

impl SessionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::SessionComplete { .. } => EventKind::SessionComplete,
            SessionEvent::ResetRequested { .. } => EventKind::ResetRequested,
        }
    }
}

/// An event received from a peer, ready for dispatch.
#[derive(Clone, Debug, PartialEq)]
pub struct InboundEvent {
    pub sender: PeerId,
    pub sequence: u32,
    pub event: SessionEvent,
}

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("event kind {0:?} is not registered")]
    Unregistered(EventKind),
    #[error("unknown event tag {0}")]
    UnknownTag(u16),
    #[error("event kind {0:?} registered twice")]
    AlreadyRegistered(EventKind),
    #[error("no inbound event available")]
    Empty,
    #[error("payload does not match tag {tag}")]
    TagMismatch { tag: u16 },
    #[error("event payload: {0}")]
    Payload(#[from] postcard::Error),
}

/// Outbound and inbound event queues for one peer.
pub struct EventChannel {
    registered: Vec<EventKind>,
    outbound: VecDeque<EventEnvelope>,
    inbound: VecDeque<InboundEvent>,
    next_sequence: u32,
    last_delivered: FxHashMap<PeerId, u32>,
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl EventChannel {
    pub fn new() -> Self {
        Self {
            registered: Vec::new(),
            outbound: VecDeque::new(),
            inbound: VecDeque::new(),
            next_sequence: 1,
            last_delivered: FxHashMap::default(),
        }
    }

    /// Registers an event kind. Order matters: it is part of the handshake.
    pub fn register(&mut self, kind: EventKind) -> Result<(), EventError> {
        if self.registered.contains(&kind) {
            return Err(EventError::AlreadyRegistered(kind));
        }
        self.registered.push(kind);
        Ok(())
    }

    pub fn is_registered(&self, kind: EventKind) -> bool {
        self.registered.contains(&kind)
    }

    /// Registered tags in registration order.
    pub fn registered_tags(&self) -> Vec<u16> {
        self.registered.iter().map(|k| k.tag()).collect()
    }

    // ------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------

    /// Queues an event for every other peer and returns its sequence number.
    pub fn push(&mut self, event: &SessionEvent) -> Result<u32, EventError> {
        let kind = event.kind();
        if !self.is_registered(kind) {
            return Err(EventError::Unregistered(kind));
        }
        let payload = postcard::to_allocvec(event)?;
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        self.outbound.push_back(EventEnvelope {
            tag: kind.tag(),
            sequence,
            payload,
        });
        debug!(?kind, sequence, "event queued");
        Ok(sequence)
    }

    /// Takes every queued outbound envelope in push order.
    pub fn drain_outbound(&mut self) -> Vec<EventEnvelope> {
        self.outbound.drain(..).collect()
    }

    // ------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------

    /// Accepts an envelope from `sender`.
    ///
    /// Returns `Ok(false)` when the envelope is a replay or arrived after a
    /// later one from the same sender.
    pub fn receive(&mut self, sender: PeerId, envelope: &EventEnvelope) -> Result<bool, EventError> {
        let kind = EventKind::from_tag(envelope.tag).ok_or(EventError::UnknownTag(envelope.tag))?;
        if !self.is_registered(kind) {
            return Err(EventError::Unregistered(kind));
        }

        let last = self.last_delivered.get(&sender).copied().unwrap_or(0);
        if envelope.sequence <= last {
            warn!(%sender, sequence = envelope.sequence, last, "dropping stale event");
            return Ok(false);
        }

        let event: SessionEvent = postcard::from_bytes(&envelope.payload)?;
        if event.kind() != kind {
            return Err(EventError::TagMismatch { tag: envelope.tag });
        }

        self.last_delivered.insert(sender, envelope.sequence);
        self.inbound.push_back(InboundEvent {
            sender,
            sequence: envelope.sequence,
            event,
        });
        Ok(true)
    }

    /// Drops the sequence state kept for `sender`, so a restarted peer whose
    /// numbering begins again at 1 is heard.
    pub fn forget_sender(&mut self, sender: PeerId) {
        if self.last_delivered.remove(&sender).is_some() {
            debug!(%sender, "event sequence reset");
        }
    }

    pub fn has_inbound(&self) -> bool {
        !self.inbound.is_empty()
    }

    /// Next inbound event. Fails with [`EventError::Empty`] when nothing is
    /// waiting; callers check [`has_inbound`](Self::has_inbound) first.
    pub fn pop_inbound(&mut self) -> Result<InboundEvent, EventError> {
        self.inbound.pop_front().ok_or(EventError::Empty)
    }
}
