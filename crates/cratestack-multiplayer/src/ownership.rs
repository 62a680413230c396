//! Ownership bookkeeping for shared physics bodies.
//!
//! Every synchronized body has exactly one owning peer. Only the owner may
//! change a body's dynamics; everybody else reads it and waits for relayed
//! state. Bodies without a record are local decoration and are never shared.

use std::collections::BTreeSet;

use cratestack_net::PeerId;
use cratestack_physics::{BodyHandle, BodyMut, PhysicsWorld};
use rustc_hash::FxHashMap;
use tracing::{debug, error};

/// Owner and slot of one registered body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OwnershipRecord {
    pub owner: PeerId,
    /// Registry slot. Released slots are handed out again lowest-first.
    pub slot: u32,
}

/// A state change the transport may want to make visible to other peers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OwnershipChange {
    Registered { body: BodyHandle, owner: PeerId },
    Acquired { body: BodyHandle, from: PeerId, to: PeerId },
    Released { body: BodyHandle, owner: PeerId },
}

/// Ownership violations and bookkeeping errors.
#[derive(Debug, thiserror::Error)]
pub enum OwnershipError {
    #[error("body {0:?} already has an ownership record")]
    AlreadyRegistered(BodyHandle),
    #[error("body {0:?} has no ownership record")]
    Unregistered(BodyHandle),
    #[error("body {body:?} is owned by {owner}, not by {requester}")]
    NotOwned {
        body: BodyHandle,
        owner: PeerId,
        requester: PeerId,
    },
    #[error("body {0:?} is registered but missing from the physics world")]
    MissingBody(BodyHandle),
}

/// Maps live bodies to their owning peer.
///
/// Owned by the scene controller and passed by reference wherever an
/// ownership check is needed.
pub struct OwnershipRegistry {
    local_peer: PeerId,
    records: FxHashMap<BodyHandle, OwnershipRecord>,
    free_slots: BTreeSet<u32>,
    next_slot: u32,
    changes: Vec<OwnershipChange>,
}

impl OwnershipRegistry {
    pub fn new(local_peer: PeerId) -> Self {
        Self {
            local_peer,
            records: FxHashMap::default(),
            free_slots: BTreeSet::new(),
            next_slot: 0,
            changes: Vec::new(),
        }
    }

    pub fn local_peer(&self) -> PeerId {
        self.local_peer
    }

    // ------------------------------------------------------------------
    // Record lifecycle
    // ------------------------------------------------------------------

    /// Inserts a record with an explicit owner.
    pub fn register_local_body(
        &mut self,
        body: BodyHandle,
        owner: PeerId,
    ) -> Result<u32, OwnershipError> {
        if self.records.contains_key(&body) {
            return Err(OwnershipError::AlreadyRegistered(body));
        }
        let slot = self.take_slot();
        self.records.insert(body, OwnershipRecord { owner, slot });
        self.changes.push(OwnershipChange::Registered { body, owner });
        debug!(?body, %owner, slot, "body registered");
        Ok(slot)
    }

    /// Reassigns ownership. Acquiring for the current owner changes nothing.
    pub fn acquire(&mut self, body: BodyHandle, owner: PeerId) -> Result<(), OwnershipError> {
        let record = self
            .records
            .get_mut(&body)
            .ok_or(OwnershipError::Unregistered(body))?;
        if record.owner == owner {
            return Ok(());
        }
        let from = record.owner;
        record.owner = owner;
        self.changes.push(OwnershipChange::Acquired {
            body,
            from,
            to: owner,
        });
        debug!(?body, %from, to = %owner, "ownership moved");
        Ok(())
    }

    /// Hands a locally owned body to `to`.
    ///
    /// Fails unless this peer currently owns the body.
    pub fn hand_off(&mut self, body: BodyHandle, to: PeerId) -> Result<(), OwnershipError> {
        self.check_owner(body, self.local_peer)?;
        self.acquire(body, to)
    }

    /// Drops the record without touching the body.
    pub fn release(&mut self, body: BodyHandle) -> Result<OwnershipRecord, OwnershipError> {
        let record = self
            .records
            .remove(&body)
            .ok_or(OwnershipError::Unregistered(body))?;
        self.retire(body, record);
        Ok(record)
    }

    /// Releases every body owned by this peer, in slot order. Returns how
    /// many were released.
    pub fn release_all_local(&mut self) -> usize {
        let mut released = 0;
        for body in self.owned_by(self.local_peer) {
            if let Some(record) = self.records.remove(&body) {
                self.retire(body, record);
                released += 1;
            }
        }
        released
    }

    fn retire(&mut self, body: BodyHandle, record: OwnershipRecord) {
        self.free_slots.insert(record.slot);
        self.changes.push(OwnershipChange::Released {
            body,
            owner: record.owner,
        });
        debug!(?body, owner = %record.owner, slot = record.slot, "body released");
    }

    /// Forgets every record and resets slot allocation.
    pub fn clear(&mut self) {
        self.records.clear();
        self.free_slots.clear();
        self.next_slot = 0;
        self.changes.clear();
    }

    fn take_slot(&mut self) -> u32 {
        if let Some(slot) = self.free_slots.pop_first() {
            return slot;
        }
        let slot = self.next_slot;
        self.next_slot += 1;
        slot
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn record(&self, body: BodyHandle) -> Option<OwnershipRecord> {
        self.records.get(&body).copied()
    }

    pub fn owner(&self, body: BodyHandle) -> Option<PeerId> {
        self.records.get(&body).map(|r| r.owner)
    }

    /// The gate every mutation path checks. Unregistered bodies are never
    /// owned by anyone.
    pub fn is_owned_by_local(&self, body: BodyHandle) -> bool {
        self.owner(body) == Some(self.local_peer)
    }

    pub fn is_registered(&self, body: BodyHandle) -> bool {
        self.records.contains_key(&body)
    }

    /// Bodies currently owned by `peer`, ordered by slot.
    pub fn owned_by(&self, peer: PeerId) -> Vec<BodyHandle> {
        let mut owned: Vec<(u32, BodyHandle)> = self
            .records
            .iter()
            .filter(|(_, r)| r.owner == peer)
            .map(|(h, r)| (r.slot, *h))
            .collect();
        owned.sort_unstable_by_key(|(slot, _)| *slot);
        owned.into_iter().map(|(_, h)| h).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Takes the accumulated change log.
    pub fn drain_changes(&mut self) -> Vec<OwnershipChange> {
        std::mem::take(&mut self.changes)
    }

    // ------------------------------------------------------------------
    // Guarded mutation
    // ------------------------------------------------------------------

    /// Mutable access to a shared body owned by this peer.
    ///
    /// This is the only way the session mutates shared bodies. Violations are
    /// logged at `error` and returned, never ignored.
    pub fn body_mut<'w>(
        &self,
        world: &'w mut PhysicsWorld,
        body: BodyHandle,
    ) -> Result<BodyMut<'w>, OwnershipError> {
        self.body_mut_as(world, body, self.local_peer)
    }

    /// Mutable access on behalf of `peer`, used when applying state relayed
    /// by a remote owner. Fails unless `peer` is the recorded owner.
    pub fn body_mut_as<'w>(
        &self,
        world: &'w mut PhysicsWorld,
        body: BodyHandle,
        peer: PeerId,
    ) -> Result<BodyMut<'w>, OwnershipError> {
        self.check_owner(body, peer)?;
        world
            .body_mut(body)
            .ok_or(OwnershipError::MissingBody(body))
    }

    /// Fails unless `requester` is the recorded owner of `body`.
    pub fn check_owner(&self, body: BodyHandle, requester: PeerId) -> Result<(), OwnershipError> {
        let err = match self.records.get(&body) {
            Some(r) if r.owner == requester => return Ok(()),
            Some(r) => OwnershipError::NotOwned {
                body,
                owner: r.owner,
                requester,
            },
            None => OwnershipError::Unregistered(body),
        };
        error!(local = %self.local_peer, "ownership violation: {err}");
        Err(err)
    }
}
