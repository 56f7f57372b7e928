//! The participant registry: who is connected and where they stand.
//!
//! `SessionRegistry` is the single source of truth for the grid. Every
//! operation takes one exclusive lock around the whole map, does a small
//! amount of in-memory work, and releases it. Nothing here performs I/O,
//! so holding the lock never waits on a socket.
//!
//! # Handles, not references
//!
//! The registry stores an `Arc<C>` per participant, where `C` is whatever
//! the caller uses to reach that participant (a transport connection on
//! the server, a plain marker in unit tests). Callers get clones of those
//! `Arc`s back; they never hold a borrow into the map. A connection torn
//! down while a broadcast is still writing to it stays alive until the
//! broadcast drops its clone.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use gridcast_protocol::{
    Direction, ParticipantId, ParticipantState, Position, StateSnapshot,
};

use crate::{GridConfig, SessionError};

/// One registered participant.
#[derive(Debug)]
struct Entry<C> {
    position: Position,
    connection: Arc<C>,
}

#[derive(Debug)]
struct Inner<C> {
    /// Keyed by id. `BTreeMap` keeps snapshots in join order.
    entries: BTreeMap<ParticipantId, Entry<C>>,
    /// The id the next `register` hands out. Only ever grows.
    next_id: u32,
}

/// A snapshot together with the handles it should be delivered to.
///
/// Both halves come from the same critical section, so every recipient
/// appears in the snapshot and vice versa.
#[derive(Debug)]
pub struct FanOut<C> {
    pub snapshot: StateSnapshot,
    pub recipients: Vec<(ParticipantId, Arc<C>)>,
}

/// Thread-safe map from participant id to position and outbound handle.
///
/// ## Lifecycle of an entry
///
/// ```text
/// register() ──→ apply_movement() ... ──→ remove()
///     │                                      │
///     ▼                                      ▼
///  id allocated, spawn cell         handle returned once,
///  chosen from the id               later calls get None
/// ```
#[derive(Debug)]
pub struct SessionRegistry<C> {
    grid: GridConfig,
    inner: Mutex<Inner<C>>,
}

impl<C> SessionRegistry<C> {
    /// Creates an empty registry for the given grid. The first id handed
    /// out is 1.
    pub fn new(grid: GridConfig) -> Self {
        Self {
            grid,
            inner: Mutex::new(Inner {
                entries: BTreeMap::new(),
                next_id: 1,
            }),
        }
    }

    /// The grid this registry places participants on.
    pub fn grid(&self) -> GridConfig {
        self.grid
    }

    /// Takes the registry lock.
    ///
    /// A panic while the lock was held cannot leave the map half-updated
    /// (every mutation is a single insert, remove, or field store), so a
    /// poisoned lock is simply taken over.
    fn lock(&self) -> MutexGuard<'_, Inner<C>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a participant, returning its new id and spawn position.
    ///
    /// The id is allocated inside the lock, so concurrent registrations
    /// always receive distinct, increasing ids.
    ///
    /// # Errors
    /// Returns [`SessionError::IdsExhausted`] once `u32::MAX` ids have been
    /// handed out.
    pub fn register(
        &self,
        connection: Arc<C>,
    ) -> Result<(ParticipantId, Position), SessionError> {
        let mut inner = self.lock();

        let id = ParticipantId(inner.next_id);
        if id.is_none() {
            return Err(SessionError::IdsExhausted);
        }
        // When the counter would overflow, park it on 0 so the next call
        // fails instead of wrapping around to a used id.
        inner.next_id = inner.next_id.checked_add(1).unwrap_or(0);

        let position = self.grid.spawn_position(id);
        inner.entries.insert(
            id,
            Entry {
                position,
                connection,
            },
        );
        drop(inner);

        tracing::debug!(participant = %id, %position, "participant registered");
        Ok((id, position))
    }

    /// Moves a participant one cell, clamped to the grid.
    ///
    /// Returns `true` only if the position actually changed. An unknown id
    /// (already removed, or never registered) is ignored and returns
    /// `false`, so a movement racing a disconnect cannot bring the entry
    /// back.
    pub fn apply_movement(
        &self,
        participant: ParticipantId,
        direction: Direction,
    ) -> bool {
        let mut inner = self.lock();
        let Some(entry) = inner.entries.get_mut(&participant) else {
            return false;
        };

        let next = self.grid.step(entry.position, direction);
        if next == entry.position {
            return false;
        }
        entry.position = next;
        true
    }

    /// Removes a participant and hands back its connection handle.
    ///
    /// Idempotent: only the first call for an id returns `Some`, which
    /// makes it the natural place to decide who closes the connection.
    pub fn remove(&self, participant: ParticipantId) -> Option<Arc<C>> {
        let removed = self.lock().entries.remove(&participant)?;
        tracing::debug!(%participant, "participant removed");
        Some(removed.connection)
    }

    /// Copies out every participant's position.
    ///
    /// The result owns its data; later registry changes do not affect it.
    pub fn snapshot(&self, focus: ParticipantId) -> StateSnapshot {
        let inner = self.lock();
        snapshot_of(&inner, focus)
    }

    /// Builds a snapshot and collects every recipient in one pass under
    /// the lock.
    pub fn fan_out(&self, focus: ParticipantId) -> FanOut<C> {
        let inner = self.lock();
        FanOut {
            snapshot: snapshot_of(&inner, focus),
            recipients: recipients_of(&inner),
        }
    }

    /// Every registered participant's connection handle.
    pub fn recipients(&self) -> Vec<(ParticipantId, Arc<C>)> {
        recipients_of(&self.lock())
    }

    /// The current position of one participant.
    pub fn position(&self, participant: ParticipantId) -> Option<Position> {
        self.lock()
            .entries
            .get(&participant)
            .map(|entry| entry.position)
    }

    /// The connection handle of one participant.
    pub fn connection(&self, participant: ParticipantId) -> Option<Arc<C>> {
        self.lock()
            .entries
            .get(&participant)
            .map(|entry| Arc::clone(&entry.connection))
    }

    /// Returns `true` if `participant` is currently registered.
    pub fn contains(&self, participant: ParticipantId) -> bool {
        self.lock().entries.contains_key(&participant)
    }

    /// Number of registered participants.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Returns `true` if nobody is registered.
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }
}

fn snapshot_of<C>(inner: &Inner<C>, focus: ParticipantId) -> StateSnapshot {
    StateSnapshot {
        focus,
        participants: inner
            .entries
            .iter()
            .map(|(id, entry)| ParticipantState {
                participant: *id,
                position: entry.position,
            })
            .collect(),
    }
}

fn recipients_of<C>(inner: &Inner<C>) -> Vec<(ParticipantId, Arc<C>)> {
    inner
        .entries
        .iter()
        .map(|(id, entry)| (*id, Arc::clone(&entry.connection)))
        .collect()
}

// =========================================================================
// Tests
// =========================================================================
