// Per-participant presence state with logical clocks.
//
// Pure data structure: the provider owns all I/O and event fan-out. An
// incoming entry is accepted only if its clock is strictly greater than the
// stored one, and accepted entries replace the stored entry wholesale. A
// removal deletes the entry outright so peers garbage-collect stale
// presence promptly.

use serde_json::Value;
use std::collections::HashMap;

use crate::types::ParticipantId;
use crate::wire::{AwarenessDelta, ParticipantEntry};

/// Latest known presence for one participant.
#[derive(Debug, Clone, PartialEq)]
pub struct AwarenessEntry {
    pub clock: u32,
    pub state: Value,
}

/// Net effect of one store mutation, in terms of participant ids.
///
/// `added` and `updated` are computed against what the store actually held
/// before the mutation, not against what the wire message claimed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AwarenessChange {
    pub added: Vec<ParticipantId>,
    pub updated: Vec<ParticipantId>,
    pub removed: Vec<ParticipantId>,
}

impl AwarenessChange {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Presence map for one shared document.
pub struct AwarenessStore {
    local_id: ParticipantId,
    /// Counter for the local entry. Survives entry removal so that a
    /// re-announced local state is never rejected as stale by peers.
    local_clock: u32,
    entries: HashMap<ParticipantId, AwarenessEntry>,
}

impl AwarenessStore {
    pub fn new(local_id: ParticipantId) -> Self {
        Self {
            local_id,
            local_clock: 0,
            entries: HashMap::new(),
        }
    }

    pub fn local_id(&self) -> ParticipantId {
        self.local_id
    }

    pub fn entry(&self, id: ParticipantId) -> Option<&AwarenessEntry> {
        self.entries.get(&id)
    }

    /// Set the local participant's presence, advancing its clock.
    pub fn set_local_state(&mut self, state: Value) -> AwarenessChange {
        self.local_clock += 1;
        let previous = self.entries.insert(
            self.local_id,
            AwarenessEntry {
                clock: self.local_clock,
                state,
            },
        );
        let mut change = AwarenessChange::default();
        if previous.is_some() {
            change.updated.push(self.local_id);
        } else {
            change.added.push(self.local_id);
        }
        change
    }

    /// Drop the local participant's presence entry.
    ///
    /// The clock counter is kept, so a later `set_local_state` still
    /// produces a strictly larger clock than anything peers have seen.
    pub fn clear_local_state(&mut self) -> AwarenessChange {
        let mut change = AwarenessChange::default();
        if self.entries.remove(&self.local_id).is_some() {
            change.removed.push(self.local_id);
        }
        change
    }

    /// Apply one received presence delta.
    ///
    /// Entries are applied first (strictly-greater clock rule, wholesale
    /// replacement), then removals; an id both updated and removed by the
    /// same delta nets out to removed.
    pub fn apply(&mut self, delta: &AwarenessDelta) -> AwarenessChange {
        let mut change = AwarenessChange::default();
        for entry in &delta.states {
            let id = entry.participant_id;
            let known = self.entries.get(&id);
            let accept = match known {
                Some(existing) => entry.clock > existing.clock,
                None => true,
            };
            if !accept {
                continue;
            }
            if known.is_some() {
                change.updated.push(id);
            } else {
                change.added.push(id);
            }
            self.entries.insert(
                id,
                AwarenessEntry {
                    clock: entry.clock,
                    state: entry.state.clone(),
                },
            );
            // Keep the local counter ahead of any clock peers have seen for
            // our id, so the next local announcement is not stale.
            if id == self.local_id && entry.clock > self.local_clock {
                self.local_clock = entry.clock;
            }
        }
        for &id in &delta.removed {
            if self.entries.remove(&id).is_some() {
                change.removed.push(id);
                change.added.retain(|&kept| kept != id);
                change.updated.retain(|&kept| kept != id);
            }
        }
        change
    }

    /// Drop every remote entry, keeping only the local participant's.
    ///
    /// Called when a session dies: peers stop being observable, so their
    /// presence is garbage-collected immediately.
    pub fn prune_remote(&mut self) -> AwarenessChange {
        let mut removed: Vec<ParticipantId> = self
            .entries
            .keys()
            .copied()
            .filter(|&id| id != self.local_id)
            .collect();
        removed.sort_unstable();
        for id in &removed {
            self.entries.remove(id);
        }
        AwarenessChange {
            removed,
            ..Default::default()
        }
    }

    /// Full snapshot of the local participant's entry, for handshakes.
    ///
    /// Empty when no local state has been set; the handshake still sends the
    /// (vacuous) frame so the remote learns this participant carries no
    /// presence yet.
    pub fn local_delta(&self) -> AwarenessDelta {
        match self.entries.get(&self.local_id) {
            Some(entry) => AwarenessDelta {
                added: vec![self.local_id],
                states: vec![ParticipantEntry {
                    participant_id: self.local_id,
                    clock: entry.clock,
                    state: entry.state.clone(),
                }],
                ..Default::default()
            },
            None => AwarenessDelta::default(),
        }
    }

    /// Rebuild the wire delta for a change set, with the full current
    /// `(clock, state)` of every changed id.
    pub fn delta_for(&self, change: &AwarenessChange) -> AwarenessDelta {
        let mut delta = AwarenessDelta {
            added: change.added.clone(),
            updated: change.updated.clone(),
            removed: change.removed.clone(),
            ..Default::default()
        };
        for &id in change.added.iter().chain(change.updated.iter()) {
            if let Some(entry) = self.entries.get(&id) {
                delta.states.push(ParticipantEntry {
                    participant_id: id,
                    clock: entry.clock,
                    state: entry.state.clone(),
                });
            }
        }
        delta
    }

    /// All current entries, ordered by participant id.
    pub fn snapshot(&self) -> Vec<ParticipantEntry> {
        let mut entries: Vec<ParticipantEntry> = self
            .entries
            .iter()
            .map(|(&participant_id, entry)| ParticipantEntry {
                participant_id,
                clock: entry.clock,
                state: entry.state.clone(),
            })
            .collect();
        entries.sort_unstable_by_key(|entry| entry.participant_id);
        entries
    }
}
