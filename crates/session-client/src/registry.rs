//! Participant registry: the authoritative roster.
//!
//! Owned exclusively by the session actor. Every mutation is a whole batch
//! applied between two mailbox messages, so snapshots never see a partial
//! batch.

use crate::types::{ActiveSpeaker, AudioLevel, Participant, UserId};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Default)]
pub struct ParticipantRegistry {
    participants: HashMap<UserId, Participant>,
    /// Join order, for stable snapshots.
    order: Vec<UserId>,
}

impl ParticipantRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole roster (join result).
    pub fn reset(&mut self, participants: Vec<Participant>) {
        self.clear();
        self.add_batch(participants);
    }

    pub fn clear(&mut self) {
        self.participants.clear();
        self.order.clear();
    }

    /// Insert a batch of joined participants.
    ///
    /// Returns the batch as stored. An id already present is replaced in
    /// place and still reported, since the session layer announced it again.
    pub fn add_batch(&mut self, batch: Vec<Participant>) -> Vec<Participant> {
        let mut added = Vec::with_capacity(batch.len());
        for participant in batch {
            if participant.user_id.is_everyone() {
                debug!(
                    target: "sdk.registry",
                    "Ignoring roster entry with reserved everyone id"
                );
                continue;
            }
            if !self.participants.contains_key(&participant.user_id) {
                self.order.push(participant.user_id);
            }
            self.participants
                .insert(participant.user_id, participant.clone());
            added.push(participant);
        }
        added
    }

    /// Remove a batch of ids. Returns the last known state of each removed
    /// participant; unknown ids are dropped.
    pub fn remove_batch(&mut self, ids: &[UserId]) -> Vec<Participant> {
        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            match self.participants.remove(id) {
                Some(participant) => removed.push(participant),
                None => {
                    debug!(
                        target: "sdk.registry",
                        user_id = %id,
                        "Removal for unknown participant dropped"
                    );
                }
            }
        }
        if !removed.is_empty() {
            self.order
                .retain(|id| self.participants.contains_key(id));
        }
        removed
    }

    /// Apply full-value updates. Unknown ids are dropped.
    pub fn update_batch(&mut self, batch: Vec<Participant>) -> Vec<Participant> {
        let mut updated = Vec::with_capacity(batch.len());
        for participant in batch {
            match self.participants.get_mut(&participant.user_id) {
                Some(existing) => {
                    *existing = participant.clone();
                    updated.push(participant);
                }
                None => {
                    debug!(
                        target: "sdk.registry",
                        user_id = %participant.user_id,
                        "Update for unknown participant dropped"
                    );
                }
            }
        }
        updated
    }

    #[must_use]
    pub fn get(&self, id: UserId) -> Option<&Participant> {
        self.participants.get(&id)
    }

    #[must_use]
    pub fn contains(&self, id: UserId) -> bool {
        self.participants.contains_key(&id)
    }

    /// Point-in-time copy of the roster in join order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Participant> {
        self.order
            .iter()
            .filter_map(|id| self.participants.get(id))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn host(&self) -> Option<&Participant> {
        self.order
            .iter()
            .filter_map(|id| self.participants.get(id))
            .find(|p| p.is_host)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Rank current speakers from one activity report, loudest first.
    ///
    /// Recomputed from scratch each call. Silent and unknown ids are
    /// excluded; equal levels keep report order.
    #[must_use]
    pub fn rank_active_speakers(&self, levels: &[AudioLevel]) -> Vec<ActiveSpeaker> {
        let mut ranked: Vec<(u8, &Participant)> = levels
            .iter()
            .filter(|sample| sample.level > 0)
            .filter_map(|sample| {
                self.participants
                    .get(&sample.user_id)
                    .map(|participant| (sample.level, participant))
            })
            .collect();

        ranked.sort_by(|a, b| b.0.cmp(&a.0));

        let mut seen = Vec::with_capacity(ranked.len());
        ranked
            .into_iter()
            .filter(|(_, participant)| {
                if seen.contains(&participant.user_id) {
                    false
                } else {
                    seen.push(participant.user_id);
                    true
                }
            })
            .map(|(_, participant)| ActiveSpeaker {
                user_id: participant.user_id,
                display_name: participant.display_name.clone(),
            })
            .collect()
    }
}
