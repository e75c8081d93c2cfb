//! Batched enrichment of summary stubs.
//!
//! Calls that only learn steam ids (friends list, search, chat log, poll)
//! queue stubs here. The client then fetches full profiles in batches of at
//! most [`BATCH_SIZE`] ids and copies them into every stub with a matching id.

use std::collections::HashSet;

use serde_json::Value;

use super::summary::{SummaryArena, SummaryKey};
use crate::json;

/// Most ids sent in one `GetUserSummaries` request.
pub const BATCH_SIZE: usize = 100;

#[derive(Debug, Default)]
pub struct PendingSummaries {
    queue: Vec<SummaryKey>,
    in_flight: Vec<String>,
}

impl PendingSummaries {
    pub fn push(&mut self, key: SummaryKey) {
        self.queue.push(key);
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether a batch request is out and its response is what comes next.
    pub fn awaiting_batch(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// Picks the next batch: unique ids, in queue order, at most [`BATCH_SIZE`].
    pub fn next_batch(&mut self, arena: &SummaryArena) -> Option<Vec<String>> {
        let mut seen = HashSet::new();
        let mut batch = Vec::new();

        for key in &self.queue {
            let Some(summary) = arena.get(*key) else {
                continue;
            };

            if !seen.insert(summary.steamid.as_str()) {
                continue;
            }

            batch.push(summary.steamid.clone());

            if batch.len() == BATCH_SIZE {
                break;
            }
        }

        if batch.is_empty() {
            self.queue.clear();
            return None;
        }

        self.in_flight.clone_from(&batch);
        Some(batch)
    }

    /// Applies a batch response.
    ///
    /// Every queued stub whose id was in the batch leaves the queue, whether or
    /// not the service returned a profile for it.
    pub fn resolve(&mut self, arena: &mut SummaryArena, response: &Value) {
        let players = json::get_array(response, "players")
            .map(Vec::as_slice)
            .unwrap_or_default();

        for player in players {
            let Some(steamid) = json::get_str(player, "steamid") else {
                continue;
            };

            for key in &self.queue {
                if let Some(summary) = arena.get_mut(*key) {
                    if summary.steamid == steamid {
                        summary.update_from(player);
                    }
                }
            }
        }

        let batch: HashSet<&str> = self.in_flight.iter().map(String::as_str).collect();
        self.queue.retain(|key| {
            arena
                .get(*key)
                .is_some_and(|summary| !batch.contains(summary.steamid.as_str()))
        });
        self.in_flight.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::FriendSummary;
    use serde_json::json;

    fn queue(ids: &[&str]) -> (SummaryArena, PendingSummaries) {
        let mut arena = SummaryArena::default();
        let mut pending = PendingSummaries::default();
        for id in ids {
            pending.push(arena.insert(FriendSummary::new(*id)));
        }
        (arena, pending)
    }

    #[test]
    fn batches_skip_duplicates() {
        let (arena, mut pending) = queue(&["1", "2", "1", "3"]);
        assert_eq!(pending.next_batch(&arena).unwrap(), vec!["1", "2", "3"]);
        assert!(pending.awaiting_batch());
    }

    #[test]
    fn batches_are_capped() {
        let ids: Vec<String> = (0..250).map(|i| i.to_string()).collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let (mut arena, mut pending) = queue(&refs);

        let mut sizes = Vec::new();
        while let Some(batch) = pending.next_batch(&arena) {
            sizes.push(batch.len());
            pending.resolve(&mut arena, &json!({ "players": [] }));
        }

        assert_eq!(sizes, vec![100, 100, 50]);
        assert!(pending.is_empty());
    }

    #[test]
    fn resolve_enriches_every_matching_stub() {
        let (mut arena, mut pending) = queue(&["7", "8", "7"]);
        pending.next_batch(&arena);
        pending.resolve(
            &mut arena,
            &json!({ "players": [{ "steamid": "7", "personaname": "seven", "personastate": 1 }] }),
        );

        assert!(pending.is_empty());
        assert!(!pending.awaiting_batch());
        assert_eq!(arena.resolve(SummaryKey(0)).nick.as_deref(), Some("seven"));
        assert_eq!(arena.resolve(SummaryKey(2)), arena.resolve(SummaryKey(0)));
        assert_eq!(arena.resolve(SummaryKey(1)).nick, None);
    }
}
