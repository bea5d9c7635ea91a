use std::collections::HashSet;
use std::time::{Duration, Instant};

use uuid::Uuid;

use drift_types::models::ChatMode;

/// A client waiting for a partner. Mode and interests are snapshotted at
/// enqueue time so matching never reads a handle that is mutating underneath
/// it; `set_preferences` refreshes the snapshot in place while still queued.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub client_id: Uuid,
    pub mode: ChatMode,
    pub interests: HashSet<String>,
    pub enqueued_at: Instant,
}

/// One matching pass over the waiting pool.
///
/// Oldest entry first: prefer the earliest-enqueued same-mode candidate with
/// at least one shared interest. If none exists and the entry has waited at
/// least `fallback_after`, pair it with the next-oldest same-mode entry
/// regardless of interests, so clients with no (or unusual) tags still match.
/// Matched entries are removed from `queue`; the pairs are returned with the
/// older member first.
///
/// The pass is deterministic for a fixed queue snapshot, which is what makes
/// matching behavior testable.
pub fn find_pairs(
    queue: &mut Vec<QueueEntry>,
    now: Instant,
    fallback_after: Duration,
) -> Vec<(QueueEntry, QueueEntry)> {
    queue.sort_by_key(|e| e.enqueued_at);

    let mut pairs = Vec::new();
    let mut i = 0;
    while i < queue.len() {
        let mut chosen = None;
        for j in (i + 1)..queue.len() {
            if queue[j].mode != queue[i].mode {
                continue;
            }
            if !queue[i].interests.is_disjoint(&queue[j].interests) {
                chosen = Some(j);
                break;
            }
        }

        if chosen.is_none()
            && now.saturating_duration_since(queue[i].enqueued_at) >= fallback_after
        {
            chosen = ((i + 1)..queue.len()).find(|&j| queue[j].mode == queue[i].mode);
        }

        match chosen {
            Some(j) => {
                // Remove the later index first so `i` stays valid.
                let b = queue.remove(j);
                let a = queue.remove(i);
                pairs.push((a, b));
            }
            None => i += 1,
        }
    }

    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(mode: ChatMode, tags: &[&str], age_ms: u64) -> QueueEntry {
        QueueEntry {
            client_id: Uuid::new_v4(),
            mode,
            interests: tags.iter().map(|t| t.to_string()).collect(),
            enqueued_at: Instant::now() - Duration::from_millis(age_ms),
        }
    }

    #[test]
    fn pairs_oldest_first() {
        let a = entry(ChatMode::Text, &[], 30);
        let b = entry(ChatMode::Text, &[], 20);
        let c = entry(ChatMode::Text, &[], 10);
        let ids = (a.client_id, b.client_id);
        let mut queue = vec![c.clone(), a, b];

        let pairs = find_pairs(&mut queue, Instant::now(), Duration::ZERO);
        assert_eq!(pairs.len(), 1);
        assert_eq!((pairs[0].0.client_id, pairs[0].1.client_id), ids);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].client_id, c.client_id);
    }

    #[test]
    fn prefers_interest_overlap_over_fifo() {
        let a = entry(ChatMode::Text, &["Music"], 30);
        let b = entry(ChatMode::Text, &["Art"], 20);
        let c = entry(ChatMode::Text, &["Music", "Art"], 10);
        let (a_id, b_id, c_id) = (a.client_id, b.client_id, c.client_id);
        let mut queue = vec![a, b, c];

        // a prefers c (shared "Music") over the older b; b then falls back to
        // nothing and stays queued.
        let pairs = find_pairs(&mut queue, Instant::now(), Duration::from_secs(60));
        assert_eq!(pairs.len(), 1);
        assert_eq!((pairs[0].0.client_id, pairs[0].1.client_id), (a_id, c_id));
        assert_eq!(queue[0].client_id, b_id);
    }

    #[test]
    fn modes_never_cross_match() {
        let a = entry(ChatMode::Text, &["Music"], 20);
        let b = entry(ChatMode::Video, &["Music"], 10);
        let mut queue = vec![a, b];

        let pairs = find_pairs(&mut queue, Instant::now(), Duration::ZERO);
        assert!(pairs.is_empty());
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn fallback_matches_disjoint_interests_after_wait() {
        let a = entry(ChatMode::Text, &["Music"], 500);
        let b = entry(ChatMode::Text, &["Art"], 400);
        let mut queue = vec![a, b];

        // Not yet eligible for fallback.
        let pairs = find_pairs(&mut queue, Instant::now(), Duration::from_secs(2));
        assert!(pairs.is_empty());

        // With the default immediate fallback they pair at once.
        let pairs = find_pairs(&mut queue, Instant::now(), Duration::ZERO);
        assert_eq!(pairs.len(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn empty_interest_clients_still_match() {
        let a = entry(ChatMode::Video, &[], 20);
        let b = entry(ChatMode::Video, &[], 10);
        let mut queue = vec![a, b];

        let pairs = find_pairs(&mut queue, Instant::now(), Duration::ZERO);
        assert_eq!(pairs.len(), 1);
    }

    #[test]
    fn multiple_pairs_in_one_pass() {
        let mut queue = vec![
            entry(ChatMode::Text, &["Music"], 40),
            entry(ChatMode::Text, &["Music"], 30),
            entry(ChatMode::Video, &[], 20),
            entry(ChatMode::Video, &[], 10),
        ];

        let pairs = find_pairs(&mut queue, Instant::now(), Duration::ZERO);
        assert_eq!(pairs.len(), 2);
        assert!(queue.is_empty());
        assert_eq!(pairs[0].0.mode, ChatMode::Text);
        assert_eq!(pairs[1].0.mode, ChatMode::Video);
    }
}
