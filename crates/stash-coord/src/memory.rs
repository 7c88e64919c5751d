use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use stash_types::clock::add_duration;
use stash_types::Clock;

use crate::error::CoordResult;
use crate::traits::{CoordinationService, Lease, QueueEntry};

#[derive(Debug, Default)]
struct ScoredQueue {
    ordered: BTreeSet<(i64, String)>,
    scores: HashMap<String, i64>,
}

#[derive(Debug, Default)]
struct State {
    queues: HashMap<String, ScoredQueue>,
    leases: HashMap<String, Lease>,
    next_token: u64,
}

/// Single-process [`CoordinationService`].
///
/// Lease expiry is evaluated against the supplied clock.
#[derive(Debug)]
pub struct InMemoryCoordination {
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
}

impl InMemoryCoordination {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(State::default()),
        }
    }

    /// Snapshot of a queue in score order.
    pub fn entries(&self, queue: &str) -> Vec<QueueEntry> {
        let state = self.state.lock().expect("lock poisoned");
        state
            .queues
            .get(queue)
            .map(|q| {
                q.ordered
                    .iter()
                    .map(|(score, member)| QueueEntry {
                        member: member.clone(),
                        score: *score,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl CoordinationService for InMemoryCoordination {
    async fn enqueue(&self, queue: &str, member: &str, score: i64) -> CoordResult<()> {
        let mut state = self.state.lock().expect("lock poisoned");
        let q = state.queues.entry(queue.to_string()).or_default();
        if let Some(existing) = q.scores.get(member).copied() {
            if existing >= score {
                return Ok(());
            }
            q.ordered.remove(&(existing, member.to_string()));
        }
        q.ordered.insert((score, member.to_string()));
        q.scores.insert(member.to_string(), score);
        Ok(())
    }

    async fn pop_min(&self, queue: &str, max_score: i64) -> CoordResult<Option<QueueEntry>> {
        let mut state = self.state.lock().expect("lock poisoned");
        let Some(q) = state.queues.get_mut(queue) else {
            return Ok(None);
        };
        let due = q.ordered.first().is_some_and(|(score, _)| *score <= max_score);
        if !due {
            return Ok(None);
        }
        let Some((score, member)) = q.ordered.pop_first() else {
            return Ok(None);
        };
        q.scores.remove(&member);
        Ok(Some(QueueEntry { member, score }))
    }

    async fn queue_len(&self, queue: &str) -> CoordResult<usize> {
        let state = self.state.lock().expect("lock poisoned");
        Ok(state.queues.get(queue).map_or(0, |q| q.ordered.len()))
    }

    async fn try_acquire_lease(
        &self,
        key: &str,
        holder: &str,
        ttl: Duration,
    ) -> CoordResult<Option<Lease>> {
        let now = self.clock.now();
        let mut state = self.state.lock().expect("lock poisoned");
        let current = state
            .leases
            .get(key)
            .filter(|lease| !lease.is_expired(now))
            .map(|lease| (lease.holder == holder, lease.fencing_token, lease.acquired_at));
        let (fencing_token, acquired_at) = match current {
            Some((true, token, at)) => (token, at),
            Some((false, ..)) => return Ok(None),
            None => {
                state.next_token += 1;
                (state.next_token, now)
            }
        };
        let lease = Lease {
            key: key.to_string(),
            holder: holder.to_string(),
            fencing_token,
            acquired_at,
            expires_at: add_duration(now, ttl),
            ttl,
        };
        state.leases.insert(key.to_string(), lease.clone());
        Ok(Some(lease))
    }

    async fn release_lease(&self, key: &str, holder: &str) -> CoordResult<bool> {
        let now = self.clock.now();
        let mut state = self.state.lock().expect("lock poisoned");
        let held = state
            .leases
            .get(key)
            .is_some_and(|lease| lease.holder == holder && !lease.is_expired(now));
        if held {
            state.leases.remove(key);
        }
        Ok(held)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use stash_types::ManualClock;

    use super::*;

    fn setup() -> (Arc<ManualClock>, InMemoryCoordination) {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        let coord = InMemoryCoordination::new(clock.clone());
        (clock, coord)
    }

    // -----------------------------------------------------------------------
    // Queues
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn pop_respects_score_order_and_bound() {
        let (_, coord) = setup();
        coord.enqueue("q", "b", 20).await.unwrap();
        coord.enqueue("q", "a", 10).await.unwrap();
        coord.enqueue("q", "c", 30).await.unwrap();

        assert!(coord.pop_min("q", 5).await.unwrap().is_none());
        let first = coord.pop_min("q", 25).await.unwrap().unwrap();
        assert_eq!((first.member.as_str(), first.score), ("a", 10));
        assert_eq!(coord.pop_min("q", 25).await.unwrap().unwrap().member, "b");
        assert!(coord.pop_min("q", 25).await.unwrap().is_none());
        assert_eq!(coord.queue_len("q").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn member_keeps_larger_score() {
        let (_, coord) = setup();
        coord.enqueue("q", "m", 10).await.unwrap();
        coord.enqueue("q", "m", 5).await.unwrap();
        assert_eq!(coord.entries("q"), vec![QueueEntry { member: "m".into(), score: 10 }]);
        coord.enqueue("q", "m", 40).await.unwrap();
        assert_eq!(coord.entries("q")[0].score, 40);
        assert_eq!(coord.queue_len("q").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn queues_are_independent() {
        let (_, coord) = setup();
        coord.enqueue("q1", "m", 1).await.unwrap();
        assert!(coord.pop_min("q2", 100).await.unwrap().is_none());
        assert_eq!(coord.queue_len("q2").await.unwrap(), 0);
    }

    // -----------------------------------------------------------------------
    // Leases
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn lease_is_exclusive_until_expiry() {
        let (clock, coord) = setup();
        let ttl = Duration::from_secs(120);
        let lease = coord.try_acquire_lease("l", "node-a", ttl).await.unwrap().unwrap();
        assert!(coord.try_acquire_lease("l", "node-b", ttl).await.unwrap().is_none());

        clock.advance(Duration::from_secs(121));
        let stolen = coord.try_acquire_lease("l", "node-b", ttl).await.unwrap().unwrap();
        assert!(stolen.fencing_token > lease.fencing_token);
        assert!(!coord.release_lease("l", "node-a").await.unwrap());
    }

    #[tokio::test]
    async fn holder_extends_and_releases() {
        let (clock, coord) = setup();
        let ttl = Duration::from_secs(100);
        let first = coord.try_acquire_lease("l", "a", ttl).await.unwrap().unwrap();
        assert!(!first.needs_renewal(clock.now()));

        clock.advance(Duration::from_secs(60));
        assert!(first.needs_renewal(clock.now()));
        let renewed = coord.try_acquire_lease("l", "a", ttl).await.unwrap().unwrap();
        assert_eq!(renewed.fencing_token, first.fencing_token);
        assert!(renewed.expires_at > first.expires_at);

        assert!(coord.release_lease("l", "a").await.unwrap());
        assert!(coord.try_acquire_lease("l", "b", ttl).await.unwrap().is_some());
    }
}
