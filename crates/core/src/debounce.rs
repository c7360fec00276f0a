//! Time-based primitives sitting between raw input events and state writes.
//!
//! Both are driven by explicit timestamps so callers choose the clock.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

/// Trailing-edge debounce configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebouncePolicy {
    pub delay: Duration,
}

impl Default for DebouncePolicy {
    fn default() -> Self {
        Self {
            delay: Duration::milliseconds(1_000),
        }
    }
}

impl DebouncePolicy {
    #[must_use]
    pub fn from_millis(millis: i64) -> Self {
        Self {
            delay: Duration::milliseconds(millis.max(0)),
        }
    }
}

/// Collapses bursts of writes per key, releasing the latest value once the key
/// has been quiet for the policy delay.
#[derive(Debug, Clone)]
pub struct Debouncer<K, V> {
    policy: DebouncePolicy,
    pending: BTreeMap<K, (V, DateTime<Utc>)>,
}

impl<K: Ord + Clone, V> Debouncer<K, V> {
    #[must_use]
    pub fn new(policy: DebouncePolicy) -> Self {
        Self {
            policy,
            pending: BTreeMap::new(),
        }
    }

    /// Record a value, replacing any pending one for the key and restarting its timer.
    pub fn push(&mut self, key: K, value: V, now: DateTime<Utc>) {
        self.pending.insert(key, (value, now));
    }

    /// Like `push`, but folds `value` into a pending one with `merge`.
    pub fn push_merge(
        &mut self,
        key: K,
        value: V,
        now: DateTime<Utc>,
        merge: impl FnOnce(&mut V, V),
    ) {
        match self.pending.get_mut(&key) {
            Some((pending, at)) => {
                merge(pending, value);
                *at = now;
            }
            None => {
                self.pending.insert(key, (value, now));
            }
        }
    }

    /// Values whose key has been quiet long enough.
    pub fn flush_due(&mut self, now: DateTime<Utc>) -> Vec<(K, V)> {
        let due: Vec<K> = self
            .pending
            .iter()
            .filter(|(_, (_, at))| now - *at >= self.policy.delay)
            .map(|(key, _)| key.clone())
            .collect();
        due.into_iter()
            .filter_map(|key| self.pending.remove(&key).map(|(value, _)| (key, value)))
            .collect()
    }

    /// Release everything immediately, e.g. before a commit.
    pub fn flush_all(&mut self) -> Vec<(K, V)> {
        std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(key, (value, _))| (key, value))
            .collect()
    }

    /// Drop pending values without releasing them.
    pub fn cancel_all(&mut self) {
        self.pending.clear();
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.pending
            .values()
            .map(|(_, at)| *at + self.policy.delay)
            .min()
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }
}

/// A value that reverts to "unset" after a fixed lifetime, e.g. a "copied" badge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expiring<T> {
    slot: Option<(T, DateTime<Utc>)>,
}

impl<T> Default for Expiring<T> {
    fn default() -> Self {
        Self { slot: None }
    }
}

impl<T> Expiring<T> {
    pub fn set(&mut self, value: T, now: DateTime<Utc>, ttl: Duration) {
        self.slot = Some((value, now + ttl));
    }

    #[must_use]
    pub fn get(&self, now: DateTime<Utc>) -> Option<&T> {
        match &self.slot {
            Some((value, expires_at)) if now < *expires_at => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.get(now).is_some()
    }

    pub fn clear(&mut self) {
        self.slot = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn only_the_last_value_of_a_burst_is_released() {
        let mut debouncer = Debouncer::new(DebouncePolicy::default());
        let t0 = fixed_now();
        debouncer.push("question", "W", t0);
        debouncer.push("question", "Wh", t0 + Duration::milliseconds(300));
        debouncer.push("question", "Wha", t0 + Duration::milliseconds(600));

        assert!(debouncer.flush_due(t0 + Duration::milliseconds(1_200)).is_empty());
        assert_eq!(
            debouncer.next_deadline(),
            Some(t0 + Duration::milliseconds(1_600))
        );
        let released = debouncer.flush_due(t0 + Duration::milliseconds(1_600));
        assert_eq!(released, vec![("question", "Wha")]);
        assert!(debouncer.is_idle());
    }

    #[test]
    fn keys_are_debounced_independently() {
        let mut debouncer = Debouncer::new(DebouncePolicy::from_millis(100));
        let t0 = fixed_now();
        debouncer.push(1, "a", t0);
        debouncer.push(2, "b", t0 + Duration::milliseconds(80));
        let released = debouncer.flush_due(t0 + Duration::milliseconds(120));
        assert_eq!(released, vec![(1, "a")]);
        assert_eq!(debouncer.flush_all(), vec![(2, "b")]);
    }

    #[test]
    fn merged_pushes_accumulate_and_restart_the_timer() {
        let mut debouncer = Debouncer::new(DebouncePolicy::from_millis(100));
        let t0 = fixed_now();
        debouncer.push_merge("card", vec![1], t0, |pending, new| pending.extend(new));
        debouncer.push_merge("card", vec![2], t0 + Duration::milliseconds(90), |pending, new| {
            pending.extend(new);
        });
        assert!(debouncer.flush_due(t0 + Duration::milliseconds(150)).is_empty());
        assert_eq!(
            debouncer.flush_due(t0 + Duration::milliseconds(190)),
            vec![("card", vec![1, 2])]
        );
    }

    #[test]
    fn expiring_value_reverts() {
        let mut copied = Expiring::default();
        let t0 = fixed_now();
        copied.set(true, t0, Duration::seconds(2));
        assert!(copied.is_active(t0 + Duration::milliseconds(1_999)));
        assert!(!copied.is_active(t0 + Duration::seconds(2)));
    }
}
