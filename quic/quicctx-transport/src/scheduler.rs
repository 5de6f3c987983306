// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Orders connections by the time they next need to be serviced.
//!
//! Entries are keyed by `(wake time, connection id)`. Connection ids are
//! allocated monotonically, so connections sharing a wake time are returned
//! in creation order.

use crate::connection::InternalConnectionId;
use alloc::collections::{BTreeMap, BTreeSet};
use core::time::Duration;
use quicctx_core::time::Timestamp;

#[derive(Debug, Default)]
pub struct Scheduler {
    by_time: BTreeSet<(Timestamp, InternalConnectionId)>,
    wake_times: BTreeMap<InternalConnectionId, Timestamp>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `connection` at `time`, replacing any previous entry
    pub fn reinsert(&mut self, connection: InternalConnectionId, time: Timestamp) {
        if let Some(previous) = self.wake_times.insert(connection, time) {
            self.by_time.remove(&(previous, connection));
        }
        self.by_time.insert((time, connection));
    }

    /// Removes `connection` from the schedule, returning its wake time
    pub fn remove(&mut self, connection: InternalConnectionId) -> Option<Timestamp> {
        let time = self.wake_times.remove(&connection)?;
        self.by_time.remove(&(time, connection));
        Some(time)
    }

    /// Returns the connection that wakes first.
    ///
    /// If `max_time` is set, `None` is returned when that connection wakes
    /// after it.
    pub fn earliest(&self, max_time: Option<Timestamp>) -> Option<InternalConnectionId> {
        let (time, connection) = self.by_time.first()?;
        match max_time {
            Some(max_time) if *time > max_time => None,
            _ => Some(*connection),
        }
    }

    /// Returns the first wake time of all scheduled connections
    #[inline]
    pub fn earliest_time(&self) -> Option<Timestamp> {
        self.by_time.first().map(|(time, _)| *time)
    }

    #[inline]
    pub fn wake_time(&self, connection: InternalConnectionId) -> Option<Timestamp> {
        self.wake_times.get(&connection).copied()
    }

    /// Iterates over scheduled connections in wake order
    pub fn iter(&self) -> impl Iterator<Item = (Timestamp, InternalConnectionId)> + '_ {
        self.by_time.iter().copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.wake_times.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.wake_times.is_empty()
    }
}

/// Returns how long the event loop may wait before `target`, bounded by `cap`.
///
/// A `target` of [`Timestamp::MAX`] never wakes, and a `target` in the past
/// wakes immediately.
pub fn next_wake_delay(now: Timestamp, target: Timestamp, cap: Duration) -> Duration {
    if target.is_never() {
        return cap;
    }
    target.saturating_duration_since(now).min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(value: u64) -> InternalConnectionId {
        InternalConnectionId::from(value)
    }

    fn at(micros: u64) -> Timestamp {
        Timestamp::from_micros(micros)
    }

    #[test]
    fn reinsert_replaces_test() {
        let mut scheduler = Scheduler::new();
        scheduler.reinsert(id(1), at(100));
        scheduler.reinsert(id(2), at(50));
        assert_eq!(scheduler.earliest(None), Some(id(2)));

        scheduler.reinsert(id(2), at(150));
        assert_eq!(scheduler.earliest(None), Some(id(1)));
        assert_eq!(scheduler.len(), 2);
        assert_eq!(scheduler.wake_time(id(2)), Some(at(150)));

        assert_eq!(scheduler.remove(id(1)), Some(at(100)));
        assert_eq!(scheduler.remove(id(1)), None);
        assert_eq!(scheduler.earliest(None), Some(id(2)));
    }

    #[test]
    fn earliest_bound_test() {
        let mut scheduler = Scheduler::new();
        assert_eq!(scheduler.earliest(None), None);

        scheduler.reinsert(id(3), at(1_000));
        assert_eq!(scheduler.earliest(Some(at(999))), None);
        assert_eq!(scheduler.earliest(Some(at(1_000))), Some(id(3)));
    }

    #[test]
    fn ties_follow_creation_order_test() {
        let mut scheduler = Scheduler::new();
        scheduler.reinsert(id(9), at(10));
        scheduler.reinsert(id(4), at(10));
        scheduler.reinsert(id(7), at(10));
        let order: Vec<_> = scheduler.iter().map(|(_, id)| id).collect();
        assert_eq!(order, [id(4), id(7), id(9)]);
    }

    #[test]
    fn earlier_reinsert_never_delays_test() {
        bolero::check!()
            .with_type::<Vec<(u8, u32)>>()
            .for_each(|ops| {
                let mut scheduler = Scheduler::new();
                for (connection, time) in ops {
                    let connection = id(*connection as u64);
                    let time = at(*time as u64);
                    let before = scheduler.earliest_time();
                    let current = scheduler.wake_time(connection);
                    scheduler.reinsert(connection, time);

                    if current.map_or(true, |current| time <= current) {
                        if let Some(before) = before {
                            assert!(scheduler.earliest_time().unwrap() <= before);
                        }
                    }
                }
            });
    }

    #[test]
    fn delay_is_bounded_test() {
        bolero::check!()
            .with_type::<(u64, u64, u32)>()
            .cloned()
            .for_each(|(now, target, cap)| {
                let cap = Duration::from_micros(cap as u64);
                let delay = next_wake_delay(at(now), at(target), cap);
                assert!(delay <= cap);
            });
    }

    #[test]
    fn delay_test() {
        let cap = Duration::from_secs(10);
        assert_eq!(next_wake_delay(at(5), Timestamp::MAX, cap), cap);
        assert_eq!(next_wake_delay(at(5), at(3), cap), Duration::ZERO);
        assert_eq!(next_wake_delay(at(5), at(5), cap), Duration::ZERO);
        assert_eq!(
            next_wake_delay(at(5), at(1_005), cap),
            Duration::from_micros(1_000)
        );
        assert_eq!(next_wake_delay(Timestamp::ZERO, at(u64::MAX - 1), cap), cap);
    }
}
