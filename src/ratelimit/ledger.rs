//! Self-trimming ledger of admitted call timestamps.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{RwLock, RwLockUpgradableReadGuard};

use super::window::TimeWindow;

/// Append-only list of timestamps guarded by one reader/writer lock.
///
/// Entries older than the longest window are dropped on every read and
/// write, so the ledger never holds anything older than 24 hours.
#[derive(Debug, Default)]
pub struct TimestampLedger {
    entries: RwLock<VecDeque<DateTime<Utc>>>,
}

/// Counts per trailing window at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowCounts {
    pub minute: usize,
    pub hour: usize,
    pub day: usize,
}

impl WindowCounts {
    pub fn get(&self, window: TimeWindow) -> usize {
        match window {
            TimeWindow::Minute => self.minute,
            TimeWindow::Hour => self.hour,
            TimeWindow::Day => self.day,
        }
    }
}

impl TimestampLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `at` to the ledger.
    pub fn push(&self, at: DateTime<Utc>) {
        let mut entries = self.entries.write();
        trim(&mut entries, at);
        push_ordered(&mut entries, at);
    }

    /// Count entries inside each trailing window ending at `now`.
    pub fn counts(&self, now: DateTime<Utc>) -> WindowCounts {
        let entries = self.trimmed_read(now);
        counts_in(&entries, now)
    }

    /// Check every window against its cap and, when all are under, append
    /// `now`. Runs entirely under the exclusive lock.
    ///
    /// On refusal returns the first breached window and its retry delay.
    pub fn try_push(
        &self,
        now: DateTime<Utc>,
        cap_for: impl Fn(TimeWindow) -> usize,
    ) -> Result<WindowCounts, (TimeWindow, Duration)> {
        let mut entries = self.entries.write();
        trim(&mut entries, now);
        check_caps(&entries, now, &cap_for)?;
        push_ordered(&mut entries, now);
        Ok(counts_in(&entries, now))
    }

    /// Check every window against its cap without appending.
    pub fn check(
        &self,
        now: DateTime<Utc>,
        cap_for: impl Fn(TimeWindow) -> usize,
    ) -> Result<WindowCounts, (TimeWindow, Duration)> {
        let entries = self.trimmed_read(now);
        check_caps(&entries, now, &cap_for)?;
        Ok(counts_in(&entries, now))
    }

    /// Entries still inside the longest window ending at `now`.
    pub fn len(&self, now: DateTime<Utc>) -> usize {
        self.trimmed_read(now).len()
    }

    pub fn is_empty(&self, now: DateTime<Utc>) -> bool {
        self.trimmed_read(now).is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Take a read guard, upgrading only when stale entries need dropping.
    fn trimmed_read(
        &self,
        now: DateTime<Utc>,
    ) -> parking_lot::RwLockReadGuard<'_, VecDeque<DateTime<Utc>>> {
        let guard = self.entries.upgradable_read();
        let cutoff = now - TimeWindow::longest().span();
        if guard.front().map_or(true, |oldest| *oldest > cutoff) {
            return RwLockUpgradableReadGuard::downgrade(guard);
        }

        let mut entries = RwLockUpgradableReadGuard::upgrade(guard);
        trim(&mut entries, now);
        parking_lot::RwLockWriteGuard::downgrade(entries)
    }
}

fn trim(entries: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>) {
    let cutoff = now - TimeWindow::longest().span();
    while entries.front().map_or(false, |oldest| *oldest <= cutoff) {
        entries.pop_front();
    }
}

/// Keep the deque sorted even if the wall clock stepped backwards.
fn push_ordered(entries: &mut VecDeque<DateTime<Utc>>, at: DateTime<Utc>) {
    match entries.back() {
        Some(last) if *last > at => {
            let index = entries.partition_point(|t| *t <= at);
            entries.insert(index, at);
        }
        _ => entries.push_back(at),
    }
}

/// Entries strictly after `now - window`, oldest first.
fn in_window(
    entries: &VecDeque<DateTime<Utc>>,
    now: DateTime<Utc>,
    window: TimeWindow,
) -> impl Iterator<Item = &DateTime<Utc>> {
    let start = now - window.span();
    entries.iter().filter(move |t| **t > start && **t <= now)
}

fn counts_in(entries: &VecDeque<DateTime<Utc>>, now: DateTime<Utc>) -> WindowCounts {
    WindowCounts {
        minute: in_window(entries, now, TimeWindow::Minute).count(),
        hour: in_window(entries, now, TimeWindow::Hour).count(),
        day: in_window(entries, now, TimeWindow::Day).count(),
    }
}

fn check_caps(
    entries: &VecDeque<DateTime<Utc>>,
    now: DateTime<Utc>,
    cap_for: &impl Fn(TimeWindow) -> usize,
) -> Result<(), (TimeWindow, Duration)> {
    for window in TimeWindow::ALL {
        let mut inside = in_window(entries, now, window);
        let oldest = inside.next().copied();
        let count = oldest.map_or(0, |_| 1 + inside.count());

        if count >= cap_for(window) {
            let retry_after = oldest
                .map(|oldest| (oldest + window.span() - now).to_std().unwrap_or(Duration::ZERO))
                .unwrap_or(Duration::ZERO);
            return Err((window, retry_after));
        }
    }
    Ok(())
}
