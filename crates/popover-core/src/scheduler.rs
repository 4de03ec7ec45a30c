use std::time::{Duration, Instant};
use tracing::debug;

/// Which transition a pending timer will perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Open,
    Close,
}

#[derive(Debug)]
struct Timer<T> {
    kind: TimerKind,
    due: Instant,
    action: T,
}

/// Owns the single outstanding open/close timer of a trigger.
///
/// Arming a new timer always drops the previous one, so a stale open can
/// never fire after a close was requested (or the other way around). Timers
/// never fire inside a schedule call: the host polls [`take_due`] from its
/// event loop, using [`next_deadline`] to know when to wake up.
///
/// [`take_due`]: DelayScheduler::take_due
/// [`next_deadline`]: DelayScheduler::next_deadline
#[derive(Debug)]
pub struct DelayScheduler<T> {
    pending: Option<Timer<T>>,
}

impl<T> Default for DelayScheduler<T> {
    fn default() -> Self {
        Self { pending: None }
    }
}

impl<T> DelayScheduler<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule_open(&mut self, now: Instant, delay: Duration, action: T) {
        self.arm(TimerKind::Open, now, delay, action);
    }

    pub fn schedule_close(&mut self, now: Instant, delay: Duration, action: T) {
        self.arm(TimerKind::Close, now, delay, action);
    }

    fn arm(&mut self, kind: TimerKind, now: Instant, delay: Duration, action: T) {
        if let Some(stale) = self.pending.take() {
            debug!(kind = ?stale.kind, "superseding pending timer");
        }
        self.pending = Some(Timer {
            kind,
            due: now + delay,
            action,
        });
    }

    /// Drop the pending timer, if any. Returns whether one was armed.
    pub fn cancel_pending(&mut self) -> bool {
        self.pending.take().is_some()
    }

    /// Drop the pending timer only when it is a close.
    pub fn cancel_pending_close(&mut self) -> bool {
        if self.pending_kind() == Some(TimerKind::Close) {
            self.pending = None;
            true
        } else {
            false
        }
    }

    pub fn pending_kind(&self) -> Option<TimerKind> {
        self.pending.as_ref().map(|t| t.kind)
    }

    pub fn pending_action(&self) -> Option<&T> {
        self.pending.as_ref().map(|t| &t.action)
    }

    pub fn pending_action_mut(&mut self) -> Option<&mut T> {
        self.pending.as_mut().map(|t| &mut t.action)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|t| t.due)
    }

    /// Disarm and return the pending action if its deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> Option<(TimerKind, T)> {
        if self.pending.as_ref()?.due > now {
            return None;
        }
        let timer = self.pending.take()?;
        Some((timer.kind, timer.action))
    }
}
