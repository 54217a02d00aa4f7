//! Waiting on groups of events.
//!
//! A group wait is coordinated through a transient wait record shared between the waiting
//! thread and every event it registered with. Signalling threads reach the record through the
//! registrations parked in each event's queue; the record's own lock serializes their updates
//! against the waiter, and whichever party drops the last reference to the record (the waiter
//! on conclusion, or a signaler pruning a stale registration) frees it.
//!
//! Lock ordering is one-directional: a waiter takes its record lock first and each event lock
//! only for the brief check-or-register step, while signalers take an event lock first and
//! then visit record locks one at a time, never holding two records at once.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::{Event, EventInner};

/// An entry in an event's registration queue: one group waiter's record, plus the index this
/// event occupies in that waiter's slice.
pub(crate) struct RegisteredWait {
    record: Arc<WaitRecord>,
    index: usize,
}

/// The shared coordination record for one group-wait call.
pub(crate) struct WaitRecord {
    cond: Condvar,
    state: Mutex<RecordState>,
}

impl WaitRecord {
    /// Wake the waiting thread. Called by signalers after the relevant locks are released.
    pub(crate) fn notify(&self) {
        self.cond.notify_one();
    }
}

struct RecordState {
    status: WaitStatus,
    /// Cleared once the waiting thread has concluded (satisfied or timed out) and no longer
    /// cares about incoming signals. Signalers finding it cleared treat the registration as
    /// stale and discard it without consuming anything.
    still_waiting: bool,
}

/// What the waiter is waiting for, and how far along it is.
enum WaitStatus {
    /// Waiting for any one event; holds the index of the first event observed signalled.
    Any { fired: Option<usize> },
    /// Waiting for every event; counts the events not yet observed signalled.
    All { events_left: usize },
}

impl RecordState {
    /// Credit a signal from the event at `index` to this waiter. The record lock is held.
    fn note_signaled(&mut self, index: usize) {
        match &mut self.status {
            WaitStatus::All { events_left } => {
                debug_assert!(*events_left > 0);
                *events_left -= 1;
                // `still_waiting` stays set even on the final decrement: once the count
                // reaches zero no signaler reads the flag again, only the waiter does.
            }
            WaitStatus::Any { fired } => {
                *fired = Some(index);
                self.still_waiting = false;
            }
        }
    }

    fn satisfied(&self) -> bool {
        match &self.status {
            WaitStatus::All { events_left } => *events_left == 0,
            WaitStatus::Any { fired } => fired.is_some(),
        }
    }

    fn fired_index(&self) -> Option<usize> {
        match &self.status {
            WaitStatus::Any { fired } => *fired,
            WaitStatus::All { .. } => None,
        }
    }
}

/// Hand the signal of a freshly set auto-reset event to the oldest live group waiter, if there
/// is one. The event lock is held. On success the event state is consumed, the claimed
/// registration is removed, and the returned record must be notified once the event lock has
/// been released. Stale registrations encountered along the way are discarded, dropping their
/// references to the records they point at.
pub(crate) fn claim_auto_signal(inner: &mut EventInner) -> Option<Arc<WaitRecord>> {
    while let Some(registration) = inner.registered_waits.pop_front() {
        let mut waiter = registration.record.state.lock();
        if !waiter.still_waiting {
            // The waiter already left (timed out, or another event fired first).
            continue;
        }

        inner.state = false;
        waiter.note_signaled(registration.index);
        drop(waiter);
        return Some(registration.record);
    }

    None
}

/// Credit a freshly set manual-reset event to every live group waiter registered with it and
/// wake each of them; the registration queue is emptied wholesale. The event lock is held.
pub(crate) fn notify_registered(inner: &mut EventInner) {
    for registration in inner.registered_waits.drain(..) {
        let mut waiter = registration.record.state.lock();
        if waiter.still_waiting {
            waiter.note_signaled(registration.index);
            drop(waiter);
            registration.record.notify();
        }
    }
}

#[derive(Debug, Eq, PartialEq)]
enum Outcome {
    /// The wait concluded before the deadline; an any-wait carries the fired index.
    Satisfied(Option<usize>),
    TimedOut,
}

/// The group-wait engine behind [`wait_any`] and [`wait_all`].
///
/// Four steps, with the record lock held from start to finish: build the record; visit each
/// event once under that event's lock, immediately consuming it if it is already signalled and
/// otherwise publishing a registration; sleep on the record's condition variable until the
/// wait is satisfied or the deadline passes; finalize, leaving whatever registrations remain
/// for future signalers to prune.
fn wait_multiple(events: &[&Event], wait_all: bool, limit: Option<Duration>) -> Outcome {
    let record = Arc::new(WaitRecord {
        cond: Condvar::new(),
        state: Mutex::new(RecordState {
            status: if wait_all {
                WaitStatus::All {
                    events_left: events.len(),
                }
            } else {
                WaitStatus::Any { fired: None }
            },
            still_waiting: true,
        }),
    });
    let mut state = record.state.lock();

    let mut done = false;
    for (index, event) in events.iter().enumerate() {
        let mut inner = event.inner.lock();

        // The event lock must span the check and the registration, or a concurrent `set`
        // could fire between the two and the signal would be lost.
        if event.consume_if_signaled(&mut inner) {
            drop(inner);
            match &mut state.status {
                WaitStatus::All { events_left } => {
                    debug_assert!(*events_left > 0);
                    *events_left -= 1;
                }
                WaitStatus::Any { fired } => {
                    *fired = Some(index);
                    done = true;
                }
            }
            if done {
                break;
            }
        } else {
            inner.registered_waits.push_back(RegisteredWait {
                record: Arc::clone(&record),
                index,
            });
        }
    }

    let mut deadline = None;
    let mut timed_out = false;
    if !done {
        if limit == Some(Duration::ZERO) {
            timed_out = true;
            done = true;
        } else {
            deadline = limit.map(|limit| Instant::now() + limit);
        }
    }

    while !done {
        done = state.satisfied();

        if !done {
            match deadline {
                Some(deadline) => {
                    if record.cond.wait_until(&mut state, deadline).timed_out() {
                        timed_out = true;
                        break;
                    }
                }
                None => record.cond.wait(&mut state),
            }
        }
    }

    let fired = state.fired_index();
    state.still_waiting = false;
    drop(state);

    // The waiter's reference goes away here. Registrations still sitting in event queues each
    // hold their own, so the record outlives us until the last of them is pruned.
    drop(record);

    if timed_out {
        Outcome::TimedOut
    } else {
        Outcome::Satisfied(fired)
    }
}

/// Block until at least one event in `events` becomes signalled, returning the index of the
/// event that fired. An auto-reset event that fires is consumed on behalf of this waiter and
/// this waiter alone; a manual-reset event is left signalled for others.
///
/// If more than one event is already signalled when the wait begins, the lowest index wins and
/// the others are left untouched. Waiting on an empty slice never completes; use
/// [`wait_any_for`] to bound the wait.
pub fn wait_any(events: &[&Event]) -> usize {
    match wait_multiple(events, false, None) {
        Outcome::Satisfied(Some(index)) => index,
        // An unbounded any-wait can only conclude by observing a fired event.
        _ => unreachable!("unbounded any-wait concluded without a fired event"),
    }
}

/// [`wait_any`], bounded: returns `Some(index)` if an event fired within `limit`, or `None` if
/// the deadline passed first. A zero `limit` inspects (and, for auto-reset events, consumes)
/// at most one signalled event and never sleeps.
pub fn wait_any_for(events: &[&Event], limit: Duration) -> Option<usize> {
    match wait_multiple(events, false, Some(limit)) {
        Outcome::Satisfied(fired) => {
            debug_assert!(fired.is_some());
            fired
        }
        Outcome::TimedOut => None,
    }
}

/// Block until every event in `events` has been observed signalled at least once over the
/// course of the call; the events need not all be signalled simultaneously. Each auto-reset
/// event in the group is consumed exactly once on behalf of this waiter; manual-reset events
/// are left signalled.
pub fn wait_all(events: &[&Event]) {
    let outcome = wait_multiple(events, true, None);
    debug_assert_eq!(outcome, Outcome::Satisfied(None));
}

/// [`wait_all`], bounded: returns `true` once every event has fired, or `false` if the
/// deadline passed first. Auto-reset events that were already consumed by the time the wait
/// gave up stay consumed; their signals are not restored on timeout.
pub fn wait_all_for(events: &[&Event], limit: Duration) -> bool {
    matches!(wait_multiple(events, true, Some(limit)), Outcome::Satisfied(_))
}
