//! `multievents` is an implementation of WIN32's auto- and manual-reset events for the rust
//! world, together with `WaitForMultipleObjects`-style waiting on entire groups of events.
//! Events are synchronization primitives used to either create other synchronization
//! primitives with or for implementing signalling between threads.
//!
//! Events come in two different flavors: [`AutoResetEvent`] and [`ManualResetEvent`]. Both are
//! thin wrappers around [`Event`], which pairs an event's signalled state with a `parking_lot`
//! mutex and condition variable so that threads waiting on an event are efficiently suspended
//! until it becomes signalled. Timed waits measure their deadline against the monotonic clock
//! and are not disturbed by wall-clock adjustments.
//!
//! An event is functionally the equivalent of an (optionally gated) waitable boolean. Unlike
//! mutexes and condition variables, which are most often used to restrict access to a critical
//! section, events are more appropriate for efficiently signalling remote threads or waiting
//! on a remote thread to change state.
//!
//! With the `multiwait` feature (enabled by default), any mix of auto- and manual-reset events
//! can additionally be waited on as a group: [`wait_any`] resumes as soon as one event in the
//! group fires and reports which one it was, while [`wait_all`] resumes once every event in
//! the group has fired. Group waits consume auto-reset events under the same single-waiter
//! guarantee as ordinary waits, no matter how many threads are waiting on how many overlapping
//! groups.

use parking_lot::{Condvar, Mutex, MutexGuard};
#[cfg(feature = "multiwait")]
use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[cfg(feature = "multiwait")]
mod multi;
#[cfg(feature = "multiwait")]
pub use multi::{wait_all, wait_all_for, wait_any, wait_any_for};


/// A representation of the state of an event, which can either be `Set` (i.e. signalled,
/// ready) or `Unset` (i.e. not ready).
#[derive(Clone, Debug, PartialEq)]
pub enum EventState {
    /// The event is available and call(s) to [`Awaitable::wait()`] will go through without
    /// blocking, i.e. the event is signalled.
    Set,
    /// The event is unavailable and calls to [`Awaitable::wait()`] will block until the event
    /// becomes set, i.e. the event is unsignalled.
    Unset,
}

pub trait Awaitable {
    /// Check if the event has been signalled, and if not, block waiting for it to be set.
    fn wait(&self);

    /// Check if the event has been signalled, and if not, block for `limit` waiting for it to
    /// be set. Returns `true` if the event was originally set or if it was signalled within
    /// the specified duration, and `false` otherwise (if the timeout elapsed without the event
    /// becoming set).
    fn wait_for(&self, limit: Duration) -> bool;

    /// Test if an event is available without waiting, returning `false` immediately if it is
    /// not set. The event's state is inspected (and, for auto-reset events, consumed) under
    /// its lock, but the calling thread never goes to sleep on the condition variable.
    fn wait0(&self) -> bool;
}

/// The tagged event core underlying both [`AutoResetEvent`] and [`ManualResetEvent`].
///
/// Whether an event resets automatically is a property of the event rather than of any
/// individual wait, so the two public event types share this one core and differ only in the
/// reset discipline it was constructed with. Group waits ([`wait_any`]/[`wait_all`]) operate
/// on `&Event` slices so that both flavors can be mixed freely in a single call; use
/// [`AsRef<Event>`] to reach the core of a wrapped event.
pub struct Event {
    /// `true` for auto-reset events, fixed at construction.
    auto_reset: bool,
    /// Wakeup channel for threads blocked in a single-event wait.
    cond: Condvar,
    inner: Mutex<EventInner>,
}

struct EventInner {
    /// `true` while the event is signalled. Only read or written with the lock held.
    state: bool,
    /// Group waiters registered with this event, oldest first. Entries are pushed by a group
    /// wait while it holds this lock and drained by [`Event::set`].
    #[cfg(feature = "multiwait")]
    registered_waits: VecDeque<multi::RegisteredWait>,
}

impl Event {
    /// Create a new event with the given reset discipline and initial state.
    ///
    /// Events are cheap and const-constructible; they can be declared as `static`s and shared
    /// without an `Arc` where their lifetime allows.
    pub const fn new(manual_reset: bool, state: EventState) -> Event {
        Event {
            auto_reset: !manual_reset,
            cond: Condvar::new(),
            inner: Mutex::new(EventInner {
                state: matches!(state, EventState::Set),
                #[cfg(feature = "multiwait")]
                registered_waits: VecDeque::new(),
            }),
        }
    }

    /// Put the event in a signalled state, waking waiters per the event's reset discipline.
    ///
    /// A manual-reset event releases every waiter, whether blocked in a single-event wait or
    /// in a group wait, and stays signalled afterwards. An auto-reset event hands the signal
    /// to exactly one party: the oldest live group registration if there is one, otherwise
    /// one thread blocked in a single-event wait, otherwise the next thread to wait.
    pub fn set(&self) {
        let mut inner = self.inner.lock();
        inner.state = true;

        if self.auto_reset {
            #[cfg(feature = "multiwait")]
            {
                // Group waiters are served first: the oldest registration still backed by a
                // live waiter consumes the signal. Stale registrations found along the way
                // are pruned as a side effect.
                if let Some(record) = multi::claim_auto_signal(&mut inner) {
                    drop(inner);
                    record.notify();
                    return;
                }
            }

            // No group waiter claimed the signal; wake exactly one single-event waiter.
            drop(inner);
            self.cond.notify_one();
        } else {
            #[cfg(feature = "multiwait")]
            multi::notify_registered(&mut inner);

            drop(inner);
            self.cond.notify_all();
        }
    }

    /// Set the state of the event to [`EventState::Unset`], regardless of its current status.
    ///
    /// Waiters already released by an earlier [`set`](Event::set) are unaffected, as are group
    /// registrations parked on this event.
    pub fn reset(&self) {
        self.inner.lock().state = false;
    }

    /// Zero-timeout state check, consuming the signal of an auto-reset event. The event lock
    /// must be held.
    fn consume_if_signaled(&self, inner: &mut EventInner) -> bool {
        if !inner.state {
            return false;
        }
        if self.auto_reset {
            // Obtaining an available auto-reset event locks everyone else out.
            inner.state = false;
        }
        true
    }

    /// The wait loop shared by every single-event wait; `inner` is the already-acquired event
    /// lock. `None` waits forever and a zero `limit` never sleeps.
    fn unlocked_wait(&self, inner: &mut MutexGuard<'_, EventInner>, limit: Option<Duration>) -> bool {
        if self.consume_if_signaled(inner) {
            return true;
        }

        if limit == Some(Duration::ZERO) {
            return false;
        }
        let deadline = limit.map(|limit| Instant::now() + limit);

        loop {
            match deadline {
                Some(deadline) => {
                    if self.cond.wait_until(inner, deadline).timed_out() {
                        return false;
                    }
                }
                None => self.cond.wait(inner),
            }

            // A wakeup only counts once the state has actually been published; anything else
            // is spurious and puts us back to sleep.
            if self.consume_if_signaled(inner) {
                return true;
            }
        }
    }
}

impl Awaitable for Event {
    /// Block until the event becomes signalled, consuming the signal if the event is
    /// auto-reset.
    fn wait(&self) {
        let mut inner = self.inner.lock();
        self.unlocked_wait(&mut inner, None);
    }

    /// Block for up to `limit` waiting for the event to become signalled, consuming the
    /// signal on success if the event is auto-reset.
    fn wait_for(&self, limit: Duration) -> bool {
        let mut inner = self.inner.lock();
        self.unlocked_wait(&mut inner, Some(limit))
    }

    /// Test the event without sleeping, consuming the signal if the event is auto-reset and
    /// currently set.
    fn wait0(&self) -> bool {
        let mut inner = self.inner.lock();
        self.consume_if_signaled(&mut inner)
    }
}

/// An `AutoResetEvent` is a gated event that is functionally equivalent to a "waitable
/// boolean" and can be atomically waited upon and consumed to signal one and only one waiter
/// at a time, thereby guaranteeing exclusive access to a critical section.
///
/// While an `AutoResetEvent` can be used to implement mutexes and condition variables, it is
/// more appropriate for uses involving signalling between two or more threads. Unlike a
/// [`ManualResetEvent`], an `AutoResetEvent`'s `set` state is selectively made visible to only
/// one waiter at a time, including past waiters currently suspended on the event and group
/// waiters that registered with it through [`wait_any`] or [`wait_all`]. When
/// [`AutoResetEvent::set()`] is called, at most one blocked waiter is let through; if no one
/// was waiting, only the next thread to wait on this instance proceeds without blocking, and
/// the event is unset again for everyone else.
///
/// Auto-reset events are thread-safe and may be wrapped in an [`Arc`](std::sync::Arc) or
/// declared as `static`s to easily share across threads.
pub struct AutoResetEvent {
    event: Event,
}

impl AutoResetEvent {
    /// Create a new [`AutoResetEvent`] that can be used to atomically signal one waiter at a
    /// time.
    pub const fn new(state: EventState) -> AutoResetEvent {
        Self {
            event: Event::new(false, state),
        }
    }

    /// Trigger the event, either releasing one suspended waiter or allowing one future caller
    /// to exclusively obtain the event. Group waiters registered with the event are served
    /// before threads blocked in a single-event wait.
    pub fn set(&self) {
        self.event.set()
    }

    /// Set the state of the internal event to [`EventState::Unset`], regardless of its
    /// current status.
    pub fn reset(&self) {
        self.event.reset()
    }
}

impl Awaitable for AutoResetEvent {
    /// Check if the event has been signalled, and if not, block waiting for it to be set.
    /// When the event becomes available, its state is atomically set to
    /// [`EventState::Unset`], allowing only one waiter through.
    fn wait(&self) {
        self.event.wait()
    }

    /// Check if the event has been signalled, and if not, block for `limit` waiting for it to
    /// be set. If and when the event becomes available, its state is atomically set to
    /// [`EventState::Unset`], allowing only one waiter through.
    ///
    /// Returns `true` if the event was originally set or if it was signalled within the
    /// specified duration, and `false` otherwise (if the timeout elapsed without the event
    /// becoming set).
    fn wait_for(&self, limit: Duration) -> bool {
        self.event.wait_for(limit)
    }

    /// Test if the event is available without sleeping, returning `false` immediately if it
    /// is not set. **This is _not_ a `peek()` function:** if the event's state was
    /// [`EventState::Set`], it is atomically reset to [`EventState::Unset`].
    fn wait0(&self) -> bool {
        self.event.wait0()
    }
}

impl AsRef<Event> for AutoResetEvent {
    fn as_ref(&self) -> &Event {
        &self.event
    }
}

/// A `ManualResetEvent` is an event type best understood as a "waitable boolean" that
/// efficiently synchronizes thread access to a shared state, allowing one or more threads to
/// wait for a signal from one or more other threads, where the signal could have either
/// occurred in the past or could come at any time in the future.
///
/// Unlike an [`AutoResetEvent`], which allows one and only one waiter through each time it is
/// set, a `ManualResetEvent` releases all past waiters and allows all future waiters calling
/// [`Awaitable::wait()`] to continue without blocking (until [`ManualResetEvent::reset()`] is
/// called). It shines when it comes to persistent state indicators, such as a globally shared
/// abort flag, and is the natural member of a [`wait_any`] group used to interrupt a wait.
///
/// Manual-reset events are thread-safe and may be wrapped in an [`Arc`](std::sync::Arc) or
/// declared as `static`s to easily share across threads.
pub struct ManualResetEvent {
    event: Event,
}

impl ManualResetEvent {
    /// Create a new [`ManualResetEvent`].
    pub const fn new(state: EventState) -> ManualResetEvent {
        Self {
            event: Event::new(true, state),
        }
    }

    /// Put the event into a set state, releasing all suspended waiters (including registered
    /// group waiters) and leaving the event set for future callers.
    pub fn set(&self) {
        self.event.set()
    }

    /// Set the state of the internal event to [`EventState::Unset`], regardless of its
    /// current status.
    pub fn reset(&self) {
        self.event.reset()
    }
}

impl Awaitable for ManualResetEvent {
    /// Check if the underlying event is in a set state or wait for its state to become
    /// [`EventState::Set`]. The event's state is not affected by this operation, i.e. it
    /// remains set for future callers even after this function call returns.
    fn wait(&self) {
        self.event.wait()
    }

    /// Check if the underlying event is in a set state (and return immediately) or wait for
    /// it to become set, up to the limit specified by the `Duration` parameter.
    ///
    /// Returns `true` if the event was initially set or if it became set within the time
    /// limit specified. Otherwise returns `false` if the timeout elapsed without the event
    /// becoming available.
    fn wait_for(&self, limit: Duration) -> bool {
        self.event.wait_for(limit)
    }

    /// Test if the event is available without sleeping, returning `false` immediately if it
    /// is not set. The event's state is left untouched either way.
    fn wait0(&self) -> bool {
        self.event.wait0()
    }
}

impl AsRef<Event> for ManualResetEvent {
    fn as_ref(&self) -> &Event {
        &self.event
    }
}
