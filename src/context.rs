// Copyright 2023 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Execution contexts.
//!
//! This module defines the traits through which the NDP state machine
//! reaches the outside world for time, timers and randomness. The embedder
//! implements them once for its event loop; tests implement them with fake
//! versions that allow time to be driven manually.

use core::time::Duration;

use rand::{CryptoRng, RngCore};

use crate::Instant;

/// Trait defining the `Instant` type provided by an [`InstantContext`]
/// implementation.
///
/// It is a separate trait from `InstantContext` so the type stands by
/// itself to be stored at rest in core structures.
pub trait InstantBindingsTypes {
    /// The type of an instant in time.
    ///
    /// All time is measured using `Instant`s, including scheduling timers
    /// through [`TimerContext`]. This type may represent some sort of
    /// real-world time (e.g., [`std::time::Instant`]), or may be faked in
    /// testing using a fake clock.
    type Instant: Instant + 'static;
}

/// A context that provides access to a monotonic clock.
pub trait InstantContext: InstantBindingsTypes {
    /// Returns the current instant.
    ///
    /// `now` guarantees that two subsequent calls to `now` will return
    /// monotonically non-decreasing values.
    fn now(&self) -> Self::Instant;
}

/// A context that supports scheduling timers.
///
/// A scheduled timer is this crate's "job": a cancellable one-shot whose
/// body runs under the endpoint lock. Cancelling a timer under the lock
/// guarantees its body will not run afterwards; rescheduling a pending
/// timer replaces its deadline.
pub trait TimerContext<Id>: InstantContext {
    /// Schedule a timer to fire after some duration.
    ///
    /// `schedule_timer` schedules the given timer to be fired after
    /// `duration` has elapsed, overwriting any previous timer with the same
    /// ID.
    ///
    /// If there was previously a timer with that ID, return the time at
    /// which it was scheduled to fire.
    ///
    /// # Panics
    ///
    /// `schedule_timer` may panic if `duration` is large enough that
    /// `self.now() + duration` overflows.
    fn schedule_timer(&mut self, duration: Duration, id: Id) -> Option<Self::Instant> {
        self.schedule_timer_instant(self.now().checked_add(duration).unwrap(), id)
    }

    /// Schedule a timer to fire at some point in the future.
    ///
    /// `schedule_timer_instant` schedules the given timer to be fired at
    /// `time`, overwriting any previous timer with the same ID.
    ///
    /// If there was previously a timer with that ID, return the time at
    /// which it was scheduled to fire.
    fn schedule_timer_instant(&mut self, time: Self::Instant, id: Id) -> Option<Self::Instant>;

    /// Cancel a timer.
    ///
    /// If a timer with the given ID exists, it is canceled and the instant
    /// at which it was scheduled to fire is returned.
    fn cancel_timer(&mut self, id: Id) -> Option<Self::Instant>;

    /// Cancel all timers which satisfy a predicate.
    ///
    /// `cancel_timers_with` calls `f` on each scheduled timer, and cancels
    /// any timer for which `f` returns true.
    fn cancel_timers_with<F: FnMut(&Id) -> bool>(&mut self, f: F);

    /// Get the instant a timer will fire, if one is scheduled.
    ///
    /// Returns the [`Instant`] a timer with ID `id` will be invoked. If no
    /// timer with the given ID exists, `scheduled_instant` will return
    /// `None`.
    fn scheduled_instant(&self, id: Id) -> Option<Self::Instant>;
}

/// A context that provides a random number generator (RNG).
///
/// Code in this crate is required to only obtain random values through an
/// `RngContext`. This allows a deterministic RNG to be provided when useful
/// (for example, in tests). The CSPRNG requirement exists so that random
/// values produced within the stack are not predictable by outside
/// observers.
pub trait RngContext {
    /// The random number generator (RNG) provided by this `RngContext`.
    type Rng<'a>: RngCore + CryptoRng
    where
        Self: 'a;

    /// Gets the random number generator (RNG).
    fn rng(&mut self) -> Self::Rng<'_>;
}
