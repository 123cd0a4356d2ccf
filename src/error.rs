/* Copyright © 2018 Gianmarco Garrisi

This program is free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation, either version 3 of the License, or
(at your option) any later version.

This program is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with this program.  If not, see <http://www.gnu.org/licenses/>. */

//! The error kinds surfaced by the kernel.
//!
//! Failures in the event graph (a failed `Event` processed while not
//! defused) and failures in kernel operations (bad arguments, empty queue,
//! the `run(until)` stop sentinel) both end up as a [`SimError`], but they
//! propagate differently: event-graph failures flow through callbacks and
//! the `defused` flag, while kernel-operation failures are returned directly
//! from the API that detected them.

use std::fmt;
use std::rc::Rc;

use crate::event::Value;

/// Any value an `Event` can fail with, type-erased the same way a success
/// value is.
pub type Cause = Value;

/// The kernel's error type.
///
/// `Unhandled` carries the value of an `Event` that was processed as a
/// failure while `defused == false`; this is the case that spec.md calls
/// "re-raise its error" out of `step`/`run`.
#[derive(Clone, thiserror::Error)]
pub enum SimError {
    /// `step` was called with no scheduled items.
    #[error("no events remain in the queue")]
    EmptyQueue,
    /// A process was interrupted while alive; carries the interrupt cause.
    #[error("process interrupted")]
    Interrupted(Cause),
    /// The sentinel installed by `run(until)` fired; caught by `run` itself.
    #[error("simulation stop sentinel reached")]
    StopSimulation,
    /// A condition event was built over events from more than one
    /// `Environment`.
    #[error("condition event mixes events from different environments")]
    MixedEnvironment,
    /// A coroutine awaited something other than an `Event`. Rust's type
    /// system makes this unreachable through the public API (only `Event`
    /// implements `Future` here), but the variant is kept for parity with
    /// spec.md's error taxonomy and as a landing spot if a future version
    /// accepts arbitrary awaitables.
    #[error("process awaited a value that was not an Event")]
    InvalidYield(Cause),
    /// `succeed`/`fail`/`trigger` called on a non-`Pending` event.
    #[error("event was already triggered")]
    AlreadyTriggered,
    /// A `delay` argument was negative.
    #[error("scheduling delay must be non-negative")]
    NegativeDelay,
    /// A resource `amount` argument was not a positive integer, or a
    /// resource's `0 <= users <= capacity` invariant would be violated.
    #[error("resource capacity or amount invalid")]
    CapacityViolation,
    /// An `Event` was processed as a failure while not defused; carries the
    /// value it failed with. Also used to surface a process's own failure
    /// (including an unwrapped `Interrupted`) when nobody is subscribed.
    #[error("unhandled event failure")]
    Unhandled(Cause),
    /// `ok()`/`value()` called on an `Event` that is still `Pending`. A Rust
    /// accessor-ergonomics addition; spec.md's taxonomy assumes a dynamic
    /// language where reading an unset property raises at the call site.
    #[error("event has not yet triggered")]
    NotYetTriggered,
}

impl fmt::Debug for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::EmptyQueue => write!(f, "EmptyQueue"),
            SimError::Interrupted(_) => write!(f, "Interrupted(..)"),
            SimError::StopSimulation => write!(f, "StopSimulation"),
            SimError::MixedEnvironment => write!(f, "MixedEnvironment"),
            SimError::InvalidYield(_) => write!(f, "InvalidYield(..)"),
            SimError::AlreadyTriggered => write!(f, "AlreadyTriggered"),
            SimError::NegativeDelay => write!(f, "NegativeDelay"),
            SimError::CapacityViolation => write!(f, "CapacityViolation"),
            SimError::Unhandled(_) => write!(f, "Unhandled(..)"),
            SimError::NotYetTriggered => write!(f, "NotYetTriggered"),
        }
    }
}

impl SimError {
    /// Wrap an arbitrary value as an `Unhandled` failure cause.
    pub fn unhandled<T: 'static>(value: T) -> SimError {
        SimError::Unhandled(Rc::new(value))
    }

    /// Wrap an arbitrary interrupt cause.
    pub fn interrupted<T: 'static>(cause: T) -> SimError {
        SimError::Interrupted(Rc::new(cause))
    }

    /// The `Cause`/`Value` payload carried by this error, if any.
    pub fn cause(&self) -> Option<&Cause> {
        match self {
            SimError::Interrupted(c) | SimError::Unhandled(c) | SimError::InvalidYield(c) => Some(c),
            _ => None,
        }
    }
}
