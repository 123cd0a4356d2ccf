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

//! A single-threaded discrete event simulation kernel inspired by the SimPy
//! library for Python.
//!
//! # Environment
//! An [`Environment`] owns the simulation clock and the priority queue of
//! scheduled [`Event`]s. It is stepped one event at a time with
//! [`Environment::step`], or run to completion (or to a time/event limit)
//! with [`Environment::run`]/[`Environment::run_until`].
//!
//! # Event
//! An `Event` moves through three states: pending, triggered and processed.
//! It is the unit both of scheduling (it sits in the queue with a time and
//! priority) and of observation (callbacks registered with
//! [`Event::on_trigger`] run when it is processed). [`Event::and`]/
//! [`Event::or`] build composite events over a set of children.
//!
//! # Process
//! A [`Process`] is a coroutine: an `async` Rust function driven by a
//! private executor built into this crate rather than Tokio or any other
//! general-purpose runtime, since a process only ever suspends at one kind
//! of await point ([`ProcessContext::wait`]) and resumes synchronously
//! within the same queue tick as the event it was waiting on. This stands
//! in for the nightly `#![feature(generators)]` coroutines this kernel's
//! design is otherwise closely modeled on; see DESIGN.md.
//!
//! # Resource
//! A [`Resource`] is a counting semaphore of a fixed capacity, shared among
//! processes with FIFO-fair queuing on both the acquire (`get`/`request`)
//! and release (`put`/`release`) side.
//!
//! # Errors and logging
//! Every fallible operation returns a [`SimError`]; nothing in this crate
//! panics on a caller mistake it can detect in advance. The crate emits
//! `log` records at `trace` level for event fanning and process
//! resumption/completion and at `warn` level when an [`Observer`] hook
//! panics; wire up whatever `log` backend your binary prefers (`env_logger`
//! is a reasonable default, as in the demos under `demos/`).

mod condition;
mod env;
mod error;
mod event;
mod observer;
mod process;
mod queue;
mod resource;
mod timeout;

pub mod prelude;

pub use condition::{ConditionEvent, ConditionValue};
pub use env::{Environment, Until};
pub use error::{Cause, SimError};
pub use event::{CallbackId, Event, Value};
pub use observer::Observer;
pub use process::{Process, ProcessContext};
pub use queue::Priority;
pub use resource::{GetResource, PutResource, Resource};
pub use timeout::Timeout;
