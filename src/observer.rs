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

//! Read-only hooks into the kernel's event/process/resource lifecycle.
//!
//! Implement a subset of [`Observer`]'s methods (all default to a no-op) and
//! register it with [`crate::env::Environment::register_observer`]. A hook
//! that panics is caught and logged, never propagated into the step loop:
//! observability code must never be able to break the simulation it watches.

use std::panic::{self, AssertUnwindSafe};

use log::warn;

use crate::env::Environment;
use crate::event::Event;
use crate::process::Process;
use crate::resource::Resource;

/// Observer hooks into the kernel. Every method defaults to doing nothing;
/// implement only the ones you need.
pub trait Observer {
    fn on_event_scheduled(&self, _env: &Environment, _event: &Event) {}
    fn on_event_succeeded(&self, _env: &Environment, _event: &Event) {}
    fn on_event_failed(&self, _env: &Environment, _event: &Event) {}
    fn on_process_started(&self, _env: &Environment, _process: &Process) {}
    fn on_process_yielded(&self, _env: &Environment, _process: &Process) {}
    fn on_process_completed(&self, _env: &Environment, _process: &Process) {}
    fn on_process_interrupted(&self, _env: &Environment, _process: &Process) {}
    fn on_resource_requested(&self, _env: &Environment, _resource: &Resource) {}
    fn on_resource_acquired(&self, _env: &Environment, _resource: &Resource) {}
    fn on_resource_released(&self, _env: &Environment, _resource: &Resource) {}
    fn on_step(&self, _env: &Environment, _time: f64) {}
}

/// Invoke `f` against `observer`, catching and logging a panic rather than
/// letting it unwind into the step loop.
pub(crate) fn dispatch<F: FnOnce()>(f: F) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        warn!("observer hook panicked; ignoring");
    }
}
