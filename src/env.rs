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

//! `Environment`, the clock and event queue that drives a simulation.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use log::trace;

use crate::event::Event;
use crate::observer::{self, Observer};
use crate::process::{Process, ProcessContext};
use crate::queue::{Priority, PriorityQueue, QueueItem};
use crate::error::SimError;

pub(crate) struct EnvInner {
    now: f64,
    queue: PriorityQueue,
    seq: u64,
    active: Option<Event>,
    observers: Vec<Rc<dyn Observer>>,
}

/// The clock, the event queue and (indirectly, through `Rc`) every `Event`,
/// `Process` and `Resource` built against it. Cheap to clone: cloning an
/// `Environment` yields another handle onto the same simulation.
#[derive(Clone)]
pub struct Environment {
    pub(crate) inner: Rc<RefCell<EnvInner>>,
}

/// What `Environment::run_until` stops at.
pub enum Until {
    /// Stop once the clock would pass this time (a sentinel `Event` is
    /// scheduled at `time` for the purpose).
    Time(f64),
    /// Stop once this `Event` has been processed.
    Event(Event),
}

impl Environment {
    /// A fresh environment with the clock at `0.0`.
    pub fn new() -> Environment {
        Environment::with_initial_time(0.0)
    }

    /// A fresh environment with the clock starting at `time`.
    pub fn with_initial_time(time: f64) -> Environment {
        Environment {
            inner: Rc::new(RefCell::new(EnvInner {
                now: time,
                queue: PriorityQueue::new(),
                seq: 0,
                active: None,
                observers: Vec::new(),
            })),
        }
    }

    /// The current simulated time.
    pub fn now(&self) -> f64 {
        self.inner.borrow().now
    }

    /// The event currently being processed by the active `Process`, if any.
    /// `None` outside of a process's own execution (e.g. while the caller is
    /// driving `step`/`run` directly).
    pub fn active_process(&self) -> Option<Event> {
        self.inner.borrow().active.clone()
    }

    pub(crate) fn set_active(&self, event: Option<Event>) -> Option<Event> {
        std::mem::replace(&mut self.inner.borrow_mut().active, event)
    }

    /// Register an observer. Hooks fire in registration order; a panicking
    /// hook is caught and logged (see `crate::observer`).
    pub fn register_observer(&self, observer: Rc<dyn Observer>) {
        self.inner.borrow_mut().observers.push(observer);
    }

    pub(crate) fn notify<F: Fn(&dyn Observer)>(&self, f: F) {
        let observers = self.inner.borrow().observers.clone();
        for obs in observers {
            let obs = obs.as_ref();
            observer::dispatch(|| f(obs));
        }
    }

    /// Schedule `event` to fire `delay` time units from now, breaking ties
    /// at the same `(time, priority)` in FIFO insertion order. A no-op if
    /// `event` is already scheduled (an event is never enqueued twice).
    pub fn schedule(&self, event: Event, priority: Priority, delay: f64) -> Result<(), SimError> {
        if delay < 0.0 {
            return Err(SimError::NegativeDelay);
        }
        if event.is_scheduled() {
            return Ok(());
        }
        let (time, seq) = {
            let mut inner = self.inner.borrow_mut();
            let seq = inner.seq;
            inner.seq += 1;
            (inner.now + delay, seq)
        };
        event.mark_scheduled();
        self.inner.borrow_mut().queue.push(QueueItem {
            time,
            priority,
            seq,
            event: event.clone(),
        });
        self.notify(|o| o.on_event_scheduled(self, &event));
        Ok(())
    }

    /// The time of the next scheduled item, or `f64::INFINITY` if the queue
    /// is empty.
    pub fn peek(&self) -> f64 {
        self.inner.borrow().queue.peek_time()
    }

    /// Pop the earliest-scheduled item, advance the clock to its time, and
    /// fan it. Errors with [`SimError::EmptyQueue`] if nothing is left to
    /// run; propagates the item's own failure if it was processed unhandled.
    ///
    /// An item whose Event was already processed (see `fan`'s own
    /// already-`Processed` guard) or [`Event::cancel`]led is discarded
    /// without advancing the clock or fanning it — it is a stale queue
    /// entry from before the Event was superseded or withdrawn, not a real
    /// tick, so it shouldn't cost the caller a step.
    pub fn step(&self) -> Result<(), SimError> {
        loop {
            let item = self
                .inner
                .borrow_mut()
                .queue
                .pop()
                .ok_or(SimError::EmptyQueue)?;
            if item.event.processed() || item.event.is_cancelled() {
                trace!("discarding a stale queue entry (processed or cancelled)");
                item.event.clear_scheduled();
                continue;
            }
            self.inner.borrow_mut().now = item.time;
            self.notify(|o| o.on_step(self, item.time));
            let result = item.event.fan();
            let ok = item.event.ok().unwrap_or(false);
            if ok {
                self.notify(|o| o.on_event_succeeded(self, &item.event));
            } else {
                self.notify(|o| o.on_event_failed(self, &item.event));
            }
            return result;
        }
    }

    /// Run until the queue is empty.
    pub fn run(&self) -> Result<(), SimError> {
        self.run_inner(None)
    }

    /// Run until `until` is reached: either a point in time, or a specific
    /// `Event` being processed. Returns normally in either case; a queue
    /// emptying out before `until` is reached also returns normally.
    pub fn run_until(&self, until: Until) -> Result<(), SimError> {
        self.run_inner(Some(until))
    }

    fn run_inner(&self, until: Option<Until>) -> Result<(), SimError> {
        let stopped = Rc::new(Cell::new(false));
        let sentinel = match until {
            Some(Until::Time(t)) => {
                let e = Event::new(self);
                e.preset_outcome(true, Rc::new(()))?;
                let delay = (t - self.now()).max(0.0);
                self.schedule(e.clone(), Priority::Normal, delay)?;
                Some(e)
            }
            Some(Until::Event(e)) => Some(e),
            None => None,
        };
        if let Some(e) = &sentinel {
            if e.processed() {
                stopped.set(true);
            } else {
                let stopped = stopped.clone();
                e.on_trigger(move |_| stopped.set(true));
            }
        }
        loop {
            if stopped.get() {
                return Ok(());
            }
            match self.step() {
                Ok(()) => {}
                // A cancelled event can leave only stale entries behind;
                // `step` discards those internally and only reports
                // `EmptyQueue` once nothing real is left to run. That is
                // this loop's normal termination, not a failure.
                Err(SimError::EmptyQueue) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    /// Spawn a process from an async factory. The coroutine's bootstrap
    /// `Initialize` event is scheduled `Urgent` at the current time, so it
    /// runs before any other event already due at `now`.
    pub fn process<F, Fut>(&self, factory: F) -> Process
    where
        F: FnOnce(ProcessContext) -> Fut,
        Fut: std::future::Future<Output = Result<crate::event::Value, SimError>> + 'static,
    {
        Process::spawn(self, "anonymous", factory)
    }

    /// Like [`Environment::process`], but gives the process a name
    /// recoverable later via [`Process::name`] (Rust closures carry no
    /// runtime-inspectable name, unlike the coroutines this kernel is
    /// modeled on).
    pub fn named_process<F, Fut>(&self, name: &str, factory: F) -> Process
    where
        F: FnOnce(ProcessContext) -> Fut,
        Fut: std::future::Future<Output = Result<crate::event::Value, SimError>> + 'static,
    {
        Process::spawn(self, name, factory)
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_advances_clock_and_fans() {
        let env = Environment::new();
        let e = Event::new(&env);
        env.schedule(e.clone(), Priority::Normal, 5.0).unwrap();
        assert_eq!(env.now(), 0.0);
        env.step().unwrap();
        assert_eq!(env.now(), 5.0);
        assert!(e.processed());
    }

    #[test]
    fn step_on_empty_queue_errors() {
        let env = Environment::new();
        assert!(matches!(env.step(), Err(SimError::EmptyQueue)));
    }

    #[test]
    fn negative_delay_rejected() {
        let env = Environment::new();
        let e = Event::new(&env);
        assert!(matches!(
            env.schedule(e, Priority::Normal, -1.0),
            Err(SimError::NegativeDelay)
        ));
    }

    #[test]
    fn run_until_time_stops_without_running_later_events() {
        let env = Environment::new();
        let early = Event::new(&env);
        let late = Event::new(&env);
        env.schedule(early.clone(), Priority::Normal, 1.0).unwrap();
        env.schedule(late.clone(), Priority::Normal, 10.0).unwrap();
        env.run_until(Until::Time(5.0)).unwrap();
        assert!(early.processed());
        assert!(!late.processed());
        assert_eq!(env.now(), 5.0);
    }

    #[test]
    fn cancelled_event_is_discarded_without_advancing_the_clock() {
        let env = Environment::new();
        let e = Event::new(&env);
        env.schedule(e.clone(), Priority::Normal, 100.0).unwrap();
        e.cancel().unwrap();
        env.run().unwrap();
        assert_eq!(env.now(), 0.0);
    }

    #[test]
    fn run_drains_the_whole_queue() {
        let env = Environment::new();
        let a = Event::new(&env);
        let b = Event::new(&env);
        env.schedule(a.clone(), Priority::Normal, 1.0).unwrap();
        env.schedule(b.clone(), Priority::Normal, 2.0).unwrap();
        env.run().unwrap();
        assert!(a.processed());
        assert!(b.processed());
    }
}
