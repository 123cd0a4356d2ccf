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

//! `Event`, the unit of scheduling and observation.
//!
//! An `Event` is a cheap `Rc`-backed handle; cloning it yields another
//! reference to the same underlying state, never a copy of it. Events move
//! `Pending -> Triggered -> Processed` and never backwards.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};

use log::trace;

use crate::condition::ConditionEvent;
use crate::env::{EnvInner, Environment};
use crate::error::SimError;
use crate::queue::Priority;

/// A type-erased event value. Rust has no single value type that could
/// stand in for every success/failure payload an event might carry while
/// still letting heterogeneous events compose under [`Event::and`]/
/// [`Event::or`], so outcomes are carried as `Rc<dyn Any>` and downcast on
/// read.
pub type Value = Rc<dyn Any>;

/// Handle returned by [`Event::on_trigger`], usable with
/// [`Event::remove_callback`] to actually unregister a callback (unlike the
/// identity-based removal in the system this kernel is modeled on, which
/// never matches anything — see DESIGN.md).
pub type CallbackId = u64;

pub(crate) type Callback = Box<dyn FnOnce(&Event)>;

#[derive(Clone)]
enum State {
    Pending,
    Triggered { ok: bool, value: Value },
    Processed { ok: bool, value: Value },
}

pub(crate) struct EventInner {
    pub(crate) env: Weak<std::cell::RefCell<EnvInner>>,
    state: State,
    callbacks: Vec<(CallbackId, Callback)>,
    next_callback_id: CallbackId,
    pub(crate) scheduled: bool,
    defused: bool,
    cancelled: bool,
    cancel_hook: Option<Box<dyn FnOnce()>>,
}

/// The unit of scheduling and observation. See the module documentation.
#[derive(Clone)]
pub struct Event {
    pub(crate) inner: Rc<std::cell::RefCell<EventInner>>,
}

impl Event {
    /// Construct a fresh `Pending`, unscheduled event bound to `env`.
    pub fn new(env: &Environment) -> Event {
        Event {
            inner: Rc::new(std::cell::RefCell::new(EventInner {
                env: Rc::downgrade(&env.inner),
                state: State::Pending,
                callbacks: Vec::new(),
                next_callback_id: 0,
                scheduled: false,
                defused: false,
                cancelled: false,
                cancel_hook: None,
            })),
        }
    }

    pub(crate) fn env(&self) -> Environment {
        let weak = self.inner.borrow().env.clone();
        Environment {
            inner: weak
                .upgrade()
                .expect("environment dropped while one of its events is still alive"),
        }
    }

    /// Succeed this event with `value`. Requires `Pending`.
    pub fn succeed<T: Any>(&self, value: T) -> Result<(), SimError> {
        self.trigger_with(true, Rc::new(value))
    }

    /// Succeed this event with the unit value `()`.
    pub fn succeed_unit(&self) -> Result<(), SimError> {
        self.succeed(())
    }

    /// Fail this event with `value`. Requires `Pending`.
    pub fn fail<T: Any>(&self, value: T) -> Result<(), SimError> {
        self.trigger_with(false, Rc::new(value))
    }

    pub(crate) fn fail_value(&self, value: Value) -> Result<(), SimError> {
        self.trigger_with(false, value)
    }

    /// Succeed this event with an already type-erased `value`, bypassing the
    /// extra `Rc::new` that `succeed` applies. Used by the process executor
    /// to hand a coroutine's return value straight through.
    pub(crate) fn succeed_value(&self, value: Value) -> Result<(), SimError> {
        self.trigger_with(true, value)
    }

    /// Set this event's outcome to `Triggered` without scheduling it, so the
    /// caller can schedule it itself at a delay other than zero. Used by
    /// [`crate::timeout::Timeout`] and by `Environment::run`'s sentinel.
    pub(crate) fn preset_outcome(&self, ok: bool, value: Value) -> Result<(), SimError> {
        let mut inner = self.inner.borrow_mut();
        if !matches!(inner.state, State::Pending) {
            return Err(SimError::AlreadyTriggered);
        }
        inner.state = State::Triggered { ok, value };
        Ok(())
    }

    /// Copy `(ok, value)` from `source`, which must already be triggered,
    /// and schedule self. Used by condition propagation and process
    /// resumption.
    pub fn trigger(&self, source: &Event) -> Result<(), SimError> {
        let (ok, value) = {
            let src = source.inner.borrow();
            match &src.state {
                State::Pending => return Err(SimError::NotYetTriggered),
                State::Triggered { ok, value } | State::Processed { ok, value } => {
                    (*ok, value.clone())
                }
            }
        };
        self.trigger_with(ok, value)
    }

    fn trigger_with(&self, ok: bool, value: Value) -> Result<(), SimError> {
        {
            let mut inner = self.inner.borrow_mut();
            if !matches!(inner.state, State::Pending) {
                return Err(SimError::AlreadyTriggered);
            }
            inner.state = State::Triggered { ok, value };
        }
        self.schedule_self();
        Ok(())
    }

    fn schedule_self(&self) {
        if self.inner.borrow().scheduled {
            return;
        }
        let env = self.env();
        env.schedule(self.clone(), Priority::Normal, 0.0)
            .expect("delay 0.0 is never negative");
    }

    /// Build an `all` condition over `self` and `other`.
    pub fn and(&self, other: &Event) -> Result<ConditionEvent, SimError> {
        ConditionEvent::all(&self.env(), vec![self.clone(), other.clone()])
    }

    /// Build an `any` condition over `self` and `other`.
    pub fn or(&self, other: &Event) -> Result<ConditionEvent, SimError> {
        ConditionEvent::any(&self.env(), vec![self.clone(), other.clone()])
    }

    /// `true` once the event has left `Pending` (it may or may not have
    /// been fanned yet).
    pub fn triggered(&self) -> bool {
        !matches!(self.inner.borrow().state, State::Pending)
    }

    /// `true` once the event has been fanned and its callback list
    /// released.
    pub fn processed(&self) -> bool {
        matches!(self.inner.borrow().state, State::Processed { .. })
    }

    /// The success/failure outcome. Errors with [`SimError::NotYetTriggered`]
    /// while `Pending`.
    pub fn ok(&self) -> Result<bool, SimError> {
        match &self.inner.borrow().state {
            State::Pending => Err(SimError::NotYetTriggered),
            State::Triggered { ok, .. } | State::Processed { ok, .. } => Ok(*ok),
        }
    }

    /// The outcome value. Errors with [`SimError::NotYetTriggered`] while
    /// `Pending`.
    pub fn value(&self) -> Result<Value, SimError> {
        match &self.inner.borrow().state {
            State::Pending => Err(SimError::NotYetTriggered),
            State::Triggered { value, .. } | State::Processed { value, .. } => Ok(value.clone()),
        }
    }

    /// [`Event::value`], downcast to `T`. Returns `None` on a value-type
    /// mismatch rather than erroring, since a mismatch is always a caller
    /// bug best caught with `unwrap`/`expect` at the call site.
    pub fn value_as<T: 'static>(&self) -> Result<Option<Rc<T>>, SimError> {
        Ok(self.value()?.downcast::<T>().ok())
    }

    /// Whether a failed, processed event's error has been suppressed.
    pub fn defused(&self) -> bool {
        self.inner.borrow().defused
    }

    /// Suppress (or re-arm) re-raising this event's failure from `step`.
    pub fn set_defused(&self, defused: bool) {
        self.inner.borrow_mut().defused = defused;
    }

    /// Register a callback to run when this event is fanned. Returns a
    /// token that can be passed to [`Event::remove_callback`]. Registering
    /// on an already-`Processed` event is a no-op callback that will never
    /// run; callers should check [`Event::processed`] first, exactly as
    /// [`Event::poll`](Future::poll) and [`ConditionEvent`] construction do.
    pub fn on_trigger<F: FnOnce(&Event) + 'static>(&self, cb: F) -> CallbackId {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_callback_id;
        inner.next_callback_id += 1;
        inner.callbacks.push((id, Box::new(cb)));
        id
    }

    /// Unregister a callback previously returned by [`Event::on_trigger`].
    /// A no-op if the callback already ran or was already removed.
    pub fn remove_callback(&self, id: CallbackId) {
        let mut inner = self.inner.borrow_mut();
        inner.callbacks.retain(|(cid, _)| *cid != id);
    }

    /// Register the withdrawal action `cancel()` runs, e.g. removing this
    /// event from whatever external queue (a `Resource`'s `get_queue`) still
    /// holds a reference to it beyond the Environment's own priority queue.
    /// Overwrites any hook set earlier.
    pub(crate) fn set_cancel_hook<F: FnOnce() + 'static>(&self, hook: F) {
        self.inner.borrow_mut().cancel_hook = Some(Box::new(hook));
    }

    /// Withdraw this event: it will never be fanned, whether or not it is
    /// still sitting in the Environment's queue or some other structure that
    /// was told about it at construction time (see [`Event::set_cancel_hook`]).
    /// A no-op if already cancelled; errors with [`SimError::AlreadyTriggered`]
    /// if the event has already been processed (too late to withdraw).
    pub fn cancel(&self) -> Result<(), SimError> {
        if self.processed() {
            return Err(SimError::AlreadyTriggered);
        }
        let hook = {
            let mut inner = self.inner.borrow_mut();
            if inner.cancelled {
                return Ok(());
            }
            inner.cancelled = true;
            inner.callbacks.clear();
            inner.cancel_hook.take()
        };
        if let Some(hook) = hook {
            hook();
        }
        Ok(())
    }

    /// `true` once [`Event::cancel`] has been called on this event.
    pub fn is_cancelled(&self) -> bool {
        self.inner.borrow().cancelled
    }

    pub(crate) fn is_scheduled(&self) -> bool {
        self.inner.borrow().scheduled
    }

    pub(crate) fn clear_scheduled(&self) {
        self.inner.borrow_mut().scheduled = false;
    }

    pub(crate) fn mark_scheduled(&self) {
        self.inner.borrow_mut().scheduled = true;
    }

    /// Replace the value of an already-`Triggered` (but not yet
    /// `Processed`) success outcome. Used only by [`ConditionEvent`]'s
    /// value-builder callback to swap its placeholder for the real
    /// [`crate::condition::ConditionValue`] once every subscriber that ran
    /// before it has had a chance to observe the outcome was decided.
    pub(crate) fn overwrite_triggered_value(&self, value: Value) {
        let mut inner = self.inner.borrow_mut();
        if let State::Triggered { ok, .. } = inner.state {
            inner.state = State::Triggered { ok, value };
        }
    }

    /// Fan every registered callback, in registration order, then release
    /// the callback list (transition to `Processed`). Returns the
    /// unhandled-failure error if this event failed and was not defused by
    /// the time fanning completed.
    pub(crate) fn fan(&self) -> Result<(), SimError> {
        let callbacks = {
            let mut inner = self.inner.borrow_mut();
            if matches!(inner.state, State::Processed { .. }) || inner.cancelled {
                return Ok(());
            }
            std::mem::take(&mut inner.callbacks)
        };
        trace!("fanning {} callback(s)", callbacks.len());
        for (_, cb) in callbacks {
            cb(self);
        }
        let mut inner = self.inner.borrow_mut();
        let (ok, value) = match &inner.state {
            State::Triggered { ok, value } | State::Processed { ok, value } => (*ok, value.clone()),
            State::Pending => unreachable!("fanning a pending event"),
        };
        let defused = inner.defused;
        inner.state = State::Processed {
            ok,
            value: value.clone(),
        };
        inner.scheduled = false;
        drop(inner);
        if !ok && !defused {
            Err(SimError::Unhandled(value))
        } else {
            Ok(())
        }
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}
impl Eq for Event {}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match &self.inner.borrow().state {
            State::Pending => "Pending",
            State::Triggered { ok: true, .. } => "Triggered(ok)",
            State::Triggered { ok: false, .. } => "Triggered(err)",
            State::Processed { ok: true, .. } => "Processed(ok)",
            State::Processed { ok: false, .. } => "Processed(err)",
        };
        f.debug_struct("Event").field("state", &label).finish()
    }
}

/// Awaiting an `Event` suspends the calling `Process` exactly at the
/// `.await` point (see `crate::process`), resuming synchronously once the
/// event is fanned.
impl Future for Event {
    type Output = Result<Value, SimError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let ready = {
            let inner = self.inner.borrow();
            match &inner.state {
                State::Pending => None,
                State::Triggered { ok, value } | State::Processed { ok, value } => {
                    Some((*ok, value.clone()))
                }
            }
        };
        if let Some((ok, value)) = ready {
            // A process observes its awaited event's outcome through the
            // `Result` it gets back here, the same way it would observe a
            // success. That is what "handling" a failure means for a
            // coroutine, so polling to `Ready` always defuses: `step`/`fan`
            // only re-raises a failure nobody was watching at all.
            if !ok {
                self.set_defused(true);
            }
            return Poll::Ready(if ok {
                Ok(value)
            } else {
                Err(SimError::Unhandled(value))
            });
        }
        let waker = cx.waker().clone();
        self.on_trigger(move |_ev| waker.wake_by_ref());
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Environment;

    #[test]
    fn succeed_then_succeed_fails() {
        let env = Environment::new();
        let e = Event::new(&env);
        assert!(e.succeed_unit().is_ok());
        assert!(matches!(e.succeed_unit(), Err(SimError::AlreadyTriggered)));
    }

    #[test]
    fn value_before_trigger_errors() {
        let env = Environment::new();
        let e = Event::new(&env);
        assert!(matches!(e.value(), Err(SimError::NotYetTriggered)));
    }

    #[test]
    fn callback_fan_order_and_release() {
        let env = Environment::new();
        let e = Event::new(&env);
        e.succeed_unit().unwrap();
        let order = Rc::new(std::cell::RefCell::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            e.on_trigger(move |_| order.borrow_mut().push(i));
        }
        e.fan().unwrap();
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
        assert!(e.processed());
    }

    #[test]
    fn defuse_suppresses_reraise() {
        let env = Environment::new();
        let e = Event::new(&env);
        e.fail(42i32).unwrap();
        e.on_trigger(|ev| ev.set_defused(true));
        assert!(e.fan().is_ok());
    }

    #[test]
    fn undefused_failure_reraises() {
        let env = Environment::new();
        let e = Event::new(&env);
        e.fail(42i32).unwrap();
        assert!(matches!(e.fan(), Err(SimError::Unhandled(_))));
    }

    #[test]
    fn cancel_before_fan_is_silently_skipped() {
        let env = Environment::new();
        let e = Event::new(&env);
        e.succeed_unit().unwrap();
        e.cancel().unwrap();
        assert!(e.fan().is_ok());
        assert!(!e.processed());
    }

    #[test]
    fn cancel_after_processed_errors() {
        let env = Environment::new();
        let e = Event::new(&env);
        e.succeed_unit().unwrap();
        e.fan().unwrap();
        assert!(matches!(e.cancel(), Err(SimError::AlreadyTriggered)));
    }

    #[test]
    fn cancel_runs_its_withdrawal_hook_once() {
        let env = Environment::new();
        let e = Event::new(&env);
        let runs = Rc::new(std::cell::Cell::new(0));
        let runs2 = runs.clone();
        e.set_cancel_hook(move || runs2.set(runs2.get() + 1));
        e.cancel().unwrap();
        e.cancel().unwrap();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn remove_callback_actually_removes() {
        let env = Environment::new();
        let e = Event::new(&env);
        let called = Rc::new(std::cell::RefCell::new(false));
        let c = called.clone();
        let id = e.on_trigger(move |_| *c.borrow_mut() = true);
        e.remove_callback(id);
        e.succeed_unit().unwrap();
        e.fan().unwrap();
        assert!(!*called.borrow());
    }
}
