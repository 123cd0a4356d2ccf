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

//! `Process`: a coroutine driven by a private single-process executor.
//!
//! The teacher this crate is grounded on drives its coroutines with
//! `#![feature(generators)]`, a nightly-only language feature. spec.md's own
//! design notes point at the stable alternative: an `async` state machine
//! driven by a custom executor. A `Process` wraps a boxed, pinned
//! `Future<Output = Result<Value, SimError>>`; [`ProcessContext::wait`] is
//! the only way to suspend it, so suspension only ever happens at an
//! `Event`/`ConditionEvent` boundary, exactly as the generator-based
//! original only ever suspended at a `yield`.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::ops::Deref;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use log::trace;

use crate::env::Environment;
use crate::error::SimError;
use crate::event::{Event, Value};

type BoxedFuture = Pin<Box<dyn Future<Output = Result<Value, SimError>>>>;

/// Passed into a process's async factory closure; the only handle it needs
/// to suspend itself or read the environment.
#[derive(Clone)]
pub struct ProcessContext {
    env: Environment,
    interrupted: Rc<RefCell<Option<Value>>>,
    gates: Rc<RefCell<Vec<Event>>>,
}

impl ProcessContext {
    /// The environment this process runs in.
    pub fn env(&self) -> Environment {
        self.env.clone()
    }

    /// Suspend until `event` is processed, or until this process is
    /// interrupted, whichever comes first.
    ///
    /// This is the redesigned stand-in for awaiting an arbitrary `Event`
    /// directly (see DESIGN.md): a fresh "interrupt gate" event is raced
    /// against `event` with [`Event::or`], so [`Process::interrupt`] has
    /// somewhere to deliver its cause without needing Rust's `Future`s to
    /// support exception injection at an arbitrary suspension point the way
    /// a generator's `.throw()` would.
    pub async fn wait(&self, event: Event) -> Result<Value, SimError> {
        let gate = Event::new(&self.env);
        if let Some(cause) = self.interrupted.borrow().clone() {
            let _ = gate.fail_value(cause);
        }
        self.gates.borrow_mut().push(gate.clone());
        let cond = event.or(&gate)?;
        let outcome = (*cond).clone().await;
        self.gates.borrow_mut().retain(|g| *g != gate);
        match outcome {
            Ok(_) => event.value(),
            Err(SimError::Unhandled(v)) => {
                if gate.triggered() && !gate.ok().unwrap_or(true) {
                    // The gate won the race, not `event`: `event` (a
                    // Timeout, GetResource, PutResource...) is still live in
                    // whatever queue it was constructed into and would
                    // otherwise fire or get granted to nobody. Withdraw it.
                    let _ = event.cancel();
                    Err(SimError::Interrupted(v))
                } else {
                    Err(SimError::Unhandled(v))
                }
            }
            Err(other) => Err(other),
        }
    }

    /// Convenience for `self.wait(Timeout::new(&self.env(), delay, value)?.event())`.
    pub async fn sleep<T: Any>(&self, delay: f64, value: T) -> Result<Value, SimError> {
        let timeout = crate::timeout::Timeout::new(&self.env, delay, value)?;
        self.wait(timeout.event()).await
    }
}

/// A running (or finished) coroutine. Cheap to clone; every clone is a
/// handle onto the same process. Derefs to the `Event` that triggers once
/// the process's future resolves, so a process can itself be awaited.
#[derive(Clone)]
pub struct Process {
    event: Event,
    ctx: ProcessContext,
    future: Rc<RefCell<Option<BoxedFuture>>>,
    name: Rc<str>,
    started: Rc<Cell<bool>>,
}

impl Deref for Process {
    type Target = Event;
    fn deref(&self) -> &Event {
        &self.event
    }
}

impl Process {
    /// The name this process was spawned with (`"anonymous"` unless spawned
    /// through [`Environment::named_process`]).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `true` once this process has started running (consumed at least one
    /// poll of its future) but not yet finished.
    pub fn alive(&self) -> bool {
        self.started.get() && !self.event.triggered()
    }

    /// Interrupt this process with `cause`, delivered at its current
    /// suspension point via [`ProcessContext::wait`]'s interrupt gate.
    /// Silently ignored if the process has already finished.
    pub fn interrupt<T: Any>(&self, cause: T) {
        if self.event.triggered() {
            return;
        }
        let cause: Value = Rc::new(cause);
        *self.ctx.interrupted.borrow_mut() = Some(cause.clone());
        let gates = self.ctx.gates.borrow().clone();
        for gate in gates {
            if !gate.triggered() {
                let _ = gate.fail_value(cause.clone());
            }
        }
    }

    pub(crate) fn spawn<F, Fut>(env: &Environment, name: &str, factory: F) -> Process
    where
        F: FnOnce(ProcessContext) -> Fut,
        Fut: Future<Output = Result<Value, SimError>> + 'static,
    {
        let ctx = ProcessContext {
            env: env.clone(),
            interrupted: Rc::new(RefCell::new(None)),
            gates: Rc::new(RefCell::new(Vec::new())),
        };
        let future: BoxedFuture = Box::pin(factory(ctx.clone()));
        let process = Process {
            event: Event::new(env),
            ctx,
            future: Rc::new(RefCell::new(Some(future))),
            name: Rc::from(name),
            started: Rc::new(Cell::new(false)),
        };

        let init = Event::new(env);
        init.preset_outcome(true, Rc::new(()))
            .expect("fresh event is Pending");
        let driver = process.clone();
        init.on_trigger(move |_| driver.poll_once());
        env.schedule(init, crate::queue::Priority::Urgent, 0.0)
            .expect("delay 0.0 is never negative");

        process
    }

    fn poll_once(&self) {
        let env = self.ctx.env.clone();
        if !self.started.get() {
            self.started.set(true);
            env.notify(|o| o.on_process_started(&env, self));
        }

        let prev_active = env.set_active(Some(self.event.clone()));
        let outcome = {
            let mut slot = self.future.borrow_mut();
            match slot.as_mut() {
                Some(fut) => {
                    let waker = self.waker();
                    let mut cx = Context::from_waker(&waker);
                    match fut.as_mut().poll(&mut cx) {
                        Poll::Ready(result) => {
                            *slot = None;
                            Some(result)
                        }
                        Poll::Pending => None,
                    }
                }
                None => None,
            }
        };
        env.set_active(prev_active);

        match outcome {
            None => {
                trace!("process '{}' yielded", self.name);
                env.notify(|o| o.on_process_yielded(&env, self));
            }
            Some(Ok(value)) => {
                trace!("process '{}' completed", self.name);
                let _ = self.event.succeed_value(value);
                env.notify(|o| o.on_process_completed(&env, self));
            }
            Some(Err(err)) => {
                let interrupted = matches!(err, SimError::Interrupted(_));
                let cause = err.cause().cloned().unwrap_or_else(|| Rc::new(()) as Value);
                trace!("process '{}' failed ({})", self.name, if interrupted { "interrupted" } else { "error" });
                let _ = self.event.fail_value(cause);
                if interrupted {
                    env.notify(|o| o.on_process_interrupted(&env, self));
                } else {
                    env.notify(|o| o.on_process_completed(&env, self));
                }
            }
        }
    }

    fn waker(&self) -> Waker {
        let raw = make_raw_waker(self.clone());
        unsafe { Waker::from_raw(raw) }
    }
}

/// Hand-rolled `RawWaker` backed by an `Rc<Process>`. Waking re-polls the
/// process synchronously from inside whatever `Event::fan` triggered it,
/// which is what makes resumption happen within the same queue tick as the
/// event the process was waiting on, matching the synchronous resume
/// semantics of the generator-based original.
fn make_raw_waker(process: Process) -> RawWaker {
    let data = Rc::into_raw(Rc::new(process)) as *const ();
    RawWaker::new(data, &VTABLE)
}

unsafe fn clone_fn(data: *const ()) -> RawWaker {
    let rc = Rc::from_raw(data as *const Process);
    let cloned = Rc::clone(&rc);
    std::mem::forget(rc);
    RawWaker::new(Rc::into_raw(cloned) as *const (), &VTABLE)
}

unsafe fn wake_fn(data: *const ()) {
    let rc = Rc::from_raw(data as *const Process);
    rc.poll_once();
}

unsafe fn wake_by_ref_fn(data: *const ()) {
    let rc = Rc::from_raw(data as *const Process);
    rc.poll_once();
    std::mem::forget(rc);
}

unsafe fn drop_fn(data: *const ()) {
    drop(Rc::from_raw(data as *const Process));
}

static VTABLE: RawWakerVTable = RawWakerVTable::new(clone_fn, wake_fn, wake_by_ref_fn, drop_fn);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Environment;

    #[test]
    fn process_with_single_timeout_completes() {
        let env = Environment::new();
        let p = env.process(|ctx| async move {
            ctx.sleep(5.0, ()).await?;
            Ok(Rc::new(123i32) as Value)
        });
        env.run().unwrap();
        assert!(p.processed());
        assert_eq!(env.now(), 5.0);
        assert_eq!(*p.value_as::<i32>().unwrap().unwrap(), 123);
    }

    #[test]
    fn process_with_two_sequential_timeouts_sums_delays() {
        let env = Environment::new();
        let p = env.process(|ctx| async move {
            ctx.sleep(3.0, ()).await?;
            ctx.sleep(4.0, ()).await?;
            Ok(Rc::new(()) as Value)
        });
        env.run().unwrap();
        assert!(p.processed());
        assert_eq!(env.now(), 7.0);
    }

    #[test]
    fn interrupt_before_any_wait_is_delivered_at_first_wait() {
        let env = Environment::new();
        let seen = Rc::new(RefCell::new(None));
        let seen2 = seen.clone();
        let p = env.process(move |ctx| async move {
            match ctx.sleep(10.0, ()).await {
                Err(SimError::Interrupted(cause)) => *seen2.borrow_mut() = Some(cause),
                _ => {}
            }
            Ok(Rc::new(()) as Value)
        });
        p.interrupt("boom");
        env.run().unwrap();
        assert!(p.processed());
        // The interrupt is delivered at the very first suspension point,
        // before the 10.0 timeout would otherwise have fired, and the
        // withdrawn timeout leaves no trace in the queue.
        assert_eq!(env.now(), 0.0);
        let cause = seen.borrow().clone().unwrap();
        assert_eq!(*cause.downcast::<&str>().unwrap(), "boom");
    }

    #[test]
    fn interrupt_after_process_finished_is_ignored() {
        let env = Environment::new();
        let p = env.process(|_ctx| async move { Ok(Rc::new(()) as Value) });
        env.run().unwrap();
        p.interrupt("too late");
        assert!(p.ok().unwrap());
    }
}
