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

//! `Resource`: a counting semaphore with FIFO-fair get/put queues.
//!
//! Grounded on the teacher's `SimpleResource`/`Resource` trait in
//! `resources.rs` (a `quantity`/`available`/`queue` counter with
//! `allocate_or_enqueue`/`release_and_schedule_next`), generalized from a
//! single allocate-or-enqueue call into the paired `GetResource`/
//! `PutResource` event protocol spec.md §4.6 describes, where either side
//! can be backlogged and arbitration runs from both queues whenever either
//! one changes.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::ops::Deref;
use std::rc::Rc;

use crate::env::Environment;
use crate::error::SimError;
use crate::event::Event;

enum Arbitration {
    Proceed,
    Stop,
}

struct ResourceInner {
    capacity: usize,
    users: usize,
    get_queue: VecDeque<GetResource>,
    put_queue: VecDeque<PutResource>,
}

/// A counting semaphore of `capacity` units. `get`/`put` (and their
/// `request`/`release` aliases) return events that succeed once the
/// requested amount has actually been granted/returned; both sides queue
/// FIFO when the resource can't immediately satisfy them.
#[derive(Clone)]
pub struct Resource {
    inner: Rc<RefCell<ResourceInner>>,
    env: Environment,
}

/// A pending or granted `get`. Derefs to the `Event` that succeeds once
/// `amount` units have been allocated.
#[derive(Clone)]
pub struct GetResource {
    event: Event,
    resource: Resource,
    amount: usize,
    requester: Option<Event>,
}

/// A pending or granted `put`. Derefs to the `Event` that succeeds once
/// `amount` units have been returned.
#[derive(Clone)]
pub struct PutResource {
    event: Event,
    resource: Resource,
    amount: usize,
    requester: Option<Event>,
}

impl Deref for GetResource {
    type Target = Event;
    fn deref(&self) -> &Event {
        &self.event
    }
}
impl Deref for PutResource {
    type Target = Event;
    fn deref(&self) -> &Event {
        &self.event
    }
}

impl GetResource {
    /// Withdraw this request. If it is still queued, it is simply removed;
    /// if it was already granted by the time the withdrawal runs, the
    /// allocated units are returned via `put` so they aren't held by a
    /// request nobody is waiting on anymore.
    pub fn cancel(&self) {
        let _ = self.event.cancel();
    }

    pub fn amount(&self) -> usize {
        self.amount
    }

    /// The `Process` whose call to `get`/`request` created this request, if
    /// any (a resource can be requested from outside any process).
    pub fn requester(&self) -> Option<Event> {
        self.requester.clone()
    }

    /// The underlying `Event`, for passing to
    /// [`crate::process::ProcessContext::wait`].
    pub fn event(&self) -> Event {
        self.event.clone()
    }
}

impl PutResource {
    /// Withdraw this release. A no-op if it has already been granted: a
    /// granted `put` has already returned its units to the pool, which
    /// needs no undoing.
    pub fn cancel(&self) {
        let _ = self.event.cancel();
    }

    pub fn amount(&self) -> usize {
        self.amount
    }

    /// The `Process` whose call to `put`/`release` created this request, if
    /// any.
    pub fn requester(&self) -> Option<Event> {
        self.requester.clone()
    }

    /// The underlying `Event`, for passing to
    /// [`crate::process::ProcessContext::wait`].
    pub fn event(&self) -> Event {
        self.event.clone()
    }
}

impl Resource {
    /// A resource with `capacity` units, all initially available. Errors
    /// with [`SimError::CapacityViolation`] if `capacity == 0`.
    pub fn new(env: &Environment, capacity: usize) -> Result<Resource, SimError> {
        if capacity == 0 {
            return Err(SimError::CapacityViolation);
        }
        Ok(Resource {
            inner: Rc::new(RefCell::new(ResourceInner {
                capacity,
                users: 0,
                get_queue: VecDeque::new(),
                put_queue: VecDeque::new(),
            })),
            env: env.clone(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.inner.borrow().capacity
    }

    /// Units currently allocated out.
    pub fn users(&self) -> usize {
        self.inner.borrow().users
    }

    /// Units currently available to grant.
    pub fn available(&self) -> usize {
        let inner = self.inner.borrow();
        inner.capacity - inner.users
    }

    /// Request `amount` units. Errors with [`SimError::CapacityViolation`]
    /// if `amount == 0`.
    pub fn get(&self, amount: usize) -> Result<GetResource, SimError> {
        if amount == 0 {
            return Err(SimError::CapacityViolation);
        }
        let event = Event::new(&self.env);
        let req = GetResource {
            event: event.clone(),
            resource: self.clone(),
            amount,
            requester: self.env.active_process(),
        };
        self.inner.borrow_mut().get_queue.push_back(req.clone());
        self.install_get_cancel_hook(&event, amount);
        let resource = self.clone();
        event.on_trigger(move |_| resource.trigger_put());
        self.env.notify(|o| o.on_resource_requested(&self.env, self));
        self.trigger_get();
        self.trigger_put();
        Ok(req)
    }

    /// If `event` is still in `get_queue` when cancelled, drop it; if it was
    /// already granted by then, hand the allocation back with `put` so it
    /// isn't withheld from every later waiter forever (see DESIGN.md).
    fn install_get_cancel_hook(&self, event: &Event, amount: usize) {
        let resource = self.clone();
        let hook_event = event.clone();
        event.set_cancel_hook(move || {
            let removed = {
                let mut inner = resource.inner.borrow_mut();
                let before = inner.get_queue.len();
                inner.get_queue.retain(|r| r.event != hook_event);
                before != inner.get_queue.len()
            };
            if !removed {
                let _ = resource.put(amount);
            }
        });
    }

    /// `get(1)`.
    pub fn request(&self) -> Result<GetResource, SimError> {
        self.get(1)
    }

    /// Return `amount` units. Errors with [`SimError::CapacityViolation`] if
    /// `amount == 0`.
    pub fn put(&self, amount: usize) -> Result<PutResource, SimError> {
        if amount == 0 {
            return Err(SimError::CapacityViolation);
        }
        let event = Event::new(&self.env);
        let req = PutResource {
            event: event.clone(),
            resource: self.clone(),
            amount,
            requester: self.env.active_process(),
        };
        self.inner.borrow_mut().put_queue.push_back(req.clone());
        {
            let resource = self.clone();
            let hook_event = event.clone();
            event.set_cancel_hook(move || {
                resource
                    .inner
                    .borrow_mut()
                    .put_queue
                    .retain(|r| r.event != hook_event);
            });
        }
        let resource = self.clone();
        event.on_trigger(move |_| resource.trigger_get());
        self.trigger_put();
        self.trigger_get();
        Ok(req)
    }

    /// `put(1)`.
    pub fn release(&self) -> Result<PutResource, SimError> {
        self.put(1)
    }

    fn trigger_get(&self) {
        loop {
            let head = self.inner.borrow().get_queue.front().cloned();
            let Some(req) = head else { break };
            if req.event.triggered() {
                self.inner.borrow_mut().get_queue.pop_front();
                continue;
            }
            match self.do_get(&req) {
                Arbitration::Proceed => {
                    self.inner.borrow_mut().get_queue.pop_front();
                    let _ = req.event.succeed_unit();
                    self.env.notify(|o| o.on_resource_acquired(&self.env, self));
                }
                Arbitration::Stop => break,
            }
        }
    }

    fn trigger_put(&self) {
        loop {
            let head = self.inner.borrow().put_queue.front().cloned();
            let Some(req) = head else { break };
            if req.event.triggered() {
                self.inner.borrow_mut().put_queue.pop_front();
                continue;
            }
            match self.do_put(&req) {
                Arbitration::Proceed => {
                    self.inner.borrow_mut().put_queue.pop_front();
                    let _ = req.event.succeed_unit();
                    self.env.notify(|o| o.on_resource_released(&self.env, self));
                }
                Arbitration::Stop => break,
            }
        }
    }

    fn do_get(&self, req: &GetResource) -> Arbitration {
        let mut inner = self.inner.borrow_mut();
        if inner.capacity - inner.users >= req.amount {
            inner.users += req.amount;
            Arbitration::Proceed
        } else {
            Arbitration::Stop
        }
    }

    fn do_put(&self, req: &PutResource) -> Arbitration {
        let mut inner = self.inner.borrow_mut();
        if inner.users >= req.amount {
            inner.users -= req.amount;
            Arbitration::Proceed
        } else {
            Arbitration::Stop
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Environment;

    #[test]
    fn get_within_capacity_grants_immediately() {
        let env = Environment::new();
        let r = Resource::new(&env, 2).unwrap();
        let g = r.get(2).unwrap();
        assert!(g.triggered());
        assert_eq!(r.users(), 2);
    }

    #[test]
    fn get_beyond_capacity_queues_until_a_put() {
        let env = Environment::new();
        let r = Resource::new(&env, 1).unwrap();
        let g1 = r.get(1).unwrap();
        let g2 = r.get(1).unwrap();
        assert!(g1.triggered());
        assert!(!g2.triggered());
        r.put(1).unwrap();
        assert!(g2.triggered());
        assert_eq!(r.users(), 1);
    }

    #[test]
    fn fifo_order_among_queued_gets() {
        let env = Environment::new();
        let r = Resource::new(&env, 1).unwrap();
        let _held = r.get(1).unwrap();
        let first = r.get(1).unwrap();
        let second = r.get(1).unwrap();
        r.put(1).unwrap();
        assert!(first.triggered());
        assert!(!second.triggered());
    }

    #[test]
    fn cancel_removes_a_queued_get() {
        let env = Environment::new();
        let r = Resource::new(&env, 1).unwrap();
        let _held = r.get(1).unwrap();
        let queued = r.get(1).unwrap();
        queued.cancel();
        r.put(1).unwrap();
        assert!(!queued.triggered());
        assert_eq!(r.users(), 0);
    }

    #[test]
    fn zero_capacity_rejected() {
        let env = Environment::new();
        assert!(matches!(
            Resource::new(&env, 0),
            Err(SimError::CapacityViolation)
        ));
    }

    #[test]
    fn zero_amount_get_rejected() {
        let env = Environment::new();
        let r = Resource::new(&env, 1).unwrap();
        assert!(matches!(r.get(0), Err(SimError::CapacityViolation)));
    }
}
