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

//! Composite events: an `all` or `any` predicate over a fixed set of child
//! events.

use std::cell::RefCell;
use std::ops::Deref;
use std::rc::Rc;

use crate::env::Environment;
use crate::error::SimError;
use crate::event::{CallbackId, Event, Value};

/// Placeholder success value a condition is triggered with before its
/// value-builder callback has had a chance to replace it with the real
/// [`ConditionValue`]. Never observable by a caller that reads
/// `ConditionEvent::value` only after the event is `Processed`.
struct Placeholder;

#[derive(Clone, Copy)]
enum Predicate {
    All,
    Any,
}

impl Predicate {
    fn holds(self, len: usize, satisfied: usize) -> bool {
        match self {
            Predicate::All => satisfied == len,
            Predicate::Any => satisfied > 0 || len == 0,
        }
    }
}

struct ConditionInner {
    children: Vec<Event>,
    satisfied_count: usize,
    predicate: Predicate,
    check_ids: Vec<(usize, CallbackId)>,
}

/// An ordered map from the children that were `Processed` by the time a
/// condition was decided to their outcome values. Preserves child order.
pub struct ConditionValue {
    entries: Vec<(Event, Value)>,
}

impl ConditionValue {
    /// The value a specific child triggered with, if it had been processed
    /// by the time the condition was decided.
    pub fn get(&self, child: &Event) -> Option<&Value> {
        self.entries.iter().find(|(e, _)| e == child).map(|(_, v)| v)
    }

    /// Iterate the (child, value) pairs in child-registration order.
    pub fn iter(&self) -> impl Iterator<Item = &(Event, Value)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// An `Event` satisfied by a predicate (`all`/`any`) over a fixed set of
/// child events. Build one with [`Event::and`]/[`Event::or`] or
/// [`ConditionEvent::all`]/[`ConditionEvent::any`].
pub struct ConditionEvent {
    event: Event,
    state: Rc<RefCell<ConditionInner>>,
}

impl Deref for ConditionEvent {
    type Target = Event;
    fn deref(&self) -> &Event {
        &self.event
    }
}

impl ConditionEvent {
    /// Succeeds once every child has triggered successfully; fails with the
    /// value of the first child observed to fail.
    pub fn all(env: &Environment, children: Vec<Event>) -> Result<ConditionEvent, SimError> {
        Self::new(env, Predicate::All, children)
    }

    /// Succeeds once any child has triggered successfully (or immediately,
    /// if built over no children at all); fails with the value of the first
    /// child observed to fail.
    pub fn any(env: &Environment, children: Vec<Event>) -> Result<ConditionEvent, SimError> {
        Self::new(env, Predicate::Any, children)
    }

    /// The children this condition was built over, in order.
    pub fn children(&self) -> Vec<Event> {
        self.state.borrow().children.clone()
    }

    fn new(env: &Environment, predicate: Predicate, children: Vec<Event>) -> Result<ConditionEvent, SimError> {
        for c in &children {
            if !Rc::ptr_eq(&c.env().inner, &env.inner) {
                return Err(SimError::MixedEnvironment);
            }
        }

        let event = Event::new(env);
        let state = Rc::new(RefCell::new(ConditionInner {
            children: children.clone(),
            satisfied_count: 0,
            predicate,
            check_ids: Vec::new(),
        }));

        // Registered first so it runs before any callback a caller attaches
        // to `event` afterwards, guaranteeing the real ConditionValue is in
        // place by the time any subscriber observes the outcome.
        {
            let state = state.clone();
            event.on_trigger(move |ev| Self::build_value(&state, ev));
        }

        for (idx, child) in children.iter().enumerate() {
            if event.triggered() {
                break;
            }
            if child.processed() {
                Self::check(&state, &event, child);
            } else {
                let state2 = state.clone();
                let ev2 = event.clone();
                let id = child.on_trigger(move |c| Self::check(&state2, &ev2, c));
                state.borrow_mut().check_ids.push((idx, id));
            }
        }

        if children.is_empty() && !event.triggered() && predicate.holds(0, 0) {
            event.succeed(Placeholder)?;
        }

        Ok(ConditionEvent { event, state })
    }

    fn check(state: &Rc<RefCell<ConditionInner>>, event: &Event, child: &Event) {
        if event.triggered() {
            return;
        }
        let count = {
            let mut st = state.borrow_mut();
            st.satisfied_count += 1;
            st.satisfied_count
        };
        if !child.ok().unwrap_or(false) {
            child.set_defused(true);
            let value = child.value().unwrap_or_else(|_| Rc::new(()) as Value);
            let _ = event.fail_value(value);
            Self::unsubscribe(state);
            return;
        }
        let holds = {
            let st = state.borrow();
            st.predicate.holds(st.children.len(), count)
        };
        if holds {
            let _ = event.succeed(Placeholder);
            Self::unsubscribe(state);
        }
    }

    /// Remove any still-pending check callbacks from children the
    /// condition no longer needs to watch. This is the fix for the
    /// identity-equality bug noted in DESIGN.md: callback removal here
    /// actually removes the registered closure.
    fn unsubscribe(state: &Rc<RefCell<ConditionInner>>) {
        let ids = std::mem::take(&mut state.borrow_mut().check_ids);
        let children = state.borrow().children.clone();
        for (idx, id) in ids {
            if let Some(child) = children.get(idx) {
                if !child.processed() {
                    child.remove_callback(id);
                }
            }
        }
    }

    fn build_value(state: &Rc<RefCell<ConditionInner>>, event: &Event) {
        if !event.ok().unwrap_or(false) {
            return;
        }
        let children = state.borrow().children.clone();
        let mut entries = Vec::new();
        for c in children {
            if c.processed() {
                if let Ok(v) = c.value() {
                    entries.push((c, v));
                }
            }
        }
        event.overwrite_triggered_value(Rc::new(ConditionValue { entries }) as Value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Environment;

    #[test]
    fn all_succeeds_when_every_child_succeeds() {
        let env = Environment::new();
        let a = Event::new(&env);
        let b = Event::new(&env);
        let cond = ConditionEvent::all(&env, vec![a.clone(), b.clone()]).unwrap();
        a.succeed_unit().unwrap();
        a.fan().unwrap();
        assert!(!cond.triggered());
        b.succeed_unit().unwrap();
        b.fan().unwrap();
        assert!(cond.triggered());
        assert!(cond.ok().unwrap());
    }

    #[test]
    fn all_fails_with_first_failed_child() {
        let env = Environment::new();
        let a = Event::new(&env);
        let b = Event::new(&env);
        let cond = ConditionEvent::all(&env, vec![a.clone(), b.clone()]).unwrap();
        a.fail(99i32).unwrap();
        a.fan().unwrap();
        assert!(cond.triggered());
        assert!(!cond.ok().unwrap());
        assert!(a.defused());
        b.succeed_unit().unwrap();
        b.fan().unwrap();
        assert!(!cond.ok().unwrap());
    }

    #[test]
    fn any_over_empty_set_succeeds_immediately() {
        let env = Environment::new();
        let cond = ConditionEvent::any(&env, vec![]).unwrap();
        assert!(cond.triggered());
        assert!(cond.ok().unwrap());
    }

    #[test]
    fn all_over_empty_set_succeeds_immediately() {
        let env = Environment::new();
        let cond = ConditionEvent::all(&env, vec![]).unwrap();
        assert!(cond.triggered());
        assert!(cond.ok().unwrap());
    }

    #[test]
    fn mixed_environment_rejected() {
        let env1 = Environment::new();
        let env2 = Environment::new();
        let a = Event::new(&env1);
        let b = Event::new(&env2);
        assert!(matches!(
            ConditionEvent::all(&env1, vec![a, b]),
            Err(SimError::MixedEnvironment)
        ));
    }
}
