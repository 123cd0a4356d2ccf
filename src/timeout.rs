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

//! `Timeout`: an event that succeeds with a fixed value after a fixed delay.

use std::any::Any;
use std::ops::Deref;
use std::rc::Rc;

use crate::env::Environment;
use crate::error::SimError;
use crate::event::Event;
use crate::queue::Priority;

/// An `Event` pre-armed to succeed with `value` once `delay` time units have
/// elapsed. The most common way a process advances the clock.
pub struct Timeout {
    event: Event,
}

impl Deref for Timeout {
    type Target = Event;
    fn deref(&self) -> &Event {
        &self.event
    }
}

impl Timeout {
    /// Build and schedule a timeout. Errors with [`SimError::NegativeDelay`]
    /// if `delay < 0.0`.
    pub fn new<T: Any>(env: &Environment, delay: f64, value: T) -> Result<Timeout, SimError> {
        if delay < 0.0 {
            return Err(SimError::NegativeDelay);
        }
        let event = Event::new(env);
        event.preset_outcome(true, Rc::new(value))?;
        env.schedule(event.clone(), Priority::Normal, delay)?;
        Ok(Timeout { event })
    }

    /// A timeout that succeeds with `()`.
    pub fn unit(env: &Environment, delay: f64) -> Result<Timeout, SimError> {
        Timeout::new(env, delay, ())
    }

    /// The underlying `Event`, for passing to [`crate::process::ProcessContext::wait`]
    /// or composing with `and`/`or`.
    pub fn event(&self) -> Event {
        self.event.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_at_the_right_time() {
        let env = Environment::new();
        let t = Timeout::new(&env, 3.0, "done").unwrap();
        env.run().unwrap();
        assert_eq!(env.now(), 3.0);
        assert_eq!(
            *t.value_as::<&str>().unwrap().unwrap(),
            "done"
        );
    }

    #[test]
    fn negative_delay_rejected() {
        let env = Environment::new();
        assert!(matches!(
            Timeout::new(&env, -1.0, ()),
            Err(SimError::NegativeDelay)
        ));
    }
}
