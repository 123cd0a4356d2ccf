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

//! The chronosim prelude.
//!
//! A list of the types used in almost every simulation program, importable
//! with a single `use`:
//! ```rust
//! use chronosim::prelude::*;
//! ```

pub use crate::ConditionEvent;
pub use crate::ConditionValue;
pub use crate::Environment;
pub use crate::Event;
pub use crate::GetResource;
pub use crate::Priority;
pub use crate::Process;
pub use crate::ProcessContext;
pub use crate::PutResource;
pub use crate::Resource;
pub use crate::SimError;
pub use crate::Timeout;
pub use crate::Until;
pub use crate::Value;
