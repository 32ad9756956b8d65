//! Shared type definitions for the Oath simulation.
//!
//! Every crate in the workspace speaks these types: the automaton core uses
//! [`StateValue`] and [`TransitionInput`], the event bus carries
//! [`GameEvent`], and the gameplay systems persist [`Season`], [`Weather`]
//! and friends inside their save documents.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for persisted records
//! - [`enums`] -- Calendar, weather, and crime enumerations
//! - [`value`] -- Tagged state values and transition inputs
//! - [`events`] -- The closed set of event families dispatched on the bus

pub mod enums;
pub mod events;
pub mod ids;
pub mod value;

pub use enums::{CrimeKind, ParseEnumError, Season, TimeOfDay, Weather};
pub use events::{EventFamily, GameEvent};
pub use ids::CrimeId;
pub use value::{StateValue, TransitionInput};
