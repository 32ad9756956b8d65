//! Orchestration core for the Oath simulation.
//!
//! Independent gameplay systems are modelled uniformly as named state
//! automata, ticked every frame, wired together through a synchronous
//! broadcast event bus, and persisted as one save document. No system knows
//! another's internals: they share only the [`WorldContext`], events, and
//! capability traits.
//!
//! # Modules
//!
//! - [`node`] -- State nodes, transition rules, actions, and enter/exit
//!   behaviour.
//! - [`controller`] -- [`AutomatonController`]: node arena plus current node
//!   and dirty flag per system.
//! - [`plugin`] -- The [`SystemPlugin`] contract, [`SystemContext`], and the
//!   capability traits.
//! - [`orchestrator`] -- [`Orchestrator`]: registry, lifecycle, event bus, and
//!   save/load coordination.
//! - [`context`] -- The shared [`WorldContext`] and its typed sub-contexts.
//! - [`calendar`] -- Hour, day, and season arithmetic.
//! - [`save`] -- [`SaveDocument`] codec and [`LoadReport`].
//! - [`config`] -- Configuration loading from `oath-config.yaml`.
//!
//! [`AutomatonController`]: controller::AutomatonController
//! [`SystemPlugin`]: plugin::SystemPlugin
//! [`SystemContext`]: plugin::SystemContext
//! [`Orchestrator`]: orchestrator::Orchestrator
//! [`WorldContext`]: context::WorldContext
//! [`SaveDocument`]: save::SaveDocument
//! [`LoadReport`]: save::LoadReport

pub mod calendar;
pub mod config;
pub mod context;
pub mod controller;
pub mod node;
pub mod orchestrator;
pub mod plugin;
pub mod save;

pub use context::WorldContext;
pub use controller::{AutomatonController, ControllerError, TransitionOutcome};
pub use node::{Action, NodeBehavior, NodeId, StateNode};
pub use orchestrator::{DispatchError, DispatchTrace, Lifecycle, Orchestrator, OrchestratorError};
pub use plugin::{PluginError, SystemContext, SystemPlugin};
pub use save::{LoadReport, SaveDocument, SaveError};
