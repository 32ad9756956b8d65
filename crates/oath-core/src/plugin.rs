//! The subsystem plugin contract.
//!
//! Every gameplay domain implements [`SystemPlugin`]. The orchestrator lends
//! each call a [`SystemContext`] holding the automaton controller, the shared
//! world context, and an outbox. Events a plugin emits through
//! [`SystemContext::emit`] are broadcast to every plugin as soon as the call
//! that emitted them returns.
//!
//! Plugins never downcast each other. A plugin that answers domain queries
//! exposes them through one of the capability traits below, and callers ask
//! the orchestrator for "whoever keeps the bounty ledger" instead of asking
//! for a concrete type.

use oath_types::{GameEvent, TransitionInput, Weather};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::context::WorldContext;
use crate::controller::{AutomatonController, ControllerError, TransitionOutcome};

/// Errors a plugin reports from initialisation, ticking, input, or loading.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// A required field is absent from a saved document.
    #[error("missing field: {field}")]
    MissingField {
        /// The absent field.
        field: String,
    },

    /// A field is present but its value is unusable.
    #[error("invalid field {field}: {reason}")]
    InvalidField {
        /// The offending field.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A saved document could not be decoded.
    #[error("failed to decode state: {0}")]
    Decode(#[from] serde_json::Error),

    /// The automaton controller rejected an operation.
    #[error(transparent)]
    Controller(#[from] ControllerError),

    /// The plugin refused an input for a domain reason.
    #[error("{reason}")]
    Rejected {
        /// Human-readable reason.
        reason: String,
    },
}

impl PluginError {
    /// Convenience constructor for [`PluginError::Rejected`].
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }
}

/// Decode a plugin's saved document into its typed snapshot.
///
/// Snapshots should be `#[serde(default)]` so documents from older builds
/// with missing fields still decode.
pub fn decode_state<T: DeserializeOwned>(state: &Value) -> Result<T, PluginError> {
    Ok(T::deserialize(state)?)
}

/// Everything a plugin may touch during one call.
pub struct SystemContext<'a> {
    /// The automaton controller holding every system's nodes.
    pub controller: &'a mut AutomatonController,
    /// The shared world context.
    pub world: &'a mut WorldContext,
    outbox: Vec<GameEvent>,
}

impl<'a> SystemContext<'a> {
    /// Bundle a controller and a world context with an empty outbox.
    pub const fn new(controller: &'a mut AutomatonController, world: &'a mut WorldContext) -> Self {
        Self {
            controller,
            world,
            outbox: Vec::new(),
        }
    }

    /// Queue an event for broadcast once the current plugin call returns.
    pub fn emit(&mut self, event: GameEvent) {
        self.outbox.push(event);
    }

    /// Events emitted so far during this call.
    pub fn emitted(&self) -> &[GameEvent] {
        &self.outbox
    }

    /// Consume the context, yielding the emitted events in emission order.
    pub fn into_emitted(self) -> Vec<GameEvent> {
        self.outbox
    }

    /// Feed `input` to `system`'s automaton with this context's world.
    pub fn process_input(
        &mut self,
        system: &str,
        input: &TransitionInput,
    ) -> Result<TransitionOutcome, ControllerError> {
        self.controller.process_input(system, input, self.world)
    }
}

/// A gameplay subsystem driven by the orchestrator.
///
/// The orchestrator guarantees `initialize` runs once before any `tick`,
/// `handle_input`, or `handle_event`, and that `shutdown` runs at most once,
/// after the last tick.
pub trait SystemPlugin: Send {
    /// Unique registry name. Also the key of this plugin's save sub-document.
    fn name(&self) -> &str;

    /// One-line description for tooling.
    fn description(&self) -> &str {
        ""
    }

    /// Build the automaton (creating nodes and calling
    /// [`AutomatonController::set_system_root`]) and seed shared defaults.
    fn initialize(&mut self, ctx: &mut SystemContext<'_>) -> Result<(), PluginError>;

    /// Release resources. Called at most once.
    fn shutdown(&mut self) {}

    /// Advance by `delta` seconds of real time.
    fn tick(&mut self, delta: f64, ctx: &mut SystemContext<'_>) -> Result<(), PluginError>;

    /// Feed a presentation-layer input to this plugin's automaton.
    ///
    /// The default just runs the automaton; plugins override this to apply
    /// domain effects (paying a bounty, buying an item) alongside the move.
    fn handle_input(
        &mut self,
        input: &TransitionInput,
        ctx: &mut SystemContext<'_>,
    ) -> Result<TransitionOutcome, PluginError> {
        ctx.process_input(self.name(), input)
            .map_err(PluginError::from)
    }

    /// Self-contained snapshot of this plugin's durable state.
    fn save_state(&self) -> Value;

    /// Restore from a snapshot produced by [`SystemPlugin::save_state`],
    /// possibly by an older build. On error the plugin must be left as it
    /// was before the call.
    fn load_state(&mut self, state: &Value, ctx: &mut SystemContext<'_>)
    -> Result<(), PluginError>;

    /// React to a broadcast event. Returns whether the event was acted on.
    /// Called for every event, so irrelevant ones should return early.
    fn handle_event(&mut self, event: &GameEvent, ctx: &mut SystemContext<'_>) -> bool;

    /// This plugin's bounty ledger, if it keeps one.
    fn bounty_ledger(&self) -> Option<&dyn BountyLedger> {
        None
    }

    /// This plugin's vital signs, if it tracks them.
    fn vital_signs(&self) -> Option<&dyn VitalSigns> {
        None
    }

    /// This plugin's treasury, if it keeps one.
    fn treasury(&self) -> Option<&dyn Treasury> {
        None
    }

    /// This plugin's faction standings, if it keeps them.
    fn standings(&self) -> Option<&dyn StandingRegistry> {
        None
    }

    /// This plugin's weather report, if it forecasts.
    fn weather_report(&self) -> Option<&dyn WeatherReport> {
        None
    }
}

/// Criminal record queries.
pub trait BountyLedger {
    /// Outstanding bounty in `region`.
    fn bounty(&self, region: &str) -> i64;

    /// Sum of outstanding bounties across regions.
    fn total_bounty(&self) -> i64;

    /// Whether guards in `region` arrest on sight.
    fn is_wanted(&self, region: &str) -> bool;

    /// Criminal reputation, -100 (notorious) to 100 (upstanding).
    fn criminal_reputation(&self) -> i32;

    /// Number of crimes on record.
    fn crime_count(&self) -> usize;
}

/// Health queries.
pub trait VitalSigns {
    /// Current health.
    fn health(&self) -> i32;

    /// Maximum health.
    fn max_health(&self) -> i32;

    /// Names of active diseases.
    fn diseases(&self) -> Vec<String>;
}

/// Market and purse queries.
pub trait Treasury {
    /// The player's gold.
    fn gold(&self) -> i64;

    /// Current market price of `item`.
    fn price(&self, item: &str) -> Option<i64>;
}

/// Faction reputation queries.
pub trait StandingRegistry {
    /// Reputation with `faction`.
    fn reputation(&self, faction: &str) -> i32;

    /// Rank title held in `faction`.
    fn rank(&self, faction: &str) -> Option<&str>;
}

/// Weather queries.
pub trait WeatherReport {
    /// Weather in effect now.
    fn current_weather(&self) -> Weather;

    /// Consecutive days the current weather has lasted.
    fn days_unchanged(&self) -> u32;
}
