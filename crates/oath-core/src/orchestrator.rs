//! The orchestrator: plugin registry, lifecycle driver, event bus, and save
//! coordinator.
//!
//! Plugins are visited in registration order for every operation. Event
//! dispatch is synchronous and broadcast: every initialised plugin sees the
//! event once, and events emitted while handling it are dispatched
//! depth-first before the next plugin is visited. A depth ceiling turns an
//! unbounded event cycle into a [`DispatchError::DepthExceeded`] instead of a
//! stack overflow.
//!
//! Failures are contained per plugin. Initialising, ticking, and loading
//! report every failing plugin and carry on with the rest.

use std::collections::BTreeMap;

use oath_types::{GameEvent, TransitionInput};
use tracing::{debug, error, info, warn};

use crate::config::DispatchConfig;
use crate::context::WorldContext;
use crate::controller::{AutomatonController, TransitionOutcome};
use crate::plugin::{
    BountyLedger, PluginError, StandingRegistry, SystemContext, SystemPlugin, Treasury, VitalSigns,
    WeatherReport,
};
use crate::save::{LoadReport, SaveDocument, SaveError};

/// Failure of a broadcast.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// A chain of events dispatching events went deeper than the ceiling.
    #[error("dispatch of {event} reached depth {depth}, over the limit of {limit}")]
    DepthExceeded {
        /// Type of the event that crossed the ceiling.
        event: String,
        /// Depth it would have been dispatched at.
        depth: u32,
        /// The configured ceiling.
        limit: u32,
    },
}

/// Errors from orchestrator operations, tagged with the plugin involved.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// A plugin with this name is already registered.
    #[error("plugin already registered: {system}")]
    DuplicatePlugin {
        /// The conflicting name.
        system: String,
    },

    /// No plugin is registered under this name.
    #[error("unknown plugin: {system}")]
    UnknownPlugin {
        /// The requested name.
        system: String,
    },

    /// The plugin exists but is not initialised.
    #[error("plugin {system} is not initialized")]
    NotInitialized {
        /// The plugin.
        system: String,
    },

    /// `initialize` failed; the plugin stays registered but inactive.
    #[error("plugin {system} failed to initialize: {source}")]
    Init {
        /// The plugin.
        system: String,
        /// What went wrong.
        source: PluginError,
    },

    /// `tick` failed.
    #[error("plugin {system} failed to tick: {source}")]
    Tick {
        /// The plugin.
        system: String,
        /// What went wrong.
        source: PluginError,
    },

    /// `handle_input` failed.
    #[error("plugin {system} rejected input: {source}")]
    Input {
        /// The plugin.
        system: String,
        /// What went wrong.
        source: PluginError,
    },

    /// Dispatching the events a plugin emitted failed.
    #[error("events emitted by {system} could not be dispatched: {source}")]
    Dispatch {
        /// The plugin whose events were being dispatched.
        system: String,
        /// What went wrong.
        source: DispatchError,
    },
}

/// Where a plugin is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Registered but not (successfully) initialised.
    Registered,
    /// Initialised; receives ticks, inputs, and events.
    Initialized,
    /// Shut down; receives nothing further.
    ShutDown,
}

/// One plugin visit during a traced dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchVisit {
    /// The plugin visited.
    pub system: String,
    /// Type of the event it handled.
    pub event: String,
    /// Dispatch depth (top-level dispatch is depth 1).
    pub depth: u32,
    /// What the plugin returned.
    pub handled: bool,
}

/// Ordered record of every plugin visit in a dispatch, nested ones included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchTrace {
    /// Visits in the order they happened.
    pub visits: Vec<DispatchVisit>,
}

impl DispatchTrace {
    /// Visits of top-level dispatch only.
    pub fn top_level(&self) -> impl Iterator<Item = &DispatchVisit> {
        self.visits.iter().filter(|visit| visit.depth == 1)
    }

    /// Deepest depth reached.
    pub fn max_depth(&self) -> u32 {
        self.visits.iter().map(|visit| visit.depth).max().unwrap_or(0)
    }
}

struct Entry {
    plugin: Box<dyn SystemPlugin>,
    lifecycle: Lifecycle,
}

/// Registry and driver of every gameplay plugin.
pub struct Orchestrator {
    entries: Vec<Entry>,
    index: BTreeMap<String, usize>,
    controller: AutomatonController,
    max_depth: u32,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(&DispatchConfig::default())
    }
}

impl Orchestrator {
    /// Create an empty orchestrator.
    pub fn new(config: &DispatchConfig) -> Self {
        Self {
            entries: Vec::new(),
            index: BTreeMap::new(),
            controller: AutomatonController::new(),
            max_depth: config.max_depth,
        }
    }

    /// The dispatch depth ceiling.
    pub const fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Register a plugin at the end of the visiting order. Names are unique;
    /// a plugin with a taken name is rejected and dropped.
    pub fn register_plugin(
        &mut self,
        plugin: Box<dyn SystemPlugin>,
    ) -> Result<(), OrchestratorError> {
        let name = plugin.name().to_owned();
        if self.index.contains_key(&name) {
            warn!(system = %name, "duplicate plugin registration rejected");
            return Err(OrchestratorError::DuplicatePlugin { system: name });
        }
        info!(system = %name, description = plugin.description(), "plugin registered");
        self.index.insert(name, self.entries.len());
        self.entries.push(Entry {
            plugin,
            lifecycle: Lifecycle::Registered,
        });
        Ok(())
    }

    /// Borrow a plugin by name.
    pub fn plugin(&self, name: &str) -> Option<&dyn SystemPlugin> {
        self.entry(name).map(|entry| entry.plugin.as_ref())
    }

    /// Names of every plugin, in registration order.
    pub fn plugin_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.plugin.name())
    }

    /// Number of registered plugins.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no plugins are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lifecycle state of a plugin.
    pub fn lifecycle(&self, name: &str) -> Option<Lifecycle> {
        self.entry(name).map(|entry| entry.lifecycle)
    }

    /// The shared automaton controller.
    pub const fn controller(&self) -> &AutomatonController {
        &self.controller
    }

    /// The shared automaton controller, mutably.
    pub const fn controller_mut(&mut self) -> &mut AutomatonController {
        &mut self.controller
    }

    /// Initialise every registered plugin in registration order.
    ///
    /// Each plugin is initialised at most once; already-initialised plugins
    /// are skipped and shut-down plugins are never re-initialised. A plugin
    /// whose `initialize` fails stays [`Lifecycle::Registered`] and the rest
    /// carry on. Returns every failure.
    pub fn initialize_all(&mut self, world: &mut WorldContext) -> Vec<OrchestratorError> {
        let mut errors = Vec::new();
        for position in 0..self.entries.len() {
            let Some(entry) = self.entries.get_mut(position) else {
                break;
            };
            let name = entry.plugin.name().to_owned();
            match entry.lifecycle {
                Lifecycle::Initialized => {
                    debug!(system = %name, "already initialized");
                    continue;
                }
                Lifecycle::ShutDown => {
                    warn!(system = %name, "re-initialization after shutdown is not supported");
                    continue;
                }
                Lifecycle::Registered => {}
            }

            let mut ctx = SystemContext::new(&mut self.controller, world);
            let result = entry.plugin.initialize(&mut ctx);
            let emitted = ctx.into_emitted();
            match result {
                Ok(()) => {
                    entry.lifecycle = Lifecycle::Initialized;
                    info!(system = %name, "plugin initialized");
                    if let Err(source) = self.dispatch_emitted(emitted, world, 0, None) {
                        error!(system = %name, error = %source, "dispatch failed");
                        errors.push(OrchestratorError::Dispatch { system: name, source });
                    }
                }
                Err(source) => {
                    error!(system = %name, error = %source, "plugin failed to initialize");
                    errors.push(OrchestratorError::Init { system: name, source });
                }
            }
        }
        errors
    }

    /// Tick every initialised plugin in registration order, dispatching
    /// whatever each one emits before moving on. Returns every failure.
    pub fn update_all(&mut self, delta: f64, world: &mut WorldContext) -> Vec<OrchestratorError> {
        let mut errors = Vec::new();
        for position in 0..self.entries.len() {
            let Some(entry) = self.entries.get_mut(position) else {
                break;
            };
            if entry.lifecycle != Lifecycle::Initialized {
                continue;
            }
            let name = entry.plugin.name().to_owned();

            let mut ctx = SystemContext::new(&mut self.controller, world);
            let result = entry.plugin.tick(delta, &mut ctx);
            let emitted = ctx.into_emitted();

            if let Err(source) = result {
                warn!(system = %name, error = %source, "tick failed");
                errors.push(OrchestratorError::Tick {
                    system: name.clone(),
                    source,
                });
            }
            if let Err(source) = self.dispatch_emitted(emitted, world, 0, None) {
                error!(system = %name, error = %source, "dispatch failed");
                errors.push(OrchestratorError::Dispatch { system: name, source });
            }
        }
        errors
    }

    /// Shut down every initialised plugin, once.
    pub fn shutdown_all(&mut self) {
        for entry in &mut self.entries {
            if entry.lifecycle == Lifecycle::Initialized {
                entry.plugin.shutdown();
                entry.lifecycle = Lifecycle::ShutDown;
                info!(system = entry.plugin.name(), "plugin shut down");
            }
        }
    }

    /// Route a presentation-layer input to `system`, then dispatch whatever
    /// it emitted.
    pub fn submit_input(
        &mut self,
        system: &str,
        input: &TransitionInput,
        world: &mut WorldContext,
    ) -> Result<TransitionOutcome, OrchestratorError> {
        let position = self.position(system)?;
        let Some(entry) = self.entries.get_mut(position) else {
            return Err(OrchestratorError::UnknownPlugin {
                system: system.to_owned(),
            });
        };
        if entry.lifecycle != Lifecycle::Initialized {
            return Err(OrchestratorError::NotInitialized {
                system: system.to_owned(),
            });
        }

        let mut ctx = SystemContext::new(&mut self.controller, world);
        let result = entry.plugin.handle_input(input, &mut ctx);
        let emitted = ctx.into_emitted();

        let outcome = result.map_err(|source| OrchestratorError::Input {
            system: system.to_owned(),
            source,
        })?;
        self.dispatch_emitted(emitted, world, 0, None)
            .map_err(|source| OrchestratorError::Dispatch {
                system: system.to_owned(),
                source,
            })?;
        Ok(outcome)
    }

    /// Broadcast `event` to every initialised plugin in registration order.
    ///
    /// Returns `true` if any plugin handled it. Events emitted by handlers
    /// are dispatched depth-first; crossing the depth ceiling aborts the
    /// whole dispatch with [`DispatchError::DepthExceeded`]. Plugins after
    /// the one whose cascade failed are not visited, and changes made
    /// before the failure are kept.
    pub fn dispatch_event(
        &mut self,
        event: &GameEvent,
        world: &mut WorldContext,
    ) -> Result<bool, DispatchError> {
        self.dispatch_at(event, world, 1, None)
    }

    /// [`Orchestrator::dispatch_event`], also recording every plugin visit.
    pub fn dispatch_event_traced(
        &mut self,
        event: &GameEvent,
        world: &mut WorldContext,
    ) -> (Result<bool, DispatchError>, DispatchTrace) {
        let mut trace = DispatchTrace::default();
        let result = self.dispatch_at(event, world, 1, Some(&mut trace));
        (result, trace)
    }

    fn dispatch_at(
        &mut self,
        event: &GameEvent,
        world: &mut WorldContext,
        depth: u32,
        mut trace: Option<&mut DispatchTrace>,
    ) -> Result<bool, DispatchError> {
        if depth > self.max_depth {
            error!(
                event = event.event_type(),
                depth,
                limit = self.max_depth,
                "dispatch depth ceiling exceeded"
            );
            return Err(DispatchError::DepthExceeded {
                event: event.event_type().to_owned(),
                depth,
                limit: self.max_depth,
            });
        }

        let mut handled = false;
        for position in 0..self.entries.len() {
            let Some(entry) = self.entries.get_mut(position) else {
                break;
            };
            if entry.lifecycle != Lifecycle::Initialized {
                continue;
            }

            let mut ctx = SystemContext::new(&mut self.controller, world);
            let plugin_handled = entry.plugin.handle_event(event, &mut ctx);
            let emitted = ctx.into_emitted();

            if let Some(trace) = trace.as_deref_mut() {
                trace.visits.push(DispatchVisit {
                    system: entry.plugin.name().to_owned(),
                    event: event.event_type().to_owned(),
                    depth,
                    handled: plugin_handled,
                });
            }
            if plugin_handled {
                debug!(system = entry.plugin.name(), event = event.event_type(), depth, "event handled");
                handled = true;
            }

            self.dispatch_emitted(emitted, world, depth, trace.as_deref_mut())?;
        }
        Ok(handled)
    }

    /// Dispatch events emitted by a call running at `depth` (0 for calls
    /// outside any dispatch) one level deeper.
    fn dispatch_emitted(
        &mut self,
        emitted: Vec<GameEvent>,
        world: &mut WorldContext,
        depth: u32,
        mut trace: Option<&mut DispatchTrace>,
    ) -> Result<(), DispatchError> {
        let next = depth.saturating_add(1);
        for event in emitted {
            self.dispatch_at(&event, world, next, trace.as_deref_mut())?;
        }
        Ok(())
    }

    /// Snapshot the common world sections and every plugin's state.
    pub fn save_all_systems(&self, world: &WorldContext) -> SaveDocument {
        let mut document = SaveDocument::capture(world);
        for entry in &self.entries {
            document.insert_system(entry.plugin.name(), entry.plugin.save_state());
        }
        info!(systems = document.systems.len(), "systems saved");
        document
    }

    /// Restore the common world, player, and extras sections, then every
    /// registered plugin present in `document`.
    ///
    /// Plugins absent from the document keep their current state. Sub-
    /// documents of unregistered plugins are skipped. One plugin failing to
    /// load is reported and does not stop the others; events a plugin emits
    /// while loading are dropped.
    pub fn load_all_systems(
        &mut self,
        document: &SaveDocument,
        world: &mut WorldContext,
    ) -> LoadReport {
        let mut report = LoadReport::default();

        if let Some(world_state) = &document.world_state {
            world.world = world_state.clone();
            report.world_restored = true;
        }
        if let Some(player_stats) = &document.player_stats {
            world.player = player_stats.clone();
            report.player_restored = true;
        }
        if let Some(extras) = &document.extras {
            world.extras = extras.clone();
            report.extras_restored = true;
        }

        for entry in &mut self.entries {
            let name = entry.plugin.name().to_owned();
            let Some(state) = document.system(&name) else {
                debug!(system = %name, "no saved state; keeping defaults");
                report.missing.push(name);
                continue;
            };

            let mut ctx = SystemContext::new(&mut self.controller, world);
            let result = entry.plugin.load_state(state, &mut ctx);
            let dropped = ctx.into_emitted().len();
            if dropped > 0 {
                warn!(system = %name, dropped, "events emitted during load were dropped");
            }

            match result {
                Ok(()) => {
                    debug!(system = %name, "state restored");
                    report.restored.push(name);
                }
                Err(source) => {
                    error!(system = %name, error = %source, "failed to load state");
                    report.failed.push((name, source));
                }
            }
        }

        report.skipped = document
            .systems
            .keys()
            .filter(|name| !self.index.contains_key(name.as_str()))
            .cloned()
            .collect();
        for name in &report.skipped {
            debug!(system = %name, "saved state for unregistered system skipped");
        }

        info!(
            restored = report.restored.len(),
            missing = report.missing.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "systems loaded"
        );
        report
    }

    /// Decode a JSON save document and load it. Only a malformed document
    /// fails outright; per-plugin problems land in the report.
    pub fn load_from_json(
        &mut self,
        json: &str,
        world: &mut WorldContext,
    ) -> Result<LoadReport, SaveError> {
        let document = SaveDocument::from_json_str(json)?;
        Ok(self.load_all_systems(&document, world))
    }

    /// The first registered plugin keeping a bounty ledger.
    pub fn bounty_ledger(&self) -> Option<&dyn BountyLedger> {
        self.entries.iter().find_map(|entry| entry.plugin.bounty_ledger())
    }

    /// The first registered plugin tracking vital signs.
    pub fn vital_signs(&self) -> Option<&dyn VitalSigns> {
        self.entries.iter().find_map(|entry| entry.plugin.vital_signs())
    }

    /// The first registered plugin keeping a treasury.
    pub fn treasury(&self) -> Option<&dyn Treasury> {
        self.entries.iter().find_map(|entry| entry.plugin.treasury())
    }

    /// The first registered plugin keeping faction standings.
    pub fn standings(&self) -> Option<&dyn StandingRegistry> {
        self.entries.iter().find_map(|entry| entry.plugin.standings())
    }

    /// The first registered plugin reporting weather.
    pub fn weather_report(&self) -> Option<&dyn WeatherReport> {
        self.entries.iter().find_map(|entry| entry.plugin.weather_report())
    }

    fn entry(&self, name: &str) -> Option<&Entry> {
        self.index
            .get(name)
            .and_then(|&position| self.entries.get(position))
    }

    fn position(&self, name: &str) -> Result<usize, OrchestratorError> {
        self.index.get(name).copied().ok_or_else(|| {
            warn!(system = name, "unknown plugin");
            OrchestratorError::UnknownPlugin {
                system: name.to_owned(),
            }
        })
    }
}

impl core::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Orchestrator")
            .field(
                "plugins",
                &self
                    .entries
                    .iter()
                    .map(|entry| (entry.plugin.name(), entry.lifecycle))
                    .collect::<Vec<_>>(),
            )
            .field("controller", &self.controller)
            .field("max_depth", &self.max_depth)
            .finish()
    }
}
