//! Health and disease.
//!
//! Each contracted disease runs for a fixed number of game hours and deals
//! damage every hour it is active; the damage doubles while the world's
//! `plague_spreading` flag is set. A disease that runs its course (or is
//! treated) leaves the player immune to it. Without active diseases the
//! player regenerates every hour.
//!
//! While the plague is spreading, each new day exposes a player without
//! plague immunity to it. Catching the plague raises the flag.

use std::collections::{BTreeMap, BTreeSet};

use oath_core::config::HealthConfig;
use oath_core::plugin::{VitalSigns, decode_state};
use oath_core::{
    Action, PluginError, SystemContext, SystemPlugin, TransitionOutcome, WorldContext,
};
use oath_types::{GameEvent, TransitionInput};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::node_name;

/// Registry name of the health system.
pub const SYSTEM: &str = "health";

/// World flag that marks an ongoing plague.
pub const PLAGUE_FLAG: &str = "plague_spreading";

/// Disease name used for plague exposure.
pub const PLAGUE: &str = "plague";

const HEALTHY: &str = "healthy";
const SICK: &str = "sick";
const RECOVERING: &str = "recovering";

/// Longest rest accepted by a single `rest` input.
const MAX_REST_HOURS: i64 = 24;

/// The durable state of the health system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Vitals {
    /// Current health points.
    pub current: i32,
    /// Maximum health points.
    pub max: i32,
    /// Active diseases and the hours each has left to run.
    pub diseases: BTreeMap<String, u32>,
    /// Diseases the player can no longer catch.
    pub immunities: BTreeSet<String>,
    /// Whether the player is still getting over an illness.
    pub recovering: bool,
}

impl Default for Vitals {
    fn default() -> Self {
        Self {
            current: 100,
            max: 100,
            diseases: BTreeMap::new(),
            immunities: BTreeSet::new(),
            recovering: false,
        }
    }
}

/// What one game hour did to the player.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HourReport {
    /// Applied health change.
    pub delta: i32,
    /// Diseases that ran their course this hour.
    pub recovered: Vec<String>,
}

/// Tracks player health and disease.
#[derive(Debug, Clone)]
pub struct HealthSystem {
    config: HealthConfig,
    vitals: Vitals,
}

impl HealthSystem {
    /// Create a health system at full health.
    pub fn new(config: &HealthConfig) -> Self {
        let max = config.max_health.max(1);
        Self {
            config: config.clone(),
            vitals: Vitals {
                current: max,
                max,
                ..Vitals::default()
            },
        }
    }

    /// The full vitals record.
    pub const fn vitals(&self) -> &Vitals {
        &self.vitals
    }

    /// Whether `disease` is active.
    pub fn has_disease(&self, disease: &str) -> bool {
        self.vitals.diseases.contains_key(disease)
    }

    /// Whether the player is immune to `disease`.
    pub fn is_immune(&self, disease: &str) -> bool {
        self.vitals.immunities.contains(disease)
    }

    /// Apply a signed health change, clamped to `0..=max`. Returns the
    /// applied change.
    pub fn adjust(&mut self, delta: i32) -> i32 {
        let before = self.vitals.current;
        self.vitals.current = before.saturating_add(delta).clamp(0, self.vitals.max);
        self.vitals.current.saturating_sub(before)
    }

    /// Catch `disease`. Returns `false` when it is already active or the
    /// player is immune.
    pub fn contract(&mut self, disease: &str) -> bool {
        if self.has_disease(disease) || self.is_immune(disease) {
            return false;
        }
        self.vitals
            .diseases
            .insert(disease.to_owned(), self.config.disease_duration_hours.max(1));
        true
    }

    /// End `disease` and grant immunity to it. Returns `false` when it was
    /// not active.
    pub fn cure(&mut self, disease: &str) -> bool {
        if self.vitals.diseases.remove(disease).is_none() {
            return false;
        }
        self.vitals.immunities.insert(disease.to_owned());
        true
    }

    /// Advance one game hour.
    pub fn pass_hour(&mut self, plague_spreading: bool) -> HourReport {
        if self.vitals.diseases.is_empty() {
            let delta = self.adjust(self.config.regen_per_hour);
            return HourReport {
                delta,
                recovered: Vec::new(),
            };
        }

        let per_disease = if plague_spreading {
            self.config.disease_damage_per_hour.saturating_mul(2)
        } else {
            self.config.disease_damage_per_hour
        };
        let count = i32::try_from(self.vitals.diseases.len()).unwrap_or(i32::MAX);
        let delta = self.adjust(per_disease.saturating_mul(count).saturating_neg());

        let mut recovered = Vec::new();
        for (disease, hours) in &mut self.vitals.diseases {
            *hours = hours.saturating_sub(1);
            if *hours == 0 {
                recovered.push(disease.clone());
            }
        }
        for disease in &recovered {
            self.cure(disease);
        }
        HourReport { delta, recovered }
    }

    /// Rest for `hours`, healing at twice the regeneration rate.
    pub fn rest(&mut self, hours: u32) -> i32 {
        let hours = i32::try_from(hours).unwrap_or(i32::MAX);
        self.adjust(
            self.config
                .regen_per_hour
                .saturating_mul(2)
                .saturating_mul(hours),
        )
    }

    fn mirror(&self, world: &mut WorldContext) {
        world.health.current = self.vitals.current;
        world.health.max = self.vitals.max;
        world.health.diseases = self.vitals.diseases.keys().cloned().collect();
    }

    fn node(status: &str) -> String {
        node_name(SYSTEM, status)
    }

    /// The status node the vitals imply, given where the automaton is now.
    fn desired_status(&self, current: Option<&str>) -> &'static str {
        if !self.vitals.diseases.is_empty() {
            return SICK;
        }
        let was_ill = current.is_some_and(|node| node != Self::node(HEALTHY));
        if was_ill && self.vitals.current < self.vitals.max {
            RECOVERING
        } else {
            HEALTHY
        }
    }

    /// Record whether the automaton sits in `recovering`, so a save puts it
    /// back there.
    fn remember_status(&mut self, ctx: &SystemContext<'_>) {
        self.vitals.recovering =
            ctx.controller.current_node_name(SYSTEM) == Some(Self::node(RECOVERING).as_str());
    }

    fn sync(&mut self, ctx: &mut SystemContext<'_>) -> Result<TransitionOutcome, PluginError> {
        self.mirror(ctx.world);
        let start = ctx.controller.current_node(SYSTEM);

        // sick -> healthy passes through recovering.
        for _ in 0..2 {
            let current = ctx.controller.current_node_name(SYSTEM).map(str::to_owned);
            let desired = Self::node(self.desired_status(current.as_deref()));
            if current.as_deref() == Some(desired.as_str()) {
                break;
            }
            let kind = if desired == Self::node(SICK) {
                "infected"
            } else if current.as_deref() == Some(Self::node(SICK).as_str()) {
                "disease_cleared"
            } else {
                "fully_healed"
            };
            ctx.process_input(SYSTEM, &TransitionInput::new(kind))?;
        }
        self.remember_status(ctx);

        let next = ctx
            .controller
            .current_node(SYSTEM)
            .ok_or_else(|| PluginError::rejected("health automaton has no current node"))?;
        let changed = start != Some(next);
        Ok(TransitionOutcome {
            handled: changed,
            next,
            changed,
        })
    }

    fn announce_change(&self, delta: i32, ctx: &mut SystemContext<'_>) {
        if delta != 0 {
            ctx.emit(GameEvent::HealthChanged {
                delta,
                current: self.vitals.current,
            });
        }
    }

    fn announce_recovery(disease: String, ctx: &mut SystemContext<'_>) {
        info!(disease = %disease, "recovered from disease");
        ctx.emit(GameEvent::DiseaseRecovered { disease });
    }
}

impl SystemPlugin for HealthSystem {
    fn name(&self) -> &str {
        SYSTEM
    }

    fn description(&self) -> &str {
        "Player health, disease, and recovery"
    }

    fn initialize(&mut self, ctx: &mut SystemContext<'_>) -> Result<(), PluginError> {
        let healthy = ctx.controller.create_node(Self::node(HEALTHY))?;
        let sick = ctx.controller.create_node(Self::node(SICK))?;
        let recovering = ctx.controller.create_node(Self::node(RECOVERING))?;

        let c = &mut *ctx.controller;
        c.add_transition(healthy, |i| i.is("infected"), sick, "fell ill")?;
        c.add_transition(sick, |i| i.is("disease_cleared"), recovering, "disease cleared")?;
        c.add_transition(recovering, |i| i.is("infected"), sick, "relapsed")?;
        c.add_transition(recovering, |i| i.is("fully_healed"), healthy, "fully healed")?;

        let rest = Action::fixed(
            "rest",
            "Rest to recover",
            TransitionInput::new("rest").with("hours", 8_i64),
        );
        for id in [healthy, sick, recovering] {
            if let Some(node) = c.node_mut(id) {
                node.add_action(rest.clone());
            }
        }
        if let Some(node) = c.node_mut(sick) {
            node.add_action(Action::fixed(
                "treat",
                "Treat your diseases",
                TransitionInput::new("treat"),
            ));
        }
        c.set_system_root(SYSTEM, healthy)?;
        self.mirror(ctx.world);
        Ok(())
    }

    fn tick(&mut self, _delta: f64, _ctx: &mut SystemContext<'_>) -> Result<(), PluginError> {
        Ok(())
    }

    fn handle_input(
        &mut self,
        input: &TransitionInput,
        ctx: &mut SystemContext<'_>,
    ) -> Result<TransitionOutcome, PluginError> {
        match input.kind.as_str() {
            "rest" => {
                let hours = input
                    .int("hours")
                    .unwrap_or(8)
                    .clamp(1, MAX_REST_HOURS);
                let hours = u32::try_from(hours).unwrap_or(1);
                let delta = self.rest(hours);
                self.announce_change(delta, ctx);
                self.sync(ctx)
            }
            "treat" => {
                let disease = match input.text("disease") {
                    Some(disease) => disease.to_owned(),
                    None => self
                        .vitals
                        .diseases
                        .keys()
                        .next()
                        .cloned()
                        .ok_or_else(|| PluginError::rejected("no disease to treat"))?,
                };
                if !self.cure(&disease) {
                    return Err(PluginError::rejected(format!("not suffering from {disease}")));
                }
                Self::announce_recovery(disease, ctx);
                self.sync(ctx)
            }
            "damage" => {
                let amount = input
                    .int("amount")
                    .and_then(|amount| i32::try_from(amount).ok())
                    .filter(|amount| *amount > 0)
                    .ok_or_else(|| PluginError::InvalidField {
                        field: "amount".to_owned(),
                        reason: "damage must be a positive whole number".to_owned(),
                    })?;
                let delta = self.adjust(amount.saturating_neg());
                if self.vitals.current == 0 {
                    warn!("player has collapsed from their injuries");
                }
                self.announce_change(delta, ctx);
                self.sync(ctx)
            }
            _ => {
                let outcome = ctx.process_input(SYSTEM, input)?;
                self.remember_status(ctx);
                Ok(outcome)
            }
        }
    }

    fn save_state(&self) -> Value {
        serde_json::to_value(&self.vitals).unwrap_or_else(|err| {
            error!(error = %err, "failed to encode vitals");
            Value::Null
        })
    }

    fn load_state(&mut self, state: &Value, ctx: &mut SystemContext<'_>) -> Result<(), PluginError> {
        let vitals: Vitals = decode_state(state)?;
        if vitals.max <= 0 {
            return Err(PluginError::InvalidField {
                field: "max".to_owned(),
                reason: format!("maximum health must be positive, got {}", vitals.max),
            });
        }
        if !(0..=vitals.max).contains(&vitals.current) {
            return Err(PluginError::InvalidField {
                field: "current".to_owned(),
                reason: format!("{} is outside 0..={}", vitals.current, vitals.max),
            });
        }

        let previous = std::mem::replace(&mut self.vitals, vitals);
        let status = if !self.vitals.diseases.is_empty() {
            SICK
        } else if self.vitals.recovering {
            RECOVERING
        } else {
            HEALTHY
        };
        if let Err(err) = ctx.controller.restore_current(SYSTEM, &Self::node(status)) {
            self.vitals = previous;
            return Err(err.into());
        }
        self.mirror(ctx.world);
        Ok(())
    }

    fn handle_event(&mut self, event: &GameEvent, ctx: &mut SystemContext<'_>) -> bool {
        let handled = match event {
            GameEvent::DiseaseContracted { disease } => {
                if !self.contract(disease) {
                    return false;
                }
                info!(disease = %disease, "disease contracted");
                if disease == PLAGUE && !ctx.world.world.has_flag(PLAGUE_FLAG) {
                    ctx.world.world.set_flag(PLAGUE_FLAG, true);
                }
                true
            }
            GameEvent::HourPassed { .. } => {
                let report = self.pass_hour(ctx.world.world.has_flag(PLAGUE_FLAG));
                self.announce_change(report.delta, ctx);
                for disease in report.recovered {
                    Self::announce_recovery(disease, ctx);
                }
                true
            }
            GameEvent::DayPassed { .. } => {
                let exposed = ctx.world.world.has_flag(PLAGUE_FLAG)
                    && !self.has_disease(PLAGUE)
                    && !self.is_immune(PLAGUE);
                if exposed {
                    ctx.emit(GameEvent::DiseaseContracted {
                        disease: PLAGUE.to_owned(),
                    });
                }
                return exposed;
            }
            _ => return false,
        };
        if let Err(err) = self.sync(ctx) {
            warn!(error = %err, "health automaton out of sync");
        }
        handled
    }

    fn vital_signs(&self) -> Option<&dyn VitalSigns> {
        Some(self)
    }
}

impl VitalSigns for HealthSystem {
    fn health(&self) -> i32 {
        self.vitals.current
    }

    fn max_health(&self) -> i32 {
        self.vitals.max
    }

    fn diseases(&self) -> Vec<String> {
        self.vitals.diseases.keys().cloned().collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use oath_core::AutomatonController;

    use super::*;

    fn setup() -> (HealthSystem, AutomatonController, WorldContext) {
        let mut health = HealthSystem::new(&HealthConfig::default());
        let mut controller = AutomatonController::new();
        let mut world = WorldContext::new();
        let mut ctx = SystemContext::new(&mut controller, &mut world);
        health.initialize(&mut ctx).unwrap();
        drop(ctx);
        (health, controller, world)
    }

    fn contracted(disease: &str) -> GameEvent {
        GameEvent::DiseaseContracted {
            disease: disease.to_owned(),
        }
    }

    #[test]
    fn adjust_clamps_to_range() {
        let mut health = HealthSystem::new(&HealthConfig::default());
        assert_eq!(health.adjust(10), 0);
        assert_eq!(health.adjust(-150), -100);
        assert_eq!(health.health(), 0);
        assert_eq!(health.adjust(30), 30);
    }

    #[test]
    fn disease_runs_its_course_and_grants_immunity() {
        let config = HealthConfig {
            disease_duration_hours: 3,
            ..HealthConfig::default()
        };
        let mut health = HealthSystem::new(&config);
        assert!(health.contract("fever"));
        assert!(!health.contract("fever"));

        assert_eq!(health.pass_hour(false).delta, -1);
        assert_eq!(health.pass_hour(true).delta, -2);
        let report = health.pass_hour(false);
        assert_eq!(report.recovered, vec!["fever".to_owned()]);
        assert_eq!(health.health(), 96);

        assert!(health.is_immune("fever"));
        assert!(!health.contract("fever"));
        // Healthy again: regeneration resumes.
        assert_eq!(health.pass_hour(false).delta, 1);
    }

    #[test]
    fn automaton_follows_illness_and_recovery() {
        let (mut health, mut controller, mut world) = setup();
        let mut ctx = SystemContext::new(&mut controller, &mut world);
        assert!(health.handle_event(&contracted("fever"), &mut ctx));
        assert_eq!(ctx.controller.current_node_name(SYSTEM), Some("health.sick"));
        assert!(ctx.world.health.diseases.contains("fever"));

        assert!(health.handle_event(&GameEvent::HourPassed { day: 0, hour: 9 }, &mut ctx));
        assert_eq!(health.health(), 99);

        let outcome = health
            .handle_input(&TransitionInput::new("treat"), &mut ctx)
            .unwrap();
        assert!(outcome.changed);
        assert_eq!(
            ctx.controller.current_node_name(SYSTEM),
            Some("health.recovering")
        );

        health.handle_event(&GameEvent::HourPassed { day: 0, hour: 10 }, &mut ctx);
        let emitted = ctx.into_emitted();
        assert_eq!(controller.current_node_name(SYSTEM), Some("health.healthy"));
        assert!(emitted.contains(&GameEvent::DiseaseRecovered {
            disease: "fever".into()
        }));
        assert!(emitted.contains(&GameEvent::HealthChanged {
            delta: 1,
            current: 100
        }));
    }

    #[test]
    fn plague_raises_the_flag_and_spreads_daily() {
        let (mut health, mut controller, mut world) = setup();
        let mut ctx = SystemContext::new(&mut controller, &mut world);
        assert!(!health.handle_event(&GameEvent::DayPassed { day: 1 }, &mut ctx));

        ctx.world.world.set_flag(PLAGUE_FLAG, true);
        assert!(health.handle_event(&GameEvent::DayPassed { day: 2 }, &mut ctx));
        assert_eq!(ctx.emitted(), &[contracted(PLAGUE)]);

        health.handle_event(&contracted(PLAGUE), &mut ctx);
        assert!(health.has_disease(PLAGUE));
        // Already sick: no further exposure.
        assert!(!health.handle_event(&GameEvent::DayPassed { day: 3 }, &mut ctx));
    }

    #[test]
    fn catching_plague_sets_world_flag() {
        let (mut health, mut controller, mut world) = setup();
        let mut ctx = SystemContext::new(&mut controller, &mut world);
        health.handle_event(&contracted(PLAGUE), &mut ctx);
        drop(ctx);
        assert!(world.world.has_flag(PLAGUE_FLAG));
    }

    #[test]
    fn damage_input_is_validated() {
        let (mut health, mut controller, mut world) = setup();
        let mut ctx = SystemContext::new(&mut controller, &mut world);
        let bad = TransitionInput::new("damage").with("amount", -5_i64);
        assert!(health.handle_input(&bad, &mut ctx).is_err());

        let hit = TransitionInput::new("damage").with("amount", 30_i64);
        health.handle_input(&hit, &mut ctx).unwrap();
        assert_eq!(ctx.world.health.current, 70);
        assert_eq!(
            ctx.emitted(),
            &[GameEvent::HealthChanged {
                delta: -30,
                current: 70
            }]
        );
    }

    #[test]
    fn save_load_round_trip() {
        let (mut health, mut controller, mut world) = setup();
        let mut ctx = SystemContext::new(&mut controller, &mut world);
        health.handle_event(&contracted("fever"), &mut ctx);
        health.adjust(-20);
        let saved = health.save_state();
        drop(ctx);

        let (mut restored, mut controller, mut world) = setup();
        let mut ctx = SystemContext::new(&mut controller, &mut world);
        restored.load_state(&saved, &mut ctx).unwrap();
        drop(ctx);
        assert_eq!(restored.vitals(), health.vitals());
        assert_eq!(controller.current_node_name(SYSTEM), Some("health.sick"));
        assert_eq!(world.health.current, 80);
    }

    #[test]
    fn injuries_without_illness_reload_as_healthy() {
        let (mut health, mut controller, mut world) = setup();
        let mut ctx = SystemContext::new(&mut controller, &mut world);
        let hit = TransitionInput::new("damage").with("amount", 30_i64);
        health.handle_input(&hit, &mut ctx).unwrap();
        drop(ctx);
        assert_eq!(controller.current_node_name(SYSTEM), Some("health.healthy"));
        let saved = health.save_state();

        let (mut restored, mut controller, mut world) = setup();
        let mut ctx = SystemContext::new(&mut controller, &mut world);
        restored.load_state(&saved, &mut ctx).unwrap();
        drop(ctx);
        assert_eq!(controller.current_node_name(SYSTEM), Some("health.healthy"));
        assert_eq!(restored.vitals(), health.vitals());
    }

    #[test]
    fn a_recovery_in_progress_reloads_as_recovering() {
        let (mut health, mut controller, mut world) = setup();
        let mut ctx = SystemContext::new(&mut controller, &mut world);
        health.handle_event(&contracted("fever"), &mut ctx);
        health.handle_event(&GameEvent::HourPassed { day: 0, hour: 9 }, &mut ctx);
        health
            .handle_input(&TransitionInput::new("treat"), &mut ctx)
            .unwrap();
        drop(ctx);
        assert!(health.vitals().recovering);
        let saved = health.save_state();

        let (mut restored, mut controller, mut world) = setup();
        let mut ctx = SystemContext::new(&mut controller, &mut world);
        restored.load_state(&saved, &mut ctx).unwrap();
        assert_eq!(
            ctx.controller.current_node_name(SYSTEM),
            Some("health.recovering")
        );
        // The next hour back at full health finishes the recovery.
        restored.handle_event(&GameEvent::HourPassed { day: 0, hour: 10 }, &mut ctx);
        drop(ctx);
        assert_eq!(controller.current_node_name(SYSTEM), Some("health.healthy"));
        assert!(!restored.vitals().recovering);
    }

    #[test]
    fn load_rejects_impossible_vitals() {
        let (mut health, mut controller, mut world) = setup();
        let mut ctx = SystemContext::new(&mut controller, &mut world);
        let err = health
            .load_state(&serde_json::json!({ "current": 150, "max": 100 }), &mut ctx)
            .unwrap_err();
        assert!(matches!(err, PluginError::InvalidField { .. }));
        assert_eq!(health.health(), 100);
    }
}
