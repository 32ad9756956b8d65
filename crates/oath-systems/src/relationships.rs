//! Relationships: the player's affinity with individual NPCs.
//!
//! Affinity runs from -100 to 100 and is only ever changed by a
//! [`GameEvent::RelationshipChanged`] reaching this system, the same way
//! gold only moves through the economy. Conversation, gifts, favors, and
//! betrayals emit that event; so does the daily decay of relationships the
//! player stops tending. Other systems may emit it too.
//!
//! An NPC's temperament scales the losses it takes: vengeful NPCs feel a
//! slight half again as much, merciful ones half as much.

use std::collections::BTreeMap;

use oath_core::config::{RelationshipConfig, Temperament};
use oath_core::plugin::decode_state;
use oath_core::{
    Action, PluginError, SystemContext, SystemPlugin, TransitionOutcome, WorldContext,
};
use oath_types::{GameEvent, TransitionInput};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::node_name;

/// Registry name of the relationships system.
pub const SYSTEM: &str = "relationships";

/// Lowest affinity.
pub const MIN_AFFINITY: i32 = -100;

/// Highest affinity.
pub const MAX_AFFINITY: i32 = 100;

/// Largest importance or severity a favor or betrayal may carry.
const MAX_WEIGHT: i64 = 10;

const IDLE: &str = "idle";
const CONVERSING: &str = "conversing";

/// Name of the relationship an affinity amounts to, from `"enemy"` to
/// `"close_friend"`.
pub fn standing(affinity: i32) -> &'static str {
    match affinity {
        i32::MIN..=-60 => "enemy",
        -59..=-20 => "rival",
        -19..=19 => "acquaintance",
        20..=59 => "friend",
        _ => "close_friend",
    }
}

/// The durable state of the relationships system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Bonds {
    /// Affinity per NPC.
    pub affinity: BTreeMap<String, i32>,
    /// Day each NPC last received a gift.
    pub last_gift_day: BTreeMap<String, u32>,
    /// The NPC the player is talking to, if any.
    pub partner: Option<String>,
}

/// Tracks how every known NPC feels about the player.
#[derive(Debug, Clone)]
pub struct RelationshipSystem {
    config: RelationshipConfig,
    bonds: Bonds,
}

impl RelationshipSystem {
    /// Create a relationships system that knows the configured NPCs.
    pub fn new(config: &RelationshipConfig) -> Self {
        let affinity = config
            .npcs
            .iter()
            .map(|(npc, profile)| {
                (npc.clone(), profile.affinity.clamp(MIN_AFFINITY, MAX_AFFINITY))
            })
            .collect();
        Self {
            config: config.clone(),
            bonds: Bonds {
                affinity,
                ..Bonds::default()
            },
        }
    }

    /// The full bonds record.
    pub const fn bonds(&self) -> &Bonds {
        &self.bonds
    }

    /// Affinity with `npc`, zero for strangers.
    pub fn affinity(&self, npc: &str) -> i32 {
        self.bonds.affinity.get(npc).copied().unwrap_or(0)
    }

    /// Change affinity with `npc`, meeting them first if needed. Returns the
    /// new affinity.
    pub fn change_affinity(&mut self, npc: &str, delta: i32) -> i32 {
        let entry = self.bonds.affinity.entry(npc.to_owned()).or_insert(0);
        *entry = entry
            .saturating_add(delta)
            .clamp(MIN_AFFINITY, MAX_AFFINITY);
        *entry
    }

    /// Scale a loss by the temperament of `npc`. Gains pass through.
    pub fn temper(&self, npc: &str, delta: i32) -> i32 {
        if delta >= 0 {
            return delta;
        }
        let temperament = self
            .config
            .npcs
            .get(npc)
            .map(|profile| profile.temperament)
            .unwrap_or_default();
        match temperament {
            Temperament::Even => delta,
            Temperament::Vengeful => delta.saturating_add(delta.checked_div(2).unwrap_or(0)),
            Temperament::Merciful => delta.checked_div(2).unwrap_or(0).min(-1),
        }
    }

    /// Affinity change for raising `topic` with `npc`, before temperament.
    fn topic_delta(&self, npc: &str, topic: &str) -> i32 {
        let profile = self.config.npcs.get(npc);
        let mentions = |topics: &[String]| topics.iter().any(|known| known == topic);
        if profile.is_some_and(|profile| mentions(profile.liked_topics.as_slice())) {
            self.config.liked_topic_bonus
        } else if profile.is_some_and(|profile| mentions(profile.taboo_topics.as_slice())) {
            self.config.taboo_topic_penalty.saturating_neg()
        } else {
            self.config.talk_bonus
        }
    }

    /// Affinity a gift of `gold` earns: at least one point.
    fn gift_delta(&self, gold: i64) -> i32 {
        let points = gold
            .checked_div(self.config.gold_per_affinity.max(1))
            .unwrap_or(0);
        i32::try_from(points)
            .unwrap_or(MAX_AFFINITY)
            .clamp(1, MAX_AFFINITY)
    }

    /// Decay every relationship that is warm but not close. Returns the
    /// change owed by each NPC.
    pub fn decay(&self) -> Vec<(String, i32)> {
        let step = self.config.daily_decay.max(0);
        self.bonds
            .affinity
            .iter()
            .filter(|(_, affinity)| **affinity > 0 && **affinity <= self.config.close_threshold)
            .filter_map(|(npc, affinity)| {
                let loss = step.min(*affinity);
                (loss > 0).then(|| (npc.clone(), loss.saturating_neg()))
            })
            .collect()
    }

    fn known_npc(&self, input: &TransitionInput) -> Result<String, PluginError> {
        let npc = input.text("npc").ok_or_else(|| PluginError::MissingField {
            field: "npc".to_owned(),
        })?;
        if !self.bonds.affinity.contains_key(npc) {
            return Err(PluginError::rejected(format!("no one called {npc} is known")));
        }
        Ok(npc.to_owned())
    }

    fn weight(input: &TransitionInput, field: &str) -> Result<i32, PluginError> {
        input
            .int(field)
            .filter(|value| (1..=MAX_WEIGHT).contains(value))
            .and_then(|value| i32::try_from(value).ok())
            .ok_or_else(|| PluginError::InvalidField {
                field: field.to_owned(),
                reason: format!("must be a whole number from 1 to {MAX_WEIGHT}"),
            })
    }

    fn gift(
        &mut self,
        input: &TransitionInput,
        ctx: &mut SystemContext<'_>,
    ) -> Result<(), PluginError> {
        let npc = self.known_npc(input)?;
        let gold = input
            .int("gold")
            .filter(|gold| *gold > 0)
            .ok_or_else(|| PluginError::InvalidField {
                field: "gold".to_owned(),
                reason: "a gift must be a positive amount".to_owned(),
            })?;
        if gold > ctx.world.economy.gold {
            return Err(PluginError::rejected(format!(
                "cannot give {gold} gold, only {} on hand",
                ctx.world.economy.gold
            )));
        }
        let today = ctx.world.world.days_passed;
        if let Some(last) = self.bonds.last_gift_day.get(&npc)
            && today.saturating_sub(*last) < self.config.gift_cooldown_days
        {
            return Err(PluginError::rejected(format!(
                "{npc} already received a gift on day {last}"
            )));
        }
        self.bonds.last_gift_day.insert(npc.clone(), today);
        let delta = self.gift_delta(gold);
        info!(npc = %npc, gold, delta, "gift given");
        ctx.emit(GameEvent::TransactionCompleted {
            item: "gift".to_owned(),
            gold_delta: gold.saturating_neg(),
        });
        ctx.emit(GameEvent::RelationshipChanged { npc, delta });
        Ok(())
    }

    fn mirror(&self, world: &mut WorldContext) {
        world.relationships.npc_relationships = self.bonds.affinity.clone();
    }

    fn node(status: &str) -> String {
        node_name(SYSTEM, status)
    }

    const fn status(&self) -> &'static str {
        if self.bonds.partner.is_some() {
            CONVERSING
        } else {
            IDLE
        }
    }

    /// Feed `input` to the automaton and drop the partner once the
    /// conversation is over.
    fn advance(
        &mut self,
        input: &TransitionInput,
        ctx: &mut SystemContext<'_>,
    ) -> Result<TransitionOutcome, PluginError> {
        let outcome = ctx.process_input(SYSTEM, input)?;
        if ctx.controller.current_node_name(SYSTEM) != Some(Self::node(CONVERSING).as_str()) {
            self.bonds.partner = None;
        }
        Ok(outcome)
    }
}

impl SystemPlugin for RelationshipSystem {
    fn name(&self) -> &str {
        SYSTEM
    }

    fn description(&self) -> &str {
        "Affinity with individual NPCs"
    }

    fn initialize(&mut self, ctx: &mut SystemContext<'_>) -> Result<(), PluginError> {
        for (npc, affinity) in &ctx.world.relationships.npc_relationships {
            self.bonds
                .affinity
                .entry(npc.clone())
                .or_insert_with(|| (*affinity).clamp(MIN_AFFINITY, MAX_AFFINITY));
        }

        let idle = ctx.controller.create_node(Self::node(IDLE))?;
        let conversing = ctx.controller.create_node(Self::node(CONVERSING))?;

        let c = &mut *ctx.controller;
        c.add_transition(idle, |i| i.is("greet"), conversing, "start a conversation")?;
        c.add_transition(conversing, |i| i.is("talk"), conversing, "talk")?;
        c.add_transition(conversing, |i| i.is("farewell"), idle, "end the conversation")?;

        if let Some(node) = c.node_mut(idle) {
            for npc in self.bonds.affinity.keys() {
                let input = TransitionInput::new("greet").with("npc", npc.as_str());
                node.add_action(Action::fixed(
                    format!("greet_{npc}"),
                    format!("Talk to {npc}"),
                    input,
                ));
            }
        }
        if let Some(node) = c.node_mut(conversing) {
            node.add_action(Action::fixed(
                "small_talk",
                "Talk about the weather",
                TransitionInput::new("talk").with("topic", "weather"),
            ));
            node.add_action(Action::fixed(
                "farewell",
                "Say goodbye",
                TransitionInput::new("farewell"),
            ));
        }
        c.set_system_root(SYSTEM, idle)?;
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
            "greet" => {
                if let Some(partner) = &self.bonds.partner {
                    return Err(PluginError::rejected(format!(
                        "already talking to {partner}"
                    )));
                }
                let npc = self.known_npc(input)?;
                let outcome = self.advance(input, ctx)?;
                if outcome.changed {
                    debug!(npc = %npc, "conversation started");
                    self.bonds.partner = Some(npc);
                }
                Ok(outcome)
            }
            "talk" => {
                let npc = self
                    .bonds
                    .partner
                    .clone()
                    .ok_or_else(|| PluginError::rejected("not talking to anyone"))?;
                let topic = input.text("topic").ok_or_else(|| PluginError::MissingField {
                    field: "topic".to_owned(),
                })?;
                let delta = self.temper(&npc, self.topic_delta(&npc, topic));
                debug!(npc = %npc, topic, delta, "topic raised");
                ctx.emit(GameEvent::RelationshipChanged { npc, delta });
                self.advance(input, ctx)
            }
            "gift" => {
                self.gift(input, ctx)?;
                self.advance(input, ctx)
            }
            "help" => {
                let npc = self.known_npc(input)?;
                let importance = Self::weight(input, "importance")?;
                let delta = importance.saturating_mul(self.config.favor_multiplier);
                info!(npc = %npc, importance, delta, "favor done");
                ctx.emit(GameEvent::RelationshipChanged { npc, delta });
                self.advance(input, ctx)
            }
            "betray" => {
                let npc = self.known_npc(input)?;
                let severity = Self::weight(input, "severity")?;
                let loss = severity.saturating_mul(self.config.betrayal_multiplier);
                let delta = self.temper(&npc, loss.saturating_neg());
                info!(npc = %npc, severity, delta, "betrayal");
                ctx.emit(GameEvent::RelationshipChanged { npc, delta });
                self.advance(input, ctx)
            }
            _ => self.advance(input, ctx),
        }
    }

    fn save_state(&self) -> Value {
        serde_json::to_value(&self.bonds).unwrap_or_else(|err| {
            error!(error = %err, "failed to encode bonds");
            Value::Null
        })
    }

    fn load_state(&mut self, state: &Value, ctx: &mut SystemContext<'_>) -> Result<(), PluginError> {
        let mut bonds: Bonds = decode_state(state)?;
        if let Some((npc, value)) = bonds
            .affinity
            .iter()
            .find(|(_, value)| !(MIN_AFFINITY..=MAX_AFFINITY).contains(*value))
        {
            return Err(PluginError::InvalidField {
                field: npc.clone(),
                reason: format!("{value} is outside -100..=100"),
            });
        }
        if let Some(partner) = &bonds.partner
            && !bonds.affinity.contains_key(partner)
        {
            return Err(PluginError::InvalidField {
                field: "partner".to_owned(),
                reason: format!("{partner} has no recorded affinity"),
            });
        }
        // NPCs added to the config since the save start from their profile.
        for (npc, profile) in &self.config.npcs {
            bonds
                .affinity
                .entry(npc.clone())
                .or_insert_with(|| profile.affinity.clamp(MIN_AFFINITY, MAX_AFFINITY));
        }

        let previous = std::mem::replace(&mut self.bonds, bonds);
        if let Err(err) = ctx.controller.restore_current(SYSTEM, &Self::node(self.status())) {
            self.bonds = previous;
            return Err(err.into());
        }
        self.mirror(ctx.world);
        Ok(())
    }

    fn handle_event(&mut self, event: &GameEvent, ctx: &mut SystemContext<'_>) -> bool {
        match event {
            GameEvent::RelationshipChanged { npc, delta } => {
                let before = standing(self.affinity(npc));
                let after = self.change_affinity(npc, *delta);
                if standing(after) != before {
                    info!(
                        npc = %npc,
                        affinity = after,
                        standing = standing(after),
                        "relationship changed"
                    );
                }
                self.mirror(ctx.world);
                true
            }
            GameEvent::DayPassed { day } => {
                let decays = self.decay();
                debug!(day, fading = decays.len(), "relationships decay");
                let any = !decays.is_empty();
                for (npc, delta) in decays {
                    ctx.emit(GameEvent::RelationshipChanged { npc, delta });
                }
                any
            }
            _ => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use oath_core::AutomatonController;

    use super::*;

    fn setup() -> (RelationshipSystem, AutomatonController, WorldContext) {
        let mut relationships = RelationshipSystem::new(&RelationshipConfig::default());
        let mut controller = AutomatonController::new();
        let mut world = WorldContext::new();
        world.economy.gold = 500;
        let mut ctx = SystemContext::new(&mut controller, &mut world);
        relationships.initialize(&mut ctx).unwrap();
        drop(ctx);
        (relationships, controller, world)
    }

    /// Hand every emitted relationship change back to the system, the way
    /// the orchestrator would.
    fn deliver(relationships: &mut RelationshipSystem, ctx: &mut SystemContext<'_>) {
        let emitted = ctx.emitted().to_vec();
        for event in &emitted {
            relationships.handle_event(event, ctx);
        }
    }

    #[test]
    fn standings_cover_the_range() {
        assert_eq!(standing(-100), "enemy");
        assert_eq!(standing(-30), "rival");
        assert_eq!(standing(0), "acquaintance");
        assert_eq!(standing(45), "friend");
        assert_eq!(standing(100), "close_friend");
    }

    #[test]
    fn configured_npcs_are_mirrored_on_start() {
        let (relationships, controller, world) = setup();
        assert_eq!(relationships.affinity("mira"), 10);
        assert_eq!(relationships.affinity("stranger"), 0);
        assert_eq!(world.relationships.npc_relationships.get("elin"), Some(&5));
        assert_eq!(controller.current_node_name(SYSTEM), Some("relationships.idle"));
    }

    #[test]
    fn temperament_scales_losses_only() {
        let (relationships, _, _) = setup();
        assert_eq!(relationships.temper("aldric", -10), -15);
        assert_eq!(relationships.temper("elin", -10), -5);
        assert_eq!(relationships.temper("elin", -1), -1);
        assert_eq!(relationships.temper("mira", -10), -10);
        assert_eq!(relationships.temper("aldric", 10), 10);
    }

    #[test]
    fn conversation_moves_affinity_by_topic() {
        let (mut relationships, mut controller, mut world) = setup();
        let mut ctx = SystemContext::new(&mut controller, &mut world);
        let talk = |topic: &str| TransitionInput::new("talk").with("topic", topic);
        assert!(relationships.handle_input(&talk("ale"), &mut ctx).is_err());

        let greet = TransitionInput::new("greet").with("npc", "aldric");
        relationships.handle_input(&greet, &mut ctx).unwrap();
        assert_eq!(relationships.bonds().partner.as_deref(), Some("aldric"));
        assert!(relationships.handle_input(&greet, &mut ctx).is_err());

        relationships.handle_input(&talk("swords"), &mut ctx).unwrap();
        relationships.handle_input(&talk("thieves"), &mut ctx).unwrap();
        relationships.handle_input(&talk("weather"), &mut ctx).unwrap();
        assert_eq!(
            ctx.emitted(),
            &[
                GameEvent::RelationshipChanged { npc: "aldric".into(), delta: 3 },
                GameEvent::RelationshipChanged { npc: "aldric".into(), delta: -7 },
                GameEvent::RelationshipChanged { npc: "aldric".into(), delta: 1 },
            ]
        );
        deliver(&mut relationships, &mut ctx);
        relationships
            .handle_input(&TransitionInput::new("farewell"), &mut ctx)
            .unwrap();
        drop(ctx);
        assert_eq!(relationships.affinity("aldric"), -3);
        assert_eq!(world.relationships.npc_relationships.get("aldric"), Some(&-3));
        assert_eq!(relationships.bonds().partner, None);
        assert_eq!(controller.current_node_name(SYSTEM), Some("relationships.idle"));
    }

    #[test]
    fn strangers_cannot_be_greeted() {
        let (mut relationships, mut controller, mut world) = setup();
        let mut ctx = SystemContext::new(&mut controller, &mut world);
        let greet = TransitionInput::new("greet").with("npc", "nobody");
        let err = relationships.handle_input(&greet, &mut ctx).unwrap_err();
        assert!(matches!(err, PluginError::Rejected { .. }));
        assert_eq!(relationships.bonds().partner, None);
    }

    #[test]
    fn gifts_cost_gold_and_respect_the_cooldown() {
        let (mut relationships, mut controller, mut world) = setup();
        world.world.days_passed = 4;
        let mut ctx = SystemContext::new(&mut controller, &mut world);
        let gift = |gold: i64| {
            TransitionInput::new("gift")
                .with("npc", "mira")
                .with("gold", gold)
        };
        assert!(relationships.handle_input(&gift(900), &mut ctx).is_err());
        relationships.handle_input(&gift(55), &mut ctx).unwrap();
        assert_eq!(
            ctx.emitted(),
            &[
                GameEvent::TransactionCompleted { item: "gift".into(), gold_delta: -55 },
                GameEvent::RelationshipChanged { npc: "mira".into(), delta: 5 },
            ]
        );
        assert!(relationships.handle_input(&gift(5), &mut ctx).is_err());
        drop(ctx);

        world.world.days_passed = 5;
        let mut ctx = SystemContext::new(&mut controller, &mut world);
        relationships.handle_input(&gift(5), &mut ctx).unwrap();
        assert_eq!(
            ctx.emitted().last(),
            Some(&GameEvent::RelationshipChanged { npc: "mira".into(), delta: 1 })
        );
        assert_eq!(relationships.bonds().last_gift_day.get("mira"), Some(&5));
    }

    #[test]
    fn favors_and_betrayals_are_weighted() {
        let (mut relationships, mut controller, mut world) = setup();
        let mut ctx = SystemContext::new(&mut controller, &mut world);
        let help = TransitionInput::new("help")
            .with("npc", "elin")
            .with("importance", 4_i64);
        let betray = TransitionInput::new("betray")
            .with("npc", "elin")
            .with("severity", 6_i64);
        let reckless = TransitionInput::new("betray")
            .with("npc", "elin")
            .with("severity", 40_i64);
        relationships.handle_input(&help, &mut ctx).unwrap();
        relationships.handle_input(&betray, &mut ctx).unwrap();
        assert!(relationships.handle_input(&reckless, &mut ctx).is_err());
        assert_eq!(
            ctx.emitted(),
            &[
                GameEvent::RelationshipChanged { npc: "elin".into(), delta: 8 },
                GameEvent::RelationshipChanged { npc: "elin".into(), delta: -9 },
            ]
        );
    }

    #[test]
    fn changes_from_other_systems_meet_new_npcs() {
        let (mut relationships, mut controller, mut world) = setup();
        let mut ctx = SystemContext::new(&mut controller, &mut world);
        let event = GameEvent::RelationshipChanged {
            npc: "bram".into(),
            delta: 250,
        };
        assert!(relationships.handle_event(&event, &mut ctx));
        drop(ctx);
        assert_eq!(relationships.affinity("bram"), MAX_AFFINITY);
        assert_eq!(world.relationships.npc_relationships.get("bram"), Some(&100));
    }

    #[test]
    fn warm_relationships_fade_but_close_ones_hold() {
        let (mut relationships, mut controller, mut world) = setup();
        relationships.change_affinity("aldric", -20);
        relationships.change_affinity("bram", 80);
        let mut ctx = SystemContext::new(&mut controller, &mut world);
        assert!(relationships.handle_event(&GameEvent::DayPassed { day: 1 }, &mut ctx));
        assert_eq!(
            ctx.emitted(),
            &[
                GameEvent::RelationshipChanged { npc: "elin".into(), delta: -1 },
                GameEvent::RelationshipChanged { npc: "mira".into(), delta: -1 },
            ]
        );
        deliver(&mut relationships, &mut ctx);
        assert_eq!(relationships.affinity("mira"), 9);
        assert_eq!(relationships.affinity("aldric"), -20);
        assert_eq!(relationships.affinity("bram"), 80);
    }

    #[test]
    fn an_open_conversation_survives_save_and_load() {
        let (mut relationships, mut controller, mut world) = setup();
        let mut ctx = SystemContext::new(&mut controller, &mut world);
        relationships
            .handle_input(&TransitionInput::new("greet").with("npc", "mira"), &mut ctx)
            .unwrap();
        drop(ctx);
        let saved = relationships.save_state();

        let (mut fresh, mut controller, mut world) = setup();
        let mut ctx = SystemContext::new(&mut controller, &mut world);
        fresh.load_state(&saved, &mut ctx).unwrap();
        fresh
            .handle_input(&TransitionInput::new("talk").with("topic", "travel"), &mut ctx)
            .unwrap();
        assert_eq!(
            ctx.emitted(),
            &[GameEvent::RelationshipChanged { npc: "mira".into(), delta: 3 }]
        );
        drop(ctx);
        assert_eq!(fresh.bonds(), relationships.bonds());
        assert_eq!(controller.current_node_name(SYSTEM), Some("relationships.conversing"));
    }

    #[test]
    fn load_rejects_bad_bonds_and_keeps_the_old_ones() {
        let (mut relationships, mut controller, mut world) = setup();
        let mut ctx = SystemContext::new(&mut controller, &mut world);
        let out_of_range = serde_json::json!({ "affinity": { "mira": 300 } });
        assert!(relationships.load_state(&out_of_range, &mut ctx).is_err());
        let ghost = serde_json::json!({ "affinity": { "mira": 3 }, "partner": "ghost" });
        assert!(relationships.load_state(&ghost, &mut ctx).is_err());
        assert_eq!(relationships.affinity("mira"), 10);

        let older = serde_json::json!({ "affinity": { "mira": -40 } });
        relationships.load_state(&older, &mut ctx).unwrap();
        drop(ctx);
        assert_eq!(relationships.affinity("mira"), -40);
        assert_eq!(relationships.affinity("aldric"), 0);
        assert_eq!(world.relationships.npc_relationships.get("mira"), Some(&-40));
    }
}
