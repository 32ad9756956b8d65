//! Factions: the player's standing with each faction and the politics
//! between them.
//!
//! Reputation per faction runs from -100 to 100 and earns the highest rank
//! whose threshold it meets. Crimes move it too: the thieves guild rewards
//! unseen crimes and the nobles punish witnessed ones.
//!
//! Every `political_shift_interval_days` the relations between each pair of
//! factions drift. The day of the last shift is kept in the save, so a
//! loaded game shifts on the same schedule.

use std::collections::BTreeMap;

use oath_core::config::FactionConfig;
use oath_core::plugin::{StandingRegistry, decode_state};
use oath_core::{
    Action, PluginError, SystemContext, SystemPlugin, TransitionOutcome, WorldContext,
};
use oath_types::{GameEvent, TransitionInput};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::node_name;

/// Registry name of the faction system.
pub const SYSTEM: &str = "faction";

/// Lowest reputation or relation value.
pub const MIN_STANDING: i32 = -100;

/// Highest reputation or relation value.
pub const MAX_STANDING: i32 = 100;

/// Largest relation change a single political shift makes.
const MAX_RELATION_SHIFT: i32 = 10;

const OUTSIDER: &str = "outsider";
const MEMBER: &str = "member";
const RENOWNED: &str = "renowned";
const STATUSES: [&str; 3] = [OUTSIDER, MEMBER, RENOWNED];

/// Name of the state a relation value falls into, from `"war"` to
/// `"allied"`.
pub fn relation_state(value: i32) -> &'static str {
    match value {
        i32::MIN..=-75 => "war",
        -74..=-50 => "hostile",
        -49..=-20 => "unfriendly",
        -19..=19 => "neutral",
        20..=49 => "friendly",
        50..=74 => "cordial",
        _ => "allied",
    }
}

/// Key of the relation between two factions, independent of order.
pub fn relation_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{a}:{b}")
    } else {
        format!("{b}:{a}")
    }
}

/// The durable state of the faction system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Standings {
    /// Player reputation per faction.
    pub reputation: BTreeMap<String, i32>,
    /// Rank title held in each faction.
    pub ranks: BTreeMap<String, String>,
    /// Relation value per faction pair, keyed by [`relation_key`].
    pub relations: BTreeMap<String, i32>,
    /// Day of the last political shift.
    pub last_political_shift_day: u32,
}

/// A relation whose named state changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationShift {
    /// First faction of the pair.
    pub faction: String,
    /// Second faction of the pair.
    pub other: String,
    /// New relation state.
    pub relation: &'static str,
}

/// Tracks faction reputation, ranks, and inter-faction relations.
#[derive(Debug, Clone)]
pub struct FactionSystem {
    config: FactionConfig,
    standings: Standings,
}

impl FactionSystem {
    /// Create a faction system with no known factions. Factions are picked
    /// up from the world on initialization and from reputation events.
    pub fn new(config: &FactionConfig) -> Self {
        Self {
            config: config.clone(),
            standings: Standings::default(),
        }
    }

    /// The full standings record.
    pub const fn standings_record(&self) -> &Standings {
        &self.standings
    }

    /// Relation value between two factions.
    pub fn relation(&self, a: &str, b: &str) -> i32 {
        self.standings
            .relations
            .get(&relation_key(a, b))
            .copied()
            .unwrap_or(0)
    }

    /// Index of the highest rank `reputation` qualifies for.
    fn rank_index(&self, reputation: i32) -> Option<usize> {
        self.config
            .rank_thresholds
            .iter()
            .rposition(|threshold| reputation >= threshold.min_reputation)
    }

    fn rank_index_of(&self, faction: &str) -> Option<usize> {
        let title = self.standings.ranks.get(faction)?;
        self.config
            .rank_thresholds
            .iter()
            .position(|threshold| &threshold.title == title)
    }

    /// Start tracking `faction` if it is new, with neutral relations to
    /// every known faction.
    pub fn add_faction(&mut self, faction: &str, reputation: i32) {
        if self.standings.reputation.contains_key(faction) {
            return;
        }
        let others: Vec<String> = self.standings.reputation.keys().cloned().collect();
        for other in others {
            self.standings
                .relations
                .entry(relation_key(faction, &other))
                .or_insert(0);
        }
        let reputation = reputation.clamp(MIN_STANDING, MAX_STANDING);
        self.standings
            .reputation
            .insert(faction.to_owned(), reputation);
        self.update_rank(faction, reputation);
    }

    /// Set the rank for `faction` from `reputation`, returning the index of
    /// the new rank if it rose.
    fn update_rank(&mut self, faction: &str, reputation: i32) -> Option<usize> {
        let before = self.rank_index_of(faction);
        let after = self.rank_index(reputation);
        match after.and_then(|index| self.config.rank_thresholds.get(index)) {
            Some(threshold) => {
                self.standings
                    .ranks
                    .insert(faction.to_owned(), threshold.title.clone());
            }
            None => {
                self.standings.ranks.remove(faction);
            }
        }
        (after > before).then_some(after).flatten()
    }

    /// Change reputation with `faction`. Returns the new rank title if the
    /// change earned a promotion.
    pub fn change_reputation(&mut self, faction: &str, delta: i32) -> Option<String> {
        self.add_faction(faction, 0);
        let reputation = self.standings.reputation.get(faction).copied().unwrap_or(0);
        let next = reputation
            .saturating_add(delta)
            .clamp(MIN_STANDING, MAX_STANDING);
        self.standings
            .reputation
            .insert(faction.to_owned(), next);
        let promoted = self.update_rank(faction, next)?;
        self.config
            .rank_thresholds
            .get(promoted)
            .map(|threshold| threshold.title.clone())
    }

    /// Whether a political shift is due on `day`.
    pub fn shift_due(&self, day: u32) -> bool {
        let interval = self.config.political_shift_interval_days.max(1);
        day.saturating_sub(self.standings.last_political_shift_day) >= interval
    }

    /// Drift every relation by up to [`MAX_RELATION_SHIFT`]. Returns the
    /// relations whose named state changed.
    pub fn shift_relations(&mut self, day: u32, rng: &mut impl Rng) -> Vec<RelationShift> {
        let mut shifts = Vec::new();
        for (key, value) in &mut self.standings.relations {
            let before = relation_state(*value);
            let delta = rng.random_range(MAX_RELATION_SHIFT.saturating_neg()..=MAX_RELATION_SHIFT);
            *value = value
                .saturating_add(delta)
                .clamp(MIN_STANDING, MAX_STANDING);
            let after = relation_state(*value);
            if before != after
                && let Some((faction, other)) = key.split_once(':')
            {
                shifts.push(RelationShift {
                    faction: faction.to_owned(),
                    other: other.to_owned(),
                    relation: after,
                });
            }
        }
        self.standings.last_political_shift_day = day;
        shifts
    }

    fn apply_reputation(&mut self, faction: &str, delta: i32, ctx: &mut SystemContext<'_>) {
        if let Some(rank) = self.change_reputation(faction, delta) {
            info!(faction, rank = %rank, "rank advanced");
            ctx.emit(GameEvent::RankAdvanced {
                faction: faction.to_owned(),
                rank,
            });
        }
    }

    fn mirror(&self, world: &mut WorldContext) {
        world.player.faction_reputation = self.standings.reputation.clone();
        world.faction.standing = self.standings.ranks.clone();
        for (faction, reputation) in &self.standings.reputation {
            world
                .world
                .set_faction_state(faction.as_str(), relation_state(*reputation));
        }
    }

    fn node(status: &str) -> String {
        node_name(SYSTEM, status)
    }

    fn desired_status(&self) -> &'static str {
        let top = self.config.rank_thresholds.len().checked_sub(1);
        let best = self
            .standings
            .ranks
            .keys()
            .filter_map(|faction| self.rank_index_of(faction))
            .max();
        match best {
            None => OUTSIDER,
            Some(index) if Some(index) == top => RENOWNED,
            Some(_) => MEMBER,
        }
    }

    fn sync(&self, ctx: &mut SystemContext<'_>) -> Result<TransitionOutcome, PluginError> {
        self.mirror(ctx.world);
        let input = TransitionInput::new("standing").with("status", self.desired_status());
        ctx.process_input(SYSTEM, &input).map_err(PluginError::from)
    }
}

impl SystemPlugin for FactionSystem {
    fn name(&self) -> &str {
        SYSTEM
    }

    fn description(&self) -> &str {
        "Faction reputation, ranks, and politics"
    }

    fn initialize(&mut self, ctx: &mut SystemContext<'_>) -> Result<(), PluginError> {
        let known: Vec<String> = ctx.world.world.faction_states.keys().cloned().collect();
        for faction in known {
            let reputation = ctx.world.player.faction_rep(&faction);
            self.add_faction(&faction, reputation);
        }

        let mut nodes = Vec::with_capacity(STATUSES.len());
        for status in STATUSES {
            nodes.push((status, ctx.controller.create_node(Self::node(status))?));
        }
        for &(_, from) in &nodes {
            for &(status, to) in &nodes {
                if from == to {
                    continue;
                }
                ctx.controller.add_transition(
                    from,
                    move |i| i.is("standing") && i.text("status") == Some(status),
                    to,
                    format!("standing becomes {status}"),
                )?;
            }
            if let Some(node) = ctx.controller.node_mut(from) {
                node.add_action(Action::fixed(
                    "donate",
                    "Donate gold to a faction",
                    TransitionInput::new("donate")
                        .with("faction", "traders")
                        .with("gold", 100_i64),
                ));
            }
        }

        let status = self.desired_status();
        let root = nodes
            .iter()
            .find(|(name, _)| *name == status)
            .map(|&(_, id)| id)
            .ok_or_else(|| PluginError::rejected("faction status node missing"))?;
        ctx.controller.set_system_root(SYSTEM, root)?;
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
        if !input.is("donate") {
            return ctx.process_input(SYSTEM, input).map_err(PluginError::from);
        }
        let faction = input
            .text("faction")
            .ok_or_else(|| PluginError::MissingField {
                field: "faction".to_owned(),
            })?
            .to_owned();
        let gold = input
            .int("gold")
            .filter(|gold| *gold > 0)
            .ok_or_else(|| PluginError::InvalidField {
                field: "gold".to_owned(),
                reason: "donation must be a positive amount".to_owned(),
            })?;
        if gold > ctx.world.economy.gold {
            return Err(PluginError::rejected(format!(
                "cannot donate {gold} gold, only {} on hand",
                ctx.world.economy.gold
            )));
        }
        let delta = i32::try_from(gold.checked_div(10).unwrap_or(0))
            .unwrap_or(MAX_STANDING)
            .max(1);
        info!(faction = %faction, gold, delta, "donation made");
        ctx.emit(GameEvent::TransactionCompleted {
            item: "donation".to_owned(),
            gold_delta: gold.saturating_neg(),
        });
        ctx.emit(GameEvent::ReputationChanged { faction, delta });
        self.sync(ctx)
    }

    fn save_state(&self) -> Value {
        serde_json::to_value(&self.standings).unwrap_or_else(|err| {
            error!(error = %err, "failed to encode standings");
            Value::Null
        })
    }

    fn load_state(&mut self, state: &Value, ctx: &mut SystemContext<'_>) -> Result<(), PluginError> {
        let standings: Standings = decode_state(state)?;
        let out_of_range = standings
            .reputation
            .iter()
            .chain(standings.relations.iter())
            .find(|(_, value)| !(MIN_STANDING..=MAX_STANDING).contains(*value));
        if let Some((name, value)) = out_of_range {
            return Err(PluginError::InvalidField {
                field: name.clone(),
                reason: format!("{value} is outside -100..=100"),
            });
        }

        let previous = std::mem::replace(&mut self.standings, standings);
        // Ranks follow from reputation under the current thresholds.
        let reputations: Vec<(String, i32)> = self
            .standings
            .reputation
            .iter()
            .map(|(faction, reputation)| (faction.clone(), *reputation))
            .collect();
        self.standings.ranks.clear();
        for (faction, reputation) in reputations {
            self.update_rank(&faction, reputation);
        }

        let status = Self::node(self.desired_status());
        if let Err(err) = ctx.controller.restore_current(SYSTEM, &status) {
            self.standings = previous;
            return Err(err.into());
        }
        self.mirror(ctx.world);
        Ok(())
    }

    fn handle_event(&mut self, event: &GameEvent, ctx: &mut SystemContext<'_>) -> bool {
        match event {
            GameEvent::ReputationChanged { faction, delta } => {
                self.apply_reputation(faction, *delta, ctx);
            }
            GameEvent::CrimeCommitted { witnessed, .. } => {
                if *witnessed {
                    let penalty = self.config.nobles_crime_penalty.saturating_neg();
                    self.apply_reputation("nobles", penalty, ctx);
                } else {
                    let bonus = self.config.thieves_crime_bonus;
                    self.apply_reputation("thieves", bonus, ctx);
                }
            }
            GameEvent::DayPassed { day } => {
                if !self.shift_due(*day) {
                    return false;
                }
                let seed = self.config.seed ^ u64::from(*day);
                let shifts = self.shift_relations(*day, &mut SmallRng::seed_from_u64(seed));
                debug!(day, changed = shifts.len(), "political shift");
                for shift in shifts {
                    ctx.emit(GameEvent::FactionRelationChanged {
                        faction: shift.faction,
                        other: shift.other,
                        relation: shift.relation.to_owned(),
                    });
                }
            }
            _ => return false,
        }
        if let Err(err) = self.sync(ctx) {
            warn!(error = %err, "faction automaton out of sync");
        }
        true
    }

    fn standings(&self) -> Option<&dyn StandingRegistry> {
        Some(self)
    }
}

impl StandingRegistry for FactionSystem {
    fn reputation(&self, faction: &str) -> i32 {
        self.standings.reputation.get(faction).copied().unwrap_or(0)
    }

    fn rank(&self, faction: &str) -> Option<&str> {
        self.standings.ranks.get(faction).map(String::as_str)
    }
}
