//! The shared world context read and written by every system.
//!
//! The context is owned by the caller of the orchestrator and lent to each
//! plugin call. Well-known domains get typed sub-contexts
//! ([`HealthContext`], [`EconomyContext`], ...); anything genuinely ad hoc
//! goes into the [`WorldContext::extras`] bag of [`StateValue`]s.
//!
//! Only [`WorldState`] and [`PlayerStats`] are persisted by the orchestrator
//! itself. Sub-contexts are persisted by the system that owns them.

use std::collections::{BTreeMap, BTreeSet};

use oath_types::{Season, StateValue, TimeOfDay};
use serde::{Deserialize, Serialize};

/// Key in [`WorldState::location_states`] holding the player's region.
pub const CURRENT_REGION: &str = "current_region";

/// Key in [`WorldState::location_states`] holding the current weather.
pub const CURRENT_WEATHER: &str = "current_weather";

/// Calendar, location, faction, and flag state of the world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorldState {
    /// Days passed since the game started.
    pub days_passed: u32,
    /// The current season.
    pub current_season: Season,
    /// Hour of the day (0-23).
    pub hour: u8,
    /// Free-form per-location state, including the current region and weather.
    pub location_states: BTreeMap<String, String>,
    /// Political stance of each faction (`"neutral"`, `"hostile"`, ...).
    pub faction_states: BTreeMap<String, String>,
    /// Global story flags.
    pub world_flags: BTreeMap<String, bool>,
}

impl Default for WorldState {
    fn default() -> Self {
        let mut location_states = BTreeMap::new();
        location_states.insert(CURRENT_REGION.to_owned(), "city".to_owned());
        location_states.insert(CURRENT_WEATHER.to_owned(), "clear".to_owned());

        let faction_states = ["traders", "nobles", "thieves", "mages"]
            .into_iter()
            .map(|f| (f.to_owned(), "neutral".to_owned()))
            .collect();

        let mut world_flags = BTreeMap::new();
        world_flags.insert("war_active".to_owned(), false);
        world_flags.insert("plague_spreading".to_owned(), false);

        Self {
            days_passed: 0,
            current_season: Season::Spring,
            hour: 8,
            location_states,
            faction_states,
            world_flags,
        }
    }
}

impl WorldState {
    /// The region the player is in, or `"unknown"`.
    pub fn current_region(&self) -> &str {
        self.location_state(CURRENT_REGION).unwrap_or("unknown")
    }

    /// Look up a location state entry.
    pub fn location_state(&self, key: &str) -> Option<&str> {
        self.location_states.get(key).map(String::as_str)
    }

    /// Set a location state entry.
    pub fn set_location_state(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.location_states.insert(key.into(), value.into());
    }

    /// Look up a faction's political stance.
    pub fn faction_state(&self, faction: &str) -> Option<&str> {
        self.faction_states.get(faction).map(String::as_str)
    }

    /// Set a faction's political stance.
    pub fn set_faction_state(&mut self, faction: impl Into<String>, state: impl Into<String>) {
        self.faction_states.insert(faction.into(), state.into());
    }

    /// Whether a world flag is set. Unknown flags read as `false`.
    pub fn has_flag(&self, flag: &str) -> bool {
        self.world_flags.get(flag).copied().unwrap_or(false)
    }

    /// Set a world flag.
    pub fn set_flag(&mut self, flag: impl Into<String>, value: bool) {
        self.world_flags.insert(flag.into(), value);
    }

    /// The phase of day derived from the current hour.
    pub const fn time_of_day(&self) -> TimeOfDay {
        TimeOfDay::from_hour(self.hour)
    }
}

/// The player's attributes, skills, and reputation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerStats {
    /// Strength attribute.
    pub strength: i32,
    /// Dexterity attribute.
    pub dexterity: i32,
    /// Constitution attribute.
    pub constitution: i32,
    /// Intelligence attribute.
    pub intelligence: i32,
    /// Wisdom attribute.
    pub wisdom: i32,
    /// Charisma attribute.
    pub charisma: i32,
    /// Skill levels by name.
    pub skills: BTreeMap<String, i32>,
    /// Player reputation per faction.
    pub faction_reputation: BTreeMap<String, i32>,
    /// Temporary modifiers applied on top of attributes and skills.
    pub modifiers: BTreeMap<String, i32>,
    /// Ad-hoc numeric or boolean attributes keyed by name.
    pub attributes: BTreeMap<String, StateValue>,
}

impl Default for PlayerStats {
    fn default() -> Self {
        let skills = ["combat", "stealth", "persuasion", "survival", "magic"]
            .into_iter()
            .map(|s| (s.to_owned(), 0))
            .collect();
        Self {
            strength: 10,
            dexterity: 10,
            constitution: 10,
            intelligence: 10,
            wisdom: 10,
            charisma: 10,
            skills,
            faction_reputation: BTreeMap::new(),
            modifiers: BTreeMap::new(),
            attributes: BTreeMap::new(),
        }
    }
}

impl PlayerStats {
    /// Whether the player has `skill` at `min_level` or above.
    pub fn has_skill(&self, skill: &str, min_level: i32) -> bool {
        self.skills.get(skill).is_some_and(|lvl| *lvl >= min_level)
    }

    /// Raise (or lower, with a negative amount) a skill.
    pub fn improve_skill(&mut self, skill: &str, amount: i32) {
        let level = self.skills.entry(skill.to_owned()).or_insert(0);
        *level = level.saturating_add(amount);
    }

    /// Player reputation with a faction (0 if never met).
    pub fn faction_rep(&self, faction: &str) -> i32 {
        self.faction_reputation.get(faction).copied().unwrap_or(0)
    }

    /// Adjust reputation with a faction. Returns the new value.
    pub fn change_faction_rep(&mut self, faction: &str, amount: i32) -> i32 {
        let rep = self.faction_reputation.entry(faction.to_owned()).or_insert(0);
        *rep = rep.saturating_add(amount);
        *rep
    }

    /// Attribute or skill value with its modifier applied. Unknown names
    /// read as 0 before the modifier.
    pub fn effective_stat(&self, stat: &str) -> i32 {
        let base = match stat {
            "strength" => self.strength,
            "dexterity" => self.dexterity,
            "constitution" => self.constitution,
            "intelligence" => self.intelligence,
            "wisdom" => self.wisdom,
            "charisma" => self.charisma,
            other => self.skills.get(other).copied().unwrap_or(0),
        };
        base.saturating_add(self.modifiers.get(stat).copied().unwrap_or(0))
    }
}

/// Player health as seen by every system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthContext {
    /// Current health points.
    pub current: i32,
    /// Maximum health points.
    pub max: i32,
    /// Active diseases by name.
    pub diseases: BTreeSet<String>,
}

impl Default for HealthContext {
    fn default() -> Self {
        Self {
            current: 100,
            max: 100,
            diseases: BTreeSet::new(),
        }
    }
}

impl HealthContext {
    /// Apply a signed change, clamped to `0..=max`. Returns the applied delta.
    pub fn adjust(&mut self, delta: i32) -> i32 {
        let before = self.current;
        self.current = before.saturating_add(delta).clamp(0, self.max.max(0));
        self.current.saturating_sub(before)
    }
}

/// Player wealth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomyContext {
    /// Gold carried by the player.
    pub gold: i64,
}

impl Default for EconomyContext {
    fn default() -> Self {
        Self { gold: 1000 }
    }
}

/// Law-enforcement view of the player.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrimeContext {
    /// Outstanding bounty per region.
    pub bounty_by_region: BTreeMap<String, i64>,
    /// Regions where guards actively hunt the player.
    pub wanted_in: BTreeSet<String>,
    /// The region whose jail currently holds the player.
    pub jailed_in: Option<String>,
}

impl CrimeContext {
    /// Outstanding bounty in a region.
    pub fn bounty(&self, region: &str) -> i64 {
        self.bounty_by_region.get(region).copied().unwrap_or(0)
    }

    /// Whether the player is wanted in a region.
    pub fn is_wanted(&self, region: &str) -> bool {
        self.wanted_in.contains(region)
    }
}

/// Standing of the player within each faction's hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactionContext {
    /// Rank title per faction.
    pub standing: BTreeMap<String, String>,
}

/// Player affinity with individual NPCs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationshipContext {
    /// Affinity per NPC name.
    pub npc_relationships: BTreeMap<String, i32>,
}

/// Mutable state shared by every system.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldContext {
    /// Calendar, location, and world flags.
    pub world: WorldState,
    /// Player attributes and skills.
    pub player: PlayerStats,
    /// Health sub-context.
    pub health: HealthContext,
    /// Economy sub-context.
    pub economy: EconomyContext,
    /// Crime sub-context.
    pub crime: CrimeContext,
    /// Faction sub-context.
    pub faction: FactionContext,
    /// NPC relationship sub-context.
    pub relationships: RelationshipContext,
    /// Escape hatch for flags no typed sub-context covers.
    pub extras: BTreeMap<String, StateValue>,
}

impl WorldContext {
    /// Create a context with the documented defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// The region the player is in.
    pub fn current_region(&self) -> &str {
        self.world.current_region()
    }

    /// Look up an ad-hoc value.
    pub fn extra(&self, key: &str) -> Option<&StateValue> {
        self.extras.get(key)
    }

    /// Store an ad-hoc value, returning the previous one.
    pub fn set_extra(
        &mut self,
        key: impl Into<String>,
        value: impl Into<StateValue>,
    ) -> Option<StateValue> {
        self.extras.insert(key.into(), value.into())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn world_defaults_match_new_game() {
        let world = WorldState::default();
        assert_eq!(world.current_region(), "city");
        assert_eq!(world.location_state(CURRENT_WEATHER), Some("clear"));
        assert_eq!(world.faction_state("thieves"), Some("neutral"));
        assert!(!world.has_flag("war_active"));
        assert!(!world.has_flag("never_set"));
        assert_eq!(world.time_of_day(), TimeOfDay::Morning);
    }

    #[test]
    fn missing_world_fields_fall_back_to_defaults() {
        let world: WorldState = serde_json::from_str(r#"{"daysPassed": 12}"#).unwrap();
        assert_eq!(world.days_passed, 12);
        assert_eq!(world.current_region(), "city");
        assert_eq!(world.current_season, Season::Spring);
    }

    #[test]
    fn effective_stat_applies_modifiers() {
        let mut stats = PlayerStats::default();
        stats.modifiers.insert("strength".to_owned(), 3);
        stats.improve_skill("stealth", 4);
        stats.modifiers.insert("stealth".to_owned(), -1);

        assert_eq!(stats.effective_stat("strength"), 13);
        assert_eq!(stats.effective_stat("stealth"), 3);
        assert_eq!(stats.effective_stat("unknown"), 0);
        assert!(stats.has_skill("stealth", 4));
        assert!(!stats.has_skill("magic", 1));
    }

    #[test]
    fn faction_rep_accumulates() {
        let mut stats = PlayerStats::default();
        assert_eq!(stats.change_faction_rep("mages", 5), 5);
        assert_eq!(stats.change_faction_rep("mages", -8), -3);
        assert_eq!(stats.faction_rep("mages"), -3);
        assert_eq!(stats.faction_rep("nobles"), 0);
    }

    #[test]
    fn health_adjust_clamps() {
        let mut health = HealthContext::default();
        assert_eq!(health.adjust(-30), -30);
        assert_eq!(health.current, 70);
        assert_eq!(health.adjust(50), 30);
        assert_eq!(health.current, 100);
        assert_eq!(health.adjust(-500), -100);
        assert_eq!(health.current, 0);
    }

    #[test]
    fn extras_bag_round_trips_values() {
        let mut ctx = WorldContext::new();
        assert!(ctx.set_extra("mount", "horse").is_none());
        ctx.set_extra("mount_stamina", 40_i64);
        assert_eq!(ctx.extra("mount").and_then(StateValue::as_text), Some("horse"));
        assert_eq!(ctx.extra("mount_stamina").and_then(StateValue::as_int), Some(40));
    }
}
