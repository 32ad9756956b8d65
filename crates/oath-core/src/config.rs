//! Configuration loading and typed config structures for the Oath simulation.
//!
//! The canonical configuration lives in `oath-config.yaml` next to the
//! engine binary. This module defines strongly-typed structs that mirror the
//! YAML structure, and provides a loader that reads and validates the file.
//! Every field has a default, so an empty file is a valid configuration.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level simulation configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct OathConfig {
    /// Event bus settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Calendar and time-of-day settings.
    #[serde(default)]
    pub calendar: CalendarConfig,

    /// Weather generation settings.
    #[serde(default)]
    pub weather: WeatherConfig,

    /// Crime and law tunables.
    #[serde(default)]
    pub crime: CrimeConfig,

    /// Health and disease tunables.
    #[serde(default)]
    pub health: HealthConfig,

    /// Economy tunables.
    #[serde(default)]
    pub economy: EconomyConfig,

    /// Faction tunables.
    #[serde(default)]
    pub faction: FactionConfig,

    /// NPC relationship tunables.
    #[serde(default)]
    pub relationships: RelationshipConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Save file settings.
    #[serde(default)]
    pub save: SaveConfig,

    /// Engine driver loop settings.
    #[serde(default)]
    pub engine: EngineConfig,
}

impl OathConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// The `OATH_SAVE_PATH` environment variable overrides `save.path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.save.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }
}

/// Event bus configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DispatchConfig {
    /// Maximum nesting of dispatches before the bus refuses with
    /// `DepthExceeded`. A top-level dispatch runs at depth 1.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
        }
    }
}

/// Calendar configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CalendarConfig {
    /// Real seconds of tick delta per in-game hour.
    #[serde(default = "default_seconds_per_hour")]
    pub seconds_per_hour: f64,

    /// Number of days in one season.
    #[serde(default = "default_days_per_season")]
    pub days_per_season: u32,

    /// Ordered list of season names forming the annual cycle.
    #[serde(default = "default_seasons")]
    pub seasons: Vec<String>,

    /// Hour of day a new game starts at.
    #[serde(default = "default_starting_hour")]
    pub starting_hour: u8,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            seconds_per_hour: default_seconds_per_hour(),
            days_per_season: default_days_per_season(),
            seasons: default_seasons(),
            starting_hour: default_starting_hour(),
        }
    }
}

/// Weather configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WeatherConfig {
    /// Seed for the deterministic weather roll.
    #[serde(default = "default_weather_seed")]
    pub seed: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            seed: default_weather_seed(),
        }
    }
}

/// Crime and law configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CrimeConfig {
    /// Witnessed crimes above this severity make the player wanted.
    #[serde(default = "default_wanted_threshold")]
    pub wanted_threshold: u32,

    /// Criminal reputation lost per severity point.
    #[serde(default = "default_rep_loss_base_factor")]
    pub rep_loss_base_factor: i32,

    /// Multiplier on reputation loss when the crime was witnessed.
    #[serde(default = "default_witness_rep_multiplier")]
    pub witness_rep_multiplier: i32,

    /// Bounty added per severity point.
    #[serde(default = "default_bounty_per_severity")]
    pub bounty_per_severity: i64,

    /// Jail days per severity point for murder.
    #[serde(default = "default_murder_days_per_point")]
    pub murder_days_per_point: u32,

    /// Jail days per severity point for assault.
    #[serde(default = "default_assault_days_per_point")]
    pub assault_days_per_point: u32,

    /// Jail days per severity point for theft and pickpocketing.
    #[serde(default = "default_theft_days_per_point")]
    pub theft_days_per_point: u32,

    /// Jail days per severity point for everything else.
    #[serde(default = "default_minor_days_per_point")]
    pub minor_days_per_point: u32,

    /// Upper bound on a single sentence.
    #[serde(default = "default_max_jail_days")]
    pub max_jail_days: u32,

    /// Criminal reputation regained per day served.
    #[serde(default = "default_rep_gain_per_day")]
    pub rep_gain_per_day: i32,

    /// Guard suspicion added by a witnessed crime.
    #[serde(default = "default_suspicion_per_witness")]
    pub suspicion_per_witness: u32,

    /// Guard suspicion lost per in-game hour.
    #[serde(default = "default_suspicion_decay_per_hour")]
    pub suspicion_decay_per_hour: u32,
}

impl Default for CrimeConfig {
    fn default() -> Self {
        Self {
            wanted_threshold: default_wanted_threshold(),
            rep_loss_base_factor: default_rep_loss_base_factor(),
            witness_rep_multiplier: default_witness_rep_multiplier(),
            bounty_per_severity: default_bounty_per_severity(),
            murder_days_per_point: default_murder_days_per_point(),
            assault_days_per_point: default_assault_days_per_point(),
            theft_days_per_point: default_theft_days_per_point(),
            minor_days_per_point: default_minor_days_per_point(),
            max_jail_days: default_max_jail_days(),
            rep_gain_per_day: default_rep_gain_per_day(),
            suspicion_per_witness: default_suspicion_per_witness(),
            suspicion_decay_per_hour: default_suspicion_decay_per_hour(),
        }
    }
}

/// Health and disease configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthConfig {
    /// Maximum player health.
    #[serde(default = "default_max_health")]
    pub max_health: i32,

    /// Health regenerated per hour while no disease is active.
    #[serde(default = "default_regen_per_hour")]
    pub regen_per_hour: i32,

    /// How long a disease lasts, in in-game hours.
    #[serde(default = "default_disease_duration_hours")]
    pub disease_duration_hours: u32,

    /// Health lost per hour per active disease.
    #[serde(default = "default_disease_damage_per_hour")]
    pub disease_damage_per_hour: i32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            max_health: default_max_health(),
            regen_per_hour: default_regen_per_hour(),
            disease_duration_hours: default_disease_duration_hours(),
            disease_damage_per_hour: default_disease_damage_per_hour(),
        }
    }
}

/// Economy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EconomyConfig {
    /// Gold the player starts with.
    #[serde(default = "default_starting_gold")]
    pub starting_gold: i64,

    /// Days between market price drifts.
    #[serde(default = "default_price_drift_interval_days")]
    pub price_drift_interval_days: u32,

    /// Maximum drift per step, in percent.
    #[serde(default = "default_max_drift_pct")]
    pub max_drift_pct: i64,

    /// Price markup applied while a storm rages, in percent.
    #[serde(default = "default_storm_markup_pct")]
    pub storm_markup_pct: i64,

    /// Seed for the price drift generator.
    #[serde(default = "default_market_seed")]
    pub seed: u64,

    /// Base market prices by item.
    #[serde(default = "default_base_prices")]
    pub base_prices: BTreeMap<String, i64>,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            starting_gold: default_starting_gold(),
            price_drift_interval_days: default_price_drift_interval_days(),
            max_drift_pct: default_max_drift_pct(),
            storm_markup_pct: default_storm_markup_pct(),
            seed: default_market_seed(),
            base_prices: default_base_prices(),
        }
    }
}

/// Faction configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FactionConfig {
    /// Days between political shifts among factions.
    #[serde(default = "default_political_shift_interval_days")]
    pub political_shift_interval_days: u32,

    /// Rank titles and the minimum reputation required for each, ascending.
    #[serde(default = "default_rank_thresholds")]
    pub rank_thresholds: Vec<RankThreshold>,

    /// Reputation the thieves guild grants per unwitnessed crime.
    #[serde(default = "default_thieves_crime_bonus")]
    pub thieves_crime_bonus: i32,

    /// Reputation the nobles take away per witnessed crime.
    #[serde(default = "default_nobles_crime_penalty")]
    pub nobles_crime_penalty: i32,

    /// Seed for political shifts between factions.
    #[serde(default = "default_faction_seed")]
    pub seed: u64,
}

impl Default for FactionConfig {
    fn default() -> Self {
        Self {
            political_shift_interval_days: default_political_shift_interval_days(),
            rank_thresholds: default_rank_thresholds(),
            thieves_crime_bonus: default_thieves_crime_bonus(),
            nobles_crime_penalty: default_nobles_crime_penalty(),
            seed: default_faction_seed(),
        }
    }
}

/// A rank title and its reputation threshold.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RankThreshold {
    /// Rank title.
    pub title: String,
    /// Minimum reputation to hold the rank.
    pub min_reputation: i32,
}

/// NPC relationship configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RelationshipConfig {
    /// Days that must pass between two gifts to the same NPC.
    #[serde(default = "default_gift_cooldown_days")]
    pub gift_cooldown_days: u32,

    /// Gold a gift costs per point of affinity it earns.
    #[serde(default = "default_gold_per_affinity")]
    pub gold_per_affinity: i64,

    /// Affinity for small talk on an ordinary topic.
    #[serde(default = "default_talk_bonus")]
    pub talk_bonus: i32,

    /// Affinity for talking about a topic the NPC likes.
    #[serde(default = "default_liked_topic_bonus")]
    pub liked_topic_bonus: i32,

    /// Affinity lost for raising a taboo topic.
    #[serde(default = "default_taboo_topic_penalty")]
    pub taboo_topic_penalty: i32,

    /// Affinity per point of importance of a favor done for an NPC.
    #[serde(default = "default_favor_multiplier")]
    pub favor_multiplier: i32,

    /// Affinity lost per point of severity of a betrayal.
    #[serde(default = "default_betrayal_multiplier")]
    pub betrayal_multiplier: i32,

    /// Affinity a positive relationship loses each day it is not tended.
    #[serde(default = "default_daily_decay")]
    pub daily_decay: i32,

    /// Relationships above this affinity do not decay.
    #[serde(default = "default_close_threshold")]
    pub close_threshold: i32,

    /// Known NPCs and their temperament.
    #[serde(default = "default_npcs")]
    pub npcs: BTreeMap<String, NpcProfile>,
}

impl Default for RelationshipConfig {
    fn default() -> Self {
        Self {
            gift_cooldown_days: default_gift_cooldown_days(),
            gold_per_affinity: default_gold_per_affinity(),
            talk_bonus: default_talk_bonus(),
            liked_topic_bonus: default_liked_topic_bonus(),
            taboo_topic_penalty: default_taboo_topic_penalty(),
            favor_multiplier: default_favor_multiplier(),
            betrayal_multiplier: default_betrayal_multiplier(),
            daily_decay: default_daily_decay(),
            close_threshold: default_close_threshold(),
            npcs: default_npcs(),
        }
    }
}

/// How an NPC takes slights.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Temperament {
    /// Losses apply as given.
    #[default]
    Even,
    /// Losses are half again as large.
    Vengeful,
    /// Losses are halved.
    Merciful,
}

/// Starting affinity and conversational taste of one NPC.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NpcProfile {
    /// Affinity at the start of a new game.
    #[serde(default)]
    pub affinity: i32,

    /// How the NPC takes slights.
    #[serde(default)]
    pub temperament: Temperament,

    /// Topics the NPC enjoys.
    #[serde(default)]
    pub liked_topics: Vec<String>,

    /// Topics the NPC resents.
    #[serde(default)]
    pub taboo_topics: Vec<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default `tracing` filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON-formatted log lines.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Save file configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SaveConfig {
    /// Path of the save document.
    #[serde(default = "default_save_path")]
    pub path: String,
}

impl SaveConfig {
    /// Apply environment variable overrides (`OATH_SAVE_PATH`).
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("OATH_SAVE_PATH") {
            self.path = path;
        }
    }
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            path: default_save_path(),
        }
    }
}

/// Engine driver loop configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EngineConfig {
    /// Real-time milliseconds between ticks (0 = run flat out).
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Delta seconds passed to `update_all` each tick.
    #[serde(default = "default_delta_seconds")]
    pub delta_seconds: f64,

    /// Number of ticks to run before saving and exiting (0 = unlimited).
    #[serde(default = "default_max_ticks")]
    pub max_ticks: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            delta_seconds: default_delta_seconds(),
            max_ticks: default_max_ticks(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

const fn default_max_depth() -> u32 {
    32
}

const fn default_seconds_per_hour() -> f64 {
    60.0
}

const fn default_days_per_season() -> u32 {
    90
}

fn default_seasons() -> Vec<String> {
    vec![
        "spring".to_owned(),
        "summer".to_owned(),
        "autumn".to_owned(),
        "winter".to_owned(),
    ]
}

const fn default_starting_hour() -> u8 {
    8
}

const fn default_weather_seed() -> u64 {
    42
}

const fn default_wanted_threshold() -> u32 {
    3
}

const fn default_rep_loss_base_factor() -> i32 {
    2
}

const fn default_witness_rep_multiplier() -> i32 {
    2
}

const fn default_bounty_per_severity() -> i64 {
    40
}

const fn default_murder_days_per_point() -> u32 {
    5
}

const fn default_assault_days_per_point() -> u32 {
    3
}

const fn default_theft_days_per_point() -> u32 {
    2
}

const fn default_minor_days_per_point() -> u32 {
    1
}

const fn default_max_jail_days() -> u32 {
    30
}

const fn default_rep_gain_per_day() -> i32 {
    1
}

const fn default_suspicion_per_witness() -> u32 {
    25
}

const fn default_suspicion_decay_per_hour() -> u32 {
    2
}

const fn default_max_health() -> i32 {
    100
}

const fn default_regen_per_hour() -> i32 {
    1
}

const fn default_disease_duration_hours() -> u32 {
    72
}

const fn default_disease_damage_per_hour() -> i32 {
    1
}

const fn default_starting_gold() -> i64 {
    1000
}

const fn default_price_drift_interval_days() -> u32 {
    1
}

const fn default_max_drift_pct() -> i64 {
    10
}

const fn default_storm_markup_pct() -> i64 {
    20
}

const fn default_market_seed() -> u64 {
    7
}

fn default_base_prices() -> BTreeMap<String, i64> {
    let mut prices = BTreeMap::new();
    prices.insert("bread".to_owned(), 5);
    prices.insert("ale".to_owned(), 8);
    prices.insert("potion".to_owned(), 50);
    prices.insert("sword".to_owned(), 120);
    prices
}

const fn default_political_shift_interval_days() -> u32 {
    7
}

fn default_rank_thresholds() -> Vec<RankThreshold> {
    [("initiate", 0), ("member", 20), ("adept", 50), ("champion", 80)]
        .into_iter()
        .map(|(title, min_reputation)| RankThreshold {
            title: title.to_owned(),
            min_reputation,
        })
        .collect()
}

const fn default_thieves_crime_bonus() -> i32 {
    2
}

const fn default_nobles_crime_penalty() -> i32 {
    5
}

const fn default_faction_seed() -> u64 {
    11
}

const fn default_gift_cooldown_days() -> u32 {
    1
}

const fn default_gold_per_affinity() -> i64 {
    10
}

const fn default_talk_bonus() -> i32 {
    1
}

const fn default_liked_topic_bonus() -> i32 {
    3
}

const fn default_taboo_topic_penalty() -> i32 {
    5
}

const fn default_favor_multiplier() -> i32 {
    2
}

const fn default_betrayal_multiplier() -> i32 {
    3
}

const fn default_daily_decay() -> i32 {
    1
}

const fn default_close_threshold() -> i32 {
    60
}

fn default_npcs() -> BTreeMap<String, NpcProfile> {
    let topics = |list: &[&str]| -> Vec<String> {
        list.iter().map(|&topic| topic.to_owned()).collect()
    };
    [
        ("mira", 10, Temperament::Even, topics(&["ale", "travel"]), topics(&["debts"])),
        ("aldric", 0, Temperament::Vengeful, topics(&["swords"]), topics(&["thieves"])),
        ("elin", 5, Temperament::Merciful, topics(&["faith"]), topics(&["crime"])),
    ]
    .into_iter()
    .map(|(name, affinity, temperament, liked_topics, taboo_topics)| {
        let profile = NpcProfile {
            affinity,
            temperament,
            liked_topics,
            taboo_topics,
        };
        (name.to_owned(), profile)
    })
    .collect()
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_save_path() -> String {
    "savegame.json".to_owned()
}

const fn default_tick_interval_ms() -> u64 {
    100
}

const fn default_delta_seconds() -> f64 {
    60.0
}

const fn default_max_ticks() -> u64 {
    0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = OathConfig::default();
        assert_eq!(config.dispatch.max_depth, 32);
        assert_eq!(config.calendar.days_per_season, 90);
        assert_eq!(config.calendar.seasons.len(), 4);
        assert_eq!(config.economy.starting_gold, 1000);
        assert_eq!(config.faction.rank_thresholds.len(), 4);
        assert_eq!(config.relationships.npcs.len(), 3);
        assert_eq!(config.save.path, "savegame.json");
    }

    #[test]
    fn parse_empty_yaml() {
        let config = OathConfig::parse("").unwrap();
        assert_eq!(config, OathConfig::default());
    }

    #[test]
    fn parse_partial_yaml_keeps_defaults() {
        let yaml = r"
dispatch:
  max_depth: 4
calendar:
  days_per_season: 30
  seasons: [spring, fall]
economy:
  base_prices:
    bread: 3
";
        let config = OathConfig::parse(yaml).unwrap();
        assert_eq!(config.dispatch.max_depth, 4);
        assert_eq!(config.calendar.days_per_season, 30);
        assert_eq!(config.calendar.seasons, vec!["spring", "fall"]);
        assert_eq!(config.calendar.starting_hour, 8);
        assert_eq!(config.economy.base_prices.len(), 1);
        assert_eq!(config.economy.starting_gold, 1000);
        assert_eq!(config.crime, CrimeConfig::default());
    }

    #[test]
    fn parse_rank_thresholds() {
        let yaml = r"
faction:
  rank_thresholds:
    - title: recruit
      min_reputation: 0
    - title: officer
      min_reputation: 40
";
        let config = OathConfig::parse(yaml).unwrap();
        let titles: Vec<&str> = config
            .faction
            .rank_thresholds
            .iter()
            .map(|r| r.title.as_str())
            .collect();
        assert_eq!(titles, vec!["recruit", "officer"]);
    }

    #[test]
    fn parse_npc_profiles() {
        let yaml = r"
relationships:
  daily_decay: 2
  npcs:
    bram:
      affinity: -10
      temperament: vengeful
      taboo_topics: [taxes]
";
        let config = OathConfig::parse(yaml).unwrap();
        assert_eq!(config.relationships.daily_decay, 2);
        assert_eq!(config.relationships.close_threshold, 60);
        let bram = config.relationships.npcs.get("bram").unwrap();
        assert_eq!(bram.affinity, -10);
        assert_eq!(bram.temperament, Temperament::Vengeful);
        assert!(bram.liked_topics.is_empty());
        assert_eq!(bram.taboo_topics, vec!["taxes"]);
    }

    #[test]
    fn shipped_config_matches_defaults() {
        let config = OathConfig::parse(include_str!("../../../oath-config.yaml")).unwrap();
        assert_eq!(config, OathConfig::default());
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        let result = OathConfig::parse("dispatch: [unclosed");
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }
}
