//! Events carried on the orchestrator's broadcast bus.
//!
//! Events are a closed set of tagged variants grouped into families, one per
//! gameplay domain. Each variant has a stable dotted type string
//! (`event.crime.committed`) that doubles as its serialized tag, so an event
//! logged or persisted as JSON reads `{"type": "...", "data": {...}}`.
//! Plugin-defined events that do not fit a family travel as
//! [`GameEvent::Custom`] with an open JSON payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::enums::{CrimeKind, Season, Weather};

/// The domain an event belongs to. Handlers use this for a cheap early
/// return before matching on individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventFamily {
    /// Calendar progression.
    Time,
    /// Weather changes.
    Weather,
    /// Crime and law enforcement.
    Crime,
    /// Player health and disease.
    Health,
    /// Gold, trade, and prices.
    Economy,
    /// Faction reputation and politics.
    Faction,
    /// Relationships with individual NPCs.
    Npc,
    /// Plugin-defined events outside the known families.
    Custom,
}

/// An event broadcast to every registered system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GameEvent {
    /// One in-game hour elapsed.
    #[serde(rename = "event.time.hour_passed")]
    HourPassed {
        /// Days passed since the start of the game.
        day: u32,
        /// The new hour of the day (0-23).
        hour: u8,
    },

    /// A new in-game day started.
    #[serde(rename = "event.time.day_passed")]
    DayPassed {
        /// Days passed since the start of the game.
        day: u32,
    },

    /// The season rolled over.
    #[serde(rename = "event.time.season_changed")]
    SeasonChanged {
        /// The new season.
        season: Season,
    },

    /// The weather in a region changed.
    #[serde(rename = "event.weather.changed")]
    WeatherChanged {
        /// The region the weather applies to.
        region: String,
        /// The new weather.
        weather: Weather,
    },

    /// The player committed a crime.
    #[serde(rename = "event.crime.committed")]
    CrimeCommitted {
        /// What kind of crime.
        crime: CrimeKind,
        /// Where it happened.
        region: String,
        /// Severity on a 1-10 scale.
        severity: u32,
        /// Whether anyone saw it.
        witnessed: bool,
    },

    /// The player paid off a bounty.
    #[serde(rename = "event.crime.bounty_paid")]
    BountyPaid {
        /// The region whose bounty was cleared.
        region: String,
        /// Gold paid.
        amount: i64,
    },

    /// Guards arrested the player.
    #[serde(rename = "event.crime.arrested")]
    ArrestOccurred {
        /// The region of the arrest.
        region: String,
        /// Jail sentence in days.
        jail_days: u32,
    },

    /// Player health changed.
    #[serde(rename = "event.health.changed")]
    HealthChanged {
        /// Signed change in health points.
        delta: i32,
        /// Health after the change.
        current: i32,
    },

    /// The player contracted a disease.
    #[serde(rename = "event.health.disease_contracted")]
    DiseaseContracted {
        /// Name of the disease.
        disease: String,
    },

    /// The player recovered from a disease.
    #[serde(rename = "event.health.disease_recovered")]
    DiseaseRecovered {
        /// Name of the disease.
        disease: String,
    },

    /// Gold changed hands.
    #[serde(rename = "event.economy.transaction")]
    TransactionCompleted {
        /// What the gold was for.
        item: String,
        /// Signed change to the player's gold.
        gold_delta: i64,
    },

    /// A market price moved.
    #[serde(rename = "event.economy.price_changed")]
    MarketPriceChanged {
        /// The item whose price changed.
        item: String,
        /// The new price in gold.
        price: i64,
    },

    /// Player reputation with a faction changed.
    #[serde(rename = "event.faction.reputation_changed")]
    ReputationChanged {
        /// The faction.
        faction: String,
        /// Signed change in reputation.
        delta: i32,
    },

    /// The relation between two factions changed.
    #[serde(rename = "event.faction.relation_changed")]
    FactionRelationChanged {
        /// The faction whose stance changed.
        faction: String,
        /// The faction it changed toward.
        other: String,
        /// The new relation label (`"allied"`, `"neutral"`, `"hostile"`).
        relation: String,
    },

    /// The player reached a new rank in a faction.
    #[serde(rename = "event.faction.rank_advanced")]
    RankAdvanced {
        /// The faction.
        faction: String,
        /// The new rank title.
        rank: String,
    },

    /// Player relationship with an NPC changed.
    #[serde(rename = "event.npc.relationship_changed")]
    RelationshipChanged {
        /// The NPC.
        npc: String,
        /// Signed change in affinity.
        delta: i32,
    },

    /// A plugin-defined event outside the known families.
    #[serde(rename = "event.custom")]
    Custom {
        /// Dotted event type chosen by the emitting plugin.
        kind: String,
        /// Free-form payload.
        payload: Value,
    },
}

impl GameEvent {
    /// Build a custom event.
    pub fn custom(kind: impl Into<String>, payload: Value) -> Self {
        Self::Custom {
            kind: kind.into(),
            payload,
        }
    }

    /// The stable dotted type string for this event. Custom events report
    /// their own `kind`.
    pub fn event_type(&self) -> &str {
        match self {
            Self::HourPassed { .. } => "event.time.hour_passed",
            Self::DayPassed { .. } => "event.time.day_passed",
            Self::SeasonChanged { .. } => "event.time.season_changed",
            Self::WeatherChanged { .. } => "event.weather.changed",
            Self::CrimeCommitted { .. } => "event.crime.committed",
            Self::BountyPaid { .. } => "event.crime.bounty_paid",
            Self::ArrestOccurred { .. } => "event.crime.arrested",
            Self::HealthChanged { .. } => "event.health.changed",
            Self::DiseaseContracted { .. } => "event.health.disease_contracted",
            Self::DiseaseRecovered { .. } => "event.health.disease_recovered",
            Self::TransactionCompleted { .. } => "event.economy.transaction",
            Self::MarketPriceChanged { .. } => "event.economy.price_changed",
            Self::ReputationChanged { .. } => "event.faction.reputation_changed",
            Self::FactionRelationChanged { .. } => "event.faction.relation_changed",
            Self::RankAdvanced { .. } => "event.faction.rank_advanced",
            Self::RelationshipChanged { .. } => "event.npc.relationship_changed",
            Self::Custom { kind, .. } => kind,
        }
    }

    /// The family this event belongs to.
    pub const fn family(&self) -> EventFamily {
        match self {
            Self::HourPassed { .. } | Self::DayPassed { .. } | Self::SeasonChanged { .. } => {
                EventFamily::Time
            }
            Self::WeatherChanged { .. } => EventFamily::Weather,
            Self::CrimeCommitted { .. } | Self::BountyPaid { .. } | Self::ArrestOccurred { .. } => {
                EventFamily::Crime
            }
            Self::HealthChanged { .. }
            | Self::DiseaseContracted { .. }
            | Self::DiseaseRecovered { .. } => EventFamily::Health,
            Self::TransactionCompleted { .. } | Self::MarketPriceChanged { .. } => {
                EventFamily::Economy
            }
            Self::ReputationChanged { .. }
            | Self::FactionRelationChanged { .. }
            | Self::RankAdvanced { .. } => EventFamily::Faction,
            Self::RelationshipChanged { .. } => EventFamily::Npc,
            Self::Custom { .. } => EventFamily::Custom,
        }
    }
}
