//! Enumeration types for the Oath simulation.
//!
//! All enums serialize as lowercase strings so that save documents read
//! the same way the world state does (`"currentSeason": "spring"`).

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when a string does not name a known enum variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    /// The kind of value that was being parsed (e.g. `"season"`).
    pub kind: &'static str,
    /// The rejected input.
    pub input: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {}: {}", self.kind, self.input)
    }
}

impl std::error::Error for ParseEnumError {}

// ---------------------------------------------------------------------------
// Season
// ---------------------------------------------------------------------------

/// A season of the in-game year.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    /// First season of the year.
    #[default]
    Spring,
    /// Second season of the year.
    Summer,
    /// Third season of the year. Parses from `"fall"` as well.
    #[serde(alias = "fall")]
    Autumn,
    /// Last season of the year.
    Winter,
}

impl Season {
    /// The season that follows this one in the default annual cycle.
    pub const fn next(self) -> Self {
        match self {
            Self::Spring => Self::Summer,
            Self::Summer => Self::Autumn,
            Self::Autumn => Self::Winter,
            Self::Winter => Self::Spring,
        }
    }

    /// Lowercase name used in save documents and world state.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Spring => "spring",
            Self::Summer => "summer",
            Self::Autumn => "autumn",
            Self::Winter => "winter",
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Season {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "spring" => Ok(Self::Spring),
            "summer" => Ok(Self::Summer),
            "autumn" | "fall" => Ok(Self::Autumn),
            "winter" => Ok(Self::Winter),
            other => Err(ParseEnumError {
                kind: "season",
                input: other.to_owned(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// TimeOfDay
// ---------------------------------------------------------------------------

/// Coarse phase of the in-game day, derived from the hour (0-23).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDay {
    /// 05:00 to 11:59.
    Morning,
    /// 12:00 to 16:59.
    Afternoon,
    /// 17:00 to 20:59.
    Evening,
    /// 21:00 to 04:59.
    Night,
}

impl TimeOfDay {
    /// Map an hour of the day (taken modulo 24) to its phase.
    pub const fn from_hour(hour: u8) -> Self {
        match hour % 24 {
            5..=11 => Self::Morning,
            12..=16 => Self::Afternoon,
            17..=20 => Self::Evening,
            _ => Self::Night,
        }
    }

    /// Lowercase name, also used as the calendar automaton's node name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Morning => "morning",
            Self::Afternoon => "afternoon",
            Self::Evening => "evening",
            Self::Night => "night",
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Weather
// ---------------------------------------------------------------------------

/// Weather conditions for a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weather {
    /// No precipitation.
    Clear,
    /// Steady rain.
    Rain,
    /// Violent storm; travel and trade suffer.
    Storm,
    /// Prolonged dry spell.
    Drought,
    /// Snowfall.
    Snow,
}

impl Weather {
    /// Every weather variant, in declaration order.
    pub const ALL: [Self; 5] = [Self::Clear, Self::Rain, Self::Storm, Self::Drought, Self::Snow];

    /// Lowercase name used in `location_states["current_weather"]`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Clear => "clear",
            Self::Rain => "rain",
            Self::Storm => "storm",
            Self::Drought => "drought",
            Self::Snow => "snow",
        }
    }
}

impl fmt::Display for Weather {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Weather {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|w| w.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseEnumError {
                kind: "weather",
                input: s.to_owned(),
            })
    }
}

// ---------------------------------------------------------------------------
// CrimeKind
// ---------------------------------------------------------------------------

/// The category of a crime committed by the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrimeKind {
    /// Taking goods that are not yours.
    Theft,
    /// Lifting coin from a person.
    Pickpocketing,
    /// Attacking someone.
    Assault,
    /// Killing someone.
    Murder,
    /// Entering a restricted area.
    Trespassing,
    /// Damaging property.
    Vandalism,
    /// Escaping from jail.
    PrisonBreak,
}

impl CrimeKind {
    /// Every crime kind, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Theft,
        Self::Pickpocketing,
        Self::Assault,
        Self::Murder,
        Self::Trespassing,
        Self::Vandalism,
        Self::PrisonBreak,
    ];

    /// Whether the crime counts as violent for sentencing.
    pub const fn is_violent(self) -> bool {
        matches!(self, Self::Assault | Self::Murder)
    }

    /// Snake-case name, matching the serialized form.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Theft => "theft",
            Self::Pickpocketing => "pickpocketing",
            Self::Assault => "assault",
            Self::Murder => "murder",
            Self::Trespassing => "trespassing",
            Self::Vandalism => "vandalism",
            Self::PrisonBreak => "prison_break",
        }
    }
}

impl fmt::Display for CrimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CrimeKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseEnumError {
                kind: "crime",
                input: s.to_owned(),
            })
    }
}
