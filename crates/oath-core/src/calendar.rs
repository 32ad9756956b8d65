//! Calendar arithmetic for the Oath simulation.
//!
//! The calendar turns hours into days and days into seasons. It holds no
//! time itself: the running time lives in [`WorldState`] so it is saved with
//! the rest of the world, and the calendar only knows the rules (how many
//! days per season, which seasons in which order).
//!
//! All derivations use checked or saturating arithmetic. The season is
//! derived from the day counter whenever a day rolls over, so a loaded
//! document with an inconsistent season corrects itself at the next dawn.

use oath_types::Season;

use crate::config::CalendarConfig;
use crate::context::WorldState;

/// Hours in one in-game day.
pub const HOURS_PER_DAY: u8 = 24;

/// Errors that can occur when building a calendar.
#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    /// Invalid calendar configuration (e.g. zero days per season).
    #[error("invalid calendar configuration: {reason}")]
    InvalidConfig {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

/// What happened when the calendar advanced one hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourAdvance {
    /// The new hour of the day.
    pub hour: u8,
    /// The new day counter, if midnight passed.
    pub new_day: Option<u32>,
    /// The new season, if it changed.
    pub new_season: Option<Season>,
}

/// The rules of the in-game calendar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Calendar {
    /// Number of days per season.
    days_per_season: u32,
    /// Ordered list of seasons that form the annual cycle.
    seasons: Vec<Season>,
}

impl Calendar {
    /// Create a calendar from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CalendarError::InvalidConfig`] if `days_per_season` is 0,
    /// the season list is empty, or a season name is unknown.
    pub fn new(config: &CalendarConfig) -> Result<Self, CalendarError> {
        let seasons = config
            .seasons
            .iter()
            .map(|name| {
                name.parse::<Season>()
                    .map_err(|err| CalendarError::InvalidConfig {
                        reason: err.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_parts(config.days_per_season, seasons)
    }

    /// Create a calendar from explicit parameters.
    ///
    /// # Errors
    ///
    /// Returns [`CalendarError::InvalidConfig`] if `days_per_season` is 0
    /// or the season list is empty.
    pub fn from_parts(days_per_season: u32, seasons: Vec<Season>) -> Result<Self, CalendarError> {
        if days_per_season == 0 {
            return Err(CalendarError::InvalidConfig {
                reason: "days_per_season must be at least 1".to_owned(),
            });
        }
        if seasons.is_empty() {
            return Err(CalendarError::InvalidConfig {
                reason: "at least one season must be configured".to_owned(),
            });
        }
        Ok(Self {
            days_per_season,
            seasons,
        })
    }

    /// Return the configured number of days per season.
    pub const fn days_per_season(&self) -> u32 {
        self.days_per_season
    }

    /// Return the complete season list.
    pub fn seasons(&self) -> &[Season] {
        &self.seasons
    }

    /// The season a given day falls in: `(day / days_per_season) % len`.
    pub fn season_for_day(&self, day: u32) -> Season {
        let season_count = u32::try_from(self.seasons.len()).unwrap_or(u32::MAX).max(1);
        let raw = day.checked_div(self.days_per_season).unwrap_or(0);
        let idx = raw.checked_rem(season_count).unwrap_or(0);
        usize::try_from(idx)
            .ok()
            .and_then(|i| self.seasons.get(i))
            .copied()
            .unwrap_or_default()
    }

    /// Days remaining until the season changes, counted from `day`.
    pub fn days_until_season_change(&self, day: u32) -> u32 {
        let within = day.checked_rem(self.days_per_season).unwrap_or(0);
        self.days_per_season.saturating_sub(within)
    }

    /// Advance `world` by one hour, rolling the day and season as needed.
    pub fn advance_hour(&self, world: &mut WorldState) -> HourAdvance {
        let next = world.hour.saturating_add(1);
        if next < HOURS_PER_DAY {
            world.hour = next;
            return HourAdvance {
                hour: next,
                new_day: None,
                new_season: None,
            };
        }

        world.hour = 0;
        world.days_passed = world.days_passed.saturating_add(1);
        let season = self.season_for_day(world.days_passed);
        let new_season = (season != world.current_season).then_some(season);
        world.current_season = season;

        HourAdvance {
            hour: 0,
            new_day: Some(world.days_passed),
            new_season,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn default_calendar() -> Calendar {
        Calendar::new(&CalendarConfig::default()).unwrap()
    }

    #[test]
    fn seasons_rotate_every_configured_days() {
        let calendar = default_calendar();
        assert_eq!(calendar.season_for_day(0), Season::Spring);
        assert_eq!(calendar.season_for_day(89), Season::Spring);
        assert_eq!(calendar.season_for_day(90), Season::Summer);
        assert_eq!(calendar.season_for_day(180), Season::Autumn);
        assert_eq!(calendar.season_for_day(270), Season::Winter);
        assert_eq!(calendar.season_for_day(360), Season::Spring);
    }

    #[test]
    fn advance_hour_within_day() {
        let calendar = default_calendar();
        let mut world = WorldState::default();
        let step = calendar.advance_hour(&mut world);
        assert_eq!(step.hour, 9);
        assert_eq!(step.new_day, None);
        assert_eq!(world.days_passed, 0);
    }

    #[test]
    fn advance_hour_rolls_midnight() {
        let calendar = default_calendar();
        let mut world = WorldState {
            hour: 23,
            ..WorldState::default()
        };
        let step = calendar.advance_hour(&mut world);
        assert_eq!(step.hour, 0);
        assert_eq!(step.new_day, Some(1));
        assert_eq!(step.new_season, None);
        assert_eq!(world.days_passed, 1);
    }

    #[test]
    fn advance_hour_reports_season_change() {
        let calendar = default_calendar();
        let mut world = WorldState {
            hour: 23,
            days_passed: 89,
            ..WorldState::default()
        };
        let step = calendar.advance_hour(&mut world);
        assert_eq!(step.new_day, Some(90));
        assert_eq!(step.new_season, Some(Season::Summer));
        assert_eq!(world.current_season, Season::Summer);
    }

    #[test]
    fn days_until_season_change_counts_down() {
        let calendar = default_calendar();
        assert_eq!(calendar.days_until_season_change(0), 90);
        assert_eq!(calendar.days_until_season_change(45), 45);
        assert_eq!(calendar.days_until_season_change(89), 1);
        assert_eq!(calendar.days_until_season_change(90), 90);
    }

    #[test]
    fn invalid_config_zero_days_per_season() {
        let cfg = CalendarConfig {
            days_per_season: 0,
            ..CalendarConfig::default()
        };
        assert!(Calendar::new(&cfg).is_err());
    }

    #[test]
    fn invalid_config_unknown_season() {
        let cfg = CalendarConfig {
            seasons: vec!["monsoon".to_owned()],
            ..CalendarConfig::default()
        };
        assert!(Calendar::new(&cfg).is_err());
    }

    #[test]
    fn single_season_configuration() {
        let calendar = Calendar::from_parts(10, vec![Season::Winter]).unwrap();
        assert_eq!(calendar.season_for_day(0), Season::Winter);
        assert_eq!(calendar.season_for_day(25), Season::Winter);
    }

    #[test]
    fn fall_alias_for_autumn() {
        let cfg = CalendarConfig {
            seasons: vec!["fall".to_owned()],
            ..CalendarConfig::default()
        };
        let calendar = Calendar::new(&cfg).unwrap();
        assert_eq!(calendar.seasons(), &[Season::Autumn]);
    }
}
