//! The weather system: one deterministic roll per in-game day.
//!
//! Weather is rolled at every `DayPassed` from season-dependent weights:
//!
//! | Weather  | Spring | Summer | Autumn | Winter |
//! |----------|--------|--------|--------|--------|
//! | Clear    | 30%    | 45%    | 35%    | 20%    |
//! | Rain     | 35%    | 15%    | 25%    | 10%    |
//! | Storm    | 10%    | 10%    | 15%    | 15%    |
//! | Drought  |  5%    | 25%    |  5%    |  0%    |
//! | Snow     |  0%    |  0%    |  5%    | 40%    |
//! | (repeat) | 20%    |  5%    | 15%    | 15%    |
//!
//! "Repeat" keeps yesterday's weather, which gives natural streaks. The roll
//! is an `xorshift64` of `(seed, day)`, so a seed always yields the same
//! year of weather and a loaded game continues exactly as it would have.
//!
//! The automaton has one node per weather kind. Changes are written to
//! `location_states["current_weather"]` and broadcast as `WeatherChanged`.

use oath_core::config::WeatherConfig;
use oath_core::context::CURRENT_WEATHER;
use oath_core::plugin::{WeatherReport, decode_state};
use oath_core::{PluginError, SystemContext, SystemPlugin};
use oath_types::{GameEvent, Season, TransitionInput, Weather};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::node_name;

/// Registry name of the weather system.
pub const SYSTEM: &str = "weather";

/// Seasonal weather weights. A `None` entry means "repeat yesterday".
#[derive(Debug, Clone)]
pub struct SeasonWeights {
    entries: Vec<(Option<Weather>, u32)>,
}

impl SeasonWeights {
    /// The weights for `season`.
    pub fn for_season(season: Season) -> Self {
        let entries = match season {
            Season::Spring => vec![
                (Some(Weather::Clear), 30),
                (Some(Weather::Rain), 35),
                (Some(Weather::Storm), 10),
                (Some(Weather::Drought), 5),
                (Some(Weather::Snow), 0),
                (None, 20),
            ],
            Season::Summer => vec![
                (Some(Weather::Clear), 45),
                (Some(Weather::Rain), 15),
                (Some(Weather::Storm), 10),
                (Some(Weather::Drought), 25),
                (Some(Weather::Snow), 0),
                (None, 5),
            ],
            Season::Autumn => vec![
                (Some(Weather::Clear), 35),
                (Some(Weather::Rain), 25),
                (Some(Weather::Storm), 15),
                (Some(Weather::Drought), 5),
                (Some(Weather::Snow), 5),
                (None, 15),
            ],
            Season::Winter => vec![
                (Some(Weather::Clear), 20),
                (Some(Weather::Rain), 10),
                (Some(Weather::Storm), 15),
                (Some(Weather::Drought), 0),
                (Some(Weather::Snow), 40),
                (None, 15),
            ],
        };
        Self { entries }
    }

    fn select(&self, roll: u32) -> Option<Weather> {
        let mut cumulative: u32 = 0;
        for &(weather, weight) in &self.entries {
            cumulative = cumulative.saturating_add(weight);
            if roll < cumulative {
                return weather;
            }
        }
        Some(Weather::Clear)
    }

    fn total_weight(&self) -> u32 {
        self.entries
            .iter()
            .fold(0_u32, |total, &(_, weight)| total.saturating_add(weight))
    }
}

/// `xorshift64` over a seed and day. Never returns 0 for non-degenerate
/// input and always returns the same value for the same pair.
const fn deterministic_random(seed: u64, day: u64) -> u64 {
    let mut state = seed.wrapping_add(day.wrapping_mul(0x517c_c1b7_2722_0a95));
    if state == 0 {
        state = 0xdead_beef_cafe_babe;
    }
    state ^= state << 13;
    state ^= state >> 7;
    state ^= state << 17;
    state
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Snapshot {
    current: Option<Weather>,
    days_unchanged: u32,
    last_rolled_day: Option<u32>,
}

/// Rolls and reports the daily weather.
#[derive(Debug, Clone)]
pub struct WeatherSystem {
    seed: u64,
    current: Weather,
    days_unchanged: u32,
    last_rolled_day: Option<u32>,
}

impl WeatherSystem {
    /// Create a weather system starting under clear skies.
    pub const fn new(config: &WeatherConfig) -> Self {
        Self {
            seed: config.seed,
            current: Weather::Clear,
            days_unchanged: 0,
            last_rolled_day: None,
        }
    }

    /// The weather `day` would bring in `season`, given today's weather.
    pub fn forecast(&self, day: u32, season: Season) -> Weather {
        let weights = SeasonWeights::for_season(season);
        let total = weights.total_weight();
        if total == 0 {
            return Weather::Clear;
        }
        let random = deterministic_random(self.seed, u64::from(day));
        let remainder = random.checked_rem(u64::from(total)).unwrap_or(0);
        let roll = u32::try_from(remainder).unwrap_or(0);
        weights.select(roll).unwrap_or(self.current)
    }

    fn node(weather: Weather) -> String {
        node_name(SYSTEM, weather.as_str())
    }

    fn weather_input(weather: Weather) -> TransitionInput {
        TransitionInput::new("weather").with("weather", weather.as_str())
    }

    /// Roll the weather for `day`, returning the new weather if it changed.
    /// A day is rolled at most once.
    fn roll(&mut self, day: u32, ctx: &mut SystemContext<'_>) -> Result<Option<Weather>, PluginError> {
        if self.last_rolled_day.is_some_and(|last| last >= day) {
            return Ok(None);
        }
        self.last_rolled_day = Some(day);

        let next = self.forecast(day, ctx.world.world.current_season);
        if next == self.current {
            self.days_unchanged = self.days_unchanged.saturating_add(1);
            return Ok(None);
        }

        ctx.process_input(SYSTEM, &Self::weather_input(next))?;
        self.current = next;
        self.days_unchanged = 0;
        ctx.world
            .world
            .set_location_state(CURRENT_WEATHER, next.as_str());
        Ok(Some(next))
    }
}

impl SystemPlugin for WeatherSystem {
    fn name(&self) -> &str {
        SYSTEM
    }

    fn description(&self) -> &str {
        "Daily season-weighted weather"
    }

    fn initialize(&mut self, ctx: &mut SystemContext<'_>) -> Result<(), PluginError> {
        if let Some(weather) = ctx
            .world
            .world
            .location_state(CURRENT_WEATHER)
            .and_then(|name| name.parse::<Weather>().ok())
        {
            self.current = weather;
        }

        let mut nodes = Vec::with_capacity(Weather::ALL.len());
        for weather in Weather::ALL {
            let id = ctx.controller.create_node(Self::node(weather))?;
            if let Some(node) = ctx.controller.node_mut(id) {
                node.set_data("weather", weather.as_str());
            }
            nodes.push((weather, id));
        }
        for &(from_weather, from) in &nodes {
            for &(to_weather, to) in &nodes {
                let name = to_weather.as_str();
                ctx.controller.add_transition(
                    from,
                    move |input| input.is("weather") && input.text("weather") == Some(name),
                    to,
                    format!("{from_weather} gives way to {to_weather}"),
                )?;
            }
        }

        let root = nodes
            .iter()
            .find(|(weather, _)| *weather == self.current)
            .map(|&(_, id)| id)
            .ok_or_else(|| PluginError::rejected("no node for the current weather"))?;
        ctx.controller.set_system_root(SYSTEM, root)?;
        ctx.world
            .world
            .set_location_state(CURRENT_WEATHER, self.current.as_str());
        Ok(())
    }

    fn tick(&mut self, _delta: f64, _ctx: &mut SystemContext<'_>) -> Result<(), PluginError> {
        Ok(())
    }

    fn save_state(&self) -> Value {
        json!({
            "current": self.current,
            "daysUnchanged": self.days_unchanged,
            "lastRolledDay": self.last_rolled_day,
        })
    }

    fn load_state(&mut self, state: &Value, ctx: &mut SystemContext<'_>) -> Result<(), PluginError> {
        let snapshot: Snapshot = decode_state(state)?;
        let current = snapshot.current.unwrap_or(Weather::Clear);
        ctx.controller.restore_current(SYSTEM, &Self::node(current))?;

        self.current = current;
        self.days_unchanged = snapshot.days_unchanged;
        self.last_rolled_day = snapshot.last_rolled_day;
        ctx.world
            .world
            .set_location_state(CURRENT_WEATHER, current.as_str());
        Ok(())
    }

    fn handle_event(&mut self, event: &GameEvent, ctx: &mut SystemContext<'_>) -> bool {
        let GameEvent::DayPassed { day } = *event else {
            return false;
        };
        match self.roll(day, ctx) {
            Ok(Some(weather)) => {
                let region = ctx.world.current_region().to_owned();
                info!(day, %weather, region = %region, "weather changed");
                ctx.emit(GameEvent::WeatherChanged { region, weather });
                true
            }
            Ok(None) => true,
            Err(err) => {
                warn!(day, error = %err, "weather roll failed");
                false
            }
        }
    }

    fn weather_report(&self) -> Option<&dyn WeatherReport> {
        Some(self)
    }
}

impl WeatherReport for WeatherSystem {
    fn current_weather(&self) -> Weather {
        self.current
    }

    fn days_unchanged(&self) -> u32 {
        self.days_unchanged
    }
}
