//! The calendar system: turns tick deltas into in-game hours.
//!
//! Every `seconds_per_hour` of accumulated delta advances the world clock by
//! one hour and broadcasts `HourPassed`, plus `DayPassed` and
//! `SeasonChanged` when those roll over. The automaton has one node per
//! phase of the day (morning, afternoon, evening, night) in a cycle, moved
//! along by `advance_phase` whenever the hour crosses a phase boundary.

use oath_core::calendar::{Calendar, CalendarError, HOURS_PER_DAY};
use oath_core::config::CalendarConfig;
use oath_core::plugin::decode_state;
use oath_core::{Action, PluginError, SystemContext, SystemPlugin, TransitionOutcome};
use oath_types::{GameEvent, TimeOfDay, TransitionInput};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::node_name;

/// Registry name of the calendar system.
pub const SYSTEM: &str = "calendar";

/// Upper bound on hours advanced by a single tick or wait.
const MAX_HOURS_PER_STEP: u32 = 24 * 30;

const PHASES: [TimeOfDay; 4] = [
    TimeOfDay::Morning,
    TimeOfDay::Afternoon,
    TimeOfDay::Evening,
    TimeOfDay::Night,
];

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Snapshot {
    carry_seconds: f64,
    hours_elapsed: u64,
}

/// Drives the in-game clock.
#[derive(Debug, Clone)]
pub struct CalendarSystem {
    calendar: Calendar,
    seconds_per_hour: f64,
    starting_hour: u8,
    carry_seconds: f64,
    hours_elapsed: u64,
}

impl CalendarSystem {
    /// Build the calendar system from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CalendarError::InvalidConfig`] for an unusable season list,
    /// a non-positive hour length, or a starting hour past 23.
    pub fn new(config: &CalendarConfig) -> Result<Self, CalendarError> {
        if !config.seconds_per_hour.is_finite() || config.seconds_per_hour <= 0.0 {
            return Err(CalendarError::InvalidConfig {
                reason: format!(
                    "seconds_per_hour must be positive, got {}",
                    config.seconds_per_hour
                ),
            });
        }
        if config.starting_hour >= HOURS_PER_DAY {
            return Err(CalendarError::InvalidConfig {
                reason: format!("starting_hour must be below 24, got {}", config.starting_hour),
            });
        }
        Ok(Self {
            calendar: Calendar::new(config)?,
            seconds_per_hour: config.seconds_per_hour,
            starting_hour: config.starting_hour,
            carry_seconds: 0.0,
            hours_elapsed: 0,
        })
    }

    /// The calendar rules in use.
    pub const fn calendar(&self) -> &Calendar {
        &self.calendar
    }

    /// In-game hours advanced since the game started.
    pub const fn hours_elapsed(&self) -> u64 {
        self.hours_elapsed
    }

    fn phase_node(phase: TimeOfDay) -> String {
        node_name(SYSTEM, phase.as_str())
    }

    /// Advance the clock `hours` times, emitting time events and moving the
    /// phase automaton along.
    fn advance_hours(&mut self, hours: u32, ctx: &mut SystemContext<'_>) -> Result<(), PluginError> {
        let advance_phase = TransitionInput::new("advance_phase");
        for _ in 0..hours {
            let before = ctx.world.world.time_of_day();
            let step = self.calendar.advance_hour(&mut ctx.world.world);
            self.hours_elapsed = self.hours_elapsed.saturating_add(1);

            ctx.emit(GameEvent::HourPassed {
                day: ctx.world.world.days_passed,
                hour: step.hour,
            });
            if let Some(day) = step.new_day {
                debug!(day, "new day");
                ctx.emit(GameEvent::DayPassed { day });
            }
            if let Some(season) = step.new_season {
                debug!(%season, "new season");
                ctx.emit(GameEvent::SeasonChanged { season });
            }
            if ctx.world.world.time_of_day() != before {
                ctx.process_input(SYSTEM, &advance_phase)?;
            }
        }
        Ok(())
    }
}

impl SystemPlugin for CalendarSystem {
    fn name(&self) -> &str {
        SYSTEM
    }

    fn description(&self) -> &str {
        "In-game clock: hours, days, and seasons"
    }

    fn initialize(&mut self, ctx: &mut SystemContext<'_>) -> Result<(), PluginError> {
        let world = &mut ctx.world.world;
        world.hour = self.starting_hour;
        world.current_season = self.calendar.season_for_day(world.days_passed);
        let current = world.time_of_day();

        let mut nodes = Vec::with_capacity(PHASES.len());
        for phase in PHASES {
            let id = ctx.controller.create_node(Self::phase_node(phase))?;
            if let Some(node) = ctx.controller.node_mut(id) {
                node.set_data("phase", phase.as_str());
                node.add_action(Action::fixed(
                    "wait",
                    "Wait one hour",
                    TransitionInput::new("wait").with("hours", 1_i64),
                ));
            }
            nodes.push((phase, id));
        }
        for (position, &(phase, from)) in nodes.iter().enumerate() {
            let next = position.saturating_add(1).checked_rem(nodes.len()).unwrap_or(0);
            if let Some(&(next_phase, to)) = nodes.get(next) {
                ctx.controller.add_transition(
                    from,
                    |input| input.is("advance_phase"),
                    to,
                    format!("{phase} turns to {next_phase}"),
                )?;
            }
        }

        let root = nodes
            .iter()
            .find(|(phase, _)| *phase == current)
            .map(|&(_, id)| id)
            .ok_or_else(|| PluginError::rejected("no node for the current phase"))?;
        ctx.controller.set_system_root(SYSTEM, root)?;
        Ok(())
    }

    fn tick(&mut self, delta: f64, ctx: &mut SystemContext<'_>) -> Result<(), PluginError> {
        if !delta.is_finite() || delta < 0.0 {
            return Err(PluginError::InvalidField {
                field: "delta".to_owned(),
                reason: format!("tick delta must be a non-negative number, got {delta}"),
            });
        }
        self.carry_seconds += delta;

        let mut hours: u32 = 0;
        while self.carry_seconds >= self.seconds_per_hour && hours < MAX_HOURS_PER_STEP {
            self.carry_seconds -= self.seconds_per_hour;
            hours = hours.saturating_add(1);
        }
        if self.carry_seconds >= self.seconds_per_hour {
            warn!(
                carry_seconds = self.carry_seconds,
                "tick delta too large; dropping excess time"
            );
            self.carry_seconds %= self.seconds_per_hour;
        }
        self.advance_hours(hours, ctx)
    }

    fn handle_input(
        &mut self,
        input: &TransitionInput,
        ctx: &mut SystemContext<'_>,
    ) -> Result<TransitionOutcome, PluginError> {
        if !input.is("wait") {
            return ctx.process_input(SYSTEM, input).map_err(PluginError::from);
        }
        let requested = input.int("hours").unwrap_or(1);
        let hours = u32::try_from(requested)
            .ok()
            .filter(|hours| (1..=MAX_HOURS_PER_STEP).contains(hours))
            .ok_or_else(|| PluginError::InvalidField {
                field: "hours".to_owned(),
                reason: format!("can wait 1 to {MAX_HOURS_PER_STEP} hours, not {requested}"),
            })?;

        let before = ctx.controller.current_node(SYSTEM);
        self.advance_hours(hours, ctx)?;
        let next = ctx
            .controller
            .current_node(SYSTEM)
            .ok_or_else(|| PluginError::rejected("calendar has no current phase"))?;
        Ok(TransitionOutcome {
            handled: true,
            next,
            changed: before != Some(next),
        })
    }

    fn save_state(&self) -> Value {
        json!({
            "carrySeconds": self.carry_seconds,
            "hoursElapsed": self.hours_elapsed,
        })
    }

    fn load_state(&mut self, state: &Value, ctx: &mut SystemContext<'_>) -> Result<(), PluginError> {
        let snapshot: Snapshot = decode_state(state)?;
        if !snapshot.carry_seconds.is_finite() || snapshot.carry_seconds < 0.0 {
            return Err(PluginError::InvalidField {
                field: "carrySeconds".to_owned(),
                reason: format!("must be a non-negative number, got {}", snapshot.carry_seconds),
            });
        }
        let phase = ctx.world.world.time_of_day();
        ctx.controller
            .restore_current(SYSTEM, &Self::phase_node(phase))?;

        self.carry_seconds = snapshot.carry_seconds.min(self.seconds_per_hour);
        self.hours_elapsed = snapshot.hours_elapsed;
        Ok(())
    }

    fn handle_event(&mut self, _event: &GameEvent, _ctx: &mut SystemContext<'_>) -> bool {
        false
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use oath_core::{AutomatonController, WorldContext};
    use oath_types::Season;

    use super::*;

    fn setup(config: &CalendarConfig) -> (CalendarSystem, AutomatonController, WorldContext) {
        let mut system = CalendarSystem::new(config).unwrap();
        let mut controller = AutomatonController::new();
        let mut world = WorldContext::new();
        let mut ctx = SystemContext::new(&mut controller, &mut world);
        system.initialize(&mut ctx).unwrap();
        (system, controller, world)
    }

    #[test]
    fn rejects_bad_configuration() {
        let zero_hour = CalendarConfig {
            seconds_per_hour: 0.0,
            ..CalendarConfig::default()
        };
        assert!(CalendarSystem::new(&zero_hour).is_err());
        let late_start = CalendarConfig {
            starting_hour: 24,
            ..CalendarConfig::default()
        };
        assert!(CalendarSystem::new(&late_start).is_err());
    }

    #[test]
    fn starts_in_the_phase_of_the_starting_hour() {
        let (_, controller, world) = setup(&CalendarConfig::default());
        assert_eq!(world.world.hour, 8);
        assert_eq!(controller.current_node_name(SYSTEM), Some("calendar.morning"));
    }

    #[test]
    fn accumulates_partial_hours() {
        let (mut system, mut controller, mut world) = setup(&CalendarConfig::default());
        let mut ctx = SystemContext::new(&mut controller, &mut world);
        system.tick(30.0, &mut ctx).unwrap();
        assert!(ctx.emitted().is_empty());
        system.tick(45.0, &mut ctx).unwrap();
        assert_eq!(ctx.emitted(), &[GameEvent::HourPassed { day: 0, hour: 9 }]);
        assert_eq!(system.hours_elapsed(), 1);
    }

    #[test]
    fn phase_boundary_moves_the_automaton() {
        let (mut system, mut controller, mut world) = setup(&CalendarConfig::default());
        let mut ctx = SystemContext::new(&mut controller, &mut world);
        system.tick(4.0 * 60.0, &mut ctx).unwrap();
        drop(ctx);
        assert_eq!(world.world.hour, 12);
        assert_eq!(controller.current_node_name(SYSTEM), Some("calendar.afternoon"));
    }

    #[test]
    fn midnight_rolls_day_and_season() {
        let config = CalendarConfig {
            days_per_season: 1,
            ..CalendarConfig::default()
        };
        let (mut system, mut controller, mut world) = setup(&config);
        let mut ctx = SystemContext::new(&mut controller, &mut world);
        system.tick(16.0 * 60.0, &mut ctx).unwrap();
        let events = ctx.into_emitted();

        assert!(events.contains(&GameEvent::DayPassed { day: 1 }));
        assert!(events.contains(&GameEvent::SeasonChanged {
            season: Season::Summer
        }));
        assert_eq!(world.world.current_season, Season::Summer);
        assert_eq!(controller.current_node_name(SYSTEM), Some("calendar.night"));
    }

    #[test]
    fn negative_delta_is_rejected() {
        let (mut system, mut controller, mut world) = setup(&CalendarConfig::default());
        let mut ctx = SystemContext::new(&mut controller, &mut world);
        assert!(system.tick(-1.0, &mut ctx).is_err());
        assert!(system.tick(f64::NAN, &mut ctx).is_err());
    }

    #[test]
    fn waiting_advances_hours() {
        let (mut system, mut controller, mut world) = setup(&CalendarConfig::default());
        let mut ctx = SystemContext::new(&mut controller, &mut world);
        let outcome = system
            .handle_input(&TransitionInput::new("wait").with("hours", 10_i64), &mut ctx)
            .unwrap();
        assert!(outcome.handled && outcome.changed);
        assert_eq!(ctx.emitted().len(), 10);
        assert!(
            system
                .handle_input(&TransitionInput::new("wait").with("hours", 0_i64), &mut ctx)
                .is_err()
        );
    }

    #[test]
    fn load_restores_phase_from_world_hour() {
        let (mut system, mut controller, mut world) = setup(&CalendarConfig::default());
        world.world.hour = 22;
        let mut ctx = SystemContext::new(&mut controller, &mut world);
        system
            .load_state(&json!({ "carrySeconds": 12.5, "hoursElapsed": 40 }), &mut ctx)
            .unwrap();
        drop(ctx);
        assert_eq!(system.hours_elapsed(), 40);
        assert_eq!(system.save_state()["carrySeconds"], json!(12.5));
        assert_eq!(controller.current_node_name(SYSTEM), Some("calendar.night"));
    }

    #[test]
    fn load_rejects_negative_carry_without_mutating() {
        let (mut system, mut controller, mut world) = setup(&CalendarConfig::default());
        let mut ctx = SystemContext::new(&mut controller, &mut world);
        assert!(
            system
                .load_state(&json!({ "carrySeconds": -3.0, "hoursElapsed": 9 }), &mut ctx)
                .is_err()
        );
        assert_eq!(system.hours_elapsed(), 0);
    }
}
