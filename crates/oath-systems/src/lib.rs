//! Gameplay systems for the Oath simulation.
//!
//! Each system is a [`SystemPlugin`] that owns one automaton in the shared
//! controller, keeps its own private state, and mirrors what other systems
//! may read into the shared [`WorldContext`](oath_core::WorldContext). Systems
//! never call each other; they react to [`GameEvent`](oath_types::GameEvent)s
//! broadcast by the orchestrator.
//!
//! # Modules
//!
//! - [`calendar`] -- Turns elapsed seconds into game hours, days, and seasons
//! - [`weather`] -- Season-weighted daily weather ([`WeatherSystem`])
//! - [`crime`] -- Criminal record, bounties, arrests, and jail ([`CrimeSystem`])
//! - [`health`] -- Health, disease, and recovery ([`HealthSystem`])
//! - [`economy`] -- Gold, market prices, and trade ([`EconomySystem`])
//! - [`faction`] -- Faction reputation, ranks, and politics ([`FactionSystem`])
//! - [`relationships`] -- Affinity with individual NPCs ([`RelationshipSystem`])

pub mod calendar;
pub mod crime;
pub mod economy;
pub mod faction;
pub mod health;
pub mod relationships;
pub mod weather;

use oath_core::SystemPlugin;
use oath_core::calendar::CalendarError;
use oath_core::config::OathConfig;

pub use calendar::CalendarSystem;
pub use crime::CrimeSystem;
pub use economy::EconomySystem;
pub use faction::FactionSystem;
pub use health::HealthSystem;
pub use relationships::RelationshipSystem;
pub use weather::WeatherSystem;

/// Qualified node name: `"<system>.<node>"`.
pub(crate) fn node_name(system: &str, node: &str) -> String {
    format!("{system}.{node}")
}

/// Build every standard system in registration order: calendar first so
/// time events originate before anything reacts to them, relationships
/// last.
///
/// # Errors
///
/// Fails when the calendar configuration is unusable.
pub fn standard_systems(config: &OathConfig) -> Result<Vec<Box<dyn SystemPlugin>>, CalendarError> {
    Ok(vec![
        Box::new(CalendarSystem::new(&config.calendar)?),
        Box::new(WeatherSystem::new(&config.weather)),
        Box::new(CrimeSystem::new(&config.crime)),
        Box::new(HealthSystem::new(&config.health)),
        Box::new(EconomySystem::new(&config.economy)),
        Box::new(FactionSystem::new(&config.faction)),
        Box::new(RelationshipSystem::new(&config.relationships)),
    ])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn standard_systems_have_unique_names_in_order() {
        let systems = standard_systems(&OathConfig::default()).unwrap();
        let names: Vec<&str> = systems.iter().map(|system| system.name()).collect();
        assert_eq!(
            names,
            vec![
                "calendar",
                "weather",
                "crime",
                "health",
                "economy",
                "faction",
                "relationships"
            ]
        );
    }

    #[test]
    fn node_names_are_qualified() {
        assert_eq!(node_name("crime", "wanted"), "crime.wanted");
    }
}
