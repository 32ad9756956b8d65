//! A running game session: the orchestrator with every standard system
//! registered, the shared world it mutates, and where it is saved.

use std::path::{Path, PathBuf};

use oath_core::config::OathConfig;
use oath_core::{LoadReport, Orchestrator, SaveDocument, WorldContext};
use oath_types::Season;
use tracing::{debug, info, warn};

use crate::error::EngineError;

/// What one tick left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickSummary {
    /// Tick number, starting at 1.
    pub tick: u64,
    /// Whole days elapsed in the game world.
    pub days_passed: u32,
    /// Hour of day, 0-23.
    pub hour: u8,
    /// Current season.
    pub season: Season,
    /// Player gold.
    pub gold: i64,
    /// Player health.
    pub health: i32,
    /// Systems that failed to update this tick.
    pub failures: usize,
}

/// Orchestrator, world, and save location for one play session.
pub struct Session {
    orchestrator: Orchestrator,
    world: WorldContext,
    save_path: PathBuf,
    delta_seconds: f64,
    ticks: u64,
}

impl Session {
    /// Register every standard system and initialize them against a fresh
    /// world.
    ///
    /// Systems that fail to initialize are logged and skipped by every
    /// later tick; the session still starts.
    pub fn new(config: &OathConfig) -> Result<Self, EngineError> {
        let mut orchestrator = Orchestrator::new(&config.dispatch);
        for system in oath_systems::standard_systems(config)? {
            orchestrator.register_plugin(system)?;
        }

        let mut world = WorldContext::new();
        for error in orchestrator.initialize_all(&mut world) {
            warn!(error = %error, "System failed to initialize");
        }
        info!(
            systems = orchestrator.len(),
            save_path = %config.save.path,
            "Session ready"
        );

        Ok(Self {
            orchestrator,
            world,
            save_path: PathBuf::from(&config.save.path),
            delta_seconds: config.engine.delta_seconds,
            ticks: 0,
        })
    }

    /// Restore the session from its save file, if one exists.
    ///
    /// Returns `Ok(None)` when there is no save file yet. Systems whose
    /// sub-document fails to load keep their fresh state and are logged.
    pub fn restore(&mut self) -> Result<Option<LoadReport>, EngineError> {
        if !self.save_path.exists() {
            info!(path = %self.save_path.display(), "No save file, starting fresh");
            return Ok(None);
        }

        let document = SaveDocument::read_from(&self.save_path)?;
        let report = self
            .orchestrator
            .load_all_systems(&document, &mut self.world);
        for (system, error) in &report.failed {
            warn!(system = %system, error = %error, "System state not restored");
        }
        for system in &report.skipped {
            debug!(system = %system, "Save entry has no registered system");
        }
        info!(
            restored = report.restored.len(),
            missing = report.missing.len(),
            failed = report.failed.len(),
            days_passed = self.world.world.days_passed,
            "Save restored"
        );
        Ok(Some(report))
    }

    /// Advance every system by one tick of game time.
    pub fn step(&mut self) -> TickSummary {
        self.ticks = self.ticks.saturating_add(1);
        let errors = self
            .orchestrator
            .update_all(self.delta_seconds, &mut self.world);
        for error in &errors {
            warn!(tick = self.ticks, error = %error, "System update failed");
        }
        self.summary(errors.len())
    }

    /// Write the current session to its save file.
    pub fn save(&self) -> Result<(), EngineError> {
        let document = self.orchestrator.save_all_systems(&self.world);
        document.write_to(&self.save_path)?;
        info!(
            path = %self.save_path.display(),
            systems = document.systems.len(),
            "Session saved"
        );
        Ok(())
    }

    /// Shut every system down. The session cannot be stepped afterwards.
    pub fn shutdown(&mut self) {
        self.orchestrator.shutdown_all();
    }

    /// Ticks executed so far.
    pub const fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Where the session is saved.
    pub fn save_path(&self) -> &Path {
        &self.save_path
    }

    /// The shared world.
    pub const fn world(&self) -> &WorldContext {
        &self.world
    }

    /// The orchestrator driving every system.
    pub const fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    fn summary(&self, failures: usize) -> TickSummary {
        TickSummary {
            tick: self.ticks,
            days_passed: self.world.world.days_passed,
            hour: self.world.world.hour,
            season: self.world.world.current_season,
            gold: self.world.economy.gold,
            health: self.world.health.current,
            failures,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config_with_save(path: &Path) -> OathConfig {
        let mut config = OathConfig::default();
        config.save.path = path.display().to_string();
        config
    }

    fn scratch_path() -> PathBuf {
        std::env::temp_dir().join(format!("oath-session-{}.json", uuid::Uuid::new_v4()))
    }

    #[test]
    fn an_hour_of_ticks_advances_the_clock() {
        let path = scratch_path();
        let mut session = Session::new(&config_with_save(&path)).unwrap();
        assert_eq!(session.world().world.hour, 8);

        let summary = session.step();
        assert_eq!(summary.tick, 1);
        assert_eq!(summary.hour, 9);
        assert_eq!(summary.failures, 0);
        assert_eq!(summary.gold, 1000);
        assert_eq!(session.ticks(), 1);
    }

    #[test]
    fn restore_without_a_save_file_starts_fresh() {
        let path = scratch_path();
        let mut session = Session::new(&config_with_save(&path)).unwrap();
        assert!(session.restore().unwrap().is_none());
        assert_eq!(session.world().world.days_passed, 0);
    }

    #[test]
    fn saved_sessions_resume_where_they_left_off() {
        let path = scratch_path();
        let config = config_with_save(&path);

        let mut first = Session::new(&config).unwrap();
        for _ in 0..30 {
            first.step();
        }
        first.save().unwrap();
        assert_eq!(first.save_path(), path.as_path());

        let mut second = Session::new(&config).unwrap();
        let report = second.restore().unwrap().unwrap();
        assert!(report.is_complete());
        assert_eq!(report.restored.len(), 7);
        assert_eq!(second.world().world, first.world().world);
        assert_eq!(
            second.orchestrator().controller().current_node_name("calendar"),
            first.orchestrator().controller().current_node_name("calendar")
        );

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn a_corrupt_save_file_is_an_error() {
        let path = scratch_path();
        std::fs::write(&path, "{ not json").unwrap();
        let mut session = Session::new(&config_with_save(&path)).unwrap();
        assert!(matches!(
            session.restore(),
            Err(EngineError::Save { .. })
        ));
        std::fs::remove_file(&path).unwrap();
    }
}
