//! Engine-level error types.

use oath_core::OrchestratorError;
use oath_core::SaveError;
use oath_core::calendar::CalendarError;
use oath_core::config::ConfigError;

/// Errors that stop the engine from starting or from saving on exit.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The configuration file could not be loaded.
    #[error("configuration error: {source}")]
    Config {
        /// The underlying configuration error.
        #[from]
        source: ConfigError,
    },

    /// The calendar configuration is unusable.
    #[error("calendar error: {source}")]
    Calendar {
        /// The underlying calendar error.
        #[from]
        source: CalendarError,
    },

    /// A system could not be registered with the orchestrator.
    #[error("registration error: {source}")]
    Registration {
        /// The underlying orchestrator error.
        #[from]
        source: OrchestratorError,
    },

    /// The save document could not be read or written.
    #[error("save error: {source}")]
    Save {
        /// The underlying save error.
        #[from]
        source: SaveError,
    },
}
