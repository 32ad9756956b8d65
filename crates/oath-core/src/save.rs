//! The save document: the one externally visible artifact of the core.
//!
//! A document holds the common world and player sections plus one opaque
//! sub-document per registered system, keyed by system name. It is encoded
//! as JSON with camelCase keys:
//!
//! ```json
//! {
//!   "formatVersion": 1,
//!   "savedAt": "2026-01-01T00:00:00Z",
//!   "worldState": { "daysPassed": 3, "currentSeason": "spring", ... },
//!   "playerStats": { "strength": 10, "skills": { ... }, ... },
//!   "extras": { "mount": "horse" },
//!   "systems": { "crime": { ... }, "economy": { ... } }
//! }
//! ```
//!
//! Absent common sections mean "keep what is there"; absent fields inside a
//! present section fall back to defaults.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use oath_types::StateValue;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::{PlayerStats, WorldContext, WorldState};
use crate::plugin::PluginError;

/// Version written into new documents. Documents from newer builds are
/// refused.
pub const SAVE_FORMAT_VERSION: u32 = 1;

const fn current_format_version() -> u32 {
    SAVE_FORMAT_VERSION
}

/// Errors reading or writing a save document.
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    /// The document is not valid JSON or does not match the schema.
    #[error("save document is malformed: {0}")]
    Json(#[from] serde_json::Error),

    /// The save file could not be read or written.
    #[error("save file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The document was written by a newer build.
    #[error("save format version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        /// Version found in the document.
        found: u32,
        /// Highest version this build reads.
        supported: u32,
    },
}

/// A complete saved session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveDocument {
    /// Schema version of this document.
    #[serde(default = "current_format_version")]
    pub format_version: u32,
    /// When the document was produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
    /// Common world section.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub world_state: Option<WorldState>,
    /// Common player section.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_stats: Option<PlayerStats>,
    /// Ad-hoc values from [`WorldContext::extras`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extras: Option<BTreeMap<String, StateValue>>,
    /// Per-system sub-documents keyed by system name.
    #[serde(default)]
    pub systems: BTreeMap<String, Value>,
}

impl Default for SaveDocument {
    fn default() -> Self {
        Self {
            format_version: SAVE_FORMAT_VERSION,
            saved_at: None,
            world_state: None,
            player_stats: None,
            extras: None,
            systems: BTreeMap::new(),
        }
    }
}

impl SaveDocument {
    /// Snapshot the common sections of `world`, stamped with the current time.
    pub fn capture(world: &WorldContext) -> Self {
        Self {
            saved_at: Some(Utc::now()),
            world_state: Some(world.world.clone()),
            player_stats: Some(world.player.clone()),
            extras: Some(world.extras.clone()),
            ..Self::default()
        }
    }

    /// Sub-document of `system`.
    pub fn system(&self, system: &str) -> Option<&Value> {
        self.systems.get(system)
    }

    /// Store the sub-document of `system`, returning the previous one.
    pub fn insert_system(&mut self, system: impl Into<String>, state: Value) -> Option<Value> {
        self.systems.insert(system.into(), state)
    }

    /// Drop the sub-document of `system`.
    pub fn remove_system(&mut self, system: &str) -> Option<Value> {
        self.systems.remove(system)
    }

    /// Encode as pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String, SaveError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Decode from JSON, refusing documents from newer builds.
    pub fn from_json_str(json: &str) -> Result<Self, SaveError> {
        let document: Self = serde_json::from_str(json)?;
        if document.format_version > SAVE_FORMAT_VERSION {
            return Err(SaveError::UnsupportedVersion {
                found: document.format_version,
                supported: SAVE_FORMAT_VERSION,
            });
        }
        Ok(document)
    }

    /// Write the document to `path`, replacing any existing file.
    pub fn write_to(&self, path: &Path) -> Result<(), SaveError> {
        fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    /// Read a document from `path`.
    pub fn read_from(path: &Path) -> Result<Self, SaveError> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

/// What happened to each system during a load.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Whether the world section was present and applied.
    pub world_restored: bool,
    /// Whether the player section was present and applied.
    pub player_restored: bool,
    /// Whether the extras section was present and applied.
    pub extras_restored: bool,
    /// Systems whose state was restored, in registration order.
    pub restored: Vec<String>,
    /// Registered systems with no sub-document; they keep their current state.
    pub missing: Vec<String>,
    /// Sub-documents with no registered system; ignored.
    pub skipped: Vec<String>,
    /// Systems whose `load_state` failed; they keep their pre-load state.
    pub failed: Vec<(String, PluginError)>,
}

impl LoadReport {
    /// Whether every registered system present in the document loaded.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Whether `system` was restored.
    pub fn was_restored(&self, system: &str) -> bool {
        self.restored.iter().any(|name| name == system)
    }

    /// Names of the systems whose load failed.
    pub fn failed_systems(&self) -> impl Iterator<Item = &str> {
        self.failed.iter().map(|(name, _)| name.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use oath_types::Season;
    use serde_json::json;

    use super::*;

    #[test]
    fn capture_uses_camel_case_sections() {
        let mut world = WorldContext::new();
        world.world.days_passed = 12;
        world.player.strength = 14;
        let mut doc = SaveDocument::capture(&world);
        doc.insert_system("economy", json!({ "gold": 42 }));

        let value: Value = serde_json::from_str(&doc.to_json_string().unwrap()).unwrap();
        assert_eq!(value["formatVersion"], json!(SAVE_FORMAT_VERSION));
        assert_eq!(value["worldState"]["daysPassed"], json!(12));
        assert_eq!(value["playerStats"]["strength"], json!(14));
        assert_eq!(value["extras"], json!({}));
        assert_eq!(value["systems"]["economy"]["gold"], json!(42));
        assert!(value["savedAt"].is_string());
    }

    #[test]
    fn missing_sections_and_fields_default() {
        let doc = SaveDocument::from_json_str(
            r#"{ "worldState": { "daysPassed": 5, "currentSeason": "winter" } }"#,
        )
        .unwrap();
        assert_eq!(doc.format_version, SAVE_FORMAT_VERSION);
        assert!(doc.player_stats.is_none());
        assert!(doc.extras.is_none());
        assert!(doc.systems.is_empty());

        let world = doc.world_state.unwrap();
        assert_eq!(world.days_passed, 5);
        assert_eq!(world.current_season, Season::Winter);
        assert_eq!(world.hour, 8);
        assert_eq!(world.current_region(), "city");
    }

    #[test]
    fn extras_keep_their_value_shapes() {
        let mut world = WorldContext::new();
        world.set_extra("mount", "horse");
        world.set_extra("mount_stamina", 40_i64);
        world.set_extra("mount_saddled", true);
        let json = SaveDocument::capture(&world).to_json_string().unwrap();

        let read = SaveDocument::from_json_str(&json).unwrap();
        assert_eq!(read.extras.as_ref(), Some(&world.extras));
    }

    #[test]
    fn newer_format_is_refused() {
        let err = SaveDocument::from_json_str(r#"{ "formatVersion": 99 }"#).unwrap_err();
        assert!(matches!(
            err,
            SaveError::UnsupportedVersion { found: 99, supported: SAVE_FORMAT_VERSION }
        ));
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            SaveDocument::from_json_str("{ not json").unwrap_err(),
            SaveError::Json(_)
        ));
    }

    #[test]
    fn file_round_trip() {
        let path = std::env::temp_dir().join(format!("oath-save-{}.json", std::process::id()));
        let mut doc = SaveDocument::capture(&WorldContext::new());
        doc.insert_system("health", json!({ "current": 70 }));
        doc.write_to(&path).unwrap();

        let read = SaveDocument::read_from(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(read, doc);
    }

    #[test]
    fn report_queries() {
        let mut report = LoadReport::default();
        report.restored.push("health".into());
        assert!(report.is_complete());
        assert!(report.was_restored("health"));
        report.failed.push((
            "economy".into(),
            PluginError::MissingField {
                field: "gold".into(),
            },
        ));
        assert!(!report.is_complete());
        assert_eq!(report.failed_systems().collect::<Vec<_>>(), vec!["economy"]);
    }
}
