use serde::{Deserialize, Serialize};

/// The `sync` configuration section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub enabled: bool,
    /// Declared role, e.g. `scene_persistence`.
    pub actor_type: String,
    pub actor_id: String,
}

impl SyncConfig {
    pub fn new(actor_type: impl Into<String>, actor_id: impl Into<String>) -> Self {
        Self {
            enabled: true,
            actor_type: actor_type.into(),
            actor_id: actor_id.into(),
        }
    }
}
