use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Responsibility a region process declares in a multi-actor sync cluster.
///
/// Closed set: every actor module in the cluster is one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    ClientManager,
    PhysicsEngine,
    ScriptEngine,
    ScenePersistence,
}

impl ActorRole {
    pub const ALL: [ActorRole; 4] = [
        ActorRole::ClientManager,
        ActorRole::PhysicsEngine,
        ActorRole::ScriptEngine,
        ActorRole::ScenePersistence,
    ];

    /// Name used in configuration and in the cluster directory.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientManager => "client_manager",
            Self::PhysicsEngine => "physics_engine",
            Self::ScriptEngine => "script_engine",
            Self::ScenePersistence => "scene_persistence",
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a configured actor type names no known role.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown actor role {0:?}")]
pub struct UnknownRole(pub String);

impl FromStr for ActorRole {
    type Err = UnknownRole;

    /// Case-insensitive; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == wanted)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}
