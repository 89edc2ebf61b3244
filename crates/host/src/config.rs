use serde::{Deserialize, Serialize};

use regionsync_chat::ChatRanges;
use regionsync_common::ActorRole;
use regionsync_stream::NotifierConfig;
use regionsync_sync::SyncConfig;

/// Configuration of one region host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Actor module this host runs.
    pub role: ActorRole,
    /// Absent means the region never synchronizes.
    pub sync: Option<SyncConfig>,
    pub notifier: NotifierConfig,
    pub chat: ChatRanges,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            role: ActorRole::ClientManager,
            sync: None,
            notifier: NotifierConfig::default(),
            chat: ChatRanges::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_sections_are_optional() {
        let cfg: HostConfig = serde_yaml::from_str(
            "role: scene_persistence\nsync:\n  enabled: true\n  actor_type: scene_persistence\n  actor_id: p1\nchat:\n  say: 30.0\n",
        )
        .unwrap();
        assert_eq!(cfg.role, ActorRole::ScenePersistence);
        assert_eq!(cfg.sync.as_ref().map(|s| s.actor_id.as_str()), Some("p1"));
        assert_eq!(cfg.chat.say, 30.0);
        assert_eq!(cfg.chat.whisper, 10.0);
        assert_eq!(cfg.notifier, NotifierConfig::default());
    }

    #[test]
    fn empty_document_is_default() {
        let cfg: HostConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg, HostConfig::default());
    }
}
