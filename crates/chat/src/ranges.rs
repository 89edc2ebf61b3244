use serde::{Deserialize, Serialize};

use regionsync_kernel::ChatType;

/// Audible radius, in metres, for each distance-limited chat type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatRanges {
    pub whisper: f64,
    pub say: f64,
    pub shout: f64,
}

impl Default for ChatRanges {
    fn default() -> Self {
        Self {
            whisper: 10.0,
            say: 20.0,
            shout: 100.0,
        }
    }
}

impl ChatRanges {
    /// `None` means unlimited within the source region.
    pub fn radius(&self, chat_type: ChatType) -> Option<f64> {
        match chat_type {
            ChatType::Whisper => Some(self.whisper),
            ChatType::Say => Some(self.say),
            ChatType::Shout => Some(self.shout),
            ChatType::Region => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_grow_with_reach() {
        let r = ChatRanges::default();
        assert!(r.radius(ChatType::Whisper) < r.radius(ChatType::Say));
        assert!(r.radius(ChatType::Say) < r.radius(ChatType::Shout));
        assert_eq!(r.radius(ChatType::Region), None);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let r: ChatRanges = serde_json::from_str(r#"{ "shout": 250.0 }"#).unwrap();
        assert_eq!(r.shout, 250.0);
        assert_eq!(r.say, 20.0);
    }
}
