use glam::DVec3;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use regionsync_common::{AvatarId, Region, RegionId, to_global};
use regionsync_kernel::{
    ChatDelivery, ChatType, DeliveryError, Presence, PresenceRegistry, SceneObject, SourceKind,
};

use crate::ranges::ChatRanges;

/// Open chat heard by nearby viewers.
pub const PUBLIC_CHANNEL: i32 = 0;
/// Script debug output, also shown to viewers.
pub const DEBUG_CHANNEL: i32 = i32::MAX;

/// A chat-like event as emitted by its source.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub text: String,
    pub chat_type: ChatType,
    pub channel: i32,
    pub audible: bool,
}

impl ChatMessage {
    pub fn new(text: impl Into<String>, chat_type: ChatType) -> Self {
        Self {
            text: text.into(),
            chat_type,
            channel: PUBLIC_CHANNEL,
            audible: true,
        }
    }

    pub fn say(text: impl Into<String>) -> Self {
        Self::new(text, ChatType::Say)
    }

    pub fn on_channel(mut self, channel: i32) -> Self {
        self.channel = channel;
        self
    }

    pub fn inaudible(mut self) -> Self {
        self.audible = false;
        self
    }

    /// Only the public and debug channels reach viewers; other channels are
    /// for scripts listening in-world.
    pub fn reaches_viewers(&self) -> bool {
        self.channel == PUBLIC_CHANNEL || self.channel == DEBUG_CHANNEL
    }
}

/// Who is speaking, and from where.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSource {
    pub id: uuid::Uuid,
    pub name: String,
    pub owner: uuid::Uuid,
    pub kind: SourceKind,
    pub region: RegionId,
    /// World-global position.
    pub position: DVec3,
}

impl ChatSource {
    /// An avatar speaking through its presence in `region`.
    pub fn avatar(presence: &Presence, region: &Region) -> Self {
        Self {
            id: presence.avatar.0,
            name: presence.name.clone(),
            owner: presence.avatar.0,
            kind: SourceKind::Avatar,
            region: region.id(),
            position: presence.global_position(region),
        }
    }

    /// A scene object speaking from `region`.
    pub fn object(object: &SceneObject, region: &Region) -> Self {
        Self {
            id: object.id.0,
            name: object.name.clone(),
            owner: object.owner.0,
            kind: SourceKind::Object,
            region: region.id(),
            position: to_global(object.position, region),
        }
    }
}

/// Outcome of one fan-out.
#[derive(Debug, Default)]
pub struct DeliveryReport {
    pub delivered: Vec<AvatarId>,
    pub failed: Vec<(AvatarId, DeliveryError)>,
    /// The channel does not reach viewers; nothing was attempted.
    pub suppressed: bool,
}

impl DeliveryReport {
    pub fn reached(&self, avatar: AvatarId) -> bool {
        self.delivered.contains(&avatar)
    }

    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }
}

/// Fans chat out to presences within audible range.
#[derive(Debug, Clone, Default)]
pub struct ProximityDelivery {
    ranges: ChatRanges,
}

impl ProximityDelivery {
    pub fn new(ranges: ChatRanges) -> Self {
        Self { ranges }
    }

    pub fn ranges(&self) -> &ChatRanges {
        &self.ranges
    }

    /// Deliver `message` to every presence in `participants` that can hear
    /// `source`.
    ///
    /// Each registry is evaluated from its own presence instances, Root and
    /// Child. Region-wide messages stay in the source region. Every registry
    /// is snapshotted before any client is invoked.
    pub fn deliver(
        &self,
        source: &ChatSource,
        message: &ChatMessage,
        participants: &[&PresenceRegistry],
    ) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        if !message.reaches_viewers() {
            report.suppressed = true;
            return report;
        }
        let radius = self.ranges.radius(message.chat_type);

        let mut hearers: BTreeMap<AvatarId, (Presence, DVec3)> = BTreeMap::new();
        for registry in participants {
            let region = registry.region();
            if radius.is_none() && region.id() != source.region {
                continue;
            }
            for presence in registry.list_presences() {
                let global = presence.global_position(region);
                if radius.is_some_and(|r| global.distance(source.position) > r) {
                    continue;
                }
                match hearers.entry(presence.avatar) {
                    Entry::Vacant(slot) => {
                        slot.insert((presence, global));
                    }
                    Entry::Occupied(mut slot) => {
                        if presence.is_root() && !slot.get().0.is_root() {
                            slot.insert((presence, global));
                        }
                    }
                }
            }
        }

        for (avatar, (presence, _)) in hearers {
            let delivery = ChatDelivery {
                recipient: avatar,
                text: message.text.clone(),
                chat_type: message.chat_type,
                channel: message.channel,
                source_pos: source.position,
                source_name: source.name.clone(),
                source_id: source.id,
                owner_id: source.owner,
                source_kind: source.kind,
                audible: message.audible,
            };
            match presence.client.deliver_chat(&delivery) {
                Ok(()) => report.delivered.push(avatar),
                Err(e) => {
                    tracing::warn!(%avatar, error = %e, "chat delivery failed");
                    report.failed.push((avatar, e));
                }
            }
        }
        tracing::debug!(
            source = %source.name,
            chat_type = ?message.chat_type,
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "chat fan-out"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regionsync_kernel::{ClientHandle, EstablishmentTicket, RootClaims};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    struct Inbox {
        heard: Mutex<Vec<ChatDelivery>>,
    }

    impl Inbox {
        fn count(&self) -> usize {
            self.heard.lock().unwrap().len()
        }
    }

    impl ClientHandle for Inbox {
        fn deliver_chat(&self, delivery: &ChatDelivery) -> Result<(), DeliveryError> {
            self.heard.lock().unwrap().push(delivery.clone());
            Ok(())
        }
    }

    #[derive(Debug)]
    struct Gone(AvatarId);

    impl ClientHandle for Gone {
        fn deliver_chat(&self, _delivery: &ChatDelivery) -> Result<(), DeliveryError> {
            Err(DeliveryError::Disconnected(self.0))
        }
    }

    fn east() -> Region {
        Region::new(RegionId::from_tail(2), "east", 1001, 1000)
    }

    fn registry() -> PresenceRegistry {
        PresenceRegistry::new(east(), RootClaims::new())
    }

    fn root(reg: &mut PresenceRegistry, name: &str, pos: DVec3, client: Arc<dyn ClientHandle>) -> AvatarId {
        let id = AvatarId::new();
        reg.upsert_root(id, name, pos, false, client).unwrap();
        id
    }

    fn speaker(reg: &PresenceRegistry, id: AvatarId) -> ChatSource {
        ChatSource::avatar(reg.get(id).unwrap(), reg.region())
    }

    #[test]
    fn say_reaches_within_radius_only() {
        let mut reg = registry();
        let near = Arc::new(Inbox::default());
        let far = Arc::new(Inbox::default());
        let talker = root(&mut reg, "talker", DVec3::new(6.0, 128.0, 20.0), Arc::new(Inbox::default()));
        root(&mut reg, "near", DVec3::new(26.0, 128.0, 20.0), near.clone());
        root(&mut reg, "far", DVec3::new(26.5, 128.0, 20.0), far.clone());

        let report = ProximityDelivery::default().deliver(
            &speaker(&reg, talker),
            &ChatMessage::say("hello"),
            &[&reg],
        );
        assert_eq!(near.count(), 1);
        assert_eq!(far.count(), 0);
        assert_eq!(report.attempted(), 2);
    }

    #[test]
    fn child_presence_hears_through_its_handle() {
        let mut reg = registry();
        let remote = Arc::new(Inbox::default());
        let talker = root(&mut reg, "talker", DVec3::new(6.0, 128.0, 20.0), Arc::new(Inbox::default()));
        let listener = AvatarId::new();
        reg.upsert_child(
            listener,
            "listener",
            RegionId::from_tail(1),
            DVec3::new(-6.0, 128.0, 20.0),
            EstablishmentTicket {
                issuer: RegionId::from_tail(1),
                seq: 1,
            },
            remote.clone(),
        );

        let report = ProximityDelivery::default().deliver(
            &speaker(&reg, talker),
            &ChatMessage::say("over the border"),
            &[&reg],
        );
        assert!(report.reached(listener));
        let heard = remote.heard.lock().unwrap();
        assert_eq!(heard[0].source_pos, DVec3::new(256_262.0, 256_128.0, 20.0));
        assert_eq!(heard[0].source_kind, SourceKind::Avatar);
        assert_eq!(heard[0].owner_id, talker.0);
    }

    #[test]
    fn failed_recipient_does_not_stop_fan_out() {
        let mut reg = registry();
        let ok = Arc::new(Inbox::default());
        let talker = root(&mut reg, "talker", DVec3::new(10.0, 10.0, 0.0), Arc::new(Inbox::default()));
        let gone_id = AvatarId::new();
        reg.upsert_root(gone_id, "gone", DVec3::new(11.0, 10.0, 0.0), false, Arc::new(Gone(gone_id)))
            .unwrap();
        root(&mut reg, "ok", DVec3::new(12.0, 10.0, 0.0), ok.clone());

        let report = ProximityDelivery::default().deliver(
            &speaker(&reg, talker),
            &ChatMessage::new("psst", ChatType::Whisper),
            &[&reg],
        );
        assert_eq!(ok.count(), 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, gone_id);
    }

    #[test]
    fn region_wide_ignores_distance_but_not_region() {
        let mut reg = registry();
        let corner = Arc::new(Inbox::default());
        let talker = root(&mut reg, "talker", DVec3::new(0.0, 0.0, 0.0), Arc::new(Inbox::default()));
        root(&mut reg, "corner", DVec3::new(255.0, 255.0, 4000.0), corner.clone());

        let mut other = PresenceRegistry::new(
            Region::new(RegionId::from_tail(3), "north", 1001, 1001),
            RootClaims::new(),
        );
        let outsider = Arc::new(Inbox::default());
        root(&mut other, "outsider", DVec3::new(0.0, 0.0, 0.0), outsider.clone());

        ProximityDelivery::default().deliver(
            &speaker(&reg, talker),
            &ChatMessage::new("announcement", ChatType::Region),
            &[&reg, &other],
        );
        assert_eq!(corner.count(), 1);
        assert_eq!(outsider.count(), 0);
    }

    #[test]
    fn private_channels_never_reach_viewers() {
        let mut reg = registry();
        let near = Arc::new(Inbox::default());
        let talker = root(&mut reg, "talker", DVec3::ZERO, Arc::new(Inbox::default()));
        root(&mut reg, "near", DVec3::new(1.0, 0.0, 0.0), near.clone());
        let source = speaker(&reg, talker);
        let delivery = ProximityDelivery::default();

        let report = delivery.deliver(&source, &ChatMessage::say("cmd").on_channel(42), &[&reg]);
        assert!(report.suppressed);
        assert_eq!(near.count(), 0);

        delivery.deliver(&source, &ChatMessage::say("dbg").on_channel(DEBUG_CHANNEL), &[&reg]);
        assert_eq!(near.count(), 1);
    }

    #[test]
    fn avatar_hears_once_preferring_root() {
        let claims = RootClaims::new();
        let mut home = PresenceRegistry::new(east(), claims.clone());
        let west = Region::new(RegionId::from_tail(1), "west", 1000, 1000);
        let mut neighbour = PresenceRegistry::new(west.clone(), claims);

        let root_inbox = Arc::new(Inbox::default());
        let child_inbox = Arc::new(Inbox::default());
        let talker = root(&mut home, "talker", DVec3::new(2.0, 128.0, 20.0), Arc::new(Inbox::default()));
        let both = root(&mut home, "both", DVec3::new(4.0, 128.0, 20.0), root_inbox.clone());
        neighbour.upsert_child(
            both,
            "both",
            east().id(),
            DVec3::new(260.0, 128.0, 20.0),
            EstablishmentTicket {
                issuer: east().id(),
                seq: 1,
            },
            child_inbox.clone(),
        );

        let report = ProximityDelivery::default().deliver(
            &speaker(&home, talker),
            &ChatMessage::say("once"),
            &[&neighbour, &home],
        );
        assert_eq!(root_inbox.count(), 1);
        assert_eq!(child_inbox.count(), 0);
        assert_eq!(report.delivered.iter().filter(|a| **a == both).count(), 1);
    }

    #[test]
    fn object_source_carries_owner() {
        let mut reg = registry();
        let near = Arc::new(Inbox::default());
        root(&mut reg, "near", DVec3::new(5.0, 5.0, 0.0), near.clone());
        let owner = AvatarId::new();
        let obj = SceneObject::new(east().id(), "parrot", owner, DVec3::new(6.0, 5.0, 0.0));

        ProximityDelivery::default().deliver(
            &ChatSource::object(&obj, reg.region()),
            &ChatMessage::new("squawk", ChatType::Shout),
            &[&reg],
        );
        let heard = near.heard.lock().unwrap();
        assert_eq!(heard[0].source_kind, SourceKind::Object);
        assert_eq!(heard[0].owner_id, owner.0);
        assert_eq!(heard[0].source_id, obj.id.0);
    }
}
