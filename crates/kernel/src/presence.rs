use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::Arc;

use regionsync_common::{AvatarId, Region, RegionId, to_global};

use crate::claims::RootClaims;
use crate::client::ClientHandle;

/// Retired establishment tickets remembered per region before the oldest is forgotten.
const RETIRED_CAPACITY: usize = 4096;

/// Identifies one child-presence establishment issued by a root region.
///
/// Sequence numbers grow monotonically per issuing region, so a newer
/// establishment from the same root always supersedes an older one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EstablishmentTicket {
    pub issuer: RegionId,
    pub seq: u64,
}

/// Whether a presence is authoritative or a neighbour's mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceKind {
    Root,
    Child {
        /// Region holding the avatar's Root.
        root_region: RegionId,
        ticket: EstablishmentTicket,
    },
}

/// An avatar as seen by one region.
#[derive(Debug, Clone)]
pub struct Presence {
    pub avatar: AvatarId,
    pub name: String,
    pub region: RegionId,
    pub kind: PresenceKind,
    /// Position in the owning region's local frame.
    pub position: DVec3,
    /// Supplied by physics; never computed here.
    pub flying: bool,
    pub client: Arc<dyn ClientHandle>,
}

impl Presence {
    pub fn is_root(&self) -> bool {
        matches!(self.kind, PresenceKind::Root)
    }

    pub fn is_child(&self) -> bool {
        !self.is_root()
    }

    /// Position in the world-global frame. `region` must be the owning region.
    pub fn global_position(&self, region: &Region) -> DVec3 {
        debug_assert_eq!(region.id(), self.region);
        to_global(self.position, region)
    }
}

/// Errors from presence registry operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PresenceError {
    /// Another region holds an unreleased Root claim for this avatar.
    #[error("avatar {avatar} already has a root presence in region {held_by}")]
    Conflict { avatar: AvatarId, held_by: RegionId },
}

/// Outcome of [`PresenceRegistry::upsert_root`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootUpsert {
    Created,
    Moved,
    /// A local Child mirror became the Root (avatar crossed into this region).
    Promoted,
}

/// Outcome of child create/update calls. Only `Created` and `Updated` mutate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildUpsert {
    Created,
    Updated,
    /// The ticket was retired or superseded; the call was absorbed.
    Stale,
    /// This region holds the avatar's Root; mirrors never overwrite it.
    RootHeld,
    /// Position-only update for a presence that does not exist here.
    Absent,
}

impl ChildUpsert {
    pub fn applied(self) -> bool {
        matches!(self, Self::Created | Self::Updated)
    }
}

/// Per-region table of avatar presences, Root or Child, keyed by avatar.
///
/// Holds at most one presence per avatar. Root claims go through the shared
/// [`RootClaims`] ledger so no avatar is ever rooted in two regions.
#[derive(Debug)]
pub struct PresenceRegistry {
    region: Region,
    claims: RootClaims,
    presences: BTreeMap<AvatarId, Presence>,
    /// For locally rooted avatars: neighbours currently holding a Child mirror.
    mirrors: BTreeMap<AvatarId, BTreeSet<RegionId>>,
    retired: VecDeque<EstablishmentTicket>,
    retired_set: HashSet<EstablishmentTicket>,
}

impl PresenceRegistry {
    pub fn new(region: Region, claims: RootClaims) -> Self {
        Self {
            region,
            claims,
            presences: BTreeMap::new(),
            mirrors: BTreeMap::new(),
            retired: VecDeque::new(),
            retired_set: HashSet::new(),
        }
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn len(&self) -> usize {
        self.presences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presences.is_empty()
    }

    pub fn get(&self, avatar: AvatarId) -> Option<&Presence> {
        self.presences.get(&avatar)
    }

    /// Establish or move the sole Root presence of `avatar` in this region.
    pub fn upsert_root(
        &mut self,
        avatar: AvatarId,
        name: &str,
        position: DVec3,
        flying: bool,
        client: Arc<dyn ClientHandle>,
    ) -> Result<RootUpsert, PresenceError> {
        self.claims
            .claim(avatar, self.region.id())
            .map_err(|held_by| PresenceError::Conflict { avatar, held_by })?;

        let outcome = match self.presences.get(&avatar).map(|p| p.kind) {
            Some(PresenceKind::Root) => RootUpsert::Moved,
            Some(PresenceKind::Child { ticket, .. }) => {
                self.retire(ticket);
                RootUpsert::Promoted
            }
            None => RootUpsert::Created,
        };
        match self.presences.get_mut(&avatar) {
            Some(p) if outcome == RootUpsert::Moved => {
                p.position = position;
                p.flying = flying;
                p.client = client;
            }
            _ => {
                self.presences.insert(
                    avatar,
                    Presence {
                        avatar,
                        name: name.to_string(),
                        region: self.region.id(),
                        kind: PresenceKind::Root,
                        position,
                        flying,
                        client,
                    },
                );
            }
        }
        if outcome != RootUpsert::Moved {
            tracing::debug!(%avatar, region = self.region.name(), ?outcome, "root presence");
        }
        Ok(outcome)
    }

    /// Create or update the Child mirror of `avatar` established under `ticket`.
    pub fn upsert_child(
        &mut self,
        avatar: AvatarId,
        name: &str,
        root_region: RegionId,
        position: DVec3,
        ticket: EstablishmentTicket,
        client: Arc<dyn ClientHandle>,
    ) -> ChildUpsert {
        if self.is_retired(ticket) {
            return ChildUpsert::Stale;
        }
        match self.presences.get(&avatar).map(|p| p.kind) {
            Some(PresenceKind::Root) => ChildUpsert::RootHeld,
            Some(PresenceKind::Child { ticket: current, .. }) if current == ticket => {
                if let Some(p) = self.presences.get_mut(&avatar) {
                    p.position = position;
                }
                ChildUpsert::Updated
            }
            Some(PresenceKind::Child { ticket: current, .. })
                if current.issuer == ticket.issuer && current.seq > ticket.seq =>
            {
                ChildUpsert::Stale
            }
            previous => {
                if let Some(PresenceKind::Child { ticket: current, .. }) = previous {
                    self.retire(current);
                }
                self.insert_child(avatar, name, root_region, position, ticket, client);
                ChildUpsert::Created
            }
        }
    }

    /// Move an existing Child mirror. Never creates one.
    pub fn update_child(
        &mut self,
        avatar: AvatarId,
        position: DVec3,
        ticket: EstablishmentTicket,
    ) -> ChildUpsert {
        if self.is_retired(ticket) {
            return ChildUpsert::Stale;
        }
        match self.presences.get_mut(&avatar) {
            None => ChildUpsert::Absent,
            Some(p) => match p.kind {
                PresenceKind::Root => ChildUpsert::RootHeld,
                PresenceKind::Child { ticket: current, .. } if current == ticket => {
                    p.position = position;
                    ChildUpsert::Updated
                }
                PresenceKind::Child { .. } => ChildUpsert::Stale,
            },
        }
    }

    /// Remove the Child mirror of `avatar`, if any, retiring its ticket.
    pub fn remove_child(&mut self, avatar: AvatarId) -> Option<Presence> {
        match self.presences.get(&avatar)?.kind {
            PresenceKind::Root => None,
            PresenceKind::Child { ticket, .. } => {
                self.retire(ticket);
                self.presences.remove(&avatar)
            }
        }
    }

    /// Retire `ticket` and drop the mirror it established, if still current.
    ///
    /// Retiring first means an establishment still in flight for that ticket
    /// is absorbed when it lands.
    pub fn close_child(&mut self, avatar: AvatarId, ticket: EstablishmentTicket) -> Option<Presence> {
        self.retire(ticket);
        match self.presences.get(&avatar)?.kind {
            PresenceKind::Child { ticket: current, .. } if current == ticket => {
                self.presences.remove(&avatar)
            }
            _ => None,
        }
    }

    /// Remove the Root presence of `avatar` and release its cluster claim.
    pub fn remove_root(&mut self, avatar: AvatarId) -> Option<Presence> {
        if !self.presences.get(&avatar)?.is_root() {
            return None;
        }
        self.claims.release(avatar, self.region.id());
        self.mirrors.remove(&avatar);
        self.presences.remove(&avatar)
    }

    /// Snapshot of every presence in this region, Root and Child.
    pub fn list_presences(&self) -> Vec<Presence> {
        self.presences.values().cloned().collect()
    }

    pub fn roots(&self) -> impl Iterator<Item = &Presence> {
        self.presences.values().filter(|p| p.is_root())
    }

    pub fn children(&self) -> impl Iterator<Item = &Presence> {
        self.presences.values().filter(|p| p.is_child())
    }

    /// Record that `neighbour` now mirrors the locally rooted `avatar`.
    pub fn record_mirror(&mut self, avatar: AvatarId, neighbour: RegionId) {
        if self.presences.get(&avatar).is_some_and(Presence::is_root) {
            self.mirrors.entry(avatar).or_default().insert(neighbour);
        }
    }

    pub fn drop_mirror(&mut self, avatar: AvatarId, neighbour: RegionId) {
        if let Some(set) = self.mirrors.get_mut(&avatar) {
            set.remove(&neighbour);
            if set.is_empty() {
                self.mirrors.remove(&avatar);
            }
        }
    }

    /// Neighbours holding a Child mirror of the locally rooted `avatar`.
    pub fn mirrored_in(&self, avatar: AvatarId) -> BTreeSet<RegionId> {
        self.mirrors.get(&avatar).cloned().unwrap_or_default()
    }

    pub fn is_retired(&self, ticket: EstablishmentTicket) -> bool {
        self.retired_set.contains(&ticket)
    }

    fn insert_child(
        &mut self,
        avatar: AvatarId,
        name: &str,
        root_region: RegionId,
        position: DVec3,
        ticket: EstablishmentTicket,
        client: Arc<dyn ClientHandle>,
    ) {
        self.presences.insert(
            avatar,
            Presence {
                avatar,
                name: name.to_string(),
                region: self.region.id(),
                kind: PresenceKind::Child {
                    root_region,
                    ticket,
                },
                position,
                flying: false,
                client,
            },
        );
    }

    fn retire(&mut self, ticket: EstablishmentTicket) {
        if !self.retired_set.insert(ticket) {
            return;
        }
        self.retired.push_back(ticket);
        if self.retired.len() > RETIRED_CAPACITY {
            if let Some(oldest) = self.retired.pop_front() {
                self.retired_set.remove(&oldest);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::NullClient;

    fn client() -> Arc<dyn ClientHandle> {
        Arc::new(NullClient)
    }

    fn region(tail: u128, x: u32) -> Region {
        Region::new(RegionId::from_tail(tail), format!("r{tail}"), x, 1000)
    }

    fn ticket(issuer: RegionId, seq: u64) -> EstablishmentTicket {
        EstablishmentTicket { issuer, seq }
    }

    #[test]
    fn root_then_move() {
        let mut reg = PresenceRegistry::new(region(1, 1000), RootClaims::new());
        let a = AvatarId::new();
        let first = reg.upsert_root(a, "a", DVec3::new(1.0, 2.0, 3.0), false, client());
        assert_eq!(first, Ok(RootUpsert::Created));
        let second = reg.upsert_root(a, "a", DVec3::new(4.0, 2.0, 3.0), true, client());
        assert_eq!(second, Ok(RootUpsert::Moved));

        let p = reg.get(a).unwrap();
        assert!(p.is_root());
        assert!(p.flying);
        assert_eq!(p.position.x, 4.0);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn double_root_across_regions_conflicts() {
        let claims = RootClaims::new();
        let mut west = PresenceRegistry::new(region(1, 1000), claims.clone());
        let mut east = PresenceRegistry::new(region(2, 1001), claims.clone());
        let a = AvatarId::new();

        west.upsert_root(a, "a", DVec3::ZERO, false, client()).unwrap();
        let err = east
            .upsert_root(a, "a", DVec3::ZERO, false, client())
            .unwrap_err();
        assert_eq!(
            err,
            PresenceError::Conflict {
                avatar: a,
                held_by: west.region().id()
            }
        );
        assert!(east.get(a).is_none());

        // Explicit release lets the other region take over.
        west.remove_root(a);
        assert!(east.upsert_root(a, "a", DVec3::ZERO, false, client()).is_ok());
        assert_eq!(claims.holder(a), Some(east.region().id()));
    }

    #[test]
    fn child_upsert_is_idempotent() {
        let mut reg = PresenceRegistry::new(region(2, 1001), RootClaims::new());
        let root = RegionId::from_tail(1);
        let a = AvatarId::new();
        let t = ticket(root, 1);

        let p = DVec3::new(-6.0, 128.0, 20.0);
        assert_eq!(reg.upsert_child(a, "a", root, p, t, client()), ChildUpsert::Created);
        assert_eq!(reg.upsert_child(a, "a", root, p, t, client()), ChildUpsert::Updated);
        assert_eq!(reg.children().count(), 1);
        assert_eq!(reg.get(a).unwrap().position, p);
    }

    #[test]
    fn removed_child_is_not_resurrected_by_late_update() {
        let mut reg = PresenceRegistry::new(region(2, 1001), RootClaims::new());
        let root = RegionId::from_tail(1);
        let a = AvatarId::new();
        let t = ticket(root, 7);

        reg.upsert_child(a, "a", root, DVec3::ZERO, t, client());
        assert!(reg.remove_child(a).is_some());

        assert_eq!(reg.update_child(a, DVec3::ONE, t), ChildUpsert::Stale);
        assert_eq!(reg.upsert_child(a, "a", root, DVec3::ONE, t, client()), ChildUpsert::Stale);
        assert!(reg.get(a).is_none());

        // A fresh establishment is accepted.
        let fresh = ticket(root, 8);
        assert_eq!(
            reg.upsert_child(a, "a", root, DVec3::ONE, fresh, client()),
            ChildUpsert::Created
        );
    }

    #[test]
    fn close_before_establishment_absorbs_it() {
        let mut reg = PresenceRegistry::new(region(2, 1001), RootClaims::new());
        let root = RegionId::from_tail(1);
        let a = AvatarId::new();
        let t = ticket(root, 3);

        assert!(reg.close_child(a, t).is_none());
        assert_eq!(reg.upsert_child(a, "a", root, DVec3::ZERO, t, client()), ChildUpsert::Stale);
        assert!(reg.is_empty());
    }

    #[test]
    fn update_never_creates() {
        let mut reg = PresenceRegistry::new(region(2, 1001), RootClaims::new());
        let t = ticket(RegionId::from_tail(1), 1);
        assert_eq!(reg.update_child(AvatarId::new(), DVec3::ZERO, t), ChildUpsert::Absent);
        assert!(reg.is_empty());
    }

    #[test]
    fn older_ticket_does_not_replace_newer() {
        let mut reg = PresenceRegistry::new(region(2, 1001), RootClaims::new());
        let root = RegionId::from_tail(1);
        let a = AvatarId::new();
        reg.upsert_child(a, "a", root, DVec3::ZERO, ticket(root, 5), client());
        assert_eq!(
            reg.upsert_child(a, "a", root, DVec3::ONE, ticket(root, 4), client()),
            ChildUpsert::Stale
        );
        assert_eq!(reg.get(a).unwrap().position, DVec3::ZERO);
    }

    #[test]
    fn child_never_overwrites_root() {
        let mut reg = PresenceRegistry::new(region(2, 1001), RootClaims::new());
        let a = AvatarId::new();
        reg.upsert_root(a, "a", DVec3::ZERO, false, client()).unwrap();
        let t = ticket(RegionId::from_tail(1), 1);
        assert_eq!(
            reg.upsert_child(a, "a", t.issuer, DVec3::ONE, t, client()),
            ChildUpsert::RootHeld
        );
        assert!(reg.remove_child(a).is_none());
        assert!(reg.get(a).unwrap().is_root());
    }

    #[test]
    fn child_promotes_to_root() {
        let mut reg = PresenceRegistry::new(region(2, 1001), RootClaims::new());
        let a = AvatarId::new();
        let t = ticket(RegionId::from_tail(1), 1);
        reg.upsert_child(a, "a", t.issuer, DVec3::ZERO, t, client());

        let outcome = reg.upsert_root(a, "a", DVec3::new(1.0, 1.0, 0.0), false, client());
        assert_eq!(outcome, Ok(RootUpsert::Promoted));
        assert!(reg.get(a).unwrap().is_root());
        // Late updates from the old root no longer apply.
        assert_eq!(reg.update_child(a, DVec3::ONE, t), ChildUpsert::Stale);
    }

    #[test]
    fn remove_root_ignores_children_and_absent() {
        let mut reg = PresenceRegistry::new(region(2, 1001), RootClaims::new());
        let a = AvatarId::new();
        assert!(reg.remove_root(a).is_none());
        let t = ticket(RegionId::from_tail(1), 1);
        reg.upsert_child(a, "a", t.issuer, DVec3::ZERO, t, client());
        assert!(reg.remove_root(a).is_none());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn mirrors_tracked_for_roots_only() {
        let mut reg = PresenceRegistry::new(region(1, 1000), RootClaims::new());
        let a = AvatarId::new();
        let east = RegionId::from_tail(2);

        reg.record_mirror(a, east);
        assert!(reg.mirrored_in(a).is_empty());

        reg.upsert_root(a, "a", DVec3::ZERO, false, client()).unwrap();
        reg.record_mirror(a, east);
        assert!(reg.mirrored_in(a).contains(&east));

        reg.drop_mirror(a, east);
        assert!(reg.mirrored_in(a).is_empty());
    }

    #[test]
    fn retired_tickets_are_bounded() {
        let mut reg = PresenceRegistry::new(region(2, 1001), RootClaims::new());
        let root = RegionId::from_tail(1);
        for seq in 0..(RETIRED_CAPACITY as u64 + 10) {
            reg.close_child(AvatarId::new(), ticket(root, seq));
        }
        assert!(!reg.is_retired(ticket(root, 0)));
        assert!(reg.is_retired(ticket(root, RETIRED_CAPACITY as u64 + 9)));
    }

    #[test]
    fn global_position_adds_origin() {
        let mut reg = PresenceRegistry::new(region(1, 1000), RootClaims::new());
        let a = AvatarId::new();
        reg.upsert_root(a, "a", DVec3::new(250.0, 128.0, 20.0), false, client())
            .unwrap();
        let p = reg.get(a).unwrap();
        assert_eq!(
            p.global_position(reg.region()),
            DVec3::new(256_250.0, 256_128.0, 20.0)
        );
    }
}
