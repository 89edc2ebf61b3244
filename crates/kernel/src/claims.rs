use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use regionsync_common::{AvatarId, RegionId};

/// Cluster-wide ledger of Root claims: which region currently owns each avatar.
///
/// Cloning shares the ledger. The lock is only held for a single
/// check-and-set, never across region work or message delivery.
#[derive(Debug, Clone, Default)]
pub struct RootClaims {
    inner: Arc<Mutex<HashMap<AvatarId, RegionId>>>,
}

impl RootClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim Root for `avatar` on behalf of `region`.
    ///
    /// Re-claiming from the holding region succeeds. A claim held by any other
    /// region is returned as the error value and left untouched.
    pub fn claim(&self, avatar: AvatarId, region: RegionId) -> Result<(), RegionId> {
        let mut claims = self.lock();
        match claims.get(&avatar) {
            Some(&holder) if holder != region => Err(holder),
            _ => {
                claims.insert(avatar, region);
                Ok(())
            }
        }
    }

    /// Release a claim. Only the holding region can release; returns whether
    /// a claim was removed.
    pub fn release(&self, avatar: AvatarId, region: RegionId) -> bool {
        let mut claims = self.lock();
        if claims.get(&avatar) == Some(&region) {
            claims.remove(&avatar);
            true
        } else {
            false
        }
    }

    /// Region currently holding Root for `avatar`, if any.
    pub fn holder(&self, avatar: AvatarId) -> Option<RegionId> {
        self.lock().get(&avatar).copied()
    }

    /// Number of avatars with a Root claim.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<AvatarId, RegionId>> {
        // A panic elsewhere cannot leave the map half-updated; keep serving it.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_region_is_rejected() {
        let claims = RootClaims::new();
        let avatar = AvatarId::new();
        let (a, b) = (RegionId::new(), RegionId::new());

        assert!(claims.claim(avatar, a).is_ok());
        assert_eq!(claims.claim(avatar, b), Err(a));
        assert_eq!(claims.holder(avatar), Some(a));
    }

    #[test]
    fn reclaim_by_holder_is_ok() {
        let claims = RootClaims::new();
        let avatar = AvatarId::new();
        let a = RegionId::new();
        claims.claim(avatar, a).unwrap();
        assert!(claims.claim(avatar, a).is_ok());
        assert_eq!(claims.len(), 1);
    }

    #[test]
    fn only_holder_releases() {
        let claims = RootClaims::new();
        let avatar = AvatarId::new();
        let (a, b) = (RegionId::new(), RegionId::new());
        claims.claim(avatar, a).unwrap();

        assert!(!claims.release(avatar, b));
        assert!(claims.release(avatar, a));
        assert!(claims.is_empty());
        assert!(claims.claim(avatar, b).is_ok());
    }

    #[test]
    fn clones_share_state() {
        let claims = RootClaims::new();
        let other = claims.clone();
        let avatar = AvatarId::new();
        claims.claim(avatar, RegionId::new()).unwrap();
        assert!(other.holder(avatar).is_some());
    }
}
