use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use regionsync_common::RegionId;
use regionsync_kernel::{RegionMessage, Transport, TransportError};

/// In-process transport: one unbounded mailbox per region.
///
/// Clones share the routing table. Sending never blocks.
#[derive(Debug, Clone, Default)]
pub struct LocalTransport {
    routes: Arc<Mutex<HashMap<RegionId, Sender<RegionMessage>>>>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the mailbox for `region`, replacing any previous one.
    pub fn open(&self, region: RegionId) -> Receiver<RegionMessage> {
        let (tx, rx) = mpsc::channel();
        self.lock().insert(region, tx);
        rx
    }

    /// Stop routing to `region`. Messages already queued stay readable.
    pub fn close(&self, region: RegionId) -> bool {
        self.lock().remove(&region).is_some()
    }

    pub fn is_open(&self, region: RegionId) -> bool {
        self.lock().contains_key(&region)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RegionId, Sender<RegionMessage>>> {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for LocalTransport {
    fn send(&self, target: RegionId, message: RegionMessage) -> Result<(), TransportError> {
        let tx = self
            .lock()
            .get(&target)
            .cloned()
            .ok_or(TransportError::UnknownRegion(target))?;
        tracing::trace!(%target, kind = message.kind(), "send");
        tx.send(message).map_err(|_| TransportError::Closed(target))
    }
}
