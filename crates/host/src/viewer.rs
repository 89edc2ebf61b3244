use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use regionsync_common::RegionId;
use regionsync_kernel::{ChatDelivery, ClientHandle, DeliveryError, Viewer};

/// A viewer that records every chat line it receives, tagged with the
/// region circuit it arrived on.
#[derive(Debug, Clone, Default)]
pub struct RecordingViewer {
    heard: Arc<Mutex<Vec<(RegionId, ChatDelivery)>>>,
}

impl RecordingViewer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn heard(&self) -> Vec<(RegionId, ChatDelivery)> {
        self.lock().clone()
    }

    /// Text of every line received, in arrival order.
    pub fn lines(&self) -> Vec<String> {
        self.lock().iter().map(|(_, d)| d.text.clone()).collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(RegionId, ChatDelivery)>> {
        self.heard.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Viewer for RecordingViewer {
    fn circuit(&self, region: RegionId) -> Arc<dyn ClientHandle> {
        Arc::new(Circuit {
            region,
            heard: Arc::clone(&self.heard),
        })
    }
}

#[derive(Debug)]
struct Circuit {
    region: RegionId,
    heard: Arc<Mutex<Vec<(RegionId, ChatDelivery)>>>,
}

impl ClientHandle for Circuit {
    fn deliver_chat(&self, delivery: &ChatDelivery) -> Result<(), DeliveryError> {
        self.heard
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((self.region, delivery.clone()));
        Ok(())
    }
}
