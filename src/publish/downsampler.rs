use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, info, warn};

use super::SubscriberId;
use crate::joystick::MAX_SKIP_FACTOR;

pub const DEFAULT_SKIP_FACTOR: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DownsampleError {
    #[error("Invalid skip factor {0}: must be between 1 and 100")]
    InvalidSkipFactor(u32),

    #[error("{0} is not connected")]
    UnknownSubscriber(SubscriberId),
}

#[derive(Debug)]
struct DownsampleSlot {
    skip_factor: u32,
    // Ticks since the last delivery
    counter: u32,
}

impl Default for DownsampleSlot {
    fn default() -> Self {
        Self {
            skip_factor: DEFAULT_SKIP_FACTOR,
            counter: 0,
        }
    }
}

/// Per-subscriber delivery rate control for the fixed-rate broadcast
///
/// Sampling always runs at the full publish rate; the downsampler only decides
/// which ticks a given subscriber actually receives. Each subscriber has its own
/// lock, and the map lock is only held long enough to look a slot up, so
/// connection management never stalls the publish cycle for long.
#[derive(Debug, Default)]
pub struct BroadcastDownsampler {
    slots: RwLock<HashMap<SubscriberId, Arc<Mutex<DownsampleSlot>>>>,
}

impl BroadcastDownsampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber with the default skip factor and a fresh counter
    pub fn connect(&self, subscriber: SubscriberId) {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        slots.insert(subscriber, Arc::new(Mutex::new(DownsampleSlot::default())));
        info!("{} connected, {} subscribers", subscriber, slots.len());
    }

    pub fn disconnect(&self, subscriber: SubscriberId) {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        if slots.remove(&subscriber).is_some() {
            info!("{} disconnected, {} subscribers", subscriber, slots.len());
        } else {
            debug!("Disconnect for unknown {}", subscriber);
        }
    }

    /// Currently registered subscribers in id order
    pub fn subscribers(&self) -> Vec<SubscriberId> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<SubscriberId> = slots.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Count one tick for `subscriber` and report whether it gets this packet.
    ///
    /// Delivers on every `skip_factor`-th tick since the subscriber connected.
    /// A subscriber without a slot (never connected, or already gone) gets nothing.
    pub fn should_deliver(&self, subscriber: SubscriberId) -> bool {
        let Some(slot) = self.slot(subscriber) else {
            return false;
        };
        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);

        slot.counter += 1;
        if slot.counter % slot.skip_factor == 0 {
            slot.counter = 0;
            true
        } else {
            false
        }
    }

    /// Change the delivery rate. The tick counter is kept, so the new factor
    /// applies from the subscriber's next natural delivery boundary.
    ///
    /// Slots are only created by [`connect`](Self::connect), so an unknown id is
    /// rejected.
    pub fn set_skip_factor(
        &self,
        subscriber: SubscriberId,
        skip_factor: u32,
    ) -> Result<(), DownsampleError> {
        if !(1..=MAX_SKIP_FACTOR).contains(&skip_factor) {
            warn!("Rejected skip factor {} for {}", skip_factor, subscriber);
            return Err(DownsampleError::InvalidSkipFactor(skip_factor));
        }

        let slot = self
            .slot(subscriber)
            .ok_or(DownsampleError::UnknownSubscriber(subscriber))?;
        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
        debug!(
            "{} skip factor {} -> {}",
            subscriber, slot.skip_factor, skip_factor
        );
        slot.skip_factor = skip_factor;
        Ok(())
    }

    pub fn skip_factor(&self, subscriber: SubscriberId) -> u32 {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots
            .get(&subscriber)
            .map(|slot| {
                slot.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .skip_factor
            })
            .unwrap_or(DEFAULT_SKIP_FACTOR)
    }

    // The map lock is released before the slot is locked
    fn slot(&self, subscriber: SubscriberId) -> Option<Arc<Mutex<DownsampleSlot>>> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&subscriber)
            .cloned()
    }
}
