//! In-process joystick service
//!
//! Thin session layer in front of the publisher. It hands out subscriber ids,
//! owns the per-subscriber packet queues and the latest-value channel, and
//! exposes the downsample property. A network transport would sit on top of
//! this and map its connections to [`SubscriberId`]s.
//!
//! ```text
//! connect() ──► SubscriberId ──► BroadcastDownsampler (skip factor, counter)
//!                    │
//!                    └─────────► SubscriberStreams (mpsc per subscriber)
//!
//! latest()  ──► watch::Receiver (overwritten every cycle)
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::device::info::JoystickInfo;
use crate::device::EventSource;
use crate::joystick::{JoystickState, JoystickStateSensorData, MAX_SKIP_FACTOR, PUBLISH_PERIOD};
use crate::publish::publisher::PublisherError;
use crate::publish::{
    BroadcastDownsampler, Clock, DownsampleError, JoystickPublisher, LatestValueSink,
    PublisherHandle, SinkError, StreamSink, SubscriberId,
};

pub const DEFAULT_STREAM_BUFFER: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0} is not connected")]
    NotConnected(SubscriberId),

    #[error(transparent)]
    Downsample(#[from] DownsampleError),

    #[error(transparent)]
    Publisher(#[from] PublisherError),
}

/// Latest-value sink backed by a watch channel
pub struct WatchLatestValue {
    sender: watch::Sender<Option<JoystickStateSensorData>>,
}

impl WatchLatestValue {
    pub fn channel() -> (Self, watch::Receiver<Option<JoystickStateSensorData>>) {
        let (sender, receiver) = watch::channel(None);
        (Self { sender }, receiver)
    }
}

impl LatestValueSink for WatchLatestValue {
    fn set_latest_value(&self, data: JoystickStateSensorData) {
        // send_replace also succeeds while nobody is watching
        self.sender.send_replace(Some(data));
    }
}

/// Stream sink with one bounded queue per subscriber
#[derive(Default)]
pub struct SubscriberStreams {
    senders: RwLock<HashMap<SubscriberId, mpsc::Sender<JoystickStateSensorData>>>,
}

impl SubscriberStreams {
    fn insert(&self, subscriber: SubscriberId, sender: mpsc::Sender<JoystickStateSensorData>) {
        self.senders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(subscriber, sender);
    }

    fn remove(&self, subscriber: SubscriberId) -> bool {
        self.senders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&subscriber)
            .is_some()
    }

    fn contains(&self, subscriber: SubscriberId) -> bool {
        self.senders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&subscriber)
    }
}

impl StreamSink for SubscriberStreams {
    fn send_packet(
        &self,
        subscriber: SubscriberId,
        data: JoystickStateSensorData,
    ) -> Result<(), SinkError> {
        let senders = self.senders.read().unwrap_or_else(PoisonError::into_inner);
        let sender = senders
            .get(&subscriber)
            .ok_or(SinkError::UnknownSubscriber(subscriber))?;

        sender.try_send(data).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Full(subscriber),
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed(subscriber),
        })
    }
}

/// A connected subscriber and its packet queue
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriberId,
    pub packets: mpsc::Receiver<JoystickStateSensorData>,
}

/// Timing properties advertised to subscribers
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IsochInfo {
    pub update_rate: f64,
    pub max_downsample: u32,
    pub isoch_epoch: DateTime<Utc>,
}

/// Session object for one SpaceMouse
///
/// Built once at startup and passed by reference to whatever exposes it.
pub struct JoystickService {
    info: JoystickInfo,
    publisher: Arc<JoystickPublisher>,
    streams: Arc<SubscriberStreams>,
    latest: watch::Receiver<Option<JoystickStateSensorData>>,
    clock: Arc<dyn Clock>,
    epoch: DateTime<Utc>,
    next_subscriber: AtomicU64,
    stream_buffer: usize,
    publisher_handle: Option<PublisherHandle>,
}

impl JoystickService {
    pub fn new(
        source: Box<dyn EventSource>,
        info: JoystickInfo,
        clock: Arc<dyn Clock>,
        stream_buffer: usize,
    ) -> Self {
        let (latest_sink, latest) = WatchLatestValue::channel();
        let streams = Arc::new(SubscriberStreams::default());
        let publisher = Arc::new(JoystickPublisher::new(
            source,
            Arc::new(info.device_info.clone()),
            Arc::new(BroadcastDownsampler::new()),
            Arc::new(latest_sink),
            streams.clone(),
            clock.clone(),
        ));
        let epoch = clock.now();
        info!(
            "Joystick service for '{}' created, epoch {}",
            info.device_info.name, epoch
        );

        Self {
            info,
            publisher,
            streams,
            latest,
            clock,
            epoch,
            next_subscriber: AtomicU64::new(1),
            stream_buffer: stream_buffer.max(1),
            publisher_handle: None,
        }
    }

    /// Start the publish ticker. Calling this twice has no effect.
    pub fn start(&mut self, cancel: CancellationToken) {
        if self.publisher_handle.is_some() {
            debug!("Publisher already running");
            return;
        }
        self.publisher_handle = Some(self.publisher.clone().spawn(cancel));
    }

    pub fn is_running(&self) -> bool {
        self.publisher_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub async fn shutdown(mut self) -> Result<(), ServiceError> {
        if let Some(handle) = self.publisher_handle.take() {
            handle.shutdown().await?;
        }
        info!("Joystick service stopped");
        Ok(())
    }

    pub fn publisher(&self) -> &Arc<JoystickPublisher> {
        &self.publisher
    }

    pub fn connect(&self) -> Subscription {
        let id = SubscriberId(self.next_subscriber.fetch_add(1, Ordering::Relaxed));
        let (sender, packets) = mpsc::channel(self.stream_buffer);

        // queue first, so the publisher never sees a subscriber without one
        self.streams.insert(id, sender);
        self.publisher.downsampler().connect(id);
        Subscription { id, packets }
    }

    pub fn disconnect(&self, subscriber: SubscriberId) {
        self.publisher.downsampler().disconnect(subscriber);
        if !self.streams.remove(subscriber) {
            debug!("{} had no packet queue", subscriber);
        }
    }

    /// Receiver that always holds the most recent packet
    pub fn latest(&self) -> watch::Receiver<Option<JoystickStateSensorData>> {
        self.latest.clone()
    }

    pub fn skip_factor(&self, subscriber: SubscriberId) -> u32 {
        self.publisher.downsampler().skip_factor(subscriber)
    }

    pub fn set_skip_factor(
        &self,
        subscriber: SubscriberId,
        skip_factor: u32,
    ) -> Result<(), ServiceError> {
        if !self.streams.contains(subscriber) {
            return Err(ServiceError::NotConnected(subscriber));
        }
        // a disconnect may land between the check and the update
        match self
            .publisher
            .downsampler()
            .set_skip_factor(subscriber, skip_factor)
        {
            Err(DownsampleError::UnknownSubscriber(id)) => Err(ServiceError::NotConnected(id)),
            result => Ok(result?),
        }
    }

    /// Diagnostic read of the current state
    pub async fn snapshot(&self) -> JoystickState {
        self.publisher.snapshot().await
    }

    pub fn joystick_info(&self) -> &JoystickInfo {
        &self.info
    }

    pub fn service_attributes(&self) -> BTreeMap<String, String> {
        self.publisher.device_info().service_attributes()
    }

    pub fn isoch_info(&self) -> IsochInfo {
        IsochInfo {
            update_rate: 1000.0 / PUBLISH_PERIOD.as_millis() as f64,
            max_downsample: MAX_SKIP_FACTOR,
            isoch_epoch: self.epoch,
        }
    }

    pub fn device_clock_now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}
