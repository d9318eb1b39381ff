//! Publication side of the driver
//!
//! - [`downsampler`] - per-subscriber tick skipping
//! - [`publisher`] - the 50 Hz publish cycle and its ticker task
//!
//! The publish cycle hands every packet to two sinks:
//!
//! ```text
//!                        ┌──► LatestValueSink   (overwrite, always)
//! JoystickPublisher ─────┤
//!                        └──► StreamSink        (per subscriber, if the downsampler allows)
//! ```
//!
//! Both sinks are traits so the transport layer stays outside the core.

pub mod downsampler;
pub mod publisher;

use std::fmt;

use chrono::{DateTime, Utc};

use crate::joystick::JoystickStateSensorData;

pub use downsampler::{BroadcastDownsampler, DownsampleError};
pub use publisher::{JoystickPublisher, PublisherHandle};

/// Identity of a connected subscriber, assigned by the transport layer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "subscriber#{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("{0} is not connected")]
    UnknownSubscriber(SubscriberId),

    #[error("Stream buffer for {0} is full")]
    Full(SubscriberId),

    #[error("Stream for {0} is closed")]
    Closed(SubscriberId),
}

/// Overwrite-only channel; readers only ever see the most recent packet
pub trait LatestValueSink: Send + Sync {
    fn set_latest_value(&self, data: JoystickStateSensorData);
}

/// Ordered, best-effort packet delivery to individual subscribers
///
/// Implementations must not block; the publish cycle never retries a failed send.
pub trait StreamSink: Send + Sync {
    fn send_packet(
        &self,
        subscriber: SubscriberId,
        data: JoystickStateSensorData,
    ) -> Result<(), SinkError>;
}

/// Source of capture timestamps
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
