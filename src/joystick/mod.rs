//! Joystick state model for the SpaceMouse driver
//!
//! Implements the sampling side of the driver:
//!
//! 1. [`decoder`] - Raw evdev event to typed delta
//! 2. [`aggregator`] - Axis/button state, bounded draining and sequence numbering
//!
//! # Data Flow
//!
//! ```text
//! EventSource ──► decode ──► StateAggregator ──► JoystickState ──► JoystickStateSensorData
//!                 (RawEvent)  (scaled, clamped)   (snapshot)        (header + seqno)
//! ```
//!
//! All constants below are fixed for the SpaceMouse device class and are not
//! runtime-configurable.

pub mod aggregator;
pub mod decoder;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::device::info::DeviceInfo;

pub use aggregator::{
    scale_axis, ApplyFault, DrainOutcome, DrainReport, SequenceCounter, StateAggregator,
};
pub use decoder::{decode, JoystickDelta, RawEvent, EV_KEY, EV_REL};

/// Publish cycle period (50 Hz)
pub const PUBLISH_PERIOD: Duration = Duration::from_millis(20);

/// Raw relative value reported at full deflection
pub const AXIS_MAX: i32 = 350;

/// Magnitude of the scaled axis output range
pub const AXIS_RANGE: i32 = 32767;

/// Maximum number of raw events consumed per publish cycle
pub const DRAIN_CAP: usize = 1000;

/// Three translation plus three rotation channels
pub const AXIS_COUNT: usize = 6;

pub const BUTTON_COUNT: usize = 4;

/// Highest per-subscriber skip factor accepted by the downsampler
pub const MAX_SKIP_FACTOR: u32 = 100;

/// Instantaneous device state
///
/// A value type: once produced by [`StateAggregator::snapshot`] it never changes.
/// The array lengths are fixed, so a snapshot can never be resized.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JoystickState {
    pub axes: [i16; AXIS_COUNT],
    pub buttons: [u8; BUTTON_COUNT],
    /// Always empty, the SpaceMouse has no directional pad
    pub hats: Vec<u8>,
}

impl JoystickState {
    #[cfg(test)]
    pub(crate) fn is_neutral(&self) -> bool {
        self.axes.iter().all(|a| *a == 0) && self.buttons.iter().all(|b| *b == 0)
    }
}

/// Header stamped onto every published packet
#[derive(Clone, Debug, PartialEq)]
pub struct SensorDataHeader {
    /// Copied verbatim from the info file, never interpreted by the core
    pub device_info: Arc<DeviceInfo>,
    pub sequence_number: u64,
    pub capture_timestamp: DateTime<Utc>,
}

/// The unit of publication
#[derive(Clone, Debug, PartialEq)]
pub struct JoystickStateSensorData {
    pub header: SensorDataHeader,
    pub state: JoystickState,
}

impl JoystickStateSensorData {
    pub fn sequence_number(&self) -> u64 {
        self.header.sequence_number
    }
}
