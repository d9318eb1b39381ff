//! Evdev based driver for the 3Dconnexion SpaceMouse
//!
//! Reads relative-axis and button events from the device, folds them into a
//! six-axis, four-button joystick state and publishes that state at 50 Hz.
//!
//! # Architecture
//!
//! ```text
//! evdev ──► DeviceReader ──► JoystickPublisher ──► LatestValueSink (watch)
//!           (non-blocking)   (drain, snapshot,  └─► StreamSink (per subscriber,
//!                             seqno, stamp)          downsampled)
//! ```
//!
//! - [`device`] - device handle and info file
//! - [`joystick`] - state model, decoding and aggregation
//! - [`publish`] - publish cycle, ticker and downsampling
//! - [`service`] - in-process session layer for subscribers
//! - [`config`] - config file and command line

pub mod config;
pub mod device;
pub mod joystick;
pub mod publish;
pub mod service;
