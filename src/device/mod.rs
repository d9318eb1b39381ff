//! Input device boundary
//!
//! The publish cycle never talks to evdev directly. It pulls events through the
//! [`EventSource`] trait, one at a time and without blocking, so a scripted source
//! can stand in for the hardware in tests.
//!
//! - [`reader`] - exclusive evdev handle (open, grab, non-blocking reads)
//! - [`info`] - static device metadata loaded from the info file

pub mod info;
pub mod reader;

use std::path::PathBuf;

use crate::joystick::RawEvent;

/// Result of a single non-blocking read
#[derive(Debug)]
pub enum ReadOutcome {
    Event(RawEvent),
    /// Nothing queued right now; not an error
    Empty,
    Fault(DeviceError),
}

/// Non-blocking, one-at-a-time source of raw input events
pub trait EventSource: Send {
    fn read_next(&mut self) -> ReadOutcome;
}

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Failed to open input device {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to grab input device {path} exclusively: {source}")]
    Grab {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to switch input device {path} to non-blocking mode: {source}")]
    NonBlocking {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read from input device: {0}")]
    Read(#[from] std::io::Error),
}
