use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};

use evdev::Device;
use statum::{machine, state};
use tracing::{debug, info, warn};

use super::{DeviceError, EventSource, ReadOutcome};
use crate::joystick::RawEvent;

// Reader lifecycle: the node is opened first, then grabbed for exclusive use
#[state]
#[derive(Debug, Clone)]
pub enum ReaderState {
    Opening,
    Reading,
}

#[machine]
#[derive(Debug)]
pub struct DeviceReader<S: ReaderState> {
    // evdev handle, held for the lifetime of the process
    device: Device,

    // Path the device was opened from, for diagnostics
    path: PathBuf,

    // Events from the last kernel batch not yet handed out
    pending: VecDeque<RawEvent>,
}

impl<S: ReaderState> DeviceReader<S> {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> Option<&str> {
        self.device.name()
    }
}

impl DeviceReader<Opening> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DeviceError> {
        let path = path.as_ref().to_path_buf();
        info!("Opening input device {}", path.display());

        let device = Device::open(&path).map_err(|source| DeviceError::Open {
            path: path.clone(),
            source,
        })?;

        info!(
            "Opened input device {} ({})",
            path.display(),
            device.name().unwrap_or("unnamed")
        );
        Ok(Self::new(device, path, VecDeque::new()))
    }

    /// Take the device exclusively and switch it to non-blocking reads.
    ///
    /// Once grabbed no other reader (including the desktop's input stack) sees
    /// the events, so the handle must be kept for the whole process lifetime.
    pub fn grab(mut self) -> Result<DeviceReader<Reading>, DeviceError> {
        self.device.grab().map_err(|source| DeviceError::Grab {
            path: self.path.clone(),
            source,
        })?;
        debug!("Grabbed {}", self.path.display());

        self.device
            .set_nonblocking(true)
            .map_err(|source| DeviceError::NonBlocking {
                path: self.path.clone(),
                source,
            })?;

        info!("Input device ready, transitioning to Reading state");
        Ok(self.transition())
    }
}

impl DeviceReader<Reading> {
    // Pull the next kernel batch into the pending queue
    fn refill(&mut self) -> io::Result<usize> {
        let before = self.pending.len();
        let events = self.device.fetch_events()?;
        self.pending.extend(events.map(RawEvent::from));
        Ok(self.pending.len() - before)
    }
}

impl EventSource for DeviceReader<Reading> {
    fn read_next(&mut self) -> ReadOutcome {
        if let Some(event) = self.pending.pop_front() {
            return ReadOutcome::Event(event);
        }

        match self.refill() {
            Ok(count) => {
                debug!("Fetched {} events from {}", count, self.path.display());
                match self.pending.pop_front() {
                    Some(event) => ReadOutcome::Event(event),
                    None => ReadOutcome::Empty,
                }
            }
            Err(e) => classify_read_error(e),
        }
    }
}

// WouldBlock and EINTR only mean nothing is ready yet
fn classify_read_error(error: io::Error) -> ReadOutcome {
    match error.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => ReadOutcome::Empty,
        _ => {
            warn!("Input device read failed: {}", error);
            ReadOutcome::Fault(DeviceError::Read(error))
        }
    }
}
