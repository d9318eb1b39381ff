use tracing::{debug, warn};

use super::decoder::{decode, JoystickDelta, RawEvent};
use super::{JoystickState, AXIS_COUNT, AXIS_MAX, AXIS_RANGE, BUTTON_COUNT};
use crate::device::{EventSource, ReadOutcome};

/// Scale a raw relative reading onto the signed 16-bit output range.
///
/// Values beyond full deflection saturate at ±32767 instead of wrapping.
pub fn scale_axis(raw_value: i32) -> i16 {
    let scaled = (f64::from(raw_value) * f64::from(AXIS_RANGE) / f64::from(AXIS_MAX)).round();
    scaled.clamp(-f64::from(AXIS_RANGE), f64::from(AXIS_RANGE)) as i16
}

// Raised when a decoded delta cannot be applied to the fixed-size arrays
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApplyFault {
    #[error("Axis index {0} out of range")]
    AxisIndex(usize),

    #[error("Button index {0} out of range")]
    ButtonIndex(usize),
}

/// How a drain call ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The source reported no further events
    Exhausted,
    /// The per-call cap was hit; the rest stays queued for the next cycle
    CapReached,
    /// A read or apply fault reset the state and aborted the drain
    Faulted(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
    /// Events taken off the source, including ignored ones and the faulting one
    pub consumed: usize,
    pub outcome: DrainOutcome,
}

impl DrainReport {
    pub fn is_fault(&self) -> bool {
        matches!(self.outcome, DrainOutcome::Faulted(_))
    }
}

/// Current axis and button state of the device
///
/// Owned by the publish cycle; every mutation goes through [`drain_and_update`].
///
/// [`drain_and_update`]: StateAggregator::drain_and_update
#[derive(Debug, Default)]
pub struct StateAggregator {
    axes: [i16; AXIS_COUNT],
    buttons: [u8; BUTTON_COUNT],
}

impl StateAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume up to `cap` events from `source` and fold them into the state.
    ///
    /// Stops early when the source is empty. A read fault or an event that cannot
    /// be applied zeroes both arrays and ends the drain for this call; whatever is
    /// still queued is left for the next call.
    pub fn drain_and_update<S: EventSource + ?Sized>(
        &mut self,
        source: &mut S,
        cap: usize,
    ) -> DrainReport {
        let mut consumed = 0;

        while consumed < cap {
            let event = match source.read_next() {
                ReadOutcome::Event(event) => event,
                ReadOutcome::Empty => {
                    return DrainReport {
                        consumed,
                        outcome: DrainOutcome::Exhausted,
                    };
                }
                ReadOutcome::Fault(e) => {
                    warn!("Device fault after {} events, resetting state: {}", consumed, e);
                    self.reset();
                    return DrainReport {
                        consumed,
                        outcome: DrainOutcome::Faulted(e.to_string()),
                    };
                }
            };
            consumed += 1;

            if let Err(fault) = self.apply(&event) {
                warn!(
                    "Malformed event {:?} after {} events, resetting state: {}",
                    event, consumed, fault
                );
                self.reset();
                return DrainReport {
                    consumed,
                    outcome: DrainOutcome::Faulted(fault.to_string()),
                };
            }
        }

        debug!("Drain cap of {} events reached, deferring remainder", cap);
        DrainReport {
            consumed,
            outcome: DrainOutcome::CapReached,
        }
    }

    fn apply(&mut self, event: &RawEvent) -> Result<(), ApplyFault> {
        match decode(event) {
            JoystickDelta::AxisDelta { index, raw_value } => {
                let slot = self
                    .axes
                    .get_mut(index)
                    .ok_or(ApplyFault::AxisIndex(index))?;
                *slot = scale_axis(raw_value);
            }
            JoystickDelta::ButtonDelta { index, pressed } => {
                let slot = self
                    .buttons
                    .get_mut(index)
                    .ok_or(ApplyFault::ButtonIndex(index))?;
                *slot = u8::from(pressed);
            }
            JoystickDelta::Ignored => {}
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        self.axes = [0; AXIS_COUNT];
        self.buttons = [0; BUTTON_COUNT];
    }

    pub fn snapshot(&self) -> JoystickState {
        JoystickState {
            axes: self.axes,
            buttons: self.buttons,
            hats: Vec::new(),
        }
    }
}

/// Per-session packet counter; the first packet carries 1
#[derive(Debug)]
pub struct SequenceCounter {
    next: u64,
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> u64 {
        let current = self.next;
        self.next += 1;
        current
    }

    /// Value the next call to [`next`](Self::next) will return
    #[cfg(test)]
    pub(crate) fn peek(&self) -> u64 {
        self.next
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::io;

    use super::*;
    use crate::device::DeviceError;
    use crate::joystick::DRAIN_CAP;

    /// Scripted event source; `None` entries become read faults
    #[derive(Default)]
    pub(crate) struct ScriptedSource {
        queue: VecDeque<Option<RawEvent>>,
        pub reads: usize,
    }

    impl ScriptedSource {
        pub(crate) fn with_events(events: impl IntoIterator<Item = RawEvent>) -> Self {
            let mut source = Self::default();
            source.push_events(events);
            source
        }

        pub(crate) fn push_events(&mut self, events: impl IntoIterator<Item = RawEvent>) {
            self.queue.extend(events.into_iter().map(Some));
        }

        pub(crate) fn push_fault(&mut self) {
            self.queue.push_back(None);
        }

        pub(crate) fn remaining(&self) -> usize {
            self.queue.len()
        }
    }

    impl EventSource for ScriptedSource {
        fn read_next(&mut self) -> ReadOutcome {
            self.reads += 1;
            match self.queue.pop_front() {
                Some(Some(event)) => ReadOutcome::Event(event),
                Some(None) => ReadOutcome::Fault(DeviceError::Read(io::Error::new(
                    io::ErrorKind::Other,
                    "injected fault",
                ))),
                None => ReadOutcome::Empty,
            }
        }
    }

    fn expected_scaled(raw: i32) -> i16 {
        let v = (raw as f64 * 32767.0 / 350.0).round();
        v.clamp(-32767.0, 32767.0) as i16
    }

    #[test]
    fn scale_axis_matches_formula_and_clamps() {
        assert_eq!(scale_axis(0), 0);
        assert_eq!(scale_axis(350), 32767);
        assert_eq!(scale_axis(-350), -32767);
        assert_eq!(scale_axis(1), 94); // 93.62
        assert_eq!(scale_axis(-1), -94);
        assert_eq!(scale_axis(175), 16384); // 16383.5 rounds away from zero
        assert_eq!(scale_axis(351), 32767);
        assert_eq!(scale_axis(-100_000), -32767);
        assert_eq!(scale_axis(i32::MAX), 32767);
        assert_eq!(scale_axis(i32::MIN), -32767);
        for raw in (-400..=400).step_by(7) {
            assert_eq!(scale_axis(raw), expected_scaled(raw), "raw {}", raw);
        }
    }

    #[test]
    fn relative_events_update_axes() {
        let mut source = ScriptedSource::with_events(
            (0..6u16).map(|code| RawEvent::relative(code, (code as i32 + 1) * 50)),
        );
        let mut aggregator = StateAggregator::new();

        let report = aggregator.drain_and_update(&mut source, DRAIN_CAP);
        assert_eq!(report.consumed, 6);
        assert_eq!(report.outcome, DrainOutcome::Exhausted);

        let state = aggregator.snapshot();
        for (i, axis) in state.axes.iter().enumerate() {
            assert_eq!(*axis, expected_scaled((i as i32 + 1) * 50));
        }
        assert!(state.hats.is_empty());
    }

    #[test]
    fn later_reading_overwrites_axis() {
        let mut source = ScriptedSource::with_events([
            RawEvent::relative(2, 300),
            RawEvent::relative(2, -20),
        ]);
        let mut aggregator = StateAggregator::new();
        aggregator.drain_and_update(&mut source, DRAIN_CAP);
        assert_eq!(aggregator.snapshot().axes[2], expected_scaled(-20));
    }

    #[test]
    fn key_events_set_and_clear_buttons() {
        let mut aggregator = StateAggregator::new();

        let mut source = ScriptedSource::with_events([
            RawEvent::key(268, 1),
            RawEvent::key(270, 2),
            RawEvent::key(271, 1),
        ]);
        aggregator.drain_and_update(&mut source, DRAIN_CAP);
        assert_eq!(aggregator.snapshot().buttons, [1, 0, 1, 1]);

        source.push_events([RawEvent::key(270, 0), RawEvent::key(268, 0)]);
        aggregator.drain_and_update(&mut source, DRAIN_CAP);
        assert_eq!(aggregator.snapshot().buttons, [0, 0, 0, 1]);
    }

    #[test]
    fn unrelated_events_leave_state_alone() {
        let mut aggregator = StateAggregator::new();
        let mut source =
            ScriptedSource::with_events([RawEvent::relative(0, 100), RawEvent::key(269, 1)]);
        aggregator.drain_and_update(&mut source, DRAIN_CAP);
        let before = aggregator.snapshot();

        source.push_events([
            RawEvent::key(267, 1),
            RawEvent::key(273, 1),
            RawEvent::key(30, 1),
            RawEvent::relative(6, 100),
            RawEvent::new(0, 0, 0),
        ]);
        let report = aggregator.drain_and_update(&mut source, DRAIN_CAP);
        assert_eq!(report.consumed, 5);
        assert_eq!(aggregator.snapshot(), before);
    }

    #[test]
    fn drain_is_bounded_by_cap() {
        let mut source =
            ScriptedSource::with_events((0..2500).map(|i| RawEvent::relative(0, i % 300)));
        let mut aggregator = StateAggregator::new();

        let first = aggregator.drain_and_update(&mut source, DRAIN_CAP);
        assert_eq!(first.consumed, 1000);
        assert_eq!(first.outcome, DrainOutcome::CapReached);
        assert_eq!(source.remaining(), 1500);
        assert_eq!(source.reads, 1000);

        let second = aggregator.drain_and_update(&mut source, DRAIN_CAP);
        assert_eq!(second.consumed, 1000);
        let third = aggregator.drain_and_update(&mut source, DRAIN_CAP);
        assert_eq!(third.consumed, 500);
        assert_eq!(third.outcome, DrainOutcome::Exhausted);
        assert_eq!(aggregator.snapshot().axes[0], expected_scaled(2499 % 300));
    }

    #[test]
    fn read_fault_resets_state_and_stops_drain() {
        let mut source = ScriptedSource::with_events([
            RawEvent::relative(0, 350),
            RawEvent::relative(5, -350),
            RawEvent::key(268, 1),
            RawEvent::key(271, 1),
        ]);
        source.push_fault();
        source.push_events([RawEvent::relative(1, 100)]);
        let mut aggregator = StateAggregator::new();

        let report = aggregator.drain_and_update(&mut source, DRAIN_CAP);
        assert!(report.is_fault());
        assert_eq!(report.consumed, 4);
        assert!(aggregator.snapshot().is_neutral());
        assert_eq!(aggregator.snapshot().axes, [0; 6]);
        assert_eq!(aggregator.snapshot().buttons, [0; 4]);
        // event after the fault waits for the next cycle
        assert_eq!(source.remaining(), 1);

        aggregator.drain_and_update(&mut source, DRAIN_CAP);
        assert_eq!(aggregator.snapshot().axes[1], expected_scaled(100));
    }

    #[test]
    fn fifth_button_code_is_a_fault() {
        let mut source = ScriptedSource::with_events([
            RawEvent::relative(3, 200),
            RawEvent::key(272, 1),
            RawEvent::key(268, 1),
        ]);
        let mut aggregator = StateAggregator::new();

        let report = aggregator.drain_and_update(&mut source, DRAIN_CAP);
        assert_eq!(
            report.outcome,
            DrainOutcome::Faulted(ApplyFault::ButtonIndex(4).to_string())
        );
        assert_eq!(report.consumed, 2);
        assert!(aggregator.snapshot().is_neutral());
        assert_eq!(source.remaining(), 1);
    }

    #[test]
    fn sequence_counter_starts_at_one() {
        let mut counter = SequenceCounter::new();
        assert_eq!(counter.peek(), 1);
        let values: Vec<u64> = (0..5).map(|_| counter.next()).collect();
        assert_eq!(values, vec![1, 2, 3, 4, 5]);
        assert_eq!(counter.peek(), 6);
    }
}
