use tracing::trace;

use super::AXIS_COUNT;

/// Linux `EV_KEY` event type
pub const EV_KEY: u16 = 0x01;

/// Linux `EV_REL` event type
pub const EV_REL: u16 = 0x02;

/// `BTN_0` .. `BTN_4`; the SpaceMouse reports its buttons in this block
const BUTTON_CODE_FIRST: u16 = 268;
const BUTTON_CODE_END: u16 = 273;

/// Raw input event as read from the device node
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawEvent {
    pub event_type: u16,
    pub code: u16,
    pub value: i32,
}

impl RawEvent {
    pub fn new(event_type: u16, code: u16, value: i32) -> Self {
        Self {
            event_type,
            code,
            value,
        }
    }

    pub fn relative(code: u16, value: i32) -> Self {
        Self::new(EV_REL, code, value)
    }

    pub fn key(code: u16, value: i32) -> Self {
        Self::new(EV_KEY, code, value)
    }
}

impl From<evdev::InputEvent> for RawEvent {
    fn from(event: evdev::InputEvent) -> Self {
        Self::new(event.event_type().0, event.code(), event.value())
    }
}

// Typed change extracted from a single raw event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoystickDelta {
    AxisDelta { index: usize, raw_value: i32 },
    ButtonDelta { index: usize, pressed: bool },
    Ignored,
}

/// Map one raw event onto a typed delta.
///
/// Scaling is left to the aggregator so this stays a pure lookup.
pub fn decode(event: &RawEvent) -> JoystickDelta {
    match event.event_type {
        EV_REL if usize::from(event.code) < AXIS_COUNT => JoystickDelta::AxisDelta {
            index: usize::from(event.code),
            raw_value: event.value,
        },
        EV_KEY if (BUTTON_CODE_FIRST..BUTTON_CODE_END).contains(&event.code) => {
            JoystickDelta::ButtonDelta {
                index: usize::from(event.code - BUTTON_CODE_FIRST),
                pressed: event.value != 0,
            }
        }
        _ => {
            trace!("Ignoring event: {:?}", event);
            JoystickDelta::Ignored
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_codes_below_six_map_to_axes() {
        for code in 0..6u16 {
            assert_eq!(
                decode(&RawEvent::relative(code, -42)),
                JoystickDelta::AxisDelta {
                    index: code as usize,
                    raw_value: -42
                }
            );
        }
        assert_eq!(decode(&RawEvent::relative(6, 10)), JoystickDelta::Ignored);
        // REL_WHEEL
        assert_eq!(decode(&RawEvent::relative(8, 1)), JoystickDelta::Ignored);
    }

    #[test]
    fn key_codes_in_button_block_map_to_buttons() {
        assert_eq!(
            decode(&RawEvent::key(268, 1)),
            JoystickDelta::ButtonDelta {
                index: 0,
                pressed: true
            }
        );
        assert_eq!(
            decode(&RawEvent::key(271, 0)),
            JoystickDelta::ButtonDelta {
                index: 3,
                pressed: false
            }
        );
        // autorepeat reports value 2
        assert_eq!(
            decode(&RawEvent::key(269, 2)),
            JoystickDelta::ButtonDelta {
                index: 1,
                pressed: true
            }
        );
        assert_eq!(
            decode(&RawEvent::key(272, 1)),
            JoystickDelta::ButtonDelta {
                index: 4,
                pressed: true
            }
        );
    }

    #[test]
    fn everything_else_is_ignored() {
        assert_eq!(decode(&RawEvent::key(267, 1)), JoystickDelta::Ignored);
        assert_eq!(decode(&RawEvent::key(273, 1)), JoystickDelta::Ignored);
        // EV_SYN / SYN_REPORT
        assert_eq!(decode(&RawEvent::new(0, 0, 0)), JoystickDelta::Ignored);
        // EV_ABS with an axis-like code
        assert_eq!(decode(&RawEvent::new(0x03, 1, 100)), JoystickDelta::Ignored);
        // EV_MSC
        assert_eq!(decode(&RawEvent::new(0x04, 4, 589825)), JoystickDelta::Ignored);
    }
}
