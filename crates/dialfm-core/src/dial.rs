//! Dial input capability. The core only ever sees decoded frequencies in
//! tenths of a MHz; sensor calibration belongs to the adapter.

use std::collections::VecDeque;

pub trait FrequencySource {
    /// Current dial position, or `None` if the reading is unavailable.
    fn read(&mut self) -> Option<u16>;
}

/// Plays back a fixed sequence of readings, then holds the last one.
#[derive(Debug, Default)]
pub struct ScriptedDial {
    readings: VecDeque<u16>,
    last: Option<u16>,
}

impl ScriptedDial {
    pub fn new(readings: impl IntoIterator<Item = u16>) -> Self {
        Self {
            readings: readings.into_iter().collect(),
            last: None,
        }
    }
}

impl FrequencySource for ScriptedDial {
    fn read(&mut self) -> Option<u16> {
        if let Some(next) = self.readings.pop_front() {
            self.last = Some(next);
        }
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_dial_holds_last_reading() {
        let mut dial = ScriptedDial::new([900, 901]);
        assert_eq!(dial.read(), Some(900));
        assert_eq!(dial.read(), Some(901));
        assert_eq!(dial.read(), Some(901));
        assert_eq!(ScriptedDial::default().read(), None);
    }
}
