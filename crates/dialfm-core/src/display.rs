/// Front-panel output: the dial position and, when locked on, the station.
pub trait DisplayOutput {
    fn show(&mut self, frequency: u16, station: Option<&str>);
}

impl<T: DisplayOutput + ?Sized> DisplayOutput for Box<T> {
    fn show(&mut self, frequency: u16, station: Option<&str>) {
        (**self).show(frequency, station)
    }
}

/// Keeps the last thing shown. Test stand-in for a panel.
#[derive(Debug, Default)]
pub struct RecordingDisplay {
    pub shown: Vec<(u16, Option<String>)>,
}

impl RecordingDisplay {
    pub fn last(&self) -> Option<&(u16, Option<String>)> {
        self.shown.last()
    }
}

impl DisplayOutput for RecordingDisplay {
    fn show(&mut self, frequency: u16, station: Option<&str>) {
        self.shown.push((frequency, station.map(str::to_string)));
    }
}
