use dialfm_core::display::DisplayOutput;
use dialfm_core::frequency::format_mhz;
use tracing::info;

/// Writes what a front panel would show to the log, skipping repeats.
#[derive(Debug, Default)]
pub struct LogDisplay {
    last: Option<(u16, Option<String>)>,
}

impl DisplayOutput for LogDisplay {
    fn show(&mut self, frequency: u16, station: Option<&str>) {
        let next = (frequency, station.map(str::to_string));
        if self.last.as_ref() == Some(&next) {
            return;
        }
        match station {
            Some(name) => info!("display: {}  {}", format_mhz(frequency), name),
            None => info!("display: {}", format_mhz(frequency)),
        }
        self.last = Some(next);
    }
}
