//! Dial readings typed on stdin, one per line: either tenths of a MHz
//! (`1005`) or MHz (`100.5`).

use dialfm_core::dial::FrequencySource;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct StdinDial {
    rx: watch::Receiver<u16>,
}

impl StdinDial {
    /// Start reading stdin in the background, reporting `initial` until the
    /// first valid line arrives.
    pub fn spawn(initial: u16) -> Self {
        let (tx, rx) = watch::channel(initial);
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => match parse_reading(&line) {
                        Some(freq) => {
                            debug!("dial: {}", freq);
                            if tx.send(freq).is_err() {
                                break;
                            }
                        }
                        None if line.trim().is_empty() => {}
                        None => warn!("dial: ignoring {:?}", line.trim()),
                    },
                    Ok(None) => {
                        info!("dial: stdin closed, holding last reading");
                        break;
                    }
                    Err(e) => {
                        warn!("dial: read error: {}", e);
                        break;
                    }
                }
            }
        });
        Self { rx }
    }
}

impl FrequencySource for StdinDial {
    fn read(&mut self) -> Option<u16> {
        Some(*self.rx.borrow())
    }
}

pub fn parse_reading(line: &str) -> Option<u16> {
    let line = line.trim().trim_end_matches("MHz").trim();
    if line.is_empty() {
        return None;
    }
    if line.contains('.') {
        let mhz: f64 = line.parse().ok()?;
        let tenths = (mhz * 10.0).round();
        (0.0..=f64::from(u16::MAX))
            .contains(&tenths)
            .then_some(tenths as u16)
    } else {
        line.parse().ok()
    }
}
