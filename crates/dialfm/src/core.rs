//! RadioCore: single-owner event loop for all playback state.
//!
//! The dial ticker and the sync task never touch playback directly; they
//! send `RadioEvent`s here. RadioCore owns the tuner, the playback machine
//! and the hardware adapters exclusively, so every transition runs to
//! completion before the next one starts.
//!
//! Per tick: one static fade step, a dial read (tuning only when the
//! reading changed), and every `track_check_every` ticks a check for the
//! end of the current track. A finished sync swaps in the new index.

use std::sync::Arc;

use dialfm_core::audio::AudioOutput;
use dialfm_core::catalog::FrequencyIndex;
use dialfm_core::config::TimingConfig;
use dialfm_core::dial::FrequencySource;
use dialfm_core::display::DisplayOutput;
use dialfm_core::manifest::SyncManifest;
use dialfm_core::playback::{Mode, PlaybackMachine};
use dialfm_core::sync::{RemoteCatalog, SyncEngine, SyncOutcome, SyncReport};
use dialfm_core::tuner::Tuner;
use dialfm_core::RadioError;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

// ── RadioEvent ────────────────────────────────────────────────────────────────

/// All inputs into the RadioCore loop.
#[derive(Debug)]
pub enum RadioEvent {
    /// Dial poll.
    Tick,
    /// A sync cycle completed. `index` is `None` when the remote was
    /// unreachable.
    SyncFinished {
        index: Option<Arc<FrequencyIndex>>,
        report: SyncReport,
        remote_error: Option<RadioError>,
    },
    Shutdown,
}

// ── RadioCore ─────────────────────────────────────────────────────────────────

pub struct RadioCore<A: AudioOutput, F, D> {
    timing: TimingConfig,
    tuner: Tuner,
    machine: PlaybackMachine<A>,
    dial: F,
    display: D,
    /// Reading the tuner last acted on.
    last_reading: Option<u16>,
    ticks: u64,
}

impl<A, F, D> RadioCore<A, F, D>
where
    A: AudioOutput,
    F: FrequencySource,
    D: DisplayOutput,
{
    pub fn new(
        timing: TimingConfig,
        tuner: Tuner,
        machine: PlaybackMachine<A>,
        dial: F,
        display: D,
    ) -> Self {
        Self {
            timing,
            tuner,
            machine,
            dial,
            display,
            last_reading: None,
            ticks: 0,
        }
    }

    /// Run until `Shutdown` or until every sender is gone. The first tune
    /// happens before any queued event is looked at.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<RadioEvent>) -> anyhow::Result<()> {
        info!("RadioCore: starting event loop");
        self.tick();

        loop {
            match event_rx.recv().await {
                None => {
                    info!("RadioCore: event channel closed, shutting down");
                    break;
                }
                Some(RadioEvent::Shutdown) => {
                    info!("RadioCore: shutdown requested");
                    break;
                }
                Some(RadioEvent::Tick) => self.tick(),
                Some(RadioEvent::SyncFinished {
                    index,
                    report,
                    remote_error,
                }) => self.sync_finished(index, report, remote_error),
            }
        }

        self.machine.request_static();
        Ok(())
    }

    fn tick(&mut self) {
        self.ticks += 1;
        self.machine.step_fade();

        if let Some(freq) = self.dial.read() {
            if self.last_reading != Some(freq) {
                self.last_reading = Some(freq);
                self.tuner.tune(freq, &mut self.machine, &mut self.display);
                debug!("RadioCore: tuned {} → {:?}", freq, self.machine.mode());
            }
        }

        let every = u64::from(self.timing.track_check_every.max(1));
        if self.ticks % every == 0 {
            self.machine.poll_track_end();
        }
    }

    fn sync_finished(
        &mut self,
        index: Option<Arc<FrequencyIndex>>,
        report: SyncReport,
        remote_error: Option<RadioError>,
    ) {
        if let Some(e) = remote_error {
            info!("RadioCore: sync failed ({}), staying on cached catalog", e);
            return;
        }
        let Some(index) = index else {
            return;
        };
        debug!("RadioCore: sync report {:?}", report);

        if *index == **self.tuner.index() {
            debug!("RadioCore: catalog unchanged");
            return;
        }
        info!(
            "RadioCore: catalog updated, {} stations on {} frequencies",
            index.station_count(),
            index.frequencies().len()
        );
        self.tuner.replace_index(index);

        // Pick up a station that just appeared under the needle; leave
        // anything already audible alone.
        if self.machine.mode() == Mode::Static {
            if let Some(freq) = self.last_reading {
                self.tuner.tune(freq, &mut self.machine, &mut self.display);
            }
        }
    }

    pub fn machine(&self) -> &PlaybackMachine<A> {
        &self.machine
    }
}

// ── background tasks ──────────────────────────────────────────────────────────

/// Send a `Tick` every `period` until the core goes away.
pub fn spawn_ticker(period: std::time::Duration, tx: mpsc::Sender<RadioEvent>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if tx.send(RadioEvent::Tick).await.is_err() {
                break;
            }
        }
    });
}

/// Sync now, then every `sync_interval`, or after `sync_retry` when the
/// remote could not be reached.
pub fn spawn_sync<R>(
    engine: SyncEngine<R>,
    mut manifest: SyncManifest,
    timing: TimingConfig,
    tx: mpsc::Sender<RadioEvent>,
) where
    R: RemoteCatalog + Send + Sync + 'static,
{
    tokio::spawn(async move {
        loop {
            let SyncOutcome {
                manifest: next,
                index,
                report,
                remote_error,
            } = engine.sync(manifest).await;
            manifest = next;

            let delay = if remote_error.is_none() {
                timing.sync_interval()
            } else {
                timing.sync_retry()
            };
            let event = RadioEvent::SyncFinished {
                index,
                report,
                remote_error,
            };
            if tx.send(event).await.is_err() {
                break;
            }
            debug!("sync: next run in {:?}", delay);
            tokio::time::sleep(delay).await;
        }
    });
}
