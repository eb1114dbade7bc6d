//! Dial reading → playback request.
//!
//! Resolution order is exact bucket, then `freq + 1`, then `freq - 1`, then
//! static. The station within a bucket is chosen at random, as is the track
//! it starts on.

use std::collections::HashMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::audio::AudioOutput;
use crate::catalog::{FrequencyIndex, TrackSet};
use crate::config::StationChoice;
use crate::display::DisplayOutput;
use crate::frequency;
use crate::playback::PlaybackMachine;

#[derive(Debug, Clone, PartialEq)]
pub enum TuneOutcome {
    Exact(Arc<TrackSet>),
    /// `frequency` is the occupied neighbour that was picked up.
    Nearby {
        frequency: u16,
        tracks: Arc<TrackSet>,
    },
    Static,
}

impl TuneOutcome {
    pub fn tracks(&self) -> Option<&Arc<TrackSet>> {
        match self {
            Self::Exact(tracks) | Self::Nearby { tracks, .. } => Some(tracks),
            Self::Static => None,
        }
    }
}

pub struct Tuner<R = StdRng> {
    index: Arc<FrequencyIndex>,
    choice: StationChoice,
    pinned: HashMap<u16, Arc<TrackSet>>,
    rng: R,
}

impl Tuner<StdRng> {
    pub fn new(index: Arc<FrequencyIndex>, choice: StationChoice) -> Self {
        Self::with_rng(index, choice, StdRng::from_entropy())
    }
}

impl<R: Rng> Tuner<R> {
    pub fn with_rng(index: Arc<FrequencyIndex>, choice: StationChoice, rng: R) -> Self {
        Self {
            index,
            choice,
            pinned: HashMap::new(),
            rng,
        }
    }

    pub fn index(&self) -> &Arc<FrequencyIndex> {
        &self.index
    }

    /// Swap in a freshly built index. Pinned picks refer to the old one and
    /// are dropped.
    pub fn replace_index(&mut self, index: Arc<FrequencyIndex>) {
        debug!(
            "tuner: index replaced ({} stations)",
            index.station_count()
        );
        self.index = index;
        self.pinned.clear();
    }

    /// Decide what `freq` should play without touching any output.
    pub fn resolve(&mut self, freq: u16) -> TuneOutcome {
        if let Some(tracks) = self.pick(freq) {
            return TuneOutcome::Exact(tracks);
        }
        let neighbours = [freq.checked_add(1), freq.checked_sub(1)];
        for neighbour in neighbours.into_iter().flatten() {
            if let Some(tracks) = self.pick(neighbour) {
                return TuneOutcome::Nearby {
                    frequency: neighbour,
                    tracks,
                };
            }
        }
        TuneOutcome::Static
    }

    /// Resolve `freq`, update the display and drive the playback machine.
    pub fn tune<A, D>(
        &mut self,
        freq: u16,
        machine: &mut PlaybackMachine<A>,
        display: &mut D,
    ) -> TuneOutcome
    where
        A: AudioOutput,
        D: DisplayOutput + ?Sized,
    {
        if !frequency::in_range(freq) {
            debug!("tuner: {} is off the dial", freq);
        }

        let outcome = self.resolve(freq);
        match &outcome {
            TuneOutcome::Exact(tracks) => {
                display.show(freq, Some(tracks.station.display_name()));
                let start = self.start_index(tracks);
                machine.request_exact(tracks, start);
            }
            TuneOutcome::Nearby { tracks, .. } => {
                display.show(freq, None);
                let start = self.start_index(tracks);
                machine.request_nearby(tracks, start);
            }
            TuneOutcome::Static => {
                display.show(freq, None);
                machine.request_static();
            }
        }
        outcome
    }

    fn pick(&mut self, freq: u16) -> Option<Arc<TrackSet>> {
        let bucket = self.index.lookup(freq)?;
        match self.choice {
            StationChoice::Reroll => bucket.choose(&mut self.rng).cloned(),
            StationChoice::Pinned => {
                if let Some(pinned) = self.pinned.get(&freq) {
                    return Some(Arc::clone(pinned));
                }
                let chosen = bucket.choose(&mut self.rng).cloned()?;
                self.pinned.insert(freq, Arc::clone(&chosen));
                Some(chosen)
            }
        }
    }

    fn start_index(&mut self, tracks: &TrackSet) -> usize {
        self.rng.gen_range(0..tracks.len().max(1))
    }
}
