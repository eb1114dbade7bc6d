//! Audio output capability consumed by the playback state machine.
//!
//! Every call is fire-and-forget: implementations queue the request to their
//! backend and return immediately. The state machine never waits on hardware.

use std::path::Path;

/// The three logical mixer channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Looping tuning noise.
    Static,
    /// The station's clean recording.
    Exact,
    /// The muffled rendition heard from an adjacent frequency.
    Nearby,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Static, Channel::Exact, Channel::Nearby];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Exact => "exact",
            Self::Nearby => "nearby",
        }
    }
}

pub trait AudioOutput {
    fn play(&mut self, channel: Channel, asset: &Path, looped: bool);
    /// `volume` is in `[0, 1]`.
    fn set_volume(&mut self, channel: Channel, volume: f32);
    fn is_playing(&self, channel: Channel) -> bool;
    fn stop(&mut self, channel: Channel);
}

impl<T: AudioOutput + ?Sized> AudioOutput for Box<T> {
    fn play(&mut self, channel: Channel, asset: &Path, looped: bool) {
        (**self).play(channel, asset, looped)
    }

    fn set_volume(&mut self, channel: Channel, volume: f32) {
        (**self).set_volume(channel, volume)
    }

    fn is_playing(&self, channel: Channel) -> bool {
        (**self).is_playing(channel)
    }

    fn stop(&mut self, channel: Channel) {
        (**self).stop(channel)
    }
}

/// In-memory mixer that records every call. Used by the unit and
/// integration tests in place of a real backend.
#[derive(Debug, Default)]
pub struct RecordingAudio {
    pub calls: Vec<AudioCall>,
    playing: [Option<std::path::PathBuf>; 3],
    volumes: [f32; 3],
}

#[derive(Debug, Clone, PartialEq)]
pub enum AudioCall {
    Play(Channel, std::path::PathBuf, bool),
    SetVolume(Channel, f32),
    Stop(Channel),
}

impl RecordingAudio {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(channel: Channel) -> usize {
        match channel {
            Channel::Static => 0,
            Channel::Exact => 1,
            Channel::Nearby => 2,
        }
    }

    pub fn volume(&self, channel: Channel) -> f32 {
        self.volumes[Self::slot(channel)]
    }

    pub fn now_playing(&self, channel: Channel) -> Option<&Path> {
        self.playing[Self::slot(channel)].as_deref()
    }

    /// Simulate the backend reaching the end of the asset.
    pub fn finish(&mut self, channel: Channel) {
        self.playing[Self::slot(channel)] = None;
    }

    /// Number of `play` calls made on `channel` so far.
    pub fn play_count(&self, channel: Channel) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, AudioCall::Play(ch, _, _) if *ch == channel))
            .count()
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }
}

impl AudioOutput for RecordingAudio {
    fn play(&mut self, channel: Channel, asset: &Path, looped: bool) {
        self.playing[Self::slot(channel)] = Some(asset.to_path_buf());
        self.calls
            .push(AudioCall::Play(channel, asset.to_path_buf(), looped));
    }

    fn set_volume(&mut self, channel: Channel, volume: f32) {
        self.volumes[Self::slot(channel)] = volume;
        self.calls.push(AudioCall::SetVolume(channel, volume));
    }

    fn is_playing(&self, channel: Channel) -> bool {
        self.playing[Self::slot(channel)].is_some()
    }

    fn stop(&mut self, channel: Channel) {
        self.playing[Self::slot(channel)] = None;
        self.calls.push(AudioCall::Stop(channel));
    }
}
