//! Playback state machine: which of the three mixer channels is audible.
//!
//! ```text
//!            request_static                 request_exact
//!   Off ───────────────────► Static ◄──────────────────────► Playing
//!    │                         ▲  ▲                            ▲
//!    │ request_exact/nearby    │  └──────── request_static ────┤
//!    └─────────────────────────┼──────────► Nearby ◄───────────┘
//!                              └── request_static ─┘  request_nearby
//! ```
//!
//! Every transition comes from [`transition`], a total function of the
//! current mode, the request, and whether the requested track list is the
//! one already running. Moving between `Nearby` and `Playing` on the same
//! list only swaps channel volumes, so the recording never restarts.
//!
//! The static channel loops forever from construction; only its volume
//! moves. Volume changes toward a mode's static level are applied in steps by
//! [`PlaybackMachine::step_fade`] and are dropped as soon as the mode that
//! started them is gone.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::audio::{AudioOutput, Channel};
use crate::catalog::TrackSet;
use crate::config::PlaybackConfig;
use crate::error::RadioError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Off,
    Static,
    Nearby,
    Playing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Static,
    Exact,
    Nearby,
}

/// What happens to the exact/nearby channels on a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackAction {
    /// Leave them as they are.
    Keep,
    /// Stop both.
    Stop,
    /// Start the requested track on both, volumes per the new mode.
    Start,
    /// Same list already running: set volumes per the new mode only.
    Cross,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: Mode,
    pub tracks: TrackAction,
    /// Begin a static fade toward the new mode's level.
    pub fade_static: bool,
}

const fn to(next: Mode, tracks: TrackAction, fade_static: bool) -> Option<Transition> {
    Some(Transition {
        next,
        tracks,
        fade_static,
    })
}

/// The transition table. `None` means the request is a no-op in this
/// configuration. `same_list` is ignored for [`Request::Static`].
pub fn transition(mode: Mode, request: Request, same_list: bool) -> Option<Transition> {
    use Mode::*;
    use TrackAction::*;

    match (mode, request) {
        (Static, Request::Static) => None,
        (Off, Request::Static) => to(Static, Keep, true),
        (Nearby | Playing, Request::Static) => to(Static, Stop, true),

        (Off | Static, Request::Exact) => to(Playing, Start, true),
        (Nearby, Request::Exact) if same_list => to(Playing, Cross, true),
        (Nearby, Request::Exact) => to(Playing, Start, true),
        (Playing, Request::Exact) if same_list => None,
        (Playing, Request::Exact) => to(Playing, Start, false),

        (Off | Static, Request::Nearby) => to(Nearby, Start, true),
        (Playing, Request::Nearby) if same_list => to(Nearby, Cross, true),
        (Playing, Request::Nearby) => to(Nearby, Start, true),
        (Nearby, Request::Nearby) if same_list => None,
        (Nearby, Request::Nearby) => to(Nearby, Start, false),
    }
}

/// Target static volume, guarded by the mode that asked for it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticFade {
    pub target: f32,
    pub owner: Mode,
}

/// Observable playback state. One per device.
#[derive(Debug, Clone, Default)]
pub struct PlaybackState {
    pub mode: Mode,
    pub active_tracks: Option<Arc<TrackSet>>,
    pub active_index: usize,
    volumes: [f32; 3],
}

impl PlaybackState {
    pub fn volume(&self, channel: Channel) -> f32 {
        self.volumes[slot(channel)]
    }
}

fn slot(channel: Channel) -> usize {
    match channel {
        Channel::Static => 0,
        Channel::Exact => 1,
        Channel::Nearby => 2,
    }
}

pub struct PlaybackMachine<A: AudioOutput> {
    audio: A,
    assets_root: PathBuf,
    fade_step: f32,
    nearby_static_volume: f32,
    state: PlaybackState,
    fade: Option<StaticFade>,
    /// Channel whose end marks the end of the current track. `None` when
    /// neither asset of the track could be started.
    track_clock: Option<Channel>,
}

impl<A: AudioOutput> PlaybackMachine<A> {
    /// Starts the static loop silently. Tracks resolve under `assets_root`.
    pub fn new(
        mut audio: A,
        assets_root: impl Into<PathBuf>,
        static_asset: &Path,
        config: &PlaybackConfig,
    ) -> Self {
        audio.set_volume(Channel::Static, 0.0);
        if static_asset.exists() {
            audio.play(Channel::Static, static_asset, true);
        } else {
            warn!(
                "playback: {}; static channel stays silent",
                RadioError::AssetMissing(static_asset.to_path_buf())
            );
        }

        Self {
            audio,
            assets_root: assets_root.into(),
            fade_step: config.fade_step.clamp(0.0, 1.0),
            nearby_static_volume: config.nearby_static_volume.clamp(0.0, 1.0),
            state: PlaybackState::default(),
            fade: None,
            track_clock: None,
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn mode(&self) -> Mode {
        self.state.mode
    }

    pub fn fade(&self) -> Option<StaticFade> {
        self.fade
    }

    pub fn audio(&self) -> &A {
        &self.audio
    }

    pub fn audio_mut(&mut self) -> &mut A {
        &mut self.audio
    }

    /// Static level for `mode`: silent when off or locked on, full when
    /// untuned, a residual hiss next to a station.
    pub fn static_target(&self, mode: Mode) -> f32 {
        match mode {
            Mode::Off | Mode::Playing => 0.0,
            Mode::Static => 1.0,
            Mode::Nearby => self.nearby_static_volume,
        }
    }

    // ── requests ──────────────────────────────────────────────────────────────

    /// Returns whether anything changed.
    pub fn request_static(&mut self) -> bool {
        self.apply(Request::Static, None)
    }

    pub fn request_exact(&mut self, tracks: &Arc<TrackSet>, index: usize) -> bool {
        self.apply(Request::Exact, Some((tracks, index)))
    }

    pub fn request_nearby(&mut self, tracks: &Arc<TrackSet>, index: usize) -> bool {
        self.apply(Request::Nearby, Some((tracks, index)))
    }

    fn apply(&mut self, request: Request, tracks: Option<(&Arc<TrackSet>, usize)>) -> bool {
        let same_list = match (&self.state.active_tracks, tracks) {
            (Some(active), Some((requested, _))) => Arc::ptr_eq(active, requested),
            _ => false,
        };

        let Some(t) = transition(self.state.mode, request, same_list) else {
            return false;
        };

        debug!(
            "playback: {:?} --{:?}--> {:?} ({:?}, same_list={})",
            self.state.mode, request, t.next, t.tracks, same_list
        );
        self.state.mode = t.next;

        match t.tracks {
            TrackAction::Keep => {}
            TrackAction::Stop => self.stop_tracks(),
            TrackAction::Start => {
                if let Some((list, index)) = tracks {
                    self.start_tracks(Arc::clone(list), index);
                }
            }
            TrackAction::Cross => self.apply_track_volumes(),
        }

        if t.fade_static {
            self.begin_fade(self.static_target(t.next));
        }
        true
    }

    // ── track advance ─────────────────────────────────────────────────────────

    /// Advance to the next track once the exact channel has finished, or
    /// the nearby one when only the lowpass variant exists. Returns whether
    /// a new track was started.
    pub fn poll_track_end(&mut self) -> bool {
        if !matches!(self.state.mode, Mode::Nearby | Mode::Playing) {
            return false;
        }
        let Some(list) = self.state.active_tracks.clone() else {
            return false;
        };
        if let Some(channel) = self.track_clock {
            if self.audio.is_playing(channel) {
                return false;
            }
        }

        let next = (self.state.active_index + 1) % list.len().max(1);
        info!(
            "playback: track ended on {}, advancing to {}/{}",
            list.station.display_name(),
            next + 1,
            list.len()
        );
        self.start_tracks(list, next);
        true
    }

    // ── static fade ───────────────────────────────────────────────────────────

    fn begin_fade(&mut self, target: f32) {
        if self.fade_step >= 1.0 || self.fade_step <= 0.0 {
            self.fade = None;
            self.set_volume(Channel::Static, target);
            return;
        }
        self.fade = Some(StaticFade {
            target,
            owner: self.state.mode,
        });
        self.step_fade();
    }

    /// Move the static channel one step toward its target. Returns whether
    /// the fade is still in progress.
    pub fn step_fade(&mut self) -> bool {
        let Some(fade) = self.fade else {
            return false;
        };
        if fade.owner != self.state.mode {
            debug!(
                "playback: abandoning static fade to {:.2} ({:?} is gone)",
                fade.target, fade.owner
            );
            self.fade = None;
            return false;
        }

        let current = self.state.volume(Channel::Static);
        let next = if current < fade.target {
            (current + self.fade_step).min(fade.target)
        } else {
            (current - self.fade_step).max(fade.target)
        };
        self.set_volume(Channel::Static, next);

        if next == fade.target {
            self.fade = None;
            false
        } else {
            true
        }
    }

    // ── channel helpers ───────────────────────────────────────────────────────

    fn start_tracks(&mut self, list: Arc<TrackSet>, index: usize) {
        if list.is_empty() {
            warn!("playback: {} has no tracks", list.station.display_name());
            self.stop_tracks();
            return;
        }
        let index = index % list.len();
        let track = &list.tracks[index];
        let primary = self.assets_root.join(track.primary_path());
        let nearby = self.assets_root.join(track.nearby_path());

        debug!("playback: starting {} (nearby {})", primary.display(), nearby.display());
        let exact = self.start_channel(Channel::Exact, &primary);
        let nearby = self.start_channel(Channel::Nearby, &nearby);
        self.track_clock = if exact {
            Some(Channel::Exact)
        } else if nearby {
            Some(Channel::Nearby)
        } else {
            None
        };

        self.state.active_tracks = Some(list);
        self.state.active_index = index;
        self.apply_track_volumes();
    }

    fn start_channel(&mut self, channel: Channel, asset: &Path) -> bool {
        if asset.exists() {
            self.audio.play(channel, asset, false);
            true
        } else {
            warn!(
                "playback: {}; {} channel silenced",
                RadioError::AssetMissing(asset.to_path_buf()),
                channel.label()
            );
            self.audio.stop(channel);
            false
        }
    }

    fn stop_tracks(&mut self) {
        self.audio.stop(Channel::Exact);
        self.audio.stop(Channel::Nearby);
        self.set_volume(Channel::Exact, 0.0);
        self.set_volume(Channel::Nearby, 0.0);
        self.state.active_tracks = None;
        self.state.active_index = 0;
        self.track_clock = None;
    }

    fn apply_track_volumes(&mut self) {
        let (exact, nearby) = match self.state.mode {
            Mode::Playing => (1.0, 0.0),
            Mode::Nearby => (0.0, 1.0),
            Mode::Off | Mode::Static => (0.0, 0.0),
        };
        self.set_volume(Channel::Exact, exact);
        self.set_volume(Channel::Nearby, nearby);
    }

    fn set_volume(&mut self, channel: Channel, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        self.state.volumes[slot(channel)] = volume;
        self.audio.set_volume(channel, volume);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioCall, RecordingAudio};
    use crate::catalog::{StationId, Track};
    use tempfile::TempDir;

    const TOKEN: &str = "3f2b8c1e-9a4d-4e7b-8c2f-1d5e6a7b8c9d";
    const HASH: &str = "0123456789abcdef0123456789abcdef";

    struct Fixture {
        dir: TempDir,
        machine: PlaybackMachine<RecordingAudio>,
    }

    /// Writes `count` tracks for `name`, with nearby variants unless
    /// `with_nearby` is false.
    fn track_set(dir: &Path, name: &str, count: usize, with_nearby: bool) -> Arc<TrackSet> {
        let tracks = (1..=count)
            .map(|n| {
                let track = Track {
                    path: format!("{TOKEN}/{name}{n:02}.ogg"),
                    hash: HASH.parse().unwrap(),
                };
                let primary = dir.join(track.primary_path());
                std::fs::create_dir_all(primary.parent().unwrap()).unwrap();
                std::fs::write(&primary, b"ogg").unwrap();
                if with_nearby {
                    std::fs::write(dir.join(track.nearby_path()), b"ogg").unwrap();
                }
                track
            })
            .collect();
        Arc::new(TrackSet {
            station: StationId::new(TOKEN, name),
            tracks,
        })
    }

    fn fixture(fade_step: f32) -> Fixture {
        let dir = TempDir::new().unwrap();
        let static_asset = dir.path().join("radiotuning.ogg");
        std::fs::write(&static_asset, b"noise").unwrap();
        let config = PlaybackConfig {
            fade_step,
            ..PlaybackConfig::default()
        };
        let machine = PlaybackMachine::new(RecordingAudio::new(), dir.path(), &static_asset, &config);
        Fixture { dir, machine }
    }

    fn settle(machine: &mut PlaybackMachine<RecordingAudio>) {
        for _ in 0..100 {
            if !machine.step_fade() {
                return;
            }
        }
        panic!("fade did not settle");
    }

    #[test]
    fn test_table_is_total_and_noops_are_exactly_the_resting_configurations() {
        let modes = [Mode::Off, Mode::Static, Mode::Nearby, Mode::Playing];
        let requests = [Request::Static, Request::Exact, Request::Nearby];
        for mode in modes {
            for request in requests {
                for same in [false, true] {
                    let t = transition(mode, request, same);
                    let resting = matches!(
                        (mode, request, same),
                        (Mode::Static, Request::Static, _)
                            | (Mode::Playing, Request::Exact, true)
                            | (Mode::Nearby, Request::Nearby, true)
                    );
                    assert_eq!(t.is_none(), resting, "{mode:?} {request:?} same={same}");
                    if let Some(t) = t {
                        let expected = match request {
                            Request::Static => Mode::Static,
                            Request::Exact => Mode::Playing,
                            Request::Nearby => Mode::Nearby,
                        };
                        assert_eq!(t.next, expected);
                    }
                }
            }
        }
    }

    #[test]
    fn test_static_loop_starts_silently() {
        let f = fixture(0.1);
        let audio = f.machine.audio();
        assert_eq!(audio.play_count(Channel::Static), 1);
        assert!(matches!(audio.calls[1], AudioCall::Play(Channel::Static, _, true)));
        assert_eq!(audio.volume(Channel::Static), 0.0);
        assert_eq!(f.machine.mode(), Mode::Off);
    }

    #[test]
    fn test_exact_nearby_exact_on_same_list_never_restarts() {
        let mut f = fixture(0.1);
        let list = track_set(f.dir.path(), "Radio_", 2, true);

        assert!(f.machine.request_exact(&list, 0));
        assert!(f.machine.request_nearby(&list, 0));
        assert_eq!(f.machine.audio().volume(Channel::Exact), 0.0);
        assert_eq!(f.machine.audio().volume(Channel::Nearby), 1.0);
        assert!(f.machine.request_exact(&list, 0));
        settle(&mut f.machine);

        let audio = f.machine.audio();
        assert_eq!(audio.play_count(Channel::Exact), 1);
        assert_eq!(audio.play_count(Channel::Nearby), 1);
        assert_eq!(audio.volume(Channel::Exact), 1.0);
        assert_eq!(audio.volume(Channel::Nearby), 0.0);
        assert_eq!(audio.volume(Channel::Static), 0.0);
        assert_eq!(f.machine.mode(), Mode::Playing);
    }

    #[test]
    fn test_different_list_forces_restart() {
        let mut f = fixture(1.0);
        let l = track_set(f.dir.path(), "Radio_", 2, true);
        let m = track_set(f.dir.path(), "Other_", 2, true);

        f.machine.request_exact(&l, 1);
        f.machine.audio_mut().clear_calls();
        assert!(f.machine.request_exact(&m, 0));

        let audio = f.machine.audio();
        assert_eq!(audio.play_count(Channel::Exact), 1);
        assert_eq!(
            audio.now_playing(Channel::Exact).unwrap(),
            f.dir.path().join(format!("{TOKEN}/Other_01.ogg"))
        );
        assert_eq!(f.machine.state().active_index, 0);
        assert!(Arc::ptr_eq(f.machine.state().active_tracks.as_ref().unwrap(), &m));
    }

    #[test]
    fn test_equal_content_but_new_arc_is_a_different_list() {
        let mut f = fixture(1.0);
        let l = track_set(f.dir.path(), "Radio_", 1, true);
        let copy = Arc::new((*l).clone());

        f.machine.request_nearby(&l, 0);
        f.machine.audio_mut().clear_calls();
        f.machine.request_exact(&copy, 0);
        assert_eq!(f.machine.audio().play_count(Channel::Exact), 1);
    }

    #[test]
    fn test_repeated_requests_are_noops() {
        let mut f = fixture(1.0);
        let l = track_set(f.dir.path(), "Radio_", 1, true);

        f.machine.request_exact(&l, 0);
        f.machine.audio_mut().clear_calls();
        assert!(!f.machine.request_exact(&l, 0));
        assert!(f.machine.audio().calls.is_empty());

        f.machine.request_static();
        f.machine.audio_mut().clear_calls();
        assert!(!f.machine.request_static());
        assert!(f.machine.audio().calls.is_empty());

        f.machine.request_nearby(&l, 0);
        f.machine.audio_mut().clear_calls();
        assert!(!f.machine.request_nearby(&l, 0));
        assert!(f.machine.audio().calls.is_empty());
    }

    #[test]
    fn test_static_stops_tracks_and_fades_up() {
        let mut f = fixture(0.25);
        let l = track_set(f.dir.path(), "Radio_", 1, true);
        f.machine.request_exact(&l, 0);

        assert!(f.machine.request_static());
        assert!(!f.machine.audio().is_playing(Channel::Exact));
        assert!(!f.machine.audio().is_playing(Channel::Nearby));
        assert!(f.machine.state().active_tracks.is_none());

        // First step is applied immediately, the rest per poll.
        assert_eq!(f.machine.audio().volume(Channel::Static), 0.25);
        settle(&mut f.machine);
        assert_eq!(f.machine.audio().volume(Channel::Static), 1.0);
    }

    #[test]
    fn test_nearby_leaves_residual_static() {
        let mut f = fixture(1.0);
        let l = track_set(f.dir.path(), "Radio_", 1, true);
        f.machine.request_static();
        f.machine.request_nearby(&l, 0);
        let vol = f.machine.audio().volume(Channel::Static);
        assert!((vol - 0.1).abs() < 1e-6);
        assert!(vol > 0.0);
    }

    #[test]
    fn test_mode_change_abandons_stale_fade() {
        let mut f = fixture(0.1);
        let l = track_set(f.dir.path(), "Radio_", 1, true);

        f.machine.request_static();
        f.machine.step_fade();
        let before = f.machine.audio().volume(Channel::Static);
        assert!(before > 0.0 && before < 1.0);

        f.machine.request_exact(&l, 0);
        assert_eq!(f.machine.fade().unwrap().owner, Mode::Playing);
        while f.machine.step_fade() {
            assert!(f.machine.audio().volume(Channel::Static) < before);
        }
        assert_eq!(f.machine.audio().volume(Channel::Static), 0.0);
    }

    #[test]
    fn test_fade_guard_drops_steps_for_a_departed_mode() {
        let mut f = fixture(0.1);
        let l = track_set(f.dir.path(), "Radio_", 1, true);
        f.machine.request_nearby(&l, 0);
        let owner = f.machine.fade().map(|fade| fade.owner);
        assert_eq!(owner, None, "0 -> 0.1 completes in one step");

        f.machine.request_static();
        assert_eq!(f.machine.fade().unwrap().owner, Mode::Static);
        // Simulate a mode change that does not start a fade of its own.
        f.machine.state.mode = Mode::Playing;
        let vol = f.machine.audio().volume(Channel::Static);
        assert!(!f.machine.step_fade());
        assert!(f.machine.fade().is_none());
        assert_eq!(f.machine.audio().volume(Channel::Static), vol);
    }

    #[test]
    fn test_track_end_wraps_around() {
        let mut f = fixture(1.0);
        let l = track_set(f.dir.path(), "Radio_", 3, true);
        f.machine.request_exact(&l, 2);

        assert!(!f.machine.poll_track_end(), "still playing");
        f.machine.audio_mut().finish(Channel::Exact);
        assert!(f.machine.poll_track_end());

        assert_eq!(f.machine.state().active_index, 0);
        let audio = f.machine.audio();
        assert_eq!(
            audio.now_playing(Channel::Exact).unwrap(),
            f.dir.path().join(format!("{TOKEN}/Radio_01.ogg"))
        );
        assert_eq!(audio.volume(Channel::Exact), 1.0);
        assert_eq!(audio.volume(Channel::Nearby), 0.0);
    }

    #[test]
    fn test_track_end_keeps_nearby_volumes() {
        let mut f = fixture(1.0);
        let l = track_set(f.dir.path(), "Radio_", 2, true);
        f.machine.request_nearby(&l, 0);
        f.machine.audio_mut().finish(Channel::Exact);
        assert!(f.machine.poll_track_end());
        assert_eq!(f.machine.state().active_index, 1);
        assert_eq!(f.machine.audio().volume(Channel::Exact), 0.0);
        assert_eq!(f.machine.audio().volume(Channel::Nearby), 1.0);
    }

    #[test]
    fn test_track_end_ignored_while_static_or_off() {
        let mut f = fixture(1.0);
        assert!(!f.machine.poll_track_end());
        f.machine.request_static();
        assert!(!f.machine.poll_track_end());
    }

    #[test]
    fn test_missing_nearby_variant_plays_silence() {
        let mut f = fixture(1.0);
        let l = track_set(f.dir.path(), "Radio_", 1, false);

        assert!(f.machine.request_nearby(&l, 0));
        let audio = f.machine.audio();
        assert_eq!(f.machine.mode(), Mode::Nearby);
        assert!(audio.is_playing(Channel::Exact));
        assert!(!audio.is_playing(Channel::Nearby));
        assert!(audio.calls.contains(&AudioCall::Stop(Channel::Nearby)));

        f.machine.request_exact(&l, 0);
        assert_eq!(f.machine.audio().volume(Channel::Exact), 1.0);
    }

    #[test]
    fn test_missing_primary_times_track_by_nearby_channel() {
        let mut f = fixture(1.0);
        let l = track_set(f.dir.path(), "Radio_", 2, true);
        for track in &l.tracks {
            std::fs::remove_file(f.dir.path().join(track.primary_path())).unwrap();
        }

        f.machine.request_nearby(&l, 0);
        assert!(!f.machine.audio().is_playing(Channel::Exact));
        assert!(!f.machine.poll_track_end(), "lowpass variant still playing");
        assert!(!f.machine.poll_track_end());
        assert_eq!(f.machine.audio().play_count(Channel::Nearby), 1);

        f.machine.audio_mut().finish(Channel::Nearby);
        assert!(f.machine.poll_track_end());
        assert_eq!(f.machine.state().active_index, 1);
        assert_eq!(f.machine.audio().play_count(Channel::Nearby), 2);
    }

    #[test]
    fn test_unplayable_track_is_skipped_on_next_check() {
        let mut f = fixture(1.0);
        let l = track_set(f.dir.path(), "Radio_", 2, false);
        std::fs::remove_file(f.dir.path().join(l.tracks[0].primary_path())).unwrap();

        f.machine.request_exact(&l, 0);
        assert!(f.machine.poll_track_end());
        assert_eq!(f.machine.state().active_index, 1);
        assert!(!f.machine.poll_track_end(), "second track is playable");
    }

    #[test]
    fn test_out_of_range_index_wraps() {
        let mut f = fixture(1.0);
        let l = track_set(f.dir.path(), "Radio_", 2, true);
        f.machine.request_exact(&l, 5);
        assert_eq!(f.machine.state().active_index, 1);
    }
}
