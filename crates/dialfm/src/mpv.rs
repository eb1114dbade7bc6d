//! mpv-backed mixer: one mpv process per logical channel.
//!
//! ```text
//!   MpvMixer::spawn()
//!         │
//!         ├── static  ─ MpvChannel ─┬─ writer_task ← JSON lines via mpsc → socket
//!         ├── exact   ─ MpvChannel ─┤
//!         └── nearby  ─ MpvChannel ─┴─ reader_task ← events → AtomicBool flags
//! ```
//!
//! `AudioOutput` calls never wait: each one serialises a command and hands
//! it to the channel's writer task. Replies are only inspected for errors.
//! Whether a channel is playing is derived from the observed `idle-active`
//! property plus a "load pending" flag that covers the gap between
//! `loadfile` and mpv reporting the file as loaded.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Context;
use dialfm_core::audio::{AudioOutput, Channel};
use dialfm_core::platform;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

const OBS_IDLE_ACTIVE: u64 = 1;

struct ChannelFlags {
    /// Last observed `idle-active`. mpv starts idle.
    idle: AtomicBool,
    /// A `loadfile` was sent and mpv has not yet loaded or rejected it.
    loading: AtomicBool,
    /// The IPC connection is gone. Set once by the reader task.
    dead: AtomicBool,
}

impl ChannelFlags {
    fn new() -> Self {
        Self {
            idle: AtomicBool::new(true),
            loading: AtomicBool::new(false),
            dead: AtomicBool::new(false),
        }
    }

    /// A dead channel reports playing forever so the track clock never
    /// fires on it.
    fn is_playing(&self) -> bool {
        self.is_dead()
            || self.loading.load(Ordering::Acquire)
            || !self.idle.load(Ordering::Acquire)
    }

    fn is_dead(&self) -> bool {
        self.dead.load(Ordering::Acquire)
    }

    fn mark_dead(&self) {
        self.loading.store(false, Ordering::Release);
        self.dead.store(true, Ordering::Release);
    }
}

pub struct MpvChannel {
    channel: Channel,
    tx: mpsc::Sender<String>,
    flags: Arc<ChannelFlags>,
    _process: tokio::process::Child,
}

impl MpvChannel {
    pub async fn spawn(channel: Channel) -> anyhow::Result<Self> {
        let socket_path = std::path::PathBuf::from(platform::mpv_socket_name(channel));
        let _ = tokio::fs::remove_file(&socket_path).await;

        let mpv_binary = platform::find_mpv_binary().context("mpv binary not found")?;
        info!("mpv[{}]: spawning {}", channel.label(), mpv_binary.display());

        let process = tokio::process::Command::new(mpv_binary)
            .arg("--no-video")
            .arg("--idle=yes")
            .arg(platform::mpv_socket_arg(channel))
            .arg("--quiet")
            .arg("--volume=0")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning mpv for the {} channel", channel.label()))?;

        // Wait for socket to appear
        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            if socket_path.exists() {
                break;
            }
        }
        if !socket_path.exists() {
            anyhow::bail!("mpv IPC socket for {} did not appear", channel.label());
        }

        let stream = UnixStream::connect(&socket_path)
            .await
            .with_context(|| format!("connecting to {}", socket_path.display()))?;
        info!("mpv[{}]: connected to IPC socket", channel.label());

        let (read_half, write_half) = stream.into_split();
        let flags = Arc::new(ChannelFlags::new());
        let (tx, rx) = mpsc::channel::<String>(64);
        tokio::spawn(writer_task(channel, write_half, rx));
        tokio::spawn(reader_task(channel, BufReader::new(read_half), Arc::clone(&flags)));

        let this = Self {
            channel,
            tx,
            flags,
            _process: process,
        };
        this.send(json!(["observe_property", OBS_IDLE_ACTIVE, "idle-active"]));
        Ok(this)
    }

    /// Queue a command. Drops it with a warning if the writer is backed up,
    /// and silently once the connection is dead.
    fn send(&self, command: Value) {
        if self.flags.is_dead() {
            return;
        }
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let msg = json!({ "command": command, "request_id": req_id });
        let mut raw = msg.to_string();
        raw.push('\n');
        if let Err(e) = self.tx.try_send(raw) {
            warn!("mpv[{}]: dropping req={}: {}", self.channel.label(), req_id, e);
        }
    }

    fn play(&self, asset: &Path, looped: bool) {
        self.flags.loading.store(true, Ordering::Release);
        self.send(json!(["loadfile", asset.to_string_lossy(), "replace"]));
        let repeat = if looped { "inf" } else { "no" };
        self.send(json!(["set_property", "loop-file", repeat]));
    }

    fn set_volume(&self, volume: f32) {
        let vol_pct = (volume * 100.0).clamp(0.0, 100.0);
        self.send(json!(["set_property", "volume", vol_pct]));
    }

    fn stop(&self) {
        self.flags.loading.store(false, Ordering::Release);
        self.send(json!(["stop"]));
    }
}

// ── reader / writer tasks ─────────────────────────────────────────────────────

async fn reader_task<R>(channel: Channel, mut reader: BufReader<R>, flags: Arc<ChannelFlags>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let label = channel.label();
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                warn!("mpv[{}] reader: connection closed", label);
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let val: Value = match serde_json::from_str(trimmed) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("mpv[{}] reader: invalid json '{}': {}", label, trimmed, e);
                        continue;
                    }
                };
                handle_message(label, &val, &flags);
            }
            Err(e) => {
                warn!("mpv[{}] reader: read error: {}", label, e);
                break;
            }
        }
    }
    error!("mpv[{}]: connection lost, channel muted until restart", label);
    flags.mark_dead();
}

fn handle_message(label: &str, val: &Value, flags: &ChannelFlags) {
    if let Some(req_id) = val.get("request_id").and_then(Value::as_u64) {
        let status = val.get("error").and_then(Value::as_str).unwrap_or("unknown error");
        if status != "success" {
            warn!("mpv[{}]: req={} failed: {}", label, req_id, status);
        }
        return;
    }

    match val.get("event").and_then(Value::as_str) {
        Some("property-change") => {
            if val.get("id").and_then(Value::as_u64) == Some(OBS_IDLE_ACTIVE) {
                if let Some(idle) = val.get("data").and_then(Value::as_bool) {
                    debug!("mpv[{}]: idle-active={}", label, idle);
                    flags.idle.store(idle, Ordering::Release);
                }
            }
        }
        Some("file-loaded") => {
            flags.idle.store(false, Ordering::Release);
            flags.loading.store(false, Ordering::Release);
        }
        Some("end-file") => {
            if val.get("reason").and_then(Value::as_str) == Some("error") {
                warn!(
                    "mpv[{}]: playback failed: {}",
                    label,
                    val.get("file_error").and_then(serde_json::Value::as_str).unwrap_or("unknown")
                );
                flags.loading.store(false, Ordering::Release);
            }
        }
        _ => {}
    }
}

async fn writer_task<W>(channel: Channel, mut writer: W, mut rx: mpsc::Receiver<String>)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(payload) = rx.recv().await {
        debug!("mpv[{}] writer: {}", channel.label(), payload.trim());
        if let Err(e) = writer.write_all(payload.as_bytes()).await {
            warn!("mpv[{}] writer: write error: {}", channel.label(), e);
            break;
        }
    }
    debug!("mpv[{}] writer: task exiting", channel.label());
}

// ── mixer ─────────────────────────────────────────────────────────────────────

pub struct MpvMixer {
    channels: [MpvChannel; 3],
}

impl MpvMixer {
    pub async fn spawn() -> anyhow::Result<Self> {
        let [s, e, n] = Channel::ALL;
        Ok(Self {
            channels: [
                MpvChannel::spawn(s).await?,
                MpvChannel::spawn(e).await?,
                MpvChannel::spawn(n).await?,
            ],
        })
    }

    fn get(&self, channel: Channel) -> &MpvChannel {
        match channel {
            Channel::Static => &self.channels[0],
            Channel::Exact => &self.channels[1],
            Channel::Nearby => &self.channels[2],
        }
    }
}

impl AudioOutput for MpvMixer {
    fn play(&mut self, channel: Channel, asset: &Path, looped: bool) {
        self.get(channel).play(asset, looped);
    }

    fn set_volume(&mut self, channel: Channel, volume: f32) {
        self.get(channel).set_volume(volume);
    }

    fn is_playing(&self, channel: Channel) -> bool {
        self.get(channel).flags.is_playing()
    }

    fn stop(&mut self, channel: Channel) {
        self.get(channel).stop();
    }
}
