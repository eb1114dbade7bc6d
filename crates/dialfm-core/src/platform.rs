use std::path::PathBuf;

use crate::audio::Channel;

pub fn data_dir() -> PathBuf {
    // ~/.local/share/dialfm/ (XDG layout on every unix, including macOS)
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".local")
        .join("share")
        .join("dialfm")
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("dialfm")
}

/// IPC socket for the mpv process backing `channel`.
pub fn mpv_socket_name(channel: Channel) -> String {
    format!(
        "{}/dialfm-mpv-{}.sock",
        std::env::temp_dir().display(),
        channel.label()
    )
}

pub fn mpv_socket_arg(channel: Channel) -> String {
    format!("--input-ipc-server={}", mpv_socket_name(channel))
}

/// Find the mpv binary: `MPV_PATH`, then beside the current exe, then PATH.
pub fn find_mpv_binary() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("MPV_PATH") {
        let path = PathBuf::from(p);
        if path.exists() {
            return Some(path);
        }
    }
    if let Some(p) = find_beside_exe("mpv") {
        return Some(p);
    }
    find_on_path("mpv")
}

fn find_beside_exe(name: &str) -> Option<PathBuf> {
    let current_exe = std::env::current_exe().ok()?;
    let p = current_exe.parent()?.join(name);
    p.exists().then_some(p)
}

fn find_on_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|p| p.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_names_are_distinct_per_channel() {
        let names: Vec<_> = Channel::ALL.iter().map(|c| mpv_socket_name(*c)).collect();
        assert_ne!(names[0], names[1]);
        assert_ne!(names[1], names[2]);
        assert!(mpv_socket_arg(Channel::Exact).ends_with("dialfm-mpv-exact.sock"));
    }

    #[test]
    fn test_dirs_are_namespaced() {
        assert!(data_dir().ends_with("dialfm"));
        assert!(config_dir().ends_with(".config/dialfm"));
    }
}
