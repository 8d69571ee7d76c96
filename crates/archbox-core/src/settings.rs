//! Tool settings.
//!
//! Every fixed value the tool depends on lives here and is resolved once at
//! startup:
//! 1. Built-in defaults
//! 2. Environment variables (`ARCHBOX_*`)
//!
//! The resolved [`Settings`] is passed by reference into each component.

use std::path::PathBuf;
use std::time::Duration;

use crate::ports::{PortSpec, STREAMING_PORTS};

/// Complete tool settings.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub tunnel: TunnelSettings,
    pub defaults: ConnectionDefaults,
    pub client: ClientSettings,
    /// Replaces `~/.archbox` as the per-user directory when set.
    pub home_override: Option<PathBuf>,
}

/// Tunnel binary and subprocess settings.
#[derive(Debug, Clone)]
pub struct TunnelSettings {
    /// Pinned chisel release.
    pub version: String,
    /// Release download root; archives live at `{base}/v{version}/...`.
    pub release_base_url: String,
    /// File stem of the installed binary (`.exe` is added on Windows).
    pub binary_stem: String,
    /// Installed binaries at or below this size are treated as corrupt.
    pub min_binary_size: u64,
    /// Wait after spawn before the tunnel is announced as up.
    pub settle_interval: Duration,
    pub ports: Vec<PortSpec>,
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            version: "1.10.1".to_string(),
            release_base_url: "https://github.com/jpillora/chisel/releases/download".to_string(),
            binary_stem: "chisel".to_string(),
            min_binary_size: 100 * 1024, // 100 KiB
            settle_interval: Duration::from_secs(3),
            ports: STREAMING_PORTS.to_vec(),
        }
    }
}

/// Values offered by the setup wizard.
#[derive(Debug, Clone)]
pub struct ConnectionDefaults {
    pub server_url: String,
    pub username: String,
    pub target: String,
}

impl Default for ConnectionDefaults {
    fn default() -> Self {
        Self {
            server_url: "https://stream.gabrielmalek.com".to_string(),
            username: "archbox".to_string(),
            target: "10.10.10.102".to_string(),
        }
    }
}

/// Companion client (Moonlight) discovery and installation settings.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub display_name: String,
    /// Name looked up on `PATH`.
    pub command_name: String,
    /// GitHub "latest release" endpoint used to find the Windows installer.
    pub release_api_url: String,
    pub installer_prefix: String,
    pub installer_suffix: String,
    pub homepage: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            display_name: "Moonlight".to_string(),
            command_name: "moonlight".to_string(),
            release_api_url:
                "https://api.github.com/repos/moonlight-stream/moonlight-qt/releases/latest"
                    .to_string(),
            installer_prefix: "MoonlightSetup".to_string(),
            installer_suffix: ".exe".to_string(),
            homepage: "https://moonlight-stream.org".to_string(),
        }
    }
}

impl Settings {
    /// Defaults with the process environment applied.
    pub fn load() -> Self {
        let mut settings = Self::default();
        settings.apply_env_overrides(|key| std::env::var(key).ok());
        settings
    }

    /// Apply `ARCHBOX_*` overrides read through `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(home) = lookup("ARCHBOX_HOME").filter(|v| !v.trim().is_empty()) {
            self.home_override = Some(PathBuf::from(home.trim()));
        }
        if let Some(version) = lookup("ARCHBOX_TUNNEL_VERSION").filter(|v| !v.trim().is_empty()) {
            self.tunnel.version = version.trim().trim_start_matches('v').to_string();
        }
        if let Some(secs) = lookup("ARCHBOX_SETTLE_SECS") {
            match secs.trim().parse::<u64>() {
                Ok(secs) => self.tunnel.settle_interval = Duration::from_secs(secs),
                Err(_) => tracing::warn!(value = %secs, "ignoring invalid ARCHBOX_SETTLE_SECS"),
            }
        }
        if let Some(server) = lookup("ARCHBOX_SERVER").filter(|v| !v.trim().is_empty()) {
            self.defaults.server_url = server.trim().to_string();
        }
    }
}
