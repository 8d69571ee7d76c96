//! Companion client (Moonlight) discovery, installation and launch.

use std::ffi::OsString;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::http::{self, Body, Fetch};
use crate::platform::Os;
use crate::settings::ClientSettings;

/// An installed client that can be launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientApp {
    Executable(PathBuf),
    /// macOS application bundle, started through `open -a`.
    Bundle(PathBuf),
}

impl ClientApp {
    pub fn path(&self) -> &Path {
        match self {
            Self::Executable(path) | Self::Bundle(path) => path,
        }
    }

    /// Start the client detached; the tool never waits for it.
    pub fn launch(&self) -> Result<()> {
        let mut cmd = match self {
            Self::Executable(path) => Command::new(path),
            Self::Bundle(path) => {
                let mut cmd = Command::new("open");
                cmd.arg("-a").arg(path);
                cmd
            }
        };
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        tracing::info!(path = %self.path().display(), "launching client");
        cmd.spawn().map_err(|source| Error::SubprocessStart {
            program: self.path().display().to_string(),
            source,
        })?;
        Ok(())
    }
}

/// Searches well-known install locations, then `PATH`.
#[derive(Debug, Clone)]
pub struct AppLocator {
    candidates: Vec<ClientApp>,
    command_name: String,
    search_path: Option<OsString>,
}

impl AppLocator {
    pub fn new(candidates: Vec<ClientApp>, command_name: impl Into<String>) -> Self {
        Self {
            candidates,
            command_name: command_name.into(),
            search_path: std::env::var_os("PATH"),
        }
    }

    /// Replace the `PATH` value used for lookup.
    #[must_use]
    pub fn with_search_path(mut self, search_path: Option<OsString>) -> Self {
        self.search_path = search_path;
        self
    }

    /// Locator with the standard install locations for `os`.
    pub fn for_platform(os: Os, settings: &ClientSettings) -> Self {
        let mut candidates = Vec::new();
        match os {
            Os::Windows => {
                for var in ["ProgramFiles", "LOCALAPPDATA"] {
                    if let Some(base) = std::env::var_os(var) {
                        candidates.push(ClientApp::Executable(
                            PathBuf::from(base)
                                .join("Moonlight Game Streaming")
                                .join("Moonlight.exe"),
                        ));
                    }
                }
            }
            Os::Darwin => {
                candidates.push(ClientApp::Bundle(PathBuf::from("/Applications/Moonlight.app")));
                if let Some(home) = dirs::home_dir() {
                    candidates.push(ClientApp::Bundle(home.join("Applications/Moonlight.app")));
                }
            }
            Os::Linux => {
                candidates.push(ClientApp::Executable(PathBuf::from(
                    "/var/lib/flatpak/exports/bin/com.moonlight_stream.Moonlight",
                )));
                if let Some(data) = dirs::data_dir() {
                    candidates.push(ClientApp::Executable(
                        data.join("flatpak/exports/bin/com.moonlight_stream.Moonlight"),
                    ));
                }
            }
        }
        Self::new(candidates, settings.command_name.clone())
    }

    /// First existing candidate, else the command found on the search path.
    pub fn locate(&self) -> Option<ClientApp> {
        if let Some(found) = self.candidates.iter().find(|c| c.path().exists()) {
            return Some(found.clone());
        }
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        which::which_in(&self.command_name, self.search_path.as_ref(), cwd)
            .ok()
            .map(ClientApp::Executable)
    }
}

/// Result of trying to install the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The installer was started without waiting. Setup finishes out of
    /// band and the tool has to be re-run afterwards.
    Launched(PathBuf),
    /// No scriptable installer on this platform; the user installs it.
    DeferredToUser,
    Failed(String),
}

/// Subset of the GitHub release payload.
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
}

/// First asset named `<prefix>...<suffix>`.
pub fn select_installer_asset<'r>(
    release: &'r Release,
    prefix: &str,
    suffix: &str,
) -> Option<&'r ReleaseAsset> {
    release
        .assets
        .iter()
        .find(|a| a.name.starts_with(prefix) && a.name.ends_with(suffix))
}

/// Manual install instructions for `os`.
pub fn manual_install_guidance(os: Os, settings: &ClientSettings) -> Vec<String> {
    let mut lines = match os {
        Os::Windows => Vec::new(),
        Os::Darwin => vec!["brew install --cask moonlight".to_string()],
        Os::Linux => vec![
            "Arch:    sudo pacman -S moonlight-qt".to_string(),
            "Ubuntu:  sudo apt install moonlight-qt".to_string(),
            "Flatpak: flatpak install flathub com.moonlight_stream.Moonlight".to_string(),
        ],
    };
    lines.push(format!("Or download from: {}", settings.homepage));
    lines
}

/// Downloads and starts the client installer where one can be scripted.
#[derive(Debug)]
pub struct AppInstaller<'a, F> {
    fetcher: &'a F,
    settings: &'a ClientSettings,
    os: Os,
    download_dir: PathBuf,
}

impl<'a, F: Fetch> AppInstaller<'a, F> {
    pub fn new(fetcher: &'a F, settings: &'a ClientSettings, os: Os) -> Self {
        Self {
            fetcher,
            settings,
            os,
            download_dir: std::env::temp_dir(),
        }
    }

    #[must_use]
    pub fn with_download_dir(mut self, dir: PathBuf) -> Self {
        self.download_dir = dir;
        self
    }

    /// Install the client. Only Windows has a silent download path; every
    /// other platform defers without touching the network.
    pub async fn install(&self) -> InstallOutcome {
        if self.os != Os::Windows {
            return InstallOutcome::DeferredToUser;
        }

        let installer = match self.download_installer().await {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(error = %e, "client installer download failed");
                return InstallOutcome::Failed(e.to_string());
            }
        };

        tracing::info!(path = %installer.display(), "starting client installer");
        match Command::new(&installer).spawn() {
            Ok(_) => InstallOutcome::Launched(installer),
            Err(e) => InstallOutcome::Failed(format!(
                "cannot start {}: {e}",
                installer.display()
            )),
        }
    }

    /// Resolve the installer from the latest release and save it to the
    /// download directory as `<prefix><suffix>`. The asset name from the
    /// release payload never becomes part of the local path.
    pub async fn download_installer(&self) -> Result<PathBuf> {
        let release: Release = http::get_json(self.fetcher, &self.settings.release_api_url).await?;
        let asset = select_installer_asset(
            &release,
            &self.settings.installer_prefix,
            &self.settings.installer_suffix,
        )
        .ok_or_else(|| {
            Error::Install(format!(
                "no {}*{} asset in the latest release",
                self.settings.installer_prefix, self.settings.installer_suffix
            ))
        })?;

        let dest = self.download_dir.join(format!(
            "{}{}",
            self.settings.installer_prefix, self.settings.installer_suffix
        ));
        tracing::info!(url = %asset.browser_download_url, dest = %dest.display(), "downloading client installer");

        let mut body = self.fetcher.fetch(&asset.browser_download_url).await?;
        let mut file = File::create(&dest)?;
        let result = async {
            while let Some(chunk) = body.chunk().await? {
                file.write_all(&chunk)?;
            }
            file.sync_all()?;
            Ok::<_, Error>(())
        }
        .await;
        if let Err(e) = result {
            let _ = std::fs::remove_file(&dest);
            return Err(e);
        }
        Ok(dest)
    }
}
