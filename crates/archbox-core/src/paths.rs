//! Per-user directory layout.
//!
//! ```text
//! ~/.archbox/
//!   config.json      connection settings (owner-only)
//!   credentials      legacy raw password file
//!   bin/chisel[.exe] installed tunnel binary
//! ```

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::platform::Os;
use crate::settings::Settings;

/// Resolved locations under the per-user directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    /// Use `root` as the per-user directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `ARCHBOX_HOME` if set, otherwise `~/.archbox`.
    pub fn resolve(settings: &Settings) -> Result<Self> {
        if let Some(root) = &settings.home_override {
            return Ok(Self::new(root));
        }
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("cannot determine home directory".into()))?;
        Ok(Self::new(home.join(".archbox")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.json")
    }

    pub fn legacy_credentials_path(&self) -> PathBuf {
        self.root.join("credentials")
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }

    /// Final install path of the tunnel binary.
    pub fn tunnel_binary_path(&self, os: Os, stem: &str) -> PathBuf {
        self.bin_dir().join(os.executable_name(stem))
    }
}
