//! Stored connection credentials.
//!
//! Persists server, username, password and target to `~/.archbox/config.json`
//! with owner-only permissions. Older installs kept only the raw password in
//! `~/.archbox/credentials`; that file is read for migration.

use std::fmt;
use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::paths::Layout;

/// Everything needed to open the tunnel.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Relay server URL the tunnel client connects out to.
    #[serde(rename = "server")]
    pub server_url: String,
    pub username: String,
    pub password: String,
    /// Host behind the relay whose ports are forwarded.
    pub target: String,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("server_url", &self.server_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("target", &self.target)
            .finish()
    }
}

impl ConnectionConfig {
    /// Reject configs the tunnel cannot use. The password check is the one
    /// that matters in practice: an empty secret must fail before anything
    /// is written or spawned.
    pub fn validate(&self) -> Result<()> {
        if self.password.is_empty() {
            return Err(Error::Config("password cannot be empty".into()));
        }
        if self.username.is_empty() {
            return Err(Error::Config("username cannot be empty".into()));
        }
        if self.server_url.is_empty() {
            return Err(Error::Config("server URL cannot be empty".into()));
        }
        if self.target.is_empty() {
            return Err(Error::Config("target address cannot be empty".into()));
        }
        Ok(())
    }

    /// `username:password`, the tunnel's `--auth` value.
    pub fn auth_token(&self) -> String {
        format!("{}:{}", self.username, self.password)
    }

    fn trimmed(self) -> Self {
        Self {
            server_url: self.server_url.trim().to_string(),
            username: self.username.trim().to_string(),
            password: self.password.trim().to_string(),
            target: self.target.trim().to_string(),
        }
    }
}

/// Reads and writes [`ConnectionConfig`] under a [`Layout`].
#[derive(Debug, Clone)]
pub struct CredentialStore {
    layout: Layout,
}

impl CredentialStore {
    pub const fn new(layout: Layout) -> Self {
        Self { layout }
    }

    /// Load the stored config. Returns `None` if it is absent or unreadable.
    pub fn load(&self) -> Option<ConnectionConfig> {
        let path = self.layout.config_path();
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "no stored config");
                return None;
            }
        };
        match serde_json::from_str::<ConnectionConfig>(&content) {
            Ok(config) => Some(config.trimmed()),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable config");
                None
            }
        }
    }

    /// Save `config` atomically with owner-only permissions.
    ///
    /// The JSON is written to a temp file in the same directory and renamed
    /// over `config.json`, so a failed write never leaves a truncated file.
    pub fn save(&self, config: &ConnectionConfig) -> Result<()> {
        config.validate()?;

        let dir = self.layout.root();
        create_private_dir(dir)?;

        let json = serde_json::to_string_pretty(config)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }
        tmp.write_all(json.as_bytes())?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;

        let path = self.layout.config_path();
        tmp.persist(&path).map_err(|e| Error::Io(e.error))?;
        tracing::debug!(path = %path.display(), "saved connection config");
        Ok(())
    }

    /// Password from the legacy `credentials` file, if present and non-empty.
    pub fn load_legacy_password(&self) -> Option<String> {
        let content = std::fs::read_to_string(self.layout.legacy_credentials_path()).ok()?;
        let password = content.trim();
        (!password.is_empty()).then(|| password.to_string())
    }

    /// Delete the legacy `credentials` file once it has been migrated.
    pub fn remove_legacy(&self) -> Result<()> {
        match std::fs::remove_file(self.layout.legacy_credentials_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub const fn layout(&self) -> &Layout {
        &self.layout
    }
}

fn create_private_dir(dir: &std::path::Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(dir)?;
    }
    #[cfg(not(unix))]
    std::fs::create_dir_all(dir)?;
    Ok(())
}
