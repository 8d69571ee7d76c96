//! Tunnel binary provisioning.
//!
//! The pinned release is a single gzip-compressed executable. It is
//! decompressed while streaming into `<binary>.dat` next to the final path
//! and then renamed into place. Real-time scanners (Windows Defender in
//! particular) watch executable extensions and can quarantine or truncate a
//! file while it is still being written; the `.dat` name keeps the write out
//! of their way and the rename publishes the finished file in one step.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::GzDecoder;

use crate::error::{Error, Result};
use crate::http::{Body, Fetch};
use crate::platform::Platform;
use crate::settings::TunnelSettings;

/// Extension used for the in-progress download.
const STAGING_EXTENSION: &str = "dat";

/// A tunnel binary that passed the validity check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledBinary {
    pub path: PathBuf,
    pub size: u64,
}

/// Release archive URL for `version` on `platform`.
pub fn download_url(base_url: &str, version: &str, platform: Platform) -> String {
    format!(
        "{}/v{version}/chisel_{version}_{}_{}.gz",
        base_url.trim_end_matches('/'),
        platform.os,
        platform.arch
    )
}

/// `<install_path>.dat`.
pub fn staging_path(install_path: &Path) -> PathBuf {
    let mut name = install_path.as_os_str().to_owned();
    name.push(".");
    name.push(STAGING_EXTENSION);
    PathBuf::from(name)
}

/// Downloads and installs the tunnel binary at a fixed path.
#[derive(Debug)]
pub struct BinaryProvisioner<'a, F> {
    fetcher: &'a F,
    install_path: PathBuf,
    release_base_url: String,
    min_size: u64,
}

impl<'a, F: Fetch> BinaryProvisioner<'a, F> {
    pub fn new(fetcher: &'a F, install_path: PathBuf, settings: &TunnelSettings) -> Self {
        Self {
            fetcher,
            install_path,
            release_base_url: settings.release_base_url.clone(),
            min_size: settings.min_binary_size,
        }
    }

    pub fn install_path(&self) -> &Path {
        &self.install_path
    }

    /// The installed binary, if it exists and is larger than the minimum
    /// size. A zero-byte or truncated file left by an interrupted or
    /// quarantined install does not count.
    pub fn installed(&self) -> Option<InstalledBinary> {
        let meta = fs::metadata(&self.install_path).ok()?;
        (meta.is_file() && meta.len() > self.min_size).then(|| InstalledBinary {
            path: self.install_path.clone(),
            size: meta.len(),
        })
    }

    /// Make sure a valid binary is installed, downloading it if needed.
    ///
    /// A valid existing binary short-circuits without any network access.
    /// On failure neither the staging file nor a partial binary is left
    /// behind.
    pub async fn ensure_installed(
        &self,
        version: &str,
        platform: Platform,
    ) -> Result<InstalledBinary> {
        if let Some(binary) = self.installed() {
            tracing::debug!(path = %binary.path.display(), size = binary.size, "tunnel binary present");
            return Ok(binary);
        }

        remove_if_exists(&self.install_path)?;
        let staging = staging_path(&self.install_path);
        remove_if_exists(&staging)?;
        if let Some(dir) = self.install_path.parent() {
            fs::create_dir_all(dir).map_err(|e| {
                Error::Install(format!("cannot create {}: {e}", dir.display()))
            })?;
        }

        let url = download_url(&self.release_base_url, version, platform);
        tracing::info!(%url, path = %self.install_path.display(), "installing tunnel binary");

        if let Err(e) = self.download_to(&url, &staging).await {
            let _ = fs::remove_file(&staging);
            return Err(e);
        }

        let size = fs::metadata(&staging)?.len();
        if size <= self.min_size {
            let _ = fs::remove_file(&staging);
            return Err(Error::Install(format!(
                "downloaded binary is only {size} bytes (expected more than {})",
                self.min_size
            )));
        }

        if let Err(e) = fs::rename(&staging, &self.install_path) {
            let _ = fs::remove_file(&staging);
            return Err(Error::Install(format!(
                "cannot move {} into place: {e}",
                staging.display()
            )));
        }
        set_executable(&self.install_path)?;

        tracing::info!(path = %self.install_path.display(), size, "tunnel binary installed");
        Ok(InstalledBinary {
            path: self.install_path.clone(),
            size,
        })
    }

    /// Stream `url` through the gzip decoder into `staging`.
    async fn download_to(&self, url: &str, staging: &Path) -> Result<()> {
        let mut body = self.fetcher.fetch(url).await?;
        let file = File::create(staging).map_err(|e| {
            Error::Install(format!("cannot create {}: {e}", staging.display()))
        })?;

        let mut decoder = GzDecoder::new(file);
        while let Some(chunk) = body.chunk().await? {
            decoder.write_all(&chunk).map_err(Error::Extraction)?;
        }
        let file = decoder.finish().map_err(Error::Extraction)?;
        file.sync_all()?;
        Ok(())
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "removed stale file");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Install(format!(
            "cannot remove {}: {e}",
            path.display()
        ))),
    }
}

fn set_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))
            .map_err(|e| Error::Install(format!("cannot chmod {}: {e}", path.display())))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::*;
    use crate::http::fake::FakeFetcher;
    use crate::platform::{Arch, Os};

    const BASE: &str = "https://github.com/jpillora/chisel/releases/download";
    const LINUX: Platform = Platform {
        os: Os::Linux,
        arch: Arch::Amd64,
    };

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::fast());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    /// Pseudo-random bytes so the archive does not compress to nothing.
    fn fake_binary(len: usize) -> Vec<u8> {
        let mut state: u32 = 0x1234_5678;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state.to_le_bytes()[0]
            })
            .collect()
    }

    fn url() -> String {
        download_url(BASE, "1.10.1", LINUX)
    }

    fn setup(fetcher: &FakeFetcher) -> (tempfile::TempDir, BinaryProvisioner<'_, FakeFetcher>) {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bin").join("chisel");
        let provisioner = BinaryProvisioner::new(fetcher, path, &TunnelSettings::default());
        (dir, provisioner)
    }

    #[test]
    fn url_for_linux_amd64() {
        assert_eq!(
            url(),
            "https://github.com/jpillora/chisel/releases/download/v1.10.1/chisel_1.10.1_linux_amd64.gz"
        );
    }

    #[test]
    fn url_for_windows_arm64() {
        let p = Platform {
            os: Os::Windows,
            arch: Arch::Arm64,
        };
        assert_eq!(
            download_url(&format!("{BASE}/"), "1.10.1", p),
            "https://github.com/jpillora/chisel/releases/download/v1.10.1/chisel_1.10.1_windows_arm64.gz"
        );
    }

    #[test]
    fn staging_path_appends_dat() {
        assert_eq!(
            staging_path(Path::new("/x/bin/chisel.exe")),
            Path::new("/x/bin/chisel.exe.dat")
        );
    }

    #[tokio::test]
    async fn fresh_install_downloads_once() {
        let payload = fake_binary(200 * 1024);
        let fetcher = FakeFetcher::default().serve(&url(), gzip(&payload));
        let (_dir, provisioner) = setup(&fetcher);

        let installed = provisioner.ensure_installed("1.10.1", LINUX).await.unwrap();
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(installed.size, payload.len() as u64);
        assert_eq!(fs::read(&installed.path).unwrap(), payload);
        assert!(!staging_path(&installed.path).exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn installed_binary_is_executable() {
        use std::os::unix::fs::PermissionsExt;
        let fetcher = FakeFetcher::default().serve(&url(), gzip(&fake_binary(150 * 1024)));
        let (_dir, provisioner) = setup(&fetcher);
        let installed = provisioner.ensure_installed("1.10.1", LINUX).await.unwrap();
        let mode = fs::metadata(installed.path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[tokio::test]
    async fn valid_binary_skips_network() {
        let fetcher = FakeFetcher::default();
        let (_dir, provisioner) = setup(&fetcher);
        fs::create_dir_all(provisioner.install_path().parent().unwrap()).unwrap();
        fs::write(provisioner.install_path(), vec![1u8; 101 * 1024]).unwrap();

        let installed = provisioner.ensure_installed("1.10.1", LINUX).await.unwrap();
        assert_eq!(fetcher.calls(), 0);
        assert_eq!(installed.size, 101 * 1024);
    }

    #[tokio::test]
    async fn truncated_binary_is_replaced() {
        let payload = fake_binary(120 * 1024);
        let fetcher = FakeFetcher::default().serve(&url(), gzip(&payload));
        let (_dir, provisioner) = setup(&fetcher);
        fs::create_dir_all(provisioner.install_path().parent().unwrap()).unwrap();
        fs::write(provisioner.install_path(), b"").unwrap();
        assert!(provisioner.installed().is_none());

        let installed = provisioner.ensure_installed("1.10.1", LINUX).await.unwrap();
        assert_eq!(fetcher.calls(), 1);
        assert!(installed.size > TunnelSettings::default().min_binary_size);
        assert_eq!(fs::read(&installed.path).unwrap(), payload);
    }

    #[tokio::test]
    async fn exactly_threshold_size_is_invalid() {
        let fetcher = FakeFetcher::default();
        let (_dir, provisioner) = setup(&fetcher);
        fs::create_dir_all(provisioner.install_path().parent().unwrap()).unwrap();
        fs::write(provisioner.install_path(), vec![0u8; 100 * 1024]).unwrap();
        assert!(provisioner.installed().is_none());
    }

    #[tokio::test]
    async fn interrupted_download_leaves_nothing() {
        let archive = gzip(&fake_binary(300 * 1024));
        let half = archive.len() / 2;
        let fetcher = FakeFetcher::default().serve_truncated(&url(), archive, half);
        let (_dir, provisioner) = setup(&fetcher);

        let err = provisioner.ensure_installed("1.10.1", LINUX).await.unwrap_err();
        assert!(err.is_network(), "unexpected error: {err}");
        assert!(!provisioner.install_path().exists());
        assert!(!staging_path(provisioner.install_path()).exists());
    }

    #[tokio::test]
    async fn corrupt_archive_is_extraction_error() {
        let fetcher = FakeFetcher::default().serve(&url(), vec![b'x'; 4096]);
        let (_dir, provisioner) = setup(&fetcher);

        let err = provisioner.ensure_installed("1.10.1", LINUX).await.unwrap_err();
        assert!(matches!(err, Error::Extraction(_)), "unexpected error: {err}");
        assert!(!provisioner.install_path().exists());
        assert!(!staging_path(provisioner.install_path()).exists());
    }

    #[tokio::test]
    async fn http_error_removes_corrupt_prior_binary() {
        let fetcher = FakeFetcher::default().status(&url(), 404);
        let (_dir, provisioner) = setup(&fetcher);
        fs::create_dir_all(provisioner.install_path().parent().unwrap()).unwrap();
        fs::write(provisioner.install_path(), b"quarantined").unwrap();

        let err = provisioner.ensure_installed("1.10.1", LINUX).await.unwrap_err();
        assert!(matches!(err, Error::HttpStatus { status: 404, .. }));
        assert!(!provisioner.install_path().exists());
    }

    #[tokio::test]
    async fn undersized_download_is_rejected() {
        let fetcher = FakeFetcher::default().serve(&url(), gzip(b"#!/bin/sh\necho tiny\n"));
        let (_dir, provisioner) = setup(&fetcher);

        let err = provisioner.ensure_installed("1.10.1", LINUX).await.unwrap_err();
        assert!(matches!(err, Error::Install(_)));
        assert!(!provisioner.install_path().exists());
        assert!(!staging_path(provisioner.install_path()).exists());
    }

    #[tokio::test]
    async fn stale_staging_file_is_replaced() {
        let payload = fake_binary(110 * 1024);
        let fetcher = FakeFetcher::default().serve(&url(), gzip(&payload));
        let (_dir, provisioner) = setup(&fetcher);
        let staging = staging_path(provisioner.install_path());
        fs::create_dir_all(staging.parent().unwrap()).unwrap();
        fs::write(&staging, b"left over from a crash").unwrap();

        let installed = provisioner.ensure_installed("1.10.1", LINUX).await.unwrap();
        assert_eq!(fs::read(installed.path).unwrap(), payload);
        assert!(!staging.exists());
    }
}
