#![allow(clippy::unwrap_used, clippy::expect_used)] // Integration tests use unwrap for brevity

//! Install-path observations while a download is in flight.
//!
//! The body implementation below plays the part of a concurrent reader: every
//! time the provisioner pulls a chunk it checks the final install path, which
//! must never hold a partially written binary.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use archbox_core::Error;
use archbox_core::http::{Body, Fetch};
use archbox_core::platform::{Arch, Os, Platform};
use archbox_core::provision::{BinaryProvisioner, staging_path};
use archbox_core::settings::TunnelSettings;
use flate2::Compression;
use flate2::write::GzEncoder;

const LINUX: Platform = Platform {
    os: Os::Linux,
    arch: Arch::Amd64,
};

/// Sizes of the install path seen during the download (`None` = absent).
type Observations = Mutex<Vec<Option<u64>>>;

struct WatchingFetcher<'a> {
    archive: Vec<u8>,
    /// Drop the connection after this many chunks.
    fail_after_chunks: Option<usize>,
    install_path: PathBuf,
    seen: &'a Observations,
    calls: AtomicUsize,
}

struct WatchingBody<'a> {
    chunks: std::vec::IntoIter<Vec<u8>>,
    remaining_before_failure: Option<usize>,
    install_path: PathBuf,
    seen: &'a Observations,
}

impl Body for WatchingBody<'_> {
    async fn chunk(&mut self) -> archbox_core::Result<Option<Vec<u8>>> {
        let size = std::fs::metadata(&self.install_path).ok().map(|m| m.len());
        self.seen.lock().unwrap().push(size);

        if let Some(remaining) = self.remaining_before_failure.as_mut() {
            if *remaining == 0 {
                return Err(Error::Network {
                    url: "https://dl.test".into(),
                    reason: "simulated crash".into(),
                });
            }
            *remaining -= 1;
        }
        Ok(self.chunks.next())
    }
}

impl<'a> Fetch for WatchingFetcher<'a> {
    type Body = WatchingBody<'a>;

    async fn fetch(&self, _url: &str) -> archbox_core::Result<WatchingBody<'a>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(WatchingBody {
            chunks: self
                .archive
                .chunks(8 * 1024)
                .map(<[u8]>::to_vec)
                .collect::<Vec<_>>()
                .into_iter(),
            remaining_before_failure: self.fail_after_chunks,
            install_path: self.install_path.clone(),
            seen: self.seen,
        })
    }
}

fn archive_of(len: usize) -> (Vec<u8>, Vec<u8>) {
    let binary: Vec<u8> = (0..len).map(|i| (i * 31 % 251) as u8).collect();
    let mut enc = GzEncoder::new(Vec::new(), Compression::none());
    enc.write_all(&binary).unwrap();
    (binary, enc.finish().unwrap())
}

fn install_path(dir: &Path) -> PathBuf {
    dir.join("bin").join("chisel")
}

#[tokio::test]
async fn crash_mid_download_never_exposes_partial_binary() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = install_path(dir.path());
    let seen = Observations::default();
    let (_, archive) = archive_of(400 * 1024);
    let fetcher = WatchingFetcher {
        archive,
        fail_after_chunks: Some(20),
        install_path: path.clone(),
        seen: &seen,
        calls: AtomicUsize::new(0),
    };
    let provisioner = BinaryProvisioner::new(&fetcher, path.clone(), &TunnelSettings::default());

    let err = provisioner.ensure_installed("1.10.1", LINUX).await.unwrap_err();
    assert!(err.is_network());
    assert!(!path.exists());
    assert!(!staging_path(&path).exists());

    let seen = seen.lock().unwrap();
    assert!(seen.len() > 1);
    assert!(seen.iter().all(Option::is_none), "install path observed: {seen:?}");
}

#[tokio::test]
async fn install_path_is_absent_until_complete() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = install_path(dir.path());
    let seen = Observations::default();
    let (binary, archive) = archive_of(300 * 1024);
    let fetcher = WatchingFetcher {
        archive,
        fail_after_chunks: None,
        install_path: path.clone(),
        seen: &seen,
        calls: AtomicUsize::new(0),
    };
    let provisioner = BinaryProvisioner::new(&fetcher, path.clone(), &TunnelSettings::default());

    let installed = provisioner.ensure_installed("1.10.1", LINUX).await.unwrap();
    assert_eq!(installed.size, binary.len() as u64);
    assert_eq!(std::fs::read(&path).unwrap(), binary);
    assert!(seen.lock().unwrap().iter().all(Option::is_none));

    // Second run takes the fast path.
    provisioner.ensure_installed("1.10.1", LINUX).await.unwrap();
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
}
