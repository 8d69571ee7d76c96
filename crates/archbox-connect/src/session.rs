//! The default run: credentials, provisioning, client, tunnel.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use archbox_core::client_app::{
    AppInstaller, AppLocator, ClientApp, InstallOutcome, manual_install_guidance,
};
use archbox_core::elevate::{self, ElevationRequester};
use archbox_core::http::{Fetch, HttpFetcher};
use archbox_core::platform::Os;
use archbox_core::ports::{PortMapping, build_mappings};
use archbox_core::provision::{BinaryProvisioner, InstalledBinary};
use archbox_core::settings::{ClientSettings, Settings, TunnelSettings};
use archbox_core::tunnel::{TunnelOutcome, TunnelSupervisor};
use archbox_core::{ConnectionConfig, CredentialStore, Error, Layout, Platform};

use crate::cli::Cli;
use crate::setup::{self, TerminalPrompter};
use crate::{shutdown, ui};

pub async fn run(cli: &Cli, settings: &Settings) -> Result<()> {
    let layout = Layout::resolve(settings)?;
    let store = CredentialStore::new(layout.clone());
    let mut prompter = TerminalPrompter;

    ui::header();

    if cli.reconfigure {
        let current = store.load();
        setup::run_setup(&store, settings, &mut prompter, current.as_ref())?;
        return Ok(());
    }

    let config = setup::load_or_setup(&store, settings, &mut prompter)?;

    let platform = Platform::current();
    let fetcher = HttpFetcher::new()?;
    let binary = provision_tunnel(
        &layout,
        &settings.tunnel,
        platform,
        &fetcher,
        elevate::for_current_platform(),
    )
    .await?;

    let client = if cli.no_client {
        ClientStatus::Skipped
    } else {
        let locator = AppLocator::for_platform(platform.os, &settings.client);
        let installer = AppInstaller::new(&fetcher, &settings.client, platform.os);
        ensure_client(&locator, &installer, platform.os, &settings.client).await
    };

    let mappings = build_mappings(&config.target, &settings.tunnel.ports);
    let supervisor = TunnelSupervisor::new(&binary.path, settings.tunnel.settle_interval);
    let shutdown = shutdown::listen().context("failed to install signal handlers")?;

    let outcome = connect(
        &supervisor,
        &config,
        &mappings,
        &settings.client.display_name,
        client.launchable().map(|app| app as &dyn Launcher),
        &shutdown,
    )
    .await?;
    report(&outcome);
    Ok(())
}

/// Install the tunnel binary if the current copy is missing or invalid.
///
/// Before a (re)install the archbox directory is offered to the scanner
/// exclusion list. That step is best effort: a declined prompt or missing
/// elevation is logged and provisioning continues.
pub async fn provision_tunnel<F: Fetch>(
    layout: &Layout,
    tunnel: &TunnelSettings,
    platform: Platform,
    fetcher: &F,
    elevation: Arc<dyn ElevationRequester>,
) -> Result<InstalledBinary> {
    let install_path = layout.tunnel_binary_path(platform.os, &tunnel.binary_stem);
    let provisioner = BinaryProvisioner::new(fetcher, install_path, tunnel);

    if provisioner.installed().is_none() {
        request_scanner_exclusion(elevation, layout.root()).await;
        ui::step(&format!("Downloading {} v{}...", tunnel.binary_stem, tunnel.version));
    }

    let binary = provisioner
        .ensure_installed(&tunnel.version, platform)
        .await
        .context("failed to install the tunnel binary")?;
    info!(path = %binary.path.display(), size = binary.size, "tunnel binary ready");
    Ok(binary)
}

async fn request_scanner_exclusion(elevation: Arc<dyn ElevationRequester>, dir: &Path) {
    if !elevation.is_available() {
        return;
    }
    ui::step("Requesting a security scanner exclusion (confirm the prompt)...");

    let dir = dir.to_path_buf();
    let result = tokio::task::spawn_blocking(move || {
        elevate::register_scanner_exclusion(elevation.as_ref(), &dir)
    })
    .await;

    match result {
        Ok(Ok(())) => info!("scanner exclusion registered"),
        Ok(Err(Error::ElevationUnavailable)) => {}
        Ok(Err(e)) => {
            warn!(error = %e, "scanner exclusion failed, continuing without it");
            ui::step("Could not add the scanner exclusion, continuing.");
        }
        Err(e) => warn!(error = %e, "scanner exclusion task failed"),
    }
}

/// What this run can do about the companion client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientStatus {
    /// Installed and launchable once the tunnel is up.
    Ready(ClientApp),
    /// An installer was started; the client is usable on the next run.
    InstallerStarted(PathBuf),
    /// The user has to install it. `reason` is set when an automatic
    /// install was attempted and failed.
    ManualInstall {
        guidance: Vec<String>,
        reason: Option<String>,
    },
    /// `--no-client`.
    Skipped,
}

impl ClientStatus {
    /// The client to launch this run. Only a located client qualifies.
    pub const fn launchable(&self) -> Option<&ClientApp> {
        match self {
            Self::Ready(app) => Some(app),
            _ => None,
        }
    }
}

/// Installs the client when it cannot be located.
pub trait InstallClient {
    fn install(&self) -> impl Future<Output = InstallOutcome>;
}

impl<F: Fetch> InstallClient for AppInstaller<'_, F> {
    fn install(&self) -> impl Future<Output = InstallOutcome> {
        AppInstaller::install(self)
    }
}

/// Locate the client, or try to get it installed. The tunnel comes up
/// whatever the result.
pub async fn ensure_client(
    locator: &AppLocator,
    installer: &impl InstallClient,
    os: Os,
    settings: &ClientSettings,
) -> ClientStatus {
    if let Some(app) = locator.locate() {
        info!(path = %app.path().display(), "client found");
        return ClientStatus::Ready(app);
    }

    ui::step(&format!("{} not found.", settings.display_name));
    let status = match installer.install().await {
        InstallOutcome::Launched(installer) => {
            info!(path = %installer.display(), "client installer started");
            ui::step(&format!(
                "Started the {} installer. Finish it, then run archbox-connect again.",
                settings.display_name
            ));
            ClientStatus::InstallerStarted(installer)
        }
        InstallOutcome::DeferredToUser => {
            ui::step(&format!("Install {} with:", settings.display_name));
            ClientStatus::ManualInstall {
                guidance: manual_install_guidance(os, settings),
                reason: None,
            }
        }
        InstallOutcome::Failed(reason) => {
            warn!(%reason, "client install failed");
            ui::step(&format!(
                "Could not install {} automatically:",
                settings.display_name
            ));
            ClientStatus::ManualInstall {
                guidance: manual_install_guidance(os, settings),
                reason: Some(reason),
            }
        }
    };
    if let ClientStatus::ManualInstall { guidance, .. } = &status {
        ui::guidance(guidance);
    }
    status
}

/// Something started once the tunnel is up.
pub trait Launcher {
    fn launch(&self) -> archbox_core::Result<()>;
}

impl Launcher for ClientApp {
    fn launch(&self) -> archbox_core::Result<()> {
        Self::launch(self)
    }
}

/// Run the tunnel until shutdown or exit. `client` is launched from the
/// ready callback, so never before the settle interval has passed.
pub async fn connect(
    supervisor: &TunnelSupervisor,
    config: &ConnectionConfig,
    mappings: &[PortMapping],
    client_name: &str,
    client: Option<&dyn Launcher>,
    shutdown: &CancellationToken,
) -> Result<TunnelOutcome> {
    ui::step(&format!("Connecting to {}...", config.server_url));

    let outcome = supervisor
        .run(config, mappings, shutdown, |_| {
            ui::tunnel_up(client_name);
            if let Some(client) = client {
                if let Err(e) = client.launch() {
                    warn!(error = %e, "client launch failed");
                    ui::step(&format!("Could not start {client_name}; open it manually."));
                }
            }
        })
        .await
        .context("failed to start the tunnel")?;
    info!(?outcome, "tunnel finished");
    Ok(outcome)
}

fn report(outcome: &TunnelOutcome) {
    match outcome {
        TunnelOutcome::Interrupted => ui::step("Disconnecting... done."),
        TunnelOutcome::Disconnected => ui::step("Tunnel closed by the server."),
        TunnelOutcome::Lost(reason) => ui::step(&format!("Tunnel lost: {reason}")),
    }
}
