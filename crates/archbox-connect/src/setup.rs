//! Connection setup: recall stored credentials or ask for them.

use anyhow::{Context, Result, bail};

use archbox_core::settings::Settings;
use archbox_core::{ConnectionConfig, CredentialStore, prompt};

use crate::ui;

/// Source of answers for the setup questions.
pub trait Prompter {
    fn text(&mut self, label: &str, default: &str) -> Result<String>;
    fn secret(&mut self, label: &str) -> Result<String>;
}

/// Prompts on the controlling terminal (or plain stdin when piped).
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn text(&mut self, label: &str, default: &str) -> Result<String> {
        Ok(prompt::prompt_text(label, default)?)
    }

    fn secret(&mut self, label: &str) -> Result<String> {
        Ok(prompt::prompt_secret(label)?)
    }
}

/// Ask for every connection value and save the result.
///
/// Current values (or the built-in defaults) are offered for everything but
/// the password, which is always asked for. An empty password fails before
/// anything is written.
pub fn run_setup(
    store: &CredentialStore,
    settings: &Settings,
    prompter: &mut impl Prompter,
    current: Option<&ConnectionConfig>,
) -> Result<ConnectionConfig> {
    let defaults = &settings.defaults;
    let server_url = prompter.text(
        "Server URL",
        current.map_or(&defaults.server_url, |c| &c.server_url),
    )?;
    let username = prompter.text(
        "Username",
        current.map_or(&defaults.username, |c| &c.username),
    )?;
    let target = prompter.text(
        "Target address",
        current.map_or(&defaults.target, |c| &c.target),
    )?;
    let password = prompter.secret("Enter password")?;
    if password.is_empty() {
        bail!("password cannot be empty");
    }

    let config = ConnectionConfig {
        server_url,
        username,
        password,
        target,
    };
    store
        .save(&config)
        .context("failed to save connection settings")?;
    ui::step(&format!(
        "Settings saved to {}",
        store.layout().config_path().display()
    ));
    Ok(config)
}

/// Stored config if usable, else a migrated legacy password, else setup.
pub fn load_or_setup(
    store: &CredentialStore,
    settings: &Settings,
    prompter: &mut impl Prompter,
) -> Result<ConnectionConfig> {
    if let Some(config) = store.load() {
        match config.validate() {
            Ok(()) => {
                ui::step("Using saved credentials.");
                return Ok(config);
            }
            Err(e) => tracing::warn!(error = %e, "stored config is incomplete, re-running setup"),
        }
    }

    if let Some(password) = store.load_legacy_password() {
        let defaults = &settings.defaults;
        let config = ConnectionConfig {
            server_url: defaults.server_url.clone(),
            username: defaults.username.clone(),
            password,
            target: defaults.target.clone(),
        };
        store
            .save(&config)
            .context("failed to migrate legacy credentials")?;
        if let Err(e) = store.remove_legacy() {
            tracing::warn!(error = %e, "could not remove legacy credentials file");
        }
        tracing::info!("migrated legacy credentials to config.json");
        ui::step("Using saved credentials.");
        return Ok(config);
    }

    run_setup(store, settings, prompter, None)
}
