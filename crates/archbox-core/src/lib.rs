//! archbox core library
//!
//! Provisioning and supervision pieces behind `archbox-connect`:
//! - Per-user settings, directory layout and stored credentials
//! - Tunnel binary download and atomic install
//! - Companion client discovery and installation
//! - Privilege elevation for the scanner exclusion (Windows only)
//! - Tunnel subprocess supervision

pub mod client_app;
pub mod credentials;
pub mod elevate;
pub mod error;
pub mod http;
pub mod paths;
pub mod platform;
pub mod ports;
pub mod prompt;
pub mod provision;
pub mod settings;
pub mod tracing_init;
pub mod tunnel;

pub use credentials::{ConnectionConfig, CredentialStore};
pub use error::{Error, Result};
pub use paths::Layout;
pub use platform::Platform;
pub use settings::Settings;
