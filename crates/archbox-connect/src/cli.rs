use clap::Parser;

/// Remote desktop via Moonlight over a chisel tunnel.
///
/// With no flags: load (or interactively create) the connection settings,
/// install the tunnel binary if needed, connect, and launch Moonlight.
#[derive(Debug, Parser)]
#[command(name = "archbox-connect", version, about)]
pub struct Cli {
    /// Re-run interactive setup, save it, and exit
    #[arg(long)]
    pub reconfigure: bool,

    /// Do not look for, install, or launch Moonlight
    #[arg(long)]
    pub no_client: bool,

    /// Print debug diagnostics to stderr
    #[arg(short, long, env = "ARCHBOX_VERBOSE")]
    pub verbose: bool,

    /// Emit diagnostics as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

impl Cli {
    /// Default `RUST_LOG` filter for these flags.
    pub const fn log_filter(&self) -> &'static str {
        if self.verbose {
            "archbox_connect=debug,archbox_core=debug"
        } else {
            "archbox_connect=warn,archbox_core=warn"
        }
    }
}
