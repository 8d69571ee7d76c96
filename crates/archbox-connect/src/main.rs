use anyhow::Result;
use clap::Parser;

use archbox_connect::cli::Cli;
use archbox_connect::session;
use archbox_core::Settings;
use archbox_core::tracing_init::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_filter(), cli.log_json);

    let settings = Settings::load();
    session::run(&cli, &settings).await
}
