pub mod cli;
pub mod session;
pub mod setup;
pub mod shutdown;
pub mod ui;
