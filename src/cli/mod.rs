pub mod commands;
pub mod handlers;
pub mod ui;

pub use commands::{BuildArgs, Cli, Commands, KeyArgs};
pub use ui::{print_error, print_info, print_success, print_warning};
