use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use colored::control as colored_control;
use tracing_subscriber::EnvFilter;

use snapseal::cli::handlers::{self, VerifyOptions};
use snapseal::cli::ui::print_error;
use snapseal::cli::{Cli, Commands};
use snapseal::config::SnapConfig;
use snapseal::error::SnapError;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match SnapConfig::discover(cli.config.as_deref()) {
        Ok(config) => config,
        Err(error) => {
            print_error(&error);
            return ExitCode::FAILURE;
        }
    };

    let colored = !cli.no_color && config.ui.colored && std::env::var_os("NO_COLOR").is_none();
    colored_control::set_override(colored);

    if let Err(e) = init_logging(cli.verbose, &config.ui.log_level, colored) {
        eprintln!("Failed to initialize logging: {:#}", e);
    }

    match run_app(cli, &config) {
        Ok(code) => ExitCode::from(code),
        Err(error) => {
            print_error(&error);
            ExitCode::FAILURE
        }
    }
}

fn run_app(cli: Cli, config: &SnapConfig) -> std::result::Result<u8, SnapError> {
    match cli.command {
        Commands::Build(args) => handlers::handle_build(&args, config).map(|()| 0),
        Commands::Watch { build, debounce_ms, serve_port, bind } => {
            handlers::handle_watch(&build, debounce_ms, serve_port, bind.as_deref(), config).map(|()| 0)
        }
        Commands::Serve { out, port, bind } => {
            handlers::handle_serve(out.as_deref(), port, bind.as_deref(), config).map(|()| 0)
        }
        Commands::Verify { site, key, samples, seed, all } => {
            let options = VerifyOptions {
                site: &site,
                samples,
                seed,
                all,
            };
            handlers::handle_verify(&options, &key, config)
        }
        Commands::Status { site } => handlers::handle_status(&site).map(|()| 0),
    }
}

/// Logs go to stderr; `RUST_LOG` wins over `--verbose`, which wins over the config file
fn init_logging(verbose: bool, configured_level: &str, ansi: bool) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let level = if verbose { "debug" } else { configured_level };
            EnvFilter::try_new(level).with_context(|| format!("invalid log level '{}'", level))?
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(ansi)
        .with_target(false)
        .try_init()
        .map_err(anyhow::Error::msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["snapseal", "status", "--site", "out"]).unwrap();
        assert!(matches!(cli.command, Commands::Status { .. }));
    }
}
