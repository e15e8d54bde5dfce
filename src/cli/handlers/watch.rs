use std::fs;
use std::time::Duration;

use crate::cli::commands::BuildArgs;
use crate::cli::handlers::{resolve_build_config, resolve_key, run_build};
use crate::cli::ui::{print_build_summary, print_error, print_info, print_warning};
use crate::config::SnapConfig;
use crate::core::select::PathSelector;
use crate::core::watch::Watcher;
use crate::error::{Result, ErrorContext};
use crate::server::spawn_server;

/// Handle `snapseal watch`: build once, then rebuild on every settled change
pub fn handle_watch(
    args: &BuildArgs,
    debounce_ms: Option<u64>,
    serve_port: Option<u16>,
    bind: Option<&str>,
    config: &SnapConfig,
) -> Result<()> {
    let build = resolve_build_config(args, config)?;
    build.validate()?;
    let key = resolve_key(&args.key, config)?;

    match run_build(&build, &key, config.ui.progress_bars) {
        Ok(outcome) => print_build_summary(&outcome),
        Err(err) if err.is_config() => return Err(err),
        Err(err) => print_error(&err),
    }

    let server = match serve_port {
        Some(port) => {
            let bind = bind.unwrap_or(&config.serve.bind);
            let handle = spawn_server(build.out.clone(), bind, port)?;
            print_info(&format!("Serving {} on http://{}", build.out.display(), handle.addr));
            Some(handle)
        }
        None => None,
    };

    let root = build.root.canonicalize()
        .with_io_context(|| format!("resolving root {}", build.root.display()))?;
    fs::create_dir_all(&build.out)
        .with_io_context(|| format!("creating output directory {}", build.out.display()))?;
    let selector = PathSelector::new(&root, &build.include, &build.exclude)?.exclude_path(&build.out);

    let watcher = Watcher::new(selector)
        .with_debounce(Duration::from_millis(debounce_ms.unwrap_or(config.watch.debounce_ms)))
        .with_poll_interval(Duration::from_millis(config.watch.poll_interval_ms));
    print_info(&format!("Watching {} for changes (Ctrl-C to stop)", root.display()));

    let mut server_reported = false;
    watcher.run(|| {
        if !server_reported && server.as_ref().is_some_and(|s| s.is_finished()) {
            print_warning("HTTP server has stopped; rebuilds continue without it");
            server_reported = true;
        }
        match run_build(&build, &key, false) {
            Ok(outcome) => {
                print_build_summary(&outcome);
                Ok(())
            }
            Err(err) => {
                print_error(&err);
                Err(err)
            }
        }
    })?;

    Ok(())
}
