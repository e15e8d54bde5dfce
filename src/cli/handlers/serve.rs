use std::path::Path;

use crate::cli::ui::{print_info, print_warning};
use crate::config::SnapConfig;
use crate::core::snapshot::CURRENT_LINK;
use crate::error::{Result, SnapError};
use crate::server;

/// Handle `snapseal serve`
pub fn handle_serve(out: Option<&Path>, port: Option<u16>, bind: Option<&str>, config: &SnapConfig) -> Result<()> {
    let out = out
        .map(Path::to_path_buf)
        .or_else(|| config.build.out.clone())
        .ok_or_else(|| SnapError::config("no output directory given (--out or [build] out)"))?;
    let bind = bind.unwrap_or(&config.serve.bind);
    let port = port.unwrap_or(config.serve.port);

    if !out.join(CURRENT_LINK).is_symlink() {
        print_warning(&format!("Nothing published in {} yet; requests fail until a build completes", out.display()));
    }
    print_info(&format!("Serving {} on http://{}:{}", out.display(), bind, port));
    server::serve(&out, bind, port)
}
