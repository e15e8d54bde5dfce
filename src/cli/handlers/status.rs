use std::path::Path;

use crate::cli::ui::print_status;
use crate::core::snapshot::{read_status, resolve_site};
use crate::error::Result;

/// Handle `snapseal status`
pub fn handle_status(site: &Path) -> Result<()> {
    let dir = resolve_site(site)?;
    let status = read_status(&dir)?;
    let id = dir.file_name().map(|n| n.to_string_lossy().into_owned());
    print_status(&status, id.as_deref());
    Ok(())
}
