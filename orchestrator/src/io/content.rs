//! Protocol content loaded from `.claude/content/` with `{placeholder}` substitution.

use std::fs;

use anyhow::{Context, Result};
use tracing::warn;

use super::init::OrchestratorPaths;

/// Content of `relative`, or a marker comment when the file is absent.
pub fn load_content(paths: &OrchestratorPaths, relative: &str) -> Result<String> {
    let path = paths.content_path(relative);
    if !path.is_file() {
        warn!(path = %path.display(), "protocol content missing");
        return Ok(format!("<!-- Protocol content not found: {relative} -->"));
    }
    fs::read_to_string(&path).with_context(|| format!("read content {}", path.display()))
}

/// Replace each `{key}` with its value. Unknown placeholders are left in place.
pub fn substitute(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in values {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}
