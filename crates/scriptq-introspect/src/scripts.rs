//! Script discovery and per-file inspection.

use std::path::Path;

use scriptq_core::config::ScriptFilter;
use tracing::{debug, warn};

use crate::{
    error::{IntrospectError, Result},
    extract::{try_extract, Introspection},
};

/// List script file names in `folder`, sorted by name.
///
/// A file qualifies when its name ends in `.{extension}`. With
/// [`ScriptFilter::Cli`] it must also declare at least one parameter.
/// A missing or unreadable folder yields an empty list.
pub fn list_scripts(folder: &Path, extension: &str, filter: ScriptFilter) -> Vec<String> {
    let entries = match std::fs::read_dir(folder) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(folder = %folder.display(), error = %e, "cannot list scripts folder");
            return Vec::new();
        }
    };

    let suffix = format!(".{}", extension.trim_start_matches('.'));
    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.ends_with(&suffix))
        .collect();
    names.sort();

    if filter == ScriptFilter::Cli {
        names.retain(|name| !inspect(&folder.join(name)).parameters.is_empty());
    }
    names
}

/// Inspect the script at `path`.
///
/// Never fails: unreadable or unanalyzable scripts report no parameters and
/// no interface.
pub fn inspect(path: &Path) -> Introspection {
    match try_inspect(path) {
        Ok(found) => found,
        Err(e @ IntrospectError::Read { .. }) => {
            warn!(error = %e, "script unreadable");
            Introspection::default()
        }
        Err(e) => {
            debug!(path = %path.display(), error = %e, "script not analyzable");
            Introspection::default()
        }
    }
}

/// Like [`inspect`] but reports why the script could not be analyzed.
pub fn try_inspect(path: &Path) -> Result<Introspection> {
    let source = std::fs::read_to_string(path).map_err(|source| IntrospectError::Read {
        path: path.display().to_string(),
        source,
    })?;
    try_extract(&source)
}
