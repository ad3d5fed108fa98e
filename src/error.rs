use std::path::PathBuf;

use thiserror::Error;

/// Failures that escape [`crate::resolver::PopupResolver`].
///
/// Tree problems never show up here: a malformed tree is treated as a screen
/// without candidates.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("screenshot {} could not be read or decoded", describe(.path))]
    Screenshot {
        path: Option<PathBuf>,
        #[source]
        source: image::ImageError,
    },

    #[error("template library unavailable")]
    TemplateLibrary(#[source] anyhow::Error),
}

fn describe(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => p.display().to_string(),
        None => "<in-memory>".to_string(),
    }
}
