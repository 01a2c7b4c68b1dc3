//! Path conventions shared by the preprocessor and the compiler adapter.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Extension of authored template files.
pub const TEMPLATE_EXTENSION: &str = "cmx";

/// Extension of generated files consumed by the compiler.
pub const GENERATED_EXTENSION: &str = "cm";

#[must_use]
pub fn is_template(path: &Path) -> bool {
    path.extension() == Some(OsStr::new(TEMPLATE_EXTENSION))
}

#[must_use]
pub fn is_generated(path: &Path) -> bool {
    path.extension() == Some(OsStr::new(GENERATED_EXTENSION))
}

/// Sibling `.cm` path for a template. Non-template paths are returned as-is.
#[must_use]
pub fn generated_path_for(path: &Path) -> PathBuf {
    if is_template(path) {
        path.with_extension(GENERATED_EXTENSION)
    } else {
        path.to_path_buf()
    }
}

/// Sibling `.cmx` path for a generated file, if `path` is one.
#[must_use]
pub fn template_path_for(path: &Path) -> Option<PathBuf> {
    is_generated(path).then(|| path.with_extension(TEMPLATE_EXTENSION))
}

/// Render a path the way the cm subprocess expects it: forward slashes only,
/// whatever the host convention.
#[must_use]
pub fn to_cm_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
