//! Package names derived from a file's location under the project root.

use std::fmt;
use std::path::Path;

const SEPARATOR: char = '.';

/// Dot-delimited name of the directory holding a file, relative to the
/// project root. `root/a/b/c/file.cmx` derives `a.b.c`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageName(String);

impl PackageName {
    /// Derive the package name for `file` under `root`.
    ///
    /// The root prefix is stripped case-insensitively. A file outside the
    /// root keeps its whole directory path; a file directly inside it
    /// derives the empty name.
    #[must_use]
    pub fn derive(root: &Path, file: &Path) -> Self {
        let dir = file
            .parent()
            .map(cmbridge_types::to_cm_path)
            .unwrap_or_default();
        let root = cmbridge_types::to_cm_path(root);
        let root = root.trim_end_matches('/');

        let relative = strip_prefix_ignore_ascii_case(&dir, root)
            .filter(|rest| rest.is_empty() || rest.starts_with('/'))
            .unwrap_or(&dir);

        let name = relative
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join(".");
        Self(name)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Dot-separated segments. A directory named `a.b` contributes two.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEPARATOR).filter(|s| !s.is_empty())
    }

    #[must_use]
    pub fn segment(&self, index: usize) -> Option<&str> {
        self.segments().nth(index)
    }

    /// First `count` segments joined, or `None` if there are fewer.
    #[must_use]
    pub fn prefix(&self, count: usize) -> Option<String> {
        let parts: Vec<&str> = self.segments().take(count).collect();
        (parts.len() == count).then(|| parts.join("."))
    }

    /// All but the last segment, except that names of two or fewer segments
    /// are their own parent.
    #[must_use]
    pub fn parent(&self) -> String {
        let parts: Vec<&str> = self.segments().collect();
        if parts.len() > 2 {
            parts[..parts.len() - 1].join(".")
        } else {
            self.0.clone()
        }
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn strip_prefix_ignore_ascii_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &value[prefix.len()..])
}
