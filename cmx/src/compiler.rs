//! Template → generated file preprocessing.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use tempfile::NamedTempFile;
use thiserror::Error;

use cmbridge_types::{generated_path_for, is_generated, is_template, template_path_for};

use crate::rules::{SubstitutionRule, default_rules};

/// Subdirectory of the project root holding cmx templates.
pub const CUSTOM_DIR: &str = "custom";

#[derive(Debug, Error)]
pub enum CmxError {
    #[error("{op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("walking {}: {source}", root.display())]
    Walk {
        root: PathBuf,
        #[source]
        source: ignore::Error,
    },
}

impl CmxError {
    fn io<'a>(op: &'static str, path: &'a Path) -> impl FnOnce(io::Error) -> Self + 'a {
        move |source| Self::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Rewrites `.cmx` templates into sibling `.cm` files.
pub struct CmxCompiler {
    root: PathBuf,
    rules: Vec<Box<dyn SubstitutionRule>>,
}

impl CmxCompiler {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            rules: default_rules(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn custom_dir(&self) -> PathBuf {
        self.root.join(CUSTOM_DIR)
    }

    /// Apply every rule, in order, to `text` as if it were read from `file`.
    #[must_use]
    pub fn substitute(&self, text: &str, file: &Path) -> String {
        self.rules
            .iter()
            .fold(text.to_string(), |acc, rule| rule.apply(&acc, file, &self.root))
    }

    /// Resolve the file the compiler should see for `file`.
    ///
    /// Non-template paths pass through unchanged. Templates are rewritten
    /// into their `.cm` sibling, which is returned. An empty rewrite leaves
    /// no target on disk.
    pub fn compile_file(&self, file: &Path) -> Result<PathBuf, CmxError> {
        if !is_template(file) {
            return Ok(file.to_path_buf());
        }
        let target = generated_path_for(file);

        match fs::remove_file(&target) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(CmxError::io("removing", &target)(e)),
        }

        let source = fs::read_to_string(file).map_err(CmxError::io("reading", file))?;
        let output = self.substitute(&source, file);
        if output.is_empty() {
            tracing::debug!(file = %file.display(), "template produced no output");
            return Ok(target);
        }

        write_generated(&target, output.as_bytes()).map_err(CmxError::io("writing", &target))?;
        tracing::debug!(
            template = %file.display(),
            target = %target.display(),
            "Generated cm file"
        );
        Ok(target)
    }

    /// Compile every template under the custom directory.
    pub fn compile_all(&self) -> Result<Vec<PathBuf>, CmxError> {
        let mut generated = Vec::new();
        for template in self.walk_custom(is_template)? {
            generated.push(self.compile_file(&template)?);
        }
        tracing::info!(count = generated.len(), "Compiled cmx templates");
        Ok(generated)
    }

    /// Delete generated files that can be regenerated from a template.
    ///
    /// `.cm` files without a `.cmx` sibling are authored sources and are kept.
    pub fn clean(&self) -> Result<Vec<PathBuf>, CmxError> {
        let mut removed = Vec::new();
        for file in self.walk_custom(is_generated)? {
            if !has_template(&file) {
                continue;
            }
            fs::remove_file(&file).map_err(CmxError::io("removing", &file))?;
            removed.push(file);
        }
        tracing::info!(count = removed.len(), "Removed generated cm files");
        Ok(removed)
    }

    fn walk_custom(&self, keep: fn(&Path) -> bool) -> Result<Vec<PathBuf>, CmxError> {
        let dir = self.custom_dir();
        if !dir.is_dir() {
            tracing::debug!(dir = %dir.display(), "No custom directory, nothing to do");
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        let walker = WalkBuilder::new(&dir)
            .standard_filters(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();
        for entry in walker {
            let entry = entry.map_err(|source| CmxError::Walk {
                root: dir.clone(),
                source,
            })?;
            let is_file = entry.file_type().is_some_and(|t| t.is_file());
            if is_file && keep(entry.path()) {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }
}

/// Whether a template exists for the generated file `path`.
#[must_use]
pub fn has_template(path: &Path) -> bool {
    template_path_for(path).is_some_and(|template| template.is_file())
}

fn write_generated(target: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}
