//! Diagnostics store: the editor-side mirror of published diagnostics.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use cmbridge_types::CmDiagnostic;

use crate::types::{AdapterEvent, DiagnosticsSnapshot};

#[derive(Debug, Default)]
pub struct DiagnosticsStore {
    data: HashMap<PathBuf, Vec<CmDiagnostic>>,
}

impl DiagnosticsStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold an adapter event into the store. Other events are ignored.
    pub fn apply(&mut self, event: &AdapterEvent) {
        match event {
            AdapterEvent::Diagnostics { path, items } => self.set(path.clone(), items.clone()),
            AdapterEvent::DiagnosticsCleared => self.clear(),
            _ => {}
        }
    }

    /// Replace the list for `path`. An empty list removes the entry.
    pub fn set(&mut self, path: PathBuf, items: Vec<CmDiagnostic>) {
        if items.is_empty() {
            self.data.remove(&path);
        } else {
            self.data.insert(path, items);
        }
    }

    pub fn delete(&mut self, path: &Path) {
        self.data.remove(path);
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&[CmDiagnostic]> {
        self.data.get(path).map(Vec::as_slice)
    }

    #[must_use]
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        let mut files: Vec<(PathBuf, Vec<CmDiagnostic>)> = self
            .data
            .iter()
            .map(|(path, items)| (path.clone(), items.clone()))
            .collect();

        // Files with errors first, then by path
        files.sort_by(|a, b| {
            let a_has_errors = a.1.iter().any(|d| d.severity().is_error());
            let b_has_errors = b.1.iter().any(|d| d.severity().is_error());
            b_has_errors.cmp(&a_has_errors).then_with(|| a.0.cmp(&b.0))
        });

        DiagnosticsSnapshot::new(files)
    }
}
