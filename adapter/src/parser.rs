//! Classification of compiler output lines.
//!
//! The compiler reports diagnostics and definition replies as bracketed
//! headers of four colon-separated fields:
//!
//! ```text
//! [ERROR:<file>:<line>:<col>] message
//! [WARNING:<file>:<line>:<col>] message
//! [DEFINITION:<file>:<line>:<col>]
//! ```
//!
//! Positions are 1-based on the wire. Anything that doesn't fit is a plain
//! log line.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use cmbridge_types::{
    CmDiagnostic, DiagnosticSeverity, Location, parse_one_based, template_path_for,
};

const DEFINITION_MARKER: &str = "DEFINITION";
const HEADER_FIELDS: usize = 4;

/// Pattern recognising a definition reply, used as a watch success pattern.
pub(crate) const DEFINITION_PATTERN: &str = r"^\[DEFINITION:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    Diagnostic {
        path: PathBuf,
        diagnostic: CmDiagnostic,
    },
    Definition(Location),
    Log,
}

/// Classify one complete output line. Relative paths resolve against `root`.
#[must_use]
pub fn parse_line(line: &str, root: &Path) -> ParsedLine {
    let Some(rest) = line.strip_prefix('[') else {
        return ParsedLine::Log;
    };
    let (header, message) = rest.split_once(']').unwrap_or((rest, ""));

    let fields: Vec<&str> = header.split(':').collect();
    if fields.len() != HEADER_FIELDS {
        return ParsedLine::Log;
    }
    let file = fields[1].trim();
    if file.is_empty() {
        return ParsedLine::Log;
    }
    let (Ok(line_no), Ok(col)) = (parse_one_based(fields[2]), parse_one_based(fields[3])) else {
        return ParsedLine::Log;
    };
    let path = resolve(root, file);

    if fields[0] == DEFINITION_MARKER {
        return ParsedLine::Definition(Location::new(path, line_no, col));
    }
    let Some(severity) = DiagnosticSeverity::from_marker(fields[0]) else {
        return ParsedLine::Log;
    };
    let message = match message.trim() {
        "" => severity.label().to_string(),
        m => m.to_string(),
    };
    ParsedLine::Diagnostic {
        path,
        diagnostic: CmDiagnostic::new(severity, message, line_no, col),
    }
}

fn resolve(root: &Path, file: &str) -> PathBuf {
    let path = Path::new(file);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Maps generated `.cm` paths back to the `.cmx` template the user edits.
///
/// Existence checks are cached until [`TemplateRemapper::invalidate`]; the
/// adapter invalidates after every preprocessing run.
#[derive(Debug, Default)]
pub(crate) struct TemplateRemapper {
    known: HashMap<PathBuf, bool>,
}

impl TemplateRemapper {
    pub(crate) fn remap(&mut self, path: PathBuf) -> PathBuf {
        let Some(template) = template_path_for(&path) else {
            return path;
        };
        let exists = *self
            .known
            .entry(template.clone())
            .or_insert_with(|| template.is_file());
        if exists { template } else { path }
    }

    pub(crate) fn invalidate(&mut self) {
        self.known.clear();
    }
}
