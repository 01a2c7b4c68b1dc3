//! Statements understood by the cm compiler's command loop.

use std::fmt;
use std::path::{Path, PathBuf};

use cmbridge_types::to_cm_path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CmCommand {
    /// Load a file and everything it depends on.
    LoadAll(PathBuf),
    /// Compile every package below each directory.
    CompileAllBelow(Vec<PathBuf>),
    CompileFile(PathBuf),
    RunFile(PathBuf),
    /// Ask where the symbol at a character offset is defined.
    Refers { file: PathBuf, offset: usize },
    QuitDebug,
    /// Code passed through verbatim.
    Raw(String),
}

impl CmCommand {
    /// Text sent to the compiler, without the trailing newline.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::LoadAll(file) => format!("loadAll({});", quoted(file)),
            Self::CompileAllBelow(dirs) => {
                let calls: String = dirs
                    .iter()
                    .map(|dir| {
                        format!("compileAllBelow(CompileAllEnv(\"{}\"));", dir_with_slash(dir))
                    })
                    .collect();
                format!("{{ use cm.runtime.util; {calls} }}")
            }
            Self::CompileFile(file) => format!("compileFile({});", quoted(file)),
            Self::RunFile(file) => format!("runFile({});", quoted(file)),
            Self::Refers { file, offset } => {
                format!("cm.runtime.refers({}, {offset});", quoted(file))
            }
            Self::QuitDebug => "quitDebug();".to_string(),
            Self::Raw(code) => code.clone(),
        }
    }
}

impl fmt::Display for CmCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn quoted(path: &Path) -> String {
    format!("\"{}\"", to_cm_path(path))
}

fn dir_with_slash(dir: &Path) -> String {
    let mut path = to_cm_path(dir).trim_end_matches('/').to_string();
    path.push('/');
    path
}
