use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use cmbridge_cmx::CmxError;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("failed to start cm compiler: {0}")]
    Start(String),

    #[error(transparent)]
    Preprocess(#[from] CmxError),

    #[error("no matching output within {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("output watch replaced by a newer request")]
    Superseded,

    #[error("compiler session ended before output matched")]
    SessionEnded,

    #[error("statement failed: {0}")]
    StatementFailed(String),

    #[error("cm compiler is not running")]
    NotRunning,

    #[error("unrecognised definition reply: {0}")]
    Definition(String),

    #[error("clean command failed: {0}")]
    Clean(#[source] io::Error),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid output pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
