//! Run-level failures.
//!
//! Every variant here ends the run. Failures inside a capability binding never
//! show up as a `ScriptError`; they reach the script as an error object and
//! only become fatal if the script turns them into a row `error`.

use std::path::PathBuf;

use xlsx2json_io::SourceError;

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// The tabular input could not be opened or read.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// A record or callback value could not be converted to or from JSON.
    #[error("row: {row}, {message}")]
    Serialization { row: usize, message: String },

    /// The polyfill or user script failed to compile or load, or the
    /// callback name is unusable.
    #[error("Can't load {name}, {message}")]
    ScriptCompile { name: String, message: String },

    /// The callback raised a Lua error or returned the wrong shape.
    #[error("row: {row}, {message}")]
    ScriptInvocation { row: usize, message: String },

    /// The callback rejected the row through its `error` field.
    #[error("row: {row}, {message}")]
    RowRejected { row: usize, message: String },

    /// The row's `path` could not be written.
    #[error("row: {row}, Can't write {}, {source}", path.display())]
    Persist {
        row: usize,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The output sink refused a row.
    #[error("row: {row}, Can't emit output, {source}")]
    Sink {
        row: usize,
        #[source]
        source: std::io::Error,
    },

    /// The script called `os.exit` under the cooperative exit policy.
    #[error("script requested exit with code {0}")]
    ExitRequested(i32),

    /// A REPL line failed to compile or raised.
    #[error("{0}")]
    Eval(String),

    /// Lua state setup failed before any script ran.
    #[error("Lua setup error: {0}")]
    Setup(#[from] mlua::Error),
}

impl ScriptError {
    /// Sheet row the failure is attached to, if any.
    pub fn row(&self) -> Option<usize> {
        match self {
            ScriptError::Serialization { row, .. }
            | ScriptError::ScriptInvocation { row, .. }
            | ScriptError::RowRejected { row, .. }
            | ScriptError::Persist { row, .. }
            | ScriptError::Sink { row, .. } => Some(*row),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ScriptError>;
