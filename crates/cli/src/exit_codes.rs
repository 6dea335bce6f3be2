//! CLI Exit Code Registry
//!
//! Single source of truth for the codes `xlsx2json` exits with. Shell
//! pipelines branch on these, so they only ever grow.
//!
//! | Code | Meaning                                                  |
//! |------|----------------------------------------------------------|
//! | 0    | Success                                                  |
//! | 1    | General error (Lua state setup, unexpected failure)      |
//! | 2    | Usage error (bad arguments, no input)                    |
//! | 3    | Input workbook could not be opened or read               |
//! | 4    | Script failed to load, or the callback is not a function |
//! | 5    | Callback raised, returned a bad shape, or set `error`    |
//! | 6    | Persisting a row or writing stdout failed                |
//! | 7    | Settings file unreadable or malformed                    |
//!
//! A script calling `os.exit(n)` ends the process with `n` instead, under
//! either exit policy.

use xlsx2json_script::ScriptError;

/// Success - run completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing input.
pub const EXIT_USAGE: u8 = 2;

/// Workbook missing, unreadable, or not a spreadsheet.
pub const EXIT_SOURCE: u8 = 3;

/// Script file unreadable or not valid Lua; callback missing.
pub const EXIT_SCRIPT_COMPILE: u8 = 4;

/// Callback failed on a row or rejected it.
pub const EXIT_SCRIPT_ROW: u8 = 5;

/// Persisted file or stdout write failed.
pub const EXIT_OUTPUT: u8 = 6;

/// Settings file error.
pub const EXIT_CONFIG: u8 = 7;

/// Map a pipeline failure to its exit code.
pub fn script_exit_code(err: &ScriptError) -> u8 {
    match err {
        ScriptError::Source(_) => EXIT_SOURCE,
        ScriptError::ScriptCompile { .. } => EXIT_SCRIPT_COMPILE,
        ScriptError::Serialization { .. }
        | ScriptError::ScriptInvocation { .. }
        | ScriptError::RowRejected { .. }
        | ScriptError::Eval(_) => EXIT_SCRIPT_ROW,
        ScriptError::Persist { .. } | ScriptError::Sink { .. } => EXIT_OUTPUT,
        ScriptError::ExitRequested(code) => process_code(*code),
        ScriptError::Setup(_) => EXIT_ERROR,
    }
}

/// Truncate a script-supplied exit code the way the OS does.
pub fn process_code(code: i32) -> u8 {
    (code & 0xff) as u8
}
