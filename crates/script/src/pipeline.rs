//! Per-row transform loop.
//!
//! Records are processed strictly in sheet order. Each row is either emitted
//! as-is ([`Transform::Passthrough`]) or handed to the script callback, whose
//! [`CallbackResponse`] decides between emitting, persisting to a file, or
//! stopping the run. The first failure ends the run; rows already handed to
//! the sink stay there.

use std::io;

use mlua::{Function, LuaSerdeExt, Value};
use xlsx2json_io::{persist, Record};

use crate::bindings::{export, os::exit_request};
use crate::error::{Result, ScriptError};
use crate::host::{format_lua_error, ScriptHost};
use crate::response::{CallbackResponse, RowOutcome};

/// Destination for emitted rows, one JSON text per row.
pub trait RowSink {
    fn emit(&mut self, row: usize, json: &str) -> io::Result<()>;
}

impl RowSink for Vec<String> {
    fn emit(&mut self, _row: usize, json: &str) -> io::Result<()> {
        self.push(json.to_string());
        Ok(())
    }
}

/// Counters for a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub rows_emitted: usize,
    pub files_written: usize,
}

/// A compiled handle on the script's callback.
pub struct CallbackInvoker<'h> {
    host: &'h ScriptHost,
    name: String,
    wrapper: Function,
}

impl<'h> CallbackInvoker<'h> {
    /// Resolve `name` (a global or dotted path like `handlers.row`) in the
    /// host. Fails if the name is malformed or does not hold a function.
    pub fn new(host: &'h ScriptHost, name: &str) -> Result<Self> {
        if !is_name_path(name) {
            return Err(ScriptError::ScriptCompile {
                name: name.to_string(),
                message: "callback must be a Lua name such as `callback` or `handlers.row`".to_string(),
            });
        }

        let lua = host.lua();
        let compile_err = |e: mlua::Error| ScriptError::ScriptCompile {
            name: name.to_string(),
            message: format_lua_error(&e),
        };

        let target: Value = lua
            .load(format!("return {}", name))
            .set_name("=callback")
            .eval()
            .map_err(compile_err)?;
        if !target.is_function() {
            return Err(ScriptError::ScriptCompile {
                name: name.to_string(),
                message: format!("callback is not a function (got {})", target.type_name()),
            });
        }

        let wrapper = lua
            .load(format!("return {}(...)", name))
            .set_name("=callback")
            .into_function()
            .map_err(compile_err)?;

        Ok(Self {
            host,
            name: name.to_string(),
            wrapper,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Call the callback with one record and interpret its answer.
    pub fn invoke(&self, row: usize, record: &Record) -> Result<RowOutcome> {
        let lua = self.host.lua();
        let input = lua.to_value(record).map_err(|e| ScriptError::Serialization {
            row,
            message: e.to_string(),
        })?;

        let returned: Value = self.wrapper.call(input).map_err(|e| match exit_request(&e) {
            Some(code) => ScriptError::ExitRequested(code),
            None => ScriptError::ScriptInvocation {
                row,
                message: format_lua_error(&e),
            },
        })?;

        if !returned.is_table() {
            return Err(ScriptError::ScriptInvocation {
                row,
                message: format!("{} must return a table, got {}", self.name, returned.type_name()),
            });
        }

        let exported = export(lua, returned).map_err(|e| ScriptError::Serialization {
            row,
            message: e.to_string(),
        })?;
        let response = CallbackResponse::from_value(exported).map_err(|e| ScriptError::ScriptInvocation {
            row,
            message: format!("unexpected response from {}, {}", self.name, e),
        })?;
        Ok(response.into_outcome())
    }
}

/// Lua name path: `ident(.ident)*`.
fn is_name_path(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

pub enum Transform<'h> {
    Passthrough,
    Callback(CallbackInvoker<'h>),
}

pub struct Pipeline<'h> {
    transform: Transform<'h>,
}

impl<'h> Pipeline<'h> {
    /// Emit every record unchanged.
    pub fn passthrough() -> Self {
        Self {
            transform: Transform::Passthrough,
        }
    }

    /// Route every record through the callback `name` defined in `host`.
    pub fn with_callback(host: &'h ScriptHost, name: &str) -> Result<Self> {
        Ok(Self {
            transform: Transform::Callback(CallbackInvoker::new(host, name)?),
        })
    }

    pub fn transform(&self) -> &Transform<'h> {
        &self.transform
    }

    /// Process `records` in order, emitting to `sink`. Stops at the first
    /// failing row.
    pub fn run<I>(&self, records: I, sink: &mut dyn RowSink) -> Result<RunSummary>
    where
        I: IntoIterator<Item = (usize, Record)>,
    {
        let mut summary = RunSummary::default();

        for (row, record) in records {
            log::debug!("row {}: {} columns", row, record.len());

            let json = match &self.transform {
                Transform::Passthrough => record
                    .to_json()
                    .map_err(|e| ScriptError::Serialization { row, message: e.to_string() })?,
                Transform::Callback(invoker) => match invoker.invoke(row, &record)? {
                    RowOutcome::Emit(source) => to_json(row, &source)?,
                    RowOutcome::Redirect { source, path } => {
                        let json = to_json(row, &source)?;
                        persist::write_json(&path, &json)
                            .map_err(|source| ScriptError::Persist { row, path: path.clone(), source })?;
                        log::debug!("row {}: wrote {}", row, path.display());
                        summary.files_written += 1;
                        json
                    }
                    RowOutcome::Abort(message) => {
                        return Err(ScriptError::RowRejected { row, message });
                    }
                },
            };

            sink.emit(row, &json).map_err(|source| ScriptError::Sink { row, source })?;
            summary.rows_emitted += 1;
        }

        log::info!(
            "{} rows emitted, {} files written",
            summary.rows_emitted,
            summary.files_written
        );
        Ok(summary)
    }
}

fn to_json(row: usize, value: &serde_json::Value) -> Result<String> {
    serde_json::to_string(value).map_err(|e| ScriptError::Serialization { row, message: e.to_string() })
}
