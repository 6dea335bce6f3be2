//! Host functions injected into the Lua environment.
//!
//! Namespaces: `os.*` (environment, filesystem, process), `http.*` (GET/POST),
//! `json.*` (encode/decode), plus the top-level `quit()`.
//!
//! Every fallible binding hands back a value. On failure that value is
//! `{status = "error", error = <message>}`, so scripts branch on the result
//! instead of catching errors. The only binding that raises is `os.exit`
//! under the cooperative policy, and that is a deliberate stop request.

pub mod http;
pub mod json;
pub mod os;

use std::cell::Cell;
use std::rc::Rc;

use mlua::{DeserializeOptions, IntoLua, Lua, LuaSerdeExt, Table, Value};

use crate::host::HostOptions;

/// Register `quit`, `os`, `http` and `json` in the globals table.
pub(crate) fn install(lua: &Lua, options: &HostOptions, keep_running: Rc<Cell<bool>>) -> mlua::Result<()> {
    let globals = lua.globals();

    // quit() flips the REPL flag and returns it
    let quit_fn = lua.create_function(move |_, ()| {
        keep_running.set(false);
        Ok(keep_running.get())
    })?;
    globals.set("quit", quit_fn)?;

    globals.set("os", os::table(lua, options.args.clone(), options.exit_policy)?)?;
    globals.set("http", http::table(lua, &options.http)?)?;
    globals.set("json", json::table(lua)?)?;
    Ok(())
}

/// Lua value to JSON. Table keys come out sorted, since Lua's own
/// iteration order changes from one state to the next.
pub(crate) fn export(lua: &Lua, value: Value) -> mlua::Result<serde_json::Value> {
    lua.from_value_with(value, DeserializeOptions::new().sort_keys(true))
}

/// Build the `{status = "error", error = msg}` object and log it.
pub(crate) fn error_object(lua: &Lua, message: &str) -> mlua::Result<Table> {
    log::warn!("{}", message);
    let obj = lua.create_table()?;
    obj.set("status", "error")?;
    obj.set("error", message)?;
    Ok(obj)
}

/// Convert a host operation result into the value returned to the script.
pub(crate) fn reply<T: IntoLua>(lua: &Lua, result: Result<T, String>) -> mlua::Result<Value> {
    match result {
        Ok(value) => value.into_lua(lua),
        Err(message) => Ok(Value::Table(error_object(lua, &message)?)),
    }
}

/// Loose string coercion for arguments. Missing and `nil` become "".
pub(crate) fn coerce_string(value: &Value) -> String {
    match value {
        Value::Nil => String::new(),
        Value::String(s) => s.to_string_lossy().to_string(),
        other => display_value(other),
    }
}

/// Raw bytes of a string argument, or its coerced text for other types.
pub(crate) fn coerce_bytes(value: &Value) -> Vec<u8> {
    match value {
        Value::String(s) => s.as_bytes().to_vec(),
        other => coerce_string(other).into_bytes(),
    }
}

/// Render a Lua value for display (REPL results, print()).
pub(crate) fn display_value(value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Number(n) => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{:.0}", n)
            } else {
                format!("{}", n)
            }
        }
        Value::String(s) => s.to_string_lossy().to_string(),
        Value::Table(_) => "table".to_string(),
        Value::Function(_) => "function".to_string(),
        Value::Thread(_) => "thread".to_string(),
        Value::UserData(_) => "userdata".to_string(),
        Value::LightUserData(_) => "lightuserdata".to_string(),
        Value::Error(e) => format!("error: {}", e),
        _ => "<unknown>".to_string(),
    }
}
