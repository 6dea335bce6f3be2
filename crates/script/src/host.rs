//! The Lua state that user scripts run in.
//!
//! A [`ScriptHost`] starts from a sandboxed state: the stock `io`, `os`,
//! `debug` and `package` libraries and the dynamic loaders are removed, then
//! the capability bindings and the polyfill are installed. User scripts are
//! loaded on top and share this one state for the whole run, so globals
//! they set persist across rows and REPL lines.

use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;

use mlua::{Lua, MultiValue, Value};
use xlsx2json_config::{ExitPolicy, HttpSettings};

use crate::bindings::{self, display_value, os::exit_request};
use crate::error::{Result, ScriptError};

const POLYFILL: &str = include_str!("polyfill.lua");

/// What the host exposes to scripts.
#[derive(Debug, Clone, Default)]
pub struct HostOptions {
    /// Values of `os.args`.
    pub args: Vec<String>,
    pub exit_policy: ExitPolicy,
    pub http: HttpSettings,
}

pub struct ScriptHost {
    lua: Lua,
    keep_running: Rc<Cell<bool>>,
}

impl ScriptHost {
    pub fn new(options: HostOptions) -> Result<Self> {
        let lua = Lua::new();

        // print() goes to stderr so stdout stays pure JSON
        let print_fn = lua.create_function(|_, args: MultiValue| {
            let parts: Vec<String> = args.iter().map(display_value).collect();
            eprintln!("{}", parts.join("\t"));
            Ok(())
        })?;
        lua.globals().set("print", print_fn)?;

        // Sandbox: keep string, table, math, utf8 and the basic functions
        let globals = lua.globals();
        for name in ["os", "io", "debug", "package", "require", "loadfile", "dofile", "load"] {
            globals.set(name, Value::Nil)?;
        }

        let keep_running = Rc::new(Cell::new(true));
        bindings::install(&lua, &options, keep_running.clone())?;

        let host = Self { lua, keep_running };
        host.load_source("polyfill", POLYFILL)?;
        log::debug!("script host ready (exit policy {:?})", options.exit_policy);
        Ok(host)
    }

    /// Read and run a script file.
    pub fn load_script(&self, path: &Path) -> Result<()> {
        let name = path.display().to_string();
        let source = std::fs::read_to_string(path).map_err(|e| ScriptError::ScriptCompile {
            name: name.clone(),
            message: e.to_string(),
        })?;
        self.load_source(&name, &source)
    }

    /// Run a chunk of script source at top level.
    pub fn load_source(&self, name: &str, source: &str) -> Result<()> {
        log::debug!("loading script {}", name);
        self.lua
            .load(source)
            .set_name(format!("@{}", name))
            .exec()
            .map_err(|e| match exit_request(&e) {
                Some(code) => ScriptError::ExitRequested(code),
                None => ScriptError::ScriptCompile {
                    name: name.to_string(),
                    message: format_lua_error(&e),
                },
            })
    }

    /// Evaluate one REPL line.
    ///
    /// The line is tried as an expression first (`return (<line>)`), then as
    /// a statement. Returns the rendered result, or `None` when a statement
    /// produced nothing. Tables are rendered as JSON when they convert.
    pub fn eval(&self, input: &str) -> Result<Option<String>> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let (code, is_expression) = self.prepare_code(trimmed);
        let values = self
            .lua
            .load(&code)
            .set_name("=repl")
            .eval::<MultiValue>()
            .map_err(|e| match exit_request(&e) {
                Some(code) => ScriptError::ExitRequested(code),
                None => ScriptError::Eval(format_lua_error(&e)),
            })?;

        if values.is_empty() || (!is_expression && values.iter().all(|v| v.is_nil())) {
            return Ok(None);
        }
        let parts: Vec<String> = values.iter().map(|v| self.render(v)).collect();
        Ok(Some(parts.join(", ")))
    }

    fn prepare_code(&self, input: &str) -> (String, bool) {
        let as_expr = format!("return ({})", input);
        if self.lua.load(&as_expr).into_function().is_ok() {
            return (as_expr, true);
        }
        (input.to_string(), false)
    }

    fn render(&self, value: &Value) -> String {
        if let Value::Table(_) = value {
            if let Ok(json) = bindings::export(&self.lua, value.clone()) {
                return json.to_string();
            }
        }
        display_value(value)
    }

    /// False once the script has called `quit()`.
    pub fn keep_running(&self) -> bool {
        self.keep_running.get()
    }

    pub(crate) fn lua(&self) -> &Lua {
        &self.lua
    }
}

/// First line of a Lua error, without the traceback.
pub(crate) fn format_lua_error(error: &mlua::Error) -> String {
    let message = match error {
        mlua::Error::SyntaxError { message, .. } => message.clone(),
        mlua::Error::RuntimeError(msg) => msg.clone(),
        mlua::Error::CallbackError { cause, .. } => return format_lua_error(cause),
        mlua::Error::WithContext { cause, .. } => return format_lua_error(cause),
        _ => error.to_string(),
    };
    match message.find("\nstack traceback:") {
        Some(idx) => message[..idx].to_string(),
        None => message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> ScriptHost {
        ScriptHost::new(HostOptions::default()).unwrap()
    }

    #[test]
    fn test_stock_libraries_removed() {
        let host = host();
        for name in ["io", "debug", "package", "require", "loadfile", "dofile", "load"] {
            assert_eq!(host.eval(&format!("type({})", name)).unwrap().as_deref(), Some("nil"), "{}", name);
        }
        // os is replaced, not kept
        assert_eq!(host.eval("type(os.execute)").unwrap().as_deref(), Some("nil"));
        assert_eq!(host.eval("type(os.readFile)").unwrap().as_deref(), Some("function"));
    }

    #[test]
    fn test_basic_libraries_available() {
        let host = host();
        assert_eq!(host.eval("math.max(1, 5)").unwrap().as_deref(), Some("5"));
        assert_eq!(host.eval("string.upper('ab')").unwrap().as_deref(), Some("AB"));
        assert_eq!(host.eval("table.concat({1, 2}, '-')").unwrap().as_deref(), Some("1-2"));
    }

    #[test]
    fn test_polyfill_helpers() {
        let host = host();
        assert_eq!(host.eval("trim('  x y  ')").unwrap().as_deref(), Some("x y"));
        assert_eq!(host.eval("split('a,b,,c', ',')").unwrap().as_deref(), Some(r#"["a","b","","c"]"#));
        assert_eq!(host.eval("startsWith('column_1', 'column_')").unwrap().as_deref(), Some("true"));
        assert_eq!(host.eval("endsWith('file.json', '.csv')").unwrap().as_deref(), Some("false"));
        assert_eq!(host.eval("isError({status = 'error', error = 'x'})").unwrap().as_deref(), Some("true"));
        assert_eq!(host.eval("isError('fine')").unwrap().as_deref(), Some("false"));
    }

    #[test]
    fn test_state_persists_between_evals() {
        let host = host();
        assert_eq!(host.eval("counter = 41").unwrap(), None);
        assert_eq!(host.eval("counter + 1").unwrap().as_deref(), Some("42"));
    }

    #[test]
    fn test_table_rendered_as_json() {
        let host = host();
        assert_eq!(host.eval("{name = 'Ada'}").unwrap().as_deref(), Some(r#"{"name":"Ada"}"#));
        assert_eq!(host.eval("print").unwrap().as_deref(), Some("function"));
        assert_eq!(
            host.eval("{c = 3, a = 1, b = 2}").unwrap().as_deref(),
            Some(r#"{"a":1,"b":2,"c":3}"#)
        );
    }

    #[test]
    fn test_eval_errors() {
        let host = host();
        assert!(matches!(host.eval("1 +"), Err(ScriptError::Eval(_))));
        match host.eval("error('boom')") {
            Err(ScriptError::Eval(message)) => {
                assert!(message.contains("boom"));
                assert!(!message.contains("stack traceback"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_quit_stops_repl() {
        let host = host();
        assert!(host.keep_running());
        host.eval("quit()").unwrap();
        assert!(!host.keep_running());
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(host().eval("   ").unwrap(), None);
    }

    #[test]
    fn test_load_source_defines_globals() {
        let host = host();
        host.load_source("inline", "function double(x) return x * 2 end").unwrap();
        assert_eq!(host.eval("double(21)").unwrap().as_deref(), Some("42"));
    }

    #[test]
    fn test_load_errors_are_compile_errors() {
        let host = host();
        match host.load_source("broken.lua", "function (") {
            Err(ScriptError::ScriptCompile { name, .. }) => assert_eq!(name, "broken.lua"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            host.load_script(Path::new("/definitely/missing.lua")),
            Err(ScriptError::ScriptCompile { .. })
        ));
    }

    #[test]
    fn test_load_script_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.lua");
        std::fs::write(&path, "greeting = 'hi'").unwrap();
        let host = host();
        host.load_script(&path).unwrap();
        assert_eq!(host.eval("greeting").unwrap().as_deref(), Some("hi"));
    }

    #[test]
    fn test_cooperative_exit_at_top_level() {
        let host = ScriptHost::new(HostOptions {
            exit_policy: ExitPolicy::Cooperative,
            ..HostOptions::default()
        })
        .unwrap();
        assert!(matches!(host.load_source("x", "os.exit(3)"), Err(ScriptError::ExitRequested(3))));
        assert!(matches!(host.eval("os.exit(9)"), Err(ScriptError::ExitRequested(9))));
    }
}
