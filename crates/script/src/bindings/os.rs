//! `os.*` bindings: process arguments, exit, environment and filesystem.
//!
//! The filesystem operations are plain functions over `std::fs` so they can
//! be tested without Lua; [`table`] wraps each one and formats failures as
//! `os.<name>(<args>), <error>`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use mlua::{Lua, Table, Value};
use xlsx2json_config::ExitPolicy;

use super::{coerce_bytes, coerce_string, reply};

/// Raised through Lua when a script calls `os.exit` under
/// [`ExitPolicy::Cooperative`]; the pipeline turns it back into an exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitRequest(pub i32);

impl std::fmt::Display for ExitRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "os.exit({})", self.0)
    }
}

impl std::error::Error for ExitRequest {}

/// Find an [`ExitRequest`] inside a Lua error, looking through callback wrappers.
pub fn exit_request(err: &mlua::Error) -> Option<i32> {
    match err {
        mlua::Error::ExternalError(inner) => inner.downcast_ref::<ExitRequest>().map(|r| r.0),
        mlua::Error::CallbackError { cause, .. } => exit_request(cause),
        mlua::Error::WithContext { cause, .. } => exit_request(cause),
        _ => None,
    }
}

/// Exit code from an optional numeric argument. Unparseable means 0.
pub fn parse_exit_code(value: &Value) -> i32 {
    match value {
        Value::Integer(i) => *i as i32,
        Value::Number(n) => *n as i32,
        other => coerce_string(other).trim().parse().unwrap_or(0),
    }
}

/// Parse a permission mode. Decimal by default; `0o` prefix for octal.
pub fn parse_mode(text: &str) -> Result<u32, String> {
    let text = text.trim();
    let parsed = match text.strip_prefix("0o") {
        Some(octal) => u32::from_str_radix(octal, 8),
        None => text.parse::<u32>(),
    };
    parsed.map_err(|e| format!("invalid mode {:?}: {}", text, e))
}

// ============================================================================
// Filesystem operations
// ============================================================================

pub fn get_env(name: &str) -> Result<String, String> {
    match std::env::var(name) {
        Ok(value) => Ok(value),
        Err(std::env::VarError::NotPresent) => Ok(String::new()),
        Err(e) => Err(e.to_string()),
    }
}

pub fn write_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o660);
    }
    io::Write::write_all(&mut options.open(path)?, contents)
}

/// Remove a file. Directories are left alone and reported as `false`.
pub fn remove(path: &Path) -> io::Result<bool> {
    if fs::metadata(path)?.is_dir() {
        return Ok(false);
    }
    fs::remove_file(path)?;
    Ok(true)
}

/// Remove a directory (empty, or recursively). Non-directories report `false`.
pub fn remove_dir(path: &Path, recursive: bool) -> io::Result<bool> {
    if !fs::metadata(path)?.is_dir() {
        return Ok(false);
    }
    if recursive {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_dir(path)?;
    }
    Ok(true)
}

pub fn chmod(path: &Path, mode: u32) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
    }
    #[cfg(not(unix))]
    {
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_readonly(mode & 0o200 == 0);
        fs::set_permissions(path, perms)
    }
}

pub fn make_dir(path: &Path, mode: u32, recursive: bool) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(recursive);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    builder.create(path)
}

/// Every path under `root`, root first, children in lexical order.
/// Symlinks are listed but not followed.
pub fn find(root: &Path) -> io::Result<Vec<String>> {
    let mut found = Vec::new();
    walk(root, &mut found)?;
    Ok(found)
}

fn walk(path: &Path, found: &mut Vec<String>) -> io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    found.push(path.to_string_lossy().into_owned());
    if meta.is_dir() {
        let mut entries = fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<io::Result<Vec<PathBuf>>>()?;
        entries.sort();
        for entry in entries {
            walk(&entry, found)?;
        }
    }
    Ok(())
}

// ============================================================================
// Lua table
// ============================================================================

/// Build the `os` table. `args` is what `os.args()` returns.
pub(crate) fn table(lua: &Lua, args: Vec<String>, exit_policy: ExitPolicy) -> mlua::Result<Table> {
    let os = lua.create_table()?;

    // os.args()
    os.set("args", lua.create_function(move |_, ()| Ok(args.clone()))?)?;

    // os.exit(code?)
    os.set(
        "exit",
        lua.create_function(move |_, code: Value| -> mlua::Result<()> {
            let code = parse_exit_code(&code);
            match exit_policy {
                ExitPolicy::Terminate => std::process::exit(code),
                ExitPolicy::Cooperative => {
                    log::info!("script requested exit with code {}", code);
                    Err(mlua::Error::external(ExitRequest(code)))
                }
            }
        })?,
    )?;

    // os.getEnv(name) -> value or ""
    os.set(
        "getEnv",
        lua.create_function(|lua, name: Value| {
            let name = coerce_string(&name);
            reply(lua, get_env(&name).map_err(|e| format!("os.getEnv({:?}), {}", name, e)))
        })?,
    )?;

    // os.readFile(path) -> contents
    os.set(
        "readFile",
        lua.create_function(|lua, path: Value| {
            let path = coerce_string(&path);
            let result = fs::read(&path)
                .map_err(|e| format!("os.readFile({:?}), {}", path, e))
                .and_then(|buf| lua.create_string(&buf).map_err(|e| e.to_string()));
            reply(lua, result)
        })?,
    )?;

    // os.writeFile(path, contents) -> contents
    os.set(
        "writeFile",
        lua.create_function(|lua, (path, contents): (Value, Value)| {
            let path = coerce_string(&path);
            let contents = coerce_bytes(&contents);
            let result = write_file(Path::new(&path), &contents)
                .map_err(|e| format!("os.writeFile({:?}, {:?}), {}", path, String::from_utf8_lossy(&contents), e))
                .and_then(|()| lua.create_string(&contents).map_err(|e| e.to_string()));
            reply(lua, result)
        })?,
    )?;

    // os.rename(old, new) -> true
    os.set(
        "rename",
        lua.create_function(|lua, (old, new): (Value, Value)| {
            let (old, new) = (coerce_string(&old), coerce_string(&new));
            let result = fs::rename(&old, &new)
                .map(|()| true)
                .map_err(|e| format!("os.rename({:?}, {:?}), {}", old, new, e));
            reply(lua, result)
        })?,
    )?;

    // os.remove(path) -> true if a file was removed, false for a directory
    os.set(
        "remove",
        lua.create_function(|lua, path: Value| {
            let path = coerce_string(&path);
            reply(lua, remove(Path::new(&path)).map_err(|e| format!("os.remove({:?}), {}", path, e)))
        })?,
    )?;

    // os.chmod(path, mode) -> true
    os.set(
        "chmod",
        lua.create_function(|lua, (path, mode): (Value, Value)| {
            let (path, mode) = (coerce_string(&path), coerce_string(&mode));
            let result = parse_mode(&mode)
                .and_then(|m| chmod(Path::new(&path), m).map_err(|e| e.to_string()))
                .map(|()| true)
                .map_err(|e| format!("os.chmod({:?}, {}), {}", path, mode, e));
            reply(lua, result)
        })?,
    )?;

    // os.find(root) -> array of paths
    os.set(
        "find",
        lua.create_function(|lua, root: Value| {
            let root = coerce_string(&root);
            reply(lua, find(Path::new(&root)).map_err(|e| format!("os.find({:?}), {}", root, e)))
        })?,
    )?;

    // os.mkdir(path, mode) / os.mkdirAll(path, mode) -> true
    for (name, recursive) in [("mkdir", false), ("mkdirAll", true)] {
        os.set(
            name,
            lua.create_function(move |lua, (path, mode): (Value, Value)| {
                let (path, mode) = (coerce_string(&path), coerce_string(&mode));
                let result = parse_mode(&mode)
                    .and_then(|m| make_dir(Path::new(&path), m, recursive).map_err(|e| e.to_string()))
                    .map(|()| true)
                    .map_err(|e| format!("os.{}({:?}, {}), {}", name, path, mode, e));
                reply(lua, result)
            })?,
        )?;
    }

    // os.rmdir(path) / os.rmdirAll(path) -> true if a directory was removed
    for (name, recursive) in [("rmdir", false), ("rmdirAll", true)] {
        os.set(
            name,
            lua.create_function(move |lua, path: Value| {
                let path = coerce_string(&path);
                let result = remove_dir(Path::new(&path), recursive)
                    .map_err(|e| format!("os.{}({:?}), {}", name, path, e));
                reply(lua, result)
            })?,
        )?;
    }

    Ok(os)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::test_support::{eval, expect_error_object};
    use tempfile::tempdir;

    fn lua_with_os(policy: ExitPolicy) -> Lua {
        let lua = Lua::new();
        let os = table(&lua, vec!["xlsx2json".into(), "in.xlsx".into()], policy).unwrap();
        lua.globals().set("os", os).unwrap();
        lua
    }

    fn quoted(path: &Path) -> String {
        format!("{:?}", path.to_str().unwrap())
    }

    #[test]
    fn test_args() {
        let lua = lua_with_os(ExitPolicy::Terminate);
        let args: Vec<String> = lua.load("return os.args()").eval().unwrap();
        assert_eq!(args, vec!["xlsx2json", "in.xlsx"]);
    }

    #[test]
    fn test_get_env() {
        let lua = lua_with_os(ExitPolicy::Terminate);
        std::env::set_var("XLSX2JSON_TEST_ENV", "present");
        let value: String = lua.load(r#"return os.getEnv("XLSX2JSON_TEST_ENV")"#).eval().unwrap();
        assert_eq!(value, "present");

        let missing: String = lua.load(r#"return os.getEnv("XLSX2JSON_TEST_ENV_MISSING")"#).eval().unwrap();
        assert_eq!(missing, "");
    }

    #[test]
    fn test_write_then_read_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("note.txt");
        let lua = lua_with_os(ExitPolicy::Terminate);

        let written: String = lua
            .load(format!(r#"return os.writeFile({}, "hello")"#, quoted(&path)))
            .eval()
            .unwrap();
        assert_eq!(written, "hello");

        let read: String = lua.load(format!("return os.readFile({})", quoted(&path))).eval().unwrap();
        assert_eq!(read, "hello");
    }

    #[test]
    fn test_write_file_into_missing_dir_is_error_object() {
        let lua = lua_with_os(ExitPolicy::Terminate);
        let value = eval(&lua, r#"return os.writeFile("/nonexistent-dir/x", "y")"#);
        let message = expect_error_object(value);
        assert!(message.starts_with("os.writeFile("), "{}", message);
    }

    #[test]
    fn test_read_missing_file_is_error_object() {
        let lua = lua_with_os(ExitPolicy::Terminate);
        let value = eval(&lua, r#"return os.readFile("/nonexistent-dir/x")"#);
        expect_error_object(value);
    }

    #[test]
    fn test_rename() {
        let dir = tempdir().unwrap();
        let old = dir.path().join("a.txt");
        let new = dir.path().join("b.txt");
        fs::write(&old, "x").unwrap();
        let lua = lua_with_os(ExitPolicy::Terminate);

        let ok: bool = lua
            .load(format!("return os.rename({}, {})", quoted(&old), quoted(&new)))
            .eval()
            .unwrap();
        assert!(ok);
        assert!(new.exists() && !old.exists());
    }

    #[test]
    fn test_remove_file_and_directory() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("f.txt");
        fs::write(&file, "x").unwrap();
        let lua = lua_with_os(ExitPolicy::Terminate);

        let removed: bool = lua.load(format!("return os.remove({})", quoted(&file))).eval().unwrap();
        assert!(removed);
        assert!(!file.exists());

        let on_dir: bool = lua.load(format!("return os.remove({})", quoted(dir.path()))).eval().unwrap();
        assert!(!on_dir);
        assert!(dir.path().exists());

        let value = eval(&lua, &format!("return os.remove({})", quoted(&file)));
        expect_error_object(value);
    }

    #[cfg(unix)]
    #[test]
    fn test_chmod_decimal_and_octal() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let file = dir.path().join("f.txt");
        fs::write(&file, "x").unwrap();
        let lua = lua_with_os(ExitPolicy::Terminate);

        // 384 == 0o600
        let ok: bool = lua.load(format!(r#"return os.chmod({}, "384")"#, quoted(&file))).eval().unwrap();
        assert!(ok);
        assert_eq!(fs::metadata(&file).unwrap().permissions().mode() & 0o777, 0o600);

        let ok: bool = lua.load(format!(r#"return os.chmod({}, "0o644")"#, quoted(&file))).eval().unwrap();
        assert!(ok);
        assert_eq!(fs::metadata(&file).unwrap().permissions().mode() & 0o777, 0o644);

        let value = eval(&lua, &format!(r#"return os.chmod({}, "rwx")"#, quoted(&file)));
        assert!(expect_error_object(value).contains("invalid mode"));
    }

    #[test]
    fn test_mkdir_and_mkdir_all() {
        let dir = tempdir().unwrap();
        let single = dir.path().join("one");
        let nested = dir.path().join("a").join("b").join("c");
        let lua = lua_with_os(ExitPolicy::Terminate);

        let ok: bool = lua.load(format!(r#"return os.mkdir({}, "0o775")"#, quoted(&single))).eval().unwrap();
        assert!(ok && single.is_dir());

        // mkdir does not create intermediate directories
        let value = eval(&lua, &format!(r#"return os.mkdir({}, "0o775")"#, quoted(&nested)));
        expect_error_object(value);

        let ok: bool = lua.load(format!(r#"return os.mkdirAll({}, "509")"#, quoted(&nested))).eval().unwrap();
        assert!(ok && nested.is_dir());
    }

    #[test]
    fn test_rmdir_and_rmdir_all() {
        let dir = tempdir().unwrap();
        let empty = dir.path().join("empty");
        let full = dir.path().join("full");
        let file = dir.path().join("f.txt");
        fs::create_dir(&empty).unwrap();
        fs::create_dir_all(full.join("inner")).unwrap();
        fs::write(&file, "x").unwrap();
        let lua = lua_with_os(ExitPolicy::Terminate);

        let ok: bool = lua.load(format!("return os.rmdir({})", quoted(&empty))).eval().unwrap();
        assert!(ok && !empty.exists());

        let on_file: bool = lua.load(format!("return os.rmdir({})", quoted(&file))).eval().unwrap();
        assert!(!on_file && file.exists());

        // Non-empty directory needs rmdirAll
        let value = eval(&lua, &format!("return os.rmdir({})", quoted(&full)));
        expect_error_object(value);

        let ok: bool = lua.load(format!("return os.rmdirAll({})", quoted(&full))).eval().unwrap();
        assert!(ok && !full.exists());
    }

    #[test]
    fn test_find_walks_recursively_including_root() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("root");
        fs::create_dir_all(root.join("b")).unwrap();
        fs::write(root.join("a.txt"), "").unwrap();
        fs::write(root.join("b").join("c.txt"), "").unwrap();
        let lua = lua_with_os(ExitPolicy::Terminate);

        let paths: Vec<String> = lua.load(format!("return os.find({})", quoted(&root))).eval().unwrap();
        let expected: Vec<String> = [
            root.clone(),
            root.join("a.txt"),
            root.join("b"),
            root.join("b").join("c.txt"),
        ]
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect();
        assert_eq!(paths, expected);

        let value = eval(&lua, &format!("return os.find({})", quoted(&root.join("missing"))));
        expect_error_object(value);
    }

    #[test]
    fn test_cooperative_exit_raises_exit_request() {
        let lua = lua_with_os(ExitPolicy::Cooperative);
        let err = lua.load(r#"os.exit("3")"#).exec().unwrap_err();
        assert_eq!(exit_request(&err), Some(3));

        let err = lua.load("os.exit()").exec().unwrap_err();
        assert_eq!(exit_request(&err), Some(0));
    }

    #[test]
    fn test_exit_request_absent_for_plain_errors() {
        let lua = Lua::new();
        let err = lua.load(r#"error("nope")"#).exec().unwrap_err();
        assert_eq!(exit_request(&err), None);
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode("420"), Ok(420));
        assert_eq!(parse_mode("0o755"), Ok(0o755));
        assert!(parse_mode("-1").is_err());
        assert!(parse_mode("").is_err());
    }

    #[test]
    fn test_parse_exit_code() {
        assert_eq!(parse_exit_code(&Value::Nil), 0);
        assert_eq!(parse_exit_code(&Value::Integer(4)), 4);
        assert_eq!(parse_exit_code(&Value::Boolean(true)), 0);
    }
}
