// Persisting one JSON value to a file, creating parent directories.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Mode for created directories.
pub const DIR_MODE: u32 = 0o775;

/// Mode for written files.
pub const FILE_MODE: u32 = 0o664;

/// Write `json` to `path`, creating missing parent directories first.
pub fn write_json(path: &Path, json: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            create_dirs(parent)?;
        }
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(FILE_MODE);
    }

    let mut file = options.open(path)?;
    file.write_all(json.as_bytes())?;
    file.flush()
}

fn create_dirs(dir: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DIR_MODE);
    }
    builder.create(dir)
}
