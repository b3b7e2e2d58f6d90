//! Log subscriber installation for binaries embedding the workspace.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

/// Installs a global fmt subscriber filtered by `RUST_LOG` (default `info`).
///
/// Logs go to `log_file` when given, stderr otherwise. Installing twice is a
/// no-op.
pub fn init(log_file: Option<&Path>) -> io::Result<()> {
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter());

    let installed = match log_file {
        Some(path) => builder
            .with_ansi(false)
            .with_writer(Mutex::new(open_log_file(path)?))
            .try_init(),
        None => builder.with_writer(io::stderr).try_init(),
    };

    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
    Ok(())
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Opens `path` for appending, creating parent directories as needed.
pub fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    OpenOptions::new().create(true).append(true).open(path).map_err(|error| {
        io::Error::new(
            error.kind(),
            format!("failed to open log file '{}': {error}", path.display()),
        )
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::open_log_file;

    #[test]
    fn open_log_file_creates_parents_and_appends() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested/logs/workspace.log");

        open_log_file(&path)
            .and_then(|mut file| file.write_all(b"one\n"))
            .expect("first write");
        open_log_file(&path)
            .and_then(|mut file| file.write_all(b"two\n"))
            .expect("second write");

        assert_eq!(std::fs::read_to_string(&path).expect("read"), "one\ntwo\n");
    }
}
