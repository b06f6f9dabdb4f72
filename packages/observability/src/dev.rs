//! File-backed subscriber: sanitized JSONL plus optional sanitized compact
//! stderr.

use crate::layer::SanitizedLayer;
use crate::{LogConfig, LogSink};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, LineWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub(crate) fn default_log_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".lastbite")
        .join("logs")
        .join("dev.jsonl")
}

/// Move `path` to `<path>.1` when it is larger than `max_bytes`.
/// Returns true when a rotation happened.
pub(crate) fn rotate_if_oversized(path: &Path, max_bytes: u64) -> io::Result<bool> {
    let len = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if len <= max_bytes {
        return Ok(false);
    }

    let mut rotated = path.as_os_str().to_owned();
    rotated.push(".1");
    fs::rename(path, PathBuf::from(rotated))?;
    Ok(true)
}

/// Shared append handle. Lines are flushed as they complete so that other
/// processes tailing the file see them immediately.
#[derive(Clone)]
pub(crate) struct AppendFile {
    file: Arc<Mutex<LineWriter<File>>>,
}

impl AppendFile {
    pub(crate) fn open(path: &Path) -> io::Result<Self> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Arc::new(Mutex::new(LineWriter::new(file))),
        })
    }
}

impl Write for AppendFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.lock().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.lock().flush()
    }
}

impl<'a> MakeWriter<'a> for AppendFile {
    type Writer = AppendFile;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.default_level))
}

pub(crate) fn install(config: &LogConfig) -> LogSink {
    let path = config.log_path.clone().unwrap_or_else(default_log_path);

    let rotated = match rotate_if_oversized(&path, config.max_log_bytes) {
        Ok(rotated) => rotated,
        Err(e) => {
            eprintln!("could not rotate {}: {}", path.display(), e);
            false
        }
    };

    let file = match AppendFile::open(&path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("could not open {}: {}", path.display(), e);
            None
        }
    };
    let to_file = file.is_some();

    let json = file.map(|file| {
        SanitizedLayer::json(config.service_name.clone(), file).with_filter(filter(config))
    });
    let stderr = (config.also_stderr || !to_file).then(|| {
        SanitizedLayer::compact(config.service_name.clone(), io::stderr)
            .with_filter(filter(config))
    });

    if tracing_subscriber::registry()
        .with(json)
        .with(stderr)
        .try_init()
        .is_err()
    {
        return LogSink::AlreadyInitialized;
    }

    if !to_file {
        return LogSink::Stderr;
    }
    tracing::debug!(log_path = %path.display(), rotated, "logging to file");
    LogSink::File(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_append_file_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("logs").join("run.jsonl");

        let mut file = AppendFile::open(&path).unwrap();
        file.write_all(b"{\"a\":1}\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"a\":1}\n");
    }

    #[test]
    fn test_handles_share_one_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shared.jsonl");

        let first = AppendFile::open(&path).unwrap();
        let mut a = first.make_writer();
        let mut b = first.make_writer();
        a.write_all(b"one\n").unwrap();
        b.write_all(b"two\n").unwrap();
        AppendFile::open(&path)
            .unwrap()
            .write_all(b"three\n")
            .unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "one\ntwo\nthree\n");
    }

    #[test]
    fn test_rotation_only_past_threshold() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dev.jsonl");

        assert!(!rotate_if_oversized(&path, 8).unwrap());

        fs::write(&path, b"12345678").unwrap();
        assert!(!rotate_if_oversized(&path, 8).unwrap());

        fs::write(&path, b"123456789").unwrap();
        assert!(rotate_if_oversized(&path, 8).unwrap());
        assert!(!path.exists());
        assert_eq!(
            fs::read_to_string(dir.path().join("dev.jsonl.1")).unwrap(),
            "123456789"
        );
    }

    #[test]
    fn test_default_log_path() {
        assert!(default_log_path().ends_with(".lastbite/logs/dev.jsonl"));
    }
}
